//! Assertions over element state, with polling and batches
//!
//! Each assertion re-resolves its target from the current index snapshot on
//! every poll, so it observes re-renders that happen while it waits.

use crate::config::{AssertionConfig, SearchConfig};
use crate::criteria::{SearchCriteria, TargetSpec};
use crate::element::{AIElementRecord, ElementState};
use crate::errors::{BridgeError, ErrorCode};
use crate::events::{self, BridgeEvent, EventBus};
use crate::index::ElementIndex;
use crate::recovery::create_error_context;
use crate::search::{MatchResult, SearchEngine};
use crate::similarity;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, instrument};

/// Below this a resolved target is suspected to be the wrong element.
const WRONG_ELEMENT_SUSPICION: f64 = 0.9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AssertionType {
    Visible,
    Hidden,
    Enabled,
    Disabled,
    Focused,
    Checked,
    Unchecked,
    HasText,
    ContainsText,
    HasValue,
    Exists,
    NotExists,
}

impl AssertionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssertionType::Visible => "visible",
            AssertionType::Hidden => "hidden",
            AssertionType::Enabled => "enabled",
            AssertionType::Disabled => "disabled",
            AssertionType::Focused => "focused",
            AssertionType::Checked => "checked",
            AssertionType::Unchecked => "unchecked",
            AssertionType::HasText => "hasText",
            AssertionType::ContainsText => "containsText",
            AssertionType::HasValue => "hasValue",
            AssertionType::Exists => "exists",
            AssertionType::NotExists => "notExists",
        }
    }

    /// Types compared against a caller-supplied string.
    pub fn needs_expected_text(&self) -> bool {
        matches!(
            self,
            AssertionType::HasText | AssertionType::ContainsText | AssertionType::HasValue
        )
    }

    /// The boolean the observed property must equal, before any override.
    fn default_expectation(&self) -> bool {
        !matches!(
            self,
            AssertionType::Hidden
                | AssertionType::Disabled
                | AssertionType::Unchecked
                | AssertionType::NotExists
        )
    }
}

impl fmt::Display for AssertionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What an assertion is about: a description (or prefixed selector) or
/// structured criteria.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AssertionTarget {
    Description(String),
    Criteria(SearchCriteria),
}

impl fmt::Display for AssertionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssertionTarget::Description(d) => f.write_str(d),
            AssertionTarget::Criteria(c) => f.write_str(&c.describe()),
        }
    }
}

impl From<&str> for AssertionTarget {
    fn from(s: &str) -> Self {
        AssertionTarget::Description(s.to_string())
    }
}

impl From<String> for AssertionTarget {
    fn from(s: String) -> Self {
        AssertionTarget::Description(s)
    }
}

impl From<SearchCriteria> for AssertionTarget {
    fn from(criteria: SearchCriteria) -> Self {
        AssertionTarget::Criteria(criteria)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssertionRequest {
    pub target: AssertionTarget,
    #[serde(rename = "type")]
    pub assertion_type: AssertionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<Value>,
    /// Milliseconds to keep polling; `0` checks once.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    /// Replaces the generated failure reason prefix.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fuzzy: Option<bool>,
}

impl AssertionRequest {
    pub fn new(target: impl Into<AssertionTarget>, assertion_type: AssertionType) -> Self {
        Self {
            target: target.into(),
            assertion_type,
            expected: None,
            timeout: None,
            message: None,
            fuzzy: None,
        }
    }

    pub fn expecting(mut self, expected: impl Into<Value>) -> Self {
        self.expected = Some(expected.into());
        self
    }

    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout = Some(timeout_ms);
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssertionResult {
    pub passed: bool,
    pub target: String,
    /// The element the target resolved to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_description: Option<String>,
    #[serde(rename = "type")]
    pub assertion_type: AssertionType,
    pub expected: Value,
    pub actual: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element_state: Option<ElementState>,
    pub duration_ms: f64,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BatchMode {
    #[default]
    All,
    Any,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchAssertionRequest {
    pub assertions: Vec<AssertionRequest>,
    #[serde(default)]
    pub mode: BatchMode,
    #[serde(default)]
    pub stop_on_failure: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchAssertionResult {
    pub passed: bool,
    pub passed_count: usize,
    pub failed_count: usize,
    /// Only the assertions that actually ran, in order.
    pub results: Vec<AssertionResult>,
    pub duration_ms: f64,
    pub timestamp: i64,
}

/// One evaluation against one snapshot.
struct Observation {
    passed: bool,
    expected: Value,
    actual: Value,
    reason: Option<String>,
    resolved: Option<MatchResult>,
}

#[derive(Debug, Clone)]
pub struct AssertionEvaluator {
    search: SearchEngine,
    config: AssertionConfig,
    events: Option<Arc<EventBus>>,
}

impl AssertionEvaluator {
    pub fn new(search_config: SearchConfig, config: AssertionConfig) -> Self {
        Self::with_index(Arc::new(ElementIndex::new()), search_config, config)
    }

    pub fn with_index(
        index: Arc<ElementIndex>,
        search_config: SearchConfig,
        config: AssertionConfig,
    ) -> Self {
        Self {
            search: SearchEngine::with_index(index, search_config),
            config,
            events: None,
        }
    }

    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn update_elements<E: Into<AIElementRecord>>(&self, elements: Vec<E>) {
        self.search.update_elements(elements);
    }

    pub fn config(&self) -> &AssertionConfig {
        &self.config
    }

    /// Evaluate one assertion, polling until it passes or its timeout runs out.
    ///
    /// `Err` only for a malformed request: a text assertion without a string
    /// `expected`, or a non-boolean `expected` on a state assertion.
    #[instrument(skip(self, request), fields(target = %request.target, assertion = %request.assertion_type))]
    pub async fn assert(&self, request: &AssertionRequest) -> Result<AssertionResult, BridgeError> {
        let started = Instant::now();
        let expectation = Expectation::from_request(request)?;
        let timeout =
            Duration::from_millis(request.timeout.unwrap_or(self.config.default_timeout_ms));
        let poll = Duration::from_millis(self.config.poll_interval_ms.max(1));
        let deadline = started + timeout;

        let mut attempts = 0u32;
        let observation = loop {
            attempts += 1;
            let observation = self.observe(request, &expectation);
            let now = Instant::now();
            if observation.passed || now >= deadline {
                break observation;
            }
            tokio::time::sleep(poll.min(deadline - now)).await;
        };
        debug!(attempts, passed = observation.passed, "Assertion settled");

        let result = self.finish(request, observation, started);
        events::emit(&self.events, || BridgeEvent::AssertionEvaluated {
            target: result.target.clone(),
            assertion: request.assertion_type.to_string(),
            passed: result.passed,
        });
        Ok(result)
    }

    /// Run assertions in order. With `stop_on_failure` the batch ends at the
    /// first failing assertion, in either mode.
    #[instrument(skip(self, batch), fields(count = batch.assertions.len(), mode = ?batch.mode))]
    pub async fn assert_batch(
        &self,
        batch: &BatchAssertionRequest,
    ) -> Result<BatchAssertionResult, BridgeError> {
        let started = Instant::now();
        let mut results = Vec::with_capacity(batch.assertions.len());
        for request in &batch.assertions {
            let result = self.assert(request).await?;
            let failed = !result.passed;
            results.push(result);
            if failed && batch.stop_on_failure {
                debug!(ran = results.len(), "Stopping batch at first failure");
                break;
            }
        }

        let passed_count = results.iter().filter(|r| r.passed).count();
        let failed_count = results.len() - passed_count;
        let passed = match batch.mode {
            BatchMode::All => failed_count == 0,
            BatchMode::Any => passed_count > 0,
        };
        Ok(BatchAssertionResult {
            passed,
            passed_count,
            failed_count,
            results,
            duration_ms: started.elapsed().as_secs_f64() * 1000.0,
            timestamp: chrono::Utc::now().timestamp_millis(),
        })
    }

    pub async fn assert_visible(
        &self,
        target: impl Into<AssertionTarget>,
    ) -> Result<AssertionResult, BridgeError> {
        self.assert(&AssertionRequest::new(target, AssertionType::Visible))
            .await
    }

    pub async fn assert_hidden(
        &self,
        target: impl Into<AssertionTarget>,
    ) -> Result<AssertionResult, BridgeError> {
        self.assert(&AssertionRequest::new(target, AssertionType::Hidden))
            .await
    }

    pub async fn assert_enabled(
        &self,
        target: impl Into<AssertionTarget>,
    ) -> Result<AssertionResult, BridgeError> {
        self.assert(&AssertionRequest::new(target, AssertionType::Enabled))
            .await
    }

    pub async fn assert_disabled(
        &self,
        target: impl Into<AssertionTarget>,
    ) -> Result<AssertionResult, BridgeError> {
        self.assert(&AssertionRequest::new(target, AssertionType::Disabled))
            .await
    }

    pub async fn assert_focused(
        &self,
        target: impl Into<AssertionTarget>,
    ) -> Result<AssertionResult, BridgeError> {
        self.assert(&AssertionRequest::new(target, AssertionType::Focused))
            .await
    }

    pub async fn assert_checked(
        &self,
        target: impl Into<AssertionTarget>,
    ) -> Result<AssertionResult, BridgeError> {
        self.assert(&AssertionRequest::new(target, AssertionType::Checked))
            .await
    }

    pub async fn assert_unchecked(
        &self,
        target: impl Into<AssertionTarget>,
    ) -> Result<AssertionResult, BridgeError> {
        self.assert(&AssertionRequest::new(target, AssertionType::Unchecked))
            .await
    }

    pub async fn assert_has_text(
        &self,
        target: impl Into<AssertionTarget>,
        text: &str,
    ) -> Result<AssertionResult, BridgeError> {
        self.assert(&AssertionRequest::new(target, AssertionType::HasText).expecting(text))
            .await
    }

    pub async fn assert_contains_text(
        &self,
        target: impl Into<AssertionTarget>,
        text: &str,
    ) -> Result<AssertionResult, BridgeError> {
        self.assert(&AssertionRequest::new(target, AssertionType::ContainsText).expecting(text))
            .await
    }

    pub async fn assert_has_value(
        &self,
        target: impl Into<AssertionTarget>,
        value: &str,
    ) -> Result<AssertionResult, BridgeError> {
        self.assert(&AssertionRequest::new(target, AssertionType::HasValue).expecting(value))
            .await
    }

    pub async fn assert_exists(
        &self,
        target: impl Into<AssertionTarget>,
    ) -> Result<AssertionResult, BridgeError> {
        self.assert(&AssertionRequest::new(target, AssertionType::Exists))
            .await
    }

    pub async fn assert_not_exists(
        &self,
        target: impl Into<AssertionTarget>,
    ) -> Result<AssertionResult, BridgeError> {
        self.assert(&AssertionRequest::new(target, AssertionType::NotExists))
            .await
    }

    /// Resolve a target against one snapshot: exact id first, then search.
    fn resolve(
        &self,
        snapshot: &[AIElementRecord],
        target: &AssertionTarget,
        fuzzy: Option<bool>,
    ) -> Option<MatchResult> {
        let by_id = |id: &str| {
            snapshot.iter().find(|e| e.id == id).map(|e| MatchResult {
                element: e.clone(),
                confidence: 1.0,
                match_reasons: vec![format!("id match: #{id}")],
                scores: Default::default(),
            })
        };

        let criteria = match target {
            AssertionTarget::Criteria(criteria) => criteria.clone(),
            AssertionTarget::Description(description) => {
                if let Some(hit) = by_id(description.trim()) {
                    return Some(hit);
                }
                match TargetSpec::from(description.as_str()) {
                    TargetSpec::Id(id) => return by_id(&id),
                    TargetSpec::Criteria(criteria) => criteria,
                    TargetSpec::Description(text) => SearchCriteria {
                        text: Some(text),
                        fuzzy: Some(fuzzy.unwrap_or(true)),
                        ..Default::default()
                    },
                }
            }
        };
        self.search
            .search_in(snapshot, &criteria, self.config.confidence_threshold)
            .best_match
    }

    fn observe(&self, request: &AssertionRequest, expectation: &Expectation) -> Observation {
        let snapshot = self.search.snapshot();
        let resolved = self.resolve(&snapshot, &request.target, request.fuzzy);
        let state = resolved.as_ref().map(|m| &m.element.state);
        let kind = request.assertion_type;

        let (expected, actual, passed) = match expectation {
            Expectation::Text(text) => {
                let actual = match (kind, state) {
                    (AssertionType::HasValue, Some(s)) => s.value.clone(),
                    (_, Some(s)) => Some(
                        s.text_content
                            .as_deref()
                            .unwrap_or_default()
                            .trim()
                            .to_string(),
                    ),
                    (_, None) => None,
                };
                let passed = actual.as_deref().is_some_and(|a| match kind {
                    AssertionType::ContainsText => similarity::contains_ignore_case(a, text),
                    _ => a == text.as_str(),
                });
                (json!(text), json!(actual), passed)
            }
            Expectation::Flag(flag) => {
                let actual: Option<bool> = match kind {
                    AssertionType::Exists | AssertionType::NotExists => Some(state.is_some()),
                    AssertionType::Visible | AssertionType::Hidden => state.map(|s| s.visible),
                    AssertionType::Enabled | AssertionType::Disabled => state.map(|s| s.enabled),
                    AssertionType::Focused => state.map(|s| s.focused),
                    _ => state.and_then(|s| s.checked),
                };
                (json!(flag), json!(actual), actual == Some(*flag))
            }
        };

        let reason = (!passed).then(|| {
            failure_reason(kind, &request.target, resolved.as_ref(), &expected, &actual)
        });
        Observation {
            passed,
            expected,
            actual,
            reason,
            resolved,
        }
    }

    fn finish(
        &self,
        request: &AssertionRequest,
        observation: Observation,
        started: Instant,
    ) -> AssertionResult {
        let suggestion = if observation.passed || !self.config.include_suggestions {
            None
        } else {
            self.suggest(request, observation.resolved.as_ref())
        };
        let failure_reason = match (observation.reason, &request.message) {
            (Some(reason), Some(message)) => Some(format!("{message}: {reason}")),
            (reason, _) => reason,
        };

        AssertionResult {
            passed: observation.passed,
            target: request.target.to_string(),
            target_description: observation.resolved.as_ref().map(|m| m.element.to_string()),
            assertion_type: request.assertion_type,
            expected: observation.expected,
            actual: observation.actual,
            failure_reason,
            suggestion,
            element_state: observation.resolved.map(|m| m.element.record.state),
            duration_ms: started.elapsed().as_secs_f64() * 1000.0,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Tell apart "wrong element resolved" from "right element, different state".
    fn suggest(
        &self,
        request: &AssertionRequest,
        resolved: Option<&MatchResult>,
    ) -> Option<String> {
        let snapshot = self.search.snapshot();
        let criteria = match &request.target {
            AssertionTarget::Criteria(c) => c.clone(),
            AssertionTarget::Description(d) => SearchCriteria::fuzzy_text(d.as_str()),
        };

        match resolved {
            None => {
                if request.assertion_type == AssertionType::NotExists {
                    return None;
                }
                let nearest = self
                    .search
                    .search_in(&snapshot, &criteria, 1.0)
                    .results
                    .into_iter()
                    .next();
                let code = if nearest.is_some() {
                    ErrorCode::LowConfidence
                } else {
                    ErrorCode::ElementNotFound
                };
                let context = create_error_context(
                    code,
                    &format!("assert {} on {}", request.assertion_type, request.target),
                    &snapshot,
                    Some(&criteria),
                    nearest.as_ref(),
                );
                context.suggestions.first().map(|s| s.action.clone())
            }
            Some(m) if m.confidence < WRONG_ELEMENT_SUSPICION => Some(format!(
                "Target resolved to {} with confidence {:.2}; it may be the wrong element. Use '#{}' or a more specific description",
                m.element, m.confidence, m.element.id
            )),
            Some(m) => {
                let code = match request.assertion_type {
                    AssertionType::Visible => ErrorCode::ElementNotVisible,
                    AssertionType::Enabled => ErrorCode::ElementNotEnabled,
                    _ => ErrorCode::AssertionFailed,
                };
                let context = create_error_context(
                    code,
                    &format!("assert {} on {}", request.assertion_type, request.target),
                    &snapshot,
                    Some(&criteria),
                    Some(m),
                );
                context.suggestions.first().map(|s| {
                    format!(
                        "{} looks like the right element but its state differs. {}",
                        m.element, s.action
                    )
                })
            }
        }
    }
}

enum Expectation {
    Flag(bool),
    Text(String),
}

impl Expectation {
    fn from_request(request: &AssertionRequest) -> Result<Self, BridgeError> {
        let kind = request.assertion_type;
        if kind.needs_expected_text() {
            return match &request.expected {
                Some(Value::String(text)) => Ok(Expectation::Text(text.clone())),
                Some(Value::Number(n)) => Ok(Expectation::Text(n.to_string())),
                Some(other) => Err(BridgeError::InvalidArgument(format!(
                    "'{kind}' needs a string expected value, got {other}"
                ))),
                None => Err(BridgeError::InvalidArgument(format!(
                    "'{kind}' needs an expected value"
                ))),
            };
        }

        match &request.expected {
            None | Some(Value::Null) => Ok(Expectation::Flag(kind.default_expectation())),
            // `expected: false` inverts the check
            Some(Value::Bool(b)) => Ok(Expectation::Flag(kind.default_expectation() == *b)),
            Some(other) => Err(BridgeError::InvalidArgument(format!(
                "'{kind}' takes a boolean expected value, got {other}"
            ))),
        }
    }
}

fn failure_reason(
    kind: AssertionType,
    target: &AssertionTarget,
    resolved: Option<&MatchResult>,
    expected: &Value,
    actual: &Value,
) -> String {
    let Some(m) = resolved else {
        return match kind {
            AssertionType::Exists => format!("No element matches '{target}'"),
            _ => format!("Could not find an element matching '{target}'"),
        };
    };
    let element = &m.element;
    match kind {
        AssertionType::NotExists => format!("{element} exists but was expected to be absent"),
        AssertionType::Checked | AssertionType::Unchecked if actual.is_null() => {
            format!("{element} is not a checkable element")
        }
        AssertionType::HasText | AssertionType::ContainsText | AssertionType::HasValue => {
            format!("Expected {element} {kind} {expected}, but found {actual}")
        }
        _ => format!("Expected {element} to be {kind}, but it is not"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::ElementRecord;

    fn element(id: &str, role: &str, text: &str) -> AIElementRecord {
        ElementRecord {
            id: id.to_string(),
            element_type: role.to_string(),
            label: None,
            tag_name: role.to_string(),
            role: Some(role.to_string()),
            accessible_name: None,
            actions: vec![],
            state: ElementState {
                visible: true,
                enabled: true,
                text_content: Some(text.to_string()),
                ..Default::default()
            },
            registered: true,
        }
        .into()
    }

    fn evaluator() -> AssertionEvaluator {
        let mut remember = element("remember", "checkbox", "Remember me");
        remember.record.state.checked = Some(false);
        let mut save = element("save", "button", "Save");
        save.record.state.enabled = false;
        let mut email = element("email", "input", "");
        email.record.state.value = Some("ada@example.com".to_string());
        email.record.label = Some("Email".to_string());

        let evaluator = AssertionEvaluator::new(
            SearchConfig::default(),
            AssertionConfig {
                default_timeout_ms: 0,
                ..Default::default()
            },
        );
        evaluator.update_elements(vec![
            element("title", "heading", "  Welcome back  "),
            remember,
            save,
            email,
        ]);
        evaluator
    }

    #[tokio::test]
    async fn test_state_assertions() {
        let evaluator = evaluator();
        assert!(evaluator.assert_visible("Welcome back").await.unwrap().passed);
        assert!(evaluator.assert_disabled("Save").await.unwrap().passed);
        assert!(evaluator.assert_unchecked("Remember me").await.unwrap().passed);
        assert!(!evaluator.assert_checked("Remember me").await.unwrap().passed);
        assert!(!evaluator.assert_focused("#email").await.unwrap().passed);
    }

    #[tokio::test]
    async fn test_text_assertions_use_trimmed_text() {
        let evaluator = evaluator();
        let result = evaluator.assert_has_text("#title", "Welcome back").await.unwrap();
        assert!(result.passed, "{result:?}");
        assert_eq!(result.actual, json!("Welcome back"));

        let result = evaluator.assert_contains_text("#title", "back").await.unwrap();
        assert!(result.passed);

        let result = evaluator.assert_has_value("Email", "ada@example.com").await.unwrap();
        assert!(result.passed);
    }

    #[tokio::test]
    async fn test_contains_text_ignores_case() {
        let evaluator = evaluator();
        let result = evaluator.assert_contains_text("#title", "WELCOME Back").await.unwrap();
        assert!(result.passed, "{result:?}");

        let result = evaluator.assert_has_text("#title", "welcome back").await.unwrap();
        assert!(!result.passed);
    }

    #[tokio::test]
    async fn test_failure_carries_reason_and_suggestion() {
        let evaluator = evaluator();
        let result = evaluator
            .assert(
                &AssertionRequest::new("#title", AssertionType::HasText)
                    .expecting("Goodbye")
                    .with_message("Greeting is wrong"),
            )
            .await
            .unwrap();
        assert!(!result.passed);
        assert_eq!(
            result.failure_reason.as_deref(),
            Some("Greeting is wrong: Expected heading 'Welcome back' hasText \"Goodbye\", but found \"Welcome back\"")
        );
        assert!(result.suggestion.is_some());
        assert_eq!(result.target_description.as_deref(), Some("heading 'Welcome back'"));
    }

    #[tokio::test]
    async fn test_absence() {
        let evaluator = evaluator();
        assert!(evaluator.assert_not_exists("Delete account").await.unwrap().passed);
        assert!(!evaluator.assert_exists("Delete account").await.unwrap().passed);

        let hidden = evaluator.assert_hidden("Delete account").await.unwrap();
        assert!(!hidden.passed);
        assert_eq!(hidden.actual, Value::Null);
        assert!(hidden.suggestion.is_some());
    }

    #[tokio::test]
    async fn test_missing_expected_is_an_error() {
        let evaluator = evaluator();
        let err = evaluator
            .assert(&AssertionRequest::new("#title", AssertionType::HasText))
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::InvalidArgument(_)));

        let err = evaluator
            .assert(&AssertionRequest::new("#title", AssertionType::Visible).expecting("yes"))
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_expected_false_inverts() {
        let evaluator = evaluator();
        let result = evaluator
            .assert(&AssertionRequest::new("Save", AssertionType::Enabled).expecting(false))
            .await
            .unwrap();
        assert!(result.passed);
        assert_eq!(result.expected, json!(false));
    }

    #[tokio::test]
    async fn test_batch_stop_on_failure() {
        let evaluator = evaluator();
        let batch = BatchAssertionRequest {
            assertions: vec![
                AssertionRequest::new("Welcome back", AssertionType::Visible),
                AssertionRequest::new("Save", AssertionType::Enabled),
                AssertionRequest::new("Remember me", AssertionType::Exists),
            ],
            mode: BatchMode::All,
            stop_on_failure: true,
        };
        let result = evaluator.assert_batch(&batch).await.unwrap();
        assert!(!result.passed);
        assert_eq!(result.results.len(), 2);
        assert_eq!(result.failed_count, 1);
        assert_eq!(result.passed_count, 1);

        let any = BatchAssertionRequest {
            mode: BatchMode::Any,
            stop_on_failure: false,
            ..batch
        };
        let result = evaluator.assert_batch(&any).await.unwrap();
        assert!(result.passed);
        assert_eq!(result.results.len(), 3);
    }

    #[test]
    fn test_request_wire_shape() {
        let request: AssertionRequest = serde_json::from_value(json!({
            "target": {"role": "button", "text": "Save"},
            "type": "containsText",
            "expected": "Sa"
        }))
        .unwrap();
        assert_eq!(request.assertion_type, AssertionType::ContainsText);
        assert_eq!(
            request.target,
            AssertionTarget::Criteria(SearchCriteria::text("Save").with_role("button"))
        );

        let request: AssertionRequest =
            serde_json::from_value(json!({"target": "Save", "type": "notExists"})).unwrap();
        assert_eq!(request.target, AssertionTarget::Description("Save".into()));
    }
}
