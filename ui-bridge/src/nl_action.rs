//! Natural-language action execution
//!
//! An instruction is parsed, its target resolved through the search engine,
//! and the primitive action dispatched to the injected [`ActionExecutor`].
//! Every expected failure comes back as a structured response with a code and
//! suggestions. Nothing is retried here; retry policy belongs to the caller.

use crate::config::{ActionConfig, SearchConfig};
use crate::criteria::SearchCriteria;
use crate::element::{AIElementRecord, ElementState};
use crate::errors::{BridgeError, ErrorCode};
use crate::events::{self, BridgeEvent, EventBus};
use crate::executor::{ActionExecutor, ActionRequest, WaitConditions};
use crate::index::ElementIndex;
use crate::instruction::{self, ActionVerb, ParsedInstruction};
use crate::recovery::{create_error_context, ErrorContext};
use crate::search::{MatchResult, SearchEngine};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NLActionRequest {
    pub instruction: String,
    /// Free-form caller context, logged with the attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_threshold: Option<f64>,
    /// Milliseconds allowed for the whole call, pre-conditions included.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait_for: Option<WaitConditions>,
}

impl NLActionRequest {
    pub fn new(instruction: impl Into<String>) -> Self {
        Self {
            instruction: instruction.into(),
            ..Default::default()
        }
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.confidence_threshold = Some(threshold);
        self
    }

    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout = Some(timeout_ms);
        self
    }

    pub fn with_wait_for(mut self, conditions: WaitConditions) -> Self {
        self.wait_for = Some(conditions);
        self
    }
}

/// A runner-up candidate reported alongside a response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlternativeMatch {
    pub element_id: String,
    pub description: String,
    pub confidence: f64,
}

impl From<&MatchResult> for AlternativeMatch {
    fn from(m: &MatchResult) -> Self {
        Self {
            element_id: m.element.id.clone(),
            description: m.element.to_string(),
            confidence: m.confidence,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NLActionResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executed_action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parsed: Option<ParsedInstruction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element_used: Option<AIElementRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element_state: Option<ElementState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorCode>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alternatives: Vec<AlternativeMatch>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_context: Option<ErrorContext>,
    pub duration_ms: f64,
    pub timestamp: i64,
}

impl NLActionResponse {
    fn failed(code: ErrorCode, error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            error_code: Some(code),
            ..Default::default()
        }
    }

    fn with_context(mut self, context: ErrorContext) -> Self {
        self.suggestions = context.suggestion_texts();
        self.error_context = Some(context);
        self
    }

    fn with_element(mut self, best: &MatchResult) -> Self {
        self.element_used = Some(best.element.clone());
        self.confidence = Some(best.confidence);
        self
    }
}

pub struct NLActionExecutor {
    search: SearchEngine,
    executor: Arc<dyn ActionExecutor>,
    config: ActionConfig,
    events: Option<Arc<EventBus>>,
}

impl std::fmt::Debug for NLActionExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NLActionExecutor")
            .field("search", &self.search)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl NLActionExecutor {
    /// An executor with its own element index.
    pub fn new(
        executor: Arc<dyn ActionExecutor>,
        search_config: SearchConfig,
        config: ActionConfig,
    ) -> Self {
        Self::with_index(
            Arc::new(ElementIndex::new()),
            executor,
            search_config,
            config,
        )
    }

    /// An executor resolving targets against a shared index.
    pub fn with_index(
        index: Arc<ElementIndex>,
        executor: Arc<dyn ActionExecutor>,
        search_config: SearchConfig,
        config: ActionConfig,
    ) -> Self {
        Self {
            search: SearchEngine::with_index(index, search_config),
            executor,
            config,
            events: None,
        }
    }

    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.search = self.search.with_events(events.clone());
        self.events = Some(events);
        self
    }

    pub fn update_elements<E: Into<AIElementRecord>>(&self, elements: Vec<E>) {
        self.search.update_elements(elements);
    }

    pub fn search_engine(&self) -> &SearchEngine {
        &self.search
    }

    /// Parse, resolve and perform one instruction.
    ///
    /// `Err` only for a malformed request (a threshold outside [0, 1]); every
    /// runtime failure is an `Ok` response with `success: false`.
    #[instrument(skip(self, request), fields(instruction = %request.instruction))]
    pub async fn execute(&self, request: &NLActionRequest) -> Result<NLActionResponse, BridgeError> {
        let started = Instant::now();
        if let Some(threshold) = request.confidence_threshold {
            if !(0.0..=1.0).contains(&threshold) {
                return Err(BridgeError::InvalidArgument(format!(
                    "confidenceThreshold must be within [0, 1], got {threshold}"
                )));
            }
        }
        if let Some(context) = &request.context {
            debug!(%context, "Caller context");
        }

        let budget = request
            .timeout
            .map(Duration::from_millis)
            .unwrap_or_else(|| self.config.timeout());
        let mut response = self.run(request, started + budget).await;
        response.duration_ms = started.elapsed().as_secs_f64() * 1000.0;
        response.timestamp = chrono::Utc::now().timestamp_millis();

        if response.success {
            info!(
                executed = response.executed_action.as_deref().unwrap_or_default(),
                "Instruction succeeded"
            );
        } else {
            warn!(
                code = ?response.error_code,
                error = response.error.as_deref().unwrap_or_default(),
                "Instruction failed"
            );
        }
        events::emit(&self.events, || BridgeEvent::ActionExecuted {
            instruction: request.instruction.clone(),
            success: response.success,
            element_id: response.element_used.as_ref().map(|e| e.id.clone()),
        });
        Ok(response)
    }

    async fn run(&self, request: &NLActionRequest, deadline: Instant) -> NLActionResponse {
        let snapshot = self.search.snapshot();

        let Some(parsed) = instruction::parse_nl_instruction(&request.instruction) else {
            return parse_failure(&request.instruction, &snapshot);
        };
        debug!(?parsed, "Parsed instruction");

        let threshold = request
            .confidence_threshold
            .unwrap_or(self.config.confidence_threshold);
        let criteria = SearchCriteria::fuzzy_text(&parsed.target_description);
        let search = self.search.search_in(&snapshot, &criteria, threshold);
        let alternatives: Vec<AlternativeMatch> = search
            .results
            .iter()
            .skip(usize::from(search.best_match.is_some()))
            .take(self.config.max_alternatives)
            .map(AlternativeMatch::from)
            .collect();

        let Some(best) = search.best_match.clone() else {
            let nearest = search.nearest();
            let code = if nearest.is_some() {
                ErrorCode::LowConfidence
            } else {
                ErrorCode::ElementNotFound
            };
            let mut context = create_error_context(
                code,
                &request.instruction,
                &snapshot,
                Some(&criteria),
                nearest,
            );
            context.search_results.candidates_found = search.results.len();
            let mut response =
                NLActionResponse::failed(code, context.message.clone()).with_context(context);
            response.parsed = Some(parsed);
            response.alternatives = alternatives;
            return response;
        };

        let mut response = self
            .perform(request, &parsed, &best, &criteria, &snapshot, deadline)
            .await
            .with_element(&best);
        response.parsed = Some(parsed);
        response.alternatives = alternatives;
        response
    }

    async fn perform(
        &self,
        request: &NLActionRequest,
        parsed: &ParsedInstruction,
        best: &MatchResult,
        criteria: &SearchCriteria,
        snapshot: &[AIElementRecord],
        deadline: Instant,
    ) -> NLActionResponse {
        let element = &best.element;
        let context_for = |code: ErrorCode| {
            create_error_context(code, &request.instruction, snapshot, Some(criteria), Some(best))
        };
        let action_failure = |code: ErrorCode, error: String| {
            NLActionResponse::failed(code, error).with_context(context_for(code))
        };

        let primitive = parsed.action.as_str();
        if !element.supports(primitive) {
            return action_failure(
                ErrorCode::ActionFailed,
                BridgeError::UnsupportedOperation(format!(
                    "{element} does not support '{primitive}' (supports: {})",
                    element.actions.join(", ")
                ))
                .to_string(),
            );
        }

        if let Some(conditions) = request.wait_for.as_ref().filter(|c| !c.is_empty()) {
            if let Err((code, error)) = self.wait_until(element, conditions, deadline).await {
                return action_failure(code, error);
            }
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        let timed_out = || {
            action_failure(
                ErrorCode::Timeout,
                BridgeError::Timeout(format!(
                    "'{primitive}' on {element} did not finish before the deadline"
                ))
                .to_string(),
            )
        };
        if remaining.is_zero() {
            return timed_out();
        }

        let action_request = ActionRequest::new(primitive).with_params(action_params(parsed));
        debug!(element = %element.id, ?action_request, ?remaining, "Dispatching primitive action");
        let outcome = match tokio::time::timeout(
            remaining,
            self.executor.execute_action(&element.id, &action_request),
        )
        .await
        {
            Err(_) => return timed_out(),
            Ok(Err(BridgeError::ElementObscured(blocker))) => {
                let code = ErrorCode::ActionFailed;
                let error = BridgeError::ElementObscured(blocker.clone()).to_string();
                return NLActionResponse::failed(code, error)
                    .with_context(context_for(code).with_blocker(blocker));
            }
            Ok(Err(e)) => return action_failure(e.code(), e.to_string()),
            Ok(Ok(outcome)) => outcome,
        };

        if !outcome.success {
            let error = outcome
                .error
                .unwrap_or_else(|| format!("'{primitive}' on {element} was rejected"));
            let mut response = action_failure(ErrorCode::ActionFailed, error);
            response.element_state = outcome.element_state;
            return response;
        }

        NLActionResponse {
            success: true,
            executed_action: Some(describe_action(parsed, element)),
            element_state: outcome.element_state,
            ..Default::default()
        }
    }

    async fn wait_until(
        &self,
        element: &AIElementRecord,
        conditions: &WaitConditions,
        deadline: Instant,
    ) -> Result<(), (ErrorCode, String)> {
        if conditions.is_met_by(&element.state) {
            return Ok(());
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        let timeout = conditions
            .timeout_ms
            .map(Duration::from_millis)
            .map_or(remaining, |own| own.min(remaining));
        if timeout.is_zero() {
            return Err((
                ErrorCode::Timeout,
                format!("No time left to wait for {element}"),
            ));
        }
        debug!(element = %element.id, ?conditions, "Waiting for pre-conditions");

        match tokio::time::timeout(timeout, self.executor.wait_for(&element.id, conditions)).await
        {
            Ok(Ok(outcome)) if outcome.met => Ok(()),
            Ok(Ok(outcome)) => {
                let state = outcome.state.as_ref().unwrap_or(&element.state);
                let code = if conditions.visible == Some(true) && !state.visible {
                    ErrorCode::ElementNotVisible
                } else if conditions.enabled == Some(true) && !state.enabled {
                    ErrorCode::ElementNotEnabled
                } else {
                    ErrorCode::Timeout
                };
                Err((code, format!("{element} did not reach {conditions:?}")))
            }
            Ok(Err(e)) => Err((e.code(), e.to_string())),
            Err(_) => Err((
                ErrorCode::Timeout,
                format!("Timed out after {timeout:?} waiting for {element}"),
            )),
        }
    }
}

fn parse_failure(instruction: &str, snapshot: &[AIElementRecord]) -> NLActionResponse {
    let mut suggestions = Vec::new();
    if let Some(verb) = instruction::closest_verb(instruction) {
        suggestions.push(format!("Did you mean '{}'?", verb.usage()));
    }
    suggestions.extend(
        [ActionVerb::Click, ActionVerb::Type, ActionVerb::Select, ActionVerb::Check]
            .iter()
            .map(|verb| format!("Try '{}'", verb.usage())),
    );

    let context = create_error_context(ErrorCode::ParseFailed, instruction, snapshot, None, None);
    let mut response = NLActionResponse::failed(ErrorCode::ParseFailed, context.message.clone());
    response.error_context = Some(context);
    response.suggestions = suggestions;
    response
}

fn action_params(parsed: &ParsedInstruction) -> serde_json::Value {
    let mut params = serde_json::Map::new();
    match (parsed.action, &parsed.value) {
        (ActionVerb::Type, Some(value)) => {
            params.insert("text".to_string(), json!(value));
        }
        (ActionVerb::Select, Some(value)) => {
            params.insert("value".to_string(), json!(value));
        }
        _ => {}
    }
    if !parsed.modifiers.is_empty() {
        params.insert("modifiers".to_string(), json!(parsed.modifiers));
    }
    if params.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::Value::Object(params)
    }
}

fn describe_action(parsed: &ParsedInstruction, element: &AIElementRecord) -> String {
    let mut text = match (parsed.action, &parsed.value) {
        (ActionVerb::Type, Some(value)) => format!("Typed '{value}' into {element}"),
        (ActionVerb::Select, Some(value)) => format!("Selected '{value}' in {element}"),
        (verb, _) => format!("{} {element}", verb.past_tense()),
    };
    if !parsed.modifiers.is_empty() {
        let keys: Vec<&str> = parsed.modifiers.iter().map(String::as_str).collect();
        text.push_str(&format!(" with {}", keys.join("+")));
    }
    text
}
