//! Agent-facing UI element discovery and control
//!
//! The binding layer feeds element records in through
//! [`UiBridge::update_elements`] and performs primitive actions through an
//! [`ActionExecutor`]. On top of that this crate ranks elements against loose
//! descriptions, runs instructions such as `"type hello into Search"`, checks
//! UI state with polling assertions, and explains every failure with enough
//! context to decide what to do next.

use std::sync::Arc;
use tracing::{debug, instrument};

pub mod assertion;
pub mod config;
pub mod criteria;
pub mod element;
pub mod errors;
pub mod events;
pub mod executor;
pub mod index;
pub mod instruction;
pub mod logging;
pub mod nl_action;
pub mod page;
pub mod recovery;
pub mod search;
pub mod similarity;

pub use assertion::{
    AssertionEvaluator, AssertionRequest, AssertionResult, AssertionTarget, AssertionType,
    BatchAssertionRequest, BatchAssertionResult, BatchMode,
};
pub use config::{ActionConfig, AssertionConfig, BridgeConfig, ScoreWeights, SearchConfig};
pub use criteria::{SearchCriteria, TargetSpec};
pub use element::{AIElementRecord, ElementRecord, ElementRect, ElementState};
pub use errors::{BridgeError, ErrorCode};
pub use events::{BridgeEvent, EventBus, ListenerId};
pub use executor::{ActionExecutor, ActionOutcome, ActionRequest, WaitConditions, WaitOutcome};
pub use index::ElementIndex;
pub use instruction::{parse_nl_instruction, ActionVerb, ParsedInstruction};
pub use nl_action::{AlternativeMatch, NLActionExecutor, NLActionRequest, NLActionResponse};
pub use page::{DiffChanges, ModalState, PageObserver, SemanticDiff, SemanticSnapshot};
pub use recovery::{create_error_context, ErrorContext, RecoveryStrategy, RecoverySuggestion};
pub use search::{MatchResult, MatchScorer, SearchEngine, SearchResponse, SearchScores};

/// The main entry point: search, actions and assertions over one shared
/// element index.
#[derive(Debug)]
pub struct UiBridge {
    index: Arc<ElementIndex>,
    search: SearchEngine,
    actions: NLActionExecutor,
    assertions: AssertionEvaluator,
    page: PageObserver,
    events: Arc<EventBus>,
    config: BridgeConfig,
}

impl UiBridge {
    pub fn new(
        executor: Arc<dyn ActionExecutor>,
        config: BridgeConfig,
    ) -> Result<Self, BridgeError> {
        config.validate()?;
        let index = Arc::new(ElementIndex::new());
        let events = Arc::new(EventBus::new());

        let search = SearchEngine::with_index(index.clone(), config.search.clone())
            .with_events(events.clone());
        let actions = NLActionExecutor::with_index(
            index.clone(),
            executor,
            config.search.clone(),
            config.action.clone(),
        )
        .with_events(events.clone());
        // assertion searches stay silent on the bus; only verdicts are emitted
        let assertions = AssertionEvaluator::with_index(
            index.clone(),
            config.search.clone(),
            config.assertion.clone(),
        )
        .with_events(events.clone());

        debug!(?config, "UiBridge created");
        Ok(Self {
            index,
            search,
            actions,
            assertions,
            page: PageObserver::new(),
            events,
            config,
        })
    }

    /// A bridge configured from the `UI_BRIDGE_*` environment.
    pub fn from_env(executor: Arc<dyn ActionExecutor>) -> Result<Self, BridgeError> {
        Self::new(executor, config::global().clone())
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn index(&self) -> &Arc<ElementIndex> {
        &self.index
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn search_engine(&self) -> &SearchEngine {
        &self.search
    }

    pub fn actions(&self) -> &NLActionExecutor {
        &self.actions
    }

    pub fn assertions(&self) -> &AssertionEvaluator {
        &self.assertions
    }

    /// Replace every known element at once.
    pub fn update_elements<E: Into<AIElementRecord>>(&self, elements: Vec<E>) {
        self.search.update_elements(elements);
    }

    pub fn search(&self, criteria: &SearchCriteria) -> SearchResponse {
        self.search.search(criteria)
    }

    pub fn find_best(&self, criteria: &SearchCriteria) -> Option<MatchResult> {
        self.search.find_best(criteria)
    }

    pub fn find(&self, description: &str) -> Option<AIElementRecord> {
        self.search.find(description)
    }

    pub fn find_by_role(&self, role: &str, name: Option<&str>) -> Vec<MatchResult> {
        self.search.find_by_role(role, name)
    }

    pub async fn execute(&self, request: &NLActionRequest) -> Result<NLActionResponse, BridgeError> {
        self.actions.execute(request).await
    }

    pub async fn click(&self, target: &str) -> Result<NLActionResponse, BridgeError> {
        self.execute(&NLActionRequest::new(format!("click {target}")))
            .await
    }

    #[instrument(skip(self, text))]
    pub async fn type_text(
        &self,
        target: &str,
        text: &str,
    ) -> Result<NLActionResponse, BridgeError> {
        let instruction = format!("type {} into {target}", quote_value(text)?);
        self.execute(&NLActionRequest::new(instruction)).await
    }

    pub async fn select_option(
        &self,
        target: &str,
        option: &str,
    ) -> Result<NLActionResponse, BridgeError> {
        let instruction = format!("select {} from {target}", quote_value(option)?);
        self.execute(&NLActionRequest::new(instruction)).await
    }

    pub async fn assert(&self, request: &AssertionRequest) -> Result<AssertionResult, BridgeError> {
        self.assertions.assert(request).await
    }

    pub async fn assert_batch(
        &self,
        batch: &BatchAssertionRequest,
    ) -> Result<BatchAssertionResult, BridgeError> {
        self.assertions.assert_batch(batch).await
    }

    pub async fn wait_for_visible(
        &self,
        target: impl Into<AssertionTarget>,
        timeout_ms: u64,
    ) -> Result<AssertionResult, BridgeError> {
        self.wait_for(target, AssertionType::Visible, timeout_ms)
            .await
    }

    pub async fn wait_for_hidden(
        &self,
        target: impl Into<AssertionTarget>,
        timeout_ms: u64,
    ) -> Result<AssertionResult, BridgeError> {
        self.wait_for(target, AssertionType::Hidden, timeout_ms)
            .await
    }

    pub async fn wait_for_enabled(
        &self,
        target: impl Into<AssertionTarget>,
        timeout_ms: u64,
    ) -> Result<AssertionResult, BridgeError> {
        self.wait_for(target, AssertionType::Enabled, timeout_ms)
            .await
    }

    async fn wait_for(
        &self,
        target: impl Into<AssertionTarget>,
        assertion_type: AssertionType,
        timeout_ms: u64,
    ) -> Result<AssertionResult, BridgeError> {
        let request = AssertionRequest::new(target, assertion_type).with_timeout(timeout_ms);
        self.assertions.assert(&request).await
    }

    /// Condensed view of the current elements. Later [`diff`](Self::diff)
    /// calls report changes relative to it.
    pub fn snapshot(&self) -> SemanticSnapshot {
        self.page.snapshot(self.index.snapshot())
    }

    /// Plain-text page description suitable for a prompt.
    pub fn summary(&self) -> String {
        self.page.capture(self.index.snapshot()).summary
    }

    /// Changes since the last snapshot or diff; `None` when there is no
    /// earlier one.
    pub fn diff(&self) -> Option<SemanticDiff> {
        self.page.diff(self.index.snapshot())
    }

    /// Changes since a snapshot the caller kept.
    pub fn diff_since(&self, earlier: &SemanticSnapshot) -> SemanticDiff {
        page::diff(earlier, &self.page.capture(self.index.snapshot()))
    }

    /// Check a whole expected page state; every assertion runs.
    pub async fn verify_page_state(
        &self,
        assertions: Vec<AssertionRequest>,
    ) -> Result<BatchAssertionResult, BridgeError> {
        self.assert_batch(&BatchAssertionRequest {
            assertions,
            mode: BatchMode::All,
            stop_on_failure: false,
        })
        .await
    }
}

/// Quote `value` for the instruction grammar, picking a quote it does not contain.
fn quote_value(value: &str) -> Result<String, BridgeError> {
    ['"', '\'', '`']
        .into_iter()
        .find(|q| !value.contains(*q))
        .map(|q| format!("{q}{value}{q}"))
        .ok_or_else(|| {
            BridgeError::InvalidArgument(format!(
                "value {value:?} contains every supported quote character"
            ))
        })
}
