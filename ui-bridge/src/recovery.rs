//! Failure context and recovery suggestions
//!
//! Every failure handed back to a caller carries enough context to pick the
//! next step without another query: what was attempted, what came closest,
//! what is on screen, and a ranked list of things to try.

use crate::criteria::SearchCriteria;
use crate::element::AIElementRecord;
use crate::errors::ErrorCode;
use crate::search::MatchResult;
use serde::{Deserialize, Serialize};

/// Confidence given to suggestions that are not backed by a match score.
const GUIDANCE_CONFIDENCE: f64 = 0.1;
/// Confidence given to same-kind alternatives.
const ALTERNATIVE_CONFIDENCE: f64 = 0.3;
const MAX_ALTERNATIVES: usize = 3;

const BLOCKER_KINDS: [&str; 5] = ["dialog", "alertdialog", "modal", "overlay", "popup"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryStrategy {
    WaitVisible,
    ScrollIntoView,
    WaitEnabled,
    DismissOverlay,
    AlternativeElement,
    Refresh,
    Retry,
}

impl RecoveryStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecoveryStrategy::WaitVisible => "wait_visible",
            RecoveryStrategy::ScrollIntoView => "scroll_into_view",
            RecoveryStrategy::WaitEnabled => "wait_enabled",
            RecoveryStrategy::DismissOverlay => "dismiss_overlay",
            RecoveryStrategy::AlternativeElement => "alternative_element",
            RecoveryStrategy::Refresh => "refresh",
            RecoveryStrategy::Retry => "retry",
        }
    }

    fn advice(&self) -> &'static str {
        match self {
            RecoveryStrategy::WaitVisible => "Wait for the element to become visible",
            RecoveryStrategy::ScrollIntoView => "Scroll the element into view and try again",
            RecoveryStrategy::WaitEnabled => "Wait for the element to become enabled",
            RecoveryStrategy::DismissOverlay => "Close the dialog or overlay covering the page",
            RecoveryStrategy::AlternativeElement => "Describe the target differently or use its id",
            RecoveryStrategy::Refresh => "Refresh the element list; the page may have changed",
            RecoveryStrategy::Retry => "Retry the action, possibly with a longer timeout",
        }
    }

    /// Strategies worth trying for a given failure, most useful first.
    pub fn for_code(code: ErrorCode) -> &'static [RecoveryStrategy] {
        use RecoveryStrategy::*;
        match code {
            ErrorCode::ElementNotFound | ErrorCode::LowConfidence => {
                &[AlternativeElement, Refresh]
            }
            ErrorCode::ElementNotVisible => &[WaitVisible, ScrollIntoView, DismissOverlay],
            ErrorCode::ElementNotEnabled => &[WaitEnabled],
            ErrorCode::ActionFailed => &[ScrollIntoView, DismissOverlay, Retry],
            ErrorCode::Timeout => &[Retry, Refresh],
            ErrorCode::AssertionFailed => &[Refresh, Retry],
            ErrorCode::ParseFailed => &[],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoverySuggestion {
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    pub confidence: f64,
    /// 1 is the most promising.
    pub priority: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NearestMatch {
    pub element: AIElementRecord,
    pub confidence: f64,
    pub why_not_selected: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResultsSummary {
    pub candidates_found: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nearest_match: Option<NearestMatch>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageContext {
    pub visible_elements: usize,
    pub total_elements: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub possible_blockers: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorContext {
    pub code: ErrorCode,
    pub message: String,
    pub attempted_action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_criteria: Option<SearchCriteria>,
    pub search_results: SearchResultsSummary,
    pub page_context: PageContext,
    pub suggestions: Vec<RecoverySuggestion>,
    pub timestamp: i64,
}

impl ErrorContext {
    /// Suggestions as plain sentences, best first.
    pub fn suggestion_texts(&self) -> Vec<String> {
        self.suggestions.iter().map(|s| s.action.clone()).collect()
    }

    /// Record a blocker the binding layer reported directly and put closing it
    /// ahead of the other strategies.
    pub fn with_blocker(mut self, blocker: impl Into<String>) -> Self {
        let blocker = blocker.into();
        if !self.page_context.possible_blockers.contains(&blocker) {
            self.page_context.possible_blockers.push(blocker);
        }

        let strategy = RecoveryStrategy::DismissOverlay;
        self.suggestions
            .retain(|s| s.command.as_deref() != Some(strategy.as_str()));
        let at = self
            .suggestions
            .iter()
            .position(|s| s.command.is_some() && s.priority >= 4)
            .unwrap_or(self.suggestions.len());
        self.suggestions.insert(
            at,
            RecoverySuggestion {
                action: format!(
                    "{} ({})",
                    strategy.advice(),
                    self.page_context.possible_blockers.join(", ")
                ),
                command: Some(strategy.as_str().to_string()),
                confidence: GUIDANCE_CONFIDENCE,
                priority: 4,
            },
        );
        self
    }
}

pub fn create_error_context(
    code: ErrorCode,
    attempted_action: &str,
    all_elements: &[AIElementRecord],
    criteria: Option<&SearchCriteria>,
    nearest_match: Option<&MatchResult>,
) -> ErrorContext {
    let page_context = page_context(all_elements);
    let message = message_for(code, attempted_action, criteria, nearest_match);

    let mut suggestions = Vec::new();
    if code.is_resolution_failure() {
        if let Some(nearest) = nearest_match {
            suggestions.push(RecoverySuggestion {
                action: format!(
                    "Did you mean {}? ({:.0}% match)",
                    nearest.element,
                    nearest.confidence * 100.0
                ),
                command: Some(format!("#{}", nearest.element.id)),
                confidence: nearest.confidence,
                priority: 1,
            });
        }

        for alternative in same_kind_alternatives(all_elements, criteria, nearest_match) {
            suggestions.push(RecoverySuggestion {
                action: format!("Try {alternative}"),
                command: Some(format!("#{}", alternative.id)),
                confidence: ALTERNATIVE_CONFIDENCE,
                priority: 2,
            });
        }

        let query = criteria
            .and_then(|c| c.text.as_deref().or(c.text_contains.as_deref()))
            .unwrap_or(attempted_action);
        suggestions.push(RecoverySuggestion {
            action: format!("Check the spelling of '{query}'"),
            command: None,
            confidence: GUIDANCE_CONFIDENCE,
            priority: 3,
        });
        suggestions.push(RecoverySuggestion {
            action: "Verify the element is rendered and visible".to_string(),
            command: None,
            confidence: GUIDANCE_CONFIDENCE,
            priority: 3,
        });
    }

    for strategy in RecoveryStrategy::for_code(code) {
        if *strategy == RecoveryStrategy::DismissOverlay && page_context.possible_blockers.is_empty()
        {
            continue;
        }
        let action = match strategy {
            RecoveryStrategy::DismissOverlay => format!(
                "{} ({})",
                strategy.advice(),
                page_context.possible_blockers.join(", ")
            ),
            _ => strategy.advice().to_string(),
        };
        suggestions.push(RecoverySuggestion {
            action,
            command: Some(strategy.as_str().to_string()),
            confidence: GUIDANCE_CONFIDENCE,
            priority: 4,
        });
    }

    ErrorContext {
        code,
        message,
        attempted_action: attempted_action.to_string(),
        search_criteria: criteria.cloned(),
        search_results: SearchResultsSummary {
            candidates_found: usize::from(nearest_match.is_some()),
            nearest_match: nearest_match.map(|m| NearestMatch {
                element: m.element.clone(),
                confidence: m.confidence,
                why_not_selected: why_not_selected(code, m),
            }),
        },
        page_context,
        suggestions,
        timestamp: chrono::Utc::now().timestamp_millis(),
    }
}

fn page_context(all_elements: &[AIElementRecord]) -> PageContext {
    let possible_blockers = all_elements
        .iter()
        .filter(|e| e.state.visible && is_blocker(e))
        .map(|e| e.to_string())
        .collect();
    PageContext {
        visible_elements: all_elements.iter().filter(|e| e.state.visible).count(),
        total_elements: all_elements.len(),
        possible_blockers,
    }
}

pub(crate) fn is_blocker(element: &AIElementRecord) -> bool {
    let kind = element.kind().to_lowercase();
    let element_type = element.element_type.to_lowercase();
    BLOCKER_KINDS
        .iter()
        .any(|b| kind == *b || element_type.contains(b))
}

fn same_kind_alternatives<'a>(
    all_elements: &'a [AIElementRecord],
    criteria: Option<&SearchCriteria>,
    nearest_match: Option<&MatchResult>,
) -> impl Iterator<Item = &'a AIElementRecord> {
    let kind = criteria
        .and_then(|c| c.role.clone().or_else(|| c.element_type.clone()))
        .or_else(|| nearest_match.map(|m| m.element.kind().to_string()));
    let skip_id = nearest_match.map(|m| m.element.id.clone());

    all_elements
        .iter()
        .filter(move |e| {
            let Some(kind) = &kind else {
                return false;
            };
            e.state.visible
                && skip_id.as_deref() != Some(e.id.as_str())
                && (e.kind().eq_ignore_ascii_case(kind)
                    || e.element_type.eq_ignore_ascii_case(kind))
        })
        .take(MAX_ALTERNATIVES)
}

fn message_for(
    code: ErrorCode,
    attempted_action: &str,
    criteria: Option<&SearchCriteria>,
    nearest_match: Option<&MatchResult>,
) -> String {
    let target = criteria
        .map(SearchCriteria::describe)
        .unwrap_or_else(|| "the target".to_string());
    match (code, nearest_match) {
        (ErrorCode::LowConfidence, Some(nearest)) => format!(
            "'{attempted_action}' failed: best candidate for {target} was {} at {:.2} confidence, which is too low",
            nearest.element, nearest.confidence
        ),
        (ErrorCode::ElementNotFound, _) | (ErrorCode::LowConfidence, None) => {
            format!("'{attempted_action}' failed: no element matches {target}")
        }
        (ErrorCode::ParseFailed, _) => {
            format!("'{attempted_action}' is not a recognized instruction")
        }
        (ErrorCode::Timeout, _) => format!("'{attempted_action}' timed out"),
        (ErrorCode::ElementNotVisible, _) => {
            format!("'{attempted_action}' failed: {target} is not visible")
        }
        (ErrorCode::ElementNotEnabled, _) => {
            format!("'{attempted_action}' failed: {target} is disabled")
        }
        (ErrorCode::AssertionFailed, _) => format!("Assertion on {target} failed"),
        (ErrorCode::ActionFailed, _) => format!("'{attempted_action}' failed on {target}"),
    }
}

fn why_not_selected(code: ErrorCode, nearest: &MatchResult) -> String {
    match code {
        ErrorCode::LowConfidence | ErrorCode::ElementNotFound => format!(
            "confidence {:.2} is below the required threshold",
            nearest.confidence
        ),
        _ => format!("it was selected, but the action failed ({code})"),
    }
}
