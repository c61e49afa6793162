//! Boundary to the binding layer that actually performs primitive actions

use crate::element::ElementState;
use crate::errors::BridgeError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionRequest {
    /// Primitive verb, e.g. `click`, `type`, `select`.
    pub action: String,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub params: serde_json::Value,
}

impl ActionRequest {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            params: serde_json::Value::Null,
        }
    }

    pub fn with_params(mut self, params: serde_json::Value) -> Self {
        self.params = params;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element_state: Option<ElementState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ActionOutcome {
    pub fn succeeded(element_state: Option<ElementState>) -> Self {
        Self {
            success: true,
            element_state,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            element_state: None,
            error: Some(error.into()),
        }
    }
}

/// Pre-conditions to wait for before acting on an element.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaitConditions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visible: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl WaitConditions {
    pub fn is_empty(&self) -> bool {
        self.visible.is_none() && self.enabled.is_none()
    }

    /// Whether `state` already satisfies every requested condition.
    pub fn is_met_by(&self, state: &ElementState) -> bool {
        self.visible.map_or(true, |v| state.visible == v)
            && self.enabled.map_or(true, |e| state.enabled == e)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaitOutcome {
    pub met: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<ElementState>,
}

/// Performs primitive actions on elements identified by id.
///
/// `Err` is reserved for failures of the binding itself (transport gone,
/// element detached); an action the element refused is an `Ok` outcome with
/// `success: false`.
#[async_trait::async_trait]
pub trait ActionExecutor: Send + Sync {
    async fn execute_action(
        &self,
        element_id: &str,
        request: &ActionRequest,
    ) -> Result<ActionOutcome, BridgeError>;

    async fn wait_for(
        &self,
        element_id: &str,
        conditions: &WaitConditions,
    ) -> Result<WaitOutcome, BridgeError>;
}
