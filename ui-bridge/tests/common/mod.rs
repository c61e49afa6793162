#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use ui_bridge::{
    AIElementRecord, ActionExecutor, ActionOutcome, ActionRequest, BridgeConfig, BridgeError,
    ElementRecord, ElementRect, ElementState, UiBridge, WaitConditions, WaitOutcome,
};

pub fn init_tracing() {
    ui_bridge::logging::init_tracing();
}

/// Records every dispatched action and answers from a script.
#[derive(Default)]
pub struct MockExecutor {
    pub calls: Mutex<Vec<(String, ActionRequest)>>,
    /// Element ids whose actions report `success: false`.
    pub rejecting: Mutex<HashSet<String>>,
    /// Element ids whose actions fail at the binding level.
    pub broken: Mutex<HashSet<String>>,
    /// Element ids covered by another element, with what covers them.
    pub obscured: Mutex<HashMap<String, String>>,
    /// Applied to every call, waits included.
    pub delay: Option<Duration>,
}

impl MockExecutor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay: Some(delay),
            ..Default::default()
        })
    }

    pub fn reject(&self, id: &str) {
        self.rejecting.lock().unwrap().insert(id.to_string());
    }

    pub fn break_element(&self, id: &str) {
        self.broken.lock().unwrap().insert(id.to_string());
    }

    pub fn obscure(&self, id: &str, by: &str) {
        self.obscured
            .lock()
            .unwrap()
            .insert(id.to_string(), by.to_string());
    }

    pub fn calls(&self) -> Vec<(String, ActionRequest)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl ActionExecutor for MockExecutor {
    async fn execute_action(
        &self,
        element_id: &str,
        request: &ActionRequest,
    ) -> Result<ActionOutcome, BridgeError> {
        self.calls
            .lock()
            .unwrap()
            .push((element_id.to_string(), request.clone()));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(by) = self.obscured.lock().unwrap().get(element_id) {
            return Err(BridgeError::ElementObscured(by.clone()));
        }
        if self.broken.lock().unwrap().contains(element_id) {
            return Err(BridgeError::ElementNotVisible(element_id.to_string()));
        }
        if self.rejecting.lock().unwrap().contains(element_id) {
            return Ok(ActionOutcome::failed("click intercepted by overlay"));
        }
        Ok(ActionOutcome::succeeded(Some(ElementState {
            visible: true,
            enabled: true,
            focused: true,
            ..Default::default()
        })))
    }

    async fn wait_for(
        &self,
        _element_id: &str,
        _conditions: &WaitConditions,
    ) -> Result<WaitOutcome, BridgeError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(WaitOutcome {
            met: true,
            state: None,
        })
    }
}

pub fn element(id: &str, role: &str, text: &str) -> AIElementRecord {
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
            rect: ElementRect::new(0.0, 0.0, 100.0, 30.0),
            text_content: Some(text.to_string()),
            ..Default::default()
        },
        registered: true,
    }
    .into()
}

/// A small sign-in page.
pub fn login_page() -> Vec<AIElementRecord> {
    let mut url = element("url-input", "input", "");
    url.record.label = Some("URL".to_string());
    url.aliases = vec!["URL input".to_string(), "address bar".to_string()];

    let mut remember = element("remember", "checkbox", "Remember me");
    remember.record.state.checked = Some(false);

    let mut submit = element("submit-btn", "button", "Submit");
    submit.record.element_type = "submit-button".to_string();

    vec![
        element("title", "heading", "Sign in"),
        url,
        element("start-btn", "button", "Start Extraction"),
        remember,
        submit,
        element("cancel-btn", "button", "Cancel"),
    ]
}

pub fn bridge(executor: Arc<MockExecutor>) -> UiBridge {
    let mut config = BridgeConfig::default();
    config.assertion.default_timeout_ms = 0;
    let bridge = UiBridge::new(executor, config).unwrap();
    bridge.update_elements(login_page());
    bridge
}
