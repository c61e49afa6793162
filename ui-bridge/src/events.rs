//! Observer hooks for engine activity
//!
//! Listeners are plain callbacks invoked synchronously on the emitting call.
//! Each invocation runs under `catch_unwind`, so a panicking listener is
//! logged and skipped without affecting other listeners or the engine.

use serde::Serialize;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum BridgeEvent {
    #[serde(rename_all = "camelCase")]
    ElementsUpdated { count: usize },
    #[serde(rename_all = "camelCase")]
    SearchCompleted {
        criteria: String,
        result_count: usize,
        best_confidence: Option<f64>,
    },
    #[serde(rename_all = "camelCase")]
    ActionExecuted {
        instruction: String,
        success: bool,
        element_id: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    AssertionEvaluated {
        target: String,
        assertion: String,
        passed: bool,
    },
}

pub type ListenerId = u64;

type Listener = Arc<dyn Fn(&BridgeEvent) + Send + Sync>;

#[derive(Default)]
pub struct EventBus {
    listeners: RwLock<Vec<(ListenerId, Listener)>>,
    next_id: AtomicU64,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, listener: impl Fn(&BridgeEvent) + Send + Sync + 'static) -> ListenerId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut listeners = match self.listeners.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        listeners.push((id, Arc::new(listener)));
        id
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = match self.listeners.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        match self.listeners.read() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn emit(&self, event: &BridgeEvent) {
        // copy out so listeners may (un)subscribe without deadlocking
        let listeners: Vec<(ListenerId, Listener)> = match self.listeners.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        for (id, listener) in listeners {
            if catch_unwind(AssertUnwindSafe(|| listener(event))).is_err() {
                warn!(listener = id, ?event, "Event listener panicked; ignoring");
            }
        }
    }
}

/// Emit on an optional bus.
pub(crate) fn emit(bus: &Option<Arc<EventBus>>, event: impl FnOnce() -> BridgeEvent) {
    if let Some(bus) = bus {
        bus.emit(&event());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_panicking_listener_does_not_stop_others() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        bus.subscribe(|_| panic!("listener bug"));
        let sink = seen.clone();
        bus.subscribe(move |e| sink.lock().unwrap().push(e.clone()));

        bus.emit(&BridgeEvent::ElementsUpdated { count: 3 });
        bus.emit(&BridgeEvent::ElementsUpdated { count: 4 });

        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_unsubscribe() {
        let bus = EventBus::new();
        let id = bus.subscribe(|_| {});
        assert_eq!(bus.listener_count(), 1);
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        assert_eq!(bus.listener_count(), 0);
    }

    #[test]
    fn test_event_wire_shape() {
        let json = serde_json::to_value(BridgeEvent::SearchCompleted {
            criteria: "text 'Go'".into(),
            result_count: 1,
            best_confidence: Some(1.0),
        })
        .unwrap();
        assert_eq!(json["type"], "searchCompleted");
        assert_eq!(json["resultCount"], 1);
    }
}
