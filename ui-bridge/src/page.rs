//! Semantic page snapshots and diffs
//!
//! A snapshot condenses the element index into what an agent reads before
//! choosing a next step: counts, focus, open dialogs, and a compact listing in
//! the `[kind] name #id (context)` form. Diffs compare two snapshots by
//! element id.

use crate::element::AIElementRecord;
use crate::index::Snapshot;
use crate::recovery::is_blocker;
use crate::similarity;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;
use tracing::debug;

const CLOSE_WORDS: [&str; 7] = ["close", "cancel", "dismiss", "x", "×", "no thanks", "not now"];

/// Names listed per side in a diff summary before eliding the rest.
const SUMMARY_NAMES: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementBrief {
    pub element_id: String,
    pub description: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub semantic_type: Option<String>,
}

impl From<&AIElementRecord> for ElementBrief {
    fn from(element: &AIElementRecord) -> Self {
        Self {
            element_id: element.id.clone(),
            description: element.to_string(),
            kind: element.kind().to_string(),
            semantic_type: element.semantic_type.clone(),
        }
    }
}

/// An open dialog, modal or popup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModalState {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(rename = "type")]
    pub modal_type: String,
    pub blocking: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub close_button: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_action: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SemanticSnapshot {
    pub snapshot_id: String,
    pub timestamp: i64,
    pub total_elements: usize,
    pub visible_elements: usize,
    /// Visible elements per kind.
    pub element_counts: BTreeMap<String, usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub focused_element: Option<String>,
    pub active_modals: Vec<ModalState>,
    pub elements: Vec<ElementBrief>,
    pub summary: String,
    #[serde(skip)]
    source: Snapshot,
}

impl SemanticSnapshot {
    /// Condense `elements` into a snapshot named `snapshot_id`.
    pub fn build(snapshot_id: impl Into<String>, elements: Snapshot) -> Self {
        let visible: Vec<&AIElementRecord> = elements.iter().filter(|e| e.state.visible).collect();

        let mut element_counts = BTreeMap::new();
        for element in &visible {
            *element_counts.entry(element.kind().to_lowercase()).or_insert(0) += 1;
        }
        let active_modals: Vec<ModalState> = visible
            .iter()
            .filter(|e| is_blocker(e))
            .map(|modal| modal_state(modal, &visible))
            .collect();

        let mut snapshot = Self {
            snapshot_id: snapshot_id.into(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            total_elements: elements.len(),
            visible_elements: visible.len(),
            element_counts,
            focused_element: visible.iter().find(|e| e.state.focused).map(|e| e.id.clone()),
            active_modals,
            elements: visible.iter().map(|e| ElementBrief::from(*e)).collect(),
            summary: String::new(),
            source: Snapshot::default(),
        };
        snapshot.summary = render_summary(&snapshot, &visible);
        snapshot.source = elements;
        snapshot
    }

    /// The element records this snapshot was built from.
    pub fn records(&self) -> &[AIElementRecord] {
        &self.source
    }
}

fn modal_state(modal: &AIElementRecord, visible: &[&AIElementRecord]) -> ModalState {
    let buttons: Vec<&AIElementRecord> = visible
        .iter()
        .copied()
        .filter(|e| e.id != modal.id && e.kind().eq_ignore_ascii_case("button"))
        .filter(|e| modal.state.rect.contains(&e.state.rect))
        .collect();

    let kind = modal.kind().to_lowercase();
    ModalState {
        id: modal.id.clone(),
        title: modal.label_candidates().next().map(str::to_string),
        blocking: !kind.contains("popup") && !modal.element_type.to_lowercase().contains("popup"),
        modal_type: kind,
        close_button: buttons.iter().find(|e| is_close(e)).map(|e| e.id.clone()),
        primary_action: buttons.iter().find(|e| !is_close(e)).map(|e| e.id.clone()),
    }
}

fn is_close(button: &AIElementRecord) -> bool {
    let name = similarity::normalize(button.display_name());
    CLOSE_WORDS.contains(&name.as_str())
}

/// `[kind] name #id (context)`, one line per element.
fn compact_line(element: &AIElementRecord) -> String {
    let mut line = format!("- [{}] {} #{}", element.kind(), element.display_name(), element.id);

    let state = &element.state;
    let mut context = Vec::new();
    if !state.enabled {
        context.push("disabled".to_string());
    }
    if state.focused {
        context.push("focused".to_string());
    }
    match state.checked {
        Some(true) => context.push("checked".to_string()),
        Some(false) => context.push("unchecked".to_string()),
        None => {}
    }
    if let Some(value) = state.value.as_deref().filter(|v| !v.is_empty()) {
        context.push(format!("value: {value}"));
    }
    if !context.is_empty() {
        line.push_str(&format!(" ({})", context.join(", ")));
    }
    line
}

fn render_summary(snapshot: &SemanticSnapshot, visible: &[&AIElementRecord]) -> String {
    let counts: Vec<String> = snapshot
        .element_counts
        .iter()
        .map(|(kind, n)| format!("{kind}: {n}"))
        .collect();
    let mut lines = vec![format!(
        "{} of {} elements visible ({})",
        snapshot.visible_elements,
        snapshot.total_elements,
        if counts.is_empty() {
            "none".to_string()
        } else {
            counts.join(", ")
        }
    )];

    if let Some(focused) = visible.iter().find(|e| e.state.focused) {
        lines.push(format!("Focused: {focused} #{}", focused.id));
    }
    for modal in snapshot.active_modals.iter().filter(|m| m.blocking) {
        let mut line = format!(
            "Blocked by {} #{}",
            modal.title.as_deref().unwrap_or(&modal.modal_type),
            modal.id
        );
        if let Some(close) = &modal.close_button {
            line.push_str(&format!(", close with #{close}"));
        }
        lines.push(line);
    }
    lines.extend(visible.iter().map(|e| compact_line(e)));
    lines.join("\n")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementModification {
    pub element_id: String,
    pub description: String,
    pub property: String,
    pub from: String,
    pub to: String,
    /// Changes that alter what an agent can do with the element.
    pub significant: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffChanges {
    pub appeared: Vec<ElementBrief>,
    pub disappeared: Vec<ElementBrief>,
    pub modified: Vec<ElementModification>,
}

impl DiffChanges {
    pub fn is_empty(&self) -> bool {
        self.appeared.is_empty() && self.disappeared.is_empty() && self.modified.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SemanticDiff {
    pub summary: String,
    pub from_snapshot_id: String,
    pub to_snapshot_id: String,
    pub changes: DiffChanges,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggested_actions: Vec<String>,
    pub duration_ms: f64,
    pub timestamp: i64,
}

/// What changed between two snapshots, matched by element id.
pub fn diff(from: &SemanticSnapshot, to: &SemanticSnapshot) -> SemanticDiff {
    let started = Instant::now();
    let before: HashMap<&str, &AIElementRecord> =
        from.records().iter().map(|e| (e.id.as_str(), e)).collect();
    let after: HashMap<&str, &AIElementRecord> =
        to.records().iter().map(|e| (e.id.as_str(), e)).collect();

    let mut changes = DiffChanges::default();
    let mut suggested_actions = Vec::new();
    for element in to.records() {
        match before.get(element.id.as_str()) {
            None => {
                if element.state.visible && is_blocker(element) {
                    suggested_actions.push(format!("Handle {element} before continuing"));
                }
                changes.appeared.push(element.into());
            }
            Some(old) => {
                for change in modifications(old, element) {
                    if change.property == "enabled" && change.to == "true" {
                        suggested_actions.push(format!("{element} is now enabled"));
                    }
                    changes.modified.push(change);
                }
            }
        }
    }
    changes.disappeared = from
        .records()
        .iter()
        .filter(|e| !after.contains_key(e.id.as_str()))
        .map(ElementBrief::from)
        .collect();

    let summary = diff_summary(&changes);
    debug!(%summary, from = %from.snapshot_id, to = %to.snapshot_id, "Computed page diff");
    SemanticDiff {
        summary,
        from_snapshot_id: from.snapshot_id.clone(),
        to_snapshot_id: to.snapshot_id.clone(),
        changes,
        suggested_actions,
        duration_ms: started.elapsed().as_secs_f64() * 1000.0,
        timestamp: chrono::Utc::now().timestamp_millis(),
    }
}

fn modifications(old: &AIElementRecord, new: &AIElementRecord) -> Vec<ElementModification> {
    let flag = |b: bool| b.to_string();
    let text = |s: Option<&str>| s.unwrap_or_default().trim().to_string();
    let checked = |c: Option<bool>| c.map(flag).unwrap_or_default();
    let (a, b) = (&old.state, &new.state);

    let properties = [
        ("visible", flag(a.visible), flag(b.visible), true),
        ("enabled", flag(a.enabled), flag(b.enabled), true),
        ("checked", checked(a.checked), checked(b.checked), true),
        ("focused", flag(a.focused), flag(b.focused), false),
        ("value", text(a.value.as_deref()), text(b.value.as_deref()), false),
        (
            "text",
            text(a.text_content.as_deref()),
            text(b.text_content.as_deref()),
            false,
        ),
    ];
    properties
        .into_iter()
        .filter(|(_, from, to, _)| from != to)
        .map(|(property, from, to, significant)| ElementModification {
            element_id: new.id.clone(),
            description: new.to_string(),
            property: property.to_string(),
            from,
            to,
            significant,
        })
        .collect()
}

fn diff_summary(changes: &DiffChanges) -> String {
    if changes.is_empty() {
        return "No changes".to_string();
    }
    let names = |briefs: &[ElementBrief]| {
        let mut shown: Vec<&str> = briefs
            .iter()
            .take(SUMMARY_NAMES)
            .map(|b| b.description.as_str())
            .collect();
        let hidden = briefs.len().saturating_sub(SUMMARY_NAMES);
        let more = format!("{hidden} more");
        if hidden > 0 {
            shown.push(&more);
        }
        shown.join(", ")
    };

    let mut parts = Vec::new();
    if !changes.appeared.is_empty() {
        parts.push(format!(
            "{} appeared ({})",
            changes.appeared.len(),
            names(&changes.appeared)
        ));
    }
    if !changes.disappeared.is_empty() {
        parts.push(format!(
            "{} disappeared ({})",
            changes.disappeared.len(),
            names(&changes.disappeared)
        ));
    }
    if !changes.modified.is_empty() {
        parts.push(format!("{} modified", changes.modified.len()));
    }
    parts.join("; ")
}

/// Numbers snapshots and remembers the last one recorded so the next call can
/// report what changed since.
#[derive(Debug, Default)]
pub struct PageObserver {
    next_id: AtomicU64,
    last: Mutex<Option<SemanticSnapshot>>,
}

impl PageObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a snapshot without recording it.
    pub fn capture(&self, elements: Snapshot) -> SemanticSnapshot {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        SemanticSnapshot::build(format!("snap-{id}"), elements)
    }

    /// Build a snapshot and make it the baseline for the next [`diff`](Self::diff).
    pub fn snapshot(&self, elements: Snapshot) -> SemanticSnapshot {
        let snapshot = self.capture(elements);
        *self.lock_last() = Some(snapshot.clone());
        snapshot
    }

    /// Changes since the last recorded snapshot, which is then replaced by the
    /// current state. `None` on the first call.
    pub fn diff(&self, elements: Snapshot) -> Option<SemanticDiff> {
        let current = self.capture(elements);
        let previous = self.lock_last().replace(current.clone());
        previous.map(|previous| diff(&previous, &current))
    }

    fn lock_last(&self) -> std::sync::MutexGuard<'_, Option<SemanticSnapshot>> {
        match self.last.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
