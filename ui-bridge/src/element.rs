//! Element records produced by the binding layer
//!
//! These are the read-only inputs of the engine. The binding layer walks the
//! live interface, tags elements and pushes them into the [`ElementIndex`];
//! nothing in this crate mutates a record after it has been indexed.
//!
//! [`ElementIndex`]: crate::index::ElementIndex

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Deref;

/// Absolute bounding box of an element.
///
/// Only `x`, `y`, `width` and `height` are stored; the edges are derived and
/// written out on serialization so consumers get the full box.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "RectWire", into = "RectWire")]
pub struct ElementRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl ElementRect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn top(&self) -> f64 {
        self.y
    }

    pub fn left(&self) -> f64 {
        self.x
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Euclidean distance between the centres of two boxes.
    pub fn distance_to(&self, other: &ElementRect) -> f64 {
        let (ax, ay) = self.center();
        let (bx, by) = other.center();
        ((ax - bx).powi(2) + (ay - by).powi(2)).sqrt()
    }

    /// True when `other` lies entirely inside this box.
    pub fn contains(&self, other: &ElementRect) -> bool {
        other.left() >= self.left()
            && other.top() >= self.top()
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }
}

#[derive(Serialize, Deserialize)]
struct RectWire {
    x: f64,
    y: f64,
    width: f64,
    height: f64,
    #[serde(default)]
    top: Option<f64>,
    #[serde(default)]
    right: Option<f64>,
    #[serde(default)]
    bottom: Option<f64>,
    #[serde(default)]
    left: Option<f64>,
}

impl From<RectWire> for ElementRect {
    fn from(wire: RectWire) -> Self {
        // derived edges are recomputed, whatever the sender put there
        ElementRect::new(wire.x, wire.y, wire.width, wire.height)
    }
}

impl From<ElementRect> for RectWire {
    fn from(rect: ElementRect) -> Self {
        RectWire {
            x: rect.x,
            y: rect.y,
            width: rect.width,
            height: rect.height,
            top: Some(rect.top()),
            right: Some(rect.right()),
            bottom: Some(rect.bottom()),
            left: Some(rect.left()),
        }
    }
}

/// Current state of a UI element as last observed by the binding layer.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementState {
    pub visible: bool,
    pub enabled: bool,
    #[serde(default)]
    pub focused: bool,
    #[serde(default)]
    pub rect: ElementRect,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checked: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_options: Option<Vec<String>>,
}

/// One discoverable UI element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub element_type: String,
    #[serde(default, skip_serializing_if = "is_empty_string")]
    pub label: Option<String>,
    #[serde(default)]
    pub tag_name: String,
    #[serde(default, skip_serializing_if = "is_empty_string")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "is_empty_string")]
    pub accessible_name: Option<String>,
    #[serde(default)]
    pub actions: Vec<String>,
    pub state: ElementState,
    #[serde(default)]
    pub registered: bool,
}

impl ElementRecord {
    /// Whether the binding layer advertised support for a primitive action.
    /// An empty action list means the binding layer did not say, so anything goes.
    pub fn supports(&self, action: &str) -> bool {
        self.actions.is_empty()
            || self
                .actions
                .iter()
                .any(|a| a.eq_ignore_ascii_case(action))
    }
}

/// An [`ElementRecord`] plus agent-facing metadata attached upstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AIElementRecord {
    #[serde(flatten)]
    pub record: ElementRecord,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default, skip_serializing_if = "is_empty_string")]
    pub purpose: Option<String>,
    #[serde(default)]
    pub suggested_actions: Vec<String>,
    #[serde(default, skip_serializing_if = "is_empty_string")]
    pub semantic_type: Option<String>,
    #[serde(default, skip_serializing_if = "is_empty_string")]
    pub placeholder: Option<String>,
    #[serde(default, skip_serializing_if = "is_empty_string")]
    pub title: Option<String>,
}

impl Deref for AIElementRecord {
    type Target = ElementRecord;

    fn deref(&self) -> &ElementRecord {
        &self.record
    }
}

impl AIElementRecord {
    /// Texts a human would read off the element, most specific first.
    pub fn label_candidates(&self) -> impl Iterator<Item = &str> {
        [
            self.state.text_content.as_deref(),
            self.label.as_deref(),
            self.accessible_name.as_deref(),
            self.placeholder.as_deref(),
        ]
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|s| !s.is_empty())
    }

    /// The best short human name for this element.
    pub fn display_name(&self) -> &str {
        self.label_candidates()
            .next()
            .or_else(|| {
                let d = self.description.trim();
                (!d.is_empty()).then_some(d)
            })
            .unwrap_or(self.id.as_str())
    }

    /// The semantic kind used when talking about the element: role, then type.
    pub fn kind(&self) -> &str {
        self.role
            .as_deref()
            .filter(|r| !r.is_empty())
            .unwrap_or(self.element_type.as_str())
    }
}

impl fmt::Display for AIElementRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} '{}'", self.kind(), self.display_name())
    }
}

impl From<ElementRecord> for AIElementRecord {
    fn from(record: ElementRecord) -> Self {
        let mut element = AIElementRecord {
            record,
            description: String::new(),
            aliases: Vec::new(),
            purpose: None,
            suggested_actions: Vec::new(),
            semantic_type: None,
            placeholder: None,
            title: None,
        };
        element.description = format!("{} {}", element.kind(), element.display_name());
        element.suggested_actions = element.record.actions.clone();
        element
    }
}

fn is_empty_string(opt: &Option<String>) -> bool {
    match opt {
        Some(s) => s.is_empty(),
        None => true,
    }
}
