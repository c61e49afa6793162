//! A small, bounded grammar for imperative UI instructions
//!
//! ```text
//! click|double click|right click|hover|focus|check|uncheck|clear|scroll to <target>
//! type|enter <value> into <target>
//! select|choose <value> from <target>
//! ```
//!
//! plus trailing modifiers `holding shift|ctrl|alt|meta` and `and press enter`.

use crate::similarity;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ActionVerb {
    Click,
    DoubleClick,
    RightClick,
    Type,
    Check,
    Uncheck,
    Select,
    Clear,
    Focus,
    Hover,
    ScrollTo,
}

impl ActionVerb {
    pub const ALL: [ActionVerb; 11] = [
        ActionVerb::Click,
        ActionVerb::DoubleClick,
        ActionVerb::RightClick,
        ActionVerb::Type,
        ActionVerb::Check,
        ActionVerb::Uncheck,
        ActionVerb::Select,
        ActionVerb::Clear,
        ActionVerb::Focus,
        ActionVerb::Hover,
        ActionVerb::ScrollTo,
    ];

    /// Primitive action name sent across the executor boundary.
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionVerb::Click => "click",
            ActionVerb::DoubleClick => "doubleClick",
            ActionVerb::RightClick => "rightClick",
            ActionVerb::Type => "type",
            ActionVerb::Check => "check",
            ActionVerb::Uncheck => "uncheck",
            ActionVerb::Select => "select",
            ActionVerb::Clear => "clear",
            ActionVerb::Focus => "focus",
            ActionVerb::Hover => "hover",
            ActionVerb::ScrollTo => "scrollIntoView",
        }
    }

    /// How the verb is written in an instruction.
    pub fn phrase(&self) -> &'static str {
        match self {
            ActionVerb::Click => "click",
            ActionVerb::DoubleClick => "double click",
            ActionVerb::RightClick => "right click",
            ActionVerb::Type => "type",
            ActionVerb::Check => "check",
            ActionVerb::Uncheck => "uncheck",
            ActionVerb::Select => "select",
            ActionVerb::Clear => "clear",
            ActionVerb::Focus => "focus",
            ActionVerb::Hover => "hover",
            ActionVerb::ScrollTo => "scroll to",
        }
    }

    pub fn past_tense(&self) -> &'static str {
        match self {
            ActionVerb::Click => "Clicked",
            ActionVerb::DoubleClick => "Double-clicked",
            ActionVerb::RightClick => "Right-clicked",
            ActionVerb::Type => "Typed",
            ActionVerb::Check => "Checked",
            ActionVerb::Uncheck => "Unchecked",
            ActionVerb::Select => "Selected",
            ActionVerb::Clear => "Cleared",
            ActionVerb::Focus => "Focused",
            ActionVerb::Hover => "Hovered over",
            ActionVerb::ScrollTo => "Scrolled to",
        }
    }

    /// Template showing the argument shape, used in parse-failure suggestions.
    pub fn usage(&self) -> &'static str {
        match self {
            ActionVerb::Type => "type <value> into <target>",
            ActionVerb::Select => "select <option> from <target>",
            ActionVerb::Click => "click <target>",
            ActionVerb::DoubleClick => "double click <target>",
            ActionVerb::RightClick => "right click <target>",
            ActionVerb::Check => "check <target>",
            ActionVerb::Uncheck => "uncheck <target>",
            ActionVerb::Clear => "clear <target>",
            ActionVerb::Focus => "focus <target>",
            ActionVerb::Hover => "hover <target>",
            ActionVerb::ScrollTo => "scroll to <target>",
        }
    }

    pub fn takes_value(&self) -> bool {
        matches!(self, ActionVerb::Type | ActionVerb::Select)
    }

    fn strips_generic_nouns(&self) -> bool {
        matches!(
            self,
            ActionVerb::Click
                | ActionVerb::DoubleClick
                | ActionVerb::RightClick
                | ActionVerb::Check
                | ActionVerb::Uncheck
                | ActionVerb::Focus
                | ActionVerb::Hover
        )
    }

    fn from_keyword(keyword: &str) -> Option<Self> {
        let keyword = similarity::normalize(&keyword.replace('-', " "));
        let verb = match keyword.as_str() {
            "click" | "click on" | "press" | "tap" | "tap on" => ActionVerb::Click,
            "double click" | "doubleclick" => ActionVerb::DoubleClick,
            "right click" | "rightclick" => ActionVerb::RightClick,
            "type" | "enter" | "fill in" => ActionVerb::Type,
            "check" => ActionVerb::Check,
            "uncheck" => ActionVerb::Uncheck,
            "select" | "choose" => ActionVerb::Select,
            "clear" => ActionVerb::Clear,
            "focus" | "focus on" => ActionVerb::Focus,
            "hover" | "hover over" | "hover on" => ActionVerb::Hover,
            "scroll to" => ActionVerb::ScrollTo,
            _ => return None,
        };
        Some(verb)
    }
}

impl fmt::Display for ActionVerb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.phrase())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedInstruction {
    pub action: ActionVerb,
    pub target_description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub modifiers: BTreeSet<String>,
}

static VERB_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?is)^\s*(double[\s-]?click|right[\s-]?click|scroll\s+to|click\s+on|click|press|tap\s+on|tap|type|enter|fill\s+in|uncheck|check|select|choose|clear|focus\s+on|focus|hover\s+over|hover\s+on|hover)\b\s*(.*)$",
    )
    .expect("verb regex is valid")
});

static HOLDING_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\s+(?:while\s+)?holding\s+((?:shift|ctrl|control|alt|option|meta|cmd|command)(?:\s*(?:\+|,|and)\s*(?:shift|ctrl|control|alt|option|meta|cmd|command))*)\s*$",
    )
    .expect("holding regex is valid")
});

static PRESS_ENTER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\s+(?:and|then)\s+(?:press|hit)\s+(enter|return)\s*$")
        .expect("press-enter regex is valid")
});

static KEY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)shift|ctrl|control|alt|option|meta|cmd|command")
        .expect("key regex is valid")
});

const ARTICLES: [&str; 3] = ["the ", "a ", "an "];

const GENERIC_NOUNS: [&str; 7] = [
    "check box",
    "checkbox",
    "button",
    "link",
    "field",
    "icon",
    "toggle",
];

/// Parse one instruction. Returns `None` when no known verb leads the text or
/// the target would be empty.
pub fn parse_nl_instruction(text: &str) -> Option<ParsedInstruction> {
    let captures = VERB_RE.captures(text)?;
    let action = ActionVerb::from_keyword(captures.get(1)?.as_str())?;
    let (rest, modifiers) = take_modifiers(captures.get(2)?.as_str().trim());

    let (value, target) = match action {
        ActionVerb::Type => split_value(&rest, &["into", "in", "to"])?,
        ActionVerb::Select => split_value(&rest, &["from", "in"])?,
        _ => (None, rest),
    };

    let mut target = strip_article(target.trim()).to_string();
    if action.strips_generic_nouns() {
        target = strip_generic_noun(&target).to_string();
    }
    if target.is_empty() {
        return None;
    }

    Some(ParsedInstruction {
        action,
        target_description: target,
        value,
        modifiers,
    })
}

/// Closest known verb to the first word of an unparseable instruction.
pub fn closest_verb(text: &str) -> Option<ActionVerb> {
    let first = text.split_whitespace().next()?.to_lowercase();
    ActionVerb::ALL
        .iter()
        .map(|verb| {
            let head = verb.phrase().split(' ').next().unwrap_or_default();
            (similarity::levenshtein(&first, head), *verb)
        })
        .filter(|(distance, _)| *distance <= 2)
        .min_by_key(|(distance, _)| *distance)
        .map(|(_, verb)| verb)
}

fn take_modifiers(text: &str) -> (String, BTreeSet<String>) {
    let mut rest = text.to_string();
    let mut modifiers = BTreeSet::new();
    loop {
        if let Some(m) = PRESS_ENTER_RE.find(&rest) {
            modifiers.insert("enter".to_string());
            rest.truncate(m.start());
            continue;
        }
        if let Some(caps) = HOLDING_RE.captures(&rest) {
            let start = caps.get(0).map_or(rest.len(), |m| m.start());
            if let Some(keys) = caps.get(1) {
                for key in KEY_RE.find_iter(keys.as_str()) {
                    modifiers.insert(canonical_key(key.as_str()).to_string());
                }
            }
            rest.truncate(start);
            continue;
        }
        break;
    }
    (rest.trim().to_string(), modifiers)
}

fn canonical_key(key: &str) -> &'static str {
    match key.to_lowercase().as_str() {
        "ctrl" | "control" => "ctrl",
        "alt" | "option" => "alt",
        "meta" | "cmd" | "command" => "meta",
        _ => "shift",
    }
}

/// Split `<value> <keyword> <target>`. A quoted value is taken verbatim;
/// a bare value ends at the first keyword, tried in the given order.
fn split_value(text: &str, keywords: &[&str]) -> Option<(Option<String>, String)> {
    let text = text.trim();
    let mut chars = text.chars();
    if let Some(quote @ ('"' | '\'' | '`' | '“')) = chars.next() {
        let closing = if quote == '“' { '”' } else { quote };
        let body = chars.as_str();
        let end = body.find(closing)?;
        let value = body[..end].to_string();
        let after = body[end + closing.len_utf8()..].trim_start();
        let target = keywords
            .iter()
            .find_map(|kw| strip_keyword(after, kw))
            .unwrap_or(after);
        return Some((Some(value), target.to_string()));
    }

    let lower = text.to_lowercase();
    for keyword in keywords {
        let needle = format!(" {keyword} ");
        if let Some(pos) = lower.find(&needle) {
            let value = text[..pos].trim();
            let target = text[pos + needle.len()..].trim();
            if !value.is_empty() {
                return Some((Some(value.to_string()), target.to_string()));
            }
        }
    }
    None
}

fn strip_keyword<'a>(text: &'a str, keyword: &str) -> Option<&'a str> {
    let head = text.get(..keyword.len())?;
    let tail = &text[keyword.len()..];
    (head.eq_ignore_ascii_case(keyword) && tail.starts_with(char::is_whitespace))
        .then(|| tail.trim_start())
}

fn strip_article(text: &str) -> &str {
    for article in ARTICLES {
        if let Some(head) = text.get(..article.len()) {
            let rest = text[article.len()..].trim_start();
            if head.eq_ignore_ascii_case(article) && !rest.is_empty() {
                return rest;
            }
        }
    }
    text
}

fn strip_generic_noun(text: &str) -> &str {
    for noun in GENERIC_NOUNS {
        let Some(split) = text.len().checked_sub(noun.len()) else {
            continue;
        };
        let Some(tail) = text.get(split..) else {
            continue;
        };
        let head = text[..split].trim_end();
        if tail.eq_ignore_ascii_case(noun) && head.len() < split && !head.is_empty() {
            return head;
        }
    }
    text
}
