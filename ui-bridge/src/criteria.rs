use serde::{Deserialize, Serialize};

/// What to look for when ranking elements.
///
/// Every field is optional; an element is scored only on the fields present.
/// Criteria with no discriminating field match nothing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchCriteria {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_contains: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accessible_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub element_type: Option<String>,
    /// Id of a reference element; closer elements score higher.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub near: Option<String>,
    /// Id of a container element; only elements inside its box are considered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub within: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    /// Matched against the element's title (tooltip) text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Regular expression the element id must match.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fuzzy: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fuzzy_threshold: Option<f64>,
}

impl SearchCriteria {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    /// Text search with approximate matching switched on.
    pub fn fuzzy_text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            fuzzy: Some(true),
            ..Default::default()
        }
    }

    pub fn role(role: impl Into<String>) -> Self {
        Self {
            role: Some(role.into()),
            ..Default::default()
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    pub fn with_type(mut self, element_type: impl Into<String>) -> Self {
        self.element_type = Some(element_type.into());
        self
    }

    pub fn with_accessible_name(mut self, name: impl Into<String>) -> Self {
        self.accessible_name = Some(name.into());
        self
    }

    pub fn near(mut self, element_id: impl Into<String>) -> Self {
        self.near = Some(element_id.into());
        self
    }

    pub fn within(mut self, element_id: impl Into<String>) -> Self {
        self.within = Some(element_id.into());
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_id_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.id_pattern = Some(pattern.into());
        self
    }

    pub fn with_fuzzy_threshold(mut self, threshold: f64) -> Self {
        self.fuzzy = Some(true);
        self.fuzzy_threshold = Some(threshold);
        self
    }

    /// True when at least one field can tell elements apart.
    pub fn is_discriminating(&self) -> bool {
        [
            &self.text,
            &self.text_contains,
            &self.accessible_name,
            &self.role,
            &self.element_type,
            &self.near,
            &self.placeholder,
            &self.title,
            &self.id_pattern,
        ]
        .iter()
        .any(|field| field.as_deref().is_some_and(|v| !v.trim().is_empty()))
    }

    /// Short human rendering used in logs and error messages.
    pub fn describe(&self) -> String {
        let mut parts = Vec::new();
        if let Some(text) = &self.text {
            parts.push(format!("text '{text}'"));
        }
        if let Some(text) = &self.text_contains {
            parts.push(format!("text containing '{text}'"));
        }
        if let Some(name) = &self.accessible_name {
            parts.push(format!("accessible name '{name}'"));
        }
        if let Some(role) = &self.role {
            parts.push(format!("role {role}"));
        }
        if let Some(element_type) = &self.element_type {
            parts.push(format!("type {element_type}"));
        }
        if let Some(placeholder) = &self.placeholder {
            parts.push(format!("placeholder '{placeholder}'"));
        }
        if let Some(title) = &self.title {
            parts.push(format!("title '{title}'"));
        }
        if let Some(pattern) = &self.id_pattern {
            parts.push(format!("id matching /{pattern}/"));
        }
        if let Some(near) = &self.near {
            parts.push(format!("near #{near}"));
        }
        if let Some(within) = &self.within {
            parts.push(format!("within #{within}"));
        }
        if parts.is_empty() {
            "<empty criteria>".to_string()
        } else {
            parts.join(", ")
        }
    }
}

/// How a caller names a target: a prefixed selector string, an exact id, or
/// free text.
#[derive(Debug, Clone, PartialEq)]
pub enum TargetSpec {
    Id(String),
    Criteria(SearchCriteria),
    Description(String),
}

impl From<&str> for TargetSpec {
    fn from(s: &str) -> Self {
        let s = s.trim();

        // role|name is the precise form, same as "role:button|name:Submit"
        if let Some((role_part, name_part)) = s.split_once('|') {
            let role = role_part.trim();
            let role = role.strip_prefix("role:").unwrap_or(role).trim();
            let name = name_part.trim();
            let name = name.strip_prefix("name:").unwrap_or(name).trim();
            if !role.is_empty() && !name.is_empty() {
                return TargetSpec::Criteria(SearchCriteria::text(name).with_role(role));
            }
        }

        let lower = s.to_lowercase();
        match s {
            _ if s.starts_with('#') && s.len() > 1 => TargetSpec::Id(s[1..].to_string()),
            _ if lower.starts_with("id:") => TargetSpec::Id(s[3..].trim().to_string()),
            _ if lower.starts_with("role:") => {
                TargetSpec::Criteria(SearchCriteria::role(s[5..].trim()))
            }
            _ if lower.starts_with("type:") => {
                TargetSpec::Criteria(SearchCriteria::default().with_type(s[5..].trim()))
            }
            _ if lower.starts_with("text:") => {
                TargetSpec::Criteria(SearchCriteria::text(s[5..].trim()))
            }
            _ if lower.starts_with("name:") => TargetSpec::Criteria(
                SearchCriteria::default().with_accessible_name(s[5..].trim()),
            ),
            _ if lower.starts_with("contains:") => TargetSpec::Criteria(SearchCriteria {
                text_contains: Some(s[9..].trim().to_string()),
                ..Default::default()
            }),
            _ if lower.starts_with("placeholder:") => TargetSpec::Criteria(SearchCriteria {
                placeholder: Some(s[12..].trim().to_string()),
                ..Default::default()
            }),
            _ => TargetSpec::Description(s.to_string()),
        }
    }
}

impl From<String> for TargetSpec {
    fn from(s: String) -> Self {
        TargetSpec::from(s.as_str())
    }
}

impl From<SearchCriteria> for TargetSpec {
    fn from(criteria: SearchCriteria) -> Self {
        TargetSpec::Criteria(criteria)
    }
}
