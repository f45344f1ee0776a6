//! Extraction rule definitions
//!
//! A rule names a field, selects elements with a CSS selector and says what
//! to take from each matched element. The attribute name lives inside
//! `ContentKind::Attribute`, so a rule cannot carry an attribute name for a
//! text or HTML kind.

use crate::ConfigError;
use serde::Deserialize;

/// What a rule takes from each matched element
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ContentKind {
    /// Text content with whitespace collapsed
    Text,
    /// Inner HTML
    Html,
    /// Value of the named attribute
    Attribute(String),
}

/// A named CSS-selector extraction rule
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawRule")]
pub struct Rule {
    /// Field name in the extracted document
    pub name: String,
    pub selector: String,
    pub kind: ContentKind,
    /// Take every match instead of the first one
    pub multiple: bool,
    /// A rule with zero matches is an error instead of a warning
    pub required: bool,
}

impl Rule {
    /// Creates a single-valued, optional rule
    pub fn new(name: impl Into<String>, selector: impl Into<String>, kind: ContentKind) -> Self {
        Self {
            name: name.into(),
            selector: selector.into(),
            kind,
            multiple: false,
            required: false,
        }
    }

    /// Creates an attribute rule, rejecting an empty attribute name
    pub fn attribute(
        name: impl Into<String>,
        selector: impl Into<String>,
        attribute: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let name = name.into();
        let attribute = attribute.into();
        if attribute.trim().is_empty() {
            return Err(ConfigError::InvalidRule(format!(
                "rule '{}': attribute name cannot be empty",
                name
            )));
        }
        Ok(Self::new(name, selector, ContentKind::Attribute(attribute)))
    }

    pub fn multiple(mut self) -> Self {
        self.multiple = true;
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// Kind names as written in configuration files
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
enum KindName {
    Text,
    Html,
    Attribute,
}

/// Flat, file-level form of a rule
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRule {
    name: String,
    selector: String,
    kind: KindName,
    #[serde(default)]
    attribute: Option<String>,
    #[serde(default)]
    multiple: bool,
    #[serde(default)]
    required: bool,
}

impl TryFrom<RawRule> for Rule {
    type Error = ConfigError;

    fn try_from(raw: RawRule) -> Result<Self, Self::Error> {
        if raw.name.trim().is_empty() {
            return Err(ConfigError::InvalidRule(
                "rule name cannot be empty".to_string(),
            ));
        }

        let kind = match (raw.kind, raw.attribute) {
            (KindName::Attribute, Some(attr)) if !attr.trim().is_empty() => {
                ContentKind::Attribute(attr)
            }
            (KindName::Attribute, _) => {
                return Err(ConfigError::InvalidRule(format!(
                    "rule '{}': kind \"attribute\" requires a non-empty attribute name",
                    raw.name
                )))
            }
            (_, Some(_)) => {
                return Err(ConfigError::InvalidRule(format!(
                    "rule '{}': attribute is only allowed with kind \"attribute\"",
                    raw.name
                )))
            }
            (KindName::Text, None) => ContentKind::Text,
            (KindName::Html, None) => ContentKind::Html,
        };

        Ok(Rule {
            name: raw.name,
            selector: raw.selector,
            kind,
            multiple: raw.multiple,
            required: raw.required,
        })
    }
}
