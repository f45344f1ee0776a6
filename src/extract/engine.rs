//! Selector-based field extraction
//!
//! The document is parsed once; every rule is then evaluated on its own so
//! that a broken rule never hides the output of the others.

use crate::extract::rule::{ContentKind, Rule};
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Value extracted for one rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// First match; `None` when nothing matched or the attribute was absent
    Single(Option<String>),
    /// All matches in document order
    List(Vec<Option<String>>),
}

/// Why a rule produced no field
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "type", content = "message", rename_all = "snake_case")]
pub enum RuleErrorKind {
    #[error("invalid selector: {0}")]
    InvalidSelector(String),

    #[error("required selector matched nothing")]
    Missing,
}

/// A per-rule extraction error
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("rule '{rule}': {kind}")]
pub struct RuleError {
    pub rule: String,
    pub kind: RuleErrorKind,
}

/// Result of applying a rule set to one document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extraction {
    /// Field map; rules with errors are absent
    pub fields: BTreeMap<String, FieldValue>,
    pub errors: Vec<RuleError>,
    /// Optional rules that matched nothing
    pub warnings: Vec<String>,
}

impl Extraction {
    /// True when every rule produced a field
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Applies `rules` to `html`
///
/// Extraction is a pure function of its inputs: the same HTML and rules
/// always give the same field map, errors and warnings.
///
/// # Arguments
///
/// * `html` - The HTML document
/// * `rules` - Rules evaluated in order
///
/// # Example
///
/// ```
/// use sitemap_harvest::extract::{extract, ContentKind, FieldValue, Rule};
///
/// let rules = vec![Rule::new("title", "h1", ContentKind::Text)];
/// let extraction = extract("<html><body><h1>Title</h1></body></html>", &rules);
/// assert_eq!(
///     extraction.fields["title"],
///     FieldValue::Single(Some("Title".to_string()))
/// );
/// ```
pub fn extract(html: &str, rules: &[Rule]) -> Extraction {
    let document = Html::parse_document(html);
    let mut extraction = Extraction::default();

    for rule in rules {
        let selector = match Selector::parse(&rule.selector) {
            Ok(selector) => selector,
            Err(e) => {
                tracing::debug!("Rule '{}' has invalid selector: {}", rule.name, e);
                extraction.errors.push(RuleError {
                    rule: rule.name.clone(),
                    kind: RuleErrorKind::InvalidSelector(e.to_string()),
                });
                continue;
            }
        };

        let mut matches = document.select(&selector).peekable();

        if matches.peek().is_none() {
            if rule.required {
                extraction.errors.push(RuleError {
                    rule: rule.name.clone(),
                    kind: RuleErrorKind::Missing,
                });
                continue;
            }

            extraction
                .warnings
                .push(format!("rule '{}' matched no elements", rule.name));
        }

        let value = if rule.multiple {
            FieldValue::List(matches.map(|el| content_of(el, &rule.kind)).collect())
        } else {
            FieldValue::Single(matches.next().and_then(|el| content_of(el, &rule.kind)))
        };

        extraction.fields.insert(rule.name.clone(), value);
    }

    extraction
}

/// Takes the requested content from one element
fn content_of(element: ElementRef<'_>, kind: &ContentKind) -> Option<String> {
    match kind {
        ContentKind::Text => Some(collapse_whitespace(&element.text().collect::<String>())),
        ContentKind::Html => Some(element.inner_html().trim().to_string()),
        ContentKind::Attribute(name) => element.value().attr(name).map(str::to_string),
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
