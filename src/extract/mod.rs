//! Extraction module
//!
//! Applies CSS-selector rules to fetched HTML:
//! - `rule`: rule definitions and their file format
//! - `engine`: the extraction function and its per-rule errors
//! - `document`: the document handed to result sinks

mod document;
mod engine;
mod rule;

pub use document::ExtractedDocument;
pub use engine::{extract, Extraction, FieldValue, RuleError, RuleErrorKind};
pub use rule::{ContentKind, Rule};
