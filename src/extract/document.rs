use crate::extract::engine::{Extraction, FieldValue, RuleError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// The extraction output for one parsed page, as handed to a result sink
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedDocument {
    pub task_id: Uuid,
    pub url: String,
    /// Possibly partial; see `errors` for the rules that produced nothing
    pub fields: BTreeMap<String, FieldValue>,
    pub errors: Vec<RuleError>,
    pub extracted_at: DateTime<Utc>,
    /// Starts at 1; bumped by the sink when it overwrites or versions a
    /// previous document for the same URL
    pub version: u32,
}

impl ExtractedDocument {
    pub fn new(task_id: Uuid, url: impl Into<String>, extraction: Extraction) -> Self {
        Self {
            task_id,
            url: url.into(),
            fields: extraction.fields,
            errors: extraction.errors,
            extracted_at: Utc::now(),
            version: 1,
        }
    }
}
