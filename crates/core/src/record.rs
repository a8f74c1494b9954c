use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::account::AccountId;

/// Content-addressed record identity: `"{sha256_hex}-{occurrence}"`, where the
/// occurrence index disambiguates identical rows within one statement file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub String);

impl RecordId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for RecordId {
    fn from(s: String) -> Self {
        RecordId(s)
    }
}

/// One imported statement row. Labels (`vendor`/`category`/`project`) start
/// empty; `auto_categorized` is true only while the labels came from an
/// approved suggestion and no human has touched them since.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    pub account_id: AccountId,
    pub date: NaiveDate,
    pub description: String,
    pub amount_cents: i64,
    pub source_file: String,
    pub vendor: Option<String>,
    pub category: Option<String>,
    pub project: Option<String>,
    pub auto_categorized: bool,
    pub cleaned: bool,
    pub created_at: Option<String>,
}

/// Partial update for a record. `None` means "leave unchanged"; fields cannot
/// be cleared through this surface.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecordPatch {
    pub vendor: Option<String>,
    pub category: Option<String>,
    pub project: Option<String>,
    pub cleaned: Option<bool>,
}

impl RecordPatch {
    pub fn is_empty(&self) -> bool {
        self.vendor.is_none()
            && self.category.is_none()
            && self.project.is_none()
            && self.cleaned.is_none()
    }
}

/// Label snapshot used by bulk restore (undo of label edits).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordSnapshot {
    pub id: RecordId,
    pub vendor: Option<String>,
    pub category: Option<String>,
    pub project: Option<String>,
    pub auto_categorized: bool,
    pub cleaned: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_id_display_matches_inner() {
        let id = RecordId("abc123-0".to_string());
        assert_eq!(id.to_string(), "abc123-0");
        assert_eq!(id.as_str(), "abc123-0");
    }

    #[test]
    fn empty_patch() {
        assert!(RecordPatch::default().is_empty());
        let p = RecordPatch { vendor: Some("ACME".into()), ..Default::default() };
        assert!(!p.is_empty());
    }
}
