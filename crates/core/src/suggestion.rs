use serde::{Deserialize, Serialize};

use super::account::AccountId;
use super::record::RecordId;

/// `Approved` and `Dismissed` are terminal; a batch never leaves them.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionStatus {
    Pending,
    Approved,
    Dismissed,
}

impl std::fmt::Display for SuggestionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SuggestionStatus::Pending => write!(f, "pending"),
            SuggestionStatus::Approved => write!(f, "approved"),
            SuggestionStatus::Dismissed => write!(f, "dismissed"),
        }
    }
}

impl std::str::FromStr for SuggestionStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SuggestionStatus::Pending),
            "approved" => Ok(SuggestionStatus::Approved),
            "dismissed" => Ok(SuggestionStatus::Dismissed),
            other => Err(format!("Unknown suggestion status: '{other}'")),
        }
    }
}

/// One vendor's proposed labels for a set of freshly imported records.
/// `vendor` is a weak reference by name; the rule row may be gone by the time
/// the batch is reviewed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuggestionBatch {
    pub id: Option<i64>,
    pub account_id: AccountId,
    pub vendor: String,
    pub category: Option<String>,
    pub project: Option<String>,
    pub matched_pattern: String,
    pub record_ids: Vec<RecordId>,
    pub status: SuggestionStatus,
    pub created_at: Option<String>,
}
