use thiserror::Error;

use teller_core::{AccountId, RecordId, RuleError, SuggestionStatus};
use teller_storage::StoreError;

use crate::statement::StatementError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Account {0} not found")]
    AccountNotFound(AccountId),
    #[error("Record {0} not found")]
    RecordNotFound(RecordId),
    #[error("Suggestion {0} not found")]
    SuggestionNotFound(i64),
    #[error("Vendor {0} not found")]
    VendorNotFound(i64),
    #[error("Suggestion {id} is already {status}")]
    FinalizedSuggestion { id: i64, status: SuggestionStatus },
    #[error(transparent)]
    Statement(#[from] StatementError),
    #[error(transparent)]
    Rule(#[from] RuleError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<sqlx::Error> for EngineError {
    fn from(err: sqlx::Error) -> Self {
        EngineError::Store(StoreError::Db(err))
    }
}
