//! The teller pipeline: statement parsing, record identity, vendor rule
//! learning, matching, and the suggestion feedback loop. Everything here is
//! account-scoped and runs against the storage crate's SQLite pool.

pub mod error;
pub mod identity;
pub mod importer;
pub mod matcher;
pub mod rules;
pub mod statement;
pub mod suggestions;
pub mod tokenize;

pub use error::EngineError;
pub use identity::{base_hash, OccurrenceCounter};
pub use importer::{import_statement, ImportOutcome};
pub use matcher::{best_match, MatchHit};
pub use rules::{rebuild_rules, set_rule, RebuildOutcome};
pub use statement::{parse_statement, RowParse, StatementError, StatementRow};
pub use suggestions::{
    approve, approve_all, dismiss, restore_records, update_record, ApproveAllOutcome,
    ApproveOverrides, RestoreOutcome,
};
pub use tokenize::extract_patterns;
