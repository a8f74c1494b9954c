pub mod account;
pub mod record;
pub mod rule;
pub mod suggestion;

pub use account::{Account, AccountId};
pub use record::{Record, RecordId, RecordPatch, RecordSnapshot};
pub use rule::{confidence, LabelPair, RuleError, RulePayload, SignOverrides, VendorRule, ASSIGN_THRESHOLD};
pub use suggestion::{SuggestionBatch, SuggestionStatus};
