use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountId(pub i64);

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Scoping unit for records, vendor rules, and suggestion batches. Each
/// account maps to one inbox folder of the same name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: Option<AccountId>,
    pub name: String,
    pub created_at: Option<String>,
}

impl Account {
    pub fn new(name: &str) -> Self {
        Account {
            id: None,
            name: name.to_string(),
            created_at: None,
        }
    }
}
