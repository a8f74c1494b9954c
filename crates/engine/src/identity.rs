use chrono::NaiveDate;
use sha2::{Digest, Sha256};
use std::collections::HashMap;

use teller_core::RecordId;

/// Render cents as a plain two-decimal amount (`-4.50`, `0.07`, `1250.00`).
/// No thousands separators; negatives carry a leading minus.
fn amount_2dp(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{sign}{}.{:02}", abs / 100, abs % 100)
}

/// Stable content fingerprint of one statement row:
/// `sha256_hex(iso_date + description + two_decimal_amount)`.
/// This exact input layout is load-bearing: identities already in storage
/// were produced from it, and re-imports must reproduce them bit for bit.
pub fn base_hash(date: NaiveDate, description: &str, amount_cents: i64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(date.to_string().as_bytes());
    hasher.update(description.as_bytes());
    hasher.update(amount_2dp(amount_cents).as_bytes());
    let digest: [u8; 32] = hasher.finalize().into();
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Assigns occurrence indexes to repeated base hashes within one statement
/// file, in row order. Two identical rows in the same file get `-0` and `-1`
/// suffixes; the counter resets with each new batch, so re-importing the same
/// file regenerates the same identities.
#[derive(Debug, Default)]
pub struct OccurrenceCounter {
    seen: HashMap<String, u32>,
}

impl OccurrenceCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Composite identity for this base hash; advances the per-file index.
    pub fn identity(&mut self, base: &str) -> RecordId {
        let n = self.seen.entry(base.to_string()).or_insert(0);
        let id = RecordId(format!("{base}-{n}"));
        *n += 1;
        id
    }
}
