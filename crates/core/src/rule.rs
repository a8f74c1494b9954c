use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::account::AccountId;

/// Minimum confidence for a rule to label new rows (and to stay enabled).
pub const ASSIGN_THRESHOLD: f64 = 0.70;

/// `1 - corrected / max(assigned, 1)`, rounded half away from zero to four
/// decimals. Not clamped: corrections surviving a shrunk history can push it
/// negative, which the threshold treats the same as any failing score.
pub fn confidence(assigned_count: i64, corrected_count: i64) -> f64 {
    let raw = 1.0 - corrected_count as f64 / assigned_count.max(1) as f64;
    (raw * 10_000.0).round() / 10_000.0
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LabelPair {
    pub category: Option<String>,
    pub project: Option<String>,
}

/// Per-sign label overrides, present only when the income and expense sides
/// of a vendor's history disagree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignOverrides {
    pub income: LabelPair,
    pub expense: LabelPair,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RulePayload {
    /// Uppercase substring patterns, in first-encountered order.
    pub patterns: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub by_sign: Option<SignOverrides>,
    pub enabled: bool,
    pub assigned_count: i64,
    pub corrected_count: i64,
    pub confidence: f64,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RuleError {
    #[error("Rule pattern must not be empty")]
    EmptyPattern,
    #[error("Rule counters must not be negative")]
    NegativeCount,
}

impl RulePayload {
    /// Re-derive `confidence` from the counters. Every mutation of the
    /// counters must be followed by this.
    pub fn recompute_confidence(&mut self) {
        self.confidence = confidence(self.assigned_count, self.corrected_count);
    }

    /// Whether the matcher may use this rule at all.
    pub fn is_eligible(&self) -> bool {
        self.enabled && self.confidence >= ASSIGN_THRESHOLD && !self.patterns.is_empty()
    }

    /// The category/project this rule suggests for a row of the given sign.
    /// Income is the non-negative side.
    pub fn labels_for(&self, amount_cents: i64) -> (Option<&str>, Option<&str>) {
        if let Some(by_sign) = &self.by_sign {
            let pair = if amount_cents >= 0 { &by_sign.income } else { &by_sign.expense };
            (pair.category.as_deref(), pair.project.as_deref())
        } else {
            (self.category.as_deref(), self.project.as_deref())
        }
    }

    /// Sanitize a payload arriving from the manual rule-edit surface:
    /// patterns trimmed, uppercased, deduplicated; confidence re-derived so
    /// the counter invariant holds regardless of what the caller sent.
    pub fn normalized(mut self) -> Result<Self, RuleError> {
        if self.assigned_count < 0 || self.corrected_count < 0 {
            return Err(RuleError::NegativeCount);
        }
        let mut seen = std::collections::HashSet::new();
        let mut patterns = Vec::with_capacity(self.patterns.len());
        for p in &self.patterns {
            let p = p.trim().to_uppercase();
            if p.is_empty() {
                return Err(RuleError::EmptyPattern);
            }
            if seen.insert(p.clone()) {
                patterns.push(p);
            }
        }
        self.patterns = patterns;
        self.recompute_confidence();
        Ok(self)
    }
}

/// One vendor within an account, with its learned rule (NULL until the first
/// rebuild that saw labeled history for it).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VendorRule {
    pub id: Option<i64>,
    pub account_id: AccountId,
    pub name: String,
    pub payload: Option<RulePayload>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(patterns: &[&str], assigned: i64, corrected: i64) -> RulePayload {
        RulePayload {
            patterns: patterns.iter().map(|s| s.to_string()).collect(),
            category: Some("Coffee".to_string()),
            project: None,
            by_sign: None,
            enabled: true,
            assigned_count: assigned,
            corrected_count: corrected,
            confidence: confidence(assigned, corrected),
        }
    }

    #[test]
    fn confidence_with_no_corrections_is_one() {
        assert_eq!(confidence(10, 0), 1.0);
        assert_eq!(confidence(0, 0), 1.0);
    }

    #[test]
    fn confidence_rounds_to_four_decimals() {
        // 1 - 1/3 = 0.666666... → 0.6667
        assert_eq!(confidence(3, 1), 0.6667);
        assert_eq!(confidence(8, 1), 0.875);
    }

    #[test]
    fn confidence_zero_assigned_uses_floor_of_one() {
        assert_eq!(confidence(0, 2), -1.0);
    }

    #[test]
    fn confidence_can_go_negative() {
        assert_eq!(confidence(2, 5), -1.5);
    }

    #[test]
    fn eligibility_requires_all_three() {
        let p = payload(&["STARBUCKS"], 10, 0);
        assert!(p.is_eligible());

        let disabled = RulePayload { enabled: false, ..p.clone() };
        assert!(!disabled.is_eligible());

        let low = RulePayload { confidence: 0.69, ..p.clone() };
        assert!(!low.is_eligible());

        let no_patterns = RulePayload { patterns: vec![], ..p };
        assert!(!no_patterns.is_eligible());
    }

    #[test]
    fn eligibility_at_exact_threshold() {
        let p = RulePayload { confidence: confidence(10, 3), ..payload(&["X"], 10, 3) };
        assert_eq!(p.confidence, 0.7);
        assert!(p.is_eligible());
    }

    #[test]
    fn labels_for_without_overrides_uses_defaults() {
        let p = payload(&["STARBUCKS"], 5, 0);
        assert_eq!(p.labels_for(-450), (Some("Coffee"), None));
        assert_eq!(p.labels_for(450), (Some("Coffee"), None));
    }

    #[test]
    fn labels_for_with_overrides_splits_on_sign() {
        let mut p = payload(&["ACME"], 5, 0);
        p.by_sign = Some(SignOverrides {
            income: LabelPair { category: Some("Sales".into()), project: Some("Shop".into()) },
            expense: LabelPair { category: Some("Refunds".into()), project: None },
        });
        assert_eq!(p.labels_for(0), (Some("Sales"), Some("Shop")));
        assert_eq!(p.labels_for(-1), (Some("Refunds"), None));
    }

    #[test]
    fn normalized_uppercases_and_dedupes() {
        let p = RulePayload { patterns: vec![" starbucks ".into(), "STARBUCKS".into()], ..payload(&[], 4, 1) };
        let n = p.normalized().unwrap();
        assert_eq!(n.patterns, vec!["STARBUCKS".to_string()]);
    }

    #[test]
    fn normalized_rejects_empty_pattern() {
        let p = RulePayload { patterns: vec!["  ".into()], ..payload(&[], 1, 0) };
        assert_eq!(p.normalized().unwrap_err(), RuleError::EmptyPattern);
    }

    #[test]
    fn normalized_restores_confidence_invariant() {
        let p = RulePayload { confidence: 0.123, ..payload(&["OK"], 8, 1) };
        let n = p.normalized().unwrap();
        assert_eq!(n.confidence, 0.875);
    }

    #[test]
    fn by_sign_omitted_from_json_when_absent() {
        let json = serde_json::to_string(&payload(&["A"], 1, 0)).unwrap();
        assert!(!json.contains("by_sign"));
        assert!(!json.contains("project"));
    }

    #[test]
    fn payload_json_roundtrip() {
        let mut p = payload(&["ACME", "ACME SUPPLY"], 12, 2);
        p.by_sign = Some(SignOverrides {
            income: LabelPair { category: Some("Sales".into()), project: None },
            expense: LabelPair { category: Some("Supplies".into()), project: None },
        });
        let json = serde_json::to_string(&p).unwrap();
        let back: RulePayload = serde_json::from_str(&json).unwrap();
        assert_eq!(back, p);
    }
}
