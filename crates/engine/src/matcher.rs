use teller_core::{RulePayload, VendorRule};

/// A winning rule for one description: the vendor, its payload, and the
/// first listed pattern that hit.
#[derive(Debug)]
pub struct MatchHit<'a> {
    pub vendor: &'a VendorRule,
    pub payload: &'a RulePayload,
    pub pattern: &'a str,
}

/// Picks the rule that labels `description`, if any. Matching is case-blind
/// substring containment against each rule's patterns in listed order. When
/// several vendors hit, the one with the larger `assigned_count` wins; ties
/// go to the lexicographically smaller vendor name so reruns are stable.
pub fn best_match<'a>(description: &str, rules: &'a [VendorRule]) -> Option<MatchHit<'a>> {
    let upper = description.to_uppercase();
    let mut best: Option<MatchHit<'a>> = None;

    for rule in rules {
        let Some(payload) = rule.payload.as_ref() else { continue };
        if !payload.is_eligible() {
            continue;
        }
        let Some(pattern) = payload.patterns.iter().find(|p| upper.contains(p.as_str())) else {
            continue;
        };

        let wins = match &best {
            None => true,
            Some(current) => {
                payload.assigned_count > current.payload.assigned_count
                    || (payload.assigned_count == current.payload.assigned_count
                        && rule.name < current.vendor.name)
            }
        };
        if wins {
            best = Some(MatchHit { vendor: rule, payload, pattern });
        }
    }

    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use teller_core::{confidence, AccountId};

    fn rule(name: &str, patterns: &[&str], assigned: i64, corrected: i64) -> VendorRule {
        VendorRule {
            id: Some(1),
            account_id: AccountId(1),
            name: name.to_string(),
            payload: Some(RulePayload {
                patterns: patterns.iter().map(|s| s.to_string()).collect(),
                category: Some("Misc".to_string()),
                project: None,
                by_sign: None,
                enabled: true,
                assigned_count: assigned,
                corrected_count: corrected,
                confidence: confidence(assigned, corrected),
            }),
        }
    }

    #[test]
    fn substring_match_is_case_blind() {
        let rules = vec![rule("Starbucks", &["STARBUCKS"], 5, 0)];
        let hit = best_match("checkcard starbucks #1234", &rules).unwrap();
        assert_eq!(hit.vendor.name, "Starbucks");
        assert_eq!(hit.pattern, "STARBUCKS");
    }

    #[test]
    fn first_listed_pattern_wins_within_a_rule() {
        let rules = vec![rule("Acme", &["ACME SUPPLY", "ACME"], 5, 0)];
        let hit = best_match("ACME SUPPLY CO PORTLAND", &rules).unwrap();
        assert_eq!(hit.pattern, "ACME SUPPLY");
    }

    #[test]
    fn higher_assigned_count_wins_across_rules() {
        let rules = vec![
            rule("Corner Store", &["STORE"], 3, 0),
            rule("Grocery Store", &["STORE"], 10, 0),
        ];
        let hit = best_match("GENERAL STORE PURCHASE", &rules).unwrap();
        assert_eq!(hit.vendor.name, "Grocery Store");
    }

    #[test]
    fn ties_break_by_vendor_name() {
        let rules = vec![
            rule("Zeta Coffee", &["COFFEE"], 4, 0),
            rule("Alpha Coffee", &["COFFEE"], 4, 0),
        ];
        let hit = best_match("COFFEE SHOP", &rules).unwrap();
        assert_eq!(hit.vendor.name, "Alpha Coffee");
    }

    #[test]
    fn ineligible_rules_never_match() {
        let mut disabled = rule("Starbucks", &["STARBUCKS"], 5, 0);
        if let Some(p) = disabled.payload.as_mut() {
            p.enabled = false;
        }
        assert!(best_match("STARBUCKS", &[disabled]).is_none());

        // 1 - 2/5 = 0.6, below the assignment threshold
        let low = rule("Starbucks", &["STARBUCKS"], 5, 2);
        assert!(best_match("STARBUCKS", &[low]).is_none());

        let empty = rule("Starbucks", &[], 5, 0);
        assert!(best_match("STARBUCKS", &[empty]).is_none());
    }

    #[test]
    fn rule_without_payload_is_skipped() {
        let bare = VendorRule {
            id: Some(1),
            account_id: AccountId(1),
            name: "New Vendor".to_string(),
            payload: None,
        };
        assert!(best_match("NEW VENDOR", &[bare]).is_none());
    }

    #[test]
    fn no_hit_returns_none() {
        let rules = vec![rule("Starbucks", &["STARBUCKS"], 5, 0)];
        assert!(best_match("WHOLE FOODS MARKET", &rules).is_none());
    }
}
