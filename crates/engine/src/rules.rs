//! Vendor rule learning. `rebuild_rules` recomputes every vendor's payload
//! from the account's labeled history in one pass, then resolves patterns
//! claimed by more than one vendor so the matcher never has to arbitrate.

use std::collections::HashMap;

use serde::Serialize;

use teller_core::{
    confidence, AccountId, LabelPair, RulePayload, SignOverrides, VendorRule, ASSIGN_THRESHOLD,
};
use teller_storage::{
    get_account, get_vendor_by_id, labeled_records, set_vendor_payload, upsert_vendor,
    vendors_for_account, DbPool, LabeledRecord, StoreError,
};

use crate::error::EngineError;
use crate::tokenize::extract_patterns;

#[derive(Debug, Clone, Copy, Serialize)]
pub struct RebuildOutcome {
    /// Vendors whose payload was written this pass.
    pub updated: u64,
    /// Patterns that were claimed by more than one vendor and got stripped
    /// from all but the strongest claimant.
    pub ambiguous_patterns_resolved: u64,
}

struct VendorState {
    id: i64,
    name: String,
    payload: Option<RulePayload>,
    dirty: bool,
}

/// Recomputes all vendor rules for the account from its labeled records.
/// Vendors with no labeled history keep their stored payload untouched
/// (except where ambiguity resolution strips a contested pattern). Runs in
/// one transaction so a half-rebuilt rule set is never observable.
pub async fn rebuild_rules(
    pool: &DbPool,
    account_id: AccountId,
) -> Result<RebuildOutcome, EngineError> {
    let mut tx = pool.begin().await.map_err(StoreError::from)?;

    if get_account(&mut *tx, account_id).await?.is_none() {
        return Err(EngineError::AccountNotFound(account_id));
    }

    let history = labeled_records(&mut tx, account_id).await?;

    // Group per vendor in first-encounter order.
    let mut names: Vec<String> = Vec::new();
    let mut groups: HashMap<&str, Vec<&LabeledRecord>> = HashMap::new();
    for rec in &history {
        let entry = groups.entry(&rec.vendor).or_default();
        if entry.is_empty() {
            names.push(rec.vendor.clone());
        }
        entry.push(rec);
    }

    // Every labeled vendor gets a rule row, even before its first payload.
    for name in &names {
        upsert_vendor(&mut tx, account_id, name).await?;
    }

    let mut states: Vec<VendorState> = vendors_for_account(&mut *tx, account_id)
        .await?
        .into_iter()
        .filter_map(|v| {
            let id = v.id?;
            Some(VendorState { id, name: v.name, payload: v.payload, dirty: false })
        })
        .collect();

    for state in &mut states {
        let Some(records) = groups.get(state.name.as_str()) else {
            continue;
        };
        state.payload = Some(build_payload(records, state.payload.as_ref()));
        state.dirty = true;
    }

    let ambiguous_patterns_resolved = resolve_contested_patterns(&mut states);

    let mut updated = 0;
    for state in &states {
        if !state.dirty {
            continue;
        }
        if let Some(payload) = &state.payload {
            set_vendor_payload(&mut tx, state.id, payload).await?;
            updated += 1;
        }
    }

    tx.commit().await.map_err(StoreError::from)?;

    tracing::info!(
        account = account_id.0,
        updated,
        ambiguous_patterns_resolved,
        "rebuilt vendor rules"
    );
    Ok(RebuildOutcome { updated, ambiguous_patterns_resolved })
}

/// One vendor's payload from its labeled records. `assigned_count` is reset
/// to the history size; `corrected_count` and a manual disable survive from
/// the prior payload.
fn build_payload(records: &[&LabeledRecord], prior: Option<&RulePayload>) -> RulePayload {
    let mut patterns: Vec<String> = Vec::new();
    for rec in records {
        for p in extract_patterns(&rec.description) {
            if !patterns.contains(&p) {
                patterns.push(p);
            }
        }
    }

    let category = mode(records.iter().map(|r| r.category.as_deref()));
    let project = mode(records.iter().map(|r| r.project.as_deref()));

    let (income, expense): (Vec<&LabeledRecord>, Vec<&LabeledRecord>) =
        records.iter().copied().partition(|r| r.amount_cents >= 0);
    let by_sign = if income.is_empty() || expense.is_empty() {
        None
    } else {
        let income_pair = sign_pair(&income, &category, &project);
        let expense_pair = sign_pair(&expense, &category, &project);
        if income_pair == expense_pair {
            None
        } else {
            Some(SignOverrides { income: income_pair, expense: expense_pair })
        }
    };

    let assigned_count = records.len() as i64;
    let corrected_count = prior.map_or(0, |p| p.corrected_count);
    let conf = confidence(assigned_count, corrected_count);

    RulePayload {
        patterns,
        category,
        project,
        by_sign,
        enabled: prior.map_or(true, |p| p.enabled) && conf >= ASSIGN_THRESHOLD,
        assigned_count,
        corrected_count,
        confidence: conf,
    }
}

/// One sign partition's labels, falling back to the overall defaults where
/// the partition has no non-null values of its own.
fn sign_pair(
    records: &[&LabeledRecord],
    category: &Option<String>,
    project: &Option<String>,
) -> LabelPair {
    LabelPair {
        category: mode(records.iter().map(|r| r.category.as_deref())).or_else(|| category.clone()),
        project: mode(records.iter().map(|r| r.project.as_deref())).or_else(|| project.clone()),
    }
}

/// Most frequent non-null value; ties keep the first encountered.
fn mode<'a, I>(values: I) -> Option<String>
where
    I: IntoIterator<Item = Option<&'a str>>,
{
    let mut order: Vec<&str> = Vec::new();
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for v in values.into_iter().flatten() {
        let count = counts.entry(v).or_insert(0);
        if *count == 0 {
            order.push(v);
        }
        *count += 1;
    }

    let mut best: Option<(&str, usize)> = None;
    for v in order {
        let count = counts[v];
        if best.map_or(true, |(_, top)| count > top) {
            best = Some((v, count));
        }
    }
    best.map(|(v, _)| v.to_string())
}

fn beats(challenger: &VendorState, incumbent: &VendorState) -> bool {
    let c = challenger.payload.as_ref().map_or(0, |p| p.assigned_count);
    let i = incumbent.payload.as_ref().map_or(0, |p| p.assigned_count);
    c > i || (c == i && challenger.name < incumbent.name)
}

/// A pattern on two vendors would make matching depend on rule order, so
/// only the strongest claimant keeps it: highest `assigned_count`, ties by
/// vendor name ascending. Losers are stripped in place and marked dirty.
fn resolve_contested_patterns(states: &mut [VendorState]) -> u64 {
    let mut order: Vec<String> = Vec::new();
    let mut holders: HashMap<String, Vec<usize>> = HashMap::new();
    for (idx, state) in states.iter().enumerate() {
        let Some(payload) = &state.payload else { continue };
        for p in &payload.patterns {
            let entry = holders.entry(p.clone()).or_default();
            if entry.is_empty() {
                order.push(p.clone());
            }
            entry.push(idx);
        }
    }

    let mut resolved = 0;
    for pattern in &order {
        let claimants = &holders[pattern];
        if claimants.len() < 2 {
            continue;
        }
        resolved += 1;

        let mut winner = claimants[0];
        for &idx in &claimants[1..] {
            if beats(&states[idx], &states[winner]) {
                winner = idx;
            }
        }

        for &idx in claimants {
            if idx == winner {
                continue;
            }
            if let Some(payload) = states[idx].payload.as_mut() {
                payload.patterns.retain(|p| p != pattern);
                states[idx].dirty = true;
            }
        }
    }
    resolved
}

/// Manual rule edit: replace a vendor's payload wholesale. Patterns are
/// trimmed, uppercased, and deduplicated; confidence is re-derived from the
/// submitted counters. This is the only path that may re-enable a rule.
pub async fn set_rule(
    pool: &DbPool,
    vendor_id: i64,
    payload: RulePayload,
) -> Result<VendorRule, EngineError> {
    let payload = payload.normalized()?;

    let mut tx = pool.begin().await.map_err(StoreError::from)?;
    let Some(rule) = get_vendor_by_id(&mut tx, vendor_id).await? else {
        return Err(EngineError::VendorNotFound(vendor_id));
    };
    set_vendor_payload(&mut tx, vendor_id, &payload).await?;
    tx.commit().await.map_err(StoreError::from)?;

    Ok(VendorRule { payload: Some(payload), ..rule })
}
