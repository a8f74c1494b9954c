//! Suggestion review and the correction feedback loop. Approval is the only
//! path that writes labels onto records; corrections made later on those
//! records feed back into the vendor rule's counters.

use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;

use teller_core::{
    AccountId, Record, RecordId, RecordPatch, RecordSnapshot, SuggestionBatch, SuggestionStatus,
    ASSIGN_THRESHOLD,
};
use teller_storage::{
    apply_labels, get_account, get_record, get_suggestion, get_vendor, list_suggestions,
    restore_record, set_suggestion_status, set_vendor_payload, upsert_vendor, DbPool, StoreError,
};

use crate::error::EngineError;

/// Per-field replacements for a batch's suggested labels. A `None` keeps the
/// suggestion's own value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApproveOverrides {
    pub vendor: Option<String>,
    pub category: Option<String>,
    pub project: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct ApproveAllOutcome {
    pub approved: u64,
    pub records_labeled: u64,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct RestoreOutcome {
    pub restored: u64,
}

/// Approves a pending batch: labels every referenced record, makes sure the
/// applied vendor has a rule row, and credits the batch's vendor rule with
/// the assignments. Already-reviewed batches are a conflict.
pub async fn approve(
    pool: &DbPool,
    id: i64,
    overrides: ApproveOverrides,
) -> Result<SuggestionBatch, EngineError> {
    let mut tx = pool.begin().await.map_err(StoreError::from)?;

    let Some(mut batch) = get_suggestion(&mut tx, id).await? else {
        return Err(EngineError::SuggestionNotFound(id));
    };
    if batch.status != SuggestionStatus::Pending {
        return Err(EngineError::FinalizedSuggestion { id, status: batch.status });
    }

    apply_approval(&mut tx, &batch, &overrides).await?;
    set_suggestion_status(&mut tx, id, SuggestionStatus::Approved).await?;
    tx.commit().await.map_err(StoreError::from)?;

    batch.status = SuggestionStatus::Approved;
    Ok(batch)
}

/// Marks a pending batch dismissed. Records and rules are untouched.
pub async fn dismiss(pool: &DbPool, id: i64) -> Result<SuggestionBatch, EngineError> {
    let mut tx = pool.begin().await.map_err(StoreError::from)?;

    let Some(mut batch) = get_suggestion(&mut tx, id).await? else {
        return Err(EngineError::SuggestionNotFound(id));
    };
    if batch.status != SuggestionStatus::Pending {
        return Err(EngineError::FinalizedSuggestion { id, status: batch.status });
    }

    set_suggestion_status(&mut tx, id, SuggestionStatus::Dismissed).await?;
    tx.commit().await.map_err(StoreError::from)?;

    batch.status = SuggestionStatus::Dismissed;
    Ok(batch)
}

/// Approves every pending batch for the account with its suggested values,
/// all in one transaction.
pub async fn approve_all(
    pool: &DbPool,
    account_id: AccountId,
) -> Result<ApproveAllOutcome, EngineError> {
    let mut tx = pool.begin().await.map_err(StoreError::from)?;

    if get_account(&mut *tx, account_id).await?.is_none() {
        return Err(EngineError::AccountNotFound(account_id));
    }

    let pending =
        list_suggestions(&mut *tx, account_id, Some(SuggestionStatus::Pending)).await?;

    let mut approved: u64 = 0;
    let mut records_labeled: u64 = 0;
    for batch in &pending {
        records_labeled += apply_approval(&mut tx, batch, &ApproveOverrides::default()).await?;
        if let Some(id) = batch.id {
            set_suggestion_status(&mut tx, id, SuggestionStatus::Approved).await?;
        }
        approved += 1;
    }

    tx.commit().await.map_err(StoreError::from)?;

    tracing::info!(account = account_id.0, approved, records_labeled, "approved all suggestions");
    Ok(ApproveAllOutcome { approved, records_labeled })
}

/// The shared half of approval: label the records and credit the rule.
/// Returns how many records actually got labels (ids whose record has since
/// disappeared are ignored).
async fn apply_approval(
    conn: &mut SqliteConnection,
    batch: &SuggestionBatch,
    overrides: &ApproveOverrides,
) -> Result<u64, EngineError> {
    let vendor = overrides.vendor.as_deref().unwrap_or(&batch.vendor);
    let category = overrides.category.as_deref().or(batch.category.as_deref());
    let project = overrides.project.as_deref().or(batch.project.as_deref());

    let labeled = apply_labels(conn, &batch.record_ids, vendor, category, project).await?;
    upsert_vendor(conn, batch.account_id, vendor).await?;

    // The assignment is credited to the batch's original vendor. The name is
    // a weak reference; if its rule row or payload is gone, nothing to credit.
    if let Some(rule) = get_vendor(conn, batch.account_id, &batch.vendor).await? {
        if let (Some(vendor_id), Some(mut payload)) = (rule.id, rule.payload) {
            payload.assigned_count += batch.record_ids.len() as i64;
            payload.recompute_confidence();
            set_vendor_payload(conn, vendor_id, &payload).await?;
        }
    }

    Ok(labeled)
}

/// Applies a partial update to a record, running the correction hook first:
/// renaming the vendor on an auto-categorized record counts as a correction
/// against the old vendor's rule, and any human change to a label clears
/// `auto_categorized`.
pub async fn update_record(
    pool: &DbPool,
    id: &RecordId,
    patch: RecordPatch,
) -> Result<Record, EngineError> {
    let mut tx = pool.begin().await.map_err(StoreError::from)?;

    let Some(mut record) = get_record(&mut tx, id).await? else {
        return Err(EngineError::RecordNotFound(id.clone()));
    };

    let vendor_changed =
        patch.vendor.as_deref().is_some_and(|v| record.vendor.as_deref() != Some(v));
    let category_changed =
        patch.category.as_deref().is_some_and(|v| record.category.as_deref() != Some(v));
    let project_changed =
        patch.project.as_deref().is_some_and(|v| record.project.as_deref() != Some(v));

    if record.auto_categorized && vendor_changed {
        if let Some(old_vendor) = record.vendor.clone() {
            penalize_vendor(&mut tx, record.account_id, &old_vendor).await?;
        }
    }
    if vendor_changed || category_changed || project_changed {
        record.auto_categorized = false;
    }

    if let Some(v) = patch.vendor {
        record.vendor = Some(v);
    }
    if let Some(v) = patch.category {
        record.category = Some(v);
    }
    if let Some(v) = patch.project {
        record.project = Some(v);
    }
    if let Some(v) = patch.cleaned {
        record.cleaned = v;
    }

    teller_storage::update_record(&mut tx, &record).await?;
    tx.commit().await.map_err(StoreError::from)?;
    Ok(record)
}

/// One correction against a vendor's rule. Dropping below the assignment
/// threshold disables the rule; nothing in the pipeline re-enables it.
async fn penalize_vendor(
    conn: &mut SqliteConnection,
    account_id: AccountId,
    name: &str,
) -> Result<(), EngineError> {
    let Some(rule) = get_vendor(conn, account_id, name).await? else {
        return Ok(());
    };
    let (Some(vendor_id), Some(mut payload)) = (rule.id, rule.payload) else {
        return Ok(());
    };

    payload.corrected_count += 1;
    payload.recompute_confidence();
    if payload.confidence < ASSIGN_THRESHOLD {
        payload.enabled = false;
    }
    set_vendor_payload(conn, vendor_id, &payload).await?;

    tracing::info!(
        vendor = name,
        confidence = payload.confidence,
        enabled = payload.enabled,
        "recorded correction against vendor rule"
    );
    Ok(())
}

/// Bulk undo: put each record's labels back to a snapshot. Snapshots whose
/// record no longer exists are skipped.
pub async fn restore_records(
    pool: &DbPool,
    snapshots: &[RecordSnapshot],
) -> Result<RestoreOutcome, EngineError> {
    let mut tx = pool.begin().await.map_err(StoreError::from)?;

    let mut restored: u64 = 0;
    for snap in snapshots {
        if restore_record(&mut tx, snap).await? {
            restored += 1;
        }
    }

    tx.commit().await.map_err(StoreError::from)?;
    Ok(RestoreOutcome { restored })
}
