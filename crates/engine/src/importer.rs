//! Statement import. Parses a five-column CSV export, inserts the rows that
//! are not already stored, and turns matcher hits into pending suggestion
//! batches. Labels are never applied here; that only happens on approval.

use std::collections::HashMap;

use serde::Serialize;

use teller_core::{AccountId, RecordId, SuggestionBatch, SuggestionStatus};
use teller_storage::{
    get_account, insert_record, insert_suggestion, record_exists, vendors_for_account, DbPool,
    NewRecord, StoreError,
};

use crate::error::EngineError;
use crate::identity::{base_hash, OccurrenceCounter};
use crate::matcher::best_match;
use crate::statement::{parse_statement, RowParse};

#[derive(Debug, Clone, Copy, Serialize)]
pub struct ImportOutcome {
    pub imported: u64,
    /// Rows with an unparseable date or amount, plus rows already stored.
    pub skipped: u64,
    pub suggestions_created: u64,
}

/// One vendor's accumulating suggestion. Labels and the matched pattern are
/// captured from the first matching row and kept for the whole batch.
struct PendingGroup {
    vendor: String,
    category: Option<String>,
    project: Option<String>,
    pattern: String,
    record_ids: Vec<RecordId>,
}

/// Imports one statement file into the account. The entire batch runs in a
/// single transaction: a structurally bad file inserts nothing, and a crash
/// mid-import leaves no partial batch behind.
pub async fn import_statement(
    pool: &DbPool,
    account_id: AccountId,
    content: &[u8],
    source_file: &str,
) -> Result<ImportOutcome, EngineError> {
    // Structural validation happens before the transaction opens.
    let rows = parse_statement(content)?;

    let mut tx = pool.begin().await.map_err(StoreError::from)?;
    if get_account(&mut *tx, account_id).await?.is_none() {
        return Err(EngineError::AccountNotFound(account_id));
    }

    // One rule snapshot for the whole batch; mid-import rule edits do not
    // change how later rows match.
    let rules = vendors_for_account(&mut *tx, account_id).await?;

    let mut counter = OccurrenceCounter::new();
    let mut groups: Vec<PendingGroup> = Vec::new();
    let mut group_index: HashMap<String, usize> = HashMap::new();
    let mut imported: u64 = 0;
    let mut skipped: u64 = 0;

    for row in &rows {
        let row = match row {
            RowParse::Valid(row) => row,
            RowParse::Invalid { line, reason } => {
                tracing::debug!(line = *line, reason = %reason, "skipping malformed row");
                skipped += 1;
                continue;
            }
        };

        let base = base_hash(row.date, &row.description, row.amount_cents);
        let id = counter.identity(&base);
        if record_exists(&mut tx, &id).await? {
            skipped += 1;
            continue;
        }

        let raw_data = serde_json::to_string(&row.raw)
            .map_err(|source| StoreError::Encode { what: "raw row", source })?;
        insert_record(
            &mut tx,
            NewRecord {
                id: &id,
                account_id,
                date: row.date,
                description: &row.description,
                amount_cents: row.amount_cents,
                source_file,
                raw_data: &raw_data,
            },
        )
        .await?;
        imported += 1;

        if let Some(hit) = best_match(&row.description, &rules) {
            match group_index.get(hit.vendor.name.as_str()) {
                Some(&idx) => groups[idx].record_ids.push(id),
                None => {
                    let (category, project) = hit.payload.labels_for(row.amount_cents);
                    group_index.insert(hit.vendor.name.clone(), groups.len());
                    groups.push(PendingGroup {
                        vendor: hit.vendor.name.clone(),
                        category: category.map(str::to_string),
                        project: project.map(str::to_string),
                        pattern: hit.pattern.to_string(),
                        record_ids: vec![id],
                    });
                }
            }
        }
    }

    let suggestions_created = groups.len() as u64;
    for group in groups {
        insert_suggestion(
            &mut tx,
            &SuggestionBatch {
                id: None,
                account_id,
                vendor: group.vendor,
                category: group.category,
                project: group.project,
                matched_pattern: group.pattern,
                record_ids: group.record_ids,
                status: SuggestionStatus::Pending,
                created_at: None,
            },
        )
        .await?;
    }

    tx.commit().await.map_err(StoreError::from)?;

    tracing::info!(
        account = account_id.0,
        source = source_file,
        imported,
        skipped,
        suggestions = suggestions_created,
        "imported statement"
    );
    Ok(ImportOutcome { imported, skipped, suggestions_created })
}
