use chrono::NaiveDate;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use std::str::FromStr;
use thiserror::Error;

/// The five-column Wells Fargo export layout, headerless:
/// `date, amount, star, empty, description`. Kept verbatim as the record's
/// raw payload so the original row survives any later parsing changes.
#[derive(Debug, Clone, Serialize)]
pub struct RawRow {
    pub date: String,
    pub amount: String,
    pub star: String,
    pub empty: String,
    pub description: String,
}

/// One successfully parsed statement row.
#[derive(Debug, Clone)]
pub struct StatementRow {
    pub date: NaiveDate,
    pub description: String,
    pub amount_cents: i64,
    pub raw: RawRow,
}

/// Row-level outcome: invalid rows are reported, not fatal. The importer
/// counts them as skipped and keeps going.
#[derive(Debug)]
pub enum RowParse {
    Valid(StatementRow),
    Invalid { line: u64, reason: RowError },
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RowError {
    #[error("Invalid date: {0}")]
    InvalidDate(String),
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
}

/// Batch-level failures. Any of these aborts the import before a single row
/// is written.
#[derive(Debug, Error)]
pub enum StatementError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("Expected 5 columns, found {found} on line {line}")]
    WrongColumnCount { line: u64, found: usize },
    #[error("Statement has no rows")]
    Empty,
}

/// Parses a full statement file. Structural problems (unreadable CSV, wrong
/// column count, no rows at all) fail the whole batch; per-row date/amount
/// problems come back as `RowParse::Invalid`.
pub fn parse_statement(content: &[u8]) -> Result<Vec<RowParse>, StatementError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(content);

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result?;
        let line = record.position().map_or(0, |p| p.line());

        if record.len() != 5 {
            return Err(StatementError::WrongColumnCount { line, found: record.len() });
        }

        let raw = RawRow {
            date: record[0].to_string(),
            amount: record[1].to_string(),
            star: record[2].to_string(),
            empty: record[3].to_string(),
            description: record[4].to_string(),
        };

        let date = match parse_date(&raw.date) {
            Ok(d) => d,
            Err(reason) => {
                rows.push(RowParse::Invalid { line, reason });
                continue;
            }
        };
        let amount_cents = match parse_amount(&raw.amount) {
            Ok(a) => a,
            Err(reason) => {
                rows.push(RowParse::Invalid { line, reason });
                continue;
            }
        };

        rows.push(RowParse::Valid(StatementRow {
            date,
            description: raw.description.trim().to_string(),
            amount_cents,
            raw,
        }));
    }

    if rows.is_empty() {
        return Err(StatementError::Empty);
    }
    Ok(rows)
}

fn parse_date(s: &str) -> Result<NaiveDate, RowError> {
    let s = s.trim();

    // Wells Fargo exports use %m/%d/%Y; try it first so ambiguous
    // day/month values resolve the American way.
    for fmt in &[
        "%m/%d/%Y", "%Y-%m-%d", "%d/%m/%Y", "%Y/%m/%d", "%m-%d-%Y", "%d-%m-%Y",
    ] {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            return Ok(date);
        }
    }

    Err(RowError::InvalidDate(s.to_string()))
}

fn parse_amount(s: &str) -> Result<i64, RowError> {
    let s = s.trim();
    let (negative, s) = if s.starts_with('(') && s.ends_with(')') {
        (true, &s[1..s.len() - 1])
    } else {
        (false, s)
    };
    let s = s.replace([',', '$', ' '], "");
    let mut dec = Decimal::from_str(&s).map_err(|_| RowError::InvalidAmount(s.clone()))?;
    if negative {
        dec = -dec;
    }
    (dec * Decimal::from(100))
        .round()
        .to_i64()
        .ok_or(RowError::InvalidAmount(s))
}
