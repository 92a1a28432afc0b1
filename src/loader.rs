// CSV ingestion - header detection, row normalization, reconciled write-back
// Per-row normalization failures are collected and reported, never fatal:
// one bad row must not abort a whole statement.

use anyhow::{bail, Context, Result};
use csv::{ReaderBuilder, StringRecord, Writer};
use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::aliases::AliasLookup;
use crate::models::{ColumnFormat, ColumnMapping, NormalizationError, Source, Transaction};
use crate::normalize::{infer_date_hints, normalize_row};
use crate::signs::SignConvention;
use crate::text::levenshtein;

// ============================================================================
// COLUMN DETECTION
// ============================================================================

const DATE_COLUMNS: &[&str] = &["post date", "transaction date", "date", "trans date", "posted"];
const AMOUNT_COLUMNS: &[&str] = &["amount", "amt", "usd", "value"];
const DEBIT_COLUMNS: &[&str] = &["debit", "withdrawal", "money out"];
const CREDIT_COLUMNS: &[&str] = &["credit", "deposit", "money in"];
const DESCRIPTION_COLUMNS: &[&str] = &["description", "desc", "memo", "merchant", "payee", "details"];
const RECONCILED_COLUMNS: &[&str] = &["reconciled"];

/// Find a header for one field: exact match first, then substring either
/// way, then edit distance <= 2 for headers long enough for a typo.
fn find_column(headers_lower: &[String], keywords: &[&str]) -> Option<usize> {
    for keyword in keywords {
        if let Some(idx) = headers_lower.iter().position(|h| h == keyword) {
            return Some(idx);
        }
    }

    for keyword in keywords {
        if let Some(idx) = headers_lower
            .iter()
            .position(|h| !h.is_empty() && (h.contains(keyword) || keyword.contains(h.as_str())))
        {
            return Some(idx);
        }
    }

    for keyword in keywords {
        if let Some(idx) = headers_lower
            .iter()
            .position(|h| h.len() >= 4 && levenshtein(h, keyword) <= 2)
        {
            return Some(idx);
        }
    }

    None
}

/// Resolve the column mapping for a header row, or fail if the required
/// fields (date, description, and either a signed amount column or a
/// debit/credit pair) cannot be found.
pub fn detect_columns(headers: &[String]) -> Result<ColumnMapping> {
    let headers_lower: Vec<String> = headers.iter().map(|h| h.trim().to_lowercase()).collect();

    let date = find_column(&headers_lower, DATE_COLUMNS);
    let amount = find_column(&headers_lower, AMOUNT_COLUMNS);
    let debit = find_column(&headers_lower, DEBIT_COLUMNS);
    let credit = find_column(&headers_lower, CREDIT_COLUMNS);
    let description = find_column(&headers_lower, DESCRIPTION_COLUMNS);
    let reconciled = find_column(&headers_lower, RECONCILED_COLUMNS);

    let format = if debit.is_some() && credit.is_some() {
        ColumnFormat::SplitDebitCredit
    } else {
        ColumnFormat::SignedAmount
    };

    let mut unresolved = Vec::new();
    if date.is_none() {
        unresolved.push("date");
    }
    if description.is_none() {
        unresolved.push("description");
    }
    if format == ColumnFormat::SignedAmount && amount.is_none() {
        unresolved.push("amount (or debit/credit pair)");
    }

    if !unresolved.is_empty() {
        bail!(
            "could not resolve required column(s): {} (headers were: {})",
            unresolved.join(", "),
            headers.join(", ")
        );
    }

    Ok(ColumnMapping {
        date: date.expect("checked above"),
        description: description.expect("checked above"),
        amount,
        debit,
        credit,
        reconciled,
        format,
    })
}

// ============================================================================
// LOADING
// ============================================================================

/// One parsed CSV: normalized transactions, the resolved mapping, the
/// sign convention observed in the file, and the rows that failed.
#[derive(Debug)]
pub struct LoadedFile {
    pub transactions: Vec<Transaction>,
    pub headers: Vec<String>,
    pub mapping: ColumnMapping,
    pub convention: SignConvention,
    pub errors: Vec<NormalizationError>,
}

/// Load and normalize a CSV file.
pub fn load_csv(path: &Path, source: Source, aliases: &dyn AliasLookup) -> Result<LoadedFile> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    load_csv_from_reader(file, source, aliases)
        .with_context(|| format!("failed to load {}", path.display()))
}

/// Load from any reader; `load_csv` and the tests both funnel through here.
pub fn load_csv_from_reader<R: Read>(
    reader: R,
    source: Source,
    aliases: &dyn AliasLookup,
) -> Result<LoadedFile> {
    let mut csv_reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let headers: Vec<String> = csv_reader
        .headers()
        .context("failed to read CSV headers")?
        .iter()
        .map(|h| h.to_string())
        .collect();

    let mapping = detect_columns(&headers)?;

    let mut records: Vec<StringRecord> = Vec::new();
    for (idx, result) in csv_reader.records().enumerate() {
        let record =
            result.with_context(|| format!("failed to parse CSV line {}", idx + 2))?;
        records.push(record);
    }

    let hints = infer_date_hints(
        records
            .iter()
            .take(10)
            .filter_map(|r| r.get(mapping.date)),
    );

    let mut transactions = Vec::new();
    let mut errors = Vec::new();
    let mut debit_cells = 0usize;
    let mut credit_cells = 0usize;

    for (idx, record) in records.iter().enumerate() {
        let line = idx + 2; // 1-indexed plus header row

        if mapping.format == ColumnFormat::SplitDebitCredit {
            if has_value(record, mapping.debit) {
                debit_cells += 1;
            }
            if has_value(record, mapping.credit) {
                credit_cells += 1;
            }
        }

        match normalize_row(source, line, record, &mapping, &hints, aliases) {
            Ok(tx) => transactions.push(tx),
            Err(err) => errors.push(err),
        }
    }

    let convention = match mapping.format {
        ColumnFormat::SplitDebitCredit => SignConvention::split_columns(debit_cells, credit_cells),
        ColumnFormat::SignedAmount => SignConvention::detect(&transactions),
    };

    Ok(LoadedFile {
        transactions,
        headers,
        mapping,
        convention,
        errors,
    })
}

fn has_value(record: &StringRecord, idx: Option<usize>) -> bool {
    idx.and_then(|i| record.get(i))
        .map(|v| !v.trim().is_empty())
        .unwrap_or(false)
}

// ============================================================================
// RECONCILED WRITE-BACK
// ============================================================================

/// Rewrite a personal CSV marking the given source lines `reconciled =
/// true`, adding the column if the file does not have one. Returns the
/// number of rows updated.
pub fn mark_reconciled(path: &Path, lines: &HashSet<usize>) -> Result<usize> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut csv_reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(file);

    let mut headers: Vec<String> = csv_reader
        .headers()
        .context("failed to read CSV headers")?
        .iter()
        .map(|h| h.to_string())
        .collect();

    let reconciled_idx = match headers
        .iter()
        .position(|h| h.trim().to_lowercase() == "reconciled")
    {
        Some(idx) => idx,
        None => {
            headers.push("reconciled".to_string());
            headers.len() - 1
        }
    };

    let records: Vec<StringRecord> = csv_reader
        .records()
        .collect::<std::result::Result<_, _>>()
        .context("failed to parse CSV records")?;

    let mut writer = Writer::from_path(path)
        .with_context(|| format!("failed to rewrite {}", path.display()))?;
    writer.write_record(&headers)?;

    let mut updated = 0usize;
    for (idx, record) in records.iter().enumerate() {
        let line = idx + 2;
        let mut row: Vec<String> = record.iter().map(|v| v.to_string()).collect();
        row.resize(headers.len(), String::new());

        if lines.contains(&line) {
            row[reconciled_idx] = "true".to_string();
            updated += 1;
        }
        writer.write_record(&row)?;
    }

    writer.flush()?;
    Ok(updated)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aliases::NoAliases;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    fn load(data: &str) -> LoadedFile {
        load_csv_from_reader(data.as_bytes(), Source::Personal, &NoAliases).unwrap()
    }

    #[test]
    fn test_detect_columns_generic() {
        let headers: Vec<String> = ["Date", "Description", "Amount", "Reconciled"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let mapping = detect_columns(&headers).unwrap();

        assert_eq!(mapping.format, ColumnFormat::SignedAmount);
        assert_eq!(mapping.date, 0);
        assert_eq!(mapping.description, 1);
        assert_eq!(mapping.amount, Some(2));
        assert_eq!(mapping.reconciled, Some(3));
    }

    #[test]
    fn test_detect_columns_split_debit_credit() {
        let headers: Vec<String> = ["Post Date", "Memo", "Debit", "Credit"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let mapping = detect_columns(&headers).unwrap();

        assert_eq!(mapping.format, ColumnFormat::SplitDebitCredit);
        assert_eq!(mapping.debit, Some(2));
        assert_eq!(mapping.credit, Some(3));
        assert_eq!(mapping.amount, None);
    }

    #[test]
    fn test_detect_columns_prefers_post_date() {
        let headers: Vec<String> = ["Transaction Date", "Post Date", "Description", "Amount"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let mapping = detect_columns(&headers).unwrap();
        assert_eq!(mapping.date, 1);
    }

    #[test]
    fn test_detect_columns_fuzzy_typo() {
        // "Descripton" is one edit away from "description"
        let headers: Vec<String> = ["Date", "Descripton", "Amount"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let mapping = detect_columns(&headers).unwrap();
        assert_eq!(mapping.description, 1);
    }

    #[test]
    fn test_detect_columns_unresolvable() {
        let headers: Vec<String> = ["Foo", "Bar"].iter().map(|s| s.to_string()).collect();
        let err = detect_columns(&headers).unwrap_err();
        assert!(err.to_string().contains("date"));
    }

    #[test]
    fn test_load_generic_csv() {
        let data = "\
Date,Description,Amount,Reconciled
03/15/2024,TRADER JOE'S #123,-42.50,false
03/16/2024,PAYROLL DEPOSIT,2000.00,
03/17/2024,COFFEE SHOP,-4.25,true
";
        let loaded = load(data);

        assert_eq!(loaded.transactions.len(), 3);
        assert!(loaded.errors.is_empty());

        let tx = &loaded.transactions[0];
        assert_eq!(tx.date, NaiveDate::from_ymd_opt(2024, 3, 15).unwrap());
        assert_eq!(tx.amount, Decimal::new(-4250, 2));
        assert_eq!(tx.description, "trader joes #123");
        assert_eq!(tx.line_number, 2);

        assert!(loaded.transactions[2].reconciled);
        assert!(!loaded.transactions[1].reconciled);
    }

    #[test]
    fn test_load_collects_bad_rows_and_continues() {
        let data = "\
Date,Description,Amount
03/15/2024,coffee,-4.25
not-a-date,lunch,-12.00
03/17/2024,books,not-a-number
03/18/2024,groceries,-60.00
";
        let loaded = load(data);

        assert_eq!(loaded.transactions.len(), 2);
        assert_eq!(loaded.errors.len(), 2);
        assert_eq!(loaded.errors[0].line, 3);
        assert_eq!(loaded.errors[0].field, "date");
        assert_eq!(loaded.errors[1].line, 4);
        assert_eq!(loaded.errors[1].field, "amount");
    }

    #[test]
    fn test_load_split_debit_credit() {
        let data = "\
Post Date,Memo,Debit,Credit
03/15/2024,grocery store,42.50,
03/16/2024,card payment,,100.00
03/17/2024,hardware store,19.99,
";
        let loaded = load(data);

        assert_eq!(loaded.transactions.len(), 3);
        assert_eq!(loaded.transactions[0].amount, Decimal::new(-4250, 2));
        assert_eq!(loaded.transactions[1].amount, Decimal::new(10000, 2));

        // Split files carry their convention from the columns themselves
        assert_eq!(loaded.convention.negative_count, 2);
        assert_eq!(loaded.convention.positive_count, 1);
    }

    #[test]
    fn test_load_infers_day_first_dates() {
        let data = "\
Date,Description,Amount
25/03/2024,coffee,-4.25
26/03/2024,lunch,-12.00
";
        let loaded = load(data);
        assert_eq!(
            loaded.transactions[0].date,
            NaiveDate::from_ymd_opt(2024, 3, 25).unwrap()
        );
    }

    #[test]
    fn test_load_detects_sign_convention() {
        let data = "\
Date,Description,Amount
03/15/2024,coffee,-4.25
03/16/2024,lunch,-12.00
03/17/2024,payroll,2000.00
";
        let loaded = load(data);
        assert_eq!(loaded.convention.negative_count, 2);
        assert_eq!(loaded.convention.positive_count, 1);
    }

    #[test]
    fn test_mark_reconciled_round_trip() {
        let path = std::env::temp_dir().join(format!(
            "statement_recon_markers_{}.csv",
            std::process::id()
        ));
        std::fs::write(
            &path,
            "Date,Description,Amount\n03/15/2024,coffee,-4.25\n03/16/2024,lunch,-12.00\n",
        )
        .unwrap();

        let lines: HashSet<usize> = [3].into_iter().collect();
        let updated = mark_reconciled(&path, &lines).unwrap();
        assert_eq!(updated, 1);

        let reloaded =
            load_csv_from_reader(File::open(&path).unwrap(), Source::Personal, &NoAliases)
                .unwrap();
        assert!(!reloaded.transactions[0].reconciled);
        assert!(reloaded.transactions[1].reconciled);

        // A second pass sees the column already present
        let more: HashSet<usize> = [2].into_iter().collect();
        let updated = mark_reconciled(&path, &more).unwrap();
        assert_eq!(updated, 1);
        let reloaded =
            load_csv_from_reader(File::open(&path).unwrap(), Source::Personal, &NoAliases)
                .unwrap();
        assert!(reloaded.transactions[0].reconciled);
        assert!(reloaded.transactions[1].reconciled);

        std::fs::remove_file(&path).ok();
    }
}
