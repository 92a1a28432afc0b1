// Field Normalizer - raw CSV cells into comparable types.
// Pure functions over a single row: no shared state, no I/O. Rows that fail
// here are dropped from matching with the error surfaced, never silently.

use chrono::NaiveDate;
use csv::StringRecord;
use rust_decimal::Decimal;
use std::str::FromStr;

use crate::aliases::AliasLookup;
use crate::models::{ColumnFormat, ColumnMapping, NormalizationError, Source, Transaction};
use crate::text::normalize_description;

// ============================================================================
// DATE PARSING
// ============================================================================

/// Layout hints inferred from a sample of raw date strings, used to
/// disambiguate 03/04/2024-style dates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateHints {
    pub day_first: bool,
    pub year_first: bool,
}

/// Inspect up to ten sample values and decide the date layout.
/// A four-digit leading component means ISO (year-first); a first slash
/// component greater than 12 forces day-first. Defaults to month-first.
pub fn infer_date_hints<'a, I>(samples: I) -> DateHints
where
    I: IntoIterator<Item = &'a str>,
{
    for raw in samples.into_iter().filter(|s| !s.trim().is_empty()).take(10) {
        let s = raw.trim();

        if (s.starts_with("19") || s.starts_with("20")) && s.contains('-') {
            if let Some(first) = s.split('-').next() {
                if first.len() == 4 {
                    return DateHints {
                        day_first: false,
                        year_first: true,
                    };
                }
            }
        }

        if s.contains('/') {
            let parts: Vec<&str> = s.split('/').collect();
            if parts.len() >= 2 {
                if let (Ok(first), Ok(second)) =
                    (parts[0].trim().parse::<u32>(), parts[1].trim().parse::<u32>())
                {
                    if first > 12 && second <= 12 {
                        return DateHints {
                            day_first: true,
                            year_first: false,
                        };
                    }
                }
            }
        }
    }

    DateHints::default()
}

const YEAR_FIRST_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%Y.%m.%d"];
const DAY_FIRST_FORMATS: &[&str] = &["%d/%m/%Y", "%d-%m-%Y", "%d.%m.%Y", "%d/%m/%y"];
const MONTH_FIRST_FORMATS: &[&str] = &["%m/%d/%Y", "%m-%d-%Y", "%m/%d/%y"];
const NAMED_MONTH_FORMATS: &[&str] = &["%b %d %Y", "%b %d, %Y", "%d %b %Y"];

/// Parse a date against the known format lists, hinted layout first.
pub fn parse_date(raw: &str, hints: &DateHints) -> Result<NaiveDate, String> {
    let s = raw.trim();
    if s.is_empty() {
        return Err("empty date".to_string());
    }

    let mut groups: Vec<&[&str]> = Vec::with_capacity(4);
    if hints.year_first {
        groups.push(YEAR_FIRST_FORMATS);
    }
    if hints.day_first {
        groups.push(DAY_FIRST_FORMATS);
    }
    groups.push(YEAR_FIRST_FORMATS);
    groups.push(MONTH_FIRST_FORMATS);
    groups.push(DAY_FIRST_FORMATS);
    groups.push(NAMED_MONTH_FORMATS);

    for format in groups.into_iter().flatten() {
        if let Ok(date) = NaiveDate::parse_from_str(s, format) {
            return Ok(date);
        }
    }

    Err("no known date format matched".to_string())
}

// ============================================================================
// AMOUNT PARSING
// ============================================================================

/// Parse a money string into an exact decimal, stripping currency symbols
/// and thousands separators. Exact equality downstream depends on this
/// never going through binary floating point.
pub fn parse_amount(raw: &str) -> Result<Decimal, String> {
    let cleaned: String = raw
        .trim()
        .trim_start_matches('+')
        .chars()
        .filter(|c| !matches!(c, '$' | '\u{20ac}' | '\u{a3}' | ',') && !c.is_whitespace())
        .collect();

    if cleaned.is_empty() {
        return Err("empty amount".to_string());
    }

    Decimal::from_str(&cleaned).map_err(|_| format!("'{}' is not a decimal number", raw.trim()))
}

/// Reconciled-flag cells: true/1/yes mark a row reconciled, anything else
/// (false/0/empty/missing) does not.
pub fn parse_reconciled_flag(raw: &str) -> bool {
    matches!(raw.trim().to_lowercase().as_str(), "true" | "1" | "yes")
}

// ============================================================================
// ROW NORMALIZATION
// ============================================================================

fn cell<'a>(record: &'a StringRecord, idx: usize) -> &'a str {
    record.get(idx).unwrap_or("")
}

/// Produce a Transaction from one raw row and a resolved column mapping.
///
/// Date and amount failures are NormalizationErrors carrying the original
/// line number. Descriptions are canonicalized and alias-substituted here
/// so every consumer sees the same form.
pub fn normalize_row(
    source: Source,
    line: usize,
    record: &StringRecord,
    mapping: &ColumnMapping,
    hints: &DateHints,
    aliases: &dyn AliasLookup,
) -> Result<Transaction, NormalizationError> {
    let raw_date = cell(record, mapping.date);
    let date = parse_date(raw_date, hints).map_err(|reason| NormalizationError {
        line,
        field: "date",
        value: raw_date.to_string(),
        reason,
    })?;

    let amount = match mapping.format {
        ColumnFormat::SignedAmount => {
            let idx = mapping.amount.expect("signed format resolved an amount column");
            let raw = cell(record, idx);
            parse_amount(raw).map_err(|reason| NormalizationError {
                line,
                field: "amount",
                value: raw.to_string(),
                reason,
            })?
        }
        ColumnFormat::SplitDebitCredit => {
            let debit = split_cell(record, mapping.debit, "debit", line)?;
            let credit = split_cell(record, mapping.credit, "credit", line)?;
            // Credit positive, debit negative: debits come out as outflows
            credit - debit
        }
    };

    let description = {
        let normalized = normalize_description(cell(record, mapping.description));
        aliases.canonical(&normalized).unwrap_or(normalized)
    };

    let reconciled = mapping
        .reconciled
        .map(|idx| parse_reconciled_flag(cell(record, idx)))
        .unwrap_or(false);

    Ok(Transaction::new(source, date, amount, description)
        .with_reconciled(reconciled)
        .with_line_number(line))
}

fn split_cell(
    record: &StringRecord,
    idx: Option<usize>,
    field: &'static str,
    line: usize,
) -> Result<Decimal, NormalizationError> {
    let raw = idx.map(|i| cell(record, i)).unwrap_or("");
    if raw.trim().is_empty() {
        return Ok(Decimal::ZERO);
    }
    parse_amount(raw).map_err(|reason| NormalizationError {
        line,
        field,
        value: raw.to_string(),
        reason,
    })
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aliases::{AliasTable, NoAliases};

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn mapping_signed() -> ColumnMapping {
        ColumnMapping {
            date: 0,
            description: 1,
            amount: Some(2),
            debit: None,
            credit: None,
            reconciled: Some(3),
            format: ColumnFormat::SignedAmount,
        }
    }

    #[test]
    fn test_infer_hints_iso() {
        let hints = infer_date_hints(["2024-03-15", "2024-03-16"]);
        assert!(hints.year_first);
        assert!(!hints.day_first);
    }

    #[test]
    fn test_infer_hints_day_first() {
        let hints = infer_date_hints(["15/03/2024"]);
        assert!(hints.day_first);
    }

    #[test]
    fn test_infer_hints_defaults_to_month_first() {
        let hints = infer_date_hints(["03/04/2024"]);
        assert_eq!(hints, DateHints::default());
    }

    #[test]
    fn test_parse_date_common_formats() {
        let hints = DateHints::default();
        assert_eq!(parse_date("2024-03-15", &hints).unwrap(), ymd(2024, 3, 15));
        assert_eq!(parse_date("03/15/2024", &hints).unwrap(), ymd(2024, 3, 15));
        assert_eq!(parse_date("Mar 15 2024", &hints).unwrap(), ymd(2024, 3, 15));
    }

    #[test]
    fn test_parse_date_respects_day_first_hint() {
        let hints = DateHints {
            day_first: true,
            year_first: false,
        };
        assert_eq!(parse_date("03/04/2024", &hints).unwrap(), ymd(2024, 4, 3));
    }

    #[test]
    fn test_parse_date_unknown_format_fails() {
        assert!(parse_date("the ides of march", &DateHints::default()).is_err());
        assert!(parse_date("", &DateHints::default()).is_err());
    }

    #[test]
    fn test_parse_amount_strips_symbols() {
        assert_eq!(parse_amount("$1,234.56").unwrap(), Decimal::new(123456, 2));
        assert_eq!(parse_amount("-$855.94").unwrap(), Decimal::new(-85594, 2));
        assert_eq!(parse_amount("+42.50").unwrap(), Decimal::new(4250, 2));
    }

    #[test]
    fn test_parse_amount_rejects_garbage() {
        assert!(parse_amount("N/A").is_err());
        assert!(parse_amount("").is_err());
    }

    #[test]
    fn test_amount_round_trips() {
        // Formatting a normalized decimal and re-parsing yields an equal value
        for raw in ["-42.50", "0.01", "1234.5678", "1000000"] {
            let parsed = parse_amount(raw).unwrap();
            let reparsed = parse_amount(&parsed.to_string()).unwrap();
            assert_eq!(parsed, reparsed);
        }
    }

    #[test]
    fn test_parse_reconciled_flag() {
        assert!(parse_reconciled_flag("true"));
        assert!(parse_reconciled_flag("TRUE"));
        assert!(parse_reconciled_flag("1"));
        assert!(parse_reconciled_flag("yes"));
        assert!(!parse_reconciled_flag("false"));
        assert!(!parse_reconciled_flag("0"));
        assert!(!parse_reconciled_flag(""));
    }

    #[test]
    fn test_normalize_row_signed() {
        let record = StringRecord::from(vec!["03/15/2024", "TRADER JOE'S #123", "-$42.50", ""]);
        let tx = normalize_row(
            Source::Bank,
            2,
            &record,
            &mapping_signed(),
            &DateHints::default(),
            &NoAliases,
        )
        .unwrap();

        assert_eq!(tx.date, ymd(2024, 3, 15));
        assert_eq!(tx.amount, Decimal::new(-4250, 2));
        assert_eq!(tx.description, "trader joes #123");
        assert!(!tx.reconciled);
        assert_eq!(tx.line_number, 2);
    }

    #[test]
    fn test_normalize_row_applies_aliases() {
        let aliases = AliasTable::new([("amzn mktp".to_string(), "amazon".to_string())]);
        let record = StringRecord::from(vec!["03/15/2024", "AMZN MKTP US 123", "-9.99", ""]);
        let tx = normalize_row(
            Source::Personal,
            5,
            &record,
            &mapping_signed(),
            &DateHints::default(),
            &aliases,
        )
        .unwrap();

        assert_eq!(tx.description, "amazon us 123");
    }

    #[test]
    fn test_normalize_row_reconciled_flag() {
        let record = StringRecord::from(vec!["03/15/2024", "coffee", "-4.50", "true"]);
        let tx = normalize_row(
            Source::Personal,
            3,
            &record,
            &mapping_signed(),
            &DateHints::default(),
            &NoAliases,
        )
        .unwrap();
        assert!(tx.reconciled);
    }

    #[test]
    fn test_normalize_row_bad_date_reports_line() {
        let record = StringRecord::from(vec!["soon", "coffee", "-4.50", ""]);
        let err = normalize_row(
            Source::Bank,
            7,
            &record,
            &mapping_signed(),
            &DateHints::default(),
            &NoAliases,
        )
        .unwrap_err();

        assert_eq!(err.line, 7);
        assert_eq!(err.field, "date");
        assert_eq!(err.value, "soon");
    }

    #[test]
    fn test_normalize_row_split_debit_credit() {
        let mapping = ColumnMapping {
            date: 0,
            description: 1,
            amount: None,
            debit: Some(2),
            credit: Some(3),
            reconciled: None,
            format: ColumnFormat::SplitDebitCredit,
        };

        // Debit-only row comes out negative
        let record = StringRecord::from(vec!["03/15/2024", "groceries", "42.50", ""]);
        let tx = normalize_row(
            Source::Bank,
            2,
            &record,
            &mapping,
            &DateHints::default(),
            &NoAliases,
        )
        .unwrap();
        assert_eq!(tx.amount, Decimal::new(-4250, 2));

        // Credit-only row comes out positive
        let record = StringRecord::from(vec!["03/16/2024", "payment", "", "100.00"]);
        let tx = normalize_row(
            Source::Bank,
            3,
            &record,
            &mapping,
            &DateHints::default(),
            &NoAliases,
        )
        .unwrap();
        assert_eq!(tx.amount, Decimal::new(10000, 2));
    }
}
