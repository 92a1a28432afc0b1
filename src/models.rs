// Core data model for statement reconciliation
// Transactions are immutable once normalized; only MatchResult.status changes,
// and only by explicit reviewer action.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// SOURCES
// ============================================================================

/// Which ledger a transaction came from. The bank side is the source of
/// truth: personal amounts are rewritten to its sign convention, never the
/// other way around.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Source {
    Bank,
    Personal,
}

impl Source {
    /// Human-readable name for display
    pub fn name(&self) -> &str {
        match self {
            Source::Bank => "bank",
            Source::Personal => "personal",
        }
    }
}

// ============================================================================
// TRANSACTION
// ============================================================================

/// A single normalized ledger row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub source: Source,

    /// Calendar date, no time component.
    pub date: NaiveDate,

    /// Exact decimal amount. Signs follow the bank's convention after
    /// sign normalization.
    pub amount: Decimal,

    /// Canonical description: case-folded, whitespace-collapsed,
    /// punctuation-trimmed, aliases substituted.
    pub description: String,

    /// Personal-side only: matched in a prior run, excluded from new
    /// candidate generation.
    pub reconciled: bool,

    /// 1-based line in the original CSV (header is line 1), kept for
    /// error reports and reconciled write-back.
    pub line_number: usize,
}

impl Transaction {
    pub fn new(source: Source, date: NaiveDate, amount: Decimal, description: String) -> Self {
        Transaction {
            source,
            date,
            amount,
            description,
            reconciled: false,
            line_number: 0,
        }
    }

    /// Builder pattern: set the reconciled flag
    pub fn with_reconciled(mut self, reconciled: bool) -> Self {
        self.reconciled = reconciled;
        self
    }

    /// Builder pattern: set the source line number
    pub fn with_line_number(mut self, line_number: usize) -> Self {
        self.line_number = line_number;
        self
    }
}

// ============================================================================
// COLUMN MAPPING
// ============================================================================

/// How the amount is laid out in a CSV.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnFormat {
    /// One signed amount column.
    SignedAmount,
    /// Separate debit and credit columns; the normalizer computes
    /// `credit - debit` so debits come out negative.
    SplitDebitCredit,
}

/// Resolved header indices for one CSV file.
///
/// `date` and `description` are always present; `amount` is present for
/// `SignedAmount` files, `debit`/`credit` for `SplitDebitCredit` files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnMapping {
    pub date: usize,
    pub description: usize,
    pub amount: Option<usize>,
    pub debit: Option<usize>,
    pub credit: Option<usize>,
    pub reconciled: Option<usize>,
    pub format: ColumnFormat,
}

// ============================================================================
// MATCH RESULTS
// ============================================================================

/// Confidence tier classification for matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceTier {
    /// >= 0.9, eligible for auto-accept by the reviewer
    High,
    /// 0.5 - 0.9, requires review
    Medium,
    /// 0.1 - 0.5, weak suggestion
    Low,
    /// < 0.1, no candidate offered
    None,
}

impl ConfidenceTier {
    pub fn from_confidence(confidence: f64) -> Self {
        if confidence >= 0.9 {
            ConfidenceTier::High
        } else if confidence >= 0.5 {
            ConfidenceTier::Medium
        } else if confidence >= 0.1 {
            ConfidenceTier::Low
        } else {
            ConfidenceTier::None
        }
    }

    pub fn name(&self) -> &str {
        match self {
            ConfidenceTier::High => "high",
            ConfidenceTier::Medium => "medium",
            ConfidenceTier::Low => "low",
            ConfidenceTier::None => "none",
        }
    }
}

/// How a match score was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchStrategy {
    /// First two description tokens + exact amount, date ignored
    Intelligent,
    /// Weighted amount/date/description composite
    Fuzzy,
    /// Pair chosen explicitly by the reviewer
    Manual,
}

/// Reviewer decision on a match. The engine always emits `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchStatus {
    Pending,
    Accepted,
    Rejected,
}

/// One bank row paired with at most one personal row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    /// Index into the bank transaction slice
    pub bank_idx: usize,

    /// Index into the personal transaction slice; None means no
    /// candidate was found
    pub personal_idx: Option<usize>,

    /// Confidence score in [0.0, 1.0]
    pub confidence: f64,

    pub tier: ConfidenceTier,
    pub strategy: MatchStrategy,
    pub status: MatchStatus,

    /// Human-readable explanation of match quality
    pub reason: String,
}

impl MatchResult {
    pub fn is_accepted(&self) -> bool {
        self.status == MatchStatus::Accepted
    }
}

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Tunable knobs for a reconciliation run. All weights and thresholds are
/// fixed constants in the matcher; these are the only caller-facing options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchConfig {
    /// Floor below which no suggestion is surfaced at all
    pub min_confidence: f64,

    /// Days either side of a bank row's date a personal row may sit and
    /// still be fuzzy-scored (inclusive)
    pub date_window_days: i64,

    /// Relative amount difference at which amount_score reaches zero
    pub amount_tolerance: f64,
}

impl Default for MatchConfig {
    fn default() -> Self {
        MatchConfig {
            min_confidence: 0.1,
            date_window_days: 3,
            amount_tolerance: 0.10,
        }
    }
}

impl MatchConfig {
    /// Reject invalid configurations before any file is touched.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(ConfigError::MinConfidence(self.min_confidence));
        }
        if self.date_window_days < 0 {
            return Err(ConfigError::DateWindow(self.date_window_days));
        }
        if self.amount_tolerance <= 0.0 {
            return Err(ConfigError::AmountTolerance(self.amount_tolerance));
        }
        Ok(())
    }
}

// ============================================================================
// ERRORS
// ============================================================================

/// A row whose date or amount could not be parsed. The row is excluded from
/// matching and reported to the caller; it never aborts the run.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[error("line {line}: cannot parse {field} value '{value}': {reason}")]
pub struct NormalizationError {
    pub line: usize,
    pub field: &'static str,
    pub value: String,
    pub reason: String,
}

/// Invalid run configuration. Fatal, surfaced before any matching begins.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("min_confidence must be between 0.0 and 1.0, got {0}")]
    MinConfidence(f64),

    #[error("date_window_days must be non-negative, got {0}")]
    DateWindow(i64),

    #[error("amount_tolerance must be positive, got {0}")]
    AmountTolerance(f64),
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_boundaries() {
        assert_eq!(ConfidenceTier::from_confidence(1.0), ConfidenceTier::High);
        assert_eq!(ConfidenceTier::from_confidence(0.9), ConfidenceTier::High);
        assert_eq!(ConfidenceTier::from_confidence(0.89), ConfidenceTier::Medium);
        assert_eq!(ConfidenceTier::from_confidence(0.5), ConfidenceTier::Medium);
        assert_eq!(ConfidenceTier::from_confidence(0.49), ConfidenceTier::Low);
        assert_eq!(ConfidenceTier::from_confidence(0.1), ConfidenceTier::Low);
        assert_eq!(ConfidenceTier::from_confidence(0.09), ConfidenceTier::None);
        assert_eq!(ConfidenceTier::from_confidence(0.0), ConfidenceTier::None);
    }

    #[test]
    fn test_config_defaults_are_valid() {
        assert!(MatchConfig::default().validate().is_ok());
    }

    #[test]
    fn test_config_rejects_min_confidence_out_of_range() {
        let config = MatchConfig {
            min_confidence: 1.5,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::MinConfidence(1.5)));

        let config = MatchConfig {
            min_confidence: -0.1,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_rejects_negative_date_window() {
        let config = MatchConfig {
            date_window_days: -1,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::DateWindow(-1)));
    }

    #[test]
    fn test_config_rejects_non_positive_amount_tolerance() {
        let config = MatchConfig {
            amount_tolerance: 0.0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::AmountTolerance(0.0)));
    }

    #[test]
    fn test_transaction_builder() {
        let tx = Transaction::new(
            Source::Personal,
            NaiveDate::from_ymd_opt(2024, 3, 15).unwrap(),
            Decimal::new(-4250, 2),
            "trader joes".to_string(),
        )
        .with_reconciled(true)
        .with_line_number(23);

        assert_eq!(tx.source, Source::Personal);
        assert_eq!(tx.amount, Decimal::new(-4250, 2));
        assert!(tx.reconciled);
        assert_eq!(tx.line_number, 23);
    }

    #[test]
    fn test_normalization_error_display() {
        let err = NormalizationError {
            line: 7,
            field: "date",
            value: "not-a-date".to_string(),
            reason: "no known date format matched".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "line 7: cannot parse date value 'not-a-date': no known date format matched"
        );
    }
}
