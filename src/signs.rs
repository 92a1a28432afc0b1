// ⚖️ Sign Normalizer - align debit/credit polarity across sources
// One run-level decision computed from aggregate counts, applied uniformly
// to every personal amount. Bank amounts are never touched.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::{Source, Transaction};

// ============================================================================
// SIGN CONVENTION
// ============================================================================

/// Which arithmetic sign a source uses for debits (outflows).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebitSign {
    Negative,
    Positive,
    /// Separate debit/credit columns; debits already normalized to
    /// negative at load time.
    SplitColumns,
}

impl DebitSign {
    pub fn name(&self) -> &str {
        match self {
            DebitSign::Negative => "negative",
            DebitSign::Positive => "positive",
            DebitSign::SplitColumns => "split columns",
        }
    }
}

/// Detected polarity rule for one source, computed once per run.
///
/// The heuristic: everyday spending accounts have more debits than
/// credits, so the dominant sign is the debit sign. Equal counts leave
/// the convention indeterminate (`debit_sign = None`) and no inversion
/// happens — the non-destructive branch. The assumption misfires on
/// accounts where credits dominate (e.g. investment accounts); there is
/// no account-type detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignConvention {
    pub debit_sign: Option<DebitSign>,
    pub positive_count: usize,
    pub negative_count: usize,
}

impl SignConvention {
    /// Infer the convention from normalized amounts.
    pub fn detect(transactions: &[Transaction]) -> Self {
        let positive_count = transactions
            .iter()
            .filter(|t| t.amount > Decimal::ZERO)
            .count();
        let negative_count = transactions
            .iter()
            .filter(|t| t.amount < Decimal::ZERO)
            .count();

        let debit_sign = if positive_count > negative_count {
            Some(DebitSign::Positive)
        } else if negative_count > positive_count {
            Some(DebitSign::Negative)
        } else {
            None
        };

        SignConvention {
            debit_sign,
            positive_count,
            negative_count,
        }
    }

    /// Convention for a split debit/credit file: the loader already made
    /// debits negative, so there is never anything to invert.
    pub fn split_columns(debit_count: usize, credit_count: usize) -> Self {
        SignConvention {
            debit_sign: Some(DebitSign::SplitColumns),
            positive_count: credit_count,
            negative_count: debit_count,
        }
    }

    /// One-line summary for diagnostic display.
    pub fn describe(&self) -> String {
        match self.debit_sign {
            Some(sign) => format!(
                "debit sign '{}' ({} negative / {} positive records)",
                sign.name(),
                self.negative_count,
                self.positive_count
            ),
            None => format!(
                "indeterminate ({} negative / {} positive records)",
                self.negative_count, self.positive_count
            ),
        }
    }
}

/// Non-fatal signal that sign inference ran degraded because a source had
/// no transactions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignInferenceWarning {
    pub source: Source,
}

impl fmt::Display for SignInferenceWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} side has no transactions; sign inference skipped, amounts left as-is",
            self.source.name()
        )
    }
}

// ============================================================================
// INVERSION
// ============================================================================

/// Whether the personal side must be negated to match the bank's
/// convention. Only two determinate, signed-amount conventions that
/// disagree trigger an inversion.
pub fn needs_inversion(bank: &SignConvention, personal: &SignConvention) -> bool {
    match (bank.debit_sign, personal.debit_sign) {
        (Some(b), Some(p)) => {
            b != p && b != DebitSign::SplitColumns && p != DebitSign::SplitColumns
        }
        _ => false,
    }
}

/// Negate every personal amount when the conventions disagree. Returns
/// true when an inversion was applied. Idempotent: a second call re-detects
/// aligned conventions and does nothing.
pub fn normalize_signs(
    bank: &SignConvention,
    personal_convention: &SignConvention,
    personal: &mut [Transaction],
) -> bool {
    if !needs_inversion(bank, personal_convention) {
        return false;
    }

    for tx in personal.iter_mut() {
        tx.amount = -tx.amount;
    }
    true
}

// ============================================================================
// TESTS
// ============================================================================
