// 🔍 Matching engine - pair bank rows with personal rows
// Two strategies per pair: intelligent exact-amount match and weighted fuzzy
// match. Greedy score-descending resolution keeps one personal row from
// being claimed twice; a losing bank row falls to its next-best candidate.

use chrono::{Duration, NaiveDate};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{
    ConfidenceTier, ConfigError, MatchConfig, MatchResult, MatchStatus, MatchStrategy, Source,
    Transaction,
};
use crate::signs::{self, SignConvention, SignInferenceWarning};
use crate::text::{first_two_tokens, token_similarity};

// ============================================================================
// SCORING CONSTANTS
// ============================================================================

/// Confidence assigned by an intelligent match. Fixed, not configurable.
pub const INTELLIGENT_CONFIDENCE: f64 = 0.90;

const AMOUNT_WEIGHT: f64 = 0.3;
const DATE_WEIGHT: f64 = 0.3;
const DESCRIPTION_WEIGHT: f64 = 0.4;

/// Floor for the relative-difference denominator so zero-amount rows
/// cannot divide by zero.
const AMOUNT_EPSILON: f64 = 0.01;

// ============================================================================
// REPORT
// ============================================================================

/// Output of one reconciliation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchReport {
    /// One entry per matched bank row, ordered by bank index
    pub matches: Vec<MatchResult>,

    /// Bank rows with no candidate at or above the confidence floor
    pub missing: Vec<usize>,

    /// Eligible personal rows no bank row claimed
    pub unmatched_personal: Vec<usize>,

    pub bank_convention: SignConvention,
    pub personal_convention: SignConvention,

    /// Whether personal amounts were negated to match the bank
    pub personal_inverted: bool,

    pub warnings: Vec<SignInferenceWarning>,
}

impl MatchReport {
    pub fn tier_count(&self, tier: ConfidenceTier) -> usize {
        self.matches.iter().filter(|m| m.tier == tier).count()
    }
}

/// Manual matching over indices the reviewer picked.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ManualMatchError {
    #[error("bank index {idx} out of range for {len} rows")]
    BankIndex { idx: usize, len: usize },

    #[error("personal index {idx} out of range for {len} rows")]
    PersonalIndex { idx: usize, len: usize },
}

// ============================================================================
// CANDIDATE FILTER
// ============================================================================

/// Personal rows dated strictly after this cannot yet appear on the
/// statement: latest bank date plus one day of cushion.
pub fn statement_cutoff(bank: &[Transaction]) -> Option<NaiveDate> {
    bank.iter().map(|t| t.date).max().map(|d| d + Duration::days(1))
}

/// Indices of personal rows eligible for matching: not already reconciled
/// and not past the statement's coverage window.
pub fn eligible_personal(personal: &[Transaction], cutoff: Option<NaiveDate>) -> Vec<usize> {
    personal
        .iter()
        .enumerate()
        .filter(|(_, t)| !t.reconciled)
        .filter(|(_, t)| cutoff.map_or(true, |c| t.date <= c))
        .map(|(i, _)| i)
        .collect()
}

// ============================================================================
// SCORER
// ============================================================================

/// Intelligent match: exact amount plus matching first two description
/// tokens. Date proximity is ignored entirely — the combination is strong
/// enough evidence on its own. Descriptions with fewer than two tokens
/// never qualify.
fn intelligent_match(bank: &Transaction, personal: &Transaction) -> Option<f64> {
    if bank.amount != personal.amount {
        return None;
    }

    let bank_tokens = first_two_tokens(&bank.description)?;
    let personal_tokens = first_two_tokens(&personal.description)?;

    (bank_tokens == personal_tokens).then_some(INTELLIGENT_CONFIDENCE)
}

/// 1.0 on exact equality, linearly decaying in the relative difference,
/// zero at or beyond the configured tolerance.
fn amount_score(bank: Decimal, personal: Decimal, tolerance: f64) -> f64 {
    if bank == personal {
        return 1.0;
    }

    let delta = (bank - personal).abs().to_f64().unwrap_or(f64::MAX);
    let base = bank.abs().to_f64().unwrap_or(0.0).max(AMOUNT_EPSILON);
    (1.0 - (delta / base) / tolerance).clamp(0.0, 1.0)
}

/// 1.0 at zero day difference, linearly decaying to 0.0 at the window
/// boundary, zero outside.
fn date_score(bank: NaiveDate, personal: NaiveDate, window_days: i64) -> f64 {
    let diff = (bank - personal).num_days().abs();
    if diff == 0 {
        1.0
    } else if diff <= window_days {
        1.0 - diff as f64 / window_days as f64
    } else {
        0.0
    }
}

/// Weighted fuzzy composite, clamped to [0, 1] and rounded to 4 decimals
/// for stable display and deterministic comparisons.
fn fuzzy_score(bank: &Transaction, personal: &Transaction, config: &MatchConfig) -> f64 {
    let amount = amount_score(bank.amount, personal.amount, config.amount_tolerance);
    let date = date_score(bank.date, personal.date, config.date_window_days);
    let description = token_similarity(&bank.description, &personal.description);

    let composite = AMOUNT_WEIGHT * amount + DATE_WEIGHT * date + DESCRIPTION_WEIGHT * description;
    round4(composite.clamp(0.0, 1.0))
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

fn within_window(bank: &Transaction, personal: &Transaction, window_days: i64) -> bool {
    (bank.date - personal.date).num_days().abs() <= window_days
}

/// Score one pair. The fuzzy path only applies inside the date window;
/// the intelligent path is exempt. When both apply the higher score wins,
/// with the intelligent strategy taking an exact tie.
fn score_pair(
    bank: &Transaction,
    personal: &Transaction,
    config: &MatchConfig,
) -> Option<(f64, MatchStrategy)> {
    let intelligent = intelligent_match(bank, personal);
    let fuzzy = within_window(bank, personal, config.date_window_days)
        .then(|| fuzzy_score(bank, personal, config));

    match (intelligent, fuzzy) {
        (Some(i), Some(f)) if f > i => Some((f, MatchStrategy::Fuzzy)),
        (Some(i), _) => Some((i, MatchStrategy::Intelligent)),
        (None, Some(f)) => Some((f, MatchStrategy::Fuzzy)),
        (None, None) => None,
    }
}

/// Human-readable explanation of match quality for review screens.
pub fn match_reason(bank: &Transaction, personal: &Transaction) -> String {
    let mut reasons = Vec::with_capacity(3);

    if bank.amount == personal.amount {
        reasons.push("exact amount".to_string());
    } else {
        reasons.push("different amount".to_string());
    }

    let days = (bank.date - personal.date).num_days().abs();
    match days {
        0 => reasons.push("same date".to_string()),
        1 => reasons.push("1 day apart".to_string()),
        n => reasons.push(format!("{} days apart", n)),
    }

    let similarity = token_similarity(&bank.description, &personal.description);
    if similarity >= 0.95 {
        reasons.push("nearly identical description".to_string());
    } else if similarity >= 0.8 {
        reasons.push("similar description".to_string());
    } else {
        reasons.push("different description".to_string());
    }

    reasons.join(", ")
}

// ============================================================================
// CLASSIFIER
// ============================================================================

struct Candidate {
    score: f64,
    strategy: MatchStrategy,
    bank_idx: usize,
    personal_idx: usize,
}

fn find_matches(bank: &[Transaction], personal: &[Transaction], config: &MatchConfig) -> (Vec<MatchResult>, Vec<usize>, Vec<usize>) {
    let cutoff = statement_cutoff(bank);
    let eligible = eligible_personal(personal, cutoff);

    // Score every floor-clearing pair
    let mut candidates = Vec::new();
    for (bank_idx, bank_tx) in bank.iter().enumerate() {
        for &personal_idx in &eligible {
            if let Some((score, strategy)) = score_pair(bank_tx, &personal[personal_idx], config) {
                if score >= config.min_confidence {
                    candidates.push(Candidate {
                        score,
                        strategy,
                        bank_idx,
                        personal_idx,
                    });
                }
            }
        }
    }

    // Deterministic greedy order: score descending, then bank index, then
    // personal index. A bank row whose best candidate is taken picks up
    // its next-best remaining pair later in the same pass.
    candidates.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then(a.bank_idx.cmp(&b.bank_idx))
            .then(a.personal_idx.cmp(&b.personal_idx))
    });

    let mut bank_assigned = vec![false; bank.len()];
    let mut personal_taken = vec![false; personal.len()];
    let mut matches = Vec::new();

    for candidate in candidates {
        if bank_assigned[candidate.bank_idx] || personal_taken[candidate.personal_idx] {
            continue;
        }
        bank_assigned[candidate.bank_idx] = true;
        personal_taken[candidate.personal_idx] = true;

        matches.push(MatchResult {
            bank_idx: candidate.bank_idx,
            personal_idx: Some(candidate.personal_idx),
            confidence: candidate.score,
            tier: ConfidenceTier::from_confidence(candidate.score),
            strategy: candidate.strategy,
            status: MatchStatus::Pending,
            reason: match_reason(&bank[candidate.bank_idx], &personal[candidate.personal_idx]),
        });
    }

    matches.sort_by_key(|m| m.bank_idx);

    let missing: Vec<usize> = (0..bank.len()).filter(|&i| !bank_assigned[i]).collect();
    let unmatched_personal: Vec<usize> = eligible
        .into_iter()
        .filter(|&i| !personal_taken[i])
        .collect();

    (matches, missing, unmatched_personal)
}

// ============================================================================
// ENGINE ENTRY POINTS
// ============================================================================

/// Full run with caller-supplied sign conventions (the loader knows them
/// for split debit/credit files). Validates the configuration, aligns
/// personal signs to the bank, then filters, scores and classifies.
pub fn reconcile_with_conventions(
    bank: &[Transaction],
    personal: &mut [Transaction],
    bank_convention: SignConvention,
    personal_convention: SignConvention,
    config: &MatchConfig,
) -> Result<MatchReport, ConfigError> {
    config.validate()?;

    let mut warnings = Vec::new();
    if bank.is_empty() {
        warnings.push(SignInferenceWarning {
            source: Source::Bank,
        });
    }
    if personal.is_empty() {
        warnings.push(SignInferenceWarning {
            source: Source::Personal,
        });
    }

    let personal_inverted =
        signs::normalize_signs(&bank_convention, &personal_convention, personal);

    let (matches, missing, unmatched_personal) = find_matches(bank, personal, config);

    Ok(MatchReport {
        matches,
        missing,
        unmatched_personal,
        bank_convention,
        personal_convention,
        personal_inverted,
        warnings,
    })
}

/// Convenience entry: detect both sign conventions from the normalized
/// amounts, then run.
pub fn reconcile(
    bank: &[Transaction],
    personal: &mut [Transaction],
    config: &MatchConfig,
) -> Result<MatchReport, ConfigError> {
    let bank_convention = SignConvention::detect(bank);
    let personal_convention = SignConvention::detect(personal);
    reconcile_with_conventions(bank, personal, bank_convention, personal_convention, config)
}

/// Build a reviewer-chosen match. The pair is scored with the fuzzy
/// composite (no window eligibility requirement) and stays Pending until
/// the reviewer accepts it.
pub fn manual_match(
    bank: &[Transaction],
    personal: &[Transaction],
    bank_idx: usize,
    personal_idx: usize,
    config: &MatchConfig,
) -> Result<MatchResult, ManualMatchError> {
    let bank_tx = bank.get(bank_idx).ok_or(ManualMatchError::BankIndex {
        idx: bank_idx,
        len: bank.len(),
    })?;
    let personal_tx = personal
        .get(personal_idx)
        .ok_or(ManualMatchError::PersonalIndex {
            idx: personal_idx,
            len: personal.len(),
        })?;

    let confidence = fuzzy_score(bank_tx, personal_tx, config);

    Ok(MatchResult {
        bank_idx,
        personal_idx: Some(personal_idx),
        confidence,
        tier: ConfidenceTier::from_confidence(confidence),
        strategy: MatchStrategy::Manual,
        status: MatchStatus::Pending,
        reason: format!("manual match: {}", match_reason(bank_tx, personal_tx)),
    })
}

// ============================================================================
// TESTS
// ============================================================================
