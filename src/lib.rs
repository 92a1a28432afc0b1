// Statement Reconciliation - Core Library
// Exposes all modules for use in the CLI, the review TUI, and tests

pub mod models;
pub mod text;
pub mod normalize;     // Field Normalizer - raw cells into comparable types
pub mod signs;         // Sign Normalizer - debit/credit polarity alignment
pub mod matcher;       // Candidate Filter + Scorer + Classifier
pub mod loader;        // CSV ingestion and reconciled write-back
pub mod aliases;       // Merchant alias store (SQLite) and lookup seam

// Re-export commonly used types
pub use models::{
    ColumnFormat, ColumnMapping, ConfidenceTier, ConfigError, MatchConfig, MatchResult,
    MatchStatus, MatchStrategy, NormalizationError, Source, Transaction,
};
pub use matcher::{
    manual_match, match_reason, reconcile, reconcile_with_conventions, ManualMatchError,
    MatchReport, INTELLIGENT_CONFIDENCE,
};
pub use signs::{DebitSign, SignConvention, SignInferenceWarning};
pub use loader::{detect_columns, load_csv, load_csv_from_reader, mark_reconciled, LoadedFile};
pub use aliases::{AliasLookup, AliasStore, AliasTable, MerchantAlias, NoAliases};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
