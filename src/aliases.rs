// Merchant alias store - SQLite-backed canonical merchant names
// The store is the only source of merchant equivalence: both the intelligent
// and fuzzy paths see descriptions after alias substitution.

use anyhow::{bail, Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;

// ============================================================================
// LOOKUP SEAM
// ============================================================================

/// Alias lookup consumed by the field normalizer. Implementations must be
/// pure and I/O-free; the engine only ever sees in-memory snapshots.
pub trait AliasLookup {
    /// Canonical form for a normalized description, or None if no alias
    /// applies.
    fn canonical(&self, description: &str) -> Option<String>;
}

/// Lookup that knows nothing. Used when no alias database is configured.
pub struct NoAliases;

impl AliasLookup for NoAliases {
    fn canonical(&self, _description: &str) -> Option<String> {
        None
    }
}

// ============================================================================
// IN-MEMORY TABLE
// ============================================================================

/// Immutable snapshot of the alias store for use during normalization.
///
/// Substitution is longest-match-first: an exact hit on the whole
/// description wins, otherwise the longest alias that prefixes the
/// description (on a token boundary) is replaced and the remainder kept.
#[derive(Debug, Clone, Default)]
pub struct AliasTable {
    entries: HashMap<String, String>,
    /// Alias keys sorted by length descending (ties alphabetical) so the
    /// prefix scan is deterministic.
    ordered: Vec<String>,
}

impl AliasTable {
    pub fn new<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let entries: HashMap<String, String> = entries
            .into_iter()
            .map(|(alias, canonical)| (alias.trim().to_lowercase(), canonical.trim().to_lowercase()))
            .filter(|(alias, _)| !alias.is_empty())
            .collect();

        let mut ordered: Vec<String> = entries.keys().cloned().collect();
        ordered.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));

        AliasTable { entries, ordered }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

impl AliasLookup for AliasTable {
    fn canonical(&self, description: &str) -> Option<String> {
        if let Some(canonical) = self.entries.get(description) {
            return Some(canonical.clone());
        }

        for alias in &self.ordered {
            if let Some(rest) = description.strip_prefix(alias.as_str()) {
                if rest.starts_with(' ') {
                    return Some(format!("{}{}", self.entries[alias], rest));
                }
            }
        }

        None
    }
}

// ============================================================================
// SQLITE STORE
// ============================================================================

/// One alias row as stored.
#[derive(Debug, Clone, PartialEq)]
pub struct MerchantAlias {
    pub canonical: String,
    pub alias: String,
    pub usage_count: i64,
}

/// SQLite database of merchant aliases with usage counting.
pub struct AliasStore {
    conn: Connection,
}

impl AliasStore {
    /// Open (or create) the store at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open alias database: {}", path.display()))?;
        let store = AliasStore { conn };
        store.create_table()?;
        Ok(store)
    }

    /// In-memory store, used by tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("failed to open in-memory database")?;
        let store = AliasStore { conn };
        store.create_table()?;
        Ok(store)
    }

    fn create_table(&self) -> Result<()> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS aliases (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                canonical TEXT NOT NULL,
                alias TEXT NOT NULL UNIQUE,
                created_at TEXT NOT NULL,
                usage_count INTEGER NOT NULL DEFAULT 0
            )",
            [],
        )?;
        Ok(())
    }

    /// Add an alias mapping. An existing alias is repointed at the new
    /// canonical name.
    pub fn add(&self, canonical: &str, alias: &str) -> Result<()> {
        let canonical = canonical.trim().to_lowercase();
        let alias = alias.trim().to_lowercase();

        if canonical.is_empty() {
            bail!("canonical name cannot be empty");
        }
        if alias.is_empty() {
            bail!("alias cannot be empty");
        }

        self.conn.execute(
            "INSERT INTO aliases (canonical, alias, created_at, usage_count)
             VALUES (?1, ?2, ?3, 0)
             ON CONFLICT(alias) DO UPDATE SET canonical = excluded.canonical",
            params![canonical, alias, chrono::Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Look up the canonical name for an alias, bumping its usage count
    /// when found.
    pub fn canonical_for(&self, alias: &str) -> Result<Option<String>> {
        let alias = alias.trim().to_lowercase();

        let canonical: Option<String> = self
            .conn
            .query_row(
                "SELECT canonical FROM aliases WHERE alias = ?1",
                params![alias],
                |row| row.get(0),
            )
            .optional()?;

        if canonical.is_some() {
            self.conn.execute(
                "UPDATE aliases SET usage_count = usage_count + 1 WHERE alias = ?1",
                params![alias],
            )?;
        }

        Ok(canonical)
    }

    /// Delete an alias. Returns true if a row was removed.
    pub fn remove(&self, alias: &str) -> Result<bool> {
        let alias = alias.trim().to_lowercase();
        let deleted = self
            .conn
            .execute("DELETE FROM aliases WHERE alias = ?1", params![alias])?;
        Ok(deleted > 0)
    }

    /// All aliases, most-used first.
    pub fn list(&self) -> Result<Vec<MerchantAlias>> {
        let mut stmt = self.conn.prepare(
            "SELECT canonical, alias, usage_count FROM aliases
             ORDER BY usage_count DESC, alias ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(MerchantAlias {
                canonical: row.get(0)?,
                alias: row.get(1)?,
                usage_count: row.get(2)?,
            })
        })?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    /// Seed well-known processor prefixes. Existing aliases are left alone.
    pub fn seed_defaults(&self) -> Result<()> {
        const DEFAULTS: &[(&str, &str)] = &[
            ("amazon", "amzn mktp"),
            ("amazon", "amzn digital"),
            ("amazon", "amazon.com"),
            ("starbucks", "sbux"),
            ("mcdonalds", "mcd"),
            ("walmart", "wal-mart"),
            ("paypal", "pp"),
        ];

        for (canonical, alias) in DEFAULTS {
            self.conn.execute(
                "INSERT OR IGNORE INTO aliases (canonical, alias, created_at, usage_count)
                 VALUES (?1, ?2, ?3, 0)",
                params![canonical, alias, chrono::Utc::now().to_rfc3339()],
            )?;
        }
        Ok(())
    }

    /// Snapshot the whole store into an in-memory table for the engine.
    pub fn snapshot(&self) -> Result<AliasTable> {
        let aliases = self.list()?;
        Ok(AliasTable::new(
            aliases.into_iter().map(|a| (a.alias, a.canonical)),
        ))
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn table(entries: &[(&str, &str)]) -> AliasTable {
        AliasTable::new(
            entries
                .iter()
                .map(|(a, c)| (a.to_string(), c.to_string())),
        )
    }

    #[test]
    fn test_table_exact_match() {
        let t = table(&[("amzn mktp", "amazon")]);
        assert_eq!(t.canonical("amzn mktp").as_deref(), Some("amazon"));
    }

    #[test]
    fn test_table_prefix_substitution_keeps_remainder() {
        let t = table(&[("amzn mktp", "amazon")]);
        assert_eq!(
            t.canonical("amzn mktp us 123").as_deref(),
            Some("amazon us 123")
        );
    }

    #[test]
    fn test_table_longest_match_wins() {
        let t = table(&[("amzn", "amazon"), ("amzn mktp", "amazon marketplace")]);
        assert_eq!(
            t.canonical("amzn mktp us").as_deref(),
            Some("amazon marketplace us")
        );
    }

    #[test]
    fn test_table_no_mid_token_prefix() {
        // "amzn" must not rewrite "amznx store"
        let t = table(&[("amzn", "amazon")]);
        assert_eq!(t.canonical("amznx store"), None);
    }

    #[test]
    fn test_table_miss() {
        let t = table(&[("amzn", "amazon")]);
        assert_eq!(t.canonical("starbucks"), None);
    }

    #[test]
    fn test_no_aliases_always_none() {
        assert_eq!(NoAliases.canonical("anything"), None);
    }

    #[test]
    fn test_store_add_and_lookup() {
        let store = AliasStore::open_in_memory().unwrap();
        store.add("Amazon", "AMZN MKTP").unwrap();

        assert_eq!(
            store.canonical_for("amzn mktp").unwrap().as_deref(),
            Some("amazon")
        );
        assert_eq!(store.canonical_for("unknown").unwrap(), None);
    }

    #[test]
    fn test_store_lookup_bumps_usage_count() {
        let store = AliasStore::open_in_memory().unwrap();
        store.add("amazon", "amzn").unwrap();

        store.canonical_for("amzn").unwrap();
        store.canonical_for("amzn").unwrap();

        let aliases = store.list().unwrap();
        assert_eq!(aliases.len(), 1);
        assert_eq!(aliases[0].usage_count, 2);
    }

    #[test]
    fn test_store_add_repoints_existing_alias() {
        let store = AliasStore::open_in_memory().unwrap();
        store.add("amazon", "amzn").unwrap();
        store.add("amazon marketplace", "amzn").unwrap();

        assert_eq!(
            store.canonical_for("amzn").unwrap().as_deref(),
            Some("amazon marketplace")
        );
        assert_eq!(store.list().unwrap().len(), 1);
    }

    #[test]
    fn test_store_rejects_empty_names() {
        let store = AliasStore::open_in_memory().unwrap();
        assert!(store.add("", "amzn").is_err());
        assert!(store.add("amazon", "  ").is_err());
    }

    #[test]
    fn test_store_remove() {
        let store = AliasStore::open_in_memory().unwrap();
        store.add("amazon", "amzn").unwrap();

        assert!(store.remove("amzn").unwrap());
        assert!(!store.remove("amzn").unwrap());
        assert_eq!(store.canonical_for("amzn").unwrap(), None);
    }

    #[test]
    fn test_store_snapshot_feeds_table() {
        let store = AliasStore::open_in_memory().unwrap();
        store.add("amazon", "amzn mktp").unwrap();

        let snapshot = store.snapshot().unwrap();
        assert_eq!(
            snapshot.canonical("amzn mktp us").as_deref(),
            Some("amazon us")
        );
    }

    #[test]
    fn test_seed_defaults_is_idempotent() {
        let store = AliasStore::open_in_memory().unwrap();
        store.seed_defaults().unwrap();
        let first = store.list().unwrap().len();
        store.seed_defaults().unwrap();
        assert_eq!(store.list().unwrap().len(), first);
        assert!(first > 0);
    }
}
