// Only compile the review UI when the TUI feature is enabled
#[cfg(feature = "tui")]
mod ui;

use anyhow::{bail, Result};
use std::collections::HashSet;
use std::env;
use std::path::{Path, PathBuf};

use statement_recon::{
    load_csv, mark_reconciled, reconcile_with_conventions, AliasStore, AliasTable, ConfidenceTier,
    LoadedFile, MatchConfig, MatchReport, MatchStatus, Source, Transaction,
};

const DEFAULT_ALIAS_DB: &str = "data/aliases.db";

fn main() -> Result<()> {
    let args: Vec<String> = env::args().skip(1).collect();

    match args.first().map(String::as_str) {
        None | Some("--help") | Some("-h") => {
            print_usage();
            Ok(())
        }
        Some("aliases") => run_aliases(&args[1..]),
        _ => {
            let options = parse_options(&args)?;
            run_reconcile(options)
        }
    }
}

fn print_usage() {
    println!("statement-recon {}", statement_recon::VERSION);
    println!();
    println!("Reconcile personal CSV records against a bank statement.");
    println!("The bank side is the source of truth; personal amounts are");
    println!("rewritten to its sign convention and scored against it.");
    println!();
    println!("USAGE:");
    println!("  statement-recon <bank.csv> <personal.csv> [OPTIONS]");
    println!("  statement-recon aliases list|add <canonical> <alias>|remove <alias>");
    println!();
    println!("OPTIONS:");
    println!("  -c, --min-confidence <float>   Floor below which no suggestion is shown (default 0.1)");
    println!("  -d, --date-window <days>       Days around a bank date to fuzzy-match (default 3)");
    println!("      --dry-run                  Print results without launching the review UI");
    println!("      --json                     Print the full report as JSON and exit");
    println!("      --alias-db <path>          Merchant alias database (default {DEFAULT_ALIAS_DB})");
    println!("      --no-aliases               Skip the alias database entirely");
}

// ============================================================================
// ARGUMENT PARSING
// ============================================================================

struct Options {
    bank: PathBuf,
    personal: PathBuf,
    min_confidence: f64,
    date_window: i64,
    dry_run: bool,
    json: bool,
    alias_db: PathBuf,
    no_aliases: bool,
}

fn parse_options(args: &[String]) -> Result<Options> {
    let mut positional: Vec<PathBuf> = Vec::new();
    let mut min_confidence = 0.1;
    let mut date_window = 3;
    let mut dry_run = false;
    let mut json = false;
    let mut alias_db = PathBuf::from(DEFAULT_ALIAS_DB);
    let mut no_aliases = false;

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-c" | "--min-confidence" => {
                let value = iter
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("{arg} requires a value"))?;
                min_confidence = value
                    .parse()
                    .map_err(|_| anyhow::anyhow!("invalid value for {arg}: {value}"))?;
            }
            "-d" | "--date-window" => {
                let value = iter
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("{arg} requires a value"))?;
                date_window = value
                    .parse()
                    .map_err(|_| anyhow::anyhow!("invalid value for {arg}: {value}"))?;
            }
            "--alias-db" => {
                let value = iter
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("{arg} requires a value"))?;
                alias_db = PathBuf::from(value);
            }
            "--dry-run" => dry_run = true,
            "--json" => json = true,
            "--no-aliases" => no_aliases = true,
            other if other.starts_with('-') => bail!("unknown option: {other}"),
            other => positional.push(PathBuf::from(other)),
        }
    }

    if positional.len() != 2 {
        bail!("expected exactly two files: <bank.csv> <personal.csv> (run with --help for usage)");
    }

    let mut positional = positional.into_iter();
    Ok(Options {
        bank: positional.next().expect("length checked"),
        personal: positional.next().expect("length checked"),
        min_confidence,
        date_window,
        dry_run,
        json,
        alias_db,
        no_aliases,
    })
}

// ============================================================================
// RECONCILE
// ============================================================================

fn run_reconcile(options: Options) -> Result<()> {
    // Configuration errors abort before any file is opened
    let config = MatchConfig {
        min_confidence: options.min_confidence,
        date_window_days: options.date_window,
        ..Default::default()
    };
    config.validate()?;

    if !options.bank.exists() {
        bail!("bank statement not found: {}", options.bank.display());
    }
    if !options.personal.exists() {
        bail!("personal records not found: {}", options.personal.display());
    }

    let aliases = open_alias_table(&options)?;

    println!("📂 Loading bank statement: {}", options.bank.display());
    let bank = load_csv(&options.bank, Source::Bank, &aliases)?;
    report_load(&bank, &options.bank);

    println!("📂 Loading personal records: {}", options.personal.display());
    let personal = load_csv(&options.personal, Source::Personal, &aliases)?;
    report_load(&personal, &options.personal);

    println!(
        "\nLoaded {} bank records, {} personal records",
        bank.transactions.len(),
        personal.transactions.len()
    );
    println!("Bank:     {}", bank.convention.describe());
    println!("Personal: {}", personal.convention.describe());

    let bank_txs = bank.transactions;
    let mut personal_txs = personal.transactions;

    let mut report = reconcile_with_conventions(
        &bank_txs,
        &mut personal_txs,
        bank.convention,
        personal.convention,
        &config,
    )?;

    if report.personal_inverted {
        println!("\nNormalizing signs: personal records use the opposite convention, flipping amounts");
    }
    for warning in &report.warnings {
        eprintln!("⚠️  {warning}");
    }

    // Reviewer-side policy: High-tier matches start out accepted
    for m in report.matches.iter_mut() {
        if m.tier == ConfidenceTier::High {
            m.status = MatchStatus::Accepted;
        }
    }

    if options.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    print_summary(&report);

    if options.dry_run {
        print_matches(&report, &bank_txs, &personal_txs);
        println!("\nDry run complete. Use --min-confidence to adjust the floor.");
        println!("Run without --dry-run to review matches interactively.");
        return Ok(());
    }

    run_review(bank_txs, personal_txs, report, config, &options.personal)
}

fn open_alias_table(options: &Options) -> Result<AliasTable> {
    if options.no_aliases {
        return Ok(AliasTable::default());
    }

    if let Some(parent) = options.alias_db.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let store = AliasStore::open(&options.alias_db)?;
    store.seed_defaults()?;
    let table = store.snapshot()?;
    println!("Loaded {} merchant aliases", table.len());
    Ok(table)
}

fn report_load(loaded: &LoadedFile, path: &Path) {
    println!(
        "  Using columns: date='{}', description='{}'",
        loaded.headers[loaded.mapping.date], loaded.headers[loaded.mapping.description]
    );
    for error in &loaded.errors {
        eprintln!("⚠️  {}: {}", path.display(), error);
    }
    if !loaded.errors.is_empty() {
        eprintln!(
            "⚠️  Skipped {} unparseable row(s) in {}",
            loaded.errors.len(),
            path.display()
        );
    }
}

fn print_summary(report: &MatchReport) {
    let high = report.tier_count(ConfidenceTier::High);
    let medium = report.tier_count(ConfidenceTier::Medium);
    let low = report.tier_count(ConfidenceTier::Low);

    println!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("MATCHING RESULTS");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("  ⭐ High confidence (>=0.9): {high} [auto-accepted]");
    println!("  ○ Medium confidence (0.5-0.9): {medium}");
    println!("  ○ Low confidence (0.1-0.5): {low}");
    println!("  - Missing from personal records: {}", report.missing.len());
    println!("  + Unmatched personal records: {}", report.unmatched_personal.len());
    println!("\n  Total matches: {}", report.matches.len());
    if !report.matches.is_empty() {
        println!(
            "  Accept rate: {high}/{} ({:.1}%)",
            report.matches.len(),
            high as f64 / report.matches.len() as f64 * 100.0
        );
    }
}

fn print_matches(report: &MatchReport, bank: &[Transaction], personal: &[Transaction]) {
    if !report.matches.is_empty() {
        println!("\n---------------------------------------------");
        println!("MATCHES (bank -> personal)");
        println!("---------------------------------------------");
        for m in &report.matches {
            let bank_tx = &bank[m.bank_idx];
            match m.personal_idx {
                Some(pi) => {
                    let personal_tx = &personal[pi];
                    println!(
                        "  [{}] {:.2} ${} -> ${}",
                        m.tier.name(),
                        m.confidence,
                        bank_tx.amount,
                        personal_tx.amount
                    );
                    println!(
                        "      {} -> {}",
                        truncate(&bank_tx.description, 40),
                        truncate(&personal_tx.description, 40)
                    );
                }
                None => {
                    println!(
                        "  [{}] {:.2} ${} -> (no match)",
                        m.tier.name(),
                        m.confidence,
                        bank_tx.amount
                    );
                    println!("      {}", truncate(&bank_tx.description, 40));
                }
            }
        }
    }

    print_transaction_list("MISSING FROM PERSONAL RECORDS", &report.missing, bank);
    print_transaction_list(
        "UNMATCHED PERSONAL RECORDS",
        &report.unmatched_personal,
        personal,
    );
}

fn print_transaction_list(title: &str, indices: &[usize], transactions: &[Transaction]) {
    if indices.is_empty() {
        return;
    }

    println!("\n---------------------------------------------");
    println!("{title} ({} records)", indices.len());
    println!("---------------------------------------------");
    for &idx in indices.iter().take(10) {
        let tx = &transactions[idx];
        println!(
            "  {} | ${} | {}",
            tx.date,
            tx.amount,
            truncate(&tx.description, 60)
        );
    }
    if indices.len() > 10 {
        println!("  ... and {} more", indices.len() - 10);
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max).collect();
        format!("{cut}…")
    }
}

// ============================================================================
// INTERACTIVE REVIEW
// ============================================================================

#[cfg(feature = "tui")]
fn run_review(
    bank: Vec<Transaction>,
    personal: Vec<Transaction>,
    report: MatchReport,
    config: MatchConfig,
    personal_path: &Path,
) -> Result<()> {
    println!("\nLaunching review UI... (press 'q' to quit)\n");

    let mut app = ui::App::new(bank, personal, report, config);
    ui::run_ui(&mut app)?;

    if app.save_requested {
        let lines: HashSet<usize> = app.accepted_personal_lines();
        if lines.is_empty() {
            println!("\nNo accepted matches to save.");
        } else {
            let updated = mark_reconciled(personal_path, &lines)?;
            println!(
                "\n✓ Marked {updated} personal record(s) reconciled in {}",
                personal_path.display()
            );
        }
    } else {
        println!("\nReview closed without saving.");
    }

    Ok(())
}

#[cfg(not(feature = "tui"))]
fn run_review(
    _bank: Vec<Transaction>,
    _personal: Vec<Transaction>,
    _report: MatchReport,
    _config: MatchConfig,
    _personal_path: &Path,
) -> Result<()> {
    eprintln!("❌ Interactive review not available!");
    eprintln!("   Rebuild with: cargo build --features tui");
    eprintln!("   Or use --dry-run / --json for non-interactive output.");
    std::process::exit(1);
}

// ============================================================================
// ALIAS MANAGEMENT
// ============================================================================

fn run_aliases(args: &[String]) -> Result<()> {
    let mut alias_db = PathBuf::from(DEFAULT_ALIAS_DB);
    let mut positional: Vec<&String> = Vec::new();

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--alias-db" => {
                let value = iter
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("--alias-db requires a value"))?;
                alias_db = PathBuf::from(value);
            }
            other if other.starts_with('-') => bail!("unknown option: {other}"),
            _ => positional.push(arg),
        }
    }

    if let Some(parent) = alias_db.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let store = AliasStore::open(&alias_db)?;

    match positional.as_slice() {
        [cmd] if cmd.as_str() == "list" => {
            let aliases = store.list()?;
            if aliases.is_empty() {
                println!("No aliases stored.");
                return Ok(());
            }
            println!("{:<30} {:<30} {:>6}", "ALIAS", "CANONICAL", "USES");
            for alias in aliases {
                println!(
                    "{:<30} {:<30} {:>6}",
                    alias.alias, alias.canonical, alias.usage_count
                );
            }
            Ok(())
        }
        [cmd, canonical, alias] if cmd.as_str() == "add" => {
            store.add(canonical, alias)?;
            println!(
                "✓ Added alias '{}' -> '{}'",
                alias.to_lowercase(),
                canonical.to_lowercase()
            );
            Ok(())
        }
        [cmd, alias] if cmd.as_str() == "remove" => {
            if store.remove(alias)? {
                println!("✓ Removed alias '{}'", alias.to_lowercase());
            } else {
                println!("Alias '{}' not found", alias.to_lowercase());
            }
            Ok(())
        }
        _ => bail!("usage: statement-recon aliases list|add <canonical> <alias>|remove <alias>"),
    }
}
