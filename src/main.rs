//! Extracts a deduplicated, annotated song library from MobileSheets storage.
//!
//! Phases run one after another, because classification needs the complete
//! file set and the complete database view:
//!
//! 1. Scan and hash files matching the masks
//! 2. Enrich songs from `MobileSheets.db` (opened read-only, closed after)
//! 3. Classify duplicates by content hash, then by file name
//! 4. Copy files by state
//! 5. Write augmented ChordPro copies, `Songs.csv`, list files and the
//!    cleanup script

use anyhow::{Context, Result};
use clap::Parser;
use std::time::Instant;
use tracing::info;
use tracing_subscriber::EnvFilter;

use mobilesheets_extract::classify::apply_classification;
use mobilesheets_extract::cli::{Args, Config};
use mobilesheets_extract::database;
use mobilesheets_extract::error::ExtractError;
use mobilesheets_extract::export::Exporter;
use mobilesheets_extract::models::ExtractStats;
use mobilesheets_extract::progress::{format_duration, set_log_only};
use mobilesheets_extract::safety::validate_output_root;
use mobilesheets_extract::scan::{scan_songs, FileMasks};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(config: &Config) -> Result<ExtractStats> {
    let start = Instant::now();
    let mut stats = ExtractStats::default();

    validate_output_root(&config.output, &config.input)?;

    info!("Scanning {}", config.input.display());
    let masks = FileMasks::new(&config.masks)?;
    let mut songs = scan_songs(&config.input, &masks).context("Failed to scan input folder")?;
    stats.files_scanned = songs.len();

    let summary = database::load(&config.input, &mut songs)
        .context("Failed to read MobileSheets database")?;
    stats.database_matches = summary.matched_rows;
    stats.unmatched_database_rows = summary.unmatched_rows;

    apply_classification(&mut songs);

    let exporter = Exporter::new(&config.output, &config.input, &config.date_time_prefix);
    exporter
        .export_all(&songs, &summary, &mut stats)
        .context("Export failed")?;

    stats.elapsed_seconds = start.elapsed().as_secs_f64();
    Ok(stats)
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = match args.into_config() {
        Ok(config) => config,
        Err(ExtractError::Usage(text)) => {
            println!("{}", text);
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    set_log_only(config.log_only);
    init_tracing();

    let stats = run(&config)?;

    println!("\n{:=<60}", "");
    println!("Extraction complete!");
    println!("  Files scanned: {}", stats.files_scanned);
    println!(
        "  Database matches: {} ({} rows without a file)",
        stats.database_matches, stats.unmatched_database_rows
    );
    println!(
        "  Unique: {}  Preferred: {}  Obsolete: {}",
        stats.unique, stats.preferred, stats.obsolete
    );
    println!(
        "  Augmented: {} ({} skipped)",
        stats.augmented, stats.augment_failures
    );
    println!(
        "  Set lists: {}  Collections: {}",
        stats.set_lists, stats.collections
    );
    println!("  Cleanup candidates: {}", stats.cleanup_candidates);
    println!(
        "  Elapsed: {}",
        format_duration(std::time::Duration::from_secs_f64(stats.elapsed_seconds))
    );
    println!("{:=<60}", "");

    if let Some(path) = &config.stats {
        stats
            .write_to_file(path)
            .with_context(|| format!("Failed to write stats to {}", path.display()))?;
        println!("Stats written to {}", path.display());
    }

    Ok(())
}
