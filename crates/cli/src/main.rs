mod config;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use config::{load_file_config, Overrides, Settings};
use data_loader::{
    build_store, CanonicalTitle, ConsolidatedStore, DatasetPaths, EtlOptions, TitleLookup,
};
use orchestrator::{CatalogSpec, EnrichmentSource, MatchOrchestrator, RunSummary};
use pipeline::{FilterConfig, Report, ReportRow, SortKey};
use serde::Serialize;
use sources::{CatalogFormat, MatchConfidence, ResolutionResult};
use std::path::PathBuf;
use std::time::Instant;

/// reel-match - streaming catalog matcher
#[derive(Parser)]
#[command(name = "reel-match")]
#[command(about = "Match streaming catalogs against a consolidated movie dataset", long_about = None)]
struct Cli {
    /// TOML config file (default: ./reel-match.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Consolidated store file
    #[arg(long, env = "REEL_MATCH_STORE", global = true)]
    store: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load the basics and akas dumps into the store
    Build {
        /// title.basics.tsv
        #[arg(long, env = "REEL_MATCH_BASICS")]
        basics: Option<PathBuf>,

        /// title.akas.tsv
        #[arg(long, env = "REEL_MATCH_AKAS")]
        akas: Option<PathBuf>,

        /// Read at most this many lines from each dump
        #[arg(long)]
        limit: Option<u64>,

        /// Rows per store transaction
        #[arg(long)]
        batch_size: Option<usize>,
    },

    /// Print a title and its alternate names as JSON
    LookupId {
        /// Canonical title id, e.g. tt0111161
        id: String,
    },

    /// Print every title whose normalized name matches
    LookupName {
        name: String,
    },

    /// Print how each catalog entry resolves
    Resolve {
        #[command(flatten)]
        catalogs: CatalogArgs,

        /// Provider for catalogs that don't name one
        #[arg(long, default_value = "netflix")]
        provider: String,
    },

    /// Resolve, enrich, filter and print the report
    Report {
        #[command(flatten)]
        catalogs: CatalogArgs,

        /// Keep entries listed by this provider
        #[arg(long)]
        provider: String,

        /// Languages to keep (codes or names, comma-separated)
        #[arg(long, value_delimiter = ',')]
        lang: Vec<String>,

        /// Keep titles released in this year
        #[arg(long)]
        year: Option<u16>,

        /// rating, name or year
        #[arg(long, default_value = "rating")]
        sort_by: SortKey,

        /// Look up ratings for matched titles that have none
        #[arg(long)]
        enrich: bool,

        /// title.ratings.tsv used by --enrich
        #[arg(long, env = "REEL_MATCH_RATINGS")]
        ratings: Option<PathBuf>,

        /// OMDb key used by --enrich when no ratings file is given
        #[arg(long, env = "OMDB_API_KEY", hide_env_values = true)]
        omdb_api_key: Option<String>,

        /// Lookups in flight at once
        #[arg(long)]
        concurrency: Option<usize>,

        /// Print the report and summary as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args)]
struct CatalogArgs {
    /// Catalog file, or directory of cached pages; repeatable
    #[arg(long, required = true)]
    catalog: Vec<PathBuf>,

    /// jsonl, reelgood or whats-on-netflix
    #[arg(long, default_value = "jsonl")]
    format: CatalogFormat,
}

impl CatalogArgs {
    fn specs(&self, provider: &str) -> Vec<CatalogSpec> {
        self.catalog
            .iter()
            .map(|path| CatalogSpec {
                format: self.format,
                path: path.clone(),
                provider: provider.to_string(),
            })
            .collect()
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let file_config = load_file_config(cli.config.as_deref())?;
    let mut overrides = Overrides {
        store: cli.store.clone(),
        ..Overrides::default()
    };

    // Dispatch to appropriate command handler
    match cli.command {
        Commands::Build {
            basics,
            akas,
            limit,
            batch_size,
        } => {
            overrides.basics = basics;
            overrides.akas = akas;
            overrides.row_limit = limit;
            overrides.batch_size = batch_size;
            handle_build(&Settings::resolve(overrides, file_config))?
        }
        Commands::LookupId { id } => {
            handle_lookup_id(&Settings::resolve(overrides, file_config), &id)?
        }
        Commands::LookupName { name } => {
            handle_lookup_name(&Settings::resolve(overrides, file_config), &name)?
        }
        Commands::Resolve { catalogs, provider } => handle_resolve(
            &Settings::resolve(overrides, file_config),
            &catalogs.specs(&provider),
        )?,
        Commands::Report {
            catalogs,
            provider,
            lang,
            year,
            sort_by,
            enrich,
            ratings,
            omdb_api_key,
            concurrency,
            json,
        } => {
            overrides.ratings = ratings;
            overrides.omdb_api_key = omdb_api_key;
            overrides.concurrency = concurrency;
            let settings = Settings::resolve(overrides, file_config);
            let config = FilterConfig::new()
                .with_provider(provider.as_str())
                .with_languages(lang)
                .with_year(year)
                .with_sort_by(sort_by);
            handle_report(&settings, &catalogs.specs(&provider), &config, enrich, json).await?
        }
    }

    Ok(())
}

/// Open a store that `build` has already created
fn open_existing_store(settings: &Settings) -> Result<ConsolidatedStore> {
    if !settings.store_path.exists() {
        bail!(
            "Store {} does not exist; run `reel-match build` first",
            settings.store_path.display()
        );
    }
    ConsolidatedStore::open(&settings.store_path)
        .with_context(|| format!("Failed to open store {}", settings.store_path.display()))
}

/// Handle the 'build' command
fn handle_build(settings: &Settings) -> Result<()> {
    println!(
        "Building {} from {} and {}...",
        settings.store_path.display(),
        settings.basics.display(),
        settings.akas.display()
    );
    let start = Instant::now();

    let mut store = ConsolidatedStore::open(&settings.store_path)
        .with_context(|| format!("Failed to open store {}", settings.store_path.display()))?
        .with_batch_size(settings.batch_size);
    let paths = DatasetPaths {
        basics: settings.basics.clone(),
        akas: settings.akas.clone(),
    };
    let options = EtlOptions {
        row_limit: settings.row_limit,
    };
    let summary = build_store(&mut store, &paths, options).context("Failed to build store")?;
    let (titles, alternates, keys) = store.counts().context("Failed to count store rows")?;
    store.close().context("Failed to close store")?;

    println!("{} Built store in {:.2?}", "✓".green(), start.elapsed());
    print_counts(&[
        ("basics rows read", summary.basics_read),
        ("basics rows skipped", summary.basics_skipped),
        ("titles upserted", summary.titles_upserted),
        ("akas rows read", summary.akas_read),
        ("akas rows skipped", summary.akas_skipped),
        ("akas upserted", summary.akas_upserted),
        ("akas recovered on retry", summary.akas_recovered),
        ("orphan akas dropped", summary.orphans_dropped),
        ("titles in store", titles),
        ("alternate names in store", alternates),
        ("indexed names", keys),
    ]);
    Ok(())
}

#[derive(Serialize)]
struct TitleView {
    #[serde(flatten)]
    title: CanonicalTitle,
    alternate_names: Vec<data_loader::AlternateName>,
}

/// Handle the 'lookup-id' command
fn handle_lookup_id(settings: &Settings, id: &str) -> Result<()> {
    let store = open_existing_store(settings)?;
    let Some(title) = store.lookup_by_id(id)? else {
        bail!("Title {} not found", id);
    };
    let alternate_names = store.alternate_names(id)?;

    let view = TitleView {
        title,
        alternate_names,
    };
    println!("{}", serde_json::to_string_pretty(&view)?);
    Ok(())
}

/// Handle the 'lookup-name' command
fn handle_lookup_name(settings: &Settings, name: &str) -> Result<()> {
    let store = open_existing_store(settings)?;
    let titles = store.lookup_by_normalized_name(name)?;
    if titles.is_empty() {
        eprintln!("{} No titles named '{}'", "✗".red(), name);
    }
    println!("{}", serde_json::to_string_pretty(&titles)?);
    Ok(())
}

/// Handle the 'resolve' command
fn handle_resolve(settings: &Settings, specs: &[CatalogSpec]) -> Result<()> {
    let entries = MatchOrchestrator::read_catalogs(specs)?;
    let mut store = open_existing_store(settings)?;
    let results = MatchOrchestrator::new(&mut store).resolve(&entries)?;

    println!("{}", format!("Resolved {} entries:", results.len()).bold().blue());
    for result in &results {
        print_resolution(result);
    }
    Ok(())
}

/// Handle the 'report' command
async fn handle_report(
    settings: &Settings,
    specs: &[CatalogSpec],
    config: &FilterConfig,
    enrich: bool,
    json: bool,
) -> Result<()> {
    let entries = MatchOrchestrator::read_catalogs(specs)?;
    let mut store = open_existing_store(settings)?;

    let output = {
        let mut orchestrator = MatchOrchestrator::new(&mut store);
        if enrich {
            orchestrator =
                orchestrator.with_enrichment(enrichment_source(settings)?, settings.enrichment);
        }
        orchestrator.run(entries, config).await?
    };
    store.close().context("Failed to close store")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        print_report(&output.report);
        print_summary(&output.summary);
    }
    Ok(())
}

/// A ratings dump when one is configured, else OMDb
fn enrichment_source(settings: &Settings) -> Result<EnrichmentSource> {
    if let Some(path) = &settings.ratings {
        return Ok(EnrichmentSource::RatingsFile(path.clone()));
    }
    match &settings.omdb_api_key {
        Some(api_key) => Ok(EnrichmentSource::Omdb {
            api_key: api_key.clone(),
            base_url: settings.omdb_base_url.clone(),
        }),
        None => bail!("--enrich needs --ratings or an OMDb API key (OMDB_API_KEY)"),
    }
}

// =============================================================================
// Output
// =============================================================================

fn print_resolution(result: &ResolutionResult) {
    let year = result
        .entry
        .year
        .map(|y| y.to_string())
        .unwrap_or_else(|| "????".to_string());
    let target = result.matched_title_id.as_deref().unwrap_or("-");
    println!(
        "{} {} ({}) -> {} [{} candidates]",
        confidence_label(result.confidence),
        result.entry.name,
        year,
        target,
        result.candidate_count
    );
}

fn confidence_label(confidence: MatchConfidence) -> colored::ColoredString {
    let label = format!("{:<18}", confidence.as_str());
    match confidence {
        MatchConfidence::Exact => label.green(),
        MatchConfidence::YearDisambiguated => label.cyan(),
        MatchConfidence::Fuzzy => label.yellow(),
        MatchConfidence::Unresolved => label.red(),
    }
}

fn print_report(report: &Report) {
    println!("{}", "Matched titles:".bold().blue());
    println!(
        "{}",
        format!(
            "{:<4} {:<40} {:<6} {:>6} {:>9}  {:<11} {:<24} {}",
            "#", "Name", "Year", "Rating", "Votes", "Id", "Languages", "Match"
        )
        .bold()
    );
    for (i, row) in report.rows.iter().enumerate() {
        print_row(i + 1, row);
    }
    if report.rows.is_empty() {
        println!("  (none)");
    }

    println!();
    println!("{}", "Unresolved entries:".bold().yellow());
    for row in &report.unresolved {
        println!(
            "  {} ({}) [{}]",
            row.name,
            row.year.map(|y| y.to_string()).unwrap_or_else(|| "????".to_string()),
            row.provider
        );
    }
    if report.unresolved.is_empty() {
        println!("  (none)");
    }
}

fn print_row(rank: usize, row: &ReportRow) {
    let name: String = row.name.chars().take(40).collect();
    let year = row.year.map(|y| y.to_string()).unwrap_or_default();
    let rating = row
        .rating
        .map(|r| format!("{:.1}", r))
        .unwrap_or_else(|| "-".to_string());
    let votes = row.votes.map(|v| v.to_string()).unwrap_or_default();
    let id = row.matched_ids.first().map(String::as_str).unwrap_or("-");
    let languages = row
        .languages
        .iter()
        .chain(row.alternate_languages.iter())
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(",");
    let languages: String = languages.chars().take(24).collect();

    println!(
        "{:<4} {:<40} {:<6} {:>6} {:>9}  {:<11} {:<24} {}",
        format!("{:<4}", rank).green(),
        name,
        year,
        rating,
        votes,
        id,
        languages,
        confidence_label(row.confidence)
    );
}

fn print_summary(summary: &RunSummary) {
    println!();
    println!("{}", "Summary:".bold().blue());
    print_counts(&[
        ("catalog entries", summary.entries as u64),
        ("exact", summary.exact as u64),
        ("year-disambiguated", summary.year_disambiguated as u64),
        ("fuzzy", summary.fuzzy as u64),
        ("unresolved", summary.unresolved as u64),
        ("enrichment requested", summary.enrichment_requested as u64),
        ("enriched", summary.enriched as u64),
        ("enrichment not found", summary.enrichment_not_found as u64),
        ("enrichment failed", summary.enrichment_failed as u64),
        ("report rows", summary.rows as u64),
        ("unresolved rows", summary.unresolved_rows as u64),
    ]);
}

fn print_counts(counts: &[(&str, u64)]) {
    for (label, count) in counts {
        println!("{}{:<26} {}", "• ".cyan(), label, count);
    }
}
