//! # Butterfly-tags CLI
//!
//! Command-line interface for the butterfly-tags library.
//! Searches OpenStreetMap tag catalogues and builds or runs Overpass queries.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use butterfly_tags::{
    build_query, retry_on_network_error, BoundingBox, Downloader, ElementKind, Language, Overlay,
    OverlayRenderer, OverlayRequest, ResultKind, SearchResult, SourceConfig, TagCatalog,
};
use clap::{Parser, Subcommand};
use log::error;

mod cli;

/// Command-line interface for butterfly-tags
#[derive(Parser, Debug)]
#[command(name = "butterfly-tags")]
#[command(about = "OpenStreetMap tag search and Overpass query builder")]
#[command(long_about = "Searches taginfo catalogues and turns tags into Overpass queries:
  butterfly-tags keys aparcament                       # Keys matching a word
  butterfly-tags values cafe --key amenity             # Values of one key
  butterfly-tags values wheel --yes-no                 # Boolean (yes/no) tags
  butterfly-tags query amenity fuel --bbox=-1,40,1,42  # Print the Overpass query
  butterfly-tags run shop --bbox=-1,40,1,42            # Execute it and count features

Catalogues (taginfo_simple_{lang}.csv) are read from --csv-dir, or fetched
from --csv-url when given.")]
#[command(version = env!("BUTTERFLY_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Catalogue language: ca, es or en [env: BUTTERFLY_TAGS_LANG]
    #[arg(long, global = true, value_parser = parse_language)]
    lang: Option<Language>,

    /// Directory holding the catalogue CSVs [env: BUTTERFLY_TAGS_CSV_DIR]
    #[arg(long, global = true)]
    csv_dir: Option<PathBuf>,

    /// Base URL serving the catalogue CSVs [env: BUTTERFLY_TAGS_CSV_URL]
    #[arg(long, global = true)]
    csv_url: Option<String>,

    /// Overpass interpreter endpoint [env: BUTTERFLY_OVERPASS_URL]
    #[arg(long, global = true)]
    overpass_url: Option<String>,

    /// Print results as JSON on stdout
    #[arg(long, global = true)]
    json: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Search tag keys
    Keys {
        /// Free text, matched against keys, definitions and localized names
        query: String,

        /// Maximum number of results
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },

    /// Search tag values
    Values {
        /// Free text, matched against values, definitions and localized names
        query: String,

        /// Only search values of this key
        #[arg(short, long)]
        key: Option<String>,

        /// Maximum number of results
        #[arg(short, long, default_value_t = 10)]
        limit: usize,

        /// Search the yes/no catalogue instead
        #[arg(long)]
        yes_no: bool,
    },

    /// Print the Overpass query for a tag
    Query(TagArgs),

    /// Execute the Overpass query for a tag and summarize the result
    Run(TagArgs),
}

#[derive(clap::Args, Debug, Clone)]
struct TagArgs {
    /// Tag key, e.g. "amenity"
    key: String,

    /// Tag value; omit to match any value of the key
    value: Option<String>,

    /// Bounding box as minLon,minLat,maxLon,maxLat
    #[arg(long, allow_hyphen_values = true, value_parser = parse_bbox)]
    bbox: BoundingBox,

    /// Element types to match, comma-separated
    #[arg(long, value_delimiter = ',', default_value = "node,way,relation", value_parser = parse_kind)]
    types: Vec<ElementKind>,
}

impl TagArgs {
    fn bbox_coords(&self) -> [f64; 4] {
        [self.bbox.min_lon, self.bbox.min_lat, self.bbox.max_lon, self.bbox.max_lat]
    }

    fn to_request(&self) -> OverlayRequest {
        OverlayRequest::new(self.key.clone(), self.value.clone(), self.bbox_coords()).with_kinds(self.types.clone())
    }
}

fn parse_language(s: &str) -> std::result::Result<Language, String> {
    s.parse()
}

fn parse_bbox(s: &str) -> std::result::Result<BoundingBox, String> {
    s.parse().map_err(|e: butterfly_tags::Error| e.to_string())
}

fn parse_kind(s: &str) -> std::result::Result<ElementKind, String> {
    s.parse().map_err(|e: butterfly_tags::Error| e.to_string())
}

/// Configuration from the environment, overridden by command-line flags
fn resolve_config(cli: &Cli) -> SourceConfig {
    let mut config = SourceConfig::from_env();
    if let Some(dir) = &cli.csv_dir {
        config.csv_dir = dir.clone();
    }
    if let Some(url) = &cli.csv_url {
        config.csv_base_url = Some(url.clone());
    }
    if let Some(url) = &cli.overpass_url {
        config.overpass_url = url.clone();
    }
    if let Some(language) = cli.lang {
        config.language = language;
    }
    config
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("❌ Error: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging to stderr
    let default_filter = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .target(env_logger::Target::Stderr)
        .init();

    if cli.verbose {
        eprintln!("🦋 Butterfly-tags v{} starting...", env!("BUTTERFLY_VERSION"));
    }

    let config = resolve_config(&cli);

    match &cli.command {
        Command::Keys { query, limit } => {
            let catalog = TagCatalog::with_config(config.clone());
            let progress = cli::ProgressManager::new(&format!("📚 Searching keys in {} catalogue", config.language), cli.json);
            let results = catalog
                .search_keys(config.language, query, *limit)
                .await
                .context("Key search failed")?;
            progress.clear();
            print_results(&results, cli.json)?;
        }
        Command::Values {
            query,
            key,
            limit,
            yes_no,
        } => {
            let catalog = TagCatalog::with_config(config.clone());
            let progress = cli::ProgressManager::new(&format!("📚 Searching values in {} catalogue", config.language), cli.json);
            let search = if *yes_no {
                catalog
                    .search_boolean_values(config.language, query, key.as_deref(), *limit)
                    .await
            } else {
                catalog
                    .search_values(config.language, query, key.as_deref(), *limit)
                    .await
            };
            let results = search.context("Value search failed")?;
            progress.clear();

            if let (false, Some(key)) = (*yes_no, key) {
                if let Some(suggestion) = catalog.suggest_key(config.language, key).await? {
                    eprintln!("💡 Key '{key}' not found. Did you mean '{suggestion}'?");
                }
            }
            print_results(&results, cli.json)?;
        }
        Command::Query(args) => {
            let Some(query) = build_query(&args.key, args.value.as_deref(), &args.bbox_coords(), &args.types) else {
                bail!("Cannot build a query for key '{}'", args.key);
            };
            if cli.json {
                println!("{}", serde_json::json!({ "query": query }));
            } else {
                println!("{query}");
            }
        }
        Command::Run(args) => {
            if cli.verbose {
                eprintln!("🌐 Overpass endpoint: {}", config.overpass_url);
            }
            let renderer = OverlayRenderer::new(Downloader::with_config(config));
            let request = args.to_request();

            let progress = cli::ProgressManager::new(&format!("🚀 Querying {}", request.overlay_id()), cli.json);
            let overlay = retry_on_network_error(|| renderer.execute(request.clone()))
                .await
                .with_context(|| format!("Query for '{}' failed", request.overlay_id()))?;
            progress.finish(&format!("✅ {} done in {}ms", overlay.id, overlay.elapsed_ms));

            print_overlay(&overlay, cli.json)?;
        }
    }

    Ok(())
}

/// One human-readable line per result
fn format_result(rank: usize, result: &SearchResult) -> String {
    let tag = match (&result.kind, &result.value) {
        (ResultKind::Value, Some(value)) => format!("{}={}", result.key, value),
        (ResultKind::Key, Some(value)) => format!("{} (e.g. {}={})", result.key, result.key, value),
        _ => result.key.clone(),
    };

    if result.definition.is_empty() {
        format!("{rank:>3}. {tag}  [{} uses]", result.count)
    } else {
        format!("{rank:>3}. {tag}  [{} uses]  {}", result.count, result.definition)
    }
}

fn print_results(results: &[SearchResult], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(results)?);
        return Ok(());
    }

    if results.is_empty() {
        eprintln!("🔍 No matches");
        return Ok(());
    }
    for (i, result) in results.iter().enumerate() {
        println!("{}", format_result(i + 1, result));
    }
    Ok(())
}

fn print_overlay(overlay: &Overlay, json: bool) -> Result<()> {
    if json {
        let summary = serde_json::json!({
            "id": overlay.id,
            "key": overlay.key,
            "value": overlay.value,
            "query": overlay.query,
            "color": overlay.color.to_css(),
            "stats": overlay.stats,
            "elapsed_ms": overlay.elapsed_ms,
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    let stats = &overlay.stats;
    println!("🏷️  {} ({})", overlay.id, overlay.color.to_hex());
    println!("   Tagged features: {}", stats.tagged_features);
    println!("   Standalone nodes: {}", stats.standalone_nodes);
    println!("   Vertex nodes: {}", stats.vertex_nodes);
    println!("   Lines: {}", stats.lines);
    println!("   Polygons: {}", stats.polygons);
    println!("   Relations: {}", stats.relations);
    if stats.is_degraded() {
        println!("   ⚠️  {} ways reference nodes missing from the response", stats.incomplete_ways);
    }
    Ok(())
}
