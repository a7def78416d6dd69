//! # Butterfly-tags Library
//!
//! OpenStreetMap tag search and Overpass query building.
//!
//! ## Features
//!
//! - **Tag catalogues**: taginfo CSV exports (simplified or extended layout)
//!   loaded lazily per language from a directory or an HTTP base URL
//! - **Accent-insensitive search**: keys and values ranked by match quality,
//!   then by usage
//! - **Overpass QL generation**: deterministic queries for a tag inside a
//!   bounding box, per element kind
//! - **Execution**: element classification, stable overlay colors and a
//!   legend of active queries with change events
//!
//! ## Basic Usage
//!
//! ```rust,no_run
//! use butterfly_tags::{build_query, ElementKind};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Rank values of "amenity" matching "fuel"
//!     let results = butterfly_tags::search_values("fuel", Some("amenity"), 10).await?;
//!     for result in &results {
//!         println!("{}={:?} ({})", result.key, result.value, result.definition);
//!     }
//!
//!     // Build the Overpass query without executing it
//!     let query = build_query("amenity", Some("fuel"), &[-1.0, 40.0, 1.0, 42.0], &[ElementKind::Node]);
//!     println!("{}", query.unwrap_or_default());
//!
//!     // Execute it
//!     let overlay = butterfly_tags::run_query("amenity", Some("fuel"), [-1.0, 40.0, 1.0, 42.0]).await?;
//!     println!("{} tagged features", overlay.stats.tagged_features);
//!
//!     Ok(())
//! }
//! ```
//!
//! For repeated searches keep a [`TagCatalog`], which loads each catalogue
//! once; for repeated executions keep an [`OverlayRenderer`], which owns
//! the legend.

use std::sync::Arc;

// Re-export core types that users might need
pub use crate::core::catalog::TagCatalog;
pub use crate::core::color::{query_color, unique_color, Color};
pub use crate::core::downloader::{retry_on_network_error, Downloader};
pub use crate::core::error::{suggest_key, Error, Result};
pub use crate::core::index::{
    fix_mojibake, CsvSchema, Language, LocalizedText, TagIndex, TagKeyEntry, ValueEntry, ValueGroup,
    ValueSummary, ValueUsage,
};
pub use crate::core::legend::{ActiveQuery, LegendEvent, OverlayId, QueryLegend};
pub use crate::core::overpass::{
    parse_osm_xml, FeatureStats, OsmElement, Overlay, OverlayRenderer, OverlayRequest, RelationMember,
};
pub use crate::core::query::{build_query, BoundingBox, ElementKind};
pub use crate::core::search::{normalize, search, ResultKind, SearchDomain, SearchResult};
pub use crate::core::source::{csv_file_name, resolve_source, Dataset, SourceConfig, TagSource};

// Internal modules
mod core;

/// Search tag keys in the catalogue of the configured language
///
/// Sources are read from the environment (see [`SourceConfig::from_env`]).
///
/// # Examples
/// ```rust,no_run
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let keys = butterfly_tags::search_keys("shop", 5).await?;
/// assert!(keys.len() <= 5);
/// # Ok(())
/// # }
/// ```
pub async fn search_keys(query: &str, limit: usize) -> Result<Vec<SearchResult>> {
    let config = SourceConfig::from_env();
    let language = config.language;
    TagCatalog::with_config(config).search_keys(language, query, limit).await
}

/// Search values, optionally restricted to one key
///
/// Sources are read from the environment (see [`SourceConfig::from_env`]).
pub async fn search_values(query: &str, key: Option<&str>, limit: usize) -> Result<Vec<SearchResult>> {
    let config = SourceConfig::from_env();
    let language = config.language;
    TagCatalog::with_config(config)
        .search_values(language, query, key, limit)
        .await
}

/// Execute a tag query for every element kind inside `bbox`
/// (`[minLon, minLat, maxLon, maxLat]`), retrying on network errors
///
/// # Arguments
/// * `key` - Tag key, e.g. "amenity"
/// * `value` - Tag value; `None` matches any value of the key
/// * `bbox` - Bounding box, each coordinate within ±180
pub async fn run_query(key: &str, value: Option<&str>, bbox: [f64; 4]) -> Result<Arc<Overlay>> {
    let renderer = OverlayRenderer::new(Downloader::with_config(SourceConfig::from_env()));
    let request = OverlayRequest::new(key, value.map(str::to_string), bbox);

    retry_on_network_error(|| renderer.execute(request.clone())).await
}
