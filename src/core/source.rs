//! Source resolution logic for butterfly-tags
//!
//! Decides where tag catalogue CSVs are read from (HTTP base URL or local
//! directory) and which Overpass endpoint receives queries.

use std::fmt;
use std::path::PathBuf;

use crate::core::index::Language;

/// Public Overpass API endpoint
pub const DEFAULT_OVERPASS_URL: &str = "https://overpass-api.de/api/interpreter";

/// Directory searched for catalogues when no base URL is configured
pub const DEFAULT_CSV_DIR: &str = "assets/csv";

/// Environment variables read by [`SourceConfig::from_env`]
pub const ENV_CSV_DIR: &str = "BUTTERFLY_TAGS_CSV_DIR";
pub const ENV_CSV_URL: &str = "BUTTERFLY_TAGS_CSV_URL";
pub const ENV_OVERPASS_URL: &str = "BUTTERFLY_OVERPASS_URL";
pub const ENV_LANGUAGE: &str = "BUTTERFLY_TAGS_LANG";

/// Catalogue flavours published per language
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Dataset {
    /// Every documented key/value pair
    #[default]
    Standard,
    /// Boolean (yes/no) tags only
    YesNo,
}

impl Dataset {
    fn suffix(&self) -> &'static str {
        match self {
            Dataset::Standard => "",
            Dataset::YesNo => "_yes",
        }
    }
}

/// Where a catalogue is read from
#[derive(Debug, Clone, PartialEq)]
pub enum TagSource {
    /// HTTP source with direct URL
    Http { url: String },
    /// Local CSV file
    File { path: PathBuf },
}

impl fmt::Display for TagSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagSource::Http { url } => f.write_str(url),
            TagSource::File { path } => write!(f, "{}", path.display()),
        }
    }
}

/// Configuration for catalogue and Overpass sources
#[derive(Debug, Clone, PartialEq)]
pub struct SourceConfig {
    /// Base URL serving `taginfo_simple_*.csv`; takes precedence over `csv_dir`
    pub csv_base_url: Option<String>,

    /// Local directory holding the catalogues
    pub csv_dir: PathBuf,

    /// Overpass interpreter endpoint
    pub overpass_url: String,

    /// Default catalogue language
    pub language: Language,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            csv_base_url: None,
            csv_dir: PathBuf::from(DEFAULT_CSV_DIR),
            overpass_url: DEFAULT_OVERPASS_URL.to_string(),
            language: Language::default(),
        }
    }
}

impl SourceConfig {
    /// Defaults overlaid with the `BUTTERFLY_*` environment variables
    pub fn from_env() -> Self {
        Self::default().with_overrides(|name| std::env::var(name).ok())
    }

    /// Overlay values returned by `lookup` for the known variable names.
    /// Blank values are ignored.
    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        if let Some(dir) = lookup(ENV_CSV_DIR) {
            self.csv_dir = PathBuf::from(dir);
        }
        if let Some(url) = lookup(ENV_CSV_URL) {
            self.csv_base_url = Some(url);
        }
        if let Some(url) = lookup(ENV_OVERPASS_URL) {
            self.overpass_url = url;
        }
        if let Some(code) = lookup(ENV_LANGUAGE) {
            self.language = Language::from_code_or_default(&code);
        }
        self
    }
}

/// Catalogue file name: `taginfo_simple_{lang}.csv`, with a `_yes` suffix
/// for the boolean dataset
pub fn csv_file_name(language: Language, dataset: Dataset) -> String {
    format!("taginfo_simple_{}{}.csv", language.code(), dataset.suffix())
}

/// Resolves the catalogue for a language and dataset to a source
pub fn resolve_source(language: Language, dataset: Dataset, config: &SourceConfig) -> TagSource {
    let file_name = csv_file_name(language, dataset);
    match &config.csv_base_url {
        Some(base) => TagSource::Http {
            url: format!("{}/{}", base.trim_end_matches('/'), file_name),
        },
        None => TagSource::File {
            path: config.csv_dir.join(file_name),
        },
    }
}
