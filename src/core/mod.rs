//! Core library modules for butterfly-tags
//!
//! Tag index and search, Overpass query generation and execution, and the
//! legend of executed queries.

pub mod catalog;
pub mod color;
pub mod downloader;
pub mod error;
pub mod index;
pub mod legend;
pub mod overpass;
pub mod query;
pub mod search;
pub mod source;

// Re-export main types for internal use
pub use catalog::TagCatalog;
pub use downloader::{retry_on_network_error, Downloader};
pub use source::{resolve_source, Dataset, SourceConfig, TagSource};
