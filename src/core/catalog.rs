//! Lazily loaded tag catalogues
//!
//! One [`TagIndex`] per language and dataset, fetched on first use. Searches
//! wait for the load; concurrent first searches share a single fetch and a
//! failed fetch is retried by the next call.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use log::debug;
use tokio::sync::OnceCell;

use crate::core::downloader::Downloader;
use crate::core::error::{self, Error, Result};
use crate::core::index::{CsvSchema, Language, TagIndex, ValueUsage};
use crate::core::search::{self, SearchResult};
use crate::core::source::{Dataset, SourceConfig};

type Slot = Arc<OnceCell<Arc<TagIndex>>>;

/// Registry of catalogues keyed by language and dataset
pub struct TagCatalog {
    downloader: Downloader,
    schema: CsvSchema,
    slots: Mutex<HashMap<(Language, Dataset), Slot>>,
}

impl TagCatalog {
    /// Catalogues in the simplified CSV layout
    pub fn new(downloader: Downloader) -> Self {
        Self {
            downloader,
            schema: CsvSchema::Simple,
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_config(config: SourceConfig) -> Self {
        Self::new(Downloader::with_config(config))
    }

    /// Parse fetched catalogues with another CSV layout
    pub fn with_schema(mut self, schema: CsvSchema) -> Self {
        self.schema = schema;
        self
    }

    /// Default language of the underlying configuration
    pub fn default_language(&self) -> Language {
        self.downloader.config().language
    }

    fn slot(&self, language: Language, dataset: Dataset) -> Slot {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(slots.entry((language, dataset)).or_default())
    }

    /// Register an already built index, skipping the fetch
    pub fn insert(&self, language: Language, dataset: Dataset, index: TagIndex) -> Result<()> {
        self.slot(language, dataset)
            .set(Arc::new(index))
            .map_err(|_| Error::InvalidInput(format!("Catalogue {language}/{dataset:?} is already loaded")))
    }

    pub fn is_loaded(&self, language: Language, dataset: Dataset) -> bool {
        self.slot(language, dataset).initialized()
    }

    /// The index for `language` and `dataset`, loading it if needed
    pub async fn index(&self, language: Language, dataset: Dataset) -> Result<Arc<TagIndex>> {
        let slot = self.slot(language, dataset);
        let index = slot
            .get_or_try_init(|| async {
                let text = self.downloader.fetch_catalogue(language, dataset).await?;
                let index = TagIndex::from_csv(&text, self.schema, language);
                debug!("Catalogue {language}/{dataset:?} ready with {} keys", index.len());
                Ok::<_, Error>(Arc::new(index))
            })
            .await?;
        Ok(Arc::clone(index))
    }

    pub async fn search_keys(&self, language: Language, query: &str, limit: usize) -> Result<Vec<SearchResult>> {
        let index = self.index(language, Dataset::Standard).await?;
        Ok(search::search_keys(&index, query, limit))
    }

    pub async fn search_values(
        &self,
        language: Language,
        query: &str,
        key: Option<&str>,
        limit: usize,
    ) -> Result<Vec<SearchResult>> {
        let index = self.index(language, Dataset::Standard).await?;
        Ok(search::search_values(&index, query, key, limit))
    }

    /// Search the yes/no catalogue
    pub async fn search_boolean_values(
        &self,
        language: Language,
        query: &str,
        key: Option<&str>,
        limit: usize,
    ) -> Result<Vec<SearchResult>> {
        let index = self.index(language, Dataset::YesNo).await?;
        Ok(search::search_boolean_values(&index, query, key, limit))
    }

    pub async fn top_values(&self, language: Language, key: &str, limit: usize) -> Result<Vec<ValueUsage>> {
        let index = self.index(language, Dataset::Standard).await?;
        Ok(index.top_values(key, limit))
    }

    /// Closest indexed key to a possibly misspelled one
    pub async fn suggest_key(&self, language: Language, input: &str) -> Result<Option<String>> {
        let index = self.index(language, Dataset::Standard).await?;
        Ok(error::suggest_key(&index, input))
    }
}
