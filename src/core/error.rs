//! Error types for butterfly-tags
//!
//! Provides the error enum shared by catalogue loading, query building and
//! Overpass execution, plus fuzzy "did you mean" suggestions for tag keys.

use std::fmt;
use std::sync::Arc;
use strsim::{jaro_winkler, normalized_levenshtein};

use crate::core::index::TagIndex;

/// Minimum blended similarity for a key to be offered as a suggestion.
/// 0.65 keeps "amenty" → "amenity" while rejecting unrelated keys.
const MIN_SUGGESTION_SCORE: f64 = 0.65;

/// Score a candidate against the input using Jaro-Winkler (70%) and
/// normalized Levenshtein (30%), with a bonus for a shared prefix.
fn similarity(input: &str, candidate: &str) -> f64 {
    let jw_score = jaro_winkler(input, candidate);
    let lev_score = normalized_levenshtein(input, candidate);
    let mut score = (jw_score * 0.7) + (lev_score * 0.3);

    // OSM keys are namespaced (`addr:street`, `disused:shop`), so a strong
    // prefix match is a better signal than the raw edit distance.
    let prefix_len = input.chars().count().min(5);
    if prefix_len >= 3 {
        let input_prefix: String = input.chars().take(prefix_len).collect();
        let candidate_prefix: String = candidate.chars().take(prefix_len).collect();
        let prefix_similarity = normalized_levenshtein(&input_prefix, &candidate_prefix);
        if prefix_similarity > 0.7 {
            score += 0.1 * prefix_similarity;
        }
    }

    score
}

/// Find the best fuzzy match among `candidates`
fn find_best_fuzzy_match<'a, I>(input: &str, candidates: I) -> Option<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let input_lower = input.to_lowercase();
    let mut best_match = None;
    let mut best_score = 0.0f64;

    for candidate in candidates {
        let score = similarity(&input_lower, &candidate.to_lowercase());
        if score >= MIN_SUGGESTION_SCORE && score > best_score {
            best_score = score;
            best_match = Some(candidate.to_string());
        }
    }

    best_match
}

/// Suggest an indexed key for a possibly misspelled one.
///
/// Returns `None` when the key exists (case-insensitively) or nothing is
/// close enough.
pub fn suggest_key(index: &TagIndex, input: &str) -> Option<String> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }

    if index.keys().any(|key| key.eq_ignore_ascii_case(input)) {
        return None;
    }

    find_best_fuzzy_match(input, index.keys())
}

/// Main error type for butterfly-tags operations
#[derive(Debug, Clone)]
pub enum Error {
    /// Catalogue file or endpoint not found
    SourceNotFound(String),

    /// HTTP-specific error
    HttpError(String),

    /// Network connectivity issues
    NetworkError(String),

    /// File I/O error
    IoError(Arc<std::io::Error>),

    /// Invalid configuration or parameters
    InvalidInput(String),

    /// Malformed CSV or XML payload
    ParseError(String),

    /// Error reported by the Overpass server itself
    OverpassError(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::SourceNotFound(source) => {
                write!(f, "Source '{source}' not found")
            }
            Error::HttpError(msg) => {
                write!(f, "HTTP error: {msg}")
            }
            Error::NetworkError(msg) => {
                write!(f, "Network error: {msg}")
            }
            Error::IoError(err) => {
                write!(f, "I/O error: {err}")
            }
            Error::InvalidInput(msg) => {
                write!(f, "Invalid input: {msg}")
            }
            Error::ParseError(msg) => {
                write!(f, "Parse error: {msg}")
            }
            Error::OverpassError(msg) => {
                write!(f, "Overpass error: {msg}")
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::IoError(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::IoError(Arc::new(err))
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() {
            Error::NetworkError(err.to_string())
        } else {
            Error::HttpError(err.to_string())
        }
    }
}

impl From<csv::Error> for Error {
    fn from(err: csv::Error) -> Self {
        Error::ParseError(err.to_string())
    }
}

impl From<quick_xml::Error> for Error {
    fn from(err: quick_xml::Error) -> Self {
        Error::ParseError(err.to_string())
    }
}

/// Convenience result type for butterfly-tags operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::index::{CsvSchema, Language};

    fn sample_index() -> TagIndex {
        let csv = "key,value,definition\n\
                   amenity,cafe,Cafeteria\n\
                   highway,residential,Carrer residencial\n\
                   building,yes,Edifici\n\
                   addr:street,*,Nom del carrer\n";
        let mut index = TagIndex::new(Language::Ca);
        index.load(csv, CsvSchema::Simple);
        index
    }

    #[test]
    fn test_suggest_key_typos() {
        let index = sample_index();
        assert_eq!(suggest_key(&index, "amenty"), Some("amenity".to_string()));
        assert_eq!(suggest_key(&index, "higway"), Some("highway".to_string()));
        assert_eq!(suggest_key(&index, "biulding"), Some("building".to_string()));
    }

    #[test]
    fn test_suggest_key_exact_match_needs_no_suggestion() {
        let index = sample_index();
        assert_eq!(suggest_key(&index, "amenity"), None);
        assert_eq!(suggest_key(&index, "AMENITY"), None);
    }

    #[test]
    fn test_suggest_key_no_match() {
        let index = sample_index();
        assert_eq!(suggest_key(&index, "zzzzzzzzzzzz"), None);
        assert_eq!(suggest_key(&index, ""), None);
    }

    #[test]
    fn test_error_display() {
        let err = Error::InvalidInput("empty key".to_string());
        assert_eq!(err.to_string(), "Invalid input: empty key");

        let err = Error::OverpassError("runtime error: timeout".to_string());
        assert_eq!(err.to_string(), "Overpass error: runtime error: timeout");
    }

    #[test]
    fn test_io_error_is_cloneable_and_keeps_kind() {
        let err: Error = std::io::Error::new(std::io::ErrorKind::NotFound, "missing.csv").into();
        let cloned = err.clone();
        match cloned {
            Error::IoError(io_err) => assert_eq!(io_err.kind(), std::io::ErrorKind::NotFound),
            _ => panic!("Expected IoError"),
        }
    }
}
