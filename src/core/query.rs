//! Overpass QL generation for tag queries

use std::fmt;
use std::str::FromStr;

use log::debug;
use serde::Serialize;

use crate::core::error::Error;

/// Server-side timeout (seconds) for key=value queries
pub const VALUE_QUERY_TIMEOUT: u32 = 35;

/// Server-side timeout (seconds) for queries matching any value of a key
pub const GENERIC_QUERY_TIMEOUT: u32 = 60;

/// Largest coordinate magnitude accepted in a bounding box
const MAX_COORDINATE: f64 = 180.0;

/// OSM element kinds a query can select
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementKind {
    Node,
    Way,
    Relation,
}

impl ElementKind {
    pub const ALL: [ElementKind; 3] = [ElementKind::Node, ElementKind::Way, ElementKind::Relation];

    pub fn as_str(&self) -> &'static str {
        match self {
            ElementKind::Node => "node",
            ElementKind::Way => "way",
            ElementKind::Relation => "relation",
        }
    }

    /// Parse a comma-separated list such as `node,way`.
    ///
    /// Blank input selects every kind; duplicates are dropped.
    pub fn parse_list(input: &str) -> Result<Vec<ElementKind>, Error> {
        let mut kinds = Vec::new();
        for part in input.split(',').map(str::trim).filter(|part| !part.is_empty()) {
            let kind: ElementKind = part.parse()?;
            if !kinds.contains(&kind) {
                kinds.push(kind);
            }
        }

        if kinds.is_empty() {
            kinds.extend(Self::ALL);
        }
        Ok(kinds)
    }
}

impl FromStr for ElementKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "node" => Ok(ElementKind::Node),
            "way" => Ok(ElementKind::Way),
            "relation" => Ok(ElementKind::Relation),
            other => Err(Error::InvalidInput(format!(
                "Unknown element type '{other}' (expected node, way or relation)"
            ))),
        }
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validated bounding box in `[minLon, minLat, maxLon, maxLat]` order
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    /// Build from exactly four finite coordinates with magnitude ≤ 180
    pub fn from_slice(coords: &[f64]) -> Option<Self> {
        let [min_lon, min_lat, max_lon, max_lat] = coords else {
            return None;
        };

        let valid = coords
            .iter()
            .all(|coord| coord.is_finite() && coord.abs() <= MAX_COORDINATE);
        if !valid {
            return None;
        }

        Some(Self {
            min_lon: *min_lon,
            min_lat: *min_lat,
            max_lon: *max_lon,
            max_lat: *max_lat,
        })
    }

    /// Overpass order: `minLat,minLon,maxLat,maxLon`
    pub fn to_overpass(&self) -> String {
        format!("{},{},{},{}", self.min_lat, self.min_lon, self.max_lat, self.max_lon)
    }
}

impl FromStr for BoundingBox {
    type Err = Error;

    /// Parse `minLon,minLat,maxLon,maxLat`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let coords = s
            .split(',')
            .map(|part| {
                part.trim()
                    .parse::<f64>()
                    .map_err(|_| Error::InvalidInput(format!("Invalid coordinate '{}' in bbox", part.trim())))
            })
            .collect::<Result<Vec<f64>, Error>>()?;

        BoundingBox::from_slice(&coords).ok_or_else(|| {
            Error::InvalidInput(format!(
                "Invalid bbox '{s}': expected minLon,minLat,maxLon,maxLat within ±180"
            ))
        })
    }
}

/// Escape text for a double-quoted Overpass QL string
fn escape_ql_string(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '"') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Build an Overpass QL query for `key` (and `value`, when non-empty)
/// inside `bbox`, returning `None` when the input is invalid.
///
/// An empty `kinds` selection selects every element kind. Way and relation
/// clauses are followed by recursions pulling in their member ways and
/// nodes, so the result is enough to draw their geometry.
pub fn build_query(key: &str, value: Option<&str>, bbox: &[f64], kinds: &[ElementKind]) -> Option<String> {
    let key = key.trim();
    if key.is_empty() {
        debug!("Rejecting query with empty key");
        return None;
    }

    let Some(bbox) = BoundingBox::from_slice(bbox) else {
        debug!("Rejecting query with invalid bbox {bbox:?}");
        return None;
    };

    let key = escape_ql_string(key);
    let value = value.map(str::trim).filter(|value| !value.is_empty());
    let (filter, timeout) = match value {
        Some(value) => (
            format!("[\"{key}\"=\"{}\"]", escape_ql_string(value)),
            VALUE_QUERY_TIMEOUT,
        ),
        None => (format!("[\"{key}\"]"), GENERIC_QUERY_TIMEOUT),
    };

    let kinds = if kinds.is_empty() { &ElementKind::ALL[..] } else { kinds };
    let bbox = bbox.to_overpass();

    let mut clauses = Vec::new();
    if kinds.contains(&ElementKind::Node) {
        clauses.push(format!("node{filter}({bbox})"));
    }
    if kinds.contains(&ElementKind::Way) {
        clauses.push(format!("way{filter}({bbox})"));
        clauses.push("node(w)".to_string());
    }
    if kinds.contains(&ElementKind::Relation) {
        clauses.push(format!("relation{filter}({bbox})"));
        clauses.push("way(r)".to_string());
        clauses.push("node(w)".to_string());
    }

    let body = clauses
        .iter()
        .map(|clause| format!("  {clause};\n"))
        .collect::<String>();

    let query = format!("[out:xml][timeout:{timeout}];\n(\n{body});\nout meta;");
    debug!("🔧 Generated Overpass query:\n{query}");
    Some(query)
}
