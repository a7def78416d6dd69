//! In-memory index of OSM tag definitions
//!
//! Parses taginfo CSV exports into keys, their values and the per-language
//! definitions attached to both. Two CSV layouts exist: a simplified one
//! (key, value, definition) and the full taginfo export with usage counts
//! and localized names.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use log::{debug, info, warn};
use serde::Serialize;

/// Maximum number of CSV lines read, header included
pub const MAX_CSV_LINES: usize = 50_000;

/// Column count of the simplified layout
const SIMPLE_COLUMNS: usize = 3;

/// Column count of the extended taginfo layout
const EXTENDED_COLUMNS: usize = 20;

/// Latin-1 misreadings of UTF-8 accented letters found in the catalogues.
/// The bare `Ã` must stay last: it is a prefix of every other sequence.
const MOJIBAKE: [(&str, &str); 10] = [
    ("Ã³", "ó"),
    ("Ã©", "é"),
    ("Ã¨", "è"),
    ("Ã\u{a0}", "à"),
    ("Ã ", "à"),
    ("Ã¯", "ï"),
    ("Ã±", "ñ"),
    ("Ã§", "ç"),
    ("Ãº", "ú"),
    ("Ã", "í"),
];

/// Replace known mojibake sequences with the intended characters
pub fn fix_mojibake(text: &str) -> String {
    if !text.contains('Ã') {
        return text.to_string();
    }
    MOJIBAKE
        .iter()
        .fold(text.to_string(), |acc, (broken, fixed)| acc.replace(broken, fixed))
}

/// Catalogue languages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    /// Catalan (default)
    #[default]
    Ca,
    /// Spanish
    Es,
    /// English
    En,
}

impl Language {
    /// Two-letter code used in catalogue file names
    pub fn code(&self) -> &'static str {
        match self {
            Language::Ca => "ca",
            Language::Es => "es",
            Language::En => "en",
        }
    }

    /// Parse a language code, falling back to Catalan for anything unknown
    pub fn from_code_or_default(code: &str) -> Self {
        code.parse().unwrap_or_default()
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ca" => Ok(Language::Ca),
            "es" => Ok(Language::Es),
            "en" => Ok(Language::En),
            other => Err(format!("unsupported language '{other}' (expected ca, es or en)")),
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Which CSV layout a catalogue uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CsvSchema {
    /// key, value, definition (in the catalogue language)
    Simple,
    /// Full 20-column taginfo export
    Extended,
}

impl CsvSchema {
    fn min_columns(&self) -> usize {
        match self {
            CsvSchema::Simple => SIMPLE_COLUMNS,
            CsvSchema::Extended => EXTENDED_COLUMNS,
        }
    }
}

/// One string per supported language
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LocalizedText {
    pub en: String,
    pub ca: String,
    pub es: String,
}

impl LocalizedText {
    pub fn get(&self, language: Language) -> &str {
        match language {
            Language::En => &self.en,
            Language::Ca => &self.ca,
            Language::Es => &self.es,
        }
    }

    pub fn set(&mut self, language: Language, text: impl Into<String>) {
        let text = text.into();
        match language {
            Language::En => self.en = text,
            Language::Ca => self.ca = text,
            Language::Es => self.es = text,
        }
    }

    /// First non-empty text, preferring English, then Catalan, then Spanish
    pub fn merged(&self) -> &str {
        [&self.en, &self.ca, &self.es]
            .into_iter()
            .find(|text| !text.is_empty())
            .map(String::as_str)
            .unwrap_or("")
    }

    /// Non-empty texts in en, ca, es order
    pub fn texts(&self) -> impl Iterator<Item = &str> {
        [&self.en, &self.ca, &self.es]
            .into_iter()
            .map(String::as_str)
            .filter(|text| !text.is_empty())
    }
}

/// One CSV row describing a key=value pair
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValueEntry {
    /// Raw "key=value" tag string (extended layout only)
    pub tag: Option<String>,
    pub definition: LocalizedText,
    /// Localized value names (Catalan and Spanish only)
    pub name: LocalizedText,
    pub count_all: u64,
    pub count_nodes: u64,
    pub count_ways: u64,
    pub count_relations: u64,
}

/// All rows for a value of a key, in CSV order
#[derive(Debug, Clone, PartialEq)]
pub struct ValueGroup {
    pub value: String,
    pub entries: Vec<ValueEntry>,
}

impl ValueGroup {
    /// Usage summed over duplicate rows
    pub fn total_count(&self) -> u64 {
        self.entries.iter().map(|entry| entry.count_all).sum()
    }
}

/// A tag key with its values
#[derive(Debug, Clone, PartialEq)]
pub struct TagKeyEntry {
    pub key: String,
    pub definition: LocalizedText,
    /// Localized key names (Catalan and Spanish only)
    pub name: LocalizedText,
    pub total_count: u64,
    values: Vec<ValueGroup>,
    value_positions: HashMap<String, usize>,
}

impl TagKeyEntry {
    fn new(key: &str, definition: LocalizedText, name: LocalizedText) -> Self {
        Self {
            key: key.to_string(),
            definition,
            name,
            total_count: 0,
            values: Vec::new(),
            value_positions: HashMap::new(),
        }
    }

    /// Values in insertion order
    pub fn values(&self) -> &[ValueGroup] {
        &self.values
    }

    pub fn value(&self, value: &str) -> Option<&ValueGroup> {
        self.value_positions.get(value).map(|&pos| &self.values[pos])
    }

    pub fn has_value(&self, value: &str) -> bool {
        self.value_positions.contains_key(value)
    }

    /// Most used value, ties resolved in favour of the earlier one
    pub fn most_used_value(&self) -> Option<(&str, u64)> {
        self.most_used_value_where(|_| true)
    }

    /// Most used value among those accepted by `accept`
    pub fn most_used_value_where<F>(&self, mut accept: F) -> Option<(&str, u64)>
    where
        F: FnMut(&str) -> bool,
    {
        let mut best: Option<(&str, u64)> = None;
        for group in self.values.iter().filter(|group| accept(&group.value)) {
            let total = group.total_count();
            if total > best.map_or(0, |(_, count)| count) {
                best = Some((&group.value, total));
            }
        }
        best
    }

    fn push(&mut self, value: &str, entry: ValueEntry) {
        let pos = match self.value_positions.get(value) {
            Some(&pos) => pos,
            None => {
                self.values.push(ValueGroup {
                    value: value.to_string(),
                    entries: Vec::new(),
                });
                self.value_positions.insert(value.to_string(), self.values.len() - 1);
                self.values.len() - 1
            }
        };
        self.values[pos].entries.push(entry);
    }
}

/// Per-value aggregate across all keys
#[derive(Debug, Clone, PartialEq)]
pub struct ValueSummary {
    pub value: String,
    pub total_count: u64,
    /// Positions of the keys using this value, in key insertion order
    key_positions: Vec<usize>,
}

/// A value suggestion for a key, as shown next to key search results
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValueUsage {
    pub value: String,
    pub total_count: u64,
}

/// In-memory tag definitions for one language
#[derive(Debug, Clone)]
pub struct TagIndex {
    language: Language,
    keys: Vec<TagKeyEntry>,
    key_positions: HashMap<String, usize>,
    values: Vec<ValueSummary>,
    value_positions: HashMap<String, usize>,
    definitions: HashMap<String, String>,
    loaded: bool,
}

impl TagIndex {
    /// Create an empty, not yet loaded index
    pub fn new(language: Language) -> Self {
        Self {
            language,
            keys: Vec::new(),
            key_positions: HashMap::new(),
            values: Vec::new(),
            value_positions: HashMap::new(),
            definitions: HashMap::new(),
            loaded: false,
        }
    }

    /// Build and load an index in one go
    pub fn from_csv(csv_text: &str, schema: CsvSchema, language: Language) -> Self {
        let mut index = Self::new(language);
        index.load(csv_text, schema);
        index
    }

    pub fn language(&self) -> Language {
        self.language
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Key names in insertion order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(|entry| entry.key.as_str())
    }

    /// Key entries in insertion order
    pub fn entries(&self) -> &[TagKeyEntry] {
        &self.keys
    }

    pub fn get(&self, key: &str) -> Option<&TagKeyEntry> {
        self.key_positions.get(key).map(|&pos| &self.keys[pos])
    }

    /// Value aggregates in insertion order
    pub fn value_summaries(&self) -> &[ValueSummary] {
        &self.values
    }

    /// Keys using the value described by `summary`
    pub fn keys_with_value<'a>(&'a self, summary: &'a ValueSummary) -> impl Iterator<Item = &'a TagKeyEntry> {
        summary.key_positions.iter().map(move |&pos| &self.keys[pos])
    }

    /// Definition for a "key=value" tag string
    pub fn definition_for_tag(&self, tag: &str) -> Option<&str> {
        self.definitions.get(tag).map(String::as_str)
    }

    /// Top `limit` values of a key: `*` first, then the empty value, then
    /// by usage
    pub fn top_values(&self, key: &str, limit: usize) -> Vec<ValueUsage> {
        let Some(entry) = self.get(key) else {
            return Vec::new();
        };

        let mut usages: Vec<ValueUsage> = entry
            .values()
            .iter()
            .map(|group| ValueUsage {
                value: group.value.clone(),
                total_count: group.total_count(),
            })
            .collect();

        usages.sort_by(|a, b| {
            let rank = |usage: &ValueUsage| match usage.value.as_str() {
                "*" => 0,
                "" => 1,
                _ => 2,
            };
            rank(a)
                .cmp(&rank(b))
                .then_with(|| b.total_count.cmp(&a.total_count))
        });
        usages.truncate(limit);
        usages
    }

    /// Parse CSV text into the index.
    ///
    /// A second call once the index is loaded does nothing. Rows with fewer
    /// columns than the layout needs are skipped.
    pub fn load(&mut self, csv_text: &str, schema: CsvSchema) {
        if self.loaded {
            debug!("Tag index ({}) already loaded, skipping", self.language);
            return;
        }

        if csv_text.trim().is_empty() {
            warn!("Empty CSV data for {} tag index", self.language);
            self.loaded = true;
            return;
        }

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(csv_text.as_bytes());

        let mut skipped = 0usize;
        for record in reader.records().take(MAX_CSV_LINES - 1) {
            let record = match record {
                Ok(record) => record,
                Err(e) => {
                    debug!("Skipping unreadable CSV row: {e}");
                    skipped += 1;
                    continue;
                }
            };

            if record.len() < schema.min_columns() {
                skipped += 1;
                continue;
            }

            let fields: Vec<&str> = record.iter().collect();
            match schema {
                CsvSchema::Simple => self.insert_simple_row(&fields),
                CsvSchema::Extended => self.insert_extended_row(&fields),
            }
        }

        self.loaded = true;
        info!(
            "📊 Loaded {} keys / {} values for language {} ({} rows skipped)",
            self.keys.len(),
            self.values.len(),
            self.language,
            skipped
        );
    }

    fn insert_simple_row(&mut self, fields: &[&str]) {
        let key = fields[0];
        let value = fields[1];
        let definition_text = fix_mojibake(fields[2]);

        let mut definition = LocalizedText::default();
        definition.set(self.language, definition_text.clone());

        let entry = ValueEntry {
            tag: None,
            definition: definition.clone(),
            name: LocalizedText::default(),
            // The simplified layout carries no counts: each row weighs one use
            count_all: 1,
            ..Default::default()
        };

        self.insert(key, value, definition, LocalizedText::default(), entry);
        self.definitions.insert(format!("{key}={value}"), definition_text);
    }

    fn insert_extended_row(&mut self, fields: &[&str]) {
        let parse_count = |raw: &str| raw.trim().parse::<u64>().unwrap_or(0);

        let key = fields[0];
        let value = fields[1];
        let tag = fields[2];

        let definition = LocalizedText {
            en: fix_mojibake(fields[3]),
            ca: fix_mojibake(fields[4]),
            es: fix_mojibake(fields[5]),
        };
        let key_name = LocalizedText {
            en: String::new(),
            ca: fix_mojibake(fields[16]),
            es: fix_mojibake(fields[18]),
        };
        let value_name = LocalizedText {
            en: String::new(),
            ca: fix_mojibake(fields[17]),
            es: fix_mojibake(fields[19]),
        };

        let entry = ValueEntry {
            tag: (!tag.is_empty()).then(|| tag.to_string()),
            definition: definition.clone(),
            name: value_name,
            count_all: parse_count(fields[6]),
            count_nodes: parse_count(fields[8]),
            count_ways: parse_count(fields[10]),
            count_relations: parse_count(fields[12]),
        };

        if !tag.is_empty() {
            self.definitions
                .insert(tag.to_string(), definition.merged().to_string());
        }
        self.insert(key, value, definition, key_name, entry);
    }

    fn insert(
        &mut self,
        key: &str,
        value: &str,
        key_definition: LocalizedText,
        key_name: LocalizedText,
        entry: ValueEntry,
    ) {
        let count = entry.count_all;

        let key_pos = match self.key_positions.get(key) {
            Some(&pos) => pos,
            None => {
                self.keys.push(TagKeyEntry::new(key, key_definition, key_name));
                self.key_positions.insert(key.to_string(), self.keys.len() - 1);
                self.keys.len() - 1
            }
        };
        let key_entry = &mut self.keys[key_pos];
        key_entry.push(value, entry);
        key_entry.total_count += count;

        let value_pos = match self.value_positions.get(value) {
            Some(&pos) => pos,
            None => {
                self.values.push(ValueSummary {
                    value: value.to_string(),
                    total_count: 0,
                    key_positions: Vec::new(),
                });
                self.value_positions.insert(value.to_string(), self.values.len() - 1);
                self.values.len() - 1
            }
        };
        let summary = &mut self.values[value_pos];
        summary.total_count += count;
        if !summary.key_positions.contains(&key_pos) {
            summary.key_positions.push(key_pos);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIMPLE_CSV: &str = "key,value,definition_ca\n\
        amenity,cafe,Lloc on se serveix cafÃ©\n\
        amenity,fuel,Benzinera\n\
        amenity,cafe,Cafeteria duplicada\n\
        shop,bakery,\"Forn de pa, pastisseria\"\n\
        broken,row\n\
        \n\
        building,yes,EdificaciÃ³ genÃ¨rica\n";

    fn extended_csv() -> String {
        let header = "key,value,tag,definition_en,definition_ca,definition_es,count_all,count_all_fraction,count_nodes,count_nodes_fraction,count_ways,count_ways_fraction,count_relations,count_relations_fraction,in_wiki,projects,key_ca,value_ca,key_es,value_es";
        let rows = [
            "amenity,fuel,amenity=fuel,Fuel station,Benzinera,Gasolinera,1200,0.1,900,0.1,290,0.1,10,0.1,1,5,servei,benzinera,servicio,gasolinera",
            "amenity,cafe,amenity=cafe,Place serving coffee,Cafeteria,Cafetería,800,0.1,780,0.1,20,0.1,0,0,1,3,servei,cafeteria,servicio,cafetería",
            "highway,primary,highway=primary,Primary road,Carretera principal,Carretera principal,not-a-number,0,0,0,0,0,0,0,1,0,via,principal,vía,principal",
            "short,row,short=row,Too few columns",
        ];
        format!("{header}\n{}\n", rows.join("\n"))
    }

    #[test]
    fn test_fix_mojibake() {
        assert_eq!(fix_mojibake("cafÃ©"), "café");
        assert_eq!(fix_mojibake("EdificaciÃ³"), "Edificació");
        assert_eq!(fix_mojibake("genÃ¨rica"), "genèrica");
        assert_eq!(fix_mojibake("Ã§a i Ã±"), "ça i ñ");
        assert_eq!(fix_mojibake("vÃa"), "vía");
        assert_eq!(fix_mojibake("plain text"), "plain text");
    }

    #[test]
    fn test_language_parsing() {
        assert_eq!("ES".parse::<Language>().unwrap(), Language::Es);
        assert_eq!(Language::from_code_or_default("fr"), Language::Ca);
        assert_eq!(Language::En.to_string(), "en");
    }

    #[test]
    fn test_load_simple_schema() {
        let index = TagIndex::from_csv(SIMPLE_CSV, CsvSchema::Simple, Language::Ca);

        assert!(index.is_loaded());
        assert_eq!(index.len(), 3);
        assert_eq!(index.keys().collect::<Vec<_>>(), vec!["amenity", "shop", "building"]);

        let amenity = index.get("amenity").unwrap();
        assert_eq!(amenity.total_count, 3);
        assert_eq!(amenity.definition.ca, "Lloc on se serveix café");
        let cafe = amenity.value("cafe").unwrap();
        assert_eq!(cafe.entries.len(), 2, "duplicate rows are kept");
        assert_eq!(cafe.entries[1].definition.ca, "Cafeteria duplicada");

        let bakery = index.get("shop").unwrap().value("bakery").unwrap();
        assert_eq!(bakery.entries[0].definition.ca, "Forn de pa, pastisseria");

        assert_eq!(
            index.get("building").unwrap().definition.ca,
            "Edificació genèrica"
        );
        assert!(index.get("broken").is_none());
        assert_eq!(index.definition_for_tag("amenity=fuel"), Some("Benzinera"));
    }

    #[test]
    fn test_simple_schema_uses_load_language() {
        let index = TagIndex::from_csv(SIMPLE_CSV, CsvSchema::Simple, Language::Es);
        let fuel = index.get("amenity").unwrap().value("fuel").unwrap();
        assert_eq!(fuel.entries[0].definition.es, "Benzinera");
        assert!(fuel.entries[0].definition.ca.is_empty());
    }

    #[test]
    fn test_load_is_idempotent() {
        let mut index = TagIndex::new(Language::Ca);
        index.load(SIMPLE_CSV, CsvSchema::Simple);
        let keys_before = index.len();
        let count_before = index.get("amenity").unwrap().total_count;

        index.load(SIMPLE_CSV, CsvSchema::Simple);

        assert_eq!(index.len(), keys_before);
        assert_eq!(index.get("amenity").unwrap().total_count, count_before);
    }

    #[test]
    fn test_empty_csv_yields_empty_loaded_index() {
        let index = TagIndex::from_csv("", CsvSchema::Simple, Language::Ca);
        assert!(index.is_loaded());
        assert!(index.is_empty());

        let header_only = TagIndex::from_csv("key,value,definition\n", CsvSchema::Simple, Language::Ca);
        assert!(header_only.is_empty());
    }

    #[test]
    fn test_load_extended_schema() {
        let index = TagIndex::from_csv(&extended_csv(), CsvSchema::Extended, Language::Ca);

        assert_eq!(index.len(), 2);
        let amenity = index.get("amenity").unwrap();
        assert_eq!(amenity.total_count, 2000);
        assert_eq!(amenity.name.ca, "servei");
        assert_eq!(amenity.definition.merged(), "Fuel station");

        let fuel = &amenity.value("fuel").unwrap().entries[0];
        assert_eq!(fuel.tag.as_deref(), Some("amenity=fuel"));
        assert_eq!(fuel.count_nodes, 900);
        assert_eq!(fuel.count_ways, 290);
        assert_eq!(fuel.count_relations, 10);
        assert_eq!(fuel.name.es, "gasolinera");

        let primary = &index.get("highway").unwrap().value("primary").unwrap().entries[0];
        assert_eq!(primary.count_all, 0, "unparsable counts fall back to zero");

        assert_eq!(index.definition_for_tag("amenity=cafe"), Some("Place serving coffee"));
    }

    #[test]
    fn test_value_summaries_track_keys() {
        let csv = "key,value,definition\n\
                   building,yes,Edifici\n\
                   oneway,yes,Sentit únic\n\
                   amenity,cafe,Cafeteria\n";
        let index = TagIndex::from_csv(csv, CsvSchema::Simple, Language::Ca);

        let yes = &index.value_summaries()[0];
        assert_eq!(yes.value, "yes");
        assert_eq!(yes.total_count, 2);
        let keys: Vec<&str> = index.keys_with_value(yes).map(|k| k.key.as_str()).collect();
        assert_eq!(keys, vec!["building", "oneway"]);
    }

    #[test]
    fn test_top_values_ordering() {
        let csv = "key,value,definition\n\
                   shop,bakery,Forn\n\
                   shop,*,Qualsevol botiga\n\
                   shop,supermarket,Supermercat\n\
                   shop,supermarket,Supermercat 2\n\
                   shop,,Botiga sense valor\n";
        let index = TagIndex::from_csv(csv, CsvSchema::Simple, Language::Ca);

        let top: Vec<String> = index
            .top_values("shop", 3)
            .into_iter()
            .map(|usage| usage.value)
            .collect();
        assert_eq!(top, vec!["*", "", "supermarket"]);
        assert!(index.top_values("missing", 3).is_empty());
    }

    #[test]
    fn test_most_used_value() {
        let index = TagIndex::from_csv(&extended_csv(), CsvSchema::Extended, Language::Ca);
        let amenity = index.get("amenity").unwrap();
        assert_eq!(amenity.most_used_value(), Some(("fuel", 1200)));
        assert_eq!(amenity.most_used_value_where(|value| value != "fuel"), Some(("cafe", 800)));
        assert_eq!(amenity.most_used_value_where(|_| false), None);
    }
}
