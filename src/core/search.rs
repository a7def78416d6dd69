//! Ranked search over a [`TagIndex`]
//!
//! Matching is a normalized substring test (lowercase, accents stripped).
//! Every matching field adds to a candidate's score according to its role:
//! the identifier being searched for weighs most, the parent key next and
//! free-text descriptions least.

use std::cmp::Ordering;

use log::debug;
use serde::Serialize;
use unicode_normalization::UnicodeNormalization;

use crate::core::index::{LocalizedText, TagIndex, TagKeyEntry, ValueEntry, ValueSummary};

/// Candidates scoring below this are dropped from value searches
pub const MIN_RELEVANCE: u32 = 5;

/// Key fallback candidates in global value search need at least this much
const MIN_KEY_FALLBACK_RELEVANCE: u32 = 20;

/// Weight of the match score against the log-scaled popularity
const SCORE_WEIGHT: f64 = 5.0;

/// Lowercase and strip combining diacritical marks
pub fn normalize(text: &str) -> String {
    text.to_lowercase()
        .nfd()
        .filter(|c| !('\u{0300}'..='\u{036f}').contains(c))
        .collect()
}

fn is_boolean_value(value: &str) -> bool {
    value == "yes" || value == "no"
}

/// What a search looks at
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchDomain {
    /// Tag keys
    Keys,
    /// Values, optionally restricted to one key
    Values { key: Option<String> },
    /// Only `yes`/`no` values, matched through their key or definition
    BooleanValues { key: Option<String> },
}

/// Whether a result names a key or a key=value pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultKind {
    Key,
    Value,
}

/// A ranked search hit
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub kind: ResultKind,
    pub key: String,
    pub value: Option<String>,
    pub tag: Option<String>,
    /// First non-empty definition (en, ca, es)
    pub definition: String,
    pub definitions: LocalizedText,
    pub match_score: u32,
    /// Usage count used for popularity ranking
    pub count: u64,
    pub count_nodes: u64,
    pub count_ways: u64,
    pub count_relations: u64,
}

impl SearchResult {
    fn for_key(entry: &TagKeyEntry, match_score: u32) -> Self {
        Self {
            kind: ResultKind::Key,
            key: entry.key.clone(),
            value: None,
            tag: None,
            definition: entry.definition.merged().to_string(),
            definitions: entry.definition.clone(),
            match_score,
            count: entry.total_count,
            count_nodes: 0,
            count_ways: 0,
            count_relations: 0,
        }
    }

    fn for_value(key: &str, value: &str, entry: &ValueEntry, match_score: u32, count: u64) -> Self {
        Self {
            kind: ResultKind::Value,
            key: key.to_string(),
            value: Some(value.to_string()),
            tag: entry.tag.clone(),
            definition: entry.definition.merged().to_string(),
            definitions: entry.definition.clone(),
            match_score,
            count,
            count_nodes: entry.count_nodes,
            count_ways: entry.count_ways,
            count_relations: entry.count_relations,
        }
    }

    /// Ranking value: weighted score plus log10 popularity, so a large
    /// usage difference cannot outweigh a better textual match
    pub fn rank(&self) -> f64 {
        f64::from(self.match_score) * SCORE_WEIGHT + ((self.count + 1) as f64).log10()
    }
}

/// Role of a searchable field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldRole {
    Identifier,
    Parent,
    Description,
}

/// Scoring regime for plain substring hits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Keys,
    ScopedValues,
    GlobalValues,
}

/// A normalized query with the facts the scorer needs about it
struct Query {
    text: String,
    is_boolean: bool,
    has_wildcard: bool,
}

impl Query {
    fn new(raw: &str) -> Option<Self> {
        let text = normalize(raw.trim());
        if text.is_empty() {
            return None;
        }
        Some(Self {
            is_boolean: is_boolean_value(&text),
            has_wildcard: text.contains('*'),
            text,
        })
    }

    /// Whether a value may appear in results for this query at all
    fn admits_value(&self, value: &str) -> bool {
        if is_boolean_value(value) && !self.is_boolean {
            return false;
        }
        if value.contains('*') && !self.has_wildcard {
            return false;
        }
        true
    }

    fn score_field(&self, field: &str, role: FieldRole, mode: Mode, boolean_value: bool) -> u32 {
        if !field.contains(&self.text) {
            return 0;
        }

        if field == self.text {
            return match role {
                FieldRole::Identifier => 1000,
                FieldRole::Parent => 500,
                FieldRole::Description => 100,
            };
        }

        if field.starts_with(&self.text) {
            // Partial hits on yes/no would flood the results
            return if boolean_value && !self.is_boolean { 1 } else { 100 };
        }

        match mode {
            Mode::Keys => 1,
            Mode::ScopedValues => 15,
            Mode::GlobalValues if boolean_value => 0,
            Mode::GlobalValues if self.text.chars().count() >= 3 => 50,
            Mode::GlobalValues => 15,
        }
    }

    fn score_fields<'a, I>(&self, fields: I, mode: Mode, boolean_value: bool) -> Option<u32>
    where
        I: IntoIterator<Item = (FieldRole, &'a str)>,
    {
        let mut matched = false;
        let mut score = 0;
        for (role, field) in fields {
            let normalized = normalize(field);
            if normalized.contains(&self.text) {
                matched = true;
                score += self.score_field(&normalized, role, mode, boolean_value);
            }
        }
        matched.then_some(score)
    }
}

/// Run a search over `index` in the given domain
pub fn search(index: &TagIndex, query: &str, domain: &SearchDomain, limit: usize) -> Vec<SearchResult> {
    match domain {
        SearchDomain::Keys => search_keys(index, query, limit),
        SearchDomain::Values { key } => search_values(index, query, key.as_deref(), limit),
        SearchDomain::BooleanValues { key } => search_boolean_values(index, query, key.as_deref(), limit),
    }
}

/// Search tag keys by name, definitions and localized names
pub fn search_keys(index: &TagIndex, query: &str, limit: usize) -> Vec<SearchResult> {
    let Some(query) = Query::new(query) else {
        return Vec::new();
    };

    let mut results: Vec<SearchResult> = index
        .entries()
        .iter()
        .filter_map(|entry| {
            let fields = key_fields(entry, FieldRole::Identifier);
            query
                .score_fields(fields, Mode::Keys, false)
                .map(|score| SearchResult::for_key(entry, score))
        })
        .collect();

    results.sort_by(|a, b| {
        b.match_score
            .cmp(&a.match_score)
            .then_with(|| b.count.cmp(&a.count))
    });
    results.truncate(limit);

    debug!("🔑 Key search '{}' → {} results", query.text, results.len());
    results
}

/// Search values, restricted to `key` when it is indexed, otherwise across
/// every key
pub fn search_values(index: &TagIndex, query: &str, key: Option<&str>, limit: usize) -> Vec<SearchResult> {
    let Some(query) = Query::new(query) else {
        return Vec::new();
    };

    let mut results = match key.and_then(|key| index.get(key)) {
        Some(entry) => scoped_value_matches(entry, &query),
        None => {
            if let Some(key) = key {
                debug!("Key '{key}' not indexed, searching all values");
            }
            global_value_matches(index, &query, limit)
        }
    };

    sort_by_rank(&mut results);
    results.truncate(limit);

    debug!("🔍 Value search '{}' → {} results", query.text, results.len());
    results
}

/// Search the yes/no values of boolean keys.
///
/// A value matches when its key or one of its definitions contains the
/// query; key matches rank above definition matches.
pub fn search_boolean_values(
    index: &TagIndex,
    query: &str,
    key: Option<&str>,
    limit: usize,
) -> Vec<SearchResult> {
    let Some(query) = Query::new(query) else {
        return Vec::new();
    };

    let mut results = Vec::new();
    let entries = index
        .entries()
        .iter()
        .filter(|entry| key.map_or(true, |key| entry.key == key));

    for entry in entries {
        let key_match = normalize(&entry.key).contains(&query.text);
        for group in entry.values().iter().filter(|g| is_boolean_value(&g.value)) {
            let definition_match = group
                .entries
                .iter()
                .any(|e| e.definition.texts().any(|text| normalize(text).contains(&query.text)));

            if !key_match && !definition_match {
                continue;
            }

            if let Some(first) = group.entries.first() {
                let score = if key_match { 1000 } else { 100 };
                results.push(SearchResult::for_value(
                    &entry.key,
                    &group.value,
                    first,
                    score,
                    entry.total_count,
                ));
            }
        }
    }

    results.sort_by(|a, b| {
        b.match_score
            .cmp(&a.match_score)
            .then_with(|| b.count.cmp(&a.count))
    });
    results.truncate(limit);
    results
}

fn key_fields(entry: &TagKeyEntry, key_role: FieldRole) -> Vec<(FieldRole, &str)> {
    let mut fields = vec![(key_role, entry.key.as_str())];
    fields.extend(entry.definition.texts().map(|text| (FieldRole::Description, text)));
    fields.extend(entry.name.texts().map(|text| (FieldRole::Description, text)));
    fields
}

fn entry_fields(entry: &ValueEntry) -> impl Iterator<Item = (FieldRole, &str)> {
    entry
        .definition
        .texts()
        .chain(entry.name.texts())
        .map(|text| (FieldRole::Description, text))
}

fn scoped_value_matches(key_entry: &TagKeyEntry, query: &Query) -> Vec<SearchResult> {
    let mut results = Vec::new();

    for group in key_entry.values() {
        if !query.admits_value(&group.value) {
            continue;
        }
        let boolean_value = is_boolean_value(&group.value);

        for entry in &group.entries {
            let fields = [
                (FieldRole::Identifier, group.value.as_str()),
                (FieldRole::Parent, key_entry.key.as_str()),
            ]
            .into_iter()
            .chain(entry_fields(entry));

            if let Some(score) = query.score_fields(fields, Mode::ScopedValues, boolean_value) {
                if score >= MIN_RELEVANCE {
                    results.push(SearchResult::for_value(
                        &key_entry.key,
                        &group.value,
                        entry,
                        score,
                        entry.count_all,
                    ));
                }
            }
        }
    }

    results
}

fn global_value_matches(index: &TagIndex, query: &Query, limit: usize) -> Vec<SearchResult> {
    let mut results = Vec::new();

    for summary in index.value_summaries() {
        if !query.admits_value(&summary.value) {
            continue;
        }
        if let Some(score) = score_value_summary(index, summary, query) {
            if score < MIN_RELEVANCE {
                continue;
            }
            for key_entry in index.keys_with_value(summary) {
                let Some(group) = key_entry.value(&summary.value) else {
                    continue;
                };
                for entry in &group.entries {
                    results.push(SearchResult::for_value(
                        &key_entry.key,
                        &summary.value,
                        entry,
                        score,
                        summary.total_count,
                    ));
                }
            }
        }
    }

    if results.len() < limit {
        append_key_fallbacks(index, query, &mut results, limit);
    }

    results
}

fn score_value_summary(index: &TagIndex, summary: &ValueSummary, query: &Query) -> Option<u32> {
    let key_entries: Vec<&TagKeyEntry> = index.keys_with_value(summary).collect();
    if key_entries.is_empty() {
        return None;
    }

    let joined_keys = key_entries
        .iter()
        .map(|entry| entry.key.as_str())
        .collect::<Vec<_>>()
        .join(" ");

    let mut fields = vec![
        (FieldRole::Identifier, summary.value.as_str()),
        (FieldRole::Parent, joined_keys.as_str()),
    ];
    for key_entry in &key_entries {
        fields.extend(key_entry.name.texts().map(|text| (FieldRole::Description, text)));
        if let Some(group) = key_entry.value(&summary.value) {
            for entry in &group.entries {
                fields.extend(entry_fields(entry));
            }
        }
    }

    query.score_fields(fields, Mode::GlobalValues, is_boolean_value(&summary.value))
}

/// Offer keys whose own fields match, paired with their most used value the
/// query admits
fn append_key_fallbacks(index: &TagIndex, query: &Query, results: &mut Vec<SearchResult>, limit: usize) {
    for key_entry in index.entries() {
        if results.len() >= limit {
            break;
        }

        let mut matched = false;
        let mut score = 0;
        for (_, field) in key_fields(key_entry, FieldRole::Description) {
            let normalized = normalize(field);
            if normalized.contains(&query.text) {
                matched = true;
                score += if normalized == query.text {
                    100
                } else if normalized.starts_with(&query.text) {
                    50
                } else {
                    10
                };
            }
        }

        if !matched || score < MIN_KEY_FALLBACK_RELEVANCE {
            continue;
        }

        let Some((value, count)) = key_entry.most_used_value_where(|value| query.admits_value(value)) else {
            continue;
        };
        let already_listed = results
            .iter()
            .any(|r| r.key == key_entry.key && r.value.as_deref() == Some(value));
        if already_listed {
            continue;
        }

        let mut result = SearchResult::for_key(key_entry, score);
        result.value = Some(value.to_string());
        result.count = count;
        results.push(result);
    }
}

fn sort_by_rank(results: &mut [SearchResult]) {
    results.sort_by(|a, b| b.rank().partial_cmp(&a.rank()).unwrap_or(Ordering::Equal));
}
