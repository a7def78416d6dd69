//! Legend of executed tag queries
//!
//! The legend keeps at most one [`ActiveQuery`] per key/value pair and
//! publishes every change as a [`LegendEvent`] on a broadcast channel.

use std::fmt;

use chrono::{DateTime, Utc};
use log::debug;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::core::color::{query_color, Color};

/// Buffered events per subscriber before the oldest are dropped
const EVENT_CAPACITY: usize = 64;

/// Stable identifier of a query overlay
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct OverlayId(String);

impl OverlayId {
    /// `tag_{key}_{value}` for key=value queries, `key_{key}_any` when the
    /// value is missing or blank
    pub fn for_tag(key: &str, value: Option<&str>) -> Self {
        let key = key.trim();
        match value.map(str::trim).filter(|value| !value.is_empty()) {
            Some(value) => OverlayId(format!("tag_{key}_{value}")),
            None => OverlayId(format!("key_{key}_any")),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OverlayId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A legend entry
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActiveQuery {
    pub id: OverlayId,
    pub key: String,
    pub value: Option<String>,
    pub color: Color,
    /// Features carrying tags in the last result, 0 until it arrives
    pub count: usize,
    pub visible: bool,
    pub created_at: DateTime<Utc>,
}

/// Change notifications published by [`QueryLegend`]
#[derive(Debug, Clone, PartialEq)]
pub enum LegendEvent {
    Added(OverlayId),
    Removed(OverlayId),
    CountUpdated { id: OverlayId, count: usize },
    VisibilityChanged { id: OverlayId, visible: bool },
}

/// Ordered registry of active queries
#[derive(Debug)]
pub struct QueryLegend {
    queries: Vec<ActiveQuery>,
    events: broadcast::Sender<LegendEvent>,
}

impl Default for QueryLegend {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryLegend {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            queries: Vec::new(),
            events,
        }
    }

    /// Receive every event published after this call
    pub fn subscribe(&self) -> broadcast::Receiver<LegendEvent> {
        self.events.subscribe()
    }

    /// Register a query with count 0 and visible, replacing any entry for
    /// the same pair in place
    pub fn add_query(&mut self, key: &str, value: Option<&str>) -> ActiveQuery {
        let id = OverlayId::for_tag(key, value);
        let query = ActiveQuery {
            color: query_color(id.as_str(), false),
            id: id.clone(),
            key: key.trim().to_string(),
            value: value
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string),
            count: 0,
            visible: true,
            created_at: Utc::now(),
        };

        match self.position(&id) {
            Some(pos) => {
                debug!("Replacing legend entry {id}");
                self.queries[pos] = query.clone();
            }
            None => {
                debug!("Adding legend entry {id}");
                self.queries.push(query.clone());
            }
        }

        self.publish(LegendEvent::Added(id));
        query
    }

    pub fn remove_query(&mut self, id: &OverlayId) -> Option<ActiveQuery> {
        let pos = self.position(id)?;
        let removed = self.queries.remove(pos);
        self.publish(LegendEvent::Removed(id.clone()));
        Some(removed)
    }

    /// Returns false when no entry exists for `id`
    pub fn update_count(&mut self, id: &OverlayId, count: usize) -> bool {
        let Some(pos) = self.position(id) else {
            return false;
        };
        self.queries[pos].count = count;
        self.publish(LegendEvent::CountUpdated { id: id.clone(), count });
        true
    }

    /// Returns false when no entry exists for `id`
    pub fn update_visibility(&mut self, id: &OverlayId, visible: bool) -> bool {
        let Some(pos) = self.position(id) else {
            return false;
        };
        self.queries[pos].visible = visible;
        self.publish(LegendEvent::VisibilityChanged { id: id.clone(), visible });
        true
    }

    pub fn get(&self, id: &OverlayId) -> Option<&ActiveQuery> {
        self.queries.iter().find(|query| &query.id == id)
    }

    /// Entries in registration order
    pub fn queries(&self) -> &[ActiveQuery] {
        &self.queries
    }

    pub fn visible_queries(&self) -> Vec<ActiveQuery> {
        self.queries.iter().filter(|query| query.visible).cloned().collect()
    }

    /// Remove every entry, publishing one `Removed` event each
    pub fn clear(&mut self) {
        for query in std::mem::take(&mut self.queries) {
            self.publish(LegendEvent::Removed(query.id));
        }
    }

    pub fn len(&self) -> usize {
        self.queries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }

    fn position(&self, id: &OverlayId) -> Option<usize> {
        self.queries.iter().position(|query| &query.id == id)
    }

    fn publish(&self, event: LegendEvent) {
        // Sending only fails when nobody is subscribed
        let _ = self.events.send(event);
    }
}
