//! Overpass execution and result classification
//!
//! [`OverlayRenderer`] turns a tag request into an Overpass query, submits
//! it, parses the OSM XML answer and keeps the [`QueryLegend`] in step.
//! Executions of the same key/value pair that overlap in time share one
//! HTTP request.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use futures::future::{BoxFuture, FutureExt, Shared};
use log::{debug, info, warn};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::core::color::{query_color, Color};
use crate::core::downloader::Downloader;
use crate::core::error::{Error, Result};
use crate::core::legend::{ActiveQuery, LegendEvent, OverlayId, QueryLegend};
use crate::core::query::{build_query, ElementKind};

/// Member of a relation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelationMember {
    pub kind: ElementKind,
    pub reference: i64,
    pub role: String,
}

/// An element of an OSM XML document
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OsmElement {
    Node {
        id: i64,
        lat: f64,
        lon: f64,
        tags: BTreeMap<String, String>,
    },
    Way {
        id: i64,
        node_refs: Vec<i64>,
        tags: BTreeMap<String, String>,
    },
    Relation {
        id: i64,
        members: Vec<RelationMember>,
        tags: BTreeMap<String, String>,
    },
}

impl OsmElement {
    pub fn id(&self) -> i64 {
        match self {
            OsmElement::Node { id, .. } | OsmElement::Way { id, .. } | OsmElement::Relation { id, .. } => *id,
        }
    }

    pub fn kind(&self) -> ElementKind {
        match self {
            OsmElement::Node { .. } => ElementKind::Node,
            OsmElement::Way { .. } => ElementKind::Way,
            OsmElement::Relation { .. } => ElementKind::Relation,
        }
    }

    pub fn tags(&self) -> &BTreeMap<String, String> {
        match self {
            OsmElement::Node { tags, .. } | OsmElement::Way { tags, .. } | OsmElement::Relation { tags, .. } => tags,
        }
    }

    fn tags_mut(&mut self) -> &mut BTreeMap<String, String> {
        match self {
            OsmElement::Node { tags, .. } | OsmElement::Way { tags, .. } | OsmElement::Relation { tags, .. } => tags,
        }
    }

    pub fn is_tagged(&self) -> bool {
        !self.tags().is_empty()
    }
}

fn attribute(element: &BytesStart, name: &str) -> Result<Option<String>> {
    let attr = element
        .try_get_attribute(name)
        .map_err(|e| Error::ParseError(format!("Invalid attribute '{name}': {e}")))?;
    match attr {
        Some(attr) => Ok(Some(attr.unescape_value()?.into_owned())),
        None => Ok(None),
    }
}

fn required_attribute<T: std::str::FromStr>(element: &BytesStart, name: &str) -> Result<T> {
    let tag = String::from_utf8_lossy(element.name().as_ref()).into_owned();
    let raw = attribute(element, name)?
        .ok_or_else(|| Error::ParseError(format!("<{tag}> without '{name}' attribute")))?;
    raw.parse()
        .map_err(|_| Error::ParseError(format!("<{tag}> has invalid '{name}' value '{raw}'")))
}

fn start_element(element: &BytesStart) -> Result<Option<OsmElement>> {
    let parsed = match element.name().as_ref() {
        b"node" => OsmElement::Node {
            id: required_attribute(element, "id")?,
            lat: required_attribute(element, "lat")?,
            lon: required_attribute(element, "lon")?,
            tags: BTreeMap::new(),
        },
        b"way" => OsmElement::Way {
            id: required_attribute(element, "id")?,
            node_refs: Vec::new(),
            tags: BTreeMap::new(),
        },
        b"relation" => OsmElement::Relation {
            id: required_attribute(element, "id")?,
            members: Vec::new(),
            tags: BTreeMap::new(),
        },
        _ => return Ok(None),
    };
    Ok(Some(parsed))
}

/// Apply a child element (`tag`, `nd`, `member`) to the element being built
fn apply_child(current: &mut OsmElement, child: &BytesStart) -> Result<()> {
    match child.name().as_ref() {
        b"tag" => {
            let key: String = required_attribute(child, "k")?;
            let value = attribute(child, "v")?.unwrap_or_default();
            current.tags_mut().insert(key, value);
        }
        b"nd" => {
            if let OsmElement::Way { node_refs, .. } = current {
                node_refs.push(required_attribute(child, "ref")?);
            }
        }
        b"member" => {
            if let OsmElement::Relation { members, .. } = current {
                let kind: String = required_attribute(child, "type")?;
                members.push(RelationMember {
                    kind: kind.parse()?,
                    reference: required_attribute(child, "ref")?,
                    role: attribute(child, "role")?.unwrap_or_default(),
                });
            }
        }
        _ => {}
    }
    Ok(())
}

/// Parse an Overpass OSM XML response.
///
/// A `<remark>` element is how Overpass reports runtime errors (timeouts,
/// memory exhaustion); it is returned as [`Error::OverpassError`].
pub fn parse_osm_xml(xml: &str) -> Result<Vec<OsmElement>> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut elements = Vec::new();
    let mut current: Option<OsmElement> = None;
    let mut remark: Option<String> = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) if e.name().as_ref() == b"remark" => {
                remark = Some(String::new());
            }
            Event::Start(e) => match current.as_mut() {
                Some(element) => apply_child(element, &e)?,
                None => current = start_element(&e)?,
            },
            Event::Empty(e) => match current.as_mut() {
                Some(element) => apply_child(element, &e)?,
                None => {
                    if let Some(element) = start_element(&e)? {
                        elements.push(element);
                    }
                }
            },
            Event::Text(text) => {
                if let Some(remark) = remark.as_mut() {
                    remark.push_str(&text.unescape()?);
                }
            }
            Event::End(e) => match e.name().as_ref() {
                b"remark" => {
                    let message = remark.take().unwrap_or_default();
                    return Err(Error::OverpassError(message.trim().to_string()));
                }
                b"node" | b"way" | b"relation" => {
                    if let Some(element) = current.take() {
                        elements.push(element);
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    debug!("Parsed {} OSM elements", elements.len());
    Ok(elements)
}

/// Element counts by geometry role
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FeatureStats {
    /// Nodes carrying tags
    pub standalone_nodes: usize,
    /// Untagged nodes, present as way or relation geometry
    pub vertex_nodes: usize,
    /// Open ways
    pub lines: usize,
    /// Closed ways (at least 4 refs, first equal to last)
    pub polygons: usize,
    pub relations: usize,
    /// Elements of any kind carrying at least one tag
    pub tagged_features: usize,
    /// Ways referencing nodes absent from the response
    pub incomplete_ways: usize,
}

impl FeatureStats {
    pub fn from_elements(elements: &[OsmElement]) -> Self {
        let node_ids: HashSet<i64> = elements
            .iter()
            .filter(|element| element.kind() == ElementKind::Node)
            .map(OsmElement::id)
            .collect();

        let mut stats = FeatureStats::default();
        for element in elements {
            if element.is_tagged() {
                stats.tagged_features += 1;
            }

            match element {
                OsmElement::Node { .. } if element.is_tagged() => stats.standalone_nodes += 1,
                OsmElement::Node { .. } => stats.vertex_nodes += 1,
                OsmElement::Way { node_refs, .. } => {
                    if is_closed(node_refs) {
                        stats.polygons += 1;
                    } else {
                        stats.lines += 1;
                    }
                    if node_refs.iter().any(|node| !node_ids.contains(node)) {
                        stats.incomplete_ways += 1;
                    }
                }
                OsmElement::Relation { .. } => stats.relations += 1,
            }
        }
        stats
    }

    /// Whether some geometry could not be drawn as returned
    pub fn is_degraded(&self) -> bool {
        self.incomplete_ways > 0
    }
}

fn is_closed(node_refs: &[i64]) -> bool {
    node_refs.len() >= 4 && node_refs.first() == node_refs.last()
}

/// A tag query to execute
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayRequest {
    pub key: String,
    /// `None` (or blank) matches every value of the key
    pub value: Option<String>,
    /// `[minLon, minLat, maxLon, maxLat]`
    pub bbox: [f64; 4],
    /// Empty selects every kind
    pub kinds: Vec<ElementKind>,
}

impl OverlayRequest {
    pub fn new(key: impl Into<String>, value: Option<String>, bbox: [f64; 4]) -> Self {
        Self {
            key: key.into(),
            value,
            bbox,
            kinds: ElementKind::ALL.to_vec(),
        }
    }

    pub fn with_kinds(mut self, kinds: Vec<ElementKind>) -> Self {
        self.kinds = kinds;
        self
    }

    pub fn overlay_id(&self) -> OverlayId {
        OverlayId::for_tag(&self.key, self.value.as_deref())
    }
}

/// Result of an executed query
#[derive(Debug, Clone, Serialize)]
pub struct Overlay {
    pub id: OverlayId,
    pub key: String,
    pub value: Option<String>,
    pub query: String,
    pub color: Color,
    pub stats: FeatureStats,
    pub elements: Vec<OsmElement>,
    pub elapsed_ms: u128,
}

type SharedOverlay = Shared<BoxFuture<'static, Result<Arc<Overlay>>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Executes tag queries and tracks them in a legend
pub struct OverlayRenderer {
    downloader: Downloader,
    legend: Arc<Mutex<QueryLegend>>,
    in_flight: Arc<Mutex<HashMap<OverlayId, SharedOverlay>>>,
}

impl OverlayRenderer {
    pub fn new(downloader: Downloader) -> Self {
        Self::with_legend(downloader, Arc::new(Mutex::new(QueryLegend::new())))
    }

    /// Share an existing legend with other components
    pub fn with_legend(downloader: Downloader, legend: Arc<Mutex<QueryLegend>>) -> Self {
        Self {
            downloader,
            legend,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn legend(&self) -> Arc<Mutex<QueryLegend>> {
        Arc::clone(&self.legend)
    }

    /// Copy of the current legend entries
    pub fn active_queries(&self) -> Vec<ActiveQuery> {
        lock(&self.legend).queries().to_vec()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LegendEvent> {
        lock(&self.legend).subscribe()
    }

    /// Number of requests currently awaiting a response
    pub fn in_flight(&self) -> usize {
        lock(&self.in_flight).len()
    }

    /// Execute a request.
    ///
    /// The legend entry for the pair is replaced (count 0, visible) before
    /// the request is sent, updated with the tagged feature count on
    /// success and removed on failure. While a request for the same pair
    /// is running, callers wait for it instead of sending another.
    pub async fn execute(&self, request: OverlayRequest) -> Result<Arc<Overlay>> {
        let id = request.overlay_id();

        let shared = {
            let mut in_flight = lock(&self.in_flight);
            match in_flight.get(&id) {
                Some(running) => {
                    debug!("⏳ {id} already running, waiting for its result");
                    running.clone()
                }
                None => {
                    let query = build_query(
                        &request.key,
                        request.value.as_deref(),
                        &request.bbox,
                        &request.kinds,
                    )
                    .ok_or_else(|| {
                        Error::InvalidInput(format!(
                            "Cannot build a query for key '{}' in bbox {:?}",
                            request.key, request.bbox
                        ))
                    })?;

                    lock(&self.legend).add_query(&request.key, request.value.as_deref());

                    let future = self.spawn_request(id.clone(), query, request);
                    in_flight.insert(id.clone(), future.clone());
                    future
                }
            }
        };

        shared.await
    }

    /// Run the request on its own task so it completes, and releases its
    /// in-flight entry, even when every caller stops waiting
    fn spawn_request(&self, id: OverlayId, query: String, request: OverlayRequest) -> SharedOverlay {
        let downloader = self.downloader.clone();
        let legend = Arc::clone(&self.legend);
        let in_flight = Arc::clone(&self.in_flight);

        let task_id = id.clone();
        let task_in_flight = Arc::clone(&self.in_flight);
        let task = tokio::spawn(async move {
            let outcome = fetch_overlay(&downloader, &task_id, query, request)
                .await
                .map(Arc::new);

            {
                let mut legend = lock(&legend);
                match &outcome {
                    Ok(overlay) => {
                        legend.update_count(&task_id, overlay.stats.tagged_features);
                    }
                    Err(e) => {
                        warn!("❌ Query {task_id} failed: {e}");
                        legend.remove_query(&task_id);
                    }
                }
            }
            lock(&task_in_flight).remove(&task_id);

            outcome
        });

        async move {
            task.await.unwrap_or_else(|e| {
                lock(&in_flight).remove(&id);
                Err(Error::OverpassError(format!("Query {id} did not complete: {e}")))
            })
        }
        .boxed()
        .shared()
    }

    /// Show or hide a legend entry
    pub fn set_visibility(&self, id: &OverlayId, visible: bool) -> bool {
        lock(&self.legend).update_visibility(id, visible)
    }

    pub fn remove(&self, id: &OverlayId) -> Option<ActiveQuery> {
        lock(&self.legend).remove_query(id)
    }

    pub fn clear(&self) {
        lock(&self.legend).clear();
    }
}

async fn fetch_overlay(
    downloader: &Downloader,
    id: &OverlayId,
    query: String,
    request: OverlayRequest,
) -> Result<Overlay> {
    let started = Instant::now();
    info!("🚀 Executing {id}");

    let xml = downloader.post_query(&query).await?;
    let elements = parse_osm_xml(&xml)?;
    let stats = FeatureStats::from_elements(&elements);

    let elapsed_ms = started.elapsed().as_millis();
    info!(
        "✅ {id}: {} elements, {} tagged features in {elapsed_ms}ms",
        elements.len(),
        stats.tagged_features
    );

    Ok(Overlay {
        id: id.clone(),
        key: request.key.trim().to_string(),
        value: request
            .value
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty()),
        query,
        color: query_color(id.as_str(), stats.is_degraded()),
        stats,
        elements,
        elapsed_ms,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::source::SourceConfig;
    use std::time::Duration;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const FUEL_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<osm version="0.6" generator="Overpass API">
  <note>The data included in this document is from www.openstreetmap.org.</note>
  <meta osm_base="2024-01-01T00:00:00Z"/>
  <node id="1" lat="41.0" lon="0.5" version="3">
    <tag k="amenity" v="fuel"/>
    <tag k="brand" v="Petr&amp;ol"/>
  </node>
  <node id="2" lat="41.1" lon="0.6">
    <tag k="amenity" v="fuel"/>
  </node>
  <node id="10" lat="41.2" lon="0.1"/>
  <node id="11" lat="41.2" lon="0.2"/>
  <node id="12" lat="41.3" lon="0.2"/>
  <way id="100">
    <nd ref="10"/>
    <nd ref="11"/>
    <nd ref="12"/>
    <nd ref="10"/>
    <tag k="amenity" v="fuel"/>
  </way>
  <way id="101">
    <nd ref="10"/>
    <nd ref="11"/>
  </way>
  <relation id="200">
    <member type="way" ref="100" role="outer"/>
    <tag k="amenity" v="fuel"/>
    <tag k="type" v="multipolygon"/>
  </relation>
</osm>"#;

    const REMARK_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<osm version="0.6" generator="Overpass API">
  <node id="1" lat="41.0" lon="0.5"/>
  <remark> runtime error: Query timed out in "query" at line 3 after 36 seconds. </remark>
</osm>"#;

    fn bbox() -> [f64; 4] {
        [-1.0, 40.0, 1.0, 42.0]
    }

    fn renderer_for(server: &MockServer) -> OverlayRenderer {
        let config = SourceConfig {
            overpass_url: format!("{}/api/interpreter", server.uri()),
            ..SourceConfig::default()
        };
        OverlayRenderer::new(Downloader::with_config(config))
    }

    #[test]
    fn test_parse_elements() {
        let elements = parse_osm_xml(FUEL_XML).unwrap();
        assert_eq!(elements.len(), 8);

        match &elements[0] {
            OsmElement::Node { id, lat, lon, tags } => {
                assert_eq!(*id, 1);
                assert_eq!((*lat, *lon), (41.0, 0.5));
                assert_eq!(tags.get("brand").map(String::as_str), Some("Petr&ol"));
            }
            other => panic!("Expected node, got {other:?}"),
        }

        match &elements[5] {
            OsmElement::Way { id, node_refs, tags } => {
                assert_eq!(*id, 100);
                assert_eq!(node_refs, &vec![10, 11, 12, 10]);
                assert_eq!(tags.len(), 1);
            }
            other => panic!("Expected way, got {other:?}"),
        }

        match &elements[7] {
            OsmElement::Relation { members, .. } => {
                assert_eq!(
                    members,
                    &vec![RelationMember {
                        kind: ElementKind::Way,
                        reference: 100,
                        role: "outer".to_string()
                    }]
                );
            }
            other => panic!("Expected relation, got {other:?}"),
        }
    }

    #[test]
    fn test_classify_elements() {
        let stats = FeatureStats::from_elements(&parse_osm_xml(FUEL_XML).unwrap());
        assert_eq!(
            stats,
            FeatureStats {
                standalone_nodes: 2,
                vertex_nodes: 3,
                lines: 1,
                polygons: 1,
                relations: 1,
                tagged_features: 4,
                incomplete_ways: 0,
            }
        );
        assert!(!stats.is_degraded());
    }

    #[test]
    fn test_short_closed_way_is_a_line() {
        let xml = r#"<osm><way id="1"><nd ref="5"/><nd ref="6"/><nd ref="5"/></way></osm>"#;
        let stats = FeatureStats::from_elements(&parse_osm_xml(xml).unwrap());
        assert_eq!(stats.lines, 1);
        assert_eq!(stats.polygons, 0);
        assert_eq!(stats.incomplete_ways, 1);
        assert!(stats.is_degraded());
    }

    #[test]
    fn test_remark_is_an_overpass_error() {
        let err = parse_osm_xml(REMARK_XML).unwrap_err();
        match err {
            Error::OverpassError(msg) => assert!(msg.starts_with("runtime error: Query timed out")),
            other => panic!("Expected OverpassError, got {other:?}"),
        }
    }

    #[test]
    fn test_malformed_xml_is_a_parse_error() {
        assert!(matches!(
            parse_osm_xml(r#"<osm><node id="x" lat="1" lon="2"/></osm>"#),
            Err(Error::ParseError(_))
        ));
        assert!(matches!(
            parse_osm_xml(r#"<osm><node id="1" lat="1" lon="2"></way></osm>"#),
            Err(Error::ParseError(_))
        ));
    }

    #[tokio::test]
    async fn test_execute_registers_one_legend_entry() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/interpreter"))
            .and(body_string_contains(r#"node["amenity"="fuel"](40,-1,42,1)"#))
            .respond_with(ResponseTemplate::new(200).set_body_string(FUEL_XML))
            .expect(2)
            .mount(&mock_server)
            .await;

        let renderer = renderer_for(&mock_server);
        let request = OverlayRequest::new("amenity", Some("fuel".to_string()), bbox());

        let overlay = renderer.execute(request.clone()).await.unwrap();
        assert_eq!(overlay.id.as_str(), "tag_amenity_fuel");
        assert_eq!(overlay.stats.tagged_features, 4);
        assert!(overlay.query.starts_with("[out:xml][timeout:35];"));

        // Executing again replaces the entry rather than adding one
        renderer.execute(request).await.unwrap();

        let active = renderer.active_queries();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].count, 4);
        assert!(active[0].visible);
        assert_eq!(renderer.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_executions_share_one_request() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(FUEL_XML)
                    .set_delay(Duration::from_millis(200)),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let renderer = renderer_for(&mock_server);
        let request = OverlayRequest::new("amenity", Some("fuel".to_string()), bbox());

        let (first, second) = tokio::join!(renderer.execute(request.clone()), renderer.execute(request));
        let (first, second) = (first.unwrap(), second.unwrap());

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(renderer.active_queries().len(), 1);
        assert_eq!(renderer.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_abandoned_execution_still_completes() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(FUEL_XML)
                    .set_delay(Duration::from_millis(300)),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let renderer = renderer_for(&mock_server);
        let request = OverlayRequest::new("amenity", Some("fuel".to_string()), bbox());

        let abandoned = tokio::time::timeout(Duration::from_millis(50), renderer.execute(request)).await;
        assert!(abandoned.is_err(), "the caller should give up before the response");
        assert_eq!(renderer.in_flight(), 1);

        tokio::time::sleep(Duration::from_millis(600)).await;

        assert_eq!(renderer.in_flight(), 0);
        let active = renderer.active_queries();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, OverlayId::for_tag("amenity", Some("fuel")));
        assert_eq!(active[0].count, 4);
    }

    #[tokio::test]
    async fn test_failed_execution_removes_legend_entry() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string(REMARK_XML))
            .mount(&mock_server)
            .await;

        let renderer = renderer_for(&mock_server);
        let mut events = renderer.subscribe();
        let request = OverlayRequest::new("shop", None, bbox()).with_kinds(vec![ElementKind::Node]);

        let err = renderer.execute(request).await.unwrap_err();
        assert!(matches!(err, Error::OverpassError(_)));
        assert!(renderer.active_queries().is_empty());

        let id = OverlayId::for_tag("shop", None);
        assert_eq!(events.try_recv().unwrap(), LegendEvent::Added(id.clone()));
        assert_eq!(events.try_recv().unwrap(), LegendEvent::Removed(id));
    }

    #[tokio::test]
    async fn test_overloaded_server() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(504))
            .mount(&mock_server)
            .await;

        let renderer = renderer_for(&mock_server);
        let err = renderer
            .execute(OverlayRequest::new("amenity", Some("cafe".to_string()), bbox()))
            .await
            .unwrap_err();

        assert!(err.to_string().contains("overloaded"));
        assert!(renderer.active_queries().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_request_sends_nothing() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string(FUEL_XML))
            .expect(0)
            .mount(&mock_server)
            .await;

        let renderer = renderer_for(&mock_server);
        let err = renderer
            .execute(OverlayRequest::new("  ", None, bbox()))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));

        let err = renderer
            .execute(OverlayRequest::new("amenity", None, [0.0, 0.0, 0.0, 500.0]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert!(renderer.active_queries().is_empty());
    }

    #[tokio::test]
    async fn test_visibility_and_clear() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string(FUEL_XML))
            .mount(&mock_server)
            .await;

        let renderer = renderer_for(&mock_server);
        let overlay = renderer
            .execute(OverlayRequest::new("amenity", Some("fuel".to_string()), bbox()))
            .await
            .unwrap();

        assert!(renderer.set_visibility(&overlay.id, false));
        assert!(lock(&renderer.legend()).visible_queries().is_empty());

        renderer.clear();
        assert!(renderer.active_queries().is_empty());
    }
}
