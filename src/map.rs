//! Map projection layer.
//!
//! Stateless translation between engine state and renderable layers, and
//! between raw pointer events and engine commands. The only geometry it
//! owns is the nearest-segment computation for click-to-insert; all
//! mutation authority stays with the engine.

use geojson::{Feature, FeatureCollection, Geometry, Value};
use serde_json::json;

use crate::session::EditSession;
use crate::{geo_utils, Bounds, LatLng};

/// Raw pointer events from the map surface.
#[derive(Debug, Clone, PartialEq)]
pub enum MapEvent {
    /// Click on empty map surface.
    MapClicked(LatLng),
    /// A shape vertex marker was dragged to a new location.
    VertexDragged { index: usize, to: LatLng },
    /// Secondary-click / context action on a vertex marker.
    VertexRemoved { index: usize },
    /// Click on the shape polyline itself.
    PolylineClicked(LatLng),
    /// Click on the midpoint affordance between vertex `index - 1` and
    /// `index`.
    MidpointClicked { index: usize, at: LatLng },
}

/// A draggable shape vertex.
#[derive(Debug, Clone, PartialEq)]
pub struct VertexMarker {
    pub index: usize,
    pub at: LatLng,
}

/// Insertion affordance halfway along a segment; clicking it inserts at
/// `insert_index`.
#[derive(Debug, Clone, PartialEq)]
pub struct MidpointMarker {
    pub insert_index: usize,
    pub at: LatLng,
}

/// Non-interactive stop marker.
#[derive(Debug, Clone, PartialEq)]
pub struct StopMarker {
    pub stop_id: u64,
    pub name: String,
    pub at: LatLng,
}

/// Layer visibility and interaction mode.
#[derive(Debug, Clone, Copy)]
pub struct LayerOptions {
    pub show_vertices: bool,
    pub show_stops: bool,
    /// Only while path editing is active do clicks append and vertex
    /// markers render.
    pub path_editing: bool,
}

impl Default for LayerOptions {
    fn default() -> Self {
        Self {
            show_vertices: true,
            show_stops: true,
            path_editing: false,
        }
    }
}

/// Renderable layers derived from one engine state snapshot.
#[derive(Debug, Clone, Default)]
pub struct MapLayers {
    /// Active shape polyline in traversal order.
    pub polyline: Vec<LatLng>,
    /// Line color, `#`-prefixed.
    pub color: String,
    pub vertices: Vec<VertexMarker>,
    pub midpoints: Vec<MidpointMarker>,
    pub stops: Vec<StopMarker>,
    /// Bounding box the map view should fit to.
    pub focus: Option<Bounds>,
}

/// Normalize a stored route color (`007AFF` or `#007AFF`) for rendering.
fn css_color(raw: &str) -> String {
    if raw.is_empty() {
        format!("#{}", crate::DEFAULT_ROUTE_COLOR)
    } else if let Some(stripped) = raw.strip_prefix('#') {
        format!("#{stripped}")
    } else {
        format!("#{raw}")
    }
}

/// Project an engine state snapshot into renderable layers.
pub fn render(session: &EditSession, options: LayerOptions) -> MapLayers {
    let path: Vec<LatLng> = session.shape_points().iter().map(|p| p.latlng()).collect();

    let show_editor = options.path_editing && options.show_vertices;
    let vertices = if show_editor {
        path.iter()
            .enumerate()
            .map(|(index, at)| VertexMarker { index, at: *at })
            .collect()
    } else {
        Vec::new()
    };

    let midpoints = if show_editor {
        path.windows(2)
            .enumerate()
            .map(|(i, pair)| MidpointMarker {
                insert_index: i + 1,
                at: LatLng::new(
                    (pair[0].lat + pair[1].lat) / 2.0,
                    (pair[0].lon + pair[1].lon) / 2.0,
                ),
            })
            .collect()
    } else {
        Vec::new()
    };

    let stops = if options.show_stops {
        session
            .stop_bindings()
            .iter()
            .filter_map(|binding| {
                let stop = binding.stop.as_ref()?;
                Some(StopMarker {
                    stop_id: binding.stop_id,
                    name: stop.name.clone(),
                    at: stop.latlng(),
                })
            })
            .collect()
    } else {
        Vec::new()
    };

    MapLayers {
        focus: Bounds::from_latlngs(&path),
        color: css_color(&session.route().color),
        polyline: path,
        vertices,
        midpoints,
        stops,
    }
}

/// Resolve a click on the polyline to the insert index of the nearest
/// segment.
pub fn insert_index_for_click(session: &EditSession, click: LatLng) -> Option<usize> {
    let path: Vec<LatLng> = session.shape_points().iter().map(|p| p.latlng()).collect();
    geo_utils::nearest_segment_insert_index(&path, click)
}

fn position(at: &LatLng) -> Vec<f64> {
    vec![at.lon, at.lat]
}

impl MapLayers {
    /// Export the layers as a GeoJSON feature collection. Features carry a
    /// `kind` property (`shape`, `vertex`, `midpoint`, `stop`) for styling.
    pub fn to_geojson(&self) -> FeatureCollection {
        let mut features = Vec::new();

        if self.polyline.len() > 1 {
            let mut feature = Feature {
                bbox: None,
                geometry: Some(Geometry::new(Value::LineString(
                    self.polyline.iter().map(position).collect(),
                ))),
                id: None,
                properties: None,
                foreign_members: None,
            };
            feature.set_property("kind", "shape");
            feature.set_property("color", self.color.clone());
            features.push(feature);
        }

        for vertex in &self.vertices {
            let mut feature = point_feature(&vertex.at, "vertex");
            feature.set_property("index", vertex.index as u64);
            features.push(feature);
        }

        for midpoint in &self.midpoints {
            let mut feature = point_feature(&midpoint.at, "midpoint");
            feature.set_property("insert_index", midpoint.insert_index as u64);
            features.push(feature);
        }

        for stop in &self.stops {
            let mut feature = point_feature(&stop.at, "stop");
            feature.set_property("stop_id", stop.stop_id);
            feature.set_property("name", stop.name.clone());
            features.push(feature);
        }

        let foreign_members = self.focus.map(|bounds| {
            let mut members = serde_json::Map::new();
            members.insert(
                "focus".to_string(),
                json!([
                    [bounds.min_lat, bounds.min_lon],
                    [bounds.max_lat, bounds.max_lon]
                ]),
            );
            members
        });

        FeatureCollection {
            bbox: None,
            features,
            foreign_members,
        }
    }
}

fn point_feature(at: &LatLng, kind: &str) -> Feature {
    let mut feature = Feature {
        bbox: None,
        geometry: Some(Geometry::new(Value::Point(position(at)))),
        id: None,
        properties: None,
        foreign_members: None,
    };
    feature.set_property("kind", kind);
    feature
}
