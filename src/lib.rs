//! # Route Studio
//!
//! Interactive editing engine for GTFS route geometry ("shapes") and stop
//! sequences. All state lives in Rust; a map frontend drives the engine
//! through a small event/command surface and renders the layers the engine
//! produces.
//!
//! The crate covers:
//! - An edit session per selected route: ordered shape points, bound stops,
//!   bounded undo history, dirty tracking
//! - Road snapping through an external routing provider (OSRM-style API)
//! - Debounced autosave and a four-step save pipeline against the GTFS
//!   backend (route metadata, shape, trip binding, stop order)
//! - Translation between engine state and renderable map layers
//!
//! ## Quick Start
//!
//! ```no_run
//! use route_studio::{LatLng, Route, ShapeEngine};
//! use route_studio::snap::OsrmClient;
//! use route_studio::status::LogReporter;
//! use std::sync::Arc;
//!
//! # async fn demo() -> route_studio::Result<()> {
//! let snapper = OsrmClient::new()?;
//! let mut engine = ShapeEngine::new(snapper, Arc::new(LogReporter));
//! engine.load_session(Route::draft(1), Vec::new(), Vec::new());
//! engine.append_point(LatLng::new(-7.393, 109.360)).await?;
//! engine.append_point(LatLng::new(-7.395, 109.365)).await?;
//! assert_eq!(engine.session().unwrap().shape_points().len(), 2);
//! # Ok(())
//! # }
//! ```

use serde::{Deserialize, Serialize};

// Unified error handling
pub mod error;
pub use error::{Result, StudioError};

// Geographic utilities (mercator projection, segment projection)
pub mod geo_utils;

// Bounded undo history for shape mutations
pub mod history;
pub use history::ShapeHistory;

// Edit session state (per selected route)
pub mod session;
pub use session::{EditSession, SessionToken};

// Shape editing engine (the only sanctioned mutation surface)
pub mod engine;
pub use engine::ShapeEngine;

// Stop sequence geometry and renumbering
pub mod stops;

// Road-snap client (external routing provider)
pub mod snap;
pub use snap::{OsrmClient, RoadSnapper};

// Backend REST client
pub mod api;
pub use api::{GtfsBackend, HttpBackend};

// Save state machine + debounced autosave
pub mod persist;
pub use persist::{PersistenceCoordinator, SaveState};

// Map projection layer (events in, layers out)
pub mod map;
pub use map::{LayerOptions, MapEvent, MapLayers};

// Status reporting channel
pub mod status;
pub use status::{Status, StatusLevel, StatusReporter};

// Workspace: selection lifecycle + event dispatch + autosave tick
pub mod workspace;
pub use workspace::{RouteStudio, StudioPane};

// ============================================================================
// Core Types
// ============================================================================

/// A WGS84 coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lon: f64,
}

impl LatLng {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Check if the coordinate is finite and within WGS84 bounds.
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && self.lat >= -90.0
            && self.lat <= 90.0
            && self.lon >= -180.0
            && self.lon <= 180.0
    }

    /// Coordinate equality within `eps` degrees on both axes.
    pub fn approx_eq(&self, other: &LatLng, eps: f64) -> bool {
        (self.lat - other.lat).abs() <= eps && (self.lon - other.lon).abs() <= eps
    }
}

/// One vertex of a route's path, as stored by the backend.
///
/// Points of a shape share a `shape_id` and are ordered by `sequence`,
/// which the engine keeps contiguous at `1..=N`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapePoint {
    pub shape_id: String,
    pub lat: f64,
    pub lon: f64,
    pub sequence: u32,
}

impl ShapePoint {
    pub fn new(shape_id: impl Into<String>, at: LatLng, sequence: u32) -> Self {
        Self {
            shape_id: shape_id.into(),
            lat: at.lat,
            lon: at.lon,
            sequence,
        }
    }

    pub fn latlng(&self) -> LatLng {
        LatLng::new(self.lat, self.lon)
    }
}

/// A transit stop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stop {
    #[serde(default)]
    pub id: u64,
    pub name: String,
    pub lat: f64,
    pub lon: f64,
}

impl Stop {
    pub fn latlng(&self) -> LatLng {
        LatLng::new(self.lat, self.lon)
    }
}

/// An operating agency (reference data for pickers).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agency {
    #[serde(default)]
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub timezone: String,
}

/// Route metadata. A freshly drafted route carries `id == 0` until the
/// backend allocates one on the first save.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    #[serde(default)]
    pub id: u64,
    pub agency_id: u64,
    pub short_name: String,
    pub long_name: String,
    pub color: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub route_type: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub route_desc: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub route_url: Option<String>,
}

/// Default line color for drafted routes.
pub const DEFAULT_ROUTE_COLOR: &str = "007AFF";

impl Route {
    /// A blank route ready for editing, not yet known to the backend.
    pub fn draft(agency_id: u64) -> Self {
        Self {
            id: 0,
            agency_id,
            short_name: String::new(),
            long_name: String::new(),
            color: DEFAULT_ROUTE_COLOR.to_string(),
            text_color: None,
            route_type: None,
            route_desc: None,
            route_url: None,
        }
    }

    /// Derived shape id: `SHP_<SHORT_NAME>`, falling back to the numeric
    /// route id when the route has no short name yet.
    pub fn shape_id(&self) -> String {
        if self.short_name.is_empty() {
            format!("SHP_{}", self.id)
        } else {
            format!("SHP_{}", self.short_name.to_uppercase())
        }
    }
}

/// The trip record binding a route to its shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trip {
    #[serde(default)]
    pub id: u64,
    pub route_id: u64,
    pub shape_id: String,
    #[serde(default)]
    pub headsign: String,
}

/// One stop assigned to a route, with the stop record denormalized in.
///
/// The embedded stop's coordinates may be moved locally by the
/// snap-stops-to-path projection without writing back to the stop record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteStop {
    pub route_id: u64,
    pub stop_id: u64,
    pub sequence: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<Stop>,
}

/// Bounding box over a set of coordinates, used as the map focus hint.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl Bounds {
    pub fn from_latlngs<'a>(points: impl IntoIterator<Item = &'a LatLng>) -> Option<Self> {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let mut bounds = Bounds {
            min_lat: first.lat,
            max_lat: first.lat,
            min_lon: first.lon,
            max_lon: first.lon,
        };
        for p in iter {
            bounds.min_lat = bounds.min_lat.min(p.lat);
            bounds.max_lat = bounds.max_lat.max(p.lat);
            bounds.min_lon = bounds.min_lon.min(p.lon);
            bounds.max_lon = bounds.max_lon.max(p.lon);
        }
        Some(bounds)
    }

    pub fn center(&self) -> LatLng {
        LatLng::new(
            (self.min_lat + self.max_lat) / 2.0,
            (self.min_lon + self.max_lon) / 2.0,
        )
    }
}

// ============================================================================
// Tests
// ============================================================================
