//! Road-snap client against an OSRM-style driving-directions provider.
//!
//! Two operations: a full route through ordered waypoints (fails when the
//! provider finds no route) and a nearest-road lookup for a single point
//! (degrades to the original point on any failure). Results are committed
//! by the engine only after a session-identity check, so responses that
//! outlive their session are discarded rather than applied.

use std::time::Duration;

use log::warn;
use reqwest::Client;
use serde::Deserialize;

use crate::error::{Result, StudioError};
use crate::LatLng;

/// Public OSRM demo server; override with [`OsrmClient::with_base_url`].
pub const DEFAULT_OSRM_URL: &str = "https://router.project-osrm.org";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Interface to the routing provider.
///
/// The engine is generic over this trait so tests can script routing
/// outcomes without a network.
#[allow(async_fn_in_trait)]
pub trait RoadSnapper {
    /// Road-following polyline through all waypoints in order.
    async fn route(&self, waypoints: &[LatLng]) -> Result<Vec<LatLng>>;

    /// Nearest road-network location to `point`; returns `point` unchanged
    /// when the provider cannot answer.
    async fn nearest_road(&self, point: LatLng) -> LatLng;
}

/// HTTP client for an OSRM `route`/`nearest` API.
#[derive(Debug, Clone)]
pub struct OsrmClient {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct RouteResponse {
    #[serde(default)]
    routes: Vec<OsrmRoute>,
}

#[derive(Debug, Deserialize)]
struct OsrmRoute {
    geometry: OsrmGeometry,
}

#[derive(Debug, Deserialize)]
struct OsrmGeometry {
    /// `[lon, lat]` pairs
    coordinates: Vec<[f64; 2]>,
}

#[derive(Debug, Deserialize)]
struct NearestResponse {
    #[serde(default)]
    waypoints: Vec<OsrmWaypoint>,
}

#[derive(Debug, Deserialize)]
struct OsrmWaypoint {
    /// `[lon, lat]`
    location: [f64; 2],
}

impl OsrmClient {
    pub fn new() -> Result<Self> {
        Self::with_base_url(DEFAULT_OSRM_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| StudioError::Routing(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    fn coord_path(waypoints: &[LatLng]) -> String {
        waypoints
            .iter()
            .map(|p| format!("{},{}", p.lon, p.lat))
            .collect::<Vec<_>>()
            .join(";")
    }
}

impl RoadSnapper for OsrmClient {
    async fn route(&self, waypoints: &[LatLng]) -> Result<Vec<LatLng>> {
        if waypoints.len() < 2 {
            return Err(StudioError::NotEnoughWaypoints(waypoints.len()));
        }

        let url = format!(
            "{}/route/v1/driving/{}?overview=full&geometries=geojson",
            self.base_url,
            Self::coord_path(waypoints)
        );

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| StudioError::Routing(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(StudioError::Routing(format!("HTTP {status}")));
        }

        let body: RouteResponse = response
            .json()
            .await
            .map_err(|e| StudioError::Routing(format!("bad response: {e}")))?;

        let route = body.routes.into_iter().next().ok_or(StudioError::NoRoute {
            waypoints: waypoints.len(),
        })?;
        if route.geometry.coordinates.is_empty() {
            return Err(StudioError::NoRoute {
                waypoints: waypoints.len(),
            });
        }

        Ok(route
            .geometry
            .coordinates
            .into_iter()
            .map(|c| LatLng::new(c[1], c[0]))
            .collect())
    }

    async fn nearest_road(&self, point: LatLng) -> LatLng {
        let url = format!(
            "{}/nearest/v1/driving/{},{}",
            self.base_url, point.lon, point.lat
        );

        let snapped = async {
            let response = self.client.get(&url).send().await.ok()?;
            if !response.status().is_success() {
                return None;
            }
            let body: NearestResponse = response.json().await.ok()?;
            let waypoint = body.waypoints.first()?;
            Some(LatLng::new(waypoint.location[1], waypoint.location[0]))
        }
        .await;

        match snapped {
            Some(at) => at,
            None => {
                warn!("nearest-road lookup failed for {},{}", point.lat, point.lon);
                point
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coord_path_format() {
        let path = OsrmClient::coord_path(&[LatLng::new(-7.39, 109.36), LatLng::new(-7.4, 109.4)]);
        assert_eq!(path, "109.36,-7.39;109.4,-7.4");
    }

    #[test]
    fn test_route_response_decoding() {
        let body: RouteResponse = serde_json::from_str(
            r#"{"routes":[{"geometry":{"coordinates":[[109.36,-7.39],[109.37,-7.4]],"type":"LineString"}}],"code":"Ok"}"#,
        )
        .unwrap();
        assert_eq!(body.routes[0].geometry.coordinates.len(), 2);
        // coordinates are [lon, lat]
        assert_eq!(body.routes[0].geometry.coordinates[0][0], 109.36);
    }

    #[tokio::test]
    async fn test_route_rejects_single_waypoint() {
        let client = OsrmClient::new().unwrap();
        let err = client.route(&[LatLng::new(0.0, 0.0)]).await.unwrap_err();
        assert!(matches!(err, StudioError::NotEnoughWaypoints(1)));
    }
}
