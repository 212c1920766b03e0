//! Backend REST client.
//!
//! The editing core consumes a small slice of the GTFS backend: reference
//! data for pickers, the route/shape/trip/stop-binding records the save
//! pipeline writes, and the shape fetch on selection. `GET /shapes/{id}`
//! may arrive unsorted on the wire; callers sort by `sequence`.

use log::debug;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Result, StudioError};
use crate::{Agency, Route, RouteStop, ShapePoint, Stop, Trip};

/// Interface to the GTFS backend, mirrored by an in-memory implementation
/// in the scenario tests.
#[allow(async_fn_in_trait)]
pub trait GtfsBackend {
    async fn routes(&self) -> Result<Vec<Route>>;
    async fn stops(&self) -> Result<Vec<Stop>>;
    async fn agencies(&self) -> Result<Vec<Agency>>;
    async fn trips(&self) -> Result<Vec<Trip>>;
    async fn create_trip(&self, trip: &Trip) -> Result<Trip>;
    async fn route_stops(&self, route_id: u64) -> Result<Vec<RouteStop>>;
    async fn put_route_stops(&self, route_id: u64, bindings: &[RouteStop]) -> Result<()>;
    /// Wire order, possibly unsorted.
    async fn shape(&self, shape_id: &str) -> Result<Vec<ShapePoint>>;
    async fn put_shape(&self, shape_id: &str, points: &[ShapePoint]) -> Result<()>;
    async fn create_route(&self, route: &Route) -> Result<Route>;
    async fn update_route(&self, route: &Route) -> Result<()>;
}

/// reqwest-backed implementation of [`GtfsBackend`].
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| StudioError::Backend(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        Err(StudioError::BackendStatus {
            status: status.as_u16(),
            message,
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        debug!("GET {path}");
        let response = self
            .client
            .get(self.url(path))
            .send()
            .await
            .map_err(|e| StudioError::Backend(e.to_string()))?;
        Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| StudioError::Backend(format!("bad response for {path}: {e}")))
    }

    async fn put_json<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<()> {
        debug!("PUT {path}");
        let response = self
            .client
            .put(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(|e| StudioError::Backend(e.to_string()))?;
        Self::check(response).await.map(|_| ())
    }

    async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        debug!("POST {path}");
        let response = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(|e| StudioError::Backend(e.to_string()))?;
        Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| StudioError::Backend(format!("bad response for {path}: {e}")))
    }
}

impl GtfsBackend for HttpBackend {
    async fn routes(&self) -> Result<Vec<Route>> {
        self.get_json("/routes").await
    }

    async fn stops(&self) -> Result<Vec<Stop>> {
        self.get_json("/stops").await
    }

    async fn agencies(&self) -> Result<Vec<Agency>> {
        self.get_json("/agencies").await
    }

    async fn trips(&self) -> Result<Vec<Trip>> {
        self.get_json("/trips").await
    }

    async fn create_trip(&self, trip: &Trip) -> Result<Trip> {
        self.post_json("/trips", trip).await
    }

    async fn route_stops(&self, route_id: u64) -> Result<Vec<RouteStop>> {
        self.get_json(&format!("/routes/{route_id}/stops")).await
    }

    async fn put_route_stops(&self, route_id: u64, bindings: &[RouteStop]) -> Result<()> {
        self.put_json(&format!("/routes/{route_id}/stops"), bindings)
            .await
    }

    async fn shape(&self, shape_id: &str) -> Result<Vec<ShapePoint>> {
        self.get_json(&format!("/shapes/{shape_id}")).await
    }

    async fn put_shape(&self, shape_id: &str, points: &[ShapePoint]) -> Result<()> {
        self.put_json(&format!("/shapes/{shape_id}"), points).await
    }

    async fn create_route(&self, route: &Route) -> Result<Route> {
        self.post_json("/routes", route).await
    }

    async fn update_route(&self, route: &Route) -> Result<()> {
        self.put_json(&format!("/routes/{}", route.id), route).await
    }
}

/// Forwarding impl so a shared backend (`Arc<B>`) satisfies the same
/// interface as the backend it wraps. Lets the studio hold a cheaply
/// cloneable handle to one backend instance.
impl<T: GtfsBackend + ?Sized> GtfsBackend for std::sync::Arc<T> {
    async fn routes(&self) -> Result<Vec<Route>> {
        (**self).routes().await
    }

    async fn stops(&self) -> Result<Vec<Stop>> {
        (**self).stops().await
    }

    async fn agencies(&self) -> Result<Vec<Agency>> {
        (**self).agencies().await
    }

    async fn trips(&self) -> Result<Vec<Trip>> {
        (**self).trips().await
    }

    async fn create_trip(&self, trip: &Trip) -> Result<Trip> {
        (**self).create_trip(trip).await
    }

    async fn route_stops(&self, route_id: u64) -> Result<Vec<RouteStop>> {
        (**self).route_stops(route_id).await
    }

    async fn put_route_stops(&self, route_id: u64, bindings: &[RouteStop]) -> Result<()> {
        (**self).put_route_stops(route_id, bindings).await
    }

    async fn shape(&self, shape_id: &str) -> Result<Vec<ShapePoint>> {
        (**self).shape(shape_id).await
    }

    async fn put_shape(&self, shape_id: &str, points: &[ShapePoint]) -> Result<()> {
        (**self).put_shape(shape_id, points).await
    }

    async fn create_route(&self, route: &Route) -> Result<Route> {
        (**self).create_route(route).await
    }

    async fn update_route(&self, route: &Route) -> Result<()> {
        (**self).update_route(route).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_join() {
        let backend = HttpBackend::new("http://localhost:8080/api").unwrap();
        assert_eq!(
            backend.url("/routes/3/stops"),
            "http://localhost:8080/api/routes/3/stops"
        );
    }

    #[test]
    fn test_route_stop_wire_roundtrip() {
        let json = r#"[{"route_id":3,"stop_id":7,"sequence":2,"stop":{"id":7,"name":"Alun-alun","lat":-7.39,"lon":109.36}}]"#;
        let bindings: Vec<RouteStop> = serde_json::from_str(json).unwrap();
        assert_eq!(bindings[0].stop.as_ref().unwrap().name, "Alun-alun");

        let back = serde_json::to_string(&bindings).unwrap();
        assert!(back.contains("\"sequence\":2"));
    }
}
