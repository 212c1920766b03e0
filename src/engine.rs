//! Shape editing engine.
//!
//! Owns the authoritative in-memory shape and stop sequence for the route
//! being edited and exposes the only sanctioned mutation surface. Every
//! shape mutation records the pre-mutation point list in the session
//! history and marks the session dirty; asynchronous road-snap results are
//! committed only after a session-identity check so responses for an
//! abandoned session are discarded.
//!
//! Routing failures never corrupt existing state: appends and inserts fall
//! back to the raw clicked point, whole-shape snaps leave the shape
//! untouched, and the failure is surfaced as a status message.

use std::sync::Arc;

use futures::future::join_all;
use log::{debug, info, warn};

use crate::error::{Result, StudioError};
use crate::session::{EditSession, SessionToken};
use crate::snap::RoadSnapper;
use crate::status::{Status, StatusReporter};
use crate::{stops, LatLng, Route, RouteStop, ShapePoint, Stop};

/// Tolerance for treating two coordinates as the same vertex when splicing
/// routed geometry.
const COORD_EPS: f64 = 1e-9;

/// The editing engine. Generic over the routing provider so tests can
/// script routing outcomes.
pub struct ShapeEngine<R: RoadSnapper> {
    snapper: R,
    status: Arc<dyn StatusReporter>,
    session: Option<EditSession>,
}

impl<R: RoadSnapper> ShapeEngine<R> {
    pub fn new(snapper: R, status: Arc<dyn StatusReporter>) -> Self {
        Self {
            snapper,
            status,
            session: None,
        }
    }

    /// Replace the edit session for a newly selected route. The previous
    /// session (and its undo history) is dropped; any road-snap response
    /// still in flight for it will fail the token check and be ignored.
    pub fn load_session(
        &mut self,
        route: Route,
        shape_points: Vec<ShapePoint>,
        stop_bindings: Vec<RouteStop>,
    ) {
        info!(
            "loading edit session for route {} ({} points, {} stops)",
            route.id,
            shape_points.len(),
            stop_bindings.len()
        );
        self.session = Some(EditSession::new(route, shape_points, stop_bindings));
    }

    pub fn clear_session(&mut self) {
        self.session = None;
    }

    pub fn session(&self) -> Option<&EditSession> {
        self.session.as_ref()
    }

    pub(crate) fn session_mut(&mut self) -> Option<&mut EditSession> {
        self.session.as_mut()
    }

    fn active(&self) -> Result<&EditSession> {
        self.session.as_ref().ok_or(StudioError::NoActiveRoute)
    }

    fn active_mut(&mut self) -> Result<&mut EditSession> {
        self.session.as_mut().ok_or(StudioError::NoActiveRoute)
    }

    /// Record the pre-mutation point list and mark the session dirty.
    fn checkpoint(session: &mut EditSession) {
        let snapshot = session.snapshot_points();
        session.history.push(snapshot);
        session.mark_dirty();
    }

    // ========================================================================
    // Shape operations
    // ========================================================================

    /// Append a vertex at the end of the shape. With auto-route enabled and
    /// at least one existing point, the straight append is replaced by the
    /// road path from the last vertex; on routing failure the raw point is
    /// appended instead.
    pub async fn append_point(&mut self, at: LatLng) -> Result<()> {
        let (token, anchor) = {
            let session = self.active()?;
            let anchor = if session.auto_route {
                session.shape_points.last().map(|p| p.latlng())
            } else {
                None
            };
            (session.token(), anchor)
        };

        let Some(anchor) = anchor else {
            return self.append_raw(at);
        };

        let routed = self.snapper.route(&[anchor, at]).await;
        match routed {
            Ok(path) => self.commit_routed_append(token, path),
            Err(err) => {
                warn!("road snap failed while appending, falling back to raw point: {err}");
                self.status
                    .report(Status::error(format!("Road snap failed: {err}")));
                self.append_raw(at)
            }
        }
    }

    fn append_raw(&mut self, at: LatLng) -> Result<()> {
        let session = self.active_mut()?;
        Self::checkpoint(session);
        let shape_id = session.route.shape_id();
        let sequence = session.shape_points.len() as u32 + 1;
        session
            .shape_points
            .push(ShapePoint::new(shape_id, at, sequence));
        Ok(())
    }

    fn commit_routed_append(&mut self, token: SessionToken, path: Vec<LatLng>) -> Result<()> {
        let session = self.active_mut()?;
        if session.token() != token {
            debug!("discarding stale road-snap result for appended point");
            return Ok(());
        }

        Self::checkpoint(session);
        let shape_id = session.route.shape_id();
        let mut last = session.shape_points.last().map(|p| p.latlng());
        for at in path {
            if last.is_some_and(|prev| prev.approx_eq(&at, COORD_EPS)) {
                continue;
            }
            let sequence = session.shape_points.len() as u32 + 1;
            session
                .shape_points
                .push(ShapePoint::new(shape_id.clone(), at, sequence));
            last = Some(at);
        }
        Ok(())
    }

    /// Insert a vertex between `index - 1` and `index`. Strictly interior
    /// inserts with auto-route enabled are routed through the neighboring
    /// vertices; end inserts and routing failures take the raw point.
    pub async fn insert_point(&mut self, index: usize, at: LatLng) -> Result<()> {
        let (token, neighbors) = {
            let session = self.active()?;
            let len = session.shape_points.len();
            if index > len {
                return Err(StudioError::IndexOutOfBounds { index, len });
            }
            let neighbors = if session.auto_route && index > 0 && index < len {
                Some((
                    session.shape_points[index - 1].latlng(),
                    session.shape_points[index].latlng(),
                ))
            } else {
                None
            };
            (session.token(), neighbors)
        };

        let Some((before, after)) = neighbors else {
            return self.insert_raw(index, at);
        };

        let routed = self.snapper.route(&[before, at, after]).await;
        match routed {
            Ok(path) => self.commit_routed_insert(token, index, before, after, path),
            Err(err) => {
                warn!("road snap failed while inserting, falling back to raw point: {err}");
                self.status
                    .report(Status::error(format!("Road snap failed: {err}")));
                self.insert_raw(index, at)
            }
        }
    }

    fn insert_raw(&mut self, index: usize, at: LatLng) -> Result<()> {
        let session = self.active_mut()?;
        let len = session.shape_points.len();
        if index > len {
            return Err(StudioError::IndexOutOfBounds { index, len });
        }
        Self::checkpoint(session);
        let shape_id = session.route.shape_id();
        session
            .shape_points
            .insert(index, ShapePoint::new(shape_id, at, 0));
        session.renumber_points();
        Ok(())
    }

    fn commit_routed_insert(
        &mut self,
        token: SessionToken,
        index: usize,
        before: LatLng,
        after: LatLng,
        path: Vec<LatLng>,
    ) -> Result<()> {
        let session = self.active_mut()?;
        if session.token() != token {
            debug!("discarding stale road-snap result for inserted point");
            return Ok(());
        }
        let len = session.shape_points.len();
        if index > len {
            return Err(StudioError::IndexOutOfBounds { index, len });
        }

        // Intermediate geometry only: strip the anchors themselves and
        // collapse consecutive duplicates.
        let mut intermediates: Vec<LatLng> = Vec::with_capacity(path.len());
        for at in path {
            if at.approx_eq(&before, COORD_EPS) || at.approx_eq(&after, COORD_EPS) {
                continue;
            }
            if intermediates
                .last()
                .is_some_and(|prev| prev.approx_eq(&at, COORD_EPS))
            {
                continue;
            }
            intermediates.push(at);
        }
        if intermediates.is_empty() {
            debug!("routed insert produced no intermediate geometry, leaving shape unchanged");
            return Ok(());
        }

        Self::checkpoint(session);
        let shape_id = session.route.shape_id();
        session.shape_points.splice(
            index..index,
            intermediates
                .into_iter()
                .map(|at| ShapePoint::new(shape_id.clone(), at, 0)),
        );
        session.renumber_points();
        Ok(())
    }

    /// Replace the coordinates at `index` in place. Sequence numbers are
    /// untouched and no re-routing happens.
    pub fn move_point(&mut self, index: usize, at: LatLng) -> Result<()> {
        let session = self.active_mut()?;
        let len = session.shape_points.len();
        if index >= len {
            return Err(StudioError::IndexOutOfBounds { index, len });
        }
        Self::checkpoint(session);
        let point = &mut session.shape_points[index];
        point.lat = at.lat;
        point.lon = at.lon;
        Ok(())
    }

    /// Remove the vertex at `index` and renumber the remainder.
    pub fn delete_point(&mut self, index: usize) -> Result<()> {
        let session = self.active_mut()?;
        let len = session.shape_points.len();
        if index >= len {
            return Err(StudioError::IndexOutOfBounds { index, len });
        }
        Self::checkpoint(session);
        session.shape_points.remove(index);
        session.renumber_points();
        Ok(())
    }

    /// Clear all points. Destructive; callers confirm with the user first.
    pub fn reset_shape(&mut self) -> Result<()> {
        let session = self.active_mut()?;
        Self::checkpoint(session);
        session.shape_points.clear();
        Ok(())
    }

    /// Send the whole point list as waypoints and replace the shape with
    /// the returned road-following geometry. On failure the shape is left
    /// exactly as it was.
    pub async fn snap_all_to_road(&mut self) -> Result<()> {
        let (token, waypoints) = {
            let session = self.active()?;
            if session.shape_points.len() < 2 {
                self.status
                    .report(Status::info("Add at least two points before snapping"));
                return Ok(());
            }
            let waypoints: Vec<LatLng> = session.shape_points.iter().map(|p| p.latlng()).collect();
            (session.token(), waypoints)
        };

        let routed = self.snapper.route(&waypoints).await;
        match routed {
            Ok(path) => self.commit_full_snap(token, path),
            Err(err) => {
                warn!("full-path road snap failed: {err}");
                self.status
                    .report(Status::error(format!("Road snap failed: {err}")));
                Ok(())
            }
        }
    }

    fn commit_full_snap(&mut self, token: SessionToken, path: Vec<LatLng>) -> Result<()> {
        let session = self.active_mut()?;
        if session.token() != token {
            debug!("discarding stale road-snap result for full path");
            return Ok(());
        }

        Self::checkpoint(session);
        let shape_id = session.route.shape_id();
        let mut replaced: Vec<ShapePoint> = Vec::with_capacity(path.len());
        for at in path {
            if replaced
                .last()
                .is_some_and(|prev| prev.latlng().approx_eq(&at, COORD_EPS))
            {
                continue;
            }
            replaced.push(ShapePoint::new(shape_id.clone(), at, 0));
        }
        session.shape_points = replaced;
        session.renumber_points();

        self.status.report(Status::success("Path snapped to roads"));
        Ok(())
    }

    /// Snap each existing vertex independently to the nearest road without
    /// changing the point count. Lookups degrade per point, so a vertex the
    /// provider cannot answer for keeps its coordinates.
    pub async fn snap_anchors_to_road(&mut self) -> Result<()> {
        let (token, anchors) = {
            let session = self.active()?;
            if session.shape_points.is_empty() {
                return Ok(());
            }
            let anchors: Vec<LatLng> = session.shape_points.iter().map(|p| p.latlng()).collect();
            (session.token(), anchors)
        };

        let lookups = anchors.iter().map(|p| self.snapper.nearest_road(*p));
        let snapped: Vec<LatLng> = join_all(lookups).await;
        self.commit_anchor_snap(token, snapped)
    }

    fn commit_anchor_snap(&mut self, token: SessionToken, snapped: Vec<LatLng>) -> Result<()> {
        let session = self.active_mut()?;
        if session.token() != token {
            debug!("discarding stale nearest-road results");
            return Ok(());
        }
        if snapped.len() != session.shape_points.len() {
            debug!("shape changed while snapping anchors, discarding results");
            return Ok(());
        }

        Self::checkpoint(session);
        for (point, at) in session.shape_points.iter_mut().zip(snapped) {
            point.lat = at.lat;
            point.lon = at.lon;
        }

        self.status
            .report(Status::success("Anchors snapped to nearest roads"));
        Ok(())
    }

    /// Restore the most recent history snapshot. Returns `false` (and
    /// reports it) when there is nothing to undo.
    pub fn undo(&mut self) -> Result<bool> {
        let previous = self.active_mut()?.history.pop();
        match previous {
            Some(points) => {
                let session = self.active_mut()?;
                session.shape_points = points;
                session.mark_dirty();
                Ok(true)
            }
            None => {
                self.status.report(Status::info("Nothing to undo"));
                Ok(false)
            }
        }
    }

    pub fn set_auto_route(&mut self, enabled: bool) -> Result<()> {
        self.active_mut()?.auto_route = enabled;
        Ok(())
    }

    // ========================================================================
    // Stop sequence operations
    // ========================================================================

    /// Bind a stop to the end of the sequence. Rejects stops already bound.
    pub fn add_stop(&mut self, stop: Stop) -> Result<()> {
        let session = self.active_mut()?;
        if session.stop_bindings.iter().any(|b| b.stop_id == stop.id) {
            return Err(StudioError::DuplicateStop { stop_id: stop.id });
        }

        let binding = RouteStop {
            route_id: session.route.id,
            stop_id: stop.id,
            sequence: session.stop_bindings.len() as u32 + 1,
            stop: Some(stop),
        };
        session.stop_bindings.push(binding);
        stops::resequence(&mut session.stop_bindings);
        session.mark_dirty();
        Ok(())
    }

    pub fn remove_stop(&mut self, index: usize) -> Result<()> {
        let session = self.active_mut()?;
        let len = session.stop_bindings.len();
        if index >= len {
            return Err(StudioError::StopIndexOutOfBounds { index, len });
        }
        session.stop_bindings.remove(index);
        stops::resequence(&mut session.stop_bindings);
        session.mark_dirty();
        Ok(())
    }

    /// Reorder the bound stops to match `order` (stop ids, a permutation of
    /// the current bindings).
    pub fn reorder_stops(&mut self, order: &[u64]) -> Result<()> {
        let session = self.active_mut()?;
        if order.len() != session.stop_bindings.len() {
            return Err(StudioError::InvalidReorder);
        }

        let mut used = vec![false; session.stop_bindings.len()];
        let mut indices = Vec::with_capacity(order.len());
        for stop_id in order {
            match session
                .stop_bindings
                .iter()
                .position(|b| b.stop_id == *stop_id)
            {
                Some(i) if !used[i] => {
                    used[i] = true;
                    indices.push(i);
                }
                _ => return Err(StudioError::InvalidReorder),
            }
        }

        let reordered: Vec<RouteStop> = indices
            .into_iter()
            .map(|i| session.stop_bindings[i].clone())
            .collect();
        session.stop_bindings = reordered;
        stops::resequence(&mut session.stop_bindings);
        session.mark_dirty();
        Ok(())
    }

    /// Project every bound stop onto the closest point of the current
    /// shape. Pure geometry; no routing calls.
    pub fn snap_stops_to_path(&mut self) -> Result<()> {
        let applied = {
            let session = self.active_mut()?;
            let applied =
                stops::snap_stops_to_path(&mut session.stop_bindings, &session.shape_points);
            if applied {
                session.mark_dirty();
            }
            applied
        };
        if applied {
            self.status.report(Status::success("Stops snapped to path"));
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::MemoryReporter;

    /// Scripted routing provider: `route` replays a fixed polyline or fails,
    /// `nearest_road` shifts points north by a fixed amount.
    #[derive(Clone, Default)]
    struct StubSnapper {
        route_points: Option<Vec<LatLng>>,
        nearest_shift: f64,
    }

    impl RoadSnapper for StubSnapper {
        async fn route(&self, waypoints: &[LatLng]) -> Result<Vec<LatLng>> {
            match &self.route_points {
                Some(points) => Ok(points.clone()),
                None => Err(StudioError::NoRoute {
                    waypoints: waypoints.len(),
                }),
            }
        }

        async fn nearest_road(&self, point: LatLng) -> LatLng {
            LatLng::new(point.lat + self.nearest_shift, point.lon)
        }
    }

    fn engine_with(snapper: StubSnapper) -> (ShapeEngine<StubSnapper>, Arc<MemoryReporter>) {
        let reporter = Arc::new(MemoryReporter::new());
        let mut engine = ShapeEngine::new(snapper, reporter.clone());
        let mut route = Route::draft(1);
        route.id = 3;
        route.short_name = "K1".into();
        engine.load_session(route, Vec::new(), Vec::new());
        (engine, reporter)
    }

    fn coords(engine: &ShapeEngine<StubSnapper>) -> Vec<(f64, f64)> {
        engine
            .session()
            .unwrap()
            .shape_points()
            .iter()
            .map(|p| (p.lat, p.lon))
            .collect()
    }

    fn sequences(engine: &ShapeEngine<StubSnapper>) -> Vec<u32> {
        engine
            .session()
            .unwrap()
            .shape_points()
            .iter()
            .map(|p| p.sequence)
            .collect()
    }

    fn stop(id: u64) -> Stop {
        Stop {
            id,
            name: format!("Stop {id}"),
            lat: id as f64,
            lon: id as f64,
        }
    }

    #[tokio::test]
    async fn test_append_without_auto_route() {
        let (mut engine, _) = engine_with(StubSnapper::default());
        engine.append_point(LatLng::new(1.0, 1.0)).await.unwrap();
        engine.append_point(LatLng::new(2.0, 2.0)).await.unwrap();

        assert_eq!(coords(&engine), vec![(1.0, 1.0), (2.0, 2.0)]);
        assert_eq!(sequences(&engine), vec![1, 2]);
        assert!(engine.session().unwrap().is_dirty());
    }

    #[tokio::test]
    async fn test_append_with_auto_route_splices_geometry() {
        let routed = vec![
            LatLng::new(0.0, 0.0), // duplicate of the anchor, must be skipped
            LatLng::new(0.5, 0.5),
            LatLng::new(1.0, 1.0),
        ];
        let (mut engine, _) = engine_with(StubSnapper {
            route_points: Some(routed),
            ..Default::default()
        });

        engine.append_point(LatLng::new(0.0, 0.0)).await.unwrap();
        engine.set_auto_route(true).unwrap();
        engine.append_point(LatLng::new(1.0, 1.0)).await.unwrap();

        assert_eq!(coords(&engine), vec![(0.0, 0.0), (0.5, 0.5), (1.0, 1.0)]);
        assert_eq!(sequences(&engine), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_append_routing_failure_falls_back_to_raw_point() {
        let (mut engine, reporter) = engine_with(StubSnapper::default());
        engine.append_point(LatLng::new(0.0, 0.0)).await.unwrap();
        engine.set_auto_route(true).unwrap();

        engine.append_point(LatLng::new(1.0, 1.0)).await.unwrap();

        // Exactly the fallback raw point, never a partial splice
        assert_eq!(coords(&engine), vec![(0.0, 0.0), (1.0, 1.0)]);
        let status = reporter.latest().unwrap();
        assert_eq!(status.level, crate::StatusLevel::Error);
    }

    #[tokio::test]
    async fn test_insert_raw_between_points() {
        let (mut engine, _) = engine_with(StubSnapper::default());
        engine.append_point(LatLng::new(1.0, 1.0)).await.unwrap();
        engine.append_point(LatLng::new(2.0, 2.0)).await.unwrap();

        engine.insert_point(1, LatLng::new(1.5, 1.5)).await.unwrap();

        assert_eq!(coords(&engine), vec![(1.0, 1.0), (1.5, 1.5), (2.0, 2.0)]);
        assert_eq!(sequences(&engine), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_insert_interior_with_auto_route() {
        let routed = vec![
            LatLng::new(0.0, 0.0), // anchor, stripped
            LatLng::new(0.2, 0.2),
            LatLng::new(0.4, 0.4),
            LatLng::new(1.0, 1.0), // anchor, stripped
        ];
        let (mut engine, _) = engine_with(StubSnapper {
            route_points: Some(routed),
            ..Default::default()
        });
        engine.append_point(LatLng::new(0.0, 0.0)).await.unwrap();
        engine.append_point(LatLng::new(1.0, 1.0)).await.unwrap();
        engine.set_auto_route(true).unwrap();

        engine.insert_point(1, LatLng::new(0.3, 0.3)).await.unwrap();

        assert_eq!(
            coords(&engine),
            vec![(0.0, 0.0), (0.2, 0.2), (0.4, 0.4), (1.0, 1.0)]
        );
        assert_eq!(sequences(&engine), vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_insert_out_of_bounds() {
        let (mut engine, _) = engine_with(StubSnapper::default());
        let err = engine
            .insert_point(5, LatLng::new(0.0, 0.0))
            .await
            .unwrap_err();
        assert!(matches!(err, StudioError::IndexOutOfBounds { index: 5, .. }));
    }

    #[tokio::test]
    async fn test_delete_renumbers_and_preserves_rest() {
        let (mut engine, _) = engine_with(StubSnapper::default());
        for i in 1..=3 {
            engine
                .append_point(LatLng::new(i as f64, i as f64))
                .await
                .unwrap();
        }

        engine.delete_point(1).unwrap();

        assert_eq!(coords(&engine), vec![(1.0, 1.0), (3.0, 3.0)]);
        assert_eq!(sequences(&engine), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_move_point_keeps_sequence() {
        let (mut engine, _) = engine_with(StubSnapper::default());
        engine.append_point(LatLng::new(1.0, 1.0)).await.unwrap();
        engine.append_point(LatLng::new(2.0, 2.0)).await.unwrap();

        engine.move_point(0, LatLng::new(9.0, 9.0)).unwrap();

        assert_eq!(coords(&engine), vec![(9.0, 9.0), (2.0, 2.0)]);
        assert_eq!(sequences(&engine), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_undo_restores_exact_prior_state() {
        let (mut engine, _) = engine_with(StubSnapper::default());
        engine.append_point(LatLng::new(1.0, 1.0)).await.unwrap();
        let before = engine.session().unwrap().shape_points().to_vec();

        engine.append_point(LatLng::new(2.0, 2.0)).await.unwrap();
        assert!(engine.undo().unwrap());

        assert_eq!(engine.session().unwrap().shape_points(), &before[..]);
    }

    #[tokio::test]
    async fn test_undo_with_empty_history_is_noop() {
        let (mut engine, reporter) = engine_with(StubSnapper::default());
        assert!(!engine.undo().unwrap());
        assert!(engine.session().unwrap().shape_points().is_empty());
        assert_eq!(reporter.latest().unwrap().level, crate::StatusLevel::Info);
    }

    #[tokio::test]
    async fn test_reset_clears_and_is_undoable() {
        let (mut engine, _) = engine_with(StubSnapper::default());
        engine.append_point(LatLng::new(1.0, 1.0)).await.unwrap();
        engine.reset_shape().unwrap();
        assert!(engine.session().unwrap().shape_points().is_empty());

        engine.undo().unwrap();
        assert_eq!(coords(&engine), vec![(1.0, 1.0)]);
    }

    #[tokio::test]
    async fn test_snap_all_replaces_whole_shape() {
        let routed = vec![
            LatLng::new(0.0, 0.0),
            LatLng::new(0.0, 0.0), // consecutive duplicate, collapsed
            LatLng::new(0.5, 0.5),
            LatLng::new(1.1, 1.1),
        ];
        let (mut engine, _) = engine_with(StubSnapper {
            route_points: Some(routed),
            ..Default::default()
        });
        engine.append_point(LatLng::new(0.0, 0.0)).await.unwrap();
        engine.append_point(LatLng::new(1.0, 1.0)).await.unwrap();

        engine.snap_all_to_road().await.unwrap();

        assert_eq!(coords(&engine), vec![(0.0, 0.0), (0.5, 0.5), (1.1, 1.1)]);
        assert_eq!(sequences(&engine), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_snap_all_failure_leaves_shape_unchanged() {
        let (mut engine, reporter) = engine_with(StubSnapper::default());
        engine.append_point(LatLng::new(0.0, 0.0)).await.unwrap();
        engine.append_point(LatLng::new(1.0, 1.0)).await.unwrap();
        let before = engine.session().unwrap().shape_points().to_vec();

        engine.snap_all_to_road().await.unwrap();

        assert_eq!(engine.session().unwrap().shape_points(), &before[..]);
        assert_eq!(reporter.latest().unwrap().level, crate::StatusLevel::Error);
    }

    #[tokio::test]
    async fn test_snap_anchors_moves_points_in_place() {
        let (mut engine, _) = engine_with(StubSnapper {
            nearest_shift: 0.1,
            ..Default::default()
        });
        engine.append_point(LatLng::new(1.0, 1.0)).await.unwrap();
        engine.append_point(LatLng::new(2.0, 2.0)).await.unwrap();

        engine.snap_anchors_to_road().await.unwrap();

        assert_eq!(coords(&engine), vec![(1.1, 1.0), (2.1, 2.0)]);
        assert_eq!(sequences(&engine), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_stale_routed_result_is_discarded() {
        let (mut engine, _) = engine_with(StubSnapper::default());
        engine.append_point(LatLng::new(0.0, 0.0)).await.unwrap();
        let stale = engine.session().unwrap().token();

        // User switches to another route before the response lands
        engine.load_session(Route::draft(1), Vec::new(), Vec::new());
        engine
            .commit_routed_append(stale, vec![LatLng::new(5.0, 5.0)])
            .unwrap();

        assert!(engine.session().unwrap().shape_points().is_empty());
        assert!(!engine.session().unwrap().is_dirty());
    }

    #[tokio::test]
    async fn test_sequences_stay_contiguous_under_mixed_edits() {
        let (mut engine, _) = engine_with(StubSnapper::default());
        for i in 0..6 {
            engine
                .append_point(LatLng::new(i as f64, i as f64))
                .await
                .unwrap();
        }
        engine.delete_point(2).unwrap();
        engine.insert_point(1, LatLng::new(9.0, 9.0)).await.unwrap();
        engine.delete_point(0).unwrap();

        let len = engine.session().unwrap().shape_points().len();
        assert_eq!(sequences(&engine), (1..=len as u32).collect::<Vec<_>>());
    }

    #[test]
    fn test_add_stop_rejects_duplicates() {
        let (mut engine, _) = engine_with(StubSnapper::default());
        engine.add_stop(stop(7)).unwrap();
        let err = engine.add_stop(stop(7)).unwrap_err();
        assert!(matches!(err, StudioError::DuplicateStop { stop_id: 7 }));
    }

    #[test]
    fn test_reorder_stops() {
        let (mut engine, _) = engine_with(StubSnapper::default());
        for id in [1, 2, 3] {
            engine.add_stop(stop(id)).unwrap();
        }

        engine.reorder_stops(&[3, 1, 2]).unwrap();

        let session = engine.session().unwrap();
        let ids: Vec<u64> = session.stop_bindings().iter().map(|b| b.stop_id).collect();
        let seqs: Vec<u32> = session.stop_bindings().iter().map(|b| b.sequence).collect();
        assert_eq!(ids, vec![3, 1, 2]);
        assert_eq!(seqs, vec![1, 2, 3]);

        assert!(matches!(
            engine.reorder_stops(&[3, 3, 1]),
            Err(StudioError::InvalidReorder)
        ));
        assert!(matches!(
            engine.reorder_stops(&[1, 2]),
            Err(StudioError::InvalidReorder)
        ));
    }

    #[tokio::test]
    async fn test_snap_stops_projects_bound_stops() {
        let (mut engine, _) = engine_with(StubSnapper::default());
        engine.add_stop(stop(1)).unwrap();
        engine.append_point(LatLng::new(0.0, 0.0)).await.unwrap();
        engine.append_point(LatLng::new(0.0, 2.0)).await.unwrap();

        engine.snap_stops_to_path().unwrap();
        let snapped = engine.session().unwrap().stop_bindings()[0]
            .stop
            .as_ref()
            .unwrap()
            .latlng();
        assert!(snapped.lat.abs() < 1e-6);
    }

    #[test]
    fn test_operations_require_active_session() {
        let reporter = Arc::new(MemoryReporter::new());
        let mut engine = ShapeEngine::new(StubSnapper::default(), reporter);
        assert!(matches!(
            engine.move_point(0, LatLng::new(0.0, 0.0)),
            Err(StudioError::NoActiveRoute)
        ));
    }
}
