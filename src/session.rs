//! Per-route edit session state.
//!
//! An [`EditSession`] is created when a route is selected (or drafted) and
//! replaced wholesale on the next selection. It is owned exclusively by the
//! [`ShapeEngine`](crate::ShapeEngine); other components read snapshots and
//! issue commands back through the engine's operation set.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::history::ShapeHistory;
use crate::{Route, RouteStop, ShapePoint};

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

/// Identity of one edit session.
///
/// Asynchronous road-snap results capture the token before suspending and
/// compare it before committing; a mismatch means the user has moved on and
/// the result is discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionToken(u64);

impl SessionToken {
    fn next() -> Self {
        SessionToken(NEXT_TOKEN.fetch_add(1, Ordering::Relaxed))
    }
}

/// Ephemeral editing state for the currently selected route.
#[derive(Debug)]
pub struct EditSession {
    pub(crate) route: Route,
    pub(crate) shape_points: Vec<ShapePoint>,
    pub(crate) stop_bindings: Vec<RouteStop>,
    pub(crate) history: ShapeHistory,
    pub(crate) dirty: bool,
    pub(crate) auto_route: bool,
    token: SessionToken,
}

impl EditSession {
    pub fn new(route: Route, shape_points: Vec<ShapePoint>, stop_bindings: Vec<RouteStop>) -> Self {
        let mut session = Self {
            route,
            shape_points,
            stop_bindings,
            history: ShapeHistory::new(),
            dirty: false,
            auto_route: false,
            token: SessionToken::next(),
        };
        session.renumber_points();
        crate::stops::resequence(&mut session.stop_bindings);
        session
    }

    pub fn route(&self) -> &Route {
        &self.route
    }

    pub fn shape_points(&self) -> &[ShapePoint] {
        &self.shape_points
    }

    pub fn stop_bindings(&self) -> &[RouteStop] {
        &self.stop_bindings
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn auto_route(&self) -> bool {
        self.auto_route
    }

    pub fn token(&self) -> SessionToken {
        self.token
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub(crate) fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub(crate) fn mark_clean(&mut self) {
        self.dirty = false;
    }

    /// Full copy of the current point list, for history snapshots.
    pub(crate) fn snapshot_points(&self) -> Vec<ShapePoint> {
        self.shape_points.clone()
    }

    /// Restamp `sequence` to `1..=N` and `shape_id` to the route's derived
    /// shape id. Called after every insert/delete/replace.
    pub(crate) fn renumber_points(&mut self) {
        let shape_id = self.route.shape_id();
        for (i, point) in self.shape_points.iter_mut().enumerate() {
            point.sequence = (i + 1) as u32;
            point.shape_id = shape_id.clone();
        }
    }

    /// Restamp binding order and ownership before a save.
    pub(crate) fn restamp_bindings(&mut self) {
        let route_id = self.route.id;
        for binding in &mut self.stop_bindings {
            binding.route_id = route_id;
        }
        crate::stops::resequence(&mut self.stop_bindings);
    }
}
