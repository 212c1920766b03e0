//! Route studio workspace: selection lifecycle, event dispatch and the
//! autosave tick.
//!
//! The composition root. Engine, persistence coordinator and map layer are
//! wired together here with explicit references; nothing reaches for
//! ambient state. The map frontend feeds [`MapEvent`]s in and pulls
//! [`MapLayers`] back out after each command.

use std::sync::Arc;
use std::time::{Duration, Instant};

use log::warn;

use crate::api::GtfsBackend;
use crate::engine::ShapeEngine;
use crate::error::{Result, StudioError};
use crate::map::{self, LayerOptions, MapEvent, MapLayers};
use crate::persist::{PersistenceCoordinator, SaveState};
use crate::session::EditSession;
use crate::snap::RoadSnapper;
use crate::status::StatusReporter;
use crate::{Agency, Route, Stop};

/// Which sidebar pane is active. Map clicks append path vertices only
/// while the path pane is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StudioPane {
    Metadata,
    Path,
    Stops,
}

/// The route studio: one selected route at a time, edited locally and
/// reconciled with the backend by debounced or manual saves.
pub struct RouteStudio<R: RoadSnapper, B: GtfsBackend> {
    engine: ShapeEngine<R>,
    coordinator: PersistenceCoordinator<B>,
    routes: Vec<Route>,
    all_stops: Vec<Stop>,
    agencies: Vec<Agency>,
    pane: StudioPane,
    options: LayerOptions,
}

impl<R: RoadSnapper, B: GtfsBackend> RouteStudio<R, B> {
    pub fn new(snapper: R, backend: B, status: Arc<dyn StatusReporter>) -> Self {
        Self::with_autosave_delay(snapper, backend, status, crate::persist::AUTOSAVE_DELAY)
    }

    pub fn with_autosave_delay(
        snapper: R,
        backend: B,
        status: Arc<dyn StatusReporter>,
        delay: Duration,
    ) -> Self {
        Self {
            engine: ShapeEngine::new(snapper, status.clone()),
            coordinator: PersistenceCoordinator::with_delay(backend, status, delay),
            routes: Vec::new(),
            all_stops: Vec::new(),
            agencies: Vec::new(),
            pane: StudioPane::Metadata,
            options: LayerOptions::default(),
        }
    }

    // ========================================================================
    // Reference data
    // ========================================================================

    /// Reload the route/stop/agency pickers from the backend.
    pub async fn refresh(&mut self) -> Result<()> {
        let backend = self.coordinator.backend();
        let routes = backend.routes().await?;
        let stops = backend.stops().await?;
        let agencies = backend.agencies().await?;
        self.routes = routes;
        self.all_stops = stops;
        self.agencies = agencies;
        Ok(())
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn all_stops(&self) -> &[Stop] {
        &self.all_stops
    }

    pub fn agencies(&self) -> &[Agency] {
        &self.agencies
    }

    // ========================================================================
    // Selection lifecycle
    // ========================================================================

    /// Select a route for editing. A dirty previous selection is saved
    /// implicitly first; then the route's bindings and shape (via its trip)
    /// are loaded into a fresh session.
    pub async fn select_route(&mut self, route: Route) -> Result<()> {
        if let Some(session) = self.engine.session_mut() {
            self.coordinator.flush(session).await;
        }
        self.coordinator.reset();

        let backend = self.coordinator.backend();
        let trips = backend.trips().await?;
        let bindings = backend.route_stops(route.id).await?;
        let points = match trips
            .iter()
            .find(|t| t.route_id == route.id && !t.shape_id.is_empty())
        {
            Some(trip) => {
                let mut points = backend.shape(&trip.shape_id).await?;
                // May be unsorted on the wire
                points.sort_by_key(|p| p.sequence);
                points
            }
            None => Vec::new(),
        };

        self.engine.load_session(route, points, bindings);
        self.pane = StudioPane::Metadata;
        Ok(())
    }

    /// Start a brand-new route. Dirty from the start so the first save
    /// creates it on the backend.
    pub async fn new_route(&mut self, agency_id: u64) {
        if let Some(session) = self.engine.session_mut() {
            self.coordinator.flush(session).await;
        }
        self.coordinator.reset();

        self.engine
            .load_session(Route::draft(agency_id), Vec::new(), Vec::new());
        if let Some(session) = self.engine.session_mut() {
            session.mark_dirty();
        }
        self.coordinator.mark_dirty(Instant::now());
        self.pane = StudioPane::Metadata;
    }

    /// Close the editor, flushing pending changes.
    pub async fn close(&mut self) {
        if let Some(session) = self.engine.session_mut() {
            self.coordinator.flush(session).await;
        }
        self.engine.clear_session();
        self.coordinator.reset();
    }

    pub fn session(&self) -> Option<&EditSession> {
        self.engine.session()
    }

    pub fn save_state(&self) -> SaveState {
        self.coordinator.state()
    }

    pub fn pane(&self) -> StudioPane {
        self.pane
    }

    pub fn set_pane(&mut self, pane: StudioPane) {
        self.pane = pane;
    }

    pub fn set_layer_visibility(&mut self, show_vertices: bool, show_stops: bool) {
        self.options.show_vertices = show_vertices;
        self.options.show_stops = show_stops;
    }

    // ========================================================================
    // Map events
    // ========================================================================

    /// Translate a raw map event into an engine command.
    pub async fn dispatch(&mut self, event: MapEvent) -> Result<()> {
        match event {
            MapEvent::MapClicked(at) => {
                if self.pane != StudioPane::Path || self.engine.session().is_none() {
                    return Ok(());
                }
                self.engine.append_point(at).await?;
            }
            MapEvent::VertexDragged { index, to } => self.engine.move_point(index, to)?,
            MapEvent::VertexRemoved { index } => self.engine.delete_point(index)?,
            MapEvent::PolylineClicked(at) => {
                let index = self
                    .engine
                    .session()
                    .and_then(|s| map::insert_index_for_click(s, at));
                match index {
                    Some(index) => self.engine.insert_point(index, at).await?,
                    None => return Ok(()),
                }
            }
            MapEvent::MidpointClicked { index, at } => {
                self.engine.insert_point(index, at).await?
            }
        }
        self.note_mutation();
        Ok(())
    }

    /// Current renderable layers; editor markers appear only while the
    /// path pane is open.
    pub fn layers(&self) -> MapLayers {
        match self.engine.session() {
            Some(session) => {
                let options = LayerOptions {
                    path_editing: self.pane == StudioPane::Path,
                    ..self.options
                };
                map::render(session, options)
            }
            None => MapLayers::default(),
        }
    }

    // ========================================================================
    // Editing commands
    // ========================================================================

    /// Apply a metadata edit (name, color, agency, ...) and mark dirty.
    pub fn edit_route(&mut self, edit: impl FnOnce(&mut Route)) -> Result<()> {
        let session = self
            .engine
            .session_mut()
            .ok_or(StudioError::NoActiveRoute)?;
        edit(&mut session.route);
        session.mark_dirty();
        self.note_mutation();
        Ok(())
    }

    pub fn undo(&mut self) -> Result<bool> {
        let undone = self.engine.undo()?;
        if undone {
            self.note_mutation();
        }
        Ok(undone)
    }

    pub fn reset_shape(&mut self) -> Result<()> {
        self.engine.reset_shape()?;
        self.note_mutation();
        Ok(())
    }

    pub fn set_auto_route(&mut self, enabled: bool) -> Result<()> {
        self.engine.set_auto_route(enabled)
    }

    pub async fn snap_full_path(&mut self) -> Result<()> {
        self.engine.snap_all_to_road().await?;
        self.note_mutation();
        Ok(())
    }

    pub async fn snap_anchor_points(&mut self) -> Result<()> {
        self.engine.snap_anchors_to_road().await?;
        self.note_mutation();
        Ok(())
    }

    pub fn snap_stops(&mut self) -> Result<()> {
        self.engine.snap_stops_to_path()?;
        self.note_mutation();
        Ok(())
    }

    pub fn add_stop(&mut self, stop: Stop) -> Result<()> {
        self.engine.add_stop(stop)?;
        self.note_mutation();
        Ok(())
    }

    pub fn remove_stop(&mut self, index: usize) -> Result<()> {
        self.engine.remove_stop(index)?;
        self.note_mutation();
        Ok(())
    }

    pub fn reorder_stops(&mut self, order: &[u64]) -> Result<()> {
        self.engine.reorder_stops(order)?;
        self.note_mutation();
        Ok(())
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    /// Explicit save: runs immediately with user-visible feedback, then
    /// refreshes reference data.
    pub async fn save(&mut self) -> Result<()> {
        let session = self
            .engine
            .session_mut()
            .ok_or(StudioError::NoActiveRoute)?;
        self.coordinator.save(session, true).await?;
        if let Err(err) = self.refresh().await {
            warn!("reference data refresh after save failed: {err}");
        }
        Ok(())
    }

    /// Drive the debounced autosave. Embedders call this from their timer
    /// loop; returns whether a save was attempted.
    pub async fn tick(&mut self, now: Instant) -> bool {
        let Some(session) = self.engine.session_mut() else {
            return false;
        };
        self.coordinator.autosave_if_due(session, now).await
    }

    /// Sleep out the pending debounce window and fire the autosave.
    /// Returns `false` immediately when nothing is scheduled; embedders
    /// with their own timers can call [`RouteStudio::tick`] instead.
    pub async fn run_autosave_once(&mut self) -> bool {
        match self.coordinator.autosave_remaining(Instant::now()) {
            Some(wait) => {
                if !wait.is_zero() {
                    tokio::time::sleep(wait).await;
                }
                self.tick(Instant::now()).await
            }
            None => false,
        }
    }

    /// Reschedule the autosave deadline when the session became dirty.
    fn note_mutation(&mut self) {
        if self.engine.session().is_some_and(|s| s.is_dirty()) {
            self.coordinator.mark_dirty(Instant::now());
        }
    }
}
