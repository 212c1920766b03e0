//! Persistence coordinator: reconciles local dirty state with the backend.
//!
//! A small state machine over clean/dirty/saving plus a single cancellable
//! debounce deadline. Shape edits apply locally first; the backend is
//! brought up to date by the debounced autosave or an explicit save. A
//! failed save keeps the local edits and the dirty flag so the next attempt
//! retries everything.

use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::api::GtfsBackend;
use crate::error::Result;
use crate::session::EditSession;
use crate::status::{Status, StatusReporter};
use crate::Trip;

/// Debounce window for autosave after the last dirty-marking mutation.
pub const AUTOSAVE_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveState {
    Clean,
    Dirty,
    Saving,
}

/// The single scheduled-task slot for autosave. Every dirty-marking
/// mutation reschedules it; a save (or route switch) cancels it.
#[derive(Debug)]
pub struct SaveScheduler {
    delay: Duration,
    deadline: Option<Instant>,
}

impl SaveScheduler {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            deadline: None,
        }
    }

    pub fn reschedule(&mut self, now: Instant) {
        self.deadline = Some(now + self.delay);
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn is_due(&self, now: Instant) -> bool {
        self.deadline.is_some_and(|deadline| now >= deadline)
    }

    /// Time left until the deadline, for embedders driving a timer.
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        self.deadline.map(|d| d.saturating_duration_since(now))
    }
}

/// Debounced/manual save pipeline over a [`GtfsBackend`].
pub struct PersistenceCoordinator<B: GtfsBackend> {
    backend: B,
    status: Arc<dyn StatusReporter>,
    state: SaveState,
    scheduler: SaveScheduler,
}

impl<B: GtfsBackend> PersistenceCoordinator<B> {
    pub fn new(backend: B, status: Arc<dyn StatusReporter>) -> Self {
        Self::with_delay(backend, status, AUTOSAVE_DELAY)
    }

    pub fn with_delay(backend: B, status: Arc<dyn StatusReporter>, delay: Duration) -> Self {
        Self {
            backend,
            status,
            state: SaveState::Clean,
            scheduler: SaveScheduler::new(delay),
        }
    }

    pub fn state(&self) -> SaveState {
        self.state
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Time until the pending autosave deadline, if one is scheduled.
    pub fn autosave_remaining(&self, now: Instant) -> Option<Duration> {
        self.scheduler.remaining(now)
    }

    /// Called after every mutating operation: moves to dirty and resets the
    /// autosave deadline.
    pub fn mark_dirty(&mut self, now: Instant) {
        self.state = SaveState::Dirty;
        self.scheduler.reschedule(now);
    }

    /// Reset to clean after a session switch; the old deadline no longer
    /// applies to the new session.
    pub fn reset(&mut self) {
        self.state = SaveState::Clean;
        self.scheduler.cancel();
    }

    /// Fire the autosave if its deadline has elapsed. Returns whether a
    /// save was attempted.
    pub async fn autosave_if_due(&mut self, session: &mut EditSession, now: Instant) -> bool {
        if self.state != SaveState::Dirty || !self.scheduler.is_due(now) {
            return false;
        }
        debug!("autosave deadline elapsed for route {}", session.route().id);
        let _ = self.save(session, false).await;
        true
    }

    /// Flush a dirty session before it is replaced. Errors are surfaced as
    /// a status but not propagated; the switch proceeds regardless.
    pub async fn flush(&mut self, session: &mut EditSession) {
        if session.is_dirty() {
            info!("implicit save for route {} before switch", session.route().id);
            let _ = self.save(session, false).await;
        }
        self.reset();
    }

    /// Run the four-step save pipeline. `manual` saves report progress and
    /// success; automatic saves only surface failures.
    ///
    /// Local state is never rolled back: on failure the session stays dirty
    /// and every step is retried on the next attempt.
    pub async fn save(&mut self, session: &mut EditSession, manual: bool) -> Result<()> {
        self.scheduler.cancel();
        self.state = SaveState::Saving;
        if manual {
            self.status.report(Status::info("Saving changes"));
        }

        let outcome = self.run_save(session).await;
        match outcome {
            Ok(()) => {
                session.mark_clean();
                self.state = SaveState::Clean;
                info!("saved route {} ({} points, {} stops)",
                    session.route().id,
                    session.shape_points().len(),
                    session.stop_bindings().len());
                if manual {
                    self.status.report(Status::success("Synced"));
                }
                Ok(())
            }
            Err(err) => {
                self.state = SaveState::Dirty;
                warn!("save failed for route {}: {err}", session.route().id);
                self.status
                    .report(Status::error(format!("Save failed: {err}")));
                Err(err)
            }
        }
    }

    async fn run_save(&self, session: &mut EditSession) -> Result<()> {
        // (a) route metadata upsert; a draft adopts the allocated id
        if session.route.id == 0 {
            let created = self.backend.create_route(&session.route).await?;
            debug!("route created with id {}", created.id);
            session.route.id = created.id;
        } else {
            self.backend.update_route(&session.route).await?;
        }

        // (b) full shape replace under the derived shape id
        let shape_id = session.route.shape_id();
        session.renumber_points();
        self.backend
            .put_shape(&shape_id, session.shape_points())
            .await?;

        // (c) exactly one trip binds the route to its shape
        let trips = self.backend.trips().await?;
        if !trips.iter().any(|t| t.route_id == session.route.id) {
            self.backend
                .create_trip(&Trip {
                    id: 0,
                    route_id: session.route.id,
                    shape_id,
                    headsign: session.route.long_name.clone(),
                })
                .await?;
        }

        // (d) stop-binding order
        session.restamp_bindings();
        self.backend
            .put_route_stops(session.route.id, session.stop_bindings())
            .await?;

        Ok(())
    }
}
