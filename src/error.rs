//! Unified error handling for route-studio operations.

use thiserror::Error;

/// Unified error type for editing, routing and persistence operations.
///
/// Routing and backend failures are distinct variants: routing failures are
/// non-fatal and fall back to raw-point behavior, while backend failures
/// leave the session dirty for retry.
#[derive(Debug, Error)]
pub enum StudioError {
    /// The routing provider could not be reached or answered with an error.
    #[error("routing request failed: {0}")]
    Routing(String),

    /// The routing provider answered but found no route.
    #[error("routing service returned no route through {waypoints} waypoints")]
    NoRoute { waypoints: usize },

    /// Fewer waypoints than the routing provider accepts.
    #[error("route requests need at least 2 waypoints, got {0}")]
    NotEnoughWaypoints(usize),

    /// The backend could not be reached.
    #[error("backend request failed: {0}")]
    Backend(String),

    /// The backend answered with a non-success status.
    #[error("backend returned HTTP {status}: {message}")]
    BackendStatus { status: u16, message: String },

    /// A point index outside the current shape.
    #[error("shape point index {index} out of bounds (shape has {len} points)")]
    IndexOutOfBounds { index: usize, len: usize },

    /// A stop binding index outside the current sequence.
    #[error("stop index {index} out of bounds (route has {len} stops)")]
    StopIndexOutOfBounds { index: usize, len: usize },

    /// The stop is already bound to the route.
    #[error("stop {stop_id} is already assigned to this route")]
    DuplicateStop { stop_id: u64 },

    /// A reorder request that is not a permutation of the bound stops.
    #[error("reorder list does not match the currently bound stops")]
    InvalidReorder,

    /// An operation that needs a selected route was issued without one.
    #[error("no route is selected")]
    NoActiveRoute,
}

/// Result type alias for route-studio operations.
pub type Result<T> = std::result::Result<T, StudioError>;
