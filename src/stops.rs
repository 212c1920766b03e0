//! Stop-sequence geometry and renumbering.
//!
//! The command surface for stop bindings lives on the engine; this module
//! holds the pure pieces: contiguous resequencing and the snap-to-path
//! projection. The projection never calls the routing provider.

use crate::{geo_utils, LatLng, RouteStop, ShapePoint};

/// Renumber bindings to a contiguous `1..=N`.
pub(crate) fn resequence(bindings: &mut [RouteStop]) {
    for (i, binding) in bindings.iter_mut().enumerate() {
        binding.sequence = (i + 1) as u32;
    }
}

/// Move each bound stop's displayed coordinates onto the closest point of
/// the shape polyline. Purely geometric; only the denormalized embedded
/// stop is touched, never the parent stop record.
///
/// Returns `false` (leaving everything unchanged) when there are fewer than
/// 2 shape points or no bindings. Idempotent for an unchanged shape: a
/// point already on the path projects onto itself.
pub fn snap_stops_to_path(bindings: &mut [RouteStop], shape: &[ShapePoint]) -> bool {
    if shape.len() < 2 || bindings.is_empty() {
        return false;
    }

    let path: Vec<LatLng> = shape.iter().map(|p| p.latlng()).collect();

    for binding in bindings.iter_mut() {
        let Some(stop) = binding.stop.as_mut() else {
            continue;
        };
        if let Some(snapped) = geo_utils::closest_on_path(&path, stop.latlng()) {
            stop.lat = snapped.lat;
            stop.lon = snapped.lon;
        }
    }

    true
}
