//! Geographic utilities: spherical-mercator projection and point-to-segment
//! projection over shape polylines.
//!
//! Segment distances are measured in projected (EPSG:3857-style) planar
//! space, matching the behavior of common web-map toolkits. This is an
//! approximation that stretches distances away from the equator; it is kept
//! deliberately so the editor projects stops exactly where the map UI
//! displays them.

use geo::{Closest, ClosestPoint, Coord, EuclideanDistance, Line, Point};

use crate::LatLng;

/// Spherical-mercator earth radius in meters (the web-map constant).
const EARTH_RADIUS_M: f64 = 6_378_137.0;

/// Mean earth radius in meters, for haversine distances.
const MEAN_RADIUS_M: f64 = 6_371_000.0;

/// Project a WGS84 coordinate into spherical-mercator planar space.
pub fn project(p: LatLng) -> Coord {
    let lat = p.lat.to_radians();
    Coord {
        x: EARTH_RADIUS_M * p.lon.to_radians(),
        y: EARTH_RADIUS_M * (std::f64::consts::FRAC_PI_4 + lat / 2.0).tan().ln(),
    }
}

/// Inverse of [`project`].
pub fn unproject(c: Coord) -> LatLng {
    let lat = 2.0 * (c.y / EARTH_RADIUS_M).exp().atan() - std::f64::consts::FRAC_PI_2;
    LatLng::new(lat.to_degrees(), (c.x / EARTH_RADIUS_M).to_degrees())
}

/// Great-circle distance between two coordinates in meters.
pub fn haversine_distance(a: LatLng, b: LatLng) -> f64 {
    let (lat1, lat2) = (a.lat.to_radians(), b.lat.to_radians());
    let dlat = (b.lat - a.lat).to_radians();
    let dlon = (b.lon - a.lon).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * MEAN_RADIUS_M * h.sqrt().asin()
}

/// Closest point on one projected segment to a projected target.
fn closest_on_segment(target: Point, a: Coord, b: Coord) -> Point {
    match Line::new(a, b).closest_point(&target) {
        Closest::Intersection(p) | Closest::SinglePoint(p) => p,
        // Degenerate zero-length segment
        Closest::Indeterminate => Point::from(a),
    }
}

/// Closest point on the polyline `path` to `target`.
///
/// Candidates are computed per segment in projected space; the winner is the
/// candidate with the smallest real-world (haversine) distance to the
/// target. Returns `None` when the path has fewer than 2 points.
pub fn closest_on_path(path: &[LatLng], target: LatLng) -> Option<LatLng> {
    if path.len() < 2 {
        return None;
    }

    let projected_target = Point::from(project(target));
    let mut best: Option<(f64, LatLng)> = None;

    for pair in path.windows(2) {
        let candidate = closest_on_segment(projected_target, project(pair[0]), project(pair[1]));
        let candidate = unproject(candidate.into());
        let dist = haversine_distance(target, candidate);
        if best.map_or(true, |(d, _)| dist < d) {
            best = Some((dist, candidate));
        }
    }

    best.map(|(_, p)| p)
}

/// Index at which a new vertex should be inserted for a click on the
/// polyline: the end index of the segment closest to the click, measured in
/// projected planar space. Returns `None` for paths shorter than 2 points.
pub fn nearest_segment_insert_index(path: &[LatLng], click: LatLng) -> Option<usize> {
    if path.len() < 2 {
        return None;
    }

    let target = Point::from(project(click));
    let mut best: Option<(f64, usize)> = None;

    for (i, pair) in path.windows(2).enumerate() {
        let segment = Line::new(project(pair[0]), project(pair[1]));
        let dist = target.euclidean_distance(&segment);
        if best.map_or(true, |(d, _)| dist < d) {
            best = Some((dist, i + 1));
        }
    }

    best.map(|(_, i)| i)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_roundtrip() {
        let p = LatLng::new(-7.393, 109.360);
        let back = unproject(project(p));
        assert!(p.approx_eq(&back, 1e-9));
    }

    #[test]
    fn test_haversine_known_distance() {
        // One degree of longitude at the equator is ~111.2 km
        let d = haversine_distance(LatLng::new(0.0, 0.0), LatLng::new(0.0, 1.0));
        assert!((d - 111_195.0).abs() < 100.0, "got {d}");
    }

    #[test]
    fn test_closest_on_path_projects_onto_segment() {
        let path = vec![LatLng::new(0.0, 0.0), LatLng::new(0.0, 1.0)];
        let snapped = closest_on_path(&path, LatLng::new(0.1, 0.5)).unwrap();
        assert!(snapped.lat.abs() < 1e-6);
        assert!((snapped.lon - 0.5).abs() < 1e-3);
    }

    #[test]
    fn test_closest_on_path_clamps_to_endpoints() {
        let path = vec![LatLng::new(0.0, 0.0), LatLng::new(0.0, 1.0)];
        let snapped = closest_on_path(&path, LatLng::new(0.0, 2.0)).unwrap();
        assert!(snapped.approx_eq(&LatLng::new(0.0, 1.0), 1e-6));
    }

    #[test]
    fn test_closest_on_path_short_input() {
        assert!(closest_on_path(&[], LatLng::new(0.0, 0.0)).is_none());
        assert!(closest_on_path(&[LatLng::new(1.0, 1.0)], LatLng::new(0.0, 0.0)).is_none());
    }

    #[test]
    fn test_nearest_segment_picks_closest() {
        // An L-shaped path: clicks near the second leg insert at index 2
        let path = vec![
            LatLng::new(0.0, 0.0),
            LatLng::new(0.0, 1.0),
            LatLng::new(1.0, 1.0),
        ];
        assert_eq!(
            nearest_segment_insert_index(&path, LatLng::new(0.01, 0.5)),
            Some(1)
        );
        assert_eq!(
            nearest_segment_insert_index(&path, LatLng::new(0.5, 1.01)),
            Some(2)
        );
    }

    #[test]
    fn test_nearest_segment_degenerate_path() {
        assert_eq!(
            nearest_segment_insert_index(&[LatLng::new(0.0, 0.0)], LatLng::new(0.0, 0.0)),
            None
        );
    }
}
