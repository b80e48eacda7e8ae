//! # Geographic Utilities
//!
//! Geometry used by the search filter and the travel simulation.
//!
//! ## Overview
//!
//! | Function | Description |
//! |----------|-------------|
//! | [`haversine_distance`] | Great-circle distance in miles (radius 3959) |
//! | [`haversine_meters`] | Great-circle distance in meters between two locations |
//! | [`point_in_triangle`] | Area-sum containment test against a triangle |
//! | [`polyline_length`] | Total length of a route polyline in meters |
//! | [`interpolate_along`] | Position at a fraction of a polyline's length |
//! | [`compute_center`] | Centroid of a set of locations |
//! | [`meters_to_degrees`] | Convert meters to approximate degrees at a latitude |
//!
//! ## Example
//!
//! ```rust
//! use rendezvous_engine::{Location, geo_utils};
//!
//! let a = Location::new(40.7580, -73.9855);
//! let b = Location::new(40.7484, -73.9857);
//! let c = Location::new(40.7527, -73.9772);
//!
//! let inside = Location::new(40.7530, -73.9830);
//! assert!(geo_utils::point_in_triangle(&inside, &[a, b, c]));
//!
//! let miles = geo_utils::haversine_distance(a.latitude, a.longitude, b.latitude, b.longitude);
//! println!("a to b: {:.2} mi", miles);
//! ```
//!
//! ## Algorithm Notes
//!
//! ### Triangle containment
//!
//! A point lies inside a triangle exactly when the three sub-triangles it forms with the
//! edges cover the triangle without overlap, so their areas sum to the triangle's area.
//! Areas are computed on raw longitude/latitude degrees and compared with an absolute
//! tolerance of [`TRIANGLE_AREA_TOLERANCE`]. Collinear (zero-area) triangles are not
//! special-cased: every point on the supporting line will satisfy the check.
//!
//! ### Coordinate System
//!
//! All functions expect WGS84 coordinates (latitude/longitude in degrees).

use geo::{coord, Area, Distance, Haversine, Point, Triangle};
use crate::Location;

/// Earth radius used for mile distances.
pub const EARTH_RADIUS_MILES: f64 = 3959.0;

/// Absolute tolerance (in squared degrees) for the area-sum triangle test.
pub const TRIANGLE_AREA_TOLERANCE: f64 = 1e-4;

const METERS_PER_MILE: f64 = 1609.344;

// =============================================================================
// Distance Functions
// =============================================================================

/// Great-circle distance in miles between two coordinates.
///
/// Uses the haversine formula with an Earth radius of 3959 miles.
///
/// # Example
///
/// ```rust
/// use rendezvous_engine::geo_utils::haversine_distance;
///
/// let d = haversine_distance(51.5074, -0.1278, 48.8566, 2.3522);
/// assert!((d - 213.5).abs() < 2.0); // London to Paris
/// assert_eq!(haversine_distance(10.0, 20.0, 10.0, 20.0), 0.0);
/// ```
pub fn haversine_distance(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lng = (lng2 - lng1).to_radians();

    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lng / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_MILES * c
}

/// Calculate the great-circle distance between two locations in meters.
///
/// Backed by `geo`'s haversine implementation (mean Earth radius).
#[inline]
pub fn haversine_meters(p1: &Location, p2: &Location) -> f64 {
    let point1 = Point::new(p1.longitude, p1.latitude);
    let point2 = Point::new(p2.longitude, p2.latitude);
    Haversine::distance(point1, point2)
}

/// Convert meters to miles.
#[inline]
pub fn meters_to_miles(meters: f64) -> f64 {
    meters / METERS_PER_MILE
}

/// Convert meters to approximate degrees at a given latitude.
///
/// Returns a conservative (larger) value based on the longitude shrink at `latitude`,
/// suitable for square search envelopes.
#[inline]
pub fn meters_to_degrees(meters: f64, latitude: f64) -> f64 {
    let lat_rad = latitude.to_radians();
    let meters_per_degree = 111_320.0 * lat_rad.cos().max(0.1);
    meters / meters_per_degree
}

// =============================================================================
// Triangle Containment
// =============================================================================

fn triangle(a: &Location, b: &Location, c: &Location) -> Triangle<f64> {
    Triangle::new(
        coord! { x: a.longitude, y: a.latitude },
        coord! { x: b.longitude, y: b.latitude },
        coord! { x: c.longitude, y: c.latitude },
    )
}

/// Check whether `point` lies inside the triangle `[a, b, c]`.
///
/// Returns `true` iff the areas of the three sub-triangles formed by `point` with each
/// edge sum to the triangle's own area within [`TRIANGLE_AREA_TOLERANCE`]. Points on an
/// edge count as inside.
///
/// # Example
///
/// ```rust
/// use rendezvous_engine::{Location, geo_utils::point_in_triangle};
///
/// let tri = [
///     Location::new(0.0, 0.0),
///     Location::new(0.0, 1.0),
///     Location::new(1.0, 0.0),
/// ];
/// assert!(point_in_triangle(&Location::new(0.2, 0.2), &tri));
/// assert!(!point_in_triangle(&Location::new(0.9, 0.9), &tri));
/// ```
pub fn point_in_triangle(point: &Location, corners: &[Location; 3]) -> bool {
    let [a, b, c] = corners;

    let total = triangle(a, b, c).unsigned_area();
    let sub_areas = triangle(point, b, c).unsigned_area()
        + triangle(a, point, c).unsigned_area()
        + triangle(a, b, point).unsigned_area();

    (sub_areas - total).abs() < TRIANGLE_AREA_TOLERANCE
}

// =============================================================================
// Polyline Functions
// =============================================================================

/// Total length of a polyline in meters. Empty or single-point polylines return 0.0.
pub fn polyline_length(points: &[Location]) -> f64 {
    if points.len() < 2 {
        return 0.0;
    }

    points
        .windows(2)
        .map(|w| haversine_meters(&w[0], &w[1]))
        .sum()
}

/// Position at `fraction` of the polyline's travelled length.
///
/// `fraction` is clamped to `[0, 1]`; 0 returns the first vertex and 1 the last.
/// Interpolation is linear in degrees inside the segment that contains the target
/// distance. Returns `None` for an empty polyline.
///
/// # Example
///
/// ```rust
/// use rendezvous_engine::{Location, geo_utils::interpolate_along};
///
/// let route = vec![Location::new(51.50, -0.12), Location::new(51.52, -0.12)];
/// let mid = interpolate_along(&route, 0.5).unwrap();
/// assert!((mid.latitude - 51.51).abs() < 1e-6);
/// ```
pub fn interpolate_along(points: &[Location], fraction: f64) -> Option<Location> {
    let first = *points.first()?;
    let last = *points.last()?;

    let fraction = if fraction.is_nan() { 0.0 } else { fraction.clamp(0.0, 1.0) };
    if fraction <= 0.0 || points.len() == 1 {
        return Some(first);
    }
    if fraction >= 1.0 {
        return Some(last);
    }

    let total = polyline_length(points);
    if total == 0.0 {
        return Some(first);
    }

    let target = total * fraction;
    let mut accumulated = 0.0;

    for w in points.windows(2) {
        let seg = haversine_meters(&w[0], &w[1]);
        if seg > 0.0 && accumulated + seg >= target {
            let ratio = (target - accumulated) / seg;
            return Some(Location::new(
                w[0].latitude + ratio * (w[1].latitude - w[0].latitude),
                w[0].longitude + ratio * (w[1].longitude - w[0].longitude),
            ));
        }
        accumulated += seg;
    }

    Some(last)
}

// =============================================================================
// Center/Centroid Functions
// =============================================================================

/// Arithmetic mean of the given locations. Returns (0, 0) for empty input.
pub fn compute_center(points: &[Location]) -> Location {
    if points.is_empty() {
        return Location::new(0.0, 0.0);
    }

    let sum_lat: f64 = points.iter().map(|p| p.latitude).sum();
    let sum_lng: f64 = points.iter().map(|p| p.longitude).sum();
    let n = points.len() as f64;

    Location::new(sum_lat / n, sum_lng / n)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn approx_eq(a: f64, b: f64, epsilon: f64) -> bool {
        (a - b).abs() < epsilon
    }

    /// Triangles large enough that the 1e-4 tolerance is small relative to their area.
    fn random_triangle(rng: &mut StdRng) -> [Location; 3] {
        loop {
            let tri = [
                Location::new(rng.gen_range(-40.0..40.0), rng.gen_range(-100.0..100.0)),
                Location::new(rng.gen_range(-40.0..40.0), rng.gen_range(-100.0..100.0)),
                Location::new(rng.gen_range(-40.0..40.0), rng.gen_range(-100.0..100.0)),
            ];
            if triangle(&tri[0], &tri[1], &tri[2]).unsigned_area() > 10.0 {
                return tri;
            }
        }
    }

    fn barycentric(tri: &[Location; 3], u: f64, v: f64) -> Location {
        let w = 1.0 - u - v;
        Location::new(
            w * tri[0].latitude + u * tri[1].latitude + v * tri[2].latitude,
            w * tri[0].longitude + u * tri[1].longitude + v * tri[2].longitude,
        )
    }

    #[test]
    fn test_haversine_distance_same_point() {
        assert_eq!(haversine_distance(51.5074, -0.1278, 51.5074, -0.1278), 0.0);
    }

    #[test]
    fn test_haversine_distance_symmetric() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let (lat1, lng1) = (rng.gen_range(-89.0..89.0), rng.gen_range(-179.0..179.0));
            let (lat2, lng2) = (rng.gen_range(-89.0..89.0), rng.gen_range(-179.0..179.0));
            let ab = haversine_distance(lat1, lng1, lat2, lng2);
            let ba = haversine_distance(lat2, lng2, lat1, lng1);
            assert!(approx_eq(ab, ba, 1e-9), "{} vs {}", ab, ba);
        }
    }

    #[test]
    fn test_haversine_distance_known_value() {
        // New York to Los Angeles is roughly 2445 miles
        let d = haversine_distance(40.7128, -74.0060, 34.0522, -118.2437);
        assert!(approx_eq(d, 2445.0, 15.0), "got {}", d);
    }

    #[test]
    fn test_haversine_meters_agrees_with_miles() {
        let a = Location::new(51.5074, -0.1278);
        let b = Location::new(51.5200, -0.1000);
        let miles = haversine_distance(a.latitude, a.longitude, b.latitude, b.longitude);
        let meters = haversine_meters(&a, &b);
        // Different radii, same order of magnitude
        assert!(approx_eq(meters_to_miles(meters), miles, 0.01));
    }

    #[test]
    fn test_points_strictly_inside_random_triangles() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..500 {
            let tri = random_triangle(&mut rng);
            let u: f64 = rng.gen_range(0.05..0.9);
            let v = rng.gen_range(0.05..(0.95 - u).max(0.06));
            let p = barycentric(&tri, u, v);
            assert!(point_in_triangle(&p, &tri), "{:?} should be inside {:?}", p, tri);
        }
    }

    #[test]
    fn test_points_strictly_outside_random_triangles() {
        let mut rng = StdRng::seed_from_u64(1337);
        for _ in 0..500 {
            let tri = random_triangle(&mut rng);
            // Negative barycentric weight puts the point outside
            let u = rng.gen_range(-1.0..-0.1);
            let v = rng.gen_range(0.1..1.0);
            let p = barycentric(&tri, u, v);
            assert!(!point_in_triangle(&p, &tri), "{:?} should be outside {:?}", p, tri);
        }
    }

    #[test]
    fn test_triangle_vertex_counts_as_inside() {
        let tri = [
            Location::new(0.0, 0.0),
            Location::new(0.0, 1.0),
            Location::new(1.0, 0.0),
        ];
        assert!(point_in_triangle(&tri[1], &tri));
    }

    #[test]
    fn test_polyline_length_empty() {
        assert_eq!(polyline_length(&[]), 0.0);
        assert_eq!(polyline_length(&[Location::new(51.5, -0.12)]), 0.0);
    }

    #[test]
    fn test_polyline_length_two_points() {
        let track = vec![
            Location::new(51.5074, -0.1278),
            Location::new(51.5080, -0.1280),
        ];
        let length = polyline_length(&track);
        assert!(length > 0.0);
        assert!(length < 100.0); // about 68m
    }

    #[test]
    fn test_interpolate_along_endpoints_and_middle() {
        let route = vec![
            Location::new(51.50, -0.10),
            Location::new(51.51, -0.10),
            Location::new(51.52, -0.10),
        ];
        assert_eq!(interpolate_along(&route, 0.0), Some(route[0]));
        assert_eq!(interpolate_along(&route, 1.0), Some(route[2]));
        assert_eq!(interpolate_along(&route, 7.0), Some(route[2]));

        let quarter = interpolate_along(&route, 0.25).unwrap();
        assert!(approx_eq(quarter.latitude, 51.505, 1e-4));
        assert!(interpolate_along(&[], 0.5).is_none());
    }

    #[test]
    fn test_compute_center() {
        let pts = vec![Location::new(51.50, -0.10), Location::new(51.52, -0.12)];
        let center = compute_center(&pts);
        assert!(approx_eq(center.latitude, 51.51, 0.001));
        assert!(approx_eq(center.longitude, -0.11, 0.001));
        assert_eq!(compute_center(&[]), Location::new(0.0, 0.0));
    }

    #[test]
    fn test_meters_to_degrees() {
        let deg = meters_to_degrees(111_320.0, 0.0);
        assert!(approx_eq(deg, 1.0, 0.01));
        assert!(meters_to_degrees(111_320.0, 45.0) > 1.0);
    }
}
