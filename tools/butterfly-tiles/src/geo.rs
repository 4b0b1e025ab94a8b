use geo::{Bearing, Closest, ClosestPoint, Distance, Haversine, Line, Point};
use serde::{Deserialize, Serialize};

/// A point in WGS84 coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lon: f64,
    pub lat: f64,
}

impl GeoPoint {
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lon, lat }
    }

    fn as_point(self) -> Point<f64> {
        Point::new(self.lon, self.lat)
    }

    /// Coordinate-wise equality within `epsilon` degrees
    pub fn almost_eq(&self, other: &GeoPoint, epsilon: f64) -> bool {
        (self.lon - other.lon).abs() <= epsilon && (self.lat - other.lat).abs() <= epsilon
    }
}

impl From<[f64; 2]> for GeoPoint {
    /// `[lon, lat]`, the order used by the tile files and the R-tree
    fn from(c: [f64; 2]) -> Self {
        Self { lon: c[0], lat: c[1] }
    }
}

impl From<GeoPoint> for [f64; 2] {
    fn from(p: GeoPoint) -> Self {
        [p.lon, p.lat]
    }
}

/// Mean Earth radius of the haversine formulas, in meters
const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Widest planar span in degrees that `meters` can cover around `point`.
///
/// A degree of longitude shrinks with `cos(lat)`, so the span grows towards
/// the poles.
pub fn degree_span(point: GeoPoint, meters: f64) -> f64 {
    let meters_per_degree = EARTH_RADIUS_M.to_radians();
    let cos_lat = point.lat.to_radians().cos().abs().max(1e-6);
    meters / (meters_per_degree * cos_lat)
}

pub fn haversine_distance(a: GeoPoint, b: GeoPoint) -> f64 {
    Haversine::distance(a.as_point(), b.as_point())
}

/// Initial bearing from `a` to `b` in degrees, 0 = North, clockwise, in [0, 360)
pub fn bearing(a: GeoPoint, b: GeoPoint) -> f64 {
    Haversine::bearing(a.as_point(), b.as_point()).rem_euclid(360.0)
}

/// Wrap an angle difference to (-180, 180]
pub fn normalize_angle(mut delta: f64) -> f64 {
    delta = delta.rem_euclid(360.0);
    if delta > 180.0 {
        delta -= 360.0;
    }
    delta
}

/// Signed turn angle at `junction` when arriving from `from` and leaving to `to`.
///
/// 0 = continue straight, positive = right turn, negative = left turn.
pub fn turn_angle(from: GeoPoint, junction: GeoPoint, to: GeoPoint) -> f64 {
    let incoming = bearing(from, junction);
    let outgoing = bearing(junction, to);
    normalize_angle(outgoing - incoming)
}

/// Length of a polyline in meters
pub fn polyline_length(points: &[GeoPoint]) -> f64 {
    points
        .windows(2)
        .map(|w| haversine_distance(w[0], w[1]))
        .sum()
}

/// Closest point to `p` on the segment `a`-`b` (planar in lon/lat)
pub fn project_on_segment(p: GeoPoint, a: GeoPoint, b: GeoPoint) -> GeoPoint {
    let line = Line::new(a.as_point(), b.as_point());
    match line.closest_point(&p.as_point()) {
        Closest::Intersection(c) | Closest::SinglePoint(c) => GeoPoint {
            lon: c.x(),
            lat: c.y(),
        },
        // Degenerate segment
        Closest::Indeterminate => a,
    }
}

/// Nearest sub-segment of `points` to `p`.
///
/// Returns the index of the sub-segment's first point and the projected point.
pub fn nearest_subsegment(points: &[GeoPoint], p: GeoPoint) -> Option<(usize, GeoPoint)> {
    points
        .windows(2)
        .enumerate()
        .map(|(i, w)| {
            let projected = project_on_segment(p, w[0], w[1]);
            (i, projected, haversine_distance(p, projected))
        })
        .min_by(|a, b| a.2.total_cmp(&b.2))
        .map(|(i, projected, _)| (i, projected))
}
