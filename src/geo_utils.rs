//! Geographic helpers: great-circle distance, speed conversion and track
//! simplification.

use geo::{algorithm::simplify::Simplify, Coord, LineString};

use crate::GpsFix;

/// Mean Earth radius in meters.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Meters per second to kilometers per hour.
pub const MPS_TO_KMH: f64 = 3.6;

/// Great-circle distance in meters between two lat/lon pairs (degrees).
///
/// Identical coordinates return exactly `0.0` without touching the trig
/// functions.
///
/// # Example
/// ```
/// use fittrack::geo_utils::haversine_distance;
/// let d = haversine_distance(48.8566, 2.3522, 51.5074, -0.1278);
/// assert!((d / 1000.0 - 344.0).abs() < 10.0);
/// ```
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    if lat1 == lat2 && lon1 == lon2 {
        return 0.0;
    }

    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let dlat = lat2_rad - lat1_rad;
    let dlon = (lon2 - lon1).to_radians();

    let a = (dlat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (dlon / 2.0).sin().powi(2);
    // Rounding can push `a` past 1 for near-antipodal pairs
    let c = 2.0 * a.sqrt().min(1.0).asin();

    EARTH_RADIUS_METERS * c
}

/// Haversine distance between two fixes.
pub fn distance_between(a: &GpsFix, b: &GpsFix) -> f64 {
    haversine_distance(a.latitude, a.longitude, b.latitude, b.longitude)
}

/// Speed in km/h for a distance covered in `seconds`. Zero when no time elapsed.
pub fn speed_kmh(distance_meters: f64, seconds: f64) -> f64 {
    if seconds <= 0.0 {
        return 0.0;
    }
    distance_meters / seconds * MPS_TO_KMH
}

/// Total length of a track in meters.
pub fn track_length(fixes: &[GpsFix]) -> f64 {
    fixes
        .windows(2)
        .map(|w| distance_between(&w[0], &w[1]))
        .sum()
}

/// Douglas-Peucker simplification of a track for map previews.
///
/// `tolerance` is in degrees (0.0001 is roughly 11 m). Returns `[lat, lng]`
/// pairs; tracks with fewer than 3 points are returned as-is.
pub fn simplify_track(fixes: &[GpsFix], tolerance: f64) -> Vec<[f64; 2]> {
    if fixes.len() < 3 {
        return fixes.iter().map(|f| [f.latitude, f.longitude]).collect();
    }

    let line: LineString<f64> = fixes
        .iter()
        .map(|f| Coord {
            x: f.longitude,
            y: f.latitude,
        })
        .collect::<Vec<_>>()
        .into();

    line.simplify(&tolerance)
        .coords()
        .map(|c| [c.y, c.x])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    const PARIS: (f64, f64) = (48.8566, 2.3522);
    const LONDON: (f64, f64) = (51.5074, -0.1278);

    #[test]
    fn test_paris_london() {
        let d = haversine_distance(PARIS.0, PARIS.1, LONDON.0, LONDON.1);
        assert!((d / 1000.0 - 344.0).abs() <= 10.0, "got {} km", d / 1000.0);
    }

    #[test]
    fn test_distance_is_symmetric() {
        let ab = haversine_distance(PARIS.0, PARIS.1, LONDON.0, LONDON.1);
        let ba = haversine_distance(LONDON.0, LONDON.1, PARIS.0, PARIS.1);
        assert!((ab - ba).abs() < 1e-6);
    }

    #[test]
    fn test_same_point_is_exactly_zero() {
        assert_eq!(haversine_distance(PARIS.0, PARIS.1, PARIS.0, PARIS.1), 0.0);
        assert_eq!(haversine_distance(-89.9999, 179.9999, -89.9999, 179.9999), 0.0);
    }

    #[test]
    fn test_small_distance() {
        // 0.001 degrees of latitude is about 111 m
        let d = haversine_distance(45.0, 7.0, 45.001, 7.0);
        assert!((d - 111.2).abs() < 0.5, "got {} m", d);
    }

    #[test]
    fn test_antipodal_pairs_are_finite() {
        let half_circumference = std::f64::consts::PI * EARTH_RADIUS_METERS;
        for (lat1, lon1, lat2, lon2) in [
            (-44.972, 0.0, 44.972, -180.0),
            (0.0, 0.0, 0.0, 180.0),
            (90.0, 0.0, -90.0, 0.0),
            (12.345, 67.89, -12.345, -112.11),
        ] {
            let d = haversine_distance(lat1, lon1, lat2, lon2);
            assert!(d.is_finite(), "NaN for ({}, {}) -> ({}, {})", lat1, lon1, lat2, lon2);
            assert!((d - half_circumference).abs() < 1000.0, "got {} m", d);
        }
    }

    #[test]
    fn test_speed_kmh() {
        assert!((speed_kmh(1000.0, 100.0) - 36.0).abs() < 1e-9);
        assert_eq!(speed_kmh(1000.0, 0.0), 0.0);
        assert_eq!(speed_kmh(1000.0, -3.0), 0.0);
    }

    #[test]
    fn test_track_length_and_simplify() {
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        // Straight line north: middle points are redundant
        let fixes: Vec<GpsFix> = (0..20)
            .map(|i| GpsFix::new(45.0 + i as f64 * 0.001, 7.0, t))
            .collect();

        let length = track_length(&fixes);
        let direct = distance_between(&fixes[0], &fixes[19]);
        assert!((length - direct).abs() < 1.0);

        let simplified = simplify_track(&fixes, 0.0001);
        assert_eq!(simplified.len(), 2);
        assert_eq!(simplified[0], [45.0, 7.0]);
    }
}
