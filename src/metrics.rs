//! Session metrics aggregation.
//!
//! Reduces the ordered point stream of a session into totals. Works on the
//! persisted [`TrackedPoint`]s, so distances are the per-point deltas that
//! were computed at ingestion time rather than re-derived here.

use serde::{Deserialize, Serialize};

use crate::geo_utils::{speed_kmh, MPS_TO_KMH};
use crate::TrackedPoint;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Aggregated metrics for a session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionMetrics {
    pub total_distance_meters: f64,
    /// Whole seconds between the first and last point
    pub duration_seconds: u32,
    /// Rounded to 2 decimals
    pub average_speed_kmh: f64,
    /// Rounded to 2 decimals
    pub max_speed_kmh: f64,
    /// Sum of positive altitude changes between consecutive points
    pub elevation_gain_meters: f64,
    /// Seconds per kilometer, `None` when the session has not moved
    pub pace_per_km_seconds: Option<u32>,
    pub point_count: u32,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Aggregate the ordered points of one session.
///
/// Max speed uses the device-reported speed when a point has one and falls
/// back to the speed implied by the point's own distance/time delta.
pub fn aggregate(points: &[TrackedPoint]) -> SessionMetrics {
    let (Some(first), Some(last)) = (points.first(), points.last()) else {
        return SessionMetrics::default();
    };

    let total_distance: f64 = points.iter().map(|p| p.distance_from_previous_meters).sum();

    let elapsed = last.fix.seconds_since(&first.fix).max(0.0);
    let duration_seconds = elapsed as u32;

    let average_speed = if elapsed > 0.0 {
        total_distance / elapsed * MPS_TO_KMH
    } else {
        0.0
    };

    let max_speed = points
        .iter()
        .map(|p| match p.fix.speed_mps {
            Some(mps) => mps * MPS_TO_KMH,
            None => speed_kmh(p.distance_from_previous_meters, p.time_from_previous_seconds),
        })
        .fold(0.0_f64, f64::max);

    let elevation_gain: f64 = points
        .windows(2)
        .filter_map(|w| match (w[0].fix.altitude_meters, w[1].fix.altitude_meters) {
            (Some(a), Some(b)) if b > a => Some(b - a),
            _ => None,
        })
        .sum();

    // Pace is derived from the rounded speed
    let average_speed = round2(average_speed);
    let pace = if average_speed > 0.0 {
        Some((3600.0 / average_speed) as u32)
    } else {
        None
    };

    SessionMetrics {
        total_distance_meters: total_distance,
        duration_seconds,
        average_speed_kmh: average_speed,
        max_speed_kmh: round2(max_speed),
        elevation_gain_meters: elevation_gain,
        pace_per_km_seconds: pace,
        point_count: points.len() as u32,
    }
}

/// Aggregate several sessions, preserving input order.
#[cfg(not(feature = "parallel"))]
pub fn aggregate_many(sessions: &[Vec<TrackedPoint>]) -> Vec<SessionMetrics> {
    sessions.iter().map(|points| aggregate(points)).collect()
}

/// Aggregate several sessions in parallel, preserving input order.
#[cfg(feature = "parallel")]
pub fn aggregate_many(sessions: &[Vec<TrackedPoint>]) -> Vec<SessionMetrics> {
    sessions.par_iter().map(|points| aggregate(points)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ingest_batch, GpsFix, TrackingConfig};
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 7, 0, 0).unwrap()
    }

    fn point(seq: u32, secs: i64, distance: f64, dt: f64) -> TrackedPoint {
        TrackedPoint {
            fix: GpsFix::new(45.0, 7.0, t0() + Duration::seconds(secs)),
            sequence_number: seq,
            distance_from_previous_meters: distance,
            time_from_previous_seconds: dt,
        }
    }

    #[test]
    fn test_empty_stream() {
        let m = aggregate(&[]);
        assert_eq!(m, SessionMetrics::default());
        assert_eq!(m.pace_per_km_seconds, None);
    }

    #[test]
    fn test_single_point() {
        let m = aggregate(&[point(1, 0, 0.0, 0.0)]);
        assert_eq!(m.point_count, 1);
        assert_eq!(m.duration_seconds, 0);
        assert_eq!(m.average_speed_kmh, 0.0);
        assert_eq!(m.pace_per_km_seconds, None);
    }

    #[test]
    fn test_five_minute_kilometer() {
        // 1000 m in 300 s: 12 km/h, 300 s/km
        let points = vec![
            point(1, 0, 0.0, 0.0),
            point(2, 100, 300.0, 100.0),
            point(3, 200, 400.0, 100.0),
            point(4, 300, 300.0, 100.0),
        ];
        let m = aggregate(&points);
        assert_eq!(m.total_distance_meters, 1000.0);
        assert_eq!(m.duration_seconds, 300);
        assert_eq!(m.average_speed_kmh, 12.0);
        assert_eq!(m.pace_per_km_seconds, Some(300));
        // Derived: 400 m / 100 s = 14.4 km/h
        assert_eq!(m.max_speed_kmh, 14.4);
        assert_eq!(m.point_count, 4);
    }

    #[test]
    fn test_pace_uses_rounded_speed() {
        // 1000.3 m in 300 s is 12.0036 km/h, shown as 12.0
        let points = vec![point(1, 0, 0.0, 0.0), point(2, 300, 1000.3, 300.0)];
        let m = aggregate(&points);
        assert_eq!(m.average_speed_kmh, 12.0);
        assert_eq!(m.pace_per_km_seconds, Some(300));
    }

    #[test]
    fn test_device_speed_preferred_for_max() {
        let mut points = vec![point(1, 0, 0.0, 0.0), point(2, 10, 30.0, 10.0)];
        points[1].fix.speed_mps = Some(5.0);
        let m = aggregate(&points);
        assert_eq!(m.max_speed_kmh, 18.0);
    }

    #[test]
    fn test_elevation_gain() {
        let mut points = vec![
            point(1, 0, 0.0, 0.0),
            point(2, 10, 10.0, 10.0),
            point(3, 20, 10.0, 10.0),
            point(4, 30, 10.0, 10.0),
            point(5, 40, 10.0, 10.0),
        ];
        points[0].fix.altitude_meters = Some(100.0);
        points[1].fix.altitude_meters = Some(105.0);
        points[2].fix.altitude_meters = Some(102.0);
        // points[3] has no altitude: pairs touching it are skipped
        points[4].fix.altitude_meters = Some(110.0);
        let m = aggregate(&points);
        assert_eq!(m.elevation_gain_meters, 5.0);
    }

    #[test]
    fn test_aggregate_after_ingest() {
        let fixes: Vec<GpsFix> = (0..31)
            .map(|i| GpsFix::new(45.0 + i as f64 * 0.0003, 7.0, t0() + Duration::seconds(i * 10)))
            .collect();
        let outcome = ingest_batch(None, &fixes, &TrackingConfig::default());
        let m = aggregate(&outcome.accepted);

        assert_eq!(m.point_count, 31);
        assert_eq!(m.duration_seconds, 300);
        // 30 segments of ~33.4 m
        assert!((m.total_distance_meters - 1000.8).abs() < 5.0);
        assert!((m.average_speed_kmh - 12.0).abs() < 0.1);
    }

    #[test]
    fn test_aggregate_many_preserves_order() {
        let sessions = vec![
            vec![point(1, 0, 0.0, 0.0), point(2, 100, 500.0, 100.0)],
            vec![],
            vec![point(1, 0, 0.0, 0.0), point(2, 50, 100.0, 50.0)],
        ];
        let all = aggregate_many(&sessions);
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].total_distance_meters, 500.0);
        assert_eq!(all[1].point_count, 0);
        assert_eq!(all[2].total_distance_meters, 100.0);
    }
}
