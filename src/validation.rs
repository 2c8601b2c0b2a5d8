//! Fix validity filtering.
//!
//! A candidate fix is judged only against the previous *accepted* fix of the
//! session. There is no lookback window: a fix rejected here never becomes
//! the reference for the next one.

use serde::{Deserialize, Serialize};

use crate::geo_utils::{distance_between, speed_kmh};
use crate::{GpsFix, Result, TrackerError, TrackingConfig};

/// Why a fix was dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Rejection {
    /// Latitude outside [-90, 90] (or not a number)
    InvalidLatitude,
    /// Longitude outside [-180, 180] (or not a number)
    InvalidLongitude,
    /// Implied speed from the previous accepted fix is implausible
    TooFast { speed_kmh: f64 },
    /// Fix arrived too soon after (or before) the previous accepted fix
    TooSoon { elapsed_secs: f64 },
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Rejection::InvalidLatitude => write!(f, "latitude out of range"),
            Rejection::InvalidLongitude => write!(f, "longitude out of range"),
            Rejection::TooFast { speed_kmh } => write!(f, "implied speed {:.1} km/h", speed_kmh),
            Rejection::TooSoon { elapsed_secs } => {
                write!(f, "only {:.3}s after previous fix", elapsed_secs)
            }
        }
    }
}

/// Check a candidate fix against the previous accepted fix.
///
/// Rules, in order:
/// 1. latitude in [-90, 90], longitude in [-180, 180]
/// 2. with a previous fix and positive elapsed time: implied speed must not
///    exceed `config.max_speed_kmh`
/// 3. with a previous fix: elapsed time must be at least
///    `config.min_time_delta_secs` (so out-of-order fixes are rejected too)
pub fn check_fix(
    candidate: &GpsFix,
    previous: Option<&GpsFix>,
    config: &TrackingConfig,
) -> std::result::Result<(), Rejection> {
    if !(candidate.latitude.is_finite() && (-90.0..=90.0).contains(&candidate.latitude)) {
        return Err(Rejection::InvalidLatitude);
    }
    if !(candidate.longitude.is_finite() && (-180.0..=180.0).contains(&candidate.longitude)) {
        return Err(Rejection::InvalidLongitude);
    }

    let Some(previous) = previous else {
        return Ok(());
    };

    let elapsed = candidate.seconds_since(previous);

    if elapsed > 0.0 {
        let speed = speed_kmh(distance_between(previous, candidate), elapsed);
        if !speed.is_finite() || speed > config.max_speed_kmh {
            return Err(Rejection::TooFast { speed_kmh: speed });
        }
    }

    if elapsed < config.min_time_delta_secs {
        return Err(Rejection::TooSoon {
            elapsed_secs: elapsed,
        });
    }

    Ok(())
}

/// Check a fix with the default thresholds.
pub fn is_point_valid(candidate: &GpsFix, previous: Option<&GpsFix>) -> bool {
    check_fix(candidate, previous, &TrackingConfig::default()).is_ok()
}

/// Request-level validation of an uploaded batch.
///
/// Fails the whole batch when it is too large or when a fix carries
/// malformed metadata. Bad coordinates are left to [`check_fix`], which
/// drops those fixes individually during ingestion.
pub fn validate_batch(fixes: &[GpsFix], config: &TrackingConfig) -> Result<()> {
    if fixes.len() > config.max_batch_points {
        return Err(TrackerError::BatchTooLarge {
            count: fixes.len(),
            max: config.max_batch_points,
        });
    }

    for (index, fix) in fixes.iter().enumerate() {
        let invalid = |message: String| TrackerError::InvalidFix { index, message };

        if let Some(bearing) = fix.bearing_degrees {
            if !(0.0..=360.0).contains(&bearing) {
                return Err(invalid(format!("bearing {} outside 0-360", bearing)));
            }
        }
        if let Some(battery) = fix.battery_level {
            if battery > 100 {
                return Err(invalid(format!("battery level {} above 100", battery)));
            }
        }
        if let Some(signal) = fix.signal_strength {
            if signal > 100 {
                return Err(invalid(format!("signal strength {} above 100", signal)));
            }
        }
        if let Some(accuracy) = fix.accuracy_meters {
            if accuracy.is_nan() || accuracy < 0.0 {
                return Err(invalid(format!("accuracy {} must be non-negative", accuracy)));
            }
        }
        if let Some(speed) = fix.speed_mps {
            if !speed.is_finite() || speed < 0.0 {
                return Err(invalid(format!("speed {} is not a valid m/s value", speed)));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 7, 0, 0).unwrap()
    }

    fn fix_at(lat: f64, lng: f64, secs: f64) -> GpsFix {
        GpsFix::new(lat, lng, t0() + Duration::milliseconds((secs * 1000.0) as i64))
    }

    #[test]
    fn test_first_fix_accepted() {
        assert!(is_point_valid(&fix_at(48.8566, 2.3522, 0.0), None));
    }

    #[test]
    fn test_latitude_91_always_rejected() {
        let bad = fix_at(91.0, 2.0, 10.0);
        let prev = fix_at(48.0, 2.0, 0.0);
        assert_eq!(
            check_fix(&bad, None, &TrackingConfig::default()),
            Err(Rejection::InvalidLatitude)
        );
        assert_eq!(
            check_fix(&bad, Some(&prev), &TrackingConfig::default()),
            Err(Rejection::InvalidLatitude)
        );
    }

    #[test]
    fn test_longitude_out_of_range() {
        let bad = fix_at(10.0, 180.01, 0.0);
        assert_eq!(
            check_fix(&bad, None, &TrackingConfig::default()),
            Err(Rejection::InvalidLongitude)
        );
    }

    #[test]
    fn test_too_fast_rejected() {
        // ~1.1 km in 10 s is ~400 km/h
        let prev = fix_at(45.0, 7.0, 0.0);
        let jump = fix_at(45.01, 7.0, 10.0);
        match check_fix(&jump, Some(&prev), &TrackingConfig::default()) {
            Err(Rejection::TooFast { speed_kmh }) => assert!(speed_kmh > 200.0),
            other => panic!("expected TooFast, got {:?}", other),
        }
    }

    #[test]
    fn test_running_pace_accepted() {
        // ~111 m in 30 s is ~13 km/h
        let prev = fix_at(45.0, 7.0, 0.0);
        let next = fix_at(45.001, 7.0, 30.0);
        assert!(is_point_valid(&next, Some(&prev)));
    }

    #[test]
    fn test_under_one_second_rejected_regardless_of_distance() {
        let prev = fix_at(45.0, 7.0, 0.0);
        let same_place = fix_at(45.0, 7.0, 0.5);
        assert_eq!(
            check_fix(&same_place, Some(&prev), &TrackingConfig::default()),
            Err(Rejection::TooSoon { elapsed_secs: 0.5 })
        );

        let simultaneous = fix_at(45.0, 7.0, 0.0);
        assert!(!is_point_valid(&simultaneous, Some(&prev)));
    }

    #[test]
    fn test_out_of_order_rejected() {
        let prev = fix_at(45.0, 7.0, 10.0);
        let older = fix_at(45.0001, 7.0, 5.0);
        assert!(matches!(
            check_fix(&older, Some(&prev), &TrackingConfig::default()),
            Err(Rejection::TooSoon { .. })
        ));
    }

    #[test]
    fn test_exactly_one_second_accepted() {
        let prev = fix_at(45.0, 7.0, 0.0);
        let next = fix_at(45.00001, 7.0, 1.0);
        assert!(is_point_valid(&next, Some(&prev)));
    }

    #[test]
    fn test_antipodal_jump_rejected() {
        let prev = fix_at(-44.972, 0.0, 0.0);
        let jump = fix_at(44.972, -180.0, 10.0);
        match check_fix(&jump, Some(&prev), &TrackingConfig::default()) {
            Err(Rejection::TooFast { speed_kmh }) => assert!(speed_kmh > 1_000_000.0),
            other => panic!("expected TooFast, got {:?}", other),
        }
        assert!(!is_point_valid(&jump, Some(&prev)));
    }

    #[test]
    fn test_speed_threshold_boundary() {
        let prev = fix_at(45.0, 7.0, 0.0);
        let next = fix_at(45.001, 7.0, 10.0);
        let exact = speed_kmh(distance_between(&prev, &next), 10.0);

        let at_limit = TrackingConfig {
            max_speed_kmh: exact,
            ..TrackingConfig::default()
        };
        assert_eq!(check_fix(&next, Some(&prev), &at_limit), Ok(()));

        let just_below = TrackingConfig {
            max_speed_kmh: exact - 1e-6,
            ..TrackingConfig::default()
        };
        assert!(matches!(
            check_fix(&next, Some(&prev), &just_below),
            Err(Rejection::TooFast { .. })
        ));
    }

    #[test]
    fn test_custom_speed_threshold() {
        let config = TrackingConfig {
            max_speed_kmh: 10.0,
            ..TrackingConfig::default()
        };
        let prev = fix_at(45.0, 7.0, 0.0);
        let next = fix_at(45.001, 7.0, 30.0);
        assert!(matches!(
            check_fix(&next, Some(&prev), &config),
            Err(Rejection::TooFast { .. })
        ));
    }

    #[test]
    fn test_validate_batch_size() {
        let config = TrackingConfig::default();
        let fixes: Vec<GpsFix> = (0..1001).map(|i| fix_at(45.0, 7.0, i as f64)).collect();
        assert!(matches!(
            validate_batch(&fixes, &config),
            Err(TrackerError::BatchTooLarge {
                count: 1001,
                max: 1000
            })
        ));
        assert!(validate_batch(&fixes[..1000], &config).is_ok());
    }

    #[test]
    fn test_validate_batch_metadata() {
        let config = TrackingConfig::default();
        let mut bad = fix_at(45.0, 7.0, 1.0);
        bad.bearing_degrees = Some(361.0);
        let fixes = vec![fix_at(45.0, 7.0, 0.0), bad];
        assert!(matches!(
            validate_batch(&fixes, &config),
            Err(TrackerError::InvalidFix { index: 1, .. })
        ));

        let mut bad_battery = fix_at(45.0, 7.0, 0.0);
        bad_battery.battery_level = Some(150);
        assert!(validate_batch(&[bad_battery], &config).is_err());

        // Bad coordinates are not a batch-level error
        assert!(validate_batch(&[fix_at(95.0, 7.0, 0.0)], &config).is_ok());
    }
}
