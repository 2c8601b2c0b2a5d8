//! Incremental batch ingestion.
//!
//! Mobile clients upload fixes in batches. Each batch continues the session
//! from its last stored point: the first candidate is validated against that
//! point, and per-point deltas and sequence numbers carry on from it.

use serde::{Deserialize, Serialize};

use crate::geo_utils::distance_between;
use crate::validation::{check_fix, Rejection};
use crate::{GpsFix, TrackingConfig};

/// A fix that has been accepted into a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedPoint {
    #[serde(flatten)]
    pub fix: GpsFix,
    /// 1-based position in the session, strictly increasing
    pub sequence_number: u32,
    /// 0 for the first point of a session
    pub distance_from_previous_meters: f64,
    /// 0 for the first point of a session
    pub time_from_previous_seconds: f64,
}

/// The last accepted point of a session, used to continue ingestion.
#[derive(Debug, Clone, PartialEq)]
pub struct LastFix {
    pub fix: GpsFix,
    pub sequence_number: u32,
}

impl From<&TrackedPoint> for LastFix {
    fn from(point: &TrackedPoint) -> Self {
        Self {
            fix: point.fix.clone(),
            sequence_number: point.sequence_number,
        }
    }
}

/// A dropped fix and the index it had in the uploaded batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectedFix {
    pub index: usize,
    #[serde(flatten)]
    pub reason: Rejection,
}

/// Result of ingesting one batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestOutcome {
    /// Accepted points in upload order, ready to persist
    pub accepted: Vec<TrackedPoint>,
    pub rejected: Vec<RejectedFix>,
}

impl IngestOutcome {
    /// The point the next batch should continue from.
    pub fn last(&self) -> Option<LastFix> {
        self.accepted.last().map(LastFix::from)
    }
}

/// Ingest an ordered batch of fixes after `last`.
///
/// Every candidate is checked against the most recent *accepted* fix. Sequence
/// numbers start at 1 for a fresh session and grow by one per accepted point,
/// so rejected fixes leave no gaps.
///
/// # Example
/// ```
/// use chrono::{Duration, TimeZone, Utc};
/// use fittrack::{ingest_batch, GpsFix, TrackingConfig};
///
/// let t = Utc.with_ymd_and_hms(2024, 5, 1, 7, 0, 0).unwrap();
/// let fixes = vec![
///     GpsFix::new(45.0, 7.0, t),
///     GpsFix::new(45.0, 7.0, t + Duration::milliseconds(300)), // too soon
///     GpsFix::new(45.0005, 7.0, t + Duration::seconds(10)),
/// ];
/// let outcome = ingest_batch(None, &fixes, &TrackingConfig::default());
/// assert_eq!(outcome.accepted.len(), 2);
/// assert_eq!(outcome.accepted[1].sequence_number, 2);
/// assert_eq!(outcome.rejected[0].index, 1);
/// ```
pub fn ingest_batch(
    last: Option<&LastFix>,
    fixes: &[GpsFix],
    config: &TrackingConfig,
) -> IngestOutcome {
    let mut outcome = IngestOutcome {
        accepted: Vec::with_capacity(fixes.len()),
        rejected: Vec::new(),
    };

    let mut previous: Option<GpsFix> = last.map(|l| l.fix.clone());
    let mut next_sequence = last.map_or(1, |l| l.sequence_number + 1);

    for (index, fix) in fixes.iter().enumerate() {
        if let Err(reason) = check_fix(fix, previous.as_ref(), config) {
            log::debug!("[Ingest] Dropping fix {}: {}", index, reason);
            outcome.rejected.push(RejectedFix { index, reason });
            continue;
        }

        let (distance, elapsed) = match previous.as_ref() {
            Some(prev) => (distance_between(prev, fix), fix.seconds_since(prev)),
            None => (0.0, 0.0),
        };

        outcome.accepted.push(TrackedPoint {
            fix: fix.clone(),
            sequence_number: next_sequence,
            distance_from_previous_meters: distance,
            time_from_previous_seconds: elapsed,
        });

        next_sequence += 1;
        previous = Some(fix.clone());
    }

    if !outcome.rejected.is_empty() {
        log::info!(
            "[Ingest] Accepted {}/{} fixes ({} rejected)",
            outcome.accepted.len(),
            fixes.len(),
            outcome.rejected.len()
        );
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 7, 0, 0).unwrap()
    }

    /// Jogging north at roughly 11 km/h, one fix every 10 s.
    fn jog(count: usize, start_secs: i64) -> Vec<GpsFix> {
        (0..count)
            .map(|i| {
                GpsFix::new(
                    45.0 + (start_secs as f64 / 10.0 + i as f64) * 0.0003,
                    7.0,
                    t0() + Duration::seconds(start_secs + i as i64 * 10),
                )
            })
            .collect()
    }

    #[test]
    fn test_fresh_session_starts_at_one_with_zero_deltas() {
        let outcome = ingest_batch(None, &jog(5, 0), &TrackingConfig::default());
        assert_eq!(outcome.accepted.len(), 5);
        assert!(outcome.rejected.is_empty());

        let first = &outcome.accepted[0];
        assert_eq!(first.sequence_number, 1);
        assert_eq!(first.distance_from_previous_meters, 0.0);
        assert_eq!(first.time_from_previous_seconds, 0.0);

        let seqs: Vec<u32> = outcome.accepted.iter().map(|p| p.sequence_number).collect();
        assert_eq!(seqs, vec![1, 2, 3, 4, 5]);

        for p in &outcome.accepted[1..] {
            assert_eq!(p.time_from_previous_seconds, 10.0);
            assert!((p.distance_from_previous_meters - 33.4).abs() < 0.5);
        }
    }

    #[test]
    fn test_continues_from_last_fix() {
        let config = TrackingConfig::default();
        let first = ingest_batch(None, &jog(3, 0), &config);
        let last = first.last().unwrap();
        assert_eq!(last.sequence_number, 3);

        let second = ingest_batch(Some(&last), &jog(3, 30), &config);
        assert_eq!(second.accepted.len(), 3);
        assert_eq!(second.accepted[0].sequence_number, 4);
        assert_eq!(second.accepted[0].time_from_previous_seconds, 10.0);
        assert!(second.accepted[0].distance_from_previous_meters > 0.0);
    }

    #[test]
    fn test_outlier_is_not_used_as_reference() {
        let mut fixes = jog(4, 0);
        // GPS jump ~11 km away between the 2nd and 3rd fix
        fixes.insert(2, GpsFix::new(45.1, 7.0, t0() + Duration::seconds(15)));

        let outcome = ingest_batch(None, &fixes, &TrackingConfig::default());
        assert_eq!(outcome.accepted.len(), 4);
        assert_eq!(outcome.rejected.len(), 1);
        assert_eq!(outcome.rejected[0].index, 2);
        assert!(matches!(outcome.rejected[0].reason, Rejection::TooFast { .. }));

        // The point after the jump is measured from the last accepted fix
        let after = &outcome.accepted[2];
        assert_eq!(after.sequence_number, 3);
        assert_eq!(after.time_from_previous_seconds, 10.0);
        assert!(after.distance_from_previous_meters < 100.0);
    }

    #[test]
    fn test_first_candidate_checked_against_previous_batch() {
        let config = TrackingConfig::default();
        let first = ingest_batch(None, &jog(2, 0), &config);
        let last = first.last().unwrap();

        // Same timestamp as the stored last point: duplicate upload
        let dup = vec![last.fix.clone()];
        let outcome = ingest_batch(Some(&last), &dup, &config);
        assert!(outcome.accepted.is_empty());
        assert!(matches!(outcome.rejected[0].reason, Rejection::TooSoon { .. }));
        assert!(outcome.last().is_none());
    }

    #[test]
    fn test_invalid_coordinates_dropped() {
        let mut fixes = jog(3, 0);
        fixes[1].latitude = 91.0;
        let outcome = ingest_batch(None, &fixes, &TrackingConfig::default());
        assert_eq!(outcome.accepted.len(), 2);
        assert_eq!(outcome.rejected[0].reason, Rejection::InvalidLatitude);
        assert_eq!(outcome.accepted[1].time_from_previous_seconds, 20.0);
    }
}
