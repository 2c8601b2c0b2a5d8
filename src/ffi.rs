//! FFI bindings for mobile platforms (iOS/Android).
//!
//! UniFFI exports for Kotlin and Swift. Structured values cross the boundary
//! as JSON strings; failures come back as `{"error": ..., "status": ...}`
//! with the HTTP status of the underlying [`TrackerError`]. The stateful
//! tracker exports live in [`crate::persistence::tracker_ffi`].

use log::{debug, info};
use serde::Serialize;
use serde_json::json;

use crate::{
    aggregate, haversine_distance, ingest_batch, init_logging, is_point_valid, GpsFix,
    MobileAppConfig, Platform, Result, TrackingConfig,
};

/// Serialize a result for the mobile side.
pub(crate) fn json_response<T: Serialize>(result: Result<T>) -> String {
    let value = match result {
        Ok(value) => serde_json::to_value(value).map_err(Into::into),
        Err(e) => Err(e),
    };

    match value {
        Ok(value) => value.to_string(),
        Err(e) => {
            debug!("[FittrackRust] Returning error to caller: {}", e);
            json!({ "error": e.to_string(), "status": e.http_status() }).to_string()
        }
    }
}

// ============================================================================
// Pure Functions
// ============================================================================

/// Great-circle distance in meters.
#[uniffi::export]
pub fn ffi_haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    haversine_distance(lat1, lon1, lat2, lon2)
}

/// Check a fix (JSON) against the previous accepted fix (JSON, optional).
///
/// Malformed JSON counts as invalid.
#[uniffi::export]
pub fn ffi_is_point_valid_json(point_json: String, previous_json: Option<String>) -> bool {
    let Ok(point) = serde_json::from_str::<GpsFix>(&point_json) else {
        return false;
    };
    let previous = match previous_json {
        Some(json) => match serde_json::from_str::<GpsFix>(&json) {
            Ok(fix) => Some(fix),
            Err(_) => return false,
        },
        None => None,
    };
    is_point_valid(&point, previous.as_ref())
}

/// Filter and aggregate a recorded track on the device.
///
/// `fixes_json` is an array of fixes in recording order. Returns the
/// session metrics as JSON.
#[uniffi::export]
pub fn ffi_aggregate_metrics_json(fixes_json: String) -> String {
    init_logging();
    json_response((|| -> Result<_> {
        let fixes: Vec<GpsFix> = serde_json::from_str(&fixes_json)?;
        let outcome = ingest_batch(None, &fixes, &TrackingConfig::default());
        let metrics = aggregate(&outcome.accepted);
        info!(
            "[FittrackRust] Aggregated {}/{} fixes: {:.0} m",
            outcome.accepted.len(),
            fixes.len(),
            metrics.total_distance_meters
        );
        Ok(metrics)
    })())
}

/// GPS and upload settings for `"ios"` or `"android"`.
#[uniffi::export]
pub fn tracker_mobile_config_json(platform: String) -> String {
    json_response(
        platform
            .parse::<Platform>()
            .map(MobileAppConfig::for_platform),
    )
}
