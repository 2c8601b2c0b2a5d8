//! # Fittrack
//!
//! GPS session tracking for fitness apps: fix filtering, incremental batch
//! ingestion and activity metrics.
//!
//! This library provides:
//! - Great-circle (haversine) distance between GPS fixes
//! - Outlier filtering of fixes against the previous accepted fix
//! - Batch ingestion with per-point deltas and sequence numbers
//! - Session metrics (distance, duration, speed, pace, elevation gain)
//! - A SQLite-backed tracker owning sessions, points and a product cache
//!
//! ## Features
//!
//! - **`persistence`** (default) - SQLite storage and the [`Tracker`]
//! - **`parallel`** - Recompute metrics for many sessions with rayon
//! - **`http`** - Barcode product lookups (Open Food Facts, USDA)
//! - **`ffi`** - FFI bindings for mobile platforms (iOS/Android)
//! - **`full`** - Enable all features
//!
//! ## Quick Start
//!
//! ```rust
//! use chrono::{Duration, TimeZone, Utc};
//! use fittrack::{aggregate, ingest_batch, GpsFix, TrackingConfig};
//!
//! let start = Utc.with_ymd_and_hms(2024, 5, 1, 7, 0, 0).unwrap();
//! let fixes: Vec<GpsFix> = (0..10)
//!     .map(|i| GpsFix::new(48.8566 + i as f64 * 0.0001, 2.3522, start + Duration::seconds(5 * i)))
//!     .collect();
//!
//! let outcome = ingest_batch(None, &fixes, &TrackingConfig::default());
//! let metrics = aggregate(&outcome.accepted);
//! println!("{:.0} m in {} s", metrics.total_distance_meters, metrics.duration_seconds);
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// Unified error handling
pub mod error;
pub use error::{OptionExt, Result, TrackerError};

// Geographic utilities (haversine, speed, simplification)
pub mod geo_utils;
pub use geo_utils::{haversine_distance, speed_kmh};

// Fix validity filtering
pub mod validation;
pub use validation::{check_fix, is_point_valid, validate_batch, Rejection};

// Incremental batch ingestion
pub mod ingest;
pub use ingest::{ingest_batch, IngestOutcome, LastFix, RejectedFix, TrackedPoint};

// Session metrics aggregation
pub mod metrics;
pub use metrics::{aggregate, aggregate_many, SessionMetrics};

// Session lifecycle types
pub mod session;
pub use session::{
    ActivityType, BatchReceipt, GpsSession, SessionCreate, SessionStatus, SessionUpdate,
    TrackingAccuracy, TrackingHints,
};

// Mobile client configuration and health reporting
pub mod mobile;
pub use mobile::{HealthReport, MobileAppConfig, Platform};

// Barcode product models and remote payload parsing
pub mod barcode;
pub use barcode::{BarcodeProduct, BarcodeScanRequest, BarcodeSearchResponse, ProductSource};

// SQLite-backed tracker
#[cfg(feature = "persistence")]
pub mod persistence;
#[cfg(feature = "persistence")]
pub use persistence::{with_tracker, Tracker, TrackerStats, TRACKER};

// HTTP module for product lookups
#[cfg(feature = "http")]
pub mod http;
#[cfg(feature = "http")]
pub use http::{FetcherConfig, ProductFetcher};

// FFI bindings for mobile platforms (iOS/Android)
#[cfg(feature = "ffi")]
pub mod ffi;

#[cfg(feature = "ffi")]
uniffi::setup_scaffolding!();

/// Initialize logging for Android (only used in FFI)
#[cfg(all(feature = "ffi", target_os = "android"))]
pub(crate) fn init_logging() {
    use android_logger::Config;
    use log::LevelFilter;

    android_logger::init_once(
        Config::default()
            .with_max_level(LevelFilter::Debug)
            .with_tag("FittrackRust"),
    );
}

#[cfg(all(feature = "ffi", not(target_os = "android")))]
pub(crate) fn init_logging() {
    // No-op on non-Android platforms
}

// ============================================================================
// Core Types
// ============================================================================

/// A single GPS sample reported by a device.
///
/// # Example
/// ```
/// use chrono::Utc;
/// use fittrack::GpsFix;
/// let fix = GpsFix::new(51.5074, -0.1278, Utc::now()).with_altitude(11.0);
/// assert!(fix.has_valid_coordinates());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GpsFix {
    pub latitude: f64,
    pub longitude: f64,
    pub recorded_at: DateTime<Utc>,
    #[serde(default)]
    pub altitude_meters: Option<f64>,
    #[serde(default)]
    pub accuracy_meters: Option<f64>,
    /// Device-reported speed
    #[serde(default)]
    pub speed_mps: Option<f64>,
    /// Heading, 0-360
    #[serde(default)]
    pub bearing_degrees: Option<f64>,
    /// Battery percentage, 0-100
    #[serde(default)]
    pub battery_level: Option<u8>,
    /// Signal percentage, 0-100
    #[serde(default)]
    pub signal_strength: Option<u8>,
}

impl GpsFix {
    /// Create a fix with coordinates and timestamp only.
    pub fn new(latitude: f64, longitude: f64, recorded_at: DateTime<Utc>) -> Self {
        Self {
            latitude,
            longitude,
            recorded_at,
            altitude_meters: None,
            accuracy_meters: None,
            speed_mps: None,
            bearing_degrees: None,
            battery_level: None,
            signal_strength: None,
        }
    }

    pub fn with_altitude(mut self, altitude_meters: f64) -> Self {
        self.altitude_meters = Some(altitude_meters);
        self
    }

    pub fn with_speed(mut self, speed_mps: f64) -> Self {
        self.speed_mps = Some(speed_mps);
        self
    }

    pub fn with_accuracy(mut self, accuracy_meters: f64) -> Self {
        self.accuracy_meters = Some(accuracy_meters);
        self
    }

    /// Check that latitude is within [-90, 90] and longitude within [-180, 180].
    pub fn has_valid_coordinates(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }

    /// Seconds elapsed since `earlier` (negative if this fix is older).
    pub fn seconds_since(&self, earlier: &GpsFix) -> f64 {
        (self.recorded_at - earlier.recorded_at).num_milliseconds() as f64 / 1000.0
    }
}

/// Bounding box of a track.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl Bounds {
    /// Create bounds from fixes. Returns `None` for an empty track.
    pub fn from_fixes<'a, I>(fixes: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a GpsFix>,
    {
        let mut iter = fixes.into_iter();
        let first = iter.next()?;
        let init = Self {
            min_lat: first.latitude,
            max_lat: first.latitude,
            min_lng: first.longitude,
            max_lng: first.longitude,
        };

        Some(iter.fold(init, |b, p| Self {
            min_lat: b.min_lat.min(p.latitude),
            max_lat: b.max_lat.max(p.latitude),
            min_lng: b.min_lng.min(p.longitude),
            max_lng: b.max_lng.max(p.longitude),
        }))
    }
}

/// Thresholds applied when filtering and ingesting fixes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingConfig {
    /// Fixes implying a faster speed than this versus the previous accepted
    /// fix are dropped as GPS jumps.
    /// Default: 200.0 km/h
    pub max_speed_kmh: f64,

    /// Fixes closer in time than this to the previous accepted fix are dropped.
    /// Default: 1.0 second
    pub min_time_delta_secs: f64,

    /// Maximum number of fixes accepted in a single upload.
    /// Default: 1000
    pub max_batch_points: usize,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            max_speed_kmh: 200.0,
            min_time_delta_secs: 1.0,
            max_batch_points: 1000,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
