//! Session lifecycle types.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Result, SessionMetrics, TrackerError};

/// Kind of activity being tracked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityType {
    #[default]
    Running,
    Walking,
    Cycling,
    Hiking,
    Other,
}

/// Requested GPS accuracy mode on the device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackingAccuracy {
    #[default]
    High,
    Medium,
    Low,
}

/// Lifecycle status of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Paused,
    Completed,
    Cancelled,
}

macro_rules! string_enum {
    ($ty:ident, $field:literal, { $($variant:ident => $name:literal),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($ty::$variant => $name,)+
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = TrackerError;

            fn from_str(s: &str) -> Result<Self> {
                match s {
                    $($name => Ok($ty::$variant),)+
                    other => Err(TrackerError::invalid_input(
                        $field,
                        format!("unknown value '{}'", other),
                    )),
                }
            }
        }
    };
}

string_enum!(ActivityType, "activity_type", {
    Running => "running",
    Walking => "walking",
    Cycling => "cycling",
    Hiking => "hiking",
    Other => "other",
});

string_enum!(TrackingAccuracy, "tracking_accuracy", {
    High => "high",
    Medium => "medium",
    Low => "low",
});

string_enum!(SessionStatus, "status", {
    Active => "active",
    Paused => "paused",
    Completed => "completed",
    Cancelled => "cancelled",
});

impl SessionStatus {
    /// Completed and cancelled sessions are frozen.
    pub fn is_closed(&self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Cancelled)
    }

    /// Whether a session may move from `self` to `next`.
    ///
    /// active <-> paused, either of them -> completed/cancelled. Re-applying
    /// the current status is allowed for open sessions.
    pub fn can_transition_to(&self, next: SessionStatus) -> bool {
        use SessionStatus::*;
        match (self, next) {
            (Active | Paused, _) => true,
            (Completed | Cancelled, _) => false,
        }
    }
}

/// A GPS tracking session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GpsSession {
    pub id: String,
    pub user_id: String,
    pub activity_type: ActivityType,
    pub cardio_session_id: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub status: SessionStatus,
    /// Free-form device description sent by the client
    pub device_info: serde_json::Value,
    pub tracking_accuracy: TrackingAccuracy,
    /// Last stored metrics (refreshed after every upload and on completion)
    pub metrics: SessionMetrics,
}

/// Request body for starting a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionCreate {
    #[serde(default)]
    pub activity_type: ActivityType,
    #[serde(default)]
    pub cardio_session_id: Option<String>,
    #[serde(default)]
    pub tracking_accuracy: TrackingAccuracy,
    #[serde(default = "empty_object")]
    pub device_info: serde_json::Value,
}

impl Default for SessionCreate {
    fn default() -> Self {
        Self {
            activity_type: ActivityType::default(),
            cardio_session_id: None,
            tracking_accuracy: TrackingAccuracy::default(),
            device_info: empty_object(),
        }
    }
}

fn empty_object() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

/// Request body for pausing, resuming or stopping a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionUpdate {
    pub status: SessionStatus,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
}

/// Upload cadence suggested to the client when a session starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingHints {
    pub update_interval_seconds: u32,
    pub batch_size: u32,
    pub accuracy_threshold_meters: f64,
}

impl Default for TrackingHints {
    fn default() -> Self {
        Self {
            update_interval_seconds: 5,
            batch_size: 50,
            accuracy_threshold_meters: 10.0,
        }
    }
}

/// Acknowledgement of an uploaded batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReceipt {
    pub session_id: String,
    /// Fixes received in the batch
    pub points_count: u32,
    pub accepted: u32,
    pub rejected: u32,
    /// Sequence number of the session's latest point after this batch
    pub last_sequence_number: Option<u32>,
}
