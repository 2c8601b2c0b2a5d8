//! Mobile client configuration and service health.

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Result, TrackerError};

/// Mobile platform of the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Ios,
    Android,
}

impl FromStr for Platform {
    type Err = TrackerError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ios" => Ok(Platform::Ios),
            "android" => Ok(Platform::Android),
            other => Err(TrackerError::invalid_input(
                "platform",
                format!("expected 'ios' or 'android', got '{}'", other),
            )),
        }
    }
}

/// GPS and upload settings pushed to the mobile app.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MobileAppConfig {
    /// Seconds between GPS samples (1-60). Default: 5
    pub gps_update_interval_seconds: u32,
    /// Fixes with worse reported accuracy should be discarded on device (1-100).
    /// Default: 10.0 meters
    pub gps_accuracy_threshold_meters: f64,
    /// Fixes per upload (1-1000). Default: 50
    pub batch_upload_size: u32,
    /// Local buffer for offline tracking (10-1000). Default: 100 MB
    pub offline_storage_limit_mb: u32,
}

impl Default for MobileAppConfig {
    fn default() -> Self {
        Self {
            gps_update_interval_seconds: 5,
            gps_accuracy_threshold_meters: 10.0,
            batch_upload_size: 50,
            offline_storage_limit_mb: 100,
        }
    }
}

impl MobileAppConfig {
    /// Platform-tuned settings.
    ///
    /// iOS samples more often with tighter accuracy and smaller batches;
    /// Android keeps the battery-friendly defaults.
    pub fn for_platform(platform: Platform) -> Self {
        match platform {
            Platform::Ios => Self {
                gps_update_interval_seconds: 3,
                gps_accuracy_threshold_meters: 5.0,
                batch_upload_size: 25,
                ..Self::default()
            },
            Platform::Android => Self::default(),
        }
    }

    /// Check every field against its allowed range.
    pub fn validate(&self) -> Result<()> {
        if !(1..=60).contains(&self.gps_update_interval_seconds) {
            return Err(TrackerError::invalid_input(
                "gps_update_interval_seconds",
                "must be between 1 and 60",
            ));
        }
        if !(1.0..=100.0).contains(&self.gps_accuracy_threshold_meters) {
            return Err(TrackerError::invalid_input(
                "gps_accuracy_threshold_meters",
                "must be between 1 and 100",
            ));
        }
        if !(1..=1000).contains(&self.batch_upload_size) {
            return Err(TrackerError::invalid_input(
                "batch_upload_size",
                "must be between 1 and 1000",
            ));
        }
        if !(10..=1000).contains(&self.offline_storage_limit_mb) {
            return Err(TrackerError::invalid_input(
                "offline_storage_limit_mb",
                "must be between 10 and 1000",
            ));
        }
        Ok(())
    }
}

/// Status of a single backing service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Healthy,
    Degraded,
    Down,
}

/// Lightweight health report for mobile clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    /// `healthy` when the database answers, `degraded` otherwise
    pub status: ServiceStatus,
    pub services: BTreeMap<String, ServiceStatus>,
    pub response_time_ms: u64,
    pub timestamp: DateTime<Utc>,
}

impl HealthReport {
    /// Build a report from the database probe result.
    pub fn new(database_ok: bool, response_time_ms: u64) -> Self {
        let mut services = BTreeMap::new();
        services.insert(
            "database".to_string(),
            if database_ok {
                ServiceStatus::Healthy
            } else {
                ServiceStatus::Down
            },
        );
        services.insert("external_apis".to_string(), ServiceStatus::Healthy);
        services.insert("gps_tracking".to_string(), ServiceStatus::Healthy);
        services.insert("barcode_scanning".to_string(), ServiceStatus::Healthy);

        Self {
            status: if database_ok {
                ServiceStatus::Healthy
            } else {
                ServiceStatus::Degraded
            },
            services,
            response_time_ms,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_configs() {
        let ios = MobileAppConfig::for_platform(Platform::Ios);
        assert_eq!(ios.gps_update_interval_seconds, 3);
        assert_eq!(ios.gps_accuracy_threshold_meters, 5.0);
        assert_eq!(ios.batch_upload_size, 25);

        let android = MobileAppConfig::for_platform(Platform::Android);
        assert_eq!(android.gps_update_interval_seconds, 5);
        assert_eq!(android.gps_accuracy_threshold_meters, 10.0);
        assert_eq!(android.batch_upload_size, 50);

        assert!(ios.validate().is_ok());
        assert!(android.validate().is_ok());
    }

    #[test]
    fn test_platform_parse() {
        assert_eq!("ios".parse::<Platform>().unwrap(), Platform::Ios);
        assert!("windows".parse::<Platform>().is_err());
    }

    #[test]
    fn test_validate_ranges() {
        let config = MobileAppConfig {
            batch_upload_size: 0,
            ..MobileAppConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(TrackerError::InvalidInput { ref field, .. }) if field == "batch_upload_size"
        ));

        let config = MobileAppConfig {
            offline_storage_limit_mb: 5,
            ..MobileAppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_health_report() {
        let report = HealthReport::new(false, 3);
        assert_eq!(report.status, ServiceStatus::Degraded);
        assert_eq!(report.services["database"], ServiceStatus::Down);
        assert_eq!(report.services["gps_tracking"], ServiceStatus::Healthy);

        let json = serde_json::to_value(HealthReport::new(true, 1)).unwrap();
        assert_eq!(json["status"], "healthy");
    }
}
