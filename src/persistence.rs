//! # Session Tracker
//!
//! SQLite-backed owner of GPS sessions, their points and the barcode product
//! cache.
//!
//! ## Tables
//!
//! - **sessions**: one row per session, including the last stored metrics
//! - **points**: accepted fixes keyed by `(session_id, sequence_number)`
//! - **barcode_products**: scanned products with a scan counter
//!
//! Timestamps are stored as epoch milliseconds.

use std::str::FromStr;
use std::sync::Mutex;
use std::time::Instant;

use chrono::{DateTime, Utc};
use log::{info, warn};
use once_cell::sync::Lazy;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geo_utils::simplify_track;
use crate::{
    aggregate, aggregate_many, ingest_batch, validate_batch, ActivityType, BarcodeProduct,
    BatchReceipt, GpsFix, GpsSession, HealthReport, LastFix, OptionExt, ProductSource, Result,
    SessionCreate, SessionMetrics, SessionStatus, SessionUpdate, TrackedPoint, TrackerError,
    TrackingConfig, TrackingHints,
};

const DEFAULT_LIST_LIMIT: u32 = 20;
const MAX_LIST_LIMIT: u32 = 100;
const MAX_POPULAR_LIMIT: u32 = 100;

const SESSION_COLUMNS: &str = "id, user_id, activity_type, cardio_session_id, start_time, \
     end_time, status, device_info, tracking_accuracy, total_distance_meters, duration_seconds, \
     average_speed_kmh, max_speed_kmh, elevation_gain_meters, pace_per_km_seconds, point_count";

const POINT_COLUMNS: &str = "sequence_number, latitude, longitude, recorded_at, altitude_meters, \
     accuracy_meters, speed_mps, bearing_degrees, battery_level, signal_strength, \
     distance_from_previous_meters, time_from_previous_seconds";

// ============================================================================
// Tracker
// ============================================================================

/// Session tracker with SQLite storage.
pub struct Tracker {
    db: Connection,
    db_path: String,
    config: TrackingConfig,
}

impl Tracker {
    // ========================================================================
    // Initialization
    // ========================================================================

    /// Open (or create) a tracker database at `db_path`.
    pub fn new(db_path: &str) -> Result<Self> {
        let db = Connection::open(db_path)?;
        Self::init_schema(&db)?;

        Ok(Self {
            db,
            db_path: db_path.to_string(),
            config: TrackingConfig::default(),
        })
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> Result<Self> {
        Self::new(":memory:")
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                activity_type TEXT NOT NULL,
                cardio_session_id TEXT,
                start_time INTEGER NOT NULL,
                end_time INTEGER,
                status TEXT NOT NULL,
                device_info TEXT NOT NULL DEFAULT '{}',
                tracking_accuracy TEXT NOT NULL,
                total_distance_meters REAL NOT NULL DEFAULT 0,
                duration_seconds INTEGER NOT NULL DEFAULT 0,
                average_speed_kmh REAL NOT NULL DEFAULT 0,
                max_speed_kmh REAL NOT NULL DEFAULT 0,
                elevation_gain_meters REAL NOT NULL DEFAULT 0,
                pace_per_km_seconds INTEGER,
                point_count INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS points (
                session_id TEXT NOT NULL,
                sequence_number INTEGER NOT NULL,
                latitude REAL NOT NULL,
                longitude REAL NOT NULL,
                recorded_at INTEGER NOT NULL,
                altitude_meters REAL,
                accuracy_meters REAL,
                speed_mps REAL,
                bearing_degrees REAL,
                battery_level INTEGER,
                signal_strength INTEGER,
                distance_from_previous_meters REAL NOT NULL,
                time_from_previous_seconds REAL NOT NULL,
                PRIMARY KEY (session_id, sequence_number),
                FOREIGN KEY (session_id) REFERENCES sessions(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS barcode_products (
                barcode TEXT PRIMARY KEY,
                product_name TEXT NOT NULL,
                category TEXT,
                data_source TEXT NOT NULL,
                quality_score INTEGER NOT NULL,
                data TEXT NOT NULL,
                scan_count INTEGER NOT NULL DEFAULT 1,
                created_by TEXT,
                last_scanned_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id, start_time);
            CREATE INDEX IF NOT EXISTS idx_sessions_status ON sessions(status);
            CREATE INDEX IF NOT EXISTS idx_products_scans ON barcode_products(scan_count);
        "#,
        )?;
        Ok(())
    }

    /// Path the database was opened from.
    pub fn db_path(&self) -> &str {
        &self.db_path
    }

    // ========================================================================
    // Configuration
    // ========================================================================

    /// Replace the filtering thresholds used for subsequent uploads.
    pub fn set_tracking_config(&mut self, config: TrackingConfig) {
        info!(
            "[Tracker] Tracking config: max {} km/h, min {} s, batch {}",
            config.max_speed_kmh, config.min_time_delta_secs, config.max_batch_points
        );
        self.config = config;
    }

    pub fn tracking_config(&self) -> &TrackingConfig {
        &self.config
    }

    // ========================================================================
    // Session Lifecycle
    // ========================================================================

    /// Start a new active session for `user_id`.
    pub fn create_session(
        &self,
        user_id: &str,
        request: SessionCreate,
    ) -> Result<(GpsSession, TrackingHints)> {
        if user_id.trim().is_empty() {
            return Err(TrackerError::invalid_input("user_id", "must not be empty"));
        }
        if !request.device_info.is_object() {
            return Err(TrackerError::invalid_input(
                "device_info",
                "must be a JSON object",
            ));
        }

        let session = GpsSession {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            activity_type: request.activity_type,
            cardio_session_id: request.cardio_session_id,
            start_time: from_millis(Utc::now().timestamp_millis()),
            end_time: None,
            status: SessionStatus::Active,
            device_info: request.device_info,
            tracking_accuracy: request.tracking_accuracy,
            metrics: SessionMetrics::default(),
        };

        self.db.execute(
            "INSERT INTO sessions (id, user_id, activity_type, cardio_session_id, start_time,
                                   status, device_info, tracking_accuracy)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                &session.id,
                &session.user_id,
                session.activity_type.as_str(),
                &session.cardio_session_id,
                session.start_time.timestamp_millis(),
                session.status.as_str(),
                serde_json::to_string(&session.device_info)?,
                session.tracking_accuracy.as_str(),
            ],
        )?;

        info!(
            "[Tracker] Started {} session {} for user {}",
            session.activity_type, session.id, user_id
        );

        Ok((session, TrackingHints::default()))
    }

    /// Get a session owned by `user_id`.
    ///
    /// Sessions of other users are reported as not found.
    pub fn get_session(&self, user_id: &str, session_id: &str) -> Result<GpsSession> {
        self.fetch_session(session_id)?
            .filter(|s| s.user_id == user_id)
            .ok_or_session_not_found(session_id)
    }

    /// List the user's sessions, newest first.
    ///
    /// `limit` defaults to 20 and is capped at 100.
    pub fn list_sessions(
        &self,
        user_id: &str,
        limit: Option<u32>,
        activity_type: Option<ActivityType>,
    ) -> Result<Vec<GpsSession>> {
        let limit = limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT);

        let mut stmt = self.db.prepare(&format!(
            "SELECT {} FROM sessions
             WHERE user_id = ?1 AND (?2 IS NULL OR activity_type = ?2)
             ORDER BY start_time DESC, rowid DESC
             LIMIT ?3",
            SESSION_COLUMNS
        ))?;

        let sessions = stmt
            .query_map(
                params![user_id, activity_type.map(|a| a.as_str()), limit],
                session_from_row,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(sessions)
    }

    /// Ingest a batch of fixes into an open session.
    ///
    /// The batch is validated as a whole first; then each fix is filtered
    /// against the last accepted one. Accepted points and the refreshed
    /// session metrics are written in one transaction.
    pub fn upload_batch(
        &mut self,
        user_id: &str,
        session_id: &str,
        fixes: &[GpsFix],
    ) -> Result<BatchReceipt> {
        let session = self.owned_session(user_id, session_id)?;
        if session.status.is_closed() {
            return Err(TrackerError::SessionClosed {
                session_id: session_id.to_string(),
                status: session.status.to_string(),
            });
        }
        validate_batch(fixes, &self.config)?;

        let last = self.last_point(session_id)?;
        let outcome = ingest_batch(last.as_ref(), fixes, &self.config);

        let tx = self.db.transaction()?;
        {
            let mut stmt = tx.prepare(&format!(
                "INSERT INTO points (session_id, {})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                POINT_COLUMNS
            ))?;
            for point in &outcome.accepted {
                let fix = &point.fix;
                stmt.execute(params![
                    session_id,
                    point.sequence_number,
                    fix.latitude,
                    fix.longitude,
                    fix.recorded_at.timestamp_millis(),
                    fix.altitude_meters,
                    fix.accuracy_meters,
                    fix.speed_mps,
                    fix.bearing_degrees,
                    fix.battery_level,
                    fix.signal_strength,
                    point.distance_from_previous_meters,
                    point.time_from_previous_seconds,
                ])?;
            }
        }
        let metrics = aggregate(&load_points(&tx, session_id)?);
        store_metrics(&tx, session_id, &metrics)?;
        tx.commit()?;

        let last_sequence_number = outcome
            .last()
            .or(last)
            .map(|l| l.sequence_number);

        info!(
            "[Tracker] Session {}: stored {}/{} fixes, {:.0} m total",
            session_id,
            outcome.accepted.len(),
            fixes.len(),
            metrics.total_distance_meters
        );

        Ok(BatchReceipt {
            session_id: session_id.to_string(),
            points_count: fixes.len() as u32,
            accepted: outcome.accepted.len() as u32,
            rejected: outcome.rejected.len() as u32,
            last_sequence_number,
        })
    }

    /// Pause, resume, complete or cancel a session.
    ///
    /// Completing stores the final metrics. Closing a session without an
    /// explicit `end_time` stamps it with the current time.
    pub fn update_session(
        &mut self,
        user_id: &str,
        session_id: &str,
        update: SessionUpdate,
    ) -> Result<GpsSession> {
        let session = self.owned_session(user_id, session_id)?;

        if !session.status.can_transition_to(update.status) {
            return Err(TrackerError::InvalidTransition {
                session_id: session_id.to_string(),
                from: session.status.to_string(),
                to: update.status.to_string(),
            });
        }
        if update.status == session.status {
            return Ok(session);
        }

        let end_time = match (update.status.is_closed(), update.end_time) {
            (true, Some(end)) if end < session.start_time => {
                return Err(TrackerError::invalid_input(
                    "end_time",
                    "must not be before the session start",
                ));
            }
            (true, end) => Some(end.unwrap_or_else(Utc::now)),
            (false, None) => session.end_time,
            (false, Some(_)) => {
                return Err(TrackerError::invalid_input(
                    "end_time",
                    "only allowed when completing or cancelling",
                ));
            }
        };

        let tx = self.db.transaction()?;
        if update.status == SessionStatus::Completed {
            let metrics = aggregate(&load_points(&tx, session_id)?);
            store_metrics(&tx, session_id, &metrics)?;
            info!(
                "[Tracker] Completed session {}: {:.0} m in {} s",
                session_id, metrics.total_distance_meters, metrics.duration_seconds
            );
        }
        tx.execute(
            "UPDATE sessions SET status = ?2, end_time = ?3 WHERE id = ?1",
            params![
                session_id,
                update.status.as_str(),
                end_time.map(|t| t.timestamp_millis())
            ],
        )?;
        tx.commit()?;

        info!(
            "[Tracker] Session {}: {} -> {}",
            session_id, session.status, update.status
        );

        self.get_session(user_id, session_id)
    }

    /// Current metrics of a session.
    ///
    /// Active sessions are aggregated from their points on every call; other
    /// sessions return their stored metrics with the live point count.
    pub fn session_stats(&self, user_id: &str, session_id: &str) -> Result<SessionMetrics> {
        let session = self.get_session(user_id, session_id)?;

        if session.status == SessionStatus::Active {
            return Ok(aggregate(&load_points(&self.db, session_id)?));
        }

        let mut metrics = session.metrics;
        metrics.point_count = self.db.query_row(
            "SELECT COUNT(*) FROM points WHERE session_id = ?",
            params![session_id],
            |row| row.get(0),
        )?;
        Ok(metrics)
    }

    /// All stored points of a session in sequence order.
    pub fn session_points(&self, user_id: &str, session_id: &str) -> Result<Vec<TrackedPoint>> {
        self.get_session(user_id, session_id)?;
        load_points(&self.db, session_id)
    }

    /// Simplified `[lat, lng]` polyline of a session for map previews.
    pub fn session_track(
        &self,
        user_id: &str,
        session_id: &str,
        tolerance_degrees: f64,
    ) -> Result<Vec<[f64; 2]>> {
        let fixes: Vec<GpsFix> = self
            .session_points(user_id, session_id)?
            .into_iter()
            .map(|p| p.fix)
            .collect();
        Ok(simplify_track(&fixes, tolerance_degrees))
    }

    /// Delete a session and its points.
    pub fn delete_session(&mut self, user_id: &str, session_id: &str) -> Result<()> {
        self.owned_session(user_id, session_id)?;

        let tx = self.db.transaction()?;
        let points = tx.execute("DELETE FROM points WHERE session_id = ?", params![session_id])?;
        tx.execute("DELETE FROM sessions WHERE id = ?", params![session_id])?;
        tx.commit()?;

        info!("[Tracker] Deleted session {} ({} points)", session_id, points);
        Ok(())
    }

    /// Re-aggregate and store the metrics of every session.
    ///
    /// Returns the number of sessions updated.
    pub fn recompute_all_metrics(&mut self) -> Result<u32> {
        let ids: Vec<String> = {
            let mut stmt = self.db.prepare("SELECT id FROM sessions")?;
            let ids = stmt
                .query_map([], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            ids
        };

        let tracks = ids
            .iter()
            .map(|id| load_points(&self.db, id))
            .collect::<Result<Vec<_>>>()?;
        let all_metrics = aggregate_many(&tracks);

        let tx = self.db.transaction()?;
        for (id, metrics) in ids.iter().zip(&all_metrics) {
            store_metrics(&tx, id, metrics)?;
        }
        tx.commit()?;

        info!("[Tracker] Recomputed metrics for {} sessions", ids.len());
        Ok(ids.len() as u32)
    }

    // ========================================================================
    // Session Lookups
    // ========================================================================

    fn fetch_session(&self, session_id: &str) -> Result<Option<GpsSession>> {
        let session = self
            .db
            .query_row(
                &format!("SELECT {} FROM sessions WHERE id = ?", SESSION_COLUMNS),
                params![session_id],
                session_from_row,
            )
            .optional()?;
        Ok(session)
    }

    /// Session lookup for mutations: another user's session is forbidden.
    fn owned_session(&self, user_id: &str, session_id: &str) -> Result<GpsSession> {
        let session = self
            .fetch_session(session_id)?
            .ok_or_session_not_found(session_id)?;

        if session.user_id != user_id {
            warn!(
                "[Tracker] User {} tried to modify session {} owned by another user",
                user_id, session_id
            );
            return Err(TrackerError::Forbidden {
                session_id: session_id.to_string(),
                user_id: user_id.to_string(),
            });
        }
        Ok(session)
    }

    fn last_point(&self, session_id: &str) -> Result<Option<LastFix>> {
        let point = self
            .db
            .query_row(
                &format!(
                    "SELECT {} FROM points WHERE session_id = ?
                     ORDER BY sequence_number DESC LIMIT 1",
                    POINT_COLUMNS
                ),
                params![session_id],
                point_from_row,
            )
            .optional()?;
        Ok(point.as_ref().map(LastFix::from))
    }

    // ========================================================================
    // Barcode Product Cache
    // ========================================================================

    /// Look up a cached product.
    pub fn cached_product(&self, barcode: &str) -> Result<Option<BarcodeProduct>> {
        let data: Option<String> = self
            .db
            .query_row(
                "SELECT data FROM barcode_products WHERE barcode = ?",
                params![barcode],
                |row| row.get(0),
            )
            .optional()?;
        Ok(data.map(|d| serde_json::from_str(&d)).transpose()?)
    }

    /// Insert a product, or refresh it and bump its scan count if present.
    pub fn cache_product(&self, product: &BarcodeProduct) -> Result<()> {
        product.validate()?;

        self.db.execute(
            "INSERT INTO barcode_products (barcode, product_name, category, data_source,
                                           quality_score, data, scan_count, last_scanned_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, ?7)
             ON CONFLICT(barcode) DO UPDATE SET
                product_name = excluded.product_name,
                category = excluded.category,
                data_source = excluded.data_source,
                quality_score = excluded.quality_score,
                data = excluded.data,
                scan_count = scan_count + 1,
                last_scanned_at = excluded.last_scanned_at",
            params![
                &product.barcode,
                &product.product_name,
                &product.category,
                product.data_source.as_str(),
                product.quality_score,
                serde_json::to_string(product)?,
                Utc::now().timestamp_millis(),
            ],
        )?;
        Ok(())
    }

    /// Most scanned products, optionally restricted to one category.
    pub fn popular_products(
        &self,
        limit: u32,
        category: Option<&str>,
    ) -> Result<Vec<BarcodeProduct>> {
        let mut stmt = self.db.prepare(
            "SELECT data FROM barcode_products
             WHERE ?1 IS NULL OR category = ?1
             ORDER BY scan_count DESC, quality_score DESC, barcode
             LIMIT ?2",
        )?;

        let rows = stmt
            .query_map(params![category, limit.min(MAX_POPULAR_LIMIT)], |row| {
                row.get::<_, String>(0)
            })?
            .collect::<rusqlite::Result<Vec<String>>>()?;

        rows.iter()
            .map(|data| Ok(serde_json::from_str(data)?))
            .collect()
    }

    /// Register a product entered by a user.
    ///
    /// The source is forced to `manual`. Barcodes that are already known are
    /// rejected.
    pub fn add_manual_product(
        &self,
        user_id: &str,
        mut product: BarcodeProduct,
    ) -> Result<BarcodeProduct> {
        product.data_source = ProductSource::Manual;
        product.validate()?;

        if self.cached_product(&product.barcode)?.is_some() {
            return Err(TrackerError::invalid_input(
                "barcode",
                format!("product {} already exists", product.barcode),
            ));
        }

        self.db.execute(
            "INSERT INTO barcode_products (barcode, product_name, category, data_source,
                                           quality_score, data, scan_count, created_by,
                                           last_scanned_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, ?7, ?8)",
            params![
                &product.barcode,
                &product.product_name,
                &product.category,
                product.data_source.as_str(),
                product.quality_score,
                serde_json::to_string(&product)?,
                user_id,
                Utc::now().timestamp_millis(),
            ],
        )?;

        info!(
            "[Tracker] User {} added product {} ({})",
            user_id, product.barcode, product.product_name
        );
        Ok(product)
    }

    // ========================================================================
    // Health & Statistics
    // ========================================================================

    /// Probe the database and build a health report.
    pub fn health(&self) -> HealthReport {
        let started = Instant::now();
        let database_ok = self
            .db
            .query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .is_ok();
        if !database_ok {
            warn!("[Tracker] Database health probe failed");
        }
        HealthReport::new(database_ok, started.elapsed().as_millis() as u64)
    }

    /// Row counts across the tracker tables.
    pub fn stats(&self) -> Result<TrackerStats> {
        let count =
            |sql: &str| -> Result<u32> { Ok(self.db.query_row(sql, [], |row| row.get(0))?) };

        Ok(TrackerStats {
            session_count: count("SELECT COUNT(*) FROM sessions")?,
            active_session_count: count(
                "SELECT COUNT(*) FROM sessions WHERE status IN ('active', 'paused')",
            )?,
            point_count: count("SELECT COUNT(*) FROM points")?,
            product_count: count("SELECT COUNT(*) FROM barcode_products")?,
        })
    }
}

/// Statistics for the tracker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct TrackerStats {
    pub session_count: u32,
    /// Sessions that are active or paused
    pub active_session_count: u32,
    pub point_count: u32,
    pub product_count: u32,
}

// ============================================================================
// Row Mapping
// ============================================================================

fn from_millis(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_default()
}

fn conversion_error<E>(idx: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn parse_column<T>(row: &Row, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = TrackerError>,
{
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e| conversion_error(idx, e))
}

fn session_from_row(row: &Row) -> rusqlite::Result<GpsSession> {
    let device_info: String = row.get(7)?;

    Ok(GpsSession {
        id: row.get(0)?,
        user_id: row.get(1)?,
        activity_type: parse_column(row, 2)?,
        cardio_session_id: row.get(3)?,
        start_time: from_millis(row.get(4)?),
        end_time: row.get::<_, Option<i64>>(5)?.map(from_millis),
        status: parse_column(row, 6)?,
        device_info: serde_json::from_str(&device_info).map_err(|e| conversion_error(7, e))?,
        tracking_accuracy: parse_column(row, 8)?,
        metrics: SessionMetrics {
            total_distance_meters: row.get(9)?,
            duration_seconds: row.get(10)?,
            average_speed_kmh: row.get(11)?,
            max_speed_kmh: row.get(12)?,
            elevation_gain_meters: row.get(13)?,
            pace_per_km_seconds: row.get(14)?,
            point_count: row.get(15)?,
        },
    })
}

fn point_from_row(row: &Row) -> rusqlite::Result<TrackedPoint> {
    Ok(TrackedPoint {
        sequence_number: row.get(0)?,
        fix: GpsFix {
            latitude: row.get(1)?,
            longitude: row.get(2)?,
            recorded_at: from_millis(row.get(3)?),
            altitude_meters: row.get(4)?,
            accuracy_meters: row.get(5)?,
            speed_mps: row.get(6)?,
            bearing_degrees: row.get(7)?,
            battery_level: row.get(8)?,
            signal_strength: row.get(9)?,
        },
        distance_from_previous_meters: row.get(10)?,
        time_from_previous_seconds: row.get(11)?,
    })
}

fn load_points(conn: &Connection, session_id: &str) -> Result<Vec<TrackedPoint>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM points WHERE session_id = ? ORDER BY sequence_number",
        POINT_COLUMNS
    ))?;
    let points = stmt
        .query_map(params![session_id], point_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(points)
}

fn store_metrics(conn: &Connection, session_id: &str, metrics: &SessionMetrics) -> Result<()> {
    conn.execute(
        "UPDATE sessions SET
            total_distance_meters = ?2,
            duration_seconds = ?3,
            average_speed_kmh = ?4,
            max_speed_kmh = ?5,
            elevation_gain_meters = ?6,
            pace_per_km_seconds = ?7,
            point_count = ?8
         WHERE id = ?1",
        params![
            session_id,
            metrics.total_distance_meters,
            metrics.duration_seconds,
            metrics.average_speed_kmh,
            metrics.max_speed_kmh,
            metrics.elevation_gain_meters,
            metrics.pace_per_km_seconds,
            metrics.point_count,
        ],
    )?;
    Ok(())
}

// ============================================================================
// Global Singleton for FFI
// ============================================================================

/// Global tracker instance.
///
/// Lets FFI calls share one tracker without passing state across the
/// boundary.
pub static TRACKER: Lazy<Mutex<Option<Tracker>>> = Lazy::new(|| Mutex::new(None));

/// Run `f` against the global tracker.
///
/// Fails with [`TrackerError::NotInitialized`] before `tracker_init`, and
/// with [`TrackerError::LockPoisoned`] after a panic inside an earlier call.
pub fn with_tracker<F, R>(f: F) -> Result<R>
where
    F: FnOnce(&mut Tracker) -> R,
{
    run_locked(&TRACKER, f)
}

fn run_locked<F, R>(lock: &Mutex<Option<Tracker>>, f: F) -> Result<R>
where
    F: FnOnce(&mut Tracker) -> R,
{
    let mut guard = lock.lock().map_err(|_| {
        warn!("[Tracker] Tracker lock poisoned by an earlier panic");
        TrackerError::LockPoisoned
    })?;
    guard.as_mut().map(f).ok_or(TrackerError::NotInitialized)
}

// ============================================================================
// FFI Exports for the Tracker
// ============================================================================

#[cfg(feature = "ffi")]
pub mod tracker_ffi {
    use super::*;
    use crate::ffi::json_response;

    #[derive(Serialize)]
    struct CreatedSession {
        session: GpsSession,
        tracking_config: TrackingHints,
    }

    /// Open the tracker database. Call once at app startup.
    #[uniffi::export]
    pub fn tracker_init(db_path: String) -> bool {
        crate::init_logging();
        info!("[Tracker] Initializing with db: {}", db_path);

        match Tracker::new(&db_path) {
            Ok(tracker) => {
                let Ok(mut guard) = TRACKER.lock() else {
                    warn!("[Tracker] Tracker lock poisoned");
                    return false;
                };
                *guard = Some(tracker);
                info!("[Tracker] Initialized successfully");
                true
            }
            Err(e) => {
                warn!("[Tracker] Failed to initialize: {}", e);
                false
            }
        }
    }

    #[uniffi::export]
    pub fn tracker_is_initialized() -> bool {
        TRACKER.lock().map(|guard| guard.is_some()).unwrap_or(false)
    }

    /// Start a session. `request_json` is a `SessionCreate` object.
    #[uniffi::export]
    pub fn tracker_create_session_json(user_id: String, request_json: String) -> String {
        json_response((|| -> Result<_> {
            let request: SessionCreate = serde_json::from_str(&request_json)?;
            let (session, tracking_config) =
                with_tracker(|t| t.create_session(&user_id, request))??;
            Ok(CreatedSession {
                session,
                tracking_config,
            })
        })())
    }

    /// Upload fixes. `points_json` is an array of fixes.
    #[uniffi::export]
    pub fn tracker_upload_batch_json(
        user_id: String,
        session_id: String,
        points_json: String,
    ) -> String {
        json_response((|| -> Result<_> {
            let fixes: Vec<GpsFix> = serde_json::from_str(&points_json)?;
            with_tracker(|t| t.upload_batch(&user_id, &session_id, &fixes))?
        })())
    }

    /// Change a session's status. `update_json` is a `SessionUpdate` object.
    #[uniffi::export]
    pub fn tracker_update_session_json(
        user_id: String,
        session_id: String,
        update_json: String,
    ) -> String {
        json_response((|| -> Result<_> {
            let update: SessionUpdate = serde_json::from_str(&update_json)?;
            with_tracker(|t| t.update_session(&user_id, &session_id, update))?
        })())
    }

    #[uniffi::export]
    pub fn tracker_session_stats_json(user_id: String, session_id: String) -> String {
        json_response(with_tracker(|t| t.session_stats(&user_id, &session_id)).and_then(|r| r))
    }

    #[uniffi::export]
    pub fn tracker_list_sessions_json(
        user_id: String,
        limit: Option<u32>,
        activity_type: Option<String>,
    ) -> String {
        json_response((|| -> Result<_> {
            let activity_type = activity_type
                .as_deref()
                .map(ActivityType::from_str)
                .transpose()?;
            with_tracker(|t| t.list_sessions(&user_id, limit, activity_type))?
        })())
    }

    /// Simplified session polyline as flat `[lat, lng, lat, lng, ...]`.
    #[uniffi::export]
    pub fn tracker_session_track(
        user_id: String,
        session_id: String,
        tolerance_degrees: f64,
    ) -> Vec<f64> {
        with_tracker(|t| t.session_track(&user_id, &session_id, tolerance_degrees))
            .and_then(|r| r)
            .map(|track| track.into_iter().flatten().collect())
            .unwrap_or_default()
    }

    #[uniffi::export]
    pub fn tracker_health_json() -> String {
        json_response(with_tracker(|t| t.health()))
    }

    #[uniffi::export]
    pub fn tracker_get_stats() -> Option<TrackerStats> {
        with_tracker(|t| t.stats()).and_then(|r| r).ok()
    }
}

// ============================================================================
// Tests
// ============================================================================
