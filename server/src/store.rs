//! SQLite-backed persistence store for alerts.
//!
//! All database access goes through [`tokio_rusqlite`], which runs every
//! statement on a dedicated connection thread so async callers never
//! block the runtime. The `alerts` table is append-only: the store
//! exposes insert and read operations, nothing else.
//!
//! Timestamps are stored as fixed-width RFC 3339 UTC strings with
//! microsecond precision, so lexicographic comparison in SQL equals
//! chronological comparison. UUIDs are stored as hyphenated strings and
//! the free-form payload as compact JSON text.

use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use crate::error::{Result, ServerError};
use crate::types::{Alert, AlertType};

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
const SCHEMA: &str = "
PRAGMA journal_mode = WAL;

-- Alerts are strictly append-only.
-- No UPDATE or DELETE is ever issued against this table.
CREATE TABLE IF NOT EXISTS alerts (
    id            TEXT PRIMARY KEY,
    device_id     TEXT NOT NULL,
    timestamp     TEXT NOT NULL,   -- RFC 3339 UTC, fixed microsecond width
    alert_type    TEXT NOT NULL,
    location_lat  REAL,
    location_lon  REAL,
    payload       TEXT             -- compact JSON, or NULL
);

CREATE INDEX IF NOT EXISTS alerts_timestamp_idx ON alerts(timestamp);
CREATE INDEX IF NOT EXISTS alerts_device_idx    ON alerts(device_id);
CREATE INDEX IF NOT EXISTS alerts_type_idx      ON alerts(alert_type);
";

/// Columns selected for full-row reads, in [`RawAlert`] order.
const ALERT_COLUMNS: &str =
    "id, device_id, timestamp, alert_type, location_lat, location_lon, payload";

/// Encode a timestamp for storage and SQL comparison.
pub(crate) fn encode_ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Decode a stored timestamp.
fn decode_ts(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| ServerError::internal(format!("corrupt timestamp column '{s}': {e}")))
}

/// A row as it comes out of SQLite, before decoding.
struct RawAlert {
    id: String,
    device_id: String,
    timestamp: String,
    alert_type: String,
    location_lat: Option<f64>,
    location_lon: Option<f64>,
    payload: Option<String>,
}

impl RawAlert {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            device_id: row.get(1)?,
            timestamp: row.get(2)?,
            alert_type: row.get(3)?,
            location_lat: row.get(4)?,
            location_lon: row.get(5)?,
            payload: row.get(6)?,
        })
    }

    fn decode(self) -> Result<Alert> {
        let id = Uuid::parse_str(&self.id)
            .map_err(|e| ServerError::internal(format!("corrupt id column '{}': {e}", self.id)))?;
        let payload = self
            .payload
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?;

        Ok(Alert {
            id,
            device_id: self.device_id,
            timestamp: decode_ts(&self.timestamp)?,
            alert_type: AlertType::parse(&self.alert_type).map_err(|_| {
                ServerError::internal(format!(
                    "corrupt alert_type column '{}'",
                    self.alert_type
                ))
            })?,
            location_lat: self.location_lat,
            location_lon: self.location_lon,
            payload,
        })
    }
}

/// Per-device aggregate statistics.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceStats {
    /// Total number of alerts recorded for the device.
    pub total_alerts: u64,

    /// Alert counts keyed by category string.
    pub alerts_by_type: HashMap<String, u64>,

    /// The most recent alert, if the device has any.
    pub latest_alert: Option<Alert>,
}

/// The alert persistence store, backed by a single SQLite file.
///
/// Cloning is cheap - the inner connection handle is reference-counted,
/// and every statement serializes through the connection's own thread.
#[derive(Clone)]
pub struct AlertStore {
    conn: tokio_rusqlite::Connection,
}

impl AlertStore {
    /// Open (or create) a store at `path` and run schema initialisation.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = tokio_rusqlite::Connection::open(path).await?;
        let store = Self { conn };
        store.init_schema().await?;
        Ok(store)
    }

    /// Open an in-memory store - useful for testing.
    pub async fn open_in_memory() -> Result<Self> {
        let conn = tokio_rusqlite::Connection::open_in_memory().await?;
        let store = Self { conn };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<()> {
        self.conn
            .call(|conn| {
                conn.execute_batch(SCHEMA)?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Insert a single alert.
    ///
    /// The insert is one statement and therefore one implicit
    /// transaction: on failure nothing is committed.
    pub async fn insert_alert(&self, alert: &Alert) -> Result<()> {
        let id = alert.id.hyphenated().to_string();
        let device_id = alert.device_id.clone();
        let timestamp = encode_ts(alert.timestamp);
        let alert_type = alert.alert_type.as_str().to_string();
        let location_lat = alert.location_lat;
        let location_lon = alert.location_lon;
        let payload = alert
            .payload
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO alerts \
                     (id, device_id, timestamp, alert_type, location_lat, location_lon, payload) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    rusqlite::params![
                        id,
                        device_id,
                        timestamp,
                        alert_type,
                        location_lat,
                        location_lon,
                        payload
                    ],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// All alerts, newest first.
    pub async fn all_alerts(&self) -> Result<Vec<Alert>> {
        let raw = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {ALERT_COLUMNS} FROM alerts ORDER BY timestamp DESC"
                ))?;
                let rows = stmt
                    .query_map([], RawAlert::from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;

        raw.into_iter().map(RawAlert::decode).collect()
    }

    /// Alerts with `start <= timestamp <= end`, optionally narrowed by
    /// category and/or device.
    pub async fn alerts_in_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        alert_type: Option<AlertType>,
        device_id: Option<String>,
    ) -> Result<Vec<Alert>> {
        let mut sql = format!(
            "SELECT {ALERT_COLUMNS} FROM alerts \
             WHERE timestamp >= ?1 AND timestamp <= ?2"
        );
        let mut params: Vec<String> = vec![encode_ts(start), encode_ts(end)];

        if let Some(ty) = alert_type {
            params.push(ty.as_str().to_string());
            sql.push_str(&format!(" AND alert_type = ?{}", params.len()));
        }
        if let Some(device) = device_id {
            params.push(device);
            sql.push_str(&format!(" AND device_id = ?{}", params.len()));
        }
        sql.push_str(" ORDER BY timestamp DESC");

        let raw = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map(rusqlite::params_from_iter(params), RawAlert::from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;

        raw.into_iter().map(RawAlert::decode).collect()
    }

    /// Alerts whose recorded coordinates fall inside the bounding box.
    ///
    /// Rows without coordinates are excluded.
    pub async fn alerts_in_bbox(
        &self,
        min_lat: f64,
        max_lat: f64,
        min_lon: f64,
        max_lon: f64,
    ) -> Result<Vec<Alert>> {
        let raw = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {ALERT_COLUMNS} FROM alerts \
                     WHERE location_lat IS NOT NULL AND location_lon IS NOT NULL \
                       AND location_lat BETWEEN ?1 AND ?2 \
                       AND location_lon BETWEEN ?3 AND ?4 \
                     ORDER BY timestamp DESC"
                ))?;
                let rows = stmt
                    .query_map(
                        rusqlite::params![min_lat, max_lat, min_lon, max_lon],
                        RawAlert::from_row,
                    )?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;

        raw.into_iter().map(RawAlert::decode).collect()
    }

    /// Alert counts per category string, optionally scoped to a timeframe.
    pub async fn counts_by_type(
        &self,
        timeframe: Option<(DateTime<Utc>, DateTime<Utc>)>,
    ) -> Result<HashMap<String, u64>> {
        let counts = self
            .conn
            .call(move |conn| {
                let mut sql =
                    String::from("SELECT alert_type, COUNT(id) FROM alerts");
                let mut params: Vec<String> = Vec::new();

                if let Some((start, end)) = timeframe {
                    params.push(encode_ts(start));
                    params.push(encode_ts(end));
                    sql.push_str(" WHERE timestamp >= ?1 AND timestamp <= ?2");
                }
                sql.push_str(" GROUP BY alert_type");

                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map(rusqlite::params_from_iter(params), |row| {
                        Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;

        Ok(counts.into_iter().collect())
    }

    /// Per-category, per-bucket counts for alerts in `[start, end]`.
    ///
    /// `bucket_format` is an SQLite `strftime` pattern producing the
    /// bucket label; rows come back ordered by bucket.
    pub async fn trend_buckets(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        bucket_format: String,
    ) -> Result<Vec<(String, String, u64)>> {
        let start = encode_ts(start);
        let end = encode_ts(end);

        let rows = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT alert_type, strftime(?1, timestamp) AS bucket, COUNT(id) \
                     FROM alerts \
                     WHERE timestamp >= ?2 AND timestamp <= ?3 \
                     GROUP BY alert_type, bucket \
                     ORDER BY bucket",
                )?;
                let rows = stmt
                    .query_map(rusqlite::params![bucket_format, start, end], |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, i64>(2)? as u64,
                        ))
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;

        Ok(rows)
    }

    /// Aggregate statistics for one device.
    pub async fn device_statistics(&self, device_id: String) -> Result<DeviceStats> {
        let (total, by_type, latest) = self
            .conn
            .call(move |conn| {
                let total: i64 = conn.query_row(
                    "SELECT COUNT(id) FROM alerts WHERE device_id = ?1",
                    rusqlite::params![device_id],
                    |row| row.get(0),
                )?;

                let mut stmt = conn.prepare(
                    "SELECT alert_type, COUNT(id) FROM alerts \
                     WHERE device_id = ?1 GROUP BY alert_type",
                )?;
                let by_type = stmt
                    .query_map(rusqlite::params![device_id], |row| {
                        Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;

                let latest = conn
                    .query_row(
                        &format!(
                            "SELECT {ALERT_COLUMNS} FROM alerts \
                             WHERE device_id = ?1 \
                             ORDER BY timestamp DESC LIMIT 1"
                        ),
                        rusqlite::params![device_id],
                        RawAlert::from_row,
                    )
                    .optional()?;

                Ok((total as u64, by_type, latest))
            })
            .await?;

        Ok(DeviceStats {
            total_alerts: total,
            alerts_by_type: by_type.into_iter().collect(),
            latest_alert: latest.map(RawAlert::decode).transpose()?,
        })
    }
}
