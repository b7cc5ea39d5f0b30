//! Analytics queries over the alert store.
//!
//! Each operation validates its parameters, delegates the heavy lifting
//! to SQL in [`AlertStore`], and shapes the result for the HTTP layer.
//! Geospatial lookups use a flat bounding-box approximation rather than
//! true great-circle distance, which is plenty for dashboard filtering.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::error::{Result, ServerError};
use crate::store::{AlertStore, DeviceStats};
use crate::types::{Alert, AlertType};

/// Kilometres per degree of latitude (and of longitude at the equator).
const KM_PER_DEGREE: f64 = 111.0;

/// One point on a trend line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendPoint {
    /// Bucket label, either `YYYY-MM-DD HH:00:00` or `YYYY-MM-DD`.
    pub date: String,
    pub count: u64,
}

/// Device statistics as served to clients.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceStatistics {
    pub total_alerts: u64,
    pub alerts_by_type: HashMap<String, u64>,
    pub latest_alert: Option<Alert>,
    pub last_seen: Option<DateTime<Utc>>,
}

/// Read-side query service over the persisted alerts.
#[derive(Clone)]
pub struct AlertQueryService {
    store: AlertStore,
}

impl AlertQueryService {
    pub fn new(store: AlertStore) -> Self {
        Self { store }
    }

    /// Alerts between `start` and `end` (inclusive), optionally narrowed
    /// by category and/or device.
    pub async fn alerts_by_timeframe(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        alert_type: Option<AlertType>,
        device_id: Option<String>,
    ) -> Result<Vec<Alert>> {
        if end < start {
            return Err(ServerError::validation(
                "end_time must be greater than or equal to start_time",
            ));
        }
        self.store
            .alerts_in_range(start, end, alert_type, device_id)
            .await
    }

    /// Alerts within roughly `radius_km` of `(lat, lon)`.
    ///
    /// The radius is converted to a latitude/longitude bounding box; the
    /// longitude span widens towards the poles, with the cosine factor
    /// floored so the box stays finite at `lat = ±90`.
    pub async fn alerts_by_location(
        &self,
        lat: f64,
        lon: f64,
        radius_km: f64,
    ) -> Result<Vec<Alert>> {
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
            return Err(ServerError::validation(
                "Invalid latitude or longitude supplied",
            ));
        }
        if radius_km <= 0.0 {
            return Err(ServerError::validation("radius_km must be positive"));
        }

        let lat_range = radius_km / KM_PER_DEGREE;
        let mut cos_lat = lat.to_radians().cos().abs();
        if cos_lat < 1e-6 {
            cos_lat = 1e-6;
        }
        let lon_range = radius_km / (KM_PER_DEGREE * cos_lat);

        self.store
            .alerts_in_bbox(
                lat - lat_range,
                lat + lat_range,
                lon - lon_range,
                lon + lon_range,
            )
            .await
    }

    /// Aggregated alert counts per category.
    ///
    /// The timeframe applies only when both bounds are present;
    /// otherwise every alert is counted.
    pub async fn alert_counts(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<HashMap<String, u64>> {
        let timeframe = match (start, end) {
            (Some(s), Some(e)) => Some((s, e)),
            _ => None,
        };
        self.store.counts_by_type(timeframe).await
    }

    /// Trend lines per category over the trailing `days` days.
    ///
    /// Intervals shorter than a day bucket by hour; a day or longer
    /// buckets by calendar date.
    pub async fn alert_trends(
        &self,
        days: u32,
        interval_hours: u32,
    ) -> Result<HashMap<String, Vec<TrendPoint>>> {
        let end = Utc::now();
        let start = end
            .checked_sub_signed(Duration::days(i64::from(days)))
            .ok_or_else(|| ServerError::validation("days is out of range"))?;
        let bucket_format = if interval_hours < 24 {
            "%Y-%m-%d %H:00:00"
        } else {
            "%Y-%m-%d"
        };

        let rows = self
            .store
            .trend_buckets(start, end, bucket_format.to_string())
            .await?;

        let mut trends: HashMap<String, Vec<TrendPoint>> = HashMap::new();
        for (alert_type, date, count) in rows {
            trends
                .entry(alert_type)
                .or_default()
                .push(TrendPoint { date, count });
        }
        Ok(trends)
    }

    /// Aggregate statistics for a single device.
    ///
    /// An unknown device is not an error; it reports zero alerts.
    pub async fn device_statistics(&self, device_id: String) -> Result<DeviceStatistics> {
        let DeviceStats {
            total_alerts,
            alerts_by_type,
            latest_alert,
        } = self.store.device_statistics(device_id).await?;

        let last_seen = latest_alert.as_ref().map(|a| a.timestamp);
        Ok(DeviceStatistics {
            total_alerts,
            alerts_by_type,
            latest_alert,
            last_seen,
        })
    }
}
