//! Shared alert types for the OBEX server.
//!
//! This module defines the core data structures flowing through the
//! ingestion pipeline. An [`Alert`] is immutable once persisted: there is
//! no update path anywhere in the system, only insert and read.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, ServerError};

/// The category of a security alert.
///
/// Fixed eight-kind enumeration; unknown categories are rejected at
/// deserialization time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    WeaponDetection,
    UnauthorizedPassenger,
    AggressionDetection,
    HarassmentDetection,
    RobberyPattern,
    RouteDeviation,
    DriverFatigue,
    DistressDetection,
}

impl AlertType {
    /// The stable string form, as stored in the database and carried on
    /// the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WeaponDetection => "weapon_detection",
            Self::UnauthorizedPassenger => "unauthorized_passenger",
            Self::AggressionDetection => "aggression_detection",
            Self::HarassmentDetection => "harassment_detection",
            Self::RobberyPattern => "robbery_pattern",
            Self::RouteDeviation => "route_deviation",
            Self::DriverFatigue => "driver_fatigue",
            Self::DistressDetection => "distress_detection",
        }
    }

    /// Parse the stable string form back into the enum.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "weapon_detection" => Ok(Self::WeaponDetection),
            "unauthorized_passenger" => Ok(Self::UnauthorizedPassenger),
            "aggression_detection" => Ok(Self::AggressionDetection),
            "harassment_detection" => Ok(Self::HarassmentDetection),
            "robbery_pattern" => Ok(Self::RobberyPattern),
            "route_deviation" => Ok(Self::RouteDeviation),
            "driver_fatigue" => Ok(Self::DriverFatigue),
            "distress_detection" => Ok(Self::DistressDetection),
            other => Err(ServerError::validation(format!(
                "unknown alert type: {other}"
            ))),
        }
    }
}

impl std::fmt::Display for AlertType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An alert submission, before the server has assigned an identity.
///
/// This is the schema shared by the HTTP body of `POST /alerts` and the
/// JSON payload on the MQTT alerts topic. The `timestamp` is the event
/// time reported by the device, not the receipt time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAlert {
    /// Identifier of the device that detected the event.
    pub device_id: String,

    /// When the event occurred (RFC 3339, timezone-aware).
    pub timestamp: DateTime<Utc>,

    /// Category of the detected event.
    pub alert_type: AlertType,

    /// Optional latitude, within [-90, 90].
    #[serde(default)]
    pub location_lat: Option<f64>,

    /// Optional longitude, within [-180, 180].
    #[serde(default)]
    pub location_lon: Option<f64>,

    /// Optional free-form structured data (confidence score, bounding
    /// box, ...).
    #[serde(default)]
    pub payload: Option<serde_json::Value>,
}

impl NewAlert {
    /// Validate the fields serde cannot check on its own.
    ///
    /// # Errors
    ///
    /// Returns `ServerError::Validation` for an empty device id or
    /// out-of-range coordinates. Latitude and longitude are validated
    /// independently; either may be present without the other.
    pub fn validate(&self) -> Result<()> {
        if self.device_id.trim().is_empty() {
            return Err(ServerError::validation("device_id must not be empty"));
        }

        if let Some(lat) = self.location_lat {
            if !(-90.0..=90.0).contains(&lat) {
                return Err(ServerError::validation(format!(
                    "location_lat {lat} outside [-90, 90]"
                )));
            }
        }

        if let Some(lon) = self.location_lon {
            if !(-180.0..=180.0).contains(&lon) {
                return Err(ServerError::validation(format!(
                    "location_lon {lon} outside [-180, 180]"
                )));
            }
        }

        Ok(())
    }

    /// Attach a server-generated identity, producing the persistable record.
    pub fn into_persisted(self, id: Uuid) -> Alert {
        Alert {
            id,
            device_id: self.device_id,
            timestamp: self.timestamp,
            alert_type: self.alert_type,
            location_lat: self.location_lat,
            location_lon: self.location_lon,
            payload: self.payload,
        }
    }
}

/// A persisted security alert.
///
/// The `id` is generated by the server exactly once, at persistence
/// time; submitters never supply it. All fields serialize explicitly
/// (optional fields as `null`) so the wire shape is stable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    /// Globally unique, server-generated identifier.
    pub id: Uuid,

    /// Identifier of the originating device.
    pub device_id: String,

    /// Event time as reported by the device.
    pub timestamp: DateTime<Utc>,

    /// Category of the detected event.
    pub alert_type: AlertType,

    /// Optional latitude.
    pub location_lat: Option<f64>,

    /// Optional longitude.
    pub location_lon: Option<f64>,

    /// Optional free-form structured data.
    pub payload: Option<serde_json::Value>,
}

/// Messages the server pushes over the real-time channel.
///
/// Serialized with a `type` tag:
///
/// ```json
/// {"type":"new_alert","alert":{"id":"...","device_id":"...",...}}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Connection confirmation, sent once after the handshake.
    System { message: String },

    /// Reply to a client keep-alive frame.
    Pong {
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// A freshly committed alert, fanned out to every live connection.
    NewAlert { alert: Alert },
}

impl ServerMessage {
    /// The connection confirmation message.
    pub fn hello() -> Self {
        Self::System {
            message: "Connected to OBEX Alert System".to_string(),
        }
    }

    /// The keep-alive reply.
    pub fn pong() -> Self {
        Self::Pong {
            message: "Connection active".to_string(),
            timestamp: Utc::now(),
        }
    }

    /// Wrap a committed alert for fan-out.
    pub fn new_alert(alert: Alert) -> Self {
        Self::NewAlert { alert }
    }

    /// Serialize to the JSON string sent over the wire.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn new_alert() -> NewAlert {
        NewAlert {
            device_id: "device-123".to_string(),
            timestamp: Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
            alert_type: AlertType::WeaponDetection,
            location_lat: Some(6.5244),
            location_lon: Some(3.3792),
            payload: Some(json!({"confidence": 0.97})),
        }
    }

    #[test]
    fn alert_type_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&AlertType::WeaponDetection).unwrap(),
            r#""weapon_detection""#
        );
        assert_eq!(
            serde_json::to_string(&AlertType::DriverFatigue).unwrap(),
            r#""driver_fatigue""#
        );
    }

    #[test]
    fn alert_type_rejects_unknown_value() {
        let result = serde_json::from_str::<AlertType>(r#""jaywalking""#);
        assert!(result.is_err());
    }

    #[test]
    fn alert_type_as_str_round_trips() {
        for ty in [
            AlertType::WeaponDetection,
            AlertType::UnauthorizedPassenger,
            AlertType::AggressionDetection,
            AlertType::HarassmentDetection,
            AlertType::RobberyPattern,
            AlertType::RouteDeviation,
            AlertType::DriverFatigue,
            AlertType::DistressDetection,
        ] {
            assert_eq!(AlertType::parse(ty.as_str()).unwrap(), ty);
        }
        assert!(AlertType::parse("unknown").is_err());
    }

    #[test]
    fn new_alert_deserializes_without_optional_fields() {
        let alert: NewAlert = serde_json::from_value(json!({
            "device_id": "device-1",
            "timestamp": "2024-06-01T12:00:00Z",
            "alert_type": "route_deviation"
        }))
        .unwrap();

        assert_eq!(alert.device_id, "device-1");
        assert!(alert.location_lat.is_none());
        assert!(alert.location_lon.is_none());
        assert!(alert.payload.is_none());
    }

    #[test]
    fn new_alert_rejects_bad_timestamp() {
        let result = serde_json::from_value::<NewAlert>(json!({
            "device_id": "device-1",
            "timestamp": "yesterday-ish",
            "alert_type": "route_deviation"
        }));
        assert!(result.is_err());
    }

    #[test]
    fn validate_accepts_valid_alert() {
        assert!(new_alert().validate().is_ok());
    }

    #[test]
    fn validate_rejects_empty_device_id() {
        let mut alert = new_alert();
        alert.device_id = "  ".to_string();
        assert!(alert.validate().is_err());
    }

    #[test]
    fn validate_rejects_out_of_range_latitude() {
        let mut alert = new_alert();
        alert.location_lat = Some(91.0);
        assert!(alert.validate().is_err());

        alert.location_lat = Some(-90.0);
        assert!(alert.validate().is_ok());
    }

    #[test]
    fn validate_rejects_out_of_range_longitude() {
        let mut alert = new_alert();
        alert.location_lon = Some(200.0);
        assert!(alert.validate().is_err());

        alert.location_lon = Some(180.0);
        assert!(alert.validate().is_ok());
    }

    #[test]
    fn validate_allows_independent_coordinates() {
        let mut alert = new_alert();
        alert.location_lon = None;
        assert!(alert.validate().is_ok());
    }

    #[test]
    fn into_persisted_preserves_all_fields() {
        let input = new_alert();
        let id = Uuid::new_v4();
        let alert = input.clone().into_persisted(id);

        assert_eq!(alert.id, id);
        assert_eq!(alert.device_id, input.device_id);
        assert_eq!(alert.timestamp, input.timestamp);
        assert_eq!(alert.alert_type, input.alert_type);
        assert_eq!(alert.location_lat, input.location_lat);
        assert_eq!(alert.location_lon, input.location_lon);
        assert_eq!(alert.payload, input.payload);
    }

    #[test]
    fn new_alert_message_has_expected_shape() {
        let alert = new_alert().into_persisted(Uuid::new_v4());
        let json = ServerMessage::new_alert(alert.clone()).to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["type"], "new_alert");
        assert_eq!(value["alert"]["id"], alert.id.to_string());
        assert_eq!(value["alert"]["device_id"], "device-123");
        assert_eq!(value["alert"]["alert_type"], "weapon_detection");
    }

    #[test]
    fn persisted_alert_serializes_optional_fields_as_null() {
        let mut alert = new_alert().into_persisted(Uuid::new_v4());
        alert.location_lat = None;
        alert.payload = None;

        let value = serde_json::to_value(&alert).unwrap();
        assert!(value["location_lat"].is_null());
        assert!(value["payload"].is_null());
        assert_eq!(value["location_lon"], 3.3792);
    }

    #[test]
    fn hello_and_pong_messages() {
        let hello: serde_json::Value =
            serde_json::from_str(&ServerMessage::hello().to_json().unwrap()).unwrap();
        assert_eq!(hello["type"], "system");
        assert_eq!(hello["message"], "Connected to OBEX Alert System");

        let pong: serde_json::Value =
            serde_json::from_str(&ServerMessage::pong().to_json().unwrap()).unwrap();
        assert_eq!(pong["type"], "pong");
        assert!(pong["timestamp"].is_string());
    }
}
