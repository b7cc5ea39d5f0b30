//! The single ingestion path for alerts.
//!
//! Every alert, whether it arrived over HTTP or the message bus, goes
//! through [`AlertPipeline::process`]: validate, assign an id, persist,
//! then fan out to connected dashboards. Persistence is authoritative -
//! a broadcast failure is logged and swallowed, never surfaced to the
//! submitter.

use std::fmt;

use tracing::{error, info};
use uuid::Uuid;

use crate::error::Result;
use crate::registry::ConnectionRegistry;
use crate::store::AlertStore;
use crate::types::{Alert, NewAlert, ServerMessage};

/// Where an alert entered the system. Used for logging only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestSource {
    Http,
    Mqtt,
}

impl fmt::Display for IngestSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IngestSource::Http => write!(f, "HTTP"),
            IngestSource::Mqtt => write!(f, "MQTT"),
        }
    }
}

/// Shared ingestion pipeline. Clones share the store and registry.
#[derive(Clone)]
pub struct AlertPipeline {
    store: AlertStore,
    registry: ConnectionRegistry,
}

impl AlertPipeline {
    pub fn new(store: AlertStore, registry: ConnectionRegistry) -> Self {
        Self { store, registry }
    }

    /// Validate, persist, and broadcast one alert.
    ///
    /// Returns the persisted alert, including its assigned id. Each
    /// submission gets a fresh id, so resubmitting identical content
    /// produces distinct rows.
    pub async fn process(&self, new_alert: NewAlert, source: IngestSource) -> Result<Alert> {
        new_alert.validate()?;

        let alert = new_alert.into_persisted(Uuid::new_v4());
        self.store.insert_alert(&alert).await?;
        info!(
            alert_id = %alert.id,
            device_id = %alert.device_id,
            alert_type = %alert.alert_type,
            %source,
            "alert persisted"
        );

        match ServerMessage::new_alert(alert.clone()).to_json() {
            Ok(message) => {
                self.registry.broadcast(&message);
            }
            Err(e) => {
                // Persisted already; delivery is best-effort.
                error!(alert_id = %alert.id, error = %e, "failed to encode broadcast message");
            }
        }

        Ok(alert)
    }
}
