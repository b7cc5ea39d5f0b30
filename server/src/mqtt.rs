//! MQTT ingestion from edge devices.
//!
//! The broker connection runs on its own OS thread, driving rumqttc's
//! blocking event loop. Decoded alerts are handed to the async
//! ingestion pipeline through a runtime handle. A malformed bus message
//! is logged and skipped; it never takes the loop down.
//!
//! Resubscription happens on every `ConnAck`, so subscriptions survive
//! the automatic reconnects the event loop performs after transport
//! errors.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rumqttc::{Client, Event, MqttOptions, Outgoing, Packet, Publish, QoS};
use tokio::runtime::Handle;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::MqttSettings;
use crate::error::{Result, ServerError};
use crate::pipeline::{AlertPipeline, IngestSource};
use crate::types::NewAlert;

/// Pause before retrying after a transport error, to avoid a hot
/// reconnect loop when the broker is down.
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Handle to the running MQTT ingestion thread.
pub struct MqttIngest {
    client: Client,
    stop: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<()>>,
}

impl MqttIngest {
    /// Connect to the broker described by `settings` and start
    /// consuming alerts into `pipeline` on a background thread.
    ///
    /// `runtime` is the handle of the async runtime that owns the
    /// pipeline; decoded alerts are spawned onto it.
    pub fn spawn(settings: &MqttSettings, pipeline: AlertPipeline, runtime: Handle) -> Result<Self> {
        let client_id = format!("obex-server-{}", Uuid::new_v4().simple());
        let mut options = MqttOptions::new(client_id, settings.host.clone(), settings.port);
        options.set_keep_alive(Duration::from_secs(60));
        if let (Some(username), Some(password)) = (&settings.username, &settings.password) {
            options.set_credentials(username.clone(), password.clone());
        }

        let (client, mut connection) = Client::new(options, 64);
        let topic = settings.topic.clone();
        let subscriber = client.clone();
        let host = settings.host.clone();
        let port = settings.port;
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = stop.clone();

        let thread = thread::Builder::new()
            .name("mqtt-ingest".to_string())
            .spawn(move || {
                for event in connection.iter() {
                    match event {
                        Ok(Event::Incoming(Packet::ConnAck(_))) => {
                            info!(host = %host, port, topic = %topic, "connected to MQTT broker");
                            if let Err(e) = subscriber.subscribe(&topic, QoS::AtLeastOnce) {
                                error!(topic = %topic, error = %e, "MQTT subscribe failed");
                            }
                        }
                        Ok(Event::Incoming(Packet::Publish(publish))) => {
                            handle_publish(&publish, &pipeline, &runtime);
                        }
                        Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                            info!("MQTT client disconnecting");
                            break;
                        }
                        Ok(_) => {}
                        Err(e) => {
                            // While the broker is down the event loop never
                            // drains a queued disconnect request, so a stop
                            // flag is the only way out of the retry loop.
                            if stop_flag.load(Ordering::Relaxed) {
                                info!("MQTT client stopping while disconnected");
                                break;
                            }
                            warn!(error = %e, "MQTT connection error, retrying");
                            thread::sleep(RECONNECT_DELAY);
                        }
                    }
                }
                info!("MQTT ingest thread stopped");
            })
            .map_err(|e| ServerError::mqtt(format!("failed to spawn MQTT thread: {e}")))?;

        Ok(Self {
            client,
            stop,
            thread: Some(thread),
        })
    }

    /// Disconnect from the broker and wait for the ingest thread to
    /// drain its event loop.
    pub fn stop(mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Err(e) = self.client.disconnect() {
            warn!(error = %e, "MQTT disconnect request failed");
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("MQTT ingest thread panicked");
            }
        }
    }
}

/// Decode and dispatch one published message.
///
/// Runs on the MQTT thread; the actual persist-and-broadcast work is
/// spawned onto the async runtime and not awaited here.
fn handle_publish(publish: &Publish, pipeline: &AlertPipeline, runtime: &Handle) {
    let alert = match decode_alert_message(&publish.payload) {
        Ok(alert) => alert,
        Err(e) => {
            warn!(topic = %publish.topic, error = %e, "discarding malformed MQTT message");
            return;
        }
    };

    let pipeline = pipeline.clone();
    runtime.spawn(async move {
        if let Err(e) = pipeline.process(alert, IngestSource::Mqtt).await {
            error!(error = %e, "failed to process MQTT alert");
        }
    });
}

/// Parse a raw MQTT payload into an alert submission.
///
/// Field-level checks run here too, so an out-of-range submission is
/// discarded as malformed instead of failing later in the pipeline.
fn decode_alert_message(payload: &[u8]) -> Result<NewAlert> {
    let alert: NewAlert = serde_json::from_slice(payload)?;
    alert.validate()?;
    Ok(alert)
}
