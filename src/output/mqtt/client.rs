//! MQTT client wrapper for publishing input edges.

use super::publisher::MqttPublisher;
use crate::config::MqttConfig;
use crate::error::{Result, UnipollError};
use log::{debug, error, info, warn};
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, Transport};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Delay before polling the event loop again after a connection error.
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// MQTT connection to the broker.
pub struct MqttClient {
    client: AsyncClient,
    event_loop: EventLoop,
}

impl MqttClient {
    /// Create a new MQTT client from configuration.
    ///
    /// Nothing is sent until [`run`](Self::run) drives the event loop.
    pub fn new(config: &MqttConfig) -> Result<Self> {
        let mut options =
            MqttOptions::new(&config.client_id, &config.broker_host, config.broker_port);
        options.set_keep_alive(config.keep_alive);

        // Set credentials if provided
        if let Some(username) = &config.username {
            options.set_credentials(username, config.password.as_deref().unwrap_or_default());
        }

        if let Some(ca_file) = &config.ca_file {
            let ca = std::fs::read(ca_file).map_err(|e| {
                UnipollError::Config(format!("cannot read CA file {}: {}", ca_file.display(), e))
            })?;
            options.set_transport(Transport::tls(ca, None, None));
            debug!("TLS enabled with CA file {}", ca_file.display());
        }

        let (client, event_loop) = AsyncClient::new(options, 100);

        Ok(Self { client, event_loop })
    }

    /// Run the MQTT event loop.
    ///
    /// Runs indefinitely. `connected` fires on the first acknowledged
    /// connection; rumqttc reconnects on its own after errors.
    pub async fn run(mut self, mut connected: Option<oneshot::Sender<()>>) {
        info!("Starting MQTT event loop");

        loop {
            match self.event_loop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    info!("Connected to MQTT broker ({:?})", ack.code);
                    if let Some(tx) = connected.take() {
                        let _ = tx.send(());
                    }
                }
                Ok(event) => {
                    debug!("MQTT event: {:?}", event);
                }
                Err(e) => {
                    error!("MQTT connection error: {:?}", e);
                    // Wait before reconnecting
                    tokio::time::sleep(RECONNECT_DELAY).await;
                }
            }
        }
    }

    /// Get a clone of the async client for publishing from other tasks.
    pub fn client(&self) -> AsyncClient {
        self.client.clone()
    }

    /// Connect to the broker and hand back a publisher.
    ///
    /// Spawns the event loop and waits up to `connect_timeout` for the
    /// broker to acknowledge. The returned handle owns the event loop task.
    pub async fn connect(config: &MqttConfig) -> Result<(MqttPublisher, JoinHandle<()>)> {
        info!(
            "Connecting to MQTT broker at {}:{}",
            config.broker_host, config.broker_port
        );

        let mqtt_client = Self::new(config)?;
        let publisher = MqttPublisher::new(mqtt_client.client(), config);

        let (connected_tx, connected_rx) = oneshot::channel();
        let mqtt_loop = tokio::spawn(async move {
            mqtt_client.run(Some(connected_tx)).await;
        });

        match tokio::time::timeout(config.connect_timeout, connected_rx).await {
            Ok(Ok(())) => Ok((publisher, mqtt_loop)),
            Ok(Err(_)) | Err(_) => {
                warn!(
                    "MQTT broker not reachable after {:?}",
                    config.connect_timeout
                );
                mqtt_loop.abort();
                Err(UnipollError::BrokerUnavailable {
                    host: config.broker_host.clone(),
                    port: config.broker_port,
                    timeout: config.connect_timeout,
                })
            }
        }
    }
}
