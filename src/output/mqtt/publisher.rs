//! Publishes rising edges to `<topic_prefix><identifier>`.

use crate::config::{MqttConfig, PayloadFormat};
use crate::error::{Result, UnipollError};
use crate::sensors::Notifier;
use chrono::{DateTime, Local, SecondsFormat, TimeZone};
use log::debug;
use rumqttc::{AsyncClient, QoS};

/// [`Notifier`] backed by an MQTT client.
///
/// Messages are queued with `try_publish` so a refresh never waits on the
/// broker; a full queue or a dead event loop is reported as a publish error.
pub struct MqttPublisher {
    client: AsyncClient,
    topic_prefix: String,
    payload: PayloadFormat,
}

impl MqttPublisher {
    pub fn new(client: AsyncClient, config: &MqttConfig) -> Self {
        Self {
            client,
            topic_prefix: config.topic_prefix.clone(),
            payload: config.payload.clone(),
        }
    }

    pub fn topic(&self, identifier: &str) -> String {
        format!("{}{}", self.topic_prefix, identifier)
    }
}

impl Notifier for MqttPublisher {
    fn notify(&self, identifier: &str) -> Result<()> {
        let topic = self.topic(identifier);
        let payload = render_payload(&self.payload, identifier, &Local::now());
        debug!("Publishing to {}: {}", topic, payload);
        self.client
            .try_publish(topic, QoS::AtMostOnce, false, payload.into_bytes())
            .map_err(|e| UnipollError::Publish(e.to_string()))
    }
}

/// Message body for an edge on `identifier` observed at `at`.
pub fn render_payload<Tz>(format: &PayloadFormat, identifier: &str, at: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    match format {
        PayloadFormat::Timestamp => at.to_rfc3339_opts(SecondsFormat::Micros, false),
        PayloadFormat::Json => serde_json::json!({
            "input": identifier,
            "timestamp": at.to_rfc3339_opts(SecondsFormat::Micros, false),
        })
        .to_string(),
        PayloadFormat::Text(text) => text.clone(),
    }
}
