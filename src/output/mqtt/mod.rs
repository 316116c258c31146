//! MQTT output for digital input edges.
//!
//! Connection handling lives in [`MqttClient`]; [`MqttPublisher`] is the
//! [`Notifier`](crate::sensors::Notifier) the inputs talk to.

mod client;
mod publisher;

pub use client::MqttClient;
pub use publisher::{MqttPublisher, render_payload};
