//! UniPi digital input poller.
//!
//! Discovers the digital inputs exposed under the UniPi sysfs tree, polls
//! them on a fixed interval and publishes every rising edge over MQTT.

pub mod config;
pub mod error;
pub mod output;
pub mod poller;
pub mod sensors;

pub use error::{Result, UnipollError};
pub use poller::{Poller, TickReport};
