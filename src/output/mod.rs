//! Where rising edges are delivered. Currently only MQTT.

pub mod mqtt;
