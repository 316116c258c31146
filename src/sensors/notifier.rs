//! Edge notification capability.
//!
//! Digital inputs only know that *someone* wants to hear about rising
//! edges. The MQTT publisher is the production implementation.

use crate::error::Result;

/// Receives the identifier of an input that saw a rising edge.
///
/// Called from inside a refresh, so implementations must return promptly:
/// hand the event off and never wait for delivery.
pub trait Notifier: Send + Sync {
    fn notify(&self, identifier: &str) -> Result<()>;
}
