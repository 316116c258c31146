//! Digital inputs exposed by the UniPi sysfs driver.
//!
//! Discovery finds the `di_<G>_<NN>` folders once at startup; every
//! [`DigitalInput`] then turns raw `0`/`1` reads into rising-edge
//! notifications.

pub mod digital_input;
pub mod discovery;
pub mod notifier;
pub mod path_matcher;

pub use digital_input::{DigitalInput, Transition, ValueSource};
pub use discovery::{DiscoveredInput, discover_inputs, find_digital_input_paths};
pub use notifier::Notifier;
