//! Edge-triggered digital input backed by a sysfs value file.
//!
//! Each refresh reads the file, compares it with the last completed read
//! and reports the transition. Only rising edges (0 -> 1) are handed to the
//! [`Notifier`]; holding a button down or releasing it publishes nothing.

use super::Notifier;
use super::path_matcher;
use crate::error::{Result, UnipollError};
use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Name of the value file inside a `di_<G>_<NN>` folder.
pub const DI_VALUE_FILE: &str = "di_value";

/// Where the boolean value lives relative to `location`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueSource {
    /// `location` is a `di_<G>_<NN>` folder containing `di_value`.
    DeviceDir,
    /// `location` is the value file itself.
    ValueFile,
}

/// Outcome of one refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Steady,
    Rising,
    Falling,
}

pub struct DigitalInput {
    location: PathBuf,
    source: ValueSource,
    identifier: String,
    state: bool,
    consecutive_failures: u32,
    notifier: Arc<dyn Notifier>,
}

impl DigitalInput {
    /// Create an input for a discovered `di_<G>_<NN>` folder.
    ///
    /// Without an explicit identifier the folder name is used.
    pub fn from_device_dir(
        dir: impl Into<PathBuf>,
        identifier: Option<String>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self> {
        Self::new(dir.into(), ValueSource::DeviceDir, identifier, notifier)
    }

    /// Create an input that reads `path` directly.
    ///
    /// Without an explicit identifier the closest `di_<G>_<NN>` component of
    /// the path is used.
    pub fn from_value_file(
        path: impl Into<PathBuf>,
        identifier: Option<String>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self> {
        Self::new(path.into(), ValueSource::ValueFile, identifier, notifier)
    }

    fn new(
        location: PathBuf,
        source: ValueSource,
        identifier: Option<String>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self> {
        let identifier = match identifier {
            Some(id) => id,
            None => path_matcher::identifier_from_path(&location)
                .ok_or_else(|| UnipollError::UnknownIdentifier(location.clone()))?,
        };
        Ok(Self::with_identifier(location, source, identifier, notifier))
    }

    /// Create an input whose identifier is already resolved.
    pub fn with_identifier(
        location: PathBuf,
        source: ValueSource,
        identifier: String,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            location,
            source,
            identifier,
            state: false,
            consecutive_failures: 0,
            notifier,
        }
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Last successfully read value.
    pub fn state(&self) -> bool {
        self.state
    }

    /// Failed refreshes since the last successful one.
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// The file actually read by [`refresh`](Self::refresh).
    pub fn value_path(&self) -> PathBuf {
        match self.source {
            ValueSource::DeviceDir => self.location.join(DI_VALUE_FILE),
            ValueSource::ValueFile => self.location.clone(),
        }
    }

    /// Read the current value and act on any edge.
    ///
    /// `state` is only touched after a complete, valid read. A failed
    /// notification does not undo the state change: the edge has happened
    /// and will not be reported again.
    pub async fn refresh(&mut self) -> Result<Transition> {
        let value = match self.read_value().await {
            Ok(value) => value,
            Err(e) => {
                self.consecutive_failures = self.consecutive_failures.saturating_add(1);
                return Err(e);
            }
        };

        if self.consecutive_failures > 0 {
            info!(
                "{} readable again after {} failed read(s)",
                self.identifier, self.consecutive_failures
            );
            self.consecutive_failures = 0;
        }

        if value == self.state {
            return Ok(Transition::Steady);
        }

        let transition = if self.state {
            debug!("Falling edge on {}", self.identifier);
            Transition::Falling
        } else {
            info!("Input toggle for {}", self.identifier);
            if let Err(e) = self.notifier.notify(&self.identifier) {
                warn!("Failed to notify rising edge on {}: {}", self.identifier, e);
            }
            Transition::Rising
        };

        self.state = value;
        Ok(transition)
    }

    async fn read_value(&self) -> Result<bool> {
        let path = self.value_path();
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|source| UnipollError::Read {
                path: path.clone(),
                source,
            })?;
        parse_value(&path, &content)
    }
}

impl std::fmt::Debug for DigitalInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DigitalInput")
            .field("location", &self.location)
            .field("source", &self.source)
            .field("identifier", &self.identifier)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

/// Interprets the content of a value file: `"1"` or `"0"`, surrounding
/// whitespace ignored. Anything else is an error, not `false`.
pub fn parse_value(path: &Path, content: &str) -> Result<bool> {
    match content.trim() {
        "1" => Ok(true),
        "0" => Ok(false),
        other => Err(UnipollError::InvalidValue {
            path: path.to_path_buf(),
            content: other.to_string(),
        }),
    }
}
