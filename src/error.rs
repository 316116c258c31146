use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum UnipollError {
    #[error("Failed to scan sysfs root {root}: {source}")]
    Discovery {
        root: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No digital inputs found under {0}")]
    NoInputs(PathBuf),

    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unexpected content {content:?} in {path}")]
    InvalidValue { path: PathBuf, content: String },

    #[error("Cannot derive an identifier from {0}, set one explicitly")]
    UnknownIdentifier(PathBuf),

    #[error("Publish failed: {0}")]
    Publish(String),

    #[error("MQTT broker {host}:{port} did not acknowledge within {timeout:?}")]
    BrokerUnavailable {
        host: String,
        port: u16,
        timeout: Duration,
    },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    SerdeJsonError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, UnipollError>;
