use crate::error::{Result, UnipollError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Default UniPi sysfs folder holding the `io_group*` directories.
pub const DEFAULT_SYSFS_ROOT: &str = "/sys/devices/platform/unipi_plc";

/// Default time between two polling ticks.
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub sysfs: SysfsConfig,
    pub poll: PollConfig,
    pub mqtt: MqttConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SysfsConfig {
    /// Directory tree scanned for `di_<G>_<NN>` folders.
    pub root: PathBuf,
    /// Value files polled directly, in addition to the discovered ones.
    pub inputs: Vec<InputSpec>,
    /// Default identifier -> published identifier.
    pub aliases: BTreeMap<String, String>,
}

/// A value file configured by hand instead of discovered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputSpec {
    pub path: PathBuf,
    pub identifier: Option<String>,
}

impl std::str::FromStr for InputSpec {
    type Err = String;

    /// Parses `PATH` or `PATH=IDENTIFIER`.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (path, identifier) = match s.split_once('=') {
            Some((path, id)) => (path.trim(), Some(id.trim())),
            None => (s.trim(), None),
        };
        if path.is_empty() {
            return Err(format!("missing path in input {:?}", s));
        }
        if identifier.is_some_and(str::is_empty) {
            return Err(format!("empty identifier in input {:?}", s));
        }
        Ok(Self {
            path: PathBuf::from(path),
            identifier: identifier.map(str::to_string),
        })
    }
}

/// How a tick relates to refreshes still running from the previous one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TickPolicy {
    /// The interval counts from the start of each tick. Slow inputs are
    /// skipped by later ticks until their refresh completes.
    #[default]
    Overlap,
    /// Every refresh of a tick completes before the next tick is scheduled.
    Block,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollConfig {
    pub interval: Duration,
    pub policy: TickPolicy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "format", content = "text")]
pub enum PayloadFormat {
    /// RFC 3339 timestamp of the edge.
    Timestamp,
    /// `{"input": ..., "timestamp": ...}`
    Json,
    /// A fixed message.
    Text(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttConfig {
    pub broker_host: String,
    pub broker_port: u16,
    pub client_id: String,
    pub username: Option<String>,
    #[serde(skip_serializing)]
    pub password: Option<String>,
    /// CA certificate; when set the connection uses TLS.
    pub ca_file: Option<PathBuf>,
    pub topic_prefix: String,
    pub payload: PayloadFormat,
    pub keep_alive: Duration,
    pub connect_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sysfs: SysfsConfig {
                root: PathBuf::from(DEFAULT_SYSFS_ROOT),
                inputs: Vec::new(),
                aliases: BTreeMap::new(),
            },
            poll: PollConfig {
                interval: DEFAULT_INTERVAL,
                policy: TickPolicy::Overlap,
            },
            mqtt: MqttConfig {
                broker_host: "localhost".to_string(),
                broker_port: 1883,
                client_id: default_client_id(),
                username: None,
                password: None,
                ca_file: None,
                topic_prefix: String::new(),
                payload: PayloadFormat::Timestamp,
                keep_alive: Duration::from_secs(30),
                connect_timeout: Duration::from_secs(10),
            },
        }
    }
}

/// `unipoll-<hostname>`, so several controllers can share one broker.
pub fn default_client_id() -> String {
    let host = gethostname::gethostname();
    let host = host.to_string_lossy();
    if host.is_empty() {
        "unipoll".to_string()
    } else {
        format!("unipoll-{}", host)
    }
}

/// Parses an interval given in (fractional) seconds.
pub fn parse_interval(secs: &str) -> std::result::Result<Duration, String> {
    let value: f64 = secs
        .trim()
        .parse()
        .map_err(|e| format!("invalid interval {:?}: {}", secs, e))?;
    Duration::try_from_secs_f64(value)
        .map_err(|e| format!("invalid interval {:?}: {}", secs, e))
}

/// Parses `DEFAULT=IDENTIFIER` alias pairs.
pub fn parse_alias(s: &str) -> std::result::Result<(String, String), String> {
    match s.split_once('=') {
        Some((from, to)) if !from.trim().is_empty() && !to.trim().is_empty() => {
            Ok((from.trim().to_string(), to.trim().to_string()))
        }
        _ => Err(format!("alias must look like DEFAULT=IDENTIFIER, got {:?}", s)),
    }
}

impl Config {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(root) = std::env::var("UNIPOLL_SYSFS_ROOT") {
            config.sysfs.root = PathBuf::from(root);
        }
        if let Ok(interval) = std::env::var("UNIPOLL_INTERVAL")
            && let Ok(d) = parse_interval(&interval)
        {
            config.poll.interval = d;
        }
        if let Ok(aliases) = std::env::var("UNIPOLL_ALIASES") {
            for pair in aliases.split(',').filter(|p| !p.trim().is_empty()) {
                if let Ok((from, to)) = parse_alias(pair) {
                    config.sysfs.aliases.insert(from, to);
                }
            }
        }

        // MQTT configuration
        if let Ok(host) = std::env::var("MQTT_BROKER_HOST") {
            config.mqtt.broker_host = host;
        }
        if let Ok(port) = std::env::var("MQTT_BROKER_PORT")
            && let Ok(p) = port.parse()
        {
            config.mqtt.broker_port = p;
        }
        if let Ok(client_id) = std::env::var("MQTT_CLIENT_ID") {
            config.mqtt.client_id = client_id;
        }
        if let Ok(username) = std::env::var("MQTT_USERNAME") {
            config.mqtt.username = Some(username);
        }
        if let Ok(password) = std::env::var("MQTT_PASSWORD") {
            config.mqtt.password = Some(password);
        }
        if let Ok(ca_file) = std::env::var("MQTT_CA_FILE") {
            config.mqtt.ca_file = Some(PathBuf::from(ca_file));
        }
        if let Ok(prefix) = std::env::var("MQTT_TOPIC_PREFIX") {
            config.mqtt.topic_prefix = prefix;
        }

        config
    }

    /// Rejects values the poller or the MQTT client cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.poll.interval.is_zero() {
            return Err(UnipollError::Config(
                "poll interval must be greater than zero".to_string(),
            ));
        }
        if self.mqtt.broker_host.trim().is_empty() {
            return Err(UnipollError::Config("broker host is empty".to_string()));
        }
        if self.mqtt.connect_timeout.is_zero() {
            return Err(UnipollError::Config(
                "connect timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert_eq!(config.sysfs.root, PathBuf::from(DEFAULT_SYSFS_ROOT));
        assert_eq!(config.poll.interval, Duration::from_millis(500));
        assert_eq!(config.poll.policy, TickPolicy::Overlap);
        assert_eq!(config.mqtt.payload, PayloadFormat::Timestamp);
        assert!(config.mqtt.client_id.starts_with("unipoll"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_interval_fractional_seconds() {
        assert_eq!(parse_interval("0.5"), Ok(Duration::from_millis(500)));
        assert_eq!(parse_interval("2"), Ok(Duration::from_secs(2)));
        assert!(parse_interval("-1").is_err());
        assert!(parse_interval("fast").is_err());
    }

    #[test]
    fn test_zero_interval_rejected() {
        let mut config = Config::default();
        config.poll.interval = Duration::ZERO;
        assert!(matches!(config.validate(), Err(UnipollError::Config(_))));
    }

    #[test]
    fn test_input_spec_parsing() {
        let spec: InputSpec = "/sys/x/di_value=doorbell".parse().unwrap();
        assert_eq!(spec.path, PathBuf::from("/sys/x/di_value"));
        assert_eq!(spec.identifier.as_deref(), Some("doorbell"));

        let spec: InputSpec = "/sys/x/di_value".parse().unwrap();
        assert_eq!(spec.identifier, None);

        assert!("=doorbell".parse::<InputSpec>().is_err());
        assert!("/sys/x/di_value=".parse::<InputSpec>().is_err());
    }

    #[test]
    fn test_parse_alias() {
        assert_eq!(
            parse_alias("di_1_01=front_door"),
            Ok(("di_1_01".to_string(), "front_door".to_string()))
        );
        assert!(parse_alias("di_1_01").is_err());
        assert!(parse_alias("=front_door").is_err());
    }

    #[test]
    fn test_config_serializes_to_json() {
        let mut config = Config::default();
        config.mqtt.payload = PayloadFormat::Text("pressed".to_string());
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["mqtt"]["payload"]["format"], "text");
        assert_eq!(json["mqtt"]["payload"]["text"], "pressed");
        assert_eq!(json["poll"]["policy"], "overlap");
    }
}
