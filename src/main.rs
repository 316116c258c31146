use clap::{Parser, ValueEnum};
use log::{error, info};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{SignalKind, signal};
use tokio_util::sync::CancellationToken;
use unipoll::config::{Config, InputSpec, PayloadFormat, TickPolicy, parse_alias, parse_interval};
use unipoll::output::mqtt::MqttClient;
use unipoll::sensors::{Notifier, discover_inputs};
use unipoll::{Poller, Result};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PayloadKind {
    /// RFC 3339 timestamp of the edge
    Timestamp,
    /// JSON object with input and timestamp
    Json,
}

#[derive(Parser)]
#[command(name = "unipoll", version)]
#[command(about = "Publish rising edges of UniPi digital inputs over MQTT")]
struct Cli {
    /// sysfs folder scanned for di_<G>_<NN> directories
    #[arg(long, value_name = "DIR")]
    sysfs_root: Option<PathBuf>,

    /// Seconds between polls, fractions allowed
    #[arg(long, value_name = "SECS", value_parser = parse_interval)]
    interval: Option<Duration>,

    /// Whether a tick may start while refreshes of the previous one still run
    #[arg(long, value_enum, env = "UNIPOLL_POLICY")]
    policy: Option<TickPolicy>,

    /// Extra value file to poll, optionally with its identifier
    #[arg(long = "input", value_name = "PATH[=ID]")]
    inputs: Vec<InputSpec>,

    /// Publish a discovered input under another identifier
    #[arg(long = "alias", value_name = "DEFAULT=ID", value_parser = parse_alias)]
    aliases: Vec<(String, String)>,

    /// MQTT broker host
    #[arg(long)]
    broker: Option<String>,

    /// MQTT broker port
    #[arg(long)]
    port: Option<u16>,

    #[arg(long)]
    client_id: Option<String>,

    #[arg(long)]
    username: Option<String>,

    #[arg(long)]
    password: Option<String>,

    /// CA certificate, enables TLS
    #[arg(long, value_name = "FILE")]
    cafile: Option<PathBuf>,

    /// Prepended to every identifier to form the topic
    #[arg(long)]
    topic_prefix: Option<String>,

    /// Message body format
    #[arg(long, value_enum, env = "UNIPOLL_PAYLOAD")]
    payload: Option<PayloadKind>,

    /// Publish this fixed text instead of a timestamp
    #[arg(long, env = "UNIPOLL_MESSAGE", conflicts_with = "payload")]
    message: Option<String>,

    /// Print the discovered inputs and exit
    #[arg(long)]
    list: bool,

    /// Print the effective configuration as JSON and exit
    #[arg(long)]
    print_config: bool,
}

impl Cli {
    /// Command line flags win over environment and defaults.
    fn apply(&self, config: &mut Config) {
        if let Some(root) = &self.sysfs_root {
            config.sysfs.root = root.clone();
        }
        if let Some(interval) = self.interval {
            config.poll.interval = interval;
        }
        if let Some(policy) = self.policy {
            config.poll.policy = policy;
        }
        config.sysfs.inputs.extend(self.inputs.iter().cloned());
        config.sysfs.aliases.extend(self.aliases.iter().cloned());

        if let Some(host) = &self.broker {
            config.mqtt.broker_host = host.clone();
        }
        if let Some(port) = self.port {
            config.mqtt.broker_port = port;
        }
        if let Some(client_id) = &self.client_id {
            config.mqtt.client_id = client_id.clone();
        }
        if let Some(username) = &self.username {
            config.mqtt.username = Some(username.clone());
        }
        if let Some(password) = &self.password {
            config.mqtt.password = Some(password.clone());
        }
        if let Some(cafile) = &self.cafile {
            config.mqtt.ca_file = Some(cafile.clone());
        }
        if let Some(prefix) = &self.topic_prefix {
            config.mqtt.topic_prefix = prefix.clone();
        }
        match (self.payload, &self.message) {
            (_, Some(text)) => config.mqtt.payload = PayloadFormat::Text(text.clone()),
            (Some(PayloadKind::Timestamp), None) => config.mqtt.payload = PayloadFormat::Timestamp,
            (Some(PayloadKind::Json), None) => config.mqtt.payload = PayloadFormat::Json,
            (None, None) => {}
        }
    }
}

fn init_logger() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logger();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = Config::from_env();
    cli.apply(&mut config);
    config.validate()?;

    if cli.print_config {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    info!("Starting unipoll");
    info!("  sysfs root: {}", config.sysfs.root.display());
    info!("  Interval: {:?}", config.poll.interval);
    info!(
        "  Broker: {}:{}{}",
        config.mqtt.broker_host,
        config.mqtt.broker_port,
        if config.mqtt.ca_file.is_some() { " (TLS)" } else { "" }
    );

    // Fail before touching the network when there is nothing to poll.
    let discovered = discover_inputs(&config.sysfs)?;
    for input in &discovered {
        info!("  {} -> {}", input.identifier, input.location.display());
    }

    if cli.list {
        for input in &discovered {
            println!("{}\t{}", input.identifier, input.location.display());
        }
        return Ok(());
    }

    let (publisher, mqtt_loop) = MqttClient::connect(&config.mqtt).await?;
    let notifier: Arc<dyn Notifier> = Arc::new(publisher);

    let inputs = discovered
        .into_iter()
        .map(|input| input.into_input(Arc::clone(&notifier)))
        .collect();
    let poller = Poller::new(inputs, config.poll.clone());

    let shutdown = CancellationToken::new();
    let signal_task = tokio::spawn(wait_for_shutdown(shutdown.clone()));

    poller.run(shutdown).await;

    signal_task.abort();
    mqtt_loop.abort();
    info!("unipoll stopped");
    Ok(())
}

/// Cancels `shutdown` on SIGINT or SIGTERM.
async fn wait_for_shutdown(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for SIGINT: {}", e);
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("Received shutdown signal");
    shutdown.cancel();
}
