//! gesture-home - hand-gesture smart-home controller
//!
//! `track` turns hand landmarks into debounced commands and publishes them
//! over MQTT; `dashboard` subscribes to the same topic and serves the web
//! dashboard; `send` publishes a single command by hand.

mod command;
mod config;
mod device;
mod hand;
mod mqtt;
mod source;
mod tracker;
mod web;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;

use crate::command::{Action, Command, Mode};
use crate::config::{BrokerArgs, GestureArgs, WebArgs};
use crate::mqtt::{LogPublisher, MqttPublisher, Publisher};
use crate::tracker::TrackerConfig;
use crate::web::Hub;

#[derive(Parser, Debug)]
#[command(name = "gesture-home", version, about = "Hand-gesture smart-home controller")]
struct Cli {
    /// Log filter, e.g. "gesture_home=debug" (default: $RUST_LOG or gesture_home=info)
    #[arg(long, global = true)]
    log_filter: Option<String>,

    #[command(subcommand)]
    task: Task,
}

#[derive(Subcommand, Debug)]
enum Task {
    /// Classify landmark frames and publish committed commands
    Track {
        #[command(flatten)]
        broker: BrokerArgs,

        #[command(flatten)]
        gesture: GestureArgs,

        /// Frame source: stdin, a JSON-lines file, socket, or socket:<path>
        #[arg(long, default_value = "stdin")]
        source: String,

        /// How long a socket read blocks before the idle timeout is checked
        #[arg(long, default_value_t = 100)]
        socket_wait_ms: u64,

        /// Exit after N seconds
        #[arg(long)]
        exit_after: Option<u64>,

        /// Log commands instead of publishing them
        #[arg(long)]
        dry_run: bool,
    },

    /// Serve the web dashboard, fed by the command topic
    Dashboard {
        #[command(flatten)]
        broker: BrokerArgs,

        #[command(flatten)]
        web: WebArgs,
    },

    /// Publish one command and exit
    Send {
        #[command(flatten)]
        broker: BrokerArgs,

        #[arg(value_enum)]
        mode: Mode,

        #[arg(value_enum)]
        action: Action,

        /// Seconds to wait for the broker
        #[arg(long, default_value_t = 10)]
        timeout: u64,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = match cli.log_filter {
        Some(ref filter) => tracing_subscriber::EnvFilter::try_new(filter)
            .with_context(|| format!("invalid log filter {filter:?}"))?,
        None => tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "gesture_home=info".into()),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("gesture-home v{} starting", env!("CARGO_PKG_VERSION"));

    match cli.task {
        Task::Track {
            broker,
            gesture,
            source,
            socket_wait_ms,
            exit_after,
            dry_run,
        } => {
            let config = TrackerConfig {
                pose: gesture.pose(),
                machine: gesture.machine(),
                smoothing: gesture.smoothing()?,
                exit_after: exit_after.map(Duration::from_secs),
            };
            let mut source = source::open(&source, Duration::from_millis(socket_wait_ms))?;
            let mut publisher: Box<dyn Publisher> = if dry_run {
                Box::new(LogPublisher::default())
            } else {
                Box::new(MqttPublisher::connect(&broker.config())?)
            };

            let stats = tracker::run(source.as_mut(), publisher.as_mut(), config)?;
            info!(
                frames = stats.frames,
                published = stats.published,
                dropped = stats.dropped,
                "tracker finished"
            );
            Ok(())
        }

        Task::Dashboard {
            broker,
            web: web_args,
        } => {
            let mqtt_config = broker.config();
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("failed to start async runtime")?;

            runtime.block_on(async move {
                let hub = Arc::new(Hub::new(mqtt_config.address()));
                let subscriber =
                    tokio::spawn(mqtt::subscriber::run(mqtt_config, Arc::clone(&hub)));
                let result = web::serve(web_args.config(), hub).await;
                subscriber.abort();
                result
            })
        }

        Task::Send {
            broker,
            mode,
            action,
            timeout,
        } => {
            let command = Command {
                mode,
                action,
                seq: 1,
                timestamp_ms: source::now_ms(),
            };
            let config = broker.config();
            MqttPublisher::send_once(&config, &command, Duration::from_secs(timeout))?;
            info!(payload = %command.encode(), topic = %config.topic, "command sent");
            Ok(())
        }
    }
}
