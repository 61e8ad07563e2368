//! Command publishing.
//!
//! `MqttPublisher` owns a blocking `rumqttc` client whose connection is
//! driven on a background thread.  Publishing never blocks the frame loop:
//! while the broker is unreachable, or when the outgoing queue is full, the
//! command is dropped with a warning.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::Context;
use rumqttc::{Client, ConnectReturnCode, Connection, Event, Outgoing, Packet, QoS};
use tracing::{debug, info, warn};

use super::MqttConfig;
use crate::command::Command;

/// Outgoing request queue depth.
const REQUEST_CAPACITY: usize = 10;

/// Pause before the driver retries a failed connection.
const RECONNECT_DELAY: Duration = Duration::from_secs(2);

/// Something that can deliver a committed command.
pub trait Publisher {
    /// Hand `command` off for delivery.  Returns false if it was dropped.
    fn publish(&mut self, command: &Command) -> bool;

    /// Flush and disconnect.
    fn shutdown(&mut self) {}
}

// ── Dry run ────────────────────────────────────────────────

/// Logs commands instead of sending them.
#[derive(Debug, Default)]
pub struct LogPublisher {
    pub published: Vec<Command>,
}

impl Publisher for LogPublisher {
    fn publish(&mut self, command: &Command) -> bool {
        info!(seq = command.seq, payload = %command.encode(), "dry run, not publishing");
        self.published.push(*command);
        true
    }
}

// ── MQTT ───────────────────────────────────────────────────

/// Connection status shared with the driver thread.
#[derive(Debug, Default)]
struct Link {
    connected: AtomicBool,
    stopping: AtomicBool,
    acked: AtomicU64,
}

pub struct MqttPublisher {
    client: Client,
    topic: String,
    link: Arc<Link>,
    driver: Option<JoinHandle<()>>,
}

impl MqttPublisher {
    /// Create the client and start the connection driver.  Connecting
    /// happens in the background.
    pub fn connect(config: &MqttConfig) -> anyhow::Result<Self> {
        let (client, connection) = Client::new(config.options("tracker"), REQUEST_CAPACITY);
        let link = Arc::new(Link::default());

        let driver_link = Arc::clone(&link);
        let address = config.address();
        let driver = thread::Builder::new()
            .name("mqtt-driver".to_string())
            .spawn(move || drive(connection, driver_link, address))
            .context("failed to spawn MQTT driver thread")?;

        info!(broker = %config.address(), topic = %config.topic, "MQTT publisher started");
        Ok(Self {
            client,
            topic: config.topic.clone(),
            link,
            driver: Some(driver),
        })
    }

    pub fn is_connected(&self) -> bool {
        self.link.connected.load(Ordering::SeqCst)
    }

    /// Block until the broker accepts the connection or `timeout` passes.
    pub fn wait_connected(&self, timeout: Duration) -> bool {
        wait_for(timeout, || self.is_connected())
    }

    /// Publish one command and wait for the broker's acknowledgement.
    /// Used by the one-shot `send` command.
    pub fn send_once(config: &MqttConfig, command: &Command, timeout: Duration) -> anyhow::Result<()> {
        let mut publisher = Self::connect(config)?;
        if !publisher.wait_connected(timeout) {
            publisher.shutdown();
            anyhow::bail!("could not connect to broker {}", config.address());
        }

        let acked_before = publisher.link.acked.load(Ordering::SeqCst);
        if !publisher.publish(command) {
            publisher.shutdown();
            anyhow::bail!("failed to queue command");
        }
        let acked = wait_for(timeout, || {
            publisher.link.acked.load(Ordering::SeqCst) > acked_before
        });
        publisher.shutdown();
        if !acked {
            anyhow::bail!("broker did not acknowledge command within {:?}", timeout);
        }
        Ok(())
    }
}

impl Publisher for MqttPublisher {
    fn publish(&mut self, command: &Command) -> bool {
        if !self.is_connected() {
            warn!(seq = command.seq, command = %command, "broker not connected, dropping command");
            return false;
        }

        let payload = command.encode();
        match self
            .client
            .try_publish(self.topic.as_str(), QoS::AtLeastOnce, false, payload.as_bytes())
        {
            Ok(()) => {
                info!(seq = command.seq, topic = %self.topic, %payload, "command published");
                true
            }
            Err(e) => {
                warn!(seq = command.seq, "failed to queue command: {}", e);
                false
            }
        }
    }

    fn shutdown(&mut self) {
        self.link.stopping.store(true, Ordering::SeqCst);
        let was_connected = self.is_connected();
        let disconnect_queued = match self.client.try_disconnect() {
            Ok(()) => true,
            Err(e) => {
                warn!("disconnect request failed: {}", e);
                false
            }
        };

        // The driver exits once a queued disconnect goes out.  One stuck in
        // a connection attempt, or behind a full request queue, is left to
        // die with the process.
        if let Some(driver) = self.driver.take() {
            if was_connected && disconnect_queued && driver.join().is_err() {
                warn!("MQTT driver thread panicked");
            }
        }
    }
}

impl Drop for MqttPublisher {
    fn drop(&mut self) {
        if self.driver.is_some() {
            self.shutdown();
        }
    }
}

/// Drive the connection until shutdown, reconnecting on errors.
fn drive(mut connection: Connection, link: Arc<Link>, address: String) {
    for notification in connection.iter() {
        match notification {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                if ack.code == ConnectReturnCode::Success {
                    info!(broker = %address, "connected to MQTT broker");
                    link.connected.store(true, Ordering::SeqCst);
                } else {
                    warn!(broker = %address, code = ?ack.code, "broker refused connection");
                }
            }
            Ok(Event::Incoming(Packet::PubAck(ack))) => {
                debug!(pkid = ack.pkid, "publish acknowledged");
                link.acked.fetch_add(1, Ordering::SeqCst);
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                link.connected.store(false, Ordering::SeqCst);
                break;
            }
            Ok(event) => debug!(?event, "mqtt event"),
            Err(e) => {
                if link.connected.swap(false, Ordering::SeqCst) {
                    warn!(broker = %address, "lost MQTT connection: {}", e);
                } else {
                    debug!(broker = %address, "MQTT connection failed: {}", e);
                }
                if link.stopping.load(Ordering::SeqCst) {
                    break;
                }
                thread::sleep(RECONNECT_DELAY);
            }
        }
        if link.stopping.load(Ordering::SeqCst) && !link.connected.load(Ordering::SeqCst) {
            break;
        }
    }
    debug!("MQTT driver exiting");
}

fn wait_for(timeout: Duration, mut done: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if done() {
            return true;
        }
        thread::sleep(Duration::from_millis(20));
    }
    done()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{Action, Mode};

    fn command(seq: u64) -> Command {
        Command {
            mode: Mode::Lights,
            action: Action::On,
            seq,
            timestamp_ms: 1,
        }
    }

    #[test]
    fn test_log_publisher_records() {
        let mut publisher = LogPublisher::default();
        assert!(publisher.publish(&command(1)));
        assert!(publisher.publish(&command(2)));
        assert_eq!(publisher.published.len(), 2);
        assert_eq!(publisher.published[1].seq, 2);
    }

    #[test]
    fn test_unconnected_publisher_drops_commands() {
        let config = MqttConfig {
            broker: "127.0.0.1".to_string(),
            port: 1,
            ..MqttConfig::default()
        };
        let mut publisher = MqttPublisher::connect(&config).unwrap();
        assert!(!publisher.is_connected());
        assert!(!publisher.publish(&command(1)));
        publisher.shutdown();
    }

    #[test]
    fn test_shutdown_with_full_queue_does_not_hang() {
        let config = MqttConfig {
            broker: "127.0.0.1".to_string(),
            port: 1,
            ..MqttConfig::default()
        };
        let mut publisher = MqttPublisher::connect(&config).unwrap();
        // Let the first connection attempt fail, then pretend it succeeded
        // so publishes queue up without anything draining them.
        thread::sleep(Duration::from_millis(100));
        publisher.link.connected.store(true, Ordering::SeqCst);
        let queued = (0..REQUEST_CAPACITY * 2)
            .take_while(|&seq| publisher.publish(&command(seq as u64)))
            .count();
        assert!(queued < REQUEST_CAPACITY * 2, "request queue never filled");

        let started = Instant::now();
        publisher.shutdown();
        assert!(
            started.elapsed() < Duration::from_millis(500),
            "shutdown blocked for {:?}",
            started.elapsed()
        );
    }

    #[test]
    fn test_wait_for() {
        assert!(wait_for(Duration::from_millis(10), || true));
        assert!(!wait_for(Duration::from_millis(10), || false));
    }
}
