//! MQTT transport.
//!
//! The tracker publishes committed commands (`publisher`); the dashboard
//! subscribes to the same topic and applies them (`subscriber`).  Both use
//! `rumqttc`, the tracker through its blocking client driven on a thread
//! and the dashboard through the async event loop.

pub mod publisher;
pub mod subscriber;

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rumqttc::MqttOptions;

pub use publisher::{LogPublisher, MqttPublisher, Publisher};

/// Broker connection settings.
#[derive(Debug, Clone)]
pub struct MqttConfig {
    pub broker: String,
    pub port: u16,
    pub topic: String,
    pub username: String,
    pub password: String,
    pub keep_alive: Duration,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            broker: "broker.hivemq.com".to_string(),
            port: 1883,
            topic: "IDD/button/state".to_string(),
            username: String::new(),
            password: String::new(),
            keep_alive: Duration::from_secs(60),
        }
    }
}

impl MqttConfig {
    /// Credentials are only sent when both halves are set.
    pub fn has_auth(&self) -> bool {
        !self.username.is_empty() && !self.password.is_empty()
    }

    /// Client id unique to this process and start time.
    pub fn client_id(role: &str) -> String {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.subsec_nanos())
            .unwrap_or(0);
        format!("gesture-home-{role}-{}-{nanos}", std::process::id())
    }

    /// Connection options for a client playing `role`.
    pub fn options(&self, role: &str) -> MqttOptions {
        let mut options = MqttOptions::new(Self::client_id(role), &self.broker, self.port);
        options.set_keep_alive(self.keep_alive);
        if self.has_auth() {
            options.set_credentials(&self.username, &self.password);
        }
        options
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.broker, self.port)
    }
}
