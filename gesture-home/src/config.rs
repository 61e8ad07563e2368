//! Command-line and environment configuration.
//!
//! Every setting is a flag with an environment fallback, so the tracker
//! and dashboard can be pointed at a different broker without editing
//! scripts.

use clap::Args;

use crate::hand::{MachineConfig, PoseConfig, SmoothingConfig};
use crate::mqtt::MqttConfig;
use crate::web::WebConfig;

/// Broker connection flags, shared by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct BrokerArgs {
    /// MQTT broker host
    #[arg(long, env = "MQTT_BROKER", default_value = "broker.hivemq.com")]
    pub broker: String,

    /// MQTT broker port
    #[arg(long, env = "MQTT_PORT", default_value_t = 1883)]
    pub broker_port: u16,

    /// Topic commands are published on
    #[arg(long, env = "MQTT_TOPIC", default_value = "IDD/button/state")]
    pub topic: String,

    /// Broker username (only sent together with a password)
    #[arg(long, env = "MQTT_USERNAME", default_value = "")]
    pub username: String,

    /// Broker password
    #[arg(long, env = "MQTT_PASSWORD", default_value = "", hide_env_values = true)]
    pub password: String,
}

impl BrokerArgs {
    pub fn config(&self) -> MqttConfig {
        MqttConfig {
            broker: self.broker.clone(),
            port: self.broker_port,
            topic: self.topic.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
            ..MqttConfig::default()
        }
    }
}

/// Gesture recognition tuning.
#[derive(Args, Debug, Clone)]
pub struct GestureArgs {
    /// Frames a finger count must be held to lock a mode
    #[arg(long, env = "GESTURE_MODE_FRAMES", default_value_t = 10)]
    pub mode_frames: u32,

    /// Frames an action shape must be held to commit
    #[arg(long, env = "GESTURE_ACTION_FRAMES", default_value_t = 10)]
    pub action_frames: u32,

    /// Milliseconds without a hand before an armed mode is dropped
    #[arg(long, env = "GESTURE_IDLE_TIMEOUT_MS", default_value_t = 5000)]
    pub idle_timeout_ms: u64,

    /// Landmark smoothing factor in [0, 1); 0 disables smoothing
    #[arg(long, env = "GESTURE_SMOOTHING", default_value_t = 0.0)]
    pub smoothing: f32,

    /// Frames come from a mirrored (selfie-view) camera
    #[arg(long, env = "GESTURE_MIRRORED")]
    pub mirrored: bool,
}

impl GestureArgs {
    pub fn pose(&self) -> PoseConfig {
        PoseConfig {
            mirrored: self.mirrored,
            ..PoseConfig::default()
        }
    }

    pub fn machine(&self) -> MachineConfig {
        MachineConfig {
            mode_frames: self.mode_frames,
            action_frames: self.action_frames,
            idle_timeout_ms: self.idle_timeout_ms,
        }
    }

    pub fn smoothing(&self) -> anyhow::Result<SmoothingConfig> {
        anyhow::ensure!(
            (0.0..1.0).contains(&self.smoothing),
            "smoothing must be in [0, 1), got {}",
            self.smoothing
        );
        Ok(SmoothingConfig {
            smoothing: self.smoothing,
        })
    }
}

/// Dashboard listen address.
#[derive(Args, Debug, Clone)]
pub struct WebArgs {
    /// Address to bind the dashboard to
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Dashboard port
    #[arg(long, env = "PORT", default_value_t = 8080)]
    pub port: u16,
}

impl WebArgs {
    pub fn config(&self) -> WebConfig {
        WebConfig {
            host: self.host.clone(),
            port: self.port,
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[derive(Parser, Debug)]
    struct TestCli {
        #[command(flatten)]
        broker: BrokerArgs,
        #[command(flatten)]
        gesture: GestureArgs,
        #[command(flatten)]
        web: WebArgs,
    }

    #[test]
    fn test_flags_override_defaults() {
        let cli = TestCli::try_parse_from([
            "test",
            "--broker",
            "farlab.example.org",
            "--broker-port",
            "8883",
            "--username",
            "idd",
            "--password",
            "secret",
            "--mode-frames",
            "5",
            "--idle-timeout-ms",
            "2000",
            "--smoothing",
            "0.4",
            "--mirrored",
            "--port",
            "9000",
        ])
        .unwrap();

        let mqtt = cli.broker.config();
        assert_eq!(mqtt.broker, "farlab.example.org");
        assert_eq!(mqtt.port, 8883);
        assert!(mqtt.has_auth());

        let machine = cli.gesture.machine();
        assert_eq!(machine.mode_frames, 5);
        assert_eq!(machine.idle_timeout_ms, 2000);
        assert!(cli.gesture.pose().mirrored);
        assert_eq!(cli.gesture.smoothing().unwrap().smoothing, 0.4);
        assert_eq!(cli.web.config().port, 9000);
    }

    #[test]
    fn test_smoothing_out_of_range() {
        let cli = TestCli::try_parse_from(["test", "--smoothing", "1.0"]).unwrap();
        assert!(cli.gesture.smoothing().is_err());
    }

    #[test]
    fn test_bad_port_rejected() {
        assert!(TestCli::try_parse_from(["test", "--broker-port", "99999"]).is_err());
    }
}
