//! Shared dashboard state and update fan-out.
//!
//! The MQTT subscriber is the only writer.  HTTP handlers read snapshots,
//! and every websocket client holds a broadcast receiver for pushed
//! updates.  Messages are JSON objects of the form
//! `{"type": "<name>", "data": ...}`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde_json::{json, Value};
use tokio::sync::broadcast;
use tracing::info;

use crate::command::CommandPayload;
use crate::device::{ApplyOutcome, DeviceState};

/// Buffered updates per websocket client before it starts skipping.
const UPDATE_CAPACITY: usize = 64;

pub struct Hub {
    state: Mutex<DeviceState>,
    updates: broadcast::Sender<String>,
    broker_connected: AtomicBool,
    broker: String,
}

impl Hub {
    pub fn new(broker: impl Into<String>) -> Self {
        let (updates, _) = broadcast::channel(UPDATE_CAPACITY);
        Self {
            state: Mutex::new(DeviceState::new()),
            updates,
            broker_connected: AtomicBool::new(false),
            broker: broker.into(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, DeviceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.updates.subscribe()
    }

    fn push(&self, message: String) {
        // No receivers just means no dashboard is open.
        self.updates.send(message).ok();
    }

    /// Apply a received command and push the result to every dashboard.
    pub fn apply_payload(&self, payload: &CommandPayload, received_ms: u64) -> ApplyOutcome {
        let (outcome, update, devices) = {
            let mut state = self.lock();
            let outcome = state.apply(payload, received_ms);
            let update = match outcome {
                ApplyOutcome::Unsupported => None,
                _ => state.latest().map(|entry| {
                    json!({
                        "mode": entry.mode,
                        "action": entry.action,
                        "status": entry.status,
                        "timestamp": entry.received_ms,
                    })
                }),
            };
            (outcome, update, json!(state.devices))
        };

        if let Some(update) = update {
            info!(mode = %payload.mode, action = %payload.action, ?outcome, "command applied");
            self.push(message("device_update", update));
            self.push(message("device_states", devices));
        }
        outcome
    }

    pub fn is_broker_connected(&self) -> bool {
        self.broker_connected.load(Ordering::SeqCst)
    }

    /// Record the broker connection state, notifying dashboards on change.
    pub fn set_broker_connected(&self, connected: bool) {
        if self.broker_connected.swap(connected, Ordering::SeqCst) != connected {
            self.push(message("mqtt_status", self.broker_status()));
        }
    }

    fn broker_status(&self) -> Value {
        json!({
            "connected": self.is_broker_connected(),
            "broker": self.broker,
        })
    }

    /// Messages sent to a websocket client when it connects.
    pub fn greeting(&self) -> Vec<String> {
        let state = self.lock();
        let mut messages = vec![
            message("device_states", json!(state.devices)),
            message("current_mode", json!(state.current_mode)),
            message("mqtt_status", self.broker_status()),
        ];
        if state.latest().is_some() {
            let history: Vec<_> = state.history().collect();
            messages.push(message("activity_history", json!(history)));
        }
        messages
    }

    /// Snapshot served at `/api/state`.
    pub fn state_json(&self) -> Value {
        let state = self.lock();
        json!({
            "devices": state.devices,
            "current_mode": state.current_mode,
            "mqtt_connected": self.is_broker_connected(),
        })
    }

    /// Activity history served at `/api/history`, newest first.
    pub fn history_json(&self) -> Value {
        let state = self.lock();
        let history: Vec<_> = state.history().collect();
        json!(history)
    }
}

fn message(kind: &str, data: Value) -> String {
    json!({ "type": kind, "data": data }).to_string()
}
