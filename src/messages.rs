//! Observer message protocol.
//!
//! Observers talk JSON: an inbound envelope `{"command": .., "data": ..}`
//! and a small family of outbound event shapes. Parse failures are reported
//! to the offending observer only; the connection stays open.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Result, VescError};
use crate::telemetry::TelemetrySnapshot;

/// Broadcast telemetry event name.
pub const EVENT_DATA_RECEIVED: &str = "vesc_data_received";

/// Point-in-time snapshot reply event name.
pub const EVENT_VESC_INFO: &str = "COMM_VESC_INFO";

/// Motor limits acknowledgment event name.
pub const EVENT_SET_MOTOR_CONF: &str = "COMM_SET_MOTOR_CONF";

/// Battery cutoff acknowledgment event name.
pub const EVENT_SET_BATTERY_CUT: &str = "COMM_SET_BATTERY_CUT";

/// Command names observers may send.
const RECOGNIZED_COMMANDS: [&str; 5] = [
    "SET_PARKED",
    "SET_UNPARKED",
    "GET_PARKED_STATUS",
    "SET_MOTOR_CONF",
    "SET_BATTERY_CUT",
];

/// A parsed observer command envelope.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "command", content = "data")]
pub enum InboundCommand {
    /// Engage the park lock
    #[serde(rename = "SET_PARKED")]
    SetParked,
    /// Release the park lock
    #[serde(rename = "SET_UNPARKED")]
    SetUnparked,
    /// Query the park state
    #[serde(rename = "GET_PARKED_STATUS")]
    GetParkedStatus,
    /// Apply motor current limits
    #[serde(rename = "SET_MOTOR_CONF")]
    SetMotorConf(MotorConf),
    /// Apply battery cutoff thresholds
    #[serde(rename = "SET_BATTERY_CUT")]
    SetBatteryCut(BatteryCut),
}

/// Parameters of a `SET_MOTOR_CONF` request (UI field names).
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MotorConf {
    /// Maximum motor current in amps
    #[serde(rename = "motorCurrent")]
    pub motor_current: f32,
    /// Maximum battery current in amps
    #[serde(rename = "batteryCurrent")]
    pub battery_current: f32,
    /// Maximum field-weakening current in amps
    #[serde(rename = "fieldWeakening")]
    pub field_weakening: f32,
}

/// Parameters of a `SET_BATTERY_CUT` request.
///
/// `battery_end` is optional for compatibility with callers that only ever
/// supplied the start threshold; absent, it mirrors `battery_start`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BatteryCut {
    /// Voltage at which current limiting starts
    pub battery_start: f32,
    /// Voltage at which output is fully cut
    #[serde(default)]
    pub battery_end: Option<f32>,
}

impl BatteryCut {
    /// The effective end threshold.
    pub fn end(&self) -> f32 {
        self.battery_end.unwrap_or(self.battery_start)
    }
}

/// Parse an observer text message into a command.
///
/// Distinguishes unparseable JSON, unrecognized command names, and
/// recognized commands with invalid parameters; all three surface as
/// [`VescError::MalformedRequest`] with the message the observer sees.
pub fn parse_command(text: &str) -> Result<InboundCommand> {
    let value: serde_json::Value = serde_json::from_str(text)
        .map_err(|_| VescError::MalformedRequest("Invalid JSON".into()))?;

    let name_known = value
        .get("command")
        .and_then(serde_json::Value::as_str)
        .map(|name| RECOGNIZED_COMMANDS.contains(&name))
        .unwrap_or(false);

    serde_json::from_value(value).map_err(|err| {
        if name_known {
            VescError::MalformedRequest(format!("invalid command parameters: {err}"))
        } else {
            VescError::MalformedRequest("Unknown command".into())
        }
    })
}

/// An event sent to an observer.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum OutboundMessage {
    /// Telemetry event; `data: null` is the explicit no-data signal
    Telemetry {
        /// `vesc_data_received` or `COMM_VESC_INFO`
        event: &'static str,
        /// The snapshot, or `null` when the poll failed
        data: Option<Arc<TelemetrySnapshot>>,
    },
    /// Acknowledgment of a configuration command
    CommandResult {
        /// Event name of the acknowledged command
        event: &'static str,
        /// Whether the device accepted it
        success: bool,
    },
    /// Park state after a park/status request
    Parked {
        /// Device-reported lock state
        parked: bool,
    },
    /// Result of an unpark request
    Unparked {
        /// Whether the lock was released
        unparked: bool,
    },
    /// Error addressed to one observer
    Error {
        /// Human-readable message
        error: String,
    },
}

impl OutboundMessage {
    /// Broadcast telemetry event (or no-data signal).
    pub fn broadcast(data: Option<Arc<TelemetrySnapshot>>) -> Self {
        OutboundMessage::Telemetry {
            event: EVENT_DATA_RECEIVED,
            data,
        }
    }

    /// Point-in-time snapshot reply.
    pub fn info(snapshot: Arc<TelemetrySnapshot>) -> Self {
        OutboundMessage::Telemetry {
            event: EVENT_VESC_INFO,
            data: Some(snapshot),
        }
    }

    /// Error event from any failure.
    pub fn error(err: impl std::fmt::Display) -> Self {
        OutboundMessage::Error {
            error: err.to_string(),
        }
    }

    /// Serialize for the wire.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
