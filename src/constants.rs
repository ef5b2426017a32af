//! Protocol constants for VESC serial communication.
//!
//! This module defines the constants used on the wire, including command id
//! bytes, frame markers, and default link configuration.

/// Start marker for frames with a 1-byte length field (payload < 256 bytes)
pub const FRAME_START_SHORT: u8 = 0x02;

/// Start marker for frames with a 2-byte big-endian length field
pub const FRAME_START_LONG: u8 = 0x03;

/// Trailing byte closing every frame
pub const FRAME_END: u8 = 0x03;

/// Firmware version query
pub const COMM_FW_VERSION: u8 = 0;

/// Full telemetry readout
pub const COMM_GET_VALUES: u8 = 4;

/// Set motor duty cycle
pub const COMM_SET_DUTY: u8 = 5;

/// Set motor current
pub const COMM_SET_CURRENT: u8 = 6;

/// Set braking current
pub const COMM_SET_CURRENT_BRAKE: u8 = 7;

/// Set motor RPM
pub const COMM_SET_RPM: u8 = 8;

/// Set battery cutoff voltages
pub const COMM_SET_BATTERY_CUT: u8 = 86;

/// Engage park mode (motor lock)
pub const COMM_PARK_MODE: u8 = 200;

/// Release park mode
pub const COMM_PARK_UNLOCK: u8 = 201;

/// Query park state
pub const COMM_GET_PARKED_STATUS: u8 = 202;

/// Set motor/battery/field-weakening current limits
pub const COMM_SET_MOTOR_LIMITS: u8 = 203;

/// Read the two auxiliary ADC channels
pub const COMM_GET_ADC_VALUES: u8 = 204;

/// Default serial device
pub const DEFAULT_PORT: &str = "/dev/ttyACM0";

/// Default baud rate (115200 bps)
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Default byte timeout in milliseconds
pub const DEFAULT_TIMEOUT_MS: u64 = 100;

/// Default telemetry poll interval in milliseconds
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;

/// Default maximum motor current in amps, used for throttle percentage
pub const DEFAULT_MAX_CURRENT: f32 = 60.0;
