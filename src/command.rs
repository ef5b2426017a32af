//! Command catalog.
//!
//! Maps each logical device operation to its command id and payload
//! encoding. Parameters are packed big-endian; current, voltage and RPM
//! setpoints travel as `f32`. The response to every command echoes the
//! command id in its first byte, which [`Command::check_response`] enforces
//! before any payload interpretation happens.

use crate::constants::*;
use crate::error::{Result, VescError};

/// A logical operation on the device.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Request the full telemetry readout
    GetValues,
    /// Request the two auxiliary ADC channels
    GetAdcValues,
    /// Request the firmware version
    GetFirmwareVersion,
    /// Set motor duty cycle as a fraction (clamped to 0.0..=1.0)
    SetDutyCycle(f32),
    /// Set motor current in amps
    SetCurrent(f32),
    /// Set braking current in amps
    SetCurrentBrake(f32),
    /// Set motor speed in RPM
    SetRpm(f32),
    /// Set motor, battery and field-weakening current limits in amps
    SetMotorLimits {
        /// Maximum motor current
        motor_a: f32,
        /// Maximum battery current
        battery_a: f32,
        /// Maximum field-weakening current
        field_weakening_a: f32,
    },
    /// Set the battery voltage cutoff thresholds
    SetBatteryCutoff {
        /// Voltage at which current limiting starts
        start_v: f32,
        /// Voltage at which output is fully cut
        end_v: f32,
    },
    /// Engage (`true`) or release (`false`) the park lock
    SetParked(bool),
    /// Query the park lock state
    GetParkedStatus,
}

impl Command {
    /// The command id byte, echoed back by the device in its response.
    pub fn id(&self) -> u8 {
        match self {
            Command::GetValues => COMM_GET_VALUES,
            Command::GetAdcValues => COMM_GET_ADC_VALUES,
            Command::GetFirmwareVersion => COMM_FW_VERSION,
            Command::SetDutyCycle(_) => COMM_SET_DUTY,
            Command::SetCurrent(_) => COMM_SET_CURRENT,
            Command::SetCurrentBrake(_) => COMM_SET_CURRENT_BRAKE,
            Command::SetRpm(_) => COMM_SET_RPM,
            Command::SetMotorLimits { .. } => COMM_SET_MOTOR_LIMITS,
            Command::SetBatteryCutoff { .. } => COMM_SET_BATTERY_CUT,
            Command::SetParked(true) => COMM_PARK_MODE,
            Command::SetParked(false) => COMM_PARK_UNLOCK,
            Command::GetParkedStatus => COMM_GET_PARKED_STATUS,
        }
    }

    /// Encode the request payload: command id followed by packed parameters.
    pub fn encode(&self) -> Vec<u8> {
        let mut payload = vec![self.id()];
        match *self {
            Command::SetDutyCycle(duty) => {
                let duty = duty.clamp(0.0, 1.0);
                payload.extend_from_slice(&duty.to_be_bytes());
            }
            Command::SetCurrent(value)
            | Command::SetCurrentBrake(value)
            | Command::SetRpm(value) => {
                payload.extend_from_slice(&value.to_be_bytes());
            }
            Command::SetMotorLimits {
                motor_a,
                battery_a,
                field_weakening_a,
            } => {
                payload.extend_from_slice(&motor_a.to_be_bytes());
                payload.extend_from_slice(&battery_a.to_be_bytes());
                payload.extend_from_slice(&field_weakening_a.to_be_bytes());
                // Reserved fourth slot; the firmware expects it present.
                payload.extend_from_slice(&0.0f32.to_be_bytes());
            }
            Command::SetBatteryCutoff { start_v, end_v } => {
                payload.extend_from_slice(&start_v.to_be_bytes());
                payload.extend_from_slice(&end_v.to_be_bytes());
            }
            Command::GetValues
            | Command::GetAdcValues
            | Command::GetFirmwareVersion
            | Command::SetParked(_)
            | Command::GetParkedStatus => {}
        }
        payload
    }

    /// Verify the command-id echo and return the response body that follows.
    pub fn check_response<'a>(&self, response: &'a [u8]) -> Result<&'a [u8]> {
        let first = *response.first().ok_or(VescError::EmptyResponse)?;
        if first != self.id() {
            return Err(VescError::UnexpectedResponse {
                expected: self.id(),
                actual: first,
            });
        }
        Ok(&response[1..])
    }
}
