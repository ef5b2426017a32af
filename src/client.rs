//! High-level device operations.
//!
//! [`VescClient`] is the typed face of the device: one method per catalog
//! command, each routed through the link dispatcher and validated against
//! the command-id echo before its body is interpreted.

use tracing::{debug, info};

use crate::command::Command;
use crate::dispatcher::Dispatcher;
use crate::error::{Result, VescError};
use crate::telemetry::{RawValues, TelemetrySnapshot};

/// Firmware version reported when the version exchange fails.
const UNKNOWN_FIRMWARE: &str = "unknown";

/// Typed operations on the VESC, sharing one dispatcher.
#[derive(Clone)]
pub struct VescClient {
    dispatcher: Dispatcher,
}

impl VescClient {
    /// Wrap a dispatcher handle.
    pub fn new(dispatcher: Dispatcher) -> Self {
        VescClient { dispatcher }
    }

    /// Run one command exchange and return the validated response body.
    async fn run(&self, command: Command) -> Result<Vec<u8>> {
        let response = self.dispatcher.exchange(command.encode()).await?;
        command.check_response(&response).map(<[u8]>::to_vec)
    }

    /// Poll the device for one coherent telemetry snapshot.
    ///
    /// Issues the four sub-exchanges as a single uninterrupted batch.
    /// `GET_VALUES` and `GET_ADC_VALUES` failures fail the whole poll (no
    /// partial snapshot); a missing park status degrades to `null` and a
    /// missing firmware version to `"unknown"`.
    pub async fn poll_snapshot(&self) -> Result<TelemetrySnapshot> {
        let commands = [
            Command::GetValues,
            Command::GetAdcValues,
            Command::GetParkedStatus,
            Command::GetFirmwareVersion,
        ];
        let payloads = commands.iter().map(Command::encode).collect();
        let mut responses = self.dispatcher.exchange_batch(payloads).await?;
        debug_assert_eq!(responses.len(), commands.len());

        // Pop in reverse so each response pairs with its command.
        let fw_response = responses.pop().unwrap_or(Err(VescError::DispatcherClosed));
        let parked_response = responses.pop().unwrap_or(Err(VescError::DispatcherClosed));
        let adc_response = responses.pop().unwrap_or(Err(VescError::DispatcherClosed));
        let values_response = responses.pop().unwrap_or(Err(VescError::DispatcherClosed));

        let values_body = Command::GetValues.check_response(&values_response?)?.to_vec();
        let values = RawValues::decode(&values_body)?;

        let adc_body = Command::GetAdcValues.check_response(&adc_response?)?.to_vec();
        let adc = decode_adc(&adc_body)?;

        let is_parked = parked_response
            .ok()
            .and_then(|r| Command::GetParkedStatus.check_response(&r).ok().map(<[u8]>::to_vec))
            .and_then(|body| decode_parked(&body).ok());

        let firmware = fw_response
            .ok()
            .and_then(|r| {
                Command::GetFirmwareVersion
                    .check_response(&r)
                    .ok()
                    .map(<[u8]>::to_vec)
            })
            .and_then(|body| decode_firmware(&body).ok())
            .unwrap_or_else(|| UNKNOWN_FIRMWARE.to_string());

        Ok(TelemetrySnapshot::compose(values, adc, is_parked, firmware))
    }

    /// Query the park lock state from the device.
    pub async fn parked_status(&self) -> Result<bool> {
        let body = self.run(Command::GetParkedStatus).await?;
        decode_parked(&body)
    }

    /// Engage or release the park lock.
    ///
    /// The device is authoritative for the lock state: callers should
    /// confirm with [`Self::parked_status`] afterwards rather than assume
    /// the optimistic result.
    pub async fn set_parked(&self, parked: bool) -> Result<()> {
        self.run(Command::SetParked(parked)).await?;
        info!(parked, "park command acknowledged");
        Ok(())
    }

    /// Query the firmware version string.
    pub async fn firmware_version(&self) -> Result<String> {
        let body = self.run(Command::GetFirmwareVersion).await?;
        decode_firmware(&body)
    }

    /// Set the motor duty cycle (clamped to 0.0..=1.0).
    pub async fn set_duty_cycle(&self, duty: f32) -> Result<()> {
        self.run(Command::SetDutyCycle(duty)).await?;
        debug!(duty, "duty cycle set");
        Ok(())
    }

    /// Set the motor current in amps.
    pub async fn set_current(&self, amps: f32) -> Result<()> {
        self.run(Command::SetCurrent(amps)).await?;
        debug!(amps, "motor current set");
        Ok(())
    }

    /// Set the braking current in amps.
    pub async fn set_current_brake(&self, amps: f32) -> Result<()> {
        self.run(Command::SetCurrentBrake(amps)).await?;
        debug!(amps, "brake current set");
        Ok(())
    }

    /// Set the motor speed in RPM.
    pub async fn set_rpm(&self, rpm: f32) -> Result<()> {
        self.run(Command::SetRpm(rpm)).await?;
        debug!(rpm, "rpm set");
        Ok(())
    }

    /// Set motor, battery and field-weakening current limits.
    ///
    /// The device echoes the limits it actually applied; they are logged for
    /// comparison, and a matching command id counts as success.
    pub async fn set_motor_limits(
        &self,
        motor_a: f32,
        battery_a: f32,
        field_weakening_a: f32,
    ) -> Result<()> {
        let body = self
            .run(Command::SetMotorLimits {
                motor_a,
                battery_a,
                field_weakening_a,
            })
            .await?;

        if body.len() >= 12 {
            let applied_motor = f32::from_be_bytes([body[0], body[1], body[2], body[3]]);
            let applied_battery = f32::from_be_bytes([body[4], body[5], body[6], body[7]]);
            let applied_fw = f32::from_be_bytes([body[8], body[9], body[10], body[11]]);
            info!(
                motor_a = applied_motor,
                battery_a = applied_battery,
                field_weakening_a = applied_fw,
                "device applied motor limits"
            );
        }
        Ok(())
    }

    /// Set the battery cutoff thresholds.
    pub async fn set_battery_cutoff(&self, start_v: f32, end_v: f32) -> Result<()> {
        self.run(Command::SetBatteryCutoff { start_v, end_v }).await?;
        info!(start_v, end_v, "battery cutoff set");
        Ok(())
    }
}

fn decode_adc(body: &[u8]) -> Result<(u8, u8)> {
    if body.len() < 2 {
        return Err(VescError::Truncated {
            needed: 2,
            got: body.len(),
        });
    }
    Ok((body[0], body[1]))
}

fn decode_parked(body: &[u8]) -> Result<bool> {
    let flag = *body.first().ok_or(VescError::Truncated { needed: 1, got: 0 })?;
    Ok(flag != 0)
}

fn decode_firmware(body: &[u8]) -> Result<String> {
    if body.len() < 2 {
        return Err(VescError::Truncated {
            needed: 2,
            got: body.len(),
        });
    }
    Ok(format!("{}.{}", body[0], body[1]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn firmware_formats_major_minor() {
        assert_eq!(decode_firmware(&[5, 2]).unwrap(), "5.2");
        assert!(matches!(
            decode_firmware(&[5]).unwrap_err(),
            VescError::Truncated { .. }
        ));
    }

    #[test]
    fn parked_flag_decodes_as_bool() {
        assert!(decode_parked(&[1]).unwrap());
        assert!(!decode_parked(&[0]).unwrap());
        assert!(decode_parked(&[]).is_err());
    }

    #[test]
    fn adc_needs_two_channels() {
        assert_eq!(decode_adc(&[12, 34]).unwrap(), (12, 34));
        assert!(decode_adc(&[12]).is_err());
    }
}
