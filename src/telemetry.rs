//! Telemetry decoding.
//!
//! A `GET_VALUES` response body is a fixed sequence of big-endian fixed-point
//! fields; [`RawValues::decode`] applies the per-field scale and offset. The
//! auxiliary ADC channels, park state and firmware version come from their
//! own exchanges and are merged into one [`TelemetrySnapshot`] per poll.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, VescError};

/// Raw duty cycle of 1.0 is reported as 0.9: deliberate headroom policy
/// carried over from the deployed calibration, not a protocol constant.
pub const DUTY_CYCLE_SCALE: f32 = 0.9;

/// Fixed calibration offset added to the decoded input voltage.
pub const V_IN_OFFSET: f32 = 0.5;

/// One coherent set of decoded readings from the device.
///
/// Constructed fresh on every successful poll, never mutated, superseded by
/// the next snapshot. Serializes with the field names the observer protocol
/// has always used.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    /// Capture time of this poll
    pub timestamp: DateTime<Utc>,
    /// MOSFET temperature in °C
    pub temp_mosfet: f32,
    /// Motor temperature in °C
    pub temp_motor: f32,
    /// Motor current in A
    pub current_motor: f32,
    /// Battery current in A
    pub current_battery: f32,
    /// D-axis current in A
    pub id: f32,
    /// Q-axis current in A
    pub iq: f32,
    /// Duty cycle as a fraction, capped at 0.9
    pub duty_cycle: f32,
    /// Motor speed in RPM, signed
    pub rpm: i32,
    /// Input voltage in V (calibration offset applied)
    pub v_in: f32,
    /// Amp-hours consumed
    pub amp_hours: f32,
    /// Amp-hours charged
    pub amp_hours_charged: f32,
    /// Watt-hours consumed
    pub watt_hours: f32,
    /// Watt-hours charged
    pub watt_hours_charged: f32,
    /// Tachometer count
    pub tachometer: i32,
    /// Absolute tachometer count
    pub tachometer_abs: i32,
    /// Auxiliary ADC channel 1, unscaled as the firmware reports it
    pub adc1: f32,
    /// Auxiliary ADC channel 2, unscaled as the firmware reports it
    pub adc2: f32,
    /// Park lock state; `None` when the status exchange failed this poll
    #[serde(rename = "isParked")]
    pub is_parked: Option<bool>,
    /// Firmware version string, `"unknown"` when unavailable
    #[serde(rename = "vesc_fw")]
    pub firmware: String,
}

impl TelemetrySnapshot {
    /// Merge the results of the poll's sub-exchanges into one snapshot.
    pub fn compose(
        values: RawValues,
        adc: (u8, u8),
        is_parked: Option<bool>,
        firmware: String,
    ) -> Self {
        TelemetrySnapshot {
            timestamp: Utc::now(),
            temp_mosfet: values.temp_mosfet,
            temp_motor: values.temp_motor,
            current_motor: values.current_motor,
            current_battery: values.current_battery,
            id: values.id,
            iq: values.iq,
            duty_cycle: values.duty_cycle,
            rpm: values.rpm,
            v_in: values.v_in,
            amp_hours: values.amp_hours,
            amp_hours_charged: values.amp_hours_charged,
            watt_hours: values.watt_hours,
            watt_hours_charged: values.watt_hours_charged,
            tachometer: values.tachometer,
            tachometer_abs: values.tachometer_abs,
            adc1: f32::from(adc.0),
            adc2: f32::from(adc.1),
            is_parked,
            firmware,
        }
    }

    /// Ground speed in km/h for a given wheel and drive ratio.
    ///
    /// RPM below 1000 reads as standstill to filter idle jitter.
    pub fn speed_kmh(&self, wheel_circumference_m: f32, gear_ratio: f32) -> f32 {
        if self.rpm.abs() < 1000 {
            return 0.0;
        }
        let meters_per_minute = (self.rpm as f32 * wheel_circumference_m) / gear_ratio;
        let kmh = meters_per_minute * 60.0 / 1000.0;
        (kmh * 100.0).round() / 100.0
    }

    /// Battery current as a percentage of the configured maximum, 0–100.
    pub fn throttle_percentage(&self, max_current: f32) -> f32 {
        let raw = (self.current_battery / max_current) * 100.0;
        raw.clamp(0.0, 100.0)
    }
}

/// The fifteen fixed fields of a `GET_VALUES` response body.
#[derive(Debug, Clone, PartialEq)]
pub struct RawValues {
    pub temp_mosfet: f32,
    pub temp_motor: f32,
    pub current_motor: f32,
    pub current_battery: f32,
    pub id: f32,
    pub iq: f32,
    pub duty_cycle: f32,
    pub rpm: i32,
    pub v_in: f32,
    pub amp_hours: f32,
    pub amp_hours_charged: f32,
    pub watt_hours: f32,
    pub watt_hours_charged: f32,
    pub tachometer: i32,
    pub tachometer_abs: i32,
}

impl RawValues {
    /// Decode the fixed layout from the bytes following the command id.
    ///
    /// A buffer shorter than the layout fails with
    /// [`VescError::Truncated`]; no partial result is produced.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut fields = FieldReader::new(data);

        let temp_mosfet = fields.i16()? as f32 / 10.0;
        let temp_motor = fields.i16()? as f32 / 10.0;
        let current_motor = fields.i32()? as f32 / 100.0;
        let current_battery = fields.i32()? as f32 / 100.0;
        let id = fields.i32()? as f32 / 100.0;
        let iq = fields.i32()? as f32 / 100.0;
        let duty_raw = fields.i16()? as f32 / 1000.0;
        let duty_cycle = duty_raw.min(1.0) * DUTY_CYCLE_SCALE;
        let rpm = fields.i32()?;
        let v_in = fields.i16()? as f32 / 10.0 + V_IN_OFFSET;
        let amp_hours = fields.i32()? as f32 / 1000.0;
        let amp_hours_charged = fields.i32()? as f32 / 1000.0;
        let watt_hours = fields.i32()? as f32 / 10_000.0;
        let watt_hours_charged = fields.i32()? as f32 / 10_000.0;
        let tachometer = fields.i32()?;
        let tachometer_abs = fields.i32()?;

        Ok(RawValues {
            temp_mosfet,
            temp_motor,
            current_motor,
            current_battery,
            id,
            iq,
            duty_cycle,
            rpm,
            v_in,
            amp_hours,
            amp_hours_charged,
            watt_hours,
            watt_hours_charged,
            tachometer,
            tachometer_abs,
        })
    }
}

/// Sequential big-endian field reader over a response body.
struct FieldReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> FieldReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        FieldReader { data, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.pos + n > self.data.len() {
            return Err(VescError::Truncated {
                needed: self.pos + n,
                got: self.data.len(),
            });
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn i16(&mut self) -> Result<i16> {
        let bytes = self.take(2)?;
        Ok(i16::from_be_bytes([bytes[0], bytes[1]]))
    }

    fn i32(&mut self) -> Result<i32> {
        let bytes = self.take(4)?;
        Ok(i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }
}
