//! Gain derivation and raw-code to physical-unit conversion.
//!
//! Gains come from the *echoed* configuration, not the one the caller asked
//! for: the board's acknowledgment is the authority on what the sensors are
//! actually running.

use crate::codec::{be_u16, decode_twos_complement};
use crate::command::{ImuConfig, MagConfig};
use crate::frame::{IMU_CONFIG_ECHO_LEN, MAG_CONFIG_ECHO_LEN};
use serde::{Deserialize, Serialize};

const MAG_WORD_BITS: u8 = 24;
const IMU_WORD_BITS: u8 = 16;

/// Magnetometer gain in nT per LSB for a given cycle count.
pub fn mag_gain(cycle_count: u16) -> f64 {
    1000.0 / (0.3671 * f64::from(cycle_count) + 1.5)
}

/// Accelerometer sensitivity in LSB per g for a range index.
pub fn acc_gain(range_index: u8) -> f64 {
    2f64.powi(-i32::from(range_index)) * 16384.0
}

/// Gyroscope sensitivity in LSB per dps for a range index.
pub fn gyr_gain(range_index: u8) -> f64 {
    2f64.powi(-i32::from(range_index)) * 262.1
}

/// Temperature sensor code to degrees Celsius, one-decimal resolution.
pub fn temperature_celsius(raw: u16) -> f64 {
    f64::from(((i32::from(raw) * 2500) >> 12) - 500) / 10.0
}

/// Conversion factors for one acquisition run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Gains {
    /// nT per LSB; multiplied onto decoded magnetometer words.
    pub mag_nt_per_lsb: f64,
    /// LSB per g; decoded accelerometer words are divided by this.
    pub acc_lsb_per_g: Option<f64>,
    /// LSB per dps; decoded gyroscope words are divided by this.
    pub gyr_lsb_per_dps: Option<f64>,
}

impl Gains {
    pub fn from_configs(mag: &MagConfig, imu: Option<&ImuConfig>) -> Self {
        Self {
            mag_nt_per_lsb: mag_gain(mag.cycle_count),
            acc_lsb_per_g: imu.map(|cfg| acc_gain(cfg.acc_range.into())),
            gyr_lsb_per_dps: imu.map(|cfg| gyr_gain(cfg.gyr_range.into())),
        }
    }

    /// Derive gains from the raw echo bytes the board acknowledged with:
    /// cycle count in the first two magnetometer-echo bytes, range indices
    /// at their fixed offsets in the IMU echo.
    pub fn from_echoes(
        mag_echo: &[u8; MAG_CONFIG_ECHO_LEN],
        imu_echo: Option<&[u8; IMU_CONFIG_ECHO_LEN]>,
    ) -> Self {
        Self {
            mag_nt_per_lsb: mag_gain(be_u16(&mag_echo[0..2])),
            acc_lsb_per_g: imu_echo.map(|echo| acc_gain(echo[3])),
            gyr_lsb_per_dps: imu_echo.map(|echo| gyr_gain(echo[8])),
        }
    }

    /// Magnetometer word to nanotesla.
    pub fn mag_nanotesla(&self, raw: u32) -> f64 {
        f64::from(decode_twos_complement(raw, MAG_WORD_BITS)) * self.mag_nt_per_lsb
    }

    /// Accelerometer word to g, `None` when no IMU config was echoed.
    pub fn acc_g(&self, raw: u16) -> Option<f64> {
        self.acc_lsb_per_g
            .map(|gain| f64::from(decode_twos_complement(u32::from(raw), IMU_WORD_BITS)) / gain)
    }

    /// Gyroscope word to degrees per second.
    pub fn gyr_dps(&self, raw: u16) -> Option<f64> {
        self.gyr_lsb_per_dps
            .map(|gain| f64::from(decode_twos_complement(u32::from(raw), IMU_WORD_BITS)) / gain)
    }
}
