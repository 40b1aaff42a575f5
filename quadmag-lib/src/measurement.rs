//! Decoded measurement records and their CSV row layout.

use crate::codec::{be_u16, be_u24, be_u32};
use crate::error::QmError;
use crate::frame::PacketFlag;
use serde::{Deserialize, Serialize};
use std::fmt::Write;

/// Ticks of the fractional timestamp counter per second.
pub const TICKS_PER_SECOND: f64 = 32768.0;

const TIMESTAMP_LEN: usize = 6;
const MAG_WORD_LEN: usize = 3;
const IMU_WORD_LEN: usize = 2;
const AXES: usize = 3;

/// One accelerometer + gyroscope sample, raw 16-bit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImuSample {
    pub acc: [u16; AXES],
    pub gyr: [u16; AXES],
}

/// A decoded measurement frame.
///
/// Sensor words are kept in LSB form (raw codes); gain conversion to
/// physical units happens downstream once the echoed configuration is known.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementRecord {
    pub flag: PacketFlag,
    /// Whole seconds of the board's timestamp counter.
    pub seconds: u32,
    /// Fractional part, in 1/32768 s ticks.
    pub ticks: u16,
    /// One x/y/z triplet of raw 24-bit codes per reporting magnetometer.
    pub mag: Vec<[u32; AXES]>,
    pub imu: Option<ImuSample>,
    pub temperature: Option<u16>,
}

impl MeasurementRecord {
    /// Decode the data portion of a frame (checksum already stripped and
    /// verified by the frame reader).
    pub fn from_payload(flag: PacketFlag, data: &[u8]) -> Result<Self, QmError> {
        let expected = flag.data_len().ok_or_else(|| {
            QmError::Protocol(format!("{flag:?} does not carry measurement data"))
        })?;
        if data.len() != expected {
            return Err(QmError::Protocol(format!(
                "{flag:?} payload is {} bytes, expected {expected}",
                data.len()
            )));
        }

        let seconds = be_u32(&data[0..4]);
        let ticks = be_u16(&data[4..6]);
        let mut offset = TIMESTAMP_LEN;

        let mut mag = Vec::with_capacity(flag.mag_sensor_count());
        for _ in 0..flag.mag_sensor_count() {
            let mut triplet = [0u32; AXES];
            for axis in &mut triplet {
                *axis = be_u24(&data[offset..offset + MAG_WORD_LEN]);
                offset += MAG_WORD_LEN;
            }
            mag.push(triplet);
        }

        let imu = if flag.has_imu() {
            let mut words = [0u16; 2 * AXES];
            for word in &mut words {
                *word = be_u16(&data[offset..offset + IMU_WORD_LEN]);
                offset += IMU_WORD_LEN;
            }
            Some(ImuSample {
                acc: [words[0], words[1], words[2]],
                gyr: [words[3], words[4], words[5]],
            })
        } else {
            None
        };

        let temperature = if flag.has_temperature() {
            let raw = be_u16(&data[offset..offset + IMU_WORD_LEN]);
            Some(raw)
        } else {
            None
        };

        Ok(Self {
            flag,
            seconds,
            ticks,
            mag,
            imu,
            temperature,
        })
    }

    /// Timestamp as seconds, fractional ticks folded in.
    pub fn timestamp_seconds(&self) -> f64 {
        f64::from(self.seconds) + f64::from(self.ticks) / TICKS_PER_SECOND
    }

    /// The CSV row for this record: measurement index, combined timestamp,
    /// then every sensor word as a decimal LSB code. Optional columns appear
    /// only when the packet flag carried them.
    pub fn csv_row(&self, index: u64) -> String {
        let mut row = String::new();
        let _ = write!(row, "{index},{:.6}", self.timestamp_seconds());
        for triplet in &self.mag {
            for axis in triplet {
                let _ = write!(row, ",{axis}");
            }
        }
        if let Some(imu) = &self.imu {
            for word in imu.acc.iter().chain(imu.gyr.iter()) {
                let _ = write!(row, ",{word}");
            }
        }
        if let Some(temp) = self.temperature {
            let _ = write!(row, ",{temp}");
        }
        row
    }
}

/// Column header matching [`MeasurementRecord::csv_row`] for a given flag.
pub fn csv_header(flag: PacketFlag) -> String {
    let mut header = String::from("meas_num,timestamp_s");
    for sensor in 1..=flag.mag_sensor_count() {
        for axis in ["x", "y", "z"] {
            let _ = write!(header, ",mag{sensor}_{axis}");
        }
    }
    if flag.has_imu() {
        header.push_str(",acc_x,acc_y,acc_z,gyr_x,gyr_y,gyr_z");
    }
    if flag.has_temperature() {
        header.push_str(",temp");
    }
    header
}
