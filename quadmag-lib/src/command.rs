//! Outbound command frames.
//!
//! Every command is a fixed 10-byte frame: a 1-byte opcode followed by 9
//! payload bytes, zero-padded when unused, big-endian multi-byte fields.

use crate::error::QmError;
use modular_bitfield::prelude::*;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use strum_macros::Display;

/// Total length of every outbound command frame.
pub const COMMAND_LEN: usize = 10;

/// Opcode byte of each outbound command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum Opcode {
    SetMagConfig = 1,
    SetImuConfig = 2,
    GetMagConfig = 3,
    GetImuConfig = 4,
    SingleMeasurement = 5,
    ContinuousMeasurement = 6,
    SendAvailable = 7,
    StopAll = 8,
}

fn field_index<T>(field: &'static str, limit: u8, value: u8) -> Result<T, QmError>
where
    T: TryFromPrimitive<Primitive = u8>,
{
    T::try_from_primitive(value).map_err(|_| QmError::InvalidFieldIndex { field, value, limit })
}

/// Magnetometer sample-rate register selector (TMRC). Fourteen discrete
/// frequencies; the register index doubles as the wire byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Default, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum Tmrc {
    #[default]
    #[strum(to_string = "600 Hz")]
    Hz600 = 0x00,
    #[strum(to_string = "300 Hz")]
    Hz300 = 0x01,
    #[strum(to_string = "150 Hz")]
    Hz150 = 0x02,
    #[strum(to_string = "75 Hz")]
    Hz75 = 0x03,
    #[strum(to_string = "37 Hz")]
    Hz37 = 0x04,
    #[strum(to_string = "18 Hz")]
    Hz18 = 0x05,
    #[strum(to_string = "9 Hz")]
    Hz9 = 0x06,
    #[strum(to_string = "4.5 Hz")]
    Hz4_5 = 0x07,
    #[strum(to_string = "2.3 Hz")]
    Hz2_3 = 0x08,
    #[strum(to_string = "1.2 Hz")]
    Hz1_2 = 0x09,
    #[strum(to_string = "0.6 Hz")]
    Hz0_6 = 0x0A,
    #[strum(to_string = "0.3 Hz")]
    Hz0_3 = 0x0B,
    #[strum(to_string = "0.15 Hz")]
    Hz0_15 = 0x0C,
    #[strum(to_string = "0.075 Hz")]
    Hz0_075 = 0x0D,
}

impl Tmrc {
    pub fn from_index(value: u8) -> Result<Self, QmError> {
        field_index("TMRC", 13, value)
    }

    /// Sample rate in Hz selected by this register value.
    pub fn as_hz(&self) -> f64 {
        match self {
            Tmrc::Hz600 => 600.0,
            Tmrc::Hz300 => 300.0,
            Tmrc::Hz150 => 150.0,
            Tmrc::Hz75 => 75.0,
            Tmrc::Hz37 => 37.0,
            Tmrc::Hz18 => 18.0,
            Tmrc::Hz9 => 9.0,
            Tmrc::Hz4_5 => 4.5,
            Tmrc::Hz2_3 => 2.3,
            Tmrc::Hz1_2 => 1.2,
            Tmrc::Hz0_6 => 0.6,
            Tmrc::Hz0_3 => 0.3,
            Tmrc::Hz0_15 => 0.15,
            Tmrc::Hz0_075 => 0.075,
        }
    }
}

/// Magnetometer configuration: internal averaging cycle count plus the TMRC
/// sample-rate selector. Six trailing payload bytes stay zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MagConfig {
    pub cycle_count: u16,
    pub tmrc: Tmrc,
}

impl Default for MagConfig {
    fn default() -> Self {
        Self {
            cycle_count: 200,
            tmrc: Tmrc::Hz600,
        }
    }
}

impl MagConfig {
    pub(crate) fn payload(&self) -> [u8; COMMAND_LEN - 1] {
        let mut payload = [0u8; COMMAND_LEN - 1];
        payload[0..2].copy_from_slice(&self.cycle_count.to_be_bytes());
        payload[2] = self.tmrc.into();
        payload
    }
}

/// Accelerometer output data rate. Wire byte is the index plus one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Default, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum AccOdr {
    #[strum(to_string = "0.78125 Hz")]
    Hz0_78125 = 0,
    #[strum(to_string = "1.5625 Hz")]
    Hz1_5625 = 1,
    #[strum(to_string = "3.125 Hz")]
    Hz3_125 = 2,
    #[strum(to_string = "6.25 Hz")]
    Hz6_25 = 3,
    #[strum(to_string = "12.5 Hz")]
    Hz12_5 = 4,
    #[strum(to_string = "25 Hz")]
    Hz25 = 5,
    #[strum(to_string = "50 Hz")]
    Hz50 = 6,
    #[strum(to_string = "100 Hz")]
    Hz100 = 7,
    #[strum(to_string = "200 Hz")]
    Hz200 = 8,
    #[strum(to_string = "400 Hz")]
    Hz400 = 9,
    #[strum(to_string = "800 Hz")]
    Hz800 = 10,
    #[default]
    #[strum(to_string = "1600 Hz")]
    Hz1600 = 11,
}

impl AccOdr {
    pub fn from_index(value: u8) -> Result<Self, QmError> {
        field_index("accelerometer ODR", 11, value)
    }

    pub fn wire_value(self) -> u8 {
        self as u8 + 1
    }
}

/// Accelerometer bandwidth parameter (internal filter averaging).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Default, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum AccBwp {
    Osr4Avg1 = 0,
    Osr2Avg2 = 1,
    #[default]
    NormAvg4 = 2,
    CicAvg8 = 3,
    ResAvg16 = 4,
    ResAvg32 = 5,
    ResAvg64 = 6,
    ResAvg128 = 7,
}

impl AccBwp {
    pub fn from_index(value: u8) -> Result<Self, QmError> {
        field_index("accelerometer BWP", 7, value)
    }
}

/// Accelerometer filter performance mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Default, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum AccFilterPerf {
    UltraLowPower = 0,
    #[default]
    HighPerformance = 1,
}

impl AccFilterPerf {
    pub fn from_index(value: u8) -> Result<Self, QmError> {
        field_index("accelerometer filter performance", 1, value)
    }
}

/// Accelerometer measurement range. The index feeds the gain formula.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Default, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum AccRange {
    #[strum(to_string = "±2g")]
    G2 = 0,
    #[default]
    #[strum(to_string = "±4g")]
    G4 = 1,
    #[strum(to_string = "±8g")]
    G8 = 2,
    #[strum(to_string = "±16g")]
    G16 = 3,
}

impl AccRange {
    pub fn from_index(value: u8) -> Result<Self, QmError> {
        field_index("accelerometer range", 3, value)
    }
}

/// Gyroscope output data rate. Wire byte is the index plus six.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Default, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum GyrOdr {
    #[strum(to_string = "25 Hz")]
    Hz25 = 0,
    #[strum(to_string = "50 Hz")]
    Hz50 = 1,
    #[strum(to_string = "100 Hz")]
    Hz100 = 2,
    #[strum(to_string = "200 Hz")]
    Hz200 = 3,
    #[strum(to_string = "400 Hz")]
    Hz400 = 4,
    #[strum(to_string = "800 Hz")]
    Hz800 = 5,
    #[default]
    #[strum(to_string = "1600 Hz")]
    Hz1600 = 6,
    #[strum(to_string = "3200 Hz")]
    Hz3200 = 7,
}

impl GyrOdr {
    pub fn from_index(value: u8) -> Result<Self, QmError> {
        field_index("gyroscope ODR", 7, value)
    }

    pub fn wire_value(self) -> u8 {
        self as u8 + 6
    }
}

/// Gyroscope bandwidth parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Default, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum GyrBwp {
    Osr4 = 0,
    Osr2 = 1,
    #[default]
    Norm = 2,
}

impl GyrBwp {
    pub fn from_index(value: u8) -> Result<Self, QmError> {
        field_index("gyroscope BWP", 2, value)
    }
}

/// Gyroscope noise performance mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Default, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum GyrNoisePerf {
    UltraLowPower = 0,
    #[default]
    HighPerformance = 1,
}

impl GyrNoisePerf {
    pub fn from_index(value: u8) -> Result<Self, QmError> {
        field_index("gyroscope noise performance", 1, value)
    }
}

/// Gyroscope filter performance mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Default, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum GyrFilterPerf {
    UltraLowPower = 0,
    #[default]
    HighPerformance = 1,
}

impl GyrFilterPerf {
    pub fn from_index(value: u8) -> Result<Self, QmError> {
        field_index("gyroscope filter performance", 1, value)
    }
}

/// Gyroscope measurement range. The index feeds the gain formula.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Default, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum GyrRange {
    #[default]
    #[strum(to_string = "±2000 dps")]
    Dps2000 = 0,
    #[strum(to_string = "±1000 dps")]
    Dps1000 = 1,
    #[strum(to_string = "±500 dps")]
    Dps500 = 2,
    #[strum(to_string = "±250 dps")]
    Dps250 = 3,
    #[strum(to_string = "±125 dps")]
    Dps125 = 4,
}

impl GyrRange {
    pub fn from_index(value: u8) -> Result<Self, QmError> {
        field_index("gyroscope range", 4, value)
    }
}

/// IMU configuration: nine 1-byte fields in wire order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ImuConfig {
    pub acc_odr: AccOdr,
    pub acc_bwp: AccBwp,
    pub acc_filter_perf: AccFilterPerf,
    pub acc_range: AccRange,
    pub gyr_odr: GyrOdr,
    pub gyr_bwp: GyrBwp,
    pub gyr_noise_perf: GyrNoisePerf,
    pub gyr_filter_perf: GyrFilterPerf,
    pub gyr_range: GyrRange,
}

impl ImuConfig {
    pub(crate) fn payload(&self) -> [u8; COMMAND_LEN - 1] {
        [
            self.acc_odr.wire_value(),
            self.acc_bwp.into(),
            self.acc_filter_perf.into(),
            self.acc_range.into(),
            self.gyr_odr.wire_value(),
            self.gyr_bwp.into(),
            self.gyr_noise_perf.into(),
            self.gyr_filter_perf.into(),
            self.gyr_range.into(),
        ]
    }
}

/// Per-magnetometer enable mask, one bit per sensor in the low nibble.
#[bitfield(bytes = 1)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MagMask {
    pub mag1: bool,
    pub mag2: bool,
    pub mag3: bool,
    pub mag4: bool,
    #[skip]
    unused: B4,
}

impl MagMask {
    /// All four magnetometers enabled — the board's default.
    pub fn all_enabled() -> Self {
        Self::new()
            .with_mag1(true)
            .with_mag2(true)
            .with_mag3(true)
            .with_mag4(true)
    }

    pub fn as_byte(self) -> u8 {
        self.into_bytes()[0]
    }

    /// Clear the enable bit for a 1-based sensor number.
    pub fn disable(self, sensor: u8) -> Result<Self, QmError> {
        match sensor {
            1 => Ok(self.with_mag1(false)),
            2 => Ok(self.with_mag2(false)),
            3 => Ok(self.with_mag3(false)),
            4 => Ok(self.with_mag4(false)),
            _ => Err(QmError::InvalidFieldIndex {
                field: "magnetometer number",
                value: sensor,
                limit: 4,
            }),
        }
    }
}

/// Parameters of a continuous measurement request.
///
/// The board defines "averaged" as one record per second, so the encoded
/// sample rate is forced to 1 Hz in that mode regardless of what the caller
/// asked for.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContinuousParams {
    pub averaged: bool,
    pub sample_rate_hz: u8,
    pub duration_minutes: f64,
}

impl ContinuousParams {
    pub fn effective_rate_hz(&self) -> u8 {
        if self.averaged { 1 } else { self.sample_rate_hz }
    }

    pub fn duration_seconds(&self) -> u64 {
        (self.duration_minutes * 60.0).round() as u64
    }

    /// Record count the board should deliver over the full run. Reported at
    /// session end, never enforced.
    pub fn expected_records(&self) -> u64 {
        self.duration_seconds() * u64::from(self.effective_rate_hz())
    }
}

/// A fully-specified outbound command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    SetMagConfig(MagConfig),
    SetImuConfig(ImuConfig),
    GetMagConfig,
    GetImuConfig,
    SingleMeasurement {
        mask: MagMask,
    },
    ContinuousMeasurement {
        params: ContinuousParams,
        mask: MagMask,
    },
    SendAvailable,
    StopAll,
}

impl Command {
    pub fn opcode(&self) -> Opcode {
        match self {
            Command::SetMagConfig(_) => Opcode::SetMagConfig,
            Command::SetImuConfig(_) => Opcode::SetImuConfig,
            Command::GetMagConfig => Opcode::GetMagConfig,
            Command::GetImuConfig => Opcode::GetImuConfig,
            Command::SingleMeasurement { .. } => Opcode::SingleMeasurement,
            Command::ContinuousMeasurement { .. } => Opcode::ContinuousMeasurement,
            Command::SendAvailable => Opcode::SendAvailable,
            Command::StopAll => Opcode::StopAll,
        }
    }

    /// Encode into the fixed 10-byte wire frame.
    pub fn encode(&self) -> [u8; COMMAND_LEN] {
        let mut frame = [0u8; COMMAND_LEN];
        frame[0] = self.opcode().into();
        match self {
            Command::SetMagConfig(cfg) => frame[1..].copy_from_slice(&cfg.payload()),
            Command::SetImuConfig(cfg) => frame[1..].copy_from_slice(&cfg.payload()),
            Command::SingleMeasurement { mask } => frame[1] = mask.as_byte(),
            Command::ContinuousMeasurement { params, mask } => {
                frame[1] = params.averaged as u8;
                frame[2] = params.effective_rate_hz();
                frame[3] = mask.as_byte();
                // 6-byte big-endian duration in whole seconds
                frame[4..10].copy_from_slice(&params.duration_seconds().to_be_bytes()[2..8]);
            }
            Command::GetMagConfig
            | Command::GetImuConfig
            | Command::SendAvailable
            | Command::StopAll => {}
        }
        frame
    }
}
