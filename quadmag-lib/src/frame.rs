//! Inbound frame classification and decoding.
//!
//! Every response starts with a 1-byte packet flag; the flag alone fixes how
//! many payload bytes follow. Data frames end with a 2-byte additive
//! checksum, config echoes carry none, and the completion marker is the flag
//! byte by itself.

use crate::codec::{self, CHECKSUM_LEN};
use crate::error::QmError;
use crate::measurement::MeasurementRecord;
use num_enum::{FromPrimitive, IntoPrimitive};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{self, Read};
use tracing::{trace, warn};

/// Payload bytes following the flag, per frame type.
pub const DEBUG_PAYLOAD_LEN: usize = 17;
pub const MAG_ONLY_PAYLOAD_LEN: usize = 44;
pub const ALL_SENSORS_PAYLOAD_LEN: usize = 58;
pub const MAG_TEMP_PAYLOAD_LEN: usize = 46;
pub const MAG_IMU_PAYLOAD_LEN: usize = 56;
pub const MAG_CONFIG_ECHO_LEN: usize = 3;
pub const IMU_CONFIG_ECHO_LEN: usize = 9;

/// 1-byte tag at the start of every inbound frame. Numbering is distinct
/// from the outbound opcode space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, FromPrimitive, Serialize, Deserialize)]
#[repr(u8)]
pub enum PacketFlag {
    Debug = 0x01,
    MagConfigEcho = 0x02,
    ImuConfigEcho = 0x03,
    MagOnly = 0x04,
    AllSensors = 0x05,
    MagAndTemp = 0x06,
    MagAndImu = 0x07,
    Complete = 0x0A,

    #[num_enum(catch_all)]
    Unknown(u8),
}

impl PacketFlag {
    /// Payload length following the flag byte, `None` for flags that carry
    /// nothing (Complete) or are unrecognized.
    pub fn payload_len(&self) -> Option<usize> {
        match self {
            PacketFlag::Debug => Some(DEBUG_PAYLOAD_LEN),
            PacketFlag::MagOnly => Some(MAG_ONLY_PAYLOAD_LEN),
            PacketFlag::AllSensors => Some(ALL_SENSORS_PAYLOAD_LEN),
            PacketFlag::MagAndTemp => Some(MAG_TEMP_PAYLOAD_LEN),
            PacketFlag::MagAndImu => Some(MAG_IMU_PAYLOAD_LEN),
            PacketFlag::MagConfigEcho => Some(MAG_CONFIG_ECHO_LEN),
            PacketFlag::ImuConfigEcho => Some(IMU_CONFIG_ECHO_LEN),
            PacketFlag::Complete | PacketFlag::Unknown(_) => None,
        }
    }

    /// True for the five checksummed measurement frame types.
    pub fn is_data(&self) -> bool {
        matches!(
            self,
            PacketFlag::Debug
                | PacketFlag::MagOnly
                | PacketFlag::AllSensors
                | PacketFlag::MagAndTemp
                | PacketFlag::MagAndImu
        )
    }

    /// Measurement bytes in the payload, checksum excluded.
    pub fn data_len(&self) -> Option<usize> {
        if self.is_data() {
            self.payload_len().map(|len| len - CHECKSUM_LEN)
        } else {
            None
        }
    }

    /// Magnetometer triplets present in a data frame. Debug frames report a
    /// single sensor, the rest all four.
    pub fn mag_sensor_count(&self) -> usize {
        match self {
            PacketFlag::Debug => 1,
            _ if self.is_data() => 4,
            _ => 0,
        }
    }

    pub fn has_imu(&self) -> bool {
        matches!(self, PacketFlag::AllSensors | PacketFlag::MagAndImu)
    }

    pub fn has_temperature(&self) -> bool {
        matches!(self, PacketFlag::AllSensors | PacketFlag::MagAndTemp)
    }
}

/// Why a frame was rejected. Counted by the session, never fatal on its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvalidFrame {
    ShortRead { expected: usize, actual: usize },
    ChecksumMismatch { declared: u16, computed: u32 },
    UnknownFlag(u8),
}

impl fmt::Display for InvalidFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvalidFrame::ShortRead { expected, actual } => {
                write!(f, "short read: {actual} of {expected} bytes")
            }
            InvalidFrame::ChecksumMismatch { declared, computed } => {
                write!(f, "checksum mismatch: declared {declared:#06x}, computed {computed:#x}")
            }
            InvalidFrame::UnknownFlag(flag) => write!(f, "unrecognized packet flag {flag:#04x}"),
        }
    }
}

/// One classified inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Completion marker: the flag byte alone, nothing else consumed.
    Complete,
    /// Raw magnetometer config echo, compared byte-for-byte against the
    /// command that was sent.
    MagConfigEcho([u8; MAG_CONFIG_ECHO_LEN]),
    /// Raw IMU config echo.
    ImuConfigEcho([u8; IMU_CONFIG_ECHO_LEN]),
    Data(MeasurementRecord),
    Invalid(InvalidFrame),
}

/// Fill `buf` from the reader, treating timeouts and end-of-stream as a
/// short read rather than an error. Returns how many bytes landed.
fn read_fully<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) => {
                break
            }
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Read and classify one frame from the byte stream.
///
/// Short reads, checksum failures, and unrecognized flags come back as
/// [`Frame::Invalid`]; only transport-level failures surface as errors.
pub fn read_frame<R: Read>(reader: &mut R) -> Result<Frame, QmError> {
    let mut flag_byte = [0u8; 1];
    if read_fully(reader, &mut flag_byte)? == 0 {
        return Ok(Frame::Invalid(InvalidFrame::ShortRead {
            expected: 1,
            actual: 0,
        }));
    }
    let flag = PacketFlag::from_primitive(flag_byte[0]);
    trace!(?flag, "packet flag received");

    match flag {
        PacketFlag::Complete => Ok(Frame::Complete),
        PacketFlag::MagConfigEcho => {
            let mut echo = [0u8; MAG_CONFIG_ECHO_LEN];
            match read_payload(reader, &mut echo)? {
                Some(invalid) => Ok(Frame::Invalid(invalid)),
                None => Ok(Frame::MagConfigEcho(echo)),
            }
        }
        PacketFlag::ImuConfigEcho => {
            let mut echo = [0u8; IMU_CONFIG_ECHO_LEN];
            match read_payload(reader, &mut echo)? {
                Some(invalid) => Ok(Frame::Invalid(invalid)),
                None => Ok(Frame::ImuConfigEcho(echo)),
            }
        }
        PacketFlag::Unknown(value) => {
            warn!(flag = value, "unrecognized packet flag");
            Ok(Frame::Invalid(InvalidFrame::UnknownFlag(value)))
        }
        data_flag => read_data_frame(reader, data_flag),
    }
}

fn read_payload<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<Option<InvalidFrame>, QmError> {
    let filled = read_fully(reader, buf)?;
    if filled < buf.len() {
        warn!(expected = buf.len(), actual = filled, "short frame payload");
        return Ok(Some(InvalidFrame::ShortRead {
            expected: buf.len(),
            actual: filled,
        }));
    }
    Ok(None)
}

fn read_data_frame<R: Read>(reader: &mut R, flag: PacketFlag) -> Result<Frame, QmError> {
    let len = match flag.payload_len() {
        Some(len) => len,
        None => return Ok(Frame::Invalid(InvalidFrame::UnknownFlag(flag.into()))),
    };
    let mut payload = vec![0u8; len];
    if let Some(invalid) = read_payload(reader, &mut payload)? {
        return Ok(Frame::Invalid(invalid));
    }

    if !codec::verify_checksum(&payload) {
        let declared = codec::be_u16(&payload[len - CHECKSUM_LEN..]);
        let computed = codec::checksum(&payload[..len - CHECKSUM_LEN]);
        warn!(?flag, declared, computed, "frame checksum mismatch");
        return Ok(Frame::Invalid(InvalidFrame::ChecksumMismatch { declared, computed }));
    }

    let record = MeasurementRecord::from_payload(flag, &payload[..len - CHECKSUM_LEN])?;
    Ok(Frame::Data(record))
}
