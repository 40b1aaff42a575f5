//! Common test utilities: frame builders and a scripted mock byte stream.

// Allow unused items since this module is shared across multiple test files
// and not every helper is used in every file.
#[allow(unused_imports)]
pub use quadmag_lib::QuadMag;
#[allow(unused_imports)]
pub use quadmag_lib::codec::checksum_trailer;
#[allow(unused_imports)]
pub use quadmag_lib::command::{
    Command, ContinuousParams, ImuConfig, MagConfig, MagMask, Opcode, Tmrc,
};
#[allow(unused_imports)]
pub use quadmag_lib::error::QmError;
#[allow(unused_imports)]
pub use quadmag_lib::frame::{Frame, InvalidFrame, PacketFlag, read_frame};
#[allow(unused_imports)]
pub use quadmag_lib::measurement::{ImuSample, MeasurementRecord};
#[allow(unused_imports)]
pub use quadmag_lib::session::{
    AcquisitionSession, ConfigMismatch, SessionState, SessionStatus,
};

use std::io::{self, Cursor, Read, Write};

/// Decode a hex string to bytes for testing.
#[allow(dead_code)]
pub fn hex_to_bytes(hex_data: &str) -> Vec<u8> {
    hex::decode(hex_data).expect("Failed to decode hex")
}

/// Build a complete data frame: flag byte, timestamp, sensor words, and the
/// truncated additive checksum trailer.
#[allow(dead_code)]
pub fn build_data_frame(
    flag: PacketFlag,
    seconds: u32,
    ticks: u16,
    mags: &[[u32; 3]],
    imu: Option<ImuSample>,
    temperature: Option<u16>,
) -> Vec<u8> {
    let mut data = Vec::new();
    data.extend_from_slice(&seconds.to_be_bytes());
    data.extend_from_slice(&ticks.to_be_bytes());
    for triplet in mags {
        for &axis in triplet {
            // 24-bit big-endian words
            data.extend_from_slice(&axis.to_be_bytes()[1..]);
        }
    }
    if let Some(imu) = imu {
        for word in imu.acc.iter().chain(imu.gyr.iter()) {
            data.extend_from_slice(&word.to_be_bytes());
        }
    }
    if let Some(temp) = temperature {
        data.extend_from_slice(&temp.to_be_bytes());
    }
    let mut frame = vec![u8::from(flag)];
    frame.extend_from_slice(&data);
    frame.extend_from_slice(&checksum_trailer(&data));
    frame
}

/// Four distinct magnetometer triplets starting at `base`.
#[allow(dead_code)]
pub fn quad_mags(base: u32) -> Vec<[u32; 3]> {
    (0..4u32)
        .map(|sensor| [base + sensor * 3, base + sensor * 3 + 1, base + sensor * 3 + 2])
        .collect()
}

#[allow(dead_code)]
pub fn mag_only_frame(seconds: u32, ticks: u16) -> Vec<u8> {
    build_data_frame(
        PacketFlag::MagOnly,
        seconds,
        ticks,
        &quad_mags(1000),
        None,
        None,
    )
}

/// A duplex stream with scripted responses. Reads drain the canned input
/// (then report end-of-stream, which the frame reader treats as a short
/// read); writes accumulate for inspection.
pub struct MockStream {
    input: Cursor<Vec<u8>>,
    pub written: Vec<u8>,
}

impl MockStream {
    #[allow(dead_code)]
    pub fn with_responses(responses: Vec<u8>) -> Self {
        Self {
            input: Cursor::new(responses),
            written: Vec::new(),
        }
    }

    #[allow(dead_code)]
    pub fn silent() -> Self {
        Self::with_responses(Vec::new())
    }
}

impl Read for MockStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.input.read(buf)
    }
}

impl Write for MockStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.written.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
