//! The acquisition state machine.
//!
//! [`AcquisitionSession`] is IO-free: the device layer feeds it decoded
//! frames and it tracks state, accumulated records, and the invalid-frame
//! budget. Exactly one session may be active against the byte stream at a
//! time — frames are only unambiguous while a single command's response
//! stream is being consumed.

use crate::command::MagMask;
use crate::frame::Frame;
use crate::measurement::MeasurementRecord;
use serde::{Deserialize, Serialize};
use std::fmt;
use strum_macros::Display;
use tracing::{debug, info, warn};

/// Invalid frames tolerated before a session aborts. Fixed policy, not
/// user-configurable: the ninth invalid frame closes the session.
pub const INVALID_FRAME_LIMIT: u32 = 9;

/// Lifecycle states of a measurement exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
pub enum SessionState {
    Idle,
    ConfigSent,
    Configured,
    ConfigFailed,
    MeasurementCommandSent,
    Collecting,
    Complete,
    Aborted,
}

/// How a finished session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
pub enum SessionStatus {
    /// The board sent its completion marker (or, in single mode, the first
    /// data frame landed).
    Complete,
    /// The invalid-frame budget ran out. Records collected so far are kept.
    TooManyInvalidFrames,
    /// A config echo disagreed with the sent command and the caller chose
    /// not to proceed.
    ConfigFailed,
    /// The session was closed before reaching a terminal state.
    Interrupted,
}

/// A reported (non-fatal) disagreement between a sent config and its echo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigMismatch {
    pub sent: Vec<u8>,
    pub echoed: Vec<u8>,
}

impl fmt::Display for ConfigMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "sent {}, board echoed {}",
            hex::encode(&self.sent),
            hex::encode(&self.echoed)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Single,
    Continuous { expected: u64 },
}

/// State for one measurement exchange against the board.
#[derive(Debug)]
pub struct AcquisitionSession {
    mode: Mode,
    mask: MagMask,
    state: SessionState,
    records: Vec<MeasurementRecord>,
    invalid_frames: u32,
    config_mismatches: Vec<ConfigMismatch>,
}

impl AcquisitionSession {
    /// Session for a single-shot measurement: the first data frame (or the
    /// completion marker, whichever arrives first) ends it.
    pub fn single(mask: MagMask) -> Self {
        Self::new(Mode::Single, mask)
    }

    /// Session for a continuous run. `expected` is the record count implied
    /// by duration and rate; it is reported at the end, never enforced.
    pub fn continuous(mask: MagMask, expected: u64) -> Self {
        Self::new(Mode::Continuous { expected }, mask)
    }

    fn new(mode: Mode, mask: MagMask) -> Self {
        Self {
            mode,
            mask,
            state: SessionState::Idle,
            records: Vec::new(),
            invalid_frames: 0,
            config_mismatches: Vec::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn mask(&self) -> MagMask {
        self.mask
    }

    pub fn records(&self) -> &[MeasurementRecord] {
        &self.records
    }

    pub fn invalid_frames(&self) -> u32 {
        self.invalid_frames
    }

    /// A configuration command went out.
    pub fn config_sent(&mut self) {
        self.state = SessionState::ConfigSent;
    }

    /// The config echo came back; `mismatch` carries the divergence if the
    /// echoed bytes differed from what was sent.
    pub fn config_verified(&mut self, mismatch: Option<ConfigMismatch>) {
        match mismatch {
            None => self.state = SessionState::Configured,
            Some(m) => {
                warn!(%m, "config update failed");
                self.config_mismatches.push(m);
                self.state = SessionState::ConfigFailed;
            }
        }
    }

    /// The measurement command went out; frames may now be offered.
    pub fn command_sent(&mut self) {
        self.state = SessionState::MeasurementCommandSent;
    }

    /// True while the session still wants frames.
    pub fn is_open(&self) -> bool {
        matches!(
            self.state,
            SessionState::MeasurementCommandSent | SessionState::Collecting
        )
    }

    /// Feed one decoded frame through the state machine.
    pub fn offer(&mut self, frame: Frame) -> SessionState {
        if self.state == SessionState::MeasurementCommandSent {
            self.state = SessionState::Collecting;
        }
        if self.state != SessionState::Collecting {
            warn!(state = %self.state, "frame offered outside of collection");
            return self.state;
        }
        match frame {
            Frame::Complete => {
                info!(records = self.records.len(), "completion marker received");
                self.state = SessionState::Complete;
            }
            Frame::Data(record) => {
                debug!(flag = ?record.flag, seconds = record.seconds, "data frame received");
                self.records.push(record);
                if self.mode == Mode::Single {
                    self.state = SessionState::Complete;
                }
            }
            // A stray config echo mid-collection means the streams are out
            // of step; count it against the invalid budget.
            Frame::MagConfigEcho(_) | Frame::ImuConfigEcho(_) => self.count_invalid(),
            Frame::Invalid(reason) => {
                warn!(%reason, "invalid frame");
                self.count_invalid();
            }
        }
        self.state
    }

    fn count_invalid(&mut self) {
        self.invalid_frames += 1;
        if self.invalid_frames >= INVALID_FRAME_LIMIT {
            warn!(
                invalid = self.invalid_frames,
                records = self.records.len(),
                "too many invalid frames, aborting session"
            );
            self.state = SessionState::Aborted;
        }
    }

    /// Close the session and produce its summary. Records collected before
    /// an abort are retained.
    pub fn finish(self) -> SessionSummary {
        let status = match self.state {
            SessionState::Complete => SessionStatus::Complete,
            SessionState::Aborted => SessionStatus::TooManyInvalidFrames,
            SessionState::ConfigFailed => SessionStatus::ConfigFailed,
            _ => SessionStatus::Interrupted,
        };
        let expected = match self.mode {
            Mode::Single => None,
            Mode::Continuous { expected } => Some(expected),
        };
        SessionSummary {
            status,
            records: self.records,
            invalid_frames: self.invalid_frames,
            expected,
            config_mismatches: self.config_mismatches,
        }
    }
}

/// End-of-session report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub status: SessionStatus,
    pub records: Vec<MeasurementRecord>,
    pub invalid_frames: u32,
    /// Record count implied by duration × rate, continuous runs only.
    pub expected: Option<u64>,
    pub config_mismatches: Vec<ConfigMismatch>,
}

impl SessionSummary {
    /// Shortfall against the expected count, when one was declared.
    pub fn missing(&self) -> Option<u64> {
        self.expected
            .map(|expected| expected.saturating_sub(self.records.len() as u64))
    }
}

impl fmt::Display for SessionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} records, {} invalid frames",
            self.status,
            self.records.len(),
            self.invalid_frames
        )?;
        if let (Some(expected), Some(missing)) = (self.expected, self.missing()) {
            write!(f, " (expected {expected}, missing {missing})")?;
        }
        Ok(())
    }
}
