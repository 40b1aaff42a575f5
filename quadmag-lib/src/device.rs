//! High-level driver for the acquisition board.
//!
//! [`QuadMag`] owns the duplex byte stream for the duration of each
//! command/response exchange. The model is fully synchronous: one command
//! goes out, frames are read back until the exchange closes, and the stream
//! is left readable/writable regardless of how it ended.

use crate::command::{COMMAND_LEN, Command, ContinuousParams, ImuConfig, MagConfig, MagMask, Opcode};
use crate::error::QmError;
use crate::frame::{Frame, IMU_CONFIG_ECHO_LEN, MAG_CONFIG_ECHO_LEN, read_frame};
use crate::measurement::MeasurementRecord;
use crate::session::{AcquisitionSession, ConfigMismatch, SessionState, SessionSummary};
use std::io::{Read, Write};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Line rate the board talks at. Consumed by whoever opens the port.
pub const BAUD_RATE: u32 = 115_200;

/// Read/write timeout the transport should be configured with. A read that
/// comes back short within this window counts as one invalid frame.
pub const IO_TIMEOUT: Duration = Duration::from_secs(3);

/// Which measurement loop a [`QuadMag::run`] session drives.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SessionMode {
    Single,
    Continuous(ContinuousParams),
}

/// Everything needed for one configure-then-measure exchange.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionRequest {
    pub mag_config: Option<MagConfig>,
    pub imu_config: Option<ImuConfig>,
    pub mask: MagMask,
    pub mode: SessionMode,
    /// Config mismatches are reported, not fatal; this decides whether the
    /// session still proceeds to the measurement phase after one.
    pub proceed_on_mismatch: bool,
}

/// Driver for the quad-magnetometer board over any duplex byte stream.
pub struct QuadMag<S> {
    stream: S,
}

impl<S: Read + Write> QuadMag<S> {
    pub fn new(stream: S) -> Self {
        Self { stream }
    }

    pub fn into_inner(self) -> S {
        self.stream
    }

    fn send(&mut self, command: &Command) -> Result<[u8; COMMAND_LEN], QmError> {
        let frame = command.encode();
        self.stream.write_all(&frame)?;
        self.stream.flush()?;
        debug!(opcode = %command.opcode(), bytes = %hex::encode(frame), "command sent");
        Ok(frame)
    }

    fn read(&mut self) -> Result<Frame, QmError> {
        read_frame(&mut self.stream)
    }

    /// Send a config command and read back its echo plus the completion
    /// acknowledgment (consumed and discarded). Returns the sent payload
    /// slice the echo is defined against, and the echoed bytes.
    fn config_exchange(&mut self, command: &Command) -> Result<(Vec<u8>, Vec<u8>), QmError> {
        let frame = self.send(command)?;
        let echoed: Vec<u8> = match (command.opcode(), self.read()?) {
            (Opcode::SetMagConfig | Opcode::GetMagConfig, Frame::MagConfigEcho(echo)) => {
                echo.to_vec()
            }
            (Opcode::SetImuConfig | Opcode::GetImuConfig, Frame::ImuConfigEcho(echo)) => {
                echo.to_vec()
            }
            (opcode, other) => {
                return Err(QmError::Protocol(format!(
                    "expected config echo for {opcode}, got {other:?}"
                )));
            }
        };
        match self.read()? {
            Frame::Complete => {}
            other => warn!(?other, "expected completion ack after config echo"),
        }
        let sent = frame[1..1 + echoed.len()].to_vec();
        Ok((sent, echoed))
    }

    /// Update the magnetometer configuration. The board must echo the sent
    /// bytes back unchanged; a divergent echo is reported as
    /// [`QmError::ConfigMismatch`] and leaves the engine usable — the caller
    /// decides whether to go on.
    pub fn set_mag_config(&mut self, config: &MagConfig) -> Result<(), QmError> {
        let (sent, echoed) = self.config_exchange(&Command::SetMagConfig(*config))?;
        if sent != echoed {
            return Err(QmError::ConfigMismatch { sent, echoed });
        }
        info!(cycle_count = config.cycle_count, tmrc = %config.tmrc, "magnetometer config updated");
        Ok(())
    }

    /// Update the IMU configuration, same echo contract as
    /// [`Self::set_mag_config`].
    pub fn set_imu_config(&mut self, config: &ImuConfig) -> Result<(), QmError> {
        let (sent, echoed) = self.config_exchange(&Command::SetImuConfig(*config))?;
        if sent != echoed {
            return Err(QmError::ConfigMismatch { sent, echoed });
        }
        info!("IMU config updated");
        Ok(())
    }

    /// Fetch the current magnetometer config as raw echo bytes.
    pub fn mag_config(&mut self) -> Result<[u8; MAG_CONFIG_ECHO_LEN], QmError> {
        let (_, echoed) = self.config_exchange(&Command::GetMagConfig)?;
        echoed
            .try_into()
            .map_err(|_| QmError::Protocol("config echo length".into()))
    }

    /// Fetch the current IMU config as raw echo bytes.
    pub fn imu_config(&mut self) -> Result<[u8; IMU_CONFIG_ECHO_LEN], QmError> {
        let (_, echoed) = self.config_exchange(&Command::GetImuConfig)?;
        echoed
            .try_into()
            .map_err(|_| QmError::Protocol("config echo length".into()))
    }

    /// Request one measurement. The session ends on the first data frame,
    /// on the completion marker (possibly with zero records — the board had
    /// nothing further to report), or when the invalid-frame budget runs
    /// out.
    pub fn single_measurement(&mut self, mask: MagMask) -> Result<SessionSummary, QmError> {
        let mut session = AcquisitionSession::single(mask);
        self.send(&Command::SingleMeasurement { mask })?;
        session.command_sent();
        self.collect(&mut session)?;
        Ok(session.finish())
    }

    /// Run a continuous measurement until the board signals completion or
    /// the invalid-frame budget runs out.
    pub fn continuous_measurement(
        &mut self,
        params: ContinuousParams,
        mask: MagMask,
    ) -> Result<SessionSummary, QmError> {
        let mut session = AcquisitionSession::continuous(mask, params.expected_records());
        self.send(&Command::ContinuousMeasurement { params, mask })?;
        session.command_sent();
        self.collect(&mut session)?;
        Ok(session.finish())
    }

    /// Full configure-then-measure exchange, driving every session state:
    /// each requested config is sent and echo-verified before the
    /// measurement command goes out.
    pub fn run(&mut self, request: &SessionRequest) -> Result<SessionSummary, QmError> {
        let mut session = match request.mode {
            SessionMode::Single => AcquisitionSession::single(request.mask),
            SessionMode::Continuous(params) => {
                AcquisitionSession::continuous(request.mask, params.expected_records())
            }
        };

        let configs = [
            request.mag_config.map(Command::SetMagConfig),
            request.imu_config.map(Command::SetImuConfig),
        ];
        for command in configs.into_iter().flatten() {
            session.config_sent();
            let (sent, echoed) = self.config_exchange(&command)?;
            let mismatch = (sent != echoed).then(|| ConfigMismatch { sent, echoed });
            session.config_verified(mismatch);
            if session.state() == SessionState::ConfigFailed && !request.proceed_on_mismatch {
                return Ok(session.finish());
            }
        }

        let measurement = match request.mode {
            SessionMode::Single => Command::SingleMeasurement { mask: request.mask },
            SessionMode::Continuous(params) => Command::ContinuousMeasurement {
                params,
                mask: request.mask,
            },
        };
        self.send(&measurement)?;
        session.command_sent();
        self.collect(&mut session)?;
        Ok(session.finish())
    }

    fn collect(&mut self, session: &mut AcquisitionSession) -> Result<(), QmError> {
        while session.is_open() {
            let frame = self.read()?;
            session.offer(frame);
        }
        Ok(())
    }

    /// Ask the board to flush whatever buffered frame it holds.
    pub fn send_available(&mut self) -> Result<Option<MeasurementRecord>, QmError> {
        self.send(&Command::SendAvailable)?;
        match self.read()? {
            Frame::Data(record) => Ok(Some(record)),
            Frame::Complete => Ok(None),
            other => {
                warn!(?other, "no valid buffered data available");
                Ok(None)
            }
        }
    }

    /// Stop all sensors and drop the controller into low-power mode.
    pub fn stop_all(&mut self) -> Result<(), QmError> {
        self.send(&Command::StopAll)?;
        match self.read()? {
            Frame::Complete => {
                info!("all operations stopped");
                Ok(())
            }
            other => Err(QmError::Protocol(format!(
                "stop was not acknowledged, got {other:?}"
            ))),
        }
    }
}
