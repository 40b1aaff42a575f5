//! Serial command/response protocol engine for a quad-magnetometer
//! data-acquisition board (four magnetometers, optional IMU and temperature
//! sensors).
//!
//! The engine builds opcode-tagged 10-byte command frames, parses the
//! board's fixed-length checksummed responses, drives acquisition sessions,
//! and converts raw sensor codes to physical units. It only requires a
//! duplex byte stream with blocking reads and a timeout; opening the serial
//! port, file logging, and user interaction live with the callers.

pub mod codec;
pub mod command;
pub mod convert;
pub mod device;
pub mod error;
pub mod frame;
pub mod measurement;
pub mod session;

pub use device::QuadMag;
