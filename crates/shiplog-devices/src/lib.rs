//! Field device access and polling for shiplog.
//!
//! - [`RegisterClient`]: one-shot holding-register sessions, implemented
//!   over Modbus TCP by [`ModbusTcpClient`].
//! - [`DeviceReader`]: turns a catalog variable into a register read.
//! - [`PollScheduler`]: the cycle loop tying catalog, reader, decoder and
//!   sink together.

pub mod client;
pub mod error;
pub mod reader;
pub mod scheduler;

pub use client::{DynRegisterClient, ModbusTcpClient, RegisterClient, RegisterRequest};
pub use error::{DeviceError, DeviceResult};
pub use reader::DeviceReader;
pub use scheduler::{Clock, CycleReport, PollScheduler};
