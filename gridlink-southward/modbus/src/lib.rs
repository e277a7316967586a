//! Modbus TCP ingest adapter: holding-register samples in, scaled
//! canonical points out.

mod handler;

pub use handler::{ModbusInputHandler, RegistrationSummary};
