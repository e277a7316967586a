//! IEC 61850 ingest adapter: report-channel samples in, canonical points
//! out.

mod handler;

pub use handler::{Iec61850InputHandler, RegistrationSummary};
