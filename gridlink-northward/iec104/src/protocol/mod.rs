//! IEC 60870-5-104 protocol support, in two layers.
//!
//! The application layer — ASDU identifiers, payload encodings and the
//! CP56Time2a tag — lives in [`frame`] and is what the ASDU builder and
//! the connection handler's command dispatch consume.
//!
//! The link transport — APDU codec, APCI I/S/U control fields and the
//! per-connection sequence/acknowledge state in [`codec`], [`link`] and
//! [`frame::apci`] — is the server-side stand-in for an external 104
//! transport library. Everything above it deals only in ASDUs.

pub mod codec;
pub mod error;
pub mod frame;
pub mod link;

pub use error::Error;
pub use frame::Apdu;
