//! IEC 60870-5-104 northward side: frame layer, ASDU builder, TCP server
//! and per-connection handlers.

pub mod builder;
pub mod connection;
pub mod protocol;
pub mod server;

pub use builder::build_asdu;
pub use connection::ConnectionHandler;
pub use server::{Iec104Server, ServerConfig};
