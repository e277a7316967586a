//! Core data model for the gridlink gateway.
//!
//! Everything field-side adapters produce and the 104 side consumes flows
//! through the types in this crate: the tagged [`Value`] payload, the
//! canonical [`Point`] record, the immutable channel [`Mapping`] registries
//! and the runtime [`Settings`].

pub mod constants;
pub mod mapping;
pub mod point;
pub mod record;
pub mod settings;
pub mod value;

pub use mapping::{iec61850_map, modbus_map, DataTypeHint, Mapping};
pub use point::{AsduType, Point, SourceProtocol};
pub use record::{RecordFlag, SampleRecord};
pub use settings::Settings;
pub use value::{Value, ValueCastError, ValueKind};
