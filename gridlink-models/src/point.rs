use crate::value::{Value, ValueCastError};
use chrono::Utc;
use std::{
    collections::HashMap,
    fmt,
    hash::{Hash, Hasher},
    time::Duration,
};

/// Protocol that produced a point, for statistics and log correlation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceProtocol {
    #[default]
    Unknown,
    Iec61850,
    ModbusTcp,
}

impl fmt::Display for SourceProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceProtocol::Unknown => f.write_str("UNKNOWN"),
            SourceProtocol::Iec61850 => f.write_str("IEC61850"),
            SourceProtocol::ModbusTcp => f.write_str("MODBUS_TCP"),
        }
    }
}

/// The 104 type identifications this gateway emits.
///
/// Anything else a mapping might name falls back to [`AsduType::MMeNc1`]
/// (short float) at encode time, which is also the enum default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AsduType {
    /// M_SP_NA_1 (1): single point, no time tag
    MSpNa1,
    /// M_SP_TB_1 (30): single point with CP56Time2a
    MSpTb1,
    /// M_ME_NB_1 (11): scaled value (INT16)
    MMeNb1,
    /// M_ME_NC_1 (13): short floating point
    #[default]
    MMeNc1,
    /// M_ME_TF_1 (36): short floating point with CP56Time2a
    MMeTf1,
}

impl AsduType {
    pub fn type_id(&self) -> u8 {
        match self {
            AsduType::MSpNa1 => 1,
            AsduType::MSpTb1 => 30,
            AsduType::MMeNb1 => 11,
            AsduType::MMeNc1 => 13,
            AsduType::MMeTf1 => 36,
        }
    }

    /// Parse the standard notation used in mapping configuration.
    pub fn from_name(name: &str) -> Option<AsduType> {
        match name {
            "M_SP_NA_1" => Some(AsduType::MSpNa1),
            "M_SP_TB_1" => Some(AsduType::MSpTb1),
            "M_ME_NB_1" => Some(AsduType::MMeNb1),
            "M_ME_NC_1" => Some(AsduType::MMeNc1),
            "M_ME_TF_1" => Some(AsduType::MMeTf1),
            _ => None,
        }
    }

    pub fn with_time(&self) -> bool {
        matches!(self, AsduType::MSpTb1 | AsduType::MMeTf1)
    }
}

impl fmt::Display for AsduType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AsduType::MSpNa1 => "M_SP_NA_1",
            AsduType::MSpTb1 => "M_SP_TB_1",
            AsduType::MMeNb1 => "M_ME_NB_1",
            AsduType::MMeNc1 => "M_ME_NC_1",
            AsduType::MMeTf1 => "M_ME_TF_1",
        };
        f.write_str(s)
    }
}

/// Canonical point record.
///
/// Identity is `(common_address, ioa)` alone: a point held by the store and
/// the same point delivered to a listener compare equal whatever their
/// `id`, value or timestamps.
#[derive(Debug, Clone)]
pub struct Point {
    /// Source channel id, free-form. Debugging only.
    pub id: String,
    pub source_protocol: SourceProtocol,
    /// Source-native address string, e.g. `"IC3_F650PRO/LLN0.Mod.stVal"`
    /// or `"Holding Register 1004"`.
    pub source_address: String,
    /// Information object address, valid range [1, 2^24 - 1].
    /// SCADA masters expect these to be stable.
    pub ioa: u32,
    /// 104 station address, [1, 65535].
    pub common_address: u16,
    pub asdu_type: AsduType,
    pub value: Value,
    /// `false` sets the IV quality bit on the wire.
    pub valid: bool,
    /// Source event time, ms since epoch UTC. 0 means "no source time";
    /// the encoder substitutes gateway time.
    pub timestamp: i64,
    /// Gateway wall-clock ms of the last value write.
    pub last_updated: i64,
    /// Free-form diagnostics, never encoded into 104.
    pub metadata: HashMap<String, String>,
    pub description: String,
}

impl Default for Point {
    fn default() -> Self {
        Self {
            id: String::new(),
            source_protocol: SourceProtocol::default(),
            source_address: String::new(),
            ioa: 0,
            common_address: crate::constants::DEFAULT_COMMON_ADDRESS,
            asdu_type: AsduType::default(),
            value: Value::default(),
            valid: true,
            timestamp: 0,
            last_updated: Utc::now().timestamp_millis(),
            metadata: HashMap::new(),
            description: String::new(),
        }
    }
}

impl Point {
    /// Constructor fixing the addressing, payload, event time and validity.
    pub fn new(
        ioa: u32,
        common_address: u16,
        asdu_type: AsduType,
        value: Value,
        timestamp: i64,
        valid: bool,
    ) -> Self {
        Self {
            ioa,
            common_address,
            asdu_type,
            value,
            timestamp,
            valid,
            ..Default::default()
        }
    }

    /// Replace the payload. The only mutator; refreshes `last_updated`.
    pub fn set_value(&mut self, value: Value) {
        self.value = value;
        self.last_updated = Utc::now().timestamp_millis();
    }

    pub fn as_float(&self) -> Result<f32, ValueCastError> {
        self.value.as_f32()
    }

    pub fn as_bool(&self) -> Result<bool, ValueCastError> {
        self.value.as_bool()
    }

    pub fn as_int(&self) -> Result<i32, ValueCastError> {
        self.value.as_i32()
    }

    pub fn as_long(&self) -> Result<i64, ValueCastError> {
        self.value.as_i64()
    }

    /// Age of the value relative to the gateway clock.
    pub fn age(&self) -> Duration {
        let ms = (Utc::now().timestamp_millis() - self.last_updated).max(0);
        Duration::from_millis(ms as u64)
    }

    /// Whether no write has landed for longer than `max_age`.
    pub fn is_stale(&self, max_age: Duration) -> bool {
        self.age() > max_age
    }
}

impl PartialEq for Point {
    fn eq(&self, other: &Self) -> bool {
        self.common_address == other.common_address && self.ioa == other.ioa
    }
}

impl Eq for Point {}

impl Hash for Point {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.common_address.hash(state);
        self.ioa.hash(state);
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Point[id={}, ioa={}, ca={}, type={}, value={}, valid={}, protocol={}]",
            self.id,
            self.ioa,
            self.common_address,
            self.asdu_type,
            self.value,
            self.valid,
            self.source_protocol
        )
    }
}
