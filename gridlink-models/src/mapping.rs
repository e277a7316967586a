use crate::{constants::DEFAULT_COMMON_ADDRESS, point::AsduType};
use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Hint for the source-side payload width, carried through from the channel
/// configuration. Adapters use it when decoding raw samples; the core never
/// looks at it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataTypeHint {
    Boolean,
    Int16,
    Int32,
    Int64,
    Float,
    Double,
}

/// Maps one source channel onto its 104 addressing and scaling.
///
/// Immutable after construction. `scaling_factor`/`offset` are applied by
/// the Modbus adapter only (`scaled = raw * factor + offset`).
#[derive(Debug, Clone)]
pub struct Mapping {
    pub ioa: u32,
    pub common_address: u16,
    pub asdu_type: AsduType,
    pub data_type: DataTypeHint,
    pub scaling_factor: f64,
    pub offset: f64,
    pub description: &'static str,
}

impl Mapping {
    const fn new(ioa: u32, asdu_type: AsduType, data_type: DataTypeHint, description: &'static str) -> Self {
        Self {
            ioa,
            common_address: DEFAULT_COMMON_ADDRESS,
            asdu_type,
            data_type,
            scaling_factor: 1.0,
            offset: 0.0,
            description,
        }
    }

    const fn scaled(mut self, factor: f64, offset: f64) -> Self {
        self.scaling_factor = factor;
        self.offset = offset;
        self
    }
}

impl PartialEq for Mapping {
    fn eq(&self, other: &Self) -> bool {
        self.common_address == other.common_address && self.ioa == other.ioa
    }
}

impl Eq for Mapping {}

/// IEC 61850 report channels -> 104 addressing.
static IEC61850_MAP: Lazy<HashMap<&'static str, Mapping>> = Lazy::new(|| {
    use AsduType::MMeNc1;
    use DataTypeHint::Double;
    HashMap::from([
        // IC3_F650PRO
        ("iec61850_measurement1", Mapping::new(1001, MMeNc1, Double, "IC3_F650PRO/LLN0.Mod.stVal")),
        ("iec61850_measurement2", Mapping::new(1002, MMeNc1, Double, "IC3_F650PRO/LLN0.Mod.ctlModel")),
        ("iec61850_measurement3", Mapping::new(1003, MMeNc1, Double, "IC3_F650PRO/LLN0.Beh.stVal")),
        ("iec61850_measurement4", Mapping::new(1004, MMeNc1, Double, "IC3_F650PRO/LLN0.Health.stVal")),
        ("iec61850_measurement5", Mapping::new(1005, MMeNc1, Double, "IC3_F650PRO/LLN0.Loc.stVal")),
        ("iec61850_measurement6", Mapping::new(1006, MMeNc1, Double, "IC3_F650PRO/LLN0.OpTmh.stVal")),
        // IC3_F650CON
        ("iec61850_measurement7", Mapping::new(1007, MMeNc1, Double, "IC3_F650CON/LLN0.OpTmh.stVal")),
        ("iec61850_measurement8", Mapping::new(1008, MMeNc1, Double, "IC3_F650CON/LLN0.Mod.stVal")),
        ("iec61850_measurement9", Mapping::new(1009, MMeNc1, Double, "IC3_F650CON/LLN0.LocSta.stVal")),
        ("iec61850_measurement10", Mapping::new(1010, MMeNc1, Double, "IC3_F650CON/LPHD1.PhyHealth.stVal")),
    ])
});

/// Modbus TCP holding registers -> 104 addressing.
static MODBUS_MAP: Lazy<HashMap<&'static str, Mapping>> = Lazy::new(|| {
    use AsduType::MMeNc1;
    use DataTypeHint::Int16;
    HashMap::from([
        ("modbus_register1", Mapping::new(3001, MMeNc1, Int16, "Holding Register 1000")),
        ("modbus_register2", Mapping::new(3002, MMeNc1, Int16, "Holding Register 1001")),
        ("modbus_register3", Mapping::new(3003, MMeNc1, Int16, "Holding Register 1002")),
        ("modbus_register4", Mapping::new(3004, MMeNc1, Int16, "Holding Register 1003")),
        ("modbus_register5", Mapping::new(3005, MMeNc1, Int16, "Holding Register 1004")),
        ("modbus_register6", Mapping::new(3006, MMeNc1, Int16, "Holding Register 1005")),
        ("modbus_register7", Mapping::new(3007, MMeNc1, Int16, "Holding Register 1006")),
        ("modbus_register8", Mapping::new(3008, MMeNc1, Int16, "Holding Register 1007")),
        ("modbus_register9", Mapping::new(3009, MMeNc1, Int16, "Holding Register 1008")),
        ("modbus_register10", Mapping::new(3010, MMeNc1, Int16, "Holding Register 1009")),
        ("modbus_register11", Mapping::new(3011, MMeNc1, Int16, "Holding Register 1010")),
    ])
});

/// IEC 61850 sub-table. Missing channels are not an error; the adapter
/// skips them.
pub fn iec61850_map() -> &'static HashMap<&'static str, Mapping> {
    &IEC61850_MAP
}

/// Modbus sub-table.
pub fn modbus_map() -> &'static HashMap<&'static str, Mapping> {
    &MODBUS_MAP
}

// keep the builder reachable for test fixtures that need scaling entries
#[doc(hidden)]
pub fn test_mapping(ioa: u32, asdu_type: AsduType, factor: f64, offset: f64) -> Mapping {
    Mapping::new(ioa, asdu_type, DataTypeHint::Int16, "test").scaled(factor, offset)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tables_are_disjoint_and_populated() {
        assert_eq!(iec61850_map().len(), 10);
        assert_eq!(modbus_map().len(), 11);
        for key in iec61850_map().keys() {
            assert!(!modbus_map().contains_key(key));
        }
    }

    #[test]
    fn lookup_misses_are_none() {
        assert!(modbus_map().get("modbus_register99").is_none());
        assert!(iec61850_map().get("dnp3_point1").is_none());
    }

    #[test]
    fn mapping_equality_is_addressing() {
        let a = test_mapping(3005, AsduType::MMeNb1, 0.1, 0.0);
        let b = test_mapping(3005, AsduType::MMeNc1, 1.0, 5.0);
        assert_eq!(a, b);
    }
}
