use super::{
    super::Error,
    asdu::{Asdu, Cause, CauseOfTransmission, CommonAddr, Identifier, TypeID, VariableStruct},
    time::{cp56time2a, decode_cp56time2a},
};
use bit_struct::*;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::io::Cursor;

// Monitor-direction process information. Every ASDU this gateway emits
// carries exactly one information object (SQ = 0).

/// Single point information, [M_SP_NA_1] / [M_SP_TB_1].
#[derive(Debug, Clone, PartialEq)]
pub struct SinglePointInfo {
    pub ioa: u32,
    pub siq: ObjectSIQ,
    pub time: Option<DateTime<Utc>>,
}

impl SinglePointInfo {
    pub fn new(ioa: u32, siq: ObjectSIQ, time: Option<DateTime<Utc>>) -> Self {
        SinglePointInfo { ioa, siq, time }
    }
}

/// Measured value, scaled, [M_ME_NB_1].
#[derive(Debug, Clone, PartialEq)]
pub struct MeasuredValueScaledInfo {
    pub ioa: u32,
    pub sva: i16,
    pub qds: ObjectQDS,
    pub time: Option<DateTime<Utc>>,
}

/// Measured value, short float, [M_ME_NC_1] / [M_ME_TF_1].
#[derive(Debug, Clone, PartialEq)]
pub struct MeasuredValueFloatInfo {
    pub ioa: u32,
    pub r: f32,
    pub qds: ObjectQDS,
    pub time: Option<DateTime<Utc>>,
}

// Single point quality descriptor (SIQ)
bit_struct! {
    pub struct ObjectSIQ(u8) {
        invalid: bool,   // IV
        nt: bool,        // not topical
        sb: bool,        // substituted
        bl: bool,        // blocked
        res: u3,         // reserved, zero
        spi: bool,       // point state
    }
}

impl ObjectSIQ {
    /// All quality bits clear except IV.
    pub fn new_with_value(invalid: bool, value: bool) -> Self {
        ObjectSIQ::new(invalid, false, false, false, u3!(0), value)
    }

    /// Point state; copies so shared references can read the bit field.
    pub fn spi_value(&self) -> bool {
        let mut siq = *self;
        siq.spi().get()
    }

    pub fn is_invalid(&self) -> bool {
        let mut siq = *self;
        siq.invalid().get()
    }
}

// Quality descriptor for measured values (QDS)
bit_struct! {
    pub struct ObjectQDS(u8) {
        invalid: bool,   // IV
        nt: bool,        // not topical
        sb: bool,        // substituted
        bl: bool,        // blocked
        res: u3,         // reserved, zero
        ov: bool,        // overflow
    }
}

impl ObjectQDS {
    /// All quality bits clear except IV. The gateway has no source for
    /// OV/BL/SB/NT.
    pub fn new_with_invalid(invalid: bool) -> Self {
        ObjectQDS::new(invalid, false, false, false, u3!(0), false)
    }

    pub fn is_invalid(&self) -> bool {
        let mut qds = *self;
        qds.invalid().get()
    }
}

fn monitor_cause_ok(cause: Cause) -> bool {
    cause == Cause::Background
        || cause == Cause::Spontaneous
        || cause == Cause::Request
        || cause == Cause::ReturnInfoRemote
        || cause == Cause::ReturnInfoLocal
        || (cause >= Cause::InterrogatedByStation && cause <= Cause::InterrogatedByGroup16)
}

// object addresses are three octets on the wire; write_u24 panics past that
fn check_ioa(ioa: u32) -> Result<u32, Error> {
    if ioa == 0 || ioa > super::asdu::INFO_OBJ_ADDR_MAX {
        return Err(Error::ErrInvalidFrame);
    }
    Ok(ioa)
}

// single sends a type identification [M_SP_NA_1] or [M_SP_TB_1].
// [M_SP_NA_1] See companion standard 101, subclass 7.3.1.1
// [M_SP_TB_1] See companion standard 101, subclass 7.3.1.22
pub fn single(
    type_id: TypeID,
    cot: CauseOfTransmission,
    ca: CommonAddr,
    info: SinglePointInfo,
) -> Result<Asdu, Error> {
    let mut cot = cot;
    if !monitor_cause_ok(cot.cause().get()) {
        return Err(Error::ErrCmdCause(cot));
    }

    let variable_struct = VariableStruct::new(u1!(0), u7!(1));

    let mut buf = vec![];
    buf.write_u24::<LittleEndian>(check_ioa(info.ioa)?)?;
    buf.write_u8(info.siq.raw())?;
    match type_id {
        TypeID::M_SP_NA_1 => (),
        TypeID::M_SP_TB_1 => {
            let time = info.time.unwrap_or_else(Utc::now);
            buf.extend_from_slice(&cp56time2a(time));
        }
        _ => return Err(Error::ErrTypeIDNotMatch(type_id)),
    }

    Ok(Asdu {
        identifier: Identifier {
            type_id,
            variable_struct,
            cot,
            orig_addr: 0,
            common_addr: ca,
        },
        raw: Bytes::from(buf),
    })
}

// measured_value_scaled sends a type identification [M_ME_NB_1].
// [M_ME_NB_1] See companion standard 101, subclass 7.3.1.11
pub fn measured_value_scaled(
    cot: CauseOfTransmission,
    ca: CommonAddr,
    info: MeasuredValueScaledInfo,
) -> Result<Asdu, Error> {
    let mut cot = cot;
    if !monitor_cause_ok(cot.cause().get()) {
        return Err(Error::ErrCmdCause(cot));
    }

    let variable_struct = VariableStruct::new(u1!(0), u7!(1));

    let mut buf = vec![];
    buf.write_u24::<LittleEndian>(check_ioa(info.ioa)?)?;
    buf.write_i16::<LittleEndian>(info.sva)?;
    buf.write_u8(info.qds.raw())?;

    Ok(Asdu {
        identifier: Identifier {
            type_id: TypeID::M_ME_NB_1,
            variable_struct,
            cot,
            orig_addr: 0,
            common_addr: ca,
        },
        raw: Bytes::from(buf),
    })
}

// measured_value_float sends a type identification [M_ME_NC_1] or [M_ME_TF_1].
// [M_ME_NC_1] See companion standard 101, subclass 7.3.1.13
// [M_ME_TF_1] See companion standard 101, subclass 7.3.1.28
pub fn measured_value_float(
    type_id: TypeID,
    cot: CauseOfTransmission,
    ca: CommonAddr,
    info: MeasuredValueFloatInfo,
) -> Result<Asdu, Error> {
    let mut cot = cot;
    if !monitor_cause_ok(cot.cause().get()) {
        return Err(Error::ErrCmdCause(cot));
    }

    let variable_struct = VariableStruct::new(u1!(0), u7!(1));

    let mut buf = vec![];
    buf.write_u24::<LittleEndian>(check_ioa(info.ioa)?)?;
    buf.write_f32::<LittleEndian>(info.r)?;
    buf.write_u8(info.qds.raw())?;
    match type_id {
        TypeID::M_ME_NC_1 => (),
        TypeID::M_ME_TF_1 => {
            let time = info.time.unwrap_or_else(Utc::now);
            buf.extend_from_slice(&cp56time2a(time));
        }
        _ => return Err(Error::ErrTypeIDNotMatch(type_id)),
    }

    Ok(Asdu {
        identifier: Identifier {
            type_id,
            variable_struct,
            cot,
            orig_addr: 0,
            common_addr: ca,
        },
        raw: Bytes::from(buf),
    })
}

impl Asdu {
    /// [M_SP_NA_1] / [M_SP_TB_1] single point information object.
    pub fn get_single_point(&self) -> Result<SinglePointInfo, Error> {
        let mut rdr = Cursor::new(&self.raw);
        let ioa = rdr.read_u24::<LittleEndian>()?;
        let siq = ObjectSIQ::try_from(rdr.read_u8()?)
            .map_err(|_| anyhow::anyhow!("invalid SIQ"))?;
        let time = match self.identifier.type_id {
            TypeID::M_SP_NA_1 => None,
            TypeID::M_SP_TB_1 => decode_cp56time2a(&mut rdr)?,
            _ => return Err(Error::ErrTypeIDNotMatch(self.identifier.type_id)),
        };
        Ok(SinglePointInfo { ioa, siq, time })
    }

    /// [M_ME_NB_1] scaled measured value information object.
    pub fn get_measured_value_scaled(&self) -> Result<MeasuredValueScaledInfo, Error> {
        if self.identifier.type_id != TypeID::M_ME_NB_1 {
            return Err(Error::ErrTypeIDNotMatch(self.identifier.type_id));
        }
        let mut rdr = Cursor::new(&self.raw);
        let ioa = rdr.read_u24::<LittleEndian>()?;
        let sva = rdr.read_i16::<LittleEndian>()?;
        let qds = ObjectQDS::try_from(rdr.read_u8()?)
            .map_err(|_| anyhow::anyhow!("invalid QDS"))?;
        Ok(MeasuredValueScaledInfo {
            ioa,
            sva,
            qds,
            time: None,
        })
    }

    /// [M_ME_NC_1] / [M_ME_TF_1] short float information object.
    pub fn get_measured_value_float(&self) -> Result<MeasuredValueFloatInfo, Error> {
        let mut rdr = Cursor::new(&self.raw);
        let ioa = rdr.read_u24::<LittleEndian>()?;
        let r = rdr.read_f32::<LittleEndian>()?;
        let qds = ObjectQDS::try_from(rdr.read_u8()?)
            .map_err(|_| anyhow::anyhow!("invalid QDS"))?;
        let time = match self.identifier.type_id {
            TypeID::M_ME_NC_1 => None,
            TypeID::M_ME_TF_1 => decode_cp56time2a(&mut rdr)?,
            _ => return Err(Error::ErrTypeIDNotMatch(self.identifier.type_id)),
        };
        Ok(MeasuredValueFloatInfo { ioa, r, qds, time })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn single_point_round_trip() {
        let cot = CauseOfTransmission::from_cause(Cause::Spontaneous);
        let info = SinglePointInfo::new(1003, ObjectSIQ::new_with_value(false, true), None);
        let asdu = single(TypeID::M_SP_NA_1, cot, 1, info.clone()).unwrap();
        assert_eq!(asdu.identifier.type_id, TypeID::M_SP_NA_1);
        assert_eq!(asdu.raw.len(), 4);

        let got = asdu.get_single_point().unwrap();
        assert_eq!(got, info);
        assert!(got.siq.spi_value());
        assert!(!got.siq.is_invalid());
    }

    #[test]
    fn single_point_with_time_round_trip() {
        let cot = CauseOfTransmission::from_cause(Cause::Spontaneous);
        let t = Utc.with_ymd_and_hms(2026, 3, 14, 9, 26, 53).unwrap();
        let info = SinglePointInfo::new(77, ObjectSIQ::new_with_value(true, false), Some(t));
        let asdu = single(TypeID::M_SP_TB_1, cot, 1, info).unwrap();
        assert_eq!(asdu.raw.len(), 4 + 7);

        let got = asdu.get_single_point().unwrap();
        assert_eq!(got.time, Some(t));
        assert!(got.siq.is_invalid());
    }

    #[test]
    fn scaled_value_round_trip() {
        let cot = CauseOfTransmission::from_cause(Cause::InterrogatedByStation);
        let info = MeasuredValueScaledInfo {
            ioa: 3005,
            sva: 32767,
            qds: ObjectQDS::new_with_invalid(false),
            time: None,
        };
        let asdu = measured_value_scaled(cot, 1, info.clone()).unwrap();
        assert_eq!(asdu.raw.len(), 3 + 2 + 1);
        assert_eq!(asdu.get_measured_value_scaled().unwrap(), info);
    }

    #[test]
    fn float_round_trip() {
        let cot = CauseOfTransmission::from_cause(Cause::Spontaneous);
        let info = MeasuredValueFloatInfo {
            ioa: 1001,
            r: 123.45,
            qds: ObjectQDS::new_with_invalid(false),
            time: None,
        };
        let asdu = measured_value_float(TypeID::M_ME_NC_1, cot, 1, info.clone()).unwrap();
        assert_eq!(asdu.raw.len(), 3 + 4 + 1);
        assert_eq!(asdu.get_measured_value_float().unwrap(), info);
    }

    #[test]
    fn command_cause_is_rejected_for_monitor_types() {
        let cot = CauseOfTransmission::from_cause(Cause::Activation);
        let info = MeasuredValueFloatInfo {
            ioa: 1,
            r: 0.0,
            qds: ObjectQDS::new_with_invalid(false),
            time: None,
        };
        assert!(matches!(
            measured_value_float(TypeID::M_ME_NC_1, cot, 1, info),
            Err(Error::ErrCmdCause(_))
        ));
    }

    #[test]
    fn quality_iv_bit_is_msb() {
        // IV must land in bit 7, SPI in bit 0
        assert_eq!(ObjectSIQ::new_with_value(true, true).raw(), 0x81);
        assert_eq!(ObjectSIQ::new_with_value(false, true).raw(), 0x01);
        assert_eq!(ObjectQDS::new_with_invalid(true).raw(), 0x80);
        assert_eq!(ObjectQDS::new_with_invalid(false).raw(), 0x00);
    }
}
