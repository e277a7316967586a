use super::{
    super::Error,
    asdu::{
        Asdu, Cause, CauseOfTransmission, CommonAddr, Identifier, TypeID, VariableStruct,
        INFO_OBJ_ADDR_IRRELEVANT,
    },
    time::cp56time2a,
};
use anyhow::Result;
use bit_struct::*;
use bytes::{BufMut, BytesMut};
use chrono::{DateTime, Utc};
#[cfg(test)]
use byteorder::{LittleEndian, ReadBytesExt};
#[cfg(test)]
use std::io::Cursor;

// System information in the control direction. The gateway only ever
// receives these; the builders below exist for the station side of tests
// and tooling.

// Qualifier of interrogation: 20 = station, 21..36 = groups
bit_struct! {
    pub struct ObjectQOI(u8) {
        range: u8,
    }
}

/// Station interrogation qualifier.
pub const QOI_STATION: u8 = 20;

// Qualifier of counter interrogation
bit_struct! {
    pub struct ObjectQCC(u8) {
        qcc: u8,
    }
}

// InterrogationCmd send a new interrogation command [C_IC_NA_1].
// [C_IC_NA_1] See companion standard 101, subclass 7.3.4.1
pub fn interrogation_cmd(
    cot: CauseOfTransmission,
    ca: CommonAddr,
    qoi: ObjectQOI,
) -> Result<Asdu, Error> {
    let mut cot = cot;
    let cause = cot.cause().get();

    if !(cause == Cause::Activation || cause == Cause::Deactivation) {
        return Err(Error::ErrCmdCause(cot));
    }

    let variable_struct = VariableStruct::new(u1!(0), u7!(1));

    let mut buf = BytesMut::with_capacity(3 + 1);
    buf.put_uint_le(INFO_OBJ_ADDR_IRRELEVANT as u64, 3);
    buf.put_u8(qoi.raw());

    Ok(Asdu {
        identifier: Identifier {
            type_id: TypeID::C_IC_NA_1,
            variable_struct,
            cot,
            orig_addr: 0,
            common_addr: ca,
        },
        raw: buf.freeze(),
    })
}

// CounterInterrogationCmd send counter interrogation command [C_CI_NA_1].
// [C_CI_NA_1] See companion standard 101, subclass 7.3.4.2
pub fn counter_interrogation_cmd(
    cot: CauseOfTransmission,
    ca: CommonAddr,
    qcc: ObjectQCC,
) -> Result<Asdu, Error> {
    let mut cot = cot;
    cot.cause().set(Cause::Activation);

    let variable_struct = VariableStruct::new(u1!(0), u7!(1));

    let mut buf = BytesMut::with_capacity(3 + 1);
    buf.put_uint_le(INFO_OBJ_ADDR_IRRELEVANT as u64, 3);
    buf.put_u8(qcc.raw());

    Ok(Asdu {
        identifier: Identifier {
            type_id: TypeID::C_CI_NA_1,
            variable_struct,
            cot,
            orig_addr: 0,
            common_addr: ca,
        },
        raw: buf.freeze(),
    })
}

// ClockSynchronizationCmd send clock sync command [C_CS_NA_1].
// [C_CS_NA_1] See companion standard 101, subclass 7.3.4.4
pub fn clock_synchronization_cmd(
    cot: CauseOfTransmission,
    ca: CommonAddr,
    time: DateTime<Utc>,
) -> Result<Asdu, Error> {
    let mut cot = cot;
    cot.cause().set(Cause::Activation);

    let variable_struct = VariableStruct::new(u1!(0), u7!(1));

    let mut buf = BytesMut::with_capacity(3 + 7);
    buf.put_uint_le(INFO_OBJ_ADDR_IRRELEVANT as u64, 3);
    buf.extend_from_slice(&cp56time2a(time));

    Ok(Asdu {
        identifier: Identifier {
            type_id: TypeID::C_CS_NA_1,
            variable_struct,
            cot,
            orig_addr: 0,
            common_addr: ca,
        },
        raw: buf.freeze(),
    })
}

// Station-side decode of the command qualifiers. The server never reads
// them — every interrogation returns all points regardless of QOI/QCC —
// so these exist only to assert on what the builders above encode.
#[cfg(test)]
impl Asdu {
    // [C_IC_NA_1] information object address and qualifier of interrogation
    pub fn get_interrogation_cmd(&self) -> Result<(u32, ObjectQOI)> {
        let mut rdr = Cursor::new(&self.raw);
        let ioa = rdr.read_u24::<LittleEndian>()?;
        let qoi =
            ObjectQOI::try_from(rdr.read_u8()?).map_err(|_| anyhow::anyhow!("invalid QOI"))?;
        Ok((ioa, qoi))
    }

    // [C_CI_NA_1] information object address and qualifier of counter call
    pub fn get_counter_interrogation_cmd(&self) -> Result<(u32, ObjectQCC)> {
        let mut rdr = Cursor::new(&self.raw);
        let ioa = rdr.read_u24::<LittleEndian>()?;
        let qcc =
            ObjectQCC::try_from(rdr.read_u8()?).map_err(|_| anyhow::anyhow!("invalid QCC"))?;
        Ok((ioa, qcc))
    }
}
