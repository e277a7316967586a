use anyhow::{anyhow, Result};
use bit_struct::*;
use byteorder::ReadBytesExt;
use bytes::{BufMut, Bytes, BytesMut};
use std::{fmt::Display, io::Cursor};

// ASDU format
//       | data unit identification | information object <1..n> |
//
//       | <------------  data unit identification ------------>|
//       | typeID | variable struct | cause  |  common address  |
// bytes |    1   |      1          | [1,2]  |      [1,2]       |
//       | <------------  information object ------------------>|
//       | object address | element set  |  object time scale   |
// bytes |     [1,2,3]    |              |                      |

pub const ASDU_SIZE_MAX: usize = 249;
pub const IDENTIFIER_SIZE: usize = 6;

/// Zero is not a valid station address.
pub const INVALID_COMMON_ADDR: u16 = 0;

pub type OriginAddr = u8;
pub type CommonAddr = u16;

/// Information object addresses occupy three octets on the wire.
pub const INFO_OBJ_ADDR_SIZE: usize = 3;
pub const INFO_OBJ_ADDR_MAX: u32 = 0x00FF_FFFF;

/// Zero means the information object address is irrelevant (system
/// commands).
pub const INFO_OBJ_ADDR_IRRELEVANT: u32 = 0;

#[derive(Debug, Clone)]
pub struct Asdu {
    pub identifier: Identifier,
    pub raw: Bytes,
}

impl Display for Asdu {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.identifier.to_string().as_str())?;
        let mut s = String::with_capacity(self.raw.len() * 6);
        for b in self.raw.iter() {
            use std::fmt::Write as _;
            let _ = write!(&mut s, "[{:#04X}]", b);
        }
        f.write_str(&s)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Identifier {
    pub type_id: TypeID,
    pub variable_struct: VariableStruct,
    pub cot: CauseOfTransmission,
    // unused by gateway-initiated frames, echoed on replies
    pub orig_addr: OriginAddr,
    // 1~254 station address, 255 global, 0 unused
    pub common_addr: CommonAddr,
}

impl Display for Identifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("[{:02X}]", self.type_id.raw()))?;
        f.write_fmt(format_args!("[{:02X}]", self.variable_struct.raw()))?;
        f.write_fmt(format_args!("[{:02X}]", self.cot.raw()))?;
        f.write_fmt(format_args!("[{:02X}]", self.orig_addr))?;
        let common_addr = self.common_addr.to_le_bytes();
        f.write_fmt(format_args!("[{:02X}]", common_addr[0]))?;
        f.write_fmt(format_args!("[{:02X}]", common_addr[1]))?;
        Ok(())
    }
}

bit_struct! {
    pub struct VariableStruct(u8) {
        is_sequence: u1,
        number: u7,
    }
}

enums! {
    pub Cause {
        Unused,
        Periodic,
        Background,
        Spontaneous,
        Initialized,
        Request,
        Activation,
        ActivationCon,
        Deactivation,
        DeactivationCon,
        ActivationTerm,
        ReturnInfoRemote,
        ReturnInfoLocal,
        FileTransfer,
        Authentication,
        SessionKey,
        UserRoleAndUpdateKey,
        Reserved1,
        Reserved2,
        Reserved3,
        InterrogatedByStation,
        InterrogatedByGroup1,
        InterrogatedByGroup2,
        InterrogatedByGroup3,
        InterrogatedByGroup4,
        InterrogatedByGroup5,
        InterrogatedByGroup6,
        InterrogatedByGroup7,
        InterrogatedByGroup8,
        InterrogatedByGroup9,
        InterrogatedByGroup10,
        InterrogatedByGroup11,
        InterrogatedByGroup12,
        InterrogatedByGroup13,
        InterrogatedByGroup14,
        InterrogatedByGroup15,
        InterrogatedByGroup16,
        RequestByGeneralCounter,
        RequestByGroup1Counter,
        RequestByGroup2Counter,
        RequestByGroup3Counter,
        RequestByGroup4Counter,
        Reserved4,
        Reserved5,
        UnknownTypeID,
        UnknownCOT,
        UnknownCA,
        UnknownIOA,
    }
}

bit_struct! {
    pub struct CauseOfTransmission(u8) {
        test: bool,
        positive: bool,
        cause: Cause,
    }
}

impl CauseOfTransmission {
    /// Plain cause, test and P/N clear — every gateway-initiated frame.
    pub fn from_cause(cause: Cause) -> Self {
        CauseOfTransmission::new(false, false, cause)
    }

    /// The cause alone, ignoring the test and P/N bits. The bit-field
    /// accessors need a mutable place; this copies first so shared
    /// references can read.
    pub fn cause_value(&self) -> Cause {
        let mut cot = *self;
        cot.cause().get()
    }
}

/// Type identifications this gateway emits or accepts. Anything else on the
/// wire is preserved as `Unrecognized` so the unknown-type reply can echo
/// it back.
#[allow(non_camel_case_types)]
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum TypeID {
    /// Single point information
    M_SP_NA_1,
    /// Measured value, scaled
    M_ME_NB_1,
    /// Measured value, short float
    M_ME_NC_1,
    /// Single point information with CP56Time2a
    M_SP_TB_1,
    /// Measured value, short float with CP56Time2a
    M_ME_TF_1,
    /// Interrogation command
    C_IC_NA_1,
    /// Counter interrogation command
    C_CI_NA_1,
    /// Clock synchronization command
    C_CS_NA_1,
    /// Any other identifier, kept verbatim
    Unrecognized(u8),
}

impl TypeID {
    pub fn raw(&self) -> u8 {
        match self {
            TypeID::M_SP_NA_1 => 1,
            TypeID::M_ME_NB_1 => 11,
            TypeID::M_ME_NC_1 => 13,
            TypeID::M_SP_TB_1 => 30,
            TypeID::M_ME_TF_1 => 36,
            TypeID::C_IC_NA_1 => 100,
            TypeID::C_CI_NA_1 => 101,
            TypeID::C_CS_NA_1 => 103,
            TypeID::Unrecognized(v) => *v,
        }
    }

    pub fn from_raw(value: u8) -> Self {
        match value {
            1 => TypeID::M_SP_NA_1,
            11 => TypeID::M_ME_NB_1,
            13 => TypeID::M_ME_NC_1,
            30 => TypeID::M_SP_TB_1,
            36 => TypeID::M_ME_TF_1,
            100 => TypeID::C_IC_NA_1,
            101 => TypeID::C_CI_NA_1,
            103 => TypeID::C_CS_NA_1,
            other => TypeID::Unrecognized(other),
        }
    }
}

impl Asdu {
    /// Clone with a different cause of transmission; everything else —
    /// type, originator, common address, information objects — echoes the
    /// request. This is how command confirmations are produced.
    pub fn mirror(&self, cause: Cause) -> Self {
        let mut asdu = self.clone();
        asdu.identifier.cot.cause().set(cause);
        asdu
    }
}

impl TryFrom<Bytes> for Asdu {
    type Error = anyhow::Error;

    fn try_from(bytes: Bytes) -> Result<Self> {
        if bytes.len() < IDENTIFIER_SIZE {
            return Err(anyhow!("ASDU too short: {} bytes", bytes.len()));
        }
        let mut rdr = Cursor::new(&bytes);
        let type_id = TypeID::from_raw(rdr.read_u8()?);
        let variable_struct = VariableStruct::try_from(rdr.read_u8()?)
            .map_err(|_| anyhow!("invalid variable struct"))?;
        let cot = CauseOfTransmission::try_from(rdr.read_u8()?)
            .map_err(|_| anyhow!("invalid cause of transmission"))?;
        let orig_addr = rdr.read_u8()?;
        let common_addr = rdr.read_u16::<byteorder::LittleEndian>()?;
        let mut bytes = bytes;
        Ok(Asdu {
            identifier: Identifier {
                type_id,
                variable_struct,
                cot,
                orig_addr,
                common_addr,
            },
            raw: bytes.split_off(IDENTIFIER_SIZE),
        })
    }
}

impl TryInto<Bytes> for Asdu {
    type Error = anyhow::Error;

    fn try_into(self) -> Result<Bytes, Self::Error> {
        let cap = IDENTIFIER_SIZE + self.raw.len();
        let mut buf = BytesMut::with_capacity(cap);
        buf.put_u8(self.identifier.type_id.raw());
        buf.put_u8(self.identifier.variable_struct.raw());
        buf.put_u8(self.identifier.cot.raw());
        buf.put_u8(self.identifier.orig_addr);
        buf.put_u16_le(self.identifier.common_addr);
        buf.extend(self.raw);

        Ok(buf.freeze())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_and_encode_asdu() -> Result<()> {
        let bytes =
            Bytes::from_static(&[0x01, 0x01, 0x06, 0x00, 0x80, 0x00, 0x00, 0x01, 0x02, 0x03]);
        let mut asdu: Asdu = bytes.clone().try_into()?;
        assert!(asdu.identifier.type_id == TypeID::M_SP_NA_1);
        assert_eq!(asdu.identifier.variable_struct.number().get().value(), 0x01);
        assert_eq!(asdu.identifier.cot.cause_value(), Cause::Activation);
        assert_eq!(asdu.identifier.orig_addr, 0x00);
        assert_eq!(asdu.identifier.common_addr, 0x80);
        assert_eq!(asdu.raw, Bytes::from_static(&[0x00, 0x01, 0x02, 0x03]));

        let raw: Bytes = asdu.try_into().unwrap();
        assert_eq!(bytes, raw);
        Ok(())
    }

    #[test]
    fn unrecognized_type_survives_round_trip() -> Result<()> {
        // C_SC_NA_1 (45): a command this gateway refuses but must echo
        let bytes = Bytes::from_static(&[0x2D, 0x01, 0x06, 0x07, 0x01, 0x00, 0x01, 0x00, 0x00, 0x01]);
        let asdu: Asdu = bytes.clone().try_into()?;
        assert_eq!(asdu.identifier.type_id, TypeID::Unrecognized(45));
        assert_eq!(asdu.identifier.orig_addr, 0x07);

        let mirrored = asdu.mirror(Cause::UnknownTypeID);
        assert_eq!(mirrored.identifier.cot.cause_value(), Cause::UnknownTypeID);
        assert_eq!(mirrored.identifier.orig_addr, 0x07);
        assert_eq!(mirrored.raw, asdu.raw);

        let raw: Bytes = asdu.try_into()?;
        assert_eq!(bytes, raw);
        Ok(())
    }

    #[test]
    fn mirror_changes_cause_only() -> Result<()> {
        let bytes = Bytes::from_static(&[0x64, 0x01, 0x06, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x14]);
        let asdu: Asdu = bytes.try_into()?;
        let con = asdu.mirror(Cause::ActivationCon);
        assert_eq!(con.identifier.type_id, TypeID::C_IC_NA_1);
        assert_eq!(con.identifier.cot.cause_value(), Cause::ActivationCon);
        assert_eq!(con.identifier.common_addr, asdu.identifier.common_addr);
        assert_eq!(con.raw, asdu.raw);
        Ok(())
    }
}
