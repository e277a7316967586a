//! APCI control fields and frame constructors — link-transport layer.

use super::{
    asdu::{Asdu, IDENTIFIER_SIZE},
    Apdu,
};
use std::fmt::Display;

pub const START_FRAME: u8 = 0x68;

// APDU form, max size 255
//      |              APCI                   |       ASDU         |
//      | start | APDU length | control field |       ASDU         |
// bytes|    1  |    1        |        4      |                    |
pub const APCI_FIELD_SIZE: usize = 6;
pub const APCICTL_FIELD_SIZE: usize = 4;
pub const APDU_SIZE_MAX: usize = 255;

// U-frame control functions
pub const U_STARTDT_ACTIVE: u8 = 0x04;
pub const U_STARTDT_CONFIRM: u8 = 0x08;
pub const U_STOPDT_ACTIVE: u8 = 0x10;
pub const U_STOPDT_CONFIRM: u8 = 0x20;
pub const U_TESTFR_ACTIVE: u8 = 0x40;
pub const U_TESTFR_CONFIRM: u8 = 0x80;

#[derive(Debug, Clone, Copy)]
pub struct Apci {
    pub start: u8,
    pub apdu_length: u8,
    pub ctrl1: u8,
    pub ctrl2: u8,
    pub ctrl3: u8,
    pub ctrl4: u8,
}

impl Display for Apci {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("[{:02X}]", self.start))?;
        f.write_fmt(format_args!("[{:02X}]", self.apdu_length))?;
        f.write_fmt(format_args!("[{:02X}]", self.ctrl1))?;
        f.write_fmt(format_args!("[{:02X}]", self.ctrl2))?;
        f.write_fmt(format_args!("[{:02X}]", self.ctrl3))?;
        f.write_fmt(format_args!("[{:02X}]", self.ctrl4))?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct IApci {
    pub send_sn: u16,
    pub rcv_sn: u16,
}

#[derive(Debug, Clone, Copy)]
pub struct UApci {
    pub function: u8,
}

#[derive(Debug, Clone, Copy)]
pub struct SApci {
    pub rcv_sn: u16,
}

pub enum ApciKind {
    I(IApci),
    U(UApci),
    S(SApci),
}

impl From<Apci> for ApciKind {
    fn from(apci: Apci) -> Self {
        if apci.ctrl1 & 0x01 == 0 {
            return ApciKind::I(IApci {
                send_sn: ((apci.ctrl1 as u16) >> 1) + ((apci.ctrl2 as u16) << 7),
                rcv_sn: ((apci.ctrl3 as u16) >> 1) + ((apci.ctrl4 as u16) << 7),
            });
        }

        if apci.ctrl1 & 0x03 == 0x01 {
            return ApciKind::S(SApci {
                rcv_sn: ((apci.ctrl3 as u16) >> 1) + ((apci.ctrl4 as u16) << 7),
            });
        }

        ApciKind::U(UApci {
            function: apci.ctrl1 & 0xfc,
        })
    }
}

#[inline]
pub fn new_iframe(asdu: Asdu, send_sn: u16, rcv_sn: u16) -> Apdu {
    let apci = Apci {
        start: START_FRAME,
        apdu_length: APCICTL_FIELD_SIZE as u8 + IDENTIFIER_SIZE as u8 + asdu.raw.len() as u8,
        ctrl1: (send_sn << 1) as u8,
        ctrl2: (send_sn >> 7) as u8,
        ctrl3: (rcv_sn << 1) as u8,
        ctrl4: (rcv_sn >> 7) as u8,
    };
    Apdu {
        apci,
        asdu: Some(asdu),
    }
}

#[inline]
pub fn new_sframe(rcv_sn: u16) -> Apdu {
    Apdu {
        apci: Apci {
            start: START_FRAME,
            apdu_length: APCICTL_FIELD_SIZE as u8,
            ctrl1: 0x01,
            ctrl2: 0x00,
            ctrl3: (rcv_sn << 1) as u8,
            ctrl4: (rcv_sn >> 7) as u8,
        },
        asdu: None,
    }
}

#[inline]
pub fn new_uframe(function: u8) -> Apdu {
    Apdu {
        apci: Apci {
            start: START_FRAME,
            apdu_length: APCICTL_FIELD_SIZE as u8,
            ctrl1: function | 0x03,
            ctrl2: 0x00,
            ctrl3: 0x00,
            ctrl4: 0x00,
        },
        asdu: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iframe_sequence_numbers_round_trip() {
        let asdu_raw_len = 0;
        for (send, rcv) in [(0u16, 0u16), (1, 2), (127, 128), (32767, 16384)] {
            let apdu = Apdu {
                apci: Apci {
                    start: START_FRAME,
                    apdu_length: (APCICTL_FIELD_SIZE + IDENTIFIER_SIZE + asdu_raw_len) as u8,
                    ctrl1: (send << 1) as u8,
                    ctrl2: (send >> 7) as u8,
                    ctrl3: (rcv << 1) as u8,
                    ctrl4: (rcv >> 7) as u8,
                },
                asdu: None,
            };
            match ApciKind::from(apdu.apci) {
                ApciKind::I(i) => {
                    assert_eq!(i.send_sn, send);
                    assert_eq!(i.rcv_sn, rcv);
                }
                _ => panic!("expected I-frame"),
            }
        }
    }

    #[test]
    fn uframe_functions_classify() {
        for function in [
            U_STARTDT_ACTIVE,
            U_STARTDT_CONFIRM,
            U_STOPDT_ACTIVE,
            U_STOPDT_CONFIRM,
            U_TESTFR_ACTIVE,
            U_TESTFR_CONFIRM,
        ] {
            let apdu = new_uframe(function);
            match ApciKind::from(apdu.apci) {
                ApciKind::U(u) => assert_eq!(u.function, function),
                _ => panic!("expected U-frame"),
            }
        }
    }
}
