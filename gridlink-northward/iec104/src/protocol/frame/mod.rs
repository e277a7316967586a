pub mod apci;
pub mod asdu;
pub mod csys;
pub mod mproc;
pub mod time;

use apci::Apci;
use asdu::Asdu;

/// One application protocol data unit: the APCI control fields plus, for
/// I-format frames, an ASDU.
#[derive(Debug, Clone)]
pub struct Apdu {
    pub apci: Apci,
    pub asdu: Option<Asdu>,
}
