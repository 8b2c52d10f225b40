//! Addressable kiosk instances built on the engine's state machines.
mod coin_slot;
mod dispenser;
mod paper;
mod relay;

pub use coin_slot::CoinSlot;
pub use dispenser::CountingDispenser;
pub use paper::PaperDispenser;
pub use relay::RelayControl;

use crate::error::CommandError;
use crate::protocol::{Param, Request};

pub(crate) fn require_int(req: &Request) -> Result<i64, CommandError> {
    match req.value {
        Param::Int(v) => Ok(v),
        Param::Missing => Err(CommandError::MissingValue(req.cmd.clone())),
        Param::Invalid => Err(CommandError::InvalidValue(req.cmd.clone())),
    }
}
