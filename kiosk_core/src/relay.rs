//! Numbered relay channels.
//!
//! Channel state follows the relay board convention: `off == true` means the
//! coil is de-energized. The bank is shared inside the single-threaded loop
//! between its command component and any counter that drives a channel.
use std::cell::RefCell;
use std::rc::Rc;

use kiosk_traits::{Actuator, HwResult};

use crate::error::KioskError;
use crate::hw_error::best_effort;

#[derive(Debug)]
pub struct RelayBank<A> {
    name: String,
    outputs: Vec<A>,
    off: Vec<bool>,
}

pub type SharedRelayBank<A> = Rc<RefCell<RelayBank<A>>>;

impl<A: Actuator> RelayBank<A> {
    /// Build a bank and drive every output to OFF.
    pub fn new(name: impl Into<String>, outputs: Vec<A>) -> Self {
        let mut bank = Self {
            name: name.into(),
            off: vec![true; outputs.len()],
            outputs,
        };
        for out in &mut bank.outputs {
            best_effort("stop", &bank.name, out.stop());
        }
        bank
    }

    pub fn shared(self) -> SharedRelayBank<A> {
        Rc::new(RefCell::new(self))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    fn index(&self, channel: i64) -> Result<usize, KioskError> {
        usize::try_from(channel)
            .ok()
            .filter(|c| (1..=self.outputs.len()).contains(c))
            .map(|c| c - 1)
            .ok_or_else(|| {
                KioskError::InvalidInput(format!(
                    "relay channel must be in 1..={}, got {channel}",
                    self.outputs.len()
                ))
            })
    }

    /// Switch a channel (1-based). Setting the current state again is a no-op.
    pub fn set_relay(&mut self, channel: i64, on: bool) -> Result<(), KioskError> {
        let idx = self.index(channel)?;
        if self.off[idx] == !on {
            return Ok(());
        }
        let result = if on {
            self.outputs[idx].energize(true)
        } else {
            self.outputs[idx].stop()
        };
        if let Some(err) = best_effort("set_relay", &self.name, result) {
            return Err(err);
        }
        self.off[idx] = !on;
        tracing::debug!(bank = %self.name, channel, on, "relay switched");
        Ok(())
    }

    /// True when the channel is energized.
    pub fn is_on(&self, channel: i64) -> Result<bool, KioskError> {
        let idx = self.index(channel)?;
        Ok(!self.off[idx])
    }

    /// Channel states in order, `true` meaning OFF.
    pub fn states(&self) -> &[bool] {
        &self.off
    }

    pub fn all_off(&mut self) {
        for (out, off) in self.outputs.iter_mut().zip(self.off.iter_mut()) {
            best_effort("stop", &self.name, out.stop());
            *off = true;
        }
    }
}

/// One bank channel seen as an `Actuator`, so a dispense controller can
/// drive it.
#[derive(Debug)]
pub struct RelayChannel<A> {
    bank: SharedRelayBank<A>,
    channel: i64,
}

impl<A: Actuator> RelayChannel<A> {
    pub fn new(bank: SharedRelayBank<A>, channel: u8) -> Self {
        Self {
            bank,
            channel: i64::from(channel),
        }
    }
}

impl<A: Actuator> Actuator for RelayChannel<A> {
    fn energize(&mut self, on: bool) -> HwResult<()> {
        let mut bank = self
            .bank
            .try_borrow_mut()
            .map_err(|_| format!("relay bank busy while switching channel {}", self.channel))?;
        bank.set_relay(self.channel, on)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default, Debug)]
    struct Coil {
        on: bool,
        calls: u32,
    }

    impl Actuator for Coil {
        fn energize(&mut self, on: bool) -> HwResult<()> {
            self.on = on;
            self.calls += 1;
            Ok(())
        }
    }

    #[test]
    fn channels_start_off_and_switch_idempotently() {
        let mut bank = RelayBank::new("Relay", vec![Coil::default(), Coil::default()]);
        assert_eq!(bank.states(), &[true, true]);
        bank.set_relay(2, true).expect("on");
        bank.set_relay(2, true).expect("on again");
        assert_eq!(bank.states(), &[true, false]);
        assert_eq!(bank.outputs[1].calls, 2, "initial stop plus one switch");
        assert!(bank.is_on(2).expect("valid"));
    }

    #[test]
    fn out_of_range_channel_is_invalid_input() {
        let mut bank = RelayBank::new("Relay", vec![Coil::default()]);
        assert!(matches!(bank.set_relay(0, true), Err(KioskError::InvalidInput(_))));
        assert!(matches!(bank.set_relay(2, true), Err(KioskError::InvalidInput(_))));
        assert!(matches!(bank.set_relay(-1, false), Err(KioskError::InvalidInput(_))));
    }

    #[test]
    fn relay_channel_drives_shared_bank() {
        let bank = RelayBank::new("Relay", vec![Coil::default(), Coil::default()]).shared();
        let mut ch = RelayChannel::new(Rc::clone(&bank), 1);
        ch.energize(true).expect("energize");
        assert_eq!(bank.borrow().states(), &[false, true]);
        ch.stop().expect("stop");
        assert_eq!(bank.borrow().states(), &[true, true]);
    }
}
