//! Stand-ins for hardware that is not wired.

/// An actuator with nothing behind it; a coin counter fed by hand uses this
/// in place of a relay channel.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopActuator;

impl kiosk_traits::Actuator for NoopActuator {
    fn energize(&mut self, _on: bool) -> kiosk_traits::HwResult<()> {
        Ok(())
    }
}
