pub mod clock;

pub use clock::{Clock, ManualClock, MonotonicClock, Timebase};

/// Error type returned by hardware-facing traits.
pub type HwResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Anything that can be switched on and off: a relay coil, a hopper motor
/// driver, or a bidirectional DC motor bridge.
pub trait Actuator {
    fn energize(&mut self, on: bool) -> HwResult<()>;

    /// Drive in the primary direction. Single-direction actuators just turn on.
    fn forward(&mut self) -> HwResult<()> {
        self.energize(true)
    }

    /// Drive in the opposite direction.
    fn reverse(&mut self) -> HwResult<()> {
        Err("reverse drive not supported by this actuator".into())
    }

    fn stop(&mut self) -> HwResult<()> {
        self.energize(false)
    }
}

/// Stepper motor that advances by whole steps and returns when done.
///
/// The call blocks for the whole move, so callers on the control loop ask
/// for a few steps at a time.
pub trait Stepper {
    fn advance(&mut self, steps: u32) -> HwResult<()>;
}

/// A digital input sampled by the control loop (coin sensor, limit switch).
///
/// `is_active` reports the logical level; polarity is the implementor's
/// concern.
pub trait LevelInput {
    fn is_active(&mut self) -> bool;
}

impl<T: Actuator + ?Sized> Actuator for Box<T> {
    fn energize(&mut self, on: bool) -> HwResult<()> {
        (**self).energize(on)
    }
    fn forward(&mut self) -> HwResult<()> {
        (**self).forward()
    }
    fn reverse(&mut self) -> HwResult<()> {
        (**self).reverse()
    }
    fn stop(&mut self) -> HwResult<()> {
        (**self).stop()
    }
}

impl<T: Stepper + ?Sized> Stepper for Box<T> {
    fn advance(&mut self, steps: u32) -> HwResult<()> {
        (**self).advance(steps)
    }
}

impl<T: LevelInput + ?Sized> LevelInput for Box<T> {
    fn is_active(&mut self) -> bool {
        (**self).is_active()
    }
}
