//! Raspberry Pi GPIO drivers (rppal).
use std::time::Duration;

use kiosk_traits::{Actuator, HwResult, LevelInput, Stepper};
use rppal::gpio::{Gpio, InputPin, Level, OutputPin, Trigger};

use crate::error::{HwError, Result};
use crate::util::pulse_train;

fn gpio() -> Result<Gpio> {
    Gpio::new().map_err(|e| HwError::Gpio(e.to_string()))
}

fn output(gpio: &Gpio, pin: u8) -> Result<OutputPin> {
    Ok(gpio
        .get(pin)
        .map_err(|e| HwError::Gpio(format!("pin {pin}: {e}")))?
        .into_output_low())
}

fn input_pullup(gpio: &Gpio, pin: u8) -> Result<InputPin> {
    Ok(gpio
        .get(pin)
        .map_err(|e| HwError::Gpio(format!("pin {pin}: {e}")))?
        .into_input_pullup())
}

/// Single relay or motor-driver enable line.
pub struct GpioSwitch {
    pin: OutputPin,
    active_low: bool,
}

impl GpioSwitch {
    pub fn new(pin: u8, active_low: bool) -> Result<Self> {
        let mut s = Self {
            pin: output(&gpio()?, pin)?,
            active_low,
        };
        s.write(false);
        Ok(s)
    }

    fn write(&mut self, on: bool) {
        if on != self.active_low {
            self.pin.set_high();
        } else {
            self.pin.set_low();
        }
    }
}

impl Actuator for GpioSwitch {
    fn energize(&mut self, on: bool) -> HwResult<()> {
        self.write(on);
        Ok(())
    }
}

/// DC motor on an H-bridge (IN1/IN2 plus optional enable).
pub struct GpioDcMotor {
    in1: OutputPin,
    in2: OutputPin,
    en: Option<OutputPin>,
}

impl GpioDcMotor {
    pub fn new(in1: u8, in2: u8, en: Option<u8>) -> Result<Self> {
        let gpio = gpio()?;
        Ok(Self {
            in1: output(&gpio, in1)?,
            in2: output(&gpio, in2)?,
            en: en.map(|p| output(&gpio, p)).transpose()?,
        })
    }

    fn drive(&mut self, in1: bool, in2: bool) {
        self.in1.write(Level::from(in1));
        self.in2.write(Level::from(in2));
        if let Some(en) = self.en.as_mut() {
            en.write(Level::from(in1 || in2));
        }
    }
}

impl Actuator for GpioDcMotor {
    fn energize(&mut self, on: bool) -> HwResult<()> {
        if on {
            self.drive(true, false);
        } else {
            self.drive(false, false);
        }
        Ok(())
    }

    fn reverse(&mut self) -> HwResult<()> {
        self.drive(false, true);
        Ok(())
    }
}

/// Step/direction stepper driver.
pub struct GpioStepper {
    step: OutputPin,
    dir: OutputPin,
    half_period: Duration,
}

impl GpioStepper {
    pub fn new(step: u8, dir: u8, step_us: u64) -> Result<Self> {
        let gpio = gpio()?;
        Ok(Self {
            step: output(&gpio, step)?,
            dir: output(&gpio, dir)?,
            half_period: Duration::from_micros(step_us),
        })
    }
}

impl Stepper for GpioStepper {
    fn advance(&mut self, steps: u32) -> HwResult<()> {
        self.dir.set_high();
        let step = &mut self.step;
        pulse_train(|high| step.write(Level::from(high)), steps, self.half_period);
        tracing::trace!(steps, "stepper advanced");
        Ok(())
    }
}

/// Polled digital input with pull-up.
pub struct GpioInput {
    pin: InputPin,
    active_low: bool,
}

impl GpioInput {
    pub fn new(pin: u8, active_low: bool) -> Result<Self> {
        Ok(Self {
            pin: input_pullup(&gpio()?, pin)?,
            active_low,
        })
    }
}

impl LevelInput for GpioInput {
    fn is_active(&mut self) -> bool {
        if self.active_low {
            self.pin.is_low()
        } else {
            self.pin.is_high()
        }
    }
}

/// Call `on_edge` from rppal's interrupt thread on every falling edge.
/// The returned pin must be kept alive for the interrupt to stay armed.
pub fn watch_falling_edges<F>(pin: u8, mut on_edge: F) -> Result<InputPin>
where
    F: FnMut() + Send + 'static,
{
    let mut input = input_pullup(&gpio()?, pin)?;
    input
        .set_async_interrupt(Trigger::FallingEdge, move |_level: Level| on_edge())
        .map_err(|e| HwError::Gpio(format!("pin {pin} interrupt: {e}")))?;
    tracing::info!(pin, "edge interrupt armed");
    Ok(input)
}
