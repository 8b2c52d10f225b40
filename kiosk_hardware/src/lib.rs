pub mod error;
#[cfg(all(feature = "hardware", target_os = "linux"))]
pub mod gpio;
pub mod util;

use kiosk_traits::{Actuator, Clock, HwResult, LevelInput, Stepper};
use std::cell::Cell;
use std::rc::Rc;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::error::HwError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Drive {
    #[default]
    Off,
    Forward,
    Reverse,
}

/// Read-only view of a simulated actuator's drive state.
#[derive(Debug, Clone, Default)]
pub struct DriveProbe(Rc<Cell<Drive>>);

impl DriveProbe {
    pub fn drive(&self) -> Drive {
        self.0.get()
    }

    pub fn is_on(&self) -> bool {
        self.0.get() != Drive::Off
    }
}

/// Simulated relay coil or motor driver.
#[derive(Debug)]
pub struct SimActuator {
    label: String,
    drive: Rc<Cell<Drive>>,
    reversible: bool,
    fail: Rc<Cell<bool>>,
}

impl SimActuator {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            drive: Rc::new(Cell::new(Drive::Off)),
            reversible: false,
            fail: Rc::new(Cell::new(false)),
        }
    }

    /// An H-bridge style motor that can also run backwards.
    pub fn reversible(label: impl Into<String>) -> Self {
        Self {
            reversible: true,
            ..Self::new(label)
        }
    }

    pub fn probe(&self) -> DriveProbe {
        DriveProbe(Rc::clone(&self.drive))
    }

    /// Shared switch that makes every subsequent call fail while set.
    pub fn fault_switch(&self) -> Rc<Cell<bool>> {
        Rc::clone(&self.fail)
    }

    fn set(&mut self, d: Drive) -> HwResult<()> {
        if self.fail.get() {
            return Err(Box::new(HwError::Injected("actuator")));
        }
        if self.drive.get() != d {
            tracing::debug!(actuator = %self.label, drive = ?d, "sim drive");
        }
        self.drive.set(d);
        Ok(())
    }
}

impl Actuator for SimActuator {
    fn energize(&mut self, on: bool) -> HwResult<()> {
        self.set(if on { Drive::Forward } else { Drive::Off })
    }

    fn reverse(&mut self) -> HwResult<()> {
        if !self.reversible {
            return Err(Box::new(HwError::Unsupported("reverse drive")));
        }
        self.set(Drive::Reverse)
    }
}

/// Level input driven by test code or a simulation thread on the same loop.
#[derive(Debug, Clone, Default)]
pub struct SimInput {
    level: Rc<Cell<bool>>,
}

impl SimInput {
    pub fn new(initial: bool) -> Self {
        Self {
            level: Rc::new(Cell::new(initial)),
        }
    }

    pub fn set(&self, active: bool) {
        self.level.set(active);
    }
}

impl LevelInput for SimInput {
    fn is_active(&mut self) -> bool {
        self.level.get()
    }
}

/// Stepper that only counts the steps it was asked for.
#[derive(Debug, Clone, Default)]
pub struct SimStepper {
    steps: Rc<Cell<u64>>,
    moves: Rc<Cell<u32>>,
    fail: Rc<Cell<bool>>,
}

impl SimStepper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total_steps(&self) -> u64 {
        self.steps.get()
    }

    pub fn moves(&self) -> u32 {
        self.moves.get()
    }

    pub fn fail_next(&self, on: bool) {
        self.fail.set(on);
    }
}

impl Stepper for SimStepper {
    fn advance(&mut self, steps: u32) -> HwResult<()> {
        if self.fail.get() {
            return Err(Box::new(HwError::Injected("stepper")));
        }
        self.steps.set(self.steps.get() + u64::from(steps));
        self.moves.set(self.moves.get() + 1);
        Ok(())
    }
}

/// Coin sensor that reports a coin passing every `period` while the
/// watched actuator is on, half a period after it switched on.
pub struct AutoCoinSensor {
    drive: DriveProbe,
    clock: Arc<dyn Clock + Send + Sync>,
    period: Duration,
    width: Duration,
    on_since: Option<Instant>,
}

impl AutoCoinSensor {
    pub const DEFAULT_PERIOD: Duration = Duration::from_millis(400);

    pub fn new(drive: DriveProbe, clock: Arc<dyn Clock + Send + Sync>) -> Self {
        Self {
            drive,
            clock,
            period: Self::DEFAULT_PERIOD,
            width: Self::DEFAULT_PERIOD / 4,
            on_since: None,
        }
    }

    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = period.max(Duration::from_millis(4));
        self.width = self.period / 4;
        self
    }
}

impl LevelInput for AutoCoinSensor {
    fn is_active(&mut self) -> bool {
        if !self.drive.is_on() {
            self.on_since = None;
            return false;
        }
        let now = self.clock.now();
        let since = *self.on_since.get_or_insert(now);
        let period_ms = self.period.as_millis().max(1);
        let phase = now.saturating_duration_since(since).as_millis() % period_ms;
        let start = period_ms / 2;
        (start..start + self.width.as_millis()).contains(&phase)
    }
}

/// Paper position switch that closes once the feed motor has pulled
/// forward for `travel` and opens again when it reverses.
pub struct AutoPositionSensor {
    drive: DriveProbe,
    clock: Arc<dyn Clock + Send + Sync>,
    travel: Duration,
    forward_since: Option<Instant>,
    homed: bool,
}

impl AutoPositionSensor {
    pub fn new(drive: DriveProbe, clock: Arc<dyn Clock + Send + Sync>, travel: Duration) -> Self {
        Self {
            drive,
            clock,
            travel,
            forward_since: None,
            homed: false,
        }
    }
}

impl LevelInput for AutoPositionSensor {
    fn is_active(&mut self) -> bool {
        match self.drive.drive() {
            Drive::Forward => {
                let now = self.clock.now();
                let since = *self.forward_since.get_or_insert(now);
                if now.saturating_duration_since(since) >= self.travel {
                    self.homed = true;
                }
            }
            Drive::Reverse => {
                self.forward_since = None;
                self.homed = false;
            }
            Drive::Off => self.forward_since = None,
        }
        self.homed
    }
}

/// Pacing of a simulated coin acceptor.
#[derive(Debug, Clone, Copy)]
pub struct AcceptorTiming {
    pub pulse_gap: Duration,
    pub coin_gap: Duration,
}

impl Default for AcceptorTiming {
    fn default() -> Self {
        Self {
            pulse_gap: Duration::from_millis(100),
            coin_gap: Duration::from_millis(600),
        }
    }
}

/// Fire pulse trains from a helper thread, the way an acceptor's interrupt
/// line would. `coins` lists the pulse count of each coin.
pub fn spawn_acceptor<F>(coins: Vec<u16>, timing: AcceptorTiming, on_edge: F) -> JoinHandle<()>
where
    F: Fn() + Send + 'static,
{
    std::thread::spawn(move || {
        for pulses in coins {
            std::thread::sleep(timing.coin_gap);
            tracing::debug!(pulses, "sim acceptor coin");
            for _ in 0..pulses {
                on_edge();
                std::thread::sleep(timing.pulse_gap);
            }
        }
    })
}
