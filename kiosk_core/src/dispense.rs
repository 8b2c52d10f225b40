//! Target-count dispensing shared by coin counters and hoppers.
//!
//! The controller runs an actuator until the sensor has confirmed `target`
//! units, or until no unit has been seen for `timeout_ms`. Hoppers add a
//! duty cycle so the motor rests between ON pulses.
use kiosk_traits::Actuator;

use crate::error::KioskError;
use crate::hw_error::best_effort;
use crate::notify::Pending;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Idle,
    Running,
    TargetReached,
    TimedOut,
}

impl JobState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "dispensing",
            Self::TargetReached => "target_reached",
            Self::TimedOut => "timed_out",
        }
    }
}

/// ON/OFF pacing for motors that must not run continuously.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DutyCycle {
    pub pulse_ms: u64,
    pub cool_ms: u64,
    /// Sensor edges this soon after an ON pulse begins are motor noise
    pub settle_ms: u64,
    /// Next ON pulse waits while a unit was confirmed this recently
    pub recent_unit_ms: u64,
}

impl Default for DutyCycle {
    fn default() -> Self {
        Self {
            pulse_ms: 1000,
            cool_ms: 500,
            settle_ms: 150,
            recent_unit_ms: 50,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispenseCfg {
    pub timeout_ms: u64,
    pub status_interval_ms: u64,
    pub duty: Option<DutyCycle>,
}

impl Default for DispenseCfg {
    fn default() -> Self {
        Self {
            timeout_ms: 3000,
            status_interval_ms: 1000,
            duty: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispenseEvent {
    TargetReached { count: u32, target: u32 },
}

/// What happened to a confirmed sensor unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitOutcome {
    Counted,
    Completed,
    /// Arrived inside the settle window of an ON pulse
    Settling,
    /// No job running
    Ignored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Off,
    On { since: u64 },
    Cooling { since: u64 },
}

#[derive(Debug)]
pub struct DispenseController<A> {
    label: String,
    actuator: A,
    cfg: DispenseCfg,
    state: JobState,
    target: u32,
    count: u32,
    last_unit_ms: u64,
    last_status_ms: u64,
    pulse_started_ms: u64,
    phase: Phase,
    pending: Pending<DispenseEvent, KioskError>,
}

impl<A: Actuator> DispenseController<A> {
    pub fn new(label: impl Into<String>, actuator: A, cfg: DispenseCfg) -> Self {
        Self {
            label: label.into(),
            actuator,
            cfg,
            state: JobState::Idle,
            target: 0,
            count: 0,
            last_unit_ms: 0,
            last_status_ms: 0,
            pulse_started_ms: 0,
            phase: Phase::Off,
            pending: Pending::default(),
        }
    }

    pub fn start(&mut self, target: i64, now_ms: u64) -> Result<(), KioskError> {
        if target <= 0 {
            return Err(KioskError::InvalidInput(format!(
                "target must be > 0, got {target}"
            )));
        }
        let target = u32::try_from(target)
            .map_err(|_| KioskError::InvalidInput(format!("target {target} is too large")))?;
        if self.state == JobState::Running {
            return Err(KioskError::Busy);
        }

        self.count = 0;
        self.target = target;
        self.state = JobState::Running;
        self.last_unit_ms = now_ms;
        self.last_status_ms = now_ms;
        self.drive_on(now_ms);
        tracing::info!(instance = %self.label, target, "dispense started");
        self.pending.raise_status();
        Ok(())
    }

    pub fn on_unit(&mut self, now_ms: u64) -> UnitOutcome {
        if self.state != JobState::Running {
            return UnitOutcome::Ignored;
        }
        if let Some(duty) = self.cfg.duty
            && now_ms.saturating_sub(self.pulse_started_ms) < duty.settle_ms
        {
            tracing::trace!(instance = %self.label, "unit inside settle window ignored");
            return UnitOutcome::Settling;
        }

        self.count += 1;
        self.last_unit_ms = now_ms;
        if self.count >= self.target {
            self.state = JobState::TargetReached;
            self.drive_off();
            tracing::info!(instance = %self.label, count = self.count, "target reached");
            self.pending.raise_event(DispenseEvent::TargetReached {
                count: self.count,
                target: self.target,
            });
            UnitOutcome::Completed
        } else {
            tracing::debug!(instance = %self.label, count = self.count, target = self.target, "unit counted");
            self.pending.raise_status();
            UnitOutcome::Counted
        }
    }

    pub fn tick(&mut self, now_ms: u64) {
        if self.state != JobState::Running {
            return;
        }

        if now_ms.saturating_sub(self.last_unit_ms) >= self.cfg.timeout_ms {
            self.state = JobState::TimedOut;
            self.drive_off();
            tracing::warn!(
                instance = %self.label,
                count = self.count,
                target = self.target,
                "no unit within timeout; stopping"
            );
            self.pending.raise_error(KioskError::Timeout {
                count: self.count,
                target: self.target,
            });
            return;
        }

        if let Some(duty) = self.cfg.duty {
            match self.phase {
                Phase::On { since } if now_ms.saturating_sub(since) >= duty.pulse_ms => {
                    best_effort("energize", &self.label, self.actuator.energize(false));
                    self.phase = Phase::Cooling { since: now_ms };
                }
                Phase::Cooling { since }
                    if now_ms.saturating_sub(since) >= duty.cool_ms
                        && now_ms.saturating_sub(self.last_unit_ms) >= duty.recent_unit_ms =>
                {
                    best_effort("energize", &self.label, self.actuator.energize(true));
                    self.phase = Phase::On { since: now_ms };
                    self.pulse_started_ms = now_ms;
                }
                _ => {}
            }
        }

        if now_ms.saturating_sub(self.last_status_ms) >= self.cfg.status_interval_ms {
            self.last_status_ms = now_ms;
            self.pending.raise_status();
        }
    }

    /// Process a sensor unit (if any) and then the timers, in that order.
    pub fn step(&mut self, now_ms: u64, unit: bool) -> Option<UnitOutcome> {
        let outcome = unit.then(|| self.on_unit(now_ms));
        self.tick(now_ms);
        outcome
    }

    /// Halt without completion. Returns whether a job was running.
    pub fn stop(&mut self) -> bool {
        let was_running = self.state == JobState::Running;
        if was_running {
            self.state = JobState::Idle;
            tracing::info!(instance = %self.label, count = self.count, "dispense stopped");
        }
        self.drive_off();
        was_running
    }

    pub fn reset(&mut self) {
        self.drive_off();
        self.state = JobState::Idle;
        self.count = 0;
        self.target = 0;
        self.last_unit_ms = 0;
        self.pending = Pending::default();
        self.pending.raise_status();
    }

    fn drive_on(&mut self, now_ms: u64) {
        best_effort("energize", &self.label, self.actuator.energize(true));
        self.pulse_started_ms = now_ms;
        if self.cfg.duty.is_some() {
            self.phase = Phase::On { since: now_ms };
        }
    }

    fn drive_off(&mut self) {
        best_effort("stop", &self.label, self.actuator.stop());
        self.phase = Phase::Off;
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == JobState::Running
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn target(&self) -> u32 {
        self.target
    }

    pub fn pending_mut(&mut self) -> &mut Pending<DispenseEvent, KioskError> {
        &mut self.pending
    }

    pub fn actuator(&self) -> &A {
        &self.actuator
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Coil {
        on: bool,
        switches: u32,
    }

    impl Actuator for Coil {
        fn energize(&mut self, on: bool) -> kiosk_traits::HwResult<()> {
            if self.on != on {
                self.switches += 1;
            }
            self.on = on;
            Ok(())
        }
    }

    fn hopper(timeout_ms: u64) -> DispenseController<Coil> {
        DispenseController::new(
            "H",
            Coil::default(),
            DispenseCfg {
                timeout_ms,
                status_interval_ms: 1000,
                duty: Some(DutyCycle::default()),
            },
        )
    }

    #[test]
    fn duty_cycle_rests_between_pulses() {
        let mut c = hopper(10_000);
        c.start(3, 0).expect("start");
        assert!(c.actuator().on);
        c.tick(999);
        assert!(c.actuator().on);
        c.tick(1000);
        assert!(!c.actuator().on);
        c.tick(1499);
        assert!(!c.actuator().on);
        c.tick(1500);
        assert!(c.actuator().on);
    }

    #[test]
    fn recent_unit_defers_next_pulse() {
        let mut c = hopper(10_000);
        c.start(3, 0).expect("start");
        c.tick(1000);
        assert_eq!(c.on_unit(1480), UnitOutcome::Counted);
        c.tick(1500);
        assert!(!c.actuator().on, "unit 20ms ago holds the motor off");
        c.tick(1530);
        assert!(c.actuator().on);
    }

    #[test]
    fn settle_window_rejects_motor_noise() {
        let mut c = hopper(10_000);
        c.start(2, 0).expect("start");
        assert_eq!(c.on_unit(100), UnitOutcome::Settling);
        assert_eq!(c.count(), 0);
        assert_eq!(c.on_unit(150), UnitOutcome::Counted);
    }

    #[test]
    fn reset_clears_outstanding_notifications() {
        let mut c = hopper(100);
        c.start(2, 0).expect("start");
        c.tick(100);
        assert_eq!(c.state(), JobState::TimedOut);
        c.reset();
        assert_eq!(c.pending_mut().take_error(), None);
        assert!(c.pending_mut().take_status());
        assert_eq!((c.count(), c.target()), (0, 0));
    }
}
