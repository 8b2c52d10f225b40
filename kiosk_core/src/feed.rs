//! Paper sheet feed sequencing.
//!
//! A feed motor pulls the paper until the position sensor reports a sheet at
//! the cutter, the stepper advances one sheet length, and the cycle repeats.
//! When the job ends the feed motor runs in reverse for a while to slacken
//! the roll. Every wait is a state revisited on each tick, and a sheet is
//! stepped out in chunks of at most `steps_per_tick` so other instances keep
//! being serviced while the paper moves.
use kiosk_traits::{Actuator, LevelInput, Stepper};

use crate::error::KioskError;
use crate::hw_error::{best_effort, map_hw_error};
use crate::input::DebouncedInput;
use crate::notify::Pending;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedState {
    Idle,
    Homing,
    Feeding,
    RampingDown,
    Complete,
    Error,
}

impl FeedState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Homing => "homing",
            Self::Feeding => "in_progress",
            Self::RampingDown => "ramping_down",
            Self::Complete => "complete",
            Self::Error => "error",
        }
    }

    /// A job is in flight and must be stopped or finished first.
    pub fn is_busy(self) -> bool {
        matches!(self, Self::Homing | Self::Feeding | Self::RampingDown)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedCfg {
    pub steps_per_sheet: u32,
    /// Upper bound on stepper steps issued from a single tick.
    pub steps_per_tick: u32,
    pub settle_ms: u64,
    pub ramp_down_ms: u64,
    pub home_timeout_ms: u64,
    pub limit_debounce_ms: u64,
    pub status_interval_ms: u64,
}

impl Default for FeedCfg {
    fn default() -> Self {
        Self {
            steps_per_sheet: 1900,
            steps_per_tick: 8,
            settle_ms: 100,
            ramp_down_ms: 8000,
            home_timeout_ms: 10_000,
            limit_debounce_ms: 20,
            status_interval_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedEvent {
    DispenseComplete { total: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedFault {
    pub code: &'static str,
    pub details: String,
}

#[derive(Debug)]
pub struct PaperFeeder<M, S, P> {
    label: String,
    motor: M,
    stepper: S,
    position: DebouncedInput<P>,
    cfg: FeedCfg,
    state: FeedState,
    total: u32,
    current: u32,
    /// Steps still owed to the sheet being advanced; 0 between sheets.
    steps_left: u32,
    stop_requested: bool,
    homing_since_ms: u64,
    ramp_start_ms: u64,
    next_sheet_ms: u64,
    last_status_ms: u64,
    pending: Pending<FeedEvent, FeedFault>,
}

impl<M: Actuator, S: Stepper, P: LevelInput> PaperFeeder<M, S, P> {
    pub fn new(label: impl Into<String>, motor: M, stepper: S, position: P, cfg: FeedCfg) -> Self {
        Self {
            label: label.into(),
            motor,
            stepper,
            position: DebouncedInput::new(position, cfg.limit_debounce_ms),
            cfg,
            state: FeedState::Idle,
            total: 0,
            current: 0,
            steps_left: 0,
            stop_requested: false,
            homing_since_ms: 0,
            ramp_start_ms: 0,
            next_sheet_ms: 0,
            last_status_ms: 0,
            pending: Pending::default(),
        }
    }

    pub fn dispense(&mut self, sheets: i64, now_ms: u64) -> Result<(), KioskError> {
        if sheets <= 0 {
            return Err(KioskError::InvalidInput(format!(
                "sheet count must be > 0, got {sheets}"
            )));
        }
        let sheets = u32::try_from(sheets)
            .map_err(|_| KioskError::InvalidInput(format!("sheet count {sheets} is too large")))?;
        match self.state {
            FeedState::Error => {
                return Err(KioskError::MechanicalFault(
                    "feeder is jammed; reset required".into(),
                ));
            }
            s if s.is_busy() => return Err(KioskError::Busy),
            _ => {}
        }

        self.total = sheets;
        self.current = 0;
        self.steps_left = 0;
        self.stop_requested = false;
        self.last_status_ms = now_ms;
        self.enter_homing(now_ms);
        tracing::info!(instance = %self.label, sheets, "paper dispense started");
        self.pending.raise_status();
        Ok(())
    }

    pub fn stop(&mut self) -> bool {
        if !self.state.is_busy() {
            return false;
        }
        if !self.stop_requested {
            tracing::info!(instance = %self.label, current = self.current, "stop requested");
        }
        self.stop_requested = true;
        true
    }

    pub fn reset(&mut self) {
        best_effort("stop", &self.label, self.motor.stop());
        self.state = FeedState::Idle;
        self.total = 0;
        self.current = 0;
        self.steps_left = 0;
        self.stop_requested = false;
        self.pending = Pending::default();
        self.pending.raise_status();
    }

    pub fn set_steps_per_sheet(&mut self, steps: i64) -> Result<(), KioskError> {
        let steps = u32::try_from(steps)
            .ok()
            .filter(|s| *s > 0)
            .ok_or_else(|| KioskError::InvalidInput(format!("steps must be > 0, got {steps}")))?;
        self.cfg.steps_per_sheet = steps;
        tracing::debug!(instance = %self.label, steps, "steps per sheet updated");
        Ok(())
    }

    pub fn tick(&mut self, now_ms: u64) {
        self.position.poll(now_ms);
        match self.state {
            FeedState::Idle | FeedState::Error => return,
            FeedState::Homing => self.tick_homing(now_ms),
            FeedState::Feeding => self.tick_feeding(now_ms),
            FeedState::RampingDown => self.tick_ramp(now_ms),
            FeedState::Complete => {
                self.state = FeedState::Idle;
                self.total = 0;
                self.current = 0;
                tracing::debug!(instance = %self.label, "feeder idle");
            }
        }

        if self.state.is_busy()
            && now_ms.saturating_sub(self.last_status_ms) >= self.cfg.status_interval_ms
        {
            self.last_status_ms = now_ms;
            self.pending.raise_status();
        }
    }

    fn tick_homing(&mut self, now_ms: u64) {
        if self.stop_requested {
            self.enter_ramp_down(now_ms);
            return;
        }
        if self.position.is_active() {
            best_effort("stop", &self.label, self.motor.stop());
            self.state = FeedState::Feeding;
            tracing::debug!(instance = %self.label, "sheet at home position");
            return;
        }
        if now_ms.saturating_sub(self.homing_since_ms) >= self.cfg.home_timeout_ms {
            best_effort("stop", &self.label, self.motor.stop());
            self.fail(
                "jammed",
                format!(
                    "position sensor not reached within {} ms",
                    self.cfg.home_timeout_ms
                ),
            );
        }
    }

    fn tick_feeding(&mut self, now_ms: u64) {
        if self.steps_left > 0 {
            self.step_sheet(now_ms);
            return;
        }
        if now_ms < self.next_sheet_ms {
            return;
        }
        if self.current >= self.total || self.stop_requested {
            self.enter_ramp_down(now_ms);
            return;
        }
        if !self.position.is_active() {
            self.enter_homing(now_ms);
            return;
        }
        self.steps_left = self.cfg.steps_per_sheet;
        self.step_sheet(now_ms);
    }

    /// Issue the next chunk of the current sheet; count the sheet once the
    /// last chunk is out.
    fn step_sheet(&mut self, now_ms: u64) {
        let chunk = self.steps_left.min(self.cfg.steps_per_tick.max(1));
        if let Err(e) = self.stepper.advance(chunk) {
            let mapped = map_hw_error(e.as_ref());
            tracing::warn!(instance = %self.label, error = %mapped, "stepper advance failed");
            self.steps_left = 0;
            self.fail("stepper_fault", mapped.to_string());
            return;
        }
        self.steps_left -= chunk;
        if self.steps_left > 0 {
            return;
        }
        self.current += 1;
        self.next_sheet_ms = now_ms.saturating_add(self.cfg.settle_ms);
        tracing::debug!(instance = %self.label, current = self.current, total = self.total, "sheet fed");
        self.pending.raise_status();
    }

    fn tick_ramp(&mut self, now_ms: u64) {
        if now_ms.saturating_sub(self.ramp_start_ms) < self.cfg.ramp_down_ms {
            return;
        }
        best_effort("stop", &self.label, self.motor.stop());
        if self.stop_requested {
            tracing::info!(instance = %self.label, current = self.current, "paper dispense stopped");
            self.state = FeedState::Idle;
            self.stop_requested = false;
        } else {
            tracing::info!(instance = %self.label, total = self.total, "paper dispense complete");
            self.state = FeedState::Complete;
            self.pending
                .raise_event(FeedEvent::DispenseComplete { total: self.total });
        }
        self.pending.raise_status();
    }

    fn enter_homing(&mut self, now_ms: u64) {
        best_effort("forward", &self.label, self.motor.forward());
        self.state = FeedState::Homing;
        self.homing_since_ms = now_ms;
    }

    fn enter_ramp_down(&mut self, now_ms: u64) {
        best_effort("reverse", &self.label, self.motor.reverse());
        self.state = FeedState::RampingDown;
        self.ramp_start_ms = now_ms;
    }

    fn fail(&mut self, code: &'static str, details: String) {
        tracing::warn!(instance = %self.label, code, %details, "feeder fault");
        self.state = FeedState::Error;
        self.pending.raise_error(FeedFault { code, details });
    }

    /// Cut power to the feed motor without touching job bookkeeping.
    pub fn halt(&mut self) {
        best_effort("stop", &self.label, self.motor.stop());
    }

    pub fn state(&self) -> FeedState {
        self.state
    }

    pub fn current(&self) -> u32 {
        self.current
    }

    pub fn total(&self) -> u32 {
        self.total
    }

    pub fn steps_per_sheet(&self) -> u32 {
        self.cfg.steps_per_sheet
    }

    pub fn pending_mut(&mut self) -> &mut Pending<FeedEvent, FeedFault> {
        &mut self.pending
    }

    pub fn motor(&self) -> &M {
        &self.motor
    }

    pub fn stepper(&self) -> &S {
        &self.stepper
    }
}
