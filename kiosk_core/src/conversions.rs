//! `From` implementations bridging `kiosk_config` types to `kiosk_core` types.
//!
//! Per-instance sections carry their own timings; the progress status period
//! comes from `[runtime]`, hence the tuple sources.

use kiosk_config::{CounterCfg, DutyCfg, HopperCfg, PaperCfg, RuntimeCfg};

use crate::dispense::{DispenseCfg, DutyCycle};
use crate::feed::FeedCfg;

// ── DutyCycle ────────────────────────────────────────────────────────────────

impl From<&DutyCfg> for DutyCycle {
    fn from(c: &DutyCfg) -> Self {
        Self {
            pulse_ms: c.pulse_ms,
            cool_ms: c.cool_ms,
            settle_ms: c.settle_ms,
            recent_unit_ms: c.recent_unit_ms,
        }
    }
}

// ── DispenseCfg ──────────────────────────────────────────────────────────────

impl From<(&CounterCfg, &RuntimeCfg)> for DispenseCfg {
    fn from((c, rt): (&CounterCfg, &RuntimeCfg)) -> Self {
        Self {
            timeout_ms: c.timeout_ms,
            status_interval_ms: rt.status_interval_ms,
            duty: None,
        }
    }
}

impl From<(&HopperCfg, &RuntimeCfg)> for DispenseCfg {
    fn from((h, rt): (&HopperCfg, &RuntimeCfg)) -> Self {
        Self {
            timeout_ms: h.timeout_ms,
            status_interval_ms: rt.status_interval_ms,
            duty: Some(DutyCycle::from(&h.duty)),
        }
    }
}

// ── FeedCfg ──────────────────────────────────────────────────────────────────

impl From<(&PaperCfg, &RuntimeCfg)> for FeedCfg {
    fn from((p, rt): (&PaperCfg, &RuntimeCfg)) -> Self {
        Self {
            steps_per_sheet: p.steps_per_sheet,
            steps_per_tick: p.steps_per_tick,
            settle_ms: p.settle_ms,
            ramp_down_ms: p.ramp_down_ms,
            home_timeout_ms: p.home_timeout_ms,
            limit_debounce_ms: p.limit_debounce_ms,
            status_interval_ms: rt.status_interval_ms,
        }
    }
}
