//! Coin acceptor pulse handling.
//!
//! An acceptor reports a coin as a short train of pulses. Edges arrive from
//! an interrupt or helper thread through [`PulseCounter::on_edge`]; the poll
//! loop closes a burst once the line has been quiet long enough and maps the
//! pulse count to a coin value through a [`DenominationTable`].
//!
//! The burst lives in one `AtomicU64`:
//!
//! | bits   | field                      |
//! |--------|----------------------------|
//! | 0..32  | last accepted edge (ms, wrapping) |
//! | 32..48 | pulse count                |
//! | 48     | burst active               |
//! | 49     | last edge still debounces  |
//!
//! Every update is a compare-and-swap on the whole word, so an edge racing
//! the finalize either lands in the burst being closed or starts the next one.
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use kiosk_traits::Timebase;

use crate::error::BuildError;

pub const DEFAULT_DEBOUNCE_MS: u64 = 50;
pub const DEFAULT_QUIET_WINDOW_MS: u64 = 300;

const COUNT_SHIFT: u32 = 32;
const ACTIVE_BIT: u64 = 1 << 48;
const SEEN_BIT: u64 = 1 << 49;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Burst {
    last_ms: u32,
    count: u16,
    active: bool,
    seen: bool,
}

impl Burst {
    #[inline]
    fn unpack(word: u64) -> Self {
        Self {
            last_ms: (word & 0xFFFF_FFFF) as u32,
            count: ((word >> COUNT_SHIFT) & 0xFFFF) as u16,
            active: word & ACTIVE_BIT != 0,
            seen: word & SEEN_BIT != 0,
        }
    }

    #[inline]
    fn pack(self) -> u64 {
        let mut w = u64::from(self.last_ms) | (u64::from(self.count) << COUNT_SHIFT);
        if self.active {
            w |= ACTIVE_BIT;
        }
        if self.seen {
            w |= SEEN_BIT;
        }
        w
    }
}

/// Largest backwards step between an edge stamp and a later clock read that
/// is still treated as "no time passed".
const MAX_CLOCK_SKEW_MS: u32 = 1_000;

/// Milliseconds from `then` to `now` on the wrapping 32-bit timeline.
///
/// A `now` slightly behind `then` (the callback stamped an edge after the
/// loop read its clock) counts as zero rather than as a near-full wrap.
#[inline]
fn elapsed_ms32(now: u64, then: u32) -> u64 {
    let d = (now as u32).wrapping_sub(then);
    if d > u32::MAX - MAX_CLOCK_SKEW_MS { 0 } else { u64::from(d) }
}

#[derive(Debug)]
struct Shared {
    word: AtomicU64,
    enabled: AtomicBool,
    debounce_ms: u64,
}

/// Burst state shared between the edge callback and the poll loop.
#[derive(Debug, Clone)]
pub struct PulseCounter {
    shared: Arc<Shared>,
}

impl PulseCounter {
    pub fn new(debounce_ms: u64) -> Self {
        Self {
            shared: Arc::new(Shared {
                word: AtomicU64::new(0),
                enabled: AtomicBool::new(true),
                debounce_ms,
            }),
        }
    }

    pub fn debounce_ms(&self) -> u64 {
        self.shared.debounce_ms
    }

    /// Record an edge seen at `now_ms`. Returns false when the edge was
    /// debounced away or intake is disabled.
    pub fn on_edge(&self, now_ms: u64) -> bool {
        if !self.shared.enabled.load(Ordering::Acquire) {
            return false;
        }
        let mut cur = self.shared.word.load(Ordering::Acquire);
        loop {
            let b = Burst::unpack(cur);
            if b.seen && elapsed_ms32(now_ms, b.last_ms) <= self.shared.debounce_ms {
                return false;
            }
            let next = Burst {
                last_ms: now_ms as u32,
                count: if b.active { b.count.saturating_add(1) } else { 1 },
                active: true,
                seen: true,
            };
            match self.shared.word.compare_exchange_weak(
                cur,
                next.pack(),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => cur = actual,
            }
        }
    }

    /// Close the current burst if it has been quiet for more than `quiet_ms`.
    /// Returns the pulse count of the closed burst.
    pub fn take_finished(&self, now_ms: u64, quiet_ms: u64) -> Option<u16> {
        let mut cur = self.shared.word.load(Ordering::Acquire);
        loop {
            let b = Burst::unpack(cur);
            let quiet_for = elapsed_ms32(now_ms, b.last_ms);
            if !b.active || quiet_for <= quiet_ms {
                return None;
            }
            // Debounce only spaces edges within a burst; once the last edge
            // is outside the window the next coin starts fresh.
            let next = Burst {
                count: 0,
                active: false,
                seen: b.seen && quiet_for <= self.shared.debounce_ms,
                ..b
            };
            match self.shared.word.compare_exchange_weak(
                cur,
                next.pack(),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Some(b.count),
                Err(actual) => cur = actual,
            }
        }
    }

    /// Pulses in the burst currently being collected (0 when idle).
    pub fn pending(&self) -> u16 {
        let b = Burst::unpack(self.shared.word.load(Ordering::Acquire));
        if b.active { b.count } else { 0 }
    }

    /// Drop any partial burst.
    pub fn clear(&self) {
        let mut cur = self.shared.word.load(Ordering::Acquire);
        loop {
            let next = Burst {
                count: 0,
                active: false,
                ..Burst::unpack(cur)
            };
            match self.shared.word.compare_exchange_weak(
                cur,
                next.pack(),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return,
                Err(actual) => cur = actual,
            }
        }
    }

    pub fn set_enabled(&self, on: bool) {
        self.shared.enabled.store(on, Ordering::Release);
    }

    pub fn is_enabled(&self) -> bool {
        self.shared.enabled.load(Ordering::Acquire)
    }
}

/// Handle given to edge sources that have no clock of their own, such as a
/// GPIO interrupt callback. Stamps each edge on the kiosk's timeline.
#[derive(Debug, Clone)]
pub struct EdgeHandle {
    counter: PulseCounter,
    timebase: Timebase,
}

impl EdgeHandle {
    pub fn new(counter: PulseCounter, timebase: Timebase) -> Self {
        Self { counter, timebase }
    }

    pub fn pulse(&self) -> bool {
        self.counter.on_edge(self.timebase.now_ms())
    }
}

/// Pulse count to coin value mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DenominationTable {
    entries: Vec<(u16, u32)>,
}

impl Default for DenominationTable {
    fn default() -> Self {
        Self {
            entries: kiosk_config::DEFAULT_DENOMINATIONS.to_vec(),
        }
    }
}

impl DenominationTable {
    pub fn new(entries: Vec<(u16, u32)>) -> Result<Self, BuildError> {
        if entries.is_empty() {
            return Err(BuildError::InvalidConfig("denomination table is empty"));
        }
        for (i, (pulses, value)) in entries.iter().enumerate() {
            if *pulses == 0 || *value == 0 {
                return Err(BuildError::InvalidConfig(
                    "denomination entries need pulses >= 1 and value > 0",
                ));
            }
            if entries[..i].iter().any(|(p, _)| p == pulses) {
                return Err(BuildError::InvalidConfig(
                    "denomination table repeats a pulse count",
                ));
            }
        }
        Ok(Self { entries })
    }

    /// Coin value for a burst, or 0 for counts the acceptor never sends.
    pub fn value_for(&self, pulses: u16) -> u32 {
        self.entries
            .iter()
            .find(|(p, _)| *p == pulses)
            .map_or(0, |(_, v)| *v)
    }

    pub fn entries(&self) -> &[(u16, u32)] {
        &self.entries
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassifiedUnit {
    pub pulses: u16,
    pub value: u32,
    /// Running total after this unit
    pub total: u64,
}

/// Loop-side half of the acceptor: closes bursts and keeps the running total.
#[derive(Debug)]
pub struct PulseClassifier {
    counter: PulseCounter,
    table: DenominationTable,
    quiet_ms: u64,
    total: u64,
}

impl PulseClassifier {
    pub fn new(counter: PulseCounter, table: DenominationTable, quiet_ms: u64) -> Self {
        Self {
            counter,
            table,
            quiet_ms,
            total: 0,
        }
    }

    /// Finalize a quiet burst. Unknown pulse counts are discarded.
    pub fn tick(&mut self, now_ms: u64) -> Option<ClassifiedUnit> {
        let pulses = self.counter.take_finished(now_ms, self.quiet_ms)?;
        let value = self.table.value_for(pulses);
        if value == 0 {
            tracing::debug!(pulses, "discarding unrecognised pulse burst");
            return None;
        }
        self.total = self.total.saturating_add(u64::from(value));
        tracing::info!(pulses, value, total = self.total, "coin accepted");
        Some(ClassifiedUnit {
            pulses,
            value,
            total: self.total,
        })
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn reset_total(&mut self) {
        self.total = 0;
        self.counter.clear();
    }

    pub fn counter(&self) -> &PulseCounter {
        &self.counter
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(counter: &PulseCounter, start: u64, pulses: u16, spacing: u64) -> u64 {
        let mut t = start;
        for _ in 0..pulses {
            assert!(counter.on_edge(t));
            t += spacing;
        }
        t - spacing
    }

    #[test]
    fn burst_pack_roundtrip_keeps_fields() {
        let b = Burst {
            last_ms: 0xDEAD_BEEF,
            count: 513,
            active: true,
            seen: true,
        };
        assert_eq!(Burst::unpack(b.pack()), b);
    }

    #[test]
    fn edges_within_debounce_are_dropped() {
        let c = PulseCounter::new(50);
        assert!(c.on_edge(1000));
        assert!(!c.on_edge(1030));
        assert!(!c.on_edge(1050));
        assert!(c.on_edge(1051));
        assert_eq!(c.pending(), 2);
    }

    #[test]
    fn finalize_waits_for_quiet_window() {
        let c = PulseCounter::new(50);
        let last = feed(&c, 0, 3, 100);
        assert_eq!(c.take_finished(last + 300, 300), None);
        assert_eq!(c.take_finished(last + 301, 300), Some(3));
        assert_eq!(c.pending(), 0);
        assert_eq!(c.take_finished(last + 900, 300), None);
    }

    #[test]
    fn next_burst_starts_after_finalize() {
        let c = PulseCounter::new(50);
        assert!(c.on_edge(10_000));
        assert_eq!(c.take_finished(10_400, 300), Some(1));
        assert!(c.on_edge(10_451));
        assert_eq!(c.pending(), 1);
    }

    #[test]
    fn stale_loop_clock_never_finalizes_early() {
        let c = PulseCounter::new(50);
        assert!(c.on_edge(5_000));
        // loop sampled its clock just before the callback stamped the edge
        assert_eq!(c.take_finished(4_999, 300), None);
    }

    #[test]
    fn edge_after_long_idle_is_accepted() {
        let c = PulseCounter::new(50);
        assert!(c.on_edge(1_000));
        assert_eq!(c.take_finished(2_000, 300), Some(1));
        let later = 1_000 + (1u64 << 31) + 10;
        assert!(c.on_edge(later));
        assert!(!c.on_edge(later + 20));
        assert!(c.on_edge(later + 86_400_000));
    }

    #[test]
    fn unfinalized_edge_is_not_debounced_after_half_wrap() {
        let c = PulseCounter::new(50);
        assert!(c.on_edge(1_000));
        // no finalize in between: only the skew guard protects this edge
        assert!(c.on_edge(1_000 + (1u64 << 31) + 10));
        assert_eq!(c.pending(), 2);
    }

    #[test]
    fn disabled_counter_ignores_edges() {
        let c = PulseCounter::new(50);
        c.set_enabled(false);
        assert!(!c.on_edge(100));
        assert_eq!(c.pending(), 0);
        c.set_enabled(true);
        assert!(c.on_edge(200));
    }

    #[test]
    fn classifier_discards_unknown_bursts() {
        let c = PulseCounter::new(50);
        let mut cls = PulseClassifier::new(c.clone(), DenominationTable::default(), 300);
        let last = feed(&c, 0, 2, 100);
        assert_eq!(cls.tick(last + 301), None);
        assert_eq!(cls.total(), 0);
        let last = feed(&c, 2_000, 6, 100);
        let unit = cls.tick(last + 301).expect("six pulses is a coin");
        assert_eq!((unit.value, unit.total), (10, 10));
    }

    #[test]
    fn table_rejects_repeated_pulse_counts() {
        assert!(DenominationTable::new(vec![(1, 1), (1, 2)]).is_err());
        assert!(DenominationTable::new(vec![]).is_err());
        assert!(DenominationTable::new(vec![(0, 5)]).is_err());
    }
}
