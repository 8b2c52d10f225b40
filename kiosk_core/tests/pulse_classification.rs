use kiosk_core::pulse::{DenominationTable, PulseClassifier, PulseCounter};
use proptest::prelude::*;
use rstest::rstest;

const QUIET_MS: u64 = 300;

/// Feed `pulses` edges spaced `gap_ms` apart starting at `t0`, then let the
/// burst go quiet. Returns the classified value (if any) and the time after.
fn insert(classifier: &mut PulseClassifier, pulses: u16, t0: u64, gap_ms: u64) -> (Option<u32>, u64) {
    let mut t = t0;
    for _ in 0..pulses {
        assert!(classifier.counter().on_edge(t));
        t += gap_ms;
    }
    let mut found = None;
    let end = t + QUIET_MS + 50;
    while t <= end {
        if let Some(unit) = classifier.tick(t) {
            found = Some(unit.value);
        }
        t += 5;
    }
    (found, t)
}

fn classifier() -> PulseClassifier {
    PulseClassifier::new(PulseCounter::new(50), DenominationTable::default(), QUIET_MS)
}

#[rstest]
#[case(1, Some(1))]
#[case(3, Some(5))]
#[case(6, Some(10))]
#[case(9, Some(20))]
#[case(2, None)]
#[case(4, None)]
#[case(12, None)]
fn stock_table_maps_pulse_counts(#[case] pulses: u16, #[case] value: Option<u32>) {
    let mut c = classifier();
    let (got, _) = insert(&mut c, pulses, 1000, 100);
    assert_eq!(got, value);
    assert_eq!(c.total(), u64::from(value.unwrap_or(0)));
}

#[rstest]
fn totals_accumulate_across_coins() {
    let mut c = classifier();
    let (a, t) = insert(&mut c, 3, 1000, 100);
    let (b, t) = insert(&mut c, 6, t + 200, 100);
    let (d, _) = insert(&mut c, 2, t + 200, 100);
    assert_eq!((a, b, d), (Some(5), Some(10), None));
    assert_eq!(c.total(), 15);
}

#[rstest]
fn burst_closes_only_after_quiet_window() {
    let mut c = classifier();
    c.counter().on_edge(1000);
    assert_eq!(c.tick(1000 + QUIET_MS), None, "quiet must be exceeded");
    assert_eq!(c.tick(1001 + QUIET_MS).map(|u| u.pulses), Some(1));
    assert_eq!(c.counter().pending(), 0);
}

#[rstest]
#[case(1 << 31)]
#[case((1 << 31) + 86_400_000)]
#[case((1 << 32) - 2_000)]
fn coins_after_a_long_idle_still_classify(#[case] idle_ms: u64) {
    let mut c = classifier();
    let (first, t) = insert(&mut c, 3, 1000, 100);
    assert_eq!(first, Some(5));
    let (later, _) = insert(&mut c, 6, t + idle_ms, 100);
    assert_eq!(later, Some(10));
    assert_eq!(c.total(), 15);
}

#[rstest]
fn detached_counter_ignores_edges() {
    let c = PulseCounter::new(50);
    c.set_enabled(false);
    assert!(!c.on_edge(10));
    assert_eq!(c.pending(), 0);
    c.set_enabled(true);
    assert!(c.on_edge(20));
    assert_eq!(c.pending(), 1);
}

#[rstest]
fn custom_table_rejects_duplicates() {
    assert!(DenominationTable::new(vec![(1, 1), (1, 5)]).is_err());
    assert!(DenominationTable::new(vec![(0, 1)]).is_err());
    let t = DenominationTable::new(vec![(2, 50), (4, 100)]).expect("table");
    assert_eq!(t.value_for(4), 100);
    assert_eq!(t.value_for(1), 0);
}

proptest! {
    /// Edges closer together than the debounce interval never both count:
    /// accepted <= floor(elapsed / debounce) + 1.
    #[test]
    fn debounce_bounds_accepted_edges(
        debounce in 1u64..100,
        gaps in proptest::collection::vec(0u64..150, 1..200),
    ) {
        let counter = PulseCounter::new(debounce);
        let mut t = 10_000u64;
        let start = t;
        let mut accepted = 0u64;
        let mut last_accepted: Option<u64> = None;
        for g in gaps {
            t += g;
            if counter.on_edge(t) {
                if let Some(prev) = last_accepted {
                    prop_assert!(t - prev > debounce, "accepted edges {prev} and {t} too close");
                }
                last_accepted = Some(t);
                accepted += 1;
            }
        }
        prop_assert!(accepted <= (t - start) / debounce + 1);
    }

    /// Bursts of recognised sizes always classify, whatever the spacing
    /// above the debounce interval.
    #[test]
    fn recognised_bursts_classify(idx in 0usize..4, gap in 51u64..250) {
        let (pulses, value) = kiosk_config::DEFAULT_DENOMINATIONS[idx];
        let mut c = classifier();
        let (got, _) = insert(&mut c, pulses, 5_000, gap);
        prop_assert_eq!(got, Some(value));
    }
}
