use std::time::{Duration, Instant};

use kiosk_hardware::util::pulse_train;
use rstest::rstest;

#[rstest]
#[case(0)]
#[case(1)]
#[case(25)]
fn emits_one_rising_edge_per_step(#[case] steps: u32) {
    let mut levels = Vec::new();
    pulse_train(|l| levels.push(l), steps, Duration::ZERO);
    let rising = levels.windows(2).filter(|w| !w[0] && w[1]).count()
        + usize::from(levels.first() == Some(&true));
    assert_eq!(rising, steps as usize);
    assert!(!levels.last().copied().unwrap_or(false), "line ends low");
}

#[test]
fn holds_each_level_for_half_period() {
    let start = Instant::now();
    pulse_train(|_| {}, 4, Duration::from_millis(1));
    assert!(start.elapsed() >= Duration::from_millis(8));
}
