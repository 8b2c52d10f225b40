use std::time::Duration;

/// Emit `steps` square pulses through `set_level`, holding each level for
/// `half_period`. Leaves the line low.
pub fn pulse_train(mut set_level: impl FnMut(bool), steps: u32, half_period: Duration) {
    for _ in 0..steps {
        set_level(true);
        hold(half_period);
        set_level(false);
        hold(half_period);
    }
}

#[inline]
fn hold(d: Duration) {
    if !d.is_zero() {
        std::thread::sleep(d);
    }
}
