//! Debounced polling of level inputs (coin sensors, limit switches).
use kiosk_traits::LevelInput;

/// A level must hold steady for `debounce_ms` before it is believed.
///
/// `just_pressed` / `just_released` report the stable transition produced by
/// the most recent `update` and clear on the next one.
#[derive(Debug, Clone)]
pub struct LevelDebouncer {
    debounce_ms: u64,
    stable: bool,
    raw: bool,
    raw_since_ms: u64,
    pressed: bool,
    released: bool,
}

impl LevelDebouncer {
    pub fn new(debounce_ms: u64) -> Self {
        Self {
            debounce_ms,
            stable: false,
            raw: false,
            raw_since_ms: 0,
            pressed: false,
            released: false,
        }
    }

    pub fn update(&mut self, raw: bool, now_ms: u64) {
        self.pressed = false;
        self.released = false;
        if raw != self.raw {
            self.raw = raw;
            self.raw_since_ms = now_ms;
        }
        if self.raw != self.stable && now_ms.saturating_sub(self.raw_since_ms) >= self.debounce_ms
        {
            self.stable = self.raw;
            if self.stable {
                self.pressed = true;
            } else {
                self.released = true;
            }
        }
    }

    pub fn is_active(&self) -> bool {
        self.stable
    }

    pub fn just_pressed(&self) -> bool {
        self.pressed
    }

    pub fn just_released(&self) -> bool {
        self.released
    }
}

/// A level input paired with its debouncer.
#[derive(Debug)]
pub struct DebouncedInput<I> {
    input: I,
    debouncer: LevelDebouncer,
}

impl<I: LevelInput> DebouncedInput<I> {
    pub fn new(input: I, debounce_ms: u64) -> Self {
        Self {
            input,
            debouncer: LevelDebouncer::new(debounce_ms),
        }
    }

    /// Sample the input. Returns true on a fresh stable activation.
    pub fn poll(&mut self, now_ms: u64) -> bool {
        let raw = self.input.is_active();
        self.debouncer.update(raw, now_ms);
        self.debouncer.just_pressed()
    }

    pub fn is_active(&self) -> bool {
        self.debouncer.is_active()
    }
}
