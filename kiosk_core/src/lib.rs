#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::must_use_candidate,
    clippy::cast_possible_truncation
)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Event-driven engine for a coin, hopper and paper dispensing kiosk
//! (hardware-agnostic).
//!
//! All hardware goes through the `kiosk_traits` seams (`Actuator`, `Stepper`,
//! `LevelInput`). The host talks to the kiosk over a line channel: JSON or
//! legacy commands in, JSON envelopes out.
//!
//! ## Architecture
//!
//! - **Pulses**: acceptor bursts debounced and classified into coin values (`pulse`)
//! - **Dispensing**: target-count controller with timeout and duty cycle (`dispense`)
//! - **Paper**: homing / feeding / ramp-down sequencer (`feed`)
//! - **Relays**: numbered channel bank shared with counters (`relay`)
//! - **Routing**: one parse step, per-instance dispatch, pending-flag
//!   aggregation (`protocol`, `router`, `components`)
//! - **Loop**: `Kiosk::poll` plus the stdin/stdout host loop (`runtime`, `runner`)

pub mod components;
pub mod conversions;
pub mod dispense;
pub mod error;
pub mod feed;
pub mod hw_error;
pub mod input;
pub mod line_reader;
pub mod mocks;
pub mod notify;
pub mod protocol;
pub mod pulse;
pub mod relay;
pub mod router;
pub mod runner;
pub mod runtime;

pub use components::{CoinSlot, CountingDispenser, PaperDispenser, RelayControl};
pub use dispense::{DispenseCfg, DispenseController, DutyCycle, JobState};
pub use error::{BuildError, CommandError, KioskError, Result};
pub use feed::{FeedCfg, FeedState, PaperFeeder};
pub use protocol::{Command, Envelope, Family, MessageKind, parse_line};
pub use pulse::{ClassifiedUnit, DenominationTable, EdgeHandle, PulseClassifier, PulseCounter};
pub use relay::{RelayBank, RelayChannel, SharedRelayBank};
pub use router::Component;
pub use runtime::{Kiosk, KioskBuilder};
