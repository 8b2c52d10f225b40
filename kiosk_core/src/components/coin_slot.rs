use std::convert::Infallible;

use kiosk_traits::Timebase;
use serde_json::json;

use crate::error::CommandError;
use crate::notify::Pending;
use crate::protocol::{Ack, Family, Outbox, Reply, Request, strip_instance_prefix};
use crate::pulse::{ClassifiedUnit, DenominationTable, EdgeHandle, PulseClassifier, PulseCounter};
use crate::router::Component;

/// The coin acceptor: classified coins and the running inserted total.
#[derive(Debug)]
pub struct CoinSlot {
    name: String,
    classifier: PulseClassifier,
    pending: Pending<ClassifiedUnit, Infallible>,
}

impl CoinSlot {
    pub fn new(
        name: impl Into<String>,
        counter: PulseCounter,
        table: DenominationTable,
        quiet_window_ms: u64,
    ) -> Self {
        Self {
            name: name.into(),
            classifier: PulseClassifier::new(counter, table, quiet_window_ms),
            pending: Pending::default(),
        }
    }

    /// Edge source for an interrupt or helper thread.
    pub fn edge_handle(&self, timebase: Timebase) -> EdgeHandle {
        EdgeHandle::new(self.classifier.counter().clone(), timebase)
    }

    pub fn total(&self) -> u64 {
        self.classifier.total()
    }

    pub fn is_attached(&self) -> bool {
        self.classifier.counter().is_enabled()
    }

    fn set_attached(&mut self, on: bool) {
        let counter = self.classifier.counter();
        counter.set_enabled(on);
        if !on {
            counter.clear();
        }
        tracing::info!(instance = %self.name, attached = on, "coin intake switched");
    }
}

impl Component for CoinSlot {
    fn family(&self) -> Family {
        Family::CoinSlot
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn legacy_request(&self, token: &str) -> Option<Request> {
        let lower = token.to_ascii_lowercase();
        let verb = strip_instance_prefix(&lower, &self.name).unwrap_or(&lower);
        match verb {
            "get" | "status" => Some(Request::new("get")),
            "reset" => Some(Request::new("reset")),
            "attach" | "coinslot_start" => Some(Request::new("attach")),
            "detach" | "coinslot_stop" => Some(Request::new("detach")),
            _ => None,
        }
    }

    fn handle(&mut self, req: &Request, _now_ms: u64) -> Reply {
        match req.cmd.to_ascii_lowercase().as_str() {
            "get" | "status" => {
                self.pending.raise_status();
                Reply::Quiet
            }
            "reset" => {
                self.classifier.reset_total();
                self.pending.raise_status();
                Reply::Ack(Ack::ok("reset"))
            }
            "attach" => {
                self.set_attached(true);
                self.pending.raise_status();
                Reply::Ack(Ack::ok("attach"))
            }
            "detach" => {
                self.set_attached(false);
                self.pending.raise_status();
                Reply::Ack(Ack::ok("detach"))
            }
            other => Reply::Ack(Ack::failed(
                other,
                &CommandError::UnknownCommand(other.to_string()),
            )),
        }
    }

    fn tick(&mut self, now_ms: u64) {
        if let Some(unit) = self.classifier.tick(now_ms) {
            self.pending.raise_event(unit);
        }
    }

    fn drain(&mut self, out: &mut Outbox) {
        if let Some(unit) = self.pending.take_event() {
            out.event(
                Family::CoinSlot,
                json!({
                    "name": self.name,
                    "coinValue": unit.value,
                    "totalValue": unit.total,
                    "pulses": unit.pulses,
                }),
            );
        }
        if self.pending.take_status() {
            out.status(
                Family::CoinSlot,
                json!({
                    "name": self.name,
                    "totalValue": self.classifier.total(),
                    "attached": self.is_attached(),
                }),
            );
        }
    }

    fn request_status(&mut self) {
        self.pending.raise_status();
    }

    fn halt(&mut self) {}
}
