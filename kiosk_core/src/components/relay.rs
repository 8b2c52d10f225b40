use kiosk_traits::Actuator;
use serde_json::json;

use crate::error::CommandError;
use crate::protocol::{Ack, Family, Outbox, Param, Reply, Request, strip_instance_prefix};
use crate::relay::SharedRelayBank;
use crate::router::Component;

/// Host-facing side of the relay bank.
#[derive(Debug)]
pub struct RelayControl<A> {
    name: String,
    bank: SharedRelayBank<A>,
    status: bool,
}

impl<A: Actuator> RelayControl<A> {
    pub fn new(bank: SharedRelayBank<A>) -> Self {
        let name = bank.borrow().name().to_string();
        Self {
            name,
            bank,
            status: false,
        }
    }

    fn set(&mut self, req: &Request) -> Ack {
        let (channel, state) = match (req.value, req.state.as_deref()) {
            (Param::Missing, _) | (_, None) => {
                return Ack::failed("set", &CommandError::MissingParameters(req.cmd.clone()));
            }
            (Param::Invalid, _) => {
                return Ack::failed("set", &CommandError::InvalidValue(req.cmd.clone()));
            }
            (Param::Int(ch), Some(state)) => (ch, state),
        };
        let on = if state.eq_ignore_ascii_case("on") {
            true
        } else if state.eq_ignore_ascii_case("off") {
            false
        } else {
            return Ack::failed("set", &CommandError::InvalidState(state.to_string()))
                .with("relay", channel);
        };

        let Ok(mut bank) = self.bank.try_borrow_mut() else {
            return Ack::rejected("set", "busy").with("relay", channel);
        };
        match bank.set_relay(channel, on) {
            Ok(()) => {
                self.status = true;
                Ack::ok("set")
                    .with("relay", channel)
                    .with("state", if on { "ON" } else { "OFF" })
            }
            Err(e) => Ack::failed("set", &e.into()).with("relay", channel),
        }
    }
}

/// `relay<N>_on` / `relay<N>_off`
fn parse_legacy_switch(token: &str) -> Option<Request> {
    let rest = token.strip_prefix("relay")?;
    let (num, state) = rest.split_once('_')?;
    if num.is_empty() || !num.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let state = match state {
        "on" | "off" => state,
        _ => return None,
    };
    let channel = num.parse().ok()?;
    Some(
        Request::new("setRelay")
            .with_value(Param::Int(channel))
            .with_state(state),
    )
}

impl<A: Actuator> Component for RelayControl<A> {
    fn family(&self) -> Family {
        Family::Relay
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn legacy_request(&self, token: &str) -> Option<Request> {
        let lower = token.to_ascii_lowercase();
        if let Some(req) = parse_legacy_switch(&lower) {
            return Some(req);
        }
        match strip_instance_prefix(&lower, &self.name) {
            Some("get" | "status") => Some(Request::new("get")),
            _ => None,
        }
    }

    fn handle(&mut self, req: &Request, _now_ms: u64) -> Reply {
        match req.cmd.to_ascii_lowercase().as_str() {
            "setrelay" => Reply::Ack(self.set(req)),
            "get" | "status" => {
                self.status = true;
                Reply::Quiet
            }
            other => Reply::Ack(Ack::failed(
                other,
                &CommandError::UnknownCommand(other.to_string()),
            )),
        }
    }

    fn tick(&mut self, _now_ms: u64) {}

    fn drain(&mut self, out: &mut Outbox) {
        if !std::mem::take(&mut self.status) {
            return;
        }
        let Ok(bank) = self.bank.try_borrow() else {
            self.status = true;
            return;
        };
        let states: Vec<&str> = bank
            .states()
            .iter()
            .map(|off| if *off { "OFF" } else { "ON" })
            .collect();
        out.status(Family::Relay, json!({"name": self.name, "states": states}));
    }

    fn request_status(&mut self) {
        self.status = true;
    }

    fn halt(&mut self) {
        if let Ok(mut bank) = self.bank.try_borrow_mut() {
            bank.all_off();
        }
    }
}
