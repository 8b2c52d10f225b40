use kiosk_traits::{Actuator, LevelInput};
use serde_json::{Value, json};

use super::require_int;
use crate::dispense::{DispenseCfg, DispenseController, DispenseEvent};
use crate::error::{CommandError, KioskError};
use crate::input::DebouncedInput;
use crate::protocol::{Ack, Family, Outbox, Reply, Request, legacy_job_request};
use crate::router::Component;

/// A sensor-counted payout unit: a coin counter on a relay channel, or a
/// hopper with its own duty-cycled motor.
#[derive(Debug)]
pub struct CountingDispenser<I, A> {
    family: Family,
    name: String,
    denomination: Option<u32>,
    sensor: DebouncedInput<I>,
    controller: DispenseController<A>,
}

impl<I: LevelInput, A: Actuator> CountingDispenser<I, A> {
    pub fn coin_counter(
        name: impl Into<String>,
        sensor: I,
        debounce_ms: u64,
        actuator: A,
        cfg: DispenseCfg,
    ) -> Self {
        let name = name.into();
        Self {
            family: Family::CoinCounter,
            controller: DispenseController::new(name.clone(), actuator, cfg),
            sensor: DebouncedInput::new(sensor, debounce_ms),
            denomination: None,
            name,
        }
    }

    pub fn hopper(
        name: impl Into<String>,
        denomination: u32,
        sensor: I,
        debounce_ms: u64,
        actuator: A,
        cfg: DispenseCfg,
    ) -> Self {
        let name = name.into();
        Self {
            family: Family::Hopper,
            controller: DispenseController::new(name.clone(), actuator, cfg),
            sensor: DebouncedInput::new(sensor, debounce_ms),
            denomination: Some(denomination),
            name,
        }
    }

    pub fn controller(&self) -> &DispenseController<A> {
        &self.controller
    }

    fn payload(&self, mut body: Value) -> Value {
        if let (Some(d), Some(map)) = (self.denomination, body.as_object_mut()) {
            map.insert("denomination".into(), Value::from(d));
        }
        body
    }
}

impl<I: LevelInput, A: Actuator> Component for CountingDispenser<I, A> {
    fn family(&self) -> Family {
        self.family
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn legacy_request(&self, token: &str) -> Option<Request> {
        legacy_job_request(token, &self.name)
    }

    fn handle(&mut self, req: &Request, now_ms: u64) -> Reply {
        let ack = match req.cmd.to_ascii_lowercase().as_str() {
            "dispense" => match require_int(req) {
                Ok(v) => match self.controller.start(v, now_ms) {
                    Ok(()) => Ack::ok("dispense").with("value", v).with("status", "started"),
                    Err(e) => Ack::failed("dispense", &e.into()).with("value", v),
                },
                Err(e) => Ack::failed("dispense", &e),
            },
            "stop" => {
                let was_running = self.controller.stop();
                self.controller.pending_mut().raise_status();
                Ack::ok("stop").with("status", if was_running { "stopped" } else { "idle" })
            }
            "reset" => {
                self.controller.reset();
                Ack::ok("reset")
            }
            "get" | "status" => {
                self.controller.pending_mut().raise_status();
                return Reply::Quiet;
            }
            other => Ack::failed(other, &CommandError::UnknownCommand(other.to_string())),
        };
        Reply::Ack(ack)
    }

    fn tick(&mut self, now_ms: u64) {
        let unit = self.sensor.poll(now_ms);
        self.controller.step(now_ms, unit);
    }

    fn drain(&mut self, out: &mut Outbox) {
        let pending = self.controller.pending_mut();
        let event = pending.take_event();
        let error = pending.take_error();
        let status = pending.take_status();

        if let Some(DispenseEvent::TargetReached { count, target }) = event {
            let body = self.payload(json!({
                "name": self.name,
                "event": "target_reached",
                "count": count,
                "target": target,
            }));
            out.event(self.family, body);
        }
        if let Some(err) = error {
            let body = match err {
                KioskError::Timeout { count, target } => json!({
                    "name": self.name,
                    "event": "timeout",
                    "final": count,
                    "target": target,
                }),
                other => json!({
                    "name": self.name,
                    "error": other.code(),
                    "details": other.to_string(),
                }),
            };
            out.error(self.family, self.payload(body));
        }
        if status {
            let body = self.payload(json!({
                "name": self.name,
                "count": self.controller.count(),
                "target": self.controller.target(),
                "status": self.controller.state().as_str(),
            }));
            out.status(self.family, body);
        }
    }

    fn request_status(&mut self) {
        self.controller.pending_mut().raise_status();
    }

    fn halt(&mut self) {
        self.controller.stop();
    }
}
