use kiosk_traits::{Actuator, LevelInput, Stepper};
use serde_json::json;

use super::require_int;
use crate::feed::{FeedEvent, PaperFeeder};
use crate::error::CommandError;
use crate::protocol::{Ack, Family, Outbox, Reply, Request, legacy_job_request};
use crate::router::Component;

#[derive(Debug)]
pub struct PaperDispenser<M, S, P> {
    name: String,
    feeder: PaperFeeder<M, S, P>,
}

impl<M: Actuator, S: Stepper, P: LevelInput> PaperDispenser<M, S, P> {
    pub fn new(name: impl Into<String>, feeder: PaperFeeder<M, S, P>) -> Self {
        Self {
            name: name.into(),
            feeder,
        }
    }

    pub fn feeder(&self) -> &PaperFeeder<M, S, P> {
        &self.feeder
    }
}

impl<M: Actuator, S: Stepper, P: LevelInput> Component for PaperDispenser<M, S, P> {
    fn family(&self) -> Family {
        Family::PaperDispenser
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
                Ok(v) => match self.feeder.dispense(v, now_ms) {
                    Ok(()) => Ack::ok("dispense").with("value", v).with("status", "started"),
                    Err(e) => Ack::failed("dispense", &e.into()).with("value", v),
                },
                Err(e) => Ack::failed("dispense", &e),
            },
            "stop" => {
                let stopping = self.feeder.stop();
                Ack::ok("stop").with("status", if stopping { "stopping" } else { "idle" })
            }
            "reset" => {
                self.feeder.reset();
                Ack::ok("reset")
            }
            "setsteppersteps" => match require_int(req) {
                Ok(v) => match self.feeder.set_steps_per_sheet(v) {
                    Ok(()) => Ack::ok("setStepperSteps").with("value", v),
                    Err(e) => Ack::failed("setStepperSteps", &e.into()).with("value", v),
                },
                Err(e) => Ack::failed("setStepperSteps", &e),
            },
            "get" | "status" => {
                self.feeder.pending_mut().raise_status();
                return Reply::Quiet;
            }
            other => Ack::failed(other, &CommandError::UnknownCommand(other.to_string())),
        };
        Reply::Ack(ack)
    }

    fn tick(&mut self, now_ms: u64) {
        self.feeder.tick(now_ms);
    }

    fn drain(&mut self, out: &mut Outbox) {
        let current = self.feeder.current();
        let total = self.feeder.total();
        let state = self.feeder.state();
        let steps = self.feeder.steps_per_sheet();
        let pending = self.feeder.pending_mut();

        if let Some(FeedEvent::DispenseComplete { total }) = pending.take_event() {
            out.event(
                Family::PaperDispenser,
                json!({"name": self.name, "event": "dispense_complete", "total": total}),
            );
        }
        if let Some(fault) = pending.take_error() {
            out.error(
                Family::PaperDispenser,
                json!({
                    "name": self.name,
                    "error": fault.code,
                    "details": fault.details,
                    "current": current,
                    "total": total,
                }),
            );
        }
        if pending.take_status() {
            out.status(
                Family::PaperDispenser,
                json!({
                    "name": self.name,
                    "status": state.as_str(),
                    "current": current,
                    "total": total,
                    "stepsPerSheet": steps,
                }),
            );
        }
    }

    fn request_status(&mut self) {
        self.feeder.pending_mut().raise_status();
    }

    fn halt(&mut self) {
        self.feeder.halt();
    }
}
