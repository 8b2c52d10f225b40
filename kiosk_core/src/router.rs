//! Command routing and status aggregation across named instances.
use crate::error::{BuildError, CommandError};
use crate::protocol::{Ack, Command, Family, Outbox, PROTOCOL_VERSION, Reply, Request};
use serde_json::json;

/// A named, addressable part of the kiosk.
pub trait Component {
    fn family(&self) -> Family;
    fn name(&self) -> &str;

    /// Claim a legacy token addressed to this instance.
    fn legacy_request(&self, token: &str) -> Option<Request>;

    fn handle(&mut self, req: &Request, now_ms: u64) -> Reply;

    /// Advance timers and sample inputs.
    fn tick(&mut self, now_ms: u64);

    /// Render and clear pending notifications.
    fn drain(&mut self, out: &mut Outbox);

    fn request_status(&mut self);

    /// Cut power to every actuator this instance drives.
    fn halt(&mut self);
}

#[derive(Default)]
pub struct Router {
    components: Vec<Box<dyn Component>>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, component: Box<dyn Component>) -> Result<(), BuildError> {
        let name = component.name();
        if name.trim().is_empty() {
            return Err(BuildError::EmptyName);
        }
        let family = component.family();
        if self
            .components
            .iter()
            .any(|c| c.family() == family && c.name() == name)
        {
            return Err(BuildError::DuplicateInstance {
                family: family.as_str(),
                name: name.to_string(),
            });
        }
        tracing::debug!(%family, name, "component registered");
        self.components.push(component);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// `(family, name)` for every registered instance, in registration order.
    pub fn instances(&self) -> Vec<(Family, String)> {
        self.components
            .iter()
            .map(|c| (c.family(), c.name().to_string()))
            .collect()
    }

    pub fn dispatch(&mut self, cmd: &Command, now_ms: u64, out: &mut Outbox) {
        match cmd {
            Command::Structured(s) => {
                if s.version != PROTOCOL_VERSION {
                    tracing::debug!(version = s.version, "unsupported protocol version");
                    out.error(
                        Family::System,
                        json!({"error": "unsupported_version", "v": s.version}),
                    );
                    return;
                }
                let Ok(family) = s.target.parse::<Family>() else {
                    out.error(
                        Family::System,
                        json!({"error": "unknown_target", "target": s.target}),
                    );
                    return;
                };
                if family == Family::System {
                    self.handle_system(&s.cmd, out);
                    return;
                }
                let req = Request::from_structured(s);
                self.dispatch_structured(family, s.name.as_deref(), &req, now_ms, out);
            }
            Command::Legacy(token) => self.dispatch_legacy(token, now_ms, out),
        }
    }

    fn dispatch_structured(
        &mut self,
        family: Family,
        name: Option<&str>,
        req: &Request,
        now_ms: u64,
        out: &mut Outbox,
    ) {
        let mut members = self
            .components
            .iter_mut()
            .filter(|c| c.family() == family)
            .peekable();
        if members.peek().is_none() {
            out.error(
                Family::System,
                json!({"error": "unknown_target", "target": family.as_str()}),
            );
            return;
        }

        let target = match name {
            Some(n) => members.find(|c| c.name() == n),
            None => {
                let first = members.next();
                if members.next().is_some() {
                    out.error(
                        family,
                        json!({"error": "missing_name", "cmd": req.cmd}),
                    );
                    return;
                }
                first
            }
        };

        match target {
            Some(component) => {
                let reply = component.handle(req, now_ms);
                if let Reply::Ack(ack) = reply {
                    out.ack(family, component.name(), ack);
                }
            }
            None => out.error(
                family,
                json!({"error": "unknown_instance", "name": name.unwrap_or_default()}),
            ),
        }
    }

    fn dispatch_legacy(&mut self, token: &str, now_ms: u64, out: &mut Outbox) {
        let mut claimed = false;
        for component in &mut self.components {
            if let Some(req) = component.legacy_request(token) {
                claimed = true;
                if let Reply::Ack(ack) = component.handle(&req, now_ms) {
                    out.ack(component.family(), component.name(), ack);
                }
            }
        }
        if !claimed {
            tracing::trace!(token, "legacy token not claimed");
        }
    }

    fn handle_system(&mut self, cmd: &str, out: &mut Outbox) {
        match cmd {
            "ping" => out.ack(Family::System, "System", Ack::ok("ping").with("cmd", "ping")),
            "status" => {
                for c in &mut self.components {
                    c.request_status();
                }
                out.ack(
                    Family::System,
                    "System",
                    Ack::ok("status")
                        .with("cmd", "status")
                        .with("instances", self.components.len()),
                );
            }
            other => out.ack(
                Family::System,
                "System",
                Ack::failed(other, &CommandError::UnknownCommand(other.to_string())).with("cmd", other),
            ),
        }
    }

    pub fn tick(&mut self, now_ms: u64) {
        for c in &mut self.components {
            c.tick(now_ms);
        }
    }

    /// Render every pending notification, instances in registration order.
    pub fn collect(&mut self, out: &mut Outbox) {
        for c in &mut self.components {
            c.drain(out);
        }
    }

    pub fn halt_all(&mut self) {
        for c in &mut self.components {
            c.halt();
        }
    }
}
