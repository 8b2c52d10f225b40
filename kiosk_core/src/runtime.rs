//! The kiosk: registered components driven by one cooperative poll loop.
use std::sync::Arc;

use eyre::WrapErr;
use kiosk_traits::{Clock, Timebase};

use crate::error::{BuildError, Result};
use crate::protocol::{Envelope, Family, Outbox, parse_line};
use crate::router::{Component, Router};

pub struct Kiosk {
    router: Router,
    timebase: Timebase,
}

impl core::fmt::Debug for Kiosk {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Kiosk")
            .field("instances", &self.router.instances())
            .field("now_ms", &self.timebase.now_ms())
            .finish()
    }
}

impl Kiosk {
    pub fn builder() -> KioskBuilder {
        KioskBuilder::default()
    }

    pub fn now_ms(&self) -> u64 {
        self.timebase.now_ms()
    }

    pub fn timebase(&self) -> &Timebase {
        &self.timebase
    }

    pub fn instances(&self) -> Vec<(Family, String)> {
        self.router.instances()
    }

    /// Parse and dispatch one inbound line, returning the acks and
    /// notifications it produced.
    pub fn handle_line(&mut self, line: &str) -> Vec<Envelope> {
        let now = self.now_ms();
        let mut out = Outbox::new(now);
        if let Some(cmd) = parse_line(line) {
            tracing::debug!(?cmd, "inbound command");
            self.router.dispatch(&cmd, now, &mut out);
            self.router.collect(&mut out);
        }
        out.into_messages()
    }

    /// One loop iteration: tick every component, then drain notifications.
    pub fn poll(&mut self) -> Vec<Envelope> {
        let now = self.now_ms();
        let mut out = Outbox::new(now);
        self.router.tick(now);
        self.router.collect(&mut out);
        if !out.is_empty() {
            tracing::trace!(count = out.len(), now, "notifications rendered");
        }
        out.into_messages()
    }

    /// Stop every actuator. Pending notifications raised by the stop are returned.
    pub fn shutdown(&mut self) -> Vec<Envelope> {
        tracing::info!("halting all actuators");
        let mut out = Outbox::new(self.now_ms());
        self.router.halt_all();
        self.router.collect(&mut out);
        out.into_messages()
    }
}

#[derive(Default)]
pub struct KioskBuilder {
    components: Vec<Box<dyn Component>>,
    timebase: Option<Timebase>,
}

impl KioskBuilder {
    /// Share a timeline with edge callbacks created before the kiosk.
    pub fn with_timebase(mut self, timebase: Timebase) -> Self {
        self.timebase = Some(timebase);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock + Send + Sync>) -> Self {
        self.timebase = Some(Timebase::new(clock));
        self
    }

    pub fn with_component(mut self, component: impl Component + 'static) -> Self {
        self.components.push(Box::new(component));
        self
    }

    pub fn with_boxed(mut self, component: Box<dyn Component>) -> Self {
        self.components.push(component);
        self
    }

    pub fn build(self) -> Result<Kiosk> {
        if self.components.is_empty() {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "kiosk needs at least one component",
            )));
        }
        let mut router = Router::new();
        for c in self.components {
            let label = format!("{}/{}", c.family(), c.name());
            router
                .register(c)
                .wrap_err_with(|| format!("registering {label}"))?;
        }
        tracing::info!(instances = router.len(), "kiosk assembled");
        Ok(Kiosk {
            router,
            timebase: self.timebase.unwrap_or_default(),
        })
    }
}
