//! Pending notification flags.
//!
//! State machines raise flags when something worth reporting happens; the
//! aggregator takes them when it renders outbound messages. One slot per
//! kind: a second event raised before the drain replaces the first.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pending<E, F> {
    status: bool,
    event: Option<E>,
    error: Option<F>,
}

impl<E, F> Default for Pending<E, F> {
    fn default() -> Self {
        Self {
            status: false,
            event: None,
            error: None,
        }
    }
}

impl<E, F> Pending<E, F> {
    pub fn raise_status(&mut self) {
        self.status = true;
    }

    pub fn raise_event(&mut self, event: E) {
        self.event = Some(event);
    }

    pub fn raise_error(&mut self, error: F) {
        self.error = Some(error);
    }

    pub fn take_status(&mut self) -> bool {
        std::mem::take(&mut self.status)
    }

    pub fn take_event(&mut self) -> Option<E> {
        self.event.take()
    }

    pub fn take_error(&mut self) -> Option<F> {
        self.error.take()
    }

    pub fn has_status(&self) -> bool {
        self.status
    }

    pub fn event(&self) -> Option<&E> {
        self.event.as_ref()
    }

    pub fn error(&self) -> Option<&F> {
        self.error.as_ref()
    }

    pub fn is_clear(&self) -> bool {
        !self.status && self.event.is_none() && self.error.is_none()
    }
}
