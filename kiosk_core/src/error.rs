use thiserror::Error;

/// Failures reported by the engine's state machines.
///
/// None of these stop the poll loop; they surface as negative acks or
/// error notifications.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KioskError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("busy: a job is already running")]
    Busy,
    #[error("timeout after {count} of {target} units")]
    Timeout { count: u32, target: u32 },
    #[error("mechanical fault: {0}")]
    MechanicalFault(String),
    #[error("hardware error: {0}")]
    Hardware(String),
    #[error("hardware fault: {0}")]
    HardwareFault(String),
    #[error("invalid state: {0}")]
    State(String),
}

impl KioskError {
    /// Short machine-readable code used in outbound payloads.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid_parameter",
            Self::Busy => "busy",
            Self::Timeout { .. } => "timeout",
            Self::MechanicalFault(_) => "fault",
            Self::Hardware(_) | Self::HardwareFault(_) => "hardware_error",
            Self::State(_) => "invalid_state",
        }
    }
}

/// Why an inbound command could not be applied.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("unknown command '{0}'")]
    UnknownCommand(String),
    #[error("command '{0}' requires a value")]
    MissingValue(String),
    #[error("command '{0}' has a non-integer value")]
    InvalidValue(String),
    #[error("command '{0}' requires both value and state")]
    MissingParameters(String),
    #[error("state must be 'on' or 'off', got '{0}'")]
    InvalidState(String),
    #[error(transparent)]
    Rejected(#[from] KioskError),
}

impl CommandError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnknownCommand(_) => "unknown_command",
            Self::MissingValue(_) => "missing_value",
            Self::InvalidValue(_) => "invalid_value",
            Self::MissingParameters(_) => "missing_parameters",
            Self::InvalidState(_) => "invalid_state",
            Self::Rejected(e) => e.code(),
        }
    }
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("instance name must not be empty")]
    EmptyName,
    #[error("duplicate instance '{name}' in family {family}")]
    DuplicateInstance { family: &'static str, name: String },
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
