use thiserror::Error;

#[derive(Debug, Error)]
pub enum HwError {
    #[error("gpio error: {0}")]
    Gpio(String),
    /// The device cannot perform the requested motion (e.g. reversing a relay coil)
    #[error("{0} is not supported by this device")]
    Unsupported(&'static str),
    /// Fault switched on by a test or simulation harness
    #[error("injected fault: {0}")]
    Injected(&'static str),
}

pub type Result<T> = std::result::Result<T, HwError>;
