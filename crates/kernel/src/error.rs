use tether_event::EventError;

/// Errors from world construction and frame driving.
#[derive(Debug, thiserror::Error)]
pub enum KernelError {
    #[error(transparent)]
    Event(#[from] EventError),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}
