/// Boxed error carried by a failing listener or release.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors surfaced by channel dispatch and resource release.
#[derive(Debug, thiserror::Error)]
pub enum EventError {
    /// A listener failed during publish. Remaining listeners were not invoked.
    #[error("listener failed: {0}")]
    Listener(#[source] BoxError),
    /// A listener failed with a plain message.
    #[error("{0}")]
    Message(String),
    /// One or more children of an aggregate failed to release. Every child was
    /// still attempted.
    #[error("{} of {attempted} releases failed", failures.len())]
    Release {
        attempted: usize,
        failures: Vec<EventError>,
    },
}

impl EventError {
    /// Wrap any error raised inside a listener.
    pub fn listener(err: impl Into<BoxError>) -> Self {
        Self::Listener(err.into())
    }

    pub fn msg(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }
}
