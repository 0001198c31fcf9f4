use islands_core::RenderId;
use thiserror::Error;

/// Errors raised by the client runtime.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// A dev-channel message could not be decoded.
    #[error("malformed channel message: {0}")]
    MalformedMessage(#[from] serde_json::Error),

    /// An event named a container the runtime does not know.
    #[error("unknown container {0}")]
    UnknownContainer(RenderId),

    /// An event arrived for a page that is no longer current.
    #[error("stale event for page {event_page} (current page is {current_page})")]
    StalePage {
        /// Page the event belongs to.
        event_page: String,
        /// Page the runtime is showing.
        current_page: String,
    },
}
