use crate::pending::PendingError;
use islands_core::IslandsError;
use thiserror::Error;

/// Errors surfaced by the build pipeline and the dev session.
#[derive(Debug, Error)]
pub enum BuildError {
    /// The server renderer failed for one container.
    #[error("render failed for {component} ({render_id}): {message}")]
    Render {
        /// Container id.
        render_id: String,
        /// Component local name.
        component: String,
        /// Renderer message.
        message: String,
    },

    /// The client bundler failed for a page.
    #[error("client bundle failed for {page}: {message}")]
    Bundle {
        /// Page path.
        page: String,
        /// Bundler message.
        message: String,
    },

    /// Writing build output failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path being written.
        path: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Manifest (de)serialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The page could not be compiled.
    #[error(transparent)]
    Compile(#[from] IslandsError),

    /// Waiting for a compilation failed.
    #[error("waiting for compilation failed: {0}")]
    Pending(#[from] PendingError),

    /// A page was requested that the store does not hold.
    #[error("unknown page: {0}")]
    UnknownPage(String),
}

impl BuildError {
    /// Wraps an I/O error with the path it happened at.
    pub fn io(path: impl AsRef<std::path::Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().display().to_string(),
            source,
        }
    }
}
