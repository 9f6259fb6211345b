//! Error types for the rendering pipeline

use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while rendering code
///
/// Problems with what the user sent (no code, empty file, unknown encoding)
/// are not errors: the command layer answers them with a text reply.
#[derive(Error, Debug)]
pub enum Error {
    /// Failed to start the browser process
    #[error("Browser launch failed: {0}")]
    LaunchError(String),

    /// Failed to load or capture the rendered document
    #[error("Rendering failed: {0}")]
    RenderError(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    /// A language or grammar definition file could not be used
    #[error("Failed to load language definitions: {0}")]
    LanguageError(String),

    /// The host could not hand over a quoted attachment
    #[error("Attachment unavailable: {0}")]
    AttachmentError(String),

    /// The renderer was stopped and accepts no more work
    #[error("Renderer has been shut down")]
    Closed,

    /// Filesystem error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::ConfigError(err.to_string())
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Error::Other(format!("Background task failed: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Browser failures surface as one of the two pipeline variants; there is
    // no catch-all for backend errors.
    fn is_browser_failure(err: &Error) -> bool {
        match err {
            Error::LaunchError(_) | Error::RenderError(_) => true,
            Error::ConfigError(_)
            | Error::LanguageError(_)
            | Error::AttachmentError(_)
            | Error::Closed
            | Error::Io(_)
            | Error::Other(_) => false,
        }
    }

    #[test]
    fn test_error_messages() {
        let launch = Error::LaunchError("no chrome".into());
        assert_eq!(launch.to_string(), "Browser launch failed: no chrome");
        assert!(is_browser_failure(&launch));

        let render = Error::RenderError("target crashed".into());
        assert_eq!(render.to_string(), "Rendering failed: target crashed");
        assert!(is_browser_failure(&render));

        assert!(!is_browser_failure(&Error::Closed));
        assert_eq!(Error::Closed.to_string(), "Renderer has been shut down");
    }

    #[test]
    fn test_json_errors_are_config_errors() {
        let err: Error = serde_json::from_str::<serde_json::Value>("{").unwrap_err().into();
        assert!(matches!(err, Error::ConfigError(_)));
        assert!(!is_browser_failure(&err));
    }
}
