//! Graphics error types.
//!
//! Device and resource failures are fatal for the renderer that produced
//! them (see [`GraphicsError::is_fatal`]); caller mistakes such as a stale
//! handle are returned without halting anything. Build-time graph problems
//! are reported as [`PassRejection`](crate::graph::PassRejection) warnings
//! instead, and transient surface conditions never leave the presentation
//! manager.

use std::fmt;

/// Errors that can occur in the frame graph system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphicsError {
    /// Failed to initialize the backend (no instance, device or queue family).
    InitializationFailed(String),
    /// Failed to create a GPU object.
    ResourceCreationFailed(String),
    /// A requested feature is not supported.
    FeatureNotSupported(String),
    /// Out of GPU memory.
    OutOfMemory,
    /// The GPU device was lost.
    DeviceLost,
    /// An invalid parameter was provided.
    InvalidParameter(String),
    /// A resource handle no longer refers to a live resource.
    InvalidHandle(String),
    /// A queue submission or present call failed.
    SubmissionFailed(String),
    /// An internal error occurred.
    Internal(String),
    /// The renderer hit a fatal error earlier and refuses further work.
    Halted,
}

impl fmt::Display for GraphicsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InitializationFailed(msg) => write!(f, "initialization failed: {msg}"),
            Self::ResourceCreationFailed(msg) => write!(f, "resource creation failed: {msg}"),
            Self::FeatureNotSupported(msg) => write!(f, "feature not supported: {msg}"),
            Self::OutOfMemory => write!(f, "out of GPU memory"),
            Self::DeviceLost => write!(f, "GPU device lost"),
            Self::InvalidParameter(msg) => write!(f, "invalid parameter: {msg}"),
            Self::InvalidHandle(msg) => write!(f, "invalid handle: {msg}"),
            Self::SubmissionFailed(msg) => write!(f, "submission failed: {msg}"),
            Self::Internal(msg) => write!(f, "internal error: {msg}"),
            Self::Halted => write!(f, "renderer halted after a fatal error"),
        }
    }
}

impl std::error::Error for GraphicsError {}

impl GraphicsError {
    /// Whether the error leaves the device in a state the renderer cannot
    /// recover from. Fatal errors halt the renderer.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::InvalidParameter(_) | Self::InvalidHandle(_))
    }
}

static_assertions::assert_impl_all!(GraphicsError: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = GraphicsError::OutOfMemory;
        assert_eq!(err.to_string(), "out of GPU memory");

        let err = GraphicsError::InitializationFailed("no GPU found".to_string());
        assert_eq!(err.to_string(), "initialization failed: no GPU found");

        let err = GraphicsError::SubmissionFailed("graphics queue".to_string());
        assert_eq!(err.to_string(), "submission failed: graphics queue");
    }

    #[test]
    fn test_fatal_classification() {
        assert!(GraphicsError::DeviceLost.is_fatal());
        assert!(GraphicsError::SubmissionFailed(String::new()).is_fatal());
        assert!(!GraphicsError::InvalidHandle("buffer".into()).is_fatal());
        assert!(!GraphicsError::InvalidParameter("size".into()).is_fatal());
    }

    #[test]
    fn test_halted_display() {
        assert_eq!(
            GraphicsError::Halted.to_string(),
            "renderer halted after a fatal error"
        );
    }
}
