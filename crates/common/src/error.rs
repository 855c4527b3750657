//! Error types shared across Glimpse crates.

/// Top-level error type for Glimpse operations.
#[derive(Debug, thiserror::Error)]
pub enum GlimpseError {
    /// The host denied the display-media request or the user dismissed the picker.
    #[error("Capture denied: {message}")]
    CaptureDenied { message: String },

    #[error("Capture error: {message}")]
    Capture { message: String },

    #[error("No active capture session")]
    NoActiveCapture,

    #[error("Recording already in progress")]
    AlreadyRecording,

    #[error("Not recording")]
    NotRecording,

    #[error("Encode error ({backend}): {message}")]
    Encode { backend: String, message: String },

    /// A backend was asked to start before its previous artifact was delivered.
    #[error("Backend {backend} is still finishing a previous recording")]
    BackendBusy { backend: String },

    #[error("Compositor error: {message}")]
    Compositor { message: String },

    #[error("Media error: {message}")]
    Media { message: String },

    #[error("Persist error: {message}")]
    Persist { message: String },

    #[error("Platform error: {message}")]
    Platform { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using GlimpseError.
pub type GlimpseResult<T> = Result<T, GlimpseError>;

impl GlimpseError {
    pub fn capture_denied(msg: impl Into<String>) -> Self {
        Self::CaptureDenied {
            message: msg.into(),
        }
    }

    pub fn capture(msg: impl Into<String>) -> Self {
        Self::Capture {
            message: msg.into(),
        }
    }

    pub fn encode(backend: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Encode {
            backend: backend.into(),
            message: msg.into(),
        }
    }

    pub fn backend_busy(backend: impl Into<String>) -> Self {
        Self::BackendBusy {
            backend: backend.into(),
        }
    }

    pub fn compositor(msg: impl Into<String>) -> Self {
        Self::Compositor {
            message: msg.into(),
        }
    }

    pub fn media(msg: impl Into<String>) -> Self {
        Self::Media {
            message: msg.into(),
        }
    }

    pub fn persist(msg: impl Into<String>) -> Self {
        Self::Persist {
            message: msg.into(),
        }
    }

    pub fn platform(msg: impl Into<String>) -> Self {
        Self::Platform {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Whether this error represents the user dismissing a picker rather than a fault.
    pub fn is_user_cancelled(&self) -> bool {
        matches!(self, Self::CaptureDenied { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_error_names_backend() {
        let err = GlimpseError::encode("palette", "quantizer exploded");
        assert_eq!(err.to_string(), "Encode error (palette): quantizer exploded");
    }

    #[test]
    fn only_denial_counts_as_cancellation() {
        assert!(GlimpseError::capture_denied("picker dismissed").is_user_cancelled());
        assert!(!GlimpseError::capture("pipeline failed").is_user_cancelled());
        assert!(!GlimpseError::NoActiveCapture.is_user_cancelled());
    }
}
