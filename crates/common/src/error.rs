//! Error types shared across SimpleOBS crates.

/// Top-level error type for SimpleOBS operations.
///
/// Every API boundary in the core reports failure through this type; nothing
/// in the pipeline panics on a plugin failure.
#[derive(Debug, thiserror::Error)]
pub enum ObsError {
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    #[error("{what} already exists")]
    AlreadyExists { what: String },

    #[error("No {kind} factory registered for type '{type_id}'")]
    ComponentNotFound { kind: String, type_id: String },

    #[error("Scene not found: {name}")]
    SceneNotFound { name: String },

    #[error("Source not found in scene {scene}")]
    SourceNotFound { scene: String },

    #[error("Factory for '{type_id}' failed: {reason}")]
    Factory { type_id: String, reason: String },

    #[error("{what} is not initialized")]
    NotInitialized { what: String },

    #[error("Scene {scene} has no sources")]
    EmptyScene { scene: String },

    #[error("No source in scene {scene} produced a frame")]
    NoFrames { scene: String },

    #[error("Streaming already started")]
    AlreadyStreaming,

    #[error("Frame error: {message}")]
    Frame { message: String },

    #[error("Source error: {message}")]
    Source { message: String },

    #[error("Encoder error: {message}")]
    Encoder { message: String },

    #[error("Output error: {message}")]
    Output { message: String },

    #[error("Filter error: {message}")]
    Filter { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using ObsError.
pub type ObsResult<T> = Result<T, ObsError>;

impl ObsError {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: msg.into(),
        }
    }

    pub fn not_initialized(what: impl Into<String>) -> Self {
        Self::NotInitialized { what: what.into() }
    }

    pub fn frame(msg: impl Into<String>) -> Self {
        Self::Frame {
            message: msg.into(),
        }
    }

    pub fn source(msg: impl Into<String>) -> Self {
        Self::Source {
            message: msg.into(),
        }
    }

    pub fn encoder(msg: impl Into<String>) -> Self {
        Self::Encoder {
            message: msg.into(),
        }
    }

    pub fn output(msg: impl Into<String>) -> Self {
        Self::Output {
            message: msg.into(),
        }
    }

    pub fn filter(msg: impl Into<String>) -> Self {
        Self::Filter {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    pub fn factory(type_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Factory {
            type_id: type_id.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error only affects the current frame.
    ///
    /// The pipeline drops the affected frame for any stage failure; only
    /// non-transient ones are logged as warnings.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::NoFrames { .. }
                | Self::Frame { .. }
                | Self::Source { .. }
                | Self::Encoder { .. }
                | Self::Output { .. }
                | Self::Filter { .. }
        )
    }
}
