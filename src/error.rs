use thiserror::Error;

pub type MicrResult<T> = Result<T, MicrError>;

/// Failure taxonomy for the engine.
///
/// Recognition uncertainty (no band found, low-confidence glyphs) is never an
/// error: it is carried in the result payload as empty line lists and
/// placeholder symbols. Only structural problems surface here.
#[derive(Debug, Error)]
pub enum MicrError {
    #[error("configuration error: {message}")]
    Config { message: String },

    #[error("resource error: {message}")]
    Resource { message: String },

    #[error("invalid state: {operation} called while {state}")]
    InvalidState {
        operation: &'static str,
        state: &'static str,
    },

    #[error("invalid image: {reason}")]
    InvalidImage { reason: String },
}

impl MicrError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn resource(message: impl Into<String>) -> Self {
        Self::Resource {
            message: message.into(),
        }
    }

    pub fn invalid_image(reason: impl Into<String>) -> Self {
        Self::InvalidImage {
            reason: reason.into(),
        }
    }

    /// Status code reported in the JSON result envelope.
    pub fn status_code(&self) -> i32 {
        match self {
            Self::Config { .. } => 1,
            Self::Resource { .. } => 2,
            Self::InvalidState { .. } => 3,
            Self::InvalidImage { .. } => 4,
        }
    }
}
