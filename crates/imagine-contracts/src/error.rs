use thiserror::Error;

/// Everything a generation action can fail with.
///
/// Variants carry plain strings so a failure can be stored per item and
/// replayed to the user after the rest of the batch finished.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GenerationError {
    #[error("invalid {field}: {message}")]
    Validation { field: String, message: String },

    #[error("no API key configured for this session")]
    MissingCredential,

    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("not authorized for this model: {0}")]
    Authorization(String),

    #[error("image service rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("image service returned an invalid response: {0}")]
    InvalidResponse(String),

    #[error("unexpected image entry: {0}")]
    UnexpectedResponseShape(String),

    #[error("image encoding failed: {0}")]
    Encoding(String),

    #[error("i/o failure: {0}")]
    Io(String),
}

impl GenerationError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Stable name used in journal events.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation",
            Self::MissingCredential => "missing_credential",
            Self::Authentication(_) => "authentication",
            Self::Authorization(_) => "authorization",
            Self::Rejected { .. } => "rejected",
            Self::Transport(_) => "transport",
            Self::InvalidResponse(_) => "invalid_response",
            Self::UnexpectedResponseShape(_) => "unexpected_response_shape",
            Self::Encoding(_) => "encoding",
            Self::Io(_) => "io",
        }
    }

    /// Credential problems make every further call in the same action pointless.
    pub fn is_credential_error(&self) -> bool {
        matches!(
            self,
            Self::MissingCredential | Self::Authentication(_) | Self::Authorization(_)
        )
    }

    pub fn guidance(&self) -> Option<&'static str> {
        match self {
            Self::Validation { .. } => Some("Adjust the highlighted option and try again."),
            Self::MissingCredential => {
                Some("Enter an API key, add OPENAI_API_KEY to the secrets file, or export it.")
            }
            Self::Authentication(_) => {
                Some("Check that your API key is valid and has image generation permissions.")
            }
            Self::Authorization(_) => {
                Some("Your key cannot use this model; switch to another model.")
            }
            Self::Transport(_) => Some("Network problem; trigger the generation again."),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, GenerationError>;
