use serde::Serialize;

use crate::error::GenerationError;
use crate::models::OutputFormat;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "url", rename_all = "snake_case")]
pub enum ImageSource {
    Link(String),
    Inline,
}

impl ImageSource {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Link(_) => "link",
            Self::Inline => "inline",
        }
    }
}

/// One produced image with the metadata needed to show and download it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenerationResult {
    /// 0-based slot within the action, shared with `ItemFailure::index`, so
    /// a failed slot never shifts the numbers of the images around it.
    pub index: usize,
    #[serde(skip)]
    pub bytes: Vec<u8>,
    pub prompt: String,
    /// Equals `prompt` when the service did not rewrite it.
    pub revised_prompt: String,
    pub model: String,
    pub format: OutputFormat,
    pub source: ImageSource,
    pub created_at: String,
}

impl GenerationResult {
    pub fn prompt_was_revised(&self) -> bool {
        self.revised_prompt != self.prompt
    }

    pub fn byte_len(&self) -> usize {
        self.bytes.len()
    }

    /// 1-based number shown to the user and accepted by `/save`.
    pub fn number(&self) -> usize {
        self.index + 1
    }
}

/// A soft failure for one image of an action. `index` is 0-based in the
/// action's own numbering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemFailure {
    pub index: usize,
    pub error: GenerationError,
}

impl ItemFailure {
    pub fn new(index: usize, error: GenerationError) -> Self {
        Self { index, error }
    }
}
