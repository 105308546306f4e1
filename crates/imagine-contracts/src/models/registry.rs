use indexmap::IndexMap;

use super::formats::{OutputFormat, ResponseEncoding};
use crate::error::{GenerationError, Result};

/// Payload keys every model accepts.
pub const BASE_FIELDS: &[&str] = &["model", "prompt", "n", "size"];

/// What one model accepts. The builder consults this table and nothing else
/// when deciding which fields reach the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelCapability {
    pub name: &'static str,
    pub sizes: &'static [&'static str],
    pub default_size: &'static str,
    pub qualities: &'static [&'static str],
    pub default_quality: Option<&'static str>,
    pub max_batch: u32,
    /// Ceiling on images per action, whether batched or looped.
    pub max_images: u32,
    pub supports_style: bool,
    pub response_format_selector: bool,
    /// Empty when the model always returns PNG and takes no `output_format`.
    pub output_formats: &'static [OutputFormat],
    pub supports_background: bool,
    pub supports_compression: bool,
    pub default_encoding: ResponseEncoding,
}

impl ModelCapability {
    pub fn supports_batching(&self) -> bool {
        self.max_batch > 1
    }

    pub fn supports_quality(&self) -> bool {
        !self.qualities.is_empty()
    }

    pub fn allows_size(&self, size: &str) -> bool {
        self.sizes.iter().any(|item| *item == size)
    }

    pub fn allows_quality(&self, quality: &str) -> bool {
        self.qualities.iter().any(|item| *item == quality)
    }

    pub fn supports_output_format(&self, format: OutputFormat) -> bool {
        self.output_formats.contains(&format)
    }

    pub fn allowed_fields(&self) -> Vec<&'static str> {
        let mut fields = BASE_FIELDS.to_vec();
        if self.supports_quality() {
            fields.push("quality");
        }
        if self.supports_style {
            fields.push("style");
        }
        if self.response_format_selector {
            fields.push("response_format");
        }
        if !self.output_formats.is_empty() {
            fields.push("output_format");
        }
        if self.supports_background {
            fields.push("background");
        }
        if self.supports_compression {
            fields.push("output_compression");
        }
        fields
    }

    pub fn supports_field(&self, field: &str) -> bool {
        self.allowed_fields().iter().any(|item| *item == field)
    }
}

pub const GPT_IMAGE_1: ModelCapability = ModelCapability {
    name: "gpt-image-1",
    sizes: &["1024x1024", "1536x1024", "1024x1536", "auto"],
    default_size: "1024x1024",
    qualities: &["high", "medium", "low", "auto"],
    default_quality: Some("high"),
    max_batch: 10,
    max_images: 10,
    supports_style: false,
    response_format_selector: false,
    output_formats: &[OutputFormat::Png, OutputFormat::Jpeg, OutputFormat::Webp],
    supports_background: true,
    supports_compression: true,
    default_encoding: ResponseEncoding::Inline,
};

pub const DALL_E_3: ModelCapability = ModelCapability {
    name: "dall-e-3",
    sizes: &["1024x1024", "1792x1024", "1024x1792"],
    default_size: "1024x1024",
    qualities: &["standard", "hd"],
    default_quality: Some("hd"),
    max_batch: 1,
    max_images: 10,
    supports_style: true,
    response_format_selector: true,
    output_formats: &[],
    supports_background: false,
    supports_compression: false,
    default_encoding: ResponseEncoding::Link,
};

pub const DALL_E_2: ModelCapability = ModelCapability {
    name: "dall-e-2",
    sizes: &["256x256", "512x512", "1024x1024"],
    default_size: "1024x1024",
    qualities: &[],
    default_quality: None,
    max_batch: 10,
    max_images: 10,
    supports_style: false,
    response_format_selector: true,
    output_formats: &[],
    supports_background: false,
    supports_compression: false,
    default_encoding: ResponseEncoding::Link,
};

#[derive(Debug, Clone)]
pub struct ModelRegistry {
    models: IndexMap<String, ModelCapability>,
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::from_capabilities(&[GPT_IMAGE_1, DALL_E_3, DALL_E_2])
    }
}

impl ModelRegistry {
    pub fn from_capabilities(capabilities: &[ModelCapability]) -> Self {
        let models = capabilities
            .iter()
            .map(|capability| (capability.name.to_string(), capability.clone()))
            .collect();
        Self { models }
    }

    pub fn get(&self, name: &str) -> Option<&ModelCapability> {
        self.models.get(name.trim())
    }

    pub fn require(&self, name: &str) -> Result<&ModelCapability> {
        self.get(name).ok_or_else(|| {
            GenerationError::validation(
                "model",
                format!(
                    "unknown model '{}'; choose one of: {}",
                    name.trim(),
                    self.names().join(", ")
                ),
            )
        })
    }

    pub fn list(&self) -> impl Iterator<Item = &ModelCapability> {
        self.models.values()
    }

    pub fn names(&self) -> Vec<String> {
        self.models.keys().cloned().collect()
    }
}
