use imagine_contracts::models::{ModelCapability, OutputFormat, ResponseEncoding};
use imagine_contracts::request::{Background, GenerationRequest};
use imagine_contracts::{GenerationError, Result};
use serde_json::{json, Map, Value};

use crate::util::{map_object, push_unique_warning};

/// A validated, model-appropriate request body plus what the caller needs to
/// dispatch it and interpret the answer.
#[derive(Debug, Clone, PartialEq)]
pub struct Payload {
    body: Map<String, Value>,
    /// Exact prompt placed in the body.
    pub prompt: String,
    pub model: String,
    pub encoding: ResponseEncoding,
    pub format: OutputFormat,
    /// Number of sequential calls to issue (> 1 only for non-batching models).
    pub calls: u32,
    pub warnings: Vec<String>,
}

impl Payload {
    pub fn body(&self) -> &Map<String, Value> {
        &self.body
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.body.keys().map(String::as_str)
    }

    /// Images requested per call (`n`).
    pub fn batch_size(&self) -> u32 {
        self.body
            .get("n")
            .and_then(Value::as_u64)
            .and_then(|value| u32::try_from(value).ok())
            .unwrap_or(1)
    }

    pub fn total_images(&self) -> u32 {
        self.batch_size() * self.calls
    }

    /// Same body asking for one image; used when a batched call is rejected.
    pub fn single_image_body(&self) -> Map<String, Value> {
        let mut body = self.body.clone();
        body.insert("n".to_string(), Value::Number(1.into()));
        body
    }
}

/// Maps a request onto the fields `capability` accepts.
///
/// Options the model has no notion of are dropped with a warning; values the
/// model does support but not in the given form fail before any network call.
pub fn build(request: &GenerationRequest, capability: &ModelCapability) -> Result<Payload> {
    let mut warnings = Vec::new();

    if request.prompt.trim().is_empty() {
        return Err(GenerationError::validation("prompt", "prompt must not be empty"));
    }
    if request.count == 0 {
        return Err(GenerationError::validation("count", "at least one image is required"));
    }

    let size = request
        .size
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_ascii_lowercase)
        .unwrap_or_else(|| capability.default_size.to_string());
    if !capability.allows_size(&size) {
        return Err(GenerationError::validation(
            "size",
            format!(
                "{size} is not offered by {}; choose one of: {}",
                capability.name,
                capability.sizes.join(", ")
            ),
        ));
    }

    if request.count > capability.max_images {
        return Err(GenerationError::validation(
            "count",
            format!(
                "{} generates at most {} images per action",
                capability.name, capability.max_images
            ),
        ));
    }

    let (n, calls) = if capability.supports_batching() {
        if request.count > capability.max_batch {
            return Err(GenerationError::validation(
                "count",
                format!(
                    "{} generates at most {} images per request",
                    capability.name, capability.max_batch
                ),
            ));
        }
        (request.count, 1)
    } else {
        (1, request.count)
    };

    let prompt = request.compose_prompt();
    let mut body = map_object(json!({
        "model": capability.name,
        "prompt": prompt,
        "n": n,
        "size": size,
    }));

    let requested_quality = request
        .quality
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_ascii_lowercase);
    if capability.supports_quality() {
        if let Some(quality) = requested_quality.or(capability.default_quality.map(str::to_string))
        {
            if !capability.allows_quality(&quality) {
                return Err(GenerationError::validation(
                    "quality",
                    format!(
                        "{quality} is not offered by {}; choose one of: {}",
                        capability.name,
                        capability.qualities.join(", ")
                    ),
                ));
            }
            body.insert("quality".to_string(), Value::String(quality));
        }
    } else if requested_quality.is_some() {
        push_unique_warning(
            &mut warnings,
            format!("{} has no quality levels; quality dropped.", capability.name),
        );
    }

    if let Some(style) = request.style {
        if capability.supports_style {
            body.insert("style".to_string(), Value::String(style.as_str().to_string()));
        } else {
            push_unique_warning(
                &mut warnings,
                format!("{} has no style mode; style dropped.", capability.name),
            );
        }
    }

    let encoding = if capability.response_format_selector {
        let encoding = request
            .response_encoding
            .unwrap_or(capability.default_encoding);
        body.insert(
            "response_format".to_string(),
            Value::String(encoding.wire_value().to_string()),
        );
        encoding
    } else {
        if request
            .response_encoding
            .is_some_and(|encoding| encoding != capability.default_encoding)
        {
            push_unique_warning(
                &mut warnings,
                format!(
                    "{} always answers with {}; response format ignored.",
                    capability.name,
                    capability.default_encoding.wire_value()
                ),
            );
        }
        capability.default_encoding
    };

    let format = match request.output_format {
        Some(format) if capability.supports_output_format(format) => {
            body.insert(
                "output_format".to_string(),
                Value::String(format.wire_value().to_string()),
            );
            format
        }
        Some(format) => {
            if format != OutputFormat::Png {
                push_unique_warning(
                    &mut warnings,
                    format!(
                        "{} only produces png; {} ignored.",
                        capability.name,
                        format.wire_value()
                    ),
                );
            }
            OutputFormat::Png
        }
        None => OutputFormat::Png,
    };

    match request.background {
        Some(Background::Auto) | None => {}
        Some(background) if capability.supports_background => {
            body.insert(
                "background".to_string(),
                Value::String(background.as_str().to_string()),
            );
        }
        Some(_) => push_unique_warning(
            &mut warnings,
            format!("{} has no background option; dropped.", capability.name),
        ),
    }

    if let Some(compression) = request.compression {
        if capability.supports_compression {
            if compression > 100 {
                return Err(GenerationError::validation(
                    "compression",
                    format!("{compression} is outside 0-100"),
                ));
            }
            if compression != 100 {
                body.insert(
                    "output_compression".to_string(),
                    Value::Number(compression.into()),
                );
            }
        } else if compression != 100 {
            push_unique_warning(
                &mut warnings,
                format!("{} has no compression option; dropped.", capability.name),
            );
        }
    }

    ensure_allowed(&body, capability)?;

    Ok(Payload {
        body,
        prompt,
        model: capability.name.to_string(),
        encoding,
        format,
        calls,
        warnings,
    })
}

/// Last gate before dispatch: no field outside the allow-list leaves the
/// builder.
fn ensure_allowed(body: &Map<String, Value>, capability: &ModelCapability) -> Result<()> {
    match body.keys().find(|key| !capability.supports_field(key)) {
        Some(field) => Err(GenerationError::validation(
            field.clone(),
            format!("{} does not accept this field", capability.name),
        )),
        None => Ok(()),
    }
}
