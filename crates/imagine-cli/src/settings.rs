use anyhow::{bail, Result};
use imagine_contracts::models::{ModelRegistry, OutputFormat, ResponseEncoding};
use imagine_contracts::request::{ArtStyle, Background, GenerationRequest, StyleMode};

/// Generation options the user has chosen so far. Front ends fill this from
/// flags or slash commands and turn it into a request per prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationSettings {
    pub model: String,
    pub size: Option<String>,
    pub quality: Option<String>,
    pub count: u32,
    pub style: Option<StyleMode>,
    pub art_style: Option<ArtStyle>,
    pub negative_prompt: Option<String>,
    pub seed: i64,
    pub background: Option<Background>,
    pub compression: Option<u8>,
    pub output_format: Option<OutputFormat>,
    pub response_encoding: Option<ResponseEncoding>,
}

impl GenerationSettings {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            size: None,
            quality: None,
            count: 1,
            style: None,
            art_style: None,
            negative_prompt: None,
            seed: -1,
            background: None,
            compression: None,
            output_format: None,
            response_encoding: None,
        }
    }

    /// Applies one `key = raw` change and returns the confirmation line.
    /// A blank value resets the option.
    pub fn apply(&mut self, key: &str, raw: &str, registry: &ModelRegistry) -> Result<String> {
        let value = raw.trim();
        match key {
            "model" => {
                if value.is_empty() {
                    return Ok(format!("Model: {}", self.model));
                }
                let capability = registry.require(value)?;
                self.model = capability.name.to_string();
                Ok(format!("Model set to {}", self.model))
            }
            "size" => {
                self.size = non_empty(value).map(|size| size.to_ascii_lowercase());
                Ok(format!("Size: {}", display(self.size.as_deref())))
            }
            "quality" => {
                self.quality = non_empty(value).map(|quality| quality.to_ascii_lowercase());
                Ok(format!("Quality: {}", display(self.quality.as_deref())))
            }
            "style" => {
                self.style = match non_empty(value) {
                    None => None,
                    Some(raw) => match StyleMode::parse(raw) {
                        Some(style) => Some(style),
                        None => bail!("style must be vivid or natural"),
                    },
                };
                Ok(format!("Style: {}", display(self.style.map(StyleMode::as_str))))
            }
            "art_style" => {
                self.art_style = match non_empty(value) {
                    None => None,
                    Some(raw) if raw.eq_ignore_ascii_case("none") => None,
                    Some(raw) => match ArtStyle::parse(raw) {
                        Some(style) => Some(style),
                        None => bail!(
                            "unknown art style '{raw}'; choose one of: {}",
                            ArtStyle::ALL.map(ArtStyle::label).join(", ")
                        ),
                    },
                };
                Ok(format!("Art style: {}", display(self.art_style.map(ArtStyle::label))))
            }
            "count" => {
                let limit = registry.require(&self.model)?.max_images;
                self.count = match non_empty(value) {
                    None => 1,
                    Some(raw) => match raw.parse::<u32>() {
                        Ok(count) if count > 0 && count <= limit => count,
                        _ => bail!("count must be a whole number from 1 to {limit}"),
                    },
                };
                Ok(format!("Images per prompt: {}", self.count))
            }
            "seed" => {
                self.seed = match non_empty(value) {
                    None => -1,
                    Some(raw) => match raw.parse::<i64>() {
                        Ok(seed) => seed,
                        Err(_) => bail!("seed must be a whole number (-1 for random)"),
                    },
                };
                if self.seed < 0 {
                    Ok("Seed: random".to_string())
                } else {
                    Ok(format!("Seed: {}", self.seed))
                }
            }
            "negative_prompt" => {
                self.negative_prompt = non_empty(value).map(str::to_string);
                Ok(format!(
                    "Negative prompt: {}",
                    display(self.negative_prompt.as_deref())
                ))
            }
            "background" => {
                self.background = match non_empty(value) {
                    None => None,
                    Some(raw) => match Background::parse(raw) {
                        Some(background) => Some(background),
                        None => bail!("background must be auto, transparent or opaque"),
                    },
                };
                Ok(format!(
                    "Background: {}",
                    display(self.background.map(Background::as_str))
                ))
            }
            "compression" => {
                self.compression = match non_empty(value) {
                    None => None,
                    Some(raw) => match raw.parse::<u8>() {
                        Ok(level) if level <= 100 => Some(level),
                        _ => bail!("compression must be between 0 and 100"),
                    },
                };
                Ok(format!(
                    "Compression: {}",
                    self.compression
                        .map(|level| format!("{level}%"))
                        .unwrap_or_else(|| "default".to_string())
                ))
            }
            "output_format" => {
                self.output_format = match non_empty(value) {
                    None => None,
                    Some(raw) => match OutputFormat::parse(raw) {
                        Some(format) => Some(format),
                        None => bail!("format must be png, jpeg or webp"),
                    },
                };
                Ok(format!(
                    "Output format: {}",
                    display(self.output_format.map(OutputFormat::wire_value))
                ))
            }
            "response_encoding" => {
                self.response_encoding = match non_empty(value) {
                    None => None,
                    Some(raw) => match ResponseEncoding::parse(raw) {
                        Some(encoding) => Some(encoding),
                        None => bail!("encoding must be url or b64_json"),
                    },
                };
                Ok(format!(
                    "Response encoding: {}",
                    display(self.response_encoding.map(ResponseEncoding::wire_value))
                ))
            }
            other => bail!("unknown setting '{other}'"),
        }
    }

    pub fn request(&self, prompt: &str) -> GenerationRequest {
        let mut request = GenerationRequest::new(prompt, self.model.clone())
            .with_count(self.count)
            .with_seed(self.seed);
        request.size = self.size.clone();
        request.quality = self.quality.clone();
        request.style = self.style;
        request.art_style = self.art_style;
        request.negative_prompt = self.negative_prompt.clone();
        request.background = self.background;
        request.compression = self.compression;
        request.output_format = self.output_format;
        request.response_encoding = self.response_encoding;
        request
    }

    pub fn describe(&self) -> Vec<String> {
        vec![
            format!("model: {}", self.model),
            format!("size: {}", display(self.size.as_deref())),
            format!("quality: {}", display(self.quality.as_deref())),
            format!("count: {}", self.count),
            format!("style: {}", display(self.style.map(StyleMode::as_str))),
            format!("art: {}", display(self.art_style.map(ArtStyle::label))),
            format!("negative: {}", display(self.negative_prompt.as_deref())),
            format!(
                "seed: {}",
                if self.seed < 0 {
                    "random".to_string()
                } else {
                    self.seed.to_string()
                }
            ),
            format!(
                "background: {}",
                display(self.background.map(Background::as_str))
            ),
            format!(
                "compression: {}",
                self.compression
                    .map(|level| level.to_string())
                    .unwrap_or_else(|| "default".to_string())
            ),
            format!(
                "format: {}",
                display(self.output_format.map(OutputFormat::wire_value))
            ),
            format!(
                "encoding: {}",
                display(self.response_encoding.map(ResponseEncoding::wire_value))
            ),
        ]
    }
}

fn non_empty(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

fn display(value: Option<&str>) -> &str {
    value.unwrap_or("default")
}
