use serde::{Deserialize, Serialize};

use crate::models::{OutputFormat, ResponseEncoding};

/// `style` field accepted by models with a style mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StyleMode {
    Vivid,
    Natural,
}

impl StyleMode {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "vivid" => Some(Self::Vivid),
            "natural" => Some(Self::Natural),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Vivid => "vivid",
            Self::Natural => "natural",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Background {
    Auto,
    Transparent,
    Opaque,
}

impl Background {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "auto" | "default" => Some(Self::Auto),
            "transparent" => Some(Self::Transparent),
            "opaque" => Some(Self::Opaque),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Transparent => "transparent",
            Self::Opaque => "opaque",
        }
    }
}

/// Prompt-modifier presets appended to the user's prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtStyle {
    Realistic,
    Artistic,
    AnimeManga,
    DigitalArt,
    OilPainting,
    Watercolor,
    PencilSketch,
    Render3d,
    Cartoon,
    Photography,
    Abstract,
    Surreal,
    Minimalist,
    Vintage,
    Cyberpunk,
}

impl ArtStyle {
    pub const ALL: [ArtStyle; 15] = [
        Self::Realistic,
        Self::Artistic,
        Self::AnimeManga,
        Self::DigitalArt,
        Self::OilPainting,
        Self::Watercolor,
        Self::PencilSketch,
        Self::Render3d,
        Self::Cartoon,
        Self::Photography,
        Self::Abstract,
        Self::Surreal,
        Self::Minimalist,
        Self::Vintage,
        Self::Cyberpunk,
    ];

    /// Accepts display labels ("Oil Painting", "Anime/Manga") and slugs
    /// ("oil-painting", "3d_render"), ignoring case and separators.
    pub fn parse(raw: &str) -> Option<Self> {
        let wanted = squash(raw);
        if wanted.is_empty() {
            return None;
        }
        Self::ALL
            .into_iter()
            .find(|style| squash(style.label()) == wanted)
            .or(match wanted.as_str() {
                "anime" | "manga" => Some(Self::AnimeManga),
                "3d" | "render" => Some(Self::Render3d),
                "sketch" => Some(Self::PencilSketch),
                _ => None,
            })
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Realistic => "Realistic",
            Self::Artistic => "Artistic",
            Self::AnimeManga => "Anime/Manga",
            Self::DigitalArt => "Digital Art",
            Self::OilPainting => "Oil Painting",
            Self::Watercolor => "Watercolor",
            Self::PencilSketch => "Pencil Sketch",
            Self::Render3d => "3D Render",
            Self::Cartoon => "Cartoon",
            Self::Photography => "Photography",
            Self::Abstract => "Abstract",
            Self::Surreal => "Surreal",
            Self::Minimalist => "Minimalist",
            Self::Vintage => "Vintage",
            Self::Cyberpunk => "Cyberpunk",
        }
    }

    pub fn modifier(self) -> &'static str {
        match self {
            Self::Realistic => "photorealistic, highly detailed, professional photography",
            Self::Artistic => "artistic, creative, expressive brushstrokes",
            Self::AnimeManga => "anime style, manga art, Japanese animation",
            Self::DigitalArt => "digital painting, concept art, trending on artstation",
            Self::OilPainting => "oil painting, classical art, museum quality",
            Self::Watercolor => "watercolor painting, soft colors, artistic",
            Self::PencilSketch => "pencil drawing, sketch art, detailed linework",
            Self::Render3d => "3D rendered, octane render, unreal engine",
            Self::Cartoon => "cartoon style, animated, colorful illustration",
            Self::Photography => "professional photography, DSLR quality, bokeh",
            Self::Abstract => "abstract art, modern art, creative composition",
            Self::Surreal => "surrealist art, dreamlike, Salvador Dali style",
            Self::Minimalist => "minimalist, simple, clean lines, negative space",
            Self::Vintage => "vintage style, retro, nostalgic, aged film",
            Self::Cyberpunk => "cyberpunk, neon lights, futuristic, dystopian",
        }
    }
}

fn squash(raw: &str) -> String {
    raw.chars()
        .filter(|ch| ch.is_ascii_alphanumeric())
        .map(|ch| ch.to_ascii_lowercase())
        .collect()
}

/// One generation action as the user asked for it.
///
/// Options the chosen model cannot take are still recorded here; the request
/// builder decides what reaches the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub prompt: String,
    pub model: String,
    pub size: Option<String>,
    pub quality: Option<String>,
    pub count: u32,
    pub style: Option<StyleMode>,
    pub art_style: Option<ArtStyle>,
    pub negative_prompt: Option<String>,
    pub seed: Option<u64>,
    pub background: Option<Background>,
    pub compression: Option<u8>,
    pub output_format: Option<OutputFormat>,
    pub response_encoding: Option<ResponseEncoding>,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            model: model.into(),
            size: None,
            quality: None,
            count: 1,
            style: None,
            art_style: None,
            negative_prompt: None,
            seed: None,
            background: None,
            compression: None,
            output_format: None,
            response_encoding: None,
        }
    }

    pub fn with_size(mut self, size: impl Into<String>) -> Self {
        self.size = Some(size.into());
        self
    }

    pub fn with_quality(mut self, quality: impl Into<String>) -> Self {
        self.quality = Some(quality.into());
        self
    }

    pub fn with_count(mut self, count: u32) -> Self {
        self.count = count;
        self
    }

    pub fn with_style(mut self, style: StyleMode) -> Self {
        self.style = Some(style);
        self
    }

    pub fn with_art_style(mut self, art_style: ArtStyle) -> Self {
        self.art_style = Some(art_style);
        self
    }

    pub fn with_negative_prompt(mut self, negative_prompt: impl Into<String>) -> Self {
        self.negative_prompt = Some(negative_prompt.into());
        self
    }

    /// Negative values are the "unset" sentinel (`-1` in every front end).
    pub fn with_seed(mut self, seed: i64) -> Self {
        self.seed = u64::try_from(seed).ok();
        self
    }

    pub fn with_background(mut self, background: Background) -> Self {
        self.background = Some(background);
        self
    }

    pub fn with_compression(mut self, compression: u8) -> Self {
        self.compression = Some(compression);
        self
    }

    pub fn with_output_format(mut self, output_format: OutputFormat) -> Self {
        self.output_format = Some(output_format);
        self
    }

    pub fn with_response_encoding(mut self, encoding: ResponseEncoding) -> Self {
        self.response_encoding = Some(encoding);
        self
    }

    /// The prompt text actually sent.
    ///
    /// Negative prompt and seed have no native parameter on the service, so
    /// they travel as text suffixes. The model may or may not honor them.
    pub fn compose_prompt(&self) -> String {
        let mut prompt = self.prompt.trim().to_string();
        if let Some(style) = self.art_style {
            prompt.push_str(", ");
            prompt.push_str(style.modifier());
        }
        if let Some(negative) = self
            .negative_prompt
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
        {
            prompt.push_str(". Avoid: ");
            prompt.push_str(negative);
        }
        if let Some(seed) = self.seed {
            prompt.push_str(&format!(" [seed:{seed}]"));
        }
        prompt
    }
}

#[cfg(test)]
mod tests {
    use super::{ArtStyle, Background, GenerationRequest, StyleMode};

    #[test]
    fn compose_prompt_without_extras_is_the_trimmed_prompt() {
        let request = GenerationRequest::new("  a red cube ", "dall-e-3");
        assert_eq!(request.compose_prompt(), "a red cube");
    }

    #[test]
    fn compose_prompt_appends_style_negative_and_seed_in_order() {
        let request = GenerationRequest::new("a golden retriever", "gpt-image-1")
            .with_art_style(ArtStyle::Watercolor)
            .with_negative_prompt("people, text")
            .with_seed(42);
        assert_eq!(
            request.compose_prompt(),
            "a golden retriever, watercolor painting, soft colors, artistic. Avoid: people, text [seed:42]"
        );
    }

    #[test]
    fn negative_seed_means_unset_and_blank_negative_is_skipped() {
        let request = GenerationRequest::new("boat", "dall-e-2")
            .with_seed(-1)
            .with_negative_prompt("   ");
        assert_eq!(request.seed, None);
        assert_eq!(request.compose_prompt(), "boat");
    }

    #[test]
    fn art_style_parses_labels_and_slugs() {
        assert_eq!(ArtStyle::parse("Oil Painting"), Some(ArtStyle::OilPainting));
        assert_eq!(ArtStyle::parse("oil-painting"), Some(ArtStyle::OilPainting));
        assert_eq!(ArtStyle::parse("Anime/Manga"), Some(ArtStyle::AnimeManga));
        assert_eq!(ArtStyle::parse("3d_render"), Some(ArtStyle::Render3d));
        assert_eq!(ArtStyle::parse("sketch"), Some(ArtStyle::PencilSketch));
        assert_eq!(ArtStyle::parse("baroque"), None);
        assert_eq!(ArtStyle::parse(""), None);
    }

    #[test]
    fn option_parsers() {
        assert_eq!(StyleMode::parse("Natural"), Some(StyleMode::Natural));
        assert_eq!(StyleMode::parse("muted"), None);
        assert_eq!(Background::parse("default"), Some(Background::Auto));
        assert_eq!(Background::parse("transparent"), Some(Background::Transparent));
        assert_eq!(Background::parse("white"), None);
    }
}
