use serde::{Deserialize, Serialize};

/// How the service delivers each generated image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseEncoding {
    Link,
    Inline,
}

impl ResponseEncoding {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "url" | "link" => Some(Self::Link),
            "b64_json" | "b64" | "base64" | "inline" => Some(Self::Inline),
            _ => None,
        }
    }

    /// Value of the `response_format` request field.
    pub fn wire_value(self) -> &'static str {
        match self {
            Self::Link => "url",
            Self::Inline => "b64_json",
        }
    }
}

/// Image container format, both for the service's `output_format` and for
/// downloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    Png,
    Jpeg,
    Webp,
}

impl OutputFormat {
    pub fn parse(raw: &str) -> Option<Self> {
        let lowered = raw.trim().to_ascii_lowercase();
        match lowered.strip_prefix("image/").unwrap_or(&lowered) {
            "png" => Some(Self::Png),
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "webp" => Some(Self::Webp),
            _ => None,
        }
    }

    /// Lenient variant for downloads: anything unrecognized becomes PNG.
    pub fn resolve(raw: &str) -> Self {
        Self::parse(raw).unwrap_or(Self::Png)
    }

    pub fn wire_value(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpeg",
            Self::Webp => "webp",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::Webp => "webp",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::Webp => "image/webp",
        }
    }
}
