use serde_json::Value;

use crate::error::{GenerationError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImagePayload {
    /// Remote URL the image has to be fetched from.
    Link(String),
    /// Base64 image data carried in the response body.
    Inline(String),
}

/// One `data[]` row of an images response, checked explicitly rather than
/// probed field by field downstream.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ServiceImageEntry {
    pub payload: Option<ImagePayload>,
    pub revised_prompt: Option<String>,
}

impl ServiceImageEntry {
    pub fn link(url: impl Into<String>) -> Self {
        Self {
            payload: Some(ImagePayload::Link(url.into())),
            revised_prompt: None,
        }
    }

    pub fn inline(b64: impl Into<String>) -> Self {
        Self {
            payload: Some(ImagePayload::Inline(b64.into())),
            revised_prompt: None,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_revised_prompt(mut self, revised_prompt: impl Into<String>) -> Self {
        self.revised_prompt = Some(revised_prompt.into());
        self
    }

    fn from_row(row: &Value) -> Self {
        let Some(obj) = row.as_object() else {
            return Self::empty();
        };
        let text = |key: &str| {
            obj.get(key)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string)
        };
        let payload = text("b64_json")
            .map(ImagePayload::Inline)
            .or_else(|| text("url").map(ImagePayload::Link));
        Self {
            payload,
            revised_prompt: text("revised_prompt"),
        }
    }
}

/// Splits an images response into entries, one per `data[]` row, in service
/// order. Rows that are not objects become empty entries so the normalizer
/// can report them individually.
pub fn parse_entries(response: &Value) -> Result<Vec<ServiceImageEntry>> {
    let rows = response
        .get("data")
        .and_then(Value::as_array)
        .ok_or_else(|| GenerationError::InvalidResponse("missing `data` array".to_string()))?;
    Ok(rows.iter().map(ServiceImageEntry::from_row).collect())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{parse_entries, ImagePayload, ServiceImageEntry};
    use crate::error::GenerationError;

    #[test]
    fn parse_entries_reads_links_inline_and_revised_prompts() {
        let response = json!({
            "created": 1,
            "data": [
                {"url": "https://cdn.example/a.png", "revised_prompt": "a tidy red cube"},
                {"b64_json": "aGVsbG8="},
                {"url": "", "b64_json": null},
                "garbage"
            ]
        });
        let entries = parse_entries(&response).unwrap();
        assert_eq!(entries.len(), 4);
        assert_eq!(
            entries[0],
            ServiceImageEntry::link("https://cdn.example/a.png").with_revised_prompt("a tidy red cube")
        );
        assert_eq!(entries[1].payload, Some(ImagePayload::Inline("aGVsbG8=".to_string())));
        assert_eq!(entries[2], ServiceImageEntry::empty());
        assert_eq!(entries[3], ServiceImageEntry::empty());
    }

    #[test]
    fn inline_payload_wins_over_link() {
        let response = json!({"data": [{"url": "https://x", "b64_json": "AAAA"}]});
        let entries = parse_entries(&response).unwrap();
        assert_eq!(entries[0].payload, Some(ImagePayload::Inline("AAAA".to_string())));
    }

    #[test]
    fn missing_data_array_is_invalid_response() {
        let err = parse_entries(&json!({"error": "nope"})).unwrap_err();
        assert!(matches!(err, GenerationError::InvalidResponse(_)));
    }
}
