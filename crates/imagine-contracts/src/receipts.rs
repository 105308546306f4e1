use std::path::Path;

use serde_json::{Map, Value};

use crate::request::GenerationRequest;
use crate::result::GenerationResult;

pub const RECEIPT_SCHEMA_VERSION: u64 = 1;

/// Everything needed to explain one saved image: what the user asked for,
/// what was sent, what came back and where it was written.
pub struct ReceiptInput<'a> {
    pub request: &'a GenerationRequest,
    pub payload: &'a Map<String, Value>,
    pub result: &'a GenerationResult,
    pub warnings: &'a [String],
    pub image_path: &'a Path,
    pub receipt_path: &'a Path,
    pub mime_type: &'a str,
}

pub fn build_receipt(input: &ReceiptInput<'_>) -> Value {
    let mut root = Map::new();
    root.insert(
        "schema_version".to_string(),
        Value::Number(RECEIPT_SCHEMA_VERSION.into()),
    );
    root.insert(
        "request".to_string(),
        sanitize_payload(&serde_json::to_value(input.request).unwrap_or(Value::Null)),
    );
    root.insert(
        "payload".to_string(),
        sanitize_payload(&Value::Object(input.payload.clone())),
    );
    root.insert(
        "result".to_string(),
        sanitize_payload(&serde_json::to_value(input.result).unwrap_or(Value::Null)),
    );
    root.insert(
        "warnings".to_string(),
        Value::Array(input.warnings.iter().cloned().map(Value::String).collect()),
    );

    let mut artifacts = Map::new();
    artifacts.insert(
        "image_path".to_string(),
        Value::String(input.image_path.to_string_lossy().to_string()),
    );
    artifacts.insert(
        "receipt_path".to_string(),
        Value::String(input.receipt_path.to_string_lossy().to_string()),
    );
    artifacts.insert(
        "mime_type".to_string(),
        Value::String(input.mime_type.to_string()),
    );
    root.insert("artifacts".to_string(), Value::Object(artifacts));
    Value::Object(root)
}

pub fn write_receipt(path: &Path, payload: &Value) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(payload)?)?;
    Ok(())
}

/// Inline image data never lands in a receipt.
fn sanitize_payload(value: &Value) -> Value {
    match value {
        Value::Array(rows) => Value::Array(rows.iter().map(sanitize_payload).collect()),
        Value::Object(map) => {
            let mut out = Map::new();
            for (key, row) in map {
                let lowered = key.to_ascii_lowercase();
                if matches!(
                    lowered.as_str(),
                    "b64_json" | "image" | "image_bytes" | "data"
                ) {
                    out.insert(key.clone(), Value::String("<omitted>".to_string()));
                    continue;
                }
                out.insert(key.clone(), sanitize_payload(row));
            }
            Value::Object(out)
        }
        _ => value.clone(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Map, Value};

    use super::{build_receipt, sanitize_payload, write_receipt, ReceiptInput, RECEIPT_SCHEMA_VERSION};
    use crate::models::OutputFormat;
    use crate::request::GenerationRequest;
    use crate::result::{GenerationResult, ImageSource};

    #[test]
    fn receipt_records_request_payload_and_artifacts() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let receipt_path = temp.path().join("image_1.json");
        let image_path = temp.path().join("image_1.png");

        let request = GenerationRequest::new("hello", "dall-e-3").with_seed(7);
        let mut payload = Map::new();
        payload.insert("model".to_string(), json!("dall-e-3"));
        payload.insert("prompt".to_string(), json!("hello [seed:7]"));
        let result = GenerationResult {
            index: 0,
            bytes: vec![0; 16],
            prompt: "hello [seed:7]".to_string(),
            revised_prompt: "a friendly hello".to_string(),
            model: "dall-e-3".to_string(),
            format: OutputFormat::Png,
            source: ImageSource::Link("https://cdn.example/1.png".to_string()),
            created_at: "2026-01-01T00:00:00+00:00".to_string(),
        };
        let warnings = vec!["note".to_string()];

        let receipt = build_receipt(&ReceiptInput {
            request: &request,
            payload: &payload,
            result: &result,
            warnings: &warnings,
            image_path: &image_path,
            receipt_path: &receipt_path,
            mime_type: "image/png",
        });
        write_receipt(&receipt_path, &receipt)?;

        let parsed: Value = serde_json::from_str(&std::fs::read_to_string(&receipt_path)?)?;
        assert_eq!(parsed["schema_version"], json!(RECEIPT_SCHEMA_VERSION));
        assert_eq!(parsed["request"]["seed"], json!(7));
        assert_eq!(parsed["payload"]["prompt"], json!("hello [seed:7]"));
        assert_eq!(parsed["result"]["revised_prompt"], json!("a friendly hello"));
        assert_eq!(parsed["result"]["source"]["url"], json!("https://cdn.example/1.png"));
        assert!(parsed["result"].get("bytes").is_none());
        assert_eq!(parsed["artifacts"]["mime_type"], json!("image/png"));
        assert_eq!(parsed["warnings"], json!(["note"]));
        Ok(())
    }

    #[test]
    fn sanitize_omits_inline_image_data() {
        let cleaned = sanitize_payload(&json!({
            "data": [{"b64_json": "AAAA"}],
            "nested": {"b64_json": "BBBB", "url": "https://x"}
        }));
        assert_eq!(cleaned["data"], json!("<omitted>"));
        assert_eq!(cleaned["nested"]["b64_json"], json!("<omitted>"));
        assert_eq!(cleaned["nested"]["url"], json!("https://x"));
    }
}
