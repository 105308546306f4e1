use imagine_contracts::response::{parse_entries, ServiceImageEntry};
use imagine_contracts::{GenerationError, Result};
use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use reqwest::StatusCode;
use serde_json::{Map, Value};

use crate::config::EngineConfig;
use crate::util::truncate_text;

/// The text-to-image endpoint.
pub trait ImageService {
    fn generate(&self, api_key: &str, body: &Map<String, Value>) -> Result<Vec<ServiceImageEntry>>;
}

/// Plain HTTP GET for link-delivered images.
pub trait ImageFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

#[derive(Debug, Clone)]
pub struct OpenAiImageService {
    endpoint: String,
    http: HttpClient,
}

impl OpenAiImageService {
    pub fn new(config: &EngineConfig) -> Result<Self> {
        let http = HttpClient::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|err| transport_error("failed to build HTTP client", &err))?;
        Ok(Self {
            endpoint: config.generations_endpoint(),
            http,
        })
    }
}

impl ImageService for OpenAiImageService {
    fn generate(&self, api_key: &str, body: &Map<String, Value>) -> Result<Vec<ServiceImageEntry>> {
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .json(body)
            .send()
            .map_err(|err| transport_error("image generation request failed", &err))?;
        let payload = response_json_or_error(response)?;
        parse_entries(&payload)
    }
}

impl ImageFetcher for OpenAiImageService {
    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let response = self
            .http
            .get(url)
            .send()
            .map_err(|err| transport_error("image download failed", &err))?;
        let status = response.status();
        if !status.is_success() {
            return Err(GenerationError::Transport(format!(
                "image download failed ({})",
                status.as_u16()
            )));
        }
        let bytes = response
            .bytes()
            .map_err(|err| transport_error("failed reading image bytes", &err))?;
        Ok(bytes.to_vec())
    }
}

fn response_json_or_error(response: HttpResponse) -> Result<Value> {
    let status = response.status();
    let body = response
        .text()
        .map_err(|err| transport_error("response body read failed", &err))?;
    if !status.is_success() {
        return Err(classify_failure(status, &body));
    }
    serde_json::from_str(&body).map_err(|err| {
        GenerationError::InvalidResponse(format!(
            "{err}: {}",
            truncate_text(body.trim(), 200)
        ))
    })
}

/// 401 and 403 get their own variants; every other status is `Rejected`.
pub(crate) fn classify_failure(status: StatusCode, body: &str) -> GenerationError {
    let message = service_error_message(body)
        .or_else(|| {
            let trimmed = body.trim();
            (!trimmed.is_empty()).then(|| truncate_text(trimmed, 512))
        })
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string()
        });
    match status {
        StatusCode::UNAUTHORIZED => GenerationError::Authentication(message),
        StatusCode::FORBIDDEN => GenerationError::Authorization(message),
        _ => GenerationError::Rejected {
            status: status.as_u16(),
            message,
        },
    }
}

fn service_error_message(body: &str) -> Option<String> {
    let parsed: Value = serde_json::from_str(body).ok()?;
    parsed
        .pointer("/error/message")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn transport_error(context: &str, err: &reqwest::Error) -> GenerationError {
    let mut parts = vec![context.to_string()];
    if err.is_timeout() {
        parts.push("timed out".to_string());
    }
    let mut cause: Option<&dyn std::error::Error> = Some(err);
    while let Some(current) = cause {
        let text = current.to_string();
        let trimmed = text.trim();
        if !trimmed.is_empty() && parts.last().map(String::as_str) != Some(trimmed) {
            parts.push(trimmed.to_string());
        }
        cause = current.source();
    }
    GenerationError::Transport(truncate_text(&parts.join(" | caused by: "), 512))
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::thread::{self, JoinHandle};
    use std::time::Duration;

    use imagine_contracts::response::{ImagePayload, ServiceImageEntry};
    use imagine_contracts::GenerationError;
    use reqwest::StatusCode;
    use serde_json::{json, Map};

    use super::{classify_failure, ImageFetcher, ImageService, OpenAiImageService};
    use crate::config::EngineConfig;

    fn header_end(buffer: &[u8]) -> Option<usize> {
        buffer.windows(4).position(|window| window == b"\r\n\r\n")
    }

    fn read_request(stream: &mut TcpStream) -> String {
        let _ = stream.set_read_timeout(Some(Duration::from_secs(5)));
        let mut buffer = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let read = match stream.read(&mut chunk) {
                Ok(0) | Err(_) => break,
                Ok(read) => read,
            };
            buffer.extend_from_slice(&chunk[..read]);
            if let Some(end) = header_end(&buffer) {
                let head = String::from_utf8_lossy(&buffer[..end]).to_ascii_lowercase();
                let length = head
                    .lines()
                    .find_map(|line| line.strip_prefix("content-length:"))
                    .and_then(|value| value.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if buffer.len() >= end + 4 + length {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&buffer).to_string()
    }

    /// Answers exactly one request and hands back what was received.
    fn serve_once(
        status_line: &'static str,
        content_type: &'static str,
        body: Vec<u8>,
    ) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr");
        let handle = thread::spawn(move || {
            let Ok((mut stream, _)) = listener.accept() else {
                return String::new();
            };
            let request = read_request(&mut stream);
            let head = format!(
                "HTTP/1.1 {status_line}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                body.len()
            );
            let _ = stream.write_all(head.as_bytes());
            let _ = stream.write_all(&body);
            let _ = stream.flush();
            request
        });
        (format!("http://{addr}"), handle)
    }

    fn service_for(base: &str) -> OpenAiImageService {
        let config = EngineConfig::new()
            .with_api_base(format!("{base}/v1"))
            .with_timeout(Duration::from_secs(10));
        OpenAiImageService::new(&config).expect("service")
    }

    fn body() -> Map<String, serde_json::Value> {
        json!({"model": "gpt-image-1", "prompt": "a red cube", "n": 2, "size": "1024x1024"})
            .as_object()
            .cloned()
            .unwrap_or_default()
    }

    #[test]
    fn generate_posts_payload_with_bearer_auth_and_parses_entries() {
        let response = json!({
            "created": 1,
            "data": [
                {"b64_json": "aGVsbG8=", "revised_prompt": "a glossy red cube"},
                {"url": "https://cdn.example/2.png"}
            ]
        });
        let (base, handle) = serve_once(
            "200 OK",
            "application/json",
            response.to_string().into_bytes(),
        );

        let entries = service_for(&base)
            .generate("sk-test-key", &body())
            .expect("generate");
        let request = handle.join().expect("server thread");

        assert_eq!(entries.len(), 2);
        assert_eq!(
            entries[0],
            ServiceImageEntry::inline("aGVsbG8=").with_revised_prompt("a glossy red cube")
        );
        assert_eq!(
            entries[1].payload,
            Some(ImagePayload::Link("https://cdn.example/2.png".to_string()))
        );
        let lowered = request.to_ascii_lowercase();
        assert!(lowered.starts_with("post /v1/images/generations"));
        assert!(lowered.contains("authorization: bearer sk-test-key"));
        assert!(request.contains("\"prompt\":\"a red cube\""));
    }

    #[test]
    fn unauthorized_maps_to_authentication_error() {
        let response = json!({"error": {"message": "Incorrect API key provided", "type": "invalid_request_error"}});
        let (base, handle) = serve_once(
            "401 Unauthorized",
            "application/json",
            response.to_string().into_bytes(),
        );
        let err = service_for(&base).generate("sk-bad", &body()).unwrap_err();
        let _ = handle.join();
        assert_eq!(
            err,
            GenerationError::Authentication("Incorrect API key provided".to_string())
        );
    }

    #[test]
    fn forbidden_maps_to_authorization_error() {
        let response = json!({"error": {"message": "organization must be verified"}});
        let (base, handle) = serve_once(
            "403 Forbidden",
            "application/json",
            response.to_string().into_bytes(),
        );
        let err = service_for(&base).generate("sk-ok", &body()).unwrap_err();
        let _ = handle.join();
        assert!(matches!(err, GenerationError::Authorization(ref message) if message.contains("verified")));
    }

    #[test]
    fn invalid_json_success_is_invalid_response() {
        let (base, handle) = serve_once("200 OK", "text/plain", b"not json".to_vec());
        let err = service_for(&base).generate("sk-ok", &body()).unwrap_err();
        let _ = handle.join();
        assert!(matches!(err, GenerationError::InvalidResponse(_)));
    }

    #[test]
    fn fetch_returns_body_bytes_and_reports_bad_status() {
        let (base, handle) = serve_once("200 OK", "image/png", vec![137, 80, 78, 71]);
        let bytes = service_for(&base)
            .fetch(&format!("{base}/img/1.png"))
            .expect("fetch");
        let request = handle.join().expect("server thread");
        assert_eq!(bytes, vec![137, 80, 78, 71]);
        assert!(request.starts_with("GET /img/1.png"));

        let (base, handle) = serve_once("404 Not Found", "text/plain", b"gone".to_vec());
        let err = service_for(&base)
            .fetch(&format!("{base}/img/2.png"))
            .unwrap_err();
        let _ = handle.join();
        assert_eq!(
            err,
            GenerationError::Transport("image download failed (404)".to_string())
        );
    }

    #[test]
    fn refused_connection_is_transport_error() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
            listener.local_addr().expect("addr").port()
        };
        let err = service_for(&format!("http://127.0.0.1:{port}"))
            .generate("sk-ok", &body())
            .unwrap_err();
        assert!(matches!(err, GenerationError::Transport(_)));
    }

    #[test]
    fn classify_failure_falls_back_to_body_then_reason() {
        assert_eq!(
            classify_failure(StatusCode::BAD_REQUEST, "size must be 1024x1024"),
            GenerationError::Rejected {
                status: 400,
                message: "size must be 1024x1024".to_string()
            }
        );
        assert_eq!(
            classify_failure(StatusCode::TOO_MANY_REQUESTS, ""),
            GenerationError::Rejected {
                status: 429,
                message: "Too Many Requests".to_string()
            }
        );
    }
}
