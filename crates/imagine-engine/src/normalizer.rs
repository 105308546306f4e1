use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use imagine_contracts::models::OutputFormat;
use imagine_contracts::response::{ImagePayload, ServiceImageEntry};
use imagine_contracts::result::{GenerationResult, ImageSource, ItemFailure};
use imagine_contracts::GenerationError;

use crate::service::ImageFetcher;
use crate::util::now_utc_iso;

/// What every image of one call shares.
#[derive(Debug, Clone, Copy)]
pub struct NormalizeContext<'a> {
    pub prompt: &'a str,
    pub model: &'a str,
    pub format: OutputFormat,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizedBatch {
    pub results: Vec<GenerationResult>,
    pub failures: Vec<ItemFailure>,
}

/// Turns service entries into results, in order. Results and failures both
/// carry the entry's position, and a bad entry never aborts its siblings.
pub fn normalize(
    entries: &[ServiceImageEntry],
    ctx: &NormalizeContext<'_>,
    fetcher: &dyn ImageFetcher,
) -> NormalizedBatch {
    let mut batch = NormalizedBatch::default();
    for (index, entry) in entries.iter().enumerate() {
        match materialize(entry, fetcher) {
            Ok((bytes, source)) => batch.results.push(GenerationResult {
                index,
                bytes,
                prompt: ctx.prompt.to_string(),
                revised_prompt: entry
                    .revised_prompt
                    .clone()
                    .unwrap_or_else(|| ctx.prompt.to_string()),
                model: ctx.model.to_string(),
                format: ctx.format,
                source,
                created_at: now_utc_iso(),
            }),
            Err(error) => {
                log::warn!("image {} of {} unusable: {error}", index + 1, entries.len());
                batch.failures.push(ItemFailure::new(index, error));
            }
        }
    }
    batch
}

fn materialize(
    entry: &ServiceImageEntry,
    fetcher: &dyn ImageFetcher,
) -> Result<(Vec<u8>, ImageSource), GenerationError> {
    let (bytes, source) = fetch_payload(entry, fetcher)?;
    image::guess_format(&bytes).map_err(|err| {
        GenerationError::UnexpectedResponseShape(format!(
            "{} payload is not an image: {err}",
            source.label()
        ))
    })?;
    Ok((bytes, source))
}

fn fetch_payload(
    entry: &ServiceImageEntry,
    fetcher: &dyn ImageFetcher,
) -> Result<(Vec<u8>, ImageSource), GenerationError> {
    match &entry.payload {
        Some(ImagePayload::Inline(b64)) => {
            let bytes = BASE64.decode(b64.trim()).map_err(|err| {
                GenerationError::UnexpectedResponseShape(format!("inline image is not base64: {err}"))
            })?;
            if bytes.is_empty() {
                return Err(GenerationError::UnexpectedResponseShape(
                    "inline image is empty".to_string(),
                ));
            }
            Ok((bytes, ImageSource::Inline))
        }
        Some(ImagePayload::Link(url)) => {
            let bytes = fetcher.fetch(url)?;
            Ok((bytes, ImageSource::Link(url.clone())))
        }
        None => Err(GenerationError::UnexpectedResponseShape(
            "entry carries neither a link nor inline data".to_string(),
        )),
    }
}
