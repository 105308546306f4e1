use imagine_contracts::events::{EventWriter, SessionEvent};
use imagine_contracts::models::ModelRegistry;
use imagine_contracts::request::GenerationRequest;
use imagine_contracts::response::ServiceImageEntry;
use imagine_contracts::result::{GenerationResult, ItemFailure};
use imagine_contracts::session::Session;
use imagine_contracts::{GenerationError, Result};
use serde_json::{Map, Value};

use crate::builder::{build, Payload};
use crate::config::EngineConfig;
use crate::normalizer::{normalize, NormalizeContext};
use crate::service::{ImageFetcher, ImageService, OpenAiImageService};
use crate::util::push_unique_warning;

/// Result of one generation action. `results` is also what the session
/// history now holds.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationOutcome {
    pub results: Vec<GenerationResult>,
    pub failures: Vec<ItemFailure>,
    pub warnings: Vec<String>,
    pub payload: Payload,
}

#[derive(Default)]
struct Collected {
    results: Vec<GenerationResult>,
    failures: Vec<ItemFailure>,
}

impl Collected {
    fn fail(&mut self, index: usize, error: GenerationError) {
        self.failures.push(ItemFailure::new(index, error));
    }
}

pub struct Generator<S, F> {
    service: S,
    fetcher: F,
    registry: ModelRegistry,
    journal: Option<EventWriter>,
}

impl Generator<OpenAiImageService, OpenAiImageService> {
    pub fn openai(config: &EngineConfig) -> Result<Self> {
        let service = OpenAiImageService::new(config)?;
        Ok(Self::new(service.clone(), service))
    }
}

impl<S: ImageService, F: ImageFetcher> Generator<S, F> {
    pub fn new(service: S, fetcher: F) -> Self {
        Self {
            service,
            fetcher,
            registry: ModelRegistry::default(),
            journal: None,
        }
    }

    pub fn with_registry(mut self, registry: ModelRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_journal(mut self, journal: EventWriter) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn journal(&self) -> Option<&EventWriter> {
        self.journal.as_ref()
    }

    /// Runs one generation action.
    ///
    /// Per-item failures are collected; the action only fails as a whole when
    /// it produced no image, and then with the first error encountered. The
    /// session history is replaced only on success.
    pub fn generate(
        &self,
        session: &mut Session,
        request: &GenerationRequest,
    ) -> Result<GenerationOutcome> {
        let api_key = session
            .api_key()
            .ok_or(GenerationError::MissingCredential)?
            .to_string();
        let capability = self.registry.require(&request.model)?;
        let payload = build(request, capability)?;
        let mut warnings = payload.warnings.clone();
        for warning in &warnings {
            log::warn!("{warning}");
        }

        let images = payload.total_images();
        log::info!(
            "generating {images} image(s) with {} in {} call(s)",
            payload.model,
            payload.calls
        );
        self.record(SessionEvent::GenerationStarted {
            model: payload.model.clone(),
            prompt: payload.prompt.clone(),
            images,
            calls: payload.calls,
        });

        let ctx = NormalizeContext {
            prompt: &payload.prompt,
            model: &payload.model,
            format: payload.format,
        };
        let mut collected = Collected::default();
        let batch_size = payload.batch_size();
        if batch_size > 1 {
            match self.service.generate(&api_key, payload.body()) {
                Ok(entries) => {
                    self.absorb(entries, batch_size as usize, 0, &ctx, &mut collected);
                }
                Err(err) => {
                    log::warn!(
                        "batched request for {batch_size} images failed ({err}); generating images individually"
                    );
                    push_unique_warning(
                        &mut warnings,
                        format!(
                            "Batch request failed ({}); images were generated individually.",
                            err.kind()
                        ),
                    );
                    self.record(SessionEvent::BatchDegraded {
                        model: payload.model.clone(),
                        images: batch_size,
                        reason: err.to_string(),
                    });
                    self.run_singles(
                        &api_key,
                        &payload.single_image_body(),
                        batch_size,
                        &ctx,
                        &mut collected,
                    );
                }
            }
        } else {
            self.run_singles(&api_key, payload.body(), payload.calls, &ctx, &mut collected);
        }

        let Collected {
            results,
            mut failures,
        } = collected;
        failures.sort_by_key(|failure| failure.index);
        for failure in &failures {
            self.record(SessionEvent::ImageFailed {
                index: failure.index,
                kind: failure.error.kind().to_string(),
                message: failure.error.to_string(),
            });
        }
        self.record(SessionEvent::GenerationFinished {
            model: payload.model.clone(),
            succeeded: results.len(),
            failed: failures.len(),
        });

        if results.is_empty() {
            let first = failures.into_iter().next().map(|failure| failure.error);
            return Err(first.unwrap_or_else(|| {
                GenerationError::UnexpectedResponseShape("service returned no images".to_string())
            }));
        }

        log::info!(
            "{} of {images} image(s) ready ({} failed)",
            results.len(),
            failures.len()
        );
        session.replace_history(results.clone());
        Ok(GenerationOutcome {
            results,
            failures,
            warnings,
            payload,
        })
    }

    /// One single-image call per iteration, strictly in order. A credential
    /// error ends the loop.
    fn run_singles(
        &self,
        api_key: &str,
        body: &Map<String, Value>,
        count: u32,
        ctx: &NormalizeContext<'_>,
        collected: &mut Collected,
    ) {
        for index in 0..count as usize {
            match self.service.generate(api_key, body) {
                Ok(entries) => self.absorb(entries, 1, index, ctx, collected),
                Err(err) => {
                    log::warn!("image {} of {count} failed: {err}", index + 1);
                    let stop = err.is_credential_error();
                    collected.fail(index, err);
                    if stop {
                        break;
                    }
                }
            }
        }
    }

    /// Normalizes up to `expected` entries of one call; missing entries are
    /// reported as failures at their slot.
    fn absorb(
        &self,
        mut entries: Vec<ServiceImageEntry>,
        expected: usize,
        offset: usize,
        ctx: &NormalizeContext<'_>,
        collected: &mut Collected,
    ) {
        if entries.len() > expected {
            log::warn!(
                "service returned {} entries for {expected} requested; extra ignored",
                entries.len()
            );
            entries.truncate(expected);
        }
        let batch = normalize(&entries, ctx, &self.fetcher);
        for failure in batch.failures {
            collected.fail(offset + failure.index, failure.error);
        }
        for slot in entries.len()..expected {
            collected.fail(
                offset + slot,
                GenerationError::UnexpectedResponseShape("service returned no entry".to_string()),
            );
        }
        for mut result in batch.results {
            result.index += offset;
            self.record(SessionEvent::ImageReady {
                index: result.index,
                model: result.model.clone(),
                format: result.format.wire_value().to_string(),
                source: result.source.label().to_string(),
                revised: result.prompt_was_revised(),
            });
            collected.results.push(result);
        }
    }

    fn record(&self, event: SessionEvent) {
        let Some(journal) = &self.journal else {
            return;
        };
        if let Err(err) = journal.emit(&event) {
            log::warn!("failed to write {}: {err:#}", journal.path().display());
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::fs;

    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine as _;
    use imagine_contracts::credentials::{Credential, CredentialSource};
    use imagine_contracts::events::EventWriter;
    use imagine_contracts::models::{
        ModelCapability, ModelRegistry, OutputFormat, ResponseEncoding, DALL_E_2,
    };
    use imagine_contracts::request::GenerationRequest;
    use imagine_contracts::response::ServiceImageEntry;
    use imagine_contracts::session::Session;
    use imagine_contracts::{GenerationError, Result};
    use serde_json::{json, Map, Value};

    use super::Generator;
    use crate::service::{ImageFetcher, ImageService};

    const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n";

    fn png_bytes(tag: &str) -> Vec<u8> {
        [PNG_MAGIC, tag.as_bytes()].concat()
    }

    fn inline(tag: &str) -> ServiceImageEntry {
        ServiceImageEntry::inline(BASE64.encode(png_bytes(tag)))
    }

    const MODEL_A: ModelCapability = ModelCapability {
        name: "modelA",
        sizes: &["1024x1024"],
        default_size: "1024x1024",
        qualities: &[],
        default_quality: None,
        max_batch: 1,
        max_images: 10,
        supports_style: false,
        response_format_selector: false,
        output_formats: &[],
        supports_background: false,
        supports_compression: false,
        default_encoding: ResponseEncoding::Inline,
    };

    /// Answers queued outcomes in order; once the queue is empty every call
    /// returns one inline image per requested `n`.
    #[derive(Default)]
    struct ScriptedService {
        calls: RefCell<Vec<Map<String, Value>>>,
        script: RefCell<VecDeque<Result<Vec<ServiceImageEntry>>>>,
    }

    impl ScriptedService {
        fn then(self, outcome: Result<Vec<ServiceImageEntry>>) -> Self {
            self.script.borrow_mut().push_back(outcome);
            self
        }

        fn bodies(&self) -> Vec<Map<String, Value>> {
            self.calls.borrow().clone()
        }
    }

    impl ImageService for &ScriptedService {
        fn generate(
            &self,
            _api_key: &str,
            body: &Map<String, Value>,
        ) -> Result<Vec<ServiceImageEntry>> {
            self.calls.borrow_mut().push(body.clone());
            if let Some(outcome) = self.script.borrow_mut().pop_front() {
                return outcome;
            }
            let n = body.get("n").and_then(Value::as_u64).unwrap_or(1);
            Ok((0..n)
                .map(|idx| inline(&format!("image-{idx}")))
                .collect())
        }
    }

    #[derive(Default)]
    struct CountingFetcher {
        urls: RefCell<Vec<String>>,
    }

    impl ImageFetcher for &CountingFetcher {
        fn fetch(&self, url: &str) -> Result<Vec<u8>> {
            self.urls.borrow_mut().push(url.to_string());
            Ok(png_bytes(url))
        }
    }

    fn session() -> Session {
        Session::new(Credential::new("sk-test", CredentialSource::Environment))
    }

    fn prompt_of(body: &Map<String, Value>) -> Value {
        body.get("prompt").cloned().unwrap_or(Value::Null)
    }

    #[test]
    fn non_batching_model_issues_one_call_per_image() -> Result<()> {
        let service = ScriptedService::default();
        let fetcher = CountingFetcher::default();
        let generator = Generator::new(&service, &fetcher)
            .with_registry(ModelRegistry::from_capabilities(&[MODEL_A]));
        let mut session = session();

        let outcome = generator.generate(
            &mut session,
            &GenerationRequest::new("a red cube", "modelA").with_count(3),
        )?;

        let bodies = service.bodies();
        assert_eq!(bodies.len(), 3);
        for body in &bodies {
            assert_eq!(prompt_of(body), json!("a red cube"));
            assert_eq!(body.get("n"), Some(&json!(1)));
        }
        assert_eq!(outcome.results.len(), 3);
        assert!(outcome.results.iter().all(|result| result.model == "modelA"));
        assert!(outcome.failures.is_empty());
        assert_eq!(session.history().len(), 3);
        assert!(fetcher.urls.borrow().is_empty());
        Ok(())
    }

    #[test]
    fn failed_batch_degrades_to_single_calls() -> Result<()> {
        let service = ScriptedService::default().then(Err(GenerationError::Rejected {
            status: 400,
            message: "n must be 1".to_string(),
        }));
        let fetcher = CountingFetcher::default();
        let generator = Generator::new(&service, &fetcher);
        let mut session = session();

        let outcome = generator.generate(
            &mut session,
            &GenerationRequest::new("a red cube", "gpt-image-1").with_count(3),
        )?;

        let bodies = service.bodies();
        assert_eq!(bodies.len(), 4);
        assert_eq!(bodies[0].get("n"), Some(&json!(3)));
        assert!(bodies[1..].iter().all(|body| body.get("n") == Some(&json!(1))));
        assert_eq!(outcome.results.len(), 3);
        assert!(outcome
            .warnings
            .iter()
            .any(|warning| warning.contains("individually")));
        Ok(())
    }

    #[test]
    fn single_call_failures_are_kept_per_item() -> Result<()> {
        let service = ScriptedService::default()
            .then(Ok(vec![ServiceImageEntry::link("https://cdn.example/1.png")]))
            .then(Err(GenerationError::Transport("timed out".to_string())))
            .then(Ok(vec![ServiceImageEntry::empty()]));
        let fetcher = CountingFetcher::default();
        let generator = Generator::new(&service, &fetcher);
        let mut session = session();

        let outcome = generator.generate(
            &mut session,
            &GenerationRequest::new("a red cube", "dall-e-3").with_count(4),
        )?;

        assert_eq!(service.bodies().len(), 4);
        assert_eq!(outcome.results.len(), 2);
        let indices: Vec<usize> = outcome.failures.iter().map(|failure| failure.index).collect();
        assert_eq!(indices, vec![1, 2]);
        assert!(matches!(outcome.failures[0].error, GenerationError::Transport(_)));
        assert!(matches!(
            outcome.failures[1].error,
            GenerationError::UnexpectedResponseShape(_)
        ));
        assert_eq!(fetcher.urls.borrow().as_slice(), ["https://cdn.example/1.png"]);
        Ok(())
    }

    #[test]
    fn credential_failure_stops_the_loop() {
        let service = ScriptedService::default()
            .then(Err(GenerationError::Authorization("verify org".to_string())));
        let fetcher = CountingFetcher::default();
        let generator = Generator::new(&service, &fetcher);
        let mut session = session();

        let err = generator
            .generate(
                &mut session,
                &GenerationRequest::new("a red cube", "dall-e-3").with_count(3),
            )
            .unwrap_err();

        assert_eq!(err, GenerationError::Authorization("verify org".to_string()));
        assert_eq!(service.bodies().len(), 1);
        assert!(session.history().is_empty());
    }

    #[test]
    fn failed_action_leaves_previous_history_alone() -> Result<()> {
        let fetcher = CountingFetcher::default();
        let ok_service = ScriptedService::default();
        let mut session = session();
        Generator::new(&ok_service, &fetcher).generate(
            &mut session,
            &GenerationRequest::new("a red cube", "gpt-image-1").with_count(2),
        )?;
        assert_eq!(session.history().len(), 2);

        let failing = ScriptedService::default().then(Err(GenerationError::Authentication(
            "revoked".to_string(),
        )));
        let err = Generator::new(&failing, &fetcher)
            .generate(&mut session, &GenerationRequest::new("a blue cube", "dall-e-3"))
            .unwrap_err();
        assert!(err.is_credential_error());
        assert_eq!(session.history().len(), 2);
        assert_eq!(session.history()[0].prompt, "a red cube");
        Ok(())
    }

    #[test]
    fn missing_credential_and_empty_prompt_make_no_calls() {
        let service = ScriptedService::default();
        let fetcher = CountingFetcher::default();
        let generator = Generator::new(&service, &fetcher);

        let mut anonymous = Session::new(None);
        let err = generator
            .generate(&mut anonymous, &GenerationRequest::new("a red cube", "dall-e-2"))
            .unwrap_err();
        assert_eq!(err, GenerationError::MissingCredential);

        let err = generator
            .generate(&mut session(), &GenerationRequest::new("   ", "dall-e-2"))
            .unwrap_err();
        assert!(matches!(err, GenerationError::Validation { ref field, .. } if field == "prompt"));

        let err = generator
            .generate(&mut session(), &GenerationRequest::new("a red cube", "midjourney"))
            .unwrap_err();
        assert!(matches!(err, GenerationError::Validation { ref field, .. } if field == "model"));
        assert!(service.bodies().is_empty());
    }

    #[test]
    fn link_results_are_fetched_and_labelled() -> Result<()> {
        let service = ScriptedService::default().then(Ok(vec![
            ServiceImageEntry::link("https://cdn.example/a.png").with_revised_prompt("a cube, red"),
            ServiceImageEntry::link("https://cdn.example/b.png"),
        ]));
        let fetcher = CountingFetcher::default();
        let generator = Generator::new(&service, &fetcher)
            .with_registry(ModelRegistry::from_capabilities(&[DALL_E_2]));
        let mut session = session();

        let outcome = generator.generate(
            &mut session,
            &GenerationRequest::new("a red cube", "dall-e-2").with_count(2),
        )?;

        assert_eq!(fetcher.urls.borrow().len(), 2);
        assert_eq!(outcome.results[0].revised_prompt, "a cube, red");
        assert_eq!(outcome.results[0].format, OutputFormat::Png);
        assert_eq!(
            session.result(2).map(|result| result.bytes.clone()),
            Some(png_bytes("https://cdn.example/b.png"))
        );
        Ok(())
    }

    #[test]
    fn journal_records_the_action() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("events.jsonl");
        let service = ScriptedService::default().then(Err(GenerationError::Transport(
            "connection reset".to_string(),
        )));
        let fetcher = CountingFetcher::default();
        let mut session = session();
        let generator = Generator::new(&service, &fetcher)
            .with_journal(EventWriter::new(&path, session.id()));

        generator.generate(
            &mut session,
            &GenerationRequest::new("a red cube", "gpt-image-1").with_count(2),
        )?;

        let types: Vec<String> = fs::read_to_string(&path)?
            .lines()
            .map(|line| serde_json::from_str::<Value>(line))
            .collect::<std::result::Result<Vec<_>, _>>()?
            .into_iter()
            .map(|event| event["type"].as_str().unwrap_or_default().to_string())
            .collect();
        assert_eq!(
            types,
            vec![
                "generation_started",
                "batch_degraded",
                "image_ready",
                "image_ready",
                "generation_finished"
            ]
        );
        Ok(())
    }

    #[test]
    fn failed_entry_between_successes_keeps_slot_numbers() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("events.jsonl");
        let service = ScriptedService::default().then(Ok(vec![
            inline("a"),
            ServiceImageEntry::empty(),
            inline("c"),
        ]));
        let fetcher = CountingFetcher::default();
        let mut session = session();
        let generator = Generator::new(&service, &fetcher)
            .with_journal(EventWriter::new(&path, session.id()));

        let outcome = generator.generate(
            &mut session,
            &GenerationRequest::new("a red cube", "gpt-image-1").with_count(3),
        )?;

        let indices: Vec<usize> = outcome.results.iter().map(|result| result.index).collect();
        assert_eq!(indices, vec![0, 2]);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].index, 1);
        assert!(session.result(2).is_none());
        assert_eq!(
            session.result(3).map(|result| result.bytes.clone()),
            Some(png_bytes("c"))
        );

        let slots: Vec<(String, u64)> = fs::read_to_string(&path)?
            .lines()
            .map(|line| serde_json::from_str::<Value>(line))
            .collect::<std::result::Result<Vec<_>, _>>()?
            .into_iter()
            .filter_map(|event| {
                let index = event["index"].as_u64()?;
                Some((event["type"].as_str().unwrap_or_default().to_string(), index))
            })
            .collect();
        assert_eq!(
            slots,
            vec![
                ("image_ready".to_string(), 0),
                ("image_ready".to_string(), 2),
                ("image_failed".to_string(), 1)
            ]
        );
        Ok(())
    }

    #[test]
    fn short_batch_reports_each_missing_slot() -> Result<()> {
        let service = ScriptedService::default().then(Ok(vec![inline("only")]));
        let fetcher = CountingFetcher::default();
        let generator = Generator::new(&service, &fetcher);
        let mut session = session();

        let outcome = generator.generate(
            &mut session,
            &GenerationRequest::new("a red cube", "gpt-image-1").with_count(3),
        )?;

        assert_eq!(service.bodies().len(), 1);
        assert_eq!(outcome.results.len(), 1);
        assert_eq!(outcome.results[0].index, 0);
        assert_eq!(outcome.results[0].bytes, png_bytes("only"));
        let indices: Vec<usize> = outcome.failures.iter().map(|failure| failure.index).collect();
        assert_eq!(indices, vec![1, 2]);
        assert!(outcome
            .failures
            .iter()
            .all(|failure| matches!(failure.error, GenerationError::UnexpectedResponseShape(_))));
        assert_eq!(session.history().len(), 1);
        Ok(())
    }

    #[test]
    fn empty_batch_fails_with_missing_entry_error() {
        let service = ScriptedService::default().then(Ok(Vec::new()));
        let fetcher = CountingFetcher::default();
        let generator = Generator::new(&service, &fetcher);
        let mut session = session();

        let err = generator
            .generate(
                &mut session,
                &GenerationRequest::new("a red cube", "dall-e-2").with_count(2),
            )
            .unwrap_err();

        assert!(matches!(err, GenerationError::UnexpectedResponseShape(_)));
        assert_eq!(service.bodies().len(), 1);
        assert!(session.history().is_empty());
    }

    #[test]
    fn count_over_the_image_ceiling_makes_no_calls() {
        let service = ScriptedService::default();
        let fetcher = CountingFetcher::default();
        let generator = Generator::new(&service, &fetcher);

        let err = generator
            .generate(
                &mut session(),
                &GenerationRequest::new("a red cube", "dall-e-3").with_count(4_000_000_000),
            )
            .unwrap_err();

        assert!(matches!(err, GenerationError::Validation { ref field, .. } if field == "count"));
        assert!(service.bodies().is_empty());
    }
}
