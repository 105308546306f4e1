mod settings;

use std::fs;
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use imagine_contracts::chat::{parse_intent, SESSION_HELP_COMMANDS};
use imagine_contracts::events::{EventWriter, SessionEvent};
use imagine_contracts::models::{ModelRegistry, OutputFormat};
use imagine_contracts::receipts::{build_receipt, write_receipt, ReceiptInput};
use imagine_contracts::request::GenerationRequest;
use imagine_contracts::result::GenerationResult;
use imagine_contracts::session::Session;
use imagine_contracts::GenerationError;
use imagine_engine::{
    download_file_name, encode, EngineConfig, GenerationOutcome, Generator, OpenAiImageService,
};
use serde_json::{Map, Value};

use crate::settings::GenerationSettings;

type OpenAiGenerator = Generator<OpenAiImageService, OpenAiImageService>;

#[derive(Debug, Parser)]
#[command(name = "imagine", version, about = "Capability-aware image generation client")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Generate images from one prompt and write them to disk.
    Generate(GenerateArgs),
    /// Print the model capability table.
    Models,
    /// Interactive session with slash commands.
    Session(SessionArgs),
}

#[derive(Debug, Args)]
struct ConnectionArgs {
    /// Session-scoped key; overrides the secrets file and environment.
    #[arg(long)]
    api_key: Option<String>,
    #[arg(long)]
    secrets: Option<PathBuf>,
    #[arg(long)]
    api_base: Option<String>,
    /// Append session events to this JSONL file.
    #[arg(long)]
    events: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct GenerateArgs {
    #[arg(long)]
    prompt: String,
    #[arg(long, default_value = "gpt-image-1")]
    model: String,
    #[arg(long)]
    size: Option<String>,
    #[arg(long)]
    quality: Option<String>,
    #[arg(long, default_value_t = 1)]
    count: u32,
    #[arg(long)]
    style: Option<String>,
    #[arg(long)]
    art: Option<String>,
    #[arg(long)]
    negative: Option<String>,
    #[arg(long, default_value_t = -1, allow_hyphen_values = true)]
    seed: i64,
    #[arg(long)]
    background: Option<String>,
    #[arg(long)]
    compression: Option<String>,
    #[arg(long)]
    format: Option<String>,
    #[arg(long)]
    encoding: Option<String>,
    #[arg(long, default_value = ".")]
    out: PathBuf,
    /// Write a JSON receipt next to each image.
    #[arg(long)]
    receipts: bool,
    #[command(flatten)]
    connection: ConnectionArgs,
}

#[derive(Debug, Args)]
struct SessionArgs {
    #[arg(long, default_value = "gpt-image-1")]
    model: String,
    #[arg(long, default_value = ".")]
    out: PathBuf,
    #[arg(long)]
    receipts: bool,
    #[command(flatten)]
    connection: ConnectionArgs,
}

/// What `/save` needs from the action that produced the current history.
struct LastAction {
    request: GenerationRequest,
    payload: Map<String, Value>,
    warnings: Vec<String>,
}

impl LastAction {
    fn new(request: GenerationRequest, outcome: &GenerationOutcome) -> Self {
        Self {
            request,
            payload: outcome.payload.body().clone(),
            warnings: outcome.warnings.clone(),
        }
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("imagine error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Generate(args) => run_generate(args),
        Command::Models => {
            print_models(&ModelRegistry::default());
            Ok(0)
        }
        Command::Session(args) => {
            run_session(args)?;
            Ok(0)
        }
    }
}

fn engine_config(connection: &ConnectionArgs) -> EngineConfig {
    let mut config = EngineConfig::from_env();
    if let Some(api_base) = &connection.api_base {
        config = config.with_api_base(api_base.clone());
    }
    if let Some(secrets) = &connection.secrets {
        config = config.with_secrets_file(secrets);
    }
    config
}

fn open_session(connection: &ConnectionArgs) -> Result<(Session, OpenAiGenerator)> {
    let config = engine_config(connection);
    let mut session = Session::new(config.credential_resolver().resolve());
    if let Some(key) = connection.api_key.as_deref() {
        session.set_api_key(key);
    }

    let mut generator = Generator::openai(&config)?;
    if let Some(path) = &connection.events {
        generator = generator.with_journal(EventWriter::new(path, session.id()));
    }
    emit(
        &generator,
        SessionEvent::SessionStarted {
            credential_source: session
                .credential()
                .map(|credential| credential.source().as_str().to_string()),
        },
    );
    Ok((session, generator))
}

fn run_generate(args: GenerateArgs) -> Result<i32> {
    let (mut session, generator) = open_session(&args.connection)?;
    let mut settings = GenerationSettings::new(args.model.clone());
    let registry = generator.registry();
    let flags = [
        ("size", args.size.as_deref()),
        ("quality", args.quality.as_deref()),
        ("style", args.style.as_deref()),
        ("art_style", args.art.as_deref()),
        ("negative_prompt", args.negative.as_deref()),
        ("background", args.background.as_deref()),
        ("compression", args.compression.as_deref()),
        ("output_format", args.format.as_deref()),
        ("response_encoding", args.encoding.as_deref()),
    ];
    settings.apply("model", &args.model, registry)?;
    for (key, value) in flags {
        if let Some(value) = value {
            settings.apply(key, value, registry)?;
        }
    }
    settings.apply("count", &args.count.to_string(), registry)?;
    settings.seed = args.seed;

    let request = settings.request(&args.prompt);
    let outcome = match generator.generate(&mut session, &request) {
        Ok(outcome) => outcome,
        Err(err) => {
            report_error(&err);
            return Ok(1);
        }
    };
    print_outcome(&outcome);

    let last = LastAction::new(request, &outcome);
    let mut saved = 0usize;
    for result in &outcome.results {
        let number = result.number();
        match save_result(result, number, &args.out, None, args.receipts.then_some(&last)) {
            Ok(path) => {
                saved += 1;
                println!("Saved {}", path.display());
            }
            Err(err) => eprintln!("Image {number} could not be saved: {err:#}"),
        }
    }
    session.end();
    Ok(if saved > 0 { 0 } else { 1 })
}

fn run_session(args: SessionArgs) -> Result<()> {
    let (mut session, generator) = open_session(&args.connection)?;
    let mut settings = GenerationSettings::new(args.model.clone());
    settings.apply("model", &args.model, generator.registry())?;
    let mut last_action: Option<LastAction> = None;

    let stdin = io::stdin();
    let mut line = String::new();

    println!("Imagine session started. Type /help for commands.");
    match session.credential() {
        Some(credential) => println!(
            "Using API key {} ({})",
            credential.masked(),
            credential.source().as_str()
        ),
        None => println!("No API key found. Enter one with /key <api key>."),
    }

    loop {
        print!("> ");
        io::stdout().flush()?;

        line.clear();
        let read = match stdin.read_line(&mut line) {
            Ok(read) => read,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        };
        if read == 0 {
            break;
        }

        let input = line.trim_end_matches(['\n', '\r']);
        let intent = parse_intent(input);
        match intent.action.as_str() {
            "noop" => {}
            "help" => {
                println!("Commands: {}", SESSION_HELP_COMMANDS.join(" "));
                println!("Anything else is used as a prompt.");
            }
            "update_setting" => {
                for (key, value) in &intent.settings_update {
                    let raw = value.as_str().unwrap_or_default();
                    match settings.apply(key, raw, generator.registry()) {
                        Ok(message) => println!("{message}"),
                        Err(err) => println!("{err}"),
                    }
                }
            }
            "set_api_key" => {
                let key = value_as_non_empty_string(intent.command_args.get("key"));
                match key {
                    Some(key) if session.set_api_key(&key) => {
                        let masked = session
                            .credential()
                            .map(|credential| credential.masked())
                            .unwrap_or_default();
                        println!("API key set for this session ({masked})");
                    }
                    _ => println!("/key requires a value"),
                }
            }
            "clear_api_key" => {
                session.clear_api_key();
                println!("API key cleared. Enter a new one with /key <api key>.");
            }
            "list_models" => print_models(generator.registry()),
            "show_settings" => {
                for row in settings.describe() {
                    println!("  {row}");
                }
            }
            "show_history" => print_history(session.history()),
            "clear_history" => {
                session.clear_history();
                last_action = None;
                emit(&generator, SessionEvent::HistoryCleared);
                println!("History cleared.");
            }
            "save" => {
                let number = intent
                    .command_args
                    .get("number")
                    .and_then(Value::as_u64)
                    .and_then(|value| usize::try_from(value).ok());
                let Some(number) = number else {
                    println!("/save requires an image number");
                    continue;
                };
                let Some(result) = session.result(number) else {
                    println!("No image {number} in history");
                    continue;
                };
                let requested = value_as_non_empty_string(intent.command_args.get("path"));
                let receipt = if args.receipts {
                    last_action.as_ref()
                } else {
                    None
                };
                match save_result(result, number, &args.out, requested.as_deref(), receipt) {
                    Ok(path) => println!("Saved {}", path.display()),
                    Err(err) => println!("Save failed: {err:#}"),
                }
            }
            "generate" => {
                let Some(prompt) = intent.prompt.as_deref() else {
                    continue;
                };
                let request = settings.request(prompt);
                match generator.generate(&mut session, &request) {
                    Ok(outcome) => {
                        print_outcome(&outcome);
                        last_action = Some(LastAction::new(request, &outcome));
                    }
                    Err(err) => report_error(&err),
                }
            }
            "quit" => break,
            _ => {
                let command = value_as_non_empty_string(intent.command_args.get("command"))
                    .unwrap_or_default();
                println!("Unknown command: /{command}. Type /help for commands.");
            }
        }
    }

    session.end();
    Ok(())
}

/// Writes one history entry, re-encoded for download.
///
/// Without `requested` the file lands in `out_dir` as `image_<n>.<ext>`. A
/// requested file path picks the format from its extension (unknown ones
/// become PNG) and gets the extension of the format actually written.
fn save_result(
    result: &GenerationResult,
    number: usize,
    out_dir: &Path,
    requested: Option<&str>,
    receipt: Option<&LastAction>,
) -> Result<PathBuf> {
    let requested = requested.map(PathBuf::from);
    let requested_ext = requested
        .as_deref()
        .filter(|path| !path.is_dir())
        .and_then(Path::extension)
        .and_then(|ext| ext.to_str())
        .map(str::to_string);
    let target_format = requested_ext
        .as_deref()
        .map(OutputFormat::resolve)
        .unwrap_or(result.format);
    let encoded = encode(&result.bytes, target_format)?;

    let image_path = match requested {
        Some(path) if path.is_dir() => path.join(download_file_name(number, encoded.format)),
        Some(path)
            if requested_ext.as_deref().and_then(OutputFormat::parse) != Some(encoded.format) =>
        {
            path.with_extension(encoded.format.extension())
        }
        Some(path) => path,
        None => out_dir.join(download_file_name(number, encoded.format)),
    };
    if let Some(parent) = image_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
    }
    fs::write(&image_path, &encoded.bytes)
        .with_context(|| format!("failed to write {}", image_path.display()))?;

    if let Some(last) = receipt {
        let receipt_path = image_path.with_extension("json");
        let payload = build_receipt(&ReceiptInput {
            request: &last.request,
            payload: &last.payload,
            result,
            warnings: &last.warnings,
            image_path: &image_path,
            receipt_path: &receipt_path,
            mime_type: encoded.mime_type,
        });
        write_receipt(&receipt_path, &payload)
            .with_context(|| format!("failed to write {}", receipt_path.display()))?;
    }
    Ok(image_path)
}

fn emit(generator: &OpenAiGenerator, event: SessionEvent) {
    if let Some(journal) = generator.journal() {
        if let Err(err) = journal.emit(&event) {
            log::warn!("failed to write {}: {err:#}", journal.path().display());
        }
    }
}

fn print_outcome(outcome: &GenerationOutcome) {
    for warning in &outcome.warnings {
        println!("Note: {warning}");
    }
    print_history(&outcome.results);
    for failure in &outcome.failures {
        println!("Image {} failed: {}", failure.index + 1, failure.error);
    }
    if !outcome.failures.is_empty() {
        println!(
            "{} of {} images generated.",
            outcome.results.len(),
            outcome.results.len() + outcome.failures.len()
        );
    }
}

fn print_history(results: &[GenerationResult]) {
    if results.is_empty() {
        println!("No images yet.");
        return;
    }
    for result in results {
        println!(
            "[{}] {} {} via {} ({} bytes)",
            result.number(),
            result.model,
            result.format.wire_value(),
            result.source.label(),
            result.byte_len()
        );
        if result.prompt_was_revised() {
            println!("    revised prompt: {}", result.revised_prompt);
        }
    }
}

fn print_models(registry: &ModelRegistry) {
    for capability in registry.list() {
        let qualities = if capability.qualities.is_empty() {
            "-".to_string()
        } else {
            capability.qualities.join("/")
        };
        let mut extras = Vec::new();
        if capability.supports_style {
            extras.push("style".to_string());
        }
        if !capability.output_formats.is_empty() {
            extras.push(format!(
                "format={}",
                capability
                    .output_formats
                    .iter()
                    .map(|format| format.wire_value())
                    .collect::<Vec<_>>()
                    .join("/")
            ));
        }
        if capability.supports_background {
            extras.push("background".to_string());
        }
        if capability.supports_compression {
            extras.push("compression".to_string());
        }
        println!(
            "{:<12} sizes={} quality={} max_batch={} max_images={} encoding={}{}",
            capability.name,
            capability.sizes.join(","),
            qualities,
            capability.max_batch,
            capability.max_images,
            capability.default_encoding.wire_value(),
            if extras.is_empty() {
                String::new()
            } else {
                format!(" {}", extras.join(" "))
            }
        );
    }
}

fn report_error(err: &GenerationError) {
    eprintln!("Generation failed: {err}");
    if let Some(hint) = err.guidance() {
        eprintln!("Hint: {hint}");
    }
}

fn value_as_non_empty_string(value: Option<&Value>) -> Option<String> {
    let raw = value
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or_default();
    if raw.is_empty() {
        None
    } else {
        Some(raw.to_string())
    }
}
