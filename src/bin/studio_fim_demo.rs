//! `studio_fim_demo "<prefix>" "<suffix>"`: one Codestral FIM request, raw JSON on stdout.

use std::{env, io::Write, process::ExitCode};

use anyhow::{Context, Result};
use ustudio_llm::config::{Config, Preset};
use ustudio_llm::errors::LlmError;
use ustudio_llm::fim::{self, FimRequest};
use ustudio_llm::provider_adapters::codestral;
use ustudio_llm::transport::HttpTransport;

const EXIT_USAGE: u8 = 64;
const EXIT_MISSING_KEY: u8 = 1;
const EXIT_PRIVACY: u8 = 2;
const EXIT_TRANSPORT: u8 = 3;
const EXIT_HTTP_STATUS: u8 = 4;
const EXIT_MALFORMED: u8 = 5;

fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    ustudio_llm::telemetry::init_tracing();

    let args: Vec<String> = env::args().skip(1).collect();
    if args.len() != 2 || args.iter().any(|a| a == "-h" || a == "--help") {
        print_usage();
        return ExitCode::from(EXIT_USAGE);
    }

    match run(&args[0], &args[1]) {
        Ok(code) => code,
        Err(err) => {
            tracing::error!("studio_fim_demo: {err:?}");
            ExitCode::from(EXIT_TRANSPORT)
        }
    }
}

fn run(prefix: &str, suffix: &str) -> Result<ExitCode> {
    let config = Config::preset_from_vars(Preset::Codestral, cli_lookup);
    let req = FimRequest::new(prefix, suffix, config);
    let transport = HttpTransport::new().context("E-UMI-LLM-0190: http client init failed")?;
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("E-UMI-LLM-0191: failed to start runtime")?;

    let body = match runtime.block_on(fim::request_raw(&transport, &req)) {
        Ok(body) => body,
        Err(err) => {
            tracing::error!(code = err.kind().code(), "{err}");
            return Ok(ExitCode::from(exit_code_for(&err)));
        }
    };

    let mut stdout = std::io::stdout().lock();
    stdout.write_all(&body).context("E-UMI-LLM-0192: write stdout")?;
    stdout.write_all(b"\n").context("E-UMI-LLM-0192: write stdout")?;

    if let Err(err) = codestral::parse_response(&body) {
        tracing::error!(code = err.kind().code(), "{err}");
        return Ok(ExitCode::from(EXIT_MALFORMED));
    }
    Ok(ExitCode::SUCCESS)
}

/// Process environment, with privacy defaulting to `open` for this explicit invocation.
fn cli_lookup(key: &str) -> Option<String> {
    let value = env::var(key).ok();
    if key == "PRIVACY_MODE" && value.is_none() && env::var("UMI_PRIVACY_MODE").is_err() {
        return Some("open".into());
    }
    value
}

fn exit_code_for(err: &LlmError) -> u8 {
    match err {
        LlmError::ConfigMissing(_) => EXIT_MISSING_KEY,
        LlmError::PrivacyDenied(_) => EXIT_PRIVACY,
        LlmError::HttpStatus { .. } => EXIT_HTTP_STATUS,
        LlmError::ParseTransient(_) | LlmError::ParseFatal { .. } => EXIT_MALFORMED,
        LlmError::Connect(_) | LlmError::Timeout { .. } | LlmError::Cancelled | LlmError::Unknown(_) => {
            EXIT_TRANSPORT
        }
    }
}

fn print_usage() {
    eprintln!(
        "Usage: studio_fim_demo \"<prefix>\" \"<suffix>\"\n\n\
         Environment:\n  \
         MISTRAL_API_KEY        bearer token (required)\n  \
         UENG_MISTRAL_BASE_URL  endpoint base (default https://codestral.mistral.ai)\n  \
         UENG_MISTRAL_MODEL     model id (default codestral-latest)\n  \
         PRIVACY_MODE           local-only | open (default open for this tool)"
    );
}
