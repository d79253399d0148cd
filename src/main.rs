use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Parser;

use omniprobe::config::{default_config, load_config, load_config_from, AppConfig};
use omniprobe::errors::ProbeResult;
use omniprobe::perception::filter::{filter_by_text, log_element_summary};
use omniprobe::perception::image_input::image_ref_from_arg;
use omniprobe::{PollOutcome, RemoteJobClient};

/// Send one screenshot to the UI-element parsing service and report what it found.
#[derive(Debug, Parser)]
#[command(name = "omniprobe", version)]
struct Cli {
    /// Screenshot to parse: a file path, or an http(s) URL the service can fetch.
    image: String,

    /// Only report elements whose content or source mentions this text.
    target: Option<String>,

    /// Config file (defaults to omniprobe.toml next to the binary or in the working directory).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override `[omniparser].base_url`.
    #[arg(long)]
    base_url: Option<String>,

    /// Override `[omniparser].max_attempts`.
    #[arg(long)]
    max_attempts: Option<u32>,
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file if present (ignore error if not found)
    let _ = dotenvy::dotenv();
    omniprobe::init_tracing();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            tracing::error!(error = %e, "omniprobe failed");
            ExitCode::FAILURE
        }
    }
}

fn resolve_config(cli: &Cli) -> ProbeResult<AppConfig> {
    let mut config = match &cli.config {
        Some(path) => load_config_from(path)?,
        None => match load_config() {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::warn!(error = %e, "no usable config file, using defaults");
                default_config()?
            }
        },
    };
    if let Some(url) = &cli.base_url {
        config.omniparser.base_url = url.clone();
    }
    if let Some(max_attempts) = cli.max_attempts {
        config.omniparser.max_attempts = max_attempts;
    }
    Ok(config)
}

async fn run(cli: Cli) -> ProbeResult<bool> {
    let config = resolve_config(&cli)?;
    let client = RemoteJobClient::new(&config.omniparser)?;
    let request = client.request_for(image_ref_from_arg(&cli.image)?);

    let stop_flag = Arc::new(AtomicBool::new(false));
    {
        let stop_flag = stop_flag.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("interrupt received, stopping at next attempt");
                stop_flag.store(true, Ordering::Relaxed);
            }
        });
    }

    let elements = match client.run_job_with_stop(&request, stop_flag).await {
        PollOutcome::Succeeded(elements) => elements,
        PollOutcome::Failed(failure) => {
            eprintln!("job failed: {failure}");
            return Ok(false);
        }
        PollOutcome::TimedOut {
            attempts,
            last_error,
        } => {
            eprintln!(
                "no result after {attempts} attempts (last error: {})",
                last_error.as_deref().unwrap_or("none")
            );
            return Ok(false);
        }
        PollOutcome::Cancelled { attempts } => {
            eprintln!("cancelled after {attempts} attempts");
            return Ok(false);
        }
        PollOutcome::Pending => return Ok(false),
    };

    log_element_summary(&elements);
    if elements.is_empty() {
        tracing::warn!("service detected no elements");
        return Ok(false);
    }

    let Some(target) = cli.target else {
        println!("{}", serde_json::to_string_pretty(&elements)?);
        return Ok(true);
    };

    let matched = filter_by_text(&elements, &target);
    if matched.is_empty() {
        eprintln!("no element mentions {target:?}");
        return Ok(false);
    }
    println!("{}", serde_json::to_string_pretty(&matched)?);
    Ok(true)
}
