//! # PropTech Intel CLI
//!
//! Drives the scrape → filter → analyze pipeline from the command line and
//! prints JSON to stdout.
//!
//! ## Usage
//!
//! ```sh
//! OPENAI_API_KEY=sk-... proptech_intel intel -j ./reports
//! ```

use clap::Parser;
use proptech_intel::outputs::json;
use proptech_intel::utils::ensure_writable_dir;
use proptech_intel::{DefaultIntelService, Settings};
use serde::Serialize;
use std::error::Error;
use std::io::Read;
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod cli;

use cli::{Cli, Command};

fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    let args = Cli::parse();
    debug!(command = ?args.command, config = ?args.config, "Parsed CLI arguments");

    let mut settings = match &args.config {
        Some(path) => Settings::from_yaml_file(path)?,
        None => Settings::default(),
    };
    if let Some(key) = args.openai_api_key.clone() {
        settings.analyzer.api_key = Some(key);
    }
    if settings.analyzer.api_key.is_none() {
        debug!("No API credential configured; analysis calls will fail");
    }

    let service = DefaultIntelService::from_settings(&settings)?;

    match args.command {
        Command::Articles { max, all } => {
            let articles = if all {
                service.scrape_all(max).await
            } else {
                service.scrape_relevant_articles(max).await
            };
            info!(count = articles.len(), "Articles ready");
            print_json(&articles)?;
        }
        Command::Source { name, max } => match service.aggregator().scrape_source(&name, max).await {
            Some(articles) => print_json(&articles)?,
            None => {
                error!(source = %name, "No such source configured");
                return Err(format!("unknown source: {name}").into());
            }
        },
        Command::Sources => print_json(&settings.sources)?,
        Command::Analyze {
            label,
            content,
            no_cache,
        } => {
            let content = match content {
                Some(c) => c,
                None => {
                    let mut buf = String::new();
                    std::io::stdin().read_to_string(&mut buf)?;
                    buf
                }
            };
            if no_cache {
                println!("{}", service.analyze(&content, &label).await);
            } else {
                print_json(&service.analyze_cached(&content, &label).await)?;
            }
        }
        Command::TestConnection => {
            let status = service.test_connection().await;
            print_json(&status)?;
            if !status.is_success() {
                return Err("API connection test failed".into());
            }
        }
        Command::Intel {
            max,
            json_output_dir,
        } => {
            // Early check: fail before spending API calls on an unwritable dir.
            if let Some(dir) = &json_output_dir {
                if let Err(e) = ensure_writable_dir(dir).await {
                    error!(path = %dir, error = %e, "JSON output directory is not writable");
                    return Err(e);
                }
            }

            let report = service.intel_report(max).await;
            if report.backfilled > 0 {
                warn!(
                    backfilled = report.backfilled,
                    "Report includes articles that did not pass the relevance filter"
                );
            }
            print_json(&report)?;

            if let Some(dir) = &json_output_dir {
                if let Err(e) = json::write_report(&report, dir).await {
                    error!(error = %e, "Failed to write JSON report");
                }
            }
        }
    }

    let elapsed = start_time.elapsed();
    info!(?elapsed, secs = elapsed.as_secs(), "Execution complete");
    Ok(())
}
