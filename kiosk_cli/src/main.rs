mod assemble;
mod cli;
mod error_fmt;

use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use clap::Parser;
use eyre::{Result, WrapErr};
use kiosk_config::{Config, Logging};
use kiosk_core::runner::{self, RunParams};

use crate::cli::{Cli, Commands, FILE_GUARD, JSON_MODE};
use crate::error_fmt::{exit_code_for_error, format_error_json, humanize};

fn main() {
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);

    if let Err(err) = real_main(cli) {
        if JSON_MODE.get().copied().unwrap_or(false) {
            eprintln!("{}", format_error_json(&err));
        } else {
            eprintln!("{}", humanize(&err));
        }
        tracing::debug!(error = ?err, "exiting with error");
        std::process::exit(exit_code_for_error(&err));
    }
}

fn real_main(cli: Cli) -> Result<()> {
    if !cli.json {
        color_eyre::install()?;
    }

    let cfg = load_config(&cli.config)?;
    init_tracing(cli.json, &cli.log_level, &cfg.logging);
    tracing::debug!(config = %cli.config.display(), instances = cfg.instance_count(), "config loaded");

    match cli.cmd {
        Commands::Health => {
            if cli.json {
                println!("{}", serde_json::json!({ "status": "ok" }));
            } else {
                println!("ok");
            }
            Ok(())
        }
        Commands::SelfCheck => {
            let denoms =
                assemble::resolve_denominations(&cfg, cli.denominations.as_deref())?;
            let asm = assemble::assemble(&cfg, &denoms)?;
            let instances = asm.kiosk.instances();
            if cli.json {
                let rows: Vec<_> = instances
                    .iter()
                    .map(|(family, name)| serde_json::json!({ "family": family, "name": name }))
                    .collect();
                println!(
                    "{}",
                    serde_json::json!({ "status": "ok", "instances": rows, "denominations": denoms })
                );
            } else {
                for (family, name) in &instances {
                    println!("{family:<16} {name}");
                }
                println!("self-check ok ({} instances)", instances.len());
            }
            Ok(())
        }
        Commands::Run {
            tick_ms,
            exit_after_eof_ms,
        } => {
            let denoms =
                assemble::resolve_denominations(&cfg, cli.denominations.as_deref())?;
            let mut asm = assemble::assemble(&cfg, &denoms)?;

            let shutdown = Arc::new(AtomicBool::new(false));
            {
                let flag = Arc::clone(&shutdown);
                ctrlc::set_handler(move || flag.store(true, Ordering::Relaxed))
                    .wrap_err("install Ctrl-C handler")?;
            }

            let params = RunParams {
                tick: Duration::from_millis(tick_ms.unwrap_or(cfg.runtime.tick_ms).max(1)),
                exit_after_eof: exit_after_eof_ms.map(Duration::from_millis),
            };
            tracing::info!(tick_ms = params.tick.as_millis() as u64, "kiosk running");
            let summary = runner::run(
                &mut asm.kiosk,
                BufReader::new(std::io::stdin()),
                std::io::stdout().lock(),
                &shutdown,
                params,
            )?;
            tracing::info!(
                lines_in = summary.lines_in,
                messages_out = summary.messages_out,
                "kiosk stopped"
            );
            Ok(())
        }
    }
}

fn load_config(path: &Path) -> Result<Config> {
    let text = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("read config {}", path.display()))?;
    let cfg = kiosk_config::load_toml(&text)
        .map_err(|e| eyre::eyre!("{e}"))
        .wrap_err("invalid configuration")?;
    cfg.validate().wrap_err("invalid configuration")?;
    Ok(cfg)
}

/// Console logs go to stderr; stdout carries host messages only.
fn init_tracing(json: bool, level: &str, logging: &Logging) {
    use tracing_subscriber::{EnvFilter, Layer, Registry, fmt, prelude::*};

    let console_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();
    if json {
        layers.push(
            fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_filter(console_filter)
                .boxed(),
        );
    } else {
        layers.push(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_filter(console_filter)
                .boxed(),
        );
    }

    if let Some(file) = &logging.file {
        let path = Path::new(file);
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let name = path
            .file_name()
            .map_or_else(|| "kiosk.log".into(), ToOwned::to_owned);
        let appender = match logging.rotation.as_deref() {
            Some("daily") => tracing_appender::rolling::daily(dir, name),
            Some("hourly") => tracing_appender::rolling::hourly(dir, name),
            _ => tracing_appender::rolling::never(dir, name),
        };
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let _ = FILE_GUARD.set(guard);
        let file_filter = EnvFilter::new(logging.level.as_deref().unwrap_or("info"));
        layers.push(
            fmt::layer()
                .json()
                .with_ansi(false)
                .with_writer(writer)
                .with_filter(file_filter)
                .boxed(),
        );
    }

    let _ = tracing_subscriber::registry().with(layers).try_init();
}
