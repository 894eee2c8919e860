#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]

mod app;
mod cli;
mod error_fmt;

use crate::app::RunOpts;
use crate::cli::{Cli, Commands, FILE_GUARD, JSON_MODE, SettingsCmd};
use crate::error_fmt::{exit_code_for_error, format_error_json, humanize};
use clap::Parser;
use eyre::{Result, WrapErr};
use gbw_config::{Config, Logging};
use gbw_core::GbwError;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing_subscriber::{EnvFilter, Layer, fmt, prelude::*};

fn main() {
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);

    if let Err(e) = real_main(cli) {
        if JSON_MODE.get().copied().unwrap_or(false) {
            eprintln!("{}", format_error_json(&e));
        } else {
            eprintln!("{}", humanize(&e));
        }
        std::process::exit(exit_code_for_error(&e));
    }
}

fn real_main(cli: Cli) -> Result<()> {
    color_eyre::install()?;

    // Tracing comes up before validation so config errors are logged too.
    let cfg = app::load_config(cli.config.as_deref());
    let logging = cfg.as_ref().map(|c| &c.logging).ok();
    init_tracing(cli.json, cli.log_level.as_deref(), logging)?;
    let cfg = cfg?;
    tracing::debug!(config = ?cli.config, "configuration loaded");

    let store_path = cli
        .settings
        .clone()
        .unwrap_or_else(|| PathBuf::from(&cfg.store.path));

    match cli.cmd {
        Commands::Run {
            sim,
            sim_script,
            shots,
            max_runtime_ms,
            trigger,
            display,
        } => {
            let opts = RunOpts {
                sim,
                sim_script,
                shots,
                max_runtime_ms,
                trigger,
                display,
            };
            cmd_run(&cfg, &store_path, &opts, cli.json)
        }
        Commands::SelfCheck { sim } => {
            let report = app::self_check(&cfg, &store_path, sim)?;
            if cli.json {
                println!(
                    "{}",
                    json!({
                        "ok": true,
                        "backend": report.backend,
                        "settings_keys": report.settings_keys,
                        "scale_factor": report.scale_factor,
                        "weight_g": report.weight_g,
                    })
                );
            } else {
                println!(
                    "ok: backend={} settings_keys={} scale_factor={} weight={:.1}g",
                    report.backend, report.settings_keys, report.scale_factor, report.weight_g
                );
            }
            Ok(())
        }
        Commands::Settings { action } => cmd_settings(&cfg, &store_path, action),
        Commands::Calibrate { csv, save } => {
            let cal = app::calibrate(&cfg, &store_path, &csv, save)?;
            if cli.json {
                println!(
                    "{}",
                    json!({
                        "counts_per_gram": cal.counts_per_gram,
                        "zero_counts": cal.zero_counts,
                        "saved": save,
                    })
                );
            } else {
                println!(
                    "counts_per_gram={} zero_counts={}{}",
                    cal.counts_per_gram,
                    cal.zero_counts,
                    if save { " (saved)" } else { "" }
                );
            }
            Ok(())
        }
    }
}

fn cmd_run(cfg: &Config, store_path: &Path, opts: &RunOpts, json_out: bool) -> Result<()> {
    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let flag = shutdown.clone();
        ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst))
            .wrap_err("install Ctrl-C handler")?;
    }

    let summary = app::run(cfg, store_path, opts, shutdown)?;
    if json_out {
        println!(
            "{}",
            json!({
                "doses_completed": summary.doses_completed,
                "shot_count": summary.shot_count,
                "final_state": summary.final_state,
                "fault": summary.fault.map(|r| r.as_str()),
                "ticks": summary.ticks,
                "runtime_ms": summary.runtime_ms,
            })
        );
    } else {
        println!(
            "doses={} shots={} state={} ticks={} runtime_ms={}",
            summary.doses_completed,
            summary.shot_count,
            summary.final_state,
            summary.ticks,
            summary.runtime_ms
        );
    }
    if let Some(reason) = summary.fault {
        return Err(eyre::Report::new(GbwError::Fault(reason)));
    }
    Ok(())
}

fn cmd_settings(cfg: &Config, store_path: &Path, action: SettingsCmd) -> Result<()> {
    match action {
        SettingsCmd::Show => println!("{}", app::settings_show(cfg, store_path)?),
        SettingsCmd::Set { body, content_type } => {
            let out = app::settings_set(cfg, store_path, &content_type, &body)?;
            println!("{}", out.view);
            if out.restart_required {
                eprintln!("restart required to apply WiFi credentials");
            }
        }
        SettingsCmd::Reset => println!("{}", app::settings_reset(cfg, store_path)?),
    }
    Ok(())
}

fn init_tracing(json: bool, cli_level: Option<&str>, logging: Option<&Logging>) -> Result<()> {
    let level = cli_level
        .or_else(|| logging.and_then(|l| l.level.as_deref()))
        .unwrap_or("info");
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .wrap_err_with(|| format!("invalid log level {level:?}"))?;

    let console = if json {
        fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .boxed()
    };

    let file = match logging.and_then(|l| l.file.as_deref()) {
        Some(path) => {
            let path = Path::new(path);
            let dir = path
                .parent()
                .filter(|d| !d.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let name = path
                .file_name()
                .ok_or_else(|| eyre::eyre!("logging.file has no file name: {}", path.display()))?;
            let appender = match logging.and_then(|l| l.rotation.as_deref()) {
                Some("daily") => tracing_appender::rolling::daily(dir, name),
                Some("hourly") => tracing_appender::rolling::hourly(dir, name),
                _ => tracing_appender::rolling::never(dir, name),
            };
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let _ = FILE_GUARD.set(guard);
            Some(
                fmt::layer()
                    .json()
                    .with_ansi(false)
                    .with_writer(writer)
                    .boxed(),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .try_init()
        .wrap_err("install tracing subscriber")?;
    Ok(())
}
