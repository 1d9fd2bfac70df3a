//! `actuator`: drive a simulated actuator through the control core.
mod cli;
mod error_fmt;
mod run;

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use clap::Parser;
use eyre::WrapErr;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use crate::cli::{Cli, Commands, FILE_GUARD, JSON_MODE};
use crate::run::{PositionRun, PowerRun, PresetMove, Rig};

fn main() {
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);

    if let Err(e) = color_eyre::install() {
        eprintln!("failed to install error handler: {e}");
    }

    let code = match real_main(cli) {
        Ok(()) => 0,
        Err(err) => {
            tracing::error!(error = %err, "command failed");
            if JSON_MODE.get().copied().unwrap_or(false) {
                eprintln!("{}", error_fmt::format_error_json(&err));
            } else {
                eprintln!("{}", error_fmt::humanize(&err));
            }
            error_fmt::exit_code_for_error(&err)
        }
    };
    std::process::exit(code);
}

fn real_main(cli: Cli) -> eyre::Result<()> {
    let text = std::fs::read_to_string(&cli.config)
        .wrap_err_with(|| format!("read config {}", cli.config.display()))?;
    let cfg = actuator_config::load_toml(&text)
        .wrap_err_with(|| format!("parse config {}", cli.config.display()))?;
    init_tracing(cli.json, cli.log_level.as_deref(), &cfg.logging);
    cfg.validate()?;
    tracing::debug!(config = %cli.config.display(), actuator = %cfg.actuator.name, "config loaded");

    let config_dir = cli.config.parent().unwrap_or_else(|| Path::new("."));
    let mut rig = Rig::assemble(&cfg, config_dir, cli.presets.as_deref())?;

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let flag = shutdown.clone();
        if let Err(e) = ctrlc::set_handler(move || flag.store(true, Ordering::Relaxed)) {
            tracing::warn!(error = %e, "failed to install Ctrl-C handler");
        }
    }

    rig.start();
    let (label, owner, outcome) = match &cli.cmd {
        Commands::Power {
            value,
            duration_ms,
            delay_ms,
            motion,
        } => {
            rig.motor.set_trace_pid(motion.trace_pid);
            let run = PowerRun {
                value: *value,
                duration: Duration::from_millis(*duration_ms),
                delay: Duration::from_millis(*delay_ms),
                owner: motion.owner.as_deref(),
                timeout: Duration::from_millis(motion.timeout_ms),
            };
            ("power", run.owner, run::run_power(&rig, &run, &shutdown))
        }
        Commands::Position {
            target,
            power_limit,
            no_hold,
            motion,
        } => {
            rig.motor.set_trace_pid(motion.trace_pid);
            let run = PositionRun {
                target: *target,
                power_limit: *power_limit,
                hold: !*no_hold,
                owner: motion.owner.as_deref(),
                timeout: Duration::from_millis(motion.timeout_ms),
            };
            ("position", run.owner, run::run_position(&rig, &run, &shutdown))
        }
        Commands::Calibrate { power, motion } => {
            let owner = motion.owner.as_deref();
            let res = run::run_calibrate(
                &rig,
                *power,
                owner,
                Duration::from_millis(motion.timeout_ms),
                &shutdown,
            );
            ("calibrate", owner, res)
        }
        Commands::Preset {
            index,
            up,
            down: _,
            power_limit,
            motion,
        } => {
            rig.motor.set_trace_pid(motion.trace_pid);
            let which = match (index, up) {
                (Some(i), _) => PresetMove::Index(*i),
                (None, true) => PresetMove::Up,
                (None, false) => PresetMove::Down,
            };
            let owner = motion.owner.as_deref();
            let res = run::run_preset(
                &rig,
                which,
                *power_limit,
                owner,
                Duration::from_millis(motion.timeout_ms),
                &shutdown,
            );
            ("preset", owner, res)
        }
        Commands::SelfCheck => ("self-check", None, Ok(run::self_check(&rig))),
    };
    rig.shutdown(owner);

    let report = outcome?;
    print_result(cli.json, label, &report, &format!("{label} complete"));
    Ok(())
}

fn print_result(json: bool, command: &str, report: &serde_json::Value, headline: &str) {
    if json {
        let mut line = report.clone();
        line["command"] = serde_json::json!(command);
        println!("{line}");
        return;
    }
    println!("{headline}");
    if let Some(obj) = report.as_object() {
        for (k, v) in obj {
            println!("  {k}: {v}");
        }
    }
}

/// Console logs to stderr, plus optional JSON-lines file logs from `[logging]`.
fn init_tracing(json: bool, cli_level: Option<&str>, logging: &actuator_config::Logging) {
    let level = cli_level
        .or(logging.level.as_deref())
        .unwrap_or("info");
    let filter = || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let console = if json {
        fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_filter(filter())
            .boxed()
    } else {
        fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .with_filter(filter())
            .boxed()
    };

    let file_layer = logging.file.as_ref().map(|path| {
        let path = Path::new(path);
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let name = path
            .file_name()
            .map_or_else(|| "actuator.log".into(), |n| n.to_string_lossy().into_owned());
        let appender = match logging.rotation.as_deref() {
            Some("daily") => tracing_appender::rolling::daily(dir, name),
            Some("hourly") => tracing_appender::rolling::hourly(dir, name),
            _ => tracing_appender::rolling::never(dir, name),
        };
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let _ = FILE_GUARD.set(guard);
        fmt::layer()
            .json()
            .with_ansi(false)
            .with_writer(writer)
            .with_filter(filter())
    });

    if let Err(e) = tracing_subscriber::registry()
        .with(console)
        .with(file_layer)
        .try_init()
    {
        eprintln!("tracing already initialized: {e}");
    }
}
