//! Pilot daemon entry point.
//!
//! Starts the remote control server that supervises server processes on
//! behalf of connected clients.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use pilot_core::LogLevel;
use pilot_core::config::{Directories, Settings};
use pilot_daemon::logging::filter_directive;
use pilot_daemon::{DaemonConfig, FlagOverrides, LogControl, forward_layer};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*, reload};

/// Pilot daemon - server launcher with remote control
#[derive(Parser, Debug)]
#[command(name = "pilot-daemon")]
#[command(version, about, long_about = None)]
struct Args {
    /// Settings file (defaults to `~/.config/pilot/config.json`)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Directory holding device-set configuration files
    #[arg(long, value_name = "DIR")]
    device_set_dir: Option<PathBuf>,

    /// Server executable to launch
    #[arg(long, value_name = "PATH")]
    server_executable: Option<PathBuf>,

    /// Remote control listen address
    #[arg(long, value_name = "ADDR")]
    listen: Option<String>,

    /// Allow clients to upload config files
    #[arg(long)]
    allow_write: bool,

    /// Allow uploads to replace existing config files
    #[arg(long)]
    allow_overwrite: bool,

    /// Start the local server for this config file right away
    #[arg(long, value_name = "FILE")]
    connect: Option<String>,
}

/// Set up logging: stderr, a timestamped file in debug builds, and the layer
/// that forwards launcher events to subscribed clients.
fn setup_logging() -> LogControl {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(LogLevel::default())));
    let (filter, reload_handle) = reload::Layer::new(filter);

    let (forward, control) = forward_layer();
    let control = control.with_filter_reload(move |level| {
        reload_handle
            .reload(EnvFilter::new(filter_directive(level)))
            .map_err(|e| e.to_string())
    });

    if cfg!(debug_assertions) {
        let temp_dir = std::env::temp_dir();
        let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let log_filename = format!("pilot-daemon-{timestamp}.log");
        let log_path = temp_dir.join(&log_filename);

        #[cfg(unix)]
        {
            let symlink_path = temp_dir.join("pilot-daemon.log");
            let _ = std::fs::remove_file(&symlink_path);
            let _ = std::os::unix::fs::symlink(&log_path, &symlink_path);
        }

        let file_appender = tracing_appender::rolling::never(&temp_dir, &log_filename);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        std::mem::forget(guard);

        let stderr_layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true);

        let file_layer = fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(true)
            .with_line_number(true);

        tracing_subscriber::registry()
            .with(filter)
            .with(file_layer)
            .with(stderr_layer)
            .with(forward)
            .init();

        eprintln!("Logging to: {} (and stderr)", log_path.display());
    } else {
        let stderr_layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true);

        tracing_subscriber::registry()
            .with(filter)
            .with(stderr_layer)
            .with(forward)
            .init();
    }

    control
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log = setup_logging();

    info!("Starting pilot daemon...");

    let dirs = Directories::new()?;
    dirs.ensure_exists()
        .context("Failed to create pilot directories")?;

    let settings_path = args.config.unwrap_or_else(|| dirs.config_file.clone());
    let mut settings = Settings::load(&settings_path)
        .with_context(|| format!("Failed to load settings from {}", settings_path.display()))?;

    let overrides = FlagOverrides {
        allow_write: args.allow_write,
        allow_overwrite: args.allow_overwrite,
    };
    overrides.apply(&mut settings);
    if let Some(executable) = args.server_executable {
        settings.server_executable = executable;
    }
    if let Some(listen) = args.listen {
        settings.listen_address = listen;
    }
    if let Some(dir) = args.device_set_dir {
        settings.device_set_dir = Some(dir);
    }

    if std::env::var_os("RUST_LOG").is_none() {
        log.apply_level(settings.log_level);
    }

    let device_set_dir = settings.device_set_dir_or(&dirs.device_sets);
    let config = DaemonConfig {
        settings,
        settings_path: Some(settings_path),
        overrides,
        device_set_dir,
        connect: args.connect,
    };

    pilot_daemon::run(config, log)
        .await
        .context("Daemon failed")?;

    info!("Pilot daemon stopped");
    Ok(())
}
