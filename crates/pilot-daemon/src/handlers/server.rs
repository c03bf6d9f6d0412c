use pilot_core::LogLevel;
use pilot_rpc::commands::{CommandResponse, LIST_SEPARATOR, Metadata, keys};
use tracing::{error, warn};

use super::HandlerContext;

/// Integer `LogLevel` metadata; absent or invalid values mean INFO.
fn requested_level(metadata: &Metadata) -> LogLevel {
    let Some(raw) = metadata.get(keys::LOG_LEVEL) else {
        return LogLevel::Info;
    };
    match raw.trim().parse::<i32>().ok().and_then(LogLevel::from_verbosity) {
        Some(level) => level,
        None => {
            warn!("Invalid log level {raw:?} requested, using INFO");
            LogLevel::Info
        }
    }
}

pub async fn handle_start_server(
    ctx: &mut HandlerContext<'_>,
    metadata: &Metadata,
) -> CommandResponse {
    let Some(name) = metadata.get(keys::CONFIG_FILE_NAME) else {
        return CommandResponse::failure("Config file not specified.");
    };

    let level = requested_level(metadata);
    match ctx.launcher.start_server(ctx.notifier, name, level).await {
        Ok(started) => CommandResponse::success()
            .with(keys::CONFIG_FILE_NAME, started.name)
            .with(keys::SERVERS, started.servers),
        Err(e) => {
            error!("Failed to start server for {name}: {e}");
            CommandResponse::failure("Failed to start server process.")
        }
    }
}

pub async fn handle_stop_server(
    ctx: &mut HandlerContext<'_>,
    metadata: &Metadata,
) -> CommandResponse {
    let Some(name) = metadata.get(keys::CONFIG_FILE_NAME) else {
        return CommandResponse::failure("Config file not specified.");
    };

    let outcome = ctx.launcher.stop_server(ctx.notifier, name).await;
    if !outcome.is_clean() {
        warn!("Server for {name} had to be killed");
    }
    CommandResponse::success().with(keys::CONFIG_FILE_NAME, name.as_str())
}

pub fn handle_get_running_servers(ctx: &HandlerContext<'_>) -> CommandResponse {
    let supervisor = ctx.launcher.supervisor();
    CommandResponse::success()
        .with(keys::RUNNING_SERVERS, supervisor.keys().join(LIST_SEPARATOR))
        .with(keys::READY_SERVERS, supervisor.ready_keys().join(LIST_SEPARATOR))
        .with(keys::SEPARATOR, LIST_SEPARATOR)
}
