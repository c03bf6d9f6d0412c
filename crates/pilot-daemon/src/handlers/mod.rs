//! Remote command handlers.
//!
//! Commands are grouped by category:
//! - Config files (`GetConfigFiles`, `AddConfigFile`)
//! - Servers (`StartServer`, `StopServer`, `GetRunningServers`)
//! - Logs (`LogSubscribe`, `LogUnsubscribe`)

mod config;
mod log;
mod server;

use pilot_rpc::commands::{CommandName, CommandResponse, Metadata};
use tracing::{info, warn};

use crate::launcher::Launcher;
use crate::notifier::Notifier;
use crate::session::ClientId;

pub struct HandlerContext<'a> {
    pub launcher: &'a mut Launcher,
    pub notifier: &'a mut Notifier,
    pub client_id: ClientId,
}

/// Run one command. Unknown names produce no response.
pub async fn dispatch(
    ctx: &mut HandlerContext<'_>,
    name: &str,
    metadata: &Metadata,
) -> Option<CommandResponse> {
    let Some(command) = CommandName::parse(name) else {
        warn!("Ignoring unknown command \"{name}\" from {}", ctx.client_id);
        return None;
    };

    info!(client = %ctx.client_id, "Command \"{command}\" received.");

    let response = match command {
        CommandName::GetConfigFiles => config::handle_get_config_files(ctx),
        CommandName::AddConfigFile => config::handle_add_config_file(ctx, metadata),
        CommandName::StartServer => server::handle_start_server(ctx, metadata).await,
        CommandName::StopServer => server::handle_stop_server(ctx, metadata).await,
        CommandName::GetRunningServers => server::handle_get_running_servers(ctx),
        CommandName::LogSubscribe => log::handle_log_subscribe(ctx),
        CommandName::LogUnsubscribe => log::handle_log_unsubscribe(ctx),
    };
    Some(response)
}
