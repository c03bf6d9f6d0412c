use pilot_core::Error;
use pilot_rpc::commands::{CommandResponse, LIST_SEPARATOR, Metadata, keys};
use tracing::{error, info, warn};

use super::HandlerContext;

pub fn handle_get_config_files(ctx: &HandlerContext<'_>) -> CommandResponse {
    match ctx.launcher.store().list() {
        Ok(names) => CommandResponse::success()
            .with(keys::CONFIG_FILES, names.join(LIST_SEPARATOR))
            .with(keys::SEPARATOR, LIST_SEPARATOR),
        Err(e) => {
            error!(
                "Unable to open device set directory {}: {e}",
                ctx.launcher.store().dir().display()
            );
            CommandResponse::failure("Unable to open device set directory.")
        }
    }
}

pub fn handle_add_config_file(ctx: &HandlerContext<'_>, metadata: &Metadata) -> CommandResponse {
    if !ctx.launcher.store().permissions().allow_write {
        warn!("Rejected config upload from {}: writing is disabled", ctx.client_id);
        return CommandResponse::failure("Write permission denied.");
    }

    let (Some(name), Some(content)) = (
        metadata.get(keys::CONFIG_FILE_NAME),
        metadata.get(keys::CONFIG_FILE_CONTENT),
    ) else {
        return CommandResponse::failure(
            "Required metadata 'ConfigFileName' and/or 'ConfigFileContent' missing.",
        );
    };

    match ctx.launcher.store().add(name, content) {
        Ok(written) => {
            info!("Config file {written} added by {}", ctx.client_id);
            CommandResponse::success().with(keys::CONFIG_FILE_NAME, written)
        }
        Err(Error::PermissionDenied) => CommandResponse::failure("Write permission denied."),
        Err(Error::InvalidFileName(raw)) => {
            warn!("Rejected config file name {raw:?}");
            CommandResponse::failure("Invalid config file name.")
        }
        Err(e) => {
            error!("Unable to write config file {name}: {e}");
            CommandResponse::failure("Unable to write to device set configuration directory.")
        }
    }
}
