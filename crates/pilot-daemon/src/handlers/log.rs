use pilot_rpc::commands::CommandResponse;
use tracing::debug;

use super::HandlerContext;

pub fn handle_log_subscribe(ctx: &mut HandlerContext<'_>) -> CommandResponse {
    if !ctx.notifier.subscribe(ctx.client_id) {
        debug!("{} is already subscribed to logs", ctx.client_id);
    }
    CommandResponse::success()
}

pub fn handle_log_unsubscribe(ctx: &mut HandlerContext<'_>) -> CommandResponse {
    if !ctx.notifier.unsubscribe(ctx.client_id) {
        debug!("{} was not subscribed to logs", ctx.client_id);
    }
    CommandResponse::success()
}
