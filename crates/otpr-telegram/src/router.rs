use std::sync::Arc;

use teloxide::{dispatching::Dispatcher, dptree, prelude::*};
use tracing::{info, warn};

use otpr_core::{config::Config, control::ControlPlane};

use crate::handlers;

#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<Config>,
    pub control: Arc<ControlPlane>,
    /// Our own username, for ignoring `/cmd@otherbot` in groups.
    pub bot_username: Option<String>,
}

/// Run the owner command surface until Ctrl-C.
pub async fn run_polling(
    cfg: Arc<Config>,
    bot: Bot,
    control: Arc<ControlPlane>,
) -> anyhow::Result<()> {
    let bot_username = match bot.get_me().await {
        Ok(me) => {
            info!(username = %me.username(), "telegram bot connected");
            Some(me.username().to_string())
        }
        Err(e) => {
            warn!("get_me failed; accepting all @mentions: {e}");
            None
        }
    };
    info!(owner = cfg.owner_id.0, "command surface ready");

    let state = Arc::new(AppState {
        cfg,
        control,
        bot_username,
    });

    let handler = dptree::entry().branch(Update::filter_message().endpoint(handlers::handle_message));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}
