//! Telegram update handlers.
//!
//! Only `/commands` are handled; everything else is ignored. Authorization is
//! enforced here, before the core control plane sees anything.

use std::sync::Arc;

use teloxide::{prelude::*, types::Message};
use tracing::warn;

use otpr_core::{
    control::{Command, ParseError},
    domain::UserId,
};

use crate::router::AppState;

mod commands;

pub fn is_owner(user_id: Option<UserId>, owner: UserId) -> bool {
    user_id == Some(owner)
}

/// Whether `cmd` names one of the relay's commands, aliases included.
fn is_relay_command(cmd: &str) -> bool {
    !matches!(Command::parse(cmd, ""), Err(ParseError::Unknown(_)))
}

pub async fn handle_message(bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(text) = msg.text() else {
        return Ok(());
    };
    if !text.starts_with('/') {
        return Ok(());
    }

    let (cmd, args, mention) = commands::parse_command(text);
    if let (Some(mention), Some(me)) = (mention.as_deref(), state.bot_username.as_deref()) {
        if !mention.eq_ignore_ascii_case(me) {
            return Ok(()); // addressed to another bot
        }
    }

    let user_id = msg.from().map(|u| UserId(u.id.0 as i64));
    if !is_owner(user_id, state.cfg.owner_id) {
        // Other bots' commands in shared groups are not ours to refuse.
        if !is_relay_command(&cmd) {
            return Ok(());
        }
        warn!(user = ?user_id.map(|u| u.0), command = %cmd, "unauthorized command");
        if let Err(e) = bot
            .send_message(msg.chat.id, "🚫 You are not authorized.")
            .await
        {
            warn!("failed to send unauthorized reply: {e}");
        }
        return Ok(());
    }

    commands::handle_command(bot, msg.chat.id, &cmd, &args, state).await
}
