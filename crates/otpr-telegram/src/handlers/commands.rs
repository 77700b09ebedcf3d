use std::sync::Arc;

use teloxide::{prelude::*, types::ParseMode};
use tracing::{info, warn};

use otpr_core::control::{error_reply, Command, ParseError};

use crate::router::AppState;

/// Split `/cmd@botname arg1 ...` into (lowercased cmd, rest, mention).
pub(crate) fn parse_command(text: &str) -> (String, String, Option<String>) {
    let mut parts = text.trim().splitn(2, char::is_whitespace);
    let first = parts.next().unwrap_or("").trim();
    let rest = parts.next().unwrap_or("").trim().to_string();

    let mut name = first.trim_start_matches('/').splitn(2, '@');
    let cmd = name.next().unwrap_or("").to_lowercase();
    let mention = name.next().filter(|m| !m.is_empty()).map(|m| m.to_string());

    (cmd, rest, mention)
}

pub async fn handle_command(
    bot: Bot,
    chat_id: ChatId,
    cmd: &str,
    args: &str,
    state: Arc<AppState>,
) -> ResponseResult<()> {
    let reply = match Command::parse(cmd, args) {
        Ok(command) => {
            info!(command = ?command, "operator command");
            match state.control.execute(command).await {
                Ok(text) => text,
                Err(e) => {
                    warn!(command = %cmd, "command failed: {e}");
                    error_reply(&e)
                }
            }
        }
        Err(ParseError::Usage(usage)) => usage.to_string(),
        Err(ParseError::Unknown(_)) => "Unknown command. Send /help for the list.".to_string(),
    };

    bot.send_message(chat_id, reply)
        .parse_mode(ParseMode::Html)
        .await?;
    Ok(())
}
