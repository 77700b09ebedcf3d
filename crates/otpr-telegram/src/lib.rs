//! Telegram adapter (teloxide).
//!
//! Implements the `otpr-core` delivery port over the Bot API and hosts the
//! owner-only command surface.

use async_trait::async_trait;

use teloxide::{
    prelude::*,
    types::{InlineKeyboardButton, InlineKeyboardMarkup, ParseMode, Recipient},
};

use tokio::time::sleep;
use tracing::warn;

pub mod handlers;
pub mod router;

use otpr_core::{
    domain::DestinationId,
    errors::Error,
    messaging::{port::DeliveryPort, types::LinkButton},
    Result,
};

#[derive(Clone)]
pub struct TelegramMessenger {
    bot: Bot,
}

impl TelegramMessenger {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    pub fn from_token(token: &str) -> Self {
        Self::new(Bot::new(token))
    }

    pub fn bot(&self) -> Bot {
        self.bot.clone()
    }

    /// Numeric ids are chats; `@name` is a public channel or group username.
    fn recipient(destination: &DestinationId) -> Result<Recipient> {
        let raw = destination.as_str().trim();
        if raw.len() > 1 && raw.starts_with('@') {
            return Ok(Recipient::ChannelUsername(raw.to_string()));
        }
        raw.parse::<i64>()
            .map(|id| Recipient::Id(teloxide::types::ChatId(id)))
            .map_err(|_| Error::DeliveryFailed {
                destination: destination.clone(),
                reason: "not a chat id or @username".to_string(),
            })
    }

    fn markup(buttons: &[LinkButton]) -> Option<InlineKeyboardMarkup> {
        let rows: Vec<Vec<InlineKeyboardButton>> = buttons
            .iter()
            .filter_map(|b| match reqwest::Url::parse(&b.url) {
                Ok(url) => Some(vec![InlineKeyboardButton::url(b.label.clone(), url)]),
                Err(e) => {
                    warn!(label = %b.label, "skipping button with invalid url: {e}");
                    None
                }
            })
            .collect();
        if rows.is_empty() {
            None
        } else {
            Some(InlineKeyboardMarkup::new(rows))
        }
    }

    async fn with_retry<T, Fut>(
        &self,
        mut op: impl FnMut() -> Fut,
    ) -> std::result::Result<T, teloxide::RequestError>
    where
        Fut: std::future::IntoFuture<Output = std::result::Result<T, teloxide::RequestError>>,
        Fut::IntoFuture: Send,
    {
        const MAX_RETRIES: usize = 1;
        let mut attempts = 0usize;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(teloxide::RequestError::RetryAfter(d)) if attempts < MAX_RETRIES => {
                    attempts += 1;
                    warn!(retry_after = ?d, "telegram rate limited; retrying once");
                    sleep(d).await;
                }
                Err(other) => return Err(other),
            }
        }
    }
}

#[async_trait]
impl DeliveryPort for TelegramMessenger {
    async fn deliver(
        &self,
        destination: &DestinationId,
        html: &str,
        buttons: &[LinkButton],
    ) -> Result<()> {
        let recipient = Self::recipient(destination)?;
        let markup = Self::markup(buttons);

        self.with_retry(|| {
            let req = self
                .bot
                .send_message(recipient.clone(), html.to_string())
                .parse_mode(ParseMode::Html)
                .disable_web_page_preview(true);
            match &markup {
                Some(m) => req.reply_markup(m.clone()),
                None => req,
            }
        })
        .await
        .map_err(|e| Error::DeliveryFailed {
            destination: destination.clone(),
            reason: format!("telegram error: {e}"),
        })?;

        Ok(())
    }
}
