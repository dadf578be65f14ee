use std::fmt;

use anyhow::{Context, Result};
use chrono::{Local, TimeZone};
use teloxide::payloads::SendMessageSetters;
use teloxide::prelude::*;
use teloxide::types::{ParseMode, Recipient};
use tracing::debug;

use super::ChannelError;
use crate::dispatcher::ForwardingConfig;
use crate::message::Message;

pub const DEFAULT_API_BASE_URL: &str = "https://api.telegram.org";

/// The bot behind a token, as reported by `getMe`
#[derive(Debug, Clone)]
pub struct BotInfo {
    pub id: u64,
    pub username: Option<String>,
    pub first_name: String,
}

/// Forwards messages to a Telegram chat through the Bot API
pub struct TelegramChannel {
    client: reqwest::Client,
    api_url: reqwest::Url,
}

impl TelegramChannel {
    pub fn new(client: reqwest::Client, api_base_url: &str) -> Result<Self> {
        let api_url = reqwest::Url::parse(api_base_url)
            .with_context(|| format!("Invalid Telegram API URL: {}", api_base_url))?;
        Ok(Self { client, api_url })
    }

    /// Tokens come from saved settings, so a bot is built per request
    fn bot(&self, token: &str) -> Bot {
        Bot::with_client(token.trim(), self.client.clone()).set_api_url(self.api_url.clone())
    }

    pub async fn send(
        &self,
        config: &ForwardingConfig,
        message: &Message,
    ) -> Result<(), ChannelError> {
        let recipient = parse_recipient(&config.telegram_chat_id)?;
        let text = format_text(message, &Local);

        debug!("Sending message to Telegram chat {}", config.telegram_chat_id.trim());

        // Legacy Markdown: the text only uses *bold* and escapes the rest
        #[allow(deprecated)]
        let mode = ParseMode::Markdown;
        self.bot(&config.telegram_bot_token)
            .send_message(recipient, text)
            .parse_mode(mode)
            .await?;
        Ok(())
    }

    /// Check that the token belongs to a live bot
    pub async fn verify_bot(&self, token: &str) -> Result<BotInfo, ChannelError> {
        let me = self.bot(token).get_me().await?;
        Ok(BotInfo {
            id: me.user.id.0,
            username: me.user.username.clone(),
            first_name: me.user.first_name.clone(),
        })
    }
}

/// Numeric ids address chats directly, anything else is a `@channel` name
fn parse_recipient(raw: &str) -> Result<Recipient, ChannelError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ChannelError::InvalidChatId("chat id is empty".to_string()));
    }
    Ok(match raw.parse::<i64>() {
        Ok(id) => Recipient::Id(ChatId(id)),
        Err(_) => Recipient::ChannelUsername(raw.to_string()),
    })
}

/// Render a message as Telegram Markdown, with the send time shown in `tz`
pub fn format_text<Tz>(message: &Message, tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    let date = match message.sent_at() {
        Some(sent) => sent
            .with_timezone(tz)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string(),
        None => escape_markdown(&message.date_sent),
    };

    format!(
        "📱 *New SMS*\n\n*From:* {}\n*Date:* {}\n\n{}",
        escape_markdown(&message.address),
        date,
        escape_markdown(&message.body)
    )
}

/// Escape the characters legacy Markdown mode treats as markup
fn escape_markdown(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '_' | '*' | '`' | '[') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
