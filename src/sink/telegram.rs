//! Telegram channel sink over the Bot API.
//!
//! Lock/unlock toggles `can_send_messages` on the chat's default
//! permissions; progress displays are plain messages edited in place.
//! "message is not modified" responses on edits are treated as success.

use crate::ChannelId;
use crate::challenge::history::Summary;
use crate::challenge::progress::DisplayState;
use crate::config::TelegramConfig;
use crate::error::SinkError;
use crate::sink::{ChannelSink, MessageHandle, render_progress_text, render_summary_text};
use serde::Deserialize;
use std::time::Duration;

const API_BASE: &str = "https://api.telegram.org";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    result: Option<serde_json::Value>,
}

pub struct TelegramSink {
    client: reqwest::Client,
    token: String,
}

impl TelegramSink {
    pub fn new(config: &TelegramConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("reqwest client construction only fails on bad TLS config");
        Self {
            client,
            token: config.bot_token.clone(),
        }
    }

    async fn call(
        &self,
        method: &str,
        body: serde_json::Value,
    ) -> Result<Option<serde_json::Value>, SinkError> {
        let url = format!("{API_BASE}/bot{}/{method}", self.token);
        let response = self.client.post(&url).json(&body).send().await?;
        let status = response.status().as_u16();
        let api: ApiResponse = response.json().await?;

        if api.ok {
            return Ok(api.result);
        }

        let message = api.description.unwrap_or_else(|| "unknown error".to_owned());
        // Editing with identical content is not a failure worth surfacing.
        if message.to_lowercase().contains("message is not modified") {
            return Ok(None);
        }
        Err(SinkError::Api { status, message })
    }

    async fn set_can_send(&self, channel: &ChannelId, can_send: bool) -> Result<(), SinkError> {
        self.call(
            "setChatPermissions",
            serde_json::json!({
                "chat_id": channel.as_str(),
                "permissions": { "can_send_messages": can_send },
            }),
        )
        .await?;
        Ok(())
    }

    async fn send_or_edit(
        &self,
        channel: &ChannelId,
        text: &str,
        existing: Option<&MessageHandle>,
    ) -> Result<MessageHandle, SinkError> {
        match existing {
            Some(handle) => {
                self.call(
                    "editMessageText",
                    serde_json::json!({
                        "chat_id": channel.as_str(),
                        "message_id": handle.0,
                        "text": text,
                    }),
                )
                .await?;
                Ok(handle.clone())
            }
            None => {
                let result = self
                    .call(
                        "sendMessage",
                        serde_json::json!({
                            "chat_id": channel.as_str(),
                            "text": text,
                        }),
                    )
                    .await?;
                let message_id = result
                    .as_ref()
                    .and_then(|r| r.get("message_id"))
                    .and_then(|id| id.as_i64())
                    .ok_or_else(|| SinkError::Api {
                        status: 200,
                        message: "sendMessage result missing message_id".to_owned(),
                    })?;
                Ok(MessageHandle(message_id.to_string()))
            }
        }
    }
}

impl ChannelSink for TelegramSink {
    fn name(&self) -> &'static str {
        "telegram"
    }

    async fn lock(&self, channel: &ChannelId) -> Result<(), SinkError> {
        self.set_can_send(channel, false).await?;
        tracing::info!(%channel, "telegram chat locked");
        Ok(())
    }

    async fn unlock(&self, channel: &ChannelId) -> Result<(), SinkError> {
        self.set_can_send(channel, true).await?;
        tracing::info!(%channel, "telegram chat unlocked");
        Ok(())
    }

    async fn notify(&self, channel: &ChannelId, text: &str) -> Result<MessageHandle, SinkError> {
        self.send_or_edit(channel, text, None).await
    }

    async fn publish_progress(
        &self,
        channel: &ChannelId,
        state: &DisplayState,
        existing: Option<&MessageHandle>,
    ) -> Result<MessageHandle, SinkError> {
        let text = render_progress_text(state);
        self.send_or_edit(channel, &text, existing).await
    }

    async fn publish_summary(
        &self,
        channel: &ChannelId,
        summary: &Summary,
        existing: Option<&MessageHandle>,
    ) -> Result<MessageHandle, SinkError> {
        let text = render_summary_text(summary);
        self.send_or_edit(channel, &text, existing).await
    }

    async fn publish_text(
        &self,
        channel: &ChannelId,
        text: &str,
        existing: Option<&MessageHandle>,
    ) -> Result<MessageHandle, SinkError> {
        self.send_or_edit(channel, text, existing).await
    }

    async fn delete_if_present(
        &self,
        channel: &ChannelId,
        handle: &MessageHandle,
    ) -> Result<(), SinkError> {
        let result = self
            .call(
                "deleteMessage",
                serde_json::json!({
                    "chat_id": channel.as_str(),
                    "message_id": handle.0,
                }),
            )
            .await;
        match result {
            Ok(_) => Ok(()),
            // Deleting an already-deleted message is a no-op by contract.
            Err(SinkError::Api { message, .. })
                if message.to_lowercase().contains("message to delete not found") =>
            {
                Ok(())
            }
            Err(error) => Err(error),
        }
    }
}
