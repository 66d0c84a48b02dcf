//! Discord channel sink over the REST API.
//!
//! Lock/unlock edits the send-messages permission overwrite for the
//! configured role (normally @everyone); progress displays are embeds
//! created and patched in place.

use crate::ChannelId;
use crate::challenge::history::Summary;
use crate::challenge::progress::{ChallengeOutcome, DisplayState};
use crate::config::DiscordConfig;
use crate::error::SinkError;
use crate::sink::{ChannelSink, MessageHandle, render_summary_text};
use std::time::Duration;

const API_BASE: &str = "https://discord.com/api/v10";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Permission bit for sending messages in a channel.
const SEND_MESSAGES: u64 = 1 << 11;

const COLOR_ACTIVE: u32 = 0x1DA1F2;
const COLOR_SUCCESS: u32 = 0x00FF00;
const COLOR_TIMEOUT: u32 = 0xFF6B6B;

pub struct DiscordSink {
    client: reqwest::Client,
    token: String,
    everyone_role_id: String,
}

impl DiscordSink {
    pub fn new(config: &DiscordConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("reqwest client construction only fails on bad TLS config");
        Self {
            client,
            token: config.bot_token.clone(),
            everyone_role_id: config.everyone_role_id.clone(),
        }
    }

    fn auth(&self) -> String {
        format!("Bot {}", self.token)
    }

    async fn check(&self, response: reqwest::Response) -> Result<reqwest::Response, SinkError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        Err(SinkError::Api {
            status: status.as_u16(),
            message,
        })
    }

    async fn set_send_messages(
        &self,
        channel: &ChannelId,
        allow: bool,
    ) -> Result<(), SinkError> {
        let (allow_bits, deny_bits) = if allow {
            (SEND_MESSAGES.to_string(), "0".to_owned())
        } else {
            ("0".to_owned(), SEND_MESSAGES.to_string())
        };

        let url = format!(
            "{API_BASE}/channels/{}/permissions/{}",
            channel.as_str(),
            self.everyone_role_id
        );
        let response = self
            .client
            .put(&url)
            .header("authorization", self.auth())
            .json(&serde_json::json!({
                "type": 0,
                "allow": allow_bits,
                "deny": deny_bits,
            }))
            .send()
            .await?;
        self.check(response).await?;
        Ok(())
    }

    async fn send_message(
        &self,
        channel: &ChannelId,
        body: serde_json::Value,
    ) -> Result<MessageHandle, SinkError> {
        let url = format!("{API_BASE}/channels/{}/messages", channel.as_str());
        let response = self
            .client
            .post(&url)
            .header("authorization", self.auth())
            .json(&body)
            .send()
            .await?;
        let response = self.check(response).await?;
        let message: serde_json::Value = response.json().await?;
        let id = message
            .get("id")
            .and_then(|id| id.as_str())
            .ok_or_else(|| SinkError::Api {
                status: 200,
                message: "message response missing id".to_owned(),
            })?;
        Ok(MessageHandle(id.to_owned()))
    }

    async fn edit_message(
        &self,
        channel: &ChannelId,
        handle: &MessageHandle,
        body: serde_json::Value,
    ) -> Result<(), SinkError> {
        let url = format!(
            "{API_BASE}/channels/{}/messages/{}",
            channel.as_str(),
            handle.0
        );
        let response = self
            .client
            .patch(&url)
            .header("authorization", self.auth())
            .json(&body)
            .send()
            .await?;
        self.check(response).await?;
        Ok(())
    }
}

impl ChannelSink for DiscordSink {
    fn name(&self) -> &'static str {
        "discord"
    }

    async fn lock(&self, channel: &ChannelId) -> Result<(), SinkError> {
        self.set_send_messages(channel, false).await?;
        tracing::info!(%channel, "discord channel locked");
        Ok(())
    }

    async fn unlock(&self, channel: &ChannelId) -> Result<(), SinkError> {
        self.set_send_messages(channel, true).await?;
        tracing::info!(%channel, "discord channel unlocked");
        Ok(())
    }

    async fn notify(&self, channel: &ChannelId, text: &str) -> Result<MessageHandle, SinkError> {
        self.send_message(channel, serde_json::json!({ "content": text }))
            .await
    }

    async fn publish_progress(
        &self,
        channel: &ChannelId,
        state: &DisplayState,
        existing: Option<&MessageHandle>,
    ) -> Result<MessageHandle, SinkError> {
        let body = serde_json::json!({ "embeds": [progress_embed(state)] });
        match existing {
            Some(handle) => {
                self.edit_message(channel, handle, body).await?;
                Ok(handle.clone())
            }
            None => self.send_message(channel, body).await,
        }
    }

    async fn publish_summary(
        &self,
        channel: &ChannelId,
        summary: &Summary,
        existing: Option<&MessageHandle>,
    ) -> Result<MessageHandle, SinkError> {
        let body = serde_json::json!({ "content": render_summary_text(summary) });
        match existing {
            Some(handle) => {
                self.edit_message(channel, handle, body).await?;
                Ok(handle.clone())
            }
            None => self.send_message(channel, body).await,
        }
    }

    async fn publish_text(
        &self,
        channel: &ChannelId,
        text: &str,
        existing: Option<&MessageHandle>,
    ) -> Result<MessageHandle, SinkError> {
        let body = serde_json::json!({ "content": text });
        match existing {
            Some(handle) => {
                self.edit_message(channel, handle, body).await?;
                Ok(handle.clone())
            }
            None => self.send_message(channel, body).await,
        }
    }

    async fn delete_if_present(
        &self,
        channel: &ChannelId,
        handle: &MessageHandle,
    ) -> Result<(), SinkError> {
        let url = format!(
            "{API_BASE}/channels/{}/messages/{}",
            channel.as_str(),
            handle.0
        );
        let response = self
            .client
            .delete(&url)
            .header("authorization", self.auth())
            .send()
            .await?;
        let status = response.status();
        // 404 means the message is already gone, which satisfies the contract.
        if status.is_success() || status.as_u16() == 404 {
            Ok(())
        } else {
            let message = response.text().await.unwrap_or_default();
            Err(SinkError::Api {
                status: status.as_u16(),
                message,
            })
        }
    }
}

/// Embed payload for one progress display.
fn progress_embed(state: &DisplayState) -> serde_json::Value {
    let color = match state.outcome {
        Some(ChallengeOutcome::Completed) => COLOR_SUCCESS,
        Some(ChallengeOutcome::TimedOut { .. }) | Some(ChallengeOutcome::Cancelled) => {
            COLOR_TIMEOUT
        }
        None => COLOR_ACTIVE,
    };

    let mut fields: Vec<serde_json::Value> = state
        .rows
        .iter()
        .map(|row| {
            let status = if row.percentage >= 100.0 {
                "✅"
            } else if row.percentage >= 75.0 {
                "🔸"
            } else if row.percentage >= 50.0 {
                "🔹"
            } else {
                "⭕"
            };
            serde_json::json!({
                "name": row.metric,
                "value": format!(
                    "{status} Progress: {} {:.1}%\nCurrent: **{}** / Target: **{}**",
                    row.bar, row.percentage, row.current, row.target
                ),
                "inline": false,
            })
        })
        .collect();

    fields.push(serde_json::json!({
        "name": "📝 Original Post",
        "value": state.subject,
        "inline": false,
    }));

    match state.outcome {
        Some(ChallengeOutcome::Completed) => fields.push(serde_json::json!({
            "name": "🎉 CHALLENGE COMPLETE! 🎉",
            "value": "```diff\n+ All targets reached! Channel unlocked! 🔓\n```",
            "inline": false,
        })),
        Some(ChallengeOutcome::TimedOut { minutes }) => fields.push(serde_json::json!({
            "name": "⏰ RAID TIMED OUT! ⏰",
            "value": format!("```diff\n- Raid ended after {minutes} minutes! Channel unlocked! 🔓\n```"),
            "inline": false,
        })),
        Some(ChallengeOutcome::Cancelled) => fields.push(serde_json::json!({
            "name": "🛑 Challenge ended manually",
            "value": "Channel unlocked! 🔓",
            "inline": false,
        })),
        None => {}
    }

    serde_json::json!({
        "title": "🎯 Community Engagement Challenge 🎯",
        "color": color,
        "fields": fields,
        "timestamp": state.updated_at.to_rfc3339(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::challenge::progress::MetricProgress;
    use chrono::Utc;

    #[test]
    fn embed_color_tracks_outcome() {
        let mut state = DisplayState {
            subject: "https://twitter.com/u/status/1".to_owned(),
            rows: vec![MetricProgress {
                metric: "likes".to_owned(),
                current: 120.0,
                target: 100.0,
                percentage: 120.0,
                bar: "[====================]".to_owned(),
            }],
            outcome: None,
            updated_at: Utc::now(),
        };

        assert_eq!(progress_embed(&state)["color"], COLOR_ACTIVE);

        state.outcome = Some(ChallengeOutcome::Completed);
        let embed = progress_embed(&state);
        assert_eq!(embed["color"], COLOR_SUCCESS);
        let fields = embed["fields"].as_array().unwrap();
        assert!(
            fields
                .iter()
                .any(|f| f["name"].as_str().unwrap_or("").contains("COMPLETE"))
        );
    }
}
