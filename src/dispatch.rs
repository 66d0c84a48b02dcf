//! Telegram command dispatcher.
//!
//! Long-polls `getUpdates` and maps raid commands onto the engine. The
//! dispatcher stays thin: parse the command, call the engine, reply with
//! the outcome. Everything stateful lives in the engine and the sinks.

use crate::challenge::engine::ChallengeEngine;
use crate::commands::{
    self, SENTIMENT_METRICS, TWITTER_METRICS, UPVOTE_METRICS, VOLUME_METRICS,
};
use crate::error::{EngineError, Error};
use crate::sink::ChannelSink;
use crate::sink::telegram::TelegramSink;
use crate::source::MetricSource;
use crate::source::coinmarketcap::CoinMarketCapSource;
use crate::source::dextools::DextoolsSource;
use crate::source::geckoterminal::GeckoTerminalSource;
use crate::source::gmgn::GmgnSource;
use crate::source::twitter::{TwitterSource, normalize_status_url};
use crate::source::whale::WhaleVolumeSource;
use crate::ChannelId;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

/// Seconds the Bot API holds an empty long-poll open.
const LONG_POLL_SECS: u64 = 30;
/// Pause after a failed poll before trying again.
const POLL_RETRY_DELAY: Duration = Duration::from_secs(5);

/// One instance of every metric source the commands can start.
pub struct SourceSet {
    pub twitter: Arc<TwitterSource>,
    pub coinmarketcap: Arc<CoinMarketCapSource>,
    pub dextools: Arc<DextoolsSource>,
    pub geckoterminal: Arc<GeckoTerminalSource>,
    pub gmgn: Arc<GmgnSource>,
    pub whale: Arc<WhaleVolumeSource>,
}

pub struct Dispatcher {
    client: reqwest::Client,
    token: String,
    /// When set, raid commands are only honored in this chat.
    raid_channel: Option<String>,
    engine: Arc<ChallengeEngine>,
    sink: Arc<TelegramSink>,
    sources: SourceSet,
}

#[derive(Debug, Deserialize)]
struct UpdatesResponse {
    ok: bool,
    #[serde(default)]
    result: Vec<Update>,
}

#[derive(Debug, Deserialize)]
struct Update {
    update_id: i64,
    message: Option<IncomingMessage>,
}

#[derive(Debug, Deserialize)]
struct IncomingMessage {
    chat: Chat,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Chat {
    id: i64,
}

impl Dispatcher {
    pub fn new(
        token: impl Into<String>,
        raid_channel: Option<String>,
        engine: Arc<ChallengeEngine>,
        sink: Arc<TelegramSink>,
        sources: SourceSet,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            token: token.into(),
            raid_channel,
            engine,
            sink,
            sources,
        }
    }

    /// Poll updates until the future is dropped. Poll failures back off and
    /// retry; they never bring the dispatcher down.
    pub async fn run(&self) {
        let mut offset: i64 = 0;
        loop {
            match self.poll_updates(offset).await {
                Ok(updates) => {
                    for update in updates {
                        offset = offset.max(update.update_id + 1);
                        if let Some(message) = update.message
                            && let Some(text) = message.text
                        {
                            let channel = ChannelId(message.chat.id.to_string());
                            self.handle_message(channel, text.trim()).await;
                        }
                    }
                }
                Err(error) => {
                    tracing::warn!(%error, "getUpdates failed");
                    tokio::time::sleep(POLL_RETRY_DELAY).await;
                }
            }
        }
    }

    async fn poll_updates(&self, offset: i64) -> Result<Vec<Update>, anyhow::Error> {
        let url = format!("https://api.telegram.org/bot{}/getUpdates", self.token);
        let response: UpdatesResponse = self
            .client
            .get(&url)
            .query(&[("offset", offset), ("timeout", LONG_POLL_SECS as i64)])
            .timeout(Duration::from_secs(LONG_POLL_SECS + 10))
            .send()
            .await?
            .json()
            .await?;
        if !response.ok {
            anyhow::bail!("telegram returned ok=false");
        }
        Ok(response.result)
    }

    async fn handle_message(&self, channel: ChannelId, text: &str) {
        let Some((command, args)) = split_command(text) else {
            return;
        };

        if let Some(raid_channel) = &self.raid_channel
            && channel.as_str() != raid_channel
            && command.starts_with("/raid")
        {
            self.reply(&channel, "Raid commands only work in the raid channel.")
                .await;
            return;
        }

        match command {
            "/raid" => self.raid_twitter(channel, args).await,
            "/raid_cmc" => {
                self.start_raid(channel, String::new(), args, UPVOTE_METRICS, |s| {
                    Arc::clone(&s.coinmarketcap)
                })
                .await;
            }
            "/raid_dextools" => {
                self.start_raid(channel, String::new(), args, SENTIMENT_METRICS, |s| {
                    Arc::clone(&s.dextools)
                })
                .await;
            }
            "/raid_gecko" => {
                self.start_raid(channel, String::new(), args, SENTIMENT_METRICS, |s| {
                    Arc::clone(&s.geckoterminal)
                })
                .await;
            }
            "/raid_gmgn" => {
                self.start_raid(channel, String::new(), args, SENTIMENT_METRICS, |s| {
                    Arc::clone(&s.gmgn)
                })
                .await;
            }
            "/raid_whale" => {
                self.start_raid(channel, String::new(), args, VOLUME_METRICS, |s| {
                    Arc::clone(&s.whale)
                })
                .await;
            }
            "/raid_stop" => self.raid_stop(channel).await,
            "/raid_summary" => self.raid_summary(channel).await,
            _ => {}
        }
    }

    async fn raid_twitter(&self, channel: ChannelId, args: &str) {
        let Some((url, targets)) = args.split_once(char::is_whitespace) else {
            self.reply(
                &channel,
                "Usage: /raid <tweet_url> likes:100 retweets:50 [timeout:30]",
            )
            .await;
            return;
        };

        let subject = match normalize_status_url(url.trim()) {
            Ok(subject) => subject,
            Err(error) => {
                self.reply(&channel, &error.to_string()).await;
                return;
            }
        };

        self.start_raid(channel, subject, targets, TWITTER_METRICS, |s| {
            Arc::clone(&s.twitter)
        })
        .await;
    }

    async fn start_raid<S, F>(
        &self,
        channel: ChannelId,
        subject: String,
        args: &str,
        metrics: &[commands::MetricSpec],
        pick: F,
    ) where
        S: MetricSource,
        F: FnOnce(&SourceSet) -> Arc<S>,
    {
        let request = match commands::parse_start(subject, args, metrics) {
            Ok(request) => request,
            Err(error) => {
                self.reply(&channel, &error.to_string()).await;
                return;
            }
        };

        let source = pick(&self.sources);
        let result = self
            .engine
            .start(
                channel.clone(),
                request.subject,
                request.targets,
                request.timeout,
                source,
                Arc::clone(&self.sink),
            )
            .await;

        match result {
            Ok(_) => {}
            Err(Error::Engine(EngineError::AlreadyActive(_))) => {
                self.reply(&channel, "There's already an active raid in this channel!")
                    .await;
            }
            Err(Error::Validation(error)) => {
                self.reply(&channel, &error.to_string()).await;
            }
            Err(error) => {
                tracing::error!(%error, channel = %channel, "raid start failed");
                self.reply(&channel, "Could not start the raid, check the target and try again.")
                    .await;
            }
        }
    }

    async fn raid_stop(&self, channel: ChannelId) {
        match self.engine.stop(&channel).await {
            Ok(()) => {}
            Err(EngineError::NotFound(_)) => {
                self.reply(&channel, "No active raid in this channel.").await;
            }
            Err(error) => {
                tracing::error!(%error, channel = %channel, "raid stop failed");
            }
        }
    }

    async fn raid_summary(&self, channel: ChannelId) {
        let summary = self.engine.history().summarize().await;
        if let Err(error) = self.sink.publish_summary(&channel, &summary, None).await {
            tracing::warn!(%error, channel = %channel, "summary publish failed");
        }
    }

    async fn reply(&self, channel: &ChannelId, text: &str) {
        if let Err(error) = self.sink.notify(channel, text).await {
            tracing::warn!(%error, channel = %channel, "reply failed");
        }
    }
}

/// Split "/raid@BotName args" into the bare command and its arguments.
fn split_command(text: &str) -> Option<(&str, &str)> {
    if !text.starts_with('/') {
        return None;
    }
    let (head, rest) = text.split_once(char::is_whitespace).unwrap_or((text, ""));
    let command = head.split('@').next().unwrap_or(head);
    Some((command, rest.trim()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_split_from_arguments() {
        assert_eq!(
            split_command("/raid https://x.com/u/status/1 likes:100"),
            Some(("/raid", "https://x.com/u/status/1 likes:100"))
        );
        assert_eq!(split_command("/raid_stop"), Some(("/raid_stop", "")));
        assert_eq!(
            split_command("/raid_summary@raidlock_bot"),
            Some(("/raid_summary", ""))
        );
        assert_eq!(split_command("hello"), None);
    }
}
