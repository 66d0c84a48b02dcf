use anyhow::Context as _;
use raidlock::ChannelId;
use raidlock::challenge::engine::{ChallengeEngine, EngineTiming};
use raidlock::challenge::history::HistoryStore;
use raidlock::challenge::registry::ChallengeRegistry;
use raidlock::config::Config;
use raidlock::dashboard::Dashboard;
use raidlock::dispatch::{Dispatcher, SourceSet};
use raidlock::sink::ChannelSink;
use raidlock::sink::discord::DiscordSink;
use raidlock::sink::telegram::TelegramSink;
use raidlock::source::coinmarketcap::CoinMarketCapSource;
use raidlock::source::dextools::DextoolsSource;
use raidlock::source::geckoterminal::GeckoTerminalSource;
use raidlock::source::gmgn::GmgnSource;
use raidlock::source::twitter::TwitterSource;
use raidlock::source::whale::{WhaleFeed, render_alert};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));
    let config = Config::load(&config_path)?;

    let telegram = config
        .telegram
        .clone()
        .context("a [telegram] section is required")?;
    let sink = Arc::new(TelegramSink::new(&telegram));

    let registry = Arc::new(ChallengeRegistry::new());
    let history = Arc::new(
        HistoryStore::load(&config.history_path).context("failed to open the history ledger")?,
    );
    let engine = Arc::new(ChallengeEngine::new(
        registry,
        history,
        EngineTiming::from(&config.engine),
    ));

    let whale_feed = WhaleFeed::new(config.whale.clone());
    let feed_task = whale_feed.start();
    if config.whale.notifications_enabled {
        if let Some(alert_channel) = config.whale.alert_channel.clone() {
            spawn_alert_forwarder(&whale_feed, ChannelId(alert_channel), Arc::clone(&sink));
        }
        // Alerts mirror into Discord when a [discord] section names a channel.
        if let Some(discord) = config.discord.as_ref()
            && let Some(alert_channel) = discord.alert_channel.clone()
        {
            let discord_sink = Arc::new(DiscordSink::new(discord));
            spawn_alert_forwarder(&whale_feed, ChannelId(alert_channel), discord_sink);
        }
    }

    let sources = SourceSet {
        twitter: Arc::new(TwitterSource::new()),
        coinmarketcap: Arc::new(CoinMarketCapSource::new(&config.sources)),
        dextools: Arc::new(DextoolsSource::new(&config.sources)),
        geckoterminal: Arc::new(GeckoTerminalSource::new(config.sources.gecko_pool_url.clone())),
        gmgn: Arc::new(GmgnSource::new(config.sources.gmgn_pool_url.clone())),
        whale: Arc::new(whale_feed.source()),
    };

    // The [telegram] chat id doubles as the raid channel when none is set.
    let raid_channel = config
        .raid_channel
        .clone()
        .or_else(|| (!telegram.chat_id.is_empty()).then(|| telegram.chat_id.clone()));

    if let Some(channel) = raid_channel.clone() {
        let dashboard = Dashboard::new(
            ChannelId(channel),
            Arc::clone(&sink),
            Arc::clone(&sources.coinmarketcap),
            Arc::clone(&sources.dextools),
            Arc::clone(&sources.geckoterminal),
        );
        tokio::spawn(dashboard.run());
    }

    let dispatcher = Dispatcher::new(
        telegram.bot_token.clone(),
        raid_channel,
        Arc::clone(&engine),
        Arc::clone(&sink),
        sources,
    );

    tracing::info!("raidlock started");
    tokio::select! {
        _ = dispatcher.run() => {}
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received");
        }
    }

    engine.shutdown().await;
    feed_task.abort();
    Ok(())
}

/// Forward qualifying whale trades into the alert channel.
fn spawn_alert_forwarder<K: ChannelSink>(feed: &WhaleFeed, channel: ChannelId, sink: Arc<K>) {
    let mut trades = feed.subscribe();
    tokio::spawn(async move {
        loop {
            match trades.recv().await {
                Ok(trade) => {
                    if let Err(error) = sink.notify(&channel, &render_alert(&trade)).await {
                        tracing::warn!(%error, channel = %channel, "whale alert failed");
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "whale alerts lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().compact())
        .init();
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(error) => {
                tracing::warn!(%error, "failed to install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
