mod channels;
mod cli;
mod config;
mod dispatcher;
mod message;
mod source;
mod store;
#[cfg(test)]
mod testing;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::channels::{RestChannel, TelegramChannel};
use crate::cli::{Args, Command};
use crate::config::Config;
use crate::dispatcher::{Dispatcher, ErrorEvent, ErrorListener, ForwardOutcome};
use crate::message::Message;
use crate::store::SqliteStore;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,sms_forwarder=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    info!("Loading configuration from: {}", args.config.display());
    let config = Config::load(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    info!("  Database: {}", config.store.database_path.display());
    info!("  Message source: {}", config.source.kind);
    info!("  Telegram API: {}", config.telegram.api_base_url);

    let store = SqliteStore::open(&config.store.database_path)?;
    let client = reqwest::Client::new();
    let dispatcher = Arc::new(Dispatcher::new(
        Arc::new(store),
        RestChannel::new(client.clone()),
        TelegramChannel::new(client, &config.telegram.api_base_url)?,
    ));

    // Error events surface in the log
    let log_errors: Arc<dyn ErrorListener> = Arc::new(|event: &ErrorEvent| -> Result<()> {
        warn!("[{}] {}", event.category, event.message);
        Ok(())
    });
    dispatcher.subscribe_errors(log_errors);

    if let Some(forwarding) = &config.forwarding {
        dispatcher.save_configuration(forwarding).await?;
        info!("Saved destination settings from config file");
    }

    match args.command.unwrap_or(Command::Run) {
        Command::Run => {
            if !dispatcher.restore().await {
                info!("Forwarding is stopped. Use the `start` command to begin.");
                return Ok(());
            }
            forward_until_interrupted(dispatcher, &config).await
        }
        Command::Start => {
            if !dispatcher.start().await {
                anyhow::bail!("No active destination configured; enable REST or Telegram first");
            }
            forward_until_interrupted(dispatcher, &config).await
        }
        Command::Stop => {
            dispatcher.stop().await;
            println!("Forwarding marked as stopped; takes effect on the next launch");
            Ok(())
        }
        Command::Status => {
            let valid = dispatcher.is_configuration_valid().await;
            let forwarding = dispatcher.configuration().await.unwrap_or_default();
            println!("Running:             {}", dispatcher.saved_running_flag().await);
            println!("Configuration valid: {}", valid);
            println!("  REST API:          {}", forwarding.rest_active());
            println!("  Telegram:          {}", forwarding.telegram_active());
            println!("SMS forwarded:       {}", dispatcher.get_message_count().await);
            Ok(())
        }
        Command::VerifyTelegram => {
            let bot = dispatcher.verify_telegram().await?;
            println!(
                "Telegram bot OK: {} (@{}, id {})",
                bot.first_name,
                bot.username.as_deref().unwrap_or("-"),
                bot.id
            );
            Ok(())
        }
    }
}

/// Feed messages from the configured source to the dispatcher until the
/// source ends or Ctrl-C arrives. In-flight forwards are allowed to finish.
async fn forward_until_interrupted(dispatcher: Arc<Dispatcher>, config: &Config) -> Result<()> {
    let source = source::from_config(&config.source);
    let (tx, mut rx) = mpsc::channel::<Message>(64);
    source
        .start(tx)
        .await
        .with_context(|| format!("Failed to start {} source", source.name()))?;

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let mut in_flight = JoinSet::new();
    loop {
        tokio::select! {
            received = rx.recv() => {
                let Some(message) = received else {
                    info!("Message source closed");
                    break;
                };
                let dispatcher = Arc::clone(&dispatcher);
                in_flight.spawn(async move {
                    if let ForwardOutcome::Processed { delivered, failed } =
                        dispatcher.forward_message(&message).await
                    {
                        info!(
                            "Message from {} processed: {} delivered, {} failed",
                            message.address,
                            delivered.len(),
                            failed.len()
                        );
                    }
                });
            }
            _ = &mut shutdown => {
                info!("Interrupted, shutting down");
                break;
            }
            Some(_) = in_flight.join_next(), if !in_flight.is_empty() => {}
        }
    }

    source.stop().await;
    while in_flight.join_next().await.is_some() {}
    info!(
        "Total SMS forwarded: {}",
        dispatcher.get_message_count().await
    );
    Ok(())
}
