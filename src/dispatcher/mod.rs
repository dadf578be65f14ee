pub mod events;
pub mod settings;

use std::fmt;
use std::sync::Arc;

use anyhow::{Context, Result};
use futures::future::{join_all, BoxFuture, FutureExt};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::channels::telegram::BotInfo;
use crate::channels::{RestChannel, TelegramChannel};
use crate::message::Message;
use crate::store::{KeyValueStore, CONFIG_KEY, COUNT_KEY, RUNNING_KEY};

pub use events::{ErrorCategory, ErrorEvent, ErrorListener, ErrorListeners};
pub use settings::ForwardingConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    RestApi,
    Telegram,
}

impl Destination {
    pub fn category(self) -> ErrorCategory {
        match self {
            Destination::RestApi => ErrorCategory::RestApi,
            Destination::Telegram => ErrorCategory::Telegram,
        }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Destination::RestApi => write!(f, "REST API"),
            Destination::Telegram => write!(f, "Telegram"),
        }
    }
}

/// What a single `forward_message` call did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForwardOutcome {
    /// Forwarding is stopped or nothing is configured
    Skipped,
    Processed {
        delivered: Vec<Destination>,
        failed: Vec<Destination>,
    },
}

/// How an attempt to begin forwarding ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Activation {
    Started,
    NoDestination,
    /// The saved settings could not be read; nothing was changed
    StoreUnavailable,
}

#[derive(Default)]
struct DispatcherState {
    running: bool,
    config: Option<ForwardingConfig>,
}

/// Fans incoming messages out to the configured destinations.
///
/// One instance per running application, shared behind an `Arc`. The running
/// flag and the forwarded count live in the injected store so they survive
/// restarts.
pub struct Dispatcher {
    store: Arc<dyn KeyValueStore>,
    rest: RestChannel,
    telegram: TelegramChannel,
    state: RwLock<DispatcherState>,
    // Serializes read-modify-write of the counter across overlapping calls
    counter: Mutex<()>,
    listeners: ErrorListeners,
}

impl Dispatcher {
    pub fn new(store: Arc<dyn KeyValueStore>, rest: RestChannel, telegram: TelegramChannel) -> Self {
        Self {
            store,
            rest,
            telegram,
            state: RwLock::new(DispatcherState::default()),
            counter: Mutex::new(()),
            listeners: ErrorListeners::new(),
        }
    }

    pub fn subscribe_errors(&self, listener: Arc<dyn ErrorListener>) {
        self.listeners.subscribe(listener);
        debug!("{} error listener(s) registered", self.listeners.len());
    }

    pub fn unsubscribe_errors(&self, listener: &Arc<dyn ErrorListener>) -> bool {
        self.listeners.unsubscribe(listener)
    }

    /// Resume the persisted running state after a restart.
    /// Returns whether forwarding is active afterwards.
    pub async fn restore(&self) -> bool {
        match self.store.get(RUNNING_KEY).await {
            Ok(Some(flag)) if flag == "true" => match self.activate().await {
                Activation::Started => {
                    info!("Resumed forwarding from saved state");
                    true
                }
                Activation::NoDestination => {
                    warn!("Saved state was running but no destination is active; stopping");
                    self.stop().await;
                    false
                }
                // Saved flag is left as it was
                Activation::StoreUnavailable => {
                    warn!("Could not read saved settings; not resuming forwarding");
                    false
                }
            },
            Ok(_) => false,
            Err(e) => {
                error!("Failed to read running flag: {:#}", e);
                false
            }
        }
    }

    /// Reload configuration and begin forwarding if any destination is
    /// active. Without one this is a no-op. Returns whether forwarding is
    /// active afterwards.
    pub async fn start(&self) -> bool {
        match self.activate().await {
            Activation::Started => true,
            Activation::NoDestination | Activation::StoreUnavailable => {
                self.is_service_running().await
            }
        }
    }

    async fn activate(&self) -> Activation {
        let config = match self.load_configuration().await {
            Ok(config) => config,
            Err(e) => {
                error!("{:#}", e);
                return Activation::StoreUnavailable;
            }
        };
        let valid = config
            .as_ref()
            .is_some_and(ForwardingConfig::has_active_destination);

        {
            let mut state = self.state.write().await;
            state.config = config;
            if !valid {
                if state.running {
                    warn!("Reloaded configuration has no active destination; still running");
                } else {
                    info!("No active destination configured; forwarding not started");
                }
                return Activation::NoDestination;
            }
            state.running = true;
        }

        self.persist_running(true).await;
        info!("Forwarding started");
        Activation::Started
    }

    pub async fn stop(&self) {
        self.state.write().await.running = false;
        self.persist_running(false).await;
        info!("Forwarding stopped");
    }

    pub async fn is_service_running(&self) -> bool {
        self.state.read().await.running
    }

    /// The running flag as last persisted, without acting on it
    pub async fn saved_running_flag(&self) -> bool {
        match self.store.get(RUNNING_KEY).await {
            Ok(flag) => flag.as_deref() == Some("true"),
            Err(e) => {
                error!("Failed to read running flag: {:#}", e);
                false
            }
        }
    }

    /// Reload configuration and report whether any destination is active
    pub async fn is_configuration_valid(&self) -> bool {
        let config = match self.load_configuration().await {
            Ok(config) => config,
            Err(e) => {
                error!("{:#}", e);
                return false;
            }
        };
        let valid = config
            .as_ref()
            .is_some_and(ForwardingConfig::has_active_destination);
        self.state.write().await.config = config;
        valid
    }

    /// The configuration snapshot currently in use
    pub async fn configuration(&self) -> Option<ForwardingConfig> {
        self.state.read().await.config.clone()
    }

    /// Persist new destination settings. They apply on the next start or
    /// validity check.
    pub async fn save_configuration(&self, config: &ForwardingConfig) -> Result<()> {
        let raw =
            serde_json::to_string(config).context("Failed to serialize forwarding configuration")?;
        self.store
            .set(CONFIG_KEY, &raw)
            .await
            .context("Failed to save forwarding configuration")
    }

    /// Check the stored bot token against Telegram's `getMe`
    pub async fn verify_telegram(&self) -> Result<BotInfo> {
        let config = self
            .load_configuration()
            .await?
            .context("No forwarding configuration saved")?;
        if config.telegram_bot_token.trim().is_empty() {
            anyhow::bail!("No Telegram bot token configured");
        }
        let bot = self
            .telegram
            .verify_bot(&config.telegram_bot_token)
            .await
            .context("Telegram bot check failed")?;
        Ok(bot)
    }

    pub async fn get_message_count(&self) -> u64 {
        match self.store.get(COUNT_KEY).await {
            Ok(Some(raw)) => raw.trim().parse().unwrap_or_else(|_| {
                warn!("Ignoring unreadable message count: {:?}", raw);
                0
            }),
            Ok(None) => 0,
            Err(e) => {
                error!("Failed to read message count: {:#}", e);
                0
            }
        }
    }

    /// Send one message to every active destination at once.
    ///
    /// Failures are reported to error listeners, never returned. The count
    /// goes up by one per processed call, whatever the individual outcomes.
    pub async fn forward_message(&self, message: &Message) -> ForwardOutcome {
        let config = {
            let state = self.state.read().await;
            match (state.running, &state.config) {
                (true, Some(config)) => config.clone(),
                _ => {
                    debug!("Forwarding inactive; dropping message from {}", message.address);
                    return ForwardOutcome::Skipped;
                }
            }
        };

        info!("Forwarding message from {}", message.address);

        let mut sends: Vec<BoxFuture<'_, (Destination, bool)>> = Vec::new();
        if config.rest_active() {
            sends.push(self.deliver(Destination::RestApi, &config, message).boxed());
        }
        if config.telegram_active() {
            sends.push(self.deliver(Destination::Telegram, &config, message).boxed());
        }

        let mut delivered = Vec::new();
        let mut failed = Vec::new();
        for (destination, ok) in join_all(sends).await {
            if ok {
                delivered.push(destination);
            } else {
                failed.push(destination);
            }
        }

        self.increment_message_count().await;

        ForwardOutcome::Processed { delivered, failed }
    }

    async fn deliver(
        &self,
        destination: Destination,
        config: &ForwardingConfig,
        message: &Message,
    ) -> (Destination, bool) {
        let result = match destination {
            Destination::RestApi => self.rest.send(config, message).await,
            Destination::Telegram => self.telegram.send(config, message).await,
        };

        match result {
            Ok(()) => {
                info!("Message forwarded to {}", destination);
                (destination, true)
            }
            Err(e) => {
                if e.is_configuration() {
                    warn!("{} not contacted, bad settings: {}", destination, e);
                } else {
                    warn!("Forwarding to {} failed: {}", destination, e);
                }
                self.report(
                    destination.category(),
                    format!("Failed to forward to {}: {}", destination, e),
                );
                (destination, false)
            }
        }
    }

    fn report(&self, category: ErrorCategory, message: String) {
        self.listeners.emit(&ErrorEvent::new(category, message));
    }

    /// `Err` only when the store itself fails. Unparseable settings are
    /// reported and read as no configuration.
    async fn load_configuration(&self) -> Result<Option<ForwardingConfig>> {
        let Some(raw) = self
            .store
            .get(CONFIG_KEY)
            .await
            .context("Failed to read forwarding configuration")?
        else {
            return Ok(None);
        };

        match serde_json::from_str(&raw) {
            Ok(config) => Ok(Some(config)),
            Err(e) => {
                error!("Saved forwarding configuration is invalid: {}", e);
                self.report(
                    ErrorCategory::General,
                    format!("Saved configuration could not be read: {}", e),
                );
                Ok(None)
            }
        }
    }

    async fn persist_running(&self, running: bool) {
        let value = if running { "true" } else { "false" };
        if let Err(e) = self.store.set(RUNNING_KEY, value).await {
            error!("Failed to persist running flag: {:#}", e);
        }
    }

    async fn increment_message_count(&self) {
        let _guard = self.counter.lock().await;
        let next = self.get_message_count().await + 1;
        if let Err(e) = self.store.set(COUNT_KEY, &next.to_string()).await {
            error!("Failed to persist message count: {:#}", e);
        }
    }
}
