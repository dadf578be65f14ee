pub mod json_lines;
pub mod mock;

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::config::{SourceConfig, SourceKind};
use crate::message::Message;

pub use json_lines::JsonLinesSource;
pub use mock::MockSource;

/// Anything that produces incoming messages
#[async_trait]
pub trait MessageSource: Send + Sync {
    fn name(&self) -> &'static str;

    /// Begin delivering messages into `sink`
    async fn start(&self, sink: mpsc::Sender<Message>) -> Result<()>;

    /// Stop delivering. Safe to call when not started.
    async fn stop(&self);
}

/// Build the source selected in the app config
pub fn from_config(config: &SourceConfig) -> Box<dyn MessageSource> {
    match config.kind {
        SourceKind::Mock => Box::new(MockSource::new(Duration::from_secs(
            config.interval_secs.max(1),
        ))),
        SourceKind::Stdin => Box::new(JsonLinesSource::stdin()),
    }
}
