pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;

pub use sqlite::SqliteStore;

/// Persisted running flag, `"true"` or `"false"`
pub const RUNNING_KEY: &str = "smsForwarderRunning";
/// JSON-encoded forwarding configuration
pub const CONFIG_KEY: &str = "smsForwarderConfig";
/// Decimal count of processed messages
pub const COUNT_KEY: &str = "smsForwardedCount";

/// String key-value persistence used by the dispatcher
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> Result<()>;
}
