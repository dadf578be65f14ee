use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// A text message received on the device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// The message text
    pub body: String,
    /// Sender address (usually a phone number)
    pub address: String,
    /// When the device received it, in epoch milliseconds
    pub date: String,
    /// When the sender sent it, in epoch milliseconds
    pub date_sent: String,
}

impl Message {
    pub fn new(
        body: impl Into<String>,
        address: impl Into<String>,
        date: impl Into<String>,
        date_sent: impl Into<String>,
    ) -> Self {
        Self {
            body: body.into(),
            address: address.into(),
            date: date.into(),
            date_sent: date_sent.into(),
        }
    }

    /// Parsed send time. `None` when the platform gave us something
    /// that is not an epoch-millisecond value.
    pub fn sent_at(&self) -> Option<DateTime<Utc>> {
        parse_epoch_millis(&self.date_sent)
    }
}

fn parse_epoch_millis(raw: &str) -> Option<DateTime<Utc>> {
    let millis: i64 = raw.trim().parse().ok()?;
    Utc.timestamp_millis_opt(millis).single()
}
