use serde::{Deserialize, Serialize};

/// Destination settings as saved by the user.
///
/// Stored as JSON under `smsForwarderConfig`. Every field is optional on the
/// wire so partially filled settings still load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ForwardingConfig {
    pub rest_api_enabled: bool,
    pub rest_api_url: String,
    pub rest_api_method: String,
    /// Raw JSON object text, e.g. `{"Authorization": "Bearer abc"}`
    pub rest_api_headers: String,
    pub telegram_enabled: bool,
    pub telegram_bot_token: String,
    pub telegram_chat_id: String,
}

impl Default for ForwardingConfig {
    fn default() -> Self {
        Self {
            rest_api_enabled: false,
            rest_api_url: String::new(),
            rest_api_method: default_method(),
            rest_api_headers: String::new(),
            telegram_enabled: false,
            telegram_bot_token: String::new(),
            telegram_chat_id: String::new(),
        }
    }
}

fn default_method() -> String {
    "POST".to_string()
}

impl ForwardingConfig {
    pub fn rest_active(&self) -> bool {
        self.rest_api_enabled && !self.rest_api_url.trim().is_empty()
    }

    pub fn telegram_active(&self) -> bool {
        self.telegram_enabled
            && !self.telegram_bot_token.trim().is_empty()
            && !self.telegram_chat_id.trim().is_empty()
    }

    /// At least one destination can receive messages
    pub fn has_active_destination(&self) -> bool {
        self.rest_active() || self.telegram_active()
    }
}
