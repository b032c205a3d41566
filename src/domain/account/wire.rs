//! Wire types for account push events.

use super::UserDetails;
use serde::Deserialize;

/// `user_message` push: an unsolicited account refresh.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct UserMessage {
    #[serde(default)]
    pub error: Option<serde_json::Value>,
    #[serde(rename = "userDetails", default)]
    pub user_details: Option<UserDetails>,
}

/// `readonly` push.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadOnlyStatus {
    pub readonly: bool,
}
