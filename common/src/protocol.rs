use serde::{Deserialize, Serialize};

/// A chat message forwarded by the chat bridge.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CommandRequest {
    /// Channel (or other conversation) the message was posted in. At most one
    /// board is active per session.
    pub session: String,
    pub author: String,
    pub content: String,
    /// Whether the author may manage messages in the session, which allows
    /// stopping boards started by someone else.
    #[serde(default)]
    pub can_manage: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq, Eq)]
pub struct CommandResponse {
    /// Text the bridge should post back to the author, if any.
    pub reply: Option<String>,
}

impl CommandResponse {
    pub fn silent() -> Self {
        Self { reply: None }
    }

    pub fn reply(text: impl Into<String>) -> Self {
        Self {
            reply: Some(text.into()),
        }
    }
}
