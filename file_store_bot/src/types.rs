use std::fmt::Display;

use chrono::{DateTime, Utc};
use teloxide::types::{ChatId, Message, MessageId, UserId};
use url::Url;
use uuid::Uuid;

/// A specific message within a specific chat.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub struct MessageLocation {
    pub chat_id: ChatId,
    pub message_id: MessageId,
}

impl MessageLocation {
    #[must_use]
    pub fn new(chat_id: ChatId, message_id: MessageId) -> Self {
        Self {
            chat_id,
            message_id,
        }
    }

    #[must_use]
    pub fn of(message: &Message) -> Self {
        Self::new(message.chat.id, message.id)
    }
}

impl Display for MessageLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "message {} in chat {}", self.message_id.0, self.chat_id.0)
    }
}

/// Key that a deep link carries to point at a stored file.
///
/// Looks like `file_` followed by 32 lowercase hex digits, which keeps it
/// well within what Telegram allows in a `?start=` payload.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct ShareKey(String);

impl ShareKey {
    const PREFIX: &'static str = "file_";

    /// Make a new random key.
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("{}{}", Self::PREFIX, Uuid::new_v4().simple()))
    }

    /// Whether a `/start` payload is meant to be a share key, even if it's not a valid one.
    /// Deep links from elsewhere (like referral links) don't start with the prefix.
    #[must_use]
    pub fn is_claimed_by(payload: &str) -> bool {
        payload.starts_with(Self::PREFIX)
    }

    /// Returns `None` if this string is not shaped like a share key.
    #[must_use]
    pub fn parse(string: &str) -> Option<Self> {
        let hex = string.strip_prefix(Self::PREFIX)?;
        if hex.len() != 32 || !hex.chars().all(|c| matches!(c, '0'..='9' | 'a'..='f')) {
            return None;
        }
        Some(Self(string.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Link that opens a chat with the bot and sends `/start <key>`.
    pub fn deep_link(&self, bot_username: &str) -> Result<Url, url::ParseError> {
        Url::parse(&format!("https://t.me/{bot_username}?start={}", self.0))
    }
}

impl Display for ShareKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// A file uploaded by an admin and kept in the storage channel.
#[derive(Debug, Clone)]
pub struct StoredFile {
    pub key: ShareKey,
    /// Where the file sits in the storage channel.
    pub location: MessageLocation,
    pub uploader: Option<UserId>,
    /// Caption of the upload, if it had one.
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A message that should be deleted once `due_at` passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingDeletion {
    pub id: i64,
    pub location: MessageLocation,
    pub due_at: DateTime<Utc>,
}

/// A row of the pending deletions table, as read back from the database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoredDeletion {
    Pending(PendingDeletion),
    /// The due time in the database could not be made sense of.
    Malformed { id: i64, raw_due_at: String },
}

impl StoredDeletion {
    #[must_use]
    pub fn id(&self) -> i64 {
        match self {
            Self::Pending(deletion) => deletion.id,
            Self::Malformed { id, .. } => *id,
        }
    }
}
