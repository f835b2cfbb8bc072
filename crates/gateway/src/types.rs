use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use super::ids::{ConversationId, MessageId};

/// Speaker of one message. The server stores these as lowercase strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// Conversation summary as listed by the server.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    #[serde(default)]
    pub title: String,
    // The create reply only carries `{id, title}`.
    #[serde(default)]
    pub message_count: u64,
    #[serde(default)]
    pub context_start_message_id: Option<MessageId>,
}

impl Conversation {
    pub fn new(id: ConversationId, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            message_count: 0,
            context_start_message_id: None,
        }
    }

    pub fn with_message_count(mut self, message_count: u64) -> Self {
        self.message_count = message_count;
        self
    }

    pub fn with_context_start(mut self, message_id: MessageId) -> Self {
        self.context_start_message_id = Some(message_id);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub role: Role,
    #[serde(default)]
    pub content: String,
    #[serde(default, deserialize_with = "deserialize_server_time")]
    pub time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub model: Option<String>,
}

impl Message {
    pub fn user(id: MessageId, content: impl Into<String>, time: Option<DateTime<Utc>>) -> Self {
        Self {
            id,
            role: Role::User,
            content: content.into(),
            time,
            model: None,
        }
    }

    pub fn assistant(
        id: MessageId,
        content: impl Into<String>,
        time: Option<DateTime<Utc>>,
        model: Option<String>,
    ) -> Self {
        Self {
            id,
            role: Role::Assistant,
            content: content.into(),
            time,
            model,
        }
    }

    /// Drops the model tag from user turns; the server stamps every row with one.
    pub fn normalized(mut self) -> Self {
        if self.role == Role::User {
            self.model = None;
        }
        self
    }
}

/// Body of `POST /chat`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SendRequest {
    pub message: String,
    pub model: String,
    pub conversation_id: ConversationId,
}

/// Successful `POST /chat` reply: ids of both persisted turns and the assistant text.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SendReply {
    pub id: MessageId,
    pub user_id: MessageId,
    pub response: String,
    #[serde(default, deserialize_with = "deserialize_server_time")]
    pub time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RegenerateReply {
    pub response: String,
    #[serde(default, deserialize_with = "deserialize_server_time")]
    pub time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EditedUserMessage {
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RegeneratedAssistant {
    pub id: MessageId,
    pub response: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EditReply {
    pub user: EditedUserMessage,
    /// Present when the edit invalidated and regenerated the following reply.
    #[serde(default)]
    pub assistant: Option<RegeneratedAssistant>,
}

/// Accepts RFC 3339 and SQLite `YYYY-MM-DD HH:MM:SS` (UTC) timestamps.
pub fn parse_server_time(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }

    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

// A bad timestamp should not make a whole message list undecodable.
fn deserialize_server_time<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(raw)) => parse_server_time(&raw),
        _ => None,
    })
}
