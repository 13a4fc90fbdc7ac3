use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// The only event type the bot acts on
pub const NORMAL_MESSAGE_EVENT: &str = "message.receive.normal";

/// Top-level webhook body
#[derive(Debug, Clone, Deserialize)]
#[allow(dead_code)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    #[serde(default)]
    pub version: Option<String>,
    pub header: Header,
    #[serde(default)]
    pub event: Value,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(dead_code)]
pub struct Header {
    #[serde(default)]
    pub event_id: Option<String>,
    pub event_type: String,
    #[serde(default)]
    pub event_time: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageEvent {
    sender: Sender,
    chat: Chat,
    message: EventMessage,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Sender {
    #[serde(deserialize_with = "id_string")]
    sender_id: String,
    #[serde(default)]
    sender_nickname: String,
    #[serde(default)]
    sender_user_level: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Chat {
    #[serde(deserialize_with = "id_string")]
    chat_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventMessage {
    #[serde(deserialize_with = "id_string")]
    msg_id: String,
    #[serde(default)]
    parent_id: Option<String>,
    #[serde(default)]
    send_time: Option<i64>,
    content_type: String,
    #[serde(default)]
    content: Value,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct MessageContent {
    #[serde(default)]
    text: Option<String>,
    #[serde(default, deserialize_with = "id_list")]
    at: Vec<String>,
}

/// Platform role of the sender as reported by the event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenderLevel {
    Owner,
    Administrator,
    Member,
}

impl SenderLevel {
    pub fn parse(level: &str) -> Self {
        match level {
            "owner" => SenderLevel::Owner,
            "administrator" => SenderLevel::Administrator,
            _ => SenderLevel::Member,
        }
    }
}

/// A normal message event, flattened for the moderation core
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub chat_id: String,
    pub msg_id: String,
    /// Set when the message quotes another one
    pub parent_id: Option<String>,
    pub sender_id: String,
    pub sender_name: String,
    pub sender_level: SenderLevel,
    pub content_type: String,
    pub text: String,
    /// Mentioned user ids in the order the platform sent them
    pub mentions: Vec<String>,
    /// `content` object serialized as JSON text
    pub raw_content: String,
    pub send_time: Option<i64>,
}

impl InboundMessage {
    pub fn is_text(&self) -> bool {
        self.content_type == "text"
    }
}

impl Envelope {
    pub fn from_value(payload: Value) -> Result<Self> {
        serde_json::from_value(payload).context("Webhook body is not an event envelope")
    }

    pub fn is_normal_message(&self) -> bool {
        self.header.event_type == NORMAL_MESSAGE_EVENT
    }

    /// Decode the `event` object of a normal message envelope
    pub fn message(&self) -> Result<InboundMessage> {
        let event: MessageEvent = serde_json::from_value(self.event.clone())
            .context("Malformed message event")?;

        let content: MessageContent = match &event.message.content {
            Value::Object(_) => serde_json::from_value(event.message.content.clone())
                .context("Malformed message content")?,
            _ => MessageContent::default(),
        };
        let raw_content = serde_json::to_string(&event.message.content)
            .context("Failed to serialize message content")?;

        Ok(InboundMessage {
            chat_id: event.chat.chat_id,
            msg_id: event.message.msg_id,
            parent_id: event.message.parent_id.filter(|id| !id.is_empty()),
            sender_id: event.sender.sender_id,
            sender_name: event.sender.sender_nickname,
            sender_level: SenderLevel::parse(&event.sender.sender_user_level),
            content_type: event.message.content_type,
            text: content.text.unwrap_or_default(),
            mentions: content.at,
            raw_content,
            send_time: event.message.send_time,
        })
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Number(i64),
}

impl From<RawId> for String {
    fn from(raw: RawId) -> Self {
        match raw {
            RawId::Text(s) => s,
            RawId::Number(n) => n.to_string(),
        }
    }
}

// Ids arrive as strings or numbers depending on the client that produced the event.
fn id_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    RawId::deserialize(deserializer).map(String::from)
}

fn id_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<Vec<RawId>> = Option::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .map(String::from)
        .collect())
}

#[cfg(test)]
pub(crate) fn sample_payload(text: &str, level: &str, at: &[&str]) -> Value {
    serde_json::json!({
        "version": "1.0",
        "header": {
            "eventId": "evt-1",
            "eventType": NORMAL_MESSAGE_EVENT,
            "eventTime": 1_700_000_000_000i64
        },
        "event": {
            "sender": {
                "senderId": "sender-1",
                "senderType": "user",
                "senderUserLevel": level,
                "senderNickname": "Boss"
            },
            "chat": { "chatId": "chat-1", "chatType": "group" },
            "message": {
                "msgId": "msg-1",
                "sendTime": 1_700_000_000_000i64,
                "chatId": "chat-1",
                "chatType": "group",
                "contentType": "text",
                "content": { "text": text, "at": at }
            }
        }
    })
}
