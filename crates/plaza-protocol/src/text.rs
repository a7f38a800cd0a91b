//! JSON text frames of the client endpoint.

use plaza_logger::{log, LogSeverity::*};
use serde_json::Value;

/// A relayed chat line, `[name, text, country, channelId]` on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub name: String,
    pub text: String,
    pub country: String,
    pub channel_id: u32,
}

impl ChatMessage {
    pub fn new(name: &str, text: &str, country: &str, channel_id: u32) -> Self {
        Self {
            name: name.to_owned(),
            text: text.to_owned(),
            country: country.to_owned(),
            channel_id,
        }
    }
}

/// Text frames sent from server to client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerText {
    /// Display name assigned to the session, pushed as a bare JSON string.
    Name(String),
    Chat(ChatMessage),
}

impl ServerText {
    pub fn encode(&self) -> String {
        let value = match self {
            ServerText::Name(name) => Value::from(name.as_str()),
            ServerText::Chat(chat) => serde_json::json!([
                chat.name,
                chat.text,
                chat.country,
                chat.channel_id
            ]),
        };
        value.to_string()
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let value: Value = match serde_json::from_str(raw) {
            Ok(value) => value,
            Err(e) => {
                log(format!("Undecipherable text frame {:?}: {}", raw, e), Warning);
                return None;
            }
        };
        match value {
            Value::String(name) => Some(ServerText::Name(name)),
            Value::Array(fields) if fields.len() == 4 => {
                match serde_json::from_value::<(String, String, String, u32)>(Value::Array(fields)) {
                    Ok((name, text, country, channel_id)) => Some(ServerText::Chat(ChatMessage {
                        name,
                        text,
                        country,
                        channel_id,
                    })),
                    Err(e) => {
                        log(format!("Malformed chat frame {:?}: {}", raw, e), Warning);
                        None
                    }
                }
            }
            _ => {
                log(format!("Unexpected text frame {:?}", raw), Warning);
                None
            }
        }
    }
}

/// Chat line sent by a client, `[message, channelId]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatRequest {
    pub message: String,
    pub channel_id: u32,
}

impl ChatRequest {
    pub fn new(message: &str, channel_id: u32) -> Self {
        Self {
            message: message.to_owned(),
            channel_id,
        }
    }

    pub fn encode(&self) -> String {
        serde_json::json!([self.message, self.channel_id]).to_string()
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match serde_json::from_str::<(String, u32)>(raw) {
            Ok((message, channel_id)) => Some(Self {
                message,
                channel_id,
            }),
            Err(e) => {
                log(format!("Malformed chat request {:?}: {}", raw, e), Warning);
                None
            }
        }
    }
}
