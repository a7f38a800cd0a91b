//! Text protocol of the administrative bridge endpoint. Every frame is a JSON
//! array whose first element names the command, followed by positional
//! arguments.

use crate::text::ChatMessage;
use plaza_logger::{log, LogSeverity::*};
use serde_json::{json, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Subscription {
    Chat,
    Pixels,
    Online,
}

impl Subscription {
    fn parse(topic: &str) -> Option<Self> {
        match topic {
            "chat" => Some(Subscription::Chat),
            "pxl" => Some(Subscription::Pixels),
            "online" => Some(Subscription::Online),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeCommand {
    Subscribe(Subscription),
    /// Placement on canvas 0 on behalf of an external user. Without both id
    /// and ip the pixel is written directly.
    SetPixel {
        external_id: Option<String>,
        ip: Option<String>,
        x: i32,
        y: i32,
        color: i64,
    },
    Login {
        external_id: String,
        name: String,
        ip: Option<String>,
    },
    Logout {
        external_id: String,
    },
    /// Full presence list as `(external_id, name)` pairs.
    UserList(Vec<(String, String)>),
    /// Chat written by an external user, relayed under their name.
    ExternalChat {
        name: String,
        message: String,
    },
    Chat(ChatMessage),
    LinkAccount {
        external_id: String,
        external_name: String,
        account: String,
    },
}

fn string_at(args: &[Value], index: usize) -> Option<String> {
    args.get(index)?.as_str().map(str::to_owned)
}

fn optional_string_at(args: &[Value], index: usize) -> Option<Option<String>> {
    match args.get(index) {
        None | Some(Value::Null) => Some(None),
        Some(Value::String(s)) if s.is_empty() => Some(None),
        Some(Value::String(s)) => Some(Some(s.clone())),
        Some(_) => None,
    }
}

fn int_at(args: &[Value], index: usize) -> Option<i64> {
    let value = args.get(index)?;
    value
        .as_i64()
        .or_else(|| value.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
}

fn parse_user_list(args: &[Value]) -> Option<Vec<(String, String)>> {
    let entries = args.first()?.as_array()?;
    if !entries.first().is_some_and(Value::is_array) {
        return None;
    }
    entries
        .iter()
        .map(|entry| {
            let pair = entry.as_array()?;
            Some((string_at(pair, 0)?, string_at(pair, 1)?))
        })
        .collect()
}

impl BridgeCommand {
    /// Malformed frames are logged and yield `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        let command = Self::parse_value(raw);
        if command.is_none() {
            log(format!("Got undecipherable bridge message {:?}", raw), Warning);
        }
        command
    }

    fn parse_value(raw: &str) -> Option<Self> {
        let value: Value = serde_json::from_str(raw).ok()?;
        let (name, args) = value.as_array()?.split_first()?;
        let command = match name.as_str()? {
            "sub" => BridgeCommand::Subscribe(Subscription::parse(args.first()?.as_str()?)?),
            "setpxl" => {
                let x = i32::try_from(int_at(args, 2)?).ok()?;
                let y = i32::try_from(int_at(args, 3)?).ok()?;
                BridgeCommand::SetPixel {
                    external_id: optional_string_at(args, 0)?,
                    ip: optional_string_at(args, 1)?,
                    x,
                    y,
                    color: int_at(args, 4)?,
                }
            }
            "login" => BridgeCommand::Login {
                external_id: string_at(args, 0)?,
                name: string_at(args, 1)?,
                ip: optional_string_at(args, 2)?,
            },
            "logout" => BridgeCommand::Logout {
                external_id: string_at(args, 0)?,
            },
            "userlst" => BridgeCommand::UserList(parse_user_list(args)?),
            "mcchat" => BridgeCommand::ExternalChat {
                name: string_at(args, 0)?,
                message: string_at(args, 1)?,
            },
            "chat" => BridgeCommand::Chat(ChatMessage {
                name: string_at(args, 0)?,
                text: string_at(args, 1)?,
                country: string_at(args, 2)?,
                channel_id: u32::try_from(int_at(args, 3)?).ok()?,
            }),
            "linkacc" => BridgeCommand::LinkAccount {
                external_id: string_at(args, 0)?,
                external_name: string_at(args, 1)?,
                account: string_at(args, 2)?,
            },
            _ => return None,
        };
        Some(command)
    }
}

/// Frames sent from the server to bridge sessions.
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeReply {
    Chat(ChatMessage),
    PixelResult {
        id: Option<String>,
        error: Option<String>,
        success: bool,
        wait_seconds: f64,
        cool_down_seconds: Option<f64>,
    },
    Me {
        id: String,
        wait_seconds: Option<f64>,
        name: Option<String>,
    },
    LinkResult {
        id: String,
        error: Option<String>,
    },
}

impl BridgeReply {
    pub fn encode(&self) -> String {
        let value = match self {
            BridgeReply::Chat(chat) => {
                json!(["msg", chat.name, chat.text, chat.country, chat.channel_id])
            }
            BridgeReply::PixelResult {
                id,
                error,
                success,
                wait_seconds,
                cool_down_seconds,
            } => json!([
                "retpxl",
                id,
                error,
                success,
                seconds(*wait_seconds),
                cool_down_seconds.map(seconds)
            ]),
            BridgeReply::Me {
                id,
                wait_seconds,
                name,
            } => json!(["mcme", id, wait_seconds.map(seconds), name]),
            BridgeReply::LinkResult { id, error } => json!(["linkret", id, error]),
        };
        value.to_string()
    }
}

/// Whole seconds go out as integers, the way bridge consumers expect them.
fn seconds(value: f64) -> Value {
    if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        Value::from(value as i64)
    } else {
        Value::from(value)
    }
}
