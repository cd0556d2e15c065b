//! Push channel wire format: Socket.IO v5 packets carried inside Engine.IO v4
//! packets, one packet per WebSocket text frame.
//!
//! Only the subset the chat client needs is modelled. Binary packets are
//! rejected.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::{DEFAULT_NAMESPACE, EVENT_RECEIVE_MESSAGE};
use crate::error::ProtocolError;
use crate::types::Message;

/// Handshake payload of the Engine.IO `open` packet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenInfo {
    pub sid: String,
    #[serde(default)]
    pub upgrades: Vec<String>,
    pub ping_interval: u64,
    pub ping_timeout: u64,
    #[serde(default)]
    pub max_payload: u64,
}

/// Transport-level packet.
#[derive(Debug, Clone, PartialEq)]
pub enum EnginePacket {
    Open(OpenInfo),
    Close,
    Ping,
    Pong,
    Message(SocketPacket),
    Upgrade,
    Noop,
}

/// Application-level packet carried by [`EnginePacket::Message`].
#[derive(Debug, Clone, PartialEq)]
pub enum SocketPacket {
    Connect {
        namespace: String,
        data: Option<Value>,
    },
    Disconnect {
        namespace: String,
    },
    Event {
        namespace: String,
        ack_id: Option<u64>,
        name: String,
        args: Vec<Value>,
    },
    Ack {
        namespace: String,
        ack_id: u64,
        args: Vec<Value>,
    },
    ConnectError {
        namespace: String,
        data: Option<Value>,
    },
}

impl EnginePacket {
    /// Connect request for the default namespace, optionally with an auth payload.
    pub fn connect(auth: Option<Value>) -> Self {
        Self::Message(SocketPacket::Connect {
            namespace: DEFAULT_NAMESPACE.to_string(),
            data: auth,
        })
    }

    /// Event on the default namespace with a single argument.
    pub fn event(name: &str, payload: Value) -> Self {
        Self::Message(SocketPacket::Event {
            namespace: DEFAULT_NAMESPACE.to_string(),
            ack_id: None,
            name: name.to_string(),
            args: vec![payload],
        })
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(match self {
            Self::Open(info) => format!("0{}", serde_json::to_string(info)?),
            Self::Close => "1".to_string(),
            Self::Ping => "2".to_string(),
            Self::Pong => "3".to_string(),
            Self::Message(packet) => format!("4{}", packet.encode()?),
            Self::Upgrade => "5".to_string(),
            Self::Noop => "6".to_string(),
        })
    }

    pub fn decode(frame: &str) -> Result<Self, ProtocolError> {
        let kind = frame.chars().next().ok_or(ProtocolError::Empty)?;
        let body = &frame[kind.len_utf8()..];

        match kind {
            '0' => Ok(Self::Open(serde_json::from_str(body)?)),
            '1' => Ok(Self::Close),
            // Probe pings carry a payload; it is not echoed back by this client.
            '2' => Ok(Self::Ping),
            '3' => Ok(Self::Pong),
            '4' => Ok(Self::Message(SocketPacket::decode(body)?)),
            '5' => Ok(Self::Upgrade),
            '6' => Ok(Self::Noop),
            other => Err(ProtocolError::UnknownEnginePacket(other)),
        }
    }
}

impl SocketPacket {
    pub fn encode(&self) -> Result<String, ProtocolError> {
        let mut out = String::new();
        match self {
            Self::Connect { namespace, data } => {
                out.push('0');
                push_namespace(&mut out, namespace, data.is_some());
                if let Some(data) = data {
                    out.push_str(&serde_json::to_string(data)?);
                }
            }
            Self::Disconnect { namespace } => {
                out.push('1');
                push_namespace(&mut out, namespace, false);
            }
            Self::Event {
                namespace,
                ack_id,
                name,
                args,
            } => {
                out.push('2');
                push_namespace(&mut out, namespace, true);
                if let Some(id) = ack_id {
                    out.push_str(&id.to_string());
                }
                let mut items = Vec::with_capacity(args.len() + 1);
                items.push(Value::String(name.clone()));
                items.extend(args.iter().cloned());
                out.push_str(&serde_json::to_string(&items)?);
            }
            Self::Ack {
                namespace,
                ack_id,
                args,
            } => {
                out.push('3');
                push_namespace(&mut out, namespace, true);
                out.push_str(&ack_id.to_string());
                out.push_str(&serde_json::to_string(args)?);
            }
            Self::ConnectError { namespace, data } => {
                out.push('4');
                push_namespace(&mut out, namespace, data.is_some());
                if let Some(data) = data {
                    out.push_str(&serde_json::to_string(data)?);
                }
            }
        }
        Ok(out)
    }

    pub fn decode(body: &str) -> Result<Self, ProtocolError> {
        let kind = body.chars().next().ok_or(ProtocolError::Empty)?;
        if kind == '5' || kind == '6' {
            return Err(ProtocolError::BinaryUnsupported);
        }
        let mut rest = &body[kind.len_utf8()..];

        let namespace = if rest.starts_with('/') {
            match rest.find(',') {
                Some(i) => {
                    let ns = &rest[..i];
                    rest = &rest[i + 1..];
                    ns.to_string()
                }
                None => {
                    let ns = rest;
                    rest = "";
                    ns.to_string()
                }
            }
        } else {
            DEFAULT_NAMESPACE.to_string()
        };

        let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
        let ack_id = if digits > 0 {
            Some(
                rest[..digits]
                    .parse::<u64>()
                    .map_err(|e| ProtocolError::Malformed(format!("ack id: {e}")))?,
            )
        } else {
            None
        };
        rest = &rest[digits..];

        let data: Option<Value> = if rest.is_empty() {
            None
        } else {
            Some(serde_json::from_str(rest)?)
        };

        match kind {
            '0' => Ok(Self::Connect { namespace, data }),
            '1' => Ok(Self::Disconnect { namespace }),
            '2' => {
                let mut items = match data {
                    Some(Value::Array(items)) if !items.is_empty() => items,
                    _ => {
                        return Err(ProtocolError::Malformed(
                            "event payload must be a non-empty array".into(),
                        ))
                    }
                };
                let name = match items.remove(0) {
                    Value::String(name) => name,
                    other => {
                        return Err(ProtocolError::Malformed(format!(
                            "event name must be a string, got {other}"
                        )))
                    }
                };
                Ok(Self::Event {
                    namespace,
                    ack_id,
                    name,
                    args: items,
                })
            }
            '3' => {
                let ack_id = ack_id
                    .ok_or_else(|| ProtocolError::Malformed("ack without id".into()))?;
                let args = match data {
                    Some(Value::Array(items)) => items,
                    None => Vec::new(),
                    Some(other) => vec![other],
                };
                Ok(Self::Ack {
                    namespace,
                    ack_id,
                    args,
                })
            }
            '4' => Ok(Self::ConnectError { namespace, data }),
            other => Err(ProtocolError::UnknownSocketPacket(other)),
        }
    }
}

/// Non-default namespaces are written as `/ns,` before the payload.
fn push_namespace(out: &mut String, namespace: &str, has_payload: bool) {
    if namespace != DEFAULT_NAMESPACE {
        out.push_str(namespace);
        if has_payload {
            out.push(',');
        }
    }
}

/// Server-originated events the chat client understands.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    /// A fully-formed message with a resolved sender.
    ReceiveMessage(Message),
    Other { name: String, args: Vec<Value> },
}

impl ServerEvent {
    pub fn from_event(name: String, mut args: Vec<Value>) -> Result<Self, ProtocolError> {
        if name == EVENT_RECEIVE_MESSAGE {
            if args.is_empty() {
                return Err(ProtocolError::Malformed(format!("{name} without payload")));
            }
            let message: Message = serde_json::from_value(args.remove(0))?;
            return Ok(Self::ReceiveMessage(message));
        }
        Ok(Self::Other { name, args })
    }
}
