//! Engine.IO v4 / Socket.IO v5 text packet codec.
//!
//! Only the subset a WebSocket-only client needs: no polling transport, no
//! binary attachments.

use serde::Deserialize;
use serde_json::Value;
use url::Url;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ProtocolError {
  #[error("empty packet")]
  Empty,
  #[error("unknown packet type '{0}'")]
  UnknownType(char),
  #[error("invalid handshake: {0}")]
  Handshake(String),
  #[error("invalid event payload: {0}")]
  Payload(String),
  #[error("invalid socket url: {0}")]
  Url(#[from] url::ParseError),
  #[error("unsupported socket url scheme '{0}'")]
  Scheme(String),
}

/// Server handshake carried by the engine `open` packet
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
  pub sid: String,
  #[serde(default)]
  pub upgrades: Vec<String>,
  pub ping_interval: u64,
  pub ping_timeout: u64,
  #[serde(default)]
  pub max_payload: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EnginePacket {
  Open(Handshake),
  Close,
  Ping(String),
  Pong(String),
  Message(String),
  Upgrade,
  Noop,
}

impl EnginePacket {
  pub fn decode(text: &str) -> Result<Self, ProtocolError> {
    let mut chars = text.chars();
    let kind = chars.next().ok_or(ProtocolError::Empty)?;
    let body = chars.as_str();
    match kind {
      '0' => serde_json::from_str(body)
        .map(EnginePacket::Open)
        .map_err(|e| ProtocolError::Handshake(e.to_string())),
      '1' => Ok(EnginePacket::Close),
      '2' => Ok(EnginePacket::Ping(body.to_string())),
      '3' => Ok(EnginePacket::Pong(body.to_string())),
      '4' => Ok(EnginePacket::Message(body.to_string())),
      '5' => Ok(EnginePacket::Upgrade),
      '6' => Ok(EnginePacket::Noop),
      other => Err(ProtocolError::UnknownType(other)),
    }
  }

  pub fn encode(&self) -> String {
    match self {
      // Servers send `open`; a client never encodes one
      EnginePacket::Open(_) => "0".to_string(),
      EnginePacket::Close => "1".to_string(),
      EnginePacket::Ping(data) => format!("2{}", data),
      EnginePacket::Pong(data) => format!("3{}", data),
      EnginePacket::Message(data) => format!("4{}", data),
      EnginePacket::Upgrade => "5".to_string(),
      EnginePacket::Noop => "6".to_string(),
    }
  }
}

/// Socket.IO packet carried inside an engine `message`
#[derive(Debug, Clone, PartialEq)]
pub enum SocketPacket {
  Connect(Option<Value>),
  Disconnect,
  /// `name` plus the first argument (`Null` when none was sent)
  Event { name: String, data: Value },
  Ack { id: u64, data: Value },
  ConnectError(Value),
}

impl SocketPacket {
  pub fn decode(text: &str) -> Result<Self, ProtocolError> {
    let mut chars = text.chars();
    let kind = chars.next().ok_or(ProtocolError::Empty)?;
    let mut rest = chars.as_str();

    // Optional namespace, terminated by a comma
    if rest.starts_with('/') {
      rest = rest.split_once(',').map(|(_, tail)| tail).unwrap_or("");
    }

    // Optional ack id
    let digits = rest.chars().take_while(|c| c.is_ascii_digit()).count();
    let (ack, body) = rest.split_at(digits);
    let ack: Option<u64> = ack.parse().ok();

    let json = || -> Result<Value, ProtocolError> {
      if body.is_empty() {
        Ok(Value::Null)
      } else {
        serde_json::from_str(body).map_err(|e| ProtocolError::Payload(e.to_string()))
      }
    };

    match kind {
      '0' => {
        let data = json()?;
        Ok(SocketPacket::Connect((!data.is_null()).then_some(data)))
      }
      '1' => Ok(SocketPacket::Disconnect),
      '2' => {
        let Value::Array(mut args) = json()? else {
          return Err(ProtocolError::Payload("event is not an array".to_string()));
        };
        if args.is_empty() {
          return Err(ProtocolError::Payload("event without a name".to_string()));
        }
        let Value::String(name) = args.remove(0) else {
          return Err(ProtocolError::Payload("event name is not a string".to_string()));
        };
        let data = if args.is_empty() { Value::Null } else { args.remove(0) };
        Ok(SocketPacket::Event { name, data })
      }
      '3' => {
        let data = match json()? {
          Value::Array(mut args) if !args.is_empty() => args.remove(0),
          _ => Value::Null,
        };
        Ok(SocketPacket::Ack {
          id: ack.unwrap_or_default(),
          data,
        })
      }
      '4' => Ok(SocketPacket::ConnectError(json()?)),
      other => Err(ProtocolError::UnknownType(other)),
    }
  }

  /// Encode for the default namespace, without the engine prefix.
  pub fn encode(&self) -> String {
    match self {
      SocketPacket::Connect(None) => "0".to_string(),
      SocketPacket::Connect(Some(auth)) => format!("0{}", auth),
      SocketPacket::Disconnect => "1".to_string(),
      SocketPacket::Event { name, data } => {
        let args = if data.is_null() {
          Value::Array(vec![Value::String(name.clone())])
        } else {
          Value::Array(vec![Value::String(name.clone()), data.clone()])
        };
        format!("2{}", args)
      }
      SocketPacket::Ack { id, data } => format!("3{}{}", id, Value::Array(vec![data.clone()])),
      SocketPacket::ConnectError(data) => format!("4{}", data),
    }
  }

  /// Wrap into an engine message frame.
  pub fn to_frame(&self) -> String {
    EnginePacket::Message(self.encode()).encode()
  }
}

/// Build the WebSocket URL for a Socket.IO server base URL.
pub fn websocket_url(base: &str) -> Result<Url, ProtocolError> {
  let mut url = Url::parse(base)?;
  let scheme = match url.scheme() {
    "https" | "wss" => "wss",
    "http" | "ws" => "ws",
    other => return Err(ProtocolError::Scheme(other.to_string())),
  };
  url
    .set_scheme(scheme)
    .map_err(|_| ProtocolError::Scheme(scheme.to_string()))?;
  url.set_path("/socket.io/");
  url.set_query(Some("EIO=4&transport=websocket"));
  Ok(url)
}
