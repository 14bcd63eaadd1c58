//! Socket.IO client over a WebSocket, with reconnection.

use futures::{SinkExt, StreamExt};
use serde_json::Value;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use url::Url;

use super::events::PushEvent;
use super::protocol::{websocket_url, EnginePacket, Handshake, ProtocolError, SocketPacket};
use crate::config::SocketConfig;
use crate::event::Event;

type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connection state changes reported to the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionStatus {
  Connected,
  Disconnected(String),
  Reconnecting { attempt: u32, delay: Duration },
  /// Reconnection attempts are exhausted; the client has stopped
  ReconnectFailed,
}

#[derive(Debug, thiserror::Error)]
pub enum PushError {
  #[error("websocket error: {0}")]
  WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
  #[error("protocol error: {0}")]
  Protocol(#[from] ProtocolError),
  #[error("connection timed out")]
  Timeout,
  #[error("connection closed during handshake")]
  Closed,
  #[error("connection refused by server: {0}")]
  Rejected(Value),
  #[error("unexpected packet during handshake: {0}")]
  Unexpected(String),
}

/// Socket.IO client configuration and entry point.
#[derive(Debug, Clone)]
pub struct PushClient {
  url: Url,
  config: SocketConfig,
}

/// Handle to a running push client. Dropping it stops the client.
pub struct PushHandle {
  emits: mpsc::UnboundedSender<(String, Value)>,
  task: JoinHandle<()>,
}

impl PushHandle {
  /// Emit an event to the server. Silently dropped when the client stopped.
  pub fn emit(&self, name: &str, data: Value) {
    if self.emits.send((name.to_string(), data)).is_err() {
      tracing::debug!(event = name, "push client stopped, emit dropped");
    }
  }
}

impl Drop for PushHandle {
  fn drop(&mut self) {
    self.task.abort();
  }
}

/// Delay before the next connection attempt.
///
/// `failures` counts consecutive failed attempts; the delay doubles from
/// the configured base up to the configured maximum.
pub fn reconnect_delay(config: &SocketConfig, failures: u32) -> Duration {
  let base = config.reconnection_delay();
  let factor = 2u32.saturating_pow(failures.saturating_sub(1));
  base.saturating_mul(factor).min(config.reconnection_delay_max())
}

impl PushClient {
  pub fn new(socket_url: &str, config: SocketConfig) -> Result<Self, PushError> {
    Ok(Self {
      url: websocket_url(socket_url)?,
      config,
    })
  }

  pub fn url(&self) -> &Url {
    &self.url
  }

  /// Start the client. Status changes and push events go to `tx`.
  pub fn spawn(self, tx: mpsc::UnboundedSender<Event>) -> PushHandle {
    let (emits_tx, emits_rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(self.run(tx, emits_rx));
    PushHandle {
      emits: emits_tx,
      task,
    }
  }

  async fn run(self, tx: mpsc::UnboundedSender<Event>, mut emits: mpsc::UnboundedReceiver<(String, Value)>) {
    let mut failures: u32 = 0;

    loop {
      match self.connect().await {
        Ok((ws, open)) => {
          failures = 0;
          if tx.send(Event::Connection(ConnectionStatus::Connected)).is_err() {
            return;
          }
          tracing::info!(url = %self.url, "push channel connected");

          let reason = serve(ws, heartbeat(&open), &tx, &mut emits).await;
          tracing::info!(%reason, "push channel disconnected");
          if tx
            .send(Event::Connection(ConnectionStatus::Disconnected(reason)))
            .is_err()
          {
            return;
          }
        }
        Err(e) => {
          failures += 1;
          tracing::warn!(error = %e, failures, "push connection failed");
          if tx
            .send(Event::Connection(ConnectionStatus::Disconnected(e.to_string())))
            .is_err()
          {
            return;
          }
        }
      }

      let exhausted = self
        .config
        .reconnection_attempts
        .is_some_and(|max| failures >= max);
      if !self.config.reconnection || exhausted {
        tracing::error!(failures, "giving up on push channel");
        let _ = tx.send(Event::Connection(ConnectionStatus::ReconnectFailed));
        return;
      }

      let delay = reconnect_delay(&self.config, failures);
      let attempt = failures + 1;
      if tx
        .send(Event::Connection(ConnectionStatus::Reconnecting { attempt, delay }))
        .is_err()
      {
        return;
      }
      tokio::time::sleep(delay).await;
    }
  }

  /// Open the WebSocket and complete the Engine.IO and Socket.IO handshakes.
  async fn connect(&self) -> Result<(Ws, Handshake), PushError> {
    let timeout = self.config.connect_timeout();
    tokio::time::timeout(timeout, self.handshake())
      .await
      .map_err(|_| PushError::Timeout)?
  }

  async fn handshake(&self) -> Result<(Ws, Handshake), PushError> {
    let (mut ws, _) = connect_async(self.url.as_str()).await?;

    let open: Handshake = match next_text(&mut ws).await? {
      EnginePacket::Open(handshake) => handshake,
      other => return Err(PushError::Unexpected(other.encode())),
    };
    tracing::debug!(sid = %open.sid, ping_interval = open.ping_interval, "engine open");

    ws.send(Message::Text(SocketPacket::Connect(None).to_frame()))
      .await?;

    loop {
      match next_text(&mut ws).await? {
        EnginePacket::Ping(data) => {
          ws.send(Message::Text(EnginePacket::Pong(data).encode()))
            .await?;
        }
        EnginePacket::Message(inner) => match SocketPacket::decode(&inner)? {
          SocketPacket::Connect(_) => return Ok((ws, open)),
          SocketPacket::ConnectError(data) => return Err(PushError::Rejected(data)),
          other => return Err(PushError::Unexpected(other.encode())),
        },
        EnginePacket::Close => return Err(PushError::Closed),
        _ => {}
      }
    }
  }
}

/// Read the next text frame as an engine packet.
async fn next_text(ws: &mut Ws) -> Result<EnginePacket, PushError> {
  loop {
    match ws.next().await {
      Some(Ok(Message::Text(text))) => return Ok(EnginePacket::decode(&text)?),
      Some(Ok(Message::Close(_))) | None => return Err(PushError::Closed),
      Some(Ok(_)) => continue,
      Some(Err(e)) => return Err(e.into()),
    }
  }
}

/// Longest silence tolerated from the server before the session is dead.
fn heartbeat(open: &Handshake) -> Duration {
  Duration::from_millis(open.ping_interval.saturating_add(open.ping_timeout))
}

/// Pump an established session until it ends. Returns the disconnect reason.
///
/// The server pings every `pingInterval`; any inbound frame resets the
/// `heartbeat` deadline.
async fn serve(
  ws: Ws,
  heartbeat: Duration,
  tx: &mpsc::UnboundedSender<Event>,
  emits: &mut mpsc::UnboundedReceiver<(String, Value)>,
) -> String {
  let (mut sink, mut stream) = ws.split();

  // Ask for the initial snapshot once the namespace is joined
  let initial = SocketPacket::Event {
    name: "initialData".to_string(),
    data: Value::Null,
  };
  if let Err(e) = sink.send(Message::Text(initial.to_frame())).await {
    return format!("transport error: {}", e);
  }

  let deadline = tokio::time::sleep(heartbeat);
  tokio::pin!(deadline);

  loop {
    tokio::select! {
      _ = &mut deadline => {
        tracing::warn!(?heartbeat, "no packet from server within heartbeat");
        return "ping timeout".to_string();
      }
      frame = stream.next() => {
        deadline.as_mut().reset(tokio::time::Instant::now() + heartbeat);
        let text = match frame {
          Some(Ok(Message::Text(text))) => text,
          Some(Ok(Message::Close(_))) | None => return "transport close".to_string(),
          Some(Ok(_)) => continue,
          Some(Err(e)) => return format!("transport error: {}", e),
        };

        match EnginePacket::decode(&text) {
          Ok(EnginePacket::Ping(data)) => {
            if let Err(e) = sink.send(Message::Text(EnginePacket::Pong(data).encode())).await {
              return format!("transport error: {}", e);
            }
          }
          Ok(EnginePacket::Close) => return "server close".to_string(),
          Ok(EnginePacket::Message(inner)) => match SocketPacket::decode(&inner) {
            Ok(SocketPacket::Event { name, data }) => dispatch(tx, &name, data),
            Ok(SocketPacket::Disconnect) => return "io server disconnect".to_string(),
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "dropping malformed socket packet"),
          },
          Ok(_) => {}
          Err(e) => tracing::warn!(error = %e, "dropping malformed engine packet"),
        }

        if tx.is_closed() {
          let _ = sink.send(Message::Text(SocketPacket::Disconnect.to_frame())).await;
          return "io client disconnect".to_string();
        }
      }
      emit = emits.recv() => {
        let Some((name, data)) = emit else {
          let _ = sink.send(Message::Text(SocketPacket::Disconnect.to_frame())).await;
          return "io client disconnect".to_string();
        };
        tracing::debug!(event = %name, "emitting");
        let frame = SocketPacket::Event { name, data }.to_frame();
        if let Err(e) = sink.send(Message::Text(frame)).await {
          return format!("transport error: {}", e);
        }
      }
    }
  }
}

fn dispatch(tx: &mpsc::UnboundedSender<Event>, name: &str, data: Value) {
  match PushEvent::decode(name, data) {
    Ok(Some(event)) => {
      tracing::debug!(event = name, "push event");
      let _ = tx.send(Event::Push(event));
    }
    Ok(None) => tracing::debug!(event = name, "ignoring unknown push event"),
    Err(e) => tracing::warn!(error = %e, "dropping push event"),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tokio::net::TcpListener;
  use tokio_tungstenite::accept_async;

  const OPEN: &str = r#"0{"sid":"s1","upgrades":[],"pingInterval":25000,"pingTimeout":20000}"#;

  fn fast_config(attempts: Option<u32>) -> SocketConfig {
    SocketConfig {
      reconnection: true,
      reconnection_attempts: attempts,
      reconnection_delay_ms: 10,
      reconnection_delay_max_ms: 20,
      connect_timeout_ms: 1000,
    }
  }

  async fn recv(rx: &mut mpsc::UnboundedReceiver<Event>) -> Event {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
      .await
      .expect("timed out waiting for event")
      .expect("channel closed")
  }

  async fn expect_text(ws: &mut WebSocketStream<TcpStream>) -> String {
    loop {
      match ws.next().await {
        Some(Ok(Message::Text(text))) => return text,
        Some(Ok(_)) => continue,
        other => panic!("expected text frame, got {:?}", other),
      }
    }
  }

  #[test]
  fn test_reconnect_delay_doubles_and_caps() {
    let config = SocketConfig::default();
    assert_eq!(reconnect_delay(&config, 0), Duration::from_millis(1000));
    assert_eq!(reconnect_delay(&config, 1), Duration::from_millis(1000));
    assert_eq!(reconnect_delay(&config, 2), Duration::from_millis(2000));
    assert_eq!(reconnect_delay(&config, 3), Duration::from_millis(4000));
    assert_eq!(reconnect_delay(&config, 4), Duration::from_millis(5000));
    assert_eq!(reconnect_delay(&config, 40), Duration::from_millis(5000));
  }

  #[tokio::test]
  async fn test_session_against_local_server() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");

    let server = tokio::spawn(async move {
      let (stream, _) = listener.accept().await.expect("accept");
      let mut ws = accept_async(stream).await.expect("ws accept");

      ws.send(Message::Text(OPEN.to_string())).await.expect("open");
      assert_eq!(expect_text(&mut ws).await, "40");
      ws.send(Message::Text(r#"40{"sid":"x"}"#.to_string()))
        .await
        .expect("connect");
      assert_eq!(expect_text(&mut ws).await, r#"42["initialData"]"#);

      ws.send(Message::Text("2".to_string())).await.expect("ping");
      assert_eq!(expect_text(&mut ws).await, "3");

      ws.send(Message::Text(r#"42["recorteDeleted","r1"]"#.to_string()))
        .await
        .expect("event");
      ws.send(Message::Text(r#"42["unknownEvent",{}]"#.to_string()))
        .await
        .expect("unknown");
      ws.send(Message::Text(r#"42["clienteDeleted",{"id":"c9"}]"#.to_string()))
        .await
        .expect("event");

      assert_eq!(expect_text(&mut ws).await, r#"42["getClientes"]"#);
      ws.send(Message::Text("41".to_string())).await.expect("disconnect");
    });

    let (tx, mut rx) = mpsc::unbounded_channel();
    let client = PushClient::new(&format!("http://{}", addr), fast_config(Some(1))).expect("client");
    let handle = client.spawn(tx);

    assert!(matches!(
      recv(&mut rx).await,
      Event::Connection(ConnectionStatus::Connected)
    ));
    assert!(matches!(
      recv(&mut rx).await,
      Event::Push(PushEvent::RecorteDeleted(id)) if id == "r1"
    ));
    assert!(matches!(
      recv(&mut rx).await,
      Event::Push(PushEvent::ClienteDeleted(id)) if id == "c9"
    ));

    handle.emit("getClientes", Value::Null);

    assert!(matches!(
      recv(&mut rx).await,
      Event::Connection(ConnectionStatus::Disconnected(reason)) if reason == "io server disconnect"
    ));
    server.await.expect("server");
  }

  #[tokio::test]
  async fn test_gives_up_after_attempts() {
    // Reserve a port, then free it so connections are refused
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let client = PushClient::new(&format!("http://{}", addr), fast_config(Some(2))).expect("client");
    let _handle = client.spawn(tx);

    assert!(matches!(
      recv(&mut rx).await,
      Event::Connection(ConnectionStatus::Disconnected(_))
    ));
    assert!(matches!(
      recv(&mut rx).await,
      Event::Connection(ConnectionStatus::Reconnecting { attempt: 2, .. })
    ));
    assert!(matches!(
      recv(&mut rx).await,
      Event::Connection(ConnectionStatus::Disconnected(_))
    ));
    assert!(matches!(
      recv(&mut rx).await,
      Event::Connection(ConnectionStatus::ReconnectFailed)
    ));
  }

  #[tokio::test]
  async fn test_retries_without_cap() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let client = PushClient::new(&format!("http://{}", addr), fast_config(None)).expect("client");
    let _handle = client.spawn(tx);

    let mut reconnects = 0;
    while reconnects < 8 {
      match recv(&mut rx).await {
        Event::Connection(ConnectionStatus::Reconnecting { attempt, .. }) => {
          reconnects += 1;
          assert_eq!(attempt, reconnects + 1);
        }
        Event::Connection(ConnectionStatus::Disconnected(_)) => {}
        other => panic!("unexpected event {:?}", other),
      }
    }
  }

  #[tokio::test]
  async fn test_silent_server_times_out() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");

    let server = tokio::spawn(async move {
      let (stream, _) = listener.accept().await.expect("accept");
      let mut ws = accept_async(stream).await.expect("ws accept");
      ws.send(Message::Text(
        r#"0{"sid":"s2","upgrades":[],"pingInterval":100,"pingTimeout":100}"#.to_string(),
      ))
      .await
      .expect("open");
      let _ = expect_text(&mut ws).await;
      ws.send(Message::Text("40".to_string())).await.expect("connect");
      // Keep the socket open without sending anything else
      tokio::time::sleep(Duration::from_secs(3)).await;
      drop(ws);
    });

    let (tx, mut rx) = mpsc::unbounded_channel();
    let client = PushClient::new(&format!("http://{}", addr), fast_config(Some(1))).expect("client");
    let _handle = client.spawn(tx);

    assert!(matches!(
      recv(&mut rx).await,
      Event::Connection(ConnectionStatus::Connected)
    ));
    let event = tokio::time::timeout(Duration::from_secs(1), rx.recv())
      .await
      .expect("disconnect within the heartbeat")
      .expect("channel open");
    assert!(matches!(
      event,
      Event::Connection(ConnectionStatus::Disconnected(reason)) if reason == "ping timeout"
    ));
    server.abort();
  }

  #[tokio::test]
  async fn test_rejected_connect() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");

    tokio::spawn(async move {
      let (stream, _) = listener.accept().await.expect("accept");
      let mut ws = accept_async(stream).await.expect("ws accept");
      ws.send(Message::Text(OPEN.to_string())).await.expect("open");
      let _ = expect_text(&mut ws).await;
      ws.send(Message::Text(r#"44{"message":"nope"}"#.to_string()))
        .await
        .expect("error");
    });

    let (tx, mut rx) = mpsc::unbounded_channel();
    let client = PushClient::new(&format!("http://{}", addr), fast_config(Some(1))).expect("client");
    let _handle = client.spawn(tx);

    assert!(matches!(
      recv(&mut rx).await,
      Event::Connection(ConnectionStatus::Disconnected(reason)) if reason.contains("nope")
    ));
    assert!(matches!(
      recv(&mut rx).await,
      Event::Connection(ConnectionStatus::ReconnectFailed)
    ));
  }
}
