//! Message bus transport.
//!
//! The listener talks to the bus through the [`BusTransport`] /
//! [`BusSession`] traits so its state machine can be driven by a scripted
//! transport in tests. The production implementation, [`MqttTransport`],
//! wraps `rumqttc`: a session is one `AsyncClient` + `EventLoop` pair, and
//! any event-loop error ends the session, and the supervisory loop in
//! [`crate::listener`] then rebuilds a fresh one.

use std::future::Future;
use std::time::Duration;

use rumqttc::{AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Packet, QoS};
use thiserror::Error;

/// One raw message received from the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    /// The topic the message arrived on.
    pub topic: String,
    /// Undecoded message body.
    pub payload: Vec<u8>,
}

/// Transport-level bus failures. All of them are recoverable: the listener
/// reacts by dropping the session and retrying after its backoff.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Could not reach the broker or the broker refused the connection.
    #[error("bus connect failed: {0}")]
    Connect(String),

    /// The subscribe request could not be issued.
    #[error("bus subscribe failed: {0}")]
    Subscribe(String),

    /// An established session ended (broker dropped, network gone, or the
    /// protocol stream became unreadable).
    #[error("bus session ended: {0}")]
    Session(String),
}

/// An established bus session: subscribed and yielding messages until a
/// transport error ends it.
pub trait BusSession: Send {
    /// Subscribes to the given topic patterns.
    fn subscribe(
        &mut self,
        patterns: &[&str],
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Waits for the next inbound message. The wait is indefinite; it
    /// resolves only on message arrival or transport error.
    fn next_message(&mut self) -> impl Future<Output = Result<BusMessage, TransportError>> + Send;
}

/// Factory for bus sessions. A fresh session is created on every
/// (re)connect attempt; sessions are never reused across failures.
pub trait BusTransport: Send + 'static {
    type Session: BusSession;

    /// Opens a new session to the bus.
    fn connect(&self) -> impl Future<Output = Result<Self::Session, TransportError>> + Send;
}

/// MQTT transport backed by `rumqttc`.
pub struct MqttTransport {
    host: String,
    port: u16,
}

impl MqttTransport {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    fn options(&self, client_id: &str) -> MqttOptions {
        let mut options = MqttOptions::new(client_id, &self.host, self.port);
        options.set_keep_alive(Duration::from_secs(30));
        options
    }
}

impl BusTransport for MqttTransport {
    type Session = MqttSession;

    async fn connect(&self) -> Result<MqttSession, TransportError> {
        let client_id = format!("vigil-dashboard-{}", std::process::id());
        let (client, mut event_loop) = AsyncClient::new(self.options(&client_id), 64);

        // Drive the event loop until the broker acknowledges the
        // connection; rumqttc performs the TCP connect lazily on poll.
        loop {
            match event_loop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    if ack.code == ConnectReturnCode::Success {
                        break;
                    }
                    return Err(TransportError::Connect(format!(
                        "broker refused connection: {:?}",
                        ack.code
                    )));
                }
                Ok(_) => continue,
                Err(e) => return Err(TransportError::Connect(e.to_string())),
            }
        }

        Ok(MqttSession { client, event_loop })
    }
}

/// A live MQTT session.
pub struct MqttSession {
    client: AsyncClient,
    event_loop: EventLoop,
}

impl BusSession for MqttSession {
    async fn subscribe(&mut self, patterns: &[&str]) -> Result<(), TransportError> {
        for pattern in patterns {
            self.client
                .subscribe(*pattern, QoS::AtMostOnce)
                .await
                .map_err(|e| TransportError::Subscribe(e.to_string()))?;
        }
        Ok(())
    }

    async fn next_message(&mut self) -> Result<BusMessage, TransportError> {
        loop {
            match self.event_loop.poll().await {
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    return Ok(BusMessage {
                        topic: publish.topic.clone(),
                        payload: publish.payload.to_vec(),
                    });
                }
                // Keepalives, acks and outgoing traffic are not messages.
                Ok(_) => continue,
                Err(e) => return Err(TransportError::Session(e.to_string())),
            }
        }
    }
}

/// Publishes a single message over a short-lived connection.
///
/// Used by request handlers that need to poke the assistant fleet (e.g.
/// triggering speaker enrollment) without sharing the listener's session.
///
/// # Errors
///
/// Returns `TransportError` if the broker is unreachable or drops the
/// connection before acknowledging the publish.
pub async fn publish_message(
    host: &str,
    port: u16,
    topic: &str,
    payload: String,
) -> Result<(), TransportError> {
    let client_id = format!("vigil-publish-{}", std::process::id());
    let mut options = MqttOptions::new(client_id, host, port);
    options.set_keep_alive(Duration::from_secs(10));

    let (client, mut event_loop) = AsyncClient::new(options, 8);
    client
        .publish(topic, QoS::AtLeastOnce, false, payload)
        .await
        .map_err(|e| TransportError::Connect(e.to_string()))?;

    // Drive the event loop until the broker acknowledges the publish.
    loop {
        match event_loop.poll().await {
            Ok(Event::Incoming(Packet::PubAck(_))) => break,
            Ok(_) => continue,
            Err(e) => return Err(TransportError::Session(e.to_string())),
        }
    }

    let _ = client.disconnect().await;
    Ok(())
}
