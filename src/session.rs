//! Collaborator interfaces between [`MessageClient`](crate::MessageClient)
//! and a protocol engine.
//!
//! The client only talks to these traits. [`crate::connection`] provides the
//! STOMP implementation; tests substitute in-memory doubles.

use async_trait::async_trait;
use bytes::Bytes;
use std::borrow::Cow;
use std::sync::Arc;

use crate::error::{MessageError, Result};
use crate::frame::Frame;
use crate::transport::BoxStream;

/// Subscription acknowledgement modes as defined by STOMP 1.2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AckMode {
    #[default]
    Auto,
    Client,
    ClientIndividual,
}

impl AckMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AckMode::Auto => "auto",
            AckMode::Client => "client",
            AckMode::ClientIndividual => "client-individual",
        }
    }
}

/// Credentials and identity presented during the handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Login {
    pub login: String,
    pub passcode: String,
    /// Virtual host sent in the `host` header.
    pub host: String,
    /// Sent as the `client-id` header.
    pub client_id: String,
}

/// How a subscription should be registered with the broker.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscribeOptions {
    pub ack: AckMode,
    /// Extra SUBSCRIBE headers, sent in order.
    pub headers: Vec<(String, String)>,
}

impl SubscribeOptions {
    pub fn new(ack: AckMode) -> Self {
        Self {
            ack,
            headers: Vec::new(),
        }
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    pub fn get_header(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// A message delivered to a subscription.
///
/// When `error` is set the message carries no content; the session is
/// about to end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
    pub error: Option<MessageError>,
}

impl InboundMessage {
    pub fn new(headers: Vec<(String, String)>, body: impl Into<Bytes>) -> Self {
        Self {
            headers,
            body: body.into(),
            error: None,
        }
    }

    pub fn failed(error: MessageError) -> Self {
        Self {
            headers: Vec::new(),
            body: Bytes::new(),
            error: Some(error),
        }
    }

    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn destination(&self) -> Option<&str> {
        self.header("destination")
    }

    pub fn message_id(&self) -> Option<&str> {
        self.header("message-id")
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    /// Body as text; invalid UTF-8 sequences are replaced.
    pub fn body_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}

impl From<Frame> for InboundMessage {
    fn from(frame: Frame) -> Self {
        Self::new(frame.headers, frame.body)
    }
}

/// A single consumer's view of one destination.
#[async_trait]
pub trait Subscription: Send {
    fn id(&self) -> &str;

    fn destination(&self) -> &str;

    /// Wait for the next message. `None` means the channel is closed and no
    /// further messages will arrive.
    async fn recv(&mut self) -> Option<InboundMessage>;

    /// Stop delivery. Calling it again is a no-op.
    async fn unsubscribe(&mut self) -> Result<()>;
}

/// An established protocol session.
#[async_trait]
pub trait ProtocolSession: Send + Sync {
    async fn subscribe(
        &self,
        destination: &str,
        options: SubscribeOptions,
    ) -> Result<Box<dyn Subscription>>;

    /// Send `body` to `destination`. With `request_receipt` the call
    /// returns only after the broker confirmed the frame.
    async fn send(
        &self,
        destination: &str,
        content_type: &str,
        body: Bytes,
        request_receipt: bool,
    ) -> Result<()>;

    async fn disconnect(&self) -> Result<()>;
}

/// Performs the login handshake over a freshly dialed stream.
#[async_trait]
pub trait SessionConnector: Send + Sync {
    async fn connect(&self, stream: BoxStream, login: Login) -> Result<Arc<dyn ProtocolSession>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inbound_message_accessors() {
        let msg: InboundMessage = Frame::new("MESSAGE")
            .header("destination", "/queue/testqueue")
            .header("message-id", "m-1")
            .header("content-type", "text/plain")
            .set_body(b"This is a test!".to_vec())
            .into();
        assert_eq!(msg.destination(), Some("/queue/testqueue"));
        assert_eq!(msg.message_id(), Some("m-1"));
        assert_eq!(msg.content_type(), Some("text/plain"));
        assert_eq!(msg.body_text(), "This is a test!");
        assert!(msg.error.is_none());
    }

    #[test]
    fn failed_message_has_no_body() {
        let msg = InboundMessage::failed(MessageError::ConnectionLost("eof".into()));
        assert!(msg.body.is_empty());
        assert!(msg.error.is_some());
    }

    #[test]
    fn subscribe_options_builder() {
        let opts = SubscribeOptions::new(AckMode::Auto)
            .header("durable-subscription-name", "box")
            .header("subscription-type", "MULTICAST");
        assert_eq!(opts.ack.as_str(), "auto");
        assert_eq!(opts.get_header("subscription-type"), Some("MULTICAST"));
    }
}
