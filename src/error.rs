use std::fmt;
use std::io;
use std::time::Duration;
use thiserror::Error;

use crate::config::ConfigError;
use crate::frame::Frame;

/// Boxed error returned by a message handler passed to
/// [`MessageClient::process_messages`](crate::MessageClient::process_messages).
pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by the client and its collaborators.
#[derive(Error, Debug)]
pub enum Error {
    /// Connection parameters failed validation.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// Dialing the broker failed.
    #[error("transport error: {0}")]
    Transport(#[source] io::Error),

    /// Dialing the broker did not finish in time.
    #[error("timed out after {timeout:?} connecting to {addr}")]
    DialTimeout { addr: String, timeout: Duration },

    /// The local host name could not be determined.
    #[error("cannot resolve local host identity: {0}")]
    HostIdentity(#[source] io::Error),

    /// The broker answered CONNECT with an ERROR frame.
    #[error("authentication failed: {0}")]
    Auth(ServerError),

    /// The broker did not answer CONNECT in time.
    #[error("no CONNECTED frame within {0:?}")]
    HandshakeTimeout(Duration),

    /// Wire-level I/O failure on an established stream.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// The broker sent something the session cannot make sense of.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A subscription could not be registered.
    #[error("cannot subscribe to {destination}: {reason}")]
    Subscribe { destination: String, reason: String },

    /// The broker rejected a SEND with an ERROR frame bound to its receipt.
    #[error("send rejected: {0}")]
    Send(ServerError),

    /// No RECEIPT arrived for a frame within the receipt timeout.
    #[error("receipt timeout: no RECEIPT received for '{0}' within timeout")]
    ReceiptTimeout(String),

    /// The session's I/O task has stopped.
    #[error("session closed")]
    SessionClosed,

    /// The subscription ended before a message arrived.
    #[error("subscription to {0} closed before a message arrived")]
    SubscriptionClosed(String),

    /// A received message carried an error instead of content.
    #[error("message error: {0}")]
    Message(#[from] MessageError),

    /// The caller's message handler failed.
    #[error("message handler failed: {0}")]
    Handler(#[source] HandlerError),

    /// No message arrived before the caller's deadline.
    #[error("no message received within {0:?}")]
    ReceiveTimeout(Duration),

    /// The client has been closed and cannot be used again.
    #[error("client is closed")]
    ClientClosed,
}

/// An error attached to a delivered message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MessageError {
    /// The broker sent an ERROR frame; the session ends after it.
    #[error("broker error: {0}")]
    Server(ServerError),
    /// The connection dropped without a DISCONNECT.
    #[error("connection lost: {0}")]
    ConnectionLost(String),
}

/// A STOMP ERROR frame sent by the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerError {
    /// The `message` header, or `"unknown error"` when absent.
    pub message: String,
    /// The frame body when it is non-empty UTF-8.
    pub body: Option<String>,
    /// The `receipt-id` header, set when the error answers a receipted frame.
    pub receipt_id: Option<String>,
    /// The original frame.
    pub frame: Frame,
}

impl ServerError {
    pub fn from_frame(frame: Frame) -> Self {
        let message = frame
            .get_header("message")
            .unwrap_or("unknown error")
            .to_string();
        let receipt_id = frame.get_header("receipt-id").map(str::to_string);
        let body = match std::str::from_utf8(&frame.body) {
            Ok(s) if !s.is_empty() => Some(s.to_string()),
            _ => None,
        };
        Self {
            message,
            body,
            receipt_id,
            frame,
        }
    }
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.body {
            Some(body) => write!(f, "{}: {}", self.message, body),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for ServerError {}
