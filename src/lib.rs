//! A small STOMP queue client.
//!
//! [`MessageClient`] covers three jobs: send one message to a queue, receive
//! one message from a queue, or keep handing messages from a queue to a
//! callback until cancelled. The broker connection is opened on first use.
//!
//! The client talks to its collaborators through traits in [`session`],
//! [`transport`] and [`host`]; [`connection`] holds the bundled STOMP 1.2
//! session engine built on [`codec::StompCodec`].

pub mod client;
pub mod codec;
pub mod config;
pub mod connection;
pub mod error;
pub mod frame;
pub mod host;
pub mod parser;
pub mod session;
pub mod subscription;
pub mod transport;

pub use client::{ConnectionState, MessageClient, queue_destination};
pub use codec::{StompCodec, StompItem};
pub use config::{ClientConfig, ClientOptions, ConfigError, SubscriptionType};
pub use connection::{StompConnector, StompSession, negotiate_heartbeats, parse_heartbeat_header};
pub use error::{Error, HandlerError, MessageError, Result, ServerError};
pub use frame::Frame;
pub use host::{FixedHostIdentity, HostIdentity, SystemHostIdentity};
pub use session::{
    AckMode, InboundMessage, Login, ProtocolSession, SessionConnector, SubscribeOptions,
    Subscription,
};
pub use subscription::StompSubscription;
pub use transport::{BoxStream, ByteStream, TcpTransport, Transport};

pub use tokio_util::sync::CancellationToken;
