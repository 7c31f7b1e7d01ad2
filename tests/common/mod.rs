//! In-memory collaborator doubles shared by the client tests.
//!
//! The doubles count dials, handshakes, subscriptions and unsubscribes so
//! tests can assert on lifecycle behaviour without a broker.

#![allow(dead_code)]

pub mod broker;

use async_trait::async_trait;
use bytes::Bytes;
use simple_stomp::{
    BoxStream, ClientConfig, Error, FixedHostIdentity, HostIdentity, InboundMessage, Login,
    MessageClient, ProtocolSession, Result, SessionConnector, SubscribeOptions, Subscription,
    Transport,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

pub fn test_config() -> ClientConfig {
    ClientConfig::new("artemis", "artemis", "localhost", 61613)
}

// =============================================================================
// Transport
// =============================================================================

#[derive(Default)]
pub struct MockTransport {
    pub dials: AtomicUsize,
    pub fail: AtomicBool,
}

#[async_trait]
impl Transport for MockTransport {
    async fn dial(&self, _host: &str, _port: u16, _timeout: Duration) -> Result<BoxStream> {
        self.dials.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::Transport(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "connection refused",
            )));
        }
        let (ours, _theirs) = tokio::io::duplex(64);
        Ok(Box::new(ours))
    }
}

// =============================================================================
// Session
// =============================================================================

/// Feed side of one subscription opened on a [`MockSession`].
pub struct SubscriptionProbe {
    pub destination: String,
    pub options: SubscribeOptions,
    pub feed: mpsc::UnboundedSender<InboundMessage>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub destination: String,
    pub content_type: String,
    pub body: Bytes,
    pub request_receipt: bool,
}

#[derive(Default)]
pub struct MockSession {
    /// Messages queued before anyone subscribed, delivered on subscribe.
    pub backlog: Mutex<VecDeque<InboundMessage>>,
    pub probes: Mutex<Vec<SubscriptionProbe>>,
    pub sent: Mutex<Vec<SentMessage>>,
    pub subscribes: AtomicUsize,
    pub unsubscribes: Arc<AtomicUsize>,
    pub disconnects: AtomicUsize,
    pub fail_subscribe: AtomicBool,
    pub fail_send: AtomicBool,
}

impl MockSession {
    pub fn queue_message(&self, body: &str) {
        self.backlog
            .lock()
            .unwrap()
            .push_back(InboundMessage::new(Vec::new(), body.to_string()));
    }

    pub fn queue(&self, message: InboundMessage) {
        self.backlog.lock().unwrap().push_back(message);
    }

    /// Number of subscriptions opened and not yet unsubscribed.
    pub fn open_subscriptions(&self) -> usize {
        self.subscribes.load(Ordering::SeqCst) - self.unsubscribes.load(Ordering::SeqCst)
    }

    /// Push a message to the most recent subscription.
    pub fn deliver(&self, message: InboundMessage) {
        let probes = self.probes.lock().unwrap();
        let probe = probes.last().expect("no subscription opened");
        probe.feed.send(message).expect("subscription dropped");
    }

    /// Close every subscription channel, as a session does on shutdown.
    pub fn close_channels(&self) {
        self.probes.lock().unwrap().clear();
    }
}

pub struct MockSubscription {
    id: String,
    destination: String,
    inbox: mpsc::UnboundedReceiver<InboundMessage>,
    unsubscribes: Arc<AtomicUsize>,
    released: bool,
}

#[async_trait]
impl Subscription for MockSubscription {
    fn id(&self) -> &str {
        &self.id
    }

    fn destination(&self) -> &str {
        &self.destination
    }

    async fn recv(&mut self) -> Option<InboundMessage> {
        self.inbox.recv().await
    }

    async fn unsubscribe(&mut self) -> Result<()> {
        if !self.released {
            self.released = true;
            self.unsubscribes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

#[async_trait]
impl ProtocolSession for MockSession {
    async fn subscribe(
        &self,
        destination: &str,
        options: SubscribeOptions,
    ) -> Result<Box<dyn Subscription>> {
        if self.fail_subscribe.load(Ordering::SeqCst) {
            return Err(Error::Subscribe {
                destination: destination.to_string(),
                reason: "refused by test".into(),
            });
        }
        let n = self.subscribes.fetch_add(1, Ordering::SeqCst) + 1;
        let (feed, inbox) = mpsc::unbounded_channel();
        for message in self.backlog.lock().unwrap().drain(..) {
            let _ = feed.send(message);
        }
        self.probes.lock().unwrap().push(SubscriptionProbe {
            destination: destination.to_string(),
            options,
            feed,
        });
        Ok(Box::new(MockSubscription {
            id: format!("mock-{}", n),
            destination: destination.to_string(),
            inbox,
            unsubscribes: self.unsubscribes.clone(),
            released: false,
        }))
    }

    async fn send(
        &self,
        destination: &str,
        content_type: &str,
        body: Bytes,
        request_receipt: bool,
    ) -> Result<()> {
        if self.fail_send.load(Ordering::SeqCst) {
            return Err(Error::ReceiptTimeout("rcpt-1".into()));
        }
        self.sent.lock().unwrap().push(SentMessage {
            destination: destination.to_string(),
            content_type: content_type.to_string(),
            body,
            request_receipt,
        });
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        self.close_channels();
        Ok(())
    }
}

// =============================================================================
// Connector
// =============================================================================

pub struct MockConnector {
    pub session: Arc<MockSession>,
    pub handshakes: AtomicUsize,
    pub logins: Mutex<Vec<Login>>,
    /// Artificial handshake latency, to widen races between first users.
    pub delay: Duration,
}

impl MockConnector {
    pub fn new(session: Arc<MockSession>) -> Self {
        Self {
            session,
            handshakes: AtomicUsize::new(0),
            logins: Mutex::new(Vec::new()),
            delay: Duration::ZERO,
        }
    }
}

#[async_trait]
impl SessionConnector for MockConnector {
    async fn connect(&self, _stream: BoxStream, login: Login) -> Result<Arc<dyn ProtocolSession>> {
        self.handshakes.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.logins.lock().unwrap().push(login);
        Ok(self.session.clone())
    }
}

// =============================================================================
// Host identity
// =============================================================================

/// Resolves to `"test-host"` for the first `succeed_for` lookups, then fails.
pub struct FlakyHost {
    pub lookups: AtomicUsize,
    pub succeed_for: usize,
}

impl FlakyHost {
    pub fn new(succeed_for: usize) -> Self {
        Self {
            lookups: AtomicUsize::new(0),
            succeed_for,
        }
    }
}

impl HostIdentity for FlakyHost {
    fn resolve(&self) -> std::io::Result<String> {
        let n = self.lookups.fetch_add(1, Ordering::SeqCst);
        if n < self.succeed_for {
            Ok("test-host".to_string())
        } else {
            Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "no host name available",
            ))
        }
    }
}

/// A client wired to fresh doubles.
pub struct Harness {
    pub client: Arc<MessageClient>,
    pub transport: Arc<MockTransport>,
    pub connector: Arc<MockConnector>,
    pub session: Arc<MockSession>,
}

pub fn harness() -> Harness {
    harness_with(test_config(), Duration::ZERO)
}

pub fn harness_with(config: ClientConfig, handshake_delay: Duration) -> Harness {
    build_harness(
        config,
        handshake_delay,
        Arc::new(FixedHostIdentity("test-host".into())),
    )
}

pub fn harness_with_host(host: Arc<dyn HostIdentity>) -> Harness {
    build_harness(test_config(), Duration::ZERO, host)
}

fn build_harness(
    config: ClientConfig,
    handshake_delay: Duration,
    host: Arc<dyn HostIdentity>,
) -> Harness {
    let session = Arc::new(MockSession::default());
    let transport = Arc::new(MockTransport::default());
    let mut connector = MockConnector::new(session.clone());
    connector.delay = handshake_delay;
    let connector = Arc::new(connector);
    let client = Arc::new(MessageClient::with_collaborators(
        config,
        transport.clone(),
        connector.clone(),
        host,
    ));
    Harness {
        client,
        transport,
        connector,
        session,
    }
}
