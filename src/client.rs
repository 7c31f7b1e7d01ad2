//! The queue client: lazy connection, one-shot receive, the processing loop
//! and the send path.

use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{ClientConfig, ClientOptions};
use crate::connection::StompConnector;
use crate::error::{Error, HandlerError, Result};
use crate::host::{HostIdentity, SystemHostIdentity};
use crate::session::{
    AckMode, InboundMessage, Login, ProtocolSession, SessionConnector, SubscribeOptions,
    Subscription,
};
use crate::transport::{TcpTransport, Transport};

/// STOMP destination for queue `name`.
pub fn queue_destination(name: &str) -> String {
    format!("/queue/{}", name)
}

/// Lifecycle of a client's connection. There is no way back from `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Unconnected,
    Connected,
    Closed,
}

enum State {
    Unconnected,
    Connected(Arc<dyn ProtocolSession>),
    Closed,
}

/// A client bound to one broker, connecting on first use.
///
/// The connection is opened by whichever operation runs first and shared by
/// every later one. Concurrent first use is serialized, so only one dial and
/// handshake ever happen. Wrap the client in an `Arc` to run
/// [`process_messages`](Self::process_messages) on a background task while
/// another task calls [`close`](Self::close).
///
/// ```no_run
/// use simple_stomp::{ClientConfig, MessageClient};
///
/// # async fn demo() -> simple_stomp::Result<()> {
/// let client = MessageClient::new(ClientConfig::new("artemis", "artemis", "localhost", 61613));
/// client.send_message("testqueue", "text/plain", "This is a test!").await?;
/// let body = client.get_message("testqueue").await?;
/// assert_eq!(body, "This is a test!");
/// client.close().await?;
/// # Ok(())
/// # }
/// ```
pub struct MessageClient {
    config: ClientConfig,
    options: ClientOptions,
    transport: Arc<dyn Transport>,
    connector: Arc<dyn SessionConnector>,
    host: Arc<dyn HostIdentity>,
    state: Mutex<State>,
}

impl MessageClient {
    /// Client over TCP with the STOMP session engine and the system host name.
    pub fn new(config: ClientConfig) -> Self {
        Self::with_collaborators(
            config,
            Arc::new(TcpTransport),
            Arc::new(StompConnector::new()),
            Arc::new(SystemHostIdentity),
        )
    }

    /// Client with explicit transport, session connector and host identity.
    pub fn with_collaborators(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
        connector: Arc<dyn SessionConnector>,
        host: Arc<dyn HostIdentity>,
    ) -> Self {
        Self {
            config,
            options: ClientOptions::default(),
            transport,
            connector,
            host,
            state: Mutex::new(State::Unconnected),
        }
    }

    pub fn with_options(mut self, options: ClientOptions) -> Self {
        self.options = options;
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub async fn state(&self) -> ConnectionState {
        match &*self.state.lock().await {
            State::Unconnected => ConnectionState::Unconnected,
            State::Connected(_) => ConnectionState::Connected,
            State::Closed => ConnectionState::Closed,
        }
    }

    /// Connect if not connected yet. Repeated calls reuse the session.
    pub async fn connect(&self) -> Result<()> {
        self.session().await.map(|_| ())
    }

    /// The live session, opening it on first use.
    ///
    /// Any failure leaves the client `Unconnected`, so the next call starts
    /// over from validation.
    async fn session(&self) -> Result<Arc<dyn ProtocolSession>> {
        let mut state = self.state.lock().await;
        match &*state {
            State::Connected(session) => return Ok(session.clone()),
            State::Closed => return Err(Error::ClientClosed),
            State::Unconnected => {}
        }

        self.config.validate()?;
        let stream = self
            .transport
            .dial(&self.config.server, self.config.port, self.options.dial_timeout)
            .await?;
        let client_id = self.host.resolve().map_err(Error::HostIdentity)?;
        let login = Login {
            login: self.config.username.clone(),
            passcode: self.config.password.clone(),
            host: self.config.server.clone(),
            client_id,
        };
        let session = self.connector.connect(stream, login).await?;
        info!(address = %self.config.address(), "connected to broker");

        *state = State::Connected(session.clone());
        Ok(session)
    }

    /// Open a subscription on `/queue/<queue>` with auto ack, the configured
    /// delivery mode and the host identity as durable subscription name.
    async fn subscribe(
        &self,
        session: &dyn ProtocolSession,
        queue: &str,
    ) -> Result<Box<dyn Subscription>> {
        let durable_name = self.host.resolve().map_err(Error::HostIdentity)?;
        let options = SubscribeOptions::new(AckMode::Auto)
            .header("durable-subscription-name", durable_name)
            .header("subscription-type", self.options.subscription_type.as_str());
        session.subscribe(&queue_destination(queue), options).await
    }

    /// Disconnect and retire the client. Closing a client that never
    /// connected, or closing twice, is a no-op.
    pub async fn close(&self) -> Result<()> {
        let previous = std::mem::replace(&mut *self.state.lock().await, State::Closed);
        match previous {
            State::Connected(session) => {
                debug!(address = %self.config.address(), "closing connection");
                session.disconnect().await
            }
            State::Unconnected | State::Closed => Ok(()),
        }
    }

    /// Receive one message from `queue`, waiting as long as it takes.
    ///
    /// The subscription lives only for this call and is released on every
    /// exit path.
    pub async fn get_message(&self, queue: &str) -> Result<String> {
        self.receive_one(queue, None).await
    }

    /// Like [`get_message`](Self::get_message) but gives up after `timeout`
    /// with [`Error::ReceiveTimeout`].
    pub async fn get_message_within(&self, queue: &str, timeout: Duration) -> Result<String> {
        self.receive_one(queue, Some(timeout)).await
    }

    async fn receive_one(&self, queue: &str, timeout: Option<Duration>) -> Result<String> {
        let session = self.session().await?;
        let mut subscription = self.subscribe(session.as_ref(), queue).await?;

        let next = match timeout {
            Some(limit) => tokio::time::timeout(limit, subscription.recv())
                .await
                .map_err(|_| Error::ReceiveTimeout(limit)),
            None => Ok(subscription.recv().await),
        };
        let outcome = match next {
            Ok(Some(message)) => match message.error {
                Some(err) => Err(Error::Message(err)),
                None => Ok(message.body_text().into_owned()),
            },
            Ok(None) => Err(Error::SubscriptionClosed(subscription.destination().to_string())),
            Err(e) => Err(e),
        };

        if let Err(e) = subscription.unsubscribe().await {
            debug!(queue, error = %e, "unsubscribe after receive failed");
        }
        outcome
    }

    /// Feed every message from `queue` to `handler` until `cancel` fires or
    /// the session closes the subscription.
    ///
    /// Returns `Ok(())` on cancellation (after unsubscribing) and when the
    /// channel closes. The first message error or handler error ends the
    /// loop and is returned; the handler is never retried. Messages are
    /// handled one at a time in arrival order.
    pub async fn process_messages<F>(
        &self,
        queue: &str,
        cancel: CancellationToken,
        mut handler: F,
    ) -> Result<()>
    where
        F: FnMut(&InboundMessage) -> std::result::Result<(), HandlerError> + Send,
    {
        let session = self.session().await?;
        let mut subscription = self.subscribe(session.as_ref(), queue).await?;
        debug!(queue, subscription_id = subscription.id(), "processing messages");

        let failure = loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    debug!(queue, "processing cancelled");
                    return subscription.unsubscribe().await;
                }
                next = subscription.recv() => match next {
                    None => {
                        debug!(queue, "subscription channel closed");
                        return Ok(());
                    }
                    Some(mut message) => {
                        if let Some(err) = message.error.take() {
                            break Error::Message(err);
                        }
                        if let Err(err) = handler(&message) {
                            break Error::Handler(err);
                        }
                    }
                },
            }
        };

        warn!(queue, error = %failure, "message processing stopped");
        if let Err(e) = subscription.unsubscribe().await {
            debug!(queue, error = %e, "unsubscribe after failure failed");
        }
        Err(failure)
    }

    /// Send `body` to `queue` and wait for the broker's receipt.
    pub async fn send_message(
        &self,
        queue: &str,
        content_type: &str,
        body: impl Into<Bytes>,
    ) -> Result<()> {
        let session = self.session().await?;
        let destination = queue_destination(queue);
        session
            .send(&destination, content_type, body.into(), true)
            .await
            .inspect_err(|e| warn!(%destination, error = %e, "error sending message"))
    }
}
