use async_trait::async_trait;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::Instant;
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};

use crate::codec::{StompCodec, StompItem};
use crate::error::{Error, MessageError, Result, ServerError};
use crate::frame::Frame;
use crate::session::{
    InboundMessage, Login, ProtocolSession, SessionConnector, SubscribeOptions, Subscription,
};
use crate::subscription::StompSubscription;
use crate::transport::BoxStream;

/// Receipt wait used when none is configured.
pub const DEFAULT_RECEIPT_TIMEOUT: Duration = Duration::from_secs(10);

/// Heart-beat header sent on CONNECT when none is configured.
pub const DEFAULT_HEARTBEAT: &str = "10000,10000";

/// Routing entry for one live subscription.
pub(crate) struct SubscriptionEntry {
    pub(crate) destination: String,
    pub(crate) sender: mpsc::UnboundedSender<InboundMessage>,
}

/// subscription id -> entry
pub(crate) type Subscriptions = HashMap<String, SubscriptionEntry>;

/// receipt-id -> waiter. The waiter gets `Err` when the broker answered
/// with an ERROR frame naming that receipt.
pub(crate) type PendingReceipts =
    HashMap<String, oneshot::Sender<std::result::Result<(), ServerError>>>;

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Parse the STOMP `heart-beat` header value (format: "cx,cy").
///
/// Returns `(cx, cy)` in milliseconds. Missing or invalid fields are `0`.
pub fn parse_heartbeat_header(header: &str) -> (u64, u64) {
    let mut parts = header.split(',');
    let mut next = || {
        parts
            .next()
            .and_then(|s| s.trim().parse::<u64>().ok())
            .unwrap_or(0)
    };
    let cx = next();
    let cy = next();
    (cx, cy)
}

/// Negotiate heartbeat intervals between client and server.
///
/// Returns `(outgoing, incoming)`. A direction is disabled (`None`) when
/// either side advertised `0` for it; otherwise the interval is the larger
/// of the two advertised values.
pub fn negotiate_heartbeats(
    client_out: u64,
    client_in: u64,
    server_out: u64,
    server_in: u64,
) -> (Option<Duration>, Option<Duration>) {
    let pick = |ours: u64, theirs: u64| {
        (ours != 0 && theirs != 0).then(|| Duration::from_millis(ours.max(theirs)))
    };
    (pick(client_out, server_in), pick(client_in, server_out))
}

/// Opens [`StompSession`]s over an already dialed stream.
///
/// ```
/// use simple_stomp::StompConnector;
/// use std::time::Duration;
///
/// let connector = StompConnector::new()
///     .heartbeat("0,0")
///     .handshake_timeout(Duration::from_secs(5));
/// ```
#[derive(Debug, Clone)]
pub struct StompConnector {
    heartbeat: String,
    handshake_timeout: Option<Duration>,
    receipt_timeout: Duration,
}

impl Default for StompConnector {
    fn default() -> Self {
        Self {
            heartbeat: DEFAULT_HEARTBEAT.to_string(),
            handshake_timeout: None,
            receipt_timeout: DEFAULT_RECEIPT_TIMEOUT,
        }
    }
}

impl StompConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Client `heart-beat` header ("cx,cy" in milliseconds).
    pub fn heartbeat(mut self, heartbeat: impl Into<String>) -> Self {
        self.heartbeat = heartbeat.into();
        self
    }

    /// Bound the wait for CONNECTED. Unbounded by default.
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = Some(timeout);
        self
    }

    /// How long receipted frames wait for their RECEIPT.
    pub fn receipt_timeout(mut self, timeout: Duration) -> Self {
        self.receipt_timeout = timeout;
        self
    }
}

async fn await_connected(framed: &mut Framed<BoxStream, StompCodec>) -> Result<Frame> {
    loop {
        match framed.next().await {
            Some(Ok(StompItem::Heartbeat)) => continue,
            Some(Ok(StompItem::Frame(f))) if f.is("CONNECTED") => return Ok(f),
            Some(Ok(StompItem::Frame(f))) if f.is("ERROR") => {
                return Err(Error::Auth(ServerError::from_frame(f)));
            }
            Some(Ok(StompItem::Frame(f))) => {
                return Err(Error::Protocol(format!(
                    "unexpected {} frame before CONNECTED",
                    f.command
                )));
            }
            Some(Err(e)) => return Err(Error::Io(e)),
            None => {
                return Err(Error::Protocol(
                    "connection closed before CONNECTED".into(),
                ));
            }
        }
    }
}

#[async_trait]
impl SessionConnector for StompConnector {
    async fn connect(&self, stream: BoxStream, login: Login) -> Result<Arc<dyn ProtocolSession>> {
        let mut framed = Framed::new(stream, StompCodec::new());

        let connect = Frame::new("CONNECT")
            .header("accept-version", "1.2")
            .header("host", &login.host)
            .header("login", &login.login)
            .header("passcode", &login.passcode)
            .header("heart-beat", &self.heartbeat)
            .header("client-id", &login.client_id);
        framed.send(StompItem::Frame(connect)).await?;

        let connected = match self.handshake_timeout {
            Some(limit) => tokio::time::timeout(limit, await_connected(&mut framed))
                .await
                .map_err(|_| Error::HandshakeTimeout(limit))??,
            None => await_connected(&mut framed).await?,
        };

        let (cx, cy) = parse_heartbeat_header(&self.heartbeat);
        let (sx, sy) = parse_heartbeat_header(connected.get_header("heart-beat").unwrap_or("0,0"));
        let (send_interval, recv_interval) = negotiate_heartbeats(cx, cy, sx, sy);
        info!(
            host = %login.host,
            client_id = %login.client_id,
            server = connected.get_header("server").unwrap_or("unknown"),
            ?send_interval,
            ?recv_interval,
            "STOMP session established"
        );

        let session = StompSession::spawn(framed, send_interval, recv_interval, self.receipt_timeout);
        Ok(Arc::new(session))
    }
}

/// Why the I/O task stopped.
enum Exit {
    /// DISCONNECT or every session handle dropped.
    Shutdown,
    /// The stream failed or ended on its own.
    Lost(String),
    /// The broker sent an ERROR frame.
    Broker(ServerError),
}

/// A live STOMP 1.2 session over one stream.
///
/// A background task owns the stream: it writes outbound frames, routes
/// MESSAGE frames to subscriptions, resolves receipts and keeps heartbeats
/// flowing. There is no reconnect; once the stream ends every subscription
/// channel closes and further calls fail with [`Error::SessionClosed`].
#[derive(Clone)]
pub struct StompSession {
    outbound_tx: mpsc::Sender<StompItem>,
    shutdown_tx: broadcast::Sender<()>,
    subscriptions: Arc<Mutex<Subscriptions>>,
    pending_receipts: Arc<Mutex<PendingReceipts>>,
    /// Set once DISCONNECT is under way so a broker-side close is not
    /// reported as a lost connection.
    closing: Arc<AtomicBool>,
    sub_id_counter: Arc<AtomicU64>,
    receipt_counter: Arc<AtomicU64>,
    receipt_timeout: Duration,
}

impl StompSession {
    fn spawn(
        framed: Framed<BoxStream, StompCodec>,
        send_interval: Option<Duration>,
        recv_interval: Option<Duration>,
        receipt_timeout: Duration,
    ) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::channel::<StompItem>(32);
        let (shutdown_tx, shutdown_rx) = broadcast::channel::<()>(1);
        let session = StompSession {
            outbound_tx,
            shutdown_tx,
            subscriptions: Arc::new(Mutex::new(HashMap::new())),
            pending_receipts: Arc::new(Mutex::new(HashMap::new())),
            closing: Arc::new(AtomicBool::new(false)),
            sub_id_counter: Arc::new(AtomicU64::new(1)),
            receipt_counter: Arc::new(AtomicU64::new(1)),
            receipt_timeout,
        };

        let io = IoTask {
            subscriptions: session.subscriptions.clone(),
            pending_receipts: session.pending_receipts.clone(),
            closing: session.closing.clone(),
            send_interval,
            recv_interval,
        };
        tokio::spawn(io.run(framed, outbound_rx, shutdown_rx));
        session
    }

    /// Whether the background task has stopped.
    pub fn is_closed(&self) -> bool {
        self.outbound_tx.is_closed()
    }

    pub async fn send_frame(&self, frame: Frame) -> Result<()> {
        self.outbound_tx
            .send(StompItem::Frame(frame))
            .await
            .map_err(|_| Error::SessionClosed)
    }

    /// Send `frame` with a fresh `receipt` header and wait for the matching
    /// RECEIPT.
    pub async fn send_frame_confirmed(&self, frame: Frame) -> Result<()> {
        let receipt_id = format!(
            "rcpt-{}",
            self.receipt_counter.fetch_add(1, Ordering::SeqCst)
        );
        let (tx, rx) = oneshot::channel();
        lock(&self.pending_receipts).insert(receipt_id.clone(), tx);

        if let Err(e) = self.send_frame(frame.receipt(&receipt_id)).await {
            lock(&self.pending_receipts).remove(&receipt_id);
            return Err(e);
        }

        match tokio::time::timeout(self.receipt_timeout, rx).await {
            Ok(Ok(Ok(()))) => Ok(()),
            Ok(Ok(Err(server))) => Err(Error::Send(server)),
            Ok(Err(_)) => Err(Error::SessionClosed),
            Err(_) => {
                lock(&self.pending_receipts).remove(&receipt_id);
                Err(Error::ReceiptTimeout(receipt_id))
            }
        }
    }

    /// Drop the routing entry for `subscription_id` and tell the broker.
    pub(crate) async fn unsubscribe(&self, subscription_id: &str) -> Result<()> {
        if lock(&self.subscriptions).remove(subscription_id).is_none() {
            return Ok(());
        }
        debug!(subscription_id, "unsubscribing");
        self.send_frame(Frame::new("UNSUBSCRIBE").header("id", subscription_id))
            .await
    }

    /// Non-blocking variant of [`unsubscribe`](Self::unsubscribe) used when
    /// a subscription is dropped without being released.
    pub(crate) fn release(&self, subscription_id: &str) {
        if lock(&self.subscriptions).remove(subscription_id).is_some() {
            let frame = Frame::new("UNSUBSCRIBE").header("id", subscription_id);
            let _ = self.outbound_tx.try_send(StompItem::Frame(frame));
        }
    }
}

#[async_trait]
impl ProtocolSession for StompSession {
    async fn subscribe(
        &self,
        destination: &str,
        options: SubscribeOptions,
    ) -> Result<Box<dyn Subscription>> {
        let closed = || Error::Subscribe {
            destination: destination.to_string(),
            reason: "session closed".into(),
        };
        if self.is_closed() {
            return Err(closed());
        }

        let id = format!("sub-{}", self.sub_id_counter.fetch_add(1, Ordering::SeqCst));
        let (tx, rx) = mpsc::unbounded_channel();
        lock(&self.subscriptions).insert(
            id.clone(),
            SubscriptionEntry {
                destination: destination.to_string(),
                sender: tx,
            },
        );

        let frame = Frame::new("SUBSCRIBE")
            .header("id", &id)
            .header("destination", destination)
            .header("ack", options.ack.as_str())
            .headers(options.headers);
        if self.send_frame(frame).await.is_err() {
            lock(&self.subscriptions).remove(&id);
            return Err(closed());
        }
        debug!(subscription_id = %id, destination, "subscribed");

        Ok(Box::new(StompSubscription::new(
            id,
            destination.to_string(),
            rx,
            self.clone(),
        )))
    }

    async fn send(
        &self,
        destination: &str,
        content_type: &str,
        body: Bytes,
        request_receipt: bool,
    ) -> Result<()> {
        let frame = Frame::new("SEND")
            .header("destination", destination)
            .header("content-type", content_type)
            .header("content-length", body.len().to_string())
            .set_body(body.to_vec());
        if request_receipt {
            self.send_frame_confirmed(frame).await
        } else {
            self.send_frame(frame).await
        }
    }

    async fn disconnect(&self) -> Result<()> {
        if self.is_closed() {
            return Ok(());
        }
        self.closing.store(true, Ordering::SeqCst);
        let result = match self.send_frame_confirmed(Frame::new("DISCONNECT")).await {
            Ok(()) | Err(Error::SessionClosed) => Ok(()),
            Err(e) => Err(e),
        };
        let _ = self.shutdown_tx.send(());
        debug!("STOMP session disconnected");
        result
    }
}

/// State owned by the background I/O task.
struct IoTask {
    subscriptions: Arc<Mutex<Subscriptions>>,
    pending_receipts: Arc<Mutex<PendingReceipts>>,
    closing: Arc<AtomicBool>,
    send_interval: Option<Duration>,
    recv_interval: Option<Duration>,
}

impl IoTask {
    async fn run(
        self,
        framed: Framed<BoxStream, StompCodec>,
        mut outbound_rx: mpsc::Receiver<StompItem>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) {
        let (mut sink, mut stream) = framed.split();

        // Intervals are only polled when the matching direction is enabled.
        let idle = Duration::from_secs(3600);
        // Fires one send interval after the last write; every write resets it.
        let period = self.send_interval.unwrap_or(idle);
        let mut hb_tick = tokio::time::interval_at(Instant::now() + period, period);
        hb_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        // Deadline for the next inbound byte; pushed back only when data arrives.
        let silence_limit = self.recv_interval.map(|d| d * 2).unwrap_or(idle);
        let watchdog = tokio::time::sleep(silence_limit);
        tokio::pin!(watchdog);

        let exit = loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    let _ = sink.close().await;
                    break Exit::Shutdown;
                }
                maybe = outbound_rx.recv() => match maybe {
                    Some(item) => {
                        if let Err(e) = sink.send(item).await {
                            break Exit::Lost(e.to_string());
                        }
                        hb_tick.reset();
                    }
                    None => {
                        let _ = sink.close().await;
                        break Exit::Shutdown;
                    }
                },
                item = stream.next() => {
                    if matches!(item, Some(Ok(_))) {
                        watchdog.as_mut().reset(Instant::now() + silence_limit);
                    }
                    match item {
                        Some(Ok(StompItem::Heartbeat)) => {}
                        Some(Ok(StompItem::Frame(f))) => {
                            if let Some(exit) = self.dispatch(f) {
                                break exit;
                            }
                        }
                        Some(Err(e)) => break Exit::Lost(e.to_string()),
                        None => break Exit::Lost("connection closed by broker".into()),
                    }
                }
                _ = hb_tick.tick(), if self.send_interval.is_some() => {
                    if let Err(e) = sink.send(StompItem::Heartbeat).await {
                        break Exit::Lost(e.to_string());
                    }
                }
                _ = &mut watchdog, if self.recv_interval.is_some() => {
                    let _ = sink.close().await;
                    break Exit::Lost(format!("no data from broker for {:?}", silence_limit));
                }
            }
        };

        self.finish(exit);
    }

    /// Route one inbound frame. Returns `Some` when the session must end.
    fn dispatch(&self, frame: Frame) -> Option<Exit> {
        match frame.command.as_str() {
            "MESSAGE" => {
                let subs = lock(&self.subscriptions);
                if let Some(id) = frame.get_header("subscription").map(str::to_string) {
                    match subs.get(&id) {
                        Some(entry) => {
                            let _ = entry.sender.send(frame.into());
                        }
                        None => debug!(subscription_id = %id, "MESSAGE for unknown subscription"),
                    }
                } else if let Some(dest) = frame.get_header("destination") {
                    for entry in subs.values().filter(|e| e.destination == dest) {
                        let _ = entry.sender.send(frame.clone().into());
                    }
                }
                None
            }
            "RECEIPT" => {
                if let Some(id) = frame.get_header("receipt-id") {
                    if let Some(waiter) = lock(&self.pending_receipts).remove(id) {
                        let _ = waiter.send(Ok(()));
                    }
                }
                None
            }
            "ERROR" => {
                let err = ServerError::from_frame(frame);
                if let Some(id) = err.receipt_id.as_deref() {
                    if let Some(waiter) = lock(&self.pending_receipts).remove(id) {
                        let _ = waiter.send(Err(err.clone()));
                    }
                }
                Some(Exit::Broker(err))
            }
            other => {
                debug!(command = other, "ignoring frame");
                None
            }
        }
    }

    /// Tell subscribers why the session ended, then close their channels.
    fn finish(self, exit: Exit) {
        let closing = self.closing.load(Ordering::SeqCst);
        let failure = match exit {
            Exit::Shutdown => None,
            Exit::Lost(_) if closing => None,
            Exit::Lost(reason) => {
                warn!(%reason, "STOMP connection lost");
                Some(MessageError::ConnectionLost(reason))
            }
            Exit::Broker(err) => {
                warn!(error = %err, "broker sent ERROR frame");
                Some(MessageError::Server(err))
            }
        };

        let subs: Vec<SubscriptionEntry> = lock(&self.subscriptions).drain().map(|(_, e)| e).collect();
        if let Some(failure) = failure {
            for entry in &subs {
                let _ = entry.sender.send(InboundMessage::failed(failure.clone()));
            }
        }
        lock(&self.pending_receipts).clear();
        debug!(subscriptions = subs.len(), "STOMP I/O task stopped");
    }
}
