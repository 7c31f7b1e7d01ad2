//! A tiny in-process STOMP broker for end-to-end tests.
//!
//! Queues keep messages until a subscriber shows up; once subscribers exist
//! every SEND is copied to each of them. SENDs to `/queue/forbidden` are
//! answered with an ERROR frame, which ends that connection.

use futures::{SinkExt, StreamExt};
use simple_stomp::{Frame, StompCodec, StompItem};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::codec::Framed;

pub const FORBIDDEN_QUEUE: &str = "forbidden";

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum Login {
    Accept,
    Reject,
}

struct Subscriber {
    conn: u64,
    id: String,
    destination: String,
    outbound: mpsc::UnboundedSender<Frame>,
}

#[derive(Default)]
struct BrokerState {
    backlog: HashMap<String, VecDeque<Frame>>,
    subscribers: Vec<Subscriber>,
    received: Vec<Frame>,
    message_ids: u64,
}

impl BrokerState {
    fn message(&mut self, send: &Frame, subscription: &str) -> Frame {
        self.message_ids += 1;
        let mut f = Frame::new("MESSAGE")
            .header("subscription", subscription)
            .header("message-id", format!("msg-{}", self.message_ids));
        for (k, v) in &send.headers {
            if k != "receipt" {
                f = f.header(k, v);
            }
        }
        f.set_body(send.body.clone())
    }
}

#[derive(Clone)]
pub struct FakeBroker {
    pub port: u16,
    state: Arc<Mutex<BrokerState>>,
}

impl FakeBroker {
    pub async fn start(login: Login) -> FakeBroker {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("local addr").port();
        let state = Arc::new(Mutex::new(BrokerState::default()));
        let conn_ids = Arc::new(AtomicU64::new(1));

        let accept_state = state.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let conn = conn_ids.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(serve(stream, conn, login, accept_state.clone()));
            }
        });

        FakeBroker { port, state }
    }

    /// Every frame received so far with the given command.
    pub fn received(&self, command: &str) -> Vec<Frame> {
        let state = self.state.lock().unwrap();
        state
            .received
            .iter()
            .filter(|f| f.command == command)
            .cloned()
            .collect()
    }

    pub fn active_subscriptions(&self) -> usize {
        self.state.lock().unwrap().subscribers.len()
    }

    /// Queue a message on `destination` as if another producer sent it.
    pub fn publish(&self, destination: &str, body: &str) {
        let send = Frame::new("SEND")
            .header("destination", destination)
            .header("content-type", "text/plain")
            .set_body(body.as_bytes().to_vec());
        let mut state = self.state.lock().unwrap();
        route(&mut state, &send);
    }
}

fn route(state: &mut BrokerState, send: &Frame) {
    let destination = send.get_header("destination").unwrap_or_default().to_string();
    let targets: Vec<(String, mpsc::UnboundedSender<Frame>)> = state
        .subscribers
        .iter()
        .filter(|s| s.destination == destination)
        .map(|s| (s.id.clone(), s.outbound.clone()))
        .collect();
    if targets.is_empty() {
        state
            .backlog
            .entry(destination)
            .or_default()
            .push_back(send.clone());
        return;
    }
    for (id, outbound) in targets {
        let message = state.message(send, &id);
        let _ = outbound.send(message);
    }
}

async fn serve(stream: TcpStream, conn: u64, login: Login, state: Arc<Mutex<BrokerState>>) {
    let (mut sink, mut frames) = Framed::new(stream, StompCodec::new()).split();
    let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<Frame>();
    let writer = tokio::spawn(async move {
        while let Some(f) = outbound_rx.recv().await {
            if sink.send(StompItem::Frame(f)).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    while let Some(Ok(item)) = frames.next().await {
        let StompItem::Frame(frame) = item else {
            continue;
        };
        state.lock().unwrap().received.push(frame.clone());
        let receipt = frame.get_header("receipt").map(str::to_string);

        match frame.command.as_str() {
            "CONNECT" => {
                if login == Login::Reject {
                    let _ = outbound.send(
                        Frame::new("ERROR")
                            .header("message", "Authentication failed")
                            .set_body(b"Invalid credentials".to_vec()),
                    );
                    break;
                }
                let _ = outbound.send(
                    Frame::new("CONNECTED")
                        .header("version", "1.2")
                        .header("heart-beat", "0,0")
                        .header("server", "fake-broker"),
                );
            }
            "SUBSCRIBE" => {
                let id = frame.get_header("id").unwrap_or_default().to_string();
                let destination = frame.get_header("destination").unwrap_or_default().to_string();
                let mut state = state.lock().unwrap();
                let waiting: Vec<Frame> = state
                    .backlog
                    .remove(&destination)
                    .map(Vec::from)
                    .unwrap_or_default();
                for send in waiting {
                    let message = state.message(&send, &id);
                    let _ = outbound.send(message);
                }
                state.subscribers.push(Subscriber {
                    conn,
                    id,
                    destination,
                    outbound: outbound.clone(),
                });
            }
            "UNSUBSCRIBE" => {
                let id = frame.get_header("id").unwrap_or_default();
                state
                    .lock()
                    .unwrap()
                    .subscribers
                    .retain(|s| !(s.conn == conn && s.id == id));
            }
            "SEND" => {
                let forbidden = format!("/queue/{}", FORBIDDEN_QUEUE);
                if frame.get_header("destination") == Some(forbidden.as_str()) {
                    let mut error = Frame::new("ERROR").header("message", "access denied");
                    if let Some(r) = &receipt {
                        error = error.header("receipt-id", r);
                    }
                    let _ = outbound.send(error);
                    break;
                }
                route(&mut state.lock().unwrap(), &frame);
                if let Some(r) = receipt {
                    let _ = outbound.send(Frame::new("RECEIPT").header("receipt-id", r));
                }
            }
            "DISCONNECT" => {
                if let Some(r) = receipt {
                    let _ = outbound.send(Frame::new("RECEIPT").header("receipt-id", r));
                }
                break;
            }
            _ => {}
        }
    }

    state
        .lock()
        .unwrap()
        .subscribers
        .retain(|s| s.conn != conn);
    drop(outbound);
    let _ = writer.await;
}
