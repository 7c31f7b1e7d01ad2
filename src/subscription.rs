use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::connection::StompSession;
use crate::error::Result;
use crate::session::{InboundMessage, Subscription};

/// Handle returned by [`StompSession`]'s `subscribe`.
///
/// Messages arrive in broker order on an unbounded channel. Dropping the
/// handle without calling `unsubscribe` still sends UNSUBSCRIBE, on a
/// best-effort basis.
pub struct StompSubscription {
    id: String,
    destination: String,
    receiver: mpsc::UnboundedReceiver<InboundMessage>,
    session: StompSession,
    released: bool,
}

impl StompSubscription {
    pub(crate) fn new(
        id: String,
        destination: String,
        receiver: mpsc::UnboundedReceiver<InboundMessage>,
        session: StompSession,
    ) -> Self {
        Self {
            id,
            destination,
            receiver,
            session,
            released: false,
        }
    }
}

#[async_trait]
impl Subscription for StompSubscription {
    fn id(&self) -> &str {
        &self.id
    }

    fn destination(&self) -> &str {
        &self.destination
    }

    async fn recv(&mut self) -> Option<InboundMessage> {
        self.receiver.recv().await
    }

    async fn unsubscribe(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        self.session.unsubscribe(&self.id).await
    }
}

impl Drop for StompSubscription {
    fn drop(&mut self) {
        if !self.released {
            self.session.release(&self.id);
        }
    }
}
