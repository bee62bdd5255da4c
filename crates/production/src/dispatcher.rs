//! Notification delivery off the request path.
//!
//! Round actions are produced under the round lock; delivering them to
//! clients must never block a request. The dispatcher queues every message
//! on an unbounded channel drained by its own task, which preserves the
//! order in which the engine emitted them.

use crate::Transport;
use coinjoin_core::{Notification, PrivateMessage};
use coinjoin_types::Username;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

enum Outbound {
    Broadcast(Notification),
    Private {
        username: Username,
        message: PrivateMessage,
    },
    Flush(oneshot::Sender<()>),
}

/// Handle to the dispatch task. Cheap to clone.
#[derive(Clone)]
pub struct NotificationDispatcher {
    tx: mpsc::UnboundedSender<Outbound>,
}

impl NotificationDispatcher {
    /// Spawn the dispatch task on the current tokio runtime.
    ///
    /// The task ends once every handle has been dropped.
    pub fn spawn(transport: Arc<dyn Transport>) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(async move {
            while let Some(outbound) = rx.recv().await {
                match outbound {
                    Outbound::Broadcast(notification) => {
                        trace!(
                            round_id = %notification.round_id(),
                            kind = notification.type_name(),
                            "Broadcasting"
                        );
                        transport.broadcast(&notification).await;
                    }
                    Outbound::Private { username, message } => {
                        trace!(%username, kind = message.type_name(), "Sending private message");
                        transport.send_private(&username, &message).await;
                    }
                    Outbound::Flush(done) => {
                        let _ = done.send(());
                    }
                }
            }
            debug!("Notification dispatcher stopped");
        });
        (Self { tx }, handle)
    }

    pub fn broadcast(&self, notification: Notification) {
        self.send(Outbound::Broadcast(notification));
    }

    pub fn send_private(&self, username: Username, message: PrivateMessage) {
        self.send(Outbound::Private { username, message });
    }

    /// Wait until everything queued so far has been handed to the transport.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        self.send(Outbound::Flush(done_tx));
        let _ = done_rx.await;
    }

    fn send(&self, outbound: Outbound) {
        if self.tx.send(outbound).is_err() {
            warn!("Notification dispatcher is gone, dropping message");
        }
    }
}
