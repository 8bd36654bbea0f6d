//! # Summary
//!
//! Abstracts over intra-process channels carrying dispatched messages
//! between the peer network and role handlers, backed by
//! `tokio::sync::mpsc`. Channels are unbounded: roles never suspend
//! attempting to hand a decoded message off, matching the single
//! event-loop-per-replica scheduling model (§5).

use tokio::sync::mpsc;

/// Intra-process receiving channel.
pub struct Rx<T>(mpsc::UnboundedReceiver<T>);

/// Intra-process transmitting channel. Clones share one receiver.
#[derive(Clone)]
pub struct Tx<T>(mpsc::UnboundedSender<T>);

pub fn channel<T>() -> (Tx<T>, Rx<T>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Tx(tx), Rx(rx))
}

impl<T> Tx<T> {
    /// Sends a message, logging (rather than panicking) if the
    /// receiving end has already been dropped during shutdown.
    pub fn send(&self, message: T) {
        if self.0.send(message).is_err() {
            trace!("dropped message: receiver already gone");
        }
    }
}

impl<T> Rx<T> {
    pub async fn recv(&mut self) -> Option<T> {
        self.0.recv().await
    }
}
