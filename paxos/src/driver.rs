//! # Summary
//!
//! The multi-replica driver (§4.7, §9): runs N replicas as cooperating
//! tasks sharing one Tokio runtime, each with its own event loop and
//! role state (§5 "the multi-replica driver may run several replicas
//! as parallel workers"). The configuration record is the one piece of
//! state genuinely shared read-mostly across workers; an `Arc` gives it
//! the same "destroyed once, last-worker-out" lifetime the original's
//! recursive-mutex-guarded global achieved by hand.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::message::{Aid, Value};
use crate::replica::Replica;
use crate::storage::Storage;

/// One running replica's shutdown handle and delivery stream.
pub struct Worker {
    pub id: Aid,
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<std::io::Result<()>>,
    pub deliveries: mpsc::UnboundedReceiver<(u32, Value)>,
}

impl Worker {
    /// Signals the replica to stop and awaits its task. Leaves-first
    /// destruction order (proposer, learner, acceptor, peers — §5) is
    /// internal to `Replica::run`; at this layer we only await the
    /// task boundary.
    pub async fn shutdown(mut self) -> std::io::Result<()> {
        if let Some(tx) = self.shutdown.take() {
            tx.send(()).ok();
        }
        self.handle.await.unwrap_or(Ok(()))
    }
}

/// Spawns one worker task per replica, all sharing the current Tokio
/// runtime. `storage_for` constructs each replica's backend (so the
/// caller can choose memory vs. disk per the `storage_backend` option
/// without this module depending on the disk feature directly).
pub fn spawn_replicas<S, F>(config: Arc<Config>, make_storage: F) -> Vec<Worker>
where
    S: Storage + 'static,
    F: Fn(Aid) -> S,
{
    config
        .acceptors
        .iter()
        .map(|entry| {
            let id = entry.id;
            let is_proposer = config.proposers.iter().any(|p| p.id == id);
            let storage = make_storage(id);
            let replica = Replica::new(id, storage, &config, is_proposer);
            let (shutdown_tx, shutdown_rx) = oneshot::channel();
            let (delivery_tx, delivery_rx) = mpsc::unbounded_channel();
            let port = entry.address.port();
            let config = config.clone();
            let handle = tokio::spawn(async move { replica.run(port, &config, delivery_tx, shutdown_rx).await });
            Worker { id, shutdown: Some(shutdown_tx), handle, deliveries: delivery_rx }
        })
        .collect()
}
