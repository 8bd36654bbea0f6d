//! # Summary
//!
//! The peer registry (§4.6): one listener for inbound (client-role)
//! connections, one supervised outbound connection per configured
//! acceptor, a shared inbound queue every peer's read half funnels
//! into, and broadcast helpers (`broadcast_acceptors`,
//! `broadcast_down_acceptors`) the acceptor/proposer/learner use to fan
//! messages out. Unlike the original's subscription table of role
//! callbacks, dispatch by message type happens in [`crate::replica`];
//! `Peers` only owns connection lifecycle and routing.

use std::collections::HashMap as Map;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::config::AcceptorEntry;
use crate::internal;
use crate::message::{Aid, Frame};
use crate::net::peer;

/// Ephemeral ids handed to accepted (client-role) connections start
/// here, clear of the small dense range real acceptor/proposer ids
/// occupy.
const CLIENT_ID_BASE: Aid = 1 << 20;

type PeerMap = Arc<RwLock<Map<Aid, internal::Tx<Frame>>>>;

pub struct Peers {
    self_id: Aid,
    tcp_nodelay: bool,
    outbound: PeerMap,
    inbound: PeerMap,
    inbound_rx_tx: internal::Tx<(Aid, Frame)>,
    next_client_id: AtomicU32,
    tasks: RwLock<Vec<JoinHandle<()>>>,
}

impl Peers {
    /// Returns the registry plus the single stream of `(peer_id,
    /// frame)` pairs every connection's read half feeds into.
    pub fn new(self_id: Aid, tcp_nodelay: bool) -> (Self, internal::Rx<(Aid, Frame)>) {
        let (tx, rx) = internal::channel();
        let peers = Peers {
            self_id,
            tcp_nodelay,
            outbound: Arc::new(RwLock::new(Map::new())),
            inbound: Arc::new(RwLock::new(Map::new())),
            inbound_rx_tx: tx,
            next_client_id: AtomicU32::new(CLIENT_ID_BASE),
            tasks: RwLock::new(Vec::new()),
        };
        (peers, rx)
    }

    /// §4.6 `peers_listen`: binds a listener; every accepted connection
    /// is registered as an inbound client-role peer.
    pub async fn listen(&self, port: u16) -> std::io::Result<()> {
        let listener = TcpListener::bind(("0.0.0.0", port)).await?;
        let inbound_rx_tx = self.inbound_rx_tx.clone();
        let inbound_map = self.inbound.clone();
        let nodelay = self.tcp_nodelay;
        let next_client_id = AtomicU32::new(self.next_client_id.load(Ordering::Relaxed));
        info!("listening on port {}", port);
        let handle = tokio::spawn(async move {
            loop {
                let (stream, addr) = match listener.accept().await {
                    Ok(pair) => pair,
                    Err(error) => {
                        warn!("accept error: {}", error);
                        continue;
                    }
                };
                let client_id = next_client_id.fetch_add(1, Ordering::Relaxed);
                peer::configure(&stream, nodelay).ok();
                info!("accepted connection from {} as client {}", addr, client_id);
                let (outbound_tx, outbound_rx) = internal::channel();
                inbound_map.write().insert(client_id, outbound_tx);
                let peer_inbound = inbound_rx_tx.clone();
                let inbound_map = inbound_map.clone();
                tokio::spawn(async move {
                    peer::run(client_id, stream, peer_inbound, outbound_rx).await;
                    inbound_map.write().remove(&client_id);
                });
            }
        });
        self.tasks.write().push(handle);
        Ok(())
    }

    /// §4.6 `peers_connect_to_acceptors`: opens one supervised
    /// outbound connection per configured acceptor, reconnecting on
    /// failure or drop every 2 s.
    pub fn connect_to_acceptors(&self, acceptors: &[AcceptorEntry]) {
        for acceptor in acceptors {
            if acceptor.id == self.self_id {
                continue;
            }
            self.spawn_outbound(acceptor.id, acceptor.address);
        }
    }

    fn spawn_outbound(&self, aid: Aid, addr: SocketAddr) {
        let inbound_rx_tx = self.inbound_rx_tx.clone();
        let outbound_map = self.outbound.clone();
        let nodelay = self.tcp_nodelay;
        let handle = tokio::spawn(async move {
            loop {
                let stream = peer::connect_loop(aid, addr).await;
                peer::configure(&stream, nodelay).ok();
                let (outbound_tx, outbound_rx) = internal::channel();
                outbound_map.write().insert(aid, outbound_tx);
                peer::run(aid, stream, inbound_rx_tx.clone(), outbound_rx).await;
                outbound_map.write().remove(&aid);
                warn!("lost connection to acceptor {}; reconnecting", aid);
            }
        });
        self.tasks.write().push(handle);
    }

    pub fn send_to(&self, aid: Aid, frame: Frame) {
        if let Some(tx) = self.outbound.read().get(&aid) {
            tx.send(frame);
        } else if let Some(tx) = self.inbound.read().get(&aid) {
            tx.send(frame);
        } else {
            trace!("no connection registered for peer {}", aid);
        }
    }

    pub fn broadcast_acceptors(&self, frame: Frame) {
        for tx in self.outbound.read().values() {
            tx.send(frame.clone());
        }
    }

    /// Fans `frame` out to a precomputed set of subordinate acceptors
    /// (§4.6 hierarchical forwarding), skipping any not currently
    /// connected.
    pub fn broadcast_down_acceptors(&self, down: &[Aid], frame: Frame) {
        let outbound = self.outbound.read();
        for aid in down {
            if let Some(tx) = outbound.get(aid) {
                tx.send(frame.clone());
            }
        }
    }

    pub async fn shutdown(&self) {
        for handle in self.tasks.write().drain(..) {
            handle.abort();
        }
    }
}
