//! # Summary
//!
//! Binds one `Acceptor`, an optional `Proposer` (present only on group
//! roots in the hierarchical variant — §4.7), and one `Learner` to a
//! single `Peers` set, and runs the per-replica event loop: all role
//! handlers, timer callbacks, and I/O callbacks execute on the one
//! task driving `run`, so role state needs no internal locking (§5).

use std::time::Duration;

use tokio::time;

use crate::acceptor::Acceptor;
use crate::config::Config;
use crate::internal;
use crate::learner::Learner;
use crate::message::{Aid, Frame, ProtocolMessage, Value};
use crate::net::Peers;
use crate::proposer::Proposer;
use crate::storage::{Storage, StorageError};
use crate::topology::{AcceptorNode, Topology};

const HOLE_CHECK_INTERVAL: Duration = Duration::from_millis(100);
const HOLE_CHECK_BATCH: u32 = 10;
const ACCEPTOR_STATE_INTERVAL: Duration = Duration::from_secs(2);

/// The decisions a learner has delivered, handed to whatever the
/// embedding application does with a totally-ordered command log.
/// Consuming delivered values is explicitly out of scope for the core
/// (spec.md §1); this is the seam where an application plugs in.
pub type Deliveries = tokio::sync::mpsc::UnboundedReceiver<(u32, Value)>;

pub struct Replica<S: Storage> {
    id: Aid,
    acceptor: Acceptor<S>,
    proposer: Option<Proposer>,
    learner: Learner,
    peers: Peers,
    inbound: internal::Rx<(Aid, Frame)>,
}

impl<S: Storage> Replica<S> {
    pub fn new(id: Aid, storage: S, config: &Config, is_proposer: bool) -> Self {
        let nodes: Vec<AcceptorNode> = config
            .acceptors
            .iter()
            .map(|a| AcceptorNode { aid: a.id, group_id: a.group_id, parent_id: a.parent_id })
            .collect();
        let topology = Topology::build(&nodes);
        let (peers, inbound) = Peers::new(id, config.tcp_nodelay);

        let acceptor = Acceptor::new(id, storage, topology);
        let proposer = is_proposer.then(|| Proposer::new(id, config.acceptor_count(), config.proposer_preexec_window, config.proposer_timeout, 1));
        let learner = Learner::new(config.acceptor_count(), 1, !is_proposer && config.learner_catch_up);

        Replica { id, acceptor, proposer, learner, peers, inbound }
    }

    pub fn id(&self) -> Aid {
        self.id
    }

    /// Binds the listener and outbound connections to peer acceptors,
    /// then runs the dispatch loop until `shutdown` fires.
    pub async fn run(mut self, port: u16, config: &Config, deliveries: tokio::sync::mpsc::UnboundedSender<(u32, Value)>, mut shutdown: tokio::sync::oneshot::Receiver<()>) -> std::io::Result<()> {
        self.peers.listen(port).await?;
        self.peers.connect_to_acceptors(&config.acceptors);

        let mut hole_check = time::interval(HOLE_CHECK_INTERVAL);
        let mut acceptor_state_tick = time::interval(ACCEPTOR_STATE_INTERVAL);

        loop {
            tokio::select! {
                biased;

                _ = &mut shutdown => {
                    info!("replica {} shutting down", self.id);
                    self.peers.shutdown().await;
                    return Ok(());
                }

                Some((src, frame)) = self.inbound.recv() => {
                    self.dispatch(src, frame, &deliveries).map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
                }

                _ = hole_check.tick() => {
                    if let Some((from, to)) = self.learner.has_holes() {
                        let to = to.min(from + HOLE_CHECK_BATCH);
                        self.peers.broadcast_acceptors(Frame { tracer: 0, message: ProtocolMessage::Repeat { from_iid: from, to_iid: to } });
                    }
                }

                _ = acceptor_state_tick.tick() => {
                    self.peers.broadcast_acceptors(Frame {
                        tracer: 0,
                        message: ProtocolMessage::AcceptorState { aid: self.id, trim_iid: self.acceptor.trim_iid() },
                    });
                }
            }
        }
    }

    fn dispatch(&mut self, src: Aid, frame: Frame, deliveries: &tokio::sync::mpsc::UnboundedSender<(u32, Value)>) -> Result<(), StorageError> {
        match frame.message {
            ProtocolMessage::Prepare { iid, ballot } => {
                let down: Vec<Aid> = self.acceptor.down_acceptors().collect();
                self.peers.broadcast_down_acceptors(&down, frame.clone());
                if let Some(reply) = self.acceptor.on_prepare(src, iid, ballot)? {
                    self.peers.send_to(reply.to, Frame { tracer: frame.tracer, message: reply.message });
                }
            }
            ProtocolMessage::Accept { iid, ballot, value } => {
                let down: Vec<Aid> = self.acceptor.down_acceptors().collect();
                let down_frame = Frame { tracer: frame.tracer, message: ProtocolMessage::Accept { iid, ballot, value: value.clone() } };
                self.peers.broadcast_down_acceptors(&down, down_frame);
                if let Some(reply) = self.acceptor.on_accept(src, iid, ballot, value)? {
                    self.peers.send_to(reply.to, Frame { tracer: frame.tracer, message: reply.message });
                }
            }
            ProtocolMessage::Repeat { from_iid, to_iid } => {
                for reply in self.acceptor.on_repeat(src, from_iid, to_iid)? {
                    self.peers.send_to(reply.to, Frame { tracer: frame.tracer, message: reply.message });
                }
            }
            ProtocolMessage::Trim { iid } => {
                self.acceptor.on_trim(iid)?;
            }
            ProtocolMessage::Promise { aid, iid, ballot, value, value_ballot, participants } => {
                if let Some(proposer) = self.proposer.as_mut() {
                    for message in proposer.on_promise(aid, iid, ballot, value, value_ballot) {
                        self.peers.broadcast_acceptors(Frame { tracer: frame.tracer, message });
                    }
                } else if let Some(parent) = self.acceptor.route_upward(iid)? {
                    let message = ProtocolMessage::Promise { aid, iid, ballot, value, value_ballot, participants };
                    self.peers.send_to(parent, Frame { tracer: frame.tracer, message });
                }
            }
            ProtocolMessage::Accepted { aid, iid, ballot, value, participants } => {
                if let Some(proposer) = self.proposer.as_mut() {
                    proposer.on_accepted(aid, iid, ballot);
                } else if let Some(parent) = self.acceptor.route_upward(iid)? {
                    let message = ProtocolMessage::Accepted { aid, iid, ballot, value: value.clone(), participants };
                    self.peers.send_to(parent, Frame { tracer: frame.tracer, message });
                }
                self.learner.on_accepted(aid, iid, ballot, value);
                while let Some((delivered_iid, value)) = self.learner.deliver_next() {
                    deliveries.send((delivered_iid, value)).ok();
                }
            }
            ProtocolMessage::Preempted { aid, iid, ballot } => {
                if let Some(proposer) = self.proposer.as_mut() {
                    for message in proposer.on_preempted(iid, ballot) {
                        self.peers.broadcast_acceptors(Frame { tracer: frame.tracer, message });
                    }
                } else if let Some(parent) = self.acceptor.route_upward(iid)? {
                    let message = ProtocolMessage::Preempted { aid, iid, ballot };
                    self.peers.send_to(parent, Frame { tracer: frame.tracer, message });
                }
            }
            ProtocolMessage::AcceptorState { aid, trim_iid } => {
                if let Some(proposer) = self.proposer.as_mut() {
                    proposer.on_acceptor_state(aid, trim_iid);
                }
            }
            ProtocolMessage::ClientValue { value } => {
                if let Some(proposer) = self.proposer.as_mut() {
                    for message in proposer.propose(value) {
                        self.peers.broadcast_acceptors(Frame { tracer: frame.tracer, message });
                    }
                }
            }
        }
        Ok(())
    }
}
