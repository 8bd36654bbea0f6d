//! # Summary
//!
//! This module implements the `Acceptor` role (§4.3): Paxos's durable
//! memory. Four handlers drive a `Storage` transaction per invocation;
//! each returns the outbound message(s) the caller (the peer dispatch
//! loop) should send, rather than sending them itself, so the state
//! machine can be driven directly in tests without a socket.

use crate::message::{Aid, Ballot, Iid, Participant, ProtocolMessage};
use crate::storage::{AcceptorRecord, Storage, StorageError, Transaction};
use crate::topology::Topology;

/// Outcome of a handler: zero or more messages to send, each to a
/// specific destination. `src` is the acceptor id the reply is routed
/// back to, resolved from the stored participant set for hierarchical
/// forwarding.
#[derive(Debug, Clone, PartialEq)]
pub struct Outbound {
    pub to: Aid,
    pub message: ProtocolMessage,
}

pub struct Acceptor<S: Storage> {
    id: Aid,
    trim_iid: Iid,
    storage: S,
    topology: Topology,
}

impl<S: Storage> Acceptor<S> {
    pub fn new(id: Aid, storage: S, topology: Topology) -> Self {
        let trim_iid = storage.get_trim_instance();
        Acceptor { id, trim_iid, storage, topology }
    }

    pub fn id(&self) -> Aid {
        self.id
    }

    pub fn trim_iid(&self) -> Iid {
        self.trim_iid
    }

    /// §4.3 "On Prepare": promotes the stored promised ballot if `ballot`
    /// is at least as high, otherwise only records `src` as a
    /// participant so a later upward reply can still reach it.
    pub fn on_prepare(&mut self, src: Aid, iid: Iid, ballot: Ballot) -> Result<Option<Outbound>, StorageError> {
        if iid <= self.trim_iid {
            trace!("dropping prepare for trimmed iid {}", iid);
            return Ok(None);
        }

        let mut txn = Transaction::begin(&mut self.storage)?;
        let mut record = txn.get(iid)?.unwrap_or_else(|| AcceptorRecord::empty(iid));

        if record.promised_ballot <= ballot {
            record.promised_ballot = ballot;
        }
        record.participants.insert(src, ballot);

        let reply = Outbound {
            to: src,
            message: ProtocolMessage::Promise {
                aid: self.id,
                iid,
                ballot: record.promised_ballot,
                value: record.accepted_value.clone(),
                value_ballot: record.value_ballot,
                participants: participants_of(&record),
            },
        };

        txn.put(record)?;
        txn.commit()?;
        Ok(Some(reply))
    }

    /// §4.3 "On Accept": accepts the value if `ballot` is at least as
    /// high as the stored promise, otherwise preempts the sender.
    pub fn on_accept(&mut self, src: Aid, iid: Iid, ballot: Ballot, value: Vec<u8>) -> Result<Option<Outbound>, StorageError> {
        if iid <= self.trim_iid {
            trace!("dropping accept for trimmed iid {}", iid);
            return Ok(None);
        }

        let mut txn = Transaction::begin(&mut self.storage)?;
        let mut record = txn.get(iid)?.unwrap_or_else(|| AcceptorRecord::empty(iid));

        let reply = if record.promised_ballot <= ballot {
            record.promised_ballot = ballot;
            record.value_ballot = ballot;
            record.accepted_value = Some(value.clone());
            record.participants.insert(src, ballot);
            Outbound {
                to: src,
                message: ProtocolMessage::Accepted {
                    aid: self.id,
                    iid,
                    ballot,
                    value,
                    participants: participants_of(&record),
                },
            }
        } else {
            Outbound {
                to: src,
                message: ProtocolMessage::Preempted { aid: self.id, iid, ballot: record.promised_ballot },
            }
        };

        txn.put(record)?;
        txn.commit()?;
        Ok(Some(reply))
    }

    /// §4.3 "On Repeat": replays a previously accepted value, if any.
    pub fn on_repeat(&mut self, src: Aid, from_iid: Iid, to_iid: Iid) -> Result<Vec<Outbound>, StorageError> {
        let mut replies = Vec::new();
        for iid in from_iid..=to_iid {
            if let Some(record) = self.storage.get(iid)? {
                if let Some(value) = record.accepted_value.clone() {
                    if !value.is_empty() {
                        replies.push(Outbound {
                            to: src,
                            message: ProtocolMessage::Accepted {
                                aid: self.id,
                                iid,
                                ballot: record.value_ballot,
                                value,
                                participants: participants_of(&record),
                            },
                        });
                    }
                }
            }
        }
        Ok(replies)
    }

    /// §4.3 "On Trim": advances the trim watermark and discards
    /// records at or below it.
    pub fn on_trim(&mut self, iid: Iid) -> Result<(), StorageError> {
        if iid > self.trim_iid {
            let mut txn = Transaction::begin(&mut self.storage)?;
            txn.trim(iid)?;
            txn.commit()?;
            self.trim_iid = iid;
            info!("trimmed acceptor {} up to iid {}", self.id, iid);
        }
        Ok(())
    }

    /// Hierarchical forwarding (§4.3, §4.6): every acceptor in this
    /// node's subtree that a Prepare/Accept should be propagated to
    /// before local processing.
    pub fn down_acceptors(&self) -> impl Iterator<Item = Aid> + '_ {
        self.topology.down_acceptors(self.id)
    }

    /// Resolves the originator of a reply at `iid` using the stored
    /// participant set, falling back to this node's configured parent
    /// for the upward hop in a hierarchy.
    pub fn route_upward(&self, iid: Iid) -> Result<Option<Aid>, StorageError> {
        Ok(self
            .storage
            .get(iid)?
            .and_then(|record| record.participants.keys().next().copied())
            .or_else(|| self.topology.parent_of(self.id)))
    }
}

fn participants_of(record: &AcceptorRecord) -> Vec<Participant> {
    record
        .participants
        .iter()
        .map(|(&aid, &ballot)| Participant { aid, ballot })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    fn acceptor(id: Aid) -> Acceptor<MemoryStorage> {
        Acceptor::new(id, MemoryStorage::new(), Topology::default())
    }

    #[test]
    fn prepare_on_empty_instance_promises_ballot_with_no_value() {
        let mut a = acceptor(0);
        let reply = a.on_prepare(9, 1, Ballot::new(1, 0)).unwrap().unwrap();
        assert_eq!(reply.to, 9);
        match reply.message {
            ProtocolMessage::Promise { value, value_ballot, ballot, .. } => {
                assert_eq!(value, None);
                assert_eq!(value_ballot, Ballot::ZERO);
                assert_eq!(ballot, Ballot::new(1, 0));
            }
            other => panic!("expected Promise, got {:?}", other),
        }
    }

    #[test]
    fn prepare_with_lower_ballot_does_not_overwrite_but_still_replies() {
        let mut a = acceptor(0);
        a.on_prepare(9, 1, Ballot::new(5, 0)).unwrap();
        let reply = a.on_prepare(8, 1, Ballot::new(2, 1)).unwrap().unwrap();
        match reply.message {
            ProtocolMessage::Promise { ballot, .. } => assert_eq!(ballot, Ballot::new(5, 0)),
            other => panic!("expected Promise, got {:?}", other),
        }
    }

    #[test]
    fn accept_at_or_above_promised_ballot_succeeds() {
        let mut a = acceptor(0);
        a.on_prepare(9, 1, Ballot::new(1, 0)).unwrap();
        let reply = a.on_accept(9, 1, Ballot::new(1, 0), b"x".to_vec()).unwrap().unwrap();
        assert!(matches!(reply.message, ProtocolMessage::Accepted { .. }));
    }

    #[test]
    fn accept_below_promised_ballot_is_preempted() {
        let mut a = acceptor(0);
        a.on_prepare(9, 1, Ballot::new(5, 0)).unwrap();
        let reply = a.on_accept(9, 1, Ballot::new(2, 1), b"x".to_vec()).unwrap().unwrap();
        match reply.message {
            ProtocolMessage::Preempted { ballot, .. } => assert_eq!(ballot, Ballot::new(5, 0)),
            other => panic!("expected Preempted, got {:?}", other),
        }
    }

    #[test]
    fn prepare_and_accept_at_trim_instance_are_dropped() {
        let mut a = acceptor(0);
        a.on_trim(5).unwrap();
        assert!(a.on_prepare(9, 5, Ballot::new(1, 0)).unwrap().is_none());
        assert!(a.on_accept(9, 5, Ballot::new(1, 0), b"x".to_vec()).unwrap().is_none());
    }

    #[test]
    fn prepare_and_accept_just_above_trim_instance_proceed() {
        let mut a = acceptor(0);
        a.on_trim(5).unwrap();
        assert!(a.on_prepare(9, 6, Ballot::new(1, 0)).unwrap().is_some());
    }

    #[test]
    fn repeat_replays_accepted_value() {
        let mut a = acceptor(0);
        a.on_accept(9, 1, Ballot::new(1, 0), b"x".to_vec()).unwrap();
        let replies = a.on_repeat(9, 1, 1).unwrap();
        assert_eq!(replies.len(), 1);
        match &replies[0].message {
            ProtocolMessage::Accepted { iid, .. } => assert_eq!(*iid, 1),
            other => panic!("expected Accepted, got {:?}", other),
        }
    }

    #[test]
    fn repeat_over_range_with_no_accepted_values_replies_empty() {
        let mut a = acceptor(0);
        let replies = a.on_repeat(9, 1, 10).unwrap();
        assert!(replies.is_empty());
    }
}
