//! # Summary
//!
//! This module defines the wire message model: a tagged union of nine
//! protocol messages exchanged between acceptors, proposers, and
//! learners, plus the `Ballot` and `Frame` types that wrap them.
//!
//! Encoding is handled by `bincode` over a length-delimited transport
//! (see `crate::net::codec`). Because `bincode` self-describes `Vec`
//! lengths, a truncated or malformed frame fails to decode rather than
//! reading out of bounds — this is the Rust-native equivalent of the
//! array-length validation the original C implementation performed by
//! hand.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Identifies a slot in the totally-ordered log.
pub type Iid = u32;

/// Index into the static acceptor table.
pub type Aid = u32;

/// Opaque client value. The core never inspects its contents.
pub type Value = Vec<u8>;

/// Number of low bits of a ballot reserved for the proposer id.
///
/// `Ballot`s are compared as plain `u32`s, so a higher counter always
/// outranks a lower one regardless of which proposer owns it, and two
/// proposers can never produce equal ballots as long as each seeds its
/// counter above anything it has observed.
pub const PROPOSER_ID_BITS: u32 = 10;

/// A ballot is uniquely determined by its proposer's id and a
/// proposer-local counter: `(counter << PROPOSER_ID_BITS) | proposer_id`.
/// Higher ballots win.
#[derive(Copy, Clone, Default, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Ballot(pub u32);

impl Ballot {
    pub const ZERO: Ballot = Ballot(0);

    pub fn new(counter: u32, proposer_id: Aid) -> Self {
        let mask = (1u32 << PROPOSER_ID_BITS) - 1;
        Ballot((counter << PROPOSER_ID_BITS) | (proposer_id & mask))
    }

    pub fn proposer_id(self) -> Aid {
        self.0 & ((1u32 << PROPOSER_ID_BITS) - 1)
    }

    pub fn counter(self) -> u32 {
        self.0 >> PROPOSER_ID_BITS
    }

    /// Smallest ballot strictly greater than `self` owned by `proposer_id`.
    pub fn next(self, proposer_id: Aid) -> Self {
        Ballot::new(self.counter() + 1, proposer_id)
    }
}

/// One acceptor's recorded ballot, used to aggregate sibling state across
/// a hierarchical acceptor group without fanning out N separate messages.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub aid: Aid,
    pub ballot: Ballot,
}

/// Tagged union of the nine protocol messages. A `Frame` (below) is what
/// actually crosses the wire; this is the semantic payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ProtocolMessage {
    /// Phase 1a: proposer to acceptor.
    Prepare { iid: Iid, ballot: Ballot },

    /// Phase 1b: acceptor to proposer. `participants` aggregates sibling
    /// acceptors' promised ballots when forwarded through a hierarchical
    /// group; `value`/`value_ballot` are the single accepted value shared
    /// by the group at this instance, if any.
    Promise {
        aid: Aid,
        iid: Iid,
        ballot: Ballot,
        value: Option<Value>,
        value_ballot: Ballot,
        participants: Vec<Participant>,
    },

    /// Phase 2a: proposer to acceptor.
    Accept { iid: Iid, ballot: Ballot, value: Value },

    /// Phase 2b: acceptor to proposer (and, on the broadcast/repeat
    /// path, to the learner). Carries the accepted value directly so a
    /// learner need not separately fetch it.
    Accepted {
        aid: Aid,
        iid: Iid,
        ballot: Ballot,
        value: Value,
        participants: Vec<Participant>,
    },

    /// An acceptor's promised ballot outranks the sender's; carries the
    /// current (higher) ballot so the proposer can adopt a safe successor.
    Preempted { aid: Aid, iid: Iid, ballot: Ballot },

    /// Learner to acceptor: "retransmit decisions for `[from_iid, to_iid]`".
    Repeat { from_iid: Iid, to_iid: Iid },

    /// Learner (or operator) to acceptor: discard records at or below `iid`.
    Trim { iid: Iid },

    /// Periodic acceptor-state broadcast, advertising trim progress.
    AcceptorState { aid: Aid, trim_iid: Iid },

    /// Client to proposer: a value to append to the replicated log.
    ClientValue { value: Value },
}

impl ProtocolMessage {
    pub fn iid(&self) -> Option<Iid> {
        match self {
            ProtocolMessage::Prepare { iid, .. }
            | ProtocolMessage::Promise { iid, .. }
            | ProtocolMessage::Accept { iid, .. }
            | ProtocolMessage::Accepted { iid, .. }
            | ProtocolMessage::Preempted { iid, .. } => Some(*iid),
            ProtocolMessage::Trim { iid } => Some(*iid),
            ProtocolMessage::Repeat { .. }
            | ProtocolMessage::AcceptorState { .. }
            | ProtocolMessage::ClientValue { .. } => None,
        }
    }
}

/// Wire envelope. The tracer tag is a monotonically stamped counter used
/// only for log correlation across hops — never load-bearing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub tracer: u32,
    pub message: ProtocolMessage,
}

#[derive(Debug, Error)]
pub enum MessageError {
    #[error("failed to encode message: {0}")]
    Encode(#[source] bincode::Error),
    #[error("failed to decode message: {0}")]
    Decode(#[source] bincode::Error),
    #[error("framing error: {0}")]
    Framing(#[from] std::io::Error),
}

pub fn encode(frame: &Frame) -> Result<Vec<u8>, MessageError> {
    bincode::serialize(frame).map_err(MessageError::Encode)
}

pub fn decode(bytes: &[u8]) -> Result<Frame, MessageError> {
    bincode::deserialize(bytes).map_err(MessageError::Decode)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ballot_orders_by_counter_first() {
        let low = Ballot::new(1, 5);
        let high = Ballot::new(2, 0);
        assert!(high > low, "counter dominates proposer id in ordering");
    }

    #[test]
    fn ballot_roundtrips_proposer_id() {
        let b = Ballot::new(7, 3);
        assert_eq!(b.counter(), 7);
        assert_eq!(b.proposer_id(), 3);
    }

    #[test]
    fn next_ballot_outranks_any_same_proposer_bump() {
        let b = Ballot::new(4, 2);
        let n = b.next(2);
        assert!(n > b);
        assert_eq!(n.proposer_id(), 2);
    }

    fn sample_frame(n_aids: usize) -> Frame {
        Frame {
            tracer: 42,
            message: ProtocolMessage::Promise {
                aid: 0,
                iid: 7,
                ballot: Ballot::new(1, 0),
                value: Some(b"x".to_vec()),
                value_ballot: Ballot::new(1, 0),
                participants: (0..n_aids as u32)
                    .map(|aid| Participant { aid, ballot: Ballot::new(1, aid) })
                    .collect(),
            },
        }
    }

    #[test]
    fn encode_decode_roundtrip_empty_aggregate() {
        let frame = sample_frame(0);
        let bytes = encode(&frame).unwrap();
        assert_eq!(decode(&bytes).unwrap(), frame);
    }

    #[test]
    fn encode_decode_roundtrip_singleton_aggregate() {
        let frame = sample_frame(1);
        let bytes = encode(&frame).unwrap();
        assert_eq!(decode(&bytes).unwrap(), frame);
    }

    #[test]
    fn encode_decode_roundtrip_multi_aggregate() {
        let frame = sample_frame(4);
        let bytes = encode(&frame).unwrap();
        assert_eq!(decode(&bytes).unwrap(), frame);
    }

    #[test]
    fn every_variant_roundtrips() {
        let messages = vec![
            ProtocolMessage::Prepare { iid: 1, ballot: Ballot::new(1, 0) },
            ProtocolMessage::Accept { iid: 1, ballot: Ballot::new(1, 0), value: b"x".to_vec() },
            ProtocolMessage::Accepted { aid: 0, iid: 1, ballot: Ballot::new(1, 0), value: b"x".to_vec(), participants: vec![] },
            ProtocolMessage::Preempted { aid: 0, iid: 1, ballot: Ballot::new(2, 1) },
            ProtocolMessage::Repeat { from_iid: 1, to_iid: 10 },
            ProtocolMessage::Trim { iid: 100 },
            ProtocolMessage::AcceptorState { aid: 0, trim_iid: 100 },
            ProtocolMessage::ClientValue { value: b"hello".to_vec() },
        ];
        for message in messages {
            let frame = Frame { tracer: 1, message };
            let bytes = encode(&frame).unwrap();
            assert_eq!(decode(&bytes).unwrap(), frame);
        }
    }

    #[test]
    fn decode_rejects_truncated_bytes() {
        let frame = sample_frame(3);
        let bytes = encode(&frame).unwrap();
        assert!(decode(&bytes[..bytes.len() - 2]).is_err());
    }
}
