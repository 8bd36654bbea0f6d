//! # Summary
//!
//! This module implements the `Proposer` role (§4.5): ballot
//! advancement, the pre-execution pipeline that keeps instances ahead
//! of client demand, quorum tracking for both Paxos phases, and the
//! value-selection rule (a proposer must adopt any value already
//! accepted at a lower ballot rather than its own pending one).
//!
//! Two tables track in-flight instances by phase, matching the
//! original's separate prepare/accept tracking structures. An instance
//! moves from `preparing` to `accepting` only once both its phase-1
//! quorum is reached and a value has been bound to it — which may
//! happen before or after the quorum, depending on whether a client
//! call to `propose` reached this instance first or a later one did.

use std::collections::{BTreeMap as Map, VecDeque};
use std::time::{Duration, Instant};

use crate::message::{Aid, Ballot, Iid, ProtocolMessage, Value};
use crate::quorum::Quorum;

struct ProposerInstance {
    ballot: Ballot,
    value: Option<Value>,
    value_ballot: Ballot,
    phase1: Quorum,
    phase2: Quorum,
    phase1_done: bool,
    last_action: Instant,
}

impl ProposerInstance {
    fn new(ballot: Ballot, acceptor_count: usize) -> Self {
        ProposerInstance {
            ballot,
            value: None,
            value_ballot: Ballot::ZERO,
            phase1: Quorum::new(acceptor_count),
            phase2: Quorum::new(acceptor_count),
            phase1_done: false,
            last_action: Instant::now(),
        }
    }
}

pub struct Proposer {
    id: Aid,
    acceptor_count: usize,
    preexec_window: usize,
    timeout: Duration,
    preparing: Map<Iid, ProposerInstance>,
    accepting: Map<Iid, ProposerInstance>,
    fifo: VecDeque<Value>,
    next_ballot_counter: u32,
    next_iid: Iid,
    acceptor_trim: Map<Aid, Iid>,
}

impl Proposer {
    pub fn new(id: Aid, acceptor_count: usize, preexec_window: usize, timeout: Duration, start_iid: Iid) -> Self {
        Proposer {
            id,
            acceptor_count,
            preexec_window,
            timeout,
            preparing: Map::new(),
            accepting: Map::new(),
            fifo: VecDeque::new(),
            next_ballot_counter: 0,
            next_iid: start_iid,
            acceptor_trim: Map::new(),
        }
    }

    pub fn id(&self) -> Aid {
        self.id
    }

    fn next_ballot(&mut self) -> Ballot {
        self.next_ballot_counter += 1;
        Ballot::new(self.next_ballot_counter, self.id)
    }

    fn bump_ballot_past(&mut self, ballot: Ballot) {
        if ballot.counter() >= self.next_ballot_counter {
            self.next_ballot_counter = ballot.counter() + 1;
        }
    }

    /// An instance whose phase-1 quorum already closed with no value
    /// bound (because the FIFO was empty when its quorum was reached) —
    /// the "prepared instance waiting for a value" case.
    fn earliest_unbound_preparing(&self) -> Option<Iid> {
        self.preparing
            .iter()
            .filter(|(_, instance)| instance.value.is_none())
            .map(|(iid, _)| *iid)
            .next()
    }

    fn open_instance(&mut self) -> ProtocolMessage {
        let iid = self.next_iid;
        self.next_iid += 1;
        let ballot = self.next_ballot();
        debug!("opening instance {} at ballot {:?}", iid, ballot);
        let mut instance = ProposerInstance::new(ballot, self.acceptor_count);
        instance.value = self.fifo.pop_front();
        self.preparing.insert(iid, instance);
        ProtocolMessage::Prepare { iid, ballot }
    }

    /// §4.5 pre-exec: keep up to `preexec_window` instances open in
    /// phase 1 while the client-value queue is nonempty.
    pub fn pre_exec(&mut self) -> Vec<ProtocolMessage> {
        let mut out = Vec::new();
        while self.preparing.len() < self.preexec_window && !self.fifo.is_empty() {
            out.push(self.open_instance());
        }
        out
    }

    /// §4.5 `propose`: binds `value` to an instance whose phase-1
    /// quorum already closed with no value waiting, if any, otherwise
    /// queues it and opens a fresh instance via `pre_exec`.
    pub fn propose(&mut self, value: Value) -> Vec<ProtocolMessage> {
        if let Some(iid) = self.earliest_unbound_preparing() {
            let phase1_done = {
                let instance = self.preparing.get_mut(&iid).expect("iid was just looked up");
                instance.value = Some(value);
                instance.phase1_done
            };
            if phase1_done {
                return vec![self.promote_to_accepting(iid)];
            }
            return Vec::new();
        }
        self.fifo.push_back(value);
        self.pre_exec()
    }

    fn promote_to_accepting(&mut self, iid: Iid) -> ProtocolMessage {
        let mut instance = self.preparing.remove(&iid).expect("promoted instance must be in preparing");
        instance.last_action = Instant::now();
        let message = ProtocolMessage::Accept {
            iid,
            ballot: instance.ballot,
            value: instance.value.clone().expect("promotion requires a bound value"),
        };
        self.accepting.insert(iid, instance);
        message
    }

    /// §4.5 "On Promise".
    pub fn on_promise(&mut self, aid: Aid, iid: Iid, ballot: Ballot, value: Option<Value>, value_ballot: Ballot) -> Vec<ProtocolMessage> {
        let Some(instance) = self.preparing.get_mut(&iid) else {
            trace!("dropping promise for unknown or already-resolved instance {}", iid);
            return Vec::new();
        };
        if instance.ballot != ballot {
            trace!("dropping stale promise for instance {} at ballot {:?}", iid, ballot);
            return Vec::new();
        }

        if let Some(value) = value {
            if value_ballot >= instance.value_ballot {
                instance.value = Some(value);
                instance.value_ballot = value_ballot;
            }
        }

        let reached = instance.phase1.add(aid);
        if !reached {
            return Vec::new();
        }

        instance.phase1_done = true;
        if instance.value.is_none() {
            if let Some(value) = self.fifo.pop_front() {
                instance.value = Some(value);
            }
        }

        if self.preparing.get(&iid).map(|i| i.value.is_some()).unwrap_or(false) {
            vec![self.promote_to_accepting(iid)]
        } else {
            Vec::new()
        }
    }

    /// §4.5 "On Accepted".
    pub fn on_accepted(&mut self, aid: Aid, iid: Iid, ballot: Ballot) {
        let Some(reached) = self.accepting.get_mut(&iid).map(|instance| {
            if instance.ballot == ballot { Some(instance.phase2.add(aid)) } else { None }
        }) else {
            return;
        };
        if reached == Some(true) {
            self.accepting.remove(&iid);
            debug!("instance {} reached accept quorum", iid);
        }
    }

    /// §4.5 "On Preempted": bump past the reported ballot and retry.
    pub fn on_preempted(&mut self, iid: Iid, ballot: Ballot) -> Vec<ProtocolMessage> {
        let carried_value = self
            .preparing
            .remove(&iid)
            .map(|i| i.value)
            .or_else(|| self.accepting.remove(&iid).map(|i| i.value))
            .flatten();

        self.bump_ballot_past(ballot);
        let new_ballot = self.next_ballot();
        let mut instance = ProposerInstance::new(new_ballot, self.acceptor_count);
        instance.value = carried_value;
        self.preparing.insert(iid, instance);
        info!("preempted at instance {}; retrying with ballot {:?}", iid, new_ballot);
        vec![ProtocolMessage::Prepare { iid, ballot: new_ballot }]
    }

    /// §4.5 "On AcceptorState": records the acceptor's trim watermark.
    pub fn on_acceptor_state(&mut self, aid: Aid, trim_iid: Iid) {
        self.acceptor_trim.insert(aid, trim_iid);
    }

    /// §4.5 timeouts: re-broadcast any instance idle past `timeout`.
    pub fn check_timeouts(&mut self, now: Instant) -> Vec<ProtocolMessage> {
        let mut out = Vec::new();
        for (&iid, instance) in self.preparing.iter_mut() {
            if now.duration_since(instance.last_action) >= self.timeout {
                instance.last_action = now;
                out.push(ProtocolMessage::Prepare { iid, ballot: instance.ballot });
            }
        }
        for (&iid, instance) in self.accepting.iter_mut() {
            if now.duration_since(instance.last_action) >= self.timeout {
                instance.last_action = now;
                out.push(ProtocolMessage::Accept {
                    iid,
                    ballot: instance.ballot,
                    value: instance.value.clone().expect("accepting instances always carry a value"),
                });
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proposer(id: Aid) -> Proposer {
        Proposer::new(id, 3, 32, Duration::from_secs(1), 1)
    }

    #[test]
    fn propose_opens_an_instance_and_sends_prepare() {
        let mut p = proposer(0);
        let sent = p.propose(b"x".to_vec());
        assert_eq!(sent.len(), 1);
        assert!(matches!(sent[0], ProtocolMessage::Prepare { iid: 1, .. }));
    }

    #[test]
    fn quorum_of_promises_without_prior_value_triggers_accept_with_queued_value() {
        let mut p = proposer(0);
        let prepare = p.propose(b"x".to_vec()).remove(0);
        let ProtocolMessage::Prepare { iid, ballot } = prepare else { panic!("expected prepare") };

        assert!(p.on_promise(0, iid, ballot, None, Ballot::ZERO).is_empty());
        let sent = p.on_promise(1, iid, ballot, None, Ballot::ZERO);
        assert_eq!(sent.len(), 1);
        match &sent[0] {
            ProtocolMessage::Accept { value, .. } => assert_eq!(value, b"x"),
            other => panic!("expected Accept, got {:?}", other),
        }
    }

    #[test]
    fn promise_carrying_higher_value_ballot_overrides_pending_value() {
        let mut p = proposer(0);
        let prepare = p.propose(b"mine".to_vec()).remove(0);
        let ProtocolMessage::Prepare { iid, ballot } = prepare else { panic!("expected prepare") };

        p.on_promise(0, iid, ballot, Some(b"theirs".to_vec()), Ballot::new(1, 9));
        let sent = p.on_promise(1, iid, ballot, None, Ballot::ZERO);
        match &sent[0] {
            ProtocolMessage::Accept { value, .. } => assert_eq!(value, b"theirs"),
            other => panic!("expected Accept, got {:?}", other),
        }
    }

    #[test]
    fn accept_quorum_clears_the_instance() {
        let mut p = proposer(0);
        let prepare = p.propose(b"x".to_vec()).remove(0);
        let ProtocolMessage::Prepare { iid, ballot } = prepare else { panic!("expected prepare") };
        p.on_promise(0, iid, ballot, None, Ballot::ZERO);
        p.on_promise(1, iid, ballot, None, Ballot::ZERO);

        p.on_accepted(0, iid, ballot);
        assert_eq!(p.accepting.len(), 1);
        p.on_accepted(1, iid, ballot);
        assert!(p.accepting.is_empty());
    }

    #[test]
    fn preempted_bumps_ballot_and_retries_with_carried_value() {
        let mut p = proposer(0);
        let prepare = p.propose(b"x".to_vec()).remove(0);
        let ProtocolMessage::Prepare { iid, ballot } = prepare else { panic!("expected prepare") };
        assert_eq!(ballot, Ballot::new(1, 0));

        let retry = p.on_preempted(iid, Ballot::new(5, 1));
        assert_eq!(retry.len(), 1);
        match retry[0] {
            ProtocolMessage::Prepare { iid: retry_iid, ballot: retry_ballot } => {
                assert_eq!(retry_iid, iid);
                assert!(retry_ballot > Ballot::new(5, 1));
            }
            _ => panic!("expected Prepare"),
        }
    }

    #[test]
    fn stale_promise_at_wrong_ballot_is_dropped() {
        let mut p = proposer(0);
        let prepare = p.propose(b"x".to_vec()).remove(0);
        let ProtocolMessage::Prepare { iid, .. } = prepare else { panic!("expected prepare") };
        assert!(p.on_promise(0, iid, Ballot::new(99, 7), None, Ballot::ZERO).is_empty());
    }

    #[test]
    fn pre_exec_respects_window() {
        let mut p = Proposer::new(0, 3, 2, Duration::from_secs(1), 1);
        p.propose(b"a".to_vec());
        p.propose(b"b".to_vec());
        let sent = p.propose(b"c".to_vec());
        assert!(sent.is_empty(), "third value should queue behind the window limit");
    }
}
