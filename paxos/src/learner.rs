//! # Summary
//!
//! This module implements the `Learner` role (§4.4): aggregates
//! `Accepted` messages from acceptors per instance, detects when a
//! quorum has accepted the same value at the same ballot, and delivers
//! decisions strictly in `iid` order. Gaps between the next-to-deliver
//! instance and the highest closed instance are reported as holes for
//! the transport layer to fill via `Repeat`.

use std::collections::BTreeMap as Map;

use crate::message::{Aid, Ballot, Iid, Value};
use crate::quorum::majority;

/// Ephemeral per-instance aggregation of `Accepted` replies.
#[derive(Debug, Default)]
struct LearnerInstance {
    last_update_ballot: Ballot,
    accepted: Map<Aid, (Ballot, Value)>,
    decision: Option<Value>,
}

pub struct Learner {
    acceptor_count: usize,
    instances: Map<Iid, LearnerInstance>,
    current_iid: Iid,
    highest_iid_closed: Iid,
    late_start: bool,
}

impl Learner {
    /// `start_iid` is the first instance this learner expects to
    /// deliver; a learner joining a running system mid-stream sets
    /// `late_start` so it does not block forever on instances before
    /// whatever it first actually observes.
    pub fn new(acceptor_count: usize, start_iid: Iid, late_start: bool) -> Self {
        Learner {
            acceptor_count,
            instances: Map::new(),
            current_iid: start_iid,
            highest_iid_closed: start_iid,
            late_start,
        }
    }

    pub fn current_iid(&self) -> Iid {
        self.current_iid
    }

    pub fn highest_iid_closed(&self) -> Iid {
        self.highest_iid_closed
    }

    /// §4.4 "On Accepted".
    pub fn on_accepted(&mut self, aid: Aid, iid: Iid, ballot: Ballot, value: Value) {
        if self.late_start {
            self.current_iid = iid;
            self.late_start = false;
        }

        if iid < self.current_iid {
            trace!("learner dropping accepted for already-passed iid {}", iid);
            return;
        }

        let instance = self.instances.entry(iid).or_default();

        if instance.decision.is_some() {
            return;
        }

        if let Some((prior_ballot, _)) = instance.accepted.get(&aid) {
            if *prior_ballot >= ballot {
                return;
            }
        }

        instance.accepted.insert(aid, (ballot, value.clone()));
        instance.last_update_ballot = instance.last_update_ballot.max(ballot);

        let agreeing = instance
            .accepted
            .values()
            .filter(|(b, _)| *b == instance.last_update_ballot)
            .count();

        if agreeing >= majority(self.acceptor_count) {
            instance.decision = Some(value);
            if iid > self.highest_iid_closed {
                self.highest_iid_closed = iid;
            }
            debug!("learner closed instance {}", iid);
        }
    }

    /// Emits the next decision in order, if ready, advancing
    /// `current_iid`. Callers drain this in a loop until it returns
    /// `None`.
    pub fn deliver_next(&mut self) -> Option<(Iid, Value)> {
        let decided = self.instances.get(&self.current_iid)?.decision.clone()?;
        self.instances.remove(&self.current_iid);
        let iid = self.current_iid;
        self.current_iid += 1;
        Some((iid, decided))
    }

    /// The `[from, to]` range of undelivered-but-closed instances, if
    /// any, for a periodic `Repeat` request.
    pub fn has_holes(&self) -> Option<(Iid, Iid)> {
        if self.highest_iid_closed > self.current_iid {
            Some((self.current_iid, self.highest_iid_closed))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quorum_of_two_of_three_closes_instance_and_delivers() {
        let mut l = Learner::new(3, 1, false);
        l.on_accepted(0, 1, Ballot::new(1, 0), b"x".to_vec());
        assert!(l.deliver_next().is_none());
        l.on_accepted(1, 1, Ballot::new(1, 0), b"x".to_vec());
        assert_eq!(l.deliver_next(), Some((1, b"x".to_vec())));
        assert_eq!(l.current_iid(), 2);
    }

    #[test]
    fn duplicate_accepted_from_same_acceptor_does_not_overcount() {
        let mut l = Learner::new(3, 1, false);
        l.on_accepted(0, 1, Ballot::new(1, 0), b"x".to_vec());
        l.on_accepted(0, 1, Ballot::new(1, 0), b"x".to_vec());
        assert!(l.deliver_next().is_none());
    }

    #[test]
    fn higher_ballot_accepted_replaces_lower_for_same_acceptor() {
        let mut l = Learner::new(3, 1, false);
        l.on_accepted(0, 1, Ballot::new(1, 0), b"x".to_vec());
        l.on_accepted(0, 1, Ballot::new(2, 1), b"y".to_vec());
        l.on_accepted(1, 1, Ballot::new(2, 1), b"y".to_vec());
        assert_eq!(l.deliver_next(), Some((1, b"y".to_vec())));
    }

    #[test]
    fn stale_lower_ballot_from_same_acceptor_is_dropped() {
        let mut l = Learner::new(3, 1, false);
        l.on_accepted(0, 1, Ballot::new(2, 1), b"y".to_vec());
        l.on_accepted(0, 1, Ballot::new(1, 0), b"x".to_vec());
        l.on_accepted(1, 1, Ballot::new(2, 1), b"y".to_vec());
        assert_eq!(l.deliver_next(), Some((1, b"y".to_vec())));
    }

    #[test]
    fn delivery_is_strictly_in_order() {
        let mut l = Learner::new(3, 1, false);
        l.on_accepted(0, 2, Ballot::new(1, 0), b"later".to_vec());
        l.on_accepted(1, 2, Ballot::new(1, 0), b"later".to_vec());
        // iid 2 is decided but not deliverable yet: iid 1 is still outstanding.
        assert!(l.deliver_next().is_none());

        l.on_accepted(0, 1, Ballot::new(1, 0), b"first".to_vec());
        l.on_accepted(1, 1, Ballot::new(1, 0), b"first".to_vec());
        assert_eq!(l.deliver_next(), Some((1, b"first".to_vec())));
        assert_eq!(l.deliver_next(), Some((2, b"later".to_vec())));
        assert!(l.deliver_next().is_none());
    }

    #[test]
    fn has_holes_reports_gap_between_current_and_highest_closed() {
        let mut l = Learner::new(3, 1, false);
        l.on_accepted(0, 3, Ballot::new(1, 0), b"x".to_vec());
        l.on_accepted(1, 3, Ballot::new(1, 0), b"x".to_vec());
        assert_eq!(l.has_holes(), Some((1, 3)));
    }

    #[test]
    fn late_start_learner_jumps_to_first_observed_instance() {
        let mut l = Learner::new(3, 1, true);
        l.on_accepted(0, 50, Ballot::new(1, 0), b"x".to_vec());
        assert_eq!(l.current_iid(), 50);
    }
}
