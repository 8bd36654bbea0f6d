//! # Summary
//!
//! This crate implements the Paxos consensus protocol for state-machine
//! replication, including a hierarchical variant in which acceptors are
//! grouped into a fan-out tree so that a single logical acceptor role can
//! be realized by several cooperating processes.
//!
//! The consensus core (`acceptor`, `proposer`, `learner`, `quorum`) is
//! transport-agnostic: it operates purely over the [`storage::Storage`]
//! capability and in-memory tables, and is driven by the framed peer
//! network in [`net`]. [`replica`] binds one acceptor, an optional
//! proposer, and a learner to a single peer set; [`driver`] runs several
//! replicas as cooperating tasks sharing one Tokio runtime.

#[macro_use]
extern crate log;

pub mod acceptor;
pub mod config;
pub mod driver;
pub mod internal;
pub mod learner;
pub mod message;
pub mod net;
pub mod proposer;
pub mod quorum;
pub mod replica;
pub mod storage;
pub mod topology;

pub use crate::config::{Config, ConfigError};
pub use crate::message::{Aid, Ballot, Frame, Iid, ProtocolMessage, Value};
pub use crate::replica::Replica;
