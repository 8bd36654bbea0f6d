//! # Summary
//!
//! Framed peer transport (§4.6): [`codec`] defines the wire framing,
//! [`peer`] drives one connection, [`peers`] is the registry tying
//! connections to acceptor/proposer ids and exposing broadcast helpers.

pub mod codec;
pub mod peer;
pub mod peers;

pub use peers::Peers;
