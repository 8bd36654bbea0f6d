//! # Summary
//!
//! This module defines the narrow `Storage` capability the acceptor
//! depends on (§4.2): transaction scope plus get/put/trim on
//! `AcceptorRecord`s keyed by instance id. [`memory`] is the mandatory
//! in-memory backend; [`disk`], gated behind the `disk-storage` feature,
//! persists to an embedded log-structured store.
//!
//! Every mutation happens inside a [`Transaction`], a scoped guard whose
//! `Drop` aborts the pending writes unless `commit` was called — the
//! Rust-native form of the original's manual `begin`/`commit` pairing
//! around every handler.

pub mod memory;

#[cfg(feature = "disk-storage")]
pub mod disk;

use std::collections::HashMap as Map;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::message::{Aid, Ballot, Iid, Value};

pub use memory::MemoryStorage;

#[cfg(feature = "disk-storage")]
pub use disk::DiskStorage;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[cfg(feature = "disk-storage")]
    #[error("backing store error: {0}")]
    Backend(#[from] sled::Error),
    #[error("transaction already in progress")]
    AlreadyInTransaction,
    #[error("no transaction in progress")]
    NoTransaction,
}

/// Persisted per-instance acceptor state (§3).
///
/// Invariants upheld by every `Acceptor` handler, never by `Storage`
/// itself: (a) `promised_ballot` never decreases for a given `iid`; (b) if
/// `accepted_value` is `Some`, `value_ballot <= promised_ballot`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AcceptorRecord {
    pub iid: Iid,
    pub promised_ballot: Ballot,
    pub accepted_value: Option<Value>,
    pub value_ballot: Ballot,
    pub participants: Map<Aid, Ballot>,
}

impl AcceptorRecord {
    pub fn empty(iid: Iid) -> Self {
        AcceptorRecord {
            iid,
            promised_ballot: Ballot::ZERO,
            accepted_value: None,
            value_ballot: Ballot::ZERO,
            participants: Map::new(),
        }
    }
}

/// The narrow capability an `Acceptor` is generic over.
///
/// Implementors need not buffer writes themselves if the backend already
/// has native transactions (`disk`'s sled tree does); `memory`'s backend
/// buffers because an in-memory map has no transaction primitive of its
/// own.
pub trait Storage: Send {
    fn begin(&mut self) -> Result<(), StorageError>;
    fn commit(&mut self) -> Result<(), StorageError>;
    fn abort(&mut self) -> Result<(), StorageError>;
    fn get(&self, iid: Iid) -> Result<Option<AcceptorRecord>, StorageError>;
    fn put(&mut self, record: AcceptorRecord) -> Result<(), StorageError>;
    fn trim(&mut self, iid: Iid) -> Result<(), StorageError>;
    fn get_trim_instance(&self) -> Iid;
}

/// Scoped transaction guard: commits on explicit [`Transaction::commit`],
/// aborts on drop otherwise. Mirrors the original's manual
/// `begin`/`commit`/`abort` triplet around every acceptor handler.
pub struct Transaction<'s, S: Storage> {
    storage: &'s mut S,
    done: bool,
}

impl<'s, S: Storage> Transaction<'s, S> {
    pub fn begin(storage: &'s mut S) -> Result<Self, StorageError> {
        storage.begin()?;
        Ok(Transaction { storage, done: false })
    }

    pub fn get(&self, iid: Iid) -> Result<Option<AcceptorRecord>, StorageError> {
        self.storage.get(iid)
    }

    pub fn put(&mut self, record: AcceptorRecord) -> Result<(), StorageError> {
        self.storage.put(record)
    }

    pub fn trim(&mut self, iid: Iid) -> Result<(), StorageError> {
        self.storage.trim(iid)
    }

    pub fn get_trim_instance(&self) -> Iid {
        self.storage.get_trim_instance()
    }

    pub fn commit(mut self) -> Result<(), StorageError> {
        self.storage.commit()?;
        self.done = true;
        Ok(())
    }
}

impl<'s, S: Storage> Drop for Transaction<'s, S> {
    fn drop(&mut self) {
        if !self.done {
            if let Err(error) = self.storage.abort() {
                error!("failed to abort storage transaction: {}", error);
            }
        }
    }
}

/// Runtime-selected backend (§6 `storage_backend` option), so a single
/// binary can honor a config file's choice without the caller picking a
/// concrete `Storage` type at compile time.
pub enum AnyStorage {
    Memory(MemoryStorage),
    #[cfg(feature = "disk-storage")]
    Disk(DiskStorage),
}

impl Storage for AnyStorage {
    fn begin(&mut self) -> Result<(), StorageError> {
        match self {
            AnyStorage::Memory(s) => s.begin(),
            #[cfg(feature = "disk-storage")]
            AnyStorage::Disk(s) => s.begin(),
        }
    }

    fn commit(&mut self) -> Result<(), StorageError> {
        match self {
            AnyStorage::Memory(s) => s.commit(),
            #[cfg(feature = "disk-storage")]
            AnyStorage::Disk(s) => s.commit(),
        }
    }

    fn abort(&mut self) -> Result<(), StorageError> {
        match self {
            AnyStorage::Memory(s) => s.abort(),
            #[cfg(feature = "disk-storage")]
            AnyStorage::Disk(s) => s.abort(),
        }
    }

    fn get(&self, iid: Iid) -> Result<Option<AcceptorRecord>, StorageError> {
        match self {
            AnyStorage::Memory(s) => s.get(iid),
            #[cfg(feature = "disk-storage")]
            AnyStorage::Disk(s) => s.get(iid),
        }
    }

    fn put(&mut self, record: AcceptorRecord) -> Result<(), StorageError> {
        match self {
            AnyStorage::Memory(s) => s.put(record),
            #[cfg(feature = "disk-storage")]
            AnyStorage::Disk(s) => s.put(record),
        }
    }

    fn trim(&mut self, iid: Iid) -> Result<(), StorageError> {
        match self {
            AnyStorage::Memory(s) => s.trim(iid),
            #[cfg(feature = "disk-storage")]
            AnyStorage::Disk(s) => s.trim(iid),
        }
    }

    fn get_trim_instance(&self) -> Iid {
        match self {
            AnyStorage::Memory(s) => s.get_trim_instance(),
            #[cfg(feature = "disk-storage")]
            AnyStorage::Disk(s) => s.get_trim_instance(),
        }
    }
}
