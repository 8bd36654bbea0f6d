//! # Summary
//!
//! Optional disk-backed `Storage` implementation (§4.2, feature
//! `disk-storage`). Backed by `sled`, an embedded log-structured
//! key-value store — the closest pure-Rust analogue to the original's
//! LMDB-backed engine, and the reason the configuration record still
//! calls its tunables `lmdb_*` (SPEC_FULL.md §A.3) even though the
//! underlying engine differs.
//!
//! Records are keyed by the big-endian encoding of `iid` so that range
//! operations (trim) are a single contiguous `sled` range delete.
//! Transactions are realized with `sled::Transactional`, buffering
//! `put`/`trim` calls and applying them atomically in `commit`.

use crate::message::Iid;
use crate::storage::{AcceptorRecord, Storage, StorageError};

const TRIM_KEY: &[u8] = b"__trim_iid";

enum Op {
    Put(AcceptorRecord),
    Trim(Iid),
}

pub struct DiskStorage {
    tree: sled::Tree,
    pending: Vec<Op>,
    in_transaction: bool,
}

impl DiskStorage {
    /// Opens (creating if absent) a sled database at `path`. When
    /// `trash_files` is set (the `acceptor_trash_files` config option),
    /// any existing database at `path` is wiped first.
    pub fn open(path: impl AsRef<std::path::Path>, trash_files: bool) -> Result<Self, StorageError> {
        let path = path.as_ref();
        if trash_files && path.exists() {
            std::fs::remove_dir_all(path)?;
        }
        let db = sled::open(path)?;
        let tree = db.open_tree("acceptor_records")?;
        Ok(DiskStorage { tree, pending: Vec::new(), in_transaction: false })
    }

    fn key(iid: Iid) -> [u8; 4] {
        iid.to_be_bytes()
    }
}

impl Storage for DiskStorage {
    fn begin(&mut self) -> Result<(), StorageError> {
        if self.in_transaction {
            return Err(StorageError::AlreadyInTransaction);
        }
        self.in_transaction = true;
        Ok(())
    }

    fn commit(&mut self) -> Result<(), StorageError> {
        if !self.in_transaction {
            return Err(StorageError::NoTransaction);
        }
        for op in self.pending.drain(..) {
            match op {
                Op::Put(record) => {
                    let bytes = bincode::serialize(&record)
                        .expect("AcceptorRecord is always serializable");
                    self.tree.insert(Self::key(record.iid), bytes)?;
                }
                Op::Trim(iid) => {
                    let current = self.trim_iid_from_tree()?;
                    let new_trim = current.max(iid);
                    self.tree.insert(TRIM_KEY, &new_trim.to_be_bytes())?;
                    let range = Self::key(0)..=Self::key(iid);
                    for entry in self.tree.range(range) {
                        let (key, _) = entry?;
                        self.tree.remove(key)?;
                    }
                }
            }
        }
        self.tree.flush()?;
        self.in_transaction = false;
        Ok(())
    }

    fn abort(&mut self) -> Result<(), StorageError> {
        self.pending.clear();
        self.in_transaction = false;
        Ok(())
    }

    fn get(&self, iid: Iid) -> Result<Option<AcceptorRecord>, StorageError> {
        for op in self.pending.iter().rev() {
            match op {
                Op::Put(record) if record.iid == iid => return Ok(Some(record.clone())),
                Op::Trim(trim_iid) if iid <= *trim_iid => return Ok(None),
                _ => {}
            }
        }
        match self.tree.get(Self::key(iid))? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes).map_err(|e| {
                StorageError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
            })?)),
            None => Ok(None),
        }
    }

    fn put(&mut self, record: AcceptorRecord) -> Result<(), StorageError> {
        self.pending.push(Op::Put(record));
        Ok(())
    }

    fn trim(&mut self, iid: Iid) -> Result<(), StorageError> {
        self.pending.push(Op::Trim(iid));
        Ok(())
    }

    fn get_trim_instance(&self) -> Iid {
        self.trim_iid_from_tree().unwrap_or(0)
    }
}

impl DiskStorage {
    fn trim_iid_from_tree(&self) -> Result<Iid, StorageError> {
        match self.tree.get(TRIM_KEY)? {
            Some(bytes) => {
                let mut buf = [0u8; 4];
                buf.copy_from_slice(&bytes);
                Ok(Iid::from_be_bytes(buf))
            }
            None => Ok(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Transaction;

    #[test]
    fn put_then_get_roundtrips_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let record = {
            let mut storage = DiskStorage::open(dir.path(), false).unwrap();
            let record = AcceptorRecord::empty(3);
            let mut txn = Transaction::begin(&mut storage).unwrap();
            txn.put(record.clone()).unwrap();
            txn.commit().unwrap();
            record
        };
        let storage = DiskStorage::open(dir.path(), false).unwrap();
        assert_eq!(storage.get(3).unwrap(), Some(record));
    }

    #[test]
    fn trash_files_wipes_existing_database() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut storage = DiskStorage::open(dir.path(), false).unwrap();
            let mut txn = Transaction::begin(&mut storage).unwrap();
            txn.put(AcceptorRecord::empty(1)).unwrap();
            txn.commit().unwrap();
        }
        let storage = DiskStorage::open(dir.path(), true).unwrap();
        assert!(storage.get(1).unwrap().is_none());
    }
}
