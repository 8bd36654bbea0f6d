//! # Summary
//!
//! Mandatory in-memory `Storage` backend (§4.2). Transactions buffer
//! pending writes in a small op log so reads inside an open transaction
//! see their own uncommitted writes, and an aborted transaction leaves no
//! trace — the behavior a real transactional engine gives for free.

use std::collections::BTreeMap;

use crate::message::Iid;
use crate::storage::{AcceptorRecord, Storage, StorageError};

enum Op {
    Put(AcceptorRecord),
    Trim(Iid),
}

#[derive(Default)]
pub struct MemoryStorage {
    records: BTreeMap<Iid, AcceptorRecord>,
    trim_iid: Iid,
    pending: Vec<Op>,
    in_transaction: bool,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
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
                    self.records.insert(record.iid, record);
                }
                Op::Trim(iid) => {
                    self.trim_iid = self.trim_iid.max(iid);
                    self.records = self.records.split_off(&(iid + 1));
                }
            }
        }
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
        Ok(self.records.get(&iid).cloned())
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
        self.trim_iid
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Ballot;
    use crate::storage::Transaction;

    #[test]
    fn put_then_get_within_transaction_is_visible() {
        let mut storage = MemoryStorage::new();
        let mut txn = Transaction::begin(&mut storage).unwrap();
        txn.put(AcceptorRecord::empty(1)).unwrap();
        assert!(txn.get(1).unwrap().is_some());
        txn.commit().unwrap();
    }

    #[test]
    fn aborted_transaction_is_invisible() {
        let mut storage = MemoryStorage::new();
        {
            let mut txn = Transaction::begin(&mut storage).unwrap();
            txn.put(AcceptorRecord::empty(1)).unwrap();
            // dropped without commit: aborts
        }
        let mut txn = Transaction::begin(&mut storage).unwrap();
        assert!(txn.get(1).unwrap().is_none());
        txn.commit().unwrap();
    }

    #[test]
    fn trim_drops_records_at_or_below() {
        let mut storage = MemoryStorage::new();
        for iid in 1..=5 {
            let mut txn = Transaction::begin(&mut storage).unwrap();
            let mut record = AcceptorRecord::empty(iid);
            record.promised_ballot = Ballot::new(1, 0);
            txn.put(record).unwrap();
            txn.commit().unwrap();
        }
        let mut txn = Transaction::begin(&mut storage).unwrap();
        txn.trim(3).unwrap();
        txn.commit().unwrap();

        assert_eq!(storage.get_trim_instance(), 3);
        for iid in 1..=3 {
            assert!(storage.get(iid).unwrap().is_none());
        }
        for iid in 4..=5 {
            assert!(storage.get(iid).unwrap().is_some());
        }
    }

    #[test]
    fn put_followed_by_get_roundtrips_equal_record() {
        let mut storage = MemoryStorage::new();
        let mut record = AcceptorRecord::empty(9);
        record.promised_ballot = Ballot::new(3, 1);
        record.accepted_value = Some(b"v".to_vec());
        record.value_ballot = Ballot::new(2, 1);

        let mut txn = Transaction::begin(&mut storage).unwrap();
        txn.put(record.clone()).unwrap();
        txn.commit().unwrap();

        assert_eq!(storage.get(9).unwrap(), Some(record));
    }
}
