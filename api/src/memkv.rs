//! In-memory implementation of the KVS contract.
//!
//! One `BTreeMap` per index gives the ordered iteration the dentry encoding
//! relies on. Transactions are implemented with an undo log on the index
//! handle: while a bracket is open, every mutation records the prior state of
//! its key, and a discard replays the log in reverse. Brackets nest with a
//! depth counter; only closing the outermost bracket drops the log.
//!
//! This backend plays the role a device image plays for an on-disk
//! filesystem: a concrete store the whole test suite runs against. It is
//! thread-safe (a mutex around the store), though the core never runs more
//! than one transaction per index at a time.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use log::trace;

use crate::error::{FsError, Result};
use crate::kvstore::{KvsBackend, KvsIndex};
use crate::types::Fid;

type IndexMap = BTreeMap<Vec<u8>, Vec<u8>>;

#[derive(Default)]
struct Store {
    indexes: HashMap<Fid, IndexMap>,
}

/// In-memory KVS backend.
#[derive(Clone, Default)]
pub struct MemKvs {
    store: Arc<Mutex<Store>>,
}

impl MemKvs {
    /// Create an empty backend with no indexes.
    pub fn new() -> MemKvs {
        MemKvs::default()
    }

    fn locked(&self) -> MutexGuard<'_, Store> {
        self.store.lock().expect("kvs store mutex poisoned")
    }
}

impl KvsBackend for MemKvs {
    fn index_create(&self, fid: &Fid) -> Result<()> {
        let mut store = self.locked();
        if store.indexes.contains_key(fid) {
            return Err(FsError::AlreadyExists);
        }
        store.indexes.insert(*fid, IndexMap::new());
        trace!("index_create {:x}:{:x}", fid.hi, fid.lo);
        Ok(())
    }

    fn index_delete(&self, fid: &Fid) -> Result<()> {
        let mut store = self.locked();
        store.indexes.remove(fid).ok_or(FsError::NotFound)?;
        trace!("index_delete {:x}:{:x}", fid.hi, fid.lo);
        Ok(())
    }

    fn index_open(&self, fid: &Fid) -> Result<Box<dyn KvsIndex>> {
        let store = self.locked();
        if !store.indexes.contains_key(fid) {
            return Err(FsError::NotFound);
        }
        Ok(Box::new(MemIndex {
            store: Arc::clone(&self.store),
            fid: *fid,
            txn_depth: 0,
            undo: Vec::new(),
        }))
    }
}

/// Prior state of one key, recorded before a mutation inside a transaction.
struct UndoEntry {
    key: Vec<u8>,
    prior: Option<Vec<u8>>,
}

/// Open handle on one in-memory index.
pub struct MemIndex {
    store: Arc<Mutex<Store>>,
    fid: Fid,
    txn_depth: u32,
    undo: Vec<UndoEntry>,
}

impl MemIndex {
    fn locked(&self) -> MutexGuard<'_, Store> {
        self.store.lock().expect("kvs store mutex poisoned")
    }

    fn with_index<T>(&self, f: impl FnOnce(&IndexMap) -> Result<T>) -> Result<T> {
        let store = self.locked();
        let index = store.indexes.get(&self.fid).ok_or(FsError::NotFound)?;
        f(index)
    }

    fn with_index_mut<T>(&self, f: impl FnOnce(&mut IndexMap) -> Result<T>) -> Result<T> {
        let mut store = self.locked();
        let index = store.indexes.get_mut(&self.fid).ok_or(FsError::NotFound)?;
        f(index)
    }
}

impl KvsIndex for MemIndex {
    fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        self.with_index(|index| index.get(key).cloned().ok_or(FsError::NotFound))
    }

    fn set(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        let in_txn = self.txn_depth > 0;
        let prior = self.with_index_mut(|index| {
            Ok(index.insert(key.to_vec(), value.to_vec()))
        })?;
        if in_txn {
            self.undo.push(UndoEntry { key: key.to_vec(), prior });
        }
        Ok(())
    }

    fn del(&mut self, key: &[u8]) -> Result<()> {
        let in_txn = self.txn_depth > 0;
        let prior = self.with_index_mut(|index| {
            index.remove(key).ok_or(FsError::NotFound)
        })?;
        if in_txn {
            self.undo.push(UndoEntry { key: key.to_vec(), prior: Some(prior) });
        }
        Ok(())
    }

    fn iter_prefix<'a>(
        &'a self,
        prefix: &[u8],
    ) -> Box<dyn Iterator<Item = (Vec<u8>, Vec<u8>)> + 'a> {
        //Collected under the lock; the handle must not observe mutations that
        //happen while the caller drains the iterator.
        let pairs: Vec<(Vec<u8>, Vec<u8>)> = self
            .with_index(|index| {
                Ok(index
                    .range(prefix.to_vec()..)
                    .take_while(|(k, _)| k.starts_with(prefix))
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect())
            })
            .unwrap_or_default();
        Box::new(pairs.into_iter())
    }

    fn begin_transaction(&mut self) -> Result<()> {
        self.txn_depth += 1;
        Ok(())
    }

    fn end_transaction(&mut self) -> Result<()> {
        if self.txn_depth == 0 {
            return Err(FsError::Invalid("no open transaction"));
        }
        self.txn_depth -= 1;
        if self.txn_depth == 0 {
            self.undo.clear();
        }
        Ok(())
    }

    fn discard_transaction(&mut self) -> Result<()> {
        if self.txn_depth == 0 {
            return Err(FsError::Invalid("no open transaction"));
        }
        let undo = std::mem::take(&mut self.undo);
        self.txn_depth = 0;
        self.with_index_mut(|index| {
            for entry in undo.into_iter().rev() {
                match entry.prior {
                    Some(value) => index.insert(entry.key, value),
                    None => index.remove(&entry.key),
                };
            }
            Ok(())
        })
    }
}
