//! Contract for the ordered key-value store backing the namespace.
//!
//! The metadata core talks to the KVS exclusively through these traits. A
//! backend provides named *indexes*, addressed by a 128-bit [`Fid`]; within
//! an index it provides upserts, point lookups, deletions, ordered prefix
//! iteration, and a transaction bracket that groups mutations.
//!
//! The crate ships one implementation, [`MemKvs`](crate::memkv::MemKvs),
//! which the tests run against; production deployments plug in their own.
//!
//! # Transactions
//!
//! `begin_transaction` / `end_transaction` serialize a group of mutations:
//! writes become observable atomically on the outermost `end_transaction`,
//! and `discard_transaction` undoes every mutation since the outermost
//! `begin_transaction`. Brackets may nest — a compound operation may wrap
//! operations that carry their own bracket — and only the outermost pair
//! commits. Callers run at most one transaction per index at a time.

use crate::error::Result;
use crate::types::Fid;

/// A key-value backend hosting named ordered indexes.
pub trait KvsBackend {
    /// Create the index addressed by `fid`. Fails `AlreadyExists` if the
    /// index is already present.
    fn index_create(&self, fid: &Fid) -> Result<()>;

    /// Delete the index addressed by `fid` and everything in it. Fails
    /// `NotFound` if the index does not exist.
    fn index_delete(&self, fid: &Fid) -> Result<()>;

    /// Open the index addressed by `fid`. Fails `NotFound` if the index does
    /// not exist. The returned handle stays valid independently of this
    /// reference; dropping it closes the index.
    fn index_open(&self, fid: &Fid) -> Result<Box<dyn KvsIndex>>;
}

/// An open ordered index.
///
/// Keys and values are raw byte strings; the encoding layer above guarantees
/// that all records of one class share a disjoint key prefix.
pub trait KvsIndex {
    /// Look up `key`. Fails `NotFound` if absent.
    fn get(&self, key: &[u8]) -> Result<Vec<u8>>;

    /// Insert or overwrite `key`.
    fn set(&mut self, key: &[u8], value: &[u8]) -> Result<()>;

    /// Delete `key`. Fails `NotFound` if absent.
    fn del(&mut self, key: &[u8]) -> Result<()>;

    /// Iterate all `(key, value)` pairs whose key starts with `prefix`, in
    /// ascending key order. An empty iterator is not an error.
    fn iter_prefix<'a>(
        &'a self,
        prefix: &[u8],
    ) -> Box<dyn Iterator<Item = (Vec<u8>, Vec<u8>)> + 'a>;

    /// Open a transaction bracket (may nest).
    fn begin_transaction(&mut self) -> Result<()>;

    /// Close the innermost bracket; the outermost close commits.
    fn end_transaction(&mut self) -> Result<()>;

    /// Undo every mutation since the outermost `begin_transaction` and close
    /// all brackets.
    fn discard_transaction(&mut self) -> Result<()>;
}
