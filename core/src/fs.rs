//! Per-filesystem context.
//!
//! A [`Filesystem`] bundles what every metadata operation needs: the opened
//! KVS index holding this filesystem's records, a handle on the shared
//! object store, the identity from the registry's namespace record, and the
//! optional tenant this filesystem is exported through.
//!
//! Operation implementations live in the sibling modules (`tree`, `attrs`,
//! `ops`, `fops`) as further `impl Filesystem` blocks; this module only owns
//! construction and the transaction plumbing.

use std::sync::Arc;

use log::info;

use kvsfs_api::dstore::ObjectStore;
use kvsfs_api::error::Result;
use kvsfs_api::kvstore::KvsIndex;
use kvsfs_api::types::{Fid, FsId, Stat, ROOT_INODE};

/// In-memory view of the export endpoint a filesystem is bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tenant {
    /// Endpoint name; equals the filesystem name.
    pub name: String,
    /// Id of the filesystem this endpoint exports.
    pub fs_id: FsId,
    /// Opaque export options handed to the endpoint plug-in.
    pub options: String,
}

/// An open filesystem: one KVS index plus the shared object store.
pub struct Filesystem {
    name: String,
    fs_id: FsId,
    index_fid: Fid,
    index: Box<dyn KvsIndex>,
    dstore: Arc<dyn ObjectStore>,
    root_stat: Stat,
    tenant: Option<Tenant>,
}

impl Filesystem {
    /// Wrap an opened index into a filesystem context, loading the root
    /// inode's stat. Fails if the root was never provisioned — an index
    /// without a root is not a filesystem.
    pub fn open(
        name: String,
        fs_id: FsId,
        index_fid: Fid,
        index: Box<dyn KvsIndex>,
        dstore: Arc<dyn ObjectStore>,
    ) -> Result<Filesystem> {
        let mut fs = Filesystem {
            name,
            fs_id,
            index_fid,
            index,
            dstore,
            root_stat: Stat::default(),
            tenant: None,
        };
        fs.root_stat = fs.get_stat(ROOT_INODE)?;
        info!("opened filesystem {} (id {})", fs.name, fs.fs_id);
        Ok(fs)
    }

    /// Filesystem name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Filesystem id.
    pub fn fs_id(&self) -> FsId {
        self.fs_id
    }

    /// Fid of the KVS index holding this filesystem's records.
    pub fn index_fid(&self) -> Fid {
        self.index_fid
    }

    /// Stat of the root inode as loaded when the filesystem was opened.
    pub fn root_stat(&self) -> &Stat {
        &self.root_stat
    }

    /// The endpoint this filesystem is exported through, if any.
    pub fn tenant(&self) -> Option<&Tenant> {
        self.tenant.as_ref()
    }

    pub(crate) fn set_tenant(&mut self, tenant: Option<Tenant>) {
        self.tenant = tenant;
    }

    pub(crate) fn index(&self) -> &dyn KvsIndex {
        self.index.as_ref()
    }

    pub(crate) fn index_mut(&mut self) -> &mut dyn KvsIndex {
        self.index.as_mut()
    }

    pub(crate) fn dstore(&self) -> &Arc<dyn ObjectStore> {
        &self.dstore
    }

    /// Open a transaction bracket on this filesystem's index.
    pub(crate) fn begin_txn(&mut self) -> Result<()> {
        self.index.begin_transaction()
    }

    /// Commit the innermost bracket.
    pub(crate) fn end_txn(&mut self) -> Result<()> {
        self.index.end_transaction()
    }

    /// Undo everything since the outermost bracket.
    pub(crate) fn discard_txn(&mut self) -> Result<()> {
        self.index.discard_transaction()
    }

    /// Run `body` inside a transaction bracket: commit on success, discard
    /// on error. The discard result is intentionally dropped — the original
    /// failure is what the caller needs to see.
    pub(crate) fn with_txn<T>(
        &mut self,
        body: impl FnOnce(&mut Filesystem) -> Result<T>,
    ) -> Result<T> {
        self.begin_txn()?;
        match body(self) {
            Ok(value) => {
                self.end_txn()?;
                Ok(value)
            }
            Err(e) => {
                let _ = self.discard_txn();
                Err(e)
            }
        }
    }
}
