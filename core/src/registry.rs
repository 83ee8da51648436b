//! The filesystem registry: named filesystems over one shared KVS backend,
//! their lifecycle, and their export endpoints.
//!
//! All registry state that must survive a restart lives in a dedicated
//! namespace index at a well-known fid: one record per filesystem (keyed by
//! name and by id), the next-id counter, and one record per tenant. The
//! [`Registry`] object mirrors those records as an in-memory map of open
//! [`Filesystem`] contexts, rebuilt by scanning the index at init.
//!
//! Registry mutation is a control-plane activity; the `&mut self` receivers
//! make the caller serialize it, while data-plane operations borrow one
//! filesystem at a time through [`Registry::lookup`].

use std::collections::HashMap;
use std::sync::Arc;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use kvsfs_api::dstore::ObjectStore;
use kvsfs_api::error::{FsError, Result};
use kvsfs_api::kvstore::{KvsBackend, KvsIndex};
use kvsfs_api::types::{Fid, FsId, NAME_MAX, ROOT_INODE};

use crate::fs::{Filesystem, Tenant};
use crate::keys::{
    fs_id_key, fs_id_next_key, fs_name_key, fs_name_prefix, tenant_key, tenant_prefix,
};
use crate::tree;

/// Well-known fid of the registry's namespace index.
pub const REGISTRY_INDEX_FID: Fid = Fid { hi: 0, lo: 1 };

/// Fid of the index belonging to filesystem `fs_id`. Filesystem ids start
/// at 1, so these never collide with [`REGISTRY_INDEX_FID`].
fn fs_index_fid(fs_id: FsId) -> Fid {
    Fid { hi: fs_id, lo: 0 }
}

/// Persisted filesystem record, keyed by name (and, inverted, by id).
#[derive(Serialize, Deserialize, Debug)]
struct NsRecord {
    name: String,
    fs_id: FsId,
    index_fid: Fid,
}

/// Persisted tenant record, keyed by endpoint name.
#[derive(Serialize, Deserialize, Debug)]
struct TenantRecord {
    name: String,
    fs_id: FsId,
    options: String,
}

/// Plug-in invoked on export-endpoint lifecycle boundaries, implemented by
/// the protocol front-end (NFS, CIFS, ...).
pub trait EndpointOps {
    /// Called once when the registry comes up.
    fn init(&self) -> Result<()>;
    /// Called once when the registry shuts down.
    fn fini(&self) -> Result<()>;
    /// Called when an endpoint is created for filesystem `fs_id`.
    fn create(&self, name: &str, fs_id: FsId, options: &str) -> Result<()>;
    /// Called when the endpoint of filesystem `fs_id` is deleted.
    fn delete(&self, fs_id: FsId) -> Result<()>;
}

/// Endpoint plug-in that accepts everything and does nothing; for tests and
/// deployments without an export layer.
pub struct NullEndpointOps;

impl EndpointOps for NullEndpointOps {
    fn init(&self) -> Result<()> {
        Ok(())
    }
    fn fini(&self) -> Result<()> {
        Ok(())
    }
    fn create(&self, _name: &str, _fs_id: FsId, _options: &str) -> Result<()> {
        Ok(())
    }
    fn delete(&self, _fs_id: FsId) -> Result<()> {
        Ok(())
    }
}

/// One row yielded by [`Registry::scan_list`].
pub struct FsListEntry<'a> {
    /// Filesystem name.
    pub name: &'a str,
    /// The endpoint it is exported through, if any.
    pub endpoint: Option<&'a Tenant>,
}

/// One row yielded by [`Registry::scan_endpoints`].
pub struct EndpointEntry<'a> {
    /// Endpoint (= filesystem) name.
    pub name: &'a str,
    /// Id of the exported filesystem.
    pub fs_id: FsId,
    /// Export options the endpoint was created with.
    pub options: &'a str,
}

fn validate_fs_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > NAME_MAX {
        return Err(FsError::Invalid("invalid filesystem name"));
    }
    Ok(())
}

/// The registry of named filesystems.
pub struct Registry {
    kvs: Arc<dyn KvsBackend>,
    dstore: Arc<dyn ObjectStore>,
    ns_index: Box<dyn KvsIndex>,
    e_ops: Box<dyn EndpointOps>,
    filesystems: HashMap<String, Filesystem>,
}

impl Registry {
    /// Bring the registry up on the given backends: open (creating on first
    /// use) the namespace index, load every filesystem it records, bind
    /// tenants to their filesystems, and initialize the endpoint plug-in.
    pub fn init(
        kvs: Arc<dyn KvsBackend>,
        dstore: Arc<dyn ObjectStore>,
        e_ops: Box<dyn EndpointOps>,
    ) -> Result<Registry> {
        match kvs.index_create(&REGISTRY_INDEX_FID) {
            Ok(()) | Err(FsError::AlreadyExists) => {}
            Err(e) => return Err(e),
        }
        let ns_index = kvs.index_open(&REGISTRY_INDEX_FID)?;

        let mut registry = Registry {
            kvs,
            dstore,
            ns_index,
            e_ops,
            filesystems: HashMap::new(),
        };
        registry.scan_namespace()?;
        registry.scan_tenants()?;
        registry.e_ops.init()?;

        info!(
            "filesystem registry initialized, {} filesystem(s)",
            registry.filesystems.len()
        );
        Ok(registry)
    }

    fn scan_namespace(&mut self) -> Result<()> {
        let records: Vec<Vec<u8>> = self
            .ns_index
            .iter_prefix(&fs_name_prefix())
            .map(|(_, value)| value)
            .collect();
        for value in records {
            let rec: NsRecord = bincode::deserialize(&value)?;
            info!("trying to load FS: {}", rec.name);
            let index = self.kvs.index_open(&rec.index_fid)?;
            let fs = Filesystem::open(
                rec.name.clone(),
                rec.fs_id,
                rec.index_fid,
                index,
                Arc::clone(&self.dstore),
            )?;
            self.filesystems.insert(rec.name, fs);
        }
        Ok(())
    }

    fn scan_tenants(&mut self) -> Result<()> {
        let records: Vec<Vec<u8>> = self
            .ns_index
            .iter_prefix(&tenant_prefix())
            .map(|(_, value)| value)
            .collect();
        for value in records {
            let rec: TenantRecord = bincode::deserialize(&value)?;
            match self.filesystems.get_mut(&rec.name) {
                Some(fs) => fs.set_tenant(Some(Tenant {
                    name: rec.name,
                    fs_id: rec.fs_id,
                    options: rec.options,
                })),
                None => {
                    warn!("tenant {} has no filesystem", rec.name);
                    return Err(FsError::Corrupt(
                        "tenant list and filesystem list are inconsistent",
                    ));
                }
            }
        }
        Ok(())
    }

    /// Shut the registry down: finalize the endpoint plug-in and drop the
    /// in-memory filesystem contexts. Persistent state is untouched.
    pub fn fini(mut self) -> Result<()> {
        self.e_ops.fini()?;
        for fs in self.filesystems.values_mut() {
            fs.set_tenant(None);
        }
        self.filesystems.clear();
        Ok(())
    }

    /// Create a filesystem named `name`: allocate an id, persist the
    /// namespace records, create and provision its index with a root inode,
    /// and insert the open context into the in-memory map.
    pub fn fs_create(&mut self, name: &str) -> Result<()> {
        validate_fs_name(name)?;
        if self.filesystems.contains_key(name) {
            warn!("{} already exists", name);
            return Err(FsError::AlreadyExists);
        }

        self.ns_index.begin_transaction()?;
        let (fs_id, index_fid) = match self.fs_create_records(name) {
            Ok(ids) => ids,
            Err(e) => {
                let _ = self.ns_index.discard_transaction();
                return Err(e);
            }
        };

        match self.fs_create_index(name, fs_id, index_fid) {
            Ok(fs) => {
                self.ns_index.end_transaction()?;
                self.filesystems.insert(name.to_string(), fs);
                info!("fs_name={} fs_id={} created", name, fs_id);
                Ok(())
            }
            Err(e) => {
                let _ = self.kvs.index_delete(&index_fid);
                let _ = self.ns_index.discard_transaction();
                Err(e)
            }
        }
    }

    fn fs_create_records(&mut self, name: &str) -> Result<(FsId, Fid)> {
        let fs_id = match self.ns_index.get(&fs_id_next_key()) {
            Ok(value) => bincode::deserialize::<FsId>(&value)?,
            Err(e) if e.is_not_found() => 1,
            Err(e) => return Err(e),
        };
        self.ns_index
            .set(&fs_id_next_key(), &bincode::serialize(&(fs_id + 1))?)?;

        let index_fid = fs_index_fid(fs_id);
        let rec = NsRecord {
            name: name.to_string(),
            fs_id,
            index_fid,
        };
        self.ns_index
            .set(&fs_name_key(name), &bincode::serialize(&rec)?)?;
        self.ns_index
            .set(&fs_id_key(fs_id), &bincode::serialize(&rec.name)?)?;
        Ok((fs_id, index_fid))
    }

    fn fs_create_index(&mut self, name: &str, fs_id: FsId, index_fid: Fid) -> Result<Filesystem> {
        self.kvs.index_create(&index_fid)?;
        let mut index = self.kvs.index_open(&index_fid)?;
        tree::create_root(index.as_mut())?;
        Filesystem::open(
            name.to_string(),
            fs_id,
            index_fid,
            index,
            Arc::clone(&self.dstore),
        )
    }

    /// Delete the filesystem named `name`. It must exist, must not be
    /// exported, and must be empty.
    pub fn fs_delete(&mut self, name: &str) -> Result<()> {
        {
            let fs = self.filesystems.get(name).ok_or_else(|| {
                warn!("cannot delete {}: no such filesystem", name);
                FsError::NotFound
            })?;
            if fs.tenant().is_some() {
                warn!("cannot delete exported filesystem {}", name);
                return Err(FsError::Invalid("filesystem is exported"));
            }
            if fs.tree_has_children(ROOT_INODE)? {
                warn!("cannot delete filesystem {}: not empty", name);
                return Err(FsError::NotEmpty);
            }
        }

        let mut fs = self
            .filesystems
            .remove(name)
            .expect("presence checked above");
        let fs_id = fs.fs_id();
        let index_fid = fs.index_fid();

        tree::delete_root(fs.index_mut())?;
        drop(fs);
        self.kvs.index_delete(&index_fid)?;

        self.ns_index.begin_transaction()?;
        let rc = self
            .ns_index
            .del(&fs_name_key(name))
            .and_then(|()| self.ns_index.del(&fs_id_key(fs_id)));
        match rc {
            Ok(()) => self.ns_index.end_transaction()?,
            Err(e) => {
                let _ = self.ns_index.discard_transaction();
                return Err(e);
            }
        }

        info!("fs_name={} fs_id={} deleted", name, fs_id);
        Ok(())
    }

    /// Export the filesystem `name` by creating its endpoint. The
    /// filesystem must exist and must not already be exported.
    pub fn endpoint_create(&mut self, name: &str, options: &str) -> Result<()> {
        let fs_id = {
            let fs = self.filesystems.get(name).ok_or_else(|| {
                warn!("cannot create endpoint for non-existent fs {}", name);
                FsError::NotFound
            })?;
            if fs.tenant().is_some() {
                warn!("fs {} already exported", name);
                return Err(FsError::AlreadyExists);
            }
            fs.fs_id()
        };

        self.e_ops.create(name, fs_id, options)?;

        let rec = TenantRecord {
            name: name.to_string(),
            fs_id,
            options: options.to_string(),
        };
        self.ns_index
            .set(&tenant_key(name), &bincode::serialize(&rec)?)?;

        if let Some(fs) = self.filesystems.get_mut(name) {
            fs.set_tenant(Some(Tenant {
                name: name.to_string(),
                fs_id,
                options: options.to_string(),
            }));
        }

        info!("endpoint_name={} created", name);
        Ok(())
    }

    /// Remove the export endpoint of filesystem `name`.
    pub fn endpoint_delete(&mut self, name: &str) -> Result<()> {
        let fs_id = {
            let fs = self.filesystems.get(name).ok_or_else(|| {
                warn!("cannot delete endpoint: no such fs {}", name);
                FsError::NotFound
            })?;
            match fs.tenant() {
                Some(tenant) => tenant.fs_id,
                None => {
                    warn!("cannot delete endpoint of {}: not exported", name);
                    return Err(FsError::NotFound);
                }
            }
        };

        self.e_ops.delete(fs_id)?;
        self.ns_index.del(&tenant_key(name))?;

        if let Some(fs) = self.filesystems.get_mut(name) {
            fs.set_tenant(None);
        }

        info!("endpoint_name={} deleted", name);
        Ok(())
    }

    /// Yield one [`FsListEntry`] per filesystem to `cb`; a callback error
    /// stops the scan and is returned.
    pub fn scan_list(&self, cb: &mut dyn FnMut(&FsListEntry<'_>) -> Result<()>) -> Result<()> {
        for fs in self.filesystems.values() {
            cb(&FsListEntry {
                name: fs.name(),
                endpoint: fs.tenant(),
            })?;
        }
        Ok(())
    }

    /// Yield one [`EndpointEntry`] per exported filesystem to `cb`.
    pub fn scan_endpoints(
        &self,
        cb: &mut dyn FnMut(&EndpointEntry<'_>) -> Result<()>,
    ) -> Result<()> {
        for fs in self.filesystems.values() {
            if let Some(tenant) = fs.tenant() {
                cb(&EndpointEntry {
                    name: fs.name(),
                    fs_id: tenant.fs_id,
                    options: &tenant.options,
                })?;
            }
        }
        Ok(())
    }

    /// Borrow the open filesystem named `name` for a data-plane operation.
    pub fn lookup(&mut self, name: &str) -> Result<&mut Filesystem> {
        self.filesystems.get_mut(name).ok_or(FsError::NotFound)
    }
}

// Scenario tests for the registry lifecycle.
#[cfg(test)]
#[path = "../../api/fs-tests/registry_test.rs"]
mod tests;
