//! The directory graph: dentry and parent-backlink maintenance.
//!
//! A directory's contents are the dentry records sharing its dentry key
//! prefix. Every dentry `(parent, name) -> child` is paired with a backlink
//! `(child, parent) -> count` so a child knows how many dentries each parent
//! holds on it; a backlink is deleted when its count reaches zero.
//!
//! Two `NotFound`s are swallowed here by design, and only these two: a
//! missing backlink on the first attach of a `(child, parent)` pair counts
//! as zero, and running off the end of a prefix iteration is normal
//! exhaustion.

use log::debug;

use kvsfs_api::error::{FsError, Result};
use kvsfs_api::kvstore::KvsIndex;
use kvsfs_api::types::{Ino, Stat, StatFlags, S_IFDIR, ROOT_INODE};

use crate::fs::Filesystem;
use crate::keys::{
    dentry_key, dentry_name_from_key, dentry_prefix, inode_attr_key, parent_key, KeyType,
};

fn decode_ino(value: &[u8]) -> Result<Ino> {
    if value.len() != 8 {
        return Err(FsError::Corrupt("dentry value has wrong size"));
    }
    Ok(bincode::deserialize(value)?)
}

fn decode_count(value: &[u8]) -> Result<u64> {
    if value.len() != 8 {
        return Err(FsError::Corrupt("backlink value has wrong size"));
    }
    Ok(bincode::deserialize(value)?)
}

impl Filesystem {
    /// Insert the dentry `(parent, name) -> child` and bump the backlink.
    /// Touches the parent's ctime/mtime. The caller has already ensured the
    /// name is absent; an existing dentry is silently overwritten here.
    pub fn tree_attach(&mut self, parent: Ino, child: Ino, name: &str) -> Result<()> {
        let dkey = dentry_key(parent, name);
        self.index_mut().set(&dkey, &bincode::serialize(&child)?)?;

        let pkey = parent_key(child, parent);
        let count = match self.index().get(&pkey) {
            Ok(value) => decode_count(&value)?,
            //First dentry from this parent to this child.
            Err(e) if e.is_not_found() => 0,
            Err(e) => return Err(e),
        };
        self.index_mut()
            .set(&pkey, &bincode::serialize(&(count + 1))?)?;

        self.update_stat(parent, StatFlags::CTIME_SET | StatFlags::MTIME_SET)?;

        debug!("tree_attach(pino={}, ino={}, n={})", parent, child, name);
        Ok(())
    }

    /// Remove the dentry `(parent, name)` and drop the backlink count,
    /// deleting the backlink when it reaches zero. Touches the parent's
    /// ctime/mtime. Fails `NotFound` if the dentry is absent.
    pub fn tree_detach(&mut self, parent: Ino, child: Ino, name: &str) -> Result<()> {
        let dkey = dentry_key(parent, name);
        self.index_mut().del(&dkey)?;

        let pkey = parent_key(child, parent);
        let count = match self.index().get(&pkey) {
            Ok(value) => decode_count(&value)?,
            //The dentry existed, so its backlink must too.
            Err(e) if e.is_not_found() => {
                return Err(FsError::Corrupt("backlink missing for dentry"))
            }
            Err(e) => return Err(e),
        };
        if count > 1 {
            self.index_mut()
                .set(&pkey, &bincode::serialize(&(count - 1))?)?;
        } else {
            self.index_mut().del(&pkey)?;
        }

        self.update_stat(parent, StatFlags::CTIME_SET | StatFlags::MTIME_SET)?;

        debug!("tree_detach(pino={}, ino={}, n={})", parent, child, name);
        Ok(())
    }

    /// Resolve `name` inside the directory `parent`. Fails `NotFound` if
    /// there is no such entry.
    pub fn tree_lookup(&self, parent: Ino, name: &str) -> Result<Ino> {
        let value = self.index().get(&dentry_key(parent, name))?;
        let ino = decode_ino(&value)?;
        debug!("GET {}.dentries.{} = {}", parent, name, ino);
        Ok(ino)
    }

    /// True iff the directory `ino` holds at least one dentry.
    pub fn tree_has_children(&self, ino: Ino) -> Result<bool> {
        let has = self.index().iter_prefix(&dentry_prefix(ino)).next().is_some();
        debug!("{} {} children", ino, if has { "has" } else { "doesn't have" });
        Ok(has)
    }

    /// Iterate the children of directory `ino` in key order, calling back
    /// with each `(name, child_ino)`. Iteration stops early when the
    /// callback returns `false`; exhaustion is success.
    pub fn tree_iter_children(
        &self,
        ino: Ino,
        cb: &mut dyn FnMut(&str, Ino) -> bool,
    ) -> Result<()> {
        let prefix = dentry_prefix(ino);
        for (key, value) in self.index().iter_prefix(&prefix) {
            let name = dentry_name_from_key(&key)?;
            let child = decode_ino(&value)?;
            debug!("NEXT {} = {}", name, child);
            if !cb(name, child) {
                break;
            }
        }
        Ok(())
    }

    /// Rename a dentry under one parent: delete the old name, insert the new
    /// one with the same child, touch the parent's ctime. The caller has
    /// checked that the new name is absent.
    pub fn tree_rename_link(&mut self, parent: Ino, old_name: &str, new_name: &str) -> Result<()> {
        let old_key = dentry_key(parent, old_name);
        let value = self.index().get(&old_key)?;
        self.index_mut().del(&old_key)?;
        self.index_mut().set(&dentry_key(parent, new_name), &value)?;

        self.update_stat(parent, StatFlags::CTIME_SET)?;

        debug!(
            "tree_rename(pino={}, o={}, n={})",
            parent, old_name, new_name
        );
        Ok(())
    }
}

/// Provision the root of a fresh filesystem index: the root's self backlink,
/// the inode counter starting after the root, and the root stat
/// (`S_IFDIR | 0777`, two links).
pub fn create_root(index: &mut dyn KvsIndex) -> Result<()> {
    index.set(
        &parent_key(ROOT_INODE, ROOT_INODE),
        &bincode::serialize(&1u64)?,
    )?;

    index.set(
        &inode_attr_key(ROOT_INODE, KeyType::InoCounter),
        &bincode::serialize(&(ROOT_INODE + 1))?,
    )?;

    let stat = Stat {
        st_ino: ROOT_INODE,
        st_mode: S_IFDIR | 0o777,
        st_nlink: 2,
        ..Stat::default()
    };
    index.set(
        &inode_attr_key(ROOT_INODE, KeyType::Stat),
        &bincode::serialize(&stat)?,
    )?;
    Ok(())
}

/// Inverse of [`create_root`], for destructive filesystem deletion.
pub fn delete_root(index: &mut dyn KvsIndex) -> Result<()> {
    index.del(&parent_key(ROOT_INODE, ROOT_INODE))?;
    index.del(&inode_attr_key(ROOT_INODE, KeyType::InoCounter))?;
    index.del(&inode_attr_key(ROOT_INODE, KeyType::Stat))?;
    Ok(())
}
