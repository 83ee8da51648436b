//! Typed inode attributes: stat records, symlink targets, object-id
//! mappings, and the per-filesystem inode counter.
//!
//! Every attribute is one KVS record keyed by `(ino, key_type)` through the
//! encoding in [`keys`](crate::keys). The specializations below check the
//! sizes of fixed-size records on read-back; a mismatch means the store is
//! corrupted and is reported as such, never ignored.

use log::trace;

use kvsfs_api::dstore::STAT_BLOCK_SIZE;
use kvsfs_api::error::{FsError, Result};
use kvsfs_api::types::{
    Ino, Oid, Stat, StatFlags, Timespec, FID_SIZE, MAX_LINK, ROOT_INODE, STAT_SIZE,
};

use crate::fs::Filesystem;
use crate::keys::{inode_attr_key, KeyType};

/// Recompute `st_blocks` from a byte size.
pub fn size_to_blocks(size: u64) -> u64 {
    (size + STAT_BLOCK_SIZE - 1) / STAT_BLOCK_SIZE
}

/// Apply a set of amendments to a stat record in memory.
///
/// Time flags set the corresponding timestamp to the current wall time.
/// Link-count flags check their bounds: incrementing at [`MAX_LINK`] and
/// decrementing at zero both fail with an invalid-argument error, leaving
/// the record untouched from the failing flag onward.
pub fn amend_stat(stat: &mut Stat, flags: StatFlags) -> Result<()> {
    let t = Timespec::now();

    if flags.contains(StatFlags::ATIME_SET) {
        stat.st_atim = t;
    }
    if flags.contains(StatFlags::MTIME_SET) {
        stat.st_mtim = t;
    }
    if flags.contains(StatFlags::CTIME_SET) {
        stat.st_ctim = t;
    }

    if flags.contains(StatFlags::INCR_LINK) {
        if stat.st_nlink == MAX_LINK {
            return Err(FsError::Invalid("link count overflow"));
        }
        stat.st_nlink += 1;
    }

    if flags.contains(StatFlags::DECR_LINK) {
        if stat.st_nlink == 0 {
            return Err(FsError::Invalid("link count underflow"));
        }
        stat.st_nlink -= 1;
    }

    if flags.contains(StatFlags::SIZE_SET) {
        stat.st_blocks = size_to_blocks(stat.st_size);
    }

    Ok(())
}

impl Filesystem {
    fn attr_get(&self, ino: Ino, ktype: KeyType) -> Result<Vec<u8>> {
        let rc = self.index().get(&inode_attr_key(ino, ktype));
        trace!("GET {}.{:?} rc={}", ino, ktype, rc.is_ok());
        rc
    }

    fn attr_set(&mut self, ino: Ino, ktype: KeyType, buf: &[u8]) -> Result<()> {
        trace!("SET {}.{:?} = ({})", ino, ktype, buf.len());
        self.index_mut().set(&inode_attr_key(ino, ktype), buf)
    }

    fn attr_del(&mut self, ino: Ino, ktype: KeyType) -> Result<()> {
        trace!("DEL {}.{:?}", ino, ktype);
        self.index_mut().del(&inode_attr_key(ino, ktype))
    }

    /// Load the stat record of `ino`.
    pub fn get_stat(&self, ino: Ino) -> Result<Stat> {
        let buf = self.attr_get(ino, KeyType::Stat)?;
        if buf.len() as u64 != *STAT_SIZE {
            return Err(FsError::Corrupt("stat record has wrong size"));
        }
        Ok(bincode::deserialize(&buf)?)
    }

    /// Store the stat record of `ino`.
    pub fn set_stat(&mut self, ino: Ino, stat: &Stat) -> Result<()> {
        trace!(
            "set_stat({}), uid: {}, gid: {}, mode: {:04o}",
            ino,
            stat.st_uid,
            stat.st_gid,
            stat.st_mode & 0o7777
        );
        self.attr_set(ino, KeyType::Stat, &bincode::serialize(stat)?)
    }

    /// Delete the stat record of `ino`.
    pub fn del_stat(&mut self, ino: Ino) -> Result<()> {
        self.attr_del(ino, KeyType::Stat)
    }

    /// Load, amend, and store the stat record of `ino` in one step.
    pub fn update_stat(&mut self, ino: Ino, flags: StatFlags) -> Result<()> {
        let mut stat = self.get_stat(ino)?;
        amend_stat(&mut stat, flags)?;
        self.set_stat(ino, &stat)?;
        trace!("update stats ({:?}) for {}", flags, ino);
        Ok(())
    }

    /// Load the symlink target of `ino`.
    pub fn get_symlink(&self, ino: Ino) -> Result<Vec<u8>> {
        self.attr_get(ino, KeyType::Symlink)
    }

    /// Store the symlink target of `ino`.
    pub fn set_symlink(&mut self, ino: Ino, target: &[u8]) -> Result<()> {
        self.attr_set(ino, KeyType::Symlink, target)
    }

    /// Delete the symlink target of `ino`.
    pub fn del_symlink(&mut self, ino: Ino) -> Result<()> {
        self.attr_del(ino, KeyType::Symlink)
    }

    /// Store the inode-to-object-id mapping of `ino`.
    pub fn set_ino_oid(&mut self, ino: Ino, oid: &Oid) -> Result<()> {
        trace!("ino={} oid={:x}:{:x}", ino, oid.hi, oid.lo);
        self.attr_set(ino, KeyType::InodeOid, &bincode::serialize(oid)?)
    }

    /// Load the object id backing `ino`.
    pub fn ino_to_oid(&self, ino: Ino) -> Result<Oid> {
        let buf = self.attr_get(ino, KeyType::InodeOid)?;
        if buf.len() as u64 != *FID_SIZE {
            return Err(FsError::Corrupt("oid record has wrong size"));
        }
        Ok(bincode::deserialize(&buf)?)
    }

    /// Delete the inode-to-object-id mapping of `ino`.
    pub fn del_oid(&mut self, ino: Ino) -> Result<()> {
        self.attr_del(ino, KeyType::InodeOid)
    }

    /// Allocate the next inode number from the per-filesystem counter, which
    /// lives as an attribute of the root inode.
    pub fn next_inode(&mut self) -> Result<Ino> {
        let buf = self.attr_get(ROOT_INODE, KeyType::InoCounter)?;
        let next: Ino = bincode::deserialize(&buf)?;
        self.attr_set(
            ROOT_INODE,
            KeyType::InoCounter,
            &bincode::serialize(&(next + 1))?,
        )?;
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_follow_size() {
        assert_eq!(size_to_blocks(0), 0);
        assert_eq!(size_to_blocks(1), 1);
        assert_eq!(size_to_blocks(512), 1);
        assert_eq!(size_to_blocks(513), 2);
    }

    #[test]
    fn amend_sets_times_together() {
        let mut stat = Stat::default();
        amend_stat(
            &mut stat,
            StatFlags::ATIME_SET | StatFlags::MTIME_SET | StatFlags::CTIME_SET,
        )
        .unwrap();
        assert!(stat.st_atim.tv_sec > 0);
        assert_eq!(stat.st_atim, stat.st_mtim);
        assert_eq!(stat.st_mtim, stat.st_ctim);
    }

    #[test]
    fn link_count_bounds() {
        let mut stat = Stat::default();
        assert!(amend_stat(&mut stat, StatFlags::DECR_LINK).is_err());
        assert_eq!(stat.st_nlink, 0);

        amend_stat(&mut stat, StatFlags::INCR_LINK).unwrap();
        assert_eq!(stat.st_nlink, 1);

        stat.st_nlink = MAX_LINK;
        assert!(amend_stat(&mut stat, StatFlags::INCR_LINK).is_err());
        assert_eq!(stat.st_nlink, MAX_LINK);
    }

    #[test]
    fn size_set_recomputes_blocks() {
        let mut stat = Stat::default();
        stat.st_size = 1025;
        amend_stat(&mut stat, StatFlags::SIZE_SET).unwrap();
        assert_eq!(stat.st_blocks, 3);
    }
}
