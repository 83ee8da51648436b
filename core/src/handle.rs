//! File handles: cached inode views with a wire representation.
//!
//! A [`FileHandle`] is a non-owning snapshot of an inode — its number plus
//! its loaded stat record. Operations amend the stat in memory and then
//! either [`flush`](FileHandle::flush) it back to the store or simply drop
//! the handle to discard the amendments; nothing is written implicitly.
//!
//! Handles are built by loading from the store ([`FileHandle::from_ino`]),
//! by directory lookup ([`FileHandle::lookup`]), or from the 16-byte on-wire
//! form ([`FileHandle::deserialize`]). The wire form is `{fsid: u64,
//! ino: u64}`, little-endian, and its size is a stable constant.

use log::debug;

use kvsfs_api::error::{FsError, Result};
use kvsfs_api::types::{Access, Cred, FsId, Ino, Stat, ROOT_INODE};

use crate::access::access_check;
use crate::fs::Filesystem;

/// Size of the on-wire file handle representation, in bytes.
pub const FH_SERIALIZED_SIZE: usize = 16;

/// Process-local unique key of a file handle, for in-memory containers.
/// Not stable across processes; the on-wire form is what travels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FhKey {
    /// Id of the filesystem the handle belongs to.
    pub fs_id: FsId,
    /// Inode number.
    pub ino: Ino,
}

/// Cached view of one inode: its number and its stat record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHandle {
    ino: Ino,
    stat: Stat,
}

impl FileHandle {
    fn invariant(&self) -> bool {
        self.stat.st_ino == self.ino && self.ino >= ROOT_INODE
    }

    /// Build a handle for `ino` by loading its stat record.
    pub fn from_ino(fs: &Filesystem, ino: Ino) -> Result<FileHandle> {
        let stat = fs.get_stat(ino)?;
        let fh = FileHandle { ino, stat };
        if !fh.invariant() {
            return Err(FsError::Corrupt("stat record does not match its inode"));
        }
        Ok(fh)
    }

    /// Build a handle for the filesystem root, checking read access.
    pub fn getroot(fs: &Filesystem, cred: &Cred) -> Result<FileHandle> {
        let fh = FileHandle::from_ino(fs, ROOT_INODE)?;
        access_check(cred, &fh.stat, Access::READ)?;
        Ok(fh)
    }

    /// Look `name` up in the directory `parent` and build a handle for the
    /// child. Checks read access on the parent. `".."` at the root resolves
    /// to the root itself. The parent's atime is deliberately not updated.
    pub fn lookup(
        fs: &Filesystem,
        cred: &Cred,
        parent: &FileHandle,
        name: &str,
    ) -> Result<FileHandle> {
        access_check(cred, &parent.stat, Access::READ)?;

        let ino = if parent.ino == ROOT_INODE && name == ".." {
            ROOT_INODE
        } else {
            fs.tree_lookup(parent.ino, name)?
        };

        if ino < ROOT_INODE {
            return Err(FsError::Corrupt("dentry points below the root inode"));
        }
        FileHandle::from_ino(fs, ino)
    }

    /// Inode number of this handle.
    pub fn ino(&self) -> Ino {
        self.ino
    }

    /// The cached stat record.
    pub fn stat(&self) -> &Stat {
        &self.stat
    }

    /// Mutable access to the cached stat, for in-memory amendment before a
    /// [`flush`](FileHandle::flush).
    pub fn stat_mut(&mut self) -> &mut Stat {
        &mut self.stat
    }

    /// Write the cached stat back to the store. The counterpart of dropping
    /// the handle, which discards any amendments.
    pub fn flush(&self, fs: &mut Filesystem) -> Result<()> {
        debug_assert!(self.invariant());
        fs.set_stat(self.ino, &self.stat)
    }

    /// Process-local container key.
    pub fn key(&self, fs: &Filesystem) -> FhKey {
        FhKey {
            fs_id: fs.fs_id(),
            ino: self.ino,
        }
    }

    /// Write the on-wire form into `buf`, returning the number of bytes
    /// written. Fails `NoBuffer` if `buf` is shorter than
    /// [`FH_SERIALIZED_SIZE`].
    pub fn serialize(&self, buf: &mut [u8], fsid: FsId) -> Result<usize> {
        if buf.len() < FH_SERIALIZED_SIZE {
            return Err(FsError::NoBuffer);
        }
        buf[..8].copy_from_slice(&fsid.to_le_bytes());
        buf[8..16].copy_from_slice(&self.ino.to_le_bytes());
        Ok(FH_SERIALIZED_SIZE)
    }

    /// Rebuild a handle from its on-wire form against `fs`. The embedded
    /// fsid must match `fs` — a handle minted under one filesystem is not
    /// interpretable against another.
    pub fn deserialize(fs: &Filesystem, buf: &[u8]) -> Result<FileHandle> {
        if buf.len() != FH_SERIALIZED_SIZE {
            return Err(FsError::Invalid("malformed on-wire file handle"));
        }
        let mut fsid_bytes = [0u8; 8];
        fsid_bytes.copy_from_slice(&buf[..8]);
        let fsid = u64::from_le_bytes(fsid_bytes);
        if fsid != fs.fs_id() {
            debug!("file handle fsid {} does not match fs {}", fsid, fs.fs_id());
            return Err(FsError::Invalid("file handle from a different filesystem"));
        }
        let mut ino_bytes = [0u8; 8];
        ino_bytes.copy_from_slice(&buf[8..16]);
        FileHandle::from_ino(fs, u64::from_le_bytes(ino_bytes))
    }
}

// Scenario tests for handles live with the other integration tests.
#[cfg(test)]
#[path = "../../api/fs-tests/handle_test.rs"]
mod tests;
