//! The POSIX namespace operations.
//!
//! Every operation follows the same shape: load the handles it needs, check
//! access, run the dependent KVS mutations inside one transaction bracket,
//! amend the in-memory stats, and flush the handles it amended. On any error
//! the bracket is discarded and nothing amended in memory reaches the store.
//!
//! The only path that physically destroys a file is
//! [`destroy_orphaned`](Filesystem::destroy_orphaned), invoked when an
//! inode's link count reaches zero — directly by `unlink` and `rename`, or
//! at close time by a front-end that kept the file open past its last link
//! (see [`RenameFlags::is_dst_open`]).

use log::{debug, trace, warn};

use kvsfs_api::dstore::DEFAULT_BLOCK_SIZE;
use kvsfs_api::error::{FsError, Result};
use kvsfs_api::types::{
    Access, Cred, FileType, Ino, Stat, StatFlags, Timespec, NAME_MAX, PATH_MAX, S_IFDIR, S_IFLNK,
    S_IFMT, S_IFREG,
};

use crate::access::access_check;
use crate::attrs::{amend_stat, size_to_blocks};
use crate::fs::Filesystem;
use crate::handle::FileHandle;

/// Caller-provided context for [`Filesystem::rename`].
#[derive(Debug, Default, Clone, Copy)]
pub struct RenameFlags {
    /// True when a front-end still holds the overwritten destination open;
    /// its destruction is then deferred to the close path instead of
    /// happening inside the rename.
    pub is_dst_open: bool,
}

/// Reject names that may not be created: empty, over-long, or one of the
/// reserved entries every directory already has.
fn validate_new_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(FsError::Invalid("empty name"));
    }
    if name.len() > NAME_MAX {
        debug!("name too long: {}", name);
        return Err(FsError::NameTooLong);
    }
    if name == "." || name == "/" || name == ".." {
        debug!("file already exists: {}", name);
        return Err(FsError::AlreadyExists);
    }
    Ok(())
}

impl Filesystem {
    /// Create a dentry plus a freshly initialized inode under `parent_fh`:
    /// the common trunk of `creat`, `mkdir`, and `symlink`.
    ///
    /// The parent handle's stat is amended in memory (ctime/mtime, plus the
    /// `..` hardlink for a new directory) and persisted within the same
    /// transaction as the new records; the caller still flushes the handle
    /// it owns.
    fn create_entry(
        &mut self,
        cred: &Cred,
        parent_fh: &mut FileHandle,
        name: &str,
        link_target: Option<&str>,
        mode: u32,
        ftype: FileType,
    ) -> Result<Ino> {
        validate_new_name(name)?;

        match link_target {
            None if ftype == FileType::Symlink => {
                return Err(FsError::Invalid("symlink without a target"))
            }
            Some(target) if target.len() > PATH_MAX => {
                return Err(FsError::Invalid("symlink target too long"))
            }
            _ => {}
        }

        match self.tree_lookup(parent_fh.ino(), name) {
            Ok(_) => return Err(FsError::AlreadyExists),
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }

        let new_ino = self.next_inode()?;

        self.begin_txn()?;
        match self.create_entry_txn(cred, parent_fh, name, link_target, mode, ftype, new_ino) {
            Ok(()) => {
                self.end_txn()?;
                Ok(new_ino)
            }
            Err(e) => {
                let _ = self.discard_txn();
                trace!("create_entry failed: {}", e);
                Err(e)
            }
        }
    }

    fn create_entry_txn(
        &mut self,
        cred: &Cred,
        parent_fh: &mut FileHandle,
        name: &str,
        link_target: Option<&str>,
        mode: u32,
        ftype: FileType,
        new_ino: Ino,
    ) -> Result<()> {
        self.tree_attach(parent_fh.ino(), new_ino, name)?;

        let now = Timespec::now();
        let mut stat = Stat {
            st_ino: new_ino,
            st_uid: cred.uid,
            st_gid: cred.gid,
            st_blksize: DEFAULT_BLOCK_SIZE,
            st_atim: now,
            st_mtim: now,
            st_ctim: now,
            ..Stat::default()
        };
        match ftype {
            FileType::Dir => {
                stat.st_mode = S_IFDIR | mode;
                stat.st_nlink = 2;
            }
            FileType::File => {
                stat.st_mode = S_IFREG | mode;
                stat.st_nlink = 1;
            }
            FileType::Symlink => {
                stat.st_mode = S_IFLNK | mode;
                stat.st_nlink = 1;
            }
        }
        self.set_stat(new_ino, &stat)?;

        if let Some(target) = link_target {
            self.set_symlink(new_ino, target.as_bytes())?;
        }

        /* Child dir has a "hardlink" to the parent ("..") */
        let parent_flags = if ftype == FileType::Dir {
            StatFlags::CTIME_SET | StatFlags::MTIME_SET | StatFlags::INCR_LINK
        } else {
            StatFlags::CTIME_SET | StatFlags::MTIME_SET
        };
        amend_stat(parent_fh.stat_mut(), parent_flags)?;
        self.set_stat(parent_fh.ino(), parent_fh.stat())?;
        Ok(())
    }

    /// Create a regular file: tree entries, a fresh object id, the
    /// inode-to-oid mapping, and the backing object itself.
    pub fn creat(&mut self, cred: &Cred, parent: Ino, name: &str, mode: u32) -> Result<Ino> {
        let mut parent_fh = FileHandle::from_ino(self, parent)?;
        access_check(cred, parent_fh.stat(), Access::WRITE)?;

        self.begin_txn()?;
        let child = match self.creat_txn(cred, &mut parent_fh, name, mode) {
            Ok(child) => {
                self.end_txn()?;
                child
            }
            Err(e) => {
                let _ = self.discard_txn();
                return Err(e);
            }
        };
        parent_fh.flush(self)?;

        trace!("parent_ino={} name={} child_ino={}", parent, name, child);
        Ok(child)
    }

    fn creat_txn(
        &mut self,
        cred: &Cred,
        parent_fh: &mut FileHandle,
        name: &str,
        mode: u32,
    ) -> Result<Ino> {
        let child = self.create_entry(cred, parent_fh, name, None, mode, FileType::File)?;
        let oid = self.dstore().new_objid()?;
        self.set_ino_oid(child, &oid)?;
        self.dstore().obj_create(&oid)?;
        Ok(child)
    }

    /// Create a regular file and apply initial attributes in one compound
    /// operation, returning the resulting stat. If the attribute application
    /// fails after the create succeeded, the new entry is unlinked (which
    /// also deletes the freshly created object) and the bracket discarded.
    pub fn creat_ex(
        &mut self,
        cred: &Cred,
        parent: Ino,
        name: &str,
        mode: u32,
        setstat: &Stat,
        flags: StatFlags,
    ) -> Result<(Ino, Stat)> {
        self.begin_txn()?;

        let child = match self.creat(cred, parent, name, mode) {
            Ok(child) => child,
            Err(e) => {
                let _ = self.discard_txn();
                return Err(e);
            }
        };

        let rc = match self.setattr(cred, child, setstat, flags) {
            Ok(()) => self.getattr(cred, child),
            Err(e) => Err(e),
        };

        match rc {
            Ok(stat) => {
                self.end_txn()?;
                Ok((child, stat))
            }
            Err(e) => {
                //The KVS discard cannot remove the object the create made;
                //unlinking first destroys it, and the record churn cancels
                //out under the discard.
                let _ = self.unlink(cred, parent, Some(child), name);
                let _ = self.discard_txn();
                warn!("parent_ino={} name={} create rollback: {}", parent, name, e);
                Err(e)
            }
        }
    }

    /// Create a directory. Directories reserve an object id even though
    /// their contents live entirely in the KVS, so no object is created.
    pub fn mkdir(&mut self, cred: &Cred, parent: Ino, name: &str, mode: u32) -> Result<Ino> {
        let mut parent_fh = FileHandle::from_ino(self, parent)?;
        access_check(cred, parent_fh.stat(), Access::WRITE)?;

        self.begin_txn()?;
        let child = match self.mkdir_txn(cred, &mut parent_fh, name, mode) {
            Ok(child) => {
                self.end_txn()?;
                child
            }
            Err(e) => {
                let _ = self.discard_txn();
                return Err(e);
            }
        };
        parent_fh.flush(self)?;

        trace!("parent_ino={} name={} newdir_ino={} mode={:o}", parent, name, child, mode);
        Ok(child)
    }

    fn mkdir_txn(
        &mut self,
        cred: &Cred,
        parent_fh: &mut FileHandle,
        name: &str,
        mode: u32,
    ) -> Result<Ino> {
        let child = self.create_entry(cred, parent_fh, name, None, mode, FileType::Dir)?;
        let oid = self.dstore().new_objid()?;
        self.set_ino_oid(child, &oid)?;
        Ok(child)
    }

    /// Create a symbolic link to `target`. Symlink permissions are never
    /// used, so the mode is fixed at `0777` (see `man 7 symlink`).
    pub fn symlink(&mut self, cred: &Cred, parent: Ino, name: &str, target: &str) -> Result<Ino> {
        let mut parent_fh = FileHandle::from_ino(self, parent)?;
        access_check(cred, parent_fh.stat(), Access::WRITE)?;

        let child =
            self.create_entry(cred, &mut parent_fh, name, Some(target), 0o777, FileType::Symlink)?;
        parent_fh.flush(self)?;

        trace!("parent_ino={} name={} newlnk_ino={}", parent, name, child);
        Ok(child)
    }

    /// Resolve `name` in the directory `parent`.
    pub fn lookup(&self, cred: &Cred, parent: Ino, name: &str) -> Result<Ino> {
        let parent_fh = FileHandle::from_ino(self, parent)?;
        let fh = FileHandle::lookup(self, cred, &parent_fh, name)?;
        Ok(fh.ino())
    }

    /// Create a hard link `dname` in directory `dir` to the existing inode
    /// `ino`.
    pub fn link(&mut self, cred: &Cred, ino: Ino, dir: Ino, dname: &str) -> Result<()> {
        validate_new_name(dname)?;

        let dir_stat = self.get_stat(dir)?;
        access_check(cred, &dir_stat, Access::WRITE)?;

        match self.lookup(cred, dir, dname) {
            Ok(_) => return Err(FsError::AlreadyExists),
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }

        self.with_txn(|fs| {
            fs.tree_attach(dir, ino, dname)?;
            fs.update_stat(ino, StatFlags::CTIME_SET | StatFlags::INCR_LINK)?;
            fs.update_stat(dir, StatFlags::MTIME_SET | StatFlags::CTIME_SET)?;
            Ok(())
        })?;

        trace!("ino={} dino={} dname={}", ino, dir, dname);
        Ok(())
    }

    /// Detach the dentry `(parent, name) -> child`, dropping the child's
    /// link count, without destroying the child. Both stats — the child's
    /// decremented link count and the parent's timestamps — are written
    /// within the same bracket as the dentry removal, so the link-count
    /// invariant holds at the transaction boundary.
    pub fn detach(&mut self, cred: &Cred, parent: Ino, child: Ino, name: &str) -> Result<()> {
        let mut parent_fh = FileHandle::from_ino(self, parent)?;
        let mut child_fh = FileHandle::from_ino(self, child)?;

        access_check(cred, parent_fh.stat(), Access::DELETE_ENTITY)?;

        self.begin_txn()?;
        match self.detach_txn(&mut parent_fh, &mut child_fh, name) {
            Ok(()) => self.end_txn()?,
            Err(e) => {
                let _ = self.discard_txn();
                return Err(e);
            }
        }

        trace!("parent_ino={} name={} child_ino={}", parent, name, child);
        Ok(())
    }

    fn detach_txn(
        &mut self,
        parent_fh: &mut FileHandle,
        child_fh: &mut FileHandle,
        name: &str,
    ) -> Result<()> {
        self.tree_detach(parent_fh.ino(), child_fh.ino(), name)?;
        amend_stat(
            child_fh.stat_mut(),
            StatFlags::CTIME_SET | StatFlags::DECR_LINK,
        )?;
        amend_stat(
            parent_fh.stat_mut(),
            StatFlags::CTIME_SET | StatFlags::MTIME_SET,
        )?;
        child_fh.flush(self)?;
        parent_fh.flush(self)?;
        Ok(())
    }

    /// Remove the directory entry `name` from `dir` and destroy the file if
    /// that was its last link. `ino` short-circuits the lookup when the
    /// caller already resolved the child.
    pub fn unlink(&mut self, cred: &Cred, dir: Ino, ino: Option<Ino>, name: &str) -> Result<()> {
        let child = match ino {
            Some(ino) => ino,
            None => self.lookup(cred, dir, name)?,
        };
        self.detach(cred, dir, child, name)?;
        self.destroy_orphaned(child)?;
        Ok(())
    }

    /// Physically destroy `ino` if it has no links left: its stat record,
    /// its symlink target or its backing object and oid mapping. A no-op
    /// while links remain. Directories never come through here — `rmdir`
    /// owns their teardown — so a link-less directory is store corruption.
    pub fn destroy_orphaned(&mut self, ino: Ino) -> Result<()> {
        let fh = FileHandle::from_ino(self, ino)?;
        if fh.stat().st_nlink > 0 {
            return Ok(());
        }
        let stat = *fh.stat();

        self.begin_txn()?;
        match self.destroy_orphaned_txn(ino, &stat) {
            Ok(()) => self.end_txn()?,
            Err(e) => {
                let _ = self.discard_txn();
                return Err(e);
            }
        }

        trace!("destroyed orphan inode={}", ino);
        Ok(())
    }

    fn destroy_orphaned_txn(&mut self, ino: Ino, stat: &Stat) -> Result<()> {
        self.del_stat(ino)?;
        if stat.is_lnk() {
            self.del_symlink(ino)?;
        } else if stat.is_reg() {
            let oid = self.ino_to_oid(ino)?;
            self.dstore().obj_delete(&oid)?;
            self.del_oid(ino)?;
        } else {
            warn!(
                "attempt to remove unsupported object type ({:o})",
                stat.st_mode
            );
            return Err(FsError::Corrupt("orphan destruction of a directory"));
        }
        Ok(())
    }

    /// Remove the empty directory `name` from `parent`.
    pub fn rmdir(&mut self, cred: &Cred, parent: Ino, name: &str) -> Result<()> {
        if name.len() > NAME_MAX {
            return Err(FsError::NameTooLong);
        }

        let parent_stat = self.get_stat(parent)?;
        access_check(cred, &parent_stat, Access::DELETE_ENTITY)?;

        let child = self.lookup(cred, parent, name)?;

        if self.tree_has_children(child)? {
            debug!("ino={} name={} not empty", child, name);
            return Err(FsError::NotEmpty);
        }

        self.with_txn(|fs| {
            fs.tree_detach(parent, child, name)?;
            fs.del_stat(child)?;
            /* Child dir had a "hardlink" to the parent ("..") */
            fs.update_stat(
                parent,
                StatFlags::DECR_LINK | StatFlags::MTIME_SET | StatFlags::CTIME_SET,
            )?;
            fs.del_oid(child)?;
            Ok(())
        })?;

        debug!("rmdir parent={} ino={} name={}", parent, child, name);
        Ok(())
    }

    /// Rename `(sdir, sname)` to `(ddir, dname)`, overwriting a compatible
    /// destination. An overwritten directory must be empty; an overwritten
    /// file becomes an orphan and is destroyed here unless the caller holds
    /// it open ([`RenameFlags::is_dst_open`]).
    pub fn rename(
        &mut self,
        cred: &Cred,
        sdir: Ino,
        sname: &str,
        ddir: Ino,
        dname: &str,
        flags: &RenameFlags,
    ) -> Result<()> {
        validate_new_name(dname)?;
        if sname.is_empty() || sname.len() > NAME_MAX {
            return Err(FsError::Invalid("bad source name"));
        }
        if sdir == ddir && sname == dname {
            return Err(FsError::Invalid("rename onto itself"));
        }
        let rename_inplace = sdir == ddir;

        self.access(cred, sdir, Access::DELETE_ENTITY)?;
        if !rename_inplace {
            self.access(cred, ddir, Access::CREATE_ENTITY)?;
        }

        let sino = self.lookup(cred, sdir, sname)?;

        let (overwrite_dst, dino) = match self.lookup(cred, ddir, dname) {
            Ok(dino) => (true, dino),
            Err(e) if e.is_not_found() => (false, 0),
            Err(e) => return Err(e),
        };

        let mut dst_is_dir = false;
        if overwrite_dst {
            let s_stat = self.get_stat(sino)?;
            let d_stat = self.get_stat(dino)?;
            if s_stat.is_dir() != d_stat.is_dir() {
                warn!(
                    "incompatible source and destination {:o},{:o}",
                    s_stat.st_mode, d_stat.st_mode
                );
                return Err(FsError::NotDir);
            }
            dst_is_dir = d_stat.is_dir();

            if dst_is_dir {
                if self.tree_has_children(dino)? {
                    warn!("destination is not empty ({}:{})", dino, dname);
                    return Err(FsError::AlreadyExists);
                }
                self.rmdir(cred, ddir, dname)?;
            } else {
                /* Make an orphan: it is destroyed either at the end of this
                 * function or when the file is closed. */
                debug!("detaching ({}, {}, {})", ddir, dino, dname);
                self.detach(cred, ddir, dino, dname)?;
            }
        }

        self.with_txn(|fs| {
            if rename_inplace {
                //Dentry rename only; no re-linking of the inodes.
                fs.tree_rename_link(sdir, sname, dname)
            } else {
                let s_stat = fs.get_stat(sino)?;
                fs.tree_detach(sdir, sino, sname)?;
                fs.tree_attach(ddir, sino, dname)?;
                if s_stat.is_dir() {
                    //The moved directory's ".." now counts against ddir.
                    fs.update_stat(sdir, StatFlags::DECR_LINK)?;
                    fs.update_stat(ddir, StatFlags::INCR_LINK)?;
                }
                Ok(())
            }
        })?;

        if overwrite_dst && !dst_is_dir && !flags.is_dst_open {
            debug!("removing detached file ({})", dino);
            self.destroy_orphaned(dino)?;
        }

        Ok(())
    }

    /// Load the stat record of `ino`.
    pub fn getattr(&self, cred: &Cred, ino: Ino) -> Result<Stat> {
        let fh = FileHandle::from_ino(self, ino)?;
        debug!("getattr ino={} uid={}", ino, cred.uid);
        Ok(*fh.stat())
    }

    /// Apply the attribute changes selected by `flags` from `setstat` to
    /// `ino`. Any metadata change bumps the ctime; an explicit `CTIME_SET`
    /// overrides it with the caller's value.
    pub fn setattr(
        &mut self,
        cred: &Cred,
        ino: Ino,
        setstat: &Stat,
        flags: StatFlags,
    ) -> Result<()> {
        if flags.is_empty() {
            /* Nothing to do */
            return Ok(());
        }

        let mut fh = FileHandle::from_ino(self, ino)?;
        access_check(cred, fh.stat(), Access::SETATTR)?;

        let stat = fh.stat_mut();
        stat.st_ctim = Timespec::now();

        if flags.contains(StatFlags::MODE_SET) {
            let ifmt = stat.st_mode & S_IFMT;
            stat.st_mode = (setstat.st_mode & !S_IFMT) | ifmt;
        }
        if flags.contains(StatFlags::UID_SET) {
            stat.st_uid = setstat.st_uid;
        }
        if flags.contains(StatFlags::GID_SET) {
            stat.st_gid = setstat.st_gid;
        }
        if flags.contains(StatFlags::SIZE_SET) {
            stat.st_size = setstat.st_size;
            stat.st_blocks = size_to_blocks(setstat.st_size);
        }
        if flags.contains(StatFlags::ATIME_SET) {
            stat.st_atim = setstat.st_atim;
        }
        if flags.contains(StatFlags::MTIME_SET) {
            stat.st_mtim = setstat.st_mtim;
        }
        if flags.contains(StatFlags::CTIME_SET) {
            stat.st_ctim = setstat.st_ctim;
        }

        fh.flush(self)?;
        debug!("setattr ino={} flags={:?}", ino, flags);
        Ok(())
    }

    /// Check `flags` access to `ino` for `cred`.
    pub fn access(&self, cred: &Cred, ino: Ino, flags: Access) -> Result<()> {
        let stat = self.getattr(cred, ino)?;
        access_check(cred, &stat, flags)
    }

    /// Iterate the entries of directory `dir`, calling back with each
    /// `(name, child_ino)` until the callback returns `false` or the
    /// directory is exhausted. Updates the directory's atime afterwards.
    pub fn readdir(
        &mut self,
        cred: &Cred,
        dir: Ino,
        cb: &mut dyn FnMut(&str, Ino) -> bool,
    ) -> Result<()> {
        self.access(cred, dir, Access::LIST_DIR)?;
        self.tree_iter_children(dir, cb)?;
        self.update_stat(dir, StatFlags::ATIME_SET)?;
        Ok(())
    }

    /// Read the target of the symlink `ino` into `buf`, returning its
    /// length. Fails `NoBuffer` when `buf` cannot hold the target. Updates
    /// the symlink's atime.
    pub fn readlink(&mut self, cred: &Cred, ino: Ino, buf: &mut [u8]) -> Result<usize> {
        trace!("readlink symlink_ino={} uid={}", ino, cred.uid);

        let mut fh = FileHandle::from_ino(self, ino)?;
        amend_stat(fh.stat_mut(), StatFlags::ATIME_SET)?;

        let target = self.get_symlink(ino)?;
        debug_assert!(target.len() <= PATH_MAX);
        if target.len() > buf.len() {
            return Err(FsError::NoBuffer);
        }
        buf[..target.len()].copy_from_slice(&target);

        fh.flush(self)?;
        debug!("got link: {} bytes", target.len());
        Ok(target.len())
    }
}

// Scenario tests for the namespace operations.
#[cfg(test)]
#[path = "../../api/fs-tests/ops_test.rs"]
mod tests;
