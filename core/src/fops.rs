//! File I/O operations: read, write, truncate.
//!
//! These ops bridge the two backends: the stat record in the KVS carries the
//! logical size, and the object store carries the bytes. Reads are clamped
//! to the logical size; writes extend it; truncate resizes both the record
//! and the object.

use log::trace;

use kvsfs_api::error::{FsError, Result};
use kvsfs_api::types::{Access, Cred, Ino, Stat, StatFlags};

use crate::access::access_check;
use crate::attrs::{amend_stat, size_to_blocks};
use crate::fs::Filesystem;
use crate::handle::FileHandle;

impl Filesystem {
    /// Read up to `buf.len()` bytes from `ino` at byte `offset`, returning
    /// the number of bytes read. Reads at or past the end of the file read
    /// nothing; reads spanning the end are clamped. A successful read
    /// updates the file's atime.
    pub fn read(&mut self, cred: &Cred, ino: Ino, buf: &mut [u8], offset: u64) -> Result<usize> {
        let mut fh = FileHandle::from_ino(self, ino)?;
        let oid = self.ino_to_oid(ino)?;

        access_check(cred, fh.stat(), Access::READ)?;

        /* Nothing to read when the file is empty, the offset is at or past
         * the written data, or the buffer is empty; a read spanning the end
         * returns the available prefix. */
        let size = fh.stat().st_size;
        if size == 0 || size <= offset || buf.is_empty() {
            return Ok(0);
        }
        let to_read = if size < offset + buf.len() as u64 {
            (size - offset) as usize
        } else {
            buf.len()
        };

        {
            let obj = self.dstore().obj_open(&oid)?;
            obj.pread(offset, &mut buf[..to_read])?;
        }

        amend_stat(fh.stat_mut(), StatFlags::ATIME_SET)?;
        fh.flush(self)?;

        trace!("ino={} count={} offset={} read={}", ino, buf.len(), offset, to_read);
        Ok(to_read)
    }

    /// Write `data` to `ino` at byte `offset`, returning the number of
    /// bytes written. Writing past the end extends the file; the hole reads
    /// back as zeroes. Updates mtime/ctime and, when the file grew, the
    /// size and block count.
    pub fn write(&mut self, cred: &Cred, ino: Ino, data: &[u8], offset: u64) -> Result<usize> {
        if data.is_empty() {
            return Ok(0);
        }

        let mut fh = FileHandle::from_ino(self, ino)?;
        let oid = self.ino_to_oid(ino)?;

        access_check(cred, fh.stat(), Access::WRITE)?;

        {
            let mut obj = self.dstore().obj_open(&oid)?;
            obj.pwrite(offset, data)?;
        }

        amend_stat(fh.stat_mut(), StatFlags::MTIME_SET | StatFlags::CTIME_SET)?;

        let end = offset + data.len() as u64;
        if end > fh.stat().st_size {
            let stat = fh.stat_mut();
            stat.st_size = end;
            stat.st_blocks = size_to_blocks(end);
        }

        fh.flush(self)?;

        trace!("ino={} count={} offset={}", ino, data.len(), offset);
        Ok(data.len())
    }

    /// Change the size of `ino` to `new_stat.st_size` (which must be
    /// selected by `SIZE_SET` in `flags`), resizing the backing object.
    /// Unless the caller sets the mtime explicitly, mtime and ctime are
    /// bumped together with the size change.
    pub fn truncate(
        &mut self,
        cred: &Cred,
        ino: Ino,
        new_stat: &Stat,
        flags: StatFlags,
    ) -> Result<()> {
        if !flags.contains(StatFlags::SIZE_SET) {
            return Err(FsError::Invalid("truncate requires a size"));
        }

        let fh = FileHandle::from_ino(self, ino)?;
        let old_size = fh.stat().st_size;
        let new_size = new_stat.st_size;

        let mut setstat = *new_stat;
        let mut setflags = flags;
        setstat.st_blocks = size_to_blocks(new_size);

        /* If the caller wants the mtime set explicitly, mtime and ctime may
         * differ; otherwise keep them synchronous with each other. */
        if !flags.contains(StatFlags::MTIME_SET) {
            amend_stat(
                &mut setstat,
                StatFlags::MTIME_SET | StatFlags::CTIME_SET,
            )?;
            setflags |= StatFlags::MTIME_SET | StatFlags::CTIME_SET;
        }

        self.setattr(cred, ino, &setstat, setflags)?;

        let oid = self.ino_to_oid(ino)?;
        let mut obj = self.dstore().obj_open(&oid)?;
        obj.resize(old_size, new_size)?;

        trace!("ino={} old_size={} new_size={}", ino, old_size, new_size);
        Ok(())
    }
}

// Scenario tests for file I/O.
#[cfg(test)]
#[path = "../../api/fs-tests/fops_test.rs"]
mod tests;
