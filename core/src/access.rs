//! POSIX owner/group/other permission check.

use kvsfs_api::error::{FsError, Result};
use kvsfs_api::types::{Access, Cred, Stat, ROOT_UID};

//Permission bits per class.
const OWNER_READ: u32 = 0o400;
const OWNER_WRITE: u32 = 0o200;
const OWNER_EXEC: u32 = 0o100;
const GROUP_READ: u32 = 0o040;
const GROUP_WRITE: u32 = 0o020;
const GROUP_EXEC: u32 = 0o010;
const OTHER_READ: u32 = 0o004;
const OTHER_WRITE: u32 = 0o002;
const OTHER_EXEC: u32 = 0o001;

/// Check `flags` access to the file described by `stat` for `cred`.
///
/// Root always passes. An owner setting attributes always passes. Otherwise
/// the owner, group, or other class is selected, the requested accesses are
/// translated into that class's mode bits, and every required bit must be
/// set in `st_mode`.
pub fn access_check(cred: &Cred, stat: &Stat, flags: Access) -> Result<()> {
    let mut check: u32 = 0;

    /* Root's superpowers */
    if cred.uid == ROOT_UID {
        return Ok(());
    }

    if cred.uid == stat.st_uid {
        /* skip access check of owner for set attribute */
        if flags.contains(Access::SETATTR) {
            return Ok(());
        }
        if flags.contains(Access::READ) {
            check |= OWNER_READ;
        }
        if flags.contains(Access::WRITE) {
            check |= OWNER_WRITE;
        }
        if flags.contains(Access::EXEC) {
            check |= OWNER_EXEC;
        }
    } else if cred.gid == stat.st_gid {
        if flags.contains(Access::READ) {
            check |= GROUP_READ;
        }
        if flags.contains(Access::WRITE) {
            check |= GROUP_WRITE;
        }
        if flags.contains(Access::EXEC) {
            check |= GROUP_EXEC;
        }
    } else {
        if flags.contains(Access::READ) {
            check |= OTHER_READ;
        }
        if flags.contains(Access::WRITE) {
            check |= OTHER_WRITE;
        }
        if flags.contains(Access::EXEC) {
            check |= OTHER_EXEC;
        }
    }

    if (check & stat.st_mode) != check {
        Err(FsError::PermissionDenied)
    } else {
        Ok(())
    }
}
