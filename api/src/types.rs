//! Module containing the types shared by the backend contracts and the
//! metadata core: identifiers, the stat record, credentials, and the flag
//! sets used to amend stats and to express access requests.
//!
//! Records that live in the KVS ([`Stat`], [`Fid`]) derive `Serialize` and
//! `Deserialize` and are written with `bincode`, so their serialized sizes
//! are fixed and can be checked against the runtime constants below when a
//! record is read back.

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};

/// Inode number. 64-bit, allocated monotonically per filesystem.
pub type Ino = u64;

/// Filesystem id. 64-bit, allocated from a registry-wide counter.
pub type FsId = u64;

/// Inode number of the root inode of every filesystem.
pub const ROOT_INODE: Ino = 2;

/// Upper bound on `st_nlink`; attaching a dentry to an inode already at this
/// count fails with an invalid-argument error.
pub const MAX_LINK: u32 = u32::MAX;

/// Maximum length of a single directory-entry name, in bytes.
pub const NAME_MAX: usize = 255;

/// Maximum length of a symbolic-link target, in bytes.
pub const PATH_MAX: usize = 4096;

/// Uid with unconditional access.
pub const ROOT_UID: u32 = 0;

/// A 128-bit opaque identifier.
///
/// Used both to address a KVS index (`index_fid`) and to name an object in
/// the data store ([`Oid`]).
#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fid {
    /// High 64 bits.
    pub hi: u64,
    /// Low 64 bits.
    pub lo: u64,
}

impl Fid {
    /// Build a fid from its two halves.
    pub fn new(hi: u64, lo: u64) -> Fid {
        Fid { hi, lo }
    }
}

/// Object id in the data store, one-to-one with a regular file or directory.
pub type Oid = Fid;

/// Nanosecond-resolution timestamp, seconds + nanoseconds since the epoch.
#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Timespec {
    /// Whole seconds.
    pub tv_sec: i64,
    /// Nanoseconds within the second.
    pub tv_nsec: i64,
}

impl Timespec {
    /// Current wall time. Sub-second precision is microseconds, converted to
    /// nanoseconds, matching what the stored timestamps have always carried.
    pub fn now() -> Timespec {
        let d = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("system clock before the epoch");
        Timespec {
            tv_sec: d.as_secs() as i64,
            tv_nsec: i64::from(d.subsec_micros()) * 1000,
        }
    }
}

/// File-type mask of `st_mode`.
pub const S_IFMT: u32 = 0o170000;
/// Directory file type.
pub const S_IFDIR: u32 = 0o040000;
/// Regular-file file type.
pub const S_IFREG: u32 = 0o100000;
/// Symbolic-link file type.
pub const S_IFLNK: u32 = 0o120000;

/// Fixed-size POSIX stat record, stored per inode in the KVS.
#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Stat {
    /// Inode number; matches the key the record is stored under.
    pub st_ino: Ino,
    /// File type and permission bits.
    pub st_mode: u32,
    /// Number of dentries referencing this inode (plus the implicit `..`
    /// hardlink for directories).
    pub st_nlink: u32,
    /// Owner uid.
    pub st_uid: u32,
    /// Owner gid.
    pub st_gid: u32,
    /// Logical size in bytes.
    pub st_size: u64,
    /// Preferred I/O block size of the backing object.
    pub st_blksize: u64,
    /// Number of 512-byte blocks, `ceil(st_size / 512)`.
    pub st_blocks: u64,
    /// Last access time.
    pub st_atim: Timespec,
    /// Last modification time.
    pub st_mtim: Timespec,
    /// Last status-change time.
    pub st_ctim: Timespec,
}

impl Stat {
    /// True iff the record describes a directory.
    pub fn is_dir(&self) -> bool {
        self.st_mode & S_IFMT == S_IFDIR
    }

    /// True iff the record describes a regular file.
    pub fn is_reg(&self) -> bool {
        self.st_mode & S_IFMT == S_IFREG
    }

    /// True iff the record describes a symbolic link.
    pub fn is_lnk(&self) -> bool {
        self.st_mode & S_IFMT == S_IFLNK
    }
}

lazy_static! {
    /// Serialized size of a stat record, in bytes. All fields are fixed-size,
    /// so every stored stat record has exactly this length; a mismatch on
    /// read indicates a corrupted store.
    pub static ref STAT_SIZE: u64 =
        bincode::serialize(&Stat::default()).unwrap().len() as u64;

    /// Serialized size of a [`Fid`], in bytes.
    pub static ref FID_SIZE: u64 =
        bincode::serialize(&Fid::default()).unwrap().len() as u64;
}

/// Enum describing the creatable file types.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Copy, Clone)]
pub enum FileType {
    /// Regular file.
    File,
    /// Directory.
    Dir,
    /// Symbolic link.
    Symlink,
}

/// Caller credentials used by the access check.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Cred {
    /// Effective uid.
    pub uid: u32,
    /// Effective gid.
    pub gid: u32,
}

impl Cred {
    /// Credentials of the superuser.
    pub fn root() -> Cred {
        Cred { uid: ROOT_UID, gid: 0 }
    }
}

bitflags::bitflags! {
    /// Disjunctive set of stat amendments applied by `amend_stat` and the
    /// setattr path.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct StatFlags: u32 {
        /// Set `st_atim` (to "now" in amend, to the caller value in setattr).
        const ATIME_SET = 1 << 0;
        /// Set `st_mtim`.
        const MTIME_SET = 1 << 1;
        /// Set `st_ctim`.
        const CTIME_SET = 1 << 2;
        /// Increment `st_nlink`, failing at [`MAX_LINK`].
        const INCR_LINK = 1 << 3;
        /// Decrement `st_nlink`, failing at zero.
        const DECR_LINK = 1 << 4;
        /// `st_size` was set by the caller; recompute `st_blocks`.
        const SIZE_SET = 1 << 5;
        /// Replace the permission bits, preserving the file type.
        const MODE_SET = 1 << 6;
        /// Replace `st_uid`.
        const UID_SET = 1 << 7;
        /// Replace `st_gid`.
        const GID_SET = 1 << 8;
    }
}

bitflags::bitflags! {
    /// Desired-access bitmap checked against a stat record.
    ///
    /// The directory-oriented requests are aliases for the mode bits they
    /// boil down to: listing needs read, creating or deleting entries needs
    /// write on the directory.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Access: u32 {
        /// Read the file or list the directory.
        const READ = 1 << 0;
        /// Modify the file or the directory's entries.
        const WRITE = 1 << 1;
        /// Execute the file or traverse the directory.
        const EXEC = 1 << 2;
        /// Change attributes; owners always may.
        const SETATTR = 1 << 3;
        /// Alias of `READ` for directory listing.
        const LIST_DIR = Self::READ.bits();
        /// Alias of `WRITE` for entry creation.
        const CREATE_ENTITY = Self::WRITE.bits();
        /// Alias of `WRITE` for entry removal.
        const DELETE_ENTITY = Self::WRITE.bits();
    }
}
