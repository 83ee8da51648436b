//! The error taxonomy shared by the backend contracts and the metadata core.
//!
//! Every fallible operation in this workspace returns [`Result`], so a single
//! enum covers the whole stack: conditions detected by the core (name
//! validation, link-count bounds, permission checks) and conditions propagated
//! from the backends (missing keys, I/O failures, codec failures).
//!
//! The variants deliberately line up with the POSIX errno values the protocol
//! front-ends need; [`FsError::errno`] performs that mapping for layers (such
//! as a management REST service) that speak numeric codes.

use std::io;
use thiserror::Error;

/// Error type used across the KVS/DSTORE contracts and the metadata core.
///
/// The `#[error]` tags provide the `Display` implementation; the `#[from]`
/// tags let backend failures bubble up through `?` without manual mapping.
#[derive(Error, Debug)]
pub enum FsError {
    /// A key or object is absent (ENOENT). Propagated from the KVS on missing
    /// records; converted by the directory layer where a more specific
    /// interpretation exists.
    #[error("entry not found")]
    NotFound,
    /// A record that must be absent is present (EEXIST): dentry on create or
    /// link, destination on rename, filesystem name on create.
    #[error("entry already exists")]
    AlreadyExists,
    /// Invalid argument (EINVAL): bad name, bad flag combination, link-count
    /// overflow or underflow, and similar caller mistakes.
    #[error("invalid argument: {0}")]
    Invalid(&'static str),
    /// A name exceeded the 255-byte limit (E2BIG).
    #[error("name too long")]
    NameTooLong,
    /// The access check rejected the credentials (EPERM).
    #[error("permission denied")]
    PermissionDenied,
    /// A directory that must be empty has children (ENOTEMPTY).
    #[error("directory not empty")]
    NotEmpty,
    /// Source and destination types are incompatible on rename (ENOTDIR).
    #[error("not a directory")]
    NotDir,
    /// A caller-supplied buffer is too small (ENOBUFS).
    #[error("buffer too small")]
    NoBuffer,
    /// The backend is out of space (ENOSPC).
    #[error("no space left on backend")]
    NoSpace,
    /// An I/O failure inside a storage backend (EIO).
    #[error("I/O failure in the storage backend")]
    Io(#[from] io::Error),
    /// A record failed to (de)serialize. A decode failure on a record we wrote
    /// ourselves indicates a corrupted store.
    #[error("record serialization failure")]
    Codec(#[from] bincode::Error),
    /// An invariant violation detected in stored data: wrong value size,
    /// malformed key, unsupported object type on orphan destruction. Never
    /// silently ignored.
    #[error("metadata store is corrupted: {0}")]
    Corrupt(&'static str),
    /// Catch-all wrapper for failures outside the taxonomy. Backend plug-ins
    /// may surface arbitrary errors through it; the core never matches on it
    /// beyond treating it as an I/O-class failure.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl FsError {
    /// POSIX errno value for this error, for surfacing through numeric APIs.
    pub fn errno(&self) -> i32 {
        match self {
            FsError::NotFound => 2,            // ENOENT
            FsError::AlreadyExists => 17,      // EEXIST
            FsError::Invalid(_) => 22,         // EINVAL
            FsError::NameTooLong => 7,         // E2BIG
            FsError::PermissionDenied => 1,    // EPERM
            FsError::NotEmpty => 39,           // ENOTEMPTY
            FsError::NotDir => 20,             // ENOTDIR
            FsError::NoBuffer => 105,          // ENOBUFS
            FsError::NoSpace => 28,            // ENOSPC
            FsError::Io(_) => 5,               // EIO
            FsError::Codec(_) => 5,            // EIO
            FsError::Corrupt(_) => 5,          // EIO
            FsError::Other(_) => 5,            // EIO
        }
    }

    /// True iff this error is `NotFound`. The tree layer swallows `NotFound`
    /// in exactly two sanctioned places (initial backlink read on attach and
    /// prefix-iteration exhaustion); this helper keeps those sites terse.
    pub fn is_not_found(&self) -> bool {
        matches!(self, FsError::NotFound)
    }
}

/// Generic alias for a `Result` with the error type `FsError`.
pub type Result<T> = std::result::Result<T, FsError>;
