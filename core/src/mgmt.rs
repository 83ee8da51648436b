//! Error-response mapping for the management surface.
//!
//! The management REST layer reports failures as stable numeric response
//! ids with human-readable messages. This module owns the id space, the
//! message table, and the per-operation mapping from [`FsError`] values to
//! response ids.

use kvsfs_api::error::FsError;

/// Stable response ids surfaced by the management API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum RespId {
    /// Filesystem-create: the name is not valid.
    InvalidFsname = 1,
    /// Filesystem-create: the name already exists.
    FsExist = 2,
    /// Filesystem-delete: no such filesystem.
    FsNonexist = 3,
    /// Filesystem-delete: the filesystem is being exported.
    FsExportExist = 4,
    /// Filesystem-delete: the filesystem is not empty.
    FsNotEmpty = 5,
    /// An ETag was passed for a resource that is not modifiable.
    InvalidEtag = 6,
    /// The payload hash did not match what was received.
    BadDigest = 7,
    /// The object ETag was not sent.
    MissingEtag = 8,
    /// The payload data is invalid.
    InvalidPayload = 9,
    /// The API path parameters are invalid.
    InvalidPathParams = 10,
    /// Fallback for everything else.
    Default = 11,
}

/// Human-readable message for a response id.
pub fn resp_message(id: RespId) -> &'static str {
    match id {
        RespId::InvalidFsname => "The filesystem name specified is not valid.",
        RespId::FsExist => "The filesystem name you tried to create already exists.",
        RespId::FsNonexist => "The specified filesystem does not exist.",
        RespId::FsExportExist => "The filesystem you tried to delete is being exported.",
        RespId::FsNotEmpty => "The filesystem you tried to delete is not empty.",
        RespId::InvalidEtag => {
            "The ETag should not be passed for a resource which is not modifiable."
        }
        RespId::BadDigest => "The HASH specified did not match what we received.",
        RespId::MissingEtag => "The Object ETag is not sent.",
        RespId::InvalidPayload => "Invalid payload data passed.",
        RespId::InvalidPathParams => "Invalid parameters passed with the API path.",
        RespId::Default => "Generic error message. Check the server logs for more information.",
    }
}

/// Map a filesystem-create failure to its response id.
pub fn fs_create_resp(err: &FsError) -> RespId {
    match err {
        FsError::Invalid(_) => RespId::InvalidFsname,
        FsError::AlreadyExists => RespId::FsExist,
        _ => RespId::Default,
    }
}

/// Map a filesystem-delete failure to its response id.
pub fn fs_delete_resp(err: &FsError) -> RespId {
    match err {
        FsError::NotFound => RespId::FsNonexist,
        //The delete path reports an exported filesystem as invalid-argument.
        FsError::Invalid(_) => RespId::FsExportExist,
        FsError::NotEmpty => RespId::FsNotEmpty,
        _ => RespId::Default,
    }
}
