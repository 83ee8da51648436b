//! KVSFS metadata core.
//!
//! This crate implements the metadata engine of a POSIX-style distributed
//! filesystem on top of the backend contracts defined in `kvsfs_api`: an
//! ordered, transactional key-value store holds the namespace (directory
//! entries, link-count backlinks, stat records, symlink targets, object-id
//! mappings), and an object store holds regular-file payloads.
//!
//! The modules layer bottom-up:
//!
//! 1. [`keys`] — the on-disk key encoding for every record class.
//! 2. [`fs`] — the per-filesystem context (open index + object store).
//! 3. [`attrs`] — typed inode attributes and stat amendment.
//! 4. [`tree`] — the directory graph: dentries and parent backlinks.
//! 5. [`access`] — the POSIX owner/group/other permission check.
//! 6. [`handle`] — file handles: cached inode views with a wire format.
//! 7. [`ops`] / [`fops`] — the POSIX operation layer.
//! 8. [`registry`] — named filesystems, endpoints, and their lifecycle.
//! 9. [`mgmt`] — error-response mapping for the management surface.

#![deny(missing_docs)]

pub mod access;
pub mod attrs;
pub mod fops;
pub mod fs;
pub mod handle;
pub mod keys;
pub mod mgmt;
pub mod ops;
pub mod registry;
pub mod tree;

pub use fs::Filesystem;
pub use handle::FileHandle;
pub use registry::Registry;
