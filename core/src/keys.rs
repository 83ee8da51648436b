//! On-disk key encoding for every record class.
//!
//! Each key starts with a small typed prefix: inode-scoped records lead with
//! the inode number (big-endian, so related keys sort together), followed by
//! a key-type byte and a version byte; registry records lead with the
//! key-type and version bytes directly, followed by their payload.
//!
//! The encoding guarantees that all dentries of a given parent share the
//! fixed 10-byte prefix `[parent_ino][DIRENT][VERSION_0]` and that no other
//! record class produces a key under that prefix, so an ordered prefix
//! iteration yields exactly that directory's children.
//!
//! The type byte values and `VERSION_0` are wire-visible persisted constants
//! and must never change.

use kvsfs_api::error::{FsError, Result};
use kvsfs_api::types::{FsId, Ino, NAME_MAX};

/// Layout version byte carried in every key.
pub const VERSION_0: u8 = 0;

/// Size of the fixed prefix of inode-scoped keys: inode, type, version.
pub const ATTR_KEY_SIZE: usize = 10;

/// Size of a parent-backlink key: dentry-style prefix plus the parent inode.
pub const PARENT_KEY_SIZE: usize = 18;

/// Record-class discriminator stored in every key.
///
/// The numeric values are persisted; new classes get new values, existing
/// values are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum KeyType {
    /// Directory entry: `(parent_ino, name) -> child_ino`.
    Dirent = 1,
    /// Parent backlink: `(child_ino, parent_ino) -> link count`.
    Parent = 2,
    /// Stat record of an inode.
    Stat = 3,
    /// Symbolic-link target of an inode.
    Symlink = 4,
    /// Inode-to-object-id mapping.
    InodeOid = 5,
    /// Per-filesystem inode counter, stored under the root inode.
    InoCounter = 6,
    /// Registry: filesystem record keyed by name.
    FsName = 16,
    /// Registry: filesystem name keyed by id.
    FsId = 17,
    /// Registry: next filesystem id counter.
    FsIdNext = 18,
    /// Registry: tenant (export endpoint) record keyed by name.
    Tenant = 19,
}

/// Key of an inode attribute record (stat, symlink, oid mapping, counter).
pub fn inode_attr_key(ino: Ino, ktype: KeyType) -> [u8; ATTR_KEY_SIZE] {
    let mut key = [0u8; ATTR_KEY_SIZE];
    key[..8].copy_from_slice(&ino.to_be_bytes());
    key[8] = ktype as u8;
    key[9] = VERSION_0;
    key
}

/// Fixed prefix shared by all dentries of `parent`.
pub fn dentry_prefix(parent: Ino) -> [u8; ATTR_KEY_SIZE] {
    inode_attr_key(parent, KeyType::Dirent)
}

/// Full dentry key: prefix, length-prefixed name, NUL terminator.
///
/// The caller has validated the name; encoding only bounds it so a corrupted
/// length can never be written.
pub fn dentry_key(parent: Ino, name: &str) -> Vec<u8> {
    debug_assert!(!name.is_empty() && name.len() <= NAME_MAX);
    let mut key = Vec::with_capacity(ATTR_KEY_SIZE + 1 + name.len() + 1);
    key.extend_from_slice(&dentry_prefix(parent));
    key.push(name.len() as u8);
    key.extend_from_slice(name.as_bytes());
    key.push(0);
    key
}

/// Recover the entry name from a full dentry key, validating the layout.
pub fn dentry_name_from_key(key: &[u8]) -> Result<&str> {
    if key.len() <= ATTR_KEY_SIZE + 2 {
        return Err(FsError::Corrupt("dentry key too short"));
    }
    let len = key[ATTR_KEY_SIZE] as usize;
    if len == 0 || key.len() != ATTR_KEY_SIZE + 1 + len + 1 {
        return Err(FsError::Corrupt("dentry key length mismatch"));
    }
    if key[key.len() - 1] != 0 {
        return Err(FsError::Corrupt("dentry key missing terminator"));
    }
    std::str::from_utf8(&key[ATTR_KEY_SIZE + 1..ATTR_KEY_SIZE + 1 + len])
        .map_err(|_| FsError::Corrupt("dentry name is not valid UTF-8"))
}

/// Key of the backlink counting dentries from `parent` to `child`.
pub fn parent_key(child: Ino, parent: Ino) -> [u8; PARENT_KEY_SIZE] {
    let mut key = [0u8; PARENT_KEY_SIZE];
    key[..ATTR_KEY_SIZE].copy_from_slice(&inode_attr_key(child, KeyType::Parent));
    key[ATTR_KEY_SIZE..].copy_from_slice(&parent.to_be_bytes());
    key
}

fn registry_prefix(ktype: KeyType) -> [u8; 2] {
    [ktype as u8, VERSION_0]
}

/// Key of the filesystem record for `name` in the registry index.
pub fn fs_name_key(name: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(2 + name.len());
    key.extend_from_slice(&registry_prefix(KeyType::FsName));
    key.extend_from_slice(name.as_bytes());
    key
}

/// Prefix covering all filesystem records, for registry scans.
pub fn fs_name_prefix() -> [u8; 2] {
    registry_prefix(KeyType::FsName)
}

/// Key of the id-to-name record for filesystem `fs_id`.
pub fn fs_id_key(fs_id: FsId) -> [u8; 10] {
    let mut key = [0u8; 10];
    key[..2].copy_from_slice(&registry_prefix(KeyType::FsId));
    key[2..].copy_from_slice(&fs_id.to_be_bytes());
    key
}

/// Key of the registry-wide next-filesystem-id counter.
pub fn fs_id_next_key() -> [u8; 2] {
    registry_prefix(KeyType::FsIdNext)
}

/// Key of the tenant record for export endpoint `name`.
pub fn tenant_key(name: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(2 + name.len());
    key.extend_from_slice(&registry_prefix(KeyType::Tenant));
    key.extend_from_slice(name.as_bytes());
    key
}

/// Prefix covering all tenant records, for registry scans.
pub fn tenant_prefix() -> [u8; 2] {
    registry_prefix(KeyType::Tenant)
}

#[cfg(test)]
mod tests {
    use super::*;

    //The byte values below are persisted; these tests pin them.
    #[test]
    fn key_bytes_are_stable() {
        let key = inode_attr_key(2, KeyType::Stat);
        assert_eq!(key, [0, 0, 0, 0, 0, 0, 0, 2, 3, 0]);

        let key = dentry_key(2, "a");
        assert_eq!(key, vec![0, 0, 0, 0, 0, 0, 0, 2, 1, 0, 1, b'a', 0]);

        let key = parent_key(3, 2);
        assert_eq!(
            key,
            [0, 0, 0, 0, 0, 0, 0, 3, 2, 0, 0, 0, 0, 0, 0, 0, 0, 2]
        );

        assert_eq!(fs_id_key(1), [17, 0, 0, 0, 0, 0, 0, 0, 0, 1]);
        assert_eq!(fs_id_next_key(), [18, 0]);
    }

    #[test]
    fn dentries_share_a_prefix_no_other_class_does() {
        let prefix = dentry_prefix(7);
        assert!(dentry_key(7, "x").starts_with(&prefix));
        assert!(dentry_key(7, &"n".repeat(255)).starts_with(&prefix));

        //Sibling record classes of the same inode fall outside the prefix.
        assert!(!inode_attr_key(7, KeyType::Stat).starts_with(&prefix));
        assert!(!inode_attr_key(7, KeyType::Symlink).starts_with(&prefix));
        assert!(!inode_attr_key(7, KeyType::InodeOid).starts_with(&prefix));
        assert!(!parent_key(7, 2).starts_with(&prefix));

        //Dentries of another parent do too.
        assert!(!dentry_key(8, "x").starts_with(&prefix));
    }

    //The backlink key shares the first 8 bytes with the child's dentry
    //prefix but differs in the type byte, so prefix iteration cannot leak
    //backlinks into a readdir.
    #[test]
    fn backlinks_do_not_collide_with_dentries() {
        let prefix = dentry_prefix(7);
        for parent in [0u64, 2, 7, u64::MAX] {
            assert!(!parent_key(7, parent).starts_with(&prefix));
        }
    }

    #[test]
    fn dentry_name_round_trip() {
        let long = "9".repeat(255);
        for name in ["a", "test_file", long.as_str()] {
            let key = dentry_key(5, name);
            assert_eq!(dentry_name_from_key(&key).unwrap(), name);
        }
    }

    #[test]
    fn malformed_dentry_keys_are_corruption() {
        assert!(dentry_name_from_key(&dentry_prefix(5)).is_err());
        let mut key = dentry_key(5, "ok");
        key[ATTR_KEY_SIZE] = 200; //length byte lies
        assert!(dentry_name_from_key(&key).is_err());
        let mut key = dentry_key(5, "ok");
        let last = key.len() - 1;
        key[last] = b'!'; //terminator gone
        assert!(dentry_name_from_key(&key).is_err());
    }
}
