use super::{FileHandle, FH_SERIALIZED_SIZE};
use kvsfs_api::error::FsError;
use kvsfs_api::types::{StatFlags, ROOT_INODE};

use crate::attrs::amend_stat;

#[path = "utils.rs"]
mod utils;

#[test]
fn handles_name_their_inode() {
    let path = utils::store_prep_path("fh-ino");
    let mut reg = utils::registry_setup(&path);
    reg.fs_create("fs1").unwrap();
    let fs = reg.lookup("fs1").unwrap();
    let cred = utils::root_cred();

    let ino = fs.creat(&cred, ROOT_INODE, "f", 0o644).unwrap();
    let fh = FileHandle::from_ino(fs, ino).unwrap();
    assert_eq!(fh.ino(), ino);
    assert_eq!(fh.stat().st_ino, ino);

    let root = FileHandle::getroot(fs, &cred).unwrap();
    assert_eq!(root.ino(), ROOT_INODE);

    assert!(FileHandle::from_ino(fs, 9999).is_err());

    utils::store_unprep_path(&path);
}

#[test]
fn lookup_resolves_dotdot_at_the_root() {
    let path = utils::store_prep_path("fh-dotdot");
    let mut reg = utils::registry_setup(&path);
    reg.fs_create("fs1").unwrap();
    let fs = reg.lookup("fs1").unwrap();
    let cred = utils::root_cred();

    let root = FileHandle::getroot(fs, &cred).unwrap();
    let up = FileHandle::lookup(fs, &cred, &root, "..").unwrap();
    assert_eq!(up.ino(), ROOT_INODE);

    let d = fs.mkdir(&cred, ROOT_INODE, "d", 0o755).unwrap();
    let child = FileHandle::lookup(fs, &cred, &root, "d").unwrap();
    assert_eq!(child.ino(), d);

    assert!(matches!(
        FileHandle::lookup(fs, &cred, &root, "missing"),
        Err(FsError::NotFound)
    ));

    utils::store_unprep_path(&path);
}

#[test]
fn wire_form_round_trips() {
    let path = utils::store_prep_path("fh-wire");
    let mut reg = utils::registry_setup(&path);
    reg.fs_create("fs1").unwrap();
    let fs = reg.lookup("fs1").unwrap();
    let cred = utils::root_cred();

    let ino = fs.creat(&cred, ROOT_INODE, "f", 0o644).unwrap();
    let fh = FileHandle::from_ino(fs, ino).unwrap();

    let mut buf = [0u8; FH_SERIALIZED_SIZE];
    let n = fh.serialize(&mut buf, fs.fs_id()).unwrap();
    assert_eq!(n, FH_SERIALIZED_SIZE);

    let back = FileHandle::deserialize(fs, &buf).unwrap();
    assert_eq!(back.ino(), ino);

    //Short buffers are refused on both sides.
    let mut short = [0u8; 8];
    assert!(matches!(
        fh.serialize(&mut short, fs.fs_id()),
        Err(FsError::NoBuffer)
    ));
    assert!(FileHandle::deserialize(fs, &short).is_err());

    //A handle minted under another filesystem does not resolve here.
    let mut foreign = [0u8; FH_SERIALIZED_SIZE];
    fh.serialize(&mut foreign, fs.fs_id() + 1).unwrap();
    assert!(matches!(
        FileHandle::deserialize(fs, &foreign),
        Err(FsError::Invalid(_))
    ));

    utils::store_unprep_path(&path);
}

#[test]
fn flush_persists_amended_stats_and_drop_discards() {
    let path = utils::store_prep_path("fh-flush");
    let mut reg = utils::registry_setup(&path);
    reg.fs_create("fs1").unwrap();
    let fs = reg.lookup("fs1").unwrap();
    let cred = utils::root_cred();

    let ino = fs.creat(&cred, ROOT_INODE, "f", 0o644).unwrap();

    //Dropping a handle discards in-memory amendments.
    {
        let mut fh = FileHandle::from_ino(fs, ino).unwrap();
        amend_stat(fh.stat_mut(), StatFlags::INCR_LINK).unwrap();
    }
    assert_eq!(fs.get_stat(ino).unwrap().st_nlink, 1);

    //Flushing writes them back; reloading sees the amended record.
    let mut fh = FileHandle::from_ino(fs, ino).unwrap();
    amend_stat(fh.stat_mut(), StatFlags::INCR_LINK).unwrap();
    fh.flush(fs).unwrap();
    assert_eq!(fs.get_stat(ino).unwrap().st_nlink, 2);
    assert_eq!(FileHandle::from_ino(fs, ino).unwrap().stat(), fh.stat());

    utils::store_unprep_path(&path);
}

#[test]
fn keys_distinguish_filesystems_and_inodes() {
    let path = utils::store_prep_path("fh-key");
    let mut reg = utils::registry_setup(&path);
    reg.fs_create("fs1").unwrap();
    reg.fs_create("fs2").unwrap();

    let (k1, k2, k1b) = {
        let fs1 = reg.lookup("fs1").unwrap();
        let cred = utils::root_cred();
        let a = fs1.creat(&cred, ROOT_INODE, "a", 0o644).unwrap();
        let fh_a = FileHandle::from_ino(fs1, a).unwrap();
        let fh_root = FileHandle::getroot(fs1, &cred).unwrap();
        (fh_a.key(fs1), fh_root.key(fs1), fh_a.key(fs1))
    };
    assert_eq!(k1, k1b);
    assert_ne!(k1, k2);

    let fs2 = reg.lookup("fs2").unwrap();
    let cred = utils::root_cred();
    let fh2 = FileHandle::getroot(fs2, &cred).unwrap();
    assert_ne!(k2, fh2.key(fs2)); //same ino, different filesystem

    utils::store_unprep_path(&path);
}
