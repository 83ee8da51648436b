use super::RenameFlags;
use crate::handle::FileHandle;
use kvsfs_api::error::FsError;
use kvsfs_api::types::{Access, Stat, StatFlags, ROOT_INODE};

#[path = "utils.rs"]
mod utils;

#[test]
fn create_lookup_unlink() {
    let path = utils::store_prep_path("ops-create");
    let mut reg = utils::registry_setup(&path);
    reg.fs_create("fs1").unwrap();
    let fs = reg.lookup("fs1").unwrap();
    let cred = utils::root_cred();

    assert!(matches!(
        fs.lookup(&cred, ROOT_INODE, "test_file"),
        Err(FsError::NotFound)
    ));

    let ino = fs.creat(&cred, ROOT_INODE, "test_file", 0o755).unwrap();
    assert!(ino > ROOT_INODE);
    assert_eq!(fs.lookup(&cred, ROOT_INODE, "test_file").unwrap(), ino);

    fs.unlink(&cred, ROOT_INODE, None, "test_file").unwrap();
    assert!(matches!(
        fs.lookup(&cred, ROOT_INODE, "test_file"),
        Err(FsError::NotFound)
    ));
    //No residual records for the destroyed inode.
    assert!(fs.get_stat(ino).is_err());
    assert!(fs.ino_to_oid(ino).is_err());

    utils::store_unprep_path(&path);
}

#[test]
fn name_length_boundaries() {
    let path = utils::store_prep_path("ops-names");
    let mut reg = utils::registry_setup(&path);
    reg.fs_create("fs1").unwrap();
    let fs = reg.lookup("fs1").unwrap();
    let cred = utils::root_cred();

    let long = "9".repeat(255);
    let ino = fs.creat(&cred, ROOT_INODE, &long, 0o755).unwrap();
    assert_eq!(fs.lookup(&cred, ROOT_INODE, &long).unwrap(), ino);

    let too_long = "9".repeat(256);
    assert!(matches!(
        fs.creat(&cred, ROOT_INODE, &too_long, 0o755),
        Err(FsError::NameTooLong)
    ));

    assert!(matches!(
        fs.creat(&cred, ROOT_INODE, "", 0o755),
        Err(FsError::Invalid(_))
    ));
    for reserved in [".", "..", "/"] {
        assert!(matches!(
            fs.creat(&cred, ROOT_INODE, reserved, 0o755),
            Err(FsError::AlreadyExists)
        ));
    }

    utils::store_unprep_path(&path);
}

#[test]
fn create_is_not_idempotent() {
    let path = utils::store_prep_path("ops-exist");
    let mut reg = utils::registry_setup(&path);
    reg.fs_create("fs1").unwrap();
    let fs = reg.lookup("fs1").unwrap();
    let cred = utils::root_cred();

    let ino = fs.creat(&cred, ROOT_INODE, "f", 0o755).unwrap();
    assert!(matches!(
        fs.creat(&cred, ROOT_INODE, "f", 0o755),
        Err(FsError::AlreadyExists)
    ));
    //The first inode is untouched by the failed second create.
    let stat = fs.getattr(&cred, ino).unwrap();
    assert_eq!(stat.st_ino, ino);
    assert_eq!(stat.st_nlink, 1);

    utils::store_unprep_path(&path);
}

#[test]
fn hard_links() {
    let path = utils::store_prep_path("ops-link");
    let mut reg = utils::registry_setup(&path);
    reg.fs_create("fs1").unwrap();
    let fs = reg.lookup("fs1").unwrap();
    let cred = utils::root_cred();

    let a = fs.creat(&cred, ROOT_INODE, "a", 0o644).unwrap();
    fs.link(&cred, a, ROOT_INODE, "b").unwrap();
    assert_eq!(fs.getattr(&cred, a).unwrap().st_nlink, 2);
    assert_eq!(fs.lookup(&cred, ROOT_INODE, "b").unwrap(), a);

    //Linking over an existing name is refused.
    assert!(matches!(
        fs.link(&cred, a, ROOT_INODE, "b"),
        Err(FsError::AlreadyExists)
    ));

    //Dropping one link keeps the file and its object alive.
    fs.unlink(&cred, ROOT_INODE, None, "a").unwrap();
    assert_eq!(fs.getattr(&cred, a).unwrap().st_nlink, 1);
    assert!(fs.ino_to_oid(a).is_ok());

    //Dropping the last link destroys it.
    fs.unlink(&cred, ROOT_INODE, None, "b").unwrap();
    assert!(fs.get_stat(a).is_err());
    assert!(fs.ino_to_oid(a).is_err());

    utils::store_unprep_path(&path);
}

#[test]
fn rmdir_requires_empty() {
    let path = utils::store_prep_path("ops-rmdir");
    let mut reg = utils::registry_setup(&path);
    reg.fs_create("fs1").unwrap();
    let fs = reg.lookup("fs1").unwrap();
    let cred = utils::root_cred();

    assert_eq!(fs.getattr(&cred, ROOT_INODE).unwrap().st_nlink, 2);

    let d = fs.mkdir(&cred, ROOT_INODE, "d", 0o755).unwrap();
    assert_eq!(fs.getattr(&cred, d).unwrap().st_nlink, 2);
    //The new subdirectory's ".." counts against the root.
    assert_eq!(fs.getattr(&cred, ROOT_INODE).unwrap().st_nlink, 3);

    fs.creat(&cred, d, "x", 0o644).unwrap();
    assert!(matches!(
        fs.rmdir(&cred, ROOT_INODE, "d"),
        Err(FsError::NotEmpty)
    ));

    fs.unlink(&cred, d, None, "x").unwrap();
    fs.rmdir(&cred, ROOT_INODE, "d").unwrap();
    assert_eq!(fs.getattr(&cred, ROOT_INODE).unwrap().st_nlink, 2);
    assert!(fs.get_stat(d).is_err());

    utils::store_unprep_path(&path);
}

#[test]
fn rename_with_overwrite_destroys_the_loser() {
    let path = utils::store_prep_path("ops-rename-ow");
    let mut reg = utils::registry_setup(&path);
    reg.fs_create("fs1").unwrap();
    let fs = reg.lookup("fs1").unwrap();
    let cred = utils::root_cred();

    let a = fs.creat(&cred, ROOT_INODE, "a", 0o644).unwrap();
    let b = fs.creat(&cred, ROOT_INODE, "b", 0o644).unwrap();

    fs.rename(&cred, ROOT_INODE, "a", ROOT_INODE, "b", &RenameFlags::default())
        .unwrap();

    assert!(matches!(
        fs.lookup(&cred, ROOT_INODE, "a"),
        Err(FsError::NotFound)
    ));
    assert_eq!(fs.lookup(&cred, ROOT_INODE, "b").unwrap(), a);
    //The overwritten file is fully destroyed.
    assert!(fs.get_stat(b).is_err());
    assert!(fs.ino_to_oid(b).is_err());

    utils::store_unprep_path(&path);
}

#[test]
fn rename_inplace_and_across_directories() {
    let path = utils::store_prep_path("ops-rename");
    let mut reg = utils::registry_setup(&path);
    reg.fs_create("fs1").unwrap();
    let fs = reg.lookup("fs1").unwrap();
    let cred = utils::root_cred();

    //In-place: just the dentry changes.
    let f = fs.creat(&cred, ROOT_INODE, "old", 0o644).unwrap();
    fs.rename(&cred, ROOT_INODE, "old", ROOT_INODE, "new", &RenameFlags::default())
        .unwrap();
    assert_eq!(fs.lookup(&cred, ROOT_INODE, "new").unwrap(), f);

    //Moving a directory adjusts both parents' link counts.
    let d1 = fs.mkdir(&cred, ROOT_INODE, "d1", 0o755).unwrap();
    let d2 = fs.mkdir(&cred, ROOT_INODE, "d2", 0o755).unwrap();
    let sub = fs.mkdir(&cred, d1, "sub", 0o755).unwrap();
    assert_eq!(fs.getattr(&cred, d1).unwrap().st_nlink, 3);

    fs.rename(&cred, d1, "sub", d2, "sub2", &RenameFlags::default())
        .unwrap();
    assert_eq!(fs.lookup(&cred, d2, "sub2").unwrap(), sub);
    assert_eq!(fs.getattr(&cred, d1).unwrap().st_nlink, 2);
    assert_eq!(fs.getattr(&cred, d2).unwrap().st_nlink, 3);

    //Type mismatch between source and destination is refused.
    assert!(matches!(
        fs.rename(&cred, ROOT_INODE, "new", d2, "sub2", &RenameFlags::default()),
        Err(FsError::NotDir)
    ));

    //Overwriting a non-empty directory is refused.
    fs.creat(&cred, sub, "occupant", 0o644).unwrap();
    let _empty = fs.mkdir(&cred, ROOT_INODE, "empty", 0o755).unwrap();
    assert!(matches!(
        fs.rename(&cred, ROOT_INODE, "empty", d2, "sub2", &RenameFlags::default()),
        Err(FsError::AlreadyExists)
    ));

    utils::store_unprep_path(&path);
}

#[test]
fn rename_defers_destruction_for_open_destinations() {
    let path = utils::store_prep_path("ops-rename-open");
    let mut reg = utils::registry_setup(&path);
    reg.fs_create("fs1").unwrap();
    let fs = reg.lookup("fs1").unwrap();
    let cred = utils::root_cred();

    let _a = fs.creat(&cred, ROOT_INODE, "a", 0o644).unwrap();
    let b = fs.creat(&cred, ROOT_INODE, "b", 0o644).unwrap();

    let flags = RenameFlags { is_dst_open: true };
    fs.rename(&cred, ROOT_INODE, "a", ROOT_INODE, "b", &flags)
        .unwrap();

    //The loser lingers as an orphan until its close.
    assert_eq!(fs.get_stat(b).unwrap().st_nlink, 0);
    fs.destroy_orphaned(b).unwrap();
    assert!(fs.get_stat(b).is_err());

    utils::store_unprep_path(&path);
}

#[test]
fn symlinks_round_trip() {
    let path = utils::store_prep_path("ops-symlink");
    let mut reg = utils::registry_setup(&path);
    reg.fs_create("fs1").unwrap();
    let fs = reg.lookup("fs1").unwrap();
    let cred = utils::root_cred();

    let lnk = fs.symlink(&cred, ROOT_INODE, "l", "target/else/where").unwrap();
    let stat = fs.getattr(&cred, lnk).unwrap();
    assert!(stat.is_lnk());
    assert_eq!(stat.st_mode & 0o777, 0o777);
    assert_eq!(stat.st_nlink, 1);
    //Symlinks own no object mapping.
    assert!(fs.ino_to_oid(lnk).is_err());

    let mut buf = [0u8; 64];
    let n = fs.readlink(&cred, lnk, &mut buf).unwrap();
    assert_eq!(&buf[..n], b"target/else/where");

    let mut small = [0u8; 4];
    assert!(matches!(
        fs.readlink(&cred, lnk, &mut small),
        Err(FsError::NoBuffer)
    ));

    //Unlinking a symlink removes its target record too.
    fs.unlink(&cred, ROOT_INODE, None, "l").unwrap();
    assert!(fs.get_symlink(lnk).is_err());

    utils::store_unprep_path(&path);
}

#[test]
fn readdir_lists_children_in_order() {
    let path = utils::store_prep_path("ops-readdir");
    let mut reg = utils::registry_setup(&path);
    reg.fs_create("fs1").unwrap();
    let fs = reg.lookup("fs1").unwrap();
    let cred = utils::root_cred();

    let d = fs.mkdir(&cred, ROOT_INODE, "dir", 0o755).unwrap();
    let f = fs.creat(&cred, ROOT_INODE, "file", 0o644).unwrap();

    let mut seen = Vec::new();
    fs.readdir(&cred, ROOT_INODE, &mut |name, ino| {
        seen.push((name.to_string(), ino));
        true
    })
    .unwrap();
    assert_eq!(seen, vec![("dir".to_string(), d), ("file".to_string(), f)]);

    //The callback can stop iteration early.
    let mut count = 0;
    fs.readdir(&cred, ROOT_INODE, &mut |_, _| {
        count += 1;
        false
    })
    .unwrap();
    assert_eq!(count, 1);

    //An empty directory lists nothing, successfully.
    let mut empty = 0;
    fs.readdir(&cred, d, &mut |_, _| {
        empty += 1;
        true
    })
    .unwrap();
    assert_eq!(empty, 0);

    utils::store_unprep_path(&path);
}

#[test]
fn access_checks_gate_the_ops() {
    let path = utils::store_prep_path("ops-access");
    let mut reg = utils::registry_setup(&path);
    reg.fs_create("fs1").unwrap();
    let fs = reg.lookup("fs1").unwrap();
    let owner = utils::user_cred();
    let other = utils::other_cred();

    let f = fs.creat(&owner, ROOT_INODE, "private", 0o600).unwrap();
    let stat = fs.getattr(&owner, f).unwrap();
    assert_eq!(stat.st_uid, owner.uid);

    fs.access(&owner, f, Access::READ | Access::WRITE).unwrap();
    assert!(matches!(
        fs.access(&other, f, Access::READ),
        Err(FsError::PermissionDenied)
    ));

    //A private directory refuses lookups by others.
    let d = fs.mkdir(&owner, ROOT_INODE, "locked", 0o700).unwrap();
    fs.creat(&owner, d, "inside", 0o644).unwrap();
    assert!(matches!(
        fs.lookup(&other, d, "inside"),
        Err(FsError::PermissionDenied)
    ));
    fs.lookup(&owner, d, "inside").unwrap();

    utils::store_unprep_path(&path);
}

#[test]
fn setattr_preserves_the_file_type() {
    let path = utils::store_prep_path("ops-setattr");
    let mut reg = utils::registry_setup(&path);
    reg.fs_create("fs1").unwrap();
    let fs = reg.lookup("fs1").unwrap();
    let cred = utils::root_cred();

    let f = fs.creat(&cred, ROOT_INODE, "f", 0o644).unwrap();
    let before = fs.getattr(&cred, f).unwrap();

    let mut setstat = Stat::default();
    setstat.st_mode = 0o400; //no file-type bits from the caller survive
    setstat.st_uid = 42;
    fs.setattr(&cred, f, &setstat, StatFlags::MODE_SET | StatFlags::UID_SET)
        .unwrap();

    let after = fs.getattr(&cred, f).unwrap();
    assert!(after.is_reg());
    assert_eq!(after.st_mode & 0o777, 0o400);
    assert_eq!(after.st_uid, 42);
    assert_eq!(after.st_size, before.st_size);

    utils::store_unprep_path(&path);
}

#[test]
fn creat_ex_applies_initial_attributes() {
    let path = utils::store_prep_path("ops-creat-ex");
    let mut reg = utils::registry_setup(&path);
    reg.fs_create("fs1").unwrap();
    let fs = reg.lookup("fs1").unwrap();
    let cred = utils::root_cred();

    let mut setstat = Stat::default();
    setstat.st_uid = 7;
    setstat.st_gid = 8;
    let (ino, stat) = fs
        .creat_ex(
            &cred,
            ROOT_INODE,
            "f",
            0o644,
            &setstat,
            StatFlags::UID_SET | StatFlags::GID_SET,
        )
        .unwrap();

    assert_eq!(stat.st_uid, 7);
    assert_eq!(stat.st_gid, 8);
    assert_eq!(fs.lookup(&cred, ROOT_INODE, "f").unwrap(), ino);
    assert_eq!(fs.getattr(&cred, ino).unwrap().st_uid, 7);

    utils::store_unprep_path(&path);
}

#[test]
fn detach_leaves_an_orphan_for_close_time_destruction() {
    let path = utils::store_prep_path("ops-detach");
    let mut reg = utils::registry_setup(&path);
    reg.fs_create("fs1").unwrap();
    let fs = reg.lookup("fs1").unwrap();
    let cred = utils::root_cred();

    let f = fs.creat(&cred, ROOT_INODE, "f", 0o644).unwrap();
    fs.detach(&cred, ROOT_INODE, f, "f").unwrap();

    //Detached but not destroyed: the records linger at nlink 0.
    assert_eq!(fs.get_stat(f).unwrap().st_nlink, 0);
    assert!(fs.ino_to_oid(f).is_ok());
    assert!(matches!(
        fs.lookup(&cred, ROOT_INODE, "f"),
        Err(FsError::NotFound)
    ));

    //Destroying an inode that still has links is a no-op.
    let kept = fs.creat(&cred, ROOT_INODE, "kept", 0o644).unwrap();
    fs.destroy_orphaned(kept).unwrap();
    assert!(fs.get_stat(kept).is_ok());

    //The orphan goes for real.
    fs.destroy_orphaned(f).unwrap();
    assert!(fs.get_stat(f).is_err());
    assert!(fs.ino_to_oid(f).is_err());

    //A loaded handle still names the detached inode it was built from.
    let fh = FileHandle::from_ino(fs, kept).unwrap();
    assert_eq!(fh.ino(), kept);

    utils::store_unprep_path(&path);
}
