use kvsfs_api::error::FsError;
use kvsfs_api::types::{Stat, StatFlags, ROOT_INODE};

#[path = "utils.rs"]
mod utils;

#[test]
fn write_then_read_round_trip() {
    let path = utils::store_prep_path("fops-rw");
    let mut reg = utils::registry_setup(&path);
    reg.fs_create("fs1").unwrap();
    let fs = reg.lookup("fs1").unwrap();
    let cred = utils::root_cred();

    let f = fs.creat(&cred, ROOT_INODE, "f", 0o644).unwrap();

    let written = fs.write(&cred, f, b"hello, object store", 0).unwrap();
    assert_eq!(written, 19);
    let stat = fs.getattr(&cred, f).unwrap();
    assert_eq!(stat.st_size, 19);
    assert_eq!(stat.st_blocks, 1);

    let mut buf = [0u8; 19];
    let read = fs.read(&cred, f, &mut buf, 0).unwrap();
    assert_eq!(read, 19);
    assert_eq!(&buf, b"hello, object store");

    //Overwrite in place does not grow the file.
    fs.write(&cred, f, b"HELLO", 0).unwrap();
    assert_eq!(fs.getattr(&cred, f).unwrap().st_size, 19);
    let mut buf = [0u8; 5];
    fs.read(&cred, f, &mut buf, 0).unwrap();
    assert_eq!(&buf, b"HELLO");

    utils::store_unprep_path(&path);
}

#[test]
fn reads_clamp_to_eof() {
    let path = utils::store_prep_path("fops-eof");
    let mut reg = utils::registry_setup(&path);
    reg.fs_create("fs1").unwrap();
    let fs = reg.lookup("fs1").unwrap();
    let cred = utils::root_cred();

    let f = fs.creat(&cred, ROOT_INODE, "f", 0o644).unwrap();
    fs.write(&cred, f, b"0123456789", 0).unwrap();

    //At EOF and past EOF read nothing.
    let mut buf = [0u8; 4];
    assert_eq!(fs.read(&cred, f, &mut buf, 10).unwrap(), 0);
    assert_eq!(fs.read(&cred, f, &mut buf, 100).unwrap(), 0);

    //Spanning EOF reads the available prefix.
    let mut buf = [0u8; 8];
    assert_eq!(fs.read(&cred, f, &mut buf, 6).unwrap(), 4);
    assert_eq!(&buf[..4], b"6789");

    //Zero-length reads and writes are no-ops.
    assert_eq!(fs.read(&cred, f, &mut [], 0).unwrap(), 0);
    assert_eq!(fs.write(&cred, f, &[], 0).unwrap(), 0);
    assert_eq!(fs.getattr(&cred, f).unwrap().st_size, 10);

    utils::store_unprep_path(&path);
}

#[test]
fn writes_past_eof_extend_and_zero_the_hole() {
    let path = utils::store_prep_path("fops-hole");
    let mut reg = utils::registry_setup(&path);
    reg.fs_create("fs1").unwrap();
    let fs = reg.lookup("fs1").unwrap();
    let cred = utils::root_cred();

    let f = fs.creat(&cred, ROOT_INODE, "f", 0o644).unwrap();
    fs.write(&cred, f, b"head", 0).unwrap();
    fs.write(&cred, f, b"tail", 1000).unwrap();

    let stat = fs.getattr(&cred, f).unwrap();
    assert_eq!(stat.st_size, 1004);
    assert_eq!(stat.st_blocks, 2);

    let mut hole = [7u8; 16];
    fs.read(&cred, f, &mut hole, 500).unwrap();
    assert_eq!(hole, [0u8; 16]);

    let mut tail = [0u8; 4];
    fs.read(&cred, f, &mut tail, 1000).unwrap();
    assert_eq!(&tail, b"tail");

    utils::store_unprep_path(&path);
}

#[test]
fn truncate_shrinks_and_grows() {
    let path = utils::store_prep_path("fops-trunc");
    let mut reg = utils::registry_setup(&path);
    reg.fs_create("fs1").unwrap();
    let fs = reg.lookup("fs1").unwrap();
    let cred = utils::root_cred();

    let f = fs.creat(&cred, ROOT_INODE, "f", 0o644).unwrap();
    fs.write(&cred, f, &[5u8; 2000], 0).unwrap();

    //Truncate requires a size.
    assert!(matches!(
        fs.truncate(&cred, f, &Stat::default(), StatFlags::empty()),
        Err(FsError::Invalid(_))
    ));

    let mut new_stat = Stat::default();
    new_stat.st_size = 100;
    fs.truncate(&cred, f, &new_stat, StatFlags::SIZE_SET).unwrap();
    let stat = fs.getattr(&cred, f).unwrap();
    assert_eq!(stat.st_size, 100);
    assert_eq!(stat.st_blocks, 1);

    //Growing back zero-fills past the kept prefix.
    new_stat.st_size = 1000;
    fs.truncate(&cred, f, &new_stat, StatFlags::SIZE_SET).unwrap();
    assert_eq!(fs.getattr(&cred, f).unwrap().st_size, 1000);

    let mut kept = [0u8; 100];
    fs.read(&cred, f, &mut kept, 0).unwrap();
    assert_eq!(kept, [5u8; 100]);
    let mut fresh = [9u8; 100];
    fs.read(&cred, f, &mut fresh, 100).unwrap();
    assert_eq!(fresh, [0u8; 100]);

    utils::store_unprep_path(&path);
}

#[test]
fn io_respects_permissions() {
    let path = utils::store_prep_path("fops-perm");
    let mut reg = utils::registry_setup(&path);
    reg.fs_create("fs1").unwrap();
    let fs = reg.lookup("fs1").unwrap();
    let owner = utils::user_cred();
    let other = utils::other_cred();

    let f = fs.creat(&owner, ROOT_INODE, "f", 0o644).unwrap();
    fs.write(&owner, f, b"data", 0).unwrap();

    //World-readable, owner-writable.
    let mut buf = [0u8; 4];
    fs.read(&other, f, &mut buf, 0).unwrap();
    assert!(matches!(
        fs.write(&other, f, b"nope", 0),
        Err(FsError::PermissionDenied)
    ));

    utils::store_unprep_path(&path);
}
