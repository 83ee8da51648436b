#![allow(dead_code)]

//Shared fixture helpers for the scenario tests: each test builds a fresh
//registry over an in-memory KVS and a file-backed object store kept in its
//own uniquely named directory, so parallel tests never collide.

use std::fs::remove_dir_all;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use kvsfs_api::dstore::ObjectStore;
use kvsfs_api::filestore::FileStore;
use kvsfs_api::kvstore::KvsBackend;
use kvsfs_api::memkv::MemKvs;
use kvsfs_api::types::Cred;

use crate::registry::{NullEndpointOps, Registry};

//Create the object directory for a test, wiping leftovers of a failed
//previous run first. Returns the path for the cleanup call at the end.
pub fn store_prep_path(name: &str) -> PathBuf {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("fs-objects-".to_string() + name);
    if path.exists() {
        remove_dir_all(&path).unwrap();
    }
    path
}

//Remove the object directory and everything in it.
pub fn store_unprep_path(path: &Path) {
    remove_dir_all(path).unwrap();
}

//A fresh registry over a fresh in-memory KVS and the object store at `path`.
pub fn registry_setup(path: &Path) -> Registry {
    let kvs: Arc<dyn KvsBackend> = Arc::new(MemKvs::new());
    let dstore: Arc<dyn ObjectStore> = Arc::new(FileStore::new(path).unwrap());
    Registry::init(kvs, dstore, Box::new(NullEndpointOps)).unwrap()
}

//A registry sharing previously used backends, for reload scenarios.
pub fn registry_reopen(kvs: Arc<dyn KvsBackend>, dstore: Arc<dyn ObjectStore>) -> Registry {
    Registry::init(kvs, dstore, Box::new(NullEndpointOps)).unwrap()
}

pub fn root_cred() -> Cred {
    Cred::root()
}

pub fn user_cred() -> Cred {
    Cred { uid: 1000, gid: 1000 }
}

pub fn other_cred() -> Cred {
    Cred { uid: 2000, gid: 2000 }
}
