//! File-backed implementation of the object-store contract.
//!
//! Every object is a single file under the store's root directory, named by
//! the hex form of its oid, and memory-mapped while open. Object files are
//! kept at a whole number of blocks: writes and resizes extend or truncate
//! the file with `set_len` (which zero-fills new bytes) and then remap it.
//! When a handle is dropped, the mapping is flushed, so a reopened object
//! sees everything that was written.
//!
//! Oids are allocated from a per-store counter combined with a seed taken
//! from the clock at store construction, which keeps ids from colliding
//! across store instances without coordination.

use memmap::MmapMut;
use std::fs::{remove_file, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::dstore::{round_up, ObjectHandle, ObjectStore, DEFAULT_BLOCK_SIZE};
use crate::error::{FsError, Result};
use crate::types::Oid;

/// Object store keeping one mmap'd file per object under a root directory.
#[derive(Debug)]
pub struct FileStore {
    root: PathBuf,
    seed: u64,
    next: AtomicU64,
    block_size: u64,
}

impl FileStore {
    /// Open (creating if necessary) a store rooted at `root`, with the
    /// default block size.
    pub fn new<P: AsRef<Path>>(root: P) -> Result<FileStore> {
        FileStore::with_block_size(root, DEFAULT_BLOCK_SIZE)
    }

    /// Open a store with an explicit block size. The block size must be
    /// nonzero; objects are sized in multiples of it.
    pub fn with_block_size<P: AsRef<Path>>(root: P, block_size: u64) -> Result<FileStore> {
        if block_size == 0 {
            return Err(FsError::Invalid("zero block size"));
        }
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        let seed = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("system clock before the epoch")
            .as_nanos() as u64;
        Ok(FileStore {
            root,
            seed,
            next: AtomicU64::new(1),
            block_size,
        })
    }

    /// Directory this store keeps its object files in.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn obj_path(&self, oid: &Oid) -> PathBuf {
        self.root.join(format!("{:016x}{:016x}", oid.hi, oid.lo))
    }
}

impl ObjectStore for FileStore {
    fn new_objid(&self) -> Result<Oid> {
        Ok(Oid {
            hi: self.seed,
            lo: self.next.fetch_add(1, Ordering::Relaxed),
        })
    }

    fn obj_create(&self, oid: &Oid) -> Result<()> {
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(self.obj_path(oid))
        {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Err(FsError::AlreadyExists),
            Err(e) => Err(e.into()),
        }
    }

    fn obj_delete(&self, oid: &Oid) -> Result<()> {
        match remove_file(self.obj_path(oid)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(FsError::NotFound),
            Err(e) => Err(e.into()),
        }
    }

    fn obj_open(&self, oid: &Oid) -> Result<Box<dyn ObjectHandle>> {
        let file = match OpenOptions::new()
            .read(true)
            .write(true)
            .open(self.obj_path(oid))
        {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(FsError::NotFound),
            Err(e) => return Err(e.into()),
        };
        let len = file.metadata()?.len();
        let map = map_file(&file, len)?;
        Ok(Box::new(FileObject {
            file,
            map,
            len,
            block_size: self.block_size,
        }))
    }
}

/// Map `file` if it is non-empty; a zero-length file cannot be mapped.
fn map_file(file: &File, len: u64) -> Result<Option<MmapMut>> {
    if len == 0 {
        return Ok(None);
    }
    let map = unsafe { memmap::MmapOptions::new().map_mut(file)? };
    Ok(Some(map))
}

/// Open handle on one object file.
pub struct FileObject {
    file: File,
    map: Option<MmapMut>,
    len: u64,
    block_size: u64,
}

impl FileObject {
    /// Unmap, resize the backing file to `target` bytes, and remap. `set_len`
    /// zero-fills on extension, which is what gives holes their zeroes.
    fn set_physical_len(&mut self, target: u64) -> Result<()> {
        if let Some(map) = self.map.take() {
            map.flush()?;
        }
        self.file.set_len(target)?;
        self.map = map_file(&self.file, target)?;
        self.len = target;
        Ok(())
    }
}

impl Drop for FileObject {
    fn drop(&mut self) {
        if let Some(map) = &self.map {
            let _ = map.flush();
        }
    }
}

impl ObjectHandle for FileObject {
    fn block_size(&self) -> u64 {
        self.block_size
    }

    fn pread(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        if buf.is_empty() {
            return Ok(());
        }
        let end = offset + buf.len() as u64;
        if end > self.len {
            return Err(FsError::Invalid("read past the end of the object"));
        }
        let map = self
            .map
            .as_ref()
            .ok_or(FsError::Invalid("read from an empty object"))?;
        buf.copy_from_slice(&map[offset as usize..end as usize]);
        Ok(())
    }

    fn pwrite(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }
        let end = offset + data.len() as u64;
        if end > self.len {
            self.set_physical_len(round_up(end, self.block_size))?;
        }
        let map = self
            .map
            .as_mut()
            .ok_or(FsError::Invalid("write into an unmapped object"))?;
        map[offset as usize..end as usize].copy_from_slice(data);
        Ok(())
    }

    fn resize(&mut self, _old_size: u64, new_size: u64) -> Result<()> {
        self.set_physical_len(round_up(new_size, self.block_size))
    }
}
