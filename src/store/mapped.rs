/// File-backed store using mmap.
///
/// The whole store is one mapping; block transfers are slice copies into or
/// out of it. Anonymous stores live in an unlinked temp file that disappears
/// with the mapping. Named stores keep their file, which is how a Targa image
/// ends up on disk.
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use memmap2::MmapMut;

use super::{BackingStore, StoreKind};
use crate::error::StoreError;

pub struct MappedStore {
    mmap: MmapMut,
    path: Option<PathBuf>,
    block_len: usize,
    block_count: u64,
}

impl MappedStore {
    /// Create an anonymous store in `dir` (or the system temp dir).
    pub fn create_temp(
        dir: Option<&Path>,
        block_len: usize,
        block_count: u64,
    ) -> io::Result<Self> {
        let file = match dir {
            Some(dir) => tempfile::tempfile_in(dir)?,
            None => tempfile::tempfile()?,
        };
        Self::map_new(file, None, block_len, block_count)
    }

    /// Create or truncate a store at `path`.
    pub fn create_at(path: &Path, block_len: usize, block_count: u64) -> io::Result<Self> {
        let file = fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        Self::map_new(file, Some(path.to_path_buf()), block_len, block_count)
    }

    /// Open an existing store file. Its length must be a whole number of blocks.
    pub fn open(path: &Path, block_len: usize) -> io::Result<Self> {
        if block_len == 0 {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "zero block length"));
        }
        let file = fs::OpenOptions::new().read(true).write(true).open(path)?;
        let len = file.metadata()?.len();
        if len == 0 || len % block_len as u64 != 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("store file of {len} bytes is not a whole number of {block_len}-byte blocks"),
            ));
        }
        // Safety: the file is opened read-write by us; callers must not resize it
        // while the mapping is alive.
        let mmap = unsafe { MmapMut::map_mut(&file)? };
        Ok(MappedStore {
            mmap,
            path: Some(path.to_path_buf()),
            block_len,
            block_count: len / block_len as u64,
        })
    }

    fn map_new(
        file: fs::File,
        path: Option<PathBuf>,
        block_len: usize,
        block_count: u64,
    ) -> io::Result<Self> {
        let total = block_count
            .checked_mul(block_len as u64)
            .filter(|&n| n > 0)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "empty or oversized store"))?;
        file.set_len(total)?;

        // Safety: we just created (or truncated) this file and own it exclusively.
        let mmap = unsafe { MmapMut::map_mut(&file)? };

        Ok(MappedStore {
            mmap,
            path,
            block_len,
            block_count,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn range(&self, index: u64) -> std::ops::Range<usize> {
        let start = index as usize * self.block_len;
        start..start + self.block_len
    }
}

impl BackingStore for MappedStore {
    fn block_len(&self) -> usize {
        self.block_len
    }

    fn block_count(&self) -> u64 {
        self.block_count
    }

    fn kind(&self) -> StoreKind {
        StoreKind::Disk
    }

    fn read_block(&self, index: u64, buf: &mut [u8]) -> Result<(), StoreError> {
        self.check_access(index, buf.len())?;
        buf.copy_from_slice(&self.mmap[self.range(index)]);
        Ok(())
    }

    fn write_block(&mut self, index: u64, buf: &[u8]) -> Result<(), StoreError> {
        self.check_access(index, buf.len())?;
        let range = self.range(index);
        self.mmap[range].copy_from_slice(buf);
        Ok(())
    }

    fn fill_block(&mut self, index: u64, value: u8) -> Result<(), StoreError> {
        self.check_access(index, self.block_len)?;
        let range = self.range(index);
        self.mmap[range].fill(value);
        Ok(())
    }

    fn flush(&mut self) -> Result<(), StoreError> {
        self.mmap.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temp_store_starts_zeroed() {
        let store = MappedStore::create_temp(None, 32, 3).unwrap();
        let mut buf = [0xaau8; 32];
        store.read_block(2, &mut buf).unwrap();
        assert_eq!(buf, [0; 32]);
        assert!(store.path().is_none());
    }

    #[test]
    fn named_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pixels.bin");

        let mut store = MappedStore::create_at(&path, 16, 2).unwrap();
        store.write_block(1, &[0x42; 16]).unwrap();
        store.flush().unwrap();
        drop(store);

        let reopened = MappedStore::open(&path, 16).unwrap();
        assert_eq!(reopened.block_count(), 2);
        let mut buf = [0u8; 16];
        reopened.read_block(1, &mut buf).unwrap();
        assert_eq!(buf, [0x42; 16]);
        assert_eq!(fs::metadata(&path).unwrap().len(), 32);
    }

    #[test]
    fn open_rejects_zero_block_length() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pixels.bin");
        fs::write(&path, [0u8; 32]).unwrap();
        let err = MappedStore::open(&path, 0).err().unwrap();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn open_rejects_partial_blocks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("odd.bin");
        fs::write(&path, [0u8; 20]).unwrap();
        let err = MappedStore::open(&path, 16).err().unwrap();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
