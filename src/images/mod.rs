//! Image Reference Manager (C4, §4.4).
//!
//! Maintains an in-memory `ImageHash -> refcount` map guarded by a single
//! lock, plus a pending-delete list guarded by another, and the
//! content-addressed blob store on disk. Grounded on the teacher's
//! `buffer`/`memory` split: a fast in-memory structure backed by a
//! slower on-disk store, reconciled against it at startup.

pub mod thumbnail;

use crate::common::ImageHash;
use crate::error::Result;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Default batch size drained per [`ImageManager::gc`] call (§4.4).
pub const GC_BATCH_SIZE: usize = 50;

pub struct ImageManager {
    root: PathBuf,
    refcounts: DashMap<ImageHash, u64>,
    pending_delete: Mutex<VecDeque<ImageHash>>,
}

impl ImageManager {
    pub fn new(root: PathBuf) -> Self {
        ImageManager {
            root,
            refcounts: DashMap::new(),
            pending_delete: Mutex::new(VecDeque::new()),
        }
    }

    /// Startup reconciliation (§4.4): increments refcount once per
    /// reference yielded by `references`, then walks the on-disk blob
    /// tree and deletes any file whose hash is absent from the map.
    pub fn reconcile<I: IntoIterator<Item = ImageHash>>(&self, references: I) -> Result<()> {
        for hash in references {
            self.add_reference(hash);
        }
        if !self.root.exists() {
            return Ok(());
        }
        for top in read_dir_names(&self.root)? {
            let top_path = self.root.join(&top);
            if !top_path.is_dir() {
                continue;
            }
            for mid in read_dir_names(&top_path)? {
                let mid_path = top_path.join(&mid);
                if !mid_path.is_dir() {
                    continue;
                }
                for file in read_dir_names(&mid_path)? {
                    let file_path = mid_path.join(&file);
                    match ImageHash::from_hex_lower(&file) {
                        Some(hash) if self.refcounts.contains_key(&hash) => {}
                        _ => {
                            debug!(path = %file_path.display(), "removing orphan image blob at startup");
                            let _ = std::fs::remove_file(&file_path);
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Increments refcount; returns the new value.
    pub fn add_reference(&self, hash: ImageHash) -> u64 {
        let mut entry = self.refcounts.entry(hash).or_insert(0);
        *entry += 1;
        *entry
    }

    /// Atomically increments refcount; writes the blob only if this is
    /// the first reference (new count == 1). If the write fails, the
    /// increment is rolled back (§4.4).
    pub fn save(&self, hash: ImageHash, bytes: &[u8]) -> bool {
        let new_count = self.add_reference(hash);
        if new_count != 1 {
            return true;
        }
        match write_blob(&self.root, &hash, bytes) {
            Ok(()) => true,
            Err(e) => {
                warn!(hash = %hash.to_hex_lower(), error = %e, "failed to persist image blob");
                self.decrement_only(hash);
                false
            }
        }
    }

    fn decrement_only(&self, hash: ImageHash) {
        if let Some(mut entry) = self.refcounts.get_mut(&hash) {
            *entry = entry.saturating_sub(1);
            if *entry == 0 {
                drop(entry);
                self.refcounts.remove(&hash);
            }
        }
    }

    /// Decrements refcount; if it reaches zero, removes the mapping and
    /// enqueues the hash for deferred deletion by [`ImageManager::gc`]
    /// (the file is not deleted inline, §4.4).
    pub fn remove_reference(&self, hash: ImageHash) -> u64 {
        let new_count = match self.refcounts.get_mut(&hash) {
            Some(mut entry) => {
                *entry = entry.saturating_sub(1);
                *entry
            }
            None => 0,
        };
        if new_count == 0 {
            self.refcounts.remove(&hash);
            self.pending_delete.lock().push_back(hash);
        }
        new_count
    }

    /// Drains up to `batch` entries from the pending-delete list. Skips
    /// any hash whose refcount has become positive again; errors deleting
    /// a file are logged and the entry discarded regardless (§4.4). Returns
    /// the hashes actually deleted, so a caller can also release any
    /// external pin (e.g. on CAN) tied to the same content hash.
    pub fn gc(&self, batch: usize) -> Vec<ImageHash> {
        let mut drained = Vec::with_capacity(batch);
        {
            let mut queue = self.pending_delete.lock();
            for _ in 0..batch {
                match queue.pop_front() {
                    Some(hash) => drained.push(hash),
                    None => break,
                }
            }
        }
        let mut deleted = Vec::with_capacity(drained.len());
        for hash in drained {
            if self.refcounts.contains_key(&hash) {
                continue;
            }
            let path = blob_path(&self.root, &hash);
            match std::fs::remove_file(&path) {
                Ok(()) => deleted.push(hash),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => deleted.push(hash),
                Err(e) => warn!(path = %path.display(), error = %e, "failed to delete unreferenced image blob"),
            }
        }
        deleted
    }

    /// Reads a blob's full bytes back off disk by its content hash.
    pub fn load(&self, hash: ImageHash) -> Result<Vec<u8>> {
        Ok(std::fs::read(blob_path(&self.root, &hash))?)
    }

    pub fn refcount(&self, hash: ImageHash) -> u64 {
        self.refcounts.get(&hash).map(|v| *v).unwrap_or(0)
    }

    pub fn pending_delete_len(&self) -> usize {
        self.pending_delete.lock().len()
    }
}

fn write_blob(root: &Path, hash: &ImageHash, bytes: &[u8]) -> Result<()> {
    let path = blob_path(root, hash);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, bytes)?;
    Ok(())
}

fn blob_path(root: &Path, hash: &ImageHash) -> PathBuf {
    let hex_lower = hash.to_hex_lower();
    let hex_upper = hash.to_hex_upper();
    root.join(&hex_upper[0..2]).join(&hex_upper[2..4]).join(hex_lower)
}

fn read_dir_names(dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if let Some(name) = entry.file_name().to_str() {
            names.push(name.to_string());
        }
    }
    Ok(names)
}

impl ImageHash {
    pub fn from_hex_lower(s: &str) -> Option<Self> {
        if s.len() != 64 {
            return None;
        }
        let bytes = hex::decode(s).ok()?;
        let mut out = [0u8; 32];
        out.copy_from_slice(&bytes);
        Some(ImageHash(out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_hash(byte: u8) -> ImageHash {
        ImageHash([byte; 32])
    }

    #[test]
    fn save_twice_increments_and_writes_once() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = ImageManager::new(dir.path().to_path_buf());
        let hash = sample_hash(7);
        assert!(mgr.save(hash, b"hello"));
        assert!(mgr.save(hash, b"hello"));
        assert_eq!(mgr.refcount(hash), 2);
        let path = blob_path(dir.path(), &hash);
        assert_eq!(std::fs::read(path).unwrap(), b"hello");
    }

    #[test]
    fn remove_twice_enqueues_for_gc_and_deletes() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = ImageManager::new(dir.path().to_path_buf());
        let hash = sample_hash(9);
        mgr.save(hash, b"data");
        mgr.save(hash, b"data");
        assert_eq!(mgr.remove_reference(hash), 1);
        assert_eq!(mgr.remove_reference(hash), 0);
        assert_eq!(mgr.pending_delete_len(), 1);
        let path = blob_path(dir.path(), &hash);
        assert!(path.exists());
        let deleted = mgr.gc(GC_BATCH_SIZE);
        assert_eq!(deleted, vec![hash]);
        assert!(!path.exists());
    }

    #[test]
    fn re_add_before_gc_keeps_file_alive() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = ImageManager::new(dir.path().to_path_buf());
        let hash = sample_hash(3);
        mgr.save(hash, b"data");
        mgr.remove_reference(hash);
        mgr.add_reference(hash);
        let deleted = mgr.gc(GC_BATCH_SIZE);
        assert!(deleted.is_empty());
        let path = blob_path(dir.path(), &hash);
        assert!(path.exists());
    }
}
