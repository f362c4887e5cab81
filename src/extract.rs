//! Lazy extraction of archive entries that must exist as real files.
//!
//! The OS dynamic-library loader cannot open an in-memory buffer, so the
//! entries it needs are decompressed once per process into a private
//! temporary directory. Concurrent requests for the same unmaterialized
//! entry are single-flighted: one caller extracts, the rest block on that
//! entry's slot and then receive the same path. The map lock is only ever
//! held to fetch or drop a slot, never across the extraction itself, so
//! unrelated entries extract in parallel.

use crate::errors::Error;
use crate::path;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

#[derive(Debug)]
pub(crate) struct ExtractionCache {
    root: Mutex<Option<TempDir>>,
    slots: Mutex<HashMap<String, Arc<Slot>>>,
}

#[derive(Default, Debug)]
struct Slot {
    state: Mutex<Option<Materialized>>,
}

#[derive(Debug)]
struct Materialized {
    path: PathBuf,
    crc: u32,
}

impl ExtractionCache {
    pub(crate) fn new() -> ExtractionCache {
        ExtractionCache {
            root: Mutex::new(None),
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the real path of the extracted copy of `logical`, producing
    /// it on first use via `produce` (which yields the verified,
    /// decompressed bytes).
    ///
    /// Self-healing: a cached copy that has gone missing or no longer
    /// matches `crc` is re-extracted instead of failing the lookup. A failed
    /// extraction forgets the slot entirely so a later call can retry.
    pub(crate) fn materialize(
        &self,
        logical: &str,
        crc: u32,
        produce: impl FnOnce() -> Result<Vec<u8>, Error>,
    ) -> Result<PathBuf, Error> {
        let slot = {
            let mut slots = self.slots.lock();
            Arc::clone(slots.entry(logical.to_string()).or_default())
        };

        let mut state = slot.state.lock();
        if let Some(done) = state.as_ref() {
            if file_matches(&done.path, done.crc) {
                return Ok(done.path.clone());
            }
            log::warn!(
                "extracted copy of {:?} is missing or altered, re-extracting",
                logical
            );
        }

        match self.extract(logical, crc, produce) {
            Ok(target) => {
                *state = Some(Materialized {
                    path: target.clone(),
                    crc,
                });
                Ok(target)
            }
            Err(e) => {
                *state = None;
                drop(state);
                self.slots.lock().remove(logical);
                Err(e)
            }
        }
    }

    fn extract(
        &self,
        logical: &str,
        crc: u32,
        produce: impl FnOnce() -> Result<Vec<u8>, Error>,
    ) -> Result<PathBuf, Error> {
        let data = produce()?;
        let root = self.ensure_root()?;
        // Deterministic name: the same entry always lands on the same path,
        // and distinct contents cannot collide under one name.
        let target = root.join(format!("{:08x}-{}", crc, path::file_name(logical)));
        std::fs::write(&target, &data).map_err(Error::io)?;
        log::debug!("materialized {:?} as {:?}", logical, target);
        Ok(target)
    }

    fn ensure_root(&self) -> Result<PathBuf, Error> {
        let mut root = self.root.lock();
        if let Some(dir) = root.as_ref() {
            return Ok(dir.path().to_path_buf());
        }
        let created = tempfile::Builder::new()
            .prefix("packfs-")
            .tempdir()
            .map_err(Error::io)?;
        let created_path = created.path().to_path_buf();
        *root = Some(created);
        Ok(created_path)
    }
}

impl Drop for ExtractionCache {
    fn drop(&mut self) {
        // Only fully materialized files live under the root; an in-flight
        // extraction at process exit is abandoned, not awaited.
        if let Some(dir) = self.root.get_mut().take() {
            let dir_path = dir.path().to_path_buf();
            if let Err(e) = dir.close() {
                log::warn!(
                    "failed to clean up extraction directory {:?}: {}",
                    dir_path,
                    e
                );
            }
        }
    }
}

fn file_matches(file: &Path, crc: u32) -> bool {
    match std::fs::read(file) {
        Ok(data) => crc32fast::hash(&data) == crc,
        Err(_) => false,
    }
}
