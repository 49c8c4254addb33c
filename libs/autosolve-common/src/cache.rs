use crate::fingerprint::Fingerprint;
use crate::types::{SolvedChallenge, TestCase};
use chrono::Utc;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Solution cache - one JSON document per fingerprint
///
/// Records are written once, atomically, and never modified afterwards.
/// Reads favour availability: a record that cannot be read or parsed is
/// reported as a miss so the challenge simply gets solved again.

pub const RECORD_EXTENSION: &str = "json";

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("failed to prepare cache directory {path}: {source}")]
    Directory {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to serialize solved challenge: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("failed to write cache record {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Debug, Clone)]
pub struct SolutionCache {
    dir: PathBuf,
}

impl SolutionCache {
    /// Open (and create if needed) the cache directory
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| CacheError::Directory {
            path: dir.clone(),
            source,
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Deterministic record path for a fingerprint
    pub fn record_path(&self, fingerprint: &Fingerprint) -> PathBuf {
        self.dir
            .join(format!("{}.{}", fingerprint, RECORD_EXTENSION))
    }

    /// Look up a previously verified solution
    pub fn get(&self, fingerprint: &Fingerprint) -> Option<SolvedChallenge> {
        let path = self.record_path(fingerprint);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(fingerprint = %fingerprint, error = %e, "Unreadable cache record; treating as miss");
                return None;
            }
        };

        match serde_json::from_str::<SolvedChallenge>(&content) {
            Ok(record) if record.fingerprint == *fingerprint => {
                debug!(fingerprint = %fingerprint, "Cache hit");
                Some(record)
            }
            Ok(record) => {
                warn!(fingerprint = %fingerprint, stored = %record.fingerprint, "Cache record does not match its file name; treating as miss");
                None
            }
            Err(e) => {
                warn!(fingerprint = %fingerprint, error = %e, "Corrupted cache record; treating as miss");
                None
            }
        }
    }

    /// Persist the first verified solution for a fingerprint
    ///
    /// The record is staged in a temp file in the cache directory and renamed
    /// into place without clobbering. If another writer got there first, its
    /// record is kept and returned.
    pub fn put(
        &self,
        fingerprint: &Fingerprint,
        challenge_description: &str,
        test_cases: &[TestCase],
        final_code: &str,
        attempts_taken: u32,
    ) -> Result<SolvedChallenge, CacheError> {
        let record = SolvedChallenge {
            fingerprint: fingerprint.clone(),
            challenge_description: challenge_description.to_string(),
            test_cases: test_cases.to_vec(),
            final_code: final_code.to_string(),
            attempts_taken,
            solved_timestamp: Utc::now(),
        };
        let payload = serde_json::to_string_pretty(&record)?;
        let path = self.record_path(fingerprint);

        let write_err = |source| CacheError::Write {
            path: path.clone(),
            source,
        };

        let mut staged = tempfile::Builder::new()
            .prefix(".staging-")
            .suffix(".tmp")
            .tempfile_in(&self.dir)
            .map_err(write_err)?;
        staged.write_all(payload.as_bytes()).map_err(write_err)?;
        staged.as_file().sync_all().map_err(write_err)?;

        match staged.persist_noclobber(&path) {
            Ok(_) => {
                info!(fingerprint = %fingerprint, attempts_taken, path = %path.display(), "Solution cached");
                Ok(record)
            }
            Err(e) if e.error.kind() == ErrorKind::AlreadyExists => {
                // Staged file is dropped (and removed) with `e.file`
                debug!(fingerprint = %fingerprint, "Record already present; keeping first solution");
                Ok(self.get(fingerprint).unwrap_or(record))
            }
            Err(e) => Err(write_err(e.error)),
        }
    }

    /// Every readable record in the cache, unfiltered
    pub fn list(&self) -> Vec<SolvedChallenge> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(dir = %self.dir.display(), error = %e, "Failed to list cache directory");
                return Vec::new();
            }
        };

        let mut records = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXTENSION) {
                continue;
            }
            match fs::read_to_string(&path)
                .map_err(|e| e.to_string())
                .and_then(|c| serde_json::from_str::<SolvedChallenge>(&c).map_err(|e| e.to_string()))
            {
                Ok(record) => records.push(record),
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable cache record"),
            }
        }
        records.sort_by(|a, b| a.solved_timestamp.cmp(&b.solved_timestamp));
        records
    }
}
