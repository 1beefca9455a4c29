//! Durable storage for the serialized session list
//!
//! Storage is a single key holding one JSON document: written on every
//! change, read once at startup.

use crate::utils::safe_filename;
use parking_lot::Mutex;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Key under which the session list is stored by default
pub const DEFAULT_STORAGE_KEY: &str = "veritas_chat_sessions_v1";

/// A single-key durable store
pub trait SessionStorage: Send + Sync + std::fmt::Debug {
    /// Key the payload is stored under
    fn key(&self) -> &str;

    /// Read the stored payload, `None` when nothing was stored yet
    fn load(&self) -> crate::Result<Option<String>>;

    /// Replace the stored payload
    fn save(&self, payload: &str) -> crate::Result<()>;
}

/// Stores the payload in `<dir>/<key>.json`
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
    key: String,
}

impl FileStorage {
    pub fn new<P: AsRef<Path>>(dir: P, key: impl Into<String>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            key: key.into(),
        }
    }

    /// Path of the JSON document
    pub fn path(&self) -> PathBuf {
        self.dir.join(format!("{}.json", safe_filename(&self.key)))
    }

    fn temp_path(&self) -> PathBuf {
        self.dir
            .join(format!(".{}.json.tmp", safe_filename(&self.key)))
    }
}

impl SessionStorage for FileStorage {
    fn key(&self) -> &str {
        &self.key
    }

    fn load(&self) -> crate::Result<Option<String>> {
        let path = self.path();
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(fs::read_to_string(&path)?))
    }

    fn save(&self, payload: &str) -> crate::Result<()> {
        fs::create_dir_all(&self.dir)?;

        // tmp file + rename so a crash never leaves a half-written document
        let tmp_path = self.temp_path();
        let mut tmp_file = File::create(&tmp_path)?;
        tmp_file.write_all(payload.as_bytes())?;
        tmp_file.sync_all()?;
        drop(tmp_file);

        fs::rename(&tmp_path, self.path())?;
        Ok(())
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    payload: Option<String>,
    fail_writes: bool,
    writes: usize,
}

/// In-memory storage; clones share the same payload
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage pre-populated with `payload`
    pub fn with_payload(payload: impl Into<String>) -> Self {
        let storage = Self::new();
        storage.state.lock().payload = Some(payload.into());
        storage
    }

    pub fn payload(&self) -> Option<String> {
        self.state.lock().payload.clone()
    }

    /// Make every subsequent `save` fail
    pub fn set_fail_writes(&self, fail: bool) {
        self.state.lock().fail_writes = fail;
    }

    /// Number of successful writes so far
    pub fn write_count(&self) -> usize {
        self.state.lock().writes
    }
}

impl SessionStorage for MemoryStorage {
    fn key(&self) -> &str {
        DEFAULT_STORAGE_KEY
    }

    fn load(&self) -> crate::Result<Option<String>> {
        Ok(self.state.lock().payload.clone())
    }

    fn save(&self, payload: &str) -> crate::Result<()> {
        let mut state = self.state.lock();
        if state.fail_writes {
            return Err(crate::Error::Storage("write rejected".to_string()));
        }
        state.payload = Some(payload.to_string());
        state.writes += 1;
        Ok(())
    }
}
