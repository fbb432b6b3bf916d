//! Session-scoped storage for the itinerary, its provider, and the unlock flag.
//!
//! Nothing here is ever sent to a server.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

/// Raw itinerary text
pub const ITINERARY_KEY: &str = "itinerary";
/// Name of the provider that produced the itinerary
pub const PROVIDER_KEY: &str = "itinerary_provider";
/// Destination label the itinerary was generated for
pub const DESTINATION_KEY: &str = "itinerary_destination";
/// "true" once the visitor has unlocked
pub const UNLOCKED_KEY: &str = "itinerary_unlocked";

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt session file: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("Invalid session id: {0:?}")]
    InvalidId(String),
}

/// String key-value storage that lives as long as one visitor session
pub trait SessionStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, SessionError>;
    fn set(&self, key: &str, value: &str) -> Result<(), SessionError>;
}

fn io_error(path: &Path, source: std::io::Error) -> SessionError {
    SessionError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// What a session remembers between page loads
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub itinerary: Option<String>,
    pub provider: Option<String>,
    pub destination: Option<String>,
    pub unlocked: bool,
}

impl SessionSnapshot {
    pub fn load(store: &dyn SessionStore) -> Result<Self, SessionError> {
        Ok(Self {
            itinerary: store.get(ITINERARY_KEY)?,
            provider: store.get(PROVIDER_KEY)?,
            destination: store.get(DESTINATION_KEY)?,
            unlocked: store.get(UNLOCKED_KEY)?.as_deref() == Some("true"),
        })
    }
}

// ============================================================================
// In-memory
// ============================================================================

/// Store that forgets everything when dropped
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn get(&self, key: &str) -> Result<Option<String>, SessionError> {
        Ok(lock(&self.values).get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), SessionError> {
        lock(&self.values).insert(key.to_string(), value.to_string());
        Ok(())
    }
}

// ============================================================================
// File-backed
// ============================================================================

/// One JSON file per session id, rewritten atomically on every change
#[derive(Debug)]
pub struct FileSessionStore {
    session_id: String,
    path: PathBuf,
    values: Mutex<HashMap<String, String>>,
}

impl FileSessionStore {
    /// Start a fresh session with a random id
    pub fn create(dir: &Path) -> Result<Self, SessionError> {
        Self::open(dir, &Uuid::new_v4().to_string())
    }

    /// Open (or start) the session `session_id` under `dir`.
    ///
    /// Ids must be UUIDs; anything else could name a file outside `dir`.
    pub fn open(dir: &Path, session_id: &str) -> Result<Self, SessionError> {
        let session_id = Uuid::parse_str(session_id.trim())
            .map_err(|_| SessionError::InvalidId(session_id.to_string()))?
            .to_string();
        let path = dir.join(format!("{}.json", session_id));
        let values = if path.exists() {
            let content = fs::read_to_string(&path).map_err(|e| io_error(&path, e))?;
            match serde_json::from_str::<HashMap<String, String>>(&content) {
                Ok(values) => values,
                Err(e) => {
                    warn!("Ignoring unreadable session file {:?}: {}", path, e);
                    HashMap::new()
                }
            }
        } else {
            HashMap::new()
        };

        debug!("Opened session {} at {:?}", session_id, path);
        Ok(Self {
            session_id,
            path,
            values: Mutex::new(values),
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, values: &HashMap<String, String>) -> Result<(), SessionError> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).map_err(|e| io_error(dir, e))?;
        }

        let json = serde_json::to_string_pretty(values)?;
        let temp = self.path.with_extension("json.tmp");
        fs::write(&temp, json).map_err(|e| io_error(&temp, e))?;
        fs::rename(&temp, &self.path).map_err(|e| io_error(&self.path, e))?;
        Ok(())
    }
}

impl SessionStore for FileSessionStore {
    fn get(&self, key: &str) -> Result<Option<String>, SessionError> {
        Ok(lock(&self.values).get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), SessionError> {
        let mut values = lock(&self.values);
        // Memory only changes once the file does
        let mut updated = values.clone();
        updated.insert(key.to_string(), value.to_string());
        self.persist(&updated)?;
        *values = updated;
        Ok(())
    }
}
