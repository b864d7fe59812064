use std::{
    collections::HashSet,
    fs,
    path::Path,
    sync::{Arc, Mutex},
};

use sled::Db;
use thiserror::Error;
use zkcookie_common::FieldString;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NullifierError {
    #[error("nullifier already recorded")]
    Replay,
    #[error("nullifier store error: {0}")]
    Storage(String),
}

/// Append-only set of consumed proof nullifiers.
///
/// Entries are never removed, so the ledger grows with every accepted proof.
#[derive(Clone)]
pub struct NullifierLedger {
    backend: Arc<NullifierBackend>,
}

enum NullifierBackend {
    InMemory(Mutex<HashSet<FieldString>>),
    Persistent(Db),
}

impl NullifierLedger {
    pub fn in_memory() -> Self {
        Self {
            backend: Arc::new(NullifierBackend::InMemory(Mutex::new(HashSet::new()))),
        }
    }

    pub fn persistent(path: impl AsRef<Path>) -> Result<Self, NullifierError> {
        let db = open_sled(path.as_ref()).map_err(NullifierError::Storage)?;
        Ok(Self {
            backend: Arc::new(NullifierBackend::Persistent(db)),
        })
    }

    pub fn seen(&self, nullifier: &FieldString) -> Result<bool, NullifierError> {
        match &*self.backend {
            NullifierBackend::InMemory(store) => Ok(store
                .lock()
                .expect("nullifier store poisoned")
                .contains(nullifier)),
            NullifierBackend::Persistent(db) => db
                .contains_key(nullifier.as_str().as_bytes())
                .map_err(|err| NullifierError::Storage(format!("nullifier db contains_key: {err}"))),
        }
    }

    /// Inserts the nullifier if absent. A nullifier that is already present,
    /// including one inserted concurrently, is reported as [`NullifierError::Replay`].
    pub fn record(&self, nullifier: &FieldString) -> Result<(), NullifierError> {
        match &*self.backend {
            NullifierBackend::InMemory(store) => {
                let mut guard = store.lock().expect("nullifier store poisoned");
                if !guard.insert(nullifier.clone()) {
                    return Err(NullifierError::Replay);
                }
                Ok(())
            }
            NullifierBackend::Persistent(db) => {
                let previous = db
                    .insert(nullifier.as_str().as_bytes(), &[])
                    .map_err(|err| NullifierError::Storage(format!("nullifier db insert: {err}")))?;
                if previous.is_some() {
                    return Err(NullifierError::Replay);
                }
                Ok(())
            }
        }
    }

    pub fn len(&self) -> usize {
        match &*self.backend {
            NullifierBackend::InMemory(store) => {
                store.lock().expect("nullifier store poisoned").len()
            }
            NullifierBackend::Persistent(db) => db.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Opens (or creates) a sled database, creating missing parent directories.
pub(crate) fn open_sled(path: &Path) -> Result<Db, String> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|err| {
                format!("failed to create directory for {}: {err}", path.display())
            })?;
        }
    }
    sled::open(path).map_err(|err| format!("failed to open sled db at {}: {err}", path.display()))
}
