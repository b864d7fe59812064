use std::{
    collections::HashMap,
    path::Path,
    sync::{Arc, Mutex},
};

use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use sled::Db;
use thiserror::Error;
use zkcookie_common::{
    canonical_host, field_from_bytes, origin_to_field, FieldError, FieldString, MAX_CATEGORY_MASK,
};

use crate::{clock::Clock, nullifier::open_sled};

const NONCE_BYTES: usize = 16;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChallengeError {
    #[error("invalid host: {0}")]
    InvalidHost(#[source] FieldError),
    #[error("category mask {0} does not fit in 16 bits")]
    InvalidMask(u64),
    #[error("nonce not found or expired")]
    NotFoundOrExpired,
    #[error("challenge store error: {0}")]
    Storage(String),
}

/// What a nonce was bound to when it was issued.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeMetadata {
    pub origin_id: FieldString,
    pub origin_host: String,
    pub mask: u16,
    pub issued_at_ms: u64,
    pub expires_at_ms: u64,
}

#[derive(Clone, Debug)]
pub struct Challenge {
    /// The raw 128-bit nonce, hex encoded.
    pub nonce_hex: String,
    /// The same nonce as a field element; this is the store key and the value
    /// the prover must emit as signal 0.
    pub nonce: FieldString,
    pub metadata: ChallengeMetadata,
}

/// Outstanding challenges, each consumable at most once.
///
/// Expiry is checked lazily on `consume`; `purge_expired` only reclaims
/// space held by nonces nobody came back for.
#[derive(Clone)]
pub struct ChallengeStore {
    backend: Arc<ChallengeBackend>,
    clock: Clock,
    ttl_ms: u64,
}

enum ChallengeBackend {
    InMemory(Mutex<HashMap<FieldString, ChallengeMetadata>>),
    Persistent(Db),
}

impl ChallengeStore {
    pub fn in_memory(clock: Clock, ttl_ms: u64) -> Self {
        Self {
            backend: Arc::new(ChallengeBackend::InMemory(Mutex::new(HashMap::new()))),
            clock,
            ttl_ms,
        }
    }

    pub fn persistent(
        path: impl AsRef<Path>,
        clock: Clock,
        ttl_ms: u64,
    ) -> Result<Self, ChallengeError> {
        let db = open_sled(path.as_ref()).map_err(ChallengeError::Storage)?;
        Ok(Self {
            backend: Arc::new(ChallengeBackend::Persistent(db)),
            clock,
            ttl_ms,
        })
    }

    pub fn ttl_ms(&self) -> u64 {
        self.ttl_ms
    }

    pub fn issue(&self, host: &str, mask: u64) -> Result<Challenge, ChallengeError> {
        if mask > MAX_CATEGORY_MASK {
            return Err(ChallengeError::InvalidMask(mask));
        }
        let origin_host = canonical_host(host).map_err(ChallengeError::InvalidHost)?;
        let origin_id = origin_to_field(&origin_host).map_err(ChallengeError::InvalidHost)?;

        let mut raw = [0u8; NONCE_BYTES];
        OsRng.fill_bytes(&mut raw);
        let nonce_hex = hex::encode(raw);
        let nonce = field_from_bytes(&raw);

        let issued_at_ms = self.clock.now_ms();
        let metadata = ChallengeMetadata {
            origin_id,
            origin_host,
            mask: mask as u16,
            issued_at_ms,
            expires_at_ms: issued_at_ms.saturating_add(self.ttl_ms),
        };
        self.insert(&nonce, &metadata)?;

        tracing::debug!(
            nonce = %nonce,
            origin = %metadata.origin_host,
            mask = metadata.mask,
            "challenge issued"
        );
        Ok(Challenge {
            nonce_hex,
            nonce,
            metadata,
        })
    }

    /// Atomically removes the challenge for `nonce`. Unknown, already
    /// consumed and expired nonces all yield the same error.
    pub fn consume(&self, nonce: &FieldString) -> Result<ChallengeMetadata, ChallengeError> {
        let taken = self.take(nonce)?;
        match taken {
            Some(metadata) if metadata.expires_at_ms > self.clock.now_ms() => Ok(metadata),
            Some(_) => {
                tracing::debug!(nonce = %nonce, "challenge consumed after expiry");
                Err(ChallengeError::NotFoundOrExpired)
            }
            None => Err(ChallengeError::NotFoundOrExpired),
        }
    }

    /// Drops every expired challenge and returns how many were removed.
    pub fn purge_expired(&self) -> Result<usize, ChallengeError> {
        let now = self.clock.now_ms();
        match &*self.backend {
            ChallengeBackend::InMemory(store) => {
                let mut guard = store.lock().expect("challenge store poisoned");
                let before = guard.len();
                guard.retain(|_, metadata| metadata.expires_at_ms > now);
                Ok(before - guard.len())
            }
            ChallengeBackend::Persistent(db) => {
                let mut removed = 0;
                for entry in db.iter() {
                    let (key, value) = entry
                        .map_err(|err| ChallengeError::Storage(format!("challenge db scan: {err}")))?;
                    let expired = serde_json::from_slice::<ChallengeMetadata>(&value)
                        .map(|metadata| metadata.expires_at_ms <= now)
                        .unwrap_or(true);
                    if expired {
                        db.remove(&key).map_err(|err| {
                            ChallengeError::Storage(format!("challenge db remove: {err}"))
                        })?;
                        removed += 1;
                    }
                }
                Ok(removed)
            }
        }
    }

    /// Challenges currently held, expired or not.
    pub fn len(&self) -> usize {
        match &*self.backend {
            ChallengeBackend::InMemory(store) => {
                store.lock().expect("challenge store poisoned").len()
            }
            ChallengeBackend::Persistent(db) => db.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn insert(&self, nonce: &FieldString, metadata: &ChallengeMetadata) -> Result<(), ChallengeError> {
        match &*self.backend {
            ChallengeBackend::InMemory(store) => {
                store
                    .lock()
                    .expect("challenge store poisoned")
                    .insert(nonce.clone(), metadata.clone());
                Ok(())
            }
            ChallengeBackend::Persistent(db) => {
                let encoded = serde_json::to_vec(metadata)
                    .map_err(|err| ChallengeError::Storage(format!("encode challenge: {err}")))?;
                db.insert(nonce.as_str().as_bytes(), encoded)
                    .map_err(|err| ChallengeError::Storage(format!("challenge db insert: {err}")))?;
                Ok(())
            }
        }
    }

    fn take(&self, nonce: &FieldString) -> Result<Option<ChallengeMetadata>, ChallengeError> {
        match &*self.backend {
            ChallengeBackend::InMemory(store) => Ok(store
                .lock()
                .expect("challenge store poisoned")
                .remove(nonce)),
            ChallengeBackend::Persistent(db) => {
                let removed = db
                    .remove(nonce.as_str().as_bytes())
                    .map_err(|err| ChallengeError::Storage(format!("challenge db remove: {err}")))?;
                match removed {
                    Some(bytes) => serde_json::from_slice(&bytes).map(Some).map_err(|err| {
                        ChallengeError::Storage(format!("decode challenge: {err}"))
                    }),
                    None => Ok(None),
                }
            }
        }
    }
}
