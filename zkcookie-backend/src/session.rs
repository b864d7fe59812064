//! Stateless session tokens.
//!
//! A token is `base64url(payload JSON) "." base64url(tag)` without padding,
//! where the tag is a BLAKE3 keyed hash of the encoded payload under a key
//! derived from the server secret.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use zkcookie_common::{FieldString, PredicateSet};

use crate::clock::Clock;

const KEY_DERIVATION_CONTEXT: &str = "zkcookie 2025-01 session token MAC v1";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("token is not of the form payload.tag")]
    Malformed,
    #[error("session signature mismatch")]
    BadSignature,
    #[error("session payload undecodable: {0}")]
    MalformedPayload(String),
    #[error("session expired")]
    Expired,
    #[error("session encoding failed: {0}")]
    Encode(String),
}

/// Claims carried inside a session token. Timestamps are Unix milliseconds.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Origin identifier (field element) bound at challenge time.
    pub origin: FieldString,
    pub host: String,
    pub mask: u16,
    pub predicates: PredicateSet,
    pub iat: u64,
    pub exp: u64,
    /// Claims added after verification by server-side enrichment rather
    /// than proven by the client.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub enriched: Vec<String>,
}

#[derive(Clone)]
pub struct SessionCodec {
    key: [u8; 32],
    ttl_ms: u64,
    clock: Clock,
}

impl SessionCodec {
    pub fn new(secret: &[u8], ttl_ms: u64, clock: Clock) -> Self {
        Self {
            key: blake3::derive_key(KEY_DERIVATION_CONTEXT, secret),
            ttl_ms,
            clock,
        }
    }

    pub fn ttl_ms(&self) -> u64 {
        self.ttl_ms
    }

    pub fn create(
        &self,
        origin: FieldString,
        host: String,
        mask: u16,
        predicates: PredicateSet,
    ) -> Result<(Session, String), SessionError> {
        let iat = self.clock.now_ms();
        let session = Session {
            origin,
            host,
            mask,
            predicates,
            iat,
            exp: iat.saturating_add(self.ttl_ms),
            enriched: Vec::new(),
        };
        let token = self.sign(&session)?;
        Ok((session, token))
    }

    /// Mints a token for an existing session with updated claims. Origin,
    /// mask and the validity window are carried over, so re-issuing never
    /// extends a session.
    pub fn reissue(
        &self,
        previous: &Session,
        predicates: PredicateSet,
        enriched: Vec<String>,
    ) -> Result<(Session, String), SessionError> {
        let session = Session {
            predicates,
            enriched,
            ..previous.clone()
        };
        let token = self.sign(&session)?;
        Ok((session, token))
    }

    pub fn sign(&self, session: &Session) -> Result<String, SessionError> {
        let json = serde_json::to_vec(session).map_err(|err| SessionError::Encode(err.to_string()))?;
        let payload = URL_SAFE_NO_PAD.encode(json);
        let tag = blake3::keyed_hash(&self.key, payload.as_bytes());
        Ok(format!("{payload}.{}", URL_SAFE_NO_PAD.encode(tag.as_bytes())))
    }

    pub fn verify(&self, token: &str) -> Result<Session, SessionError> {
        let (payload, tag) = token.split_once('.').ok_or(SessionError::Malformed)?;
        if payload.is_empty() || tag.is_empty() || tag.contains('.') {
            return Err(SessionError::Malformed);
        }

        // An undecodable tag is an altered tag.
        let tag_bytes = URL_SAFE_NO_PAD
            .decode(tag)
            .map_err(|_| SessionError::BadSignature)?;
        let tag_bytes: [u8; 32] = tag_bytes
            .as_slice()
            .try_into()
            .map_err(|_| SessionError::BadSignature)?;
        // blake3::Hash equality is constant time.
        let expected = blake3::keyed_hash(&self.key, payload.as_bytes());
        if blake3::Hash::from(tag_bytes) != expected {
            return Err(SessionError::BadSignature);
        }

        let json = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|err| SessionError::MalformedPayload(err.to_string()))?;
        let session: Session = serde_json::from_slice(&json)
            .map_err(|err| SessionError::MalformedPayload(err.to_string()))?;

        if session.exp <= self.clock.now_ms() {
            return Err(SessionError::Expired);
        }
        Ok(session)
    }
}
