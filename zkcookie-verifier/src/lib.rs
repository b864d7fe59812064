// zkcookie-verifier/src/lib.rs

//! Proof-verification oracle consumed by the cookie backend.
//!
//! The backend treats verification as a boolean capability over the
//! canonical public-signal vector and the client's proof JSON. The only
//! production implementation is [`Groth16Oracle`], which checks snarkjs
//! Groth16 proofs on BN254.

use std::sync::Arc;

use serde_json::Value as JsonValue;
use thiserror::Error;

pub mod groth16;

pub use groth16::Groth16Oracle;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OracleError {
    /// No verification key is available yet.
    #[error("verifier not ready: {0}")]
    NotReady(String),
    /// A key exists but cannot be used.
    #[error("verification key rejected: {0}")]
    InvalidKey(String),
}

pub trait ProofOracle: Send + Sync {
    /// `Ok(false)` for every proof that does not verify, including
    /// structurally malformed ones. `Err` is reserved for oracle-side
    /// failures.
    fn verify(&self, public_signals: &[String], proof: &JsonValue) -> Result<bool, OracleError>;
}

impl<T: ProofOracle + ?Sized> ProofOracle for Arc<T> {
    fn verify(&self, public_signals: &[String], proof: &JsonValue) -> Result<bool, OracleError> {
        (**self).verify(public_signals, proof)
    }
}
