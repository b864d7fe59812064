use std::sync::Arc;

use serde_json::Value as JsonValue;
use thiserror::Error;
use zkcookie_common::{
    FieldString, LayoutError, PredicateSet, PublicSignals, RawSignal, SignalLayout,
};
use zkcookie_verifier::{OracleError, ProofOracle};

use crate::{
    challenge::{ChallengeError, ChallengeStore},
    nullifier::{NullifierError, NullifierLedger},
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum VerifyError {
    #[error("unsupported public-signal layout: {0}")]
    UnsupportedLayout(#[source] LayoutError),
    #[error("invalid public signals: {0}")]
    InvalidSignals(#[source] LayoutError),
    #[error("nonce not found or expired")]
    NonceInvalid,
    #[error("origin signal does not match the challenge")]
    OriginMismatch,
    #[error("mask signal does not match the challenge")]
    MaskMismatch,
    #[error("proof rejected by verifier")]
    InvalidProof,
    #[error("verifier not ready: {0}")]
    VerifierNotReady(String),
    #[error("nullifier already used")]
    NullifierReplay,
    #[error("internal verification failure: {0}")]
    Internal(String),
}

impl VerifyError {
    /// Machine-readable code reported to clients.
    pub fn code(&self) -> &'static str {
        match self {
            VerifyError::UnsupportedLayout(_) => "unsupported_layout",
            VerifyError::InvalidSignals(_) => "invalid_body",
            VerifyError::NonceInvalid => "nonce_not_found_or_expired",
            VerifyError::OriginMismatch => "origin_mismatch",
            VerifyError::MaskMismatch => "mask_mismatch",
            VerifyError::InvalidProof => "invalid_proof",
            VerifyError::VerifierNotReady(_) => "verifier_not_ready",
            VerifyError::NullifierReplay => "nullifier_replay",
            VerifyError::Internal(_) => "server_error",
        }
    }
}

/// Outcome of a successful verification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerifiedProof {
    pub predicates: PredicateSet,
    pub origin_id: FieldString,
    pub origin_host: String,
    pub mask: u16,
    pub layout: SignalLayout,
    pub nullifier: FieldString,
}

/// Binds a submitted proof to its challenge, runs the oracle and spends the
/// nullifier.
///
/// `verify` blocks on the oracle; async callers should run it on a blocking
/// thread. No store lock is held while the oracle runs.
#[derive(Clone)]
pub struct ProofVerifier {
    challenges: ChallengeStore,
    nullifiers: NullifierLedger,
    oracle: Arc<dyn ProofOracle>,
}

impl ProofVerifier {
    pub fn new(
        challenges: ChallengeStore,
        nullifiers: NullifierLedger,
        oracle: Arc<dyn ProofOracle>,
    ) -> Self {
        Self {
            challenges,
            nullifiers,
            oracle,
        }
    }

    pub fn verify(
        &self,
        proof: &JsonValue,
        raw_signals: &[RawSignal],
        declared: Option<SignalLayout>,
    ) -> Result<VerifiedProof, VerifyError> {
        let signals = PublicSignals::parse(raw_signals, declared).map_err(|err| match err {
            LayoutError::InvalidSignal { .. } => VerifyError::InvalidSignals(err),
            _ => VerifyError::UnsupportedLayout(err),
        })?;

        // The nonce is spent here, whatever happens next.
        let challenge = self
            .challenges
            .consume(signals.nonce())
            .map_err(|err| match err {
                ChallengeError::NotFoundOrExpired => VerifyError::NonceInvalid,
                other => VerifyError::Internal(other.to_string()),
            })?;

        if signals.origin() != &challenge.origin_id {
            return Err(VerifyError::OriginMismatch);
        }
        if signals.mask() != Some(u64::from(challenge.mask)) {
            return Err(VerifyError::MaskMismatch);
        }

        match self.oracle.verify(&signals.to_strings(), proof) {
            Ok(true) => {}
            Ok(false) => return Err(VerifyError::InvalidProof),
            Err(OracleError::NotReady(reason)) => return Err(VerifyError::VerifierNotReady(reason)),
            Err(err) => return Err(VerifyError::Internal(err.to_string())),
        }

        let nullifier = signals.nullifier();
        match self.nullifiers.seen(nullifier) {
            Ok(false) => {}
            Ok(true) => return Err(VerifyError::NullifierReplay),
            Err(err) => return Err(VerifyError::Internal(err.to_string())),
        }
        self.nullifiers.record(nullifier).map_err(|err| match err {
            NullifierError::Replay => VerifyError::NullifierReplay,
            other => VerifyError::Internal(other.to_string()),
        })?;

        Ok(VerifiedProof {
            predicates: signals.predicates(),
            origin_id: challenge.origin_id,
            origin_host: challenge.origin_host,
            mask: challenge.mask,
            layout: signals.layout(),
            nullifier: nullifier.clone(),
        })
    }
}
