use std::{sync::Arc, time::Duration};

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    http::{header, Method},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::CookieJar;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use tokio::{net::TcpListener, task::JoinHandle, time::MissedTickBehavior};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use zkcookie_common::{FieldString, PredicateSet, RawSignal, SignalLayout};
use zkcookie_verifier::ProofOracle;

pub mod challenge;
pub mod clock;
pub mod config;
pub mod enrich;
pub mod error;
pub mod gate;
pub mod nullifier;
pub mod session;
pub mod verify;

pub use challenge::{Challenge, ChallengeError, ChallengeMetadata, ChallengeStore};
pub use clock::Clock;
pub use config::{ConfigError, ServerConfig, StoreLocation};
pub use error::ApiError;
pub use gate::{SessionClaims, SESSION_COOKIE};
pub use nullifier::{NullifierError, NullifierLedger};
pub use session::{Session, SessionCodec, SessionError};
pub use verify::{ProofVerifier, VerifiedProof, VerifyError};

use crate::{
    enrich::classify_query,
    error::{CODE_INVALID_BODY, CODE_INVALID_MASK, CODE_MISSING_HOST},
    gate::{require_session, session_cookie},
};

#[derive(Debug, Error)]
pub enum BootError {
    #[error(transparent)]
    Challenges(#[from] ChallengeError),
    #[error(transparent)]
    Nullifiers(#[from] NullifierError),
}

#[derive(Clone)]
pub struct AppState {
    challenges: ChallengeStore,
    nullifiers: NullifierLedger,
    verifier: ProofVerifier,
    sessions: SessionCodec,
    clock: Clock,
    cookie_secure: bool,
}

impl AppState {
    pub fn with_components(
        challenges: ChallengeStore,
        nullifiers: NullifierLedger,
        oracle: Arc<dyn ProofOracle>,
        sessions: SessionCodec,
        clock: Clock,
        cookie_secure: bool,
    ) -> Self {
        let verifier = ProofVerifier::new(challenges.clone(), nullifiers.clone(), oracle);
        Self {
            challenges,
            nullifiers,
            verifier,
            sessions,
            clock,
            cookie_secure,
        }
    }

    /// Opens the configured stores on the system clock.
    pub fn from_config(
        config: &ServerConfig,
        oracle: Arc<dyn ProofOracle>,
    ) -> Result<Self, BootError> {
        let clock = Clock::system();
        let challenges = match &config.challenge_store {
            StoreLocation::InMemory => ChallengeStore::in_memory(clock.clone(), config.nonce_ttl_ms),
            StoreLocation::Sled(path) => {
                ChallengeStore::persistent(path, clock.clone(), config.nonce_ttl_ms)?
            }
        };
        let nullifiers = match &config.nullifier_store {
            StoreLocation::InMemory => NullifierLedger::in_memory(),
            StoreLocation::Sled(path) => NullifierLedger::persistent(path)?,
        };
        let sessions = SessionCodec::new(
            config.session_secret.as_bytes(),
            config.session_ttl_ms,
            clock.clone(),
        );
        Ok(Self::with_components(
            challenges,
            nullifiers,
            oracle,
            sessions,
            clock,
            config.cookie_secure,
        ))
    }

    pub fn challenges(&self) -> &ChallengeStore {
        &self.challenges
    }

    pub fn nullifiers(&self) -> &NullifierLedger {
        &self.nullifiers
    }

    pub fn sessions(&self) -> &SessionCodec {
        &self.sessions
    }

    pub fn clock(&self) -> &Clock {
        &self.clock
    }
}

pub async fn serve(config: &ServerConfig, state: AppState) -> std::io::Result<()> {
    let mut app = app_router(state);
    if config.enable_cors {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::GET, Method::POST])
            .allow_headers([header::CONTENT_TYPE]);
        app = app.layer(cors);
    }

    let listener = TcpListener::bind(config.listen_addr.as_str()).await?;
    tracing::info!(addr = %listener.local_addr()?, "zkcookie backend listening");
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
}

pub fn app_router(state: AppState) -> Router {
    let gated = Router::new()
        .route("/zkp/session", get(session_handler))
        .route("/api/events/search", post(search_event_handler))
        .route_layer(middleware::from_fn_with_state(
            state.sessions.clone(),
            require_session,
        ));

    Router::new()
        .route("/health", get(health_handler))
        .route("/zkp/challenge", get(challenge_handler))
        .route("/zkp/verify", post(verify_handler))
        .merge(gated)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Periodically drops challenges nobody came back for. Expiry itself is
/// enforced on consume; this only bounds memory.
pub fn spawn_sweeper(challenges: ChallengeStore, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // the first tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match challenges.purge_expired() {
                Ok(0) => {}
                Ok(removed) => tracing::debug!(removed, "expired challenges swept"),
                Err(err) => tracing::warn!(error = %err, "challenge sweep failed"),
            }
        }
    })
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}

#[derive(Serialize)]
struct HealthResponse {
    ok: bool,
    now: u64,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        ok: true,
        now: state.clock.now_ms(),
    })
}

#[derive(Deserialize)]
struct ChallengeQuery {
    host: Option<String>,
    mask: Option<String>,
}

#[derive(Serialize)]
struct ChallengeResponse {
    ok: bool,
    nonce: String,
    nonce_field: FieldString,
    origin_id: FieldString,
    #[serde(rename = "nowYear")]
    now_year: i32,
    #[serde(rename = "catMask")]
    cat_mask: u16,
    ttl_ms: u64,
    expires_at: u64,
}

async fn challenge_handler(
    State(state): State<AppState>,
    query: Result<Query<ChallengeQuery>, QueryRejection>,
) -> Result<Json<ChallengeResponse>, ApiError> {
    let Query(query) =
        query.map_err(|err| ApiError::bad_request(CODE_INVALID_BODY, err.body_text()))?;
    let host = query
        .host
        .as_deref()
        .map(str::trim)
        .filter(|host| !host.is_empty())
        .ok_or_else(|| ApiError::bad_request(CODE_MISSING_HOST, "host query parameter is required"))?;
    let mask = parse_mask(query.mask.as_deref())?;

    let challenge = state.challenges.issue(host, mask)?;
    Ok(Json(ChallengeResponse {
        ok: true,
        nonce: challenge.nonce_hex,
        nonce_field: challenge.nonce,
        origin_id: challenge.metadata.origin_id,
        now_year: state.clock.current_year(),
        cat_mask: challenge.metadata.mask,
        ttl_ms: state.challenges.ttl_ms(),
        expires_at: challenge.metadata.expires_at_ms,
    }))
}

/// Decimal or `0x`-prefixed hex; absent means no categories.
fn parse_mask(raw: Option<&str>) -> Result<u64, ApiError> {
    let raw = raw.map(str::trim).unwrap_or_default();
    if raw.is_empty() {
        return Ok(0);
    }
    let parsed = match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => raw.parse::<u64>(),
    };
    parsed.map_err(|_| ApiError::bad_request(CODE_INVALID_MASK, format!("unparsable mask {raw:?}")))
}

#[derive(Deserialize)]
struct VerifyRequest {
    proof: JsonValue,
    #[serde(rename = "publicSignals")]
    public_signals: Vec<RawSignal>,
    #[serde(default)]
    layout: Option<SignalLayout>,
}

#[derive(Serialize)]
struct VerifyResponse {
    ok: bool,
    session: String,
    predicates: PredicateSet,
    origin: FieldString,
    mask: u16,
    exp: u64,
}

async fn verify_handler(
    State(state): State<AppState>,
    payload: Result<Json<VerifyRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(req) =
        payload.map_err(|err| ApiError::bad_request(CODE_INVALID_BODY, err.body_text()))?;
    // Checked before the verifier runs so a body without a proof keeps its nonce.
    if req.proof.is_null() {
        return Err(ApiError::bad_request(CODE_INVALID_BODY, "proof is required"));
    }

    let verifier = state.verifier.clone();
    let outcome = tokio::task::spawn_blocking(move || {
        verifier.verify(&req.proof, &req.public_signals, req.layout)
    })
    .await
    .map_err(|err| ApiError::internal(format!("verification task failed: {err}")))?;

    let verified = match outcome {
        Ok(verified) => verified,
        Err(err) => {
            tracing::info!(code = err.code(), reason = %err, "proof rejected");
            return Err(err.into());
        }
    };

    let (session, token) = state.sessions.create(
        verified.origin_id,
        verified.origin_host,
        verified.mask,
        verified.predicates,
    )?;
    tracing::info!(
        origin = %session.host,
        mask = session.mask,
        layout = verified.layout.as_str(),
        exp = session.exp,
        "session minted"
    );

    let cookie = session_cookie(
        token.clone(),
        state.sessions.ttl_ms().div_ceil(1000),
        state.cookie_secure,
    );
    let body = VerifyResponse {
        ok: true,
        session: token,
        predicates: session.predicates,
        origin: session.origin,
        mask: session.mask,
        exp: session.exp,
    };
    Ok((CookieJar::new().add(cookie), Json(body)).into_response())
}

#[derive(Serialize)]
struct SessionResponse {
    ok: bool,
    #[serde(flatten)]
    session: Session,
}

async fn session_handler(SessionClaims(session): SessionClaims) -> Json<SessionResponse> {
    Json(SessionResponse { ok: true, session })
}

#[derive(Deserialize)]
struct SearchEvent {
    query: String,
}

#[derive(Serialize)]
struct SearchResponse {
    ok: bool,
    query: String,
    predicates: PredicateSet,
    updated: Vec<String>,
    exp: u64,
}

async fn search_event_handler(
    State(state): State<AppState>,
    SessionClaims(current): SessionClaims,
    payload: Result<Json<SearchEvent>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(event) =
        payload.map_err(|err| ApiError::bad_request(CODE_INVALID_BODY, err.body_text()))?;

    let Some(interest) = classify_query(&event.query) else {
        return Ok(Json(SearchResponse {
            ok: true,
            query: event.query,
            predicates: current.predicates,
            updated: Vec::new(),
            exp: current.exp,
        })
        .into_response());
    };

    let mut predicates = current.predicates.clone();
    let raised = predicates.enrich(interest);
    if raised.is_empty() {
        return Ok(Json(SearchResponse {
            ok: true,
            query: event.query,
            predicates,
            updated: raised,
            exp: current.exp,
        })
        .into_response());
    }

    let mut enriched = current.enriched.clone();
    for name in &raised {
        if !enriched.contains(name) {
            enriched.push(name.clone());
        }
    }
    let (session, token) = state.sessions.reissue(&current, predicates, enriched)?;
    tracing::info!(
        origin = %session.host,
        interest,
        raised = ?raised,
        "session enriched from search event"
    );

    let remaining_secs = session
        .exp
        .saturating_sub(state.clock.now_ms())
        .div_ceil(1000);
    let cookie = session_cookie(token, remaining_secs, state.cookie_secure);
    let body = SearchResponse {
        ok: true,
        query: event.query,
        predicates: session.predicates,
        updated: raised,
        exp: session.exp,
    };
    Ok((CookieJar::new().add(cookie), Json(body)).into_response())
}
