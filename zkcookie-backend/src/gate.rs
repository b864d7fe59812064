//! Session gate for routes that require a verified proof.

use std::ops::Deref;

use axum::{
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};

use crate::{
    error::{ApiError, CODE_NO_SESSION},
    session::{Session, SessionCodec},
};

pub const SESSION_COOKIE: &str = "zk_session";

/// Claims of the session that passed the gate.
#[derive(Clone, Debug)]
pub struct SessionClaims(pub Session);

impl Deref for SessionClaims {
    type Target = Session;

    fn deref(&self) -> &Session {
        &self.0
    }
}

pub async fn require_session(
    State(codec): State<SessionCodec>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(cookie) = jar.get(SESSION_COOKIE) else {
        return ApiError::unauthorized(CODE_NO_SESSION, "no session cookie").into_response();
    };

    match codec.verify(cookie.value()) {
        Ok(session) => {
            request.extensions_mut().insert(SessionClaims(session));
            next.run(request).await
        }
        Err(err) => {
            tracing::warn!(reason = %err, path = %request.uri().path(), "session rejected");
            ApiError::from(err).into_response()
        }
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for SessionClaims
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<SessionClaims>()
            .cloned()
            .ok_or_else(|| ApiError::unauthorized(CODE_NO_SESSION, "route is not session gated"))
    }
}

/// Session cookie carrying `token`, for a `CookieJar` response.
pub fn session_cookie(token: String, max_age_secs: u64, secure: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .http_only(true)
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(time::Duration::seconds(
            i64::try_from(max_age_secs).unwrap_or(i64::MAX),
        ))
        .secure(secure)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cookie_attributes() {
        let cookie = session_cookie("abc.def".into(), 300, false);
        assert_eq!(cookie.name(), SESSION_COOKIE);
        assert_eq!(cookie.value(), "abc.def");
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(cookie.max_age(), Some(time::Duration::seconds(300)));
        assert_eq!(cookie.secure(), Some(false));

        let rendered = cookie.to_string();
        assert!(rendered.starts_with("zk_session=abc.def;"));
        assert!(rendered.contains("HttpOnly"));
        assert!(rendered.contains("SameSite=Lax"));
        assert!(rendered.contains("Max-Age=300"));
        assert!(!rendered.contains("Secure"));
    }

    #[test]
    fn secure_flag_is_rendered_when_configured() {
        let cookie = session_cookie("abc.def".into(), 10, true);
        let rendered = cookie.to_string();
        assert!(rendered.contains("; Secure"));
        assert!(rendered.contains("Max-Age=10"));
    }
}
