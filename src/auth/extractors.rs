use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap},
};
use axum_extra::extract::{
    cookie::{Cookie, SameSite},
    CookieJar,
};
use tracing::warn;
use uuid::Uuid;

use super::{jwt::SESSION_TTL, repo_types::User};
use crate::{error::AppError, state::AppState};

pub const SESSION_COOKIE: &str = "token";

const MISSING_TOKEN: &str = "Authentication required";
const INVALID_SESSION: &str = "Invalid authentication token";

/// The authenticated caller: the user named by a verified session token,
/// freshly loaded from the credential store.
#[derive(Debug, Clone)]
pub struct Principal(pub User);

impl Principal {
    pub fn id(&self) -> Uuid {
        self.0.id
    }
}

/// Pulls the raw token out of the request. The session cookie wins over an
/// `Authorization: Bearer` header.
pub fn extract_token(jar: &CookieJar, headers: &HeaderMap) -> Option<String> {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        if !cookie.value().is_empty() {
            return Some(cookie.value().to_string());
        }
    }

    let auth = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = auth
        .strip_prefix("Bearer ")
        .or_else(|| auth.strip_prefix("bearer "))?
        .trim();
    (!token.is_empty()).then(|| token.to_string())
}

pub async fn resolve(state: &AppState, token: Option<String>) -> Result<Principal, AppError> {
    let token = token.ok_or_else(|| AppError::Unauthenticated(MISSING_TOKEN.into()))?;

    let user_id = state.tokens.verify(&token).map_err(|e| {
        warn!(reason = %e, "rejected session token");
        AppError::Unauthenticated(INVALID_SESSION.into())
    })?;

    match state.users.find_by_id(user_id).await? {
        Some(user) => Ok(Principal(user)),
        None => {
            warn!(%user_id, "session token for unknown user");
            Err(AppError::Unauthenticated(INVALID_SESSION.into()))
        }
    }
}

#[async_trait]
impl FromRequestParts<AppState> for Principal {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        resolve(state, extract_token(&jar, &parts.headers)).await
    }
}

pub fn session_cookie(token: String, secure: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .path("/")
        .max_age(SESSION_TTL)
        .build()
}

/// Overwrites the session cookie with an already-expired one.
pub fn cleared_session_cookie(secure: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, ""))
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .path("/")
        .max_age(time::Duration::ZERO)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::repo_types::NewUser;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(header::HeaderName, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(name.clone(), HeaderValue::from_str(value).unwrap());
        }
        map
    }

    fn token_from(map: &HeaderMap) -> Option<String> {
        extract_token(&CookieJar::from_headers(map), map)
    }

    #[test]
    fn reads_cookie() {
        let map = headers(&[(header::COOKIE, "theme=dark; token=abc")]);
        assert_eq!(token_from(&map).as_deref(), Some("abc"));
    }

    #[test]
    fn reads_bearer_header() {
        let map = headers(&[(header::AUTHORIZATION, "Bearer xyz")]);
        assert_eq!(token_from(&map).as_deref(), Some("xyz"));
        let map = headers(&[(header::AUTHORIZATION, "bearer xyz")]);
        assert_eq!(token_from(&map).as_deref(), Some("xyz"));
    }

    #[test]
    fn cookie_takes_precedence() {
        let map = headers(&[
            (header::COOKIE, "token=from-cookie"),
            (header::AUTHORIZATION, "Bearer from-header"),
        ]);
        assert_eq!(token_from(&map).as_deref(), Some("from-cookie"));
    }

    #[test]
    fn nothing_to_extract() {
        assert_eq!(token_from(&HeaderMap::new()), None);
        let map = headers(&[(header::AUTHORIZATION, "Basic dXNlcjpwdw==")]);
        assert_eq!(token_from(&map), None);
        let map = headers(&[(header::AUTHORIZATION, "Bearer ")]);
        assert_eq!(token_from(&map), None);
    }

    #[tokio::test]
    async fn resolves_known_user() {
        let state = AppState::fake();
        let user = state
            .users
            .create(NewUser {
                email: "ann@x.com".into(),
                password_hash: "hash".into(),
                name: "Ann".into(),
            })
            .await
            .unwrap();
        let token = state.tokens.issue(user.id).unwrap();

        let principal = resolve(&state, Some(token)).await.unwrap();
        assert_eq!(principal.id(), user.id);
        assert_eq!(principal.0.name, "Ann");
    }

    #[tokio::test]
    async fn rejects_missing_invalid_and_orphaned_tokens() {
        let state = AppState::fake();

        let err = resolve(&state, None).await.unwrap_err();
        assert!(matches!(err, AppError::Unauthenticated(ref m) if m == MISSING_TOKEN));

        let err = resolve(&state, Some("not-a-jwt".into())).await.unwrap_err();
        assert!(matches!(err, AppError::Unauthenticated(ref m) if m == INVALID_SESSION));

        let orphan = state.tokens.issue(Uuid::new_v4()).unwrap();
        let err = resolve(&state, Some(orphan)).await.unwrap_err();
        assert!(matches!(err, AppError::Unauthenticated(ref m) if m == INVALID_SESSION));
    }

    #[test]
    fn session_cookie_attributes() {
        let cookie = session_cookie("abc".into(), true);
        assert_eq!(cookie.value(), "abc");
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.max_age(), Some(time::Duration::days(7)));

        let cleared = cleared_session_cookie(false);
        assert_eq!(cleared.value(), "");
        assert_eq!(cleared.max_age(), Some(time::Duration::ZERO));
    }
}
