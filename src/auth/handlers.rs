use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use axum_extra::extract::CookieJar;
use tracing::instrument;

use crate::{
    auth::{
        dto::{
            AuthResponse, LoginRequest, MessageResponse, ProfileResponse, RegisterRequest,
            UserResponse,
        },
        extractors::{cleared_session_cookie, session_cookie, Principal},
        services::{self, ProfileForm},
    },
    error::AppError,
    images::services::{UploadItem, MAX_IMAGE_BYTES},
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
}

pub fn me_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/me", get(get_me))
        .route(
            "/user/profile",
            put(update_profile).layer(DefaultBodyLimit::max(MAX_IMAGE_BYTES + 1024 * 1024)),
        )
}

#[instrument(skip(state, jar, payload))]
pub async fn register(
    State(state): State<AppState>,
    jar: CookieJar,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, CookieJar, Json<AuthResponse>), AppError> {
    let Json(payload) = payload?;
    let user = services::register(&state, payload).await?;
    let token = state.tokens.issue(user.id)?;

    let jar = jar.add(session_cookie(token.clone(), state.config.cookie_secure));
    Ok((
        StatusCode::CREATED,
        jar,
        Json(AuthResponse {
            message: "Registration successful",
            user: user.into(),
            token,
        }),
    ))
}

#[instrument(skip(state, jar, payload))]
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<(CookieJar, Json<AuthResponse>), AppError> {
    let Json(payload) = payload?;
    let user = services::login(&state, payload).await?;
    let token = state.tokens.issue(user.id)?;

    let jar = jar.add(session_cookie(token.clone(), state.config.cookie_secure));
    Ok((
        jar,
        Json(AuthResponse {
            message: "Login successful",
            user: user.into(),
            token,
        }),
    ))
}

/// Sessions are stateless: this only tells the browser to drop its cookie.
/// A copied token stays valid until it expires.
#[instrument(skip(state, jar))]
pub async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
) -> (CookieJar, Json<MessageResponse>) {
    let jar = jar.add(cleared_session_cookie(state.config.cookie_secure));
    (
        jar,
        Json(MessageResponse {
            message: "Logout successful",
        }),
    )
}

#[instrument(skip(principal), fields(user_id = %principal.id()))]
pub async fn get_me(principal: Principal) -> Json<UserResponse> {
    Json(UserResponse {
        user: principal.0.into(),
    })
}

#[instrument(skip(state, principal, mp), fields(user_id = %principal.id()))]
pub async fn update_profile(
    State(state): State<AppState>,
    principal: Principal,
    mut mp: Multipart,
) -> Result<Json<ProfileResponse>, AppError> {
    let mut form = ProfileForm::default();
    while let Some(field) = mp.next_field().await? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("name") => form.name = Some(field.text().await?),
            Some("bio") => form.bio = Some(field.text().await?),
            Some("profileImage") | Some("image") => {
                let content_type = field
                    .content_type()
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "application/octet-stream".into());
                let body = field.bytes().await?;
                if !body.is_empty() {
                    form.image = Some(UploadItem { body, content_type });
                }
            }
            _ => {}
        }
    }

    let user = services::update_profile(&state, &principal, form).await?;
    Ok(Json(ProfileResponse {
        message: "Profile updated successfully",
        user: user.into(),
    }))
}
