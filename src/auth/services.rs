use lazy_static::lazy_static;
use regex::Regex;
use tracing::{error, info, warn};

use crate::{
    auth::{
        dto::{LoginRequest, RegisterRequest},
        extractors::Principal,
        password::{hash_password, verify_password},
        repo_types::{NewUser, ProfileChanges, User},
    },
    db::StoreError,
    error::AppError,
    images::services::{discard_image, discard_image_url, upload_profile_image, UploadItem},
    state::AppState,
};

pub const MIN_PASSWORD_LEN: usize = 6;
pub const MAX_BIO_LEN: usize = 200;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn present(field: Option<String>) -> Option<String> {
    field.filter(|v| !v.trim().is_empty())
}

pub async fn register(state: &AppState, payload: RegisterRequest) -> Result<User, AppError> {
    let (Some(name), Some(email), Some(password)) = (
        present(payload.name),
        present(payload.email),
        payload.password.filter(|p| !p.is_empty()),
    ) else {
        return Err(AppError::validation("Name, email and password are required"));
    };

    let email = normalize_email(&email);
    if !is_valid_email(&email) {
        warn!(%email, "invalid email");
        return Err(AppError::validation("Please provide a valid email"));
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::validation(
            "Password must be at least 6 characters long",
        ));
    }

    if state.users.find_by_email(&email).await?.is_some() {
        warn!(%email, "email already registered");
        return Err(email_taken());
    }

    let password_hash = hash_password(&password).map_err(|e| {
        error!(error = %e, "hash_password failed");
        AppError::Upstream(e.into())
    })?;

    let new = NewUser {
        email,
        password_hash,
        name: name.trim().to_string(),
    };
    let user = match state.users.create(new).await {
        Ok(u) => u,
        // lost a race with a concurrent registration
        Err(StoreError::Duplicate) => return Err(email_taken()),
        Err(e) => return Err(e.into()),
    };

    info!(user_id = %user.id, email = %user.email, "user registered");
    Ok(user)
}

fn email_taken() -> AppError {
    AppError::Conflict("User already exists with this email".into())
}

pub async fn login(state: &AppState, payload: LoginRequest) -> Result<User, AppError> {
    let (Some(email), Some(password)) = (
        present(payload.email),
        payload.password.filter(|p| !p.is_empty()),
    ) else {
        return Err(AppError::validation("Email and password are required"));
    };

    let email = normalize_email(&email);
    if !is_valid_email(&email) {
        return Err(AppError::validation("Please provide a valid email"));
    }

    let invalid = || AppError::Unauthenticated("Invalid credentials".into());

    let Some(user) = state.users.find_by_email(&email).await? else {
        warn!(%email, "login unknown email");
        return Err(invalid());
    };

    let ok = verify_password(&password, &user.password_hash).map_err(|e| {
        error!(error = %e, user_id = %user.id, "verify_password failed");
        AppError::Upstream(e.into())
    })?;
    if !ok {
        warn!(user_id = %user.id, "login invalid password");
        return Err(invalid());
    }

    info!(user_id = %user.id, "user logged in");
    Ok(user)
}

/// Multipart profile form after parsing.
#[derive(Debug, Default)]
pub struct ProfileForm {
    pub name: Option<String>,
    pub bio: Option<String>,
    pub image: Option<UploadItem>,
}

pub async fn update_profile(
    state: &AppState,
    principal: &Principal,
    form: ProfileForm,
) -> Result<User, AppError> {
    let mut changes = ProfileChanges {
        name: present(form.name).map(|n| n.trim().to_string()),
        bio: form.bio.map(|b| b.trim().to_string()),
        profile_image: None,
    };
    if let Some(bio) = &changes.bio {
        if bio.chars().count() > MAX_BIO_LEN {
            return Err(AppError::validation(
                "Bio cannot be more than 200 characters",
            ));
        }
    }

    let stored = match form.image {
        Some(image) => Some(upload_profile_image(state, &principal.0, image).await?),
        None => None,
    };
    changes.profile_image = stored.as_ref().map(|img| img.url.clone());

    let updated = match state.users.update_profile(principal.id(), changes).await {
        Ok(Some(user)) => Ok(user),
        Ok(None) => Err(AppError::NotFound("User not found".into())),
        Err(e) => Err(AppError::Upstream(e)),
    };
    let user = match updated {
        Ok(user) => user,
        Err(e) => {
            // the row still points at the previous image, so only the new object goes
            if let Some(img) = &stored {
                discard_image(state, &img.key).await;
            }
            return Err(e);
        }
    };

    if stored.is_some() {
        if let Some(previous) = principal.0.profile_image.as_deref() {
            discard_image_url(state, previous).await;
        }
    }

    info!(user_id = %user.id, "profile updated");
    Ok(user)
}
