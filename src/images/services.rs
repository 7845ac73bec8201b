use bytes::Bytes;
use tracing::{error, warn};
use uuid::Uuid;

use crate::{auth::repo_types::User, error::AppError, state::AppState};

pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

#[derive(Debug)]
pub struct UploadItem {
    pub body: Bytes,
    pub content_type: String,
}

/// A freshly stored profile picture.
#[derive(Debug)]
pub struct StoredImage {
    pub key: String,
    pub url: String,
}

/// Stores a new profile picture. Nothing already in the bucket is touched:
/// the caller decides whether the new object stays and the old one goes.
pub async fn upload_profile_image(
    st: &AppState,
    user: &User,
    image: UploadItem,
) -> Result<StoredImage, AppError> {
    let Some(ext) = ext_from_mime(&image.content_type) else {
        return Err(AppError::validation(
            "Profile image must be a JPEG, PNG, WebP, GIF or HEIC file",
        ));
    };
    if image.body.len() > MAX_IMAGE_BYTES {
        return Err(AppError::validation("Profile image must be 5MB or smaller"));
    }

    let key = format!("profiles/{}/{}.{}", user.id, Uuid::new_v4(), ext);
    if let Err(e) = st
        .storage
        .put_object(&key, image.body, &image.content_type)
        .await
    {
        error!(error = ?e, user_id = %user.id, %key, "profile image upload failed");
        return Err(AppError::validation("Failed to upload image"));
    }

    let url = st.storage.object_url(&key);
    Ok(StoredImage { key, url })
}

/// Best-effort delete. Failures are logged and swallowed.
pub async fn discard_image(st: &AppState, key: &str) {
    if let Err(e) = st.storage.delete_object(key).await {
        warn!(error = ?e, %key, "failed to delete profile image");
    }
}

/// Deletes the object behind a previously stored profile URL. URLs outside
/// our bucket are left alone.
pub async fn discard_image_url(st: &AppState, url: &str) {
    if let Some(key) = st.storage.key_for_url(url) {
        discard_image(st, &key).await;
    }
}

fn ext_from_mime(ct: &str) -> Option<&'static str> {
    match ct {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        "image/gif" => Some("gif"),
        "image/heic" => Some("heic"),
        _ => None,
    }
}
