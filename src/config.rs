use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub jwt: JwtConfig,
    /// Sets the `Secure` flag on the session cookie.
    pub cookie_secure: bool,
    pub minio_endpoint: String,
    pub minio_bucket: String,
    pub minio_access_key: String,
    pub minio_secret_key: String,
    pub minio_region: String,
    pub minio_public_url: String,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key/value source.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let required = |key: &str| get(key).with_context(|| format!("{key} must be set"));

        let secret = required("JWT_SECRET")?;
        if secret.trim().is_empty() {
            anyhow::bail!("JWT_SECRET must not be empty");
        }
        let jwt = JwtConfig {
            secret,
            issuer: get("JWT_ISSUER").unwrap_or_else(|| "todo-api".into()),
            audience: get("JWT_AUDIENCE").unwrap_or_else(|| "todo-users".into()),
        };

        let minio_endpoint = required("MINIO_ENDPOINT")?;
        Ok(Self {
            database_url: required("DATABASE_URL")?,
            jwt,
            cookie_secure: get("APP_ENV").as_deref() == Some("production"),
            minio_public_url: get("MINIO_PUBLIC_URL").unwrap_or_else(|| minio_endpoint.clone()),
            minio_endpoint,
            minio_bucket: required("MINIO_BUCKET")?,
            minio_access_key: required("MINIO_ACCESS_KEY")?,
            minio_secret_key: required("MINIO_SECRET_KEY")?,
            minio_region: get("MINIO_REGION").unwrap_or_else(|| "us-east-1".into()),
        })
    }
}
