use crate::auth::{jwt::TokenCodec, repo::{PgUserStore, UserStore}};
use crate::config::AppConfig;
use crate::storage::{Storage, StorageClient};
use crate::todos::repo::{PgTodoStore, TodoStore};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub tokens: TokenCodec,
    pub users: Arc<dyn UserStore>,
    pub todos: Arc<dyn TodoStore>,
    pub storage: Arc<dyn StorageClient>,
}

impl AppState {
    pub async fn init(config: AppConfig) -> anyhow::Result<Self> {
        let config = Arc::new(config);
        let tokens = TokenCodec::new(&config.jwt)?;

        let db = crate::db::connect(&config).await?;

        // S3/MinIO
        let storage = Arc::new(Storage::from_config(&config).await?) as Arc<dyn StorageClient>;

        Ok(Self {
            tokens,
            users: Arc::new(PgUserStore::new(db.clone())),
            todos: Arc::new(PgTodoStore::new(db)),
            storage,
            config,
        })
    }
}
