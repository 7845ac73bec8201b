mod app;
mod auth;
mod config;
mod db;
mod error;
mod images;
mod state;
mod storage;
#[cfg(test)]
mod testing;
mod todos;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "todo_api=debug,axum=info,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    // A missing JWT_SECRET or DATABASE_URL stops the process here.
    let config = config::AppConfig::from_env()?;
    let app_state = state::AppState::init(config).await?;

    app::serve(app::build_app(app_state)).await
}
