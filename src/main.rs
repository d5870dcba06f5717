use library_lending::{
    adapters::{memory::InMemoryStore, postgres::PostgresUnitOfWork},
    api::{handlers::AppState, router::create_router},
    application::lending::ServiceDependencies,
    config::{AppConfig, StorageBackend},
    ports::UnitOfWork,
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "library_lending=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;

    // Initialize the store
    let unit_of_work: Arc<dyn UnitOfWork> = match config.backend {
        StorageBackend::Postgres => {
            let pool = PgPoolOptions::new()
                .max_connections(config.database.max_connections)
                .acquire_timeout(config.database.acquire_timeout)
                .connect(&config.database.url)
                .await?;
            tracing::info!("Connected to database");

            sqlx::migrate!("./migrations").run(&pool).await?;
            tracing::info!("Database migrations applied");

            Arc::new(PostgresUnitOfWork::new(pool))
        }
        StorageBackend::Memory => {
            tracing::warn!("Using the in-memory store, data is lost on restart");
            Arc::new(InMemoryStore::new())
        }
    };

    // Create service dependencies
    let service_deps = ServiceDependencies::new(unit_of_work, config.lending);

    // Create application state
    let app_state = Arc::new(AppState { service_deps });

    // Create router
    let app = create_router(app_state);

    // Server configuration
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!(
        %addr,
        backend = ?config.backend,
        max_attempts = config.lending.retry.max_attempts,
        "Server listening"
    );

    // Start server
    axum::serve(listener, app).await?;
    Ok(())
}
