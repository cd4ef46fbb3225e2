//! pkgindex - Main Entry Point

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pkgindex::{
    api,
    cli::{self, Cli, Command},
    config::Config,
    db,
    error::Result,
    storage::filesystem::FilesystemStore,
    storage::ArtifactStore,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pkgindex=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Cli::parse();

    // Load configuration
    let config = Config::from_env()?;

    // Connect to database
    let db_pool = db::create_pool(&config.database_url).await?;
    tracing::info!("Connected to database");

    // Run migrations
    sqlx::migrate!("./migrations").run(&db_pool).await?;
    tracing::info!("Database migrations complete");

    let store: Arc<dyn ArtifactStore> = Arc::new(FilesystemStore::new(&config.storage_path));

    match args.command {
        None | Some(Command::Serve) => serve(config, db_pool, store).await,
        Some(Command::Import(import_args)) => cli::import::run(db_pool, store, import_args).await,
        Some(Command::Verify) => cli::verify::run(db_pool, store).await,
    }
}

async fn serve(
    config: Config,
    db_pool: sqlx::PgPool,
    store: Arc<dyn ArtifactStore>,
) -> Result<()> {
    tracing::info!("Starting pkgindex");

    let state = Arc::new(api::AppState::new(config.clone(), db_pool, store));

    let app = api::routes::create_router(state).layer(TraceLayer::new_for_http());

    let addr: SocketAddr = config.bind_address.parse()?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
