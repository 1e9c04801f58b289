use rideboard::api::routes::create_routes;
use rideboard::config::{run_migrations, AppConfig, DatabaseConfig};
use tokio::net::TcpListener;
use tracing::{info, instrument};

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let config = AppConfig::from_env()?;
    let db_config = DatabaseConfig::from_env()?;

    let pool = db_config.create_pool().await?;
    run_migrations(&pool).await?;

    // Create the application routes
    let app = create_routes(pool, &config.jwt_secret);

    // Start the server
    let address = config.server_address();
    let listener = TcpListener::bind(&address).await?;
    info!("Rideboard server starting on http://{}", address);
    info!("Health check available at http://{}/health", address);

    axum::serve(listener, app).await?;

    Ok(())
}
