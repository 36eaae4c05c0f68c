use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use common::database::{DatabaseConfig, health_check, init_pool, run_migrations};
use permissions::{
    config::{Settings, StoreKind},
    repositories::{
        InMemoryPermissionsRepository, PermissionsRepository, PostgresPermissionsRepository,
        postgres::MIGRATOR,
    },
    routes,
    state::AppState,
};
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting permission service");

    let settings = Settings::from_env()?;

    let repository: Arc<dyn PermissionsRepository> = match settings.store {
        StoreKind::Postgres => {
            let db_config = DatabaseConfig::from_env()?;
            let pool = init_pool(&db_config).await?;

            if health_check(&pool).await? {
                info!("Database connection successful");
            } else {
                anyhow::bail!("Failed to connect to database");
            }

            run_migrations(&pool, &MIGRATOR).await?;
            Arc::new(PostgresPermissionsRepository::new(pool))
        }
        StoreKind::Memory => {
            warn!("Using the in-memory permission store; nothing will be persisted");
            Arc::new(InMemoryPermissionsRepository::new())
        }
    };

    if settings.bypass_permissions {
        warn!("Permission bypass enabled; every permission check will be allowed");
    }

    let app_state = AppState::new(repository, &settings)?;
    let app = routes::create_router(app_state);

    let listener = TcpListener::bind(&settings.listen_addr).await?;
    info!("Permission service listening on {}", settings.listen_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
