//! Civic portal REST API server
//!
//! ## Usage
//!
//! ```bash
//! DATABASE_URL=postgresql://localhost/civic_portal \
//! PROVIDER_SECRET_KEY=sk_test_... \
//!   cargo run --bin portal_server --features server
//!
//! curl http://localhost:3000/health
//! curl http://localhost:3000/api/categories
//! curl -X POST http://localhost:3000/api/auth/login \
//!   -H 'Content-Type: application/json' \
//!   -d '{"identifier": "admin@example.org", "password": "..."}'
//! curl -H "Authorization: Token <token>" http://localhost:3000/api/complaints
//! ```
//!
//! `PORTAL_BIND` overrides the listen address (default `127.0.0.1:3000`).
//! On a fresh database set `PORTAL_ADMIN_EMAIL` and `PORTAL_ADMIN_PASSWORD`
//! to create the first admin, then sign in through `POST /api/auth/login`.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use civic_portal::api::create_router;
use civic_portal::database::{DatabaseConfig, DatabaseManager};
use civic_portal::notifications::TracingSink;
use civic_portal::provider::CheckoutSessionsClient;
use civic_portal::store::PgStore;
use civic_portal::{AdminSeed, Portal, PortalConfig, ProviderConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("civic_portal=info,tower_http=debug")),
        )
        .init();

    let config = PortalConfig::from_env()?;
    let provider_config = ProviderConfig::from_env()?;
    let db_config = DatabaseConfig::from_env()?;

    let db = DatabaseManager::new(db_config)
        .await
        .context("Failed to connect to database")?;
    db.test_connection().await.context("Database health check failed")?;
    db.run_migrations().await.context("Failed to run migrations")?;

    let store = Arc::new(PgStore::new(db.pool().clone()));
    let provider = Arc::new(CheckoutSessionsClient::new(&provider_config)?);
    let portal = Arc::new(Portal::new(store, provider, Arc::new(TracingSink), config)?);

    match AdminSeed::from_env() {
        Some(seed) => {
            if let Some(registration) = portal.registration.bootstrap_admin(&seed).await? {
                info!(email = %seed.email, user_id = registration.user.id, "Created first admin");
            }
        }
        None => info!("No admin seed configured"),
    }

    let addr: SocketAddr = std::env::var("PORTAL_BIND")
        .unwrap_or_else(|_| "127.0.0.1:3000".to_string())
        .parse()
        .context("PORTAL_BIND must be host:port")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Portal server listening on http://{}", addr);

    axum::serve(listener, create_router(portal))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await?;

    db.close().await;
    Ok(())
}
