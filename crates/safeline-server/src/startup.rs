use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::{error, info};

use safeline_api::auth::ensure_admin_exists;
use safeline_db::Database;

use crate::config::{AdminSeed, MigrationPolicy};

/// Run migrations according to `policy`. Only `Strict` turns a failure into
/// a startup error; `BestEffort` keeps the process up without a verified schema.
pub fn apply_migrations(db: &Database, policy: MigrationPolicy) -> Result<()> {
    match policy {
        MigrationPolicy::Skip => {
            info!("Migration policy is skip, leaving schema untouched");
            Ok(())
        }
        MigrationPolicy::Strict => db.migrate().context("database migration failed"),
        MigrationPolicy::BestEffort => {
            if let Err(e) = db.migrate() {
                error!(
                    "Database migration failed, continuing in degraded mode (set MIGRATE_POLICY=strict to refuse to start): {:#}",
                    e
                );
            }
            Ok(())
        }
    }
}

/// Seeding problems are logged; they never stop the server.
pub fn seed_admin(db: &Database, seed: &AdminSeed) {
    match ensure_admin_exists(db, &seed.username, &seed.password) {
        Ok(true) => {}
        Ok(false) => info!("Admin account already present, skipping seed"),
        Err(e) => error!("Failed to ensure admin user: {:#}", e),
    }
}

/// Bind the HTTP listener. `host` may be a hostname, an IPv4 address or a
/// bare IPv6 address.
pub async fn bind_listener(host: &str, port: u16) -> Result<TcpListener> {
    TcpListener::bind((host, port))
        .await
        .with_context(|| format!("failed to bind {}:{}", host, port))
}
