use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result, bail};
use tracing::warn;

/// Used when `JWT_SECRET` is unset. Fine for local development only.
pub const DEV_SECRET: &str = "dev-secret-change-me";

/// What to do with schema migrations at startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MigrationPolicy {
    /// Migrate; on failure log and keep serving in degraded mode.
    #[default]
    BestEffort,
    /// Migrate; on failure refuse to start.
    Strict,
    /// Do not touch the schema.
    Skip,
}

#[derive(Debug, thiserror::Error)]
#[error("unknown migration policy {0:?} (expected best-effort, strict or skip)")]
pub struct UnknownPolicy(String);

impl FromStr for MigrationPolicy {
    type Err = UnknownPolicy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "best-effort" => Ok(MigrationPolicy::BestEffort),
            "strict" => Ok(MigrationPolicy::Strict),
            "skip" => Ok(MigrationPolicy::Skip),
            other => Err(UnknownPolicy(other.to_string())),
        }
    }
}

/// Credentials for the admin account seeded at startup.
pub struct AdminSeed {
    pub username: String,
    pub password: String,
}

/// Process configuration, read once at startup.
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub upload_dir: PathBuf,
    pub host: String,
    pub port: u16,
    pub admin: Option<AdminSeed>,
    pub migration_policy: MigrationPolicy,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let Some(database_url) = get("DATABASE_URL") else {
            bail!("DATABASE_URL must be set");
        };

        let jwt_secret = get("JWT_SECRET").unwrap_or_else(|| {
            warn!("JWT_SECRET is not set, using the development placeholder");
            DEV_SECRET.to_string()
        });

        let upload_dir = get("UPLOAD_DIR").unwrap_or_else(|| "./uploads".into()).into();
        let host = get("HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port = match get("PORT") {
            Some(raw) => raw.trim().parse().with_context(|| format!("invalid PORT {:?}", raw))?,
            None => 8080,
        };

        let admin = match (get("ADMIN_USER"), get("ADMIN_PASS")) {
            (Some(username), Some(password)) => Some(AdminSeed { username, password }),
            _ => None,
        };

        let migration_policy = if get("SKIP_MIGRATE").as_deref() == Some("1") {
            MigrationPolicy::Skip
        } else {
            match get("MIGRATE_POLICY") {
                Some(raw) => raw.parse()?,
                None => MigrationPolicy::default(),
            }
        };

        Ok(Self {
            database_url,
            jwt_secret,
            upload_dir,
            host,
            port,
            admin,
            migration_policy,
        })
    }
}
