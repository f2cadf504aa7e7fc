//! Relational store for checks, pings, flips, channels, and notifications.
//!
//! Backed by SeaORM over SQLite (WAL mode) or PostgreSQL; the schema is
//! managed by the `migration` crate. Multiple worker processes coordinate
//! through optimistic compare-and-set updates on single rows — there is no
//! shared in-memory state and no cross-row locking.

pub mod body;
pub mod entities;
pub mod store;

#[cfg(test)]
mod tests;

use anyhow::Result;
use migration::{Migrator, MigratorTrait};
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbBackend};

pub use body::BodyStore;
pub use store::{ChannelRow, CheckRow, FlipRow, NotificationRow, PingRow};

/// Unified access layer for the monitor database.
///
/// All methods are `async fn`; SQLite connections run in WAL mode so the
/// intake path and the alerting loop can read concurrently.
pub struct MonitorStore {
    pub(crate) db: DatabaseConnection,
}

impl MonitorStore {
    /// Connect and bring the schema up to date.
    pub async fn connect(url: &str) -> Result<Self> {
        Self::connect_with(url, 5).await
    }

    /// Connect with an explicit connection pool size (the `--pool` flag
    /// raises it for busy deployments).
    pub async fn connect_with(url: &str, max_connections: u32) -> Result<Self> {
        let mut opts = ConnectOptions::new(url);
        opts.max_connections(max_connections).sqlx_logging(false);
        let db = Database::connect(opts).await?;

        if db.get_database_backend() == DbBackend::Sqlite {
            db.execute_unprepared("PRAGMA journal_mode=WAL;").await?;
        }

        Migrator::up(&db, None).await?;
        Ok(Self { db })
    }
}
