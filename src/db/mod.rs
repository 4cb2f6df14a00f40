//! SQLite database module for buddy list storage
//!
//! ## Tables
//!
//! - `buddy_lists` - One row per (tenant, character), holding capacity
//! - `buddies` - Directed edges from a list to a target character
//!
//! All mutating operations run inside [`BuddyDb::transaction`], which takes the
//! SQLite write lock up front (`BEGIN IMMEDIATE`). Concurrent commands touching
//! the same lists are therefore serialized and each sees the other's committed
//! writes.

pub mod context;
pub mod diesel_schema;
pub mod lists;
pub mod models;
pub mod schema;

pub use context::TenantContext;

use std::path::Path;

use diesel::connection::SimpleConnection;
use diesel::r2d2::{ConnectionManager, CustomizeConnection, Pool, PooledConnection};
use diesel::sqlite::SqliteConnection;
use tracing::{debug, info};

use crate::error::BuddyError;

/// Type alias for the connection pool
pub type DbPool = Pool<ConnectionManager<SqliteConnection>>;

/// Type alias for a pooled connection
pub type PooledConn = PooledConnection<ConnectionManager<SqliteConnection>>;

/// Per-connection PRAGMAs applied whenever the pool opens a connection
#[derive(Debug, Clone, Copy)]
struct ConnectionOptions {
    wal: bool,
    busy_timeout_ms: u32,
}

impl CustomizeConnection<SqliteConnection, diesel::r2d2::Error> for ConnectionOptions {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> Result<(), diesel::r2d2::Error> {
        let mut pragmas = format!(
            "PRAGMA foreign_keys = ON; PRAGMA busy_timeout = {};",
            self.busy_timeout_ms
        );
        if self.wal {
            pragmas.push_str(" PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;");
        }
        conn.batch_execute(&pragmas)
            .map_err(diesel::r2d2::Error::QueryError)
    }
}

/// SQLite database for buddy lists
#[derive(Clone)]
pub struct BuddyDb {
    pool: DbPool,
}

impl BuddyDb {
    /// Open or create the buddy list database at `path`
    pub fn open(path: &Path, pool_size: u32) -> Result<Self, BuddyError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        info!("Opening SQLite database at {:?}", path);

        let manager = ConnectionManager::<SqliteConnection>::new(path.to_string_lossy());
        let pool = Pool::builder()
            .max_size(pool_size.max(1))
            .connection_customizer(Box::new(ConnectionOptions {
                wal: true,
                busy_timeout_ms: 5_000,
            }))
            .build(manager)
            .map_err(|e| BuddyError::Pool(format!("Failed to build pool: {}", e)))?;

        let db = Self { pool };
        db.init_schema()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing)
    ///
    /// Every `:memory:` connection is a separate database, so the pool is
    /// limited to a single connection.
    pub fn open_in_memory() -> Result<Self, BuddyError> {
        debug!("Opening in-memory SQLite database");

        let manager = ConnectionManager::<SqliteConnection>::new(":memory:");
        let pool = Pool::builder()
            .max_size(1)
            .connection_customizer(Box::new(ConnectionOptions {
                wal: false,
                busy_timeout_ms: 0,
            }))
            .build(manager)
            .map_err(|e| BuddyError::Pool(format!("Failed to build in-memory pool: {}", e)))?;

        let db = Self { pool };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> Result<(), BuddyError> {
        let mut conn = self.conn()?;
        schema::init_schema(&mut conn)
    }

    /// Get a connection from the pool
    pub fn conn(&self) -> Result<PooledConn, BuddyError> {
        self.pool
            .get()
            .map_err(|e| BuddyError::Pool(format!("Failed to get connection: {}", e)))
    }

    /// Run `f` inside an immediate transaction
    ///
    /// Commits when `f` returns `Ok`, rolls back on `Err`.
    pub fn transaction<T, F>(&self, f: F) -> Result<T, BuddyError>
    where
        F: FnOnce(&mut SqliteConnection) -> Result<T, BuddyError>,
    {
        let mut conn = self.conn()?;
        conn.immediate_transaction(f)
    }

    /// Run a read-only closure outside of an explicit transaction
    pub fn with_conn<T, F>(&self, f: F) -> Result<T, BuddyError>
    where
        F: FnOnce(&mut SqliteConnection) -> Result<T, BuddyError>,
    {
        let mut conn = self.conn()?;
        f(&mut conn)
    }

    /// Get database statistics across all tenants
    pub fn stats(&self) -> Result<DbStats, BuddyError> {
        self.with_conn(|conn| lists::stats(conn, None))
    }
}

/// Database statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct DbStats {
    pub list_count: u64,
    pub buddy_count: u64,
    pub pending_count: u64,
}
