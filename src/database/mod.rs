pub mod models;
pub mod schema;

use diesel::connection::SimpleConnection;
use diesel::r2d2::{self, ConnectionManager};
use diesel::sqlite::SqliteConnection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

pub type DbPool = r2d2::Pool<ConnectionManager<SqliteConnection>>;

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("database initialization error: {0}")]
    Init(String),

    #[error("database migration error: {0}")]
    Migration(String),

    #[error("connection pool error: {0}")]
    Pool(#[from] diesel::r2d2::Error),

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("diesel error: {0}")]
    Diesel(#[from] diesel::result::Error),
}

/// Connection customizer that enables WAL journaling and foreign keys on
/// every pooled connection, matching the teacher's single-writer bring-up.
#[derive(Debug)]
struct ConnectionOptions;

impl diesel::r2d2::CustomizeConnection<SqliteConnection, diesel::r2d2::Error> for ConnectionOptions {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> Result<(), diesel::r2d2::Error> {
        conn.batch_execute("PRAGMA journal_mode = WAL; PRAGMA foreign_keys = ON; PRAGMA busy_timeout = 5000;")
            .map_err(diesel::r2d2::Error::QueryError)
    }
}

/// Bring up the connection pool at `db_path` and run pending migrations.
pub fn init(db_path: &str, pool_size: u32) -> Result<DbPool, DbError> {
    tracing::info!(path = %db_path, "initializing store");

    let manager = ConnectionManager::<SqliteConnection>::new(db_path);
    let pool = r2d2::Pool::builder()
        .max_size(pool_size)
        .connection_customizer(Box::new(ConnectionOptions))
        .build(manager)
        .map_err(|e| DbError::Init(format!("failed to create connection pool: {e}")))?;

    let mut conn = pool
        .get()
        .map_err(|e| DbError::Init(format!("failed to get database connection: {e}")))?;
    conn.run_pending_migrations(MIGRATIONS)
        .map_err(|e| DbError::Migration(e.to_string()))?;

    tracing::info!("store initialized");
    Ok(pool)
}
