//! SQLite connection setup and schema migrations.

use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use std::{path::Path, str::FromStr};
use tracing::debug;

const INIT_MIGRATION: &str = include_str!("../migrations/0001_init.sql");

/// Open a pool on `database_url`, creating the database file and its parent
/// directory when missing, then apply the embedded migrations.
pub async fn connect(database_url: &str) -> Result<SqlitePool, sqlx::Error> {
    debug!("connecting using raw URL => {}", database_url);

    if !database_url.contains(":memory:") {
        let db_path = database_url
            .trim_start_matches("sqlite://")
            .trim_start_matches("sqlite:")
            .trim_start_matches("file:");
        let db_path = db_path.split('?').next().unwrap_or(db_path);
        if let Some(parent) = Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
                debug!("created missing directory {:?}", parent);
            }
        }
    }

    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    run_migrations(&pool).await?;
    Ok(pool)
}

/// Run the embedded SQL statements. Every statement is idempotent.
async fn run_migrations(db: &SqlitePool) -> Result<(), sqlx::Error> {
    let statements = INIT_MIGRATION
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>();

    debug!("running {} migration statements", statements.len());

    for stmt in statements {
        sqlx::query(stmt).execute(db).await?;
    }

    Ok(())
}
