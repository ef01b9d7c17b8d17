use log::info;
use sqlx::SqlitePool;

/// Embedded migration scripts, applied in order. Every script must be idempotent.
const MIGRATIONS: &[(&str, &str)] = &[(
    "001_create_potholes.sql",
    include_str!("sql/001_create_potholes.sql"),
)];

pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    for (name, sql) in MIGRATIONS {
        execute_migration(pool, sql).await?;
        info!("Applied migration: {}", name);
    }

    Ok(())
}

async fn execute_migration(pool: &SqlitePool, sql: &str) -> Result<(), sqlx::Error> {
    sqlx::raw_sql(sql).execute(pool).await?;
    Ok(())
}
