use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create all tables and indexes on an open pool. Idempotent.
pub async fn apply(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS forms (
            form_id TEXT PRIMARY KEY,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // One row per snapshot; version is the index in the history
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS versions (
            form_id TEXT NOT NULL,
            version INTEGER NOT NULL,
            schema_json TEXT NOT NULL,
            change_description TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            PRIMARY KEY (form_id, version),
            FOREIGN KEY (form_id) REFERENCES forms(form_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS responses (
            response_id TEXT PRIMARY KEY,
            form_id TEXT NOT NULL,
            submitted_at INTEGER NOT NULL,
            answers_json TEXT NOT NULL,
            FOREIGN KEY (form_id) REFERENCES forms(form_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_responses_form_id ON responses(form_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_forms_updated_at ON forms(updated_at DESC)")
        .execute(pool)
        .await?;

    Ok(())
}
