//! SQLite-backed [`FormStore`] implementation.
//!
//! Each snapshot of a form's history is one row in `versions`; saving a
//! history rewrites only the rows that differ from what is stored, inside a
//! single transaction. The save is refused with [`StaleHistory`] when the
//! stored head no longer matches the history the caller started from, so a
//! CLI undo and a server edit on the same database cannot lose each other's
//! writes.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

use formflow_core::history::{VersionHistory, VersionSnapshot};
use formflow_core::models::{Answers, FormSchema};
use formflow_core::store::{FormResponse, FormStore, FormSummary, StaleHistory};

/// SQLite implementation of the [`FormStore`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

/// One row of `versions`, as stored.
struct StoredVersion {
    schema_json: String,
    change_description: String,
    created_at: i64,
}

impl StoredVersion {
    fn matches(&self, snapshot: &VersionSnapshot) -> Result<bool> {
        Ok(self.change_description == snapshot.change_description
            && self.created_at == snapshot.created_at.timestamp_millis()
            && self.schema_json == serde_json::to_string(&snapshot.schema)?)
    }
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms).ok_or_else(|| anyhow!("invalid timestamp: {}", ms))
}

async fn form_exists<'e, E>(executor: E, form_id: &str) -> Result<bool>
where
    E: sqlx::SqliteExecutor<'e>,
{
    let row = sqlx::query("SELECT 1 FROM forms WHERE form_id = ?")
        .bind(form_id)
        .fetch_optional(executor)
        .await?;
    Ok(row.is_some())
}

#[async_trait]
impl FormStore for SqliteStore {
    async fn create_form(&self, form_id: &str, history: &VersionHistory) -> Result<()> {
        let now = Utc::now().timestamp_millis();
        let mut tx = self.pool.begin().await?;

        sqlx::query("INSERT INTO forms (form_id, created_at, updated_at) VALUES (?, ?, ?)")
            .bind(form_id)
            .bind(now)
            .bind(now)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("failed to create form {}", form_id))?;

        for (version, snapshot) in history.snapshots().into_iter().enumerate() {
            insert_version(&mut tx, form_id, version, snapshot).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn load_history(&self, form_id: &str) -> Result<Option<VersionHistory>> {
        if !form_exists(&self.pool, form_id).await? {
            return Ok(None);
        }

        let rows = sqlx::query(
            r#"
            SELECT schema_json, change_description, created_at
            FROM versions
            WHERE form_id = ?
            ORDER BY version ASC
            "#,
        )
        .bind(form_id)
        .fetch_all(&self.pool)
        .await?;

        let mut snapshots = Vec::with_capacity(rows.len());
        for row in rows {
            let schema_json: String = row.try_get("schema_json")?;
            let schema: FormSchema = serde_json::from_str(&schema_json)
                .with_context(|| format!("corrupt schema stored for form {}", form_id))?;
            snapshots.push(VersionSnapshot {
                schema,
                change_description: row.try_get("change_description")?,
                created_at: from_millis(row.try_get("created_at")?)?,
            });
        }

        let history = VersionHistory::from_snapshots(snapshots)
            .with_context(|| format!("form {} has no stored versions", form_id))?;
        Ok(Some(history))
    }

    async fn save_history(
        &self,
        form_id: &str,
        base: &VersionHistory,
        history: &VersionHistory,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        if !form_exists(&mut *tx, form_id).await? {
            bail!("form not found: {}", form_id);
        }

        let rows = sqlx::query(
            "SELECT schema_json, change_description, created_at FROM versions WHERE form_id = ? ORDER BY version ASC",
        )
        .bind(form_id)
        .fetch_all(&mut *tx)
        .await?;

        let mut stored = Vec::with_capacity(rows.len());
        for row in rows {
            stored.push(StoredVersion {
                schema_json: row.try_get("schema_json")?,
                change_description: row.try_get("change_description")?,
                created_at: row.try_get("created_at")?,
            });
        }

        let head_matches = match stored.last() {
            Some(head) => stored.len() == base.len() && head.matches(base.latest())?,
            None => false,
        };
        if !head_matches {
            tracing::debug!(%form_id, stored = stored.len(), base = base.len(), "stale history save refused");
            return Err(StaleHistory(form_id.to_string()).into());
        }

        let snapshots = history.snapshots();

        // First version whose stored row no longer matches the history
        let mut keep = 0;
        for (row, snapshot) in stored.iter().zip(snapshots.iter()) {
            if !row.matches(snapshot)? {
                break;
            }
            keep += 1;
        }

        sqlx::query("DELETE FROM versions WHERE form_id = ? AND version >= ?")
            .bind(form_id)
            .bind(keep as i64)
            .execute(&mut *tx)
            .await?;

        for (version, snapshot) in snapshots.into_iter().enumerate().skip(keep) {
            insert_version(&mut tx, form_id, version, snapshot).await?;
        }

        sqlx::query("UPDATE forms SET updated_at = ? WHERE form_id = ?")
            .bind(Utc::now().timestamp_millis())
            .bind(form_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn delete_form(&self, form_id: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM versions WHERE form_id = ?")
            .bind(form_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM responses WHERE form_id = ?")
            .bind(form_id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM forms WHERE form_id = ?")
            .bind(form_id)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("failed to delete form {}", form_id))?;

        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_forms(&self) -> Result<Vec<FormSummary>> {
        let rows = sqlx::query(
            r#"
            SELECT f.form_id, f.created_at, f.updated_at, v.version, v.schema_json,
                   (SELECT COUNT(*) FROM responses r WHERE r.form_id = f.form_id) AS response_count
            FROM forms f
            JOIN versions v ON v.form_id = f.form_id
             AND v.version = (SELECT MAX(version) FROM versions WHERE form_id = f.form_id)
            ORDER BY f.updated_at DESC, f.form_id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut summaries = Vec::with_capacity(rows.len());
        for row in rows {
            let form_id: String = row.try_get("form_id")?;
            let schema_json: String = row.try_get("schema_json")?;
            let schema: FormSchema = serde_json::from_str(&schema_json)
                .with_context(|| format!("corrupt schema stored for form {}", form_id))?;
            let version: i64 = row.try_get("version")?;
            let response_count: i64 = row.try_get("response_count")?;
            summaries.push(FormSummary {
                form_id,
                title: schema.title,
                description: schema.description,
                version: version as usize,
                created_at: from_millis(row.try_get("created_at")?)?,
                updated_at: from_millis(row.try_get("updated_at")?)?,
                response_count: response_count as usize,
            });
        }
        Ok(summaries)
    }

    async fn add_response(&self, form_id: &str, answers: &Answers) -> Result<String> {
        if !form_exists(&self.pool, form_id).await? {
            bail!("form not found: {}", form_id);
        }

        let response_id = uuid::Uuid::new_v4().to_string();
        sqlx::query(
            "INSERT INTO responses (response_id, form_id, submitted_at, answers_json) VALUES (?, ?, ?, ?)",
        )
        .bind(&response_id)
        .bind(form_id)
        .bind(Utc::now().timestamp_millis())
        .bind(serde_json::to_string(answers)?)
        .execute(&self.pool)
        .await?;

        Ok(response_id)
    }

    async fn list_responses(&self, form_id: &str) -> Result<Vec<FormResponse>> {
        if !form_exists(&self.pool, form_id).await? {
            bail!("form not found: {}", form_id);
        }

        let rows = sqlx::query(
            r#"
            SELECT response_id, submitted_at, answers_json
            FROM responses
            WHERE form_id = ?
            ORDER BY submitted_at ASC, rowid ASC
            "#,
        )
        .bind(form_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let answers_json: String = row.try_get("answers_json")?;
                Ok(FormResponse {
                    response_id: row.try_get("response_id")?,
                    submitted_at: from_millis(row.try_get("submitted_at")?)?,
                    answers: serde_json::from_str(&answers_json)?,
                })
            })
            .collect()
    }
}

async fn insert_version(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    form_id: &str,
    version: usize,
    snapshot: &VersionSnapshot,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO versions (form_id, version, schema_json, change_description, created_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(form_id)
    .bind(version as i64)
    .bind(serde_json::to_string(&snapshot.schema)?)
    .bind(&snapshot.change_description)
    .bind(snapshot.created_at.timestamp_millis())
    .execute(&mut **tx)
    .await?;
    Ok(())
}
