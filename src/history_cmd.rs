//! `formflow history` and `formflow undo` against the configured database.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use formflow_core::error::FormError;
use formflow_core::history::VersionHistory;

use crate::config::Config;
use crate::db;
use crate::editor::FormEditor;
use crate::generator::DisabledGenerator;
use crate::migrate;
use crate::sqlite_store::SqliteStore;

async fn open_editor(config: &Config) -> Result<FormEditor> {
    let pool = db::connect(config).await?;
    migrate::apply(&pool).await?;
    Ok(FormEditor::new(
        Arc::new(SqliteStore::new(pool)),
        Arc::new(DisabledGenerator),
        Duration::from_secs(config.generator.timeout_secs),
    ))
}

/// Print every version of a form, oldest first.
pub async fn run_history(config: &Config, form_id: &str) -> Result<()> {
    let editor = open_editor(config).await?;
    let history = editor.history(form_id).await?;
    print!("{}", render_history(form_id, &history));
    Ok(())
}

pub fn render_history(form_id: &str, history: &VersionHistory) -> String {
    let mut out = format!(
        "Form {} ({} version(s), current v{})\n",
        form_id,
        history.len(),
        history.version()
    );
    for (version, snapshot) in history.snapshots().into_iter().enumerate() {
        out.push_str(&format!(
            "  v{:<3} {}  {:>2} component(s)  {}\n",
            version,
            snapshot.created_at.format("%Y-%m-%d %H:%M:%S"),
            snapshot.schema.components.len(),
            snapshot.change_description
        ));
    }
    out
}

/// Revert a form to its previous version.
pub async fn run_undo(config: &Config, form_id: &str) -> Result<()> {
    let editor = open_editor(config).await?;
    match editor.undo(form_id).await {
        Ok(outcome) => {
            println!(
                "Reverted {} to v{} ({}).",
                form_id, outcome.version, outcome.schema.title
            );
            Ok(())
        }
        Err(FormError::NoHistoryToUndo) => {
            println!("Nothing to undo: {}", FormError::NoHistoryToUndo);
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
