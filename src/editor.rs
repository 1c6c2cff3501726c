//! Edit/save/undo orchestration.
//!
//! [`FormEditor`] owns the per-form review state machine:
//!
//! ```text
//!            AI edit (non-empty diff)
//!   Clean ─────────────────────────────▶ PendingReview
//!     ▲  ◀── accept / undo / manual save ──┘
//!     └── manual save / undo (stay Clean)
//! ```
//!
//! Every mutating call runs inside a per-form exclusive scope taken with
//! `try_lock`: a second mutation arriving while one is in flight fails with
//! [`FormError::ReviewInProgress`] instead of queueing. Reads go straight to
//! the store, which swaps whole histories atomically.
//!
//! The scope only covers this editor. Writers in other processes (the CLI
//! next to a running server) are caught by the store: a save whose base is
//! no longer the stored head fails with `StaleHistory`, reported here as
//! [`FormError::ReviewInProgress`].

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use formflow_core::diff::{diff_schemas, Diff};
use formflow_core::error::{FormError, FormResult};
use formflow_core::history::VersionHistory;
use formflow_core::models::{Answers, Document, FormSchema};
use formflow_core::store::{FormResponse, FormStore, FormSummary, StaleHistory};
use formflow_core::validate::{
    sanitize_user_input, validate_answers, validate_documents, validate_schema,
};

use crate::generator::{fallback_schema, SchemaGenerator};

pub const MANUAL_SAVE_DESCRIPTION: &str = "Manual save";

/// Review state of one form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReviewState {
    #[default]
    Clean,
    /// An AI edit was committed and awaits accept or undo.
    PendingReview,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedForm {
    pub form_id: String,
    pub schema: FormSchema,
    pub version: usize,
}

/// Result of an AI edit. `diff` is `None` when the generator returned an
/// unchanged schema, in which case nothing was pushed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EditOutcome {
    pub schema: FormSchema,
    pub diff: Option<Diff>,
    pub version: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UndoOutcome {
    pub schema: FormSchema,
    pub version: usize,
}

/// A user-authored save.
///
/// `title` and `description` override the ones inside `schema`; when both
/// are absent or empty the form keeps its current metadata.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualSave {
    pub schema: FormSchema,
    #[serde(default)]
    pub change_description: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

type ReviewSlot = Arc<AsyncMutex<ReviewState>>;

/// Coordinates the generator, the version history, and the store.
pub struct FormEditor {
    store: Arc<dyn FormStore>,
    generator: Arc<dyn SchemaGenerator>,
    generation_timeout: Duration,
    slots: Mutex<HashMap<String, ReviewSlot>>,
}

impl FormEditor {
    pub fn new(
        store: Arc<dyn FormStore>,
        generator: Arc<dyn SchemaGenerator>,
        generation_timeout: Duration,
    ) -> Self {
        Self {
            store,
            generator,
            generation_timeout,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Generate a brand-new form and store it as version 0.
    ///
    /// A failed or timed-out generation does not fail the request: the form
    /// starts from [`fallback_schema`] instead.
    pub async fn create(&self, prompt: &str, documents: &[Document]) -> FormResult<CreatedForm> {
        let prompt = check_request(prompt, documents)?;

        let schema = match self
            .run_generation(self.generator.generate(&prompt, documents))
            .await
        {
            Ok(schema) => schema,
            Err(err) => {
                tracing::warn!(error = %err, "using fallback schema for new form");
                fallback_schema(&prompt)
            }
        };

        let form_id = uuid::Uuid::new_v4().to_string();
        let history = VersionHistory::create_initial(schema.clone());
        self.store
            .create_form(&form_id, &history)
            .await
            .map_err(FormError::persistence)?;

        tracing::info!(%form_id, components = schema.components.len(), "form created");
        Ok(CreatedForm {
            form_id,
            schema,
            version: history.version(),
        })
    }

    /// Ask the generator to revise the current schema and commit the result.
    pub async fn ai_edit(
        &self,
        form_id: &str,
        prompt: &str,
        documents: &[Document],
    ) -> FormResult<EditOutcome> {
        let prompt = check_request(prompt, documents)?;
        let (mut state, history) = self.lock_form(form_id).await?;

        if *state == ReviewState::PendingReview {
            return Err(FormError::ReviewInProgress);
        }

        let before = history.current();
        let after = self
            .run_generation(self.generator.edit_schema(before, &prompt, documents))
            .await?;

        let diff = diff_schemas(before, &after)?;
        if diff.is_empty() {
            tracing::info!(%form_id, "AI edit produced no changes");
            return Ok(EditOutcome {
                schema: before.clone(),
                diff: None,
                version: history.version(),
            });
        }

        let next = history.push(after, format!("AI edit: {}", diff.summary));
        self.commit(form_id, &history, &next).await?;
        *state = ReviewState::PendingReview;

        tracing::info!(%form_id, version = next.version(), summary = %diff.summary, "AI edit committed");
        Ok(EditOutcome {
            schema: next.current().clone(),
            diff: Some(diff),
            version: next.version(),
        })
    }

    /// Keep a pending AI edit. Returns whether a review was pending.
    ///
    /// The edit is already persisted, so this only clears the review state.
    pub async fn accept(&self, form_id: &str) -> FormResult<bool> {
        let (mut state, _) = self.lock_form(form_id).await?;
        let had_pending = *state == ReviewState::PendingReview;
        *state = ReviewState::Clean;
        tracing::debug!(%form_id, had_pending, "review accepted");
        Ok(had_pending)
    }

    /// Commit a user-authored schema as a new version.
    pub async fn save(&self, form_id: &str, request: ManualSave) -> FormResult<usize> {
        let (mut state, history) = self.lock_form(form_id).await?;
        let current = history.current();

        let mut schema = request.schema;
        schema.title = pick_metadata(request.title, schema.title, &current.title);
        schema.description =
            pick_metadata(request.description, schema.description, &current.description);
        validate_schema(&schema)?;

        let description = request
            .change_description
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| MANUAL_SAVE_DESCRIPTION.to_string());

        let next = history.push(schema, description);
        self.commit(form_id, &history, &next).await?;

        if *state == ReviewState::PendingReview {
            tracing::debug!(%form_id, "manual save accepted the pending AI edit");
        }
        *state = ReviewState::Clean;

        tracing::info!(%form_id, version = next.version(), "manual save committed");
        Ok(next.version())
    }

    /// Drop the latest version and restore the one before it.
    ///
    /// Fails with [`FormError::NoHistoryToUndo`] when only the initial
    /// version remains; nothing is written in that case.
    pub async fn undo(&self, form_id: &str) -> FormResult<UndoOutcome> {
        let (mut state, history) = self.lock_form(form_id).await?;

        let (previous, schema) = history.undo()?;
        self.commit(form_id, &history, &previous).await?;
        *state = ReviewState::Clean;

        tracing::info!(%form_id, version = previous.version(), "undo applied");
        Ok(UndoOutcome {
            schema,
            version: previous.version(),
        })
    }

    /// Delete a form with its history and responses.
    pub async fn delete(&self, form_id: &str) -> FormResult<()> {
        let (guard, _) = self.lock_form(form_id).await?;

        let existed = self
            .store
            .delete_form(form_id)
            .await
            .map_err(FormError::persistence)?;
        drop(guard);
        self.forget_slot(form_id);

        if !existed {
            return Err(FormError::NotFound(form_id.to_string()));
        }
        tracing::info!(%form_id, "form deleted");
        Ok(())
    }

    /// The stored history of a form.
    pub async fn history(&self, form_id: &str) -> FormResult<VersionHistory> {
        self.store
            .load_history(form_id)
            .await
            .map_err(FormError::persistence)?
            .ok_or_else(|| FormError::NotFound(form_id.to_string()))
    }

    /// Review state of a form, or `None` while a mutation is in flight.
    pub fn review_state(&self, form_id: &str) -> Option<ReviewState> {
        let slot = self.slots().get(form_id).cloned();
        match slot {
            Some(slot) => slot.try_lock().ok().map(|state| *state),
            None => Some(ReviewState::Clean),
        }
    }

    pub async fn list_forms(&self) -> FormResult<Vec<FormSummary>> {
        self.store.list_forms().await.map_err(FormError::persistence)
    }

    /// Validate answers against the current schema and store them.
    pub async fn submit_response(&self, form_id: &str, answers: &Answers) -> FormResult<String> {
        let history = self.history(form_id).await?;
        validate_answers(answers, history.current())?;

        let response_id = self
            .store
            .add_response(form_id, answers)
            .await
            .map_err(FormError::persistence)?;
        tracing::info!(%form_id, %response_id, "response stored");
        Ok(response_id)
    }

    pub async fn responses(&self, form_id: &str) -> FormResult<Vec<FormResponse>> {
        self.history(form_id).await?;
        self.store
            .list_responses(form_id)
            .await
            .map_err(FormError::persistence)
    }

    async fn run_generation<F>(&self, generation: F) -> FormResult<FormSchema>
    where
        F: Future<Output = anyhow::Result<FormSchema>>,
    {
        let schema = match tokio::time::timeout(self.generation_timeout, generation).await {
            Ok(Ok(schema)) => schema,
            Ok(Err(e)) => {
                let err = FormError::generation(e);
                tracing::warn!(generator = self.generator.name(), error = %err, "generation failed");
                return Err(err);
            }
            Err(_) => {
                tracing::warn!(generator = self.generator.name(), "generation timed out");
                return Err(FormError::GenerationFailed(format!(
                    "timed out after {}s",
                    self.generation_timeout.as_secs_f64()
                )));
            }
        };

        validate_schema(&schema)
            .map_err(|e| FormError::GenerationFailed(format!("generated schema rejected: {}", e)))?;
        Ok(schema)
    }

    /// Persist `next` in place of `base`.
    async fn commit(
        &self,
        form_id: &str,
        base: &VersionHistory,
        next: &VersionHistory,
    ) -> FormResult<()> {
        match self.store.save_history(form_id, base, next).await {
            Ok(()) => Ok(()),
            Err(e) if e.downcast_ref::<StaleHistory>().is_some() => {
                tracing::warn!(%form_id, "form changed underneath this edit; nothing saved");
                Err(FormError::ReviewInProgress)
            }
            Err(e) => Err(FormError::persistence(e)),
        }
    }

    /// The slot map. It only holds `Arc`s, so a panic elsewhere cannot leave
    /// it inconsistent and poisoning is cleared.
    fn slots(&self) -> MutexGuard<'_, HashMap<String, ReviewSlot>> {
        self.slots.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("review slot map was poisoned; recovering");
            self.slots.clear_poison();
            poisoned.into_inner()
        })
    }

    /// Enter the form's exclusive scope and load its history.
    async fn lock_form(
        &self,
        form_id: &str,
    ) -> FormResult<(OwnedMutexGuard<ReviewState>, VersionHistory)> {
        let slot = Arc::clone(self.slots().entry(form_id.to_string()).or_default());

        let guard = slot
            .try_lock_owned()
            .map_err(|_| FormError::ReviewInProgress)?;

        match self.store.load_history(form_id).await {
            Ok(Some(history)) => Ok((guard, history)),
            Ok(None) => {
                drop(guard);
                self.forget_slot(form_id);
                Err(FormError::NotFound(form_id.to_string()))
            }
            Err(e) => Err(FormError::persistence(e)),
        }
    }

    fn forget_slot(&self, form_id: &str) {
        let mut slots = self.slots();
        if slots
            .get(form_id)
            .is_some_and(|slot| Arc::strong_count(slot) == 1)
        {
            slots.remove(form_id);
        }
    }
}

/// Sanitise the prompt and check that the request carries some input.
fn check_request(prompt: &str, documents: &[Document]) -> FormResult<String> {
    validate_documents(documents)?;
    let prompt = sanitize_user_input(prompt);
    if prompt.is_empty() && documents.is_empty() {
        return Err(FormError::invalid_request(
            "Please provide a prompt or upload a document",
        ));
    }
    Ok(prompt)
}

fn pick_metadata(explicit: Option<String>, in_schema: String, current: &str) -> String {
    explicit
        .or_else(|| (!in_schema.is_empty()).then_some(in_schema))
        .unwrap_or_else(|| current.to_string())
}
