//! Persistence abstraction for FormFlow.
//!
//! The [`FormStore`] trait covers everything the editor and the response
//! collector need from a backend: per-form version histories, form
//! listings, and submitted responses. Implementations must be
//! `Send + Sync` to work with async runtimes.
//!
//! Histories are swapped whole: [`save_history`](FormStore::save_history)
//! replaces the stored history with the given value atomically, so readers
//! never observe a half-applied push or undo. The swap only happens when
//! the stored head is still the one the caller loaded; otherwise it fails
//! with [`StaleHistory`]. This keeps writers in different processes from
//! silently overwriting each other.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::history::VersionHistory;
use crate::models::Answers;

/// The stored history moved on since the caller loaded it.
///
/// Returned inside the `anyhow::Error` of
/// [`save_history`](FormStore::save_history); callers detect it with
/// `downcast_ref`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("form {0} was modified by another writer")]
pub struct StaleHistory(pub String);

/// Whether `stored` still has the same head as `base`.
fn same_head(stored: &VersionHistory, base: &VersionHistory) -> bool {
    stored.version() == base.version() && stored.latest() == base.latest()
}

/// Listing entry for one form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormSummary {
    pub form_id: String,
    pub title: String,
    pub description: String,
    /// Index of the current version.
    pub version: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub response_count: usize,
}

/// One submitted set of answers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormResponse {
    pub response_id: String,
    pub submitted_at: DateTime<Utc>,
    pub answers: Answers,
}

/// Abstract storage backend.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`create_form`](FormStore::create_form) | Register a new form with its initial history |
/// | [`load_history`](FormStore::load_history) | Fetch a form's history |
/// | [`save_history`](FormStore::save_history) | Replace a form's history (compare-and-swap) |
/// | [`delete_form`](FormStore::delete_form) | Remove a form with its versions and responses |
/// | [`list_forms`](FormStore::list_forms) | Summaries, most recently updated first |
/// | [`add_response`](FormStore::add_response) | Store a response, returning its id |
/// | [`list_responses`](FormStore::list_responses) | Responses in submission order |
#[async_trait]
pub trait FormStore: Send + Sync {
    /// Register a new form. Fails if `form_id` already exists.
    async fn create_form(&self, form_id: &str, history: &VersionHistory) -> Result<()>;

    /// Fetch a form's history; `None` when the form does not exist.
    async fn load_history(&self, form_id: &str) -> Result<Option<VersionHistory>>;

    /// Replace a form's history with `history`, provided the stored head is
    /// still the head of `base`. Fails with [`StaleHistory`] otherwise, and
    /// fails if the form does not exist.
    async fn save_history(
        &self,
        form_id: &str,
        base: &VersionHistory,
        history: &VersionHistory,
    ) -> Result<()>;

    /// Delete a form, its versions, and its responses. Returns whether the
    /// form existed.
    async fn delete_form(&self, form_id: &str) -> Result<bool>;

    async fn list_forms(&self) -> Result<Vec<FormSummary>>;

    /// Store a response for an existing form.
    async fn add_response(&self, form_id: &str, answers: &Answers) -> Result<String>;

    async fn list_responses(&self, form_id: &str) -> Result<Vec<FormResponse>>;
}
