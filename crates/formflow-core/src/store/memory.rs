//! In-memory [`FormStore`] implementation for tests and ephemeral servers.
//!
//! Uses a `HashMap` behind `std::sync::RwLock`. Histories are cheap to
//! clone, so reads hand out copies and never hold the lock across an await.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::history::VersionHistory;
use crate::models::Answers;

use super::{same_head, FormResponse, FormStore, FormSummary, StaleHistory};

struct StoredForm {
    history: VersionHistory,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    responses: Vec<FormResponse>,
}

/// In-memory store.
pub struct InMemoryStore {
    forms: RwLock<HashMap<String, StoredForm>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            forms: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned<T>(_: T) -> anyhow::Error {
    anyhow!("in-memory store lock poisoned")
}

#[async_trait]
impl FormStore for InMemoryStore {
    async fn create_form(&self, form_id: &str, history: &VersionHistory) -> Result<()> {
        let mut forms = self.forms.write().map_err(poisoned)?;
        if forms.contains_key(form_id) {
            bail!("form already exists: {}", form_id);
        }
        let now = Utc::now();
        forms.insert(
            form_id.to_string(),
            StoredForm {
                history: history.clone(),
                created_at: now,
                updated_at: now,
                responses: Vec::new(),
            },
        );
        Ok(())
    }

    async fn load_history(&self, form_id: &str) -> Result<Option<VersionHistory>> {
        let forms = self.forms.read().map_err(poisoned)?;
        Ok(forms.get(form_id).map(|f| f.history.clone()))
    }

    async fn save_history(
        &self,
        form_id: &str,
        base: &VersionHistory,
        history: &VersionHistory,
    ) -> Result<()> {
        let mut forms = self.forms.write().map_err(poisoned)?;
        let stored = forms
            .get_mut(form_id)
            .ok_or_else(|| anyhow!("form not found: {}", form_id))?;
        if !same_head(&stored.history, base) {
            return Err(StaleHistory(form_id.to_string()).into());
        }
        stored.history = history.clone();
        stored.updated_at = Utc::now();
        Ok(())
    }

    async fn delete_form(&self, form_id: &str) -> Result<bool> {
        let mut forms = self.forms.write().map_err(poisoned)?;
        Ok(forms.remove(form_id).is_some())
    }

    async fn list_forms(&self) -> Result<Vec<FormSummary>> {
        let forms = self.forms.read().map_err(poisoned)?;
        let mut summaries: Vec<FormSummary> = forms
            .iter()
            .map(|(id, f)| {
                let current = f.history.current();
                FormSummary {
                    form_id: id.clone(),
                    title: current.title.clone(),
                    description: current.description.clone(),
                    version: f.history.version(),
                    created_at: f.created_at,
                    updated_at: f.updated_at,
                    response_count: f.responses.len(),
                }
            })
            .collect();
        summaries.sort_by(|a, b| {
            b.updated_at
                .cmp(&a.updated_at)
                .then_with(|| a.form_id.cmp(&b.form_id))
        });
        Ok(summaries)
    }

    async fn add_response(&self, form_id: &str, answers: &Answers) -> Result<String> {
        let mut forms = self.forms.write().map_err(poisoned)?;
        let stored = forms
            .get_mut(form_id)
            .ok_or_else(|| anyhow!("form not found: {}", form_id))?;
        let response_id = uuid::Uuid::new_v4().to_string();
        stored.responses.push(FormResponse {
            response_id: response_id.clone(),
            submitted_at: Utc::now(),
            answers: answers.clone(),
        });
        Ok(response_id)
    }

    async fn list_responses(&self, form_id: &str) -> Result<Vec<FormResponse>> {
        let forms = self.forms.read().map_err(poisoned)?;
        forms
            .get(form_id)
            .map(|f| f.responses.clone())
            .ok_or_else(|| anyhow!("form not found: {}", form_id))
    }
}
