//! Schema generator abstraction and implementations.
//!
//! Defines the [`SchemaGenerator`] trait and its concrete providers:
//! - **[`DisabledGenerator`]** fails every request; used when no LLM is configured.
//! - **[`OpenAiGenerator`]** calls an OpenAI-compatible chat-completions API.
//!
//! Use [`create_generator`] to pick a provider from configuration.
//!
//! # Output handling
//!
//! Model output is free text. [`extract_json`] pulls the schema out of the
//! first fenced ```` ```json ```` block, falling back to the outermost
//! `{...}` span. [`normalize_schema`] then fills in the keys the model left
//! out, so a sloppy but recognisable answer still becomes a usable
//! [`FormSchema`]. Keys that are present are left alone: a component the
//! model echoes back unchanged must not show up in the diff.
//!
//! When creating a form and the model is unavailable, the editor falls back
//! to [`fallback_schema`].
//!
//! # Retry Strategy
//!
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use base64::Engine;
use serde_json::{json, Map, Value};

use formflow_core::models::{ComponentData, ComponentType, Document, FormComponent, FormSchema};
use formflow_core::validate::MAX_OPTIONS;

use crate::config::GeneratorConfig;

pub const DEFAULT_TITLE: &str = "Untitled Form";
pub const DEFAULT_QUESTION: &str = "Question";
pub const FALLBACK_TITLE: &str = "New Form";
pub const FALLBACK_QUESTION: &str = "Please describe your request";

/// Produces form schemas from natural-language requests.
#[async_trait]
pub trait SchemaGenerator: Send + Sync {
    /// Provider name for logs (e.g. `"openai"`).
    fn name(&self) -> &str;

    /// Build a fresh schema for `prompt`.
    async fn generate(&self, prompt: &str, documents: &[Document]) -> Result<FormSchema>;

    /// Produce an updated version of `current` following `prompt`.
    async fn edit_schema(
        &self,
        current: &FormSchema,
        prompt: &str,
        documents: &[Document],
    ) -> Result<FormSchema>;
}

/// Build the generator selected by `config.provider`.
pub fn create_generator(config: &GeneratorConfig) -> Result<Arc<dyn SchemaGenerator>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledGenerator)),
        "openai" => Ok(Arc::new(OpenAiGenerator::new(config)?)),
        other => bail!("Unknown generator provider: '{}'", other),
    }
}

// ============ Disabled Provider ============

/// A generator that always fails.
pub struct DisabledGenerator;

#[async_trait]
impl SchemaGenerator for DisabledGenerator {
    fn name(&self) -> &str {
        "disabled"
    }

    async fn generate(&self, _prompt: &str, _documents: &[Document]) -> Result<FormSchema> {
        bail!("generator provider is disabled")
    }

    async fn edit_schema(
        &self,
        _current: &FormSchema,
        _prompt: &str,
        _documents: &[Document],
    ) -> Result<FormSchema> {
        bail!("generator provider is disabled")
    }
}

// ============ OpenAI Provider ============

const SYSTEM_PROMPT: &str = r#"You are a form builder assistant. You design form schemas as JSON.

SCHEMA FORMAT:
- A form has: title (string), description (string), components (array)
- Each component has: id (unique string starting with "comp_"), type ("multiple-choice" | "short-answer"), data (object)
- Multiple-choice data: question (string), options (2 to 4 strings), required (boolean), allowMultiple (boolean)
- Short-answer data: question (string), required (boolean), optional maxLength (integer)

Return ONLY valid JSON in this exact format:
{
  "title": "Form Title",
  "description": "Brief description",
  "components": [
    {
      "id": "comp_1",
      "type": "multiple-choice",
      "data": {
        "question": "Question text",
        "options": ["Option 1", "Option 2", "Option 3"],
        "required": true,
        "allowMultiple": false
      }
    }
  ]
}"#;

const EDIT_RULES: &str = "RULES:
- Preserve existing component IDs unless a component is explicitly replaced
- Generate new unique IDs for new components
- Return the complete updated schema";

/// Generator backed by an OpenAI-compatible `POST /chat/completions` endpoint.
///
/// The API key is read from the environment variable named by
/// `generator.api_key_env` when the provider is constructed.
pub struct OpenAiGenerator {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
    temperature: f32,
    max_retries: u32,
}

impl OpenAiGenerator {
    pub fn new(config: &GeneratorConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow!("generator.model required for OpenAI provider"))?;

        let api_key = std::env::var(&config.api_key_env)
            .map_err(|_| anyhow!("{} environment variable not set", config.api_key_env))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            model,
            api_key,
            temperature: config.temperature,
            max_retries: config.max_retries,
        })
    }

    async fn complete(&self, user_prompt: String) -> Result<FormSchema> {
        let body = json!({
            "model": self.model,
            "temperature": self.temperature,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": user_prompt },
            ],
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tracing::debug!(attempt, ?delay, "retrying schema generation");
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(&self.endpoint)
                .bearer_auth(&self.api_key)
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: Value = response.json().await?;
                        let text = parse_completion(&json)?;
                        let value = extract_json(&text)?;
                        return normalize_schema(value);
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    if status.as_u16() == 429 || status.is_server_error() {
                        tracing::warn!(%status, "generator API returned a retryable error");
                        last_err = Some(anyhow!("OpenAI API error {}: {}", status, body_text));
                        continue;
                    }

                    bail!("OpenAI API error {}: {}", status, body_text);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "generator request failed");
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow!("Schema generation failed after retries")))
    }
}

#[async_trait]
impl SchemaGenerator for OpenAiGenerator {
    fn name(&self) -> &str {
        "openai"
    }

    async fn generate(&self, prompt: &str, documents: &[Document]) -> Result<FormSchema> {
        let prompt = format!(
            "Create a form for the following request.\n\nUSER REQUIREMENTS:\n{}",
            build_context(prompt, documents)?
        );
        self.complete(prompt).await
    }

    async fn edit_schema(
        &self,
        current: &FormSchema,
        prompt: &str,
        documents: &[Document],
    ) -> Result<FormSchema> {
        let prompt = format!(
            "Update the existing form schema.\n\nUSER UPDATE REQUEST:\n{}\n\nCURRENT FORM SCHEMA:\n{}\n\n{}",
            build_context(prompt, documents)?,
            serde_json::to_string_pretty(current)?,
            EDIT_RULES
        );
        self.complete(prompt).await
    }
}

/// The user's request followed by the decoded text of each text document.
fn build_context(prompt: &str, documents: &[Document]) -> Result<String> {
    let mut context = prompt.to_string();
    for doc in documents {
        if doc.kind != "text" {
            tracing::warn!(name = %doc.name, kind = %doc.kind, "skipping non-text document");
            continue;
        }
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(doc.content.as_bytes())
            .with_context(|| format!("document {} is not valid base64", doc.name))?;
        let text = String::from_utf8_lossy(&bytes);
        context.push_str(&format!("\n\n--- {} ---\n{}", doc.name, text.trim()));
    }
    Ok(context)
}

/// Pull the assistant message out of a chat-completions response.
fn parse_completion(json: &Value) -> Result<String> {
    json.get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| anyhow!("Invalid OpenAI response: missing choices[0].message.content"))
}

/// Find and parse the JSON object embedded in model output.
pub fn extract_json(text: &str) -> Result<Value> {
    let candidate = fenced_block(text)
        .or_else(|| {
            let start = text.find('{')?;
            let end = text.rfind('}')?;
            (end > start).then(|| &text[start..=end])
        })
        .unwrap_or_else(|| text.trim());

    serde_json::from_str(candidate).context("generator output is not valid JSON")
}

fn fenced_block(text: &str) -> Option<&str> {
    let open = text.find("```")?;
    let rest = &text[open + 3..];
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let close = rest.find("```")?;
    Some(rest[..close].trim())
}

/// A one-question form standing in for a failed generation.
///
/// The description echoes the request, cut to 100 characters.
pub fn fallback_schema(context: &str) -> FormSchema {
    let description = if context.chars().count() > 100 {
        let head: String = context.chars().take(100).collect();
        format!("Form created from: {}...", head)
    } else {
        context.to_string()
    };
    FormSchema::new(
        FALLBACK_TITLE,
        description,
        vec![FormComponent::short_answer("comp_1", FALLBACK_QUESTION, true)],
    )
}

/// Turn loosely-shaped generator output into a [`FormSchema`].
///
/// Unknown component types are dropped. Missing ids become `comp_<n>`,
/// skipping ids already in use. Only absent keys get defaults.
pub fn normalize_schema(value: Value) -> Result<FormSchema> {
    let Value::Object(mut root) = value else {
        bail!("generator output is not a JSON object");
    };

    let title = take_string(&mut root, "title")
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_TITLE.to_string());
    let description = take_string(&mut root, "description").unwrap_or_default();

    let raw_components = match root.remove("components") {
        Some(Value::Array(items)) => items,
        _ => Vec::new(),
    };

    let mut used: HashSet<String> = raw_components
        .iter()
        .filter_map(|c| c.get("id").and_then(Value::as_str))
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect();

    let mut components = Vec::with_capacity(raw_components.len());
    for (index, raw) in raw_components.into_iter().enumerate() {
        let Value::Object(mut raw) = raw else {
            tracing::warn!(index, "dropping non-object component");
            continue;
        };

        let kind = match raw.get("type").and_then(Value::as_str) {
            Some("short-answer") => ComponentType::ShortAnswer,
            Some("multiple-choice") => ComponentType::MultipleChoice,
            other => {
                tracing::warn!(index, kind = ?other, "dropping component with unknown type");
                continue;
            }
        };

        let id = match take_string(&mut raw, "id").filter(|id| !id.is_empty()) {
            Some(id) => id,
            None => next_free_id(&mut used, index + 1),
        };

        let data = match raw.remove("data") {
            Some(Value::Object(data)) => data,
            _ => Map::new(),
        };

        components.push(FormComponent {
            id,
            kind,
            data: normalize_data(kind, data),
        });
    }

    Ok(FormSchema {
        title,
        description,
        components,
    })
}

fn normalize_data(kind: ComponentType, mut data: Map<String, Value>) -> ComponentData {
    let question = take_string(&mut data, "question")
        .filter(|q| !q.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_QUESTION.to_string());
    let required = data
        .remove("required")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    let allow_multiple = data.remove("allowMultiple").and_then(|v| v.as_bool());
    let max_length = data
        .remove("maxLength")
        .and_then(|v| v.as_u64())
        .and_then(|n| u32::try_from(n).ok());
    let options: Option<Vec<String>> = match data.remove("options") {
        Some(Value::Array(items)) => Some(
            items
                .into_iter()
                .filter_map(|o| match o {
                    Value::String(s) => Some(s),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                })
                .collect(),
        ),
        _ => None,
    };

    // Multiple choice needs 2..=4 options; other fields pass through as given
    let options = match kind {
        ComponentType::MultipleChoice => {
            let mut options = options.unwrap_or_else(|| {
                vec!["Option 1".to_string(), "Option 2".to_string()]
            });
            options.truncate(MAX_OPTIONS);
            while options.len() < 2 {
                options.push(format!("Option {}", options.len() + 1));
            }
            Some(options)
        }
        ComponentType::ShortAnswer => options,
    };

    ComponentData {
        question,
        required,
        options,
        allow_multiple,
        max_length,
        extra: data,
    }
}

fn take_string(map: &mut Map<String, Value>, key: &str) -> Option<String> {
    match map.remove(key) {
        Some(Value::String(s)) => Some(s),
        _ => None,
    }
}

fn next_free_id(used: &mut HashSet<String>, mut n: usize) -> String {
    loop {
        let candidate = format!("comp_{}", n);
        if used.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_extract_json_prefers_fenced_block() {
        let text = "Here you go:\n```json\n{\"title\": \"A\"}\n```\nand {\"title\": \"B\"}";
        assert_eq!(extract_json(text).unwrap(), json!({"title": "A"}));
    }

    #[test]
    fn test_extract_json_falls_back_to_braces() {
        let text = "Sure! {\"title\": \"Survey\", \"components\": []} Hope this helps.";
        assert_eq!(extract_json(text).unwrap()["title"], "Survey");
    }

    #[test]
    fn test_extract_json_rejects_prose() {
        assert!(extract_json("I cannot build that form.").is_err());
    }

    #[test]
    fn test_normalize_fills_defaults() {
        let schema = normalize_schema(json!({
            "components": [
                { "type": "short-answer", "data": {} },
                { "id": "color", "type": "multiple-choice", "data": {
                    "question": "Favourite colour?",
                    "options": ["red", "green", "blue", "cyan", "magenta"]
                }},
                { "id": "bad", "type": "slider", "data": {} },
                { "type": "multiple-choice" }
            ]
        }))
        .unwrap();

        assert_eq!(schema.title, DEFAULT_TITLE);
        assert_eq!(schema.description, "");
        assert_eq!(schema.components.len(), 3);

        let first = &schema.components[0];
        assert_eq!(first.id, "comp_1");
        assert_eq!(first.data.question, DEFAULT_QUESTION);
        assert!(!first.data.required);

        let color = &schema.components[1];
        assert_eq!(color.options(), ["red", "green", "blue", "cyan"]);
        assert_eq!(color.data.allow_multiple, None);
        assert!(!color.allows_multiple());

        let last = &schema.components[2];
        assert_eq!(last.id, "comp_4");
        assert_eq!(last.options(), ["Option 1", "Option 2"]);
    }

    #[test]
    fn test_normalize_generated_ids_avoid_collisions() {
        let schema = normalize_schema(json!({
            "title": "T",
            "components": [
                { "type": "short-answer", "data": { "question": "A" } },
                { "id": "comp_1", "type": "short-answer", "data": { "question": "B" } }
            ]
        }))
        .unwrap();
        let ids: Vec<&str> = schema.components.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, ["comp_2", "comp_1"]);
    }

    #[test]
    fn test_normalize_keeps_extra_keys() {
        let schema = normalize_schema(json!({
            "title": "T",
            "components": [
                { "id": "a", "type": "short-answer",
                  "data": { "question": "Q", "required": true, "maxLength": 40, "placeholder": "..." } }
            ]
        }))
        .unwrap();
        let data = &schema.components[0].data;
        assert!(data.required);
        assert_eq!(data.max_length, Some(40));
        assert_eq!(data.extra.get("placeholder"), Some(&json!("...")));
    }

    #[test]
    fn test_normalize_leaves_conforming_schema_unchanged() {
        let mut pick = FormComponent::multiple_choice("c1", "Pick", ["A", "B"], false, false);
        pick.data.allow_multiple = None;
        pick.data.max_length = Some(12);
        let mut name = FormComponent::short_answer("c2", "Name?", true);
        name.data.options = Some(vec!["unused".into()]);
        name.data.allow_multiple = Some(true);
        name.data.extra.insert("placeholder".into(), json!("Ada"));
        let stored = FormSchema::new("Survey", "", vec![pick, name]);

        let echoed = normalize_schema(serde_json::to_value(&stored).unwrap()).unwrap();
        assert_eq!(echoed, stored);
        let diff = formflow_core::diff::diff_schemas(&stored, &echoed).unwrap();
        assert!(diff.is_empty(), "unexpected changes: {:?}", diff.changes);
    }

    #[test]
    fn test_fallback_schema() {
        let short = fallback_schema("a signup form");
        assert_eq!(short.title, FALLBACK_TITLE);
        assert_eq!(short.description, "a signup form");
        assert_eq!(short.components.len(), 1);
        assert_eq!(short.components[0].data.question, FALLBACK_QUESTION);
        assert!(short.components[0].data.required);
        assert!(formflow_core::validate::validate_schema(&short).is_ok());

        let long = fallback_schema(&"x".repeat(150));
        assert_eq!(long.description, format!("Form created from: {}...", "x".repeat(100)));
    }

    #[test]
    fn test_normalize_rejects_non_object() {
        assert!(normalize_schema(json!([1, 2, 3])).is_err());
    }

    #[test]
    fn test_build_context_decodes_text_and_skips_pdf() {
        let docs = vec![
            Document {
                name: "notes.txt".into(),
                kind: "text".into(),
                content: base64::engine::general_purpose::STANDARD.encode("Ask about diet"),
            },
            Document {
                name: "brochure.pdf".into(),
                kind: "pdf".into(),
                content: "JVBERi0=".into(),
            },
        ];
        let context = build_context("Make a signup form", &docs).unwrap();
        assert!(context.starts_with("Make a signup form"));
        assert!(context.contains("--- notes.txt ---\nAsk about diet"));
        assert!(!context.contains("brochure.pdf"));
    }

    #[test]
    fn test_parse_completion() {
        let resp = json!({ "choices": [ { "message": { "role": "assistant", "content": "{}" } } ] });
        assert_eq!(parse_completion(&resp).unwrap(), "{}");
        assert!(parse_completion(&json!({})).is_err());
    }

    #[tokio::test]
    async fn test_disabled_generator_fails() {
        let generator = create_generator(&GeneratorConfig::default()).unwrap();
        assert_eq!(generator.name(), "disabled");
        let err = generator.generate("anything", &[]).await.unwrap_err();
        assert!(err.to_string().contains("disabled"));
    }
}
