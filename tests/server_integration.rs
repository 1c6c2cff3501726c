use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use formflow::editor::FormEditor;
use formflow::generator::SchemaGenerator;
use formflow::server::router;
use formflow_core::models::{Document, FormComponent, FormSchema};
use formflow_core::store::memory::InMemoryStore;
use serde_json::{json, Value};

/// Deterministic stand-in for the LLM.
///
/// Edits append a short-answer component, unless the prompt says
/// `keep` (unchanged schema) or `fail` (generator error).
struct ScriptedGenerator;

#[async_trait]
impl SchemaGenerator for ScriptedGenerator {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, prompt: &str, _documents: &[Document]) -> anyhow::Result<FormSchema> {
        if prompt.contains("fail") {
            anyhow::bail!("upstream model error");
        }
        Ok(FormSchema::new(
            "Event RSVP",
            "Let us know if you can make it",
            vec![
                FormComponent::short_answer("comp_1", "Your name?", true),
                FormComponent::multiple_choice(
                    "comp_2",
                    "Attending?",
                    ["Yes", "No", "Maybe"],
                    false,
                    true,
                ),
            ],
        ))
    }

    async fn edit_schema(
        &self,
        current: &FormSchema,
        prompt: &str,
        _documents: &[Document],
    ) -> anyhow::Result<FormSchema> {
        if prompt.contains("fail") {
            anyhow::bail!("upstream model error");
        }
        let mut next = current.clone();
        if !prompt.contains("keep") {
            let id = format!("comp_{}", next.components.len() + 1);
            next.components
                .push(FormComponent::short_answer(id, "Dietary needs?", false));
        }
        Ok(next)
    }
}

async fn spawn_server() -> String {
    let editor = FormEditor::new(
        Arc::new(InMemoryStore::new()),
        Arc::new(ScriptedGenerator),
        Duration::from_secs(5),
    );
    let app = router(Arc::new(editor));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

async fn post(client: &reqwest::Client, url: String, body: Value) -> (u16, Value) {
    let resp = client.post(url).json(&body).send().await.unwrap();
    let status = resp.status().as_u16();
    (status, resp.json().await.unwrap())
}

async fn get(client: &reqwest::Client, url: String) -> (u16, Value) {
    let resp = client.get(url).send().await.unwrap();
    let status = resp.status().as_u16();
    (status, resp.json().await.unwrap())
}

async fn create_form(client: &reqwest::Client, base: &str) -> String {
    let (status, body) = post(
        client,
        format!("{}/forms/create", base),
        json!({ "userQuery": "an RSVP form for a dinner" }),
    )
    .await;
    assert_eq!(status, 201, "create failed: {}", body);
    let form_id = body["formId"].as_str().unwrap().to_string();
    assert_eq!(body["redirectUrl"], format!("/{}/edit", form_id));
    form_id
}

#[tokio::test]
async fn test_health() {
    let base = spawn_server().await;
    let (status, body) = get(&reqwest::Client::new(), format!("{}/health", base)).await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "ok");
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn test_create_and_get_form() {
    let base = spawn_server().await;
    let client = reqwest::Client::new();
    let form_id = create_form(&client, &base).await;

    let (status, body) = get(&client, format!("{}/forms/{}", base, form_id)).await;
    assert_eq!(status, 200);
    assert_eq!(body["formId"], form_id);
    assert_eq!(body["title"], "Event RSVP");
    assert_eq!(body["version"], 0);
    assert_eq!(body["schema"]["components"][1]["type"], "multiple-choice");
    assert_eq!(body["schema"]["components"][1]["data"]["allowMultiple"], false);

    let (status, body) = get(&client, format!("{}/forms", base)).await;
    assert_eq!(status, 200);
    assert_eq!(body["forms"][0]["formId"], form_id);
    assert_eq!(body["forms"][0]["responseCount"], 0);
}

#[tokio::test]
async fn test_edit_review_and_undo_cycle() {
    let base = spawn_server().await;
    let client = reqwest::Client::new();
    let form_id = create_form(&client, &base).await;
    let form_url = format!("{}/forms/{}", base, form_id);

    let (status, body) = post(
        &client,
        format!("{}/edit", form_url),
        json!({ "userQuery": "ask about dietary needs" }),
    )
    .await;
    assert_eq!(status, 200, "edit failed: {}", body);
    assert_eq!(body["success"], true);
    assert_eq!(body["version"], 1);
    assert_eq!(body["diff"]["summary"], "Added 1 component(s)");
    assert_eq!(body["diff"]["changes"][0]["type"], "added");
    assert_eq!(body["diff"]["changes"][0]["componentId"], "comp_3");

    // A second AI edit must wait for review
    let (status, body) = post(
        &client,
        format!("{}/edit", form_url),
        json!({ "userQuery": "another question" }),
    )
    .await;
    assert_eq!(status, 409);
    assert_eq!(body["error"]["code"], "review_in_progress");

    let (status, body) = post(&client, format!("{}/undo", form_url), json!({})).await;
    assert_eq!(status, 200);
    assert_eq!(body["success"], true);
    assert_eq!(body["version"], 0);
    assert_eq!(body["schema"]["components"].as_array().unwrap().len(), 2);

    let (status, body) = post(&client, format!("{}/undo", form_url), json!({})).await;
    assert_eq!(status, 200);
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "Already at initial version");

    let (_, body) = get(&client, format!("{}/history", form_url)).await;
    assert_eq!(body["versions"].as_array().unwrap().len(), 1);
    assert_eq!(body["versions"][0]["changeDescription"], "Initial version");
    assert_eq!(body["versions"][0]["componentCount"], 2);
}

#[tokio::test]
async fn test_accept_then_edit_again() {
    let base = spawn_server().await;
    let client = reqwest::Client::new();
    let form_id = create_form(&client, &base).await;
    let form_url = format!("{}/forms/{}", base, form_id);

    post(&client, format!("{}/edit", form_url), json!({ "userQuery": "add" })).await;

    let (status, body) = post(&client, format!("{}/accept", form_url), json!({})).await;
    assert_eq!(status, 200);
    assert_eq!(body["hadPendingReview"], true);

    let (status, body) = post(&client, format!("{}/edit", form_url), json!({ "userQuery": "add" })).await;
    assert_eq!(status, 200, "edit failed: {}", body);
    assert_eq!(body["version"], 2);
}

#[tokio::test]
async fn test_edit_without_changes_returns_null_diff() {
    let base = spawn_server().await;
    let client = reqwest::Client::new();
    let form_id = create_form(&client, &base).await;

    let (status, body) = post(
        &client,
        format!("{}/forms/{}/edit", base, form_id),
        json!({ "userQuery": "keep everything" }),
    )
    .await;
    assert_eq!(status, 200);
    assert!(body["diff"].is_null());
    assert_eq!(body["version"], 0);
}

#[tokio::test]
async fn test_generator_failure_is_bad_gateway() {
    let base = spawn_server().await;
    let client = reqwest::Client::new();
    let form_id = create_form(&client, &base).await;

    let (status, body) = post(
        &client,
        format!("{}/forms/{}/edit", base, form_id),
        json!({ "userQuery": "please fail" }),
    )
    .await;
    assert_eq!(status, 502);
    assert_eq!(body["error"]["code"], "generation_failed");
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("upstream model error"));

    let (_, body) = get(&client, format!("{}/forms/{}", base, form_id)).await;
    assert_eq!(body["version"], 0);
}

#[tokio::test]
async fn test_manual_save() {
    let base = spawn_server().await;
    let client = reqwest::Client::new();
    let form_id = create_form(&client, &base).await;
    let form_url = format!("{}/forms/{}", base, form_id);

    let (status, body) = post(
        &client,
        format!("{}/save", form_url),
        json!({
            "schema": {
                "components": [
                    { "id": "comp_1", "type": "short-answer",
                      "data": { "question": "Full name?", "required": true, "maxLength": 80 } }
                ]
            },
            "title": "Dinner RSVP",
            "changeDescription": "Trimmed the form"
        }),
    )
    .await;
    assert_eq!(status, 200, "save failed: {}", body);
    assert_eq!(body["version"], 1);

    let (_, body) = get(&client, form_url.clone()).await;
    assert_eq!(body["title"], "Dinner RSVP");
    assert_eq!(body["description"], "Let us know if you can make it");
    assert_eq!(body["schema"]["components"][0]["data"]["maxLength"], 80);

    let (status, body) = post(
        &client,
        format!("{}/save", form_url),
        json!({ "schema": { "components": [
            { "id": "a", "type": "multiple-choice", "data": { "question": "Pick", "options": ["only"] } }
        ] } }),
    )
    .await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "invalid_schema");
}

#[tokio::test]
async fn test_submit_and_list_responses() {
    let base = spawn_server().await;
    let client = reqwest::Client::new();
    let form_id = create_form(&client, &base).await;
    let form_url = format!("{}/forms/{}", base, form_id);

    let (status, body) = post(
        &client,
        format!("{}/submit", form_url),
        json!({ "answers": { "comp_1": "Ada", "comp_2": "Maybe" } }),
    )
    .await;
    assert_eq!(status, 201, "submit failed: {}", body);
    assert_eq!(body["success"], true);
    let response_id = body["responseId"].as_str().unwrap().to_string();

    let (status, body) = post(
        &client,
        format!("{}/submit", form_url),
        json!({ "answers": { "comp_1": "Bob", "comp_2": ["Yes", "No"] } }),
    )
    .await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "bad_request");

    let (status, body) = get(&client, format!("{}/responses", form_url)).await;
    assert_eq!(status, 200);
    assert_eq!(body["responses"].as_array().unwrap().len(), 1);
    assert_eq!(body["responses"][0]["responseId"], response_id);
    assert_eq!(body["responses"][0]["answers"]["comp_2"], "Maybe");
}

#[tokio::test]
async fn test_create_falls_back_when_generator_fails() {
    let base = spawn_server().await;
    let client = reqwest::Client::new();

    let (status, body) = post(
        &client,
        format!("{}/forms/create", base),
        json!({ "userQuery": "please fail to build a survey" }),
    )
    .await;
    assert_eq!(status, 201, "create failed: {}", body);

    let form_id = body["formId"].as_str().unwrap();
    let (_, body) = get(&client, format!("{}/forms/{}", base, form_id)).await;
    assert_eq!(body["title"], "New Form");
    assert_eq!(body["description"], "please fail to build a survey");
    assert_eq!(body["schema"]["components"][0]["type"], "short-answer");
    assert_eq!(body["schema"]["components"][0]["data"]["required"], true);
}

#[tokio::test]
async fn test_delete_form() {
    let base = spawn_server().await;
    let client = reqwest::Client::new();
    let form_id = create_form(&client, &base).await;
    let form_url = format!("{}/forms/{}", base, form_id);

    let resp = client.delete(&form_url).send().await.unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], true);

    let (status, body) = get(&client, form_url.clone()).await;
    assert_eq!(status, 404);
    assert_eq!(body["error"]["code"], "not_found");

    let (_, body) = get(&client, format!("{}/forms", base)).await;
    assert!(body["forms"].as_array().unwrap().is_empty());

    let resp = client.delete(&form_url).send().await.unwrap();
    assert_eq!(resp.status().as_u16(), 404);
}

#[tokio::test]
async fn test_unknown_form_is_404() {
    let base = spawn_server().await;
    let client = reqwest::Client::new();

    let (status, body) = get(&client, format!("{}/forms/missing", base)).await;
    assert_eq!(status, 404);
    assert_eq!(body["error"]["code"], "not_found");

    let (status, _) = post(&client, format!("{}/forms/missing/undo", base), json!({})).await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn test_create_requires_prompt_or_documents() {
    let base = spawn_server().await;
    let (status, body) = post(
        &reqwest::Client::new(),
        format!("{}/forms/create", base),
        json!({ "userQuery": "   " }),
    )
    .await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "bad_request");
}

#[tokio::test]
async fn test_diff_endpoint() {
    let base = spawn_server().await;
    let (status, body) = post(
        &reqwest::Client::new(),
        format!("{}/diff", base),
        json!({
            "before": { "title": "A", "components": [
                { "id": "q", "type": "short-answer", "data": { "question": "Name?" } }
            ] },
            "after": { "title": "A", "components": [
                { "id": "q", "type": "short-answer", "data": { "question": "Name?", "required": true } }
            ] }
        }),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(body["summary"], "Modified 1 component(s)");
    assert_eq!(body["changes"][0]["type"], "modified");
    assert_eq!(body["changes"][0]["details"], "Made required");

    let (status, body) = post(
        &reqwest::Client::new(),
        format!("{}/diff", base),
        json!({ "before": "not a schema" }),
    )
    .await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "bad_request");
}
