//! Input validation: schemas, prompts, uploaded documents, and answers.
//!
//! Limits are counted in characters, not bytes.

use tracing::warn;

use crate::error::{FormError, FormResult};
use crate::models::{Answer, Answers, ComponentType, Document, FormComponent, FormSchema};

pub const MAX_QUERY_LENGTH: usize = 5000;
pub const MAX_TITLE_LENGTH: usize = 200;
pub const MAX_DESCRIPTION_LENGTH: usize = 1000;
pub const MAX_QUESTION_LENGTH: usize = 500;
pub const MAX_OPTION_LENGTH: usize = 200;
pub const MAX_ANSWER_LENGTH: usize = 2000;
pub const MIN_OPTIONS: usize = 2;
pub const MAX_OPTIONS: usize = 4;

pub const ALLOWED_FILE_EXTENSIONS: &[&str] = &["pdf", "txt"];
pub const ALLOWED_DOCUMENT_TYPES: &[&str] = &["text", "pdf"];
pub const MAX_FILE_SIZE: usize = 10 * 1024 * 1024;
pub const MAX_FILES_PER_REQUEST: usize = 5;

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Validate a complete schema: metadata limits, every component, unique ids.
pub fn validate_schema(schema: &FormSchema) -> FormResult<()> {
    if char_len(&schema.title) > MAX_TITLE_LENGTH {
        return Err(FormError::invalid_schema(format!(
            "Title exceeds maximum length of {}",
            MAX_TITLE_LENGTH
        )));
    }
    if char_len(&schema.description) > MAX_DESCRIPTION_LENGTH {
        return Err(FormError::invalid_schema(format!(
            "Description exceeds maximum length of {}",
            MAX_DESCRIPTION_LENGTH
        )));
    }

    let mut seen = std::collections::HashSet::new();
    for (index, component) in schema.components.iter().enumerate() {
        validate_component(component, index)?;
        if !seen.insert(component.id.as_str()) {
            return Err(FormError::invalid_schema(format!(
                "Duplicate component ID: {}",
                component.id
            )));
        }
    }
    Ok(())
}

fn validate_component(component: &FormComponent, index: usize) -> FormResult<()> {
    if component.id.trim().is_empty() {
        return Err(FormError::invalid_schema(format!(
            "Component {} missing valid ID",
            index
        )));
    }

    let question = &component.data.question;
    if question.trim().is_empty() {
        return Err(FormError::invalid_schema(format!(
            "Component {} missing question",
            index
        )));
    }
    if char_len(question) > MAX_QUESTION_LENGTH {
        return Err(FormError::invalid_schema(format!(
            "Component {} question exceeds maximum length",
            index
        )));
    }

    if component.kind == ComponentType::MultipleChoice {
        let options = component.options();
        if options.len() < MIN_OPTIONS {
            return Err(FormError::invalid_schema(format!(
                "Component {} must have at least {} options",
                index, MIN_OPTIONS
            )));
        }
        if options.len() > MAX_OPTIONS {
            return Err(FormError::invalid_schema(format!(
                "Component {} cannot have more than {} options",
                index, MAX_OPTIONS
            )));
        }
        if options.iter().any(|o| char_len(o) > MAX_OPTION_LENGTH) {
            return Err(FormError::invalid_schema(format!(
                "Component {} has invalid option",
                index
            )));
        }
    }
    Ok(())
}

/// Strip HTML tags, collapse whitespace, and cap the length of a prompt.
pub fn sanitize_user_input(text: &str) -> String {
    sanitize_with_limit(text, MAX_QUERY_LENGTH)
}

fn sanitize_with_limit(text: &str, max_length: usize) -> String {
    let stripped = strip_tags(text);
    let collapsed = stripped.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.chars().take(max_length).collect::<String>().trim().to_string()
}

/// Remove anything that looks like a markup tag (`<b>`, `</p>`, `<!-- -->`).
/// A `<` not followed by a tag-start character is kept as text.
fn strip_tags(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '<' {
            let starts_tag = matches!(chars.peek(), Some(n) if n.is_ascii_alphabetic() || *n == '/' || *n == '!');
            if starts_tag {
                for inner in chars.by_ref() {
                    if inner == '>' {
                        break;
                    }
                }
                continue;
            }
        }
        out.push(c);
    }
    out
}

/// Validate uploaded document descriptors (count, name, type, size).
pub fn validate_documents(documents: &[Document]) -> FormResult<()> {
    if documents.len() > MAX_FILES_PER_REQUEST {
        return Err(FormError::invalid_request(format!(
            "Maximum {} files allowed per request",
            MAX_FILES_PER_REQUEST
        )));
    }
    for (i, doc) in documents.iter().enumerate() {
        validate_document(doc)
            .map_err(|msg| FormError::invalid_request(format!("Document {}: {}", i + 1, msg)))?;
    }
    Ok(())
}

fn validate_document(doc: &Document) -> Result<(), String> {
    if doc.name.is_empty() {
        return Err("File name is required".to_string());
    }
    if let Some((_, ext)) = doc.name.rsplit_once('.') {
        let ext = ext.to_lowercase();
        if !ALLOWED_FILE_EXTENSIONS.contains(&ext.as_str()) {
            return Err(format!("File type not allowed: {}", ext));
        }
    }
    if !ALLOWED_DOCUMENT_TYPES.contains(&doc.kind.as_str()) {
        return Err(format!("Invalid file type: {}", doc.kind));
    }
    if doc.content.is_empty() {
        return Err("File content is required".to_string());
    }
    // base64 inflates by 4/3
    if doc.content.len() * 3 / 4 > MAX_FILE_SIZE {
        return Err(format!(
            "File too large (max {}MB)",
            MAX_FILE_SIZE / 1024 / 1024
        ));
    }
    Ok(())
}

/// Validate submitted answers against the form's current schema.
///
/// Answers for components that no longer exist are accepted, since a
/// respondent may have loaded an older version of the form.
pub fn validate_answers(answers: &Answers, schema: &FormSchema) -> FormResult<()> {
    for component in &schema.components {
        if component.data.required && !answers.contains_key(&component.id) {
            return Err(FormError::invalid_request(format!(
                "Missing required answer for component {}",
                component.id
            )));
        }
    }

    for (component_id, answer) in answers {
        match schema.component(component_id) {
            Some(component) => validate_answer(answer, component)?,
            None => warn!(component_id = %component_id, "answer for unknown component"),
        }
    }
    Ok(())
}

fn validate_answer(answer: &Answer, component: &FormComponent) -> FormResult<()> {
    let id = &component.id;
    match component.kind {
        ComponentType::MultipleChoice => {
            let options = component.options();
            let chosen: Vec<&String> = match answer {
                Answer::Text(choice) => vec![choice],
                Answer::Choices(choices) => {
                    if choices.len() > 1 && !component.allows_multiple() {
                        return Err(FormError::invalid_request(format!(
                            "Component {} accepts a single selection",
                            id
                        )));
                    }
                    choices.iter().collect()
                }
                Answer::Other(_) => {
                    return Err(FormError::invalid_request(format!(
                        "Invalid answer type for {}",
                        id
                    )))
                }
            };
            if let Some(bad) = chosen.into_iter().find(|c| !options.contains(*c)) {
                return Err(FormError::invalid_request(format!(
                    "Invalid option for {}: {}",
                    id, bad
                )));
            }
        }
        ComponentType::ShortAnswer => {
            let text = match answer {
                Answer::Text(text) => text,
                _ => {
                    return Err(FormError::invalid_request(format!(
                        "Answer for {} must be a string",
                        id
                    )))
                }
            };
            let len = char_len(text);
            if len > MAX_ANSWER_LENGTH {
                return Err(FormError::invalid_request(format!(
                    "Answer for {} exceeds maximum length",
                    id
                )));
            }
            if let Some(max) = component.data.max_length {
                if len > max as usize {
                    return Err(FormError::invalid_request(format!(
                        "Answer for {} exceeds maximum length of {}",
                        id, max
                    )));
                }
            }
        }
    }
    Ok(())
}
