//! Form schema data types.
//!
//! These types mirror the JSON documents exchanged with the editor UI and
//! the schema generator. Field names are camelCase on the wire.
//!
//! Component identity is the caller-assigned `id`; position in
//! [`FormSchema::components`] defines rendering order but never identity.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The kind of question a component renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ComponentType {
    ShortAnswer,
    MultipleChoice,
}

impl ComponentType {
    /// Wire name (`"short-answer"`, `"multiple-choice"`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ShortAnswer => "short-answer",
            Self::MultipleChoice => "multiple-choice",
        }
    }

    /// Human-readable name used in change descriptions.
    pub fn label(&self) -> &'static str {
        match self {
            Self::ShortAnswer => "short answer",
            Self::MultipleChoice => "multiple choice",
        }
    }
}

/// Per-component field values.
///
/// The well-known fields are typed; anything else the generator or editor
/// attaches is kept in `extra` so that it round-trips and takes part in
/// equality checks.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentData {
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub required: bool,
    /// Ordered choices; only meaningful for multiple-choice components.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_multiple: Option<bool>,
    /// Answer length limit; only meaningful for short-answer components.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u32>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One question in a form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormComponent {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ComponentType,
    pub data: ComponentData,
}

impl FormComponent {
    pub fn short_answer(id: impl Into<String>, question: impl Into<String>, required: bool) -> Self {
        Self {
            id: id.into(),
            kind: ComponentType::ShortAnswer,
            data: ComponentData {
                question: question.into(),
                required,
                ..Default::default()
            },
        }
    }

    pub fn multiple_choice<S: Into<String>>(
        id: impl Into<String>,
        question: impl Into<String>,
        options: impl IntoIterator<Item = S>,
        allow_multiple: bool,
        required: bool,
    ) -> Self {
        Self {
            id: id.into(),
            kind: ComponentType::MultipleChoice,
            data: ComponentData {
                question: question.into(),
                required,
                options: Some(options.into_iter().map(Into::into).collect()),
                allow_multiple: Some(allow_multiple),
                ..Default::default()
            },
        }
    }

    /// Options as a slice, empty when unset.
    pub fn options(&self) -> &[String] {
        self.data.options.as_deref().unwrap_or(&[])
    }

    pub fn allows_multiple(&self) -> bool {
        self.data.allow_multiple.unwrap_or(false)
    }
}

/// A complete form definition: metadata plus ordered components.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FormSchema {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub components: Vec<FormComponent>,
}

impl FormSchema {
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        components: Vec<FormComponent>,
    ) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            components,
        }
    }

    /// Look up a component by id.
    pub fn component(&self, id: &str) -> Option<&FormComponent> {
        self.components.iter().find(|c| c.id == id)
    }
}

/// An uploaded document forwarded to the schema generator.
///
/// `content` is base64-encoded. `kind` is kept as a string so that
/// validation can report unknown types instead of failing deserialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub content: String,
}

/// A submitted answer for one component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Answer {
    Text(String),
    Choices(Vec<String>),
    /// Any other JSON value; always rejected by validation.
    Other(Value),
}

/// Answers keyed by component id.
pub type Answers = BTreeMap<String, Answer>;
