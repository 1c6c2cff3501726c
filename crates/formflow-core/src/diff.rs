//! Structural diff between two form schemas.
//!
//! The differ reports content changes, not layout changes: a component that
//! only moved position is unchanged. Components are paired by id through
//! the [matcher](crate::matcher), then compared with deep equality over
//! type and every data field (option order included).
//!
//! # Change ordering
//!
//! `changes` lists every `removed` entry, then `added`, then `modified`,
//! then `metadata`. Removed entries follow the old schema's order; added
//! and modified entries follow the new schema's order; metadata reports
//! the title before the description.
//!
//! # Summary
//!
//! ```text
//! Added 2 component(s); Removed 1 component(s); Modified 1 component(s); Updated metadata
//! ```
//!
//! Clauses with a zero count are omitted. An empty diff reads `No changes`.

use serde::{Deserialize, Serialize};

use crate::error::FormResult;
use crate::matcher::match_components;
use crate::models::{ComponentType, FormComponent, FormSchema};

/// Summary used when two schemas are identical.
pub const NO_CHANGES: &str = "No changes";

/// Which piece of form metadata changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetadataField {
    Title,
    Description,
}

/// A single entry in a [`Diff`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum DiffChange {
    Removed {
        component_id: String,
        component: FormComponent,
        details: String,
    },
    Added {
        component_id: String,
        component: FormComponent,
        details: String,
    },
    Modified {
        component_id: String,
        before: FormComponent,
        after: FormComponent,
        details: String,
    },
    Metadata {
        field: MetadataField,
        before: String,
        after: String,
        details: String,
    },
}

impl DiffChange {
    /// The affected component id; `None` for metadata changes.
    pub fn component_id(&self) -> Option<&str> {
        match self {
            Self::Removed { component_id, .. }
            | Self::Added { component_id, .. }
            | Self::Modified { component_id, .. } => Some(component_id),
            Self::Metadata { .. } => None,
        }
    }

    pub fn details(&self) -> &str {
        match self {
            Self::Removed { details, .. }
            | Self::Added { details, .. }
            | Self::Modified { details, .. }
            | Self::Metadata { details, .. } => details,
        }
    }
}

/// The full change set between two schema versions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diff {
    pub summary: String,
    pub changes: Vec<DiffChange>,
}

impl Diff {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn added(&self) -> usize {
        self.count(|c| matches!(c, DiffChange::Added { .. }))
    }

    pub fn removed(&self) -> usize {
        self.count(|c| matches!(c, DiffChange::Removed { .. }))
    }

    pub fn modified(&self) -> usize {
        self.count(|c| matches!(c, DiffChange::Modified { .. }))
    }

    pub fn metadata(&self) -> usize {
        self.count(|c| matches!(c, DiffChange::Metadata { .. }))
    }

    fn count(&self, pred: impl Fn(&DiffChange) -> bool) -> usize {
        self.changes.iter().filter(|c| pred(c)).count()
    }
}

/// Compare two schemas and produce a [`Diff`].
///
/// Fails only when either schema repeats a component id.
pub fn diff_schemas(before: &FormSchema, after: &FormSchema) -> FormResult<Diff> {
    let matched = match_components(&before.components, &after.components)?;

    let mut changes = Vec::new();

    for component in &matched.removed {
        changes.push(DiffChange::Removed {
            component_id: component.id.clone(),
            details: format!(
                "Removed {} question: '{}'",
                component.kind.label(),
                component.data.question
            ),
            component: (*component).clone(),
        });
    }

    for component in &matched.added {
        changes.push(DiffChange::Added {
            component_id: component.id.clone(),
            details: format!(
                "Added {} question: '{}'",
                component.kind.label(),
                component.data.question
            ),
            component: (*component).clone(),
        });
    }

    for pair in &matched.common {
        if pair.before != pair.after {
            changes.push(DiffChange::Modified {
                component_id: pair.after.id.clone(),
                details: describe_modification(pair.before, pair.after),
                before: pair.before.clone(),
                after: pair.after.clone(),
            });
        }
    }

    if before.title != after.title {
        changes.push(DiffChange::Metadata {
            field: MetadataField::Title,
            details: format!(
                "Changed form title from '{}' to '{}'",
                before.title, after.title
            ),
            before: before.title.clone(),
            after: after.title.clone(),
        });
    }

    if before.description != after.description {
        changes.push(DiffChange::Metadata {
            field: MetadataField::Description,
            details: "Changed form description".to_string(),
            before: before.description.clone(),
            after: after.description.clone(),
        });
    }

    let mut diff = Diff {
        summary: String::new(),
        changes,
    };
    diff.summary = summarize(&diff);
    Ok(diff)
}

fn summarize(diff: &Diff) -> String {
    let mut clauses = Vec::new();
    let added = diff.added();
    if added > 0 {
        clauses.push(format!("Added {} component(s)", added));
    }
    let removed = diff.removed();
    if removed > 0 {
        clauses.push(format!("Removed {} component(s)", removed));
    }
    let modified = diff.modified();
    if modified > 0 {
        clauses.push(format!("Modified {} component(s)", modified));
    }
    if diff.metadata() > 0 {
        clauses.push("Updated metadata".to_string());
    }

    if clauses.is_empty() {
        NO_CHANGES.to_string()
    } else {
        clauses.join("; ")
    }
}

/// Human-readable list of what changed inside one component.
fn describe_modification(before: &FormComponent, after: &FormComponent) -> String {
    let mut parts = Vec::new();
    let (old, new) = (&before.data, &after.data);

    if before.kind != after.kind {
        parts.push(format!(
            "Changed type from {} to {}",
            before.kind.label(),
            after.kind.label()
        ));
    }

    if old.question != new.question {
        parts.push("Changed question text".to_string());
    }

    if old.required != new.required {
        let status = if new.required { "required" } else { "optional" };
        parts.push(format!("Made {}", status));
    }

    match after.kind {
        ComponentType::MultipleChoice => {
            let old_opts = before.options();
            let new_opts = after.options();

            let added: Vec<&str> = new_opts
                .iter()
                .filter(|o| !old_opts.contains(*o))
                .map(String::as_str)
                .collect();
            let removed: Vec<&str> = old_opts
                .iter()
                .filter(|o| !new_opts.contains(*o))
                .map(String::as_str)
                .collect();

            if !added.is_empty() {
                parts.push(format!("Added option(s): '{}'", added.join("', '")));
            }
            if !removed.is_empty() {
                parts.push(format!("Removed option(s): '{}'", removed.join("', '")));
            }
            if added.is_empty() && removed.is_empty() && old_opts != new_opts {
                parts.push("Reordered options".to_string());
            }

            if before.allows_multiple() != after.allows_multiple() {
                parts.push(if after.allows_multiple() {
                    "Allowed multiple selections".to_string()
                } else {
                    "Restricted to a single selection".to_string()
                });
            }
        }
        ComponentType::ShortAnswer => {
            if old.max_length != new.max_length {
                parts.push(match new.max_length {
                    Some(n) => format!("Set maximum length to {}", n),
                    None => "Removed maximum length limit".to_string(),
                });
            }
        }
    }

    for (key, value) in &new.extra {
        if old.extra.get(key) != Some(value) {
            parts.push(format!("Changed {}", key));
        }
    }
    for key in old.extra.keys() {
        if !new.extra.contains_key(key) {
            parts.push(format!("Removed {}", key));
        }
    }

    if parts.is_empty() {
        "Updated component".to_string()
    } else {
        parts.join("; ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FormError;
    use pretty_assertions::assert_eq;

    fn sa(id: &str, question: &str, required: bool) -> FormComponent {
        FormComponent::short_answer(id, question, required)
    }

    fn mc(id: &str, options: &[&str]) -> FormComponent {
        FormComponent::multiple_choice(id, "Pick one", options.iter().copied(), false, false)
    }

    fn schema(components: Vec<FormComponent>) -> FormSchema {
        FormSchema::new("Survey", "A survey", components)
    }

    #[test]
    fn test_identical_schemas_have_no_changes() {
        let s = schema(vec![sa("a", "Name?", true), mc("b", &["X", "Y"])]);
        let diff = diff_schemas(&s, &s).unwrap();
        assert!(diff.is_empty());
        assert_eq!(diff.summary, NO_CHANGES);
    }

    #[test]
    fn test_empty_schemas() {
        let diff = diff_schemas(&FormSchema::default(), &FormSchema::default()).unwrap();
        assert!(diff.is_empty());
        assert_eq!(diff.summary, "No changes");
    }

    #[test]
    fn test_replace_component() {
        let old = schema(vec![sa("c1", "Old question?", false)]);
        let new = schema(vec![sa("c2", "New question?", true)]);
        let diff = diff_schemas(&old, &new).unwrap();

        assert_eq!(diff.summary, "Added 1 component(s); Removed 1 component(s)");
        assert_eq!(diff.changes.len(), 2);
        assert_eq!(
            diff.changes[0],
            DiffChange::Removed {
                component_id: "c1".into(),
                component: sa("c1", "Old question?", false),
                details: "Removed short answer question: 'Old question?'".into(),
            }
        );
        assert_eq!(
            diff.changes[1],
            DiffChange::Added {
                component_id: "c2".into(),
                component: sa("c2", "New question?", true),
                details: "Added short answer question: 'New question?'".into(),
            }
        );
    }

    #[test]
    fn test_reorder_is_not_a_change() {
        let old = schema(vec![sa("a", "A?", false), sa("b", "B?", false), mc("c", &["1", "2"])]);
        let new = schema(vec![mc("c", &["1", "2"]), sa("a", "A?", false), sa("b", "B?", false)]);
        let diff = diff_schemas(&old, &new).unwrap();
        assert!(diff.is_empty());
    }

    #[test]
    fn test_single_field_change_is_one_modified_entry() {
        let mut components: Vec<FormComponent> =
            (0..10).map(|i| sa(&format!("c{}", i), "Q?", false)).collect();
        let old = schema(components.clone());
        components[4].data.required = true;
        let new = schema(components);

        let diff = diff_schemas(&old, &new).unwrap();
        assert_eq!(diff.changes.len(), 1);
        assert_eq!(diff.changes[0].component_id(), Some("c4"));
        assert_eq!(diff.changes[0].details(), "Made required");
        assert_eq!(diff.summary, "Modified 1 component(s)");
    }

    #[test]
    fn test_option_order_counts_as_content() {
        let old = schema(vec![mc("q", &["A", "B", "C"])]);
        let new = schema(vec![mc("q", &["C", "B", "A"])]);
        let diff = diff_schemas(&old, &new).unwrap();
        assert_eq!(diff.modified(), 1);
        assert_eq!(diff.changes[0].details(), "Reordered options");
    }

    #[test]
    fn test_option_details() {
        let old = schema(vec![mc("q", &["A", "B"])]);
        let new = schema(vec![mc("q", &["A", "C", "D"])]);
        let diff = diff_schemas(&old, &new).unwrap();
        assert_eq!(
            diff.changes[0].details(),
            "Added option(s): 'C', 'D'; Removed option(s): 'B'"
        );
    }

    #[test]
    fn test_type_change_details() {
        let old = schema(vec![sa("q", "Pick one", false)]);
        let new = schema(vec![mc("q", &["A", "B"])]);
        let diff = diff_schemas(&old, &new).unwrap();
        assert_eq!(
            diff.changes[0].details(),
            "Changed type from short answer to multiple choice; Added option(s): 'A', 'B'"
        );
    }

    #[test]
    fn test_max_length_details() {
        let old = schema(vec![sa("q", "Bio", false)]);
        let mut limited = sa("q", "Bio", false);
        limited.data.max_length = Some(140);
        let new = schema(vec![limited]);

        let diff = diff_schemas(&old, &new).unwrap();
        assert_eq!(diff.changes[0].details(), "Set maximum length to 140");

        let diff = diff_schemas(&new, &old).unwrap();
        assert_eq!(diff.changes[0].details(), "Removed maximum length limit");
    }

    #[test]
    fn test_title_only_change() {
        let old = FormSchema::new("A", "same", vec![sa("a", "Q?", false)]);
        let new = FormSchema::new("B", "same", vec![sa("a", "Q?", false)]);
        let diff = diff_schemas(&old, &new).unwrap();

        assert_eq!(
            diff.changes,
            vec![DiffChange::Metadata {
                field: MetadataField::Title,
                before: "A".into(),
                after: "B".into(),
                details: "Changed form title from 'A' to 'B'".into(),
            }]
        );
        assert_eq!(diff.summary, "Updated metadata");
    }

    #[test]
    fn test_group_order() {
        let old = FormSchema::new(
            "T1",
            "D1",
            vec![sa("keep", "K?", false), sa("gone1", "G1?", false), sa("gone2", "G2?", false)],
        );
        let new = FormSchema::new(
            "T2",
            "D2",
            vec![sa("new2", "N2?", false), sa("keep", "K changed?", false), sa("new1", "N1?", false)],
        );
        let diff = diff_schemas(&old, &new).unwrap();

        let kinds: Vec<(&str, Option<&str>)> = diff
            .changes
            .iter()
            .map(|c| {
                let kind = match c {
                    DiffChange::Removed { .. } => "removed",
                    DiffChange::Added { .. } => "added",
                    DiffChange::Modified { .. } => "modified",
                    DiffChange::Metadata { .. } => "metadata",
                };
                (kind, c.component_id())
            })
            .collect();

        assert_eq!(
            kinds,
            vec![
                ("removed", Some("gone1")),
                ("removed", Some("gone2")),
                ("added", Some("new2")),
                ("added", Some("new1")),
                ("modified", Some("keep")),
                ("metadata", None),
                ("metadata", None),
            ]
        );
        assert_eq!(
            diff.summary,
            "Added 2 component(s); Removed 2 component(s); Modified 1 component(s); Updated metadata"
        );
    }

    #[test]
    fn test_every_removed_and_added_id_reported_once() {
        let old = schema((0..6).map(|i| sa(&format!("o{}", i), "Q?", false)).collect());
        let new = schema((3..9).map(|i| sa(&format!("o{}", i), "Q?", false)).collect());
        let diff = diff_schemas(&old, &new).unwrap();

        for i in 0..3 {
            let id = format!("o{}", i);
            let hits = diff
                .changes
                .iter()
                .filter(|c| matches!(c, DiffChange::Removed { component_id, .. } if *component_id == id))
                .count();
            assert_eq!(hits, 1, "{} should be removed exactly once", id);
        }
        for i in 6..9 {
            let id = format!("o{}", i);
            let hits = diff
                .changes
                .iter()
                .filter(|c| matches!(c, DiffChange::Added { component_id, .. } if *component_id == id))
                .count();
            assert_eq!(hits, 1, "{} should be added exactly once", id);
        }
        assert_eq!(diff.modified(), 0);
    }

    #[test]
    fn test_duplicate_ids_fail() {
        let bad = schema(vec![sa("x", "1", false), sa("x", "2", false)]);
        let err = diff_schemas(&bad, &schema(vec![])).unwrap_err();
        assert!(matches!(err, FormError::InvalidSchema(_)));
    }

    #[test]
    fn test_wire_format() {
        let old = schema(vec![sa("c1", "Q?", false)]);
        let new = schema(vec![]);
        let diff = diff_schemas(&old, &new).unwrap();
        let json = serde_json::to_value(&diff).unwrap();

        assert_eq!(json["summary"], "Removed 1 component(s)");
        assert_eq!(json["changes"][0]["type"], "removed");
        assert_eq!(json["changes"][0]["componentId"], "c1");
        assert_eq!(json["changes"][0]["component"]["type"], "short-answer");
    }
}
