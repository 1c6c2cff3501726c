//! `formflow diff`: compare two schema files offline.

use std::path::Path;

use anyhow::{Context, Result};

use formflow_core::diff::{diff_schemas, Diff, DiffChange, MetadataField};
use formflow_core::models::FormSchema;

fn read_schema(path: &Path) -> Result<FormSchema> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read schema file: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse schema file: {}", path.display()))
}

/// Diff `before` against `after` and print the result, as JSON when `json`
/// is set.
pub fn run_diff(before: &Path, after: &Path, json: bool) -> Result<()> {
    let before = read_schema(before)?;
    let after = read_schema(after)?;
    let diff = diff_schemas(&before, &after)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&diff)?);
    } else {
        print!("{}", render(&diff));
    }
    Ok(())
}

/// Human-readable rendering, one line per change.
pub fn render(diff: &Diff) -> String {
    let mut out = format!("{}\n", diff.summary);
    for change in &diff.changes {
        let (marker, subject) = match change {
            DiffChange::Removed { component_id, .. } => ('-', component_id.as_str()),
            DiffChange::Added { component_id, .. } => ('+', component_id.as_str()),
            DiffChange::Modified { component_id, .. } => ('~', component_id.as_str()),
            DiffChange::Metadata { field, .. } => (
                '*',
                match field {
                    MetadataField::Title => "title",
                    MetadataField::Description => "description",
                },
            ),
        };
        out.push_str(&format!("  {} {}: {}\n", marker, subject, change.details()));
    }
    out
}
