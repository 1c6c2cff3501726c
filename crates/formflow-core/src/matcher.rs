//! Pairs components between two schema versions by id.
//!
//! Matching looks at identifiers only; content comparison is the differ's
//! job. Each group keeps schema order: `removed` follows the old list,
//! `added` and `common` follow the new list.

use std::collections::HashMap;

use crate::error::{FormError, FormResult};
use crate::models::FormComponent;

/// A component present in both versions.
#[derive(Debug, Clone, Copy)]
pub struct MatchedPair<'a> {
    pub before: &'a FormComponent,
    pub after: &'a FormComponent,
}

/// Result of [`match_components`].
#[derive(Debug, Clone, Default)]
pub struct ComponentMatch<'a> {
    /// Present in old, absent in new.
    pub removed: Vec<&'a FormComponent>,
    /// Present in new, absent in old.
    pub added: Vec<&'a FormComponent>,
    /// Present in both.
    pub common: Vec<MatchedPair<'a>>,
}

impl<'a> ComponentMatch<'a> {
    pub fn removed_ids(&self) -> impl Iterator<Item = &'a str> + '_ {
        self.removed.iter().map(|&c| c.id.as_str())
    }

    pub fn added_ids(&self) -> impl Iterator<Item = &'a str> + '_ {
        self.added.iter().map(|&c| c.id.as_str())
    }

    pub fn common_ids(&self) -> impl Iterator<Item = &'a str> + '_ {
        self.common.iter().map(|&p| p.after.id.as_str())
    }
}

/// Split two component lists into removed, added, and common sets.
///
/// Fails with [`FormError::InvalidSchema`] when either list repeats an id.
pub fn match_components<'a>(
    old: &'a [FormComponent],
    new: &'a [FormComponent],
) -> FormResult<ComponentMatch<'a>> {
    let old_by_id = index_by_id(old)?;
    let new_by_id = index_by_id(new)?;

    let removed = old
        .iter()
        .filter(|c| !new_by_id.contains_key(c.id.as_str()))
        .collect();

    let mut added = Vec::new();
    let mut common = Vec::new();
    for after in new {
        match old_by_id.get(after.id.as_str()) {
            Some(&before) => common.push(MatchedPair { before, after }),
            None => added.push(after),
        }
    }

    Ok(ComponentMatch {
        removed,
        added,
        common,
    })
}

fn index_by_id(components: &[FormComponent]) -> FormResult<HashMap<&str, &FormComponent>> {
    let mut by_id = HashMap::with_capacity(components.len());
    for component in components {
        if by_id.insert(component.id.as_str(), component).is_some() {
            return Err(FormError::invalid_schema(format!(
                "Duplicate component ID: {}",
                component.id
            )));
        }
    }
    Ok(by_id)
}
