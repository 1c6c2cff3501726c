//! Linear, per-form version history.
//!
//! A [`VersionHistory`] is an immutable stack of [`VersionSnapshot`]s.
//! [`push`](VersionHistory::push) and [`undo`](VersionHistory::undo) return
//! new history values and leave the receiver untouched, so a reader holding
//! an older value keeps seeing a consistent history while a writer builds
//! the next one.
//!
//! Snapshots are stored as a persistent singly-linked list: each node shares
//! its parent through an `Arc`, making `push`, `undo`, and `current` O(1)
//! and clone-cheap regardless of history length.
//!
//! ```text
//! v0 ◀── v1 ◀── v2 ◀── v3   (head)
//!               ▲
//!               └─ undo() returns a history whose head is v2
//! ```

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{FormError, FormResult};
use crate::models::FormSchema;

/// Change description of the first snapshot of every form.
pub const INITIAL_CHANGE_DESCRIPTION: &str = "Initial version";

/// One committed version of a form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionSnapshot {
    pub schema: FormSchema,
    pub change_description: String,
    pub created_at: DateTime<Utc>,
}

impl VersionSnapshot {
    pub fn new(schema: FormSchema, change_description: impl Into<String>) -> Self {
        Self {
            schema,
            change_description: change_description.into(),
            created_at: Utc::now(),
        }
    }
}

struct Node {
    snapshot: VersionSnapshot,
    version: usize,
    parent: Option<Arc<Node>>,
}

impl Drop for Node {
    // Unlink iteratively so that dropping a long history cannot overflow the stack.
    fn drop(&mut self) {
        let mut next = self.parent.take();
        while let Some(node) = next {
            match Arc::try_unwrap(node) {
                Ok(mut owned) => next = owned.parent.take(),
                Err(_) => break,
            }
        }
    }
}

/// Ordered snapshots of one form, never empty.
#[derive(Clone)]
pub struct VersionHistory {
    head: Arc<Node>,
}

impl VersionHistory {
    /// Start a history with `schema` as version 0.
    pub fn create_initial(schema: FormSchema) -> Self {
        Self::from_root(VersionSnapshot::new(schema, INITIAL_CHANGE_DESCRIPTION))
    }

    fn from_root(snapshot: VersionSnapshot) -> Self {
        Self {
            head: Arc::new(Node {
                snapshot,
                version: 0,
                parent: None,
            }),
        }
    }

    /// Rebuild a history from snapshots in version order.
    ///
    /// Fails when `snapshots` is empty, since every form has at least its
    /// initial version.
    pub fn from_snapshots(snapshots: impl IntoIterator<Item = VersionSnapshot>) -> FormResult<Self> {
        let mut iter = snapshots.into_iter();
        let root = iter
            .next()
            .ok_or_else(|| FormError::invalid_schema("version history must not be empty"))?;
        let mut history = Self::from_root(root);
        for snapshot in iter {
            history = history.push_snapshot(snapshot);
        }
        Ok(history)
    }

    /// Append a new version. Returns the extended history.
    pub fn push(&self, schema: FormSchema, change_description: impl Into<String>) -> Self {
        self.push_snapshot(VersionSnapshot::new(schema, change_description))
    }

    fn push_snapshot(&self, snapshot: VersionSnapshot) -> Self {
        Self {
            head: Arc::new(Node {
                snapshot,
                version: self.head.version + 1,
                parent: Some(Arc::clone(&self.head)),
            }),
        }
    }

    /// Schema of the most recent version.
    pub fn current(&self) -> &FormSchema {
        &self.head.snapshot.schema
    }

    /// The most recent snapshot.
    pub fn latest(&self) -> &VersionSnapshot {
        &self.head.snapshot
    }

    /// Drop the most recent version.
    ///
    /// Returns the shortened history and its current schema, or
    /// [`FormError::NoHistoryToUndo`] when only the initial version remains.
    pub fn undo(&self) -> FormResult<(Self, FormSchema)> {
        match &self.head.parent {
            Some(parent) => {
                let history = Self {
                    head: Arc::clone(parent),
                };
                let schema = history.current().clone();
                Ok((history, schema))
            }
            None => Err(FormError::NoHistoryToUndo),
        }
    }

    /// Index of the current version (0 for a fresh form).
    pub fn version(&self) -> usize {
        self.head.version
    }

    /// Number of snapshots. Never zero.
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.head.version + 1
    }

    /// Snapshots oldest first.
    pub fn snapshots(&self) -> Vec<&VersionSnapshot> {
        let mut out = Vec::with_capacity(self.len());
        let mut node = Some(&self.head);
        while let Some(n) = node {
            out.push(&n.snapshot);
            node = n.parent.as_ref();
        }
        out.reverse();
        out
    }

    /// Snapshot at `version`, if it exists.
    pub fn get(&self, version: usize) -> Option<&VersionSnapshot> {
        if version > self.head.version {
            return None;
        }
        let mut node = &self.head;
        while node.version > version {
            node = node.parent.as_ref()?;
        }
        Some(&node.snapshot)
    }
}

impl PartialEq for VersionHistory {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.head, &other.head) || self.snapshots() == other.snapshots()
    }
}

impl fmt::Debug for VersionHistory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VersionHistory")
            .field("version", &self.version())
            .field("latest", self.latest())
            .finish()
    }
}
