//! # FormFlow Core
//!
//! Shared, runtime-agnostic logic for FormFlow: form schema models,
//! component matching, schema diffing, linear version history, input
//! validation, and the persistence trait.
//!
//! This crate contains no tokio, sqlx, HTTP, or filesystem dependencies.
//! Everything here is either a pure function over schema values or an
//! in-memory data structure; the application crate wires these pieces to
//! a database, an LLM, and an HTTP server.

pub mod diff;
pub mod error;
pub mod history;
pub mod matcher;
pub mod models;
pub mod store;
pub mod validate;

pub use diff::{diff_schemas, Diff, DiffChange, MetadataField};
pub use error::{FormError, FormResult};
pub use history::{VersionHistory, VersionSnapshot};
pub use models::{Answer, Answers, ComponentData, ComponentType, Document, FormComponent, FormSchema};
