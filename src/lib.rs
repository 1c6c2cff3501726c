//! # FormFlow
//!
//! Backend for an AI-assisted form builder. Users describe a form in plain
//! language, a schema generator drafts or revises it, and every committed
//! revision lands in a linear version history with a structural diff and
//! single-step undo.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌──────────┐
//! │  Generator  │──▶│  FormEditor  │──▶│  SQLite  │
//! │ (LLM / off) │   │ diff + undo  │   │ versions │
//! └─────────────┘   └──────┬───────┘   └──────────┘
//!                          │
//!                ┌─────────┴─────────┐
//!                ▼                   ▼
//!           ┌──────────┐       ┌──────────┐
//!           │   CLI    │       │   HTTP   │
//!           │(formflow)│       │  (axum)  │
//!           └──────────┘       └──────────┘
//! ```
//!
//! Pure logic (models, matching, diffing, history, validation) lives in the
//! `formflow-core` crate; this crate wires it to a database, an LLM, and an
//! HTTP server.
//!
//! ## Quick Start
//!
//! ```bash
//! formflow init                       # create database
//! formflow serve                      # start HTTP server
//! formflow diff old.json new.json     # compare two schema files
//! formflow history <form-id>          # list versions
//! formflow undo <form-id>             # revert the latest version
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`logging`] | Tracing subscriber setup |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | SQLite `FormStore` |
//! | [`generator`] | Schema generator providers |
//! | [`editor`] | Edit/save/undo orchestration |
//! | [`server`] | HTTP API |
//! | [`diff_cmd`] | `formflow diff` |
//! | [`history_cmd`] | `formflow history` / `formflow undo` |

pub mod config;
pub mod db;
pub mod diff_cmd;
pub mod editor;
pub mod generator;
pub mod history_cmd;
pub mod logging;
pub mod migrate;
pub mod server;
pub mod sqlite_store;
