//! # courier-store
//!
//! Durable storage for the Courier service, backed by SQLite.
//!
//! The crate exposes a synchronous [`Database`] handle that wraps a
//! `rusqlite::Connection` and provides typed CRUD helpers for every domain
//! record: users (identity -> last-known connection id), groups, and the
//! per-group message log.

pub mod database;
pub mod group_messages;
pub mod groups;
pub mod migrations;
pub mod users;

mod error;

pub use database::Database;
pub use error::{Result, StoreError};
