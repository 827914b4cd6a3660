//! SQLite-backed content repository.
//!
//! This crate stores polymorphic content: every record shares one row in the
//! `content` table, and the fields specific to its content type live in that
//! type's extension table.
//!
//! # Architecture
//! - **Content**: the shared row (title, author, dates, topics, privileges)
//!   plus one extension row, keyed by the same `content_id`.
//! - **Links**: each record owns exactly one link, which holds its unique
//!   URL path and routes it to the content viewer.
//! - **Topics**: stored as a set on the content row and normalized into
//!   `topic_maps`, which is what topic filters join against.
//! - **Registries**: content types, custom fields and links are reached
//!   through the traits in [`registry`], so other backends can stand in.

mod db;
pub mod error;
mod ident;
pub mod models;
mod query;
pub mod registry;
mod repo;
pub mod slug;

pub use crate::db::Database;
pub use crate::query::{Filter, SortColumn, SortDirection};
pub use crate::repo::Repository;
