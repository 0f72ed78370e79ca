//! Deskline domain model and shared primitives.
//!
//! This crate holds everything the synchronization layers agree on but
//! that performs no I/O itself:
//!
//! - [`types`] — entity ID and timestamp aliases plus ID generation.
//! - [`error`] — the shared [`CoreError`](error::CoreError) taxonomy.
//! - [`roles`] — the [`Role`](roles::Role) enum and its predicates.
//! - [`status`] — ticket [`Status`](status::Status) workflow and
//!   [`Priority`](status::Priority).
//! - [`models`] — the five synchronized entities and their DTOs.
//! - [`sanitize`] — markup/script stripping for free-text fields.

pub mod error;
pub mod models;
pub mod roles;
pub mod sanitize;
pub mod status;
pub mod types;

pub use error::CoreError;
pub use models::Record;
