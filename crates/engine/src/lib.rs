//! Deskline synchronization engine.
//!
//! The engine owns the in-memory mirrors of the five synchronized
//! collections for one session, wires one live subscription per
//! collection, derives the sorted/filtered views the application reads,
//! and exposes the optimistic mutation API. Around it:
//!
//! - [`tenant`] — resolves a slug or magic link to a connection profile
//!   and remembers the choice across sessions.
//! - [`session`] — binds the externally-authenticated principal to a
//!   synchronized user profile and derives role predicates.
//! - [`notify`] — read-only observer turning engine events into
//!   transient notifications.
//! - [`events`] — the broadcast event bus those observers consume.
//!
//! The durable owner of all data is the remote store; the engine's copy
//! is a cache that converges with subscription pushes. Optimistic writes
//! follow an explicit per-operation policy: creations and deletions roll
//! back on failure, cosmetic patches are fire-and-forget (see
//! [`mutations::WritePolicy`]).

pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod mutations;
pub mod notify;
pub mod session;
pub mod tenant;

pub use engine::{EngineFlags, EngineMode, SyncEngine};
pub use error::EngineError;
pub use events::{EngineEvent, EventBus, EventKind};
pub use mutations::{Operation, SetupInput, WritePolicy};
pub use notify::{Notification, NotificationRouter};
pub use session::{CurrentUser, SessionBinder};
pub use tenant::{
    parse_magic_link, TenantPersistence, TenantProfile, TenantRegistry, TenantState,
};
