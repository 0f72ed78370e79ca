//! External identity-provider boundary.
//!
//! Authentication is delegated to an external identity provider; this
//! crate defines the contract the rest of Deskline programs against:
//!
//! - [`IdentityProvider`] — sign-in/sign-up/sign-out plus a live
//!   auth-state stream.
//! - [`Principal`] — the authenticated subject (ID + email), *not* a
//!   user profile; the session binder resolves profiles separately.
//! - [`MemoryIdentity`] — in-process provider with Argon2id hashing,
//!   used by demo mode and tests.

pub mod error;
pub mod memory;
pub mod password;
pub mod provider;

pub use error::IdentityError;
pub use memory::MemoryIdentity;
pub use provider::{IdentityProvider, Principal};
