//! In-process identity provider.
//!
//! Backs demo mode and the test suite. Identities live in a map keyed by
//! email; passwords are stored as Argon2id PHC hashes, never plaintext,
//! even in memory.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::{watch, RwLock};

use crate::error::IdentityError;
use crate::password::{hash_password, verify_password};
use crate::provider::{IdentityProvider, Principal};

struct StoredIdentity {
    id: String,
    password_hash: String,
}

/// A [`IdentityProvider`] holding identities in process memory.
pub struct MemoryIdentity {
    identities: RwLock<HashMap<String, StoredIdentity>>,
    auth: watch::Sender<Option<Principal>>,
    next_id: AtomicU64,
}

impl MemoryIdentity {
    pub fn new() -> Self {
        let (auth, _) = watch::channel(None);
        Self {
            identities: RwLock::new(HashMap::new()),
            auth,
            next_id: AtomicU64::new(1),
        }
    }

    fn allocate_id(&self) -> String {
        format!("idp-{}", self.next_id.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for MemoryIdentity {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IdentityProvider for MemoryIdentity {
    async fn sign_in(&self, email: &str, password: &str) -> Result<Principal, IdentityError> {
        let identities = self.identities.read().await;
        let stored = identities
            .get(email)
            .ok_or(IdentityError::InvalidCredentials)?;

        let matches = verify_password(password, &stored.password_hash)
            .map_err(|e| IdentityError::Provider(e.to_string()))?;
        if !matches {
            return Err(IdentityError::InvalidCredentials);
        }

        let principal = Principal {
            id: stored.id.clone(),
            email: email.to_string(),
        };
        let _ = self.auth.send(Some(principal.clone()));
        tracing::debug!(email, "Signed in");
        Ok(principal)
    }

    async fn create_identity(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Principal, IdentityError> {
        let mut identities = self.identities.write().await;
        if identities.contains_key(email) {
            return Err(IdentityError::AlreadyExists(email.to_string()));
        }

        let password_hash =
            hash_password(password).map_err(|e| IdentityError::Provider(e.to_string()))?;
        let id = self.allocate_id();
        identities.insert(
            email.to_string(),
            StoredIdentity {
                id: id.clone(),
                password_hash,
            },
        );

        let principal = Principal {
            id,
            email: email.to_string(),
        };
        let _ = self.auth.send(Some(principal.clone()));
        Ok(principal)
    }

    async fn sign_out(&self) -> Result<(), IdentityError> {
        let _ = self.auth.send(None);
        Ok(())
    }

    fn watch_auth(&self) -> watch::Receiver<Option<Principal>> {
        self.auth.subscribe()
    }
}
