//! Session binding: principal -> user profile.
//!
//! The identity provider says *who authenticated*; the synchronized
//! users collection says *who they are here* (role, company, unit). The
//! binder joins the two: it follows the provider's auth stream, resolves
//! each principal against the mirrored profiles, and re-resolves when
//! the profiles themselves change — a profile created moments after the
//! identity (as during first-run setup) binds as soon as its push lands.

use std::sync::Arc;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use deskline_core::models::User;
use deskline_core::roles::Role;
use deskline_core::types::EntityId;
use deskline_identity::{IdentityProvider, Principal};

use crate::engine::SyncEngine;
use crate::error::EngineError;
use crate::events::EventKind;

/// The resolved acting user for this session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUser {
    pub id: EntityId,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub company_id: EntityId,
    pub unit_id: Option<EntityId>,
    /// False when the principal authenticated but no profile matched;
    /// such users get a minimal unprivileged stand-in until an admin
    /// provisions them.
    pub provisioned: bool,
}

impl CurrentUser {
    fn from_profile(profile: &User) -> Self {
        Self {
            id: profile.id.clone(),
            name: profile.name.clone(),
            email: profile.email.clone(),
            role: profile.role,
            company_id: profile.company_id.clone(),
            unit_id: profile.unit_id.clone(),
            provisioned: true,
        }
    }

    /// Stand-in for an authenticated principal with no profile yet.
    /// Always the least-privileged role and bound to no unit.
    fn unprovisioned(principal: &Principal) -> Self {
        let name = principal
            .email
            .split('@')
            .next()
            .unwrap_or(&principal.email)
            .to_string();
        Self {
            id: principal.id.clone(),
            name,
            email: principal.email.clone(),
            role: Role::User,
            company_id: String::new(),
            unit_id: None,
            provisioned: false,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn is_leader(&self) -> bool {
        self.role == Role::Leader
    }
}

/// Joins the identity provider's auth stream with the users mirror.
pub struct SessionBinder {
    engine: Arc<SyncEngine>,
    provider: Arc<dyn IdentityProvider>,
    current: watch::Sender<Option<CurrentUser>>,
}

impl SessionBinder {
    pub fn new(engine: Arc<SyncEngine>, provider: Arc<dyn IdentityProvider>) -> Arc<Self> {
        let (current, _) = watch::channel(None);
        Arc::new(Self {
            engine,
            provider,
            current,
        })
    }

    /// Current binding snapshot.
    pub fn current(&self) -> Option<CurrentUser> {
        self.current.borrow().clone()
    }

    /// Live binding stream.
    pub fn watch_current(&self) -> watch::Receiver<Option<CurrentUser>> {
        self.current.subscribe()
    }

    /// Sign in. The binding is resolved immediately rather than waiting
    /// for the auth stream, so the caller observes a bound session on
    /// return.
    pub async fn login(&self, email: &str, password: &str) -> Result<CurrentUser, EngineError> {
        let principal = self.provider.sign_in(email, password).await?;
        let user = self.resolve(&principal).await;
        self.current.send_replace(Some(user.clone()));
        tracing::info!(user = %user.id, provisioned = user.provisioned, "Session bound");
        Ok(user)
    }

    /// Sign out. The local binding is dropped immediately; a provider
    /// failure afterwards cannot resurrect the session.
    pub async fn logout(&self) {
        self.current.send_replace(None);
        if let Err(error) = self.provider.sign_out().await {
            tracing::warn!(%error, "Provider sign-out failed");
        }
    }

    /// Follow the auth stream and the users mirror until the provider
    /// goes away.
    ///
    /// The streams are subscribed before the task is spawned, so a
    /// sign-in landing between this call and the task's first poll is
    /// still observed.
    pub fn run(self: Arc<Self>) -> JoinHandle<()> {
        let mut auth = self.provider.watch_auth();
        let mut events = self.engine.events();
        tokio::spawn(async move {
            let already_signed_in = auth.borrow_and_update().clone();
            if let Some(principal) = already_signed_in {
                self.rebind(&principal).await;
            }
            loop {
                tokio::select! {
                    changed = auth.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let principal = auth.borrow_and_update().clone();
                        match principal {
                            Some(principal) => self.rebind(&principal).await,
                            None => {
                                self.current.send_replace(None);
                            }
                        }
                    }
                    event = events.recv() => match event {
                        Ok(event) if event.kind == EventKind::UsersChanged => {
                            let principal = auth.borrow().clone();
                            if let Some(principal) = principal {
                                self.rebind(&principal).await;
                            }
                        }
                        Ok(_) => {}
                        Err(broadcast::error::RecvError::Lagged(_)) => {}
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
        })
    }

    async fn rebind(&self, principal: &Principal) {
        let user = self.resolve(principal).await;
        self.current.send_if_modified(|slot| {
            if slot.as_ref() == Some(&user) {
                return false;
            }
            *slot = Some(user.clone());
            true
        });
    }

    /// Match a principal to a profile by external ID first, then email
    /// (case-insensitive). No match yields the unprovisioned stand-in.
    async fn resolve(&self, principal: &Principal) -> CurrentUser {
        let users = self.engine.users().await;
        let by_external = users
            .iter()
            .find(|u| u.external_id.as_deref() == Some(principal.id.as_str()));
        let by_email = || {
            users
                .iter()
                .find(|u| u.email.eq_ignore_ascii_case(&principal.email))
        };
        match by_external.or_else(by_email) {
            Some(profile) => CurrentUser::from_profile(profile),
            None => {
                tracing::debug!(email = %principal.email, "No profile for principal");
                CurrentUser::unprovisioned(principal)
            }
        }
    }
}
