//! Tenant resolution and persistence.
//!
//! A tenant is one customer's backing store: endpoint, API key and
//! project ID, optionally with asset-hosting credentials. Profiles are
//! resolved from a registry by slug or decoded from a magic link, and
//! the chosen profile is remembered on disk so later sessions skip the
//! chooser.
//!
//! Credentials select which tenant store to talk to; they are not user
//! authentication. Who the user is comes from the identity provider and
//! the session binder.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use deskline_core::CoreError;
use deskline_store::{RemoteConfig, UploadProfile};

fn default_endpoint() -> String {
    "wss://sync.deskline.app".to_string()
}

/// Connection profile for one tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantProfile {
    /// Registry key; empty for profiles decoded from a magic link.
    #[serde(default)]
    pub slug: String,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    pub api_key: String,
    pub project_id: String,
    /// Asset hosting, when the tenant has it configured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload: Option<UploadProfile>,
}

impl TenantProfile {
    pub fn remote_config(&self) -> RemoteConfig {
        RemoteConfig {
            endpoint: self.endpoint.clone(),
            api_key: self.api_key.clone(),
            project_id: self.project_id.clone(),
        }
    }

    fn check(self) -> Result<Self, CoreError> {
        if self.api_key.trim().is_empty() || self.project_id.trim().is_empty() {
            return Err(CoreError::Validation(
                "Tenant profile must carry an API key and a project ID".into(),
            ));
        }
        Ok(self)
    }
}

/// Where the engine stands with respect to a tenant.
#[derive(Debug, Clone)]
pub enum TenantState {
    /// No tenant chosen; the engine runs in demo mode if at all.
    None,
    /// A profile is known but the store could not be reached.
    Unreachable(TenantProfile),
    /// Connected and synchronizing.
    Ready(TenantProfile),
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Slug-keyed collection of tenant profiles, loaded from a JSON file.
#[derive(Debug, Default, Deserialize)]
#[serde(transparent)]
pub struct TenantRegistry {
    profiles: HashMap<String, TenantProfile>,
}

impl TenantRegistry {
    pub fn from_json(raw: &str) -> Result<Self, CoreError> {
        serde_json::from_str(raw)
            .map_err(|e| CoreError::Validation(format!("Malformed tenant registry: {e}")))
    }

    pub fn load(path: &Path) -> Result<Self, CoreError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            CoreError::Internal(format!("Cannot read tenant registry {}: {e}", path.display()))
        })?;
        Self::from_json(&raw)
    }

    /// Look up a profile by slug. Matching is case-insensitive and
    /// ignores surrounding whitespace; the returned profile carries the
    /// canonical slug.
    pub fn lookup(&self, slug: &str) -> Option<TenantProfile> {
        let wanted = slug.trim().to_ascii_lowercase();
        self.profiles.iter().find_map(|(key, profile)| {
            (key.to_ascii_lowercase() == wanted).then(|| {
                let mut profile = profile.clone();
                profile.slug = key.clone();
                profile
            })
        })
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }
}

// ---------------------------------------------------------------------------
// Magic links
// ---------------------------------------------------------------------------

/// Decode a magic-link token into a tenant profile.
///
/// The token is URL-safe base64 over the profile's JSON. Tokens missing
/// the API key or project ID are rejected as a whole; there is no
/// partial acceptance.
pub fn parse_magic_link(token: &str) -> Result<TenantProfile, CoreError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(token.trim())
        .map_err(|e| CoreError::Validation(format!("Malformed magic link: {e}")))?;
    let profile: TenantProfile = serde_json::from_slice(&bytes)
        .map_err(|e| CoreError::Validation(format!("Malformed magic link payload: {e}")))?;
    profile.check()
}

/// Encode a profile as a magic-link token. Inverse of
/// [`parse_magic_link`].
pub fn encode_magic_link(profile: &TenantProfile) -> Result<String, CoreError> {
    let bytes = serde_json::to_vec(profile)
        .map_err(|e| CoreError::Internal(format!("Cannot encode magic link: {e}")))?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

/// Remembers the chosen tenant profile across sessions.
///
/// Recall fails soft: a missing or corrupt file logs and yields `None`,
/// sending the user back through tenant selection rather than crashing
/// startup.
#[derive(Debug, Clone)]
pub struct TenantPersistence {
    path: PathBuf,
}

impl TenantPersistence {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn remember(&self, profile: &TenantProfile) -> Result<(), CoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                CoreError::Internal(format!("Cannot create {}: {e}", parent.display()))
            })?;
        }
        let raw = serde_json::to_string_pretty(profile)
            .map_err(|e| CoreError::Internal(format!("Cannot encode tenant profile: {e}")))?;
        std::fs::write(&self.path, raw).map_err(|e| {
            CoreError::Internal(format!("Cannot write {}: {e}", self.path.display()))
        })
    }

    pub fn recall(&self) -> Option<TenantProfile> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return None,
            Err(error) => {
                tracing::warn!(path = %self.path.display(), %error, "Cannot read stored tenant");
                return None;
            }
        };
        match serde_json::from_str::<TenantProfile>(&raw) {
            Ok(profile) => profile.check().ok(),
            Err(error) => {
                tracing::warn!(path = %self.path.display(), %error, "Stored tenant is corrupt");
                None
            }
        }
    }

    pub fn clear(&self) {
        if let Err(error) = std::fs::remove_file(&self.path) {
            if error.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %self.path.display(), %error, "Cannot clear stored tenant");
            }
        }
    }
}
