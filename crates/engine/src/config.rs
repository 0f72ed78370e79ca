//! Environment-driven configuration for the `deskd` binary.
//!
//! | Variable              | Default        | Meaning                                   |
//! |-----------------------|----------------|-------------------------------------------|
//! | `DESKLINE_TENANT`     | —              | Registry slug of the tenant to connect to |
//! | `DESKLINE_MAGIC_LINK` | —              | Magic-link token overriding the registry  |
//! | `DESKLINE_REGISTRY`   | `tenants.json` | Path to the tenant registry file          |
//! | `DESKLINE_STATE_DIR`  | `.deskline`    | Directory for remembered state            |
//! | `DESKLINE_DEMO`       | unset          | Force demo mode when set to `1`/`true`    |
//!
//! Log filtering follows the usual `RUST_LOG` convention.

use std::path::PathBuf;

/// Runtime configuration, resolved once at startup.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub tenant_slug: Option<String>,
    pub magic_link: Option<String>,
    pub registry_path: PathBuf,
    pub state_dir: PathBuf,
    pub force_demo: bool,
}

impl EngineConfig {
    pub fn from_env() -> Self {
        Self {
            tenant_slug: read("DESKLINE_TENANT"),
            magic_link: read("DESKLINE_MAGIC_LINK"),
            registry_path: read("DESKLINE_REGISTRY")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("tenants.json")),
            state_dir: read("DESKLINE_STATE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(".deskline")),
            force_demo: read("DESKLINE_DEMO")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
        }
    }

    /// Where the chosen tenant profile is remembered between sessions.
    pub fn tenant_file(&self) -> PathBuf {
        self.state_dir.join("tenant.json")
    }
}

fn read(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
