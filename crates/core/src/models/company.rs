//! Company entity model.

use serde::{Deserialize, Serialize};

use crate::models::Record;
use crate::types::EntityId;

/// A tenant's company. In the common case there is exactly one per
/// tenant; only the display name is mutable, and companies are never
/// deleted in normal flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Company {
    #[serde(default)]
    pub id: EntityId,
    pub name: String,
}

impl Record for Company {
    const COLLECTION: &'static str = "companies";
    const ENTITY: &'static str = "Company";

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: EntityId) {
        self.id = id;
    }
}
