//! Unit entity model and DTOs.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::Record;
use crate::types::EntityId;

/// An organizational unit within a company.
///
/// Deleting a unit does not cascade-clean `unit_id` references on users
/// or requests; stale references are a documented gap, mirrored from the
/// product's behavior, not cleaned up silently.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Unit {
    #[serde(default)]
    pub id: EntityId,
    pub company_id: EntityId,
    pub name: String,
    pub location: String,
}

impl Record for Unit {
    const COLLECTION: &'static str = "units";
    const ENTITY: &'static str = "Unit";

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: EntityId) {
        self.id = id;
    }
}

/// DTO for creating a unit.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewUnit {
    pub company_id: EntityId,
    #[validate(length(min = 1, message = "Unit name is required"))]
    pub name: String,
    pub location: String,
}
