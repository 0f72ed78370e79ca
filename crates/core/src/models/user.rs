//! User profile model and DTOs.
//!
//! A profile associates an externally-authenticated principal (matched by
//! email or external ID) with a company, an optional unit, and a role.
//! Deleting a profile removes only this record; it does not revoke the
//! external identity (documented gap).

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::Record;
use crate::roles::Role;
use crate::types::EntityId;

/// A user profile within a company.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(default)]
    pub id: EntityId,
    pub company_id: EntityId,
    /// Required for non-admin roles; absent for admins.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_id: Option<EntityId>,
    pub name: String,
    pub email: String,
    pub role: Role,
    /// External identity-provider subject, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
}

impl Record for User {
    const COLLECTION: &'static str = "users";
    const ENTITY: &'static str = "User";

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: EntityId) {
        self.id = id;
    }
}

/// DTO for creating a user profile.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    pub company_id: EntityId,
    pub unit_id: Option<EntityId>,
    #[validate(length(min = 1, message = "Name is required"))]
    pub name: String,
    #[validate(email(message = "A valid email address is required"))]
    pub email: String,
    pub role: Role,
}

/// DTO for updating a user profile. All fields are optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUser {
    pub unit_id: Option<EntityId>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub role: Option<Role>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use validator::Validate;

    fn new_user(email: &str) -> NewUser {
        NewUser {
            company_id: "c1".into(),
            unit_id: Some("u1".into()),
            name: "Dana".into(),
            email: email.into(),
            role: Role::User,
        }
    }

    #[test]
    fn valid_user_passes_validation() {
        assert!(new_user("dana@example.com").validate().is_ok());
    }

    #[test]
    fn malformed_email_fails_validation() {
        assert!(new_user("not-an-email").validate().is_err());
    }
}
