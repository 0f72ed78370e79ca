//! Optimistic mutations.
//!
//! Every mutation applies to the local mirrors first, then issues the
//! durable write. What happens when the durable write fails is not
//! inferred per call site; it comes from one policy table
//! ([`WritePolicy::of`]):
//!
//! - `Rollback` — the local change is reverted exactly and the caller
//!   gets [`EngineError::NotSaved`]. Creations and deletions, where a
//!   phantom record would mislead.
//! - `BestEffort` — the failure is logged and local state stands; the
//!   next subscription push reconciles. Cosmetic or easily-retried
//!   patches.
//!
//! First-run provisioning and system reset sit apart from the table:
//! both are multi-path writes that either land whole or fail hard with
//! no optimistic application.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value;
use validator::Validate;

use deskline_core::models::{
    Attachment, Comment, Company, NewComment, NewRequest, NewUnit, NewUser, RequestTicket, Unit,
    UpdateRequest, UpdateUser, User,
};
use deskline_core::roles::Role;
use deskline_core::sanitize::{clean_optional, clean_text, is_blank};
use deskline_core::status::Status;
use deskline_core::types::{generate_id, EntityId, Timestamp};
use deskline_core::{CoreError, Record};
use deskline_identity::{IdentityError, IdentityProvider};
use deskline_store::{to_store_value, AssetUploader, StoreError};

use crate::engine::{Collections, SyncEngine};
use crate::error::EngineError;

/// Name of the unit created for a freshly provisioned company.
pub const DEFAULT_UNIT_NAME: &str = "General";

// ---------------------------------------------------------------------------
// Policy table
// ---------------------------------------------------------------------------

/// Every optimistic mutation the engine exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    AddRequest,
    UpdateRequest,
    UpdateRequestStatus,
    BulkUpdateRequestStatus,
    MarkRequestViewed,
    DeleteRequest,
    AddComment,
    AddUnit,
    DeleteUnit,
    AddUser,
    UpdateUser,
    DeleteUser,
    UpdateCompany,
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::AddRequest => "add_request",
            Operation::UpdateRequest => "update_request",
            Operation::UpdateRequestStatus => "update_request_status",
            Operation::BulkUpdateRequestStatus => "bulk_update_request_status",
            Operation::MarkRequestViewed => "mark_request_viewed",
            Operation::DeleteRequest => "delete_request",
            Operation::AddComment => "add_comment",
            Operation::AddUnit => "add_unit",
            Operation::DeleteUnit => "delete_unit",
            Operation::AddUser => "add_user",
            Operation::UpdateUser => "update_user",
            Operation::DeleteUser => "delete_user",
            Operation::UpdateCompany => "update_company",
        }
    }
}

/// What a failed durable write does to the optimistic local change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WritePolicy {
    /// Revert the local change exactly and surface the error.
    Rollback,
    /// Log and keep the local change; the next push reconciles.
    BestEffort,
}

impl WritePolicy {
    /// The policy table. Creations and deletions of primary records roll
    /// back; field patches are best-effort.
    pub const fn of(op: Operation) -> WritePolicy {
        match op {
            Operation::AddRequest
            | Operation::DeleteRequest
            | Operation::AddComment
            | Operation::AddUnit
            | Operation::AddUser => WritePolicy::Rollback,
            Operation::UpdateRequest
            | Operation::UpdateRequestStatus
            | Operation::BulkUpdateRequestStatus
            | Operation::MarkRequestViewed
            | Operation::DeleteUnit
            | Operation::UpdateUser
            | Operation::DeleteUser
            | Operation::UpdateCompany => WritePolicy::BestEffort,
        }
    }
}

fn value_of<T: Serialize>(value: &T) -> Result<Value, EngineError> {
    Ok(serde_json::to_value(value).map_err(StoreError::from)?)
}

// ---------------------------------------------------------------------------
// Mutations
// ---------------------------------------------------------------------------

impl SyncEngine {
    /// Apply the policy table to a finished durable write.
    async fn finish_write(
        &self,
        op: Operation,
        result: Result<(), StoreError>,
        rollback: impl FnOnce(&mut Collections),
    ) -> Result<(), EngineError> {
        let Err(error) = result else { return Ok(()) };
        match WritePolicy::of(op) {
            WritePolicy::BestEffort => {
                tracing::warn!(op = op.name(), %error, "Durable write failed; local change stands");
                Ok(())
            }
            WritePolicy::Rollback => {
                rollback(&mut *self.inner.collections.write().await);
                tracing::error!(op = op.name(), %error, "Durable write rejected; rolled back");
                Err(EngineError::NotSaved(error.to_string()))
            }
        }
    }

    // -- requests -----------------------------------------------------------

    /// Create a request ticket.
    ///
    /// The draft is validated before anything is touched, then free-text
    /// fields are sanitized. New tickets start in [`Status::Sent`] with
    /// `created_at == updated_at` and unseen by any assignee.
    pub async fn add_request(&self, draft: NewRequest) -> Result<RequestTicket, EngineError> {
        draft.validate().map_err(CoreError::from)?;
        let adapter = self.adapter().await?;
        let now = chrono::Utc::now();
        let ticket = RequestTicket {
            id: generate_id(),
            company_id: draft.company_id,
            unit_id: draft.unit_id,
            creator_id: draft.creator_id,
            assignee_id: None,
            title: clean_text(&draft.title),
            description: clean_text(&draft.description),
            product_url: clean_optional(draft.product_url.as_deref()),
            status: Status::Sent,
            priority: draft.priority,
            created_at: now,
            updated_at: Some(now),
            attachments: draft.attachments,
            viewed_by_assignee: false,
        };

        self.inner
            .collections
            .write()
            .await
            .requests
            .insert(0, ticket.clone());

        let result = adapter.set(&ticket).await;
        let id = ticket.id.clone();
        self.finish_write(Operation::AddRequest, result, |c| {
            c.requests.retain(|r| r.id != id);
        })
        .await?;

        tracing::info!(request = %ticket.id, "Request created");
        Ok(ticket)
    }

    /// Patch a request's editable fields. Absent fields are untouched;
    /// present free-text fields are sanitized, and a present product URL
    /// must carry its scheme just as on creation.
    pub async fn update_request(
        &self,
        id: &str,
        changes: UpdateRequest,
    ) -> Result<(), EngineError> {
        changes.validate().map_err(CoreError::from)?;
        let adapter = self.adapter().await?;
        let now = chrono::Utc::now();
        let title = changes.title.as_deref().map(clean_text);
        let description = changes.description.as_deref().map(clean_text);
        let product_url = clean_optional(changes.product_url.as_deref());

        let mut fields = serde_json::Map::new();
        if let Some(title) = &title {
            fields.insert("title".into(), Value::String(title.clone()));
        }
        if let Some(description) = &description {
            fields.insert("description".into(), Value::String(description.clone()));
        }
        if let Some(url) = &product_url {
            fields.insert("productUrl".into(), Value::String(url.clone()));
        }
        if let Some(priority) = &changes.priority {
            fields.insert("priority".into(), value_of(priority)?);
        }
        if let Some(assignee) = &changes.assignee_id {
            fields.insert("assigneeId".into(), Value::String(assignee.clone()));
        }
        fields.insert("updatedAt".into(), value_of(&now)?);

        {
            let mut collections = self.inner.collections.write().await;
            let ticket = find_request(&mut collections, id)?;
            if let Some(title) = title {
                ticket.title = title;
            }
            if let Some(description) = description {
                ticket.description = description;
            }
            if let Some(url) = product_url {
                ticket.product_url = Some(url);
            }
            if let Some(priority) = changes.priority {
                ticket.priority = priority;
            }
            if let Some(assignee) = changes.assignee_id {
                ticket.assignee_id = Some(assignee);
            }
            ticket.updated_at = Some(now);
        }

        let result = adapter.update(RequestTicket::COLLECTION, id, fields).await;
        self.finish_write(Operation::UpdateRequest, result, |_| {})
            .await
    }

    /// Move a ticket to a new workflow status, refreshing its activity
    /// timestamp. Any transition is accepted; the fixed workflow in
    /// [`Status::can_transition`] is advisory for the surfaces above.
    pub async fn update_request_status(
        &self,
        id: &str,
        status: Status,
    ) -> Result<(), EngineError> {
        let adapter = self.adapter().await?;
        let now = chrono::Utc::now();
        {
            let mut collections = self.inner.collections.write().await;
            let ticket = find_request(&mut collections, id)?;
            ticket.status = status;
            ticket.updated_at = Some(now);
        }

        let mut fields = serde_json::Map::new();
        fields.insert("status".into(), value_of(&status)?);
        fields.insert("updatedAt".into(), value_of(&now)?);

        let result = adapter.update(RequestTicket::COLLECTION, id, fields).await;
        self.finish_write(Operation::UpdateRequestStatus, result, |_| {})
            .await
    }

    /// Move several tickets to one status as a single durable write.
    ///
    /// Exactly one multi-path write leaves the engine regardless of how
    /// many tickets are selected; partial application would leave the
    /// selection observably half-moved. IDs not present locally are
    /// still written, so an admin can sweep tickets beyond the mirrored
    /// window.
    pub async fn bulk_update_request_status(
        &self,
        ids: &[EntityId],
        status: Status,
    ) -> Result<(), EngineError> {
        if ids.is_empty() {
            return Ok(());
        }
        let adapter = self.adapter().await?;
        let now = chrono::Utc::now();
        let status_value = value_of(&status)?;
        let now_value = value_of(&now)?;

        {
            let mut collections = self.inner.collections.write().await;
            for ticket in collections
                .requests
                .iter_mut()
                .filter(|r| ids.contains(&r.id))
            {
                ticket.status = status;
                ticket.updated_at = Some(now);
            }
        }

        let mut updates = HashMap::with_capacity(ids.len() * 2);
        for id in ids {
            updates.insert(format!("requests/{id}/status"), status_value.clone());
            updates.insert(format!("requests/{id}/updatedAt"), now_value.clone());
        }

        let result = adapter.update_multi(updates).await;
        self.finish_write(Operation::BulkUpdateRequestStatus, result, |_| {})
            .await
    }

    /// Record that the assignee opened the ticket. Does not refresh the
    /// activity timestamp; viewing is not activity and must not reorder
    /// the list.
    pub async fn mark_request_viewed(&self, id: &str) -> Result<(), EngineError> {
        let adapter = self.adapter().await?;
        {
            let mut collections = self.inner.collections.write().await;
            let ticket = find_request(&mut collections, id)?;
            if ticket.viewed_by_assignee {
                return Ok(());
            }
            ticket.viewed_by_assignee = true;
        }

        let mut fields = serde_json::Map::new();
        fields.insert("viewedByAssignee".into(), Value::Bool(true));

        let result = adapter.update(RequestTicket::COLLECTION, id, fields).await;
        self.finish_write(Operation::MarkRequestViewed, result, |_| {})
            .await
    }

    /// Delete a request ticket. Its comment thread is left in place;
    /// references are never cascade-cleaned.
    pub async fn delete_request(&self, id: &str) -> Result<(), EngineError> {
        let adapter = self.adapter().await?;
        let (position, removed) = {
            let mut collections = self.inner.collections.write().await;
            let position = collections
                .requests
                .iter()
                .position(|r| r.id == id)
                .ok_or_else(|| not_found::<RequestTicket>(id))?;
            (position, collections.requests.remove(position))
        };

        let result = adapter.remove(RequestTicket::COLLECTION, id).await;
        self.finish_write(Operation::DeleteRequest, result, |c| {
            let at = position.min(c.requests.len());
            c.requests.insert(at, removed);
        })
        .await
    }

    // -- comments -----------------------------------------------------------

    /// Append a comment to a ticket's thread and touch the parent's
    /// activity timestamp so the ticket bubbles up.
    ///
    /// The comment write rolls back (comment and parent touch together)
    /// on rejection. The parent touch itself is best-effort: if only the
    /// touch fails the comment stands and the ordering catches up on the
    /// next push.
    pub async fn add_comment(&self, draft: NewComment) -> Result<Comment, EngineError> {
        let content = clean_text(&draft.content);
        if is_blank(&content) {
            return Err(CoreError::Validation("Comment text is required".into()).into());
        }

        let adapter = self.adapter().await?;
        let now = chrono::Utc::now();
        let comment = Comment {
            id: generate_id(),
            request_id: draft.request_id,
            user_id: draft.user_id,
            content,
            created_at: now,
            is_internal: draft.is_internal,
        };

        // Parent may be outside the mirrored window; the touch is then
        // remote-only.
        let previous_touch: Option<Option<Timestamp>> = {
            let mut collections = self.inner.collections.write().await;
            collections.comments.push(comment.clone());
            collections
                .requests
                .iter_mut()
                .find(|r| r.id == comment.request_id)
                .map(|ticket| {
                    let previous = ticket.updated_at;
                    ticket.updated_at = Some(now);
                    previous
                })
        };

        let result = adapter.set(&comment).await;
        let comment_id = comment.id.clone();
        let request_id = comment.request_id.clone();
        self.finish_write(Operation::AddComment, result, |c| {
            c.comments.retain(|existing| existing.id != comment_id);
            if let Some(previous) = previous_touch {
                if let Some(ticket) = c.requests.iter_mut().find(|r| r.id == request_id) {
                    ticket.updated_at = previous;
                }
            }
        })
        .await?;

        let mut touch = serde_json::Map::new();
        touch.insert("updatedAt".into(), value_of(&now)?);
        if let Err(error) = adapter
            .update(RequestTicket::COLLECTION, &comment.request_id, touch)
            .await
        {
            tracing::warn!(request = %comment.request_id, %error, "Parent activity touch failed");
        }

        Ok(comment)
    }

    // -- attachments --------------------------------------------------------

    /// The asset uploader for the current session: tenant-configured
    /// hosting when the profile carries it, inline data-URL fallback
    /// otherwise (demo sessions always inline).
    pub async fn asset_uploader(&self) -> Result<AssetUploader, EngineError> {
        let mode = self.mode().await.ok_or(EngineError::NotStarted)?;
        let profile = match mode {
            crate::engine::EngineMode::Connected(profile) => profile.upload,
            crate::engine::EngineMode::Demo => None,
        };
        Ok(AssetUploader::new(profile))
    }

    /// Upload an image payload and return the [`Attachment`] to embed in
    /// a request draft. Nothing is written to the store here; the
    /// attachment travels with the request it belongs to.
    pub async fn upload_attachment(
        &self,
        name: &str,
        mime: &str,
        bytes: Vec<u8>,
    ) -> Result<Attachment, EngineError> {
        let uploader = self.asset_uploader().await?;
        let url = uploader.upload(mime, bytes).await?;
        Ok(Attachment {
            id: generate_id(),
            name: clean_text(name),
            url,
            kind: mime.split('/').next().unwrap_or("file").to_string(),
        })
    }

    // -- units --------------------------------------------------------------

    /// Create a unit.
    pub async fn add_unit(&self, draft: NewUnit) -> Result<Unit, EngineError> {
        draft.validate().map_err(CoreError::from)?;
        let adapter = self.adapter().await?;
        let unit = Unit {
            id: generate_id(),
            company_id: draft.company_id,
            name: clean_text(&draft.name),
            location: clean_text(&draft.location),
        };

        self.inner.collections.write().await.units.push(unit.clone());

        let result = adapter.set(&unit).await;
        let id = unit.id.clone();
        self.finish_write(Operation::AddUnit, result, |c| {
            c.units.retain(|u| u.id != id);
        })
        .await?;
        Ok(unit)
    }

    /// Delete a unit. Users and requests keep their `unit_id` references;
    /// stale references are surfaced, not silently cleaned.
    pub async fn delete_unit(&self, id: &str) -> Result<(), EngineError> {
        let adapter = self.adapter().await?;
        {
            let mut collections = self.inner.collections.write().await;
            let before = collections.units.len();
            collections.units.retain(|u| u.id != id);
            if collections.units.len() == before {
                return Err(not_found::<Unit>(id).into());
            }
        }

        let result = adapter.remove(Unit::COLLECTION, id).await;
        self.finish_write(Operation::DeleteUnit, result, |_| {}).await
    }

    // -- users --------------------------------------------------------------

    /// Create a user profile. Non-admin roles must carry a unit.
    pub async fn add_user(&self, draft: NewUser) -> Result<User, EngineError> {
        draft.validate().map_err(CoreError::from)?;
        if draft.role.requires_unit() && draft.unit_id.is_none() {
            return Err(CoreError::Validation(
                "A unit is required for non-admin users".into(),
            )
            .into());
        }

        let adapter = self.adapter().await?;
        let user = User {
            id: generate_id(),
            company_id: draft.company_id,
            unit_id: draft.unit_id,
            name: clean_text(&draft.name),
            email: draft.email.trim().to_ascii_lowercase(),
            role: draft.role,
            external_id: None,
        };

        self.inner.collections.write().await.users.push(user.clone());

        let result = adapter.set(&user).await;
        let id = user.id.clone();
        self.finish_write(Operation::AddUser, result, |c| {
            c.users.retain(|u| u.id != id);
        })
        .await?;
        Ok(user)
    }

    /// Patch a user profile's fields.
    pub async fn update_user(&self, id: &str, changes: UpdateUser) -> Result<(), EngineError> {
        let adapter = self.adapter().await?;
        let name = changes.name.as_deref().map(clean_text);

        let mut fields = serde_json::Map::new();
        if let Some(name) = &name {
            fields.insert("name".into(), Value::String(name.clone()));
        }
        if let Some(email) = &changes.email {
            fields.insert(
                "email".into(),
                Value::String(email.trim().to_ascii_lowercase()),
            );
        }
        if let Some(unit_id) = &changes.unit_id {
            fields.insert("unitId".into(), Value::String(unit_id.clone()));
        }
        if let Some(role) = &changes.role {
            fields.insert("role".into(), value_of(role)?);
        }

        {
            let mut collections = self.inner.collections.write().await;
            let user = collections
                .users
                .iter_mut()
                .find(|u| u.id == id)
                .ok_or_else(|| not_found::<User>(id))?;
            if let Some(name) = name {
                user.name = name;
            }
            if let Some(email) = changes.email {
                user.email = email.trim().to_ascii_lowercase();
            }
            if let Some(unit_id) = changes.unit_id {
                user.unit_id = Some(unit_id);
            }
            if let Some(role) = changes.role {
                user.role = role;
            }
        }

        let result = adapter.update(User::COLLECTION, id, fields).await;
        self.finish_write(Operation::UpdateUser, result, |_| {}).await
    }

    /// Delete a user profile. The external identity, if any, is not
    /// revoked; the principal simply no longer resolves to a profile.
    pub async fn delete_user(&self, id: &str) -> Result<(), EngineError> {
        let adapter = self.adapter().await?;
        {
            let mut collections = self.inner.collections.write().await;
            let before = collections.users.len();
            collections.users.retain(|u| u.id != id);
            if collections.users.len() == before {
                return Err(not_found::<User>(id).into());
            }
        }

        let result = adapter.remove(User::COLLECTION, id).await;
        self.finish_write(Operation::DeleteUser, result, |_| {}).await
    }

    // -- company ------------------------------------------------------------

    /// Rename a company.
    pub async fn update_company(&self, id: &str, name: &str) -> Result<(), EngineError> {
        let name = clean_text(name);
        if is_blank(&name) {
            return Err(CoreError::Validation("Company name is required".into()).into());
        }

        let adapter = self.adapter().await?;
        {
            let mut collections = self.inner.collections.write().await;
            let company = collections
                .companies
                .iter_mut()
                .find(|c| c.id == id)
                .ok_or_else(|| not_found::<Company>(id))?;
            company.name = name.clone();
        }

        let mut fields = serde_json::Map::new();
        fields.insert("name".into(), Value::String(name));

        let result = adapter.update(Company::COLLECTION, id, fields).await;
        self.finish_write(Operation::UpdateCompany, result, |_| {})
            .await
    }
}

// ---------------------------------------------------------------------------
// Provisioning and reset
// ---------------------------------------------------------------------------

/// First-run provisioning input.
#[derive(Debug, Clone, Validate)]
pub struct SetupInput {
    #[validate(length(min = 1, message = "Company name is required"))]
    pub company_name: String,
    #[validate(length(min = 1, message = "Administrator name is required"))]
    pub admin_name: String,
    #[validate(email(message = "A valid administrator email is required"))]
    pub admin_email: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub admin_password: String,
}

impl SyncEngine {
    /// Provision a fresh tenant: register the administrator identity,
    /// then place the company, a default unit, and the admin profile in
    /// one multi-path write.
    ///
    /// If the identity already exists the password is tried as a
    /// sign-in, so re-running setup after a half-finished attempt does
    /// not dead-end. There is no optimistic application and no rollback
    /// here; failure leaves the store untouched and surfaces
    /// [`EngineError::Setup`].
    pub async fn setup_system(
        &self,
        identity: &dyn IdentityProvider,
        input: SetupInput,
    ) -> Result<User, EngineError> {
        input.validate().map_err(CoreError::from)?;
        let email = input.admin_email.trim().to_ascii_lowercase();

        let principal = match identity.create_identity(&email, &input.admin_password).await {
            Ok(principal) => principal,
            Err(IdentityError::AlreadyExists(_)) => {
                tracing::info!(%email, "Identity already exists; retrying as sign-in");
                identity
                    .sign_in(&email, &input.admin_password)
                    .await
                    .map_err(|e| EngineError::Setup(e.to_string()))?
            }
            Err(error) => return Err(EngineError::Setup(error.to_string())),
        };

        let company = Company {
            id: generate_id(),
            name: clean_text(&input.company_name),
        };
        let unit = Unit {
            id: generate_id(),
            company_id: company.id.clone(),
            name: DEFAULT_UNIT_NAME.to_string(),
            location: String::new(),
        };
        let admin = User {
            id: generate_id(),
            company_id: company.id.clone(),
            unit_id: None,
            name: clean_text(&input.admin_name),
            email,
            role: Role::Admin,
            external_id: Some(principal.id),
        };

        let mut updates = HashMap::with_capacity(3);
        updates.insert(
            format!("companies/{}", company.id),
            to_store_value(&company).map_err(setup_error)?,
        );
        updates.insert(
            format!("units/{}", unit.id),
            to_store_value(&unit).map_err(setup_error)?,
        );
        updates.insert(
            format!("users/{}", admin.id),
            to_store_value(&admin).map_err(setup_error)?,
        );

        let adapter = self.adapter().await?;
        adapter.update_multi(updates).await.map_err(setup_error)?;

        tracing::info!(company = %company.id, admin = %admin.id, "System provisioned");
        Ok(admin)
    }

    /// Wipe the tenant back to a just-provisioned state, keeping only
    /// the acting administrator and one fresh default unit.
    ///
    /// A single multi-path write clears requests and comments and
    /// rewrites units and users wholesale; observers never see a
    /// half-reset store. The mirrors catch up from the resulting pushes.
    pub async fn reset_system(&self, admin_id: &str) -> Result<(), EngineError> {
        let admin = self
            .user_by_id(admin_id)
            .await
            .ok_or_else(|| not_found::<User>(admin_id))?;

        let unit = Unit {
            id: generate_id(),
            company_id: admin.company_id.clone(),
            name: DEFAULT_UNIT_NAME.to_string(),
            location: String::new(),
        };

        let mut updates = HashMap::with_capacity(4);
        updates.insert("requests".to_string(), Value::Null);
        updates.insert("comments".to_string(), Value::Null);
        updates.insert(
            "units".to_string(),
            Value::Object(
                std::iter::once((unit.id.clone(), to_store_value(&unit)?)).collect(),
            ),
        );
        updates.insert(
            "users".to_string(),
            Value::Object(
                std::iter::once((admin.id.clone(), to_store_value(&admin)?)).collect(),
            ),
        );

        let adapter = self.adapter().await?;
        adapter.update_multi(updates).await?;
        tracing::warn!(admin = %admin_id, "System reset to provisioned state");
        Ok(())
    }
}

fn setup_error(error: StoreError) -> EngineError {
    EngineError::Setup(error.to_string())
}

fn not_found<T: Record>(id: &str) -> CoreError {
    CoreError::NotFound {
        entity: T::ENTITY,
        id: id.to_string(),
    }
}

fn find_request<'c>(
    collections: &'c mut Collections,
    id: &str,
) -> Result<&'c mut RequestTicket, CoreError> {
    collections
        .requests
        .iter_mut()
        .find(|r| r.id == id)
        .ok_or_else(|| not_found::<RequestTicket>(id))
}
