//! Complaint operations against the store

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use super::lifecycle::{authorize, ComplaintOperation, Decision};
use super::{
    optional_text, validate_description, validate_evidence, validate_location, validate_title,
    ComplaintPatch, ComplaintSubmission,
};
use crate::error::{PortalError, PortalResult};
use crate::identity::Actor;
use crate::models::{
    CategoryId, ComplaintCategory, ComplaintId, ComplaintView, DepartmentId, Priority, Role,
};
use crate::notifications::templates::{complaint_messages, ComplaintEvent};
use crate::notifications::Dispatcher;
use crate::scoping::{ComplaintFilter, ComplaintQuery, Page, PageRequest};
use crate::store::{NewCategory, NewComplaint, PortalStore};

pub struct ComplaintService {
    store: Arc<dyn PortalStore>,
    dispatcher: Arc<Dispatcher>,
}

impl ComplaintService {
    pub fn new(store: Arc<dyn PortalStore>, dispatcher: Arc<Dispatcher>) -> Self {
        Self { store, dispatcher }
    }

    // ── Categories ──

    /// Public; ordered by name.
    pub async fn list_categories(&self) -> PortalResult<Vec<ComplaintCategory>> {
        Ok(self.store.list_categories().await?)
    }

    pub async fn create_category(
        &self,
        actor: &Actor,
        name: &str,
        description: &str,
        department_id: Option<DepartmentId>,
    ) -> PortalResult<ComplaintCategory> {
        actor.require_role(&[Role::Admin])?;
        let name = name.trim();
        if name.is_empty() {
            return Err(PortalError::validation("name", "This field may not be blank"));
        }
        if self.store.category_name_taken(name).await? {
            return Err(PortalError::validation(
                "name",
                "A category with this name already exists",
            ));
        }
        if let Some(department_id) = department_id {
            if self.store.get_department(department_id).await?.is_none() {
                return Err(PortalError::validation("department", "Unknown department"));
            }
        }

        let category = self
            .store
            .insert_category(NewCategory {
                name: name.to_string(),
                description: description.trim().to_string(),
                department_id,
            })
            .await?;
        info!(category_id = category.id, name = %category.name, "Created complaint category");
        Ok(category)
    }

    /// Deletes the category and, with it, every complaint filed under it.
    pub async fn delete_category(&self, actor: &Actor, id: CategoryId) -> PortalResult<u64> {
        actor.require_role(&[Role::Admin])?;
        let removed = self
            .store
            .delete_category(id)
            .await?
            .ok_or_else(|| PortalError::not_found("category", id))?;
        info!(category_id = id, complaints_removed = removed, "Deleted complaint category");
        Ok(removed)
    }

    // ── Complaints ──

    pub async fn create_complaint(
        &self,
        actor: &Actor,
        submission: ComplaintSubmission,
    ) -> PortalResult<ComplaintView> {
        actor.require_role(&[Role::Citizen])?;

        let title = validate_title(&submission.title)?;
        let description = validate_description(&submission.description)?;
        validate_location(&submission.location)?;
        if let Some(evidence) = &submission.evidence {
            validate_evidence(evidence)?;
        }
        self.require_category(submission.category_id).await?;

        let complaint = self
            .store
            .insert_complaint(NewComplaint {
                citizen_id: actor.user_id,
                category_id: submission.category_id,
                title,
                description,
                evidence: submission.evidence,
                location: submission.location,
                street_name: optional_text(submission.street_name),
                district: optional_text(submission.district),
                priority: Priority::default(),
            })
            .await?;
        info!(complaint_id = complaint.id, citizen_id = actor.user_id, "Complaint submitted");

        let view = self.load_view(complaint.id).await?;
        self.notify(ComplaintEvent::Created, &view).await;
        Ok(view)
    }

    pub async fn get_complaint(&self, actor: &Actor, id: ComplaintId) -> PortalResult<ComplaintView> {
        let view = self.load_view(id).await?;
        match authorize(actor, ComplaintOperation::View, &view) {
            Decision::Allow => Ok(view),
            Decision::Deny(reason) => Err(reason.into_error(id)),
        }
    }

    /// Newest first, scoped to what the actor may see.
    pub async fn list_complaints(
        &self,
        actor: &Actor,
        filter: ComplaintFilter,
        page: PageRequest,
    ) -> PortalResult<Page<ComplaintView>> {
        let query = ComplaintQuery::for_actor(actor, filter);
        Ok(self.store.query_complaints(&query, page.normalized()).await?)
    }

    pub async fn update_complaint(
        &self,
        actor: &Actor,
        id: ComplaintId,
        patch: ComplaintPatch,
    ) -> PortalResult<ComplaintView> {
        let patch = if actor.is_citizen() {
            patch.without_triage()
        } else {
            patch
        };

        let view = self.load_view(id).await?;
        if let Decision::Deny(reason) = authorize(actor, ComplaintOperation::Update(&patch), &view) {
            return Err(reason.into_error(id));
        }
        if patch.is_empty() {
            return Ok(view);
        }

        let mut complaint = view.complaint.clone();
        if let Some(title) = &patch.title {
            complaint.title = validate_title(title)?;
        }
        if let Some(description) = &patch.description {
            complaint.description = validate_description(description)?;
        }
        if let Some(category_id) = patch.category_id {
            self.require_category(category_id).await?;
            complaint.category_id = category_id;
        }
        if let Some(evidence) = &patch.evidence {
            validate_evidence(evidence)?;
            complaint.evidence = Some(evidence.clone());
        }
        if let Some(location) = patch.location {
            validate_location(&location)?;
            complaint.location = location;
        }
        if patch.street_name.is_some() {
            complaint.street_name = optional_text(patch.street_name.clone());
        }
        if patch.district.is_some() {
            complaint.district = optional_text(patch.district.clone());
        }
        if let Some(status) = patch.status {
            complaint.status = status;
        }
        if let Some(priority) = patch.priority {
            complaint.priority = priority;
        }

        if complaint == view.complaint {
            return Ok(view);
        }
        complaint.updated_at = Utc::now();
        self.store.update_complaint(&complaint).await?;
        info!(
            complaint_id = id,
            actor_id = actor.user_id,
            role = %actor.role,
            from = %view.complaint.status,
            to = %complaint.status,
            "Complaint updated"
        );

        let updated = self.load_view(id).await?;
        self.notify(ComplaintEvent::Updated { by: actor.role }, &updated)
            .await;
        Ok(updated)
    }

    pub async fn delete_complaint(&self, actor: &Actor, id: ComplaintId) -> PortalResult<()> {
        let view = self.load_view(id).await?;
        if let Decision::Deny(reason) = authorize(actor, ComplaintOperation::Delete, &view) {
            return Err(reason.into_error(id));
        }

        if !self.store.delete_complaint(id).await? {
            return Err(PortalError::not_found("complaint", id));
        }
        info!(complaint_id = id, actor_id = actor.user_id, role = %actor.role, "Complaint deleted");

        self.notify(ComplaintEvent::Deleted { by: actor.role }, &view)
            .await;
        Ok(())
    }

    async fn load_view(&self, id: ComplaintId) -> PortalResult<ComplaintView> {
        self.store
            .load_complaint(id)
            .await?
            .ok_or_else(|| PortalError::not_found("complaint", id))
    }

    async fn require_category(&self, id: CategoryId) -> PortalResult<()> {
        match self.store.get_category(id).await? {
            Some(_) => Ok(()),
            None => Err(PortalError::validation("category", "Unknown complaint category")),
        }
    }

    /// Owner plus active ward staff. Never fails the calling operation.
    async fn notify(&self, event: ComplaintEvent, view: &ComplaintView) {
        let citizen = match self.store.get_user(view.complaint.citizen_id).await {
            Ok(Some(user)) => user,
            Ok(None) => {
                warn!(complaint_id = view.complaint.id, "Complaint owner missing, skipping notifications");
                return;
            }
            Err(e) => {
                warn!(complaint_id = view.complaint.id, error = %e, "Could not load complaint owner");
                return;
            }
        };

        let ward_staff = match citizen.ward_id {
            Some(ward_id) => self
                .store
                .list_active_staff_in_ward(ward_id)
                .await
                .unwrap_or_else(|e| {
                    warn!(ward_id, error = %e, "Could not load ward staff");
                    Vec::new()
                }),
            None => Vec::new(),
        };

        let messages = complaint_messages(event, view, &citizen, &ward_staff);
        self.dispatcher.dispatch(messages).await;
    }
}
