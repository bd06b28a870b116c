//! Complaint, category, map and analytics endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

use super::{ApiResult, AppState, CurrentActor};
use crate::complaints::{ComplaintPatch, ComplaintSubmission};
use crate::error::PortalError;
use crate::models::{CategoryId, ComplaintCategory, ComplaintId, ComplaintView, DepartmentId};
use crate::scoping::analytics::{CountBucket, Dimension};
use crate::scoping::geo::FeatureCollection;
use crate::scoping::{ComplaintFilter, Page, PageRequest};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/categories", get(list_categories).post(create_category))
        .route("/api/categories/:id", delete(delete_category))
        .route("/api/complaints", get(list_complaints).post(create_complaint))
        .route(
            "/api/complaints/:id",
            get(get_complaint)
                .patch(update_complaint)
                .delete(delete_complaint),
        )
        .route("/api/map/complaints", get(complaint_map))
        .route("/api/analytics/:dimension", get(complaint_counts))
}

// =============================================================================
// CATEGORIES
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateCategoryRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub department_id: Option<DepartmentId>,
}

async fn list_categories(State(portal): State<AppState>) -> ApiResult<Json<Vec<ComplaintCategory>>> {
    Ok(Json(portal.complaints.list_categories().await?))
}

async fn create_category(
    State(portal): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Json(req): Json<CreateCategoryRequest>,
) -> ApiResult<(StatusCode, Json<ComplaintCategory>)> {
    let category = portal
        .complaints
        .create_category(&actor, &req.name, &req.description, req.department_id)
        .await?;
    Ok((StatusCode::CREATED, Json(category)))
}

async fn delete_category(
    State(portal): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<CategoryId>,
) -> ApiResult<Json<Value>> {
    let removed = portal.complaints.delete_category(&actor, id).await?;
    Ok(Json(json!({ "deleted": id, "complaints_removed": removed })))
}

// =============================================================================
// COMPLAINTS
// =============================================================================

async fn list_complaints(
    State(portal): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Query(filter): Query<ComplaintFilter>,
    Query(page): Query<PageRequest>,
) -> ApiResult<Json<Value>> {
    let page: Page<ComplaintView> = portal.complaints.list_complaints(&actor, filter, page).await?;
    let total_pages = page.total_pages();
    Ok(Json(json!({
        "count": page.total,
        "page": page.page,
        "per_page": page.per_page,
        "total_pages": total_pages,
        "results": page.items,
    })))
}

async fn create_complaint(
    State(portal): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Json(submission): Json<ComplaintSubmission>,
) -> ApiResult<(StatusCode, Json<ComplaintView>)> {
    let view = portal.complaints.create_complaint(&actor, submission).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

async fn get_complaint(
    State(portal): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<ComplaintId>,
) -> ApiResult<Json<ComplaintView>> {
    Ok(Json(portal.complaints.get_complaint(&actor, id).await?))
}

async fn update_complaint(
    State(portal): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<ComplaintId>,
    Json(patch): Json<ComplaintPatch>,
) -> ApiResult<Json<ComplaintView>> {
    Ok(Json(portal.complaints.update_complaint(&actor, id, patch).await?))
}

async fn delete_complaint(
    State(portal): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<ComplaintId>,
) -> ApiResult<StatusCode> {
    portal.complaints.delete_complaint(&actor, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// MAP & ANALYTICS
// =============================================================================

async fn complaint_map(
    State(portal): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Query(filter): Query<ComplaintFilter>,
) -> ApiResult<Json<FeatureCollection>> {
    Ok(Json(portal.analytics.complaint_map(&actor, filter).await?))
}

/// `wards`, `categories` or `daily`.
fn parse_dimension(raw: &str) -> Result<Dimension, PortalError> {
    match raw {
        "wards" | "ward" => Ok(Dimension::Ward),
        "categories" | "category" => Ok(Dimension::Category),
        "daily" | "day" => Ok(Dimension::Day),
        other => Err(PortalError::not_found("analytics dimension", other)),
    }
}

async fn complaint_counts(
    State(portal): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(dimension): Path<String>,
    Query(filter): Query<ComplaintFilter>,
) -> ApiResult<Json<Vec<CountBucket>>> {
    let dimension = parse_dimension(&dimension)?;
    Ok(Json(
        portal
            .analytics
            .complaint_counts(&actor, filter, dimension)
            .await?,
    ))
}
