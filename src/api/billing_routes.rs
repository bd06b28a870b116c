//! Checkout, verification and payment history endpoints
//!
//! Service types appear in paths as slugs (`local-tax`, `city-rate`, ...).

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use super::{ApiResult, AppState, CurrentActor};
use crate::billing::{CheckoutOptions, CheckoutSession, PaymentStats};
use crate::error::PortalError;
use crate::models::{Bill, BillStatus, Payment, PaymentId, PaymentStatus, ServiceType};
use crate::reconciliation::VerifyOutcome;
use crate::store::{BillFilter, PaymentFilter};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/billing/:service/checkout", post(checkout))
        .route("/api/billing/:service/verify", post(verify))
        .route("/api/bills", get(list_bills))
        .route("/api/payments", get(list_payments))
        .route("/api/payments/:id", get(get_payment))
        .route("/api/payments/:id/receipt", get(download_receipt))
        .route("/api/dashboard/payment-stats", get(payment_stats))
        .route("/api/dashboard/recent-payments", get(recent_payments))
}

fn service_from_slug(slug: &str) -> Result<ServiceType, PortalError> {
    ServiceType::from_slug(slug).ok_or_else(|| PortalError::not_found("service type", slug))
}

#[derive(Debug, Serialize)]
pub struct PaymentWithBill {
    pub payment: Payment,
    pub bill: Bill,
}

impl From<(Payment, Bill)> for PaymentWithBill {
    fn from((payment, bill): (Payment, Bill)) -> Self {
        Self { payment, bill }
    }
}

// =============================================================================
// CHECKOUT & VERIFY
// =============================================================================

async fn checkout(
    State(portal): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(service): Path<String>,
    Json(options): Json<CheckoutOptions>,
) -> ApiResult<(StatusCode, Json<CheckoutSession>)> {
    let service = service_from_slug(&service)?;
    let session = portal
        .billing
        .initiate_checkout(&actor, service, options)
        .await?;
    Ok((StatusCode::CREATED, Json(session)))
}

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub session_id: String,
}

async fn verify(
    State(portal): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(service): Path<String>,
    Json(req): Json<VerifyRequest>,
) -> ApiResult<Json<VerifyOutcome>> {
    let service = service_from_slug(&service)?;
    let outcome = portal
        .reconciliation
        .verify(&req.session_id, &actor, service)
        .await?;
    Ok(Json(outcome))
}

// =============================================================================
// HISTORY
// =============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct BillQuery {
    pub service_type: Option<ServiceType>,
    pub status: Option<BillStatus>,
}

async fn list_bills(
    State(portal): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Query(query): Query<BillQuery>,
) -> ApiResult<Json<Vec<Bill>>> {
    let filter = BillFilter {
        service_type: query.service_type,
        status: query.status,
    };
    Ok(Json(portal.billing.list_bills(&actor, filter).await?))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct PaymentQuery {
    pub service_type: Option<ServiceType>,
    pub status: Option<PaymentStatus>,
    pub limit: Option<usize>,
}

async fn list_payments(
    State(portal): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Query(query): Query<PaymentQuery>,
) -> ApiResult<Json<Vec<PaymentWithBill>>> {
    let filter = PaymentFilter {
        service_type: query.service_type,
        status: query.status,
        limit: query.limit,
    };
    let rows = portal.billing.list_payments(&actor, filter).await?;
    Ok(Json(rows.into_iter().map(PaymentWithBill::from).collect()))
}

async fn get_payment(
    State(portal): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<PaymentId>,
) -> ApiResult<Json<PaymentWithBill>> {
    Ok(Json(portal.billing.get_payment(&actor, id).await?.into()))
}

async fn download_receipt(
    State(portal): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<PaymentId>,
) -> ApiResult<Response> {
    let receipt = portal.billing.receipt(&actor, id).await?;
    let filename = receipt
        .reference
        .rsplit('/')
        .next()
        .unwrap_or("receipt.txt")
        .to_string();
    Ok((
        [
            (header::CONTENT_TYPE, receipt.content_type.clone()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        receipt.bytes,
    )
        .into_response())
}

async fn payment_stats(
    State(portal): State<AppState>,
    CurrentActor(actor): CurrentActor,
) -> ApiResult<Json<PaymentStats>> {
    Ok(Json(portal.billing.payment_stats(&actor).await?))
}

async fn recent_payments(
    State(portal): State<AppState>,
    CurrentActor(actor): CurrentActor,
) -> ApiResult<Json<Vec<PaymentWithBill>>> {
    let rows = portal.billing.recent_payments(&actor).await?;
    Ok(Json(rows.into_iter().map(PaymentWithBill::from).collect()))
}
