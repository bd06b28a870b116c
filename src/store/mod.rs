//! Persistence for portal state
//!
//! Services operate exclusively through [`PortalStore`], so the in-memory
//! backend used in tests and the Postgres backend are interchangeable.
//! Methods return `anyhow::Result`; services lift failures into
//! [`PortalError::Storage`](crate::error::PortalError::Storage).

pub mod memory;
#[cfg(feature = "database")]
pub mod postgres;

pub use memory::MemoryStore;
#[cfg(feature = "database")]
pub use postgres::PgStore;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;

use crate::identity::Session;
use crate::models::*;
use crate::scoping::analytics::{CountBucket, Dimension};
use crate::scoping::{ComplaintQuery, Page, PageRequest};

// =============================================================================
// INSERT SHAPES
// =============================================================================

#[derive(Debug, Clone)]
pub struct NewUser {
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub identity_document: Option<IdentityDocument>,
    pub role: Role,
    pub ward_id: Option<WardId>,
    pub department_id: Option<DepartmentId>,
    /// Argon2 PHC string; `None` leaves the account without a password login.
    pub password_hash: Option<String>,
}

/// Builds the role profile for a freshly inserted user.
pub type ProfileFn<'a> = dyn Fn(&User) -> Profile + Send + Sync + 'a;

/// How a login names its account
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginIdentifier<'a> {
    /// Matched case-insensitively.
    Email(&'a str),
    Phone(&'a str),
}

#[derive(Debug, Clone)]
pub struct NewCategory {
    pub name: String,
    pub description: String,
    pub department_id: Option<DepartmentId>,
}

#[derive(Debug, Clone)]
pub struct NewComplaint {
    pub citizen_id: UserId,
    pub category_id: CategoryId,
    pub title: String,
    pub description: String,
    pub evidence: Option<EvidenceImage>,
    pub location: GeoPoint,
    pub street_name: Option<String>,
    pub district: Option<String>,
    pub priority: Priority,
}

#[derive(Debug, Clone)]
pub struct NewBill {
    pub user_id: UserId,
    pub service_type: ServiceType,
    pub amount_due: Decimal,
    pub due_date: Option<NaiveDate>,
    pub allow_installments: bool,
    pub max_installments: i32,
}

/// A user column that must be unique across the directory
#[derive(Debug, Clone, Copy)]
pub enum UniqueField<'a> {
    Email(&'a str),
    Phone(&'a str),
    Identity(&'a IdentityDocument),
}

#[derive(Debug, Clone, Default)]
pub struct BillFilter {
    pub service_type: Option<ServiceType>,
    pub status: Option<BillStatus>,
}

#[derive(Debug, Clone, Default)]
pub struct PaymentFilter {
    pub service_type: Option<ServiceType>,
    pub status: Option<PaymentStatus>,
    pub limit: Option<usize>,
}

// =============================================================================
// FINALIZATION
// =============================================================================

/// Provider-confirmed facts applied when a payment settles
#[derive(Debug, Clone)]
pub struct Settlement {
    pub provider_payment_ref: Option<String>,
    pub paid_at: DateTime<Utc>,
    /// Whether this payment consumes one of the bill's installments.
    pub counts_installment: bool,
}

/// Renders the receipt for a settled payment against the updated bill.
///
/// Runs inside the finalization unit; an error aborts the whole unit.
pub type ReceiptRenderFn<'a> =
    dyn Fn(&Payment, &Bill) -> Result<ReceiptArtifact> + Send + Sync + 'a;

#[derive(Debug, Clone)]
pub enum Finalization {
    /// This call moved the payment to PAID and applied the ledger update.
    Applied {
        payment: Payment,
        bill: Bill,
        receipt: ReceiptArtifact,
        /// Confirmed amount beyond the outstanding balance, capped off the ledger.
        overpayment: Decimal,
    },
    /// Another caller settled it first; nothing was changed.
    AlreadyPaid(Payment),
}

// =============================================================================
// STORE TRAIT
// =============================================================================

#[async_trait]
pub trait PortalStore: Send + Sync {
    // ── Directory ──

    async fn insert_user(&self, user: NewUser) -> Result<User>;
    async fn get_user(&self, id: UserId) -> Result<Option<User>>;
    async fn is_taken(&self, field: UniqueField<'_>) -> Result<bool>;
    async fn list_active_staff_in_ward(&self, ward_id: WardId) -> Result<Vec<User>>;
    async fn list_active_admins(&self) -> Result<Vec<User>>;

    /// Insert a user and its role profile as one unit; neither is kept if
    /// the other fails.
    async fn create_account(&self, user: NewUser, profile: &ProfileFn<'_>) -> Result<(User, Profile)>;

    /// The account a login names, with its stored password hash if any.
    async fn find_credentials(
        &self,
        identifier: LoginIdentifier<'_>,
    ) -> Result<Option<(User, Option<String>)>>;
    async fn load_profile(&self, user_id: UserId) -> Result<Option<Profile>>;

    // ── Wards & departments ──

    async fn insert_ward(&self, name: &str) -> Result<Ward>;
    async fn get_ward(&self, id: WardId) -> Result<Option<Ward>>;
    async fn list_wards(&self) -> Result<Vec<Ward>>;
    async fn insert_department(&self, name: &str, description: Option<&str>) -> Result<Department>;
    async fn get_department(&self, id: DepartmentId) -> Result<Option<Department>>;

    // ── Categories ──

    async fn insert_category(&self, category: NewCategory) -> Result<ComplaintCategory>;
    async fn get_category(&self, id: CategoryId) -> Result<Option<ComplaintCategory>>;
    async fn category_name_taken(&self, name: &str) -> Result<bool>;
    async fn list_categories(&self) -> Result<Vec<ComplaintCategory>>;

    /// Delete a category and every complaint filed under it.
    /// Returns the number of complaints removed, or `None` if the category did not exist.
    async fn delete_category(&self, id: CategoryId) -> Result<Option<u64>>;

    // ── Complaints ──

    async fn insert_complaint(&self, complaint: NewComplaint) -> Result<Complaint>;
    async fn load_complaint(&self, id: ComplaintId) -> Result<Option<ComplaintView>>;
    async fn update_complaint(&self, complaint: &Complaint) -> Result<()>;
    async fn delete_complaint(&self, id: ComplaintId) -> Result<bool>;

    /// Newest first.
    async fn query_complaints(
        &self,
        query: &ComplaintQuery,
        page: PageRequest,
    ) -> Result<Page<ComplaintView>>;

    /// Every match, newest first; used by map export.
    async fn query_all_complaints(&self, query: &ComplaintQuery) -> Result<Vec<ComplaintView>>;

    async fn count_complaints(
        &self,
        query: &ComplaintQuery,
        dimension: Dimension,
    ) -> Result<Vec<CountBucket>>;

    // ── Bills ──

    async fn find_open_bill(&self, user_id: UserId, service: ServiceType) -> Result<Option<Bill>>;

    /// Return the open bill for `(user, service)`, inserting `bill` only if none exists.
    async fn find_or_insert_open_bill(&self, bill: NewBill) -> Result<Bill>;

    async fn get_bill(&self, id: BillId) -> Result<Option<Bill>>;
    async fn list_bills(&self, user_id: UserId, filter: &BillFilter) -> Result<Vec<Bill>>;

    // ── Payments ──

    async fn insert_payment(&self, bill_id: BillId, amount: Decimal) -> Result<Payment>;
    async fn attach_checkout_session(&self, payment_id: PaymentId, session_id: &str) -> Result<()>;
    async fn mark_payment_failed(&self, payment_id: PaymentId) -> Result<()>;

    /// Look up by checkout session, restricted to `user_id`'s bills of `service`.
    async fn find_payment_by_session(
        &self,
        session_id: &str,
        user_id: UserId,
        service: ServiceType,
    ) -> Result<Option<Payment>>;

    async fn get_payment_for_user(
        &self,
        payment_id: PaymentId,
        user_id: UserId,
    ) -> Result<Option<(Payment, Bill)>>;

    /// Newest first.
    async fn list_payments(
        &self,
        user_id: UserId,
        filter: &PaymentFilter,
    ) -> Result<Vec<(Payment, Bill)>>;

    /// Settle a payment as one atomic unit.
    ///
    /// Holds an exclusive lock on the payment row, re-checks that it is not
    /// already PAID, marks it PAID, applies the ledger update to its bill, and
    /// stores and links the receipt produced by `render`. Either every
    /// mutation lands or none does.
    async fn finalize_payment(
        &self,
        payment_id: PaymentId,
        settlement: &Settlement,
        render: &ReceiptRenderFn<'_>,
    ) -> Result<Finalization>;

    // ── Receipts ──

    async fn load_receipt(&self, payment_id: PaymentId) -> Result<Option<ReceiptArtifact>>;

    // ── Sessions ──

    async fn insert_session(&self, session: &Session) -> Result<()>;
    async fn load_session(&self, token: &str) -> Result<Option<Session>>;
    async fn delete_session(&self, token: &str) -> Result<()>;

    /// Drop every session that expired at or before `now`; returns how many.
    async fn purge_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64>;
}
