//! Postgres store
//!
//! Runtime-checked `sqlx` queries against the schema in `migrations/`.
//! Payment finalization runs in one transaction holding `FOR UPDATE` locks on
//! the payment and its bill; account creation inserts the user and its profile
//! in one transaction.

use std::collections::HashMap;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::types::Json;
use sqlx::{Executor, PgPool, Postgres, QueryBuilder};
use tracing::{debug, info};

use super::{
    BillFilter, Finalization, LoginIdentifier, NewBill, NewCategory, NewComplaint, NewUser,
    PaymentFilter, PortalStore, ProfileFn, ReceiptRenderFn, Settlement, UniqueField,
};
use crate::billing::ledger::apply_payment;
use crate::identity::Session;
use crate::models::*;
use crate::scoping::analytics::{CountBucket, Dimension, UNASSIGNED_WARD};
use crate::scoping::{ComplaintQuery, ComplaintScope, Page, PageRequest};

const USER_COLUMNS: &str = "id, first_name, last_name, email, phone_number, identity_kind, \
     identity_number, role, ward_id, department_id, is_active, created_at, updated_at";

const BILL_COLUMNS: &str = "id, user_id, service_type, amount_due, amount_paid, status, due_date, \
     allow_installments, max_installments, installment_count, created_at, updated_at";

const PAYMENT_COLUMNS: &str = "id, bill_id, checkout_session_id, provider_payment_ref, amount, \
     status, paid_at, receipt_ref, created_at";

const COMPLAINT_VIEW_SELECT: &str = r#"
    SELECT c.id, c.citizen_id, c.category_id, c.title, c.description,
           c.evidence_ref, c.evidence_size, c.latitude, c.longitude,
           c.street_name, c.district, c.status, c.priority, c.created_at, c.updated_at,
           TRIM(u.first_name || ' ' || u.last_name) AS citizen_name,
           u.ward_id AS citizen_ward_id,
           cat.name AS category_name,
           cat.department_id
    FROM complaints c
    JOIN users u ON u.id = c.citizen_id
    JOIN complaint_categories cat ON cat.id = c.category_id
    LEFT JOIN wards w ON w.id = u.ward_id
    WHERE 1=1"#;

const COMPLAINT_FROM: &str = r#"
    FROM complaints c
    JOIN users u ON u.id = c.citizen_id
    JOIN complaint_categories cat ON cat.id = c.category_id
    LEFT JOIN wards w ON w.id = u.ward_id
    WHERE 1=1"#;

// =============================================================================
// ROW SHAPES
// =============================================================================

#[derive(sqlx::FromRow)]
struct UserRow {
    id: UserId,
    first_name: String,
    last_name: String,
    email: Option<String>,
    phone_number: Option<String>,
    identity_kind: Option<String>,
    identity_number: Option<String>,
    role: Role,
    ward_id: Option<WardId>,
    department_id: Option<DepartmentId>,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        let identity_document = match (row.identity_kind.as_deref(), row.identity_number) {
            (Some("NIN"), Some(n)) => Some(IdentityDocument::Nin(n)),
            (Some("PASSPORT"), Some(n)) => Some(IdentityDocument::Passport(n)),
            _ => None,
        };
        User {
            id: row.id,
            first_name: row.first_name,
            last_name: row.last_name,
            email: row.email,
            phone_number: row.phone_number,
            identity_document,
            role: row.role,
            ward_id: row.ward_id,
            department_id: row.department_id,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

fn identity_columns(doc: Option<&IdentityDocument>) -> (Option<&'static str>, Option<String>) {
    match doc {
        Some(IdentityDocument::Nin(n)) => (Some("NIN"), Some(n.clone())),
        Some(IdentityDocument::Passport(n)) => (Some("PASSPORT"), Some(n.clone())),
        None => (None, None),
    }
}

#[derive(sqlx::FromRow)]
struct CredentialRow {
    #[sqlx(flatten)]
    user: UserRow,
    password_hash: Option<String>,
}

async fn insert_user_row<'e, E>(executor: E, user: &NewUser) -> Result<UserRow>
where
    E: Executor<'e, Database = Postgres>,
{
    let (identity_kind, identity_number) = identity_columns(user.identity_document.as_ref());
    let sql = format!(
        r#"INSERT INTO users (first_name, last_name, email, phone_number, identity_kind,
                              identity_number, role, ward_id, department_id, password_hash)
           VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
           RETURNING {}"#,
        USER_COLUMNS
    );
    sqlx::query_as::<_, UserRow>(&sql)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.email)
        .bind(&user.phone_number)
        .bind(identity_kind)
        .bind(identity_number)
        .bind(user.role.as_str())
        .bind(user.ward_id)
        .bind(user.department_id)
        .bind(&user.password_hash)
        .fetch_one(executor)
        .await
        .context("Failed to insert user")
}

#[derive(sqlx::FromRow)]
struct ComplaintViewRow {
    id: ComplaintId,
    citizen_id: UserId,
    category_id: CategoryId,
    title: String,
    description: String,
    evidence_ref: Option<String>,
    evidence_size: Option<i64>,
    latitude: f64,
    longitude: f64,
    street_name: Option<String>,
    district: Option<String>,
    status: ComplaintStatus,
    priority: Priority,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    citizen_name: String,
    citizen_ward_id: Option<WardId>,
    category_name: String,
    department_id: Option<DepartmentId>,
}

impl From<ComplaintViewRow> for ComplaintView {
    fn from(row: ComplaintViewRow) -> Self {
        let evidence = row.evidence_ref.map(|reference| EvidenceImage {
            reference,
            size_bytes: row.evidence_size.unwrap_or(0),
        });
        ComplaintView {
            complaint: Complaint {
                id: row.id,
                citizen_id: row.citizen_id,
                category_id: row.category_id,
                title: row.title,
                description: row.description,
                evidence,
                location: GeoPoint {
                    latitude: row.latitude,
                    longitude: row.longitude,
                },
                street_name: row.street_name,
                district: row.district,
                status: row.status,
                priority: row.priority,
                created_at: row.created_at,
                updated_at: row.updated_at,
            },
            citizen_name: row.citizen_name,
            citizen_ward_id: row.citizen_ward_id,
            category_name: row.category_name,
            department_id: row.department_id,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ReceiptRow {
    payment_id: PaymentId,
    reference: String,
    receipt_number: String,
    content_type: String,
    bytes: Vec<u8>,
    created_at: DateTime<Utc>,
}

impl From<ReceiptRow> for ReceiptArtifact {
    fn from(row: ReceiptRow) -> Self {
        ReceiptArtifact {
            payment_id: row.payment_id,
            reference: row.reference,
            receipt_number: row.receipt_number,
            content_type: row.content_type,
            bytes: row.bytes,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct SessionRow {
    token: String,
    user_id: UserId,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl From<SessionRow> for Session {
    fn from(row: SessionRow) -> Self {
        Session {
            token: row.token,
            user_id: row.user_id,
            created_at: row.created_at,
            expires_at: row.expires_at,
        }
    }
}

// =============================================================================
// QUERY BUILDING
// =============================================================================

/// `ILIKE` pattern matching `needle` literally anywhere.
fn contains_pattern(needle: &str) -> String {
    let escaped = needle
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

/// Append scope and filter predicates to a query ending in `WHERE 1=1`.
fn push_complaint_filters(builder: &mut QueryBuilder<'static, Postgres>, query: &ComplaintQuery) {
    match query.scope {
        ComplaintScope::Owner(user_id) => {
            builder.push(" AND c.citizen_id = ").push_bind(user_id);
        }
        ComplaintScope::Ward(ward_id) => {
            builder.push(" AND u.ward_id = ").push_bind(ward_id);
        }
        ComplaintScope::Unrestricted => {}
        ComplaintScope::Nothing => {
            builder.push(" AND FALSE");
        }
    }

    let f = &query.filter;
    if let Some(status) = f.status {
        builder.push(" AND c.status = ").push_bind(status.as_str());
    }
    if let Some(priority) = f.priority {
        builder.push(" AND c.priority = ").push_bind(priority.as_str());
    }
    if let Some(category_id) = f.category_id {
        builder.push(" AND c.category_id = ").push_bind(category_id);
    }
    if let Some(ward_id) = f.ward_id {
        builder.push(" AND u.ward_id = ").push_bind(ward_id);
    }
    if let Some(department_id) = f.department_id {
        builder.push(" AND cat.department_id = ").push_bind(department_id);
    }
    if let Some(from) = f.date_from {
        builder
            .push(" AND (c.created_at AT TIME ZONE 'UTC')::date >= ")
            .push_bind(from);
    }
    if let Some(to) = f.date_to {
        builder
            .push(" AND (c.created_at AT TIME ZONE 'UTC')::date <= ")
            .push_bind(to);
    }
    if let Some(search) = &f.search {
        let pattern = contains_pattern(search);
        builder
            .push(" AND (c.id::text ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR c.title ILIKE ")
            .push_bind(pattern.clone());
        if query.extended_search {
            builder
                .push(" OR c.description ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR (u.first_name || ' ' || u.last_name) ILIKE ")
                .push_bind(pattern);
        }
        builder.push(")");
    }
}

fn dimension_key_sql(dimension: Dimension) -> String {
    match dimension {
        Dimension::Ward => format!("COALESCE(w.name, '{}')", UNASSIGNED_WARD),
        Dimension::Category => "cat.name".to_string(),
        Dimension::Day => "to_char((c.created_at AT TIME ZONE 'UTC')::date, 'YYYY-MM-DD')".to_string(),
    }
}

// =============================================================================
// STORE
// =============================================================================

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn users_where(&self, predicate: &str, bind: Option<i64>) -> Result<Vec<User>> {
        let sql = format!(
            "SELECT {} FROM users WHERE is_active AND {} ORDER BY id",
            USER_COLUMNS, predicate
        );
        let mut query = sqlx::query_as::<_, UserRow>(&sql);
        if let Some(value) = bind {
            query = query.bind(value);
        }
        let rows = query
            .fetch_all(&self.pool)
            .await
            .context("Failed to list users")?;
        Ok(rows.into_iter().map(User::from).collect())
    }

    async fn complaint_views(&self, query: &ComplaintQuery, page: Option<PageRequest>) -> Result<Vec<ComplaintView>> {
        let mut builder = QueryBuilder::new(COMPLAINT_VIEW_SELECT);
        push_complaint_filters(&mut builder, query);
        builder.push(" ORDER BY c.created_at DESC, c.id DESC");
        if let Some(page) = page {
            builder
                .push(" LIMIT ")
                .push_bind(i64::from(page.per_page))
                .push(" OFFSET ")
                .push_bind(page.offset() as i64);
        }
        let rows = builder
            .build_query_as::<ComplaintViewRow>()
            .fetch_all(&self.pool)
            .await
            .context("Failed to query complaints")?;
        Ok(rows.into_iter().map(ComplaintView::from).collect())
    }
}

#[async_trait]
impl PortalStore for PgStore {
    // ── Directory ──

    async fn insert_user(&self, user: NewUser) -> Result<User> {
        let row = insert_user_row(&self.pool, &user).await?;
        info!(user_id = row.id, role = %user.role, "Inserted user");
        Ok(row.into())
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS);
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch user")?;
        Ok(row.map(User::from))
    }

    async fn is_taken(&self, field: UniqueField<'_>) -> Result<bool> {
        let query = match field {
            UniqueField::Email(email) => {
                sqlx::query_scalar::<_, bool>(
                    "SELECT EXISTS(SELECT 1 FROM users WHERE LOWER(email) = LOWER($1))",
                )
                .bind(email.to_string())
            }
            UniqueField::Phone(phone) => {
                sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM users WHERE phone_number = $1)")
                    .bind(phone.to_string())
            }
            UniqueField::Identity(doc) => sqlx::query_scalar::<_, bool>(
                "SELECT EXISTS(SELECT 1 FROM users WHERE identity_number = $1)",
            )
            .bind(doc.number().to_string()),
        };
        query
            .fetch_one(&self.pool)
            .await
            .context("Failed to check uniqueness")
    }

    async fn list_active_staff_in_ward(&self, ward_id: WardId) -> Result<Vec<User>> {
        self.users_where("role = 'STAFF' AND ward_id = $1", Some(ward_id))
            .await
    }

    async fn list_active_admins(&self) -> Result<Vec<User>> {
        self.users_where("role = 'ADMIN'", None).await
    }

    async fn create_account(&self, user: NewUser, profile: &ProfileFn<'_>) -> Result<(User, Profile)> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;
        let created: User = insert_user_row(&mut *tx, &user).await?.into();
        let profile = profile(&created);
        if profile.user_id() != created.id || profile.role() != created.role {
            bail!(
                "profile for user {} ({}) does not match new user {} ({})",
                profile.user_id(),
                profile.role(),
                created.id,
                created.role
            );
        }

        sqlx::query("INSERT INTO profiles (user_id, role, body) VALUES ($1, $2, $3)")
            .bind(created.id)
            .bind(profile.role().as_str())
            .bind(Json(&profile))
            .execute(&mut *tx)
            .await
            .context("Failed to save profile")?;
        tx.commit().await.context("Failed to commit account")?;

        info!(user_id = created.id, role = %created.role, "Created account");
        Ok((created, profile))
    }

    async fn find_credentials(
        &self,
        identifier: LoginIdentifier<'_>,
    ) -> Result<Option<(User, Option<String>)>> {
        let (predicate, value) = match identifier {
            LoginIdentifier::Email(email) => ("LOWER(email) = LOWER($1)", email),
            LoginIdentifier::Phone(phone) => ("phone_number = $1", phone),
        };
        let sql = format!(
            "SELECT {}, password_hash FROM users WHERE {}",
            USER_COLUMNS, predicate
        );
        let row = sqlx::query_as::<_, CredentialRow>(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to look up credentials")?;
        Ok(row.map(|r| (r.user.into(), r.password_hash)))
    }

    async fn load_profile(&self, user_id: UserId) -> Result<Option<Profile>> {
        let body = sqlx::query_scalar::<_, Json<Profile>>("SELECT body FROM profiles WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to load profile")?;
        Ok(body.map(|Json(p)| p))
    }

    // ── Wards & departments ──

    async fn insert_ward(&self, name: &str) -> Result<Ward> {
        sqlx::query_as::<_, Ward>("INSERT INTO wards (name) VALUES ($1) RETURNING id, name")
            .bind(name)
            .fetch_one(&self.pool)
            .await
            .context("Failed to insert ward")
    }

    async fn get_ward(&self, id: WardId) -> Result<Option<Ward>> {
        sqlx::query_as::<_, Ward>("SELECT id, name FROM wards WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch ward")
    }

    async fn list_wards(&self) -> Result<Vec<Ward>> {
        sqlx::query_as::<_, Ward>("SELECT id, name FROM wards ORDER BY name")
            .fetch_all(&self.pool)
            .await
            .context("Failed to list wards")
    }

    async fn insert_department(&self, name: &str, description: Option<&str>) -> Result<Department> {
        sqlx::query_as::<_, Department>(
            "INSERT INTO departments (name, description) VALUES ($1, $2) RETURNING id, name, description",
        )
        .bind(name)
        .bind(description)
        .fetch_one(&self.pool)
        .await
        .context("Failed to insert department")
    }

    async fn get_department(&self, id: DepartmentId) -> Result<Option<Department>> {
        sqlx::query_as::<_, Department>("SELECT id, name, description FROM departments WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch department")
    }

    // ── Categories ──

    async fn insert_category(&self, category: NewCategory) -> Result<ComplaintCategory> {
        sqlx::query_as::<_, ComplaintCategory>(
            r#"INSERT INTO complaint_categories (name, description, department_id)
               VALUES ($1, $2, $3)
               RETURNING id, name, description, department_id"#,
        )
        .bind(&category.name)
        .bind(&category.description)
        .bind(category.department_id)
        .fetch_one(&self.pool)
        .await
        .context("Failed to insert category")
    }

    async fn get_category(&self, id: CategoryId) -> Result<Option<ComplaintCategory>> {
        sqlx::query_as::<_, ComplaintCategory>(
            "SELECT id, name, description, department_id FROM complaint_categories WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch category")
    }

    async fn category_name_taken(&self, name: &str) -> Result<bool> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM complaint_categories WHERE LOWER(name) = LOWER($1))",
        )
        .bind(name)
        .fetch_one(&self.pool)
        .await
        .context("Failed to check category name")
    }

    async fn list_categories(&self) -> Result<Vec<ComplaintCategory>> {
        sqlx::query_as::<_, ComplaintCategory>(
            "SELECT id, name, description, department_id FROM complaint_categories ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list categories")
    }

    async fn delete_category(&self, id: CategoryId) -> Result<Option<u64>> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;
        let complaints: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM complaints WHERE category_id = $1")
                .bind(id)
                .fetch_one(&mut *tx)
                .await
                .context("Failed to count category complaints")?;
        let deleted = sqlx::query("DELETE FROM complaint_categories WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .context("Failed to delete category")?
            .rows_affected();
        tx.commit().await.context("Failed to commit category delete")?;

        if deleted == 0 {
            return Ok(None);
        }
        debug!(category_id = id, removed = complaints, "Cascade-deleted complaints");
        Ok(Some(complaints as u64))
    }

    // ── Complaints ──

    async fn insert_complaint(&self, complaint: NewComplaint) -> Result<Complaint> {
        let id: ComplaintId = sqlx::query_scalar(
            r#"INSERT INTO complaints (citizen_id, category_id, title, description, evidence_ref,
                                       evidence_size, latitude, longitude, street_name, district,
                                       status, priority)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
               RETURNING id"#,
        )
        .bind(complaint.citizen_id)
        .bind(complaint.category_id)
        .bind(&complaint.title)
        .bind(&complaint.description)
        .bind(complaint.evidence.as_ref().map(|e| e.reference.clone()))
        .bind(complaint.evidence.as_ref().map(|e| e.size_bytes))
        .bind(complaint.location.latitude)
        .bind(complaint.location.longitude)
        .bind(&complaint.street_name)
        .bind(&complaint.district)
        .bind(ComplaintStatus::default().as_str())
        .bind(complaint.priority.as_str())
        .fetch_one(&self.pool)
        .await
        .context("Failed to insert complaint")?;

        self.load_complaint(id)
            .await?
            .map(|view| view.complaint)
            .ok_or_else(|| anyhow!("complaint {} vanished after insert", id))
    }

    async fn load_complaint(&self, id: ComplaintId) -> Result<Option<ComplaintView>> {
        let sql = format!("{} AND c.id = $1", COMPLAINT_VIEW_SELECT);
        let row = sqlx::query_as::<_, ComplaintViewRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to load complaint")?;
        Ok(row.map(ComplaintView::from))
    }

    async fn update_complaint(&self, complaint: &Complaint) -> Result<()> {
        let updated = sqlx::query(
            r#"UPDATE complaints
               SET category_id = $2, title = $3, description = $4, evidence_ref = $5,
                   evidence_size = $6, latitude = $7, longitude = $8, street_name = $9,
                   district = $10, status = $11, priority = $12, updated_at = $13
               WHERE id = $1"#,
        )
        .bind(complaint.id)
        .bind(complaint.category_id)
        .bind(&complaint.title)
        .bind(&complaint.description)
        .bind(complaint.evidence.as_ref().map(|e| e.reference.clone()))
        .bind(complaint.evidence.as_ref().map(|e| e.size_bytes))
        .bind(complaint.location.latitude)
        .bind(complaint.location.longitude)
        .bind(&complaint.street_name)
        .bind(&complaint.district)
        .bind(complaint.status.as_str())
        .bind(complaint.priority.as_str())
        .bind(complaint.updated_at)
        .execute(&self.pool)
        .await
        .context("Failed to update complaint")?
        .rows_affected();
        if updated == 0 {
            bail!("complaint {} not found", complaint.id);
        }
        Ok(())
    }

    async fn delete_complaint(&self, id: ComplaintId) -> Result<bool> {
        let deleted = sqlx::query("DELETE FROM complaints WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to delete complaint")?
            .rows_affected();
        Ok(deleted > 0)
    }

    async fn query_complaints(
        &self,
        query: &ComplaintQuery,
        page: PageRequest,
    ) -> Result<Page<ComplaintView>> {
        let page = page.normalized();

        let mut count = QueryBuilder::new(format!("SELECT COUNT(*) {}", COMPLAINT_FROM));
        push_complaint_filters(&mut count, query);
        let total: i64 = count
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await
            .context("Failed to count complaints")?;

        let items = self.complaint_views(query, Some(page)).await?;
        Ok(Page {
            items,
            total: total.max(0) as u64,
            page: page.page,
            per_page: page.per_page,
        })
    }

    async fn query_all_complaints(&self, query: &ComplaintQuery) -> Result<Vec<ComplaintView>> {
        self.complaint_views(query, None).await
    }

    async fn count_complaints(
        &self,
        query: &ComplaintQuery,
        dimension: Dimension,
    ) -> Result<Vec<CountBucket>> {
        let key = dimension_key_sql(dimension);
        let mut builder = QueryBuilder::new(format!(
            "SELECT {} AS key, COUNT(*)::BIGINT AS total {}",
            key, COMPLAINT_FROM
        ));
        push_complaint_filters(&mut builder, query);
        builder.push(" GROUP BY 1");

        let rows: Vec<(String, i64)> = builder
            .build_query_as::<(String, i64)>()
            .fetch_all(&self.pool)
            .await
            .context("Failed to count complaints")?;
        let mut buckets: Vec<CountBucket> = rows
            .into_iter()
            .map(|(key, total)| CountBucket { key, total })
            .collect();
        dimension.order(&mut buckets);
        Ok(buckets)
    }

    // ── Bills ──

    async fn find_open_bill(&self, user_id: UserId, service: ServiceType) -> Result<Option<Bill>> {
        let sql = format!(
            "SELECT {} FROM bills WHERE user_id = $1 AND service_type = $2 \
             AND status IN ('PENDING', 'PARTIAL')",
            BILL_COLUMNS
        );
        sqlx::query_as::<_, Bill>(&sql)
            .bind(user_id)
            .bind(service.as_str())
            .fetch_optional(&self.pool)
            .await
            .context("Failed to find open bill")
    }

    async fn find_or_insert_open_bill(&self, bill: NewBill) -> Result<Bill> {
        // The partial unique index turns a racing insert into a no-op.
        let sql = format!(
            r#"INSERT INTO bills (user_id, service_type, amount_due, due_date,
                                  allow_installments, max_installments)
               VALUES ($1, $2, $3, $4, $5, $6)
               ON CONFLICT (user_id, service_type) WHERE status IN ('PENDING', 'PARTIAL')
               DO NOTHING
               RETURNING {}"#,
            BILL_COLUMNS
        );
        let inserted = sqlx::query_as::<_, Bill>(&sql)
            .bind(bill.user_id)
            .bind(bill.service_type.as_str())
            .bind(bill.amount_due)
            .bind(bill.due_date)
            .bind(bill.allow_installments)
            .bind(bill.max_installments)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to insert bill")?;
        if let Some(bill) = inserted {
            return Ok(bill);
        }

        self.find_open_bill(bill.user_id, bill.service_type)
            .await?
            .ok_or_else(|| anyhow!("open bill for user {} disappeared during insert", bill.user_id))
    }

    async fn get_bill(&self, id: BillId) -> Result<Option<Bill>> {
        let sql = format!("SELECT {} FROM bills WHERE id = $1", BILL_COLUMNS);
        sqlx::query_as::<_, Bill>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch bill")
    }

    async fn list_bills(&self, user_id: UserId, filter: &BillFilter) -> Result<Vec<Bill>> {
        let mut builder = QueryBuilder::<Postgres>::new(format!(
            "SELECT {} FROM bills WHERE user_id = ",
            BILL_COLUMNS
        ));
        builder.push_bind(user_id);
        if let Some(service) = filter.service_type {
            builder.push(" AND service_type = ").push_bind(service.as_str());
        }
        if let Some(status) = filter.status {
            builder.push(" AND status = ").push_bind(status.as_str());
        }
        builder.push(" ORDER BY created_at DESC, id DESC");
        builder
            .build_query_as::<Bill>()
            .fetch_all(&self.pool)
            .await
            .context("Failed to list bills")
    }

    // ── Payments ──

    async fn insert_payment(&self, bill_id: BillId, amount: Decimal) -> Result<Payment> {
        let sql = format!(
            "INSERT INTO payments (bill_id, amount) VALUES ($1, $2) RETURNING {}",
            PAYMENT_COLUMNS
        );
        sqlx::query_as::<_, Payment>(&sql)
            .bind(bill_id)
            .bind(amount)
            .fetch_one(&self.pool)
            .await
            .context("Failed to insert payment")
    }

    async fn attach_checkout_session(&self, payment_id: PaymentId, session_id: &str) -> Result<()> {
        sqlx::query("UPDATE payments SET checkout_session_id = $2 WHERE id = $1")
            .bind(payment_id)
            .bind(session_id)
            .execute(&self.pool)
            .await
            .context("Failed to attach checkout session")?;
        Ok(())
    }

    async fn mark_payment_failed(&self, payment_id: PaymentId) -> Result<()> {
        sqlx::query("UPDATE payments SET status = 'FAILED' WHERE id = $1 AND status = 'INITIATED'")
            .bind(payment_id)
            .execute(&self.pool)
            .await
            .context("Failed to mark payment failed")?;
        Ok(())
    }

    async fn find_payment_by_session(
        &self,
        session_id: &str,
        user_id: UserId,
        service: ServiceType,
    ) -> Result<Option<Payment>> {
        let sql = format!(
            "SELECT {} FROM payments p WHERE p.checkout_session_id = $1 AND EXISTS (\
               SELECT 1 FROM bills b WHERE b.id = p.bill_id AND b.user_id = $2 AND b.service_type = $3)",
            PAYMENT_COLUMNS
        );
        sqlx::query_as::<_, Payment>(&sql)
            .bind(session_id)
            .bind(user_id)
            .bind(service.as_str())
            .fetch_optional(&self.pool)
            .await
            .context("Failed to find payment by session")
    }

    async fn get_payment_for_user(
        &self,
        payment_id: PaymentId,
        user_id: UserId,
    ) -> Result<Option<(Payment, Bill)>> {
        let sql = format!("SELECT {} FROM payments WHERE id = $1", PAYMENT_COLUMNS);
        let Some(payment) = sqlx::query_as::<_, Payment>(&sql)
            .bind(payment_id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch payment")?
        else {
            return Ok(None);
        };
        Ok(self
            .get_bill(payment.bill_id)
            .await?
            .filter(|b| b.user_id == user_id)
            .map(|b| (payment, b)))
    }

    async fn list_payments(
        &self,
        user_id: UserId,
        filter: &PaymentFilter,
    ) -> Result<Vec<(Payment, Bill)>> {
        let mut builder = QueryBuilder::<Postgres>::new(
            "SELECT p.id, p.bill_id, p.checkout_session_id, p.provider_payment_ref, p.amount, \
             p.status, p.paid_at, p.receipt_ref, p.created_at \
             FROM payments p JOIN bills b ON b.id = p.bill_id WHERE b.user_id = ",
        );
        builder.push_bind(user_id);
        if let Some(service) = filter.service_type {
            builder.push(" AND b.service_type = ").push_bind(service.as_str());
        }
        if let Some(status) = filter.status {
            builder.push(" AND p.status = ").push_bind(status.as_str());
        }
        builder.push(" ORDER BY COALESCE(p.paid_at, p.created_at) DESC, p.id DESC");
        if let Some(limit) = filter.limit {
            builder.push(" LIMIT ").push_bind(limit as i64);
        }
        let payments = builder
            .build_query_as::<Payment>()
            .fetch_all(&self.pool)
            .await
            .context("Failed to list payments")?;

        let bill_ids: Vec<BillId> = payments.iter().map(|p| p.bill_id).collect();
        let sql = format!("SELECT {} FROM bills WHERE id = ANY($1)", BILL_COLUMNS);
        let bills: HashMap<BillId, Bill> = sqlx::query_as::<_, Bill>(&sql)
            .bind(&bill_ids)
            .fetch_all(&self.pool)
            .await
            .context("Failed to load payment bills")?
            .into_iter()
            .map(|b| (b.id, b))
            .collect();

        Ok(payments
            .into_iter()
            .filter_map(|p| bills.get(&p.bill_id).cloned().map(|b| (p, b)))
            .collect())
    }

    async fn finalize_payment(
        &self,
        payment_id: PaymentId,
        settlement: &Settlement,
        render: &ReceiptRenderFn<'_>,
    ) -> Result<Finalization> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        let sql = format!("SELECT {} FROM payments WHERE id = $1 FOR UPDATE", PAYMENT_COLUMNS);
        let payment = sqlx::query_as::<_, Payment>(&sql)
            .bind(payment_id)
            .fetch_optional(&mut *tx)
            .await
            .context("Failed to lock payment")?
            .ok_or_else(|| anyhow!("payment {} not found", payment_id))?;
        if payment.status == PaymentStatus::Paid {
            tx.rollback().await.context("Failed to release payment lock")?;
            return Ok(Finalization::AlreadyPaid(payment));
        }

        let sql = format!("SELECT {} FROM bills WHERE id = $1 FOR UPDATE", BILL_COLUMNS);
        let mut bill = sqlx::query_as::<_, Bill>(&sql)
            .bind(payment.bill_id)
            .fetch_one(&mut *tx)
            .await
            .context("Failed to lock bill")?;

        let update = apply_payment(&bill, payment.amount, settlement.counts_installment);
        update.apply_to(&mut bill, settlement.paid_at);

        let mut payment = Payment {
            status: PaymentStatus::Paid,
            paid_at: Some(settlement.paid_at),
            provider_payment_ref: settlement
                .provider_payment_ref
                .clone()
                .or(payment.provider_payment_ref),
            ..payment
        };
        // Dropping `tx` on a render error rolls everything back.
        let receipt = render(&payment, &bill)?;
        payment.receipt_ref = Some(receipt.reference.clone());

        sqlx::query(
            r#"UPDATE bills
               SET amount_paid = $2, status = $3, installment_count = $4, updated_at = $5
               WHERE id = $1"#,
        )
        .bind(bill.id)
        .bind(bill.amount_paid)
        .bind(bill.status.as_str())
        .bind(bill.installment_count)
        .bind(bill.updated_at)
        .execute(&mut *tx)
        .await
        .context("Failed to update bill ledger")?;

        sqlx::query(
            r#"INSERT INTO receipts (payment_id, reference, receipt_number, content_type, bytes, created_at)
               VALUES ($1, $2, $3, $4, $5, $6)"#,
        )
        .bind(receipt.payment_id)
        .bind(&receipt.reference)
        .bind(&receipt.receipt_number)
        .bind(&receipt.content_type)
        .bind(&receipt.bytes)
        .bind(receipt.created_at)
        .execute(&mut *tx)
        .await
        .context("Failed to store receipt")?;

        sqlx::query(
            r#"UPDATE payments
               SET status = 'PAID', paid_at = $2, provider_payment_ref = $3, receipt_ref = $4
               WHERE id = $1"#,
        )
        .bind(payment.id)
        .bind(payment.paid_at)
        .bind(&payment.provider_payment_ref)
        .bind(&payment.receipt_ref)
        .execute(&mut *tx)
        .await
        .context("Failed to mark payment paid")?;

        tx.commit().await.context("Failed to commit payment finalization")?;
        info!(payment_id = payment.id, bill_id = bill.id, "Finalized payment");

        Ok(Finalization::Applied {
            payment,
            bill,
            receipt,
            overpayment: update.overpayment,
        })
    }

    // ── Receipts ──

    async fn load_receipt(&self, payment_id: PaymentId) -> Result<Option<ReceiptArtifact>> {
        let row = sqlx::query_as::<_, ReceiptRow>(
            "SELECT payment_id, reference, receipt_number, content_type, bytes, created_at \
             FROM receipts WHERE payment_id = $1",
        )
        .bind(payment_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to load receipt")?;
        Ok(row.map(ReceiptArtifact::from))
    }

    // ── Sessions ──

    async fn insert_session(&self, session: &Session) -> Result<()> {
        sqlx::query(
            "INSERT INTO sessions (token, user_id, created_at, expires_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(&session.token)
        .bind(session.user_id)
        .bind(session.created_at)
        .bind(session.expires_at)
        .execute(&self.pool)
        .await
        .context("Failed to insert session")?;
        Ok(())
    }

    async fn load_session(&self, token: &str) -> Result<Option<Session>> {
        let row = sqlx::query_as::<_, SessionRow>(
            "SELECT token, user_id, created_at, expires_at FROM sessions WHERE token = $1",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to load session")?;
        Ok(row.map(Session::from))
    }

    async fn delete_session(&self, token: &str) -> Result<()> {
        sqlx::query("DELETE FROM sessions WHERE token = $1")
            .bind(token)
            .execute(&self.pool)
            .await
            .context("Failed to delete session")?;
        Ok(())
    }

    async fn purge_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64> {
        let purged = sqlx::query("DELETE FROM sessions WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await
            .context("Failed to purge expired sessions")?
            .rows_affected();
        if purged > 0 {
            debug!(purged, "Purged expired sessions");
        }
        Ok(purged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoping::ComplaintFilter;

    #[test]
    fn test_contains_pattern_escapes_wildcards() {
        assert_eq!(contains_pattern("road"), "%road%");
        assert_eq!(contains_pattern("50%_off"), "%50\\%\\_off%");
    }

    #[test]
    fn test_staff_without_ward_matches_nothing() {
        let query = ComplaintQuery {
            scope: ComplaintScope::Nothing,
            filter: ComplaintFilter::default(),
            extended_search: false,
        };
        let mut builder = QueryBuilder::new(COMPLAINT_VIEW_SELECT);
        push_complaint_filters(&mut builder, &query);
        assert!(builder.sql().ends_with("AND FALSE"));
    }

    #[test]
    fn test_search_is_extended_only_for_admins() {
        let filter = ComplaintFilter {
            search: Some("pothole".to_string()),
            ..Default::default()
        };
        let mut narrow = QueryBuilder::new(COMPLAINT_VIEW_SELECT);
        push_complaint_filters(
            &mut narrow,
            &ComplaintQuery {
                scope: ComplaintScope::Owner(7),
                filter: filter.clone(),
                extended_search: false,
            },
        );
        assert!(!narrow.sql().contains("c.description ILIKE"));

        let mut wide = QueryBuilder::new(COMPLAINT_VIEW_SELECT);
        push_complaint_filters(&mut wide, &ComplaintQuery::unrestricted(filter));
        assert!(wide.sql().contains("c.description ILIKE"));
    }
}
