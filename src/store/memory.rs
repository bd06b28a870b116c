//! In-memory store
//!
//! All state sits behind one `tokio::sync::RwLock`. Every multi-step write
//! (open-bill creation, payment finalization, cascade deletes) happens under a
//! single write guard, which gives the same atomicity the Postgres backend
//! gets from transactions.

use std::collections::{BTreeMap, HashMap};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::RwLock;
use tracing::debug;

use super::{
    BillFilter, Finalization, LoginIdentifier, NewBill, NewCategory, NewComplaint, NewUser,
    PaymentFilter, PortalStore, ProfileFn, ReceiptRenderFn, Settlement, UniqueField,
};
use crate::billing::ledger::apply_payment;
use crate::identity::Session;
use crate::models::*;
use crate::scoping::analytics::{tally, CountBucket, Dimension};
use crate::scoping::{ComplaintQuery, Page, PageRequest};

#[derive(Default)]
struct Inner {
    next_id: i64,
    users: BTreeMap<UserId, User>,
    profiles: HashMap<UserId, Profile>,
    password_hashes: HashMap<UserId, String>,
    wards: BTreeMap<WardId, Ward>,
    departments: BTreeMap<DepartmentId, Department>,
    categories: BTreeMap<CategoryId, ComplaintCategory>,
    complaints: BTreeMap<ComplaintId, Complaint>,
    bills: BTreeMap<BillId, Bill>,
    payments: BTreeMap<PaymentId, Payment>,
    receipts: HashMap<PaymentId, ReceiptArtifact>,
    sessions: HashMap<String, Session>,
}

impl Inner {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    /// Builds the row without inserting it.
    fn new_user(&mut self, user: NewUser) -> (User, Option<String>) {
        let now = Utc::now();
        let id = self.allocate_id();
        let row = User {
            id,
            first_name: user.first_name,
            last_name: user.last_name,
            email: user.email,
            phone_number: user.phone_number,
            identity_document: user.identity_document,
            role: user.role,
            ward_id: user.ward_id,
            department_id: user.department_id,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        (row, user.password_hash)
    }

    fn store_user(&mut self, user: &User, password_hash: Option<String>) {
        self.users.insert(user.id, user.clone());
        if let Some(hash) = password_hash {
            self.password_hashes.insert(user.id, hash);
        }
    }

    fn view(&self, complaint: &Complaint) -> ComplaintView {
        let citizen = self.users.get(&complaint.citizen_id);
        let category = self.categories.get(&complaint.category_id);
        ComplaintView {
            complaint: complaint.clone(),
            citizen_name: citizen.map(User::display_name).unwrap_or_default(),
            citizen_ward_id: citizen.and_then(|u| u.ward_id),
            category_name: category.map(|c| c.name.clone()).unwrap_or_default(),
            department_id: category.and_then(|c| c.department_id),
        }
    }

    /// Matching rows, newest first.
    fn matching(&self, query: &ComplaintQuery) -> Vec<ComplaintView> {
        let mut views: Vec<ComplaintView> = self
            .complaints
            .values()
            .map(|c| self.view(c))
            .filter(|v| query.matches(v))
            .collect();
        views.sort_by(|a, b| {
            b.complaint
                .created_at
                .cmp(&a.complaint.created_at)
                .then_with(|| b.complaint.id.cmp(&a.complaint.id))
        });
        views
    }

    fn active_users_with(&self, pred: impl Fn(&User) -> bool) -> Vec<User> {
        self.users
            .values()
            .filter(|u| u.is_active && pred(u))
            .cloned()
            .collect()
    }
}

/// Store backend for tests and single-process demos
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deactivate or reactivate an account.
    pub async fn set_user_active(&self, user_id: UserId, active: bool) -> Result<()> {
        let mut inner = self.inner.write().await;
        let user = inner
            .users
            .get_mut(&user_id)
            .ok_or_else(|| anyhow!("user {} not found", user_id))?;
        user.is_active = active;
        user.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl PortalStore for MemoryStore {
    // ── Directory ──

    async fn insert_user(&self, user: NewUser) -> Result<User> {
        let mut inner = self.inner.write().await;
        let (user, password_hash) = inner.new_user(user);
        inner.store_user(&user, password_hash);
        Ok(user)
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>> {
        Ok(self.inner.read().await.users.get(&id).cloned())
    }

    async fn is_taken(&self, field: UniqueField<'_>) -> Result<bool> {
        let inner = self.inner.read().await;
        Ok(inner.users.values().any(|u| match field {
            UniqueField::Email(email) => u
                .email
                .as_deref()
                .is_some_and(|e| e.eq_ignore_ascii_case(email)),
            UniqueField::Phone(phone) => u.phone_number.as_deref() == Some(phone),
            UniqueField::Identity(doc) => u.identity_document.as_ref() == Some(doc),
        }))
    }

    async fn list_active_staff_in_ward(&self, ward_id: WardId) -> Result<Vec<User>> {
        let inner = self.inner.read().await;
        Ok(inner.active_users_with(|u| u.role == Role::Staff && u.ward_id == Some(ward_id)))
    }

    async fn list_active_admins(&self) -> Result<Vec<User>> {
        let inner = self.inner.read().await;
        Ok(inner.active_users_with(|u| u.role == Role::Admin))
    }

    async fn create_account(&self, user: NewUser, profile: &ProfileFn<'_>) -> Result<(User, Profile)> {
        let mut inner = self.inner.write().await;
        let (user, password_hash) = inner.new_user(user);
        let profile = profile(&user);
        if profile.user_id() != user.id || profile.role() != user.role {
            bail!(
                "profile for user {} ({}) does not match new user {} ({})",
                profile.user_id(),
                profile.role(),
                user.id,
                user.role
            );
        }
        inner.store_user(&user, password_hash);
        inner.profiles.insert(user.id, profile.clone());
        Ok((user, profile))
    }

    async fn find_credentials(
        &self,
        identifier: LoginIdentifier<'_>,
    ) -> Result<Option<(User, Option<String>)>> {
        let inner = self.inner.read().await;
        let user = inner.users.values().find(|u| match identifier {
            LoginIdentifier::Email(email) => u
                .email
                .as_deref()
                .is_some_and(|e| e.eq_ignore_ascii_case(email)),
            LoginIdentifier::Phone(phone) => u.phone_number.as_deref() == Some(phone),
        });
        Ok(user.map(|u| (u.clone(), inner.password_hashes.get(&u.id).cloned())))
    }

    async fn load_profile(&self, user_id: UserId) -> Result<Option<Profile>> {
        Ok(self.inner.read().await.profiles.get(&user_id).cloned())
    }

    // ── Wards & departments ──

    async fn insert_ward(&self, name: &str) -> Result<Ward> {
        let mut inner = self.inner.write().await;
        if inner.wards.values().any(|w| w.name == name) {
            bail!("ward '{}' already exists", name);
        }
        let ward = Ward {
            id: inner.allocate_id(),
            name: name.to_string(),
        };
        inner.wards.insert(ward.id, ward.clone());
        Ok(ward)
    }

    async fn get_ward(&self, id: WardId) -> Result<Option<Ward>> {
        Ok(self.inner.read().await.wards.get(&id).cloned())
    }

    async fn list_wards(&self) -> Result<Vec<Ward>> {
        let inner = self.inner.read().await;
        let mut wards: Vec<Ward> = inner.wards.values().cloned().collect();
        wards.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(wards)
    }

    async fn insert_department(&self, name: &str, description: Option<&str>) -> Result<Department> {
        let mut inner = self.inner.write().await;
        let department = Department {
            id: inner.allocate_id(),
            name: name.to_string(),
            description: description.map(str::to_string),
        };
        inner.departments.insert(department.id, department.clone());
        Ok(department)
    }

    async fn get_department(&self, id: DepartmentId) -> Result<Option<Department>> {
        Ok(self.inner.read().await.departments.get(&id).cloned())
    }

    // ── Categories ──

    async fn insert_category(&self, category: NewCategory) -> Result<ComplaintCategory> {
        let mut inner = self.inner.write().await;
        if inner
            .categories
            .values()
            .any(|c| c.name.eq_ignore_ascii_case(&category.name))
        {
            bail!("category '{}' already exists", category.name);
        }
        let category = ComplaintCategory {
            id: inner.allocate_id(),
            name: category.name,
            description: category.description,
            department_id: category.department_id,
        };
        inner.categories.insert(category.id, category.clone());
        Ok(category)
    }

    async fn get_category(&self, id: CategoryId) -> Result<Option<ComplaintCategory>> {
        Ok(self.inner.read().await.categories.get(&id).cloned())
    }

    async fn category_name_taken(&self, name: &str) -> Result<bool> {
        let inner = self.inner.read().await;
        Ok(inner
            .categories
            .values()
            .any(|c| c.name.eq_ignore_ascii_case(name)))
    }

    async fn list_categories(&self) -> Result<Vec<ComplaintCategory>> {
        let inner = self.inner.read().await;
        let mut categories: Vec<ComplaintCategory> = inner.categories.values().cloned().collect();
        categories.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(categories)
    }

    async fn delete_category(&self, id: CategoryId) -> Result<Option<u64>> {
        let mut inner = self.inner.write().await;
        if inner.categories.remove(&id).is_none() {
            return Ok(None);
        }
        let before = inner.complaints.len();
        inner.complaints.retain(|_, c| c.category_id != id);
        let removed = (before - inner.complaints.len()) as u64;
        debug!(category_id = id, removed, "Cascade-deleted complaints");
        Ok(Some(removed))
    }

    // ── Complaints ──

    async fn insert_complaint(&self, complaint: NewComplaint) -> Result<Complaint> {
        let mut inner = self.inner.write().await;
        if !inner.categories.contains_key(&complaint.category_id) {
            bail!("category {} not found", complaint.category_id);
        }
        if !inner.users.contains_key(&complaint.citizen_id) {
            bail!("user {} not found", complaint.citizen_id);
        }
        let now = Utc::now();
        let complaint = Complaint {
            id: inner.allocate_id(),
            citizen_id: complaint.citizen_id,
            category_id: complaint.category_id,
            title: complaint.title,
            description: complaint.description,
            evidence: complaint.evidence,
            location: complaint.location,
            street_name: complaint.street_name,
            district: complaint.district,
            status: ComplaintStatus::default(),
            priority: complaint.priority,
            created_at: now,
            updated_at: now,
        };
        inner.complaints.insert(complaint.id, complaint.clone());
        Ok(complaint)
    }

    async fn load_complaint(&self, id: ComplaintId) -> Result<Option<ComplaintView>> {
        let inner = self.inner.read().await;
        Ok(inner.complaints.get(&id).map(|c| inner.view(c)))
    }

    async fn update_complaint(&self, complaint: &Complaint) -> Result<()> {
        let mut inner = self.inner.write().await;
        let slot = inner
            .complaints
            .get_mut(&complaint.id)
            .ok_or_else(|| anyhow!("complaint {} not found", complaint.id))?;
        *slot = complaint.clone();
        Ok(())
    }

    async fn delete_complaint(&self, id: ComplaintId) -> Result<bool> {
        Ok(self.inner.write().await.complaints.remove(&id).is_some())
    }

    async fn query_complaints(
        &self,
        query: &ComplaintQuery,
        page: PageRequest,
    ) -> Result<Page<ComplaintView>> {
        let inner = self.inner.read().await;
        Ok(Page::from_all(inner.matching(query), page))
    }

    async fn query_all_complaints(&self, query: &ComplaintQuery) -> Result<Vec<ComplaintView>> {
        Ok(self.inner.read().await.matching(query))
    }

    async fn count_complaints(
        &self,
        query: &ComplaintQuery,
        dimension: Dimension,
    ) -> Result<Vec<CountBucket>> {
        let inner = self.inner.read().await;
        let keys = inner.matching(query).into_iter().map(|view| {
            let ward_name = view
                .citizen_ward_id
                .and_then(|id| inner.wards.get(&id))
                .map(|w| w.name.as_str());
            dimension.key_of(&view, ward_name)
        });
        Ok(tally(dimension, keys))
    }

    // ── Bills ──

    async fn find_open_bill(&self, user_id: UserId, service: ServiceType) -> Result<Option<Bill>> {
        let inner = self.inner.read().await;
        Ok(inner
            .bills
            .values()
            .find(|b| b.user_id == user_id && b.service_type == service && b.status.is_open())
            .cloned())
    }

    async fn find_or_insert_open_bill(&self, bill: NewBill) -> Result<Bill> {
        let mut inner = self.inner.write().await;
        if let Some(existing) = inner.bills.values().find(|b| {
            b.user_id == bill.user_id && b.service_type == bill.service_type && b.status.is_open()
        }) {
            return Ok(existing.clone());
        }
        let now = Utc::now();
        let bill = Bill {
            id: inner.allocate_id(),
            user_id: bill.user_id,
            service_type: bill.service_type,
            amount_due: bill.amount_due,
            amount_paid: Decimal::ZERO,
            status: BillStatus::Pending,
            due_date: bill.due_date,
            allow_installments: bill.allow_installments,
            max_installments: bill.max_installments,
            installment_count: 0,
            created_at: now,
            updated_at: now,
        };
        inner.bills.insert(bill.id, bill.clone());
        Ok(bill)
    }

    async fn get_bill(&self, id: BillId) -> Result<Option<Bill>> {
        Ok(self.inner.read().await.bills.get(&id).cloned())
    }

    async fn list_bills(&self, user_id: UserId, filter: &BillFilter) -> Result<Vec<Bill>> {
        let inner = self.inner.read().await;
        let mut bills: Vec<Bill> = inner
            .bills
            .values()
            .filter(|b| b.user_id == user_id)
            .filter(|b| filter.service_type.is_none_or(|s| s == b.service_type))
            .filter(|b| filter.status.is_none_or(|s| s == b.status))
            .cloned()
            .collect();
        bills.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        Ok(bills)
    }

    // ── Payments ──

    async fn insert_payment(&self, bill_id: BillId, amount: Decimal) -> Result<Payment> {
        let mut inner = self.inner.write().await;
        if !inner.bills.contains_key(&bill_id) {
            bail!("bill {} not found", bill_id);
        }
        let payment = Payment {
            id: inner.allocate_id(),
            bill_id,
            checkout_session_id: None,
            provider_payment_ref: None,
            amount,
            status: PaymentStatus::Initiated,
            paid_at: None,
            receipt_ref: None,
            created_at: Utc::now(),
        };
        inner.payments.insert(payment.id, payment.clone());
        Ok(payment)
    }

    async fn attach_checkout_session(&self, payment_id: PaymentId, session_id: &str) -> Result<()> {
        let mut inner = self.inner.write().await;
        let payment = inner
            .payments
            .get_mut(&payment_id)
            .ok_or_else(|| anyhow!("payment {} not found", payment_id))?;
        payment.checkout_session_id = Some(session_id.to_string());
        Ok(())
    }

    async fn mark_payment_failed(&self, payment_id: PaymentId) -> Result<()> {
        let mut inner = self.inner.write().await;
        let payment = inner
            .payments
            .get_mut(&payment_id)
            .ok_or_else(|| anyhow!("payment {} not found", payment_id))?;
        if payment.status == PaymentStatus::Initiated {
            payment.status = PaymentStatus::Failed;
        }
        Ok(())
    }

    async fn find_payment_by_session(
        &self,
        session_id: &str,
        user_id: UserId,
        service: ServiceType,
    ) -> Result<Option<Payment>> {
        let inner = self.inner.read().await;
        Ok(inner
            .payments
            .values()
            .filter(|p| p.checkout_session_id.as_deref() == Some(session_id))
            .find(|p| {
                inner
                    .bills
                    .get(&p.bill_id)
                    .is_some_and(|b| b.user_id == user_id && b.service_type == service)
            })
            .cloned())
    }

    async fn get_payment_for_user(
        &self,
        payment_id: PaymentId,
        user_id: UserId,
    ) -> Result<Option<(Payment, Bill)>> {
        let inner = self.inner.read().await;
        let Some(payment) = inner.payments.get(&payment_id) else {
            return Ok(None);
        };
        Ok(inner
            .bills
            .get(&payment.bill_id)
            .filter(|b| b.user_id == user_id)
            .map(|b| (payment.clone(), b.clone())))
    }

    async fn list_payments(
        &self,
        user_id: UserId,
        filter: &PaymentFilter,
    ) -> Result<Vec<(Payment, Bill)>> {
        let inner = self.inner.read().await;
        let mut rows: Vec<(Payment, Bill)> = inner
            .payments
            .values()
            .filter_map(|p| inner.bills.get(&p.bill_id).map(|b| (p, b)))
            .filter(|(_, b)| b.user_id == user_id)
            .filter(|(_, b)| filter.service_type.is_none_or(|s| s == b.service_type))
            .filter(|(p, _)| filter.status.is_none_or(|s| s == p.status))
            .map(|(p, b)| (p.clone(), b.clone()))
            .collect();
        rows.sort_by(|(a, _), (b, _)| {
            let a_at = a.paid_at.unwrap_or(a.created_at);
            let b_at = b.paid_at.unwrap_or(b.created_at);
            b_at.cmp(&a_at).then_with(|| b.id.cmp(&a.id))
        });
        if let Some(limit) = filter.limit {
            rows.truncate(limit);
        }
        Ok(rows)
    }

    async fn finalize_payment(
        &self,
        payment_id: PaymentId,
        settlement: &Settlement,
        render: &ReceiptRenderFn<'_>,
    ) -> Result<Finalization> {
        let mut inner = self.inner.write().await;

        let payment = inner
            .payments
            .get(&payment_id)
            .cloned()
            .ok_or_else(|| anyhow!("payment {} not found", payment_id))?;
        if payment.status == PaymentStatus::Paid {
            return Ok(Finalization::AlreadyPaid(payment));
        }
        let mut bill = inner
            .bills
            .get(&payment.bill_id)
            .cloned()
            .ok_or_else(|| anyhow!("bill {} not found", payment.bill_id))?;

        // Work on copies; nothing is written back until the receipt renders.
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
        let receipt = render(&payment, &bill)?;
        payment.receipt_ref = Some(receipt.reference.clone());

        inner.bills.insert(bill.id, bill.clone());
        inner.payments.insert(payment.id, payment.clone());
        inner.receipts.insert(payment.id, receipt.clone());

        Ok(Finalization::Applied {
            payment,
            bill,
            receipt,
            overpayment: update.overpayment,
        })
    }

    // ── Receipts ──

    async fn load_receipt(&self, payment_id: PaymentId) -> Result<Option<ReceiptArtifact>> {
        Ok(self.inner.read().await.receipts.get(&payment_id).cloned())
    }

    // ── Sessions ──

    async fn insert_session(&self, session: &Session) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.sessions.insert(session.token.clone(), session.clone());
        Ok(())
    }

    async fn load_session(&self, token: &str) -> Result<Option<Session>> {
        Ok(self.inner.read().await.sessions.get(token).cloned())
    }

    async fn delete_session(&self, token: &str) -> Result<()> {
        self.inner.write().await.sessions.remove(token);
        Ok(())
    }

    async fn purge_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut inner = self.inner.write().await;
        let before = inner.sessions.len();
        inner.sessions.retain(|_, session| !session.is_expired(now));
        Ok((before - inner.sessions.len()) as u64)
    }
}
