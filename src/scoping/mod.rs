//! Visibility and scoping engine
//!
//! Turns an actor plus caller-supplied filters into a [`ComplaintQuery`]:
//!
//! - CITIZEN sees complaints they own
//! - STAFF sees complaints whose owner lives in the staff member's ward
//! - ADMIN sees everything and may additionally filter by ward/department
//!
//! A complaint's ward is always the owning citizen's ward, resolved at read
//! time. Backends evaluate the query either in memory ([`ComplaintQuery::matches`])
//! or as SQL; both must agree.

pub mod analytics;
pub mod geo;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::identity::Actor;
use crate::models::{
    CategoryId, ComplaintStatus, ComplaintView, DepartmentId, Priority, Role, UserId, WardId,
};

pub const DEFAULT_PER_PAGE: u32 = 10;
pub const MAX_PER_PAGE: u32 = 100;

/// Which complaints an actor may see at all
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComplaintScope {
    Owner(UserId),
    Ward(WardId),
    Unrestricted,
    /// Staff without a ward assignment.
    Nothing,
}

impl ComplaintScope {
    pub fn for_actor(actor: &Actor) -> Self {
        match actor.role {
            Role::Citizen => ComplaintScope::Owner(actor.user_id),
            Role::Staff => actor
                .ward_id
                .map(ComplaintScope::Ward)
                .unwrap_or(ComplaintScope::Nothing),
            Role::Admin => ComplaintScope::Unrestricted,
        }
    }

    pub fn admits(&self, view: &ComplaintView) -> bool {
        match *self {
            ComplaintScope::Owner(user_id) => view.complaint.citizen_id == user_id,
            ComplaintScope::Ward(ward_id) => view.citizen_ward_id == Some(ward_id),
            ComplaintScope::Unrestricted => true,
            ComplaintScope::Nothing => false,
        }
    }
}

/// Caller-supplied complaint filters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComplaintFilter {
    /// Case-insensitive substring of the title, or of the id.
    pub search: Option<String>,
    pub status: Option<ComplaintStatus>,
    pub priority: Option<Priority>,
    pub category_id: Option<CategoryId>,
    /// Inclusive, compared against the UTC date of `created_at`.
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    /// Admin only.
    pub ward_id: Option<WardId>,
    /// Admin only; matches the category's department.
    pub department_id: Option<DepartmentId>,
}

/// Scope plus filters, ready for a backend to evaluate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComplaintQuery {
    pub scope: ComplaintScope,
    pub filter: ComplaintFilter,
    /// Admins also search description and citizen name.
    pub extended_search: bool,
}

impl ComplaintQuery {
    /// Scope `filter` to what `actor` may see, dropping admin-only filters for others.
    pub fn for_actor(actor: &Actor, mut filter: ComplaintFilter) -> Self {
        filter.search = filter
            .search
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        if !actor.is_admin() {
            filter.ward_id = None;
            filter.department_id = None;
        }
        Self {
            scope: ComplaintScope::for_actor(actor),
            filter,
            extended_search: actor.is_admin(),
        }
    }

    /// Unscoped query, for internal lookups that already checked the actor.
    pub fn unrestricted(filter: ComplaintFilter) -> Self {
        Self {
            scope: ComplaintScope::Unrestricted,
            filter,
            extended_search: true,
        }
    }

    /// In-memory evaluation of the query against one joined row.
    pub fn matches(&self, view: &ComplaintView) -> bool {
        if !self.scope.admits(view) {
            return false;
        }

        let f = &self.filter;
        let c = &view.complaint;

        if f.status.is_some_and(|s| s != c.status)
            || f.priority.is_some_and(|p| p != c.priority)
            || f.category_id.is_some_and(|id| id != c.category_id)
            || f.ward_id.is_some_and(|w| Some(w) != view.citizen_ward_id)
            || f.department_id.is_some_and(|d| Some(d) != view.department_id)
        {
            return false;
        }

        let created = c.created_at.date_naive();
        if f.date_from.is_some_and(|from| created < from) || f.date_to.is_some_and(|to| created > to) {
            return false;
        }

        match &f.search {
            None => true,
            Some(needle) => {
                let needle = needle.to_lowercase();
                c.id.to_string().contains(&needle)
                    || c.title.to_lowercase().contains(&needle)
                    || (self.extended_search
                        && (c.description.to_lowercase().contains(&needle)
                            || view.citizen_name.to_lowercase().contains(&needle)))
            }
        }
    }
}

/// Requested page, 1-based
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageRequest {
    pub page: u32,
    pub per_page: u32,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: DEFAULT_PER_PAGE,
        }
    }
}

impl PageRequest {
    pub fn new(page: u32, per_page: u32) -> Self {
        Self { page, per_page }.normalized()
    }

    pub fn normalized(self) -> Self {
        Self {
            page: self.page.max(1),
            per_page: self.per_page.clamp(1, MAX_PER_PAGE),
        }
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.per_page)
    }
}

/// One page of results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub per_page: u32,
}

impl<T> Page<T> {
    /// Slice an already-ordered result set.
    pub fn from_all(all: Vec<T>, request: PageRequest) -> Self {
        let request = request.normalized();
        let total = all.len() as u64;
        let items = all
            .into_iter()
            .skip(request.offset() as usize)
            .take(request.per_page as usize)
            .collect();
        Self {
            items,
            total,
            page: request.page,
            per_page: request.per_page,
        }
    }

    pub fn total_pages(&self) -> u64 {
        self.total.div_ceil(u64::from(self.per_page.max(1)))
    }
}
