use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{CategoryId, ComplaintId, DepartmentId, UserId, WardId};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(
    feature = "database",
    derive(sqlx::Type),
    sqlx(type_name = "VARCHAR", rename_all = "SCREAMING_SNAKE_CASE")
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComplaintStatus {
    #[default]
    Submitted,
    Acknowledged,
    InProgress,
    Resolved,
    Rejected,
}

wire_enum!(ComplaintStatus {
    Submitted => "SUBMITTED",
    Acknowledged => "ACKNOWLEDGED",
    InProgress => "IN_PROGRESS",
    Resolved => "RESOLVED",
    Rejected => "REJECTED",
});

impl ComplaintStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ComplaintStatus::Resolved | ComplaintStatus::Rejected)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(
    feature = "database",
    derive(sqlx::Type),
    sqlx(type_name = "VARCHAR", rename_all = "SCREAMING_SNAKE_CASE")
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    #[default]
    Low,
    Medium,
    High,
}

wire_enum!(Priority {
    Low => "LOW",
    Medium => "MEDIUM",
    High => "HIGH",
});

/// WGS84 point; GeoJSON order is `[longitude, latitude]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

/// Reference to a stored evidence photo
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceImage {
    pub reference: String,
    pub size_bytes: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "database", derive(sqlx::FromRow))]
pub struct ComplaintCategory {
    pub id: CategoryId,
    pub name: String,
    pub description: String,
    pub department_id: Option<DepartmentId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Complaint {
    pub id: ComplaintId,
    /// Owning citizen; never reassigned after creation.
    pub citizen_id: UserId,
    pub category_id: CategoryId,
    pub title: String,
    pub description: String,
    pub evidence: Option<EvidenceImage>,
    pub location: GeoPoint,
    pub street_name: Option<String>,
    pub district: Option<String>,
    pub status: ComplaintStatus,
    pub priority: Priority,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Complaint joined with its owner and category.
///
/// The ward is the owning citizen's ward at read time; complaints never
/// store a ward of their own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplaintView {
    pub complaint: Complaint,
    pub citizen_name: String,
    pub citizen_ward_id: Option<WardId>,
    pub category_name: String,
    pub department_id: Option<DepartmentId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_statuses() {
        assert!(ComplaintStatus::Resolved.is_terminal());
        assert!(ComplaintStatus::Rejected.is_terminal());
        assert!(!ComplaintStatus::InProgress.is_terminal());
        assert_eq!(ComplaintStatus::default(), ComplaintStatus::Submitted);
        assert_eq!(Priority::default(), Priority::Low);
    }

    #[test]
    fn test_status_parses_wire_name() {
        assert_eq!(
            "in_progress".parse::<ComplaintStatus>().unwrap(),
            ComplaintStatus::InProgress
        );
        assert_eq!(ComplaintStatus::InProgress.to_string(), "IN_PROGRESS");
    }
}
