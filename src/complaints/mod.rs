//! Complaint lifecycle
//!
//! [`lifecycle`] holds the state machine and the authorization predicate;
//! [`service`] applies them against the store and fans out notifications.

pub mod lifecycle;
pub mod service;

pub use lifecycle::{authorize, can_transition, ComplaintOperation, Decision, DenyReason};
pub use service::ComplaintService;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::models::{CategoryId, ComplaintStatus, EvidenceImage, GeoPoint, Priority};

/// Largest accepted evidence photo.
pub const MAX_EVIDENCE_BYTES: i64 = 5 * 1024 * 1024;
pub const MAX_TITLE_CHARS: usize = 150;

/// A citizen's new complaint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplaintSubmission {
    pub category_id: CategoryId,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub evidence: Option<EvidenceImage>,
    pub location: GeoPoint,
    #[serde(default)]
    pub street_name: Option<String>,
    #[serde(default)]
    pub district: Option<String>,
}

/// Partial update; `None` leaves a field unchanged
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComplaintPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category_id: Option<CategoryId>,
    pub evidence: Option<EvidenceImage>,
    pub location: Option<GeoPoint>,
    pub street_name: Option<String>,
    pub district: Option<String>,
    pub status: Option<ComplaintStatus>,
    pub priority: Option<Priority>,
}

impl ComplaintPatch {
    /// Fields only the owner or an admin may change.
    pub fn touches_content(&self) -> bool {
        self.title.is_some()
            || self.description.is_some()
            || self.category_id.is_some()
            || self.evidence.is_some()
            || self.location.is_some()
            || self.street_name.is_some()
            || self.district.is_some()
    }

    /// Fields only staff or an admin may change.
    pub fn touches_triage(&self) -> bool {
        self.status.is_some() || self.priority.is_some()
    }

    pub fn is_empty(&self) -> bool {
        !self.touches_content() && !self.touches_triage()
    }

    /// Citizen view of the patch: status and priority are read-only.
    pub fn without_triage(mut self) -> Self {
        self.status = None;
        self.priority = None;
        self
    }
}

pub fn validate_title(raw: &str) -> Result<String, ValidationError> {
    let title = raw.trim();
    if title.is_empty() {
        return Err(ValidationError::new("title", "This field may not be blank"));
    }
    if title.chars().count() > MAX_TITLE_CHARS {
        return Err(ValidationError::new(
            "title",
            format!("Ensure this field has at most {} characters", MAX_TITLE_CHARS),
        ));
    }
    Ok(title.to_string())
}

pub fn validate_description(raw: &str) -> Result<String, ValidationError> {
    let description = raw.trim();
    if description.is_empty() {
        return Err(ValidationError::new("description", "This field may not be blank"));
    }
    Ok(description.to_string())
}

pub fn validate_location(point: &GeoPoint) -> Result<(), ValidationError> {
    if !point.latitude.is_finite() || !(-90.0..=90.0).contains(&point.latitude) {
        return Err(ValidationError::new("latitude", "Latitude must be between -90 and 90"));
    }
    if !point.longitude.is_finite() || !(-180.0..=180.0).contains(&point.longitude) {
        return Err(ValidationError::new(
            "longitude",
            "Longitude must be between -180 and 180",
        ));
    }
    Ok(())
}

pub fn validate_evidence(image: &EvidenceImage) -> Result<(), ValidationError> {
    if image.reference.trim().is_empty() {
        return Err(ValidationError::new("evidence_image", "Image reference is empty"));
    }
    if image.size_bytes > MAX_EVIDENCE_BYTES {
        return Err(ValidationError::new(
            "evidence_image",
            "Image too large. Max size is 5MB",
        ));
    }
    Ok(())
}

fn optional_text(raw: Option<String>) -> Option<String> {
    raw.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_bounds() {
        assert_eq!(validate_title("  Blocked drain ").unwrap(), "Blocked drain");
        assert!(validate_title("   ").is_err());
        assert!(validate_title(&"x".repeat(150)).is_ok());
        assert_eq!(validate_title(&"x".repeat(151)).unwrap_err().field, "title");
    }

    #[test]
    fn test_location_bounds() {
        assert!(validate_location(&GeoPoint { latitude: 8.48, longitude: -13.23 }).is_ok());
        assert_eq!(
            validate_location(&GeoPoint { latitude: 91.0, longitude: 0.0 }).unwrap_err().field,
            "latitude"
        );
        assert_eq!(
            validate_location(&GeoPoint { latitude: 0.0, longitude: -180.5 }).unwrap_err().field,
            "longitude"
        );
        assert!(validate_location(&GeoPoint { latitude: f64::NAN, longitude: 0.0 }).is_err());
    }

    #[test]
    fn test_evidence_size_limit() {
        let ok = EvidenceImage {
            reference: "complaints/1.jpg".to_string(),
            size_bytes: MAX_EVIDENCE_BYTES,
        };
        assert!(validate_evidence(&ok).is_ok());
        let big = EvidenceImage {
            size_bytes: MAX_EVIDENCE_BYTES + 1,
            ..ok
        };
        assert_eq!(validate_evidence(&big).unwrap_err().field, "evidence_image");
    }

    #[test]
    fn test_citizen_patch_drops_triage() {
        let patch = ComplaintPatch {
            title: Some("t".to_string()),
            status: Some(ComplaintStatus::Resolved),
            priority: Some(Priority::High),
            ..Default::default()
        }
        .without_triage();
        assert!(patch.touches_content());
        assert!(!patch.touches_triage());
    }
}
