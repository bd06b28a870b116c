//! GeoJSON export of complaint sets for map rendering.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{ComplaintId, ComplaintStatus, ComplaintView, Priority};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureCollection {
    #[serde(rename = "type")]
    pub kind: String,
    pub features: Vec<Feature>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    #[serde(rename = "type")]
    pub kind: String,
    pub geometry: PointGeometry,
    pub properties: FeatureProperties,
}

/// `coordinates` are `[longitude, latitude]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointGeometry {
    #[serde(rename = "type")]
    pub kind: String,
    pub coordinates: [f64; 2],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureProperties {
    pub complaint_id: ComplaintId,
    pub title: String,
    pub status: ComplaintStatus,
    pub priority: Priority,
    pub created_at: DateTime<Utc>,
    pub category: String,
    pub citizen_name: String,
}

impl From<&ComplaintView> for Feature {
    fn from(view: &ComplaintView) -> Self {
        let c = &view.complaint;
        Feature {
            kind: "Feature".to_string(),
            geometry: PointGeometry {
                kind: "Point".to_string(),
                coordinates: [c.location.longitude, c.location.latitude],
            },
            properties: FeatureProperties {
                complaint_id: c.id,
                title: c.title.clone(),
                status: c.status,
                priority: c.priority,
                created_at: c.created_at,
                category: view.category_name.clone(),
                citizen_name: view.citizen_name.clone(),
            },
        }
    }
}

pub fn to_feature_collection(views: &[ComplaintView]) -> FeatureCollection {
    FeatureCollection {
        kind: "FeatureCollection".to_string(),
        features: views.iter().map(Feature::from).collect(),
    }
}
