//! Complaint analytics and map export
//!
//! Read-side only. Counts are grouped by the owning citizen's ward, by
//! category, or by UTC creation day, always over the scoped and filtered
//! complaint set.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::geo::{to_feature_collection, FeatureCollection};
use super::{ComplaintFilter, ComplaintQuery};
use crate::error::PortalResult;
use crate::identity::Actor;
use crate::models::{ComplaintView, Role};
use crate::store::PortalStore;

/// Label for complaints whose owner has no ward.
pub const UNASSIGNED_WARD: &str = "Unassigned";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dimension {
    Ward,
    Category,
    Day,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountBucket {
    pub key: String,
    pub total: i64,
}

impl Dimension {
    /// Grouping key of one joined complaint row.
    pub fn key_of(&self, view: &ComplaintView, ward_name: Option<&str>) -> String {
        match self {
            Dimension::Ward => ward_name.unwrap_or(UNASSIGNED_WARD).to_string(),
            Dimension::Category => view.category_name.clone(),
            Dimension::Day => view.complaint.created_at.date_naive().to_string(),
        }
    }

    /// Ward and category: busiest first, ties by name. Day: chronological.
    pub fn order(&self, buckets: &mut [CountBucket]) {
        match self {
            Dimension::Ward | Dimension::Category => {
                buckets.sort_by(|a, b| b.total.cmp(&a.total).then_with(|| a.key.cmp(&b.key)))
            }
            Dimension::Day => buckets.sort_by(|a, b| a.key.cmp(&b.key)),
        }
    }
}

/// Tally keys into ordered buckets.
pub fn tally<I>(dimension: Dimension, keys: I) -> Vec<CountBucket>
where
    I: IntoIterator<Item = String>,
{
    let mut counts: BTreeMap<String, i64> = BTreeMap::new();
    for key in keys {
        *counts.entry(key).or_default() += 1;
    }
    let mut buckets: Vec<CountBucket> = counts
        .into_iter()
        .map(|(key, total)| CountBucket { key, total })
        .collect();
    dimension.order(&mut buckets);
    buckets
}

pub struct AnalyticsService {
    store: Arc<dyn PortalStore>,
}

impl AnalyticsService {
    pub fn new(store: Arc<dyn PortalStore>) -> Self {
        Self { store }
    }

    /// Admin-only complaint counts along one dimension.
    pub async fn complaint_counts(
        &self,
        actor: &Actor,
        filter: ComplaintFilter,
        dimension: Dimension,
    ) -> PortalResult<Vec<CountBucket>> {
        actor.require_role(&[Role::Admin])?;
        let query = ComplaintQuery::for_actor(actor, filter);
        let buckets = self.store.count_complaints(&query, dimension).await?;
        debug!(?dimension, buckets = buckets.len(), "Computed complaint counts");
        Ok(buckets)
    }

    /// GeoJSON of every complaint the staff member or admin can see.
    pub async fn complaint_map(
        &self,
        actor: &Actor,
        filter: ComplaintFilter,
    ) -> PortalResult<FeatureCollection> {
        actor.require_role(&[Role::Staff, Role::Admin])?;
        let query = ComplaintQuery::for_actor(actor, filter);
        let views = self.store.query_all_complaints(&query).await?;
        Ok(to_feature_collection(&views))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tally_orders_by_dimension() {
        let wards = tally(
            Dimension::Ward,
            ["East I", "Central", "East I", "West II", "Central", "East I"]
                .into_iter()
                .map(String::from),
        );
        assert_eq!(
            wards,
            vec![
                CountBucket { key: "East I".into(), total: 3 },
                CountBucket { key: "Central".into(), total: 2 },
                CountBucket { key: "West II".into(), total: 1 },
            ]
        );

        let days = tally(
            Dimension::Day,
            ["2025-03-02", "2025-03-01", "2025-03-02"].into_iter().map(String::from),
        );
        assert_eq!(days[0].key, "2025-03-01");
        assert_eq!(days[1].total, 2);
    }
}
