use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{BillId, PaymentId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(
    feature = "database",
    derive(sqlx::Type),
    sqlx(type_name = "VARCHAR", rename_all = "SCREAMING_SNAKE_CASE")
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServiceType {
    LocalTax,
    CityRate,
    WasteCollection,
    BusinessLicense,
}

wire_enum!(ServiceType {
    LocalTax => "LOCAL_TAX",
    CityRate => "CITY_RATE",
    WasteCollection => "WASTE_COLLECTION",
    BusinessLicense => "BUSINESS_LICENSE",
});

impl ServiceType {
    /// Human label, e.g. "City Rate"
    pub fn label(&self) -> &'static str {
        match self {
            ServiceType::LocalTax => "Local Tax",
            ServiceType::CityRate => "City Rate",
            ServiceType::WasteCollection => "Waste Collection",
            ServiceType::BusinessLicense => "Business License",
        }
    }

    /// URL segment form, e.g. `city-rate`
    pub fn slug(&self) -> &'static str {
        match self {
            ServiceType::LocalTax => "local-tax",
            ServiceType::CityRate => "city-rate",
            ServiceType::WasteCollection => "waste-collection",
            ServiceType::BusinessLicense => "business-license",
        }
    }

    pub fn from_slug(slug: &str) -> Option<Self> {
        [
            ServiceType::LocalTax,
            ServiceType::CityRate,
            ServiceType::WasteCollection,
            ServiceType::BusinessLicense,
        ]
        .into_iter()
        .find(|s| s.slug() == slug)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(
    feature = "database",
    derive(sqlx::Type),
    sqlx(type_name = "VARCHAR", rename_all = "SCREAMING_SNAKE_CASE")
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BillStatus {
    #[default]
    Pending,
    Partial,
    Paid,
}

wire_enum!(BillStatus {
    Pending => "PENDING",
    Partial => "PARTIAL",
    Paid => "PAID",
});

impl BillStatus {
    pub fn is_open(&self) -> bool {
        !matches!(self, BillStatus::Paid)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(
    feature = "database",
    derive(sqlx::Type),
    sqlx(type_name = "VARCHAR", rename_all = "SCREAMING_SNAKE_CASE")
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    #[default]
    Initiated,
    Paid,
    Failed,
}

wire_enum!(PaymentStatus {
    Initiated => "INITIATED",
    Paid => "PAID",
    Failed => "FAILED",
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "database", derive(sqlx::FromRow))]
pub struct Bill {
    pub id: BillId,
    pub user_id: UserId,
    pub service_type: ServiceType,
    pub amount_due: Decimal,
    pub amount_paid: Decimal,
    /// Derived from the amounts by the ledger; only set directly at creation.
    pub status: BillStatus,
    pub due_date: Option<NaiveDate>,
    pub allow_installments: bool,
    pub max_installments: i32,
    pub installment_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Bill {
    pub fn balance(&self) -> Decimal {
        (self.amount_due - self.amount_paid).max(Decimal::ZERO)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "database", derive(sqlx::FromRow))]
pub struct Payment {
    pub id: PaymentId,
    pub bill_id: BillId,
    pub checkout_session_id: Option<String>,
    pub provider_payment_ref: Option<String>,
    /// Amount in the portal's base currency.
    pub amount: Decimal,
    pub status: PaymentStatus,
    pub paid_at: Option<DateTime<Utc>>,
    pub receipt_ref: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Rendered receipt document attached to a settled payment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptArtifact {
    pub payment_id: PaymentId,
    pub reference: String,
    pub receipt_number: String,
    pub content_type: String,
    #[serde(skip)]
    pub bytes: Vec<u8>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_type_slugs() {
        for service in [
            ServiceType::LocalTax,
            ServiceType::CityRate,
            ServiceType::WasteCollection,
            ServiceType::BusinessLicense,
        ] {
            assert_eq!(ServiceType::from_slug(service.slug()), Some(service));
        }
        assert_eq!(ServiceType::from_slug("parking"), None);
        assert_eq!(ServiceType::CityRate.label(), "City Rate");
    }

    #[test]
    fn test_bill_status_open() {
        assert!(BillStatus::Pending.is_open());
        assert!(BillStatus::Partial.is_open());
        assert!(!BillStatus::Paid.is_open());
    }
}
