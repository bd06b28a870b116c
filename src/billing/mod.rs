//! Billing and installment ledger
//!
//! Each service type has a [`ServicePolicy`]: whether its amount is fixed by
//! the council or supplied per bill, and whether it may be settled in
//! installments. Bills are created lazily on the first checkout for a service
//! and at most one open bill exists per (user, service type).

pub mod currency;
pub mod ledger;
pub mod service;

pub use service::{BillingService, CheckoutOptions, CheckoutSession, PaymentStats};

use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;

use crate::config::PortalConfig;
use crate::models::ServiceType;
use currency::BelowMinimum;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmountKind {
    /// Council-wide constant amount.
    Fixed(Decimal),
    /// Supplied when the bill is first created.
    Variable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServicePolicy {
    pub service: ServiceType,
    pub amount: AmountKind,
    pub allow_installments: bool,
    pub max_installments: i32,
    pub due_date: Option<NaiveDate>,
}

impl ServicePolicy {
    pub fn for_service(service: ServiceType, config: &PortalConfig, today: NaiveDate) -> Self {
        match service {
            ServiceType::LocalTax => Self {
                service,
                amount: AmountKind::Fixed(config.local_tax_amount),
                allow_installments: false,
                max_installments: 1,
                due_date: None,
            },
            ServiceType::CityRate => Self {
                service,
                amount: AmountKind::Variable,
                allow_installments: true,
                max_installments: config.city_rate_max_installments,
                due_date: NaiveDate::from_ymd_opt(today.year(), 9, 30),
            },
            ServiceType::WasteCollection | ServiceType::BusinessLicense => Self {
                service,
                amount: AmountKind::Variable,
                allow_installments: false,
                max_installments: 1,
                due_date: None,
            },
        }
    }

    /// Fixed amounts are raised to the provider floor; caller-chosen amounts are rejected.
    pub fn below_minimum(&self) -> BelowMinimum {
        match self.amount {
            AmountKind::Fixed(_) => BelowMinimum::Raise,
            AmountKind::Variable => BelowMinimum::Reject,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policies() {
        let config = PortalConfig::default();
        let today = NaiveDate::from_ymd_opt(2026, 2, 1).unwrap();

        let local = ServicePolicy::for_service(ServiceType::LocalTax, &config, today);
        assert_eq!(local.amount, AmountKind::Fixed(Decimal::new(10_000, 0)));
        assert!(!local.allow_installments);
        assert_eq!(local.below_minimum(), BelowMinimum::Raise);

        let rate = ServicePolicy::for_service(ServiceType::CityRate, &config, today);
        assert!(rate.allow_installments);
        assert_eq!(rate.max_installments, 3);
        assert_eq!(rate.due_date, NaiveDate::from_ymd_opt(2026, 9, 30));
        assert_eq!(rate.below_minimum(), BelowMinimum::Reject);

        let waste = ServicePolicy::for_service(ServiceType::WasteCollection, &config, today);
        assert_eq!(waste.amount, AmountKind::Variable);
        assert!(!waste.allow_installments);
    }
}
