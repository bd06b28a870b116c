//! Portal configuration.
//!
//! Settings that the services need are carried in explicit structs and passed
//! in at construction; nothing reads the environment after startup.

use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;

use crate::error::{PortalResult, ValidationError};

/// Fields printed on every receipt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Letterhead {
    pub council_name: String,
    pub processed_by: String,
    pub designation: String,
    /// Prefix of the receipt number, e.g. `FCC` in `FCC 000011`.
    pub receipt_prefix: String,
    pub footer: String,
}

impl Default for Letterhead {
    fn default() -> Self {
        Self {
            council_name: "FREETOWN CITY COUNCIL".to_string(),
            processed_by: "CCRSMS Online Payment".to_string(),
            designation: "F.C.C".to_string(),
            receipt_prefix: "FCC".to_string(),
            footer: "System-generated receipt (CCRSMS)".to_string(),
        }
    }
}

/// Configuration shared by the complaint, billing and reconciliation services.
#[derive(Debug, Clone, PartialEq)]
pub struct PortalConfig {
    /// Base currency label used in receipts and messages.
    pub currency_label: String,

    /// Base-currency units per provider-currency unit.
    pub exchange_rate: Decimal,

    /// ISO currency code sent to the payment provider.
    pub provider_currency: String,

    /// Smallest amount the provider accepts, in provider currency.
    pub provider_minimum: Decimal,

    /// Fixed amount of a local tax bill, in base currency.
    pub local_tax_amount: Decimal,

    pub city_rate_max_installments: i32,

    pub letterhead: Letterhead,

    /// From-address for outbound email.
    pub notification_sender: String,

    pub checkout_success_url: String,
    pub checkout_cancel_url: String,

    /// Lifetime of issued session tokens.
    pub session_ttl: Duration,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            currency_label: "LE".to_string(),
            exchange_rate: Decimal::new(25_000, 0),
            provider_currency: "usd".to_string(),
            provider_minimum: Decimal::new(50, 2),
            local_tax_amount: Decimal::new(10_000, 0),
            city_rate_max_installments: 3,
            letterhead: Letterhead::default(),
            notification_sender: "no-reply@ccrsms.local".to_string(),
            checkout_success_url: "http://localhost:5173/payments/success?session_id={CHECKOUT_SESSION_ID}"
                .to_string(),
            checkout_cancel_url: "http://localhost:5173/payments/cancel".to_string(),
            session_ttl: Duration::from_secs(10 * 60 * 60),
        }
    }
}

impl PortalConfig {
    /// Read `PORTAL_*` variables from the process environment.
    pub fn from_env() -> PortalResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> PortalResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let letterhead = Letterhead {
            council_name: lookup("PORTAL_COUNCIL_NAME").unwrap_or(defaults.letterhead.council_name),
            processed_by: lookup("PORTAL_RECEIPT_PROCESSED_BY")
                .unwrap_or(defaults.letterhead.processed_by),
            designation: lookup("PORTAL_RECEIPT_DESIGNATION")
                .unwrap_or(defaults.letterhead.designation),
            receipt_prefix: lookup("PORTAL_RECEIPT_PREFIX")
                .unwrap_or(defaults.letterhead.receipt_prefix),
            footer: lookup("PORTAL_RECEIPT_FOOTER").unwrap_or(defaults.letterhead.footer),
        };

        let config = Self {
            currency_label: lookup("PORTAL_CURRENCY_LABEL").unwrap_or(defaults.currency_label),
            exchange_rate: parse_or(&lookup, "PORTAL_EXCHANGE_RATE", defaults.exchange_rate)?,
            provider_currency: lookup("PORTAL_PROVIDER_CURRENCY")
                .map(|c| c.to_ascii_lowercase())
                .unwrap_or(defaults.provider_currency),
            provider_minimum: parse_or(&lookup, "PORTAL_PROVIDER_MINIMUM", defaults.provider_minimum)?,
            local_tax_amount: parse_or(&lookup, "PORTAL_LOCAL_TAX_AMOUNT", defaults.local_tax_amount)?,
            city_rate_max_installments: parse_or(
                &lookup,
                "PORTAL_CITY_RATE_MAX_INSTALLMENTS",
                defaults.city_rate_max_installments,
            )?,
            letterhead,
            notification_sender: lookup("PORTAL_NOTIFICATION_SENDER")
                .unwrap_or(defaults.notification_sender),
            checkout_success_url: lookup("PORTAL_CHECKOUT_SUCCESS_URL")
                .unwrap_or(defaults.checkout_success_url),
            checkout_cancel_url: lookup("PORTAL_CHECKOUT_CANCEL_URL")
                .unwrap_or(defaults.checkout_cancel_url),
            session_ttl: Duration::from_secs(parse_or(
                &lookup,
                "PORTAL_SESSION_TTL_SECS",
                defaults.session_ttl.as_secs(),
            )?),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> PortalResult<()> {
        if self.exchange_rate <= Decimal::ZERO {
            return Err(ValidationError::new("exchange_rate", "must be greater than 0").into());
        }
        if self.provider_minimum < Decimal::ZERO {
            return Err(ValidationError::new("provider_minimum", "must not be negative").into());
        }
        if self.local_tax_amount <= Decimal::ZERO {
            return Err(ValidationError::new("local_tax_amount", "must be greater than 0").into());
        }
        if self.city_rate_max_installments < 1 {
            return Err(
                ValidationError::new("city_rate_max_installments", "must be at least 1").into(),
            );
        }
        Ok(())
    }

    /// Set the exchange rate.
    pub fn exchange_rate(mut self, rate: Decimal) -> Self {
        self.exchange_rate = rate;
        self
    }

    /// Set the provider minimum.
    pub fn provider_minimum(mut self, minimum: Decimal) -> Self {
        self.provider_minimum = minimum;
        self
    }
}

/// First administrator, created at startup when the directory has none
#[derive(Clone)]
pub struct AdminSeed {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
}

impl std::fmt::Debug for AdminSeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminSeed")
            .field("email", &self.email)
            .field("password", &"***")
            .finish()
    }
}

impl AdminSeed {
    /// `PORTAL_ADMIN_EMAIL` and `PORTAL_ADMIN_PASSWORD`; `None` unless both are set.
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Option<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        Some(Self {
            email: non_empty("PORTAL_ADMIN_EMAIL")?,
            password: non_empty("PORTAL_ADMIN_PASSWORD")?,
            first_name: non_empty("PORTAL_ADMIN_FIRST_NAME").unwrap_or_else(|| "System".to_string()),
            last_name: non_empty("PORTAL_ADMIN_LAST_NAME")
                .unwrap_or_else(|| "Administrator".to_string()),
        })
    }
}

/// Payment provider connection settings.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub api_base: String,
    pub secret_key: String,
    pub request_timeout: Duration,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.stripe.com".to_string(),
            secret_key: String::new(),
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl ProviderConfig {
    pub fn from_env() -> PortalResult<Self> {
        let lookup = |key: &str| std::env::var(key).ok();
        let defaults = Self::default();
        Ok(Self {
            api_base: lookup("PROVIDER_API_BASE").unwrap_or(defaults.api_base),
            secret_key: lookup("PROVIDER_SECRET_KEY").unwrap_or_default(),
            request_timeout: Duration::from_secs(parse_or(
                &lookup,
                "PROVIDER_TIMEOUT_SECS",
                defaults.request_timeout.as_secs(),
            )?),
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> PortalResult<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| {
            ValidationError::new(key, format!("cannot parse '{}'", raw.trim())).into()
        }),
    }
}
