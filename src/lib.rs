//! Civic portal core
//!
//! Municipal complaint handling and bill payment for a ward-organised council.
//! Citizens file geo-tagged complaints and pay local taxes and rates; council
//! staff triage complaints in their ward; administrators see everything and
//! manage categories.
//!
//! Components, leaves first:
//!
//! - [`identity`]: actors, roles, registration, password login and sessions
//! - [`complaints`]: complaint lifecycle and per-operation authorization
//! - [`scoping`]: visibility predicates, GeoJSON export, analytics
//! - [`billing`]: bills, installments, currency conversion, checkout
//! - [`reconciliation`]: idempotent verification of provider sessions
//!
//! Collaborators sit behind traits: [`store::PortalStore`] for persistence,
//! [`notifications::NotificationSink`] for outbound mail/SMS,
//! [`receipts::ReceiptGenerator`] for receipt documents and
//! [`provider::PaymentProvider`] for the external payment service.
//!
//! Feature flags:
//! - `database`: Postgres store via sqlx
//! - `server`: axum HTTP surface and the `portal_server` binary

pub mod billing;
pub mod complaints;
pub mod config;
pub mod error;
pub mod identity;
pub mod models;
pub mod notifications;
pub mod portal;
pub mod provider;
pub mod receipts;
pub mod reconciliation;
pub mod scoping;
pub mod store;

#[cfg(feature = "database")]
pub mod database;

#[cfg(feature = "server")]
pub mod api;

pub use config::{AdminSeed, Letterhead, PortalConfig, ProviderConfig};
pub use error::{ErrorKind, PortalError, PortalResult};
pub use identity::Actor;
pub use portal::Portal;
