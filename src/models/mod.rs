//! Domain models shared by every portal component
//!
//! Plain data: accounts (users, wards, departments, profiles), complaints,
//! and the billing ledger (bills, payments, receipts). Behaviour lives in the
//! component modules; these types only carry state and small derivations.

/// Implements `Display`/`FromStr` over the SCREAMING_SNAKE_CASE wire names.
macro_rules! wire_enum {
    ($ty:ident { $($variant:ident => $name:literal),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($ty::$variant => $name,)+
                }
            }
        }

        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $ty {
            type Err = crate::error::ValidationError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_uppercase().as_str() {
                    $($name => Ok($ty::$variant),)+
                    other => Err(crate::error::ValidationError::new(
                        stringify!($ty),
                        format!("unknown value '{}'", other),
                    )),
                }
            }
        }
    };
}

pub mod accounts;
pub mod billing;
pub mod complaints;

pub use accounts::{
    AdminProfile, AdminRole, CitizenProfile, Department, Gender, IdentityDocument, Occupation,
    Profile, Role, StaffProfile, StaffRole, User, Ward,
};
pub use billing::{Bill, BillStatus, Payment, PaymentStatus, ReceiptArtifact, ServiceType};
pub use complaints::{
    Complaint, ComplaintCategory, ComplaintStatus, ComplaintView, EvidenceImage, GeoPoint,
    Priority,
};

pub type UserId = i64;
pub type WardId = i64;
pub type DepartmentId = i64;
pub type CategoryId = i64;
pub type ComplaintId = i64;
pub type BillId = i64;
pub type PaymentId = i64;
