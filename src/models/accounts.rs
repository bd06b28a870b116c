use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::{DepartmentId, UserId, WardId};

/// Portal role, immutable per user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(
    feature = "database",
    derive(sqlx::Type),
    sqlx(type_name = "VARCHAR", rename_all = "SCREAMING_SNAKE_CASE")
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Citizen,
    Staff,
    Admin,
}

wire_enum!(Role {
    Citizen => "CITIZEN",
    Staff => "STAFF",
    Admin => "ADMIN",
});

impl Role {
    /// Label used in notification bodies ("Updated by: ...")
    pub fn actor_label(&self) -> &'static str {
        match self {
            Role::Citizen => "CITIZEN",
            Role::Staff => "COUNCIL STAFF",
            Role::Admin => "ADMIN",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "database", derive(sqlx::FromRow))]
pub struct Ward {
    pub id: WardId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "database", derive(sqlx::FromRow))]
pub struct Department {
    pub id: DepartmentId,
    pub name: String,
    pub description: Option<String>,
}

/// Validated national identity document
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "number", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IdentityDocument {
    /// National identification number, e.g. `00F7STR2`
    Nin(String),
    /// Passport number, e.g. `SLR124311`
    Passport(String),
}

impl IdentityDocument {
    pub fn number(&self) -> &str {
        match self {
            IdentityDocument::Nin(n) | IdentityDocument::Passport(n) => n,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub identity_document: Option<IdentityDocument>,
    pub role: Role,
    pub ward_id: Option<WardId>,
    pub department_id: Option<DepartmentId>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Gender {
    Male,
    Female,
}

wire_enum!(Gender {
    Male => "MALE",
    Female => "FEMALE",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Occupation {
    Employed,
    Unemployed,
    Student,
}

wire_enum!(Occupation {
    Employed => "EMPLOYED",
    Unemployed => "UNEMPLOYED",
    Student => "STUDENT",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StaffRole {
    FieldOfficer,
    Councilor,
}

wire_enum!(StaffRole {
    FieldOfficer => "FIELD_OFFICER",
    Councilor => "COUNCILOR",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AdminRole {
    DepartmentHead,
    SystemSupport,
}

wire_enum!(AdminRole {
    DepartmentHead => "DEPARTMENT_HEAD",
    SystemSupport => "SYSTEM_SUPPORT",
});

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CitizenProfile {
    pub user_id: UserId,
    pub address: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub bio: Option<String>,
    pub gender: Option<Gender>,
    pub occupation: Option<Occupation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaffProfile {
    pub user_id: UserId,
    pub staff_role: Option<StaffRole>,
    pub department_id: Option<DepartmentId>,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdminProfile {
    pub user_id: UserId,
    pub admin_role: Option<AdminRole>,
    pub department_id: Option<DepartmentId>,
    pub active: bool,
}

/// Role-specific profile created right after the user row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Profile {
    Citizen(CitizenProfile),
    Staff(StaffProfile),
    Admin(AdminProfile),
}

impl Profile {
    pub fn user_id(&self) -> UserId {
        match self {
            Profile::Citizen(p) => p.user_id,
            Profile::Staff(p) => p.user_id,
            Profile::Admin(p) => p.user_id,
        }
    }

    pub fn role(&self) -> Role {
        match self {
            Profile::Citizen(_) => Role::Citizen,
            Profile::Staff(_) => Role::Staff,
            Profile::Admin(_) => Role::Admin,
        }
    }
}
