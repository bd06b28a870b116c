//! Account registration
//!
//! Creating a user and creating its role profile are two explicit steps of
//! one flow, committed together by the store; the caller gets both back, or
//! the error that stopped it and no account at all.

use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::password::{hash_password, validate_password};
use super::validators::{parse_identity_document, require_name, validate_email, validate_phone};
use crate::config::AdminSeed;
use crate::error::{PortalError, PortalResult};
use crate::models::{
    AdminProfile, AdminRole, CitizenProfile, DepartmentId, Gender, Occupation, Profile, Role,
    StaffProfile, StaffRole, User, Ward, WardId,
};
use crate::notifications::{templates, Dispatcher};
use crate::store::{NewUser, PortalStore, ProfileFn, UniqueField};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CitizenRegistration {
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub ward_id: Option<WardId>,
    /// NIN or passport number; the kind is inferred from the format.
    pub identity_number: String,
    #[serde(default, skip_serializing)]
    pub password: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub date_of_birth: Option<NaiveDate>,
    #[serde(default)]
    pub gender: Option<Gender>,
    #[serde(default)]
    pub occupation: Option<Occupation>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", content = "title", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MemberKind {
    Staff(Option<StaffRole>),
    Admin(Option<AdminRole>),
}

/// Council staff or administrator account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberRegistration {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone_number: Option<String>,
    pub ward_id: Option<WardId>,
    pub department_id: Option<DepartmentId>,
    pub kind: MemberKind,
    #[serde(default, skip_serializing)]
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Registration {
    pub user: User,
    pub profile: Profile,
}

pub struct RegistrationService {
    store: Arc<dyn PortalStore>,
    dispatcher: Arc<Dispatcher>,
}

impl RegistrationService {
    pub fn new(store: Arc<dyn PortalStore>, dispatcher: Arc<Dispatcher>) -> Self {
        Self { store, dispatcher }
    }

    pub async fn list_wards(&self) -> PortalResult<Vec<Ward>> {
        Ok(self.store.list_wards().await?)
    }

    pub async fn register_citizen(&self, request: CitizenRegistration) -> PortalResult<Registration> {
        let first_name = require_name("first_name", &request.first_name)?;
        let last_name = require_name("last_name", &request.last_name)?;
        let document = parse_identity_document(&request.identity_number)?;
        let (email, phone_number) = self
            .contact_details(request.email.as_deref(), request.phone_number.as_deref())
            .await?;

        let ward_id = request
            .ward_id
            .ok_or_else(|| PortalError::validation("ward", "Citizens must select a ward"))?;
        self.require_ward(ward_id).await?;

        if self.store.is_taken(UniqueField::Identity(&document)).await? {
            return Err(PortalError::validation(
                "identity_number",
                "An account with this identity number already exists",
            ));
        }

        validate_password(&request.password)?;
        let password_hash = hash_password(&request.password)?;

        let citizen_profile = |user: &User| {
            Profile::Citizen(CitizenProfile {
                user_id: user.id,
                address: request
                    .address
                    .as_deref()
                    .map(str::trim)
                    .filter(|a| !a.is_empty())
                    .map(str::to_string),
                date_of_birth: request.date_of_birth,
                bio: None,
                gender: request.gender,
                occupation: request.occupation,
            })
        };
        let (user, profile) = self
            .create_account(
                NewUser {
                    first_name,
                    last_name,
                    email,
                    phone_number,
                    identity_document: Some(document),
                    role: Role::Citizen,
                    ward_id: Some(ward_id),
                    department_id: None,
                    password_hash: Some(password_hash),
                },
                &citizen_profile,
            )
            .await?;

        info!(user_id = user.id, ward_id, "Registered citizen");
        self.dispatcher.dispatch(templates::welcome(&user)).await;
        Ok(Registration { user, profile })
    }

    pub async fn register_member(&self, request: MemberRegistration) -> PortalResult<Registration> {
        let first_name = require_name("first_name", &request.first_name)?;
        let last_name = require_name("last_name", &request.last_name)?;
        let (email, phone_number) = self
            .contact_details(Some(&request.email), request.phone_number.as_deref())
            .await?;
        if email.is_none() {
            return Err(PortalError::validation("email", "Staff and admin accounts need an email"));
        }

        if let Some(ward_id) = request.ward_id {
            self.require_ward(ward_id).await?;
        }
        if let Some(department_id) = request.department_id {
            if self.store.get_department(department_id).await?.is_none() {
                return Err(PortalError::validation("department", "Unknown department"));
            }
        }

        validate_password(&request.password)?;
        let password_hash = hash_password(&request.password)?;

        let role = match request.kind {
            MemberKind::Staff(_) => Role::Staff,
            MemberKind::Admin(_) => Role::Admin,
        };
        let member_profile = |user: &User| match request.kind {
            MemberKind::Staff(staff_role) => Profile::Staff(StaffProfile {
                user_id: user.id,
                staff_role,
                department_id: request.department_id,
                active: true,
            }),
            MemberKind::Admin(admin_role) => Profile::Admin(AdminProfile {
                user_id: user.id,
                admin_role,
                department_id: request.department_id,
                active: true,
            }),
        };
        let (user, profile) = self
            .create_account(
                NewUser {
                    first_name,
                    last_name,
                    email,
                    phone_number,
                    identity_document: None,
                    role,
                    ward_id: request.ward_id,
                    department_id: request.department_id,
                    password_hash: Some(password_hash),
                },
                &member_profile,
            )
            .await?;

        info!(user_id = user.id, role = %role, "Registered council member");
        self.dispatcher.dispatch(templates::welcome(&user)).await;
        Ok(Registration { user, profile })
    }

    /// Create the first administrator from `seed` when no active admin exists.
    ///
    /// Returns `None` once any admin is present, so running it on every start
    /// is harmless.
    pub async fn bootstrap_admin(&self, seed: &AdminSeed) -> PortalResult<Option<Registration>> {
        if !self.store.list_active_admins().await?.is_empty() {
            debug!("Admin account present, skipping bootstrap");
            return Ok(None);
        }
        let registration = self
            .register_member(MemberRegistration {
                first_name: seed.first_name.clone(),
                last_name: seed.last_name.clone(),
                email: seed.email.clone(),
                phone_number: None,
                ward_id: None,
                department_id: None,
                kind: MemberKind::Admin(Some(AdminRole::SystemSupport)),
                password: seed.password.clone(),
            })
            .await?;
        info!(user_id = registration.user.id, "Bootstrapped first admin");
        Ok(Some(registration))
    }

    async fn create_account(
        &self,
        user: NewUser,
        profile: &ProfileFn<'_>,
    ) -> PortalResult<(User, Profile)> {
        Ok(self.store.create_account(user, profile).await?)
    }

    /// Validate and de-duplicate email/phone; at least one is required.
    async fn contact_details(
        &self,
        email: Option<&str>,
        phone: Option<&str>,
    ) -> PortalResult<(Option<String>, Option<String>)> {
        let email = match email.map(str::trim).filter(|e| !e.is_empty()) {
            Some(raw) => Some(validate_email(raw)?),
            None => None,
        };
        let phone = match phone.map(str::trim).filter(|p| !p.is_empty()) {
            Some(raw) => Some(validate_phone(raw)?),
            None => None,
        };
        if email.is_none() && phone.is_none() {
            return Err(PortalError::validation(
                "email",
                "Provide an email address or a phone number",
            ));
        }

        if let Some(email) = &email {
            if self.store.is_taken(UniqueField::Email(email)).await? {
                return Err(PortalError::validation("email", "This email is already registered"));
            }
        }
        if let Some(phone) = &phone {
            if self.store.is_taken(UniqueField::Phone(phone)).await? {
                return Err(PortalError::validation(
                    "phone_number",
                    "This phone number is already registered",
                ));
            }
        }
        Ok((email, phone))
    }

    async fn require_ward(&self, ward_id: WardId) -> PortalResult<()> {
        match self.store.get_ward(ward_id).await? {
            Some(_) => Ok(()),
            None => Err(PortalError::validation("ward", "Unknown ward")),
        }
    }
}
