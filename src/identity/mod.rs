//! Identity and role model
//!
//! Resolves an opaque session token to an [`Actor`]: the user id, role, and
//! the ward/department affiliation every scoping decision is made from.
//! Registration lives in [`registration`], document and phone checks in
//! [`validators`], password hashing in [`password`].

pub mod password;
pub mod registration;
pub mod validators;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{AuthorizationError, PortalError, PortalResult};
use crate::models::{DepartmentId, Role, User, UserId, WardId};
use crate::store::{LoginIdentifier, PortalStore};
use password::verify_password;
use validators::normalize_login_phone;

pub use registration::{
    CitizenRegistration, MemberKind, MemberRegistration, Registration, RegistrationService,
};

const TOKEN_LENGTH: usize = 48;

/// The authenticated caller of an operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: UserId,
    pub role: Role,
    pub ward_id: Option<WardId>,
    pub department_id: Option<DepartmentId>,
    pub display_name: String,
}

impl Actor {
    pub fn from_user(user: &User) -> Self {
        Self {
            user_id: user.id,
            role: user.role,
            ward_id: user.ward_id,
            department_id: user.department_id,
            display_name: user.display_name(),
        }
    }

    /// Fails with `RoleMismatch` unless the actor holds one of `allowed`.
    pub fn require_role(&self, allowed: &[Role]) -> PortalResult<()> {
        if allowed.contains(&self.role) {
            return Ok(());
        }
        let required = allowed
            .iter()
            .map(Role::as_str)
            .collect::<Vec<_>>()
            .join(" or ");
        Err(AuthorizationError::RoleMismatch {
            required,
            actual: self.role,
        }
        .into())
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn is_staff(&self) -> bool {
        self.role == Role::Staff
    }

    pub fn is_citizen(&self) -> bool {
        self.role == Role::Citizen
    }
}

/// Issued login session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    pub user_id: UserId,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Resolves a session or token to the acting user
#[async_trait]
pub trait SessionResolver: Send + Sync {
    async fn resolve(&self, token: &str) -> PortalResult<Actor>;
}

/// Store-backed sessions with random opaque tokens
pub struct SessionService {
    store: Arc<dyn PortalStore>,
    default_ttl: Duration,
}

impl SessionService {
    pub fn new(store: Arc<dyn PortalStore>, default_ttl: Duration) -> Self {
        Self { store, default_ttl }
    }

    /// Issue a token for an active user. `ttl` falls back to the configured default.
    pub async fn issue_session(&self, user_id: UserId, ttl: Option<Duration>) -> PortalResult<Session> {
        let user = self
            .store
            .get_user(user_id)
            .await?
            .ok_or_else(|| PortalError::not_found("user", user_id))?;
        if !user.is_active {
            return Err(AuthorizationError::NotPermitted {
                operation: "sign in".to_string(),
                reason: "account is inactive".to_string(),
            }
            .into());
        }

        let ttl = chrono::Duration::from_std(ttl.unwrap_or(self.default_ttl))
            .map_err(|e| PortalError::validation("ttl", e.to_string()))?;
        let now = Utc::now();
        self.store.purge_expired_sessions(now).await?;
        let session = Session {
            token: generate_token(),
            user_id,
            created_at: now,
            expires_at: now + ttl,
        };
        self.store.insert_session(&session).await?;
        info!(user_id, role = %user.role, "Issued session");
        Ok(session)
    }

    /// Sign in with an email address or phone number and a password.
    ///
    /// Unknown, inactive and password-less accounts fail exactly like a
    /// wrong password, with `Unauthenticated`.
    pub async fn login(&self, identifier: &str, password: &str) -> PortalResult<(User, Session)> {
        let identifier = identifier.trim();
        if identifier.is_empty() || password.is_empty() {
            return Err(AuthorizationError::Unauthenticated.into());
        }

        let phone;
        let lookup = if identifier.contains('@') {
            LoginIdentifier::Email(identifier)
        } else {
            phone = normalize_login_phone(identifier);
            LoginIdentifier::Phone(&phone)
        };

        let user = match self.store.find_credentials(lookup).await? {
            Some((user, Some(hash))) if user.is_active => {
                if !verify_password(password, &hash)? {
                    warn!(user_id = user.id, "Login with wrong password");
                    return Err(AuthorizationError::Unauthenticated.into());
                }
                user
            }
            Some((user, _)) => {
                warn!(user_id = user.id, active = user.is_active, "Login refused");
                return Err(AuthorizationError::Unauthenticated.into());
            }
            None => {
                debug!("Login for unknown account");
                return Err(AuthorizationError::Unauthenticated.into());
            }
        };

        let session = self.issue_session(user.id, None).await?;
        Ok((user, session))
    }

    pub async fn revoke(&self, token: &str) -> PortalResult<()> {
        self.store.delete_session(token).await?;
        Ok(())
    }
}

#[async_trait]
impl SessionResolver for SessionService {
    async fn resolve(&self, token: &str) -> PortalResult<Actor> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AuthorizationError::Unauthenticated.into());
        }

        let Some(session) = self.store.load_session(token).await? else {
            debug!("Unknown session token");
            return Err(AuthorizationError::Unauthenticated.into());
        };
        if session.is_expired(Utc::now()) {
            debug!(user_id = session.user_id, "Expired session token");
            self.store.delete_session(token).await?;
            return Err(AuthorizationError::Unauthenticated.into());
        }

        match self.store.get_user(session.user_id).await? {
            Some(user) if user.is_active => Ok(Actor::from_user(&user)),
            _ => Err(AuthorizationError::Unauthenticated.into()),
        }
    }
}

fn generate_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LENGTH)
        .map(char::from)
        .collect()
}
