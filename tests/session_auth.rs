//! Password login and session resolution.

mod helpers;

use chrono::{Duration, Utc};

use civic_portal::identity::{CitizenRegistration, Session, SessionResolver};
use civic_portal::models::Role;
use civic_portal::store::PortalStore;
use civic_portal::{AdminSeed, ErrorKind};
use helpers::{TestPortal, PASSWORD};

fn stale_session(token: &str, user_id: i64) -> Session {
    let now = Utc::now();
    Session {
        token: token.to_string(),
        user_id,
        created_at: now - Duration::hours(11),
        expires_at: now - Duration::hours(1),
    }
}

#[tokio::test]
async fn login_accepts_email_or_phone() {
    let t = TestPortal::new().await;
    let (citizen, _) = t.citizen(&t.ward_a).await;

    let email = citizen.email.as_deref().unwrap().to_uppercase();
    let (user, session) = t.portal.sessions.login(&email, PASSWORD).await.unwrap();
    assert_eq!(user.id, citizen.id);
    let actor = t.portal.sessions.resolve(&session.token).await.unwrap();
    assert_eq!(actor.user_id, citizen.id);
    assert_eq!(actor.role, Role::Citizen);

    let phone = citizen.phone_number.as_deref().unwrap();
    let (user, _) = t.portal.sessions.login(phone, PASSWORD).await.unwrap();
    assert_eq!(user.id, citizen.id);
}

#[tokio::test]
async fn wrong_password_and_unknown_account_look_the_same() {
    let t = TestPortal::new().await;
    let (citizen, _) = t.citizen(&t.ward_a).await;
    let email = citizen.email.as_deref().unwrap();

    let wrong = t.portal.sessions.login(email, "not-the-password").await.unwrap_err();
    let unknown = t
        .portal
        .sessions
        .login("ghost@example.com", PASSWORD)
        .await
        .unwrap_err();
    assert_eq!(wrong.kind(), ErrorKind::Unauthenticated);
    assert_eq!(unknown.kind(), ErrorKind::Unauthenticated);
    assert_eq!(wrong.to_string(), unknown.to_string());
}

#[tokio::test]
async fn expired_token_is_rejected_and_forgotten() {
    let t = TestPortal::new().await;
    let (citizen, _) = t.citizen(&t.ward_a).await;
    t.store
        .insert_session(&stale_session("expired-token", citizen.id))
        .await
        .unwrap();

    let err = t.portal.sessions.resolve("expired-token").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unauthenticated);
    assert!(t.store.load_session("expired-token").await.unwrap().is_none());
}

#[tokio::test]
async fn issuing_a_session_sweeps_expired_ones() {
    let t = TestPortal::new().await;
    let (citizen, _) = t.citizen(&t.ward_a).await;
    let (other, _) = t.citizen(&t.ward_b).await;
    t.store
        .insert_session(&stale_session("abandoned", other.id))
        .await
        .unwrap();

    let fresh = t.portal.sessions.issue_session(citizen.id, None).await.unwrap();
    assert!(t.store.load_session("abandoned").await.unwrap().is_none());
    assert!(t.store.load_session(&fresh.token).await.unwrap().is_some());
}

#[tokio::test]
async fn deactivated_user_loses_access() {
    let t = TestPortal::new().await;
    let (staff, _) = t.staff(&t.ward_a).await;
    let session = t.portal.sessions.issue_session(staff.id, None).await.unwrap();
    assert!(t.portal.sessions.resolve(&session.token).await.is_ok());

    t.store.set_user_active(staff.id, false).await.unwrap();

    let err = t.portal.sessions.resolve(&session.token).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unauthenticated);

    let err = t
        .portal
        .sessions
        .login(staff.email.as_deref().unwrap(), PASSWORD)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unauthenticated);
}

#[tokio::test]
async fn registration_requires_a_usable_password() {
    let t = TestPortal::new().await;
    let request = CitizenRegistration {
        first_name: "Aminata".to_string(),
        last_name: "Kamara".to_string(),
        email: Some("aminata@example.com".to_string()),
        ward_id: Some(t.ward_a.id),
        identity_number: "12A3BCD4".to_string(),
        password: "1234567".to_string(),
        ..Default::default()
    };

    let err = t
        .portal
        .registration
        .register_citizen(request.clone())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(err.to_string().contains("password"));

    // Nothing was kept, so the same identity can register once fixed.
    let registration = t
        .portal
        .registration
        .register_citizen(CitizenRegistration {
            password: "aberdeen-bay".to_string(),
            ..request
        })
        .await
        .unwrap();
    let (user, _) = t
        .portal
        .sessions
        .login("aminata@example.com", "aberdeen-bay")
        .await
        .unwrap();
    assert_eq!(user.id, registration.user.id);
}

#[tokio::test]
async fn admin_bootstrap_runs_once() {
    let t = TestPortal::new().await;
    let seed = AdminSeed {
        email: "root@council.example.com".to_string(),
        password: "first-admin-pass".to_string(),
        first_name: "System".to_string(),
        last_name: "Administrator".to_string(),
    };

    let first = t.portal.registration.bootstrap_admin(&seed).await.unwrap();
    assert_eq!(first.map(|r| r.user.role), Some(Role::Admin));
    assert!(t.portal.registration.bootstrap_admin(&seed).await.unwrap().is_none());
    assert_eq!(t.store.list_active_admins().await.unwrap().len(), 1);
}
