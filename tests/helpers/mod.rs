//! Shared fixtures: a portal over the in-memory store, a recording sink and a
//! scriptable payment provider.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use civic_portal::complaints::ComplaintSubmission;
use civic_portal::identity::{CitizenRegistration, MemberKind, MemberRegistration};
use civic_portal::models::{ComplaintCategory, ComplaintView, GeoPoint, User, Ward};
use civic_portal::notifications::memory::MemorySink;
use civic_portal::provider::{
    CheckoutIntent, CheckoutRequest, PaymentProvider, ProviderError, SessionStatus,
};
use civic_portal::store::{MemoryStore, NewCategory, PortalStore};
use civic_portal::{Actor, Portal, PortalConfig};

// =============================================================================
// FAKE PROVIDER
// =============================================================================

/// Payment provider whose answers are set by the test.
#[derive(Default)]
pub struct FakeProvider {
    next_session: AtomicUsize,
    paid: Mutex<HashMap<String, bool>>,
    requests: Mutex<Vec<CheckoutRequest>>,
    status_calls: AtomicUsize,
    reject_checkout: AtomicBool,
    status_times_out: AtomicBool,
}

impl FakeProvider {
    pub fn mark_paid(&self, session_id: &str) {
        self.paid
            .lock()
            .unwrap()
            .insert(session_id.to_string(), true);
    }

    pub fn reject_checkouts(&self, reject: bool) {
        self.reject_checkout.store(reject, Ordering::SeqCst);
    }

    pub fn time_out_status(&self, timeout: bool) {
        self.status_times_out.store(timeout, Ordering::SeqCst);
    }

    pub fn requests(&self) -> Vec<CheckoutRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentProvider for FakeProvider {
    async fn create_checkout_intent(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutIntent, ProviderError> {
        if self.reject_checkout.load(Ordering::SeqCst) {
            return Err(ProviderError::Rejected("card_declined".to_string()));
        }
        self.requests.lock().unwrap().push(request.clone());
        let n = self.next_session.fetch_add(1, Ordering::SeqCst) + 1;
        let session_id = format!("cs_test_{:04}", n);
        Ok(CheckoutIntent {
            redirect_url: format!("https://pay.example.test/{}", session_id),
            session_id,
        })
    }

    async fn session_status(&self, session_id: &str) -> Result<SessionStatus, ProviderError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        if self.status_times_out.load(Ordering::SeqCst) {
            return Err(ProviderError::Timeout);
        }
        let paid = self
            .paid
            .lock()
            .unwrap()
            .get(session_id)
            .copied()
            .unwrap_or(false);
        Ok(if paid {
            SessionStatus::Paid {
                provider_payment_ref: Some(format!("pi_{}", session_id)),
            }
        } else {
            SessionStatus::NotPaid {
                provider_status: "unpaid".to_string(),
            }
        })
    }
}

// =============================================================================
// PORTAL FIXTURE
// =============================================================================

/// Password every fixture account is registered with.
pub const PASSWORD: &str = "lumley-beach-22";

pub struct TestPortal {
    pub portal: Arc<Portal>,
    pub store: Arc<MemoryStore>,
    pub sink: Arc<MemorySink>,
    pub provider: Arc<FakeProvider>,
    pub ward_a: Ward,
    pub ward_b: Ward,
    pub waste: ComplaintCategory,
    pub roads: ComplaintCategory,
    next_person: AtomicUsize,
}

impl TestPortal {
    /// Two wards and two categories, no users.
    pub async fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let sink = Arc::new(MemorySink::new());
        let provider = Arc::new(FakeProvider::default());

        let ward_a = store.insert_ward("Ward A").await.unwrap();
        let ward_b = store.insert_ward("Ward B").await.unwrap();
        let waste = store
            .insert_category(NewCategory {
                name: "Waste".to_string(),
                description: "Uncollected refuse".to_string(),
                department_id: None,
            })
            .await
            .unwrap();
        let roads = store
            .insert_category(NewCategory {
                name: "Roads".to_string(),
                description: "Potholes and drainage".to_string(),
                department_id: None,
            })
            .await
            .unwrap();

        let portal = Portal::new(
            store.clone(),
            provider.clone(),
            sink.clone(),
            PortalConfig::default(),
        )
        .unwrap();

        Self {
            portal: Arc::new(portal),
            store,
            sink,
            provider,
            ward_a,
            ward_b,
            waste,
            roads,
            next_person: AtomicUsize::new(1),
        }
    }

    fn next_person(&self) -> usize {
        self.next_person.fetch_add(1, Ordering::SeqCst)
    }

    pub async fn citizen(&self, ward: &Ward) -> (User, Actor) {
        let n = self.next_person();
        let registration = self
            .portal
            .registration
            .register_citizen(CitizenRegistration {
                first_name: format!("Citizen{}", n),
                last_name: "Test".to_string(),
                email: Some(format!("citizen{}@example.com", n)),
                phone_number: Some(format!("+232{:08}", n)),
                ward_id: Some(ward.id),
                identity_number: format!("{:02}F7STR{}", n % 100, n % 10),
                address: Some(format!("{} Siaka Stevens Street", n)),
                password: PASSWORD.to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        let actor = Actor::from_user(&registration.user);
        (registration.user, actor)
    }

    pub async fn staff(&self, ward: &Ward) -> (User, Actor) {
        self.member(Some(ward), MemberKind::Staff(None)).await
    }

    pub async fn admin(&self) -> (User, Actor) {
        self.member(None, MemberKind::Admin(None)).await
    }

    async fn member(&self, ward: Option<&Ward>, kind: MemberKind) -> (User, Actor) {
        let n = self.next_person();
        let registration = self
            .portal
            .registration
            .register_member(MemberRegistration {
                first_name: format!("Member{}", n),
                last_name: "Council".to_string(),
                email: format!("member{}@council.example.com", n),
                phone_number: None,
                ward_id: ward.map(|w| w.id),
                department_id: None,
                kind,
                password: PASSWORD.to_string(),
            })
            .await
            .unwrap();
        let actor = Actor::from_user(&registration.user);
        (registration.user, actor)
    }

    /// A valid complaint in `category` at Freetown city centre.
    pub fn submission(&self, category: &ComplaintCategory, title: &str) -> ComplaintSubmission {
        ComplaintSubmission {
            category_id: category.id,
            title: title.to_string(),
            description: "Refuse has not been collected for two weeks.".to_string(),
            evidence: None,
            location: GeoPoint {
                latitude: 8.48,
                longitude: -13.23,
            },
            street_name: Some("Kissy Road".to_string()),
            district: None,
        }
    }

    pub async fn file_complaint(&self, citizen: &Actor, title: &str) -> ComplaintView {
        self.portal
            .complaints
            .create_complaint(citizen, self.submission(&self.waste, title))
            .await
            .unwrap()
    }
}
