#![allow(dead_code)]

use async_trait::async_trait;
use axum::Router;
use axum_test::TestServer;
use chrono::{DateTime, Utc};
use clinic_api::{
    AppState, application::session::SessionKeys, config::AppConfig, create_app,
};
use core_lib::{
    CoreError, PaymentGateway, TenantRepository,
    adapters::{InMemoryCache, InMemoryStore},
    domain::{
        billing::{CheckoutRequest, CheckoutSession, NotificationKind, ProviderEvent},
        tenant::{SubscriptionStatus, Tenant},
        user::{User, hash_password},
    },
};
use http::{HeaderName, HeaderValue, StatusCode};
use serde_json::{Value, json};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};
use uuid::Uuid;

pub const SESSION_SECRET: &str = "test-secret-test-secret-test-secret!";
pub const PASSWORD: &str = "password123";

/// Payment provider double: serves canned events and records checkouts.
#[derive(Default)]
pub struct FakePaymentGateway {
    events: Mutex<HashMap<String, ProviderEvent>>,
    checkouts: Mutex<Vec<CheckoutRequest>>,
    unavailable: Mutex<bool>,
}

impl FakePaymentGateway {
    pub fn put_event(&self, event: ProviderEvent) {
        self.events
            .lock()
            .unwrap()
            .insert(event.resource_id.clone(), event);
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        *self.unavailable.lock().unwrap() = unavailable;
    }

    pub fn checkouts(&self) -> Vec<CheckoutRequest> {
        self.checkouts.lock().unwrap().clone()
    }
}

#[async_trait]
impl PaymentGateway for FakePaymentGateway {
    async fn create_checkout(&self, request: &CheckoutRequest) -> Result<CheckoutSession, CoreError> {
        if *self.unavailable.lock().unwrap() {
            return Err(CoreError::Upstream("provider down".into()));
        }
        self.checkouts.lock().unwrap().push(request.clone());
        Ok(CheckoutSession {
            checkout_url: format!("https://checkout.test/{}", request.tenant_id),
            sandbox_url: None,
            preference_id: "pref-test".into(),
        })
    }

    async fn fetch_event(&self, _kind: NotificationKind, resource_id: &str) -> Result<ProviderEvent, CoreError> {
        if *self.unavailable.lock().unwrap() {
            return Err(CoreError::Upstream("provider down".into()));
        }
        self.events
            .lock()
            .unwrap()
            .get(resource_id)
            .cloned()
            .ok_or_else(|| CoreError::Upstream(format!("unknown resource {}", resource_id)))
    }
}

pub struct TestApp {
    pub server: TestServer,
    pub store: Arc<InMemoryStore>,
    pub payments: Arc<FakePaymentGateway>,
}

/// App over in-memory adapters. `vars` are extra configuration values.
pub fn setup_test_app(vars: &[(&str, &str)]) -> TestApp {
    let mut env: HashMap<String, String> = HashMap::from([(
        "SESSION_SECRET".to_string(),
        SESSION_SECRET.to_string(),
    )]);
    for (key, value) in vars {
        env.insert(key.to_string(), value.to_string());
    }
    let config = AppConfig::from_lookup(|key| env.get(key).cloned()).expect("valid test config");

    let store = Arc::new(InMemoryStore::new());
    let payments = Arc::new(FakePaymentGateway::default());
    let app_state = AppState {
        tenants: store.clone(),
        inventory: store.clone(),
        cache: Arc::new(InMemoryCache::default()),
        payments: payments.clone(),
        sessions: Arc::new(SessionKeys::new(&config.session_secret, config.session_ttl_secs)),
        config: Arc::new(config),
    };

    let app: Router = create_app(app_state);
    TestApp {
        server: TestServer::new(app).expect("Failed to create TestServer"),
        store,
        payments,
    }
}

pub fn bearer(token: &str) -> (HeaderName, HeaderValue) {
    (
        HeaderName::from_static("authorization"),
        HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
    )
}

/// Inserts a clinic and its owner straight into the store.
pub async fn seed_clinic(
    app: &TestApp,
    email: &str,
    status: SubscriptionStatus,
    trial_ends_at: Option<DateTime<Utc>>,
) -> Tenant {
    let now = Utc::now();
    let slug = format!("clinic-{}", Uuid::new_v4().simple());
    let mut tenant = Tenant::signup("Test Clinic", slug, 0, now).unwrap();
    tenant.subscription_status = status;
    tenant.trial_ends_at = trial_ends_at;
    let owner = User::clinic_admin("Owner", email, hash_password(PASSWORD).unwrap(), tenant.id, now).unwrap();
    app.store.create_tenant_with_owner(&tenant, &owner).await.unwrap();
    tenant
}

pub async fn seed_super_admin(app: &TestApp, email: &str) {
    let admin = User::super_admin(email, hash_password(PASSWORD).unwrap(), Utc::now()).unwrap();
    app.store.create_user(&admin).await.unwrap();
}

pub async fn login(app: &TestApp, email: &str) -> String {
    let response = app
        .server
        .post("/api/auth/login")
        .json(&json!({ "email": email, "password": PASSWORD }))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK, "login failed for {}", email);
    response.json::<Value>()["token"]
        .as_str()
        .expect("token in login response")
        .to_string()
}

/// An ACTIVE clinic and a session token for its owner.
pub async fn active_clinic(app: &TestApp, email: &str) -> (Tenant, String) {
    let tenant = seed_clinic(app, email, SubscriptionStatus::Active, None).await;
    let token = login(app, email).await;
    (tenant, token)
}
