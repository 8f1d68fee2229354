mod common;

use common::{active_clinic, bearer, login, seed_clinic, seed_super_admin, setup_test_app};
use core_lib::{TenantRepository, domain::tenant::SubscriptionStatus};
use http::StatusCode;
use serde_json::{Value, json};
use uuid::Uuid;

async fn admin_token(app: &common::TestApp) -> String {
    seed_super_admin(app, "root@platform.com").await;
    login(app, "root@platform.com").await
}

#[tokio::test]
async fn test_admin_routes_require_super_admin() {
    let app = setup_test_app(&[]);
    let (_, clinic_token) = active_clinic(&app, "owner@x.com").await;

    let anonymous = app.server.get("/api/admin/tenants").await;
    assert_eq!(anonymous.status_code(), StatusCode::UNAUTHORIZED);

    let (name, value) = bearer(&clinic_token);
    let clinic = app.server.get("/api/admin/tenants").add_header(name, value).await;
    assert_eq!(clinic.status_code(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_list_tenants_with_owner_and_product_count() {
    let app = setup_test_app(&[]);
    let (tenant, clinic_token) = active_clinic(&app, "owner@x.com").await;
    let (name, value) = bearer(&clinic_token);
    app.server
        .post("/api/products")
        .add_header(name, value)
        .json(&json!({ "name": "Botox", "price": 10 }))
        .await;

    let token = admin_token(&app).await;
    let (name, value) = bearer(&token);
    let response = app.server.get("/api/admin/tenants").add_header(name, value).await;
    assert_eq!(response.status_code(), StatusCode::OK);

    let tenants = response.json::<Value>();
    assert_eq!(tenants.as_array().unwrap().len(), 1);
    assert_eq!(tenants[0]["id"], tenant.id.to_string());
    assert_eq!(tenants[0]["ownerEmail"], "owner@x.com");
    assert_eq!(tenants[0]["productCount"], 1);
}

#[tokio::test]
async fn test_approve_and_reject() {
    let app = setup_test_app(&[]);
    let tenant = seed_clinic(&app, "owner@x.com", SubscriptionStatus::Pending, None).await;
    let token = admin_token(&app).await;
    let (name, value) = bearer(&token);

    let approved = app
        .server
        .post(&format!("/api/admin/tenants/{}/approve", tenant.id))
        .add_header(name.clone(), value.clone())
        .await;
    assert_eq!(approved.status_code(), StatusCode::OK);
    assert_eq!(approved.json::<Value>()["tenant"]["subscriptionStatus"], "ACTIVE");

    let rejected = app
        .server
        .post(&format!("/api/admin/tenants/{}/reject", tenant.id))
        .add_header(name.clone(), value.clone())
        .await;
    assert_eq!(rejected.status_code(), StatusCode::OK);
    let stored = app.store.find_tenant(tenant.id).await.unwrap().unwrap();
    assert_eq!(stored.subscription_status, SubscriptionStatus::Suspended);

    let unknown = app
        .server
        .post(&format!("/api/admin/tenants/{}/approve", Uuid::new_v4()))
        .add_header(name, value)
        .await;
    assert_eq!(unknown.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_platform_stats() {
    let app = setup_test_app(&[("PLAN_PRICE", "100.00")]);
    seed_clinic(&app, "a@x.com", SubscriptionStatus::Active, None).await;
    seed_clinic(&app, "b@x.com", SubscriptionStatus::Active, None).await;
    seed_clinic(&app, "c@x.com", SubscriptionStatus::Pending, None).await;
    let token = admin_token(&app).await;

    let (name, value) = bearer(&token);
    let response = app.server.get("/api/admin/stats").add_header(name, value).await;
    assert_eq!(response.status_code(), StatusCode::OK);

    let stats = response.json::<Value>();
    assert_eq!(stats["totalTenants"], 3);
    assert_eq!(stats["active"], 2);
    assert_eq!(stats["pending"], 1);
    assert_eq!(stats["mrr"], 200.0);
    assert_eq!(stats["pendingTenants"].as_array().unwrap().len(), 1);
}
