use axum::{
    Router,
    middleware,
    routing::{get, post, put},
};
use core_lib::{Cache, InventoryRepository, PaymentGateway, TenantRepository};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub mod application;
pub mod config;

use application::{
    authz::require_super_admin,
    batches::{handle_create_batch, handle_delete_batch, handle_list_batches, handle_update_batch},
    commands::{
        change_tenant_status::{handle_approve_tenant, handle_reject_tenant},
        create_checkout::handle_create_checkout,
        login::{handle_login_request, handle_logout_request},
        register_clinic::handle_register_request,
    },
    middleware::{session_auth, subscription_gate},
    products::{
        handle_create_product, handle_delete_product, handle_get_product, handle_list_products,
        handle_update_product,
    },
    query::{handle_dashboard_stats, handle_get_session, handle_list_tenants, handle_platform_stats},
    session::SessionKeys,
    webhooks::{handle_webhook, handle_webhook_status},
};
use config::AppConfig;

// Holds shared dependencies
#[derive(Clone)]
pub struct AppState {
    pub tenants: Arc<dyn TenantRepository>,
    pub inventory: Arc<dyn InventoryRepository>,
    pub cache: Arc<dyn Cache>,
    pub payments: Arc<dyn PaymentGateway>,
    pub sessions: Arc<SessionKeys>,
    pub config: Arc<AppConfig>,
}

// --- Router ---

pub fn create_app(app_state: AppState) -> Router {
    // No session required
    let public_routes = Router::new()
        .route("/register", post(handle_register_request))
        .route("/auth/login", post(handle_login_request))
        .route(
            "/webhooks/mercadopago",
            get(handle_webhook_status).post(handle_webhook),
        );

    // Any signed-in user, whatever the subscription state
    let session_routes = Router::new()
        .route("/auth/logout", post(handle_logout_request))
        .route("/session", get(handle_get_session))
        .route("/payment/create", post(handle_create_checkout))
        .route_layer(middleware::from_fn_with_state(app_state.clone(), session_auth));

    // Clinic dashboard: session plus a subscription that grants access
    let dashboard_routes = Router::new()
        .route("/products", get(handle_list_products).post(handle_create_product))
        .route(
            "/products/{id}",
            get(handle_get_product)
                .put(handle_update_product)
                .delete(handle_delete_product),
        )
        .route("/batches", get(handle_list_batches).post(handle_create_batch))
        .route(
            "/batches/{id}",
            put(handle_update_batch).delete(handle_delete_batch),
        )
        .route("/dashboard/stats", get(handle_dashboard_stats))
        .route_layer(middleware::from_fn_with_state(app_state.clone(), subscription_gate))
        .route_layer(middleware::from_fn_with_state(app_state.clone(), session_auth));

    // Platform admin console
    let admin_routes = Router::new()
        .route("/admin/tenants", get(handle_list_tenants))
        .route("/admin/stats", get(handle_platform_stats))
        .route("/admin/tenants/{id}/approve", post(handle_approve_tenant))
        .route("/admin/tenants/{id}/reject", post(handle_reject_tenant))
        .route_layer(middleware::from_fn(require_super_admin))
        .route_layer(middleware::from_fn_with_state(app_state.clone(), session_auth));

    let api_routes = public_routes
        .merge(session_routes)
        .merge(dashboard_routes)
        .merge(admin_routes);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(app_state)
}
