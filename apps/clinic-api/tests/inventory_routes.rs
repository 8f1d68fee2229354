mod common;

use chrono::{Duration, Utc};
use common::{active_clinic, bearer, setup_test_app};
use http::StatusCode;
use serde_json::{Value, json};

fn days_from_now(days: i64) -> String {
    (Utc::now() + Duration::days(days)).to_rfc3339()
}

#[tokio::test]
async fn test_product_lifecycle() {
    let app = setup_test_app(&[]);
    let (_, token) = active_clinic(&app, "owner@clinic.com").await;
    let (name, value) = bearer(&token);

    // Missing price
    let invalid = app
        .server
        .post("/api/products")
        .add_header(name.clone(), value.clone())
        .json(&json!({ "name": "Ácido Hialurônico" }))
        .await;
    assert_eq!(invalid.status_code(), StatusCode::BAD_REQUEST);

    let created = app
        .server
        .post("/api/products")
        .add_header(name.clone(), value.clone())
        .json(&json!({
            "name": "Ácido Hialurônico",
            "price": 120.5,
            "minStockLevel": 5,
            "quantity": 3,
            "expirationDate": days_from_now(90),
            "lotCode": "AH-01",
            "unitCost": 80
        }))
        .await;
    assert_eq!(created.status_code(), StatusCode::CREATED);
    let product = created.json::<Value>();
    assert_eq!(product["category"], "Geral");
    assert_eq!(product["unit"], "unidade");
    assert_eq!(product["totalQuantity"], 3);
    assert_eq!(product["stockStatus"], "LOW");
    assert_eq!(product["stockStatusLabel"], "Baixo Estoque");
    assert_eq!(product["batches"][0]["lotCode"], "AH-01");
    assert_eq!(product["batches"][0]["expiryStatus"], "OK");
    assert_eq!(product["batches"][0]["totalCost"], 240.0);
    let product_id = product["id"].as_str().unwrap().to_string();

    // Partial update keeps untouched fields
    let updated = app
        .server
        .put(&format!("/api/products/{}", product_id))
        .add_header(name.clone(), value.clone())
        .json(&json!({ "category": "Preenchedores", "minStockLevel": 2 }))
        .await;
    assert_eq!(updated.status_code(), StatusCode::OK);
    let updated = updated.json::<Value>();
    assert_eq!(updated["name"], "Ácido Hialurônico");
    assert_eq!(updated["category"], "Preenchedores");
    assert_eq!(updated["stockStatus"], "NORMAL");

    // Delete removes its batches too
    let deleted = app
        .server
        .delete(&format!("/api/products/{}", product_id))
        .add_header(name.clone(), value.clone())
        .await;
    assert_eq!(deleted.status_code(), StatusCode::OK);

    let batches = app.server.get("/api/batches").add_header(name.clone(), value.clone()).await;
    assert_eq!(batches.json::<Value>(), json!([]));
    let gone = app
        .server
        .get(&format!("/api/products/{}", product_id))
        .add_header(name, value)
        .await;
    assert_eq!(gone.status_code(), StatusCode::NOT_FOUND);
    assert_eq!(gone.json::<Value>()["error"], "Product not found");
}

#[tokio::test]
async fn test_batches_are_sorted_and_classified() {
    let app = setup_test_app(&[]);
    let (_, token) = active_clinic(&app, "owner@clinic.com").await;
    let (name, value) = bearer(&token);

    let product = app
        .server
        .post("/api/products")
        .add_header(name.clone(), value.clone())
        .json(&json!({ "name": "Toxina", "price": 10 }))
        .await
        .json::<Value>();
    let product_id = product["id"].as_str().unwrap().to_string();
    assert_eq!(product["stockStatus"], "NONE");

    let zero = app
        .server
        .post("/api/batches")
        .add_header(name.clone(), value.clone())
        .json(&json!({ "productId": product_id, "quantity": 0, "expirationDate": "2030-01-01" }))
        .await;
    assert_eq!(zero.status_code(), StatusCode::BAD_REQUEST);

    let bad_date = app
        .server
        .post("/api/batches")
        .add_header(name.clone(), value.clone())
        .json(&json!({ "productId": product_id, "quantity": 1, "expirationDate": "soon" }))
        .await;
    assert_eq!(bad_date.status_code(), StatusCode::BAD_REQUEST);

    for days in [200, -3, 45, 10] {
        let response = app
            .server
            .post("/api/batches")
            .add_header(name.clone(), value.clone())
            .json(&json!({
                "productId": product_id,
                "quantity": 2,
                "expirationDate": days_from_now(days)
            }))
            .await;
        assert_eq!(response.status_code(), StatusCode::CREATED);
    }

    let batches = app
        .server
        .get("/api/batches")
        .add_header(name.clone(), value.clone())
        .await
        .json::<Value>();
    let statuses: Vec<&str> = batches
        .as_array()
        .unwrap()
        .iter()
        .map(|b| b["expiryStatus"].as_str().unwrap())
        .collect();
    assert_eq!(statuses, vec!["EXPIRED", "CRITICAL", "WARNING", "OK"]);
    assert_eq!(batches[0]["product"]["name"], "Toxina");

    // Quantity may be updated down to zero
    let batch_id = batches[0]["id"].as_str().unwrap().to_string();
    let emptied = app
        .server
        .put(&format!("/api/batches/{}", batch_id))
        .add_header(name.clone(), value.clone())
        .json(&json!({ "quantity": 0 }))
        .await;
    assert_eq!(emptied.status_code(), StatusCode::OK);
    assert_eq!(emptied.json::<Value>()["quantity"], 0);

    let negative = app
        .server
        .put(&format!("/api/batches/{}", batch_id))
        .add_header(name.clone(), value.clone())
        .json(&json!({ "quantity": -1 }))
        .await;
    assert_eq!(negative.status_code(), StatusCode::BAD_REQUEST);

    let removed = app
        .server
        .delete(&format!("/api/batches/{}", batch_id))
        .add_header(name, value)
        .await;
    assert_eq!(removed.status_code(), StatusCode::OK);
}

#[tokio::test]
async fn test_dashboard_stats() {
    let app = setup_test_app(&[]);
    let (_, token) = active_clinic(&app, "owner@clinic.com").await;
    let (name, value) = bearer(&token);

    // Empty product: counts as low and out of stock
    app.server
        .post("/api/products")
        .add_header(name.clone(), value.clone())
        .json(&json!({ "name": "Empty", "price": 5, "category": "Insumos" }))
        .await;
    // 10 units at 20.0 expiring in 20 days
    app.server
        .post("/api/products")
        .add_header(name.clone(), value.clone())
        .json(&json!({
            "name": "Stocked",
            "price": 20,
            "category": "Toxinas",
            "quantity": 10,
            "expirationDate": days_from_now(20)
        }))
        .await;

    let response = app
        .server
        .get("/api/dashboard/stats")
        .add_header(name, value)
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let stats = response.json::<Value>();
    assert_eq!(stats["productCount"], 2);
    assert_eq!(stats["totalValue"], 200.0);
    assert_eq!(stats["lowStockCount"], 1);
    assert_eq!(stats["outOfStockCount"], 1);
    assert_eq!(stats["expiringSoonCount"], 1);
    assert_eq!(stats["expiredCount"], 0);
    assert_eq!(stats["totalBatches"], 1);
    assert_eq!(stats["subscriptionStatus"], "ACTIVE");
    assert_eq!(
        stats["categoryValues"],
        json!([{ "category": "Toxinas", "value": 200.0 }])
    );
}

#[tokio::test]
async fn test_malformed_requests_get_json_errors() {
    let app = setup_test_app(&[]);
    let (_, token) = active_clinic(&app, "owner@clinic.com").await;
    let (name, value) = bearer(&token);

    let wrong_type = app
        .server
        .post("/api/products")
        .add_header(name.clone(), value.clone())
        .json(&json!({ "name": "Botox", "price": 10, "quantity": 2.5 }))
        .await;
    assert_eq!(wrong_type.status_code(), StatusCode::BAD_REQUEST);
    assert!(wrong_type.json::<Value>()["error"].as_str().unwrap().contains("quantity"));

    let not_json = app
        .server
        .post("/api/batches")
        .add_header(name.clone(), value.clone())
        .text("quantity=3")
        .await;
    assert_eq!(not_json.status_code(), StatusCode::BAD_REQUEST);
    assert!(not_json.json::<Value>()["error"].is_string());

    for path in ["/api/products/not-a-uuid", "/api/batches/not-a-uuid"] {
        let response = app
            .server
            .put(path)
            .add_header(name.clone(), value.clone())
            .json(&json!({ "quantity": 1 }))
            .await;
        assert_eq!(response.status_code(), StatusCode::NOT_FOUND, "{}", path);
        assert_eq!(response.json::<Value>()["error"], "Resource not found");
    }

    let missing = app
        .server
        .get("/api/products/not-a-uuid")
        .add_header(name, value)
        .await;
    assert_eq!(missing.status_code(), StatusCode::NOT_FOUND);
    assert!(missing.json::<Value>()["error"].is_string());
}
