//! Router-level tests: requests go through the full middleware stack.

mod common;

use axum::http::StatusCode;
use chrono::{Duration, Utc};
use common::{plan, register, request, TestApp};
use kasir_core::subscription::{plan_subscription, SubscriptionStatus};
use kasir_core::TRIAL_PLAN_SLUG;
use serde_json::json;

/// Verifies the owner's WhatsApp number through the OTP endpoints.
async fn verify_phone(app: &TestApp, token: &str, phone: &str) {
    let (status, body) = app
        .call("POST", "/api/otp/send", Some(token), Some(json!({ "phone": phone })))
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    let normalized = body["data"]["phone"].as_str().unwrap().to_string();

    let code = app
        .db()
        .otp()
        .latest_for_phone(&normalized)
        .await
        .unwrap()
        .unwrap()
        .code;
    let (status, body) = app
        .call(
            "POST",
            "/api/otp/verify",
            Some(token),
            Some(json!({ "phone": phone, "code": code })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
}

#[tokio::test]
async fn test_health_reports_serving() {
    let app = TestApp::new().await;
    let (status, body) = app.call("GET", "/health", None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "serving");
}

#[tokio::test]
async fn test_register_and_me_lists_missing_profile_fields() {
    let app = TestApp::new().await;
    let (_, token) = register(&app, "budi@example.id").await;

    let (status, body) = app.call("GET", "/api/auth/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["profile_complete"], false);
    let missing = body["data"]["missing_fields"].as_array().unwrap();
    assert!(missing.contains(&json!("phone")));
    assert!(missing.contains(&json!("whatsapp_verified")));
}

#[tokio::test]
async fn test_duplicate_registration_conflicts() {
    let app = TestApp::new().await;
    register(&app, "budi@example.id").await;

    let (status, body) = app
        .call(
            "POST",
            "/api/auth/register",
            None,
            Some(json!({
                "name": "Budi Lain",
                "email": "budi@example.id",
                "password": "rahasia123",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_login_with_wrong_password_is_unauthorized() {
    let app = TestApp::new().await;
    register(&app, "budi@example.id").await;

    let (status, _) = app
        .call(
            "POST",
            "/api/auth/login",
            None,
            Some(json!({ "email": "budi@example.id", "password": "salah" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_tenant_route_without_token_is_unauthorized() {
    let app = TestApp::new().await;
    let (status, _) = app.call("GET", "/api/products", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_owner_without_subscription_is_redirected() {
    let app = TestApp::new().await;
    let (_, token) = register(&app, "budi@example.id").await;

    let (status, body) = app.call("GET", "/api/products", Some(&token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "SUBSCRIPTION_REQUIRED");
    assert_eq!(body["details"]["subscription_required"], true);
    assert!(body["details"]["redirect_to"].is_string());
}

#[tokio::test]
async fn test_subscribe_requires_complete_profile() {
    let app = TestApp::new().await;
    let (_, token) = register(&app, "budi@example.id").await;
    let (plan, price) = plan(app.db(), "basic", [1, 2, 100, 5], 150_000).await;

    let (status, body) = app
        .call(
            "POST",
            "/api/subscription/subscribe",
            Some(&token),
            Some(json!({ "plan_id": plan.id, "plan_price_id": price.id })),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "{}", body);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_pending_payment_blocks_until_settlement() {
    let app = TestApp::new().await;
    let (_, token) = register(&app, "budi@example.id").await;
    verify_phone(&app, &token, "0812-3456-7890").await;
    let (plan, price) = plan(app.db(), "basic", [1, 2, 100, 5], 150_000).await;

    let (status, body) = app
        .call(
            "POST",
            "/api/subscription/subscribe",
            Some(&token),
            Some(json!({ "plan_id": plan.id, "plan_price_id": price.id })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    let code = body["data"]["subscription_code"].as_str().unwrap().to_string();

    let (status, body) = app.call("GET", "/api/products", Some(&token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "SUBSCRIPTION_PENDING");

    let notification = json!({
        "order_id": code,
        "status_code": "200",
        "gross_amount": "150000.00",
        "transaction_status": "settlement",
        "payment_type": "bank_transfer",
        "transaction_id": "tx-001",
    });
    let (status, body) = app
        .call("POST", "/api/payments/midtrans/notification", None, Some(notification))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    let (status, body) = app
        .call("GET", &format!("/api/payments/status/{}", code), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);

    // Business creation stays reachable; tenant routes open up once active.
    let (status, _) = app
        .call("POST", "/api/businesses", Some(&token), Some(json!({ "name": "Warung Budi" })))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, _) = app.call("GET", "/api/products", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_webhook_with_garbage_body_is_acknowledged() {
    let app = TestApp::new().await;
    let req = axum::http::Request::builder()
        .method("POST")
        .uri("/api/payments/midtrans/notification")
        .header("Content-Type", "application/json")
        .body(axum::body::Body::from("not json"))
        .unwrap();
    let (status, response) = app.send(req).await;
    let body = common::json_body(response).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_expiring_subscription_sets_warning_headers() {
    let app = TestApp::new().await;
    let (user_id, token) = register(&app, "budi@example.id").await;
    let (plan, price) = plan(app.db(), TRIAL_PLAN_SLUG, [1, 1, 10, 2], 0).await;

    // A 7-day trial started five days ago ends in two days.
    let started = Utc::now() - Duration::days(5);
    let new = plan_subscription(&plan, &price, started, false).unwrap();
    app.db()
        .subscriptions()
        .insert_active(&user_id, &new, &[], SubscriptionStatus::Cancelled, started)
        .await
        .unwrap();
    app.call("POST", "/api/businesses", Some(&token), Some(json!({ "name": "Warung Budi" })))
        .await;

    let (status, response) = app.send(request("GET", "/api/products", Some(&token), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        response.headers().get("x-subscription-warning").unwrap(),
        "expires_soon"
    );
    assert!(response.headers().contains_key("x-subscription-days-remaining"));
}

#[tokio::test]
async fn test_trial_checkout_flow_with_public_receipt() {
    let app = TestApp::new().await;
    let (_, token) = register(&app, "budi@example.id").await;
    verify_phone(&app, &token, "081234567890").await;
    let (plan, price) = plan(app.db(), TRIAL_PLAN_SLUG, [1, 1, 10, 2], 0).await;

    let (status, body) = app
        .call(
            "POST",
            "/api/subscription/subscribe",
            Some(&token),
            Some(json!({ "plan_id": plan.id, "plan_price_id": price.id })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);

    let (status, body) = app
        .call("POST", "/api/businesses", Some(&token), Some(json!({ "name": "Warung Budi" })))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);

    let (status, body) = app
        .call("POST", "/api/outlets", Some(&token), Some(json!({ "name": "Pusat" })))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    let outlet_id = body["data"]["id"].as_str().unwrap().to_string();

    // The trial allows a single outlet.
    let (status, body) = app
        .call("POST", "/api/outlets", Some(&token), Some(json!({ "name": "Cabang" })))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN, "{}", body);

    let (status, body) = app
        .call(
            "POST",
            "/api/products",
            Some(&token),
            Some(json!({ "sku": "KOPI-01", "name": "Kopi Susu", "price": 25000, "stock": 10 })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    let product_id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, body) = app
        .call(
            "POST",
            "/api/orders",
            Some(&token),
            Some(json!({
                "outlet_id": outlet_id,
                "order_type": "takeaway",
                "items": [{ "product_id": product_id, "quantity": 2 }],
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    assert_eq!(body["data"]["total"], 50000);
    let order_id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, body) = app
        .call(
            "POST",
            &format!("/api/orders/{}/payments", order_id),
            Some(&token),
            Some(json!({ "method": "cash", "amount": 60000 })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["data"]["completed"], true);
    assert_eq!(body["data"]["change"], 10000);
    let receipt_token = body["data"]["order"]["receipt_token"].as_str().unwrap().to_string();

    let (status, body) = app
        .call("GET", &format!("/receipt/{}", receipt_token), None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["business_name"], "Warung Budi");
    assert_eq!(body["data"]["items"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_registration_flood_is_rate_limited() {
    let app = TestApp::new().await;
    for i in 0..5 {
        register(&app, &format!("pemilik{}@example.id", i)).await;
    }

    let req = request(
        "POST",
        "/api/auth/register",
        None,
        Some(json!({
            "name": "Budi Santoso",
            "email": "pemilik5@example.id",
            "password": "rahasia123",
        })),
    );
    let (status, response) = app.send(req).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().contains_key("retry-after"));
    let body = common::json_body(response).await;
    assert_eq!(body["code"], "TOO_MANY_REQUESTS");

    // Other endpoints keep their own windows.
    let (status, _) = app
        .call(
            "POST",
            "/api/auth/login",
            None,
            Some(json!({ "email": "pemilik0@example.id", "password": "rahasia123" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_otp_send_flood_is_rate_limited() {
    let app = TestApp::new().await;
    let (_, token) = register(&app, "budi@example.id").await;

    for _ in 0..5 {
        let (status, body) = app
            .call("POST", "/api/otp/send", Some(&token), Some(json!({ "phone": "081299990001" })))
            .await;
        assert_eq!(status, StatusCode::OK, "{}", body);
    }
    let (status, body) = app
        .call("POST", "/api/otp/send", Some(&token), Some(json!({ "phone": "0812-9999-0001" })))
        .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS, "{}", body);
}
