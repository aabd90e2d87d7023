//! HTTP integration tests for the purchase routes.
//!
//! Requests go through the full router (layers included) with
//! `tower::ServiceExt::oneshot`; adapters are in-memory and the gateway is
//! the mock, so status codes and bodies are checked without a network.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use course_enrollment::adapters::http::{
    build_router, HttpSettings, PurchaseAppState, PurchaseSettings,
};
use course_enrollment::adapters::{
    InMemoryBuyerDirectory, InMemoryCourseCatalog, InMemoryCourseRoster,
    InMemoryPurchaseRepository, MockPaymentGateway, TracingInconsistencyReporter,
};
use course_enrollment::application::handlers::purchase::RetryPolicy;
use course_enrollment::domain::foundation::{CourseId, Currency, Money, UserId};
use course_enrollment::ports::CourseListing;

// =============================================================================
// Test Infrastructure
// =============================================================================

const BUYER: &str = "buyer-http";

struct TestApp {
    router: Router,
    gateway: Arc<MockPaymentGateway>,
    course: CourseId,
}

impl TestApp {
    async fn new() -> Self {
        let catalog = Arc::new(InMemoryCourseCatalog::new());
        let buyers = Arc::new(InMemoryBuyerDirectory::new());
        let gateway = Arc::new(MockPaymentGateway::new());

        let course = CourseId::new();
        buyers.add_buyer(UserId::new(BUYER).unwrap()).await;
        catalog
            .add_course(CourseListing {
                id: course,
                title: "Distributed Systems in Practice".to_string(),
                description: None,
                price: Money::from_minor(79_900, Currency::inr()).unwrap(),
            })
            .await;

        let state = PurchaseAppState::new(
            Arc::new(InMemoryPurchaseRepository::new()),
            catalog,
            buyers,
            Arc::new(InMemoryCourseRoster::new()),
            gateway.clone(),
            Arc::new(TracingInconsistencyReporter::new()),
            RetryPolicy::default(),
            PurchaseSettings::default(),
        );

        Self {
            router: build_router(state, &HttpSettings::default()),
            gateway,
            course,
        }
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    async fn checkout(&self, course_id: Uuid) -> (StatusCode, Value) {
        self.send(
            Request::post("/checkout")
                .header("x-user-id", BUYER)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json!({ "courseId": course_id }).to_string()))
                .unwrap(),
        )
        .await
    }

    fn webhook_request(&self, body: Value, signature: Option<String>) -> Request<Body> {
        let payload = body.to_string();
        let mut builder = Request::post("/webhook").header(header::CONTENT_TYPE, "application/json");
        if let Some(signature) = signature {
            builder = builder.header("x-mock-signature", signature);
        }
        builder.body(Body::from(payload)).unwrap()
    }

    fn captured(order_id: &str) -> Value {
        json!({
            "id": "evt_http_1",
            "type": "payment.captured",
            "orderRef": order_id,
            "paymentRef": "pay_http_1",
            "method": "card",
        })
    }

    async fn pay(&self, order_id: &str) -> (StatusCode, Value) {
        let body = Self::captured(order_id);
        let signature = self.gateway.sign_webhook(body.to_string().as_bytes());
        self.send(self.webhook_request(body, Some(signature))).await
    }
}

fn order_id(checkout: &Value) -> String {
    checkout["checkout"]["orderId"]
        .as_str()
        .expect("order checkout artifact")
        .to_string()
}

// =============================================================================
// Liveness and Identity
// =============================================================================

#[tokio::test]
async fn health_reports_ok() {
    let app = TestApp::new().await;

    let (status, body) = app
        .send(Request::get("/health").body(Body::empty()).unwrap())
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "course-enrollment");
}

#[tokio::test]
async fn buyer_routes_require_identity() {
    let app = TestApp::new().await;

    let (status, body) = app
        .send(
            Request::post("/checkout")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json!({ "courseId": Uuid::new_v4() }).to_string()))
                .unwrap(),
        )
        .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["errorCode"], "UNAUTHORIZED");

    let (status, _) = app
        .send(Request::get("/purchased-courses").body(Body::empty()).unwrap())
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

// =============================================================================
// Checkout
// =============================================================================

#[tokio::test]
async fn checkout_returns_created_with_order_artifact() {
    let app = TestApp::new().await;

    let (status, body) = app.checkout(*app.course.as_uuid()).await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["status"], "pending");
    assert_eq!(body["amount"], 79_900);
    assert_eq!(body["currency"], "INR");
    assert!(order_id(&body).starts_with("order_mock_"));
}

#[tokio::test]
async fn checkout_for_unknown_course_is_not_found() {
    let app = TestApp::new().await;

    let (status, body) = app.checkout(Uuid::new_v4()).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["errorCode"], "COURSE_NOT_FOUND");
}

#[tokio::test]
async fn checkout_for_owned_course_conflicts() {
    let app = TestApp::new().await;
    let (_, first) = app.checkout(*app.course.as_uuid()).await;
    let (status, _) = app.pay(&order_id(&first)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app.checkout(*app.course.as_uuid()).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["errorCode"], "ALREADY_PURCHASED");
}

// =============================================================================
// Webhook
// =============================================================================

#[tokio::test]
async fn webhook_with_valid_signature_completes_purchase() {
    let app = TestApp::new().await;
    let (_, checkout) = app.checkout(*app.course.as_uuid()).await;

    let (status, body) = app.pay(&order_id(&checkout)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["received"], true);
    assert_eq!(body["outcome"], "completed");
    assert_eq!(body["purchaseId"], checkout["purchaseId"]);

    let (status, body) = app
        .send(
            Request::get(format!("/purchase-status/{}", app.course))
                .header("x-user-id", BUYER)
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["purchased"], true);
    assert_eq!(body["enrolled"], true);
    assert_eq!(body["status"], "completed");
}

#[tokio::test]
async fn webhook_with_bad_signature_is_rejected() {
    let app = TestApp::new().await;
    let (_, checkout) = app.checkout(*app.course.as_uuid()).await;

    let (status, body) = app
        .send(app.webhook_request(
            TestApp::captured(&order_id(&checkout)),
            Some("deadbeef".to_string()),
        ))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errorCode"], "VERIFICATION_FAILED");
}

#[tokio::test]
async fn webhook_without_signature_is_rejected() {
    let app = TestApp::new().await;

    let (status, _) = app
        .send(app.webhook_request(TestApp::captured("order_mock_1"), None))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// =============================================================================
// Reads
// =============================================================================

#[tokio::test]
async fn purchased_courses_lists_completed_purchases() {
    let app = TestApp::new().await;
    let (_, checkout) = app.checkout(*app.course.as_uuid()).await;
    app.pay(&order_id(&checkout)).await;

    let (status, body) = app
        .send(
            Request::get("/purchased-courses")
                .header("x-user-id", BUYER)
                .body(Body::empty())
                .unwrap(),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    let courses = body["courses"].as_array().unwrap();
    assert_eq!(courses.len(), 1);
    assert_eq!(courses[0]["course"]["title"], "Distributed Systems in Practice");
    assert_eq!(courses[0]["paymentMethod"], "card");
}
