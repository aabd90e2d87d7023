//! HTTP handlers for purchase endpoints.
//!
//! These handlers connect Axum routes to the purchase command and query
//! handlers. The webhook route is the only one that does not require an
//! authenticated buyer; the gateway signature stands in for identity there.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{FromRequestParts, Json, Path, State};
use axum::http::request::Parts;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use tracing::{debug, error};
use uuid::Uuid;

use crate::application::handlers::purchase::{
    EnrollmentFanout, GetPurchaseStatusHandler, GetPurchaseStatusQuery,
    HandleGatewayWebhookCommand, HandleGatewayWebhookHandler, InitiateCheckoutCommand,
    InitiateCheckoutHandler, ListPurchasedCoursesHandler, ListPurchasedCoursesQuery,
    ReconcilePaymentHandler, RefundPurchaseCommand, RefundPurchaseHandler, RetryPolicy,
    VerifyClientPaymentCommand, VerifyClientPaymentHandler,
};
use crate::domain::foundation::{CourseId, PurchaseId, UserId};
use crate::domain::purchase::{ErrorCategory, PurchaseError, RefundPolicy};
use crate::ports::{
    BuyerDirectory, CourseCatalog, CourseRoster, InconsistencyReporter, PaymentGateway,
    PurchaseRepository,
};

use super::dto::{
    CheckoutRequest, CheckoutResponse, ErrorResponse, PurchaseStatusResponse,
    PurchasedCourseResponse, PurchasedCoursesResponse, RefundRequestBody, RefundResponse,
    VerifyPaymentRequest, VerifyPaymentResponse, WebhookAck,
};

/// Header carrying the authenticated buyer id, set by the upstream auth layer.
pub const USER_ID_HEADER: &str = "x-user-id";

// ════════════════════════════════════════════════════════════════════════════════
// Application State
// ════════════════════════════════════════════════════════════════════════════════

/// Tunables the purchase handlers need at request time.
#[derive(Debug, Clone)]
pub struct PurchaseSettings {
    pub gateway_timeout: Duration,
    pub fetch_retry: RetryPolicy,
    pub ledger_retry: RetryPolicy,
    pub refund_policy: RefundPolicy,
}

impl Default for PurchaseSettings {
    fn default() -> Self {
        Self {
            gateway_timeout: Duration::from_secs(10),
            fetch_retry: RetryPolicy::default(),
            ledger_retry: RetryPolicy::default(),
            refund_policy: RefundPolicy::default(),
        }
    }
}

/// Shared state for the purchase routes.
///
/// Cloned per request; every dependency is behind an `Arc`.
#[derive(Clone)]
pub struct PurchaseAppState {
    pub repository: Arc<dyn PurchaseRepository>,
    pub catalog: Arc<dyn CourseCatalog>,
    pub buyers: Arc<dyn BuyerDirectory>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub fanout: EnrollmentFanout,
    pub reconciler: Arc<ReconcilePaymentHandler>,
    pub reporter: Arc<dyn InconsistencyReporter>,
    pub settings: PurchaseSettings,
}

impl PurchaseAppState {
    /// Wires the fan-out and the shared reconciler from the ports.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        repository: Arc<dyn PurchaseRepository>,
        catalog: Arc<dyn CourseCatalog>,
        buyers: Arc<dyn BuyerDirectory>,
        roster: Arc<dyn CourseRoster>,
        gateway: Arc<dyn PaymentGateway>,
        reporter: Arc<dyn InconsistencyReporter>,
        fanout_policy: RetryPolicy,
        settings: PurchaseSettings,
    ) -> Self {
        let fanout = EnrollmentFanout::new(
            repository.clone(),
            buyers.clone(),
            roster,
            reporter.clone(),
            fanout_policy,
        );
        let reconciler = Arc::new(ReconcilePaymentHandler::new(
            repository.clone(),
            fanout.clone(),
            reporter.clone(),
        ));
        Self {
            repository,
            catalog,
            buyers,
            gateway,
            fanout,
            reconciler,
            reporter,
            settings,
        }
    }

    pub fn initiate_checkout_handler(&self) -> InitiateCheckoutHandler {
        InitiateCheckoutHandler::new(
            self.repository.clone(),
            self.catalog.clone(),
            self.buyers.clone(),
            self.gateway.clone(),
            self.settings.gateway_timeout,
        )
    }

    pub fn webhook_handler(&self) -> HandleGatewayWebhookHandler {
        HandleGatewayWebhookHandler::new(self.gateway.clone(), self.reconciler.clone())
    }

    pub fn verify_payment_handler(&self) -> VerifyClientPaymentHandler {
        VerifyClientPaymentHandler::new(
            self.repository.clone(),
            self.gateway.clone(),
            self.reconciler.clone(),
            self.settings.gateway_timeout,
            self.settings.fetch_retry,
        )
    }

    pub fn refund_handler(&self) -> RefundPurchaseHandler {
        RefundPurchaseHandler::new(
            self.repository.clone(),
            self.gateway.clone(),
            self.fanout.clone(),
            self.reporter.clone(),
            self.settings.refund_policy,
            self.settings.ledger_retry,
            self.settings.gateway_timeout,
        )
    }

    pub fn purchase_status_handler(&self) -> GetPurchaseStatusHandler {
        GetPurchaseStatusHandler::new(
            self.repository.clone(),
            self.catalog.clone(),
            self.buyers.clone(),
        )
    }

    pub fn purchased_courses_handler(&self) -> ListPurchasedCoursesHandler {
        ListPurchasedCoursesHandler::new(
            self.repository.clone(),
            self.catalog.clone(),
            self.buyers.clone(),
        )
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Buyer Identity
// ════════════════════════════════════════════════════════════════════════════════

/// Buyer identity established by the upstream auth layer.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: UserId,
}

/// Rejection when no usable buyer id is present.
pub struct AuthenticationRequired;

impl IntoResponse for AuthenticationRequired {
    fn into_response(self) -> Response {
        let error = ErrorResponse::new("UNAUTHORIZED", "Authentication is required");
        (StatusCode::UNAUTHORIZED, Json(error)).into_response()
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = AuthenticationRequired;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| UserId::new(s.trim()).ok())
            .ok_or(AuthenticationRequired)?;

        Ok(AuthenticatedUser { user_id })
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Command Handlers (POST endpoints)
// ════════════════════════════════════════════════════════════════════════════════

/// POST /checkout - Open a purchase and a gateway order
pub async fn checkout(
    State(state): State<PurchaseAppState>,
    user: AuthenticatedUser,
    Json(request): Json<CheckoutRequest>,
) -> Result<impl IntoResponse, PurchaseApiError> {
    let cmd = InitiateCheckoutCommand {
        buyer_id: user.user_id,
        course_id: CourseId::from_uuid(request.course_id),
    };

    let result = state.initiate_checkout_handler().handle(cmd).await?;

    Ok((StatusCode::CREATED, Json(CheckoutResponse::from(result))))
}

/// POST /webhook - Gateway-to-server payment notifications
///
/// The body is taken as raw bytes; the signature covers them exactly.
pub async fn webhook(
    State(state): State<PurchaseAppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, PurchaseApiError> {
    let signature = headers
        .get(state.gateway.signature_header())
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let cmd = HandleGatewayWebhookCommand {
        payload: body.to_vec(),
        signature,
    };

    let result = state.webhook_handler().handle(cmd).await?;

    Ok((StatusCode::OK, Json(WebhookAck::from(result))))
}

/// POST /verify-payment - Client-relayed payment confirmation
pub async fn verify_payment(
    State(state): State<PurchaseAppState>,
    user: AuthenticatedUser,
    Json(request): Json<VerifyPaymentRequest>,
) -> Result<impl IntoResponse, PurchaseApiError> {
    let cmd = VerifyClientPaymentCommand {
        buyer_id: user.user_id,
        order_ref: request.order_id,
        payment_ref: request.payment_id,
        signature: request.signature,
    };

    let result = state.verify_payment_handler().handle(cmd).await?;

    Ok(Json(VerifyPaymentResponse::from(result)))
}

/// POST /refund - Refund a completed purchase
pub async fn refund(
    State(state): State<PurchaseAppState>,
    user: AuthenticatedUser,
    Json(request): Json<RefundRequestBody>,
) -> Result<impl IntoResponse, PurchaseApiError> {
    let cmd = RefundPurchaseCommand {
        buyer_id: user.user_id,
        purchase_id: PurchaseId::from_uuid(request.purchase_id),
        reason: request.refund_reason,
    };

    let result = state.refund_handler().handle(cmd).await?;

    Ok(Json(RefundResponse::from(result)))
}

// ════════════════════════════════════════════════════════════════════════════════
// Query Handlers (GET endpoints)
// ════════════════════════════════════════════════════════════════════════════════

/// GET /purchase-status/:courseId
pub async fn purchase_status(
    State(state): State<PurchaseAppState>,
    user: AuthenticatedUser,
    Path(course_id): Path<Uuid>,
) -> Result<impl IntoResponse, PurchaseApiError> {
    let query = GetPurchaseStatusQuery {
        buyer_id: user.user_id,
        course_id: CourseId::from_uuid(course_id),
    };

    let result = state.purchase_status_handler().handle(query).await?;

    Ok(Json(PurchaseStatusResponse::from(result)))
}

/// GET /purchased-courses
pub async fn purchased_courses(
    State(state): State<PurchaseAppState>,
    user: AuthenticatedUser,
) -> Result<impl IntoResponse, PurchaseApiError> {
    let query = ListPurchasedCoursesQuery {
        buyer_id: user.user_id,
    };

    let courses = state.purchased_courses_handler().handle(query).await?;

    Ok(Json(PurchasedCoursesResponse {
        courses: courses.into_iter().map(PurchasedCourseResponse::from).collect(),
    }))
}

/// GET /health - Liveness
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

// ════════════════════════════════════════════════════════════════════════════════
// Error Handling
// ════════════════════════════════════════════════════════════════════════════════

/// API error type that converts purchase errors to HTTP responses.
#[derive(Debug)]
pub struct PurchaseApiError(PurchaseError);

impl From<PurchaseError> for PurchaseApiError {
    fn from(err: PurchaseError) -> Self {
        Self(err)
    }
}

impl PurchaseApiError {
    pub fn status(&self) -> StatusCode {
        match self.0.category() {
            ErrorCategory::NotFound => StatusCode::NOT_FOUND,
            ErrorCategory::Conflict => StatusCode::CONFLICT,
            ErrorCategory::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorCategory::Forbidden => StatusCode::FORBIDDEN,
            ErrorCategory::VerificationFailed | ErrorCategory::Validation => {
                StatusCode::BAD_REQUEST
            }
            ErrorCategory::Gateway => StatusCode::BAD_GATEWAY,
            ErrorCategory::InternalInconsistency | ErrorCategory::Infrastructure => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for PurchaseApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(code = %self.0.code(), detail = %self.0.detail(), "Purchase request failed");
        } else {
            debug!(code = %self.0.code(), detail = %self.0.detail(), "Purchase request rejected");
        }

        // message() never carries gateway or storage detail.
        let body = ErrorResponse::new(self.0.code().to_string(), self.0.message());
        (status, Json(body)).into_response()
    }
}
