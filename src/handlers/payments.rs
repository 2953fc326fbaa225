use crate::auth::AuthenticatedUser;
use crate::entities::payment::PaymentStatus;
use crate::errors::ServiceError;
use crate::handlers::AppState;
use crate::services::payments::{InitiatePaymentResponse, PaymentResponse, VerificationOutcome};
use crate::ApiResponse;
use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    routing::{get, post},
    Router,
};
use uuid::Uuid;

/// Start a gateway checkout for a booking
async fn initiate_payment(
    State(state): State<AppState>,
    Path(booking_id): Path<Uuid>,
    user: AuthenticatedUser,
) -> Result<(StatusCode, Json<ApiResponse<InitiatePaymentResponse>>), ServiceError> {
    let initiated = state
        .services
        .payments
        .initiate_payment(booking_id, &user)
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(initiated))))
}

/// Verify a payment attempt by transaction reference.
///
/// Invoked by the gateway's callback and by manual polling; repeat calls
/// replay the recorded outcome.
async fn verify_payment(
    State(state): State<AppState>,
    Path(tx_ref): Path<String>,
) -> Result<(StatusCode, Json<ApiResponse<VerificationOutcome>>), ServiceError> {
    let outcome = state.services.payments.verify_payment(&tx_ref).await?;

    match outcome.status {
        PaymentStatus::Completed | PaymentStatus::Refunded => {
            let mut response = ApiResponse::success(outcome);
            response.message = Some("Payment successful and confirmed.".to_string());
            Ok((StatusCode::OK, Json(response)))
        }
        _ => {
            let mut response = ApiResponse::success(outcome);
            response.success = false;
            response.message = Some("Payment verification failed.".to_string());
            Ok((StatusCode::BAD_REQUEST, Json(response)))
        }
    }
}

/// Landing page the gateway redirects the payer to after checkout
async fn payment_success() -> Json<ApiResponse<serde_json::Value>> {
    Json(ApiResponse::success(serde_json::json!({
        "message": "Payment completed. Frontend coming soon."
    })))
}

/// Payment attempts recorded against a booking
async fn get_booking_payments(
    State(state): State<AppState>,
    Path(booking_id): Path<Uuid>,
    user: AuthenticatedUser,
) -> Result<Json<ApiResponse<Vec<PaymentResponse>>>, ServiceError> {
    let payments = state
        .services
        .payments
        .list_booking_payments(booking_id, &user)
        .await?;
    Ok(Json(ApiResponse::success(payments)))
}

/// Payment routes
pub fn payment_routes() -> Router<AppState> {
    Router::new()
        .route("/initiate/:booking_id", post(initiate_payment))
        .route("/verify/:tx_ref", get(verify_payment))
        .route("/success", get(payment_success))
        .route("/booking/:booking_id", get(get_booking_payments))
}
