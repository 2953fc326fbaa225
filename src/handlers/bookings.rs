use crate::auth::AuthenticatedUser;
use crate::errors::ServiceError;
use crate::handlers::AppState;
use crate::services::bookings::{BookingResponse, CreateBookingRequest, UpdateBookingRequest};
use crate::ApiResponse;
use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    routing::{get, post},
    Router,
};
use uuid::Uuid;

/// Create a booking for a listing over a half-open date range
async fn create_booking(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(request): Json<CreateBookingRequest>,
) -> Result<(StatusCode, Json<ApiResponse<BookingResponse>>), ServiceError> {
    let booking = state.services.bookings.create_booking(request, &user).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(booking))))
}

async fn list_bookings(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<ApiResponse<Vec<BookingResponse>>>, ServiceError> {
    let bookings = state.services.bookings.list_bookings(&user).await?;
    Ok(Json(ApiResponse::success(bookings)))
}

async fn get_booking(
    State(state): State<AppState>,
    Path(booking_id): Path<Uuid>,
    user: AuthenticatedUser,
) -> Result<Json<ApiResponse<BookingResponse>>, ServiceError> {
    let booking = state.services.bookings.get_booking(booking_id, &user).await?;
    Ok(Json(ApiResponse::success(booking)))
}

/// Update booking dates; the overlap invariant is re-validated
async fn update_booking(
    State(state): State<AppState>,
    Path(booking_id): Path<Uuid>,
    user: AuthenticatedUser,
    Json(request): Json<UpdateBookingRequest>,
) -> Result<Json<ApiResponse<BookingResponse>>, ServiceError> {
    let booking = state
        .services
        .bookings
        .update_booking(booking_id, request, &user)
        .await?;
    Ok(Json(ApiResponse::success(booking)))
}

async fn cancel_booking(
    State(state): State<AppState>,
    Path(booking_id): Path<Uuid>,
    user: AuthenticatedUser,
) -> Result<Json<ApiResponse<BookingResponse>>, ServiceError> {
    let booking = state
        .services
        .bookings
        .cancel_booking(booking_id, &user)
        .await?;
    Ok(Json(ApiResponse::success(booking)))
}

async fn delete_booking(
    State(state): State<AppState>,
    Path(booking_id): Path<Uuid>,
    user: AuthenticatedUser,
) -> Result<StatusCode, ServiceError> {
    state
        .services
        .bookings
        .delete_booking(booking_id, &user)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Booking routes
pub fn booking_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_booking).get(list_bookings))
        .route(
            "/:booking_id",
            get(get_booking)
                .put(update_booking)
                .patch(update_booking)
                .delete(delete_booking),
        )
        .route("/:booking_id/cancel", post(cancel_booking))
}
