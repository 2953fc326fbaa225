use crate::auth::AuthenticatedUser;
use crate::errors::ServiceError;
use crate::handlers::AppState;
use crate::services::reviews::{CreateReviewRequest, ReviewResponse, UpdateReviewRequest};
use crate::ApiResponse;
use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    routing::{post, put},
    Router,
};
use uuid::Uuid;

async fn create_review(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(request): Json<CreateReviewRequest>,
) -> Result<(StatusCode, Json<ApiResponse<ReviewResponse>>), ServiceError> {
    let review = state.services.reviews.create_review(request, &user).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(review))))
}

async fn update_review(
    State(state): State<AppState>,
    Path(review_id): Path<Uuid>,
    user: AuthenticatedUser,
    Json(request): Json<UpdateReviewRequest>,
) -> Result<Json<ApiResponse<ReviewResponse>>, ServiceError> {
    let review = state
        .services
        .reviews
        .update_review(review_id, request, &user)
        .await?;
    Ok(Json(ApiResponse::success(review)))
}

async fn delete_review(
    State(state): State<AppState>,
    Path(review_id): Path<Uuid>,
    user: AuthenticatedUser,
) -> Result<StatusCode, ServiceError> {
    state.services.reviews.delete_review(review_id, &user).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Review routes
pub fn review_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_review))
        .route("/:review_id", put(update_review).delete(delete_review))
}
