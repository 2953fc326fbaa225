use crate::auth::AuthenticatedUser;
use crate::errors::ServiceError;
use crate::handlers::AppState;
use crate::services::listings::{CreateListingRequest, ListingResponse, UpdateListingRequest};
use crate::services::reviews::ReviewResponse;
use crate::ApiResponse;
use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    routing::{get, post},
    Router,
};
use uuid::Uuid;

async fn create_listing(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(request): Json<CreateListingRequest>,
) -> Result<(StatusCode, Json<ApiResponse<ListingResponse>>), ServiceError> {
    let listing = state.services.listings.create_listing(request, &user).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(listing))))
}

async fn list_listings(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<ListingResponse>>>, ServiceError> {
    let listings = state.services.listings.list_listings().await?;
    Ok(Json(ApiResponse::success(listings)))
}

async fn get_listing(
    State(state): State<AppState>,
    Path(listing_id): Path<Uuid>,
) -> Result<Json<ApiResponse<ListingResponse>>, ServiceError> {
    let listing = state.services.listings.get_listing(listing_id).await?;
    Ok(Json(ApiResponse::success(listing)))
}

async fn update_listing(
    State(state): State<AppState>,
    Path(listing_id): Path<Uuid>,
    user: AuthenticatedUser,
    Json(request): Json<UpdateListingRequest>,
) -> Result<Json<ApiResponse<ListingResponse>>, ServiceError> {
    let listing = state
        .services
        .listings
        .update_listing(listing_id, request, &user)
        .await?;
    Ok(Json(ApiResponse::success(listing)))
}

async fn delete_listing(
    State(state): State<AppState>,
    Path(listing_id): Path<Uuid>,
    user: AuthenticatedUser,
) -> Result<StatusCode, ServiceError> {
    state
        .services
        .listings
        .delete_listing(listing_id, &user)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Reviews posted against a listing
async fn get_listing_reviews(
    State(state): State<AppState>,
    Path(listing_id): Path<Uuid>,
) -> Result<Json<ApiResponse<Vec<ReviewResponse>>>, ServiceError> {
    let reviews = state.services.reviews.list_for_listing(listing_id).await?;
    Ok(Json(ApiResponse::success(reviews)))
}

/// Listing routes
pub fn listing_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_listing).get(list_listings))
        .route(
            "/:listing_id",
            get(get_listing)
                .put(update_listing)
                .delete(delete_listing),
        )
        .route("/:listing_id/reviews", get(get_listing_reviews))
}
