use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::db::DbPool;
use crate::entities::listing::Entity as Listing;
use crate::entities::review::{self, Entity as Review};
use crate::errors::ServiceError;

#[derive(Debug, Clone, Deserialize)]
pub struct CreateReviewRequest {
    pub listing_id: Uuid,
    pub rating: i16,
    pub comment: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateReviewRequest {
    pub rating: Option<i16>,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewResponse {
    pub review_id: Uuid,
    pub listing_id: Uuid,
    pub user_id: Uuid,
    pub rating: i16,
    pub comment: String,
    pub created_at: chrono::DateTime<Utc>,
}

impl From<review::Model> for ReviewResponse {
    fn from(model: review::Model) -> Self {
        Self {
            review_id: model.id,
            listing_id: model.listing_id,
            user_id: model.user_id,
            rating: model.rating,
            comment: model.comment,
            created_at: model.created_at,
        }
    }
}

fn validate_rating(rating: i16) -> Result<(), ServiceError> {
    if !(1..=5).contains(&rating) {
        return Err(ServiceError::InvalidInput(
            "rating must be between 1 and 5".to_string(),
        ));
    }
    Ok(())
}

/// Guest reviews: one per (listing, user), author-gated mutation.
pub struct ReviewService {
    db: Arc<DbPool>,
}

impl ReviewService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    #[instrument(skip(self, request, user), fields(listing_id = %request.listing_id, user_id = %user.id))]
    pub async fn create_review(
        &self,
        request: CreateReviewRequest,
        user: &AuthenticatedUser,
    ) -> Result<ReviewResponse, ServiceError> {
        validate_rating(request.rating)?;

        Listing::find_by_id(request.listing_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Listing {} not found", request.listing_id))
            })?;

        let duplicate = Review::find()
            .filter(review::Column::ListingId.eq(request.listing_id))
            .filter(review::Column::UserId.eq(user.id))
            .one(&*self.db)
            .await?;
        if duplicate.is_some() {
            return Err(ServiceError::Conflict(
                "You've already reviewed this listing".to_string(),
            ));
        }

        let model = review::ActiveModel {
            id: Set(Uuid::new_v4()),
            listing_id: Set(request.listing_id),
            user_id: Set(user.id),
            rating: Set(request.rating),
            comment: Set(request.comment),
            created_at: Set(Utc::now()),
        };

        let created = model.insert(&*self.db).await?;
        Ok(created.into())
    }

    pub async fn list_for_listing(
        &self,
        listing_id: Uuid,
    ) -> Result<Vec<ReviewResponse>, ServiceError> {
        Listing::find_by_id(listing_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Listing {} not found", listing_id)))?;

        let rows = Review::find()
            .filter(review::Column::ListingId.eq(listing_id))
            .order_by_desc(review::Column::CreatedAt)
            .all(&*self.db)
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self, request, user), fields(%review_id, user_id = %user.id))]
    pub async fn update_review(
        &self,
        review_id: Uuid,
        request: UpdateReviewRequest,
        user: &AuthenticatedUser,
    ) -> Result<ReviewResponse, ServiceError> {
        let existing = Review::find_by_id(review_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Review {} not found", review_id)))?;

        if existing.user_id != user.id {
            return Err(ServiceError::Forbidden(
                "You can only edit your own review".to_string(),
            ));
        }

        if let Some(rating) = request.rating {
            validate_rating(rating)?;
        }

        let mut active: review::ActiveModel = existing.into();
        if let Some(rating) = request.rating {
            active.rating = Set(rating);
        }
        if let Some(comment) = request.comment {
            active.comment = Set(comment);
        }

        let updated = active.update(&*self.db).await?;
        Ok(updated.into())
    }

    #[instrument(skip(self, user), fields(%review_id, user_id = %user.id))]
    pub async fn delete_review(
        &self,
        review_id: Uuid,
        user: &AuthenticatedUser,
    ) -> Result<(), ServiceError> {
        let existing = Review::find_by_id(review_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Review {} not found", review_id)))?;

        if existing.user_id != user.id {
            return Err(ServiceError::Forbidden(
                "You can only delete your own review".to_string(),
            ));
        }

        Review::delete_by_id(review_id).exec(&*self.db).await?;
        Ok(())
    }
}
