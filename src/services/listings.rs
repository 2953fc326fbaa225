use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;
use validator::Validate;

use crate::auth::AuthenticatedUser;
use crate::db::DbPool;
use crate::entities::listing::{self, Entity as Listing};
use crate::entities::review::{self, Entity as Review};
use crate::errors::ServiceError;

/// Request to publish a listing
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateListingRequest {
    #[validate(length(min = 1, max = 50))]
    pub name: String,
    #[validate(length(min = 1))]
    pub description: String,
    #[validate(length(min = 1, max = 50))]
    pub location: String,
    pub price_per_night: Decimal,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpdateListingRequest {
    #[validate(length(min = 1, max = 50))]
    pub name: Option<String>,
    pub description: Option<String>,
    #[validate(length(min = 1, max = 50))]
    pub location: Option<String>,
    pub price_per_night: Option<Decimal>,
}

/// Response for a listing, with the rating aggregate derived at read time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingResponse {
    pub listing_id: Uuid,
    pub host_id: Uuid,
    pub name: String,
    pub description: String,
    pub location: String,
    pub price_per_night: Decimal,
    pub average_rating: Option<f64>,
    pub created_at: chrono::DateTime<Utc>,
}

impl ListingResponse {
    fn from_model(model: listing::Model, average_rating: Option<f64>) -> Self {
        Self {
            listing_id: model.id,
            host_id: model.host_id,
            name: model.name,
            description: model.description,
            location: model.location,
            price_per_night: model.price_per_night,
            average_rating,
            created_at: model.created_at,
        }
    }
}

/// Thin record store for rentable units; the booking core only reads from it.
pub struct ListingService {
    db: Arc<DbPool>,
}

impl ListingService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    async fn average_rating(&self, listing_id: Uuid) -> Result<Option<f64>, ServiceError> {
        let ratings: Vec<i16> = Review::find()
            .filter(review::Column::ListingId.eq(listing_id))
            .all(&*self.db)
            .await?
            .into_iter()
            .map(|r| r.rating)
            .collect();

        if ratings.is_empty() {
            return Ok(None);
        }

        let avg = ratings.iter().map(|r| *r as f64).sum::<f64>() / ratings.len() as f64;
        Ok(Some((avg * 10.0).round() / 10.0))
    }

    #[instrument(skip(self, request, user), fields(host_id = %user.id))]
    pub async fn create_listing(
        &self,
        request: CreateListingRequest,
        user: &AuthenticatedUser,
    ) -> Result<ListingResponse, ServiceError> {
        request.validate()?;

        if request.price_per_night <= Decimal::ZERO {
            return Err(ServiceError::InvalidInput(
                "price_per_night must be greater than 0".to_string(),
            ));
        }

        let model = listing::ActiveModel {
            id: Set(Uuid::new_v4()),
            host_id: Set(user.id),
            name: Set(request.name),
            description: Set(request.description),
            location: Set(request.location),
            price_per_night: Set(request.price_per_night),
            created_at: Set(Utc::now()),
            updated_at: Set(None),
        };

        let created = model.insert(&*self.db).await?;
        Ok(ListingResponse::from_model(created, None))
    }

    pub async fn get_listing(&self, listing_id: Uuid) -> Result<ListingResponse, ServiceError> {
        let found = Listing::find_by_id(listing_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Listing {} not found", listing_id)))?;

        let rating = self.average_rating(listing_id).await?;
        Ok(ListingResponse::from_model(found, rating))
    }

    pub async fn list_listings(&self) -> Result<Vec<ListingResponse>, ServiceError> {
        let rows = Listing::find()
            .order_by_asc(listing::Column::CreatedAt)
            .all(&*self.db)
            .await?;

        let mut responses = Vec::with_capacity(rows.len());
        for row in rows {
            let rating = self.average_rating(row.id).await?;
            responses.push(ListingResponse::from_model(row, rating));
        }
        Ok(responses)
    }

    #[instrument(skip(self, request, user), fields(%listing_id, host_id = %user.id))]
    pub async fn update_listing(
        &self,
        listing_id: Uuid,
        request: UpdateListingRequest,
        user: &AuthenticatedUser,
    ) -> Result<ListingResponse, ServiceError> {
        request.validate()?;

        let existing = Listing::find_by_id(listing_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Listing {} not found", listing_id)))?;

        if existing.host_id != user.id && !user.is_staff {
            return Err(ServiceError::Forbidden(
                "You can only edit your own listings".to_string(),
            ));
        }

        if let Some(price) = request.price_per_night {
            if price <= Decimal::ZERO {
                return Err(ServiceError::InvalidInput(
                    "price_per_night must be greater than 0".to_string(),
                ));
            }
        }

        let mut active: listing::ActiveModel = existing.into();
        if let Some(name) = request.name {
            active.name = Set(name);
        }
        if let Some(description) = request.description {
            active.description = Set(description);
        }
        if let Some(location) = request.location {
            active.location = Set(location);
        }
        if let Some(price) = request.price_per_night {
            active.price_per_night = Set(price);
        }
        active.updated_at = Set(Some(Utc::now()));

        let updated = active.update(&*self.db).await?;
        let rating = self.average_rating(listing_id).await?;
        Ok(ListingResponse::from_model(updated, rating))
    }

    /// Removes the listing; bookings and their payments cascade away with it.
    #[instrument(skip(self, user), fields(%listing_id, host_id = %user.id))]
    pub async fn delete_listing(
        &self,
        listing_id: Uuid,
        user: &AuthenticatedUser,
    ) -> Result<(), ServiceError> {
        let existing = Listing::find_by_id(listing_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Listing {} not found", listing_id)))?;

        if existing.host_id != user.id && !user.is_staff {
            return Err(ServiceError::Forbidden(
                "You can only delete your own listings".to_string(),
            ));
        }

        Listing::delete_by_id(listing_id).exec(&*self.db).await?;
        Ok(())
    }
}
