use chrono::{NaiveDate, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::db::DbPool;
use crate::entities::booking::{self, BookingStatus, Entity as Booking};
use crate::entities::listing::{self, Entity as Listing};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};

/// Half-open interval intersection: `[s1, e1)` and `[s2, e2)` overlap iff
/// `s1 < e2 && s2 < e1`. A stay ending on day D never conflicts with one
/// starting on day D.
///
/// The conflict queries in [`BookingService::create_booking`] and
/// [`BookingService::update_booking`] encode this same predicate as SQL
/// filters (`StartDate.lt(end)` and `EndDate.gt(start)`); the two must stay
/// in lockstep.
pub fn intervals_overlap(s1: NaiveDate, e1: NaiveDate, s2: NaiveDate, e2: NaiveDate) -> bool {
    s1 < e2 && s2 < e1
}

/// Price of a stay: whole nights times the listing's nightly rate.
pub fn stay_total_price(price_per_night: Decimal, start: NaiveDate, end: NaiveDate) -> Decimal {
    let nights = (end - start).num_days();
    price_per_night * Decimal::from(nights)
}

/// Request to reserve a listing for a date range
#[derive(Debug, Clone, Deserialize)]
pub struct CreateBookingRequest {
    pub listing_id: Uuid,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

/// Request to move an existing booking to new dates
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateBookingRequest {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

/// Response for a booking
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingResponse {
    pub booking_id: Uuid,
    pub listing_id: Uuid,
    pub user_id: Uuid,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub total_price: Decimal,
    pub status: BookingStatus,
    pub created_at: chrono::DateTime<Utc>,
}

impl From<booking::Model> for BookingResponse {
    fn from(model: booking::Model) -> Self {
        Self {
            booking_id: model.id,
            listing_id: model.listing_id,
            user_id: model.user_id,
            start_date: model.start_date,
            end_date: model.end_date,
            total_price: model.total_price,
            status: model.status,
            created_at: model.created_at,
        }
    }
}

/// Guards the no-double-booking invariant and owns booking lifecycle writes.
///
/// The overlap check and the booking write are serialized per listing: the
/// check-then-write sequence runs inside a database transaction while holding
/// that listing's mutex, so two concurrent proposals for conflicting intervals
/// cannot both commit.
pub struct BookingService {
    db: Arc<DbPool>,
    event_sender: Arc<EventSender>,
    listing_locks: DashMap<Uuid, Arc<Mutex<()>>>,
}

impl BookingService {
    pub fn new(db: Arc<DbPool>, event_sender: Arc<EventSender>) -> Self {
        Self {
            db,
            event_sender,
            listing_locks: DashMap::new(),
        }
    }

    fn listing_lock(&self, listing_id: Uuid) -> Arc<Mutex<()>> {
        self.listing_locks
            .entry(listing_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn validate_range(start: NaiveDate, end: NaiveDate) -> Result<(), ServiceError> {
        if start >= end {
            return Err(ServiceError::InvalidInput(
                "end_date must be after start_date (minimum one-night stay)".to_string(),
            ));
        }
        Ok(())
    }

    /// Propose a new booking; rejects intersecting non-canceled bookings.
    #[instrument(skip(self, user), fields(listing_id = %request.listing_id, user_id = %user.id))]
    pub async fn create_booking(
        &self,
        request: CreateBookingRequest,
        user: &AuthenticatedUser,
    ) -> Result<BookingResponse, ServiceError> {
        Self::validate_range(request.start_date, request.end_date)?;

        let lock = self.listing_lock(request.listing_id);
        let _guard = lock.lock().await;

        let txn = self.db.begin().await?;

        let listing = Listing::find_by_id(request.listing_id)
            .one(&txn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Listing {} not found", request.listing_id))
            })?;

        let conflicting = Booking::find()
            .filter(booking::Column::ListingId.eq(request.listing_id))
            .filter(booking::Column::Status.ne(BookingStatus::Canceled))
            .filter(booking::Column::StartDate.lt(request.end_date))
            .filter(booking::Column::EndDate.gt(request.start_date))
            .count(&txn)
            .await?;

        if conflicting > 0 {
            return Err(ServiceError::Conflict(
                "This listing is already booked for the selected dates".to_string(),
            ));
        }

        let total_price =
            stay_total_price(listing.price_per_night, request.start_date, request.end_date);

        let model = booking::ActiveModel {
            id: Set(Uuid::new_v4()),
            listing_id: Set(request.listing_id),
            user_id: Set(user.id),
            start_date: Set(request.start_date),
            end_date: Set(request.end_date),
            total_price: Set(total_price),
            status: Set(BookingStatus::Pending),
            created_at: Set(Utc::now()),
        };

        let created = model.insert(&txn).await?;
        txn.commit().await?;

        info!(booking_id = %created.id, %total_price, "booking created");
        if let Err(e) = self.event_sender.send(Event::BookingCreated(created.id)).await {
            tracing::warn!(error = %e, "failed to publish booking created event");
        }

        Ok(created.into())
    }

    /// Move a booking to new dates, re-running the overlap check against every
    /// other live booking and recomputing the total price.
    #[instrument(skip(self, user), fields(%booking_id, user_id = %user.id))]
    pub async fn update_booking(
        &self,
        booking_id: Uuid,
        request: UpdateBookingRequest,
        user: &AuthenticatedUser,
    ) -> Result<BookingResponse, ServiceError> {
        Self::validate_range(request.start_date, request.end_date)?;

        let existing = Booking::find_by_id(booking_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Booking {} not found", booking_id)))?;

        if existing.user_id != user.id && !user.is_staff {
            return Err(ServiceError::Forbidden(
                "You can only modify your own bookings".to_string(),
            ));
        }

        let lock = self.listing_lock(existing.listing_id);
        let _guard = lock.lock().await;

        let txn = self.db.begin().await?;

        let listing = Listing::find_by_id(existing.listing_id)
            .one(&txn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Listing {} not found", existing.listing_id))
            })?;

        // Same overlap test as creation, excluding the booking's own row.
        let conflicting = Booking::find()
            .filter(booking::Column::ListingId.eq(existing.listing_id))
            .filter(booking::Column::Id.ne(booking_id))
            .filter(booking::Column::Status.ne(BookingStatus::Canceled))
            .filter(booking::Column::StartDate.lt(request.end_date))
            .filter(booking::Column::EndDate.gt(request.start_date))
            .count(&txn)
            .await?;

        if conflicting > 0 {
            return Err(ServiceError::Conflict(
                "This listing is already booked for the selected dates".to_string(),
            ));
        }

        let total_price =
            stay_total_price(listing.price_per_night, request.start_date, request.end_date);

        let mut active: booking::ActiveModel = existing.into();
        active.start_date = Set(request.start_date);
        active.end_date = Set(request.end_date);
        active.total_price = Set(total_price);

        let updated = active.update(&txn).await?;
        txn.commit().await?;

        if let Err(e) = self.event_sender.send(Event::BookingUpdated(updated.id)).await {
            tracing::warn!(error = %e, "failed to publish booking updated event");
        }

        Ok(updated.into())
    }

    /// Cancel a booking, releasing its interval for other guests.
    #[instrument(skip(self, user), fields(%booking_id, user_id = %user.id))]
    pub async fn cancel_booking(
        &self,
        booking_id: Uuid,
        user: &AuthenticatedUser,
    ) -> Result<BookingResponse, ServiceError> {
        let existing = Booking::find_by_id(booking_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Booking {} not found", booking_id)))?;

        if existing.user_id != user.id && !user.is_staff {
            return Err(ServiceError::Forbidden(
                "You can only cancel your own bookings".to_string(),
            ));
        }

        if !existing.status.can_transition_to(BookingStatus::Canceled) {
            return Err(ServiceError::InvalidOperation(format!(
                "Booking in status {:?} cannot be canceled",
                existing.status
            )));
        }

        let mut active: booking::ActiveModel = existing.into();
        active.status = Set(BookingStatus::Canceled);
        let updated = active.update(&*self.db).await?;

        if let Err(e) = self
            .event_sender
            .send(Event::BookingCancelled(updated.id))
            .await
        {
            tracing::warn!(error = %e, "failed to publish booking cancelled event");
        }

        Ok(updated.into())
    }

    pub async fn get_booking(
        &self,
        booking_id: Uuid,
        user: &AuthenticatedUser,
    ) -> Result<BookingResponse, ServiceError> {
        let found = Booking::find_by_id(booking_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Booking {} not found", booking_id)))?;

        if found.user_id != user.id && !user.is_staff {
            return Err(ServiceError::Forbidden(
                "You can only view your own bookings".to_string(),
            ));
        }

        Ok(found.into())
    }

    /// Staff principals see every booking; guests see only their own.
    pub async fn list_bookings(
        &self,
        user: &AuthenticatedUser,
    ) -> Result<Vec<BookingResponse>, ServiceError> {
        let mut query = Booking::find().order_by_asc(booking::Column::StartDate);
        if !user.is_staff {
            query = query.filter(booking::Column::UserId.eq(user.id));
        }

        let rows = query.all(&*self.db).await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Remove a booking entirely; payment attempts go with it (cascade).
    #[instrument(skip(self, user), fields(%booking_id, user_id = %user.id))]
    pub async fn delete_booking(
        &self,
        booking_id: Uuid,
        user: &AuthenticatedUser,
    ) -> Result<(), ServiceError> {
        let existing = Booking::find_by_id(booking_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Booking {} not found", booking_id)))?;

        if existing.user_id != user.id && !user.is_staff {
            return Err(ServiceError::Forbidden(
                "You can only delete your own bookings".to_string(),
            ));
        }

        Booking::delete_by_id(booking_id).exec(&*self.db).await?;
        Ok(())
    }
}
