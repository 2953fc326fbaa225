use chrono::Utc;
use dashmap::DashMap;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::config::AppConfig;
use crate::db::DbPool;
use crate::entities::booking::{self, BookingStatus, Entity as Booking};
use crate::entities::listing::Entity as Listing;
use crate::entities::payment::{self, Entity as Payment, PaymentStatus};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::gateway::{Customization, InitializeRequest, PaymentGateway};
use crate::notifications::{Notification, NotificationDispatcher};

/// Returned by a successful initiation; the guest finishes checkout at the URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitiatePaymentResponse {
    pub checkout_url: String,
    pub tx_ref: String,
}

/// Result of a verification call, whether freshly resolved or replayed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationOutcome {
    pub tx_ref: String,
    pub status: PaymentStatus,
    /// True when a previous call had already driven the payment to a terminal
    /// state and this invocation only reported the recorded outcome.
    pub already_resolved: bool,
}

/// Response for a payment record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentResponse {
    pub payment_id: Uuid,
    pub booking_id: Uuid,
    pub tx_ref: String,
    pub amount: rust_decimal::Decimal,
    pub status: PaymentStatus,
    pub checkout_url: Option<String>,
    pub created_at: chrono::DateTime<Utc>,
}

impl From<payment::Model> for PaymentResponse {
    fn from(model: payment::Model) -> Self {
        Self {
            payment_id: model.id,
            booking_id: model.booking_id,
            tx_ref: model.tx_ref,
            amount: model.amount,
            status: model.status,
            checkout_url: model.checkout_url,
            created_at: model.created_at,
        }
    }
}

/// Owns payment lifecycle transitions: pending at initiation, then exactly one
/// move to completed or failed by verification. Terminal states are sticky;
/// duplicate webhook deliveries and poll retries replay the recorded outcome.
pub struct PaymentService {
    db: Arc<DbPool>,
    gateway: Arc<dyn PaymentGateway>,
    dispatcher: NotificationDispatcher,
    event_sender: Arc<EventSender>,
    config: AppConfig,
    tx_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl PaymentService {
    pub fn new(
        db: Arc<DbPool>,
        gateway: Arc<dyn PaymentGateway>,
        dispatcher: NotificationDispatcher,
        event_sender: Arc<EventSender>,
        config: AppConfig,
    ) -> Self {
        Self {
            db,
            gateway,
            dispatcher,
            event_sender,
            config,
            tx_locks: DashMap::new(),
        }
    }

    fn tx_lock(&self, tx_ref: &str) -> Arc<Mutex<()>> {
        self.tx_locks
            .entry(tx_ref.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Lock entries currently held for in-flight verifications. Entries are
    /// removed once their payment reaches a terminal state, so this stays
    /// bounded by concurrent verification traffic, not by payment history.
    pub fn verification_locks_in_flight(&self) -> usize {
        self.tx_locks.len()
    }

    /// Start a checkout for a booking.
    ///
    /// A fresh tx_ref is minted per attempt; nothing is persisted unless the
    /// gateway accepts the initiation, so a retry after rejection or an
    /// unreachable gateway simply mints a new reference.
    #[instrument(skip(self, user), fields(%booking_id, user_id = %user.id))]
    pub async fn initiate_payment(
        &self,
        booking_id: Uuid,
        user: &AuthenticatedUser,
    ) -> Result<InitiatePaymentResponse, ServiceError> {
        let (booking, listing) = Booking::find_by_id(booking_id)
            .find_also_related(Listing)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Booking {} not found", booking_id)))?;

        if booking.user_id != user.id {
            return Err(ServiceError::Forbidden(
                "You can only pay for your own bookings".to_string(),
            ));
        }

        let already_paid = Payment::find()
            .filter(payment::Column::BookingId.eq(booking_id))
            .filter(payment::Column::Status.eq(PaymentStatus::Completed))
            .one(&*self.db)
            .await?;
        if already_paid.is_some() {
            return Err(ServiceError::Conflict(
                "Booking is already fully paid".to_string(),
            ));
        }

        let tx_ref = Uuid::new_v4().to_string();
        let listing_name = listing
            .map(|l| l.name)
            .unwrap_or_else(|| "your stay".to_string());

        let init_request = InitializeRequest {
            amount: booking.total_price,
            currency: self.config.gateway.currency.clone(),
            email: user.email.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            tx_ref: tx_ref.clone(),
            callback_url: self.config.verify_callback_url(&tx_ref),
            return_url: self.config.return_url.clone(),
            customization: Customization {
                title: format!("Payment for Booking {}", booking.id),
                description: format!("Payment for {}", listing_name),
            },
        };

        // Network call happens before any state is written; no lock is held.
        let initialized = self.gateway.initialize(init_request).await?;

        let now = Utc::now();
        let model = payment::ActiveModel {
            id: Set(Uuid::new_v4()),
            booking_id: Set(booking.id),
            user_id: Set(user.id),
            payer_email: Set(user.email.clone()),
            tx_ref: Set(tx_ref.clone()),
            amount: Set(booking.total_price),
            status: Set(PaymentStatus::Pending),
            checkout_url: Set(Some(initialized.checkout_url.clone())),
            created_at: Set(now),
            updated_at: Set(Some(now)),
        };
        let created = model.insert(&*self.db).await?;

        self.dispatcher.enqueue(Notification::PaymentReminder {
            recipient: user.email.clone(),
            checkout_url: initialized.checkout_url.clone(),
        });

        info!(payment_id = %created.id, %tx_ref, "payment initiated");
        if let Err(e) = self
            .event_sender
            .send(Event::PaymentInitiated(created.id))
            .await
        {
            warn!(error = %e, "failed to publish payment initiated event");
        }

        Ok(InitiatePaymentResponse {
            checkout_url: initialized.checkout_url,
            tx_ref,
        })
    }

    /// Verify a payment attempt against the gateway and record the outcome.
    ///
    /// Safe to call repeatedly for the same reference: once the payment is
    /// terminal the recorded outcome is returned without another gateway call
    /// or a duplicate notification. An unreachable gateway leaves the payment
    /// pending and surfaces `GatewayUnavailable` for a later retry.
    #[instrument(skip(self))]
    pub async fn verify_payment(&self, tx_ref: &str) -> Result<VerificationOutcome, ServiceError> {
        let existing = self.find_by_tx_ref(tx_ref).await?;

        if existing.status != PaymentStatus::Pending {
            return Ok(VerificationOutcome {
                tx_ref: tx_ref.to_string(),
                status: existing.status,
                already_resolved: true,
            });
        }

        // Remote verification runs outside any lock so gateway latency never
        // serializes unrelated requests behind this reference.
        let verification = self.gateway.verify(tx_ref).await?;

        let lock = self.tx_lock(tx_ref);
        let _guard = lock.lock().await;

        let txn = self.db.begin().await?;

        // Re-read under the lock; a concurrent verifier may have won the race.
        let current = Payment::find()
            .filter(payment::Column::TxRef.eq(tx_ref))
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Payment {} not found", tx_ref)))?;

        if current.status != PaymentStatus::Pending {
            drop(_guard);
            self.tx_locks.remove(tx_ref);
            return Ok(VerificationOutcome {
                tx_ref: tx_ref.to_string(),
                status: current.status,
                already_resolved: true,
            });
        }

        let amount_matches = verification
            .amount
            .map(|echoed| echoed == current.amount)
            .unwrap_or(true);
        let succeeded = verification.success && amount_matches;

        let payment_id = current.id;
        let booking_id = current.booking_id;
        let payer_email = current.payer_email.clone();
        let next_status = if succeeded {
            PaymentStatus::Completed
        } else {
            PaymentStatus::Failed
        };

        let mut active: payment::ActiveModel = current.into();
        active.status = Set(next_status);
        active.updated_at = Set(Some(Utc::now()));
        active.update(&txn).await?;

        if succeeded {
            // Successful payment confirms the booking in the same transaction.
            if let Some(booked) = Booking::find_by_id(booking_id).one(&txn).await? {
                if booked.status.can_transition_to(BookingStatus::Confirmed) {
                    let mut confirm: booking::ActiveModel = booked.into();
                    confirm.status = Set(BookingStatus::Confirmed);
                    confirm.update(&txn).await?;
                }
            }
        }

        txn.commit().await?;

        // The payment is terminal now; its lock entry can never matter again.
        // tx_refs are freshly minted per attempt, so a retained entry would
        // leak for the lifetime of the service.
        drop(_guard);
        self.tx_locks.remove(tx_ref);

        if succeeded {
            info!(%payment_id, %tx_ref, "payment verified as completed");
            self.dispatcher.enqueue(Notification::PaymentConfirmation {
                recipient: payer_email,
                booking_id,
            });
            if let Err(e) = self
                .event_sender
                .send(Event::PaymentCompleted(payment_id))
                .await
            {
                warn!(error = %e, "failed to publish payment completed event");
            }
            if let Err(e) = self
                .event_sender
                .send(Event::BookingConfirmed(booking_id))
                .await
            {
                warn!(error = %e, "failed to publish booking confirmed event");
            }
        } else {
            if !amount_matches {
                warn!(%payment_id, %tx_ref, "gateway echoed a different amount; marking failed");
            } else {
                info!(%payment_id, %tx_ref, "payment verification failed");
            }
            if let Err(e) = self
                .event_sender
                .send(Event::PaymentFailed(payment_id))
                .await
            {
                warn!(error = %e, "failed to publish payment failed event");
            }
        }

        Ok(VerificationOutcome {
            tx_ref: tx_ref.to_string(),
            status: next_status,
            already_resolved: false,
        })
    }

    pub async fn get_payment(&self, tx_ref: &str) -> Result<PaymentResponse, ServiceError> {
        Ok(self.find_by_tx_ref(tx_ref).await?.into())
    }

    /// All attempts recorded against a booking, newest first.
    pub async fn list_booking_payments(
        &self,
        booking_id: Uuid,
        user: &AuthenticatedUser,
    ) -> Result<Vec<PaymentResponse>, ServiceError> {
        let booking = Booking::find_by_id(booking_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Booking {} not found", booking_id)))?;

        if booking.user_id != user.id && !user.is_staff {
            return Err(ServiceError::Forbidden(
                "You can only view payments for your own bookings".to_string(),
            ));
        }

        let rows = Payment::find()
            .filter(payment::Column::BookingId.eq(booking_id))
            .order_by_desc(payment::Column::CreatedAt)
            .all(&*self.db)
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn find_by_tx_ref(&self, tx_ref: &str) -> Result<payment::Model, ServiceError> {
        Payment::find()
            .filter(payment::Column::TxRef.eq(tx_ref))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Payment {} not found", tx_ref)))
    }
}
