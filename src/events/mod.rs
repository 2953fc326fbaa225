use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

/// Domain events emitted by the booking and payment services.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Booking events
    BookingCreated(Uuid),
    BookingUpdated(Uuid),
    BookingCancelled(Uuid),
    BookingConfirmed(Uuid),

    // Payment events
    PaymentInitiated(Uuid),
    PaymentCompleted(Uuid),
    PaymentFailed(Uuid),
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}

/// Processes incoming events on a dedicated task, decoupled from request handling.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match event {
            Event::BookingCreated(booking_id) => {
                info!(%booking_id, "booking created");
            }
            Event::BookingUpdated(booking_id) => {
                info!(%booking_id, "booking dates updated");
            }
            Event::BookingCancelled(booking_id) => {
                info!(%booking_id, "booking canceled");
            }
            Event::BookingConfirmed(booking_id) => {
                info!(%booking_id, "booking confirmed");
            }
            Event::PaymentInitiated(payment_id) => {
                info!(%payment_id, "payment initiated");
            }
            Event::PaymentCompleted(payment_id) => {
                info!(%payment_id, "payment completed");
            }
            Event::PaymentFailed(payment_id) => {
                warn!(%payment_id, "payment failed");
            }
        }
    }

    warn!("Event processing loop has ended");
}
