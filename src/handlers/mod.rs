pub mod bookings;
pub mod listings;
pub mod payments;
pub mod reviews;

use std::sync::Arc;

use crate::config::AppConfig;
use crate::db::DbPool;
use crate::events::EventSender;
use crate::gateway::PaymentGateway;
use crate::notifications::NotificationDispatcher;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub listings: Arc<crate::services::listings::ListingService>,
    pub bookings: Arc<crate::services::bookings::BookingService>,
    pub reviews: Arc<crate::services::reviews::ReviewService>,
    pub payments: Arc<crate::services::payments::PaymentService>,
}

impl AppServices {
    pub fn new(
        db: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        gateway: Arc<dyn PaymentGateway>,
        dispatcher: NotificationDispatcher,
        config: AppConfig,
    ) -> Self {
        let listings = Arc::new(crate::services::listings::ListingService::new(db.clone()));
        let bookings = Arc::new(crate::services::bookings::BookingService::new(
            db.clone(),
            event_sender.clone(),
        ));
        let reviews = Arc::new(crate::services::reviews::ReviewService::new(db.clone()));
        let payments = Arc::new(crate::services::payments::PaymentService::new(
            db,
            gateway,
            dispatcher,
            event_sender,
            config,
        ));

        Self {
            listings,
            bookings,
            reviews,
            payments,
        }
    }
}
