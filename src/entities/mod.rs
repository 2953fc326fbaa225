pub mod booking;
pub mod listing;
pub mod payment;
pub mod review;

pub use booking::BookingStatus;
pub use payment::PaymentStatus;
