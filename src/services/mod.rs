pub mod bookings;
pub mod listings;
pub mod payments;
pub mod reviews;
