mod common;

use axum::http::{Method, StatusCode};
use chrono::NaiveDate;
use rust_decimal_macros::dec;
use serde_json::json;

use common::{guest, seed_listing, staff, TestApp};
use travelnest_api::errors::ServiceError;
use travelnest_api::services::bookings::{CreateBookingRequest, UpdateBookingRequest};

fn d(s: &str) -> NaiveDate {
    s.parse().unwrap()
}

#[tokio::test]
async fn overlapping_booking_is_rejected_with_conflict() {
    let app = TestApp::new().await;
    let host = staff();
    let listing_id = seed_listing(&app, &host, dec!(100)).await;

    let alice = guest("alice@example.com");
    let bob = guest("bob@example.com");

    app.state
        .services
        .bookings
        .create_booking(
            CreateBookingRequest {
                listing_id,
                start_date: d("2026-09-01"),
                end_date: d("2026-09-05"),
            },
            &alice,
        )
        .await
        .expect("first booking");

    let err = app
        .state
        .services
        .bookings
        .create_booking(
            CreateBookingRequest {
                listing_id,
                start_date: d("2026-09-04"),
                end_date: d("2026-09-08"),
            },
            &bob,
        )
        .await
        .expect_err("intruding one night must be rejected");
    assert!(matches!(err, ServiceError::Conflict(_)), "got {err:?}");
}

#[tokio::test]
async fn back_to_back_stays_share_a_boundary_day() {
    let app = TestApp::new().await;
    let listing_id = seed_listing(&app, &staff(), dec!(100)).await;

    let alice = guest("alice@example.com");
    let bob = guest("bob@example.com");

    app.state
        .services
        .bookings
        .create_booking(
            CreateBookingRequest {
                listing_id,
                start_date: d("2026-09-01"),
                end_date: d("2026-09-05"),
            },
            &alice,
        )
        .await
        .expect("first booking");

    // Checkout day doubles as the next guest's check-in day.
    let second = app
        .state
        .services
        .bookings
        .create_booking(
            CreateBookingRequest {
                listing_id,
                start_date: d("2026-09-05"),
                end_date: d("2026-09-09"),
            },
            &bob,
        )
        .await
        .expect("back-to-back booking must be allowed");
    assert_eq!(second.total_price, dec!(400));
}

#[tokio::test]
async fn canceled_bookings_release_their_dates() {
    let app = TestApp::new().await;
    let listing_id = seed_listing(&app, &staff(), dec!(80)).await;

    let alice = guest("alice@example.com");
    let first = app
        .state
        .services
        .bookings
        .create_booking(
            CreateBookingRequest {
                listing_id,
                start_date: d("2026-10-01"),
                end_date: d("2026-10-04"),
            },
            &alice,
        )
        .await
        .expect("first booking");

    app.state
        .services
        .bookings
        .cancel_booking(first.booking_id, &alice)
        .await
        .expect("cancel");

    let bob = guest("bob@example.com");
    app.state
        .services
        .bookings
        .create_booking(
            CreateBookingRequest {
                listing_id,
                start_date: d("2026-10-01"),
                end_date: d("2026-10-04"),
            },
            &bob,
        )
        .await
        .expect("canceled dates must be rebookable");
}

#[tokio::test]
async fn degenerate_and_inverted_ranges_are_rejected() {
    let app = TestApp::new().await;
    let listing_id = seed_listing(&app, &staff(), dec!(50)).await;
    let alice = guest("alice@example.com");

    for (start, end) in [("2026-11-01", "2026-11-01"), ("2026-11-05", "2026-11-01")] {
        let err = app
            .state
            .services
            .bookings
            .create_booking(
                CreateBookingRequest {
                    listing_id,
                    start_date: d(start),
                    end_date: d(end),
                },
                &alice,
            )
            .await
            .expect_err("zero-night or inverted range must fail");
        assert!(matches!(err, ServiceError::InvalidInput(_)), "got {err:?}");
    }
}

#[tokio::test]
async fn concurrent_proposals_for_the_same_dates_commit_exactly_one() {
    let app = TestApp::new().await;
    let listing_id = seed_listing(&app, &staff(), dec!(100)).await;

    let mut attempts = Vec::new();
    for i in 0..8 {
        let svc = app.state.services.bookings.clone();
        let user = guest(&format!("guest{i}@example.com"));
        attempts.push(async move {
            svc.create_booking(
                CreateBookingRequest {
                    listing_id,
                    start_date: d("2026-12-20"),
                    end_date: d("2026-12-27"),
                },
                &user,
            )
            .await
            .is_ok()
        });
    }

    let successes = futures::future::join_all(attempts)
        .await
        .into_iter()
        .filter(|committed| *committed)
        .count();
    assert_eq!(
        successes, 1,
        "exactly one of the racing bookings should commit; got {}",
        successes
    );
}

#[tokio::test]
async fn update_excludes_own_row_and_recomputes_price() {
    let app = TestApp::new().await;
    let listing_id = seed_listing(&app, &staff(), dec!(100)).await;
    let alice = guest("alice@example.com");

    let booking = app
        .state
        .services
        .bookings
        .create_booking(
            CreateBookingRequest {
                listing_id,
                start_date: d("2026-09-01"),
                end_date: d("2026-09-04"),
            },
            &alice,
        )
        .await
        .expect("create");
    assert_eq!(booking.total_price, dec!(300));

    // Shifting within the booking's own window must not self-conflict.
    let updated = app
        .state
        .services
        .bookings
        .update_booking(
            booking.booking_id,
            UpdateBookingRequest {
                start_date: d("2026-09-02"),
                end_date: d("2026-09-04"),
            },
            &alice,
        )
        .await
        .expect("update within own window");
    assert_eq!(updated.total_price, dec!(200));

    // But moving onto someone else's stay still conflicts.
    let bob = guest("bob@example.com");
    app.state
        .services
        .bookings
        .create_booking(
            CreateBookingRequest {
                listing_id,
                start_date: d("2026-09-10"),
                end_date: d("2026-09-14"),
            },
            &bob,
        )
        .await
        .expect("bob's booking");

    let err = app
        .state
        .services
        .bookings
        .update_booking(
            booking.booking_id,
            UpdateBookingRequest {
                start_date: d("2026-09-12"),
                end_date: d("2026-09-16"),
            },
            &alice,
        )
        .await
        .expect_err("moving onto bob's stay must conflict");
    assert!(matches!(err, ServiceError::Conflict(_)), "got {err:?}");
}

#[tokio::test]
async fn guests_cannot_touch_other_peoples_bookings() {
    let app = TestApp::new().await;
    let listing_id = seed_listing(&app, &staff(), dec!(100)).await;
    let alice = guest("alice@example.com");
    let mallory = guest("mallory@example.com");

    let booking = app
        .state
        .services
        .bookings
        .create_booking(
            CreateBookingRequest {
                listing_id,
                start_date: d("2026-09-01"),
                end_date: d("2026-09-03"),
            },
            &alice,
        )
        .await
        .expect("create");

    let err = app
        .state
        .services
        .bookings
        .cancel_booking(booking.booking_id, &mallory)
        .await
        .expect_err("stranger cancel must be forbidden");
    assert!(matches!(err, ServiceError::Forbidden(_)), "got {err:?}");

    // Staff may cancel on the guest's behalf.
    app.state
        .services
        .bookings
        .cancel_booking(booking.booking_id, &staff())
        .await
        .expect("staff cancel");
}

#[tokio::test]
async fn booking_api_rejects_overlap_with_http_409() {
    let app = TestApp::new().await;
    let listing_id = seed_listing(&app, &staff(), dec!(100)).await;
    let alice = guest("alice@example.com");
    let bob = guest("bob@example.com");

    let payload = json!({
        "listing_id": listing_id,
        "start_date": "2026-09-01",
        "end_date": "2026-09-05",
    });

    let (status, body) = app
        .request(Method::POST, "/api/v1/bookings", Some(&alice), Some(payload.clone()))
        .await;
    assert_eq!(status, StatusCode::CREATED, "body: {body}");
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["total_price"], "400");

    let (status, body) = app
        .request(Method::POST, "/api/v1/bookings", Some(&bob), Some(payload))
        .await;
    assert_eq!(status, StatusCode::CONFLICT, "body: {body}");

    // Requests without a resolved principal never reach the service.
    let (status, _) = app
        .request(
            Method::POST,
            "/api/v1/bookings",
            None,
            Some(json!({
                "listing_id": listing_id,
                "start_date": "2026-09-10",
                "end_date": "2026-09-12",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
