mod error;
mod requests;
mod routes;

pub use error::{ApiError, ApiResult};

use std::sync::Arc;
use std::time::Instant;

use axum::{
    Router,
    extract::{MatchedPath, Request},
    middleware::{self, Next},
    response::Response,
    routing::{get, post, put},
};
use tower::limit::GlobalConcurrencyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::engine::Ledger;
use crate::observability;

#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<Ledger>,
}

/// The full API. At most `max_in_flight` requests are processed at once.
pub fn router(state: AppState, max_in_flight: usize) -> Router {
    Router::new()
        .route("/health", get(routes::health))
        .route("/rooms", get(routes::list_rooms).post(routes::create_room))
        .route(
            "/rooms/{id}",
            get(routes::get_room)
                .put(routes::update_room)
                .delete(routes::delete_room),
        )
        .route("/rooms/{id}/status", put(routes::set_room_status))
        .route("/rooms/{id}/availability", get(routes::room_availability))
        .route("/rooms/{id}/free-windows", get(routes::room_free_windows))
        .route("/rooms/{id}/bookings", get(routes::room_bookings))
        .route("/rooms/{id}/events", get(routes::room_events))
        .route("/services", get(routes::list_services).post(routes::create_service))
        .route(
            "/services/{id}",
            get(routes::get_service).put(routes::update_service),
        )
        .route("/accounts", post(routes::create_account))
        .route("/accounts/{id}", get(routes::get_account))
        .route("/accounts/{id}/bookings", get(routes::account_bookings))
        .route("/bookings", post(routes::reserve))
        .route("/bookings/quote", post(routes::quote))
        .route("/bookings/{id}", get(routes::get_booking))
        .route("/bookings/{id}/confirm", post(routes::confirm_booking))
        .route("/bookings/{id}/check-in", post(routes::check_in_booking))
        .route("/bookings/{id}/check-out", post(routes::check_out_booking))
        .route("/bookings/{id}/cancel", post(routes::cancel_booking))
        .route(
            "/bookings/{id}/payments",
            get(routes::booking_payments).post(routes::record_payment),
        )
        .route("/payments/{id}", put(routes::settle_payment))
        .layer(middleware::from_fn(track_metrics))
        .layer(TraceLayer::new_for_http())
        .layer(GlobalConcurrencyLimitLayer::new(max_in_flight))
        .with_state(state)
}

async fn track_metrics(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_owned())
        .unwrap_or_else(|| "unmatched".to_owned());
    let method = req.method().to_string();

    let response = next.run(req).await;

    let status = response.status().as_u16().to_string();
    metrics::counter!(
        observability::REQUESTS_TOTAL,
        "method" => method.clone(),
        "route" => route.clone(),
        "status" => status
    )
    .increment(1);
    metrics::histogram!(
        observability::REQUEST_DURATION_SECONDS,
        "method" => method,
        "route" => route
    )
    .record(start.elapsed().as_secs_f64());
    response
}
