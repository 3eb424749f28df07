use std::convert::Infallible;

use axum::{
    Json,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::StatusCode,
    response::sse::{Event as SseEvent, KeepAlive, Sse},
};
use futures::stream::{self, Stream};
use tokio::sync::broadcast::error::RecvError;
use ulid::Ulid;

use crate::engine::LedgerError;
use crate::model::*;

use super::AppState;
use super::error::ApiResult;
use super::requests::*;

type IdPath = Result<Path<Ulid>, PathRejection>;
type Body<T> = Result<Json<T>, JsonRejection>;
type Params<T> = Result<Query<T>, QueryRejection>;

pub async fn health() -> (StatusCode, &'static str) {
    (StatusCode::OK, "OK")
}

// ── Rooms ────────────────────────────────────────────────────

pub async fn list_rooms(
    State(state): State<AppState>,
    query: Params<RoomListQuery>,
) -> ApiResult<Json<Vec<Room>>> {
    let Query(q) = query?;
    let rooms = match (q.check_in, q.check_out) {
        (Some(check_in), Some(check_out)) => {
            state
                .ledger
                .available_rooms(check_in, check_out, q.min_capacity)
                .await?
        }
        (None, None) => {
            let mut rooms = state.ledger.list_rooms().await;
            if let Some(min) = q.min_capacity {
                rooms.retain(|r| r.room_type.capacity >= min);
            }
            rooms
        }
        _ => {
            return Err(LedgerError::Invalid("check_in and check_out must be given together").into());
        }
    };
    Ok(Json(rooms))
}

pub async fn create_room(
    State(state): State<AppState>,
    body: Body<RoomBody>,
) -> ApiResult<(StatusCode, Json<Room>)> {
    let Json(body) = body?;
    let room = state.ledger.create_room(body.into()).await?;
    Ok((StatusCode::CREATED, Json(room)))
}

pub async fn get_room(State(state): State<AppState>, id: IdPath) -> ApiResult<Json<Room>> {
    let Path(id) = id?;
    Ok(Json(state.ledger.get_room(id).await?))
}

pub async fn update_room(
    State(state): State<AppState>,
    id: IdPath,
    body: Body<RoomBody>,
) -> ApiResult<Json<Room>> {
    let Path(id) = id?;
    let Json(body) = body?;
    Ok(Json(state.ledger.update_room(id, body.into()).await?))
}

pub async fn delete_room(State(state): State<AppState>, id: IdPath) -> ApiResult<StatusCode> {
    let Path(id) = id?;
    state.ledger.delete_room(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn set_room_status(
    State(state): State<AppState>,
    id: IdPath,
    body: Body<RoomStatusBody>,
) -> ApiResult<Json<Room>> {
    let Path(id) = id?;
    let Json(body) = body?;
    Ok(Json(state.ledger.set_room_status(id, body.status).await?))
}

pub async fn room_availability(
    State(state): State<AppState>,
    id: IdPath,
    query: Params<StayQuery>,
) -> ApiResult<Json<AvailabilityView>> {
    let Path(room_id) = id?;
    let Query(q) = query?;
    let available = state
        .ledger
        .is_available(room_id, q.check_in, q.check_out)
        .await?;
    Ok(Json(AvailabilityView {
        room_id,
        check_in: q.check_in,
        check_out: q.check_out,
        available,
    }))
}

pub async fn room_free_windows(
    State(state): State<AppState>,
    id: IdPath,
    query: Params<WindowQuery>,
) -> ApiResult<Json<Vec<StayRange>>> {
    let Path(room_id) = id?;
    let Query(q) = query?;
    Ok(Json(state.ledger.free_windows(room_id, q.from, q.to).await?))
}

pub async fn room_bookings(
    State(state): State<AppState>,
    id: IdPath,
) -> ApiResult<Json<Vec<Booking>>> {
    let Path(room_id) = id?;
    Ok(Json(state.ledger.bookings_for_room(room_id).await?))
}

/// Live feed of the room's applied events. A subscriber that falls behind
/// gets a `lagged` event carrying the number of events it missed.
pub async fn room_events(
    State(state): State<AppState>,
    id: IdPath,
) -> ApiResult<Sse<impl Stream<Item = Result<SseEvent, Infallible>>>> {
    let Path(room_id) = id?;
    state.ledger.get_room(room_id).await?;
    let rx = state.ledger.notify.subscribe(room_id);

    let events = stream::unfold(rx, move |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(event) => match SseEvent::default().event(event.name()).json_data(&event) {
                    Ok(frame) => return Some((Ok(frame), rx)),
                    Err(e) => tracing::warn!(%room_id, error = %e, "unencodable room event"),
                },
                Err(RecvError::Lagged(n)) => {
                    tracing::warn!(%room_id, lagged = n, "room event subscriber lagged");
                    let frame = SseEvent::default().event("lagged").data(n.to_string());
                    return Some((Ok(frame), rx));
                }
                Err(RecvError::Closed) => return None,
            }
        }
    });
    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

// ── Services ─────────────────────────────────────────────────

pub async fn list_services(State(state): State<AppState>) -> Json<Vec<AdditionalService>> {
    Json(state.ledger.list_services())
}

pub async fn create_service(
    State(state): State<AppState>,
    body: Body<ServiceBody>,
) -> ApiResult<(StatusCode, Json<AdditionalService>)> {
    let Json(body) = body?;
    let service = state.ledger.create_service(body.into()).await?;
    Ok((StatusCode::CREATED, Json(service)))
}

pub async fn get_service(
    State(state): State<AppState>,
    id: IdPath,
) -> ApiResult<Json<AdditionalService>> {
    let Path(id) = id?;
    Ok(Json(state.ledger.get_service(id)?))
}

pub async fn update_service(
    State(state): State<AppState>,
    id: IdPath,
    body: Body<ServiceBody>,
) -> ApiResult<Json<AdditionalService>> {
    let Path(id) = id?;
    let Json(body) = body?;
    Ok(Json(state.ledger.update_service(id, body.into()).await?))
}

// ── Accounts ─────────────────────────────────────────────────

pub async fn create_account(
    State(state): State<AppState>,
    body: Body<AccountBody>,
) -> ApiResult<(StatusCode, Json<AccountView>)> {
    let Json(body) = body?;
    let account = state.ledger.create_account(body.into()).await?;
    Ok((StatusCode::CREATED, Json(account.into())))
}

pub async fn get_account(
    State(state): State<AppState>,
    id: IdPath,
) -> ApiResult<Json<AccountView>> {
    let Path(id) = id?;
    Ok(Json(state.ledger.get_account(id)?.into()))
}

pub async fn account_bookings(
    State(state): State<AppState>,
    id: IdPath,
) -> ApiResult<Json<Vec<Booking>>> {
    let Path(id) = id?;
    Ok(Json(state.ledger.bookings_for_user(id).await?))
}

// ── Bookings ─────────────────────────────────────────────────

pub async fn quote(
    State(state): State<AppState>,
    body: Body<QuoteBody>,
) -> ApiResult<Json<PriceBreakdown>> {
    let Json(body) = body?;
    let price = state
        .ledger
        .quote(
            body.room_id,
            body.check_in,
            body.check_out,
            &service_requests(&body.services),
        )
        .await?;
    Ok(Json(price))
}

pub async fn reserve(
    State(state): State<AppState>,
    body: Body<ReserveBody>,
) -> ApiResult<(StatusCode, Json<Booking>)> {
    let Json(body) = body?;
    let booking = state
        .ledger
        .reserve(
            body.room_id,
            body.user_id,
            body.check_in,
            body.check_out,
            &service_requests(&body.services),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(booking)))
}

pub async fn get_booking(State(state): State<AppState>, id: IdPath) -> ApiResult<Json<Booking>> {
    let Path(id) = id?;
    Ok(Json(state.ledger.get_booking(id).await?))
}

pub async fn confirm_booking(State(state): State<AppState>, id: IdPath) -> ApiResult<Json<Booking>> {
    let Path(id) = id?;
    Ok(Json(state.ledger.confirm(id).await?))
}

pub async fn check_in_booking(State(state): State<AppState>, id: IdPath) -> ApiResult<Json<Booking>> {
    let Path(id) = id?;
    Ok(Json(state.ledger.check_in(id).await?))
}

pub async fn check_out_booking(State(state): State<AppState>, id: IdPath) -> ApiResult<Json<Booking>> {
    let Path(id) = id?;
    Ok(Json(state.ledger.check_out(id).await?))
}

pub async fn cancel_booking(State(state): State<AppState>, id: IdPath) -> ApiResult<Json<Booking>> {
    let Path(id) = id?;
    Ok(Json(state.ledger.cancel(id).await?))
}

// ── Payments ─────────────────────────────────────────────────

pub async fn booking_payments(
    State(state): State<AppState>,
    id: IdPath,
) -> ApiResult<Json<Vec<Payment>>> {
    let Path(id) = id?;
    Ok(Json(state.ledger.payments_for_booking(id)?))
}

pub async fn record_payment(
    State(state): State<AppState>,
    id: IdPath,
    body: Body<PaymentBody>,
) -> ApiResult<(StatusCode, Json<Payment>)> {
    let Path(id) = id?;
    let Json(body) = body?;
    let payment = state.ledger.record_payment(id, body.method).await?;
    Ok((StatusCode::CREATED, Json(payment)))
}

pub async fn settle_payment(
    State(state): State<AppState>,
    id: IdPath,
    body: Body<SettleBody>,
) -> ApiResult<Json<Payment>> {
    let Path(id) = id?;
    let Json(body) = body?;
    Ok(Json(state.ledger.settle_payment(id, body.status).await?))
}
