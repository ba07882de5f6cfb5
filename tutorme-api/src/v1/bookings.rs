use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Extension, Json, Router,
};
use serde::Deserialize;
use tracing::info;
use tutorme_booking::{SlotSelection, StudentBookings, TutorBookings};
use tutorme_core::models::Booking;
use tutorme_core::time::within_lead_time;
use tutorme_shared::{BookingId, ScheduleId, UserId};

use crate::error::AppError;
use crate::middleware::CurrentUser;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateBookingRequest {
    tutor_id: UserId,
    schedule_id: ScheduleId,
    slot: SlotSelection,
}

#[derive(Debug, Deserialize)]
struct RatingRequest {
    rating: u8,
    #[serde(default)]
    review: String,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/bookings", post(create_booking))
        .route("/v1/bookings/student", get(student_bookings))
        .route("/v1/bookings/tutor", get(tutor_bookings))
        .route("/v1/bookings/{id}", delete(delete_booking))
        .route("/v1/bookings/{id}/rating", post(submit_rating))
        .route("/v1/bookings/{id}/complete", post(mark_complete))
}

async fn create_booking(
    State(state): State<AppState>,
    Extension(CurrentUser(student)): Extension<CurrentUser>,
    Json(req): Json<CreateBookingRequest>,
) -> Result<(StatusCode, Json<Booking>), AppError> {
    let booking = state
        .bookings
        .create_booking(&req.tutor_id, &student, &req.schedule_id, &req.slot)
        .await?;
    Ok((StatusCode::CREATED, Json(booking)))
}

async fn student_bookings(
    State(state): State<AppState>,
    Extension(CurrentUser(student)): Extension<CurrentUser>,
) -> Result<Json<StudentBookings>, AppError> {
    Ok(Json(state.bookings.student_bookings(&student).await?))
}

async fn tutor_bookings(
    State(state): State<AppState>,
    Extension(CurrentUser(tutor)): Extension<CurrentUser>,
) -> Result<Json<TutorBookings>, AppError> {
    Ok(Json(state.bookings.tutor_bookings(&tutor).await?))
}

/// Either party can remove a booking, up to the lead time before it starts.
async fn delete_booking(
    State(state): State<AppState>,
    Extension(CurrentUser(caller)): Extension<CurrentUser>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let id = BookingId::new(id);
    let booking = state.bookings.get_booking(&id).await?;
    if booking.student != caller && booking.tutor != caller {
        return Err(AppError::AuthorizationError("Not a party to this booking".to_string()));
    }

    let lead = state.business_rules.min_cancel_lead_minutes;
    if within_lead_time(booking.window().start, state.clock.now(), lead) {
        return Err(AppError::ValidationError(format!(
            "Bookings cannot be removed within {} minutes of the start",
            lead
        )));
    }

    state.bookings.delete_booking(&id).await?;
    info!("{} removed booking {}", caller, id);
    Ok(StatusCode::NO_CONTENT)
}

async fn submit_rating(
    State(state): State<AppState>,
    Extension(CurrentUser(caller)): Extension<CurrentUser>,
    Path(id): Path<String>,
    Json(req): Json<RatingRequest>,
) -> Result<Json<Booking>, AppError> {
    let id = BookingId::new(id);
    let booking = state.bookings.get_booking(&id).await?;
    if booking.student != caller {
        return Err(AppError::AuthorizationError("Only the student can rate a session".to_string()));
    }

    let rated = state
        .bookings
        .submit_rating(&id, req.rating, &req.review, &booking.tutor)
        .await?;
    Ok(Json(rated))
}

async fn mark_complete(
    State(state): State<AppState>,
    Extension(CurrentUser(caller)): Extension<CurrentUser>,
    Path(id): Path<String>,
) -> Result<Json<Booking>, AppError> {
    let id = BookingId::new(id);
    let booking = state.bookings.get_booking(&id).await?;
    if booking.tutor != caller {
        return Err(AppError::AuthorizationError("Only the tutor can complete a session".to_string()));
    }
    Ok(Json(state.bookings.mark_complete(&id).await?))
}
