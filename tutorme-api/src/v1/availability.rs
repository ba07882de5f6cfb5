use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, post},
    Extension, Json, Router,
};
use tutorme_availability::{SlotRequest, TutorSlot};
use tutorme_core::models::{Schedule, Slot};
use tutorme_shared::{ScheduleId, SlotId};

use crate::error::AppError;
use crate::middleware::CurrentUser;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/availability/slots", post(add_slot).get(list_slots))
        .route(
            "/v1/availability/schedules/{schedule_id}/slots/{slot_id}",
            delete(delete_slot),
        )
}

async fn add_slot(
    State(state): State<AppState>,
    Extension(CurrentUser(tutor)): Extension<CurrentUser>,
    Json(req): Json<SlotRequest>,
) -> Result<(StatusCode, Json<Slot>), AppError> {
    let slot = state.availability.add_slot(&tutor, &req).await?;
    Ok((StatusCode::CREATED, Json(slot)))
}

async fn list_slots(
    State(state): State<AppState>,
    Extension(CurrentUser(tutor)): Extension<CurrentUser>,
) -> Result<Json<Vec<TutorSlot>>, AppError> {
    Ok(Json(state.availability.get_tutor_slots(&tutor).await?))
}

async fn delete_slot(
    State(state): State<AppState>,
    Extension(CurrentUser(tutor)): Extension<CurrentUser>,
    Path((schedule_id, slot_id)): Path<(String, String)>,
) -> Result<Json<Schedule>, AppError> {
    let schedule = state
        .availability
        .delete_own_slot(&tutor, &SlotId::new(slot_id), &ScheduleId::new(schedule_id))
        .await?;
    Ok(Json(schedule))
}
