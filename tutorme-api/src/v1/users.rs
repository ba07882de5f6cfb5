use axum::{
    extract::State,
    routing::{get, put},
    Extension, Json, Router,
};
use serde::Deserialize;
use tutorme_core::models::User;
use tutorme_discovery::{TutorStats, TutorSummary};

use crate::error::AppError;
use crate::middleware::CurrentUser;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
struct UpsertUserRequest {
    name: Option<String>,
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContactRequest {
    contact: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TutorProfileRequest {
    bio: String,
    speciality: String,
    hourly_rate: f64,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/tutors", get(list_tutors))
        .route("/v1/tutors/stats", get(tutor_stats))
        .route("/v1/users/me", put(upsert_me))
        .route("/v1/users/me/contact", put(update_contact))
        .route("/v1/users/me/profile", put(become_tutor))
}

async fn list_tutors(State(state): State<AppState>) -> Result<Json<Vec<TutorSummary>>, AppError> {
    Ok(Json(state.tutors.list_tutors().await?))
}

async fn tutor_stats(State(state): State<AppState>) -> Result<Json<TutorStats>, AppError> {
    Ok(Json(state.tutors.stats().await?))
}

async fn upsert_me(
    State(state): State<AppState>,
    Extension(CurrentUser(id)): Extension<CurrentUser>,
    Json(req): Json<UpsertUserRequest>,
) -> Result<Json<User>, AppError> {
    Ok(Json(state.tutors.upsert_user(&id, req.name, req.email).await?))
}

async fn update_contact(
    State(state): State<AppState>,
    Extension(CurrentUser(id)): Extension<CurrentUser>,
    Json(req): Json<ContactRequest>,
) -> Result<Json<User>, AppError> {
    Ok(Json(state.tutors.update_contact(&id, &req.contact).await?))
}

async fn become_tutor(
    State(state): State<AppState>,
    Extension(CurrentUser(id)): Extension<CurrentUser>,
    Json(req): Json<TutorProfileRequest>,
) -> Result<Json<User>, AppError> {
    let user = state
        .tutors
        .become_tutor(&id, &req.bio, &req.speciality, req.hourly_rate)
        .await?;
    Ok(Json(user))
}
