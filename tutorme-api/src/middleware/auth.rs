use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use tutorme_shared::UserId;

use crate::error::AppError;
use crate::state::AppState;

/// Identity-provider token. `sub` is the caller's user id.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
}

/// Authenticated caller, injected into request extensions.
#[derive(Debug, Clone, PartialEq)]
pub struct CurrentUser(pub UserId);

pub async fn require_user(State(state): State<AppState>, mut req: Request, next: Next) -> Result<Response, AppError> {
    let token = req
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .ok_or_else(|| AppError::AuthenticationError("Missing bearer token".to_string()))?;

    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(state.auth.secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )
    .map_err(|e| AppError::AuthenticationError(format!("Invalid token: {}", e)))?;

    if token_data.claims.sub.trim().is_empty() {
        return Err(AppError::AuthenticationError("Token has no subject".to_string()));
    }

    req.extensions_mut()
        .insert(CurrentUser(UserId::new(token_data.claims.sub)));
    Ok(next.run(req).await)
}
