use axum::{http::Method, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod error;
pub mod middleware;
pub mod state;
pub mod v1;

pub use state::{AppState, AuthConfig};

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
            axum::http::header::USER_AGENT,
        ]);

    Router::new()
        .merge(v1::availability::routes())
        .merge(v1::bookings::routes())
        .merge(v1::discovery::routes())
        .merge(v1::users::routes())
        .route_layer(axum::middleware::from_fn_with_state(state.clone(), middleware::require_user))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
