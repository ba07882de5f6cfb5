use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
    Extension, Json, Router,
};
use futures_util::{future, Stream, StreamExt};
use std::convert::Infallible;
use tokio_stream::wrappers::WatchStream;
use tutorme_discovery::{DiscoverySchedule, FeedState};

use crate::error::AppError;
use crate::middleware::CurrentUser;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/discovery/tutors", get(snapshot))
        .route("/v1/discovery/stream", get(stream))
}

async fn snapshot(
    State(state): State<AppState>,
    Extension(CurrentUser(viewer)): Extension<CurrentUser>,
) -> Result<Json<Vec<DiscoverySchedule>>, AppError> {
    Ok(Json(state.discovery.snapshot(&viewer).await?))
}

/// Pushes the caller's discovery view every time it changes. The live
/// listeners stop when the client disconnects, and the stream closes right
/// after a `failed` update so the client can reconnect.
async fn stream(
    State(state): State<AppState>,
    Extension(CurrentUser(viewer)): Extension<CurrentUser>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let feed = state.discovery.feed(&viewer);
    let updates = WatchStream::new(feed.subscribe())
        .scan(false, |failed, update: FeedState| {
            let next = (!*failed).then(|| {
                *failed = matches!(update, FeedState::Failed { .. });
                update
            });
            future::ready(next)
        })
        .map(move |update| {
        // The feed lives as long as the stream.
        let _feed = &feed;
        let payload = serde_json::to_string(&update).unwrap_or_else(|_| "{}".to_string());
        Ok(Event::default().event("discovery").data(payload))
    });

    Sse::new(updates).keep_alive(KeepAlive::default())
}
