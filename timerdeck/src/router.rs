use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::{DefaultMakeSpan, TraceLayer};

use crate::{app_state::AppState, routes::timers};

/// The local control surface. Bound to loopback by the caller and therefore
/// unauthenticated: only local processes can reach it.
pub fn create(state: AppState) -> Router<()> {
    Router::new()
        .route("/api/timers", get(timers::list_timers))
        .route("/api/accounts", get(timers::list_accounts))
        .route("/api/timers/:id/start", post(timers::start_timer))
        .route("/api/timers/:id/stop", post(timers::stop_timer))
        .route("/api/timers/:id/toggle", post(timers::toggle_timer))
        .route("/api/timers/:id/delete", post(timers::delete_timer))
        .with_state(state)
        .layer(TraceLayer::new_for_http().make_span_with(DefaultMakeSpan::default()))
}
