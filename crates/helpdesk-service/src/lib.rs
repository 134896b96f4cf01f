//! HTTP surface for the helpdesk ticket store.

pub mod config;
pub mod cors;
pub mod envelope;
pub mod error;
pub mod handlers;
pub mod state;

use axum::extract::{DefaultBodyLimit, State};
use axum::http::HeaderMap;
use axum::routing::{get, post, MethodRouter};
use axum::Router;
use tower_http::trace::TraceLayer;

pub use config::{Args, ConfigError, ServiceConfig};
pub use handlers::Route;
pub use state::AppState;

/// Adds the OPTIONS preflight and the 405 fallback every route shares.
fn with_cors_envelope(methods: MethodRouter<AppState>, route: Route) -> MethodRouter<AppState> {
    methods
        .options(move |State(state): State<AppState>, headers: HeaderMap| async move {
            handlers::preflight(&state, &headers, route)
        })
        .fallback(move |State(state): State<AppState>, headers: HeaderMap| async move {
            handlers::method_not_allowed(&state, &headers, route)
        })
}

pub fn app(state: AppState) -> Router {
    let body_limit = DefaultBodyLimit::max(state.config().max_body_bytes);
    Router::new()
        .route(
            "/tickets",
            with_cors_envelope(
                get(handlers::list_tickets).post(handlers::create_ticket),
                Route::Tickets,
            ),
        )
        .route(
            "/tickets/:id",
            with_cors_envelope(get(handlers::ticket_detail), Route::TicketDetail),
        )
        .route(
            "/tickets/:id/reply",
            with_cors_envelope(post(handlers::append_reply), Route::TicketReply),
        )
        .route(
            "/tickets/:id/update",
            with_cors_envelope(post(handlers::append_update), Route::TicketUpdate),
        )
        .layer(body_limit)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
