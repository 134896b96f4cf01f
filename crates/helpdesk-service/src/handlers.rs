//! Endpoint handlers.
//!
//! Every handler computes its CORS headers first and attaches them to
//! whatever it returns, success or failure.

use axum::body::Bytes;
use axum::extract::rejection::{BytesRejection, PathRejection};
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Response;
use helpdesk_core::{
    CreateTicketPayload, ReplyPayload, TicketId, UpdatePayload, LIST_LIMIT,
};
use serde::Serialize;
use serde_json::json;

use crate::envelope::{decode_payload, empty_response, json_response};
use crate::error::{EndpointError, Operation};
use crate::state::AppState;

/// A routed path and the methods it answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Tickets,
    TicketDetail,
    TicketReply,
    TicketUpdate,
}

impl Route {
    #[must_use]
    pub fn methods(self) -> &'static str {
        match self {
            Self::Tickets => "GET,POST,OPTIONS",
            Self::TicketDetail => "GET,OPTIONS",
            Self::TicketReply | Self::TicketUpdate => "POST,OPTIONS",
        }
    }
}

#[derive(Debug, Serialize)]
struct Created {
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<TicketId>,
}

impl Created {
    fn with_id(id: TicketId) -> Self {
        Self { ok: true, id: Some(id) }
    }

    fn ok() -> Self {
        Self { ok: true, id: None }
    }
}

type IdSegment = Result<Path<String>, PathRejection>;
type RawBody = Result<Bytes, BytesRejection>;

fn parse_id(raw: &str) -> Result<TicketId, EndpointError> {
    TicketId::parse(raw).ok_or(EndpointError::BadId)
}

// A segment axum cannot decode (invalid UTF-8 after percent-decoding) is as
// much a bad id as a non-numeric one.
fn segment_id(segment: IdSegment) -> Result<TicketId, EndpointError> {
    match segment {
        Ok(Path(raw)) => parse_id(&raw),
        Err(_) => Err(EndpointError::BadId),
    }
}

fn body_bytes(body: RawBody) -> Result<Bytes, EndpointError> {
    body.map_err(|rejection| {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            EndpointError::PayloadTooLarge
        } else {
            EndpointError::InvalidJson
        }
    })
}

pub fn preflight(state: &AppState, headers: &HeaderMap, route: Route) -> Response {
    empty_response(StatusCode::OK, state.cors(headers, route.methods()))
}

pub fn method_not_allowed(state: &AppState, headers: &HeaderMap, route: Route) -> Response {
    empty_response(StatusCode::METHOD_NOT_ALLOWED, state.cors(headers, route.methods()))
}

pub async fn list_tickets(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let cors = state.cors(&headers, Route::Tickets.methods());
    match state.run_blocking(|store| store.list_tickets(LIST_LIMIT)).await {
        Ok(tickets) => json_response(StatusCode::OK, cors, &tickets),
        Err(err) => err.render(Operation::ListTickets, cors),
    }
}

pub async fn create_ticket(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: RawBody,
) -> Response {
    let cors = state.cors(&headers, Route::Tickets.methods());
    match create_ticket_inner(&state, body).await {
        Ok(id) => json_response(StatusCode::CREATED, cors, &Created::with_id(id)),
        Err(err) => err.render(Operation::CreateTicket, cors),
    }
}

async fn create_ticket_inner(state: &AppState, body: RawBody) -> Result<TicketId, EndpointError> {
    let body = body_bytes(body)?;
    let input = decode_payload::<CreateTicketPayload>(&body)?.validate()?;
    state.run_blocking(move |store| store.create_ticket(&input)).await
}

pub async fn ticket_detail(
    State(state): State<AppState>,
    headers: HeaderMap,
    segment: IdSegment,
) -> Response {
    let cors = state.cors(&headers, Route::TicketDetail.methods());
    let id = match segment_id(segment) {
        Ok(id) => id,
        Err(err) => return err.render(Operation::TicketDetail, cors),
    };

    match state.run_blocking(move |store| store.ticket_detail(id)).await {
        Ok(Some(detail)) => json_response(StatusCode::OK, cors, &detail),
        Ok(None) => json_response(
            StatusCode::NOT_FOUND,
            cors,
            &json!({ "ticket": null, "replies": [], "updates": [] }),
        ),
        Err(err) => err.render(Operation::TicketDetail, cors),
    }
}

pub async fn append_reply(
    State(state): State<AppState>,
    headers: HeaderMap,
    segment: IdSegment,
    body: RawBody,
) -> Response {
    let cors = state.cors(&headers, Route::TicketReply.methods());
    match append_reply_inner(&state, &headers, segment, body).await {
        Ok(()) => json_response(StatusCode::CREATED, cors, &Created::ok()),
        Err(err) => err.render(Operation::AppendReply, cors),
    }
}

async fn append_reply_inner(
    state: &AppState,
    headers: &HeaderMap,
    segment: IdSegment,
    body: RawBody,
) -> Result<(), EndpointError> {
    let id = segment_id(segment)?;
    state.authorize_agent(headers)?;
    let body = body_bytes(body)?;
    let input = decode_payload::<ReplyPayload>(&body)?.validate()?;
    state.run_blocking(move |store| store.append_reply(id, &input)).await
}

pub async fn append_update(
    State(state): State<AppState>,
    headers: HeaderMap,
    segment: IdSegment,
    body: RawBody,
) -> Response {
    let cors = state.cors(&headers, Route::TicketUpdate.methods());
    match append_update_inner(&state, &headers, segment, body).await {
        Ok(()) => json_response(StatusCode::CREATED, cors, &Created::ok()),
        Err(err) => err.render(Operation::AppendUpdate, cors),
    }
}

async fn append_update_inner(
    state: &AppState,
    headers: &HeaderMap,
    segment: IdSegment,
    body: RawBody,
) -> Result<(), EndpointError> {
    let id = segment_id(segment)?;
    state.authorize_agent(headers)?;
    let body = body_bytes(body)?;
    let input = decode_payload::<UpdatePayload>(&body)?.validate()?;
    state.run_blocking(move |store| store.append_update(id, &input)).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_must_be_integers() {
        assert_eq!(parse_id("42").ok(), Some(TicketId(42)));
        for raw in ["", "abc", "1.5", "12abc"] {
            assert!(matches!(parse_id(raw), Err(EndpointError::BadId)), "{raw:?} should be rejected");
        }
    }

    #[test]
    fn created_body_omits_absent_id() {
        let reply = serde_json::to_value(Created::ok()).unwrap_or_else(|err| panic!("{err}"));
        assert_eq!(reply, json!({ "ok": true }));
        let ticket =
            serde_json::to_value(Created::with_id(TicketId(3))).unwrap_or_else(|err| panic!("{err}"));
        assert_eq!(ticket, json!({ "ok": true, "id": 3 }));
    }
}
