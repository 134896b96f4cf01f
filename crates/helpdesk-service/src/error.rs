use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use helpdesk_core::TicketError;
use helpdesk_store_sqlite::StoreError;
use serde::Serialize;
use tracing::{debug, error};

use crate::envelope::json_response;

/// The five ticket endpoints, each with the error code it reports when the
/// store fails underneath it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    ListTickets,
    CreateTicket,
    TicketDetail,
    AppendReply,
    AppendUpdate,
}

impl Operation {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::ListTickets => "list_tickets",
            Self::CreateTicket => "create_ticket",
            Self::TicketDetail => "ticket_detail",
            Self::AppendReply => "append_reply",
            Self::AppendUpdate => "append_update",
        }
    }

    #[must_use]
    pub fn failure_code(self) -> &'static str {
        match self {
            Self::ListTickets => "list_failed",
            Self::CreateTicket => "post_failed",
            Self::TicketDetail => "detail_failed",
            Self::AppendReply => "reply_failed",
            Self::AppendUpdate => "update_failed",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EndpointError {
    #[error("bad id")]
    BadId,
    #[error("request body is not valid JSON")]
    InvalidJson,
    #[error("request body exceeds the configured limit")]
    PayloadTooLarge,
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("blocking worker failed: {0}")]
    Worker(String),
}

impl From<TicketError> for EndpointError {
    fn from(err: TicketError) -> Self {
        match err {
            TicketError::Validation(message) => Self::BadRequest(message),
            TicketError::Forbidden(message) => Self::Forbidden(message),
        }
    }
}

#[derive(Debug, Serialize)]
struct FailureBody {
    ok: bool,
    error: &'static str,
}

impl EndpointError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadId | Self::InvalidJson | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Store(_) | Self::Worker(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    #[must_use]
    pub fn code(&self, operation: Operation) -> &'static str {
        match self {
            Self::BadId => "bad_id",
            Self::InvalidJson => "invalid_json",
            Self::PayloadTooLarge => "payload_too_large",
            Self::BadRequest(_) => "bad_request",
            Self::Forbidden(_) => "forbidden",
            Self::Store(_) | Self::Worker(_) => operation.failure_code(),
        }
    }

    /// Logs the failure and renders it. Store and worker failures are logged
    /// with full detail; the client only ever sees the code.
    pub fn render(self, operation: Operation, cors: HeaderMap) -> Response {
        let status = self.status();
        let code = self.code(operation);

        match &self {
            Self::Store(err) => error!(
                operation = operation.label(),
                code,
                sqlite_code = ?err.sqlite_code(),
                error = %err,
                "ticket store operation failed"
            ),
            Self::Worker(_) => error!(operation = operation.label(), code, error = %self, "request worker failed"),
            _ => debug!(operation = operation.label(), code, error = %self, "request rejected"),
        }

        if matches!(self, Self::BadId) {
            return (status, cors, "bad id").into_response();
        }
        json_response(status, cors, &FailureBody { ok: false, error: code })
    }
}

#[cfg(test)]
mod tests {
    use helpdesk_core::TicketId;

    use super::*;

    #[test]
    fn store_failures_use_the_operation_code() {
        let cases = [
            (Operation::ListTickets, "list_failed"),
            (Operation::CreateTicket, "post_failed"),
            (Operation::TicketDetail, "detail_failed"),
            (Operation::AppendReply, "reply_failed"),
            (Operation::AppendUpdate, "update_failed"),
        ];
        for (operation, expected) in cases {
            let err = EndpointError::Store(StoreError::MissingTicket(TicketId(7)));
            assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
            assert_eq!(err.code(operation), expected);
        }
    }

    #[test]
    fn client_errors_keep_their_own_code() {
        assert_eq!(EndpointError::InvalidJson.code(Operation::AppendReply), "invalid_json");
        assert_eq!(
            EndpointError::from(TicketError::Validation("x".to_string())).code(Operation::CreateTicket),
            "bad_request"
        );
        assert_eq!(EndpointError::PayloadTooLarge.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(EndpointError::PayloadTooLarge.code(Operation::CreateTicket), "payload_too_large");
        let forbidden = EndpointError::from(TicketError::Forbidden("Agent".to_string()));
        assert_eq!(forbidden.status(), StatusCode::FORBIDDEN);
        assert_eq!(forbidden.code(Operation::AppendUpdate), "forbidden");
    }
}
