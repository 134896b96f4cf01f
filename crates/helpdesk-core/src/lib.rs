//! Domain model for the helpdesk ticketing backend.
//!
//! A [`Ticket`] carries two mutable projection fields (`status` and
//! `last_updated_at`); everything else about it lives in the append-only
//! [`TicketReply`] and [`TicketUpdate`] history. Inputs arrive as loosely
//! typed payloads and are turned into the validated types in [`input`] before
//! any store access happens.

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use time::{OffsetDateTime, UtcOffset};

pub mod identity;
pub mod input;

pub use identity::{Principal, AGENT_ROLE, CLIENT_PRINCIPAL_HEADER};
pub use input::{
    CreateTicketPayload, NewReply, NewTicket, NewUpdate, ReplyPayload, TicketEffect,
    UpdatePayload, TITLE_MAX_UNITS,
};

/// Status assigned to every newly created ticket.
pub const TICKET_STATUS_OPEN: &str = "open";

/// Upper bound on the ticket list projection.
pub const LIST_LIMIT: usize = 100;

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum TicketError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(transparent)]
pub struct TicketId(pub i64);

impl TicketId {
    /// Parses a path segment into a ticket id. Anything other than a plain
    /// base-10 integer is rejected.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        raw.trim().parse::<i64>().ok().map(Self)
    }
}

impl Display for TicketId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum UpdateKind {
    Progress,
    Status,
}

impl UpdateKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Progress => "progress",
            Self::Status => "status",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "progress" => Some(Self::Progress),
            "status" => Some(Self::Status),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct Ticket {
    pub id: TicketId,
    pub title: String,
    pub body: String,
    pub status: String,
    pub created_by_upn: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub last_updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct TicketReply {
    pub id: i64,
    pub ticket_id: TicketId,
    pub agent_upn: Option<String>,
    pub body: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct TicketUpdate {
    pub id: i64,
    pub ticket_id: TicketId,
    pub author_upn: Option<String>,
    pub kind: UpdateKind,
    pub message: Option<String>,
    pub new_status: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// A ticket together with its full history, both lists in creation order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TicketDetail {
    pub ticket: Ticket,
    pub replies: Vec<TicketReply>,
    pub updates: Vec<TicketUpdate>,
}

/// Parses a stored or client-supplied timestamp; only UTC is accepted.
///
/// # Errors
/// Returns [`TicketError::Validation`] when the value is not RFC3339 or not UTC.
pub fn parse_timestamp(value: &str) -> Result<OffsetDateTime, TicketError> {
    let parsed = OffsetDateTime::parse(value, &time::format_description::well_known::Rfc3339)
        .map_err(|err| TicketError::Validation(format!("invalid RFC3339 timestamp: {err}")))?;

    if parsed.offset() != UtcOffset::UTC {
        return Err(TicketError::Validation(
            "timestamp MUST use UTC offset Z".to_string(),
        ));
    }

    Ok(parsed)
}

/// Formats a timestamp for storage: UTC, fixed width, microsecond precision.
/// Fixed width keeps lexical order identical to chronological order, which the
/// store relies on when it compares timestamps in SQL.
///
/// # Errors
/// Returns [`TicketError::Validation`] when formatting fails.
pub fn format_timestamp(value: OffsetDateTime) -> Result<String, TicketError> {
    value
        .to_offset(UtcOffset::UTC)
        .format(time::macros::format_description!(
            "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:6]Z"
        ))
        .map_err(|err| TicketError::Validation(format!("failed to format timestamp: {err}")))
}

#[must_use]
pub fn now_utc() -> OffsetDateTime {
    OffsetDateTime::now_utc().to_offset(UtcOffset::UTC)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn must_ok<T, E: std::fmt::Display>(result: Result<T, E>) -> T {
        match result {
            Ok(value) => value,
            Err(err) => panic!("expected Ok(..), got error: {err}"),
        }
    }

    fn fixture_ticket() -> Ticket {
        let at = must_ok(parse_timestamp("2026-02-07T12:00:00Z"));
        Ticket {
            id: TicketId(1),
            title: "printer jam".to_string(),
            body: "floor 3".to_string(),
            status: TICKET_STATUS_OPEN.to_string(),
            created_by_upn: None,
            created_at: at,
            last_updated_at: at,
        }
    }

    #[test]
    fn ticket_id_parse_accepts_integers_only() {
        assert_eq!(TicketId::parse("42"), Some(TicketId(42)));
        assert_eq!(TicketId::parse("-3"), Some(TicketId(-3)));
        assert_eq!(TicketId::parse("abc"), None);
        assert_eq!(TicketId::parse("4.2"), None);
        assert_eq!(TicketId::parse("12abc"), None);
        assert_eq!(TicketId::parse(""), None);
    }

    #[test]
    fn update_kind_round_trips_through_text() {
        for kind in [UpdateKind::Progress, UpdateKind::Status] {
            assert_eq!(UpdateKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(UpdateKind::parse("Status"), None);
    }

    #[test]
    fn ticket_serializes_with_pascal_case_columns() {
        let value = must_ok(serde_json::to_value(fixture_ticket()));
        assert_eq!(value["Id"], serde_json::json!(1));
        assert_eq!(value["Status"], serde_json::json!("open"));
        assert_eq!(value["CreatedByUpn"], serde_json::Value::Null);
        assert_eq!(value["CreatedAt"], serde_json::json!("2026-02-07T12:00:00Z"));
        assert!(value.get("LastUpdatedAt").is_some());
        assert!(value.get("id").is_none());
    }

    #[test]
    fn update_kind_serializes_lowercase_inside_update() {
        let update = TicketUpdate {
            id: 7,
            ticket_id: TicketId(1),
            author_upn: None,
            kind: UpdateKind::Status,
            message: None,
            new_status: Some("resolved".to_string()),
            created_at: must_ok(parse_timestamp("2026-02-07T12:00:00Z")),
        };
        let value = must_ok(serde_json::to_value(update));
        assert_eq!(value["Kind"], serde_json::json!("status"));
        assert_eq!(value["NewStatus"], serde_json::json!("resolved"));
        assert_eq!(value["TicketId"], serde_json::json!(1));
    }

    #[test]
    fn stored_timestamps_are_fixed_width_and_sortable() {
        let early = must_ok(parse_timestamp("2026-02-07T12:00:00Z"));
        let late = must_ok(parse_timestamp("2026-02-07T12:00:00.5Z"));
        let early_text = must_ok(format_timestamp(early));
        let late_text = must_ok(format_timestamp(late));

        assert_eq!(early_text, "2026-02-07T12:00:00.000000Z");
        assert_eq!(late_text, "2026-02-07T12:00:00.500000Z");
        assert_eq!(early_text.len(), late_text.len());
        assert!(early_text < late_text);
        assert_eq!(must_ok(parse_timestamp(&late_text)), late);
    }

    #[test]
    fn parse_timestamp_rejects_non_utc_offsets() {
        let err = match parse_timestamp("2026-02-07T12:00:00+09:00") {
            Ok(_) => panic!("expected non-UTC timestamp to be rejected"),
            Err(err) => err,
        };
        assert!(err.to_string().contains("UTC"));
    }
}
