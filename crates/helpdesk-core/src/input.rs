//! Request payloads and the validated inputs the store accepts.
//!
//! Payload structs mirror what clients actually send: every field optional.
//! `validate` is the only way to obtain a `New*` value, so the store never sees
//! an input that skipped the presence checks.

use serde::Deserialize;

use crate::{TicketError, UpdateKind};

/// Maximum title length, counted in UTF-16 code units.
pub const TITLE_MAX_UNITS: usize = 200;

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct CreateTicketPayload {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct ReplyPayload {
    #[serde(default)]
    pub body: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct UpdatePayload {
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default, rename = "newStatus")]
    pub new_status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTicket {
    title: String,
    body: String,
}

impl NewTicket {
    /// # Errors
    /// Returns [`TicketError::Validation`] for an empty or over-long title or an
    /// empty body.
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Result<Self, TicketError> {
        let title = title.into();
        let body = body.into();

        if title.is_empty() {
            return Err(TicketError::Validation("title MUST be provided".to_string()));
        }
        let units = title.encode_utf16().count();
        if units > TITLE_MAX_UNITS {
            return Err(TicketError::Validation(format!(
                "title MUST be at most {TITLE_MAX_UNITS} UTF-16 units (got {units})"
            )));
        }
        if body.is_empty() {
            return Err(TicketError::Validation("body MUST be provided".to_string()));
        }

        Ok(Self { title, body })
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn body(&self) -> &str {
        &self.body
    }
}

impl CreateTicketPayload {
    /// # Errors
    /// Returns [`TicketError::Validation`] when `title` or `body` is missing or
    /// invalid.
    pub fn validate(self) -> Result<NewTicket, TicketError> {
        NewTicket::new(self.title.unwrap_or_default(), self.body.unwrap_or_default())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewReply {
    body: String,
}

impl NewReply {
    /// # Errors
    /// Returns [`TicketError::Validation`] for an empty body.
    pub fn new(body: impl Into<String>) -> Result<Self, TicketError> {
        let body = body.into();
        if body.is_empty() {
            return Err(TicketError::Validation("body MUST be provided".to_string()));
        }
        Ok(Self { body })
    }

    #[must_use]
    pub fn body(&self) -> &str {
        &self.body
    }
}

impl ReplyPayload {
    /// # Errors
    /// Returns [`TicketError::Validation`] when `body` is missing or empty.
    pub fn validate(self) -> Result<NewReply, TicketError> {
        NewReply::new(self.body.unwrap_or_default())
    }
}

/// The second statement of an update write, fixed before the transaction opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TicketEffect<'a> {
    /// Advance `last_updated_at` only.
    Touch,
    /// Set `status` and advance `last_updated_at`.
    SetStatus(&'a str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUpdate {
    kind: UpdateKind,
    message: Option<String>,
    new_status: Option<String>,
}

impl NewUpdate {
    #[must_use]
    pub fn progress(message: Option<String>) -> Self {
        Self { kind: UpdateKind::Progress, message, new_status: None }
    }

    /// # Errors
    /// Returns [`TicketError::Validation`] for an empty `new_status`.
    pub fn status(
        new_status: impl Into<String>,
        message: Option<String>,
    ) -> Result<Self, TicketError> {
        let new_status = new_status.into();
        if new_status.is_empty() {
            return Err(TicketError::Validation(
                "newStatus is required when kind=status".to_string(),
            ));
        }
        Ok(Self { kind: UpdateKind::Status, message, new_status: Some(new_status) })
    }

    #[must_use]
    pub fn kind(&self) -> UpdateKind {
        self.kind
    }

    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    #[must_use]
    pub fn new_status(&self) -> Option<&str> {
        self.new_status.as_deref()
    }

    #[must_use]
    pub fn ticket_effect(&self) -> TicketEffect<'_> {
        match (self.kind, self.new_status.as_deref()) {
            (UpdateKind::Status, Some(status)) => TicketEffect::SetStatus(status),
            _ => TicketEffect::Touch,
        }
    }
}

impl UpdatePayload {
    /// # Errors
    /// Returns [`TicketError::Validation`] when `kind` is missing or unknown, or
    /// when `kind=status` arrives without a `newStatus`.
    pub fn validate(self) -> Result<NewUpdate, TicketError> {
        let raw_kind = self
            .kind
            .filter(|kind| !kind.is_empty())
            .ok_or_else(|| TicketError::Validation("kind MUST be provided".to_string()))?;
        let kind = UpdateKind::parse(&raw_kind)
            .ok_or_else(|| TicketError::Validation(format!("unknown kind: {raw_kind}")))?;

        match kind {
            UpdateKind::Progress => Ok(NewUpdate::progress(self.message)),
            UpdateKind::Status => NewUpdate::status(self.new_status.unwrap_or_default(), self.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn must_err<T: std::fmt::Debug>(result: Result<T, TicketError>) -> TicketError {
        match result {
            Ok(value) => panic!("expected validation failure, got {value:?}"),
            Err(err) => err,
        }
    }

    #[test]
    fn create_payload_requires_title_and_body() {
        let missing_title = CreateTicketPayload { title: None, body: Some("floor 3".into()) };
        assert!(matches!(must_err(missing_title.validate()), TicketError::Validation(_)));

        let empty_body = CreateTicketPayload { title: Some("printer jam".into()), body: Some(String::new()) };
        assert!(matches!(must_err(empty_body.validate()), TicketError::Validation(_)));

        let ok = CreateTicketPayload { title: Some("printer jam".into()), body: Some("floor 3".into()) };
        match ok.validate() {
            Ok(ticket) => {
                assert_eq!(ticket.title(), "printer jam");
                assert_eq!(ticket.body(), "floor 3");
            }
            Err(err) => panic!("expected valid ticket: {err}"),
        }
    }

    #[test]
    fn title_bound_counts_utf16_units() {
        let at_limit = "a".repeat(TITLE_MAX_UNITS);
        assert!(NewTicket::new(at_limit, "body").is_ok());

        // Each of these characters needs a surrogate pair.
        let wide = "\u{1F5A8}".repeat(TITLE_MAX_UNITS / 2 + 1);
        assert_eq!(wide.chars().count(), TITLE_MAX_UNITS / 2 + 1);
        assert!(NewTicket::new(wide, "body").is_err());
    }

    #[test]
    fn reply_payload_requires_body() {
        assert!(ReplyPayload::default().validate().is_err());
        assert!(ReplyPayload { body: Some(String::new()) }.validate().is_err());
        assert!(ReplyPayload { body: Some("on my way".into()) }.validate().is_ok());
    }

    #[test]
    fn update_payload_requires_known_kind() {
        assert!(UpdatePayload::default().validate().is_err());

        let unknown = UpdatePayload { kind: Some("escalate".into()), ..UpdatePayload::default() };
        let err = must_err(unknown.validate());
        assert!(err.to_string().contains("unknown kind"));
    }

    #[test]
    fn status_update_requires_new_status() {
        let missing = UpdatePayload { kind: Some("status".into()), ..UpdatePayload::default() };
        assert!(missing.validate().is_err());

        let empty = UpdatePayload {
            kind: Some("status".into()),
            new_status: Some(String::new()),
            ..UpdatePayload::default()
        };
        assert!(empty.validate().is_err());
    }

    #[test]
    fn ticket_effect_is_decided_by_kind() {
        let status = match (UpdatePayload {
            kind: Some("status".into()),
            message: Some("fixed".into()),
            new_status: Some("resolved".into()),
        })
        .validate()
        {
            Ok(update) => update,
            Err(err) => panic!("expected valid status update: {err}"),
        };
        assert_eq!(status.ticket_effect(), TicketEffect::SetStatus("resolved"));
        assert_eq!(status.message(), Some("fixed"));

        let progress = match (UpdatePayload {
            kind: Some("progress".into()),
            message: Some("looking".into()),
            new_status: Some("ignored".into()),
        })
        .validate()
        {
            Ok(update) => update,
            Err(err) => panic!("expected valid progress update: {err}"),
        };
        assert_eq!(progress.ticket_effect(), TicketEffect::Touch);
        assert_eq!(progress.kind(), UpdateKind::Progress);
        assert_eq!(progress.new_status(), None);
    }

    #[test]
    fn payloads_tolerate_unknown_fields_and_camel_case_status() {
        let payload: UpdatePayload = match serde_json::from_str(
            r#"{"kind":"status","newStatus":"resolved","extra":true}"#,
        ) {
            Ok(payload) => payload,
            Err(err) => panic!("payload should decode: {err}"),
        };
        assert_eq!(payload.new_status.as_deref(), Some("resolved"));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_title_length_bound_matches_utf16_count(title in "\\PC{1,260}") {
            let units = title.encode_utf16().count();
            let result = NewTicket::new(title, "body");
            prop_assert_eq!(result.is_ok(), units <= TITLE_MAX_UNITS);
        }

        #[test]
        fn prop_non_empty_reply_bodies_are_accepted(body in ".{1,64}") {
            let accepted = NewReply::new(body.clone());
            prop_assert!(accepted.is_ok());
            if let Ok(reply) = accepted {
                prop_assert_eq!(reply.body(), body.as_str());
            }
        }
    }
}
