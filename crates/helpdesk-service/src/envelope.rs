//! Request body decoding and response construction shared by all routes.

use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::error::EndpointError;

const BYTE_ORDER_MARK: char = '\u{feff}';

/// Parses a request body as JSON.
///
/// The raw bytes are tried first. If that fails the body is decoded as text
/// (lossily, with a leading byte-order mark removed) and parsed again. Only
/// when both attempts fail is the body rejected as `invalid_json`.
///
/// # Errors
/// Returns [`EndpointError::InvalidJson`] for an empty or undecodable body.
pub fn read_json(body: &[u8]) -> Result<Value, EndpointError> {
    match serde_json::from_slice::<Value>(body) {
        Ok(value) => Ok(value),
        Err(primary) => {
            let text = String::from_utf8_lossy(body);
            let text = text.trim_start_matches(BYTE_ORDER_MARK);
            if text.trim().is_empty() {
                debug!("request body is empty");
                return Err(EndpointError::InvalidJson);
            }
            serde_json::from_str::<Value>(text).map_err(|fallback| {
                debug!(primary = %primary, fallback = %fallback, "request body is not JSON");
                EndpointError::InvalidJson
            })
        }
    }
}

/// Parses the body and maps it onto a payload type.
///
/// A body that is JSON but has the wrong shape (not an object, or a field of
/// the wrong type) is a `bad_request`, not `invalid_json`.
///
/// # Errors
/// Returns [`EndpointError::InvalidJson`] or [`EndpointError::BadRequest`].
pub fn decode_payload<T: DeserializeOwned>(body: &[u8]) -> Result<T, EndpointError> {
    let value = read_json(body)?;
    serde_json::from_value(value).map_err(|err| EndpointError::BadRequest(err.to_string()))
}

pub fn json_response<T: Serialize>(status: StatusCode, cors: HeaderMap, body: &T) -> Response {
    (status, cors, Json(body)).into_response()
}

pub fn empty_response(status: StatusCode, cors: HeaderMap) -> Response {
    (status, cors).into_response()
}
