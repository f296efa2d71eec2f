//! Maps failed downstream calls into the domain error taxonomy.

use crate::errors::CompositeError;
use http::StatusCode;
use serde::Deserialize;

/// The only part of the downstream error envelope the normalizer cares about.
#[derive(Deserialize)]
struct EnvelopeMessage {
    message: String,
}

/// Normalizes a downstream response that carried a non-success status.
///
/// 404 becomes `NotFound`, 422 becomes `InvalidInput`, everything else is
/// `Unexpected` and is logged together with the raw body. The message is
/// taken from the error envelope when the body parses, otherwise from
/// `transport_message`.
pub fn normalize_status(
    status: StatusCode,
    body: &[u8],
    transport_message: &str,
) -> CompositeError {
    match status {
        StatusCode::NOT_FOUND => {
            CompositeError::NotFound(error_message(body, transport_message))
        }
        StatusCode::UNPROCESSABLE_ENTITY => {
            CompositeError::InvalidInput(error_message(body, transport_message))
        }
        _ => {
            let raw_body = String::from_utf8_lossy(body);
            tracing::warn!(
                status = status.as_u16(),
                body = %raw_body,
                "Got an unexpected HTTP error, will rethrow it"
            );
            CompositeError::Unexpected {
                status: Some(status.as_u16()),
                message: error_message(body, transport_message),
            }
        }
    }
}

/// Normalizes a failure that never produced a response (connect error,
/// timeout, undecodable body).
pub fn normalize_transport(message: impl Into<String>) -> CompositeError {
    let message = message.into();
    tracing::warn!(error = %message, "Got an unexpected transport error, will rethrow it");
    CompositeError::unexpected(message)
}

fn error_message(body: &[u8], transport_message: &str) -> String {
    serde_json::from_slice::<EnvelopeMessage>(body)
        .map(|envelope| envelope.message)
        .unwrap_or_else(|_| transport_message.to_string())
}
