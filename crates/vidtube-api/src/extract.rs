use axum::extract::{FromRequest, FromRequestParts};
use uuid::Uuid;

use crate::error::ApiError;

/// `Json` whose rejection is rendered as the failure envelope.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

/// `Query` whose rejection is rendered as the failure envelope.
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub struct ApiQuery<T>(pub T);

/// Parse a path identifier, naming the entity in the error message.
pub fn parse_id(raw: &str, what: &str) -> Result<Uuid, ApiError> {
    raw.trim()
        .parse::<Uuid>()
        .map_err(|_| ApiError::bad_request(format!("Invalid {what} id")))
}

/// Trimmed, non-empty text or `None`.
pub fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_id_rejects_garbage() {
        let id = Uuid::new_v4();
        assert_eq!(parse_id(&id.to_string(), "tweet").unwrap(), id);

        let err = parse_id("not-a-uuid", "tweet").unwrap_err();
        assert_eq!(err.to_string(), "Invalid tweet id");
    }

    #[test]
    fn non_empty_trims() {
        assert_eq!(non_empty(Some("  bob ")), Some("bob"));
        assert_eq!(non_empty(Some("   ")), None);
        assert_eq!(non_empty(None), None);
    }
}
