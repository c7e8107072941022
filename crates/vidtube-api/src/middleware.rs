use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use axum_extra::extract::CookieJar;
use tracing::debug;

use vidtube_types::models::User;

use crate::convert;
use crate::error::ApiError;
use crate::state::AppState;

pub const ACCESS_COOKIE: &str = "accessToken";
pub const REFRESH_COOKIE: &str = "refreshToken";

/// The authenticated caller, loaded fresh from the store for each request.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

/// Access token from the `accessToken` cookie, falling back to
/// `Authorization: Bearer`.
fn access_token(req: &Request) -> Option<String> {
    let jar = CookieJar::from_headers(req.headers());
    if let Some(cookie) = jar.get(ACCESS_COOKIE) {
        if !cookie.value().is_empty() {
            return Some(cookie.value().to_string());
        }
    }

    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

/// Reject the request unless it carries a valid access token for a user that
/// still exists.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = access_token(&req).ok_or_else(|| ApiError::unauthorized("Unauthorized request"))?;

    let claims = state.tokens.verify_access(&token).map_err(|e| {
        debug!("Rejected access token: {}", e);
        ApiError::unauthorized("Invalid access token")
    })?;

    let user_id = claims.sub.to_string();
    let row = state
        .blocking(move |db, _| db.get_user_by_id(&user_id))
        .await?
        .ok_or_else(|| ApiError::unauthorized("Invalid access token"))?;

    req.extensions_mut()
        .insert(CurrentUser(convert::user(row)?));
    Ok(next.run(req).await)
}
