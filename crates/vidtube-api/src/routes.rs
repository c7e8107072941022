use anyhow::{Context, Result};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{
        HeaderValue, Method,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
    middleware,
    routing::{get, patch, post},
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::error::ApiError;
use crate::middleware::require_auth;
use crate::state::AppState;
use crate::{auth, comments, subscriptions, tweets, users, videos};

/// Body limit for everything that is not a file upload.
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Body limit for the multipart upload routes. Parts are streamed to disk.
const MAX_UPLOAD_BYTES: usize = 1024 * 1024 * 1024;

fn upload_limit() -> DefaultBodyLimit {
    DefaultBodyLimit::max(MAX_UPLOAD_BYTES)
}

/// The whole HTTP surface, mounted under `/api/v1`.
pub fn router(state: AppState) -> Result<Router> {
    let public = Router::new()
        .route("/users/register", post(auth::register).layer(upload_limit()))
        .route("/users/login", post(auth::login))
        .route("/users/refresh-token", post(auth::refresh_access_token));

    let protected = Router::new()
        .route("/users/logout", post(auth::logout))
        .route(
            "/users/change-password",
            post(users::change_password).patch(users::change_password),
        )
        .route("/users/current-user", get(users::current_user))
        .route("/users/update-account-details", patch(users::update_account_details))
        .route(
            "/users/update-user-avatar",
            patch(users::update_avatar).layer(upload_limit()),
        )
        .route(
            "/users/update-cover-image",
            patch(users::update_cover_image).layer(upload_limit()),
        )
        .route("/users/c/{username}", get(users::channel_profile))
        .route("/users/watch-history", get(users::watch_history))
        .route("/tweets", post(tweets::create_tweet))
        .route("/tweets/user/{user_id}", get(tweets::get_user_tweets))
        .route(
            "/tweets/{tweet_id}",
            patch(tweets::update_tweet).delete(tweets::delete_tweet),
        )
        .route(
            "/comments/{video_id}",
            get(comments::get_video_comments).post(comments::add_comment),
        )
        .route(
            "/comments/c/{comment_id}",
            patch(comments::update_comment).delete(comments::delete_comment),
        )
        .route("/videos", post(videos::publish_video).layer(upload_limit()))
        .route("/videos/{video_id}", get(videos::get_video))
        .route(
            "/videos/toggle/publish/{video_id}",
            patch(videos::toggle_publish_status),
        )
        .route(
            "/subscriptions/c/{channel_id}",
            post(subscriptions::toggle_subscription),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    let cors = cors_layer(state.config.cors_origin.as_deref())?;

    Ok(Router::new()
        .nest("/api/v1", public.merge(protected))
        .fallback(not_found)
        .method_not_allowed_fallback(method_not_allowed)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state))
}

async fn not_found() -> ApiError {
    ApiError::not_found("Route not found")
}

async fn method_not_allowed() -> ApiError {
    ApiError::MethodNotAllowed
}

/// Credentialed CORS for a single configured origin, permissive otherwise.
fn cors_layer(origin: Option<&str>) -> Result<CorsLayer> {
    let Some(origin) = origin else {
        return Ok(CorsLayer::permissive());
    };

    let origin = HeaderValue::from_str(origin)
        .with_context(|| format!("CORS_ORIGIN '{}' is not a valid header value", origin))?;
    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::exact(origin))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
        .allow_credentials(true))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cors_origin_must_be_a_header_value() {
        assert!(cors_layer(None).is_ok());
        assert!(cors_layer(Some("https://vidtube.example")).is_ok());
        assert!(cors_layer(Some("bad\norigin")).is_err());
    }
}
