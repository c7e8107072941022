use axum::{
    Extension,
    extract::{Path, State},
};
use tracing::info;

use vidtube_types::api::ContentRequest;
use vidtube_types::models::Tweet;

use crate::convert;
use crate::error::ApiError;
use crate::extract::{ApiJson, non_empty, parse_id};
use crate::middleware::CurrentUser;
use crate::response::ApiResponse;
use crate::state::AppState;

pub(crate) fn required_content(req: &ContentRequest) -> Result<String, ApiError> {
    non_empty(Some(&req.content))
        .map(str::to_string)
        .ok_or_else(|| ApiError::bad_request("Content is required"))
}

/// Fail with `Forbidden` unless `user_id` owns the item.
pub(crate) fn ensure_owner(owner_id: &str, user_id: &str, action: &str) -> Result<(), ApiError> {
    if owner_id != user_id {
        return Err(ApiError::forbidden(format!("Only the owner can {action}")));
    }
    Ok(())
}

pub async fn create_tweet(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    ApiJson(req): ApiJson<ContentRequest>,
) -> Result<ApiResponse<Tweet>, ApiError> {
    let content = required_content(&req)?;
    let owner_id = user.id.to_string();
    let row = state
        .blocking(move |db, _| db.create_tweet(&owner_id, &content))
        .await?;

    info!("User {} posted tweet {}", user.username, row.id);
    Ok(ApiResponse::created(convert::tweet(row)?, "Tweet created successfully"))
}

/// GET /tweets/user/{user_id}, newest first.
pub async fn get_user_tweets(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<ApiResponse<Vec<Tweet>>, ApiError> {
    let user_id = parse_id(&user_id, "user")?.to_string();
    let rows = state
        .blocking(move |db, _| db.get_tweets_by_owner(&user_id))
        .await?;

    let tweets = rows
        .into_iter()
        .map(convert::tweet)
        .collect::<anyhow::Result<Vec<_>>>()?;
    Ok(ApiResponse::ok(tweets, "User tweets fetched successfully"))
}

pub async fn update_tweet(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(tweet_id): Path<String>,
    ApiJson(req): ApiJson<ContentRequest>,
) -> Result<ApiResponse<Tweet>, ApiError> {
    let tweet_id = parse_id(&tweet_id, "tweet")?.to_string();
    let content = required_content(&req)?;
    let user_id = user.id.to_string();

    let row = state
        .blocking(move |db, _| {
            let tweet = db
                .get_tweet(&tweet_id)?
                .ok_or_else(|| ApiError::not_found("Tweet not found"))?;
            ensure_owner(&tweet.owner_id, &user_id, "edit this tweet")?;
            db.update_tweet(&tweet_id, &content)?
                .ok_or_else(|| ApiError::not_found("Tweet not found"))
        })
        .await?;

    Ok(ApiResponse::ok(convert::tweet(row)?, "Tweet updated successfully"))
}

pub async fn delete_tweet(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(tweet_id): Path<String>,
) -> Result<ApiResponse<Tweet>, ApiError> {
    let tweet_id = parse_id(&tweet_id, "tweet")?.to_string();
    let user_id = user.id.to_string();

    let row = state
        .blocking(move |db, _| {
            let tweet = db
                .get_tweet(&tweet_id)?
                .ok_or_else(|| ApiError::not_found("Tweet not found"))?;
            ensure_owner(&tweet.owner_id, &user_id, "delete this tweet")?;
            if !db.delete_tweet(&tweet_id)? {
                return Err(ApiError::not_found("Tweet not found"));
            }
            Ok(tweet)
        })
        .await?;

    info!("User {} deleted tweet {}", user.username, row.id);
    Ok(ApiResponse::ok(convert::tweet(row)?, "Tweet deleted successfully"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_content_is_rejected() {
        let req = ContentRequest {
            content: "   ".into(),
        };
        assert!(matches!(required_content(&req), Err(ApiError::BadRequest(_))));

        let req = ContentRequest {
            content: " hello ".into(),
        };
        assert_eq!(required_content(&req).unwrap(), "hello");
    }

    #[test]
    fn ownership_check() {
        assert!(ensure_owner("a", "a", "delete this tweet").is_ok());
        let err = ensure_owner("a", "b", "delete this tweet").unwrap_err();
        assert_eq!(err.to_string(), "Only the owner can delete this tweet");
    }
}
