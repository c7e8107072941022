use axum::{
    Extension,
    extract::{Path, State},
};
use tracing::info;

use vidtube_types::api::SubscriptionToggle;

use crate::error::ApiError;
use crate::extract::parse_id;
use crate::middleware::CurrentUser;
use crate::response::ApiResponse;
use crate::state::AppState;

/// POST /subscriptions/c/{channel_id}
pub async fn toggle_subscription(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(channel_id): Path<String>,
) -> Result<ApiResponse<SubscriptionToggle>, ApiError> {
    let channel_id = parse_id(&channel_id, "channel")?;
    if channel_id == user.id {
        return Err(ApiError::bad_request("You cannot subscribe to your own channel"));
    }

    let subscriber_id = user.id.to_string();
    let channel = channel_id.to_string();
    let subscribed = state
        .blocking(move |db, _| {
            if db.get_user_by_id(&channel)?.is_none() {
                return Err(ApiError::not_found("Channel does not exist"));
            }
            Ok(db.toggle_subscription(&subscriber_id, &channel)?)
        })
        .await?;

    info!(
        "User {} {} channel {}",
        user.username,
        if subscribed { "subscribed to" } else { "unsubscribed from" },
        channel_id
    );
    let message = if subscribed {
        "Subscribed successfully"
    } else {
        "Unsubscribed successfully"
    };
    Ok(ApiResponse::ok(SubscriptionToggle { subscribed }, message))
}
