use axum::{
    Extension,
    extract::{Multipart, Path, State, multipart::MultipartRejection},
};
use serde_json::{Value, json};
use tracing::info;

use vidtube_types::api::{ChangePasswordRequest, UpdateAccountRequest};
use vidtube_types::models::{ChannelProfile, User, WatchedVideo};

use crate::accounts;
use crate::convert;
use crate::error::ApiError;
use crate::extract::ApiJson;
use crate::media::UploadForm;
use crate::middleware::CurrentUser;
use crate::profile;
use crate::response::ApiResponse;
use crate::state::AppState;

/// Which profile image a multipart update replaces.
#[derive(Debug, Clone, Copy)]
enum ProfileImage {
    Avatar,
    Cover,
}

impl ProfileImage {
    fn field(self) -> &'static str {
        match self {
            Self::Avatar => "avatar",
            Self::Cover => "coverImage",
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Avatar => "Avatar",
            Self::Cover => "Cover image",
        }
    }
}

pub async fn change_password(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    ApiJson(req): ApiJson<ChangePasswordRequest>,
) -> Result<ApiResponse<Value>, ApiError> {
    let user_id = user.id.to_string();
    state
        .blocking(move |db, _| {
            accounts::change_password(db, &user_id, &req.old_password, &req.new_password)
        })
        .await?;

    info!("User {} changed their password", user.username);
    Ok(ApiResponse::ok(json!({}), "Password changed successfully"))
}

pub async fn current_user(
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> ApiResponse<User> {
    ApiResponse::ok(user, "Current user fetched successfully")
}

pub async fn update_account_details(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    ApiJson(req): ApiJson<UpdateAccountRequest>,
) -> Result<ApiResponse<User>, ApiError> {
    let user_id = user.id.to_string();
    let updated = state
        .blocking(move |db, _| {
            accounts::update_account(db, &user_id, req.fullname.as_deref(), req.email.as_deref())
        })
        .await?;

    Ok(ApiResponse::ok(updated, "Account details updated successfully"))
}

pub async fn update_avatar(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<ApiResponse<User>, ApiError> {
    replace_image(state, user, multipart?, ProfileImage::Avatar).await
}

pub async fn update_cover_image(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<ApiResponse<User>, ApiError> {
    replace_image(state, user, multipart?, ProfileImage::Cover).await
}

async fn replace_image(
    state: AppState,
    user: User,
    multipart: Multipart,
    image: ProfileImage,
) -> Result<ApiResponse<User>, ApiError> {
    let mut form = UploadForm::read(&state.media, multipart).await?;
    let staged = form
        .take_file(image.field())
        .ok_or_else(|| ApiError::bad_request(format!("{} file is missing", image.label())))?;

    let asset = state
        .media
        .upload(&staged)
        .await
        .ok_or_else(|| ApiError::bad_request(format!("Error while uploading {}", image.field())))?;

    let user_id = user.id.to_string();
    let url = asset.url.clone();
    let updated = state
        .blocking(move |db, _| match image {
            ProfileImage::Avatar => db.update_avatar(&user_id, &url),
            ProfileImage::Cover => db.update_cover_image(&user_id, &url),
        })
        .await
        .and_then(|row| row.ok_or_else(|| ApiError::not_found("User does not exist")));
    let row = match updated {
        Ok(row) => row,
        Err(e) => {
            state.media.discard(&asset.url).await;
            return Err(e);
        }
    };

    let message = format!("{} updated successfully", image.label());
    Ok(ApiResponse::ok(convert::user(row)?, message))
}

/// GET /users/c/{username}
pub async fn channel_profile(
    State(state): State<AppState>,
    Extension(CurrentUser(viewer)): Extension<CurrentUser>,
    Path(username): Path<String>,
) -> Result<ApiResponse<ChannelProfile>, ApiError> {
    let viewer_id = viewer.id.to_string();
    let channel = state
        .blocking(move |db, _| profile::channel_profile(db, &username, &viewer_id))
        .await?;

    Ok(ApiResponse::ok(channel, "User channel fetched successfully"))
}

pub async fn watch_history(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<ApiResponse<Vec<WatchedVideo>>, ApiError> {
    let user_id = user.id.to_string();
    let history = state
        .blocking(move |db, _| profile::watch_history(db, &user_id))
        .await?;

    Ok(ApiResponse::ok(history, "Watch history fetched successfully"))
}
