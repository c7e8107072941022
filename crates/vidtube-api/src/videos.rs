use axum::{
    Extension,
    extract::{Multipart, Path, State, multipart::MultipartRejection},
};
use tracing::info;

use vidtube_db::models::NewVideo;
use vidtube_types::models::Video;

use crate::convert;
use crate::error::ApiError;
use crate::extract::parse_id;
use crate::media::{MediaAsset, UploadForm};
use crate::middleware::CurrentUser;
use crate::response::ApiResponse;
use crate::state::AppState;
use crate::tweets::ensure_owner;

/// Length in seconds. Required on publish.
fn parse_duration(raw: Option<&str>) -> Result<f64, ApiError> {
    let raw = raw.ok_or_else(|| ApiError::bad_request("duration is required"))?;
    raw.parse::<f64>()
        .ok()
        .filter(|d| d.is_finite() && *d >= 0.0)
        .ok_or_else(|| ApiError::bad_request("duration must be a non-negative number"))
}

/// POST /videos (multipart: videoFile, thumbnail, title, description,
/// duration in seconds)
pub async fn publish_video(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<ApiResponse<Video>, ApiError> {
    let mut form = UploadForm::read(&state.media, multipart?).await?;

    let (Some(title), Some(description)) = (
        form.text("title").map(str::to_string),
        form.text("description").map(str::to_string),
    ) else {
        return Err(ApiError::bad_request("title and description are required"));
    };
    let duration = parse_duration(form.text("duration"))?;

    let (Some(video_path), Some(thumbnail_path)) =
        (form.take_file("videoFile"), form.take_file("thumbnail"))
    else {
        return Err(ApiError::bad_request("videoFile and thumbnail are required"));
    };

    let Some(assets) = state
        .media
        .upload_all(&[video_path, thumbnail_path])
        .await
    else {
        return Err(ApiError::bad_request("Error while uploading video files"));
    };
    let [video_file, thumbnail] = <[MediaAsset; 2]>::try_from(assets)
        .map_err(|_| anyhow::anyhow!("expected two stored assets"))?;

    let stored = [video_file.url.clone(), thumbnail.url.clone()];
    let owner_id = user.id.to_string();
    let created = state
        .blocking(move |db, _| {
            db.create_video(&NewVideo {
                video_file: &video_file.url,
                thumbnail: &thumbnail.url,
                title: &title,
                description: &description,
                duration,
                owner_id: &owner_id,
            })
        })
        .await;
    let row = match created {
        Ok(row) => row,
        Err(e) => {
            for url in &stored {
                state.media.discard(url).await;
            }
            return Err(e);
        }
    };

    info!("User {} published video {}", user.username, row.id);
    Ok(ApiResponse::created(convert::video(row)?, "Video published successfully"))
}

/// GET /videos/{video_id}. Counts a view and records it in the caller's
/// watch history.
pub async fn get_video(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(video_id): Path<String>,
) -> Result<ApiResponse<Video>, ApiError> {
    let video_id = parse_id(&video_id, "video")?.to_string();
    let viewer_id = user.id.to_string();

    let row = state
        .blocking(move |db, _| {
            let video = db
                .get_video(&video_id)?
                .ok_or_else(|| ApiError::not_found("Video not found"))?;
            // Unpublished videos look missing to everyone but the owner.
            if !video.is_published && video.owner_id != viewer_id {
                return Err(ApiError::not_found("Video not found"));
            }
            db.record_view(&video_id, &viewer_id)?
                .ok_or_else(|| ApiError::not_found("Video not found"))
        })
        .await?;

    Ok(ApiResponse::ok(convert::video(row)?, "Video fetched successfully"))
}

/// PATCH /videos/toggle/publish/{video_id}. Owner only.
pub async fn toggle_publish_status(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(video_id): Path<String>,
) -> Result<ApiResponse<Video>, ApiError> {
    let video_id = parse_id(&video_id, "video")?.to_string();
    let user_id = user.id.to_string();

    let row = state
        .blocking(move |db, _| {
            let video = db
                .get_video(&video_id)?
                .ok_or_else(|| ApiError::not_found("Video not found"))?;
            ensure_owner(&video.owner_id, &user_id, "change the publish status")?;
            db.toggle_publish(&video_id)?
                .ok_or_else(|| ApiError::not_found("Video not found"))
        })
        .await?;

    info!(
        "User {} set video {} published={}",
        user.username, row.id, row.is_published
    );
    Ok(ApiResponse::ok(convert::video(row)?, "Publish status toggled successfully"))
}
