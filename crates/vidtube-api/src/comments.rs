use axum::{
    Extension,
    extract::{Path, State},
};

use vidtube_types::api::{ContentRequest, PageQuery};
use vidtube_types::models::Comment;

use crate::convert;
use crate::error::ApiError;
use crate::extract::{ApiJson, ApiQuery, parse_id};
use crate::middleware::CurrentUser;
use crate::response::ApiResponse;
use crate::state::AppState;
use crate::tweets::{ensure_owner, required_content};

const MAX_PAGE_SIZE: u32 = 100;

/// `(limit, offset)` for a 1-based page. Out-of-range values are clamped.
fn page_window(query: &PageQuery) -> (u32, u64) {
    let limit = query.limit.clamp(1, MAX_PAGE_SIZE);
    let page = query.page.max(1);
    (limit, u64::from(page - 1) * u64::from(limit))
}

/// GET /comments/{video_id}?page&limit, oldest first.
pub async fn get_video_comments(
    State(state): State<AppState>,
    Path(video_id): Path<String>,
    ApiQuery(query): ApiQuery<PageQuery>,
) -> Result<ApiResponse<Vec<Comment>>, ApiError> {
    let video_id = parse_id(&video_id, "video")?.to_string();
    let (limit, offset) = page_window(&query);

    let rows = state
        .blocking(move |db, _| db.get_comments_for_video(&video_id, limit, offset))
        .await?;

    let comments = rows
        .into_iter()
        .map(convert::comment)
        .collect::<anyhow::Result<Vec<_>>>()?;
    Ok(ApiResponse::ok(comments, "Comments fetched successfully"))
}

pub async fn add_comment(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(video_id): Path<String>,
    ApiJson(req): ApiJson<ContentRequest>,
) -> Result<ApiResponse<Comment>, ApiError> {
    let video_id = parse_id(&video_id, "video")?.to_string();
    let content = required_content(&req)?;
    let owner_id = user.id.to_string();

    let row = state
        .blocking(move |db, _| {
            if db.get_video(&video_id)?.is_none() {
                return Err(ApiError::not_found("Video not found"));
            }
            Ok(db.create_comment(&video_id, &owner_id, &content)?)
        })
        .await?;

    Ok(ApiResponse::created(convert::comment(row)?, "Comment added successfully"))
}

pub async fn update_comment(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(comment_id): Path<String>,
    ApiJson(req): ApiJson<ContentRequest>,
) -> Result<ApiResponse<Comment>, ApiError> {
    let comment_id = parse_id(&comment_id, "comment")?.to_string();
    let content = required_content(&req)?;
    let user_id = user.id.to_string();

    let row = state
        .blocking(move |db, _| {
            let comment = db
                .get_comment(&comment_id)?
                .ok_or_else(|| ApiError::not_found("Comment not found"))?;
            ensure_owner(&comment.owner_id, &user_id, "edit this comment")?;
            db.update_comment(&comment_id, &content)?
                .ok_or_else(|| ApiError::not_found("Comment not found"))
        })
        .await?;

    Ok(ApiResponse::ok(convert::comment(row)?, "Comment updated successfully"))
}

pub async fn delete_comment(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(comment_id): Path<String>,
) -> Result<ApiResponse<Comment>, ApiError> {
    let comment_id = parse_id(&comment_id, "comment")?.to_string();
    let user_id = user.id.to_string();

    let row = state
        .blocking(move |db, _| {
            let comment = db
                .get_comment(&comment_id)?
                .ok_or_else(|| ApiError::not_found("Comment not found"))?;
            ensure_owner(&comment.owner_id, &user_id, "delete this comment")?;
            if !db.delete_comment(&comment_id)? {
                return Err(ApiError::not_found("Comment not found"));
            }
            Ok(comment)
        })
        .await?;

    Ok(ApiResponse::ok(convert::comment(row)?, "Comment deleted successfully"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(page: u32, limit: u32) -> (u32, u64) {
        page_window(&PageQuery { page, limit })
    }

    #[test]
    fn pages_are_one_based_and_capped() {
        assert_eq!(window(1, 10), (10, 0));
        assert_eq!(window(3, 10), (10, 20));
        assert_eq!(window(0, 10), (10, 0));
        assert_eq!(window(2, 500), (100, 100));
        assert_eq!(window(1, 0), (1, 0));
    }
}
