//! Row-to-wire conversions. Stored ids and timestamps are text; anything that
//! fails to parse is reported as corrupt data rather than guessed at.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use vidtube_db::models::{ChannelProfileRow, CommentRow, TweetRow, UserRow, VideoRow};
use vidtube_types::models::{ChannelProfile, Comment, Tweet, User, Video};

pub fn stored_id(raw: &str) -> Result<Uuid> {
    raw.parse().with_context(|| format!("corrupt id '{}'", raw))
}

pub fn stored_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("corrupt timestamp '{}'", raw))?
        .with_timezone(&Utc))
}

/// Drops the password hash and refresh token.
pub fn user(row: UserRow) -> Result<User> {
    Ok(User {
        id: stored_id(&row.id)?,
        username: row.username,
        email: row.email,
        fullname: row.fullname,
        avatar: row.avatar,
        cover_image: row.cover_image,
        created_at: stored_timestamp(&row.created_at)?,
        updated_at: stored_timestamp(&row.updated_at)?,
    })
}

pub fn video(row: VideoRow) -> Result<Video> {
    Ok(Video {
        id: stored_id(&row.id)?,
        video_file: row.video_file,
        thumbnail: row.thumbnail,
        title: row.title,
        description: row.description,
        duration: row.duration,
        views: row.views,
        is_published: row.is_published,
        owner: stored_id(&row.owner_id)?,
        created_at: stored_timestamp(&row.created_at)?,
        updated_at: stored_timestamp(&row.updated_at)?,
    })
}

pub fn tweet(row: TweetRow) -> Result<Tweet> {
    Ok(Tweet {
        id: stored_id(&row.id)?,
        content: row.content,
        owner: stored_id(&row.owner_id)?,
        created_at: stored_timestamp(&row.created_at)?,
        updated_at: stored_timestamp(&row.updated_at)?,
    })
}

pub fn comment(row: CommentRow) -> Result<Comment> {
    Ok(Comment {
        id: stored_id(&row.id)?,
        content: row.content,
        video: stored_id(&row.video_id)?,
        owner: stored_id(&row.owner_id)?,
        created_at: stored_timestamp(&row.created_at)?,
        updated_at: stored_timestamp(&row.updated_at)?,
    })
}

pub fn channel_profile(row: ChannelProfileRow) -> Result<ChannelProfile> {
    Ok(ChannelProfile {
        id: stored_id(&row.id)?,
        fullname: row.fullname,
        username: row.username,
        subscriber_count: row.subscriber_count,
        channels_subscribed_to_count: row.channels_subscribed_to_count,
        is_subscribed: row.is_subscribed,
        avatar: row.avatar,
        cover_image: row.cover_image,
        email: row.email,
    })
}
