//! Database row types. These map directly to SQLite rows.
//! Distinct from vidtube-types API models to keep the DB layer independent.

#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: String,
    pub username: String,
    pub email: String,
    pub fullname: String,
    pub avatar: String,
    pub cover_image: Option<String>,
    pub password: String,
    pub refresh_token: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Fields needed to insert a user. `password_hash` must already be hashed.
pub struct NewUser<'a> {
    pub username: &'a str,
    pub email: &'a str,
    pub fullname: &'a str,
    pub avatar: &'a str,
    pub cover_image: Option<&'a str>,
    pub password_hash: &'a str,
}

#[derive(Debug, Clone)]
pub struct VideoRow {
    pub id: String,
    pub video_file: String,
    pub thumbnail: String,
    pub title: String,
    pub description: String,
    pub duration: f64,
    pub views: i64,
    pub is_published: bool,
    pub owner_id: String,
    pub created_at: String,
    pub updated_at: String,
}

pub struct NewVideo<'a> {
    pub video_file: &'a str,
    pub thumbnail: &'a str,
    pub title: &'a str,
    pub description: &'a str,
    pub duration: f64,
    pub owner_id: &'a str,
}

#[derive(Debug, Clone)]
pub struct TweetRow {
    pub id: String,
    pub content: String,
    pub owner_id: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone)]
pub struct CommentRow {
    pub id: String,
    pub content: String,
    pub video_id: String,
    pub owner_id: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone)]
pub struct ChannelProfileRow {
    pub id: String,
    pub username: String,
    pub email: String,
    pub fullname: String,
    pub avatar: String,
    pub cover_image: Option<String>,
    pub subscriber_count: i64,
    pub channels_subscribed_to_count: i64,
    pub is_subscribed: bool,
}

/// A watched video joined with its owner. Owner columns are `None` when the
/// owner row is missing.
#[derive(Debug, Clone)]
pub struct WatchHistoryRow {
    pub video: VideoRow,
    pub owner_username: Option<String>,
    pub owner_fullname: Option<String>,
    pub owner_avatar: Option<String>,
}
