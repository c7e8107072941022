//! Read-side aggregations over users, subscriptions and watch history.

use anyhow::anyhow;

use vidtube_db::Database;
use vidtube_db::models::WatchHistoryRow;
use vidtube_types::models::{ChannelProfile, VideoOwner, WatchedVideo};

use crate::accounts::normalize_username;
use crate::convert;
use crate::error::ApiError;

/// Public channel view of `username` as seen by `viewer_id`.
pub fn channel_profile(
    db: &Database,
    username: &str,
    viewer_id: &str,
) -> Result<ChannelProfile, ApiError> {
    let username = normalize_username(username);
    if username.is_empty() {
        return Err(ApiError::bad_request("username is missing"));
    }

    let row = db
        .channel_profile(&username, Some(viewer_id))?
        .ok_or_else(|| ApiError::not_found("Channel does not exist"))?;
    Ok(convert::channel_profile(row)?)
}

/// Videos `user_id` has watched, in watch order, each with its owner summary.
pub fn watch_history(db: &Database, user_id: &str) -> Result<Vec<WatchedVideo>, ApiError> {
    db.watch_history(user_id)?
        .into_iter()
        .map(watched_video)
        .collect()
}

fn watched_video(row: WatchHistoryRow) -> Result<WatchedVideo, ApiError> {
    let (Some(username), Some(fullname), Some(avatar)) =
        (row.owner_username, row.owner_fullname, row.owner_avatar)
    else {
        return Err(ApiError::Internal(anyhow!(
            "video {} references a missing owner {}",
            row.video.id,
            row.video.owner_id
        )));
    };

    let video = convert::video(row.video)?;
    Ok(WatchedVideo {
        id: video.id,
        video_file: video.video_file,
        thumbnail: video.thumbnail,
        title: video.title,
        description: video.description,
        duration: video.duration,
        views: video.views,
        is_published: video.is_published,
        owner: VideoOwner {
            username,
            fullname,
            avatar,
        },
        created_at: video.created_at,
        updated_at: video.updated_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use vidtube_db::models::NewVideo;

    use crate::accounts::tests::register;

    #[test]
    fn channel_counts_and_viewer_flag() {
        let db = Database::open_in_memory().unwrap();
        let chan = register(&db, "chan", "pw");
        let fans: Vec<_> = ["ann", "ben", "cat"]
            .iter()
            .map(|name| register(&db, name, "pw"))
            .collect();
        for fan in &fans {
            db.toggle_subscription(&fan.id.to_string(), &chan.id.to_string())
                .unwrap();
        }
        // chan follows ann back
        db.toggle_subscription(&chan.id.to_string(), &fans[0].id.to_string())
            .unwrap();

        let seen_by_ben = channel_profile(&db, "Chan", &fans[1].id.to_string()).unwrap();
        assert_eq!(seen_by_ben.username, "chan");
        assert_eq!(seen_by_ben.subscriber_count, 3);
        assert_eq!(seen_by_ben.channels_subscribed_to_count, 1);
        assert!(seen_by_ben.is_subscribed);

        let seen_by_self = channel_profile(&db, "chan", &chan.id.to_string()).unwrap();
        assert!(!seen_by_self.is_subscribed);
    }

    #[test]
    fn unknown_or_blank_channel() {
        let db = Database::open_in_memory().unwrap();
        let viewer = register(&db, "viewer", "pw").id.to_string();

        assert!(matches!(
            channel_profile(&db, "ghost", &viewer),
            Err(ApiError::NotFound(_))
        ));
        assert!(matches!(
            channel_profile(&db, "   ", &viewer),
            Err(ApiError::BadRequest(_))
        ));
    }

    #[test]
    fn history_carries_owner_summary() {
        let db = Database::open_in_memory().unwrap();
        let owner = register(&db, "maker", "pw");
        let viewer = register(&db, "viewer", "pw").id.to_string();

        let first = db
            .create_video(&NewVideo {
                video_file: "http://media/1.mp4",
                thumbnail: "http://media/1.png",
                title: "First",
                description: "one",
                duration: 12.5,
                owner_id: &owner.id.to_string(),
            })
            .unwrap();
        let second = db
            .create_video(&NewVideo {
                video_file: "http://media/2.mp4",
                thumbnail: "http://media/2.png",
                title: "Second",
                description: "two",
                duration: 30.0,
                owner_id: &owner.id.to_string(),
            })
            .unwrap();

        db.record_view(&first.id, &viewer).unwrap();
        db.record_view(&second.id, &viewer).unwrap();

        let history = watch_history(&db, &viewer).unwrap();
        let titles: Vec<_> = history.iter().map(|v| v.title.as_str()).collect();
        assert_eq!(titles, ["First", "Second"]);
        assert_eq!(history[0].owner.username, "maker");
        assert_eq!(history[0].owner.fullname, "maker Person");

        let json = serde_json::to_value(&history[0]).unwrap();
        assert!(json["owner"].get("email").is_none());
    }

    #[test]
    fn empty_history() {
        let db = Database::open_in_memory().unwrap();
        let viewer = register(&db, "viewer", "pw").id.to_string();
        assert!(watch_history(&db, &viewer).unwrap().is_empty());
    }
}
