use crate::content::{VIDEO_COLUMNS, video_from_row};
use crate::models::{ChannelProfileRow, WatchHistoryRow};
use crate::{Database, new_id, now};
use anyhow::Result;
use rusqlite::OptionalExtension;

impl Database {
    // -- Subscriptions --

    /// Toggle a subscription edge: removes it if present, inserts it if not.
    /// Returns true when the edge now exists.
    pub fn toggle_subscription(&self, subscriber_id: &str, channel_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let removed = conn.execute(
                "DELETE FROM subscriptions WHERE subscriber_id = ?1 AND channel_id = ?2",
                [subscriber_id, channel_id],
            )?;
            if removed > 0 {
                return Ok(false);
            }

            conn.execute(
                "INSERT INTO subscriptions (id, subscriber_id, channel_id, created_at) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![new_id(), subscriber_id, channel_id, now()],
            )?;
            Ok(true)
        })
    }

    // -- Aggregations --

    /// Channel view of `username`: both subscription counts plus whether
    /// `viewer_id` is one of its subscribers.
    pub fn channel_profile(
        &self,
        username: &str,
        viewer_id: Option<&str>,
    ) -> Result<Option<ChannelProfileRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT u.id, u.username, u.email, u.fullname, u.avatar, u.cover_image,
                            (SELECT COUNT(*) FROM subscriptions s WHERE s.channel_id = u.id),
                            (SELECT COUNT(*) FROM subscriptions s WHERE s.subscriber_id = u.id),
                            EXISTS(SELECT 1 FROM subscriptions s
                                   WHERE s.channel_id = u.id AND s.subscriber_id = ?2)
                     FROM users u
                     WHERE u.username = ?1",
                    rusqlite::params![username, viewer_id],
                    |row| {
                        Ok(ChannelProfileRow {
                            id: row.get(0)?,
                            username: row.get(1)?,
                            email: row.get(2)?,
                            fullname: row.get(3)?,
                            avatar: row.get(4)?,
                            cover_image: row.get(5)?,
                            subscriber_count: row.get(6)?,
                            channels_subscribed_to_count: row.get(7)?,
                            is_subscribed: row.get(8)?,
                        })
                    },
                )
                .optional()?;
            Ok(row)
        })
    }

    /// Watched videos in watch order, each joined with its owner.
    pub fn watch_history(&self, user_id: &str) -> Result<Vec<WatchHistoryRow>> {
        self.with_conn(|conn| {
            let columns = VIDEO_COLUMNS
                .split(", ")
                .map(|c| format!("v.{c}"))
                .collect::<Vec<_>>()
                .join(", ");
            let sql = format!(
                "SELECT {columns}, o.username, o.fullname, o.avatar
                 FROM watch_history w
                 JOIN videos v ON v.id = w.video_id
                 LEFT JOIN users o ON o.id = v.owner_id
                 WHERE w.user_id = ?1
                 ORDER BY w.position ASC"
            );

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([user_id], |row| {
                    Ok(WatchHistoryRow {
                        video: video_from_row(row, 0)?,
                        owner_username: row.get(11)?,
                        owner_fullname: row.get(12)?,
                        owner_avatar: row.get(13)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }
}
