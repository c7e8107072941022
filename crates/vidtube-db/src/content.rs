use crate::models::{CommentRow, NewVideo, TweetRow, VideoRow};
use crate::{Database, new_id, now};
use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, Row};

pub(crate) const VIDEO_COLUMNS: &str = "id, video_file, thumbnail, title, description, duration, views, is_published, owner_id, created_at, updated_at";

impl Database {
    // -- Videos --

    pub fn create_video(&self, video: &NewVideo<'_>) -> Result<VideoRow> {
        let id = new_id();
        let ts = now();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO videos (id, video_file, thumbnail, title, description, duration, owner_id, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
                rusqlite::params![
                    id,
                    video.video_file,
                    video.thumbnail,
                    video.title,
                    video.description,
                    video.duration,
                    video.owner_id,
                    ts,
                ],
            )?;
            query_video(conn, &id)?.ok_or_else(|| anyhow::anyhow!("video {} vanished after insert", id))
        })
    }

    pub fn get_video(&self, id: &str) -> Result<Option<VideoRow>> {
        self.with_conn(|conn| query_video(conn, id))
    }

    /// Flip `is_published`. `None` when the video does not exist.
    pub fn toggle_publish(&self, id: &str) -> Result<Option<VideoRow>> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE videos SET is_published = NOT is_published, updated_at = ?2 WHERE id = ?1",
                rusqlite::params![id, now()],
            )?;
            query_video(conn, id)
        })
    }

    /// Count a view and move the video to the end of the viewer's watch
    /// history, in one transaction.
    pub fn record_view(&self, video_id: &str, viewer_id: &str) -> Result<Option<VideoRow>> {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            let changed = tx.execute(
                "UPDATE videos SET views = views + 1 WHERE id = ?1",
                [video_id],
            )?;
            if changed == 0 {
                return Ok(None);
            }

            tx.execute(
                "INSERT INTO watch_history (user_id, video_id, position, watched_at)
                 VALUES (?1, ?2,
                         (SELECT COALESCE(MAX(position), 0) + 1 FROM watch_history WHERE user_id = ?1),
                         ?3)
                 ON CONFLICT(user_id, video_id) DO UPDATE
                 SET position = excluded.position, watched_at = excluded.watched_at",
                rusqlite::params![viewer_id, video_id, now()],
            )?;

            let video = query_video(&tx, video_id)?;
            tx.commit()?;
            Ok(video)
        })
    }

    // -- Tweets --

    pub fn create_tweet(&self, owner_id: &str, content: &str) -> Result<TweetRow> {
        let id = new_id();
        let ts = now();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO tweets (id, content, owner_id, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?4)",
                rusqlite::params![id, content, owner_id, ts],
            )?;
            query_tweet(conn, &id)?.ok_or_else(|| anyhow::anyhow!("tweet {} vanished after insert", id))
        })
    }

    pub fn get_tweet(&self, id: &str) -> Result<Option<TweetRow>> {
        self.with_conn(|conn| query_tweet(conn, id))
    }

    pub fn get_tweets_by_owner(&self, owner_id: &str) -> Result<Vec<TweetRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, content, owner_id, created_at, updated_at FROM tweets
                 WHERE owner_id = ?1
                 ORDER BY created_at DESC, rowid DESC",
            )?;
            let rows = stmt
                .query_map([owner_id], tweet_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn update_tweet(&self, id: &str, content: &str) -> Result<Option<TweetRow>> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE tweets SET content = ?2, updated_at = ?3 WHERE id = ?1",
                rusqlite::params![id, content, now()],
            )?;
            query_tweet(conn, id)
        })
    }

    pub fn delete_tweet(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| Ok(conn.execute("DELETE FROM tweets WHERE id = ?1", [id])? == 1))
    }

    // -- Comments --

    pub fn create_comment(&self, video_id: &str, owner_id: &str, content: &str) -> Result<CommentRow> {
        let id = new_id();
        let ts = now();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO comments (id, content, video_id, owner_id, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
                rusqlite::params![id, content, video_id, owner_id, ts],
            )?;
            query_comment(conn, &id)?
                .ok_or_else(|| anyhow::anyhow!("comment {} vanished after insert", id))
        })
    }

    pub fn get_comment(&self, id: &str) -> Result<Option<CommentRow>> {
        self.with_conn(|conn| query_comment(conn, id))
    }

    /// Oldest first, `limit` rows starting at `offset`.
    pub fn get_comments_for_video(
        &self,
        video_id: &str,
        limit: u32,
        offset: u64,
    ) -> Result<Vec<CommentRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, content, video_id, owner_id, created_at, updated_at FROM comments
                 WHERE video_id = ?1
                 ORDER BY created_at ASC, rowid ASC
                 LIMIT ?2 OFFSET ?3",
            )?;
            let rows = stmt
                .query_map(rusqlite::params![video_id, limit, offset as i64], comment_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn update_comment(&self, id: &str, content: &str) -> Result<Option<CommentRow>> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE comments SET content = ?2, updated_at = ?3 WHERE id = ?1",
                rusqlite::params![id, content, now()],
            )?;
            query_comment(conn, id)
        })
    }

    pub fn delete_comment(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| Ok(conn.execute("DELETE FROM comments WHERE id = ?1", [id])? == 1))
    }
}

fn query_video(conn: &Connection, id: &str) -> Result<Option<VideoRow>> {
    let sql = format!("SELECT {VIDEO_COLUMNS} FROM videos WHERE id = ?1");
    Ok(conn.query_row(&sql, [id], |row| video_from_row(row, 0)).optional()?)
}

fn query_tweet(conn: &Connection, id: &str) -> Result<Option<TweetRow>> {
    Ok(conn
        .query_row(
            "SELECT id, content, owner_id, created_at, updated_at FROM tweets WHERE id = ?1",
            [id],
            tweet_from_row,
        )
        .optional()?)
}

fn query_comment(conn: &Connection, id: &str) -> Result<Option<CommentRow>> {
    Ok(conn
        .query_row(
            "SELECT id, content, video_id, owner_id, created_at, updated_at FROM comments WHERE id = ?1",
            [id],
            comment_from_row,
        )
        .optional()?)
}

/// Reads the `VIDEO_COLUMNS` starting at column index `start`.
pub(crate) fn video_from_row(row: &Row<'_>, start: usize) -> rusqlite::Result<VideoRow> {
    Ok(VideoRow {
        id: row.get(start)?,
        video_file: row.get(start + 1)?,
        thumbnail: row.get(start + 2)?,
        title: row.get(start + 3)?,
        description: row.get(start + 4)?,
        duration: row.get(start + 5)?,
        views: row.get(start + 6)?,
        is_published: row.get(start + 7)?,
        owner_id: row.get(start + 8)?,
        created_at: row.get(start + 9)?,
        updated_at: row.get(start + 10)?,
    })
}

fn tweet_from_row(row: &Row<'_>) -> rusqlite::Result<TweetRow> {
    Ok(TweetRow {
        id: row.get(0)?,
        content: row.get(1)?,
        owner_id: row.get(2)?,
        created_at: row.get(3)?,
        updated_at: row.get(4)?,
    })
}

fn comment_from_row(row: &Row<'_>) -> rusqlite::Result<CommentRow> {
    Ok(CommentRow {
        id: row.get(0)?,
        content: row.get(1)?,
        video_id: row.get(2)?,
        owner_id: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}
