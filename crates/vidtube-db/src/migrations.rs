use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id              TEXT PRIMARY KEY,
            username        TEXT NOT NULL UNIQUE,
            email           TEXT NOT NULL UNIQUE,
            fullname        TEXT NOT NULL,
            avatar          TEXT NOT NULL,
            cover_image     TEXT,
            password        TEXT NOT NULL,
            refresh_token   TEXT,
            created_at      TEXT NOT NULL,
            updated_at      TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS videos (
            id              TEXT PRIMARY KEY,
            video_file      TEXT NOT NULL,
            thumbnail       TEXT NOT NULL,
            title           TEXT NOT NULL,
            description     TEXT NOT NULL,
            duration        REAL NOT NULL,
            views           INTEGER NOT NULL DEFAULT 0,
            is_published    INTEGER NOT NULL DEFAULT 1,
            owner_id        TEXT NOT NULL REFERENCES users(id),
            created_at      TEXT NOT NULL,
            updated_at      TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_videos_owner
            ON videos(owner_id);

        CREATE TABLE IF NOT EXISTS tweets (
            id              TEXT PRIMARY KEY,
            content         TEXT NOT NULL,
            owner_id        TEXT NOT NULL REFERENCES users(id),
            created_at      TEXT NOT NULL,
            updated_at      TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_tweets_owner
            ON tweets(owner_id, created_at);

        CREATE TABLE IF NOT EXISTS comments (
            id              TEXT PRIMARY KEY,
            content         TEXT NOT NULL,
            video_id        TEXT NOT NULL REFERENCES videos(id) ON DELETE CASCADE,
            owner_id        TEXT NOT NULL REFERENCES users(id),
            created_at      TEXT NOT NULL,
            updated_at      TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_comments_video
            ON comments(video_id, created_at);

        CREATE TABLE IF NOT EXISTS subscriptions (
            id              TEXT PRIMARY KEY,
            subscriber_id   TEXT NOT NULL REFERENCES users(id),
            channel_id      TEXT NOT NULL REFERENCES users(id),
            created_at      TEXT NOT NULL,
            UNIQUE(subscriber_id, channel_id)
        );

        CREATE INDEX IF NOT EXISTS idx_subscriptions_channel
            ON subscriptions(channel_id);

        CREATE TABLE IF NOT EXISTS watch_history (
            user_id         TEXT NOT NULL REFERENCES users(id),
            video_id        TEXT NOT NULL REFERENCES videos(id) ON DELETE CASCADE,
            position        INTEGER NOT NULL,
            watched_at      TEXT NOT NULL,
            PRIMARY KEY (user_id, video_id)
        );

        CREATE INDEX IF NOT EXISTS idx_watch_history_order
            ON watch_history(user_id, position);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
