use crate::models::{NewUser, UserRow};
use crate::{Database, new_id, now};
use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, Row};

const USER_COLUMNS: &str = "id, username, email, fullname, avatar, cover_image, password, refresh_token, created_at, updated_at";

impl Database {
    // -- Users --

    pub fn create_user(&self, user: &NewUser<'_>) -> Result<UserRow> {
        let id = new_id();
        let ts = now();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, username, email, fullname, avatar, cover_image, password, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
                rusqlite::params![
                    id,
                    user.username,
                    user.email,
                    user.fullname,
                    user.avatar,
                    user.cover_image,
                    user.password_hash,
                    ts,
                ],
            )?;
            query_user(conn, "id", &id)?
                .ok_or_else(|| anyhow::anyhow!("user {} vanished after insert", id))
        })
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", id))
    }

    /// First user whose username or email matches. Either side may be absent.
    pub fn find_user_by_username_or_email(
        &self,
        username: Option<&str>,
        email: Option<&str>,
    ) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {USER_COLUMNS} FROM users
                 WHERE (?1 IS NOT NULL AND username = ?1) OR (?2 IS NOT NULL AND email = ?2)
                 ORDER BY created_at
                 LIMIT 1"
            );
            let row = conn
                .query_row(&sql, rusqlite::params![username, email], user_from_row)
                .optional()?;
            Ok(row)
        })
    }

    pub fn set_refresh_token(&self, id: &str, token: Option<&str>) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE users SET refresh_token = ?2, updated_at = ?3 WHERE id = ?1",
                rusqlite::params![id, token, now()],
            )?;
            Ok(())
        })
    }

    /// Replace the stored refresh token only if it still equals `expected`.
    /// Returns false when another write got there first.
    pub fn swap_refresh_token(&self, id: &str, expected: &str, new: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE users SET refresh_token = ?3, updated_at = ?4
                 WHERE id = ?1 AND refresh_token = ?2",
                rusqlite::params![id, expected, new, now()],
            )?;
            Ok(changed == 1)
        })
    }

    pub fn update_password(&self, id: &str, password_hash: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE users SET password = ?2, updated_at = ?3 WHERE id = ?1",
                rusqlite::params![id, password_hash, now()],
            )?;
            Ok(())
        })
    }

    /// Patch fullname and/or email; `None` keeps the current value.
    pub fn update_account(
        &self,
        id: &str,
        fullname: Option<&str>,
        email: Option<&str>,
    ) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE users
                 SET fullname = COALESCE(?2, fullname), email = COALESCE(?3, email), updated_at = ?4
                 WHERE id = ?1",
                rusqlite::params![id, fullname, email, now()],
            )?;
            query_user(conn, "id", id)
        })
    }

    pub fn update_avatar(&self, id: &str, url: &str) -> Result<Option<UserRow>> {
        self.update_image_column(id, "avatar", url)
    }

    pub fn update_cover_image(&self, id: &str, url: &str) -> Result<Option<UserRow>> {
        self.update_image_column(id, "cover_image", url)
    }

    fn update_image_column(&self, id: &str, column: &str, url: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            conn.execute(
                &format!("UPDATE users SET {column} = ?2, updated_at = ?3 WHERE id = ?1"),
                rusqlite::params![id, url, now()],
            )?;
            query_user(conn, "id", id)
        })
    }
}

/// `column` is always one of our own column names, never user input.
fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE {column} = ?1");
    let row = conn.query_row(&sql, [value], user_from_row).optional()?;
    Ok(row)
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        fullname: row.get(3)?,
        avatar: row.get(4)?,
        cover_image: row.get(5)?,
        password: row.get(6)?,
        refresh_token: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::is_constraint_violation;

    pub(crate) fn insert_user(db: &Database, username: &str) -> UserRow {
        let email = format!("{username}@example.com");
        db.create_user(&NewUser {
            username,
            email: &email,
            fullname: "Test User",
            avatar: "http://media/avatar.png",
            cover_image: None,
            password_hash: "$argon2id$stub",
        })
        .unwrap()
    }

    #[test]
    fn create_and_lookup() {
        let db = Database::open_in_memory().unwrap();
        let created = insert_user(&db, "alice");

        let by_id = db.get_user_by_id(&created.id).unwrap().unwrap();
        assert_eq!(by_id.username, "alice");
        assert!(by_id.refresh_token.is_none());

        let by_email = db
            .find_user_by_username_or_email(None, Some("alice@example.com"))
            .unwrap()
            .unwrap();
        assert_eq!(by_email.id, created.id);

        assert!(db.find_user_by_username_or_email(Some("bob"), None).unwrap().is_none());
        assert!(db.find_user_by_username_or_email(None, None).unwrap().is_none());
    }

    #[test]
    fn duplicate_username_is_constraint_violation() {
        let db = Database::open_in_memory().unwrap();
        insert_user(&db, "alice");

        let err = db
            .create_user(&NewUser {
                username: "alice",
                email: "other@example.com",
                fullname: "Other",
                avatar: "http://media/a.png",
                cover_image: None,
                password_hash: "$argon2id$stub",
            })
            .unwrap_err();
        assert!(is_constraint_violation(&err));
    }

    #[test]
    fn swap_refresh_token_requires_current_value() {
        let db = Database::open_in_memory().unwrap();
        let user = insert_user(&db, "alice");

        db.set_refresh_token(&user.id, Some("first")).unwrap();
        assert!(db.swap_refresh_token(&user.id, "first", "second").unwrap());
        assert!(!db.swap_refresh_token(&user.id, "first", "third").unwrap());

        let stored = db.get_user_by_id(&user.id).unwrap().unwrap();
        assert_eq!(stored.refresh_token.as_deref(), Some("second"));
    }

    #[test]
    fn account_patch_keeps_untouched_fields() {
        let db = Database::open_in_memory().unwrap();
        let user = insert_user(&db, "alice");

        let updated = db
            .update_account(&user.id, Some("Alice Liddell"), None)
            .unwrap()
            .unwrap();
        assert_eq!(updated.fullname, "Alice Liddell");
        assert_eq!(updated.email, "alice@example.com");
        assert_eq!(updated.password, user.password);
    }
}
