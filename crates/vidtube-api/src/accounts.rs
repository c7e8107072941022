//! Credential store operations: account creation, credential lookup and the
//! password/profile mutations. Every function here is blocking; call them
//! through `AppStateInner::blocking`.

use vidtube_db::models::{NewUser, UserRow};
use vidtube_db::{Database, is_constraint_violation};
use vidtube_types::models::User;

use crate::convert;
use crate::error::ApiError;
use crate::extract::non_empty;
use crate::password::{hash_password, verify_password};

const DUPLICATE_USER: &str = "User with email or username already exists";

/// Validated registration fields. Media URLs are already uploaded.
pub struct Registration {
    pub username: String,
    pub email: String,
    pub fullname: String,
    pub password: String,
    pub avatar: String,
    pub cover_image: Option<String>,
}

pub fn normalize_username(raw: &str) -> String {
    raw.trim().to_lowercase()
}

pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// `Conflict` when either identifier is already taken.
pub fn ensure_available(db: &Database, username: &str, email: &str) -> Result<(), ApiError> {
    let username = normalize_username(username);
    let email = normalize_email(email);
    if db
        .find_user_by_username_or_email(Some(&username), Some(&email))?
        .is_some()
    {
        return Err(ApiError::conflict(DUPLICATE_USER));
    }
    Ok(())
}

/// Create an account. The password is hashed here and nowhere else except
/// `change_password`.
pub fn create(db: &Database, reg: &Registration) -> Result<User, ApiError> {
    let username = normalize_username(&reg.username);
    let email = normalize_email(&reg.email);
    ensure_available(db, &username, &email)?;

    let password_hash = hash_password(&reg.password)?;
    let row = db
        .create_user(&NewUser {
            username: &username,
            email: &email,
            fullname: reg.fullname.trim(),
            avatar: &reg.avatar,
            cover_image: reg.cover_image.as_deref(),
            password_hash: &password_hash,
        })
        .map_err(|e| {
            if is_constraint_violation(&e) {
                ApiError::conflict(DUPLICATE_USER)
            } else {
                ApiError::Internal(e)
            }
        })?;

    Ok(convert::user(row)?)
}

/// Look a user up by username or email; at least one must be given.
pub fn find_by_credentials(
    db: &Database,
    username: Option<&str>,
    email: Option<&str>,
) -> Result<UserRow, ApiError> {
    let username = non_empty(username).map(normalize_username);
    let email = non_empty(email).map(normalize_email);
    if username.is_none() && email.is_none() {
        return Err(ApiError::bad_request("username or email is required"));
    }

    db.find_user_by_username_or_email(username.as_deref(), email.as_deref())?
        .ok_or_else(|| ApiError::not_found("User does not exist"))
}

/// Credential check for login.
pub fn authenticate(
    db: &Database,
    username: Option<&str>,
    email: Option<&str>,
    password: &str,
) -> Result<UserRow, ApiError> {
    let user = find_by_credentials(db, username, email)?;
    if !verify_password(password, &user.password)? {
        return Err(ApiError::unauthorized("Invalid user credentials"));
    }
    Ok(user)
}

pub fn change_password(
    db: &Database,
    user_id: &str,
    old_password: &str,
    new_password: &str,
) -> Result<(), ApiError> {
    if new_password.trim().is_empty() {
        return Err(ApiError::bad_request("New password is required"));
    }

    let user = db
        .get_user_by_id(user_id)?
        .ok_or_else(|| ApiError::not_found("User does not exist"))?;
    if !verify_password(old_password, &user.password)? {
        return Err(ApiError::bad_request("Invalid old password"));
    }

    db.update_password(user_id, &hash_password(new_password)?)?;
    Ok(())
}

/// Patch fullname and/or email. At least one must be present.
pub fn update_account(
    db: &Database,
    user_id: &str,
    fullname: Option<&str>,
    email: Option<&str>,
) -> Result<User, ApiError> {
    let fullname = non_empty(fullname);
    let email = non_empty(email).map(normalize_email);
    if fullname.is_none() && email.is_none() {
        return Err(ApiError::bad_request("fullname or email is required"));
    }

    let row = db
        .update_account(user_id, fullname, email.as_deref())
        .map_err(|e| {
            if is_constraint_violation(&e) {
                ApiError::conflict("Email is already in use")
            } else {
                ApiError::Internal(e)
            }
        })?
        .ok_or_else(|| ApiError::not_found("User does not exist"))?;

    Ok(convert::user(row)?)
}
