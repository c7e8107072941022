use std::time::Duration;

use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Serialize, de::DeserializeOwned};
use tracing::debug;
use uuid::Uuid;

use vidtube_db::Database;
use vidtube_db::models::UserRow;
use vidtube_types::api::{AccessClaims, RefreshClaims, TokenPair};

use crate::config::TokenConfig;
use crate::convert;
use crate::error::ApiError;

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("invalid token: {0}")]
    Invalid(#[source] jsonwebtoken::errors::Error),

    #[error("token signing failed: {0}")]
    Signing(#[source] jsonwebtoken::errors::Error),
}

impl From<TokenError> for ApiError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Invalid(_) => ApiError::unauthorized("Invalid token"),
            TokenError::Signing(e) => ApiError::Internal(e.into()),
        }
    }
}

/// Issues, verifies and rotates access and refresh tokens. Access and
/// refresh tokens are signed with different secrets.
#[derive(Debug, Clone)]
pub struct TokenService {
    config: TokenConfig,
}

impl TokenService {
    pub fn new(config: TokenConfig) -> Self {
        Self { config }
    }

    pub fn issue_access_token(&self, user: &UserRow) -> Result<String, ApiError> {
        let (iat, exp) = window(self.config.access_ttl);
        let claims = AccessClaims {
            sub: convert::stored_id(&user.id)?,
            email: user.email.clone(),
            username: user.username.clone(),
            fullname: user.fullname.clone(),
            iat,
            exp,
        };
        Ok(sign(&claims, &self.config.access_secret)?)
    }

    /// Sign a refresh token and store it on the user, replacing any previous one.
    pub fn issue_refresh_token(&self, db: &Database, user: &UserRow) -> Result<String, ApiError> {
        let token = self.sign_refresh(user)?;
        db.set_refresh_token(&user.id, Some(&token))?;
        Ok(token)
    }

    pub fn issue_pair(&self, db: &Database, user: &UserRow) -> Result<TokenPair, ApiError> {
        Ok(TokenPair {
            access_token: self.issue_access_token(user)?,
            refresh_token: self.issue_refresh_token(db, user)?,
        })
    }

    pub fn verify_access(&self, token: &str) -> Result<AccessClaims, TokenError> {
        verify(token, &self.config.access_secret)
    }

    pub fn verify_refresh(&self, token: &str) -> Result<RefreshClaims, TokenError> {
        verify(token, &self.config.refresh_secret)
    }

    /// Exchange the stored refresh token for a new pair. The old refresh
    /// token stops working as soon as this succeeds.
    pub fn rotate(&self, db: &Database, presented: &str) -> Result<TokenPair, ApiError> {
        let claims = self.verify_refresh(presented).map_err(|e| {
            debug!("Rejected refresh token: {}", e);
            ApiError::unauthorized("Invalid refresh token")
        })?;

        let user = db
            .get_user_by_id(&claims.sub.to_string())?
            .ok_or_else(|| ApiError::unauthorized("Invalid refresh token"))?;

        if user.refresh_token.as_deref() != Some(presented) {
            return Err(ApiError::TokenMismatch);
        }

        let access_token = self.issue_access_token(&user)?;
        let refresh_token = self.sign_refresh(&user)?;

        // Lost a race against a concurrent rotation or a logout.
        if !db.swap_refresh_token(&user.id, presented, &refresh_token)? {
            return Err(ApiError::TokenMismatch);
        }

        Ok(TokenPair {
            access_token,
            refresh_token,
        })
    }

    fn sign_refresh(&self, user: &UserRow) -> Result<String, ApiError> {
        let (iat, exp) = window(self.config.refresh_ttl);
        let claims = RefreshClaims {
            sub: convert::stored_id(&user.id)?,
            jti: Uuid::new_v4(),
            iat,
            exp,
        };
        Ok(sign(&claims, &self.config.refresh_secret)?)
    }
}

/// Decode and validate (signature and expiry) a token signed with `secret`.
pub fn verify<C: DeserializeOwned>(token: &str, secret: &str) -> Result<C, TokenError> {
    let data = decode::<C>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(TokenError::Invalid)?;
    Ok(data.claims)
}

fn sign<C: Serialize>(claims: &C, secret: &str) -> Result<String, TokenError> {
    encode(
        &Header::default(),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(TokenError::Signing)
}

fn window(ttl: Duration) -> (usize, usize) {
    let now = chrono::Utc::now().timestamp() as usize;
    let ttl = usize::try_from(ttl.as_secs()).unwrap_or(usize::MAX);
    (now, now.saturating_add(ttl))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use vidtube_db::models::NewUser;

    pub(crate) fn service() -> TokenService {
        TokenService::new(TokenConfig {
            access_secret: "access-secret-for-tests".into(),
            access_ttl: Duration::from_secs(15 * 60),
            refresh_secret: "refresh-secret-for-tests".into(),
            refresh_ttl: Duration::from_secs(10 * 24 * 3600),
        })
    }

    fn user(db: &Database) -> UserRow {
        db.create_user(&NewUser {
            username: "alice",
            email: "alice@example.com",
            fullname: "Alice Liddell",
            avatar: "http://media/a.png",
            cover_image: None,
            password_hash: "$argon2id$stub",
        })
        .unwrap()
    }

    #[test]
    fn window_saturates_instead_of_overflowing() {
        let (iat, exp) = window(Duration::MAX);
        assert!(iat > 0);
        assert_eq!(exp, usize::MAX);

        let (iat, exp) = window(Duration::from_secs(60));
        assert_eq!(exp - iat, 60);
    }

    #[test]
    fn access_token_round_trip() {
        let db = Database::open_in_memory().unwrap();
        let user = user(&db);
        let tokens = service();

        let token = tokens.issue_access_token(&user).unwrap();
        let claims = tokens.verify_access(&token).unwrap();

        assert_eq!(claims.sub.to_string(), user.id);
        assert_eq!(claims.email, "alice@example.com");
        assert_eq!(claims.username, "alice");
        assert_eq!(claims.fullname, "Alice Liddell");
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn secrets_are_not_interchangeable() {
        let db = Database::open_in_memory().unwrap();
        let user = user(&db);
        let tokens = service();

        let access = tokens.issue_access_token(&user).unwrap();
        let refresh = tokens.issue_refresh_token(&db, &user).unwrap();

        assert!(tokens.verify_refresh(&access).is_err());
        assert!(tokens.verify_access(&refresh).is_err());
    }

    #[test]
    fn expired_token_is_rejected() {
        let now = chrono::Utc::now().timestamp() as usize;
        let claims = RefreshClaims {
            sub: Uuid::new_v4(),
            jti: Uuid::new_v4(),
            iat: now - 7200,
            exp: now - 3600,
        };
        let token = sign(&claims, "refresh-secret-for-tests").unwrap();

        assert!(matches!(service().verify_refresh(&token), Err(TokenError::Invalid(_))));
    }

    #[test]
    fn refresh_token_is_persisted() {
        let db = Database::open_in_memory().unwrap();
        let user = user(&db);

        let token = service().issue_refresh_token(&db, &user).unwrap();
        let stored = db.get_user_by_id(&user.id).unwrap().unwrap();
        assert_eq!(stored.refresh_token.as_deref(), Some(token.as_str()));
    }

    #[test]
    fn rotated_token_cannot_be_reused() {
        let db = Database::open_in_memory().unwrap();
        let user = user(&db);
        let tokens = service();

        let first = tokens.issue_pair(&db, &user).unwrap();
        let second = tokens.rotate(&db, &first.refresh_token).unwrap();
        assert_ne!(first.refresh_token, second.refresh_token);

        let replay = tokens.rotate(&db, &first.refresh_token);
        assert!(matches!(replay, Err(ApiError::TokenMismatch)));

        // The current token still works.
        tokens.rotate(&db, &second.refresh_token).unwrap();
    }

    #[test]
    fn rotate_rejects_garbage_and_unknown_subjects() {
        let db = Database::open_in_memory().unwrap();
        let tokens = service();

        assert!(matches!(tokens.rotate(&db, "not.a.jwt"), Err(ApiError::Unauthorized(_))));

        let now = chrono::Utc::now().timestamp() as usize;
        let orphan = sign(
            &RefreshClaims {
                sub: Uuid::new_v4(),
                jti: Uuid::new_v4(),
                iat: now,
                exp: now + 600,
            },
            "refresh-secret-for-tests",
        )
        .unwrap();
        assert!(matches!(tokens.rotate(&db, &orphan), Err(ApiError::Unauthorized(_))));
    }

    #[test]
    fn logout_invalidates_refresh_token() {
        let db = Database::open_in_memory().unwrap();
        let user = user(&db);
        let tokens = service();

        let pair = tokens.issue_pair(&db, &user).unwrap();
        db.set_refresh_token(&user.id, None).unwrap();

        assert!(matches!(tokens.rotate(&db, &pair.refresh_token), Err(ApiError::TokenMismatch)));
    }
}
