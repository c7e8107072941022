use axum::{
    Extension,
    body::Bytes,
    extract::{Multipart, State, multipart::MultipartRejection},
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use serde_json::{Value, json};
use tracing::info;

use vidtube_types::api::{LoginRequest, LoginResponse, RefreshTokenRequest, TokenPair};
use vidtube_types::models::User;

use crate::accounts::{self, Registration};
use crate::convert;
use crate::error::ApiError;
use crate::extract::{ApiJson, non_empty};
use crate::media::UploadForm;
use crate::middleware::{ACCESS_COOKIE, CurrentUser, REFRESH_COOKIE};
use crate::response::ApiResponse;
use crate::state::AppState;

fn session_cookie(name: &'static str, value: String) -> Cookie<'static> {
    Cookie::build((name, value))
        .http_only(true)
        .secure(true)
        .path("/")
        .build()
}

fn with_session(jar: CookieJar, pair: &TokenPair) -> CookieJar {
    jar.add(session_cookie(ACCESS_COOKIE, pair.access_token.clone()))
        .add(session_cookie(REFRESH_COOKIE, pair.refresh_token.clone()))
}

/// POST /users/register (multipart: fullname, email, username, password,
/// avatar, optional coverImage)
pub async fn register(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<ApiResponse<User>, ApiError> {
    let mut form = UploadForm::read(&state.media, multipart?).await?;

    let (Some(fullname), Some(email), Some(username), Some(password)) = (
        form.text("fullname").map(str::to_string),
        form.text("email").map(str::to_string),
        form.text("username").map(str::to_string),
        form.raw_text("password"),
    ) else {
        return Err(ApiError::bad_request("All fields are required"));
    };

    // Refuse before anything is uploaded.
    {
        let (username, email) = (username.clone(), email.clone());
        state
            .blocking(move |db, _| accounts::ensure_available(db, &username, &email))
            .await?;
    }

    let avatar_path = form
        .take_file("avatar")
        .ok_or_else(|| ApiError::bad_request("Avatar file is required"))?;
    let cover_path = form.take_file("coverImage");

    let avatar = state
        .media
        .upload(&avatar_path)
        .await
        .ok_or_else(|| ApiError::bad_request("Avatar file is required"))?;
    let cover_image = match cover_path {
        Some(path) => state.media.upload(&path).await.map(|asset| asset.url),
        None => None,
    };

    let stored: Vec<String> = std::iter::once(avatar.url.clone())
        .chain(cover_image.clone())
        .collect();
    let registration = Registration {
        username,
        email,
        fullname,
        password,
        avatar: avatar.url,
        cover_image,
    };
    let created = state
        .blocking(move |db, _| accounts::create(db, &registration))
        .await;
    let user = match created {
        Ok(user) => user,
        Err(e) => {
            // Lost a race on username/email, or the insert failed outright.
            for url in &stored {
                state.media.discard(url).await;
            }
            return Err(e);
        }
    };

    info!("Registered user {} ({})", user.username, user.id);
    Ok(ApiResponse::created(user, "User registered successfully"))
}

/// POST /users/login
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    ApiJson(req): ApiJson<LoginRequest>,
) -> Result<(CookieJar, ApiResponse<LoginResponse>), ApiError> {
    let (user, pair) = state
        .blocking(move |db, tokens| {
            let row = accounts::authenticate(
                db,
                req.username.as_deref(),
                req.email.as_deref(),
                &req.password,
            )?;
            let pair = tokens.issue_pair(db, &row)?;
            Ok::<_, ApiError>((convert::user(row)?, pair))
        })
        .await?;

    info!("User {} logged in", user.username);
    let jar = with_session(jar, &pair);
    Ok((
        jar,
        ApiResponse::ok(
            LoginResponse {
                user,
                access_token: pair.access_token,
                refresh_token: pair.refresh_token,
            },
            "User logged in successfully",
        ),
    ))
}

/// POST /users/logout
pub async fn logout(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    jar: CookieJar,
) -> Result<(CookieJar, ApiResponse<Value>), ApiError> {
    let user_id = user.id.to_string();
    state
        .blocking(move |db, _| db.set_refresh_token(&user_id, None))
        .await?;

    let jar = jar
        .remove(Cookie::build(ACCESS_COOKIE).path("/"))
        .remove(Cookie::build(REFRESH_COOKIE).path("/"));
    Ok((jar, ApiResponse::ok(json!({}), "User logged out")))
}

/// POST /users/refresh-token. The token comes from the `refreshToken` cookie,
/// else from a JSON body `{refreshToken}`.
pub async fn refresh_access_token(
    State(state): State<AppState>,
    jar: CookieJar,
    body: Bytes,
) -> Result<(CookieJar, ApiResponse<TokenPair>), ApiError> {
    let from_cookie = jar
        .get(REFRESH_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty());

    let presented = match from_cookie {
        Some(token) => token,
        None => {
            let req: RefreshTokenRequest = if body.iter().all(u8::is_ascii_whitespace) {
                RefreshTokenRequest::default()
            } else {
                serde_json::from_slice(&body).map_err(|e| ApiError::bad_request(e.to_string()))?
            };
            non_empty(req.refresh_token.as_deref())
                .map(str::to_string)
                .ok_or_else(|| ApiError::unauthorized("Unauthorized request"))?
        }
    };

    let pair = state
        .blocking(move |db, tokens| tokens.rotate(db, &presented))
        .await?;

    let jar = with_session(jar, &pair);
    Ok((jar, ApiResponse::ok(pair, "Access token refreshed")))
}
