use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    routing::{patch, post},
    Json, Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use tracing::{instrument, warn};

use super::{
    dto::{
        ChangePasswordRequest, LoginRequest, LoginResponse, RefreshRequest, RegisterForm,
        TokenPair, ValidatedRegistration,
    },
    extractors::{AuthUser, ACCESS_COOKIE, REFRESH_COOKIE},
    session::AssetRefs,
};
use crate::{
    assets::services::{upload_asset, PendingUpload},
    error::AppError,
    response::ApiResponse,
    state::AppState,
    users::repo_types::PublicUser,
};

pub const JSON_BODY_LIMIT: usize = 16 * 1024;

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/refresh", post(refresh))
        .route("/password", patch(change_password))
        .layer(DefaultBodyLimit::max(JSON_BODY_LIMIT))
}

pub fn register_routes(max_upload_bytes: usize) -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
}

fn auth_cookie(name: &'static str, value: String) -> Cookie<'static> {
    Cookie::build((name, value))
        .http_only(true)
        .secure(true)
        .path("/")
        .build()
}

fn set_token_cookies(jar: CookieJar, tokens: &TokenPair) -> CookieJar {
    jar.add(auth_cookie(ACCESS_COOKIE, tokens.access_token.clone()))
        .add(auth_cookie(REFRESH_COOKIE, tokens.refresh_token.clone()))
}

fn clear_token_cookies(jar: CookieJar) -> CookieJar {
    let expired = |name: &'static str| {
        let mut c = auth_cookie(name, String::new());
        c.make_removal();
        c
    };
    jar.add(expired(ACCESS_COOKIE)).add(expired(REFRESH_COOKIE))
}

async fn read_register_form(mut mp: Multipart) -> Result<RegisterForm, AppError> {
    let mut form = RegisterForm::default();
    while let Some(field) = mp.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "fullName" => form.full_name = Some(field.text().await?),
            "email" => form.email = Some(field.text().await?),
            "username" => form.username = Some(field.text().await?),
            "password" => form.password = Some(field.text().await?),
            "avatar" => form.avatar = Some(PendingUpload::from_field(field).await?),
            "cover" | "coverImage" => form.cover = Some(PendingUpload::from_field(field).await?),
            _ => {}
        }
    }
    Ok(form)
}

/// POST /register (multipart: fullName, email, username, password, avatar, cover?)
#[instrument(skip(state, mp))]
pub async fn register(
    State(state): State<AppState>,
    mp: Multipart,
) -> Result<(StatusCode, Json<ApiResponse<PublicUser>>), AppError> {
    let ValidatedRegistration {
        profile,
        avatar,
        cover,
    } = read_register_form(mp).await?.validate()?;

    state
        .sessions
        .ensure_available(&profile.username, &profile.email)
        .await?;

    let upload_dir = &state.config.upload_dir;
    let avatar = upload_asset(state.assets.as_ref(), upload_dir, avatar)
        .await
        .map_err(|e| AppError::internal("Avatar upload failed", format!("{e:#}")))?;

    let cover_image = match cover {
        Some(file) => match upload_asset(state.assets.as_ref(), upload_dir, file).await {
            Ok(asset) => asset.url,
            Err(e) => {
                warn!(error = %format!("{e:#}"), "cover upload failed, using placeholder");
                state.config.default_cover_url.clone()
            }
        },
        None => state.config.default_cover_url.clone(),
    };

    let user = state
        .sessions
        .register(
            profile,
            AssetRefs {
                avatar: avatar.url,
                cover_image,
            },
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::new(
            StatusCode::CREATED,
            user,
            "User registered successfully",
        )),
    ))
}

#[instrument(skip(state, jar, payload))]
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<(CookieJar, Json<ApiResponse<LoginResponse>>), AppError> {
    let Json(payload) = payload?;
    let (identity, password) = payload.validate()?;

    let outcome = state.sessions.login(identity, password).await?;
    let jar = set_token_cookies(jar, &outcome.tokens);

    Ok((
        jar,
        Json(ApiResponse::ok(
            LoginResponse {
                user: outcome.user,
                access_token: outcome.tokens.access_token,
                refresh_token: outcome.tokens.refresh_token,
            },
            "User logged in successfully",
        )),
    ))
}

#[instrument(skip(state, jar, user), fields(user_id = %user.id))]
pub async fn logout(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    jar: CookieJar,
) -> Result<(CookieJar, Json<ApiResponse<serde_json::Value>>), AppError> {
    state.sessions.logout(user.id).await?;
    Ok((
        clear_token_cookies(jar),
        Json(ApiResponse::ok(
            serde_json::json!({}),
            "User logged out successfully",
        )),
    ))
}

/// POST /refresh: token from the `refreshToken` cookie, else from the body.
#[instrument(skip(state, jar, body))]
pub async fn refresh(
    State(state): State<AppState>,
    jar: CookieJar,
    body: Option<Json<RefreshRequest>>,
) -> Result<(CookieJar, Json<ApiResponse<TokenPair>>), AppError> {
    let presented = jar
        .get(REFRESH_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
        .or_else(|| body.and_then(|Json(b)| b.refresh_token));

    let tokens = state.sessions.refresh(presented.as_deref()).await?;
    let jar = set_token_cookies(jar, &tokens);

    Ok((jar, Json(ApiResponse::ok(tokens, "Access token refreshed"))))
}

#[instrument(skip(state, user, payload), fields(user_id = %user.id))]
pub async fn change_password(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    payload: Result<Json<ChangePasswordRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<serde_json::Value>>, AppError> {
    let Json(payload) = payload?;
    payload.validate()?;

    state
        .sessions
        .change_password(user.id, payload.old_password, payload.new_password)
        .await?;

    Ok(Json(ApiResponse::ok(
        serde_json::json!({}),
        "Password changed successfully",
    )))
}
