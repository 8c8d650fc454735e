use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, Multipart, State},
    routing::{get, patch},
    Json, Router,
};
use tracing::{info, instrument};
use uuid::Uuid;

use super::{dto::UpdateProfileRequest, repo_types::{PublicUser, UserPatch}};
use crate::{
    assets::services::{upload_asset, PendingUpload},
    auth::{extractors::AuthUser, handlers::JSON_BODY_LIMIT},
    error::AppError,
    response::ApiResponse,
    state::AppState,
};

pub fn me_routes() -> Router<AppState> {
    Router::new()
        .route("/me", get(get_me))
        .route("/profile", patch(update_profile))
        .layer(DefaultBodyLimit::max(JSON_BODY_LIMIT))
}

pub fn asset_routes(max_upload_bytes: usize) -> Router<AppState> {
    Router::new()
        .route("/avatar", patch(update_avatar))
        .route("/cover", patch(update_cover))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
}

#[instrument(skip(user), fields(user_id = %user.id))]
pub async fn get_me(AuthUser(user): AuthUser) -> Json<ApiResponse<PublicUser>> {
    Json(ApiResponse::ok(user, "Current user fetched successfully"))
}

#[instrument(skip(state, user, payload), fields(user_id = %user.id))]
pub async fn update_profile(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    payload: Result<Json<UpdateProfileRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<PublicUser>>, AppError> {
    let Json(payload) = payload?;
    let patch = payload.into_patch()?;
    let updated = apply_patch(&state, user.id, patch).await?;
    info!(user_id = %updated.id, "profile updated");
    Ok(Json(ApiResponse::ok(updated, "Account details updated successfully")))
}

#[instrument(skip(state, user, mp), fields(user_id = %user.id))]
pub async fn update_avatar(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    mp: Multipart,
) -> Result<Json<ApiResponse<PublicUser>>, AppError> {
    let file = read_file_field(mp, "avatar")
        .await?
        .ok_or_else(|| AppError::validation("Avatar file is missing"))?;
    let asset = upload_asset(state.assets.as_ref(), &state.config.upload_dir, file)
        .await
        .map_err(|e| AppError::internal("Error while uploading avatar", format!("{e:#}")))?;

    let patch = UserPatch {
        avatar: Some(asset.url),
        ..Default::default()
    };
    let updated = apply_patch(&state, user.id, patch).await?;
    Ok(Json(ApiResponse::ok(updated, "Avatar updated successfully")))
}

#[instrument(skip(state, user, mp), fields(user_id = %user.id))]
pub async fn update_cover(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    mp: Multipart,
) -> Result<Json<ApiResponse<PublicUser>>, AppError> {
    let file = read_file_field(mp, "cover")
        .await?
        .ok_or_else(|| AppError::validation("Cover image file is missing"))?;
    let asset = upload_asset(state.assets.as_ref(), &state.config.upload_dir, file)
        .await
        .map_err(|e| AppError::internal("Error while uploading cover image", format!("{e:#}")))?;

    let patch = UserPatch {
        cover_image: Some(asset.url),
        ..Default::default()
    };
    let updated = apply_patch(&state, user.id, patch).await?;
    Ok(Json(ApiResponse::ok(updated, "Cover image updated successfully")))
}

async fn apply_patch(state: &AppState, id: Uuid, patch: UserPatch) -> Result<PublicUser, AppError> {
    state
        .users
        .update_by_id(id, patch)
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))
}

/// First non-empty file in the field named `name`.
async fn read_file_field(mut mp: Multipart, name: &str) -> Result<Option<PendingUpload>, AppError> {
    while let Some(field) = mp.next_field().await? {
        if field.name() == Some(name) {
            let file = PendingUpload::from_field(field).await?;
            if !file.body.is_empty() {
                return Ok(Some(file));
            }
        }
    }
    Ok(None)
}
