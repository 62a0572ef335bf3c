//! Authentication handlers
//!
//! Implements login, logout, and current user endpoints

use axum::{extract::State, Extension, Json};
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use serde::Deserialize;
use tower_sessions::Session;

use crate::entity::user;
use crate::error::{AppError, AppResult};
use crate::handlers::unix_now;
use crate::middleware::auth::{CurrentUser, SESSION_TIMESTAMP_KEY, SESSION_USER_KEY};
use crate::routes::ApiResponse;
use crate::state::AppState;

pub const INVALID_LOGIN: &str = "Invalid login attempt";
pub const NO_ROLES: &str = "You do not have any assigned roles. Contact the admin.";

/// Login request body
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Check credentials and role membership, then stamp `last_login`
pub async fn authenticate(state: &AppState, req: &LoginRequest) -> AppResult<CurrentUser> {
    let username = req.username.trim();
    if username.is_empty() || req.password.is_empty() {
        return Err(AppError::invalid(INVALID_LOGIN));
    }

    let Some(db_user) = user::Entity::find()
        .filter(user::Column::Username.eq(username))
        .one(&state.db)
        .await?
    else {
        tracing::warn!("Login failed: user not found - {}", username);
        return Err(AppError::invalid(INVALID_LOGIN));
    };

    if !bcrypt::verify(&req.password, &db_user.password).unwrap_or(false) {
        tracing::warn!("Login failed: wrong password - {}", username);
        return Err(AppError::invalid(INVALID_LOGIN));
    }

    if state.perm.get_user_roles(&db_user.username).await?.is_empty() {
        tracing::warn!("Login refused: no roles - {}", username);
        return Err(AppError::invalid(NO_ROLES));
    }

    let mut active_model: user::ActiveModel = db_user.into();
    active_model.last_login = Set(unix_now());
    let db_user = active_model.update(&state.db).await?;

    CurrentUser::load(&state.perm, db_user).await
}

/// POST /api/login
pub async fn login(
    State(state): State<AppState>,
    session: Session,
    Json(req): Json<LoginRequest>,
) -> AppResult<Json<ApiResponse<CurrentUser>>> {
    let current_user = authenticate(&state, &req).await?;

    session
        .insert(SESSION_USER_KEY, current_user.id)
        .await
        .map_err(|e| AppError::Internal(format!("failed to save session: {}", e)))?;
    if let Err(e) = session.insert(SESSION_TIMESTAMP_KEY, unix_now()).await {
        tracing::error!("Failed to save session timestamp: {}", e);
    }

    tracing::info!("User logged in: {}", current_user.username);
    Ok(Json(ApiResponse::success_with("login success", current_user)))
}

/// POST /api/logout
pub async fn logout(session: Session) -> AppResult<Json<ApiResponse<()>>> {
    let user_id: Option<i32> = session.get(SESSION_USER_KEY).await.unwrap_or(None);

    session
        .flush()
        .await
        .map_err(|e| AppError::Internal(format!("failed to flush session: {}", e)))?;

    if let Some(id) = user_id {
        tracing::info!("User {} logged out", id);
    }
    Ok(Json(ApiResponse::success_msg("logout success")))
}

/// GET /api/user/current
pub async fn current_user(Extension(user): Extension<CurrentUser>) -> Json<ApiResponse<CurrentUser>> {
    Json(ApiResponse::success(user))
}
