//! Role handlers
//!
//! Maintains the role catalogue (Admin only)

use axum::{
    extract::{Query, State},
    response::Json,
    Extension,
};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::middleware::auth::CurrentUser;
use crate::permission::perm;
use crate::routes::ApiResponse;
use crate::state::AppState;

pub const ROLE_EXISTS: &str = "Role already exists.";
pub const ROLE_IN_USE: &str = "Cannot delete role because users are assigned to it.";

/// Add role request
#[derive(Debug, Deserialize)]
pub struct AddRoleRequest {
    pub name: String,
}

/// Delete role query (?name=...)
#[derive(Debug, Deserialize)]
pub struct DeleteRoleQuery {
    pub name: String,
}

/// Role response
#[derive(Debug, Serialize)]
pub struct RoleResponse {
    pub id: i32,
    pub name: String,
    pub permissions: Vec<String>,
    #[serde(rename = "userCount")]
    pub user_count: usize,
}

pub async fn role_overview(state: &AppState) -> AppResult<Vec<RoleResponse>> {
    let mut roles = Vec::new();
    for r in state.perm.list_roles().await? {
        let permissions = state.perm.role_capabilities(&r.name).await?;
        let user_count = state.perm.role_users(&r.name).await?.len();
        roles.push(RoleResponse {
            id: r.id,
            name: r.name,
            permissions,
            user_count,
        });
    }
    Ok(roles)
}

pub async fn create_role(state: &AppState, name: &str) -> AppResult<()> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::invalid("The Role Name field is required."));
    }
    if name.chars().count() > 64 {
        return Err(AppError::invalid("Role Name cannot exceed 64 characters."));
    }
    if !state.perm.create_role(name).await? {
        return Err(AppError::invalid(ROLE_EXISTS));
    }
    tracing::info!("Role created: {}", name);
    Ok(())
}

/// Remove a role nobody holds
pub async fn remove_role(state: &AppState, name: &str) -> AppResult<()> {
    if !state.perm.role_exists(name).await? {
        return Err(AppError::NotFound(format!("Role '{}' not found", name)));
    }
    if !state.perm.role_users(name).await?.is_empty() {
        return Err(AppError::invalid(ROLE_IN_USE));
    }
    state.perm.delete_role(name).await?;
    tracing::info!("Role deleted: {}", name);
    Ok(())
}

/// GET /api/role/list
pub async fn list_roles(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
) -> AppResult<Json<ApiResponse<Vec<RoleResponse>>>> {
    current_user.require(perm::ROLES)?;
    Ok(Json(ApiResponse::success(role_overview(&state).await?)))
}

/// POST /api/role/add
pub async fn add_role(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Json(req): Json<AddRoleRequest>,
) -> AppResult<Json<ApiResponse<()>>> {
    current_user.require(perm::ROLES)?;
    create_role(&state, &req.name).await?;
    Ok(Json(ApiResponse::success_msg("Role created successfully")))
}

/// POST /api/role/delete?name=
pub async fn delete_role(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Query(query): Query<DeleteRoleQuery>,
) -> AppResult<Json<ApiResponse<()>>> {
    current_user.require(perm::ROLES)?;
    remove_role(&state, &query.name).await?;
    Ok(Json(ApiResponse::success_msg("Role deleted successfully")))
}
