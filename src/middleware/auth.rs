//! Authentication middleware
//!
//! Provides session-based authentication for API routes

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use sea_orm::EntityTrait;
use serde::Serialize;
use tower_sessions::Session;

use crate::entity::user;
use crate::error::{AppError, AppResult};
use crate::permission::{perm, role, PermissionEnforcer};
use crate::state::AppState;

/// Session key for storing the signed-in user id
pub const SESSION_USER_KEY: &str = "user_id";
pub const SESSION_TIMESTAMP_KEY: &str = "timestamp";

/// Extension to store current user in request
#[derive(Clone, Debug, Serialize)]
pub struct CurrentUser {
    pub id: i32,
    pub username: String,
    pub name: String,
    pub email: String,
    /// Role names from Casbin grouping rules
    pub roles: Vec<String>,
    /// Capabilities the roles grant
    pub permissions: Vec<String>,
}

impl CurrentUser {
    /// Resolve roles and capabilities for a stored user
    pub async fn load(perm: &PermissionEnforcer, model: user::Model) -> AppResult<Self> {
        let roles = perm.get_user_roles(&model.username).await?;
        let permissions = perm.get_user_permissions(&model.username).await;
        Ok(Self {
            id: model.id,
            username: model.username,
            name: model.name,
            email: model.email,
            roles,
            permissions,
        })
    }

    /// Check if the user has a specific capability
    pub fn has_permission(&self, capability: &str) -> bool {
        self.permissions.iter().any(|p| p == capability)
    }

    pub fn has_role(&self, name: &str) -> bool {
        self.roles.iter().any(|r| r == name)
    }

    pub fn is_student(&self) -> bool {
        self.has_role(role::STUDENT)
    }

    pub fn is_tutor(&self) -> bool {
        self.has_role(role::TUTOR)
    }

    pub fn can_moderate(&self) -> bool {
        self.has_permission(perm::MODERATE)
    }

    pub fn can_purge(&self) -> bool {
        self.has_permission(perm::PURGE)
    }

    /// Fail with 403 unless the capability is held
    pub fn require(&self, capability: &str) -> AppResult<()> {
        if self.has_permission(capability) {
            Ok(())
        } else {
            tracing::warn!("{} denied capability {}", self.username, capability);
            Err(AppError::Forbidden)
        }
    }
}

/// Paths that don't require authentication
fn is_public_path(path: &str) -> bool {
    if !path.starts_with("/api") {
        return true;
    }
    matches!(path, "/api/login" | "/api/logout" | "/api/health")
}

/// Authentication middleware
pub async fn auth_layer(
    State(state): State<AppState>,
    session: Session,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    if is_public_path(request.uri().path()) {
        return next.run(request).await;
    }

    let user_id: Option<i32> = session.get(SESSION_USER_KEY).await.unwrap_or(None);
    let Some(user_id) = user_id else {
        return AppError::Unauthorized.into_response();
    };

    let model = match user::Entity::find_by_id(user_id).one(&state.db).await {
        Ok(Some(model)) => model,
        Ok(None) => {
            tracing::warn!("Session refers to missing user {}", user_id);
            let _ = session.flush().await;
            return AppError::Unauthorized.into_response();
        }
        Err(e) => return AppError::Database(e).into_response(),
    };

    match CurrentUser::load(&state.perm, model).await {
        Ok(current_user) => {
            request.extensions_mut().insert(current_user);
            next.run(request).await
        }
        Err(e) => e.into_response(),
    }
}
