//! Account administration handlers
//!
//! Registration, listing and editing of user accounts (Admin only)

use axum::{extract::State, Extension, Json};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QueryOrder,
    Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::config::BootstrapConfig;
use crate::entity::user::{self, UserSummary};
use crate::error::{AppError, AppResult, OptionExt};
use crate::handlers::unix_now;
use crate::middleware::auth::CurrentUser;
use crate::permission::{perm, role, PermissionEnforcer};
use crate::routes::ApiResponse;
use crate::state::AppState;

pub const CODE_TAKEN: &str = "This Code is already registered.";

const BCRYPT_COST: u32 = if cfg!(test) { 4 } else { bcrypt::DEFAULT_COST };

/// Register request body
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default, rename = "confirmPassword", alias = "confirm_password")]
    pub confirm_password: String,
    pub address: Option<String>,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub gender: String,
    pub image: Option<String>,
}

/// Update request body
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateUserRequest {
    pub id: i32,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub email: String,
    pub address: Option<String>,
    #[serde(default)]
    pub gender: String,
    pub role: Option<String>,
}

/// A user with their assigned roles
#[derive(Debug, Serialize)]
pub struct UserWithRoles {
    #[serde(flatten)]
    pub user: UserSummary,
    pub address: Option<String>,
    pub gender: String,
    #[serde(rename = "lastLogin")]
    pub last_login: i64,
    pub roles: Vec<String>,
}

fn check_len(errors: &mut Vec<String>, value: &str, label: &str, max: usize) {
    if value.chars().count() > max {
        errors.push(format!("{} cannot exceed {} characters.", label, max));
    }
}

fn check_required(errors: &mut Vec<String>, value: &str, label: &str) {
    if value.trim().is_empty() {
        errors.push(format!("The {} field is required.", label));
    }
}

fn check_profile(
    errors: &mut Vec<String>,
    name: &str,
    email: &str,
    address: Option<&str>,
    code: &str,
    gender: &str,
) {
    check_required(errors, name, "Name");
    check_len(errors, name, "Name", 100);
    check_required(errors, email, "Email");
    if !email.trim().is_empty() && !email.contains('@') {
        errors.push("The Email field is not a valid e-mail address.".to_string());
    }
    check_len(errors, address.unwrap_or(""), "Address", 255);
    check_required(errors, code, "Code");
    check_len(errors, code, "Code", 20);
    check_required(errors, gender, "Gender");
    check_len(errors, gender, "Gender", 10);
}

/// Field-level checks for a registration, every failure collected
pub fn validate_registration(req: &RegisterRequest) -> Vec<String> {
    let mut errors = Vec::new();
    check_profile(
        &mut errors,
        &req.name,
        &req.email,
        req.address.as_deref(),
        &req.code,
        &req.gender,
    );
    if req.password.chars().count() < 8 {
        errors.push("The Password must be at least 8 characters long.".to_string());
    }
    if req.password != req.confirm_password {
        errors.push("The password and confirmation password do not match.".to_string());
    }
    check_required(&mut errors, &req.role, "Role");
    errors
}

pub fn hash_password(password: &str) -> AppResult<String> {
    bcrypt::hash(password, BCRYPT_COST)
        .map_err(|e| AppError::Internal(format!("failed to hash password: {}", e)))
}

async fn code_taken<C: ConnectionTrait>(db: &C, code: &str, except: Option<i32>) -> AppResult<bool> {
    let mut query = user::Entity::find().filter(user::Column::Code.eq(code));
    if let Some(id) = except {
        query = query.filter(user::Column::Id.ne(id));
    }
    Ok(query.one(db).await?.is_some())
}

async fn username_taken<C: ConnectionTrait>(
    db: &C,
    username: &str,
    except: Option<i32>,
) -> AppResult<bool> {
    let mut query = user::Entity::find().filter(user::Column::Username.eq(username));
    if let Some(id) = except {
        query = query.filter(user::Column::Id.ne(id));
    }
    Ok(query.one(db).await?.is_some())
}

/// Users keyed by id
pub async fn users_by_id<C: ConnectionTrait>(
    db: &C,
    ids: impl IntoIterator<Item = i32>,
) -> AppResult<HashMap<i32, user::Model>> {
    let mut ids: Vec<i32> = ids.into_iter().collect();
    ids.sort_unstable();
    ids.dedup();
    if ids.is_empty() {
        return Ok(HashMap::new());
    }
    let users = user::Entity::find()
        .filter(user::Column::Id.is_in(ids))
        .all(db)
        .await?;
    Ok(users.into_iter().map(|u| (u.id, u)).collect())
}

/// Users whose usernames appear in the list, ordered by id
pub async fn users_by_username<C: ConnectionTrait>(
    db: &C,
    usernames: Vec<String>,
) -> AppResult<Vec<user::Model>> {
    if usernames.is_empty() {
        return Ok(Vec::new());
    }
    Ok(user::Entity::find()
        .filter(user::Column::Username.is_in(usernames))
        .order_by_asc(user::Column::Id)
        .all(db)
        .await?)
}

/// Create an account; the role is attached only if it exists
pub async fn register_user(state: &AppState, req: RegisterRequest) -> AppResult<user::Model> {
    let errors = validate_registration(&req);
    if !errors.is_empty() {
        return Err(AppError::Validation(errors));
    }

    let email = req.email.trim().to_string();
    let code = req.code.trim().to_string();

    if code_taken(&state.db, &code, None).await? {
        return Err(AppError::invalid(CODE_TAKEN));
    }
    if username_taken(&state.db, &email, None).await? {
        return Err(AppError::invalid(format!("Username '{}' is already taken.", email)));
    }

    let now = unix_now();
    let model = user::ActiveModel {
        username: Set(email.clone()),
        password: Set(hash_password(&req.password)?),
        name: Set(req.name.trim().to_string()),
        email: Set(email),
        address: Set(req.address.filter(|a| !a.trim().is_empty())),
        code: Set(code),
        gender: Set(req.gender.trim().to_string()),
        image: Set(req.image.filter(|i| !i.is_empty())),
        created_at: Set(now),
        last_login: Set(0),
        ..Default::default()
    }
    .insert(&state.db)
    .await?;

    let role_name = req.role.trim();
    if state.perm.role_exists(role_name).await? {
        state.perm.add_user_role(&model.username, role_name).await?;
    } else {
        tracing::warn!("Registered {} without unknown role {}", model.username, role_name);
    }

    tracing::info!("User registered: {}", model.username);
    Ok(model)
}

/// Every account with its roles
pub async fn users_with_roles(state: &AppState) -> AppResult<Vec<UserWithRoles>> {
    let users = user::Entity::find()
        .order_by_asc(user::Column::Name)
        .all(&state.db)
        .await?;

    let mut result = Vec::with_capacity(users.len());
    for u in users {
        let roles = state.perm.get_user_roles(&u.username).await?;
        result.push(UserWithRoles {
            address: u.address.clone(),
            gender: u.gender.clone(),
            last_login: u.last_login,
            user: UserSummary::from(u),
            roles,
        });
    }
    Ok(result)
}

/// Edit a profile; the username follows the email
pub async fn update_account(state: &AppState, req: UpdateUserRequest) -> AppResult<user::Model> {
    let mut errors = Vec::new();
    check_profile(
        &mut errors,
        &req.name,
        &req.email,
        req.address.as_deref(),
        &req.code,
        &req.gender,
    );
    if !errors.is_empty() {
        return Err(AppError::Validation(errors));
    }

    let existing = user::Entity::find_by_id(req.id)
        .one(&state.db)
        .await?
        .ok_or_not_found("User not found")?;

    let email = req.email.trim().to_string();
    let code = req.code.trim().to_string();
    if code_taken(&state.db, &code, Some(req.id)).await? {
        return Err(AppError::invalid(CODE_TAKEN));
    }
    if username_taken(&state.db, &email, Some(req.id)).await? {
        return Err(AppError::invalid(format!("Username '{}' is already taken.", email)));
    }

    let new_role = req.role.as_deref().map(str::trim).filter(|r| !r.is_empty());
    if let Some(r) = new_role {
        if !state.perm.role_exists(r).await? {
            return Err(AppError::invalid(format!("Role '{}' does not exist.", r)));
        }
    }

    let old_username = existing.username.clone();
    let roles: Option<Vec<String>> = new_role.map(|r| vec![r.to_string()]);
    let mut active: user::ActiveModel = existing.into();
    active.name = Set(req.name.trim().to_string());
    active.email = Set(email.clone());
    active.username = Set(email.clone());
    active.code = Set(code);
    active.address = Set(req.address.filter(|a| !a.trim().is_empty()));
    active.gender = Set(req.gender.trim().to_string());

    // Row and memberships change together so the login never loses its roles
    let updated = state
        .db
        .transaction::<_, user::Model, DbErr>(|txn| {
            Box::pin(async move {
                let updated = active.update(txn).await?;
                PermissionEnforcer::rewrite_memberships(
                    txn,
                    &old_username,
                    &updated.username,
                    roles.as_deref(),
                )
                .await?;
                Ok(updated)
            })
        })
        .await?;
    state.perm.load_policies().await?;

    tracing::info!("User updated: {}", updated.username);
    Ok(updated)
}

/// Create the configured administrator when no account has that username
pub async fn bootstrap_admin(state: &AppState, config: &BootstrapConfig) -> anyhow::Result<()> {
    if !config.is_configured() {
        return Ok(());
    }
    if username_taken(&state.db, &config.admin_username, None).await? {
        return Ok(());
    }

    let name = if config.admin_name.is_empty() {
        "Administrator".to_string()
    } else {
        config.admin_name.clone()
    };
    let code = if config.admin_code.is_empty() {
        "ADMIN".to_string()
    } else {
        config.admin_code.clone()
    };

    user::ActiveModel {
        username: Set(config.admin_username.clone()),
        password: Set(hash_password(&config.admin_password)?),
        name: Set(name),
        email: Set(config.admin_username.clone()),
        code: Set(code),
        gender: Set(String::new()),
        created_at: Set(unix_now()),
        last_login: Set(0),
        ..Default::default()
    }
    .insert(&state.db)
    .await?;
    state.perm.add_user_role(&config.admin_username, role::ADMIN).await?;

    tracing::info!("Created bootstrap administrator {}", config.admin_username);
    Ok(())
}

/// POST /api/admin/register
pub async fn register(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Json(req): Json<RegisterRequest>,
) -> AppResult<Json<ApiResponse<UserSummary>>> {
    current_user.require(perm::ACCOUNTS)?;
    let model = register_user(&state, req).await?;
    Ok(Json(ApiResponse::success_with("User created successfully", model.into())))
}

/// GET /api/admin/users
pub async fn list_users(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
) -> AppResult<Json<ApiResponse<Vec<UserWithRoles>>>> {
    current_user.require(perm::ACCOUNTS)?;
    Ok(Json(ApiResponse::success(users_with_roles(&state).await?)))
}

/// POST /api/admin/users/update
pub async fn update_user(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Json(req): Json<UpdateUserRequest>,
) -> AppResult<Json<ApiResponse<UserSummary>>> {
    current_user.require(perm::ACCOUNTS)?;
    let model = update_account(&state, req).await?;
    Ok(Json(ApiResponse::success_with("User updated successfully", model.into())))
}
