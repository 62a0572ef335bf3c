//! Tutor group handlers
//!
//! Pairs tutors with students and runs the close / reopen workflow.
//! A student belongs to at most one valid group at a time.

use axum::{
    extract::{Path, State},
    response::Json,
    Extension,
};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QueryOrder,
    Set, SqlErr, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::entity::tutor_group;
use crate::entity::user::{self, UserSummary};
use crate::error::{AppError, AppResult, OptionExt, CONFLICT_RETRY};
use crate::handlers::unix_now;
use crate::handlers::user::{users_by_id, users_by_username};
use crate::mail::compose;
use crate::middleware::auth::CurrentUser;
use crate::permission::{perm, role};
use crate::routes::ApiResponse;
use crate::state::AppState;

/// How long a closed group may still be reopened
pub const REOPEN_WINDOW_SECS: i64 = 24 * 60 * 60;

pub const TUTOR_MISSING: &str = "Tutor with this id don't exist";
pub const INVALID_MODEL: &str = "Invalid model state";
pub const CLOSED: &str =
    "group close successfully, you have 24 hours to undo this action if it is not intended";
pub const REOPENED: &str = "group re-opened successfully";
pub const ALREADY_ASSIGNED: &str = "student already been assigned to another group";
pub const WINDOW_ENDED: &str = "the 24 hours period has ended you can no longer change this";

/// Create request body
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateGroupRequest {
    #[serde(alias = "tutor_id")]
    pub tutor_id: i32,
    #[serde(default, alias = "student_ids")]
    pub student_ids: Vec<i32>,
}

/// A group with both participants resolved
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupView {
    pub id: i32,
    pub tutor: Option<UserSummary>,
    pub student: Option<UserSummary>,
    pub is_valid: bool,
    pub created_at: i64,
    pub expired_at: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct CreateOutcome {
    pub groups: Vec<GroupView>,
    /// Students that were skipped and why
    pub errors: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct Candidates {
    pub students: Vec<UserSummary>,
    pub tutors: Vec<UserSummary>,
}

/// What a toggle request does to a group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Close,
    Reopen,
    AlreadyAssigned,
    WindowElapsed,
}

/// Decide the toggle outcome. `student_busy` tells whether the student holds
/// another valid group.
pub fn plan_transition(group: &tutor_group::Model, now: i64, student_busy: bool) -> Transition {
    match group.expired_at {
        None => Transition::Close,
        Some(expired) if now - expired <= REOPEN_WINDOW_SECS => {
            if student_busy {
                Transition::AlreadyAssigned
            } else {
                Transition::Reopen
            }
        }
        Some(_) => Transition::WindowElapsed,
    }
}

/// Students without a valid group. Never-grouped students keep their order and
/// come first; the rest follow by their most recent expiry, oldest first.
pub fn order_candidates(
    students: Vec<user::Model>,
    groups: &[tutor_group::Model],
) -> Vec<user::Model> {
    let mut latest_expiry: HashMap<i32, i64> = HashMap::new();
    let mut active: HashSet<i32> = HashSet::new();
    for g in groups {
        if g.is_valid {
            active.insert(g.student_id);
        }
        let expiry = latest_expiry.entry(g.student_id).or_insert(i64::MIN);
        *expiry = (*expiry).max(g.expired_at.unwrap_or(0));
    }

    let (fresh, mut previous): (Vec<_>, Vec<_>) = students
        .into_iter()
        .filter(|s| !active.contains(&s.id))
        .partition(|s| !latest_expiry.contains_key(&s.id));
    previous.sort_by_key(|s| latest_expiry.get(&s.id).copied().unwrap_or(0));

    fresh.into_iter().chain(previous).collect()
}

pub async fn group_views<C: ConnectionTrait>(
    db: &C,
    groups: Vec<tutor_group::Model>,
) -> AppResult<Vec<GroupView>> {
    let users = users_by_id(db, groups.iter().flat_map(|g| [g.tutor_id, g.student_id])).await?;
    Ok(groups
        .into_iter()
        .map(|g| GroupView {
            id: g.id,
            tutor: users.get(&g.tutor_id).map(UserSummary::from),
            student: users.get(&g.student_id).map(UserSummary::from),
            is_valid: g.is_valid,
            created_at: g.created_at,
            expired_at: g.expired_at,
        })
        .collect())
}

pub async fn find_group<C: ConnectionTrait>(db: &C, id: i32) -> AppResult<tutor_group::Model> {
    tutor_group::Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or_not_found("Group not found")
}

/// Whether the student holds a valid group other than `except`
async fn student_busy<C: ConnectionTrait>(
    db: &C,
    student_id: i32,
    except: Option<i32>,
) -> Result<bool, DbErr> {
    let mut query = tutor_group::Entity::find()
        .filter(tutor_group::Column::StudentId.eq(student_id))
        .filter(tutor_group::Column::IsValid.eq(true));
    if let Some(id) = except {
        query = query.filter(tutor_group::Column::Id.ne(id));
    }
    Ok(query.one(db).await?.is_some())
}

/// The active-student index rejected a second valid group
fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

fn already_active(name: &str) -> AppError {
    AppError::invalid(format!("{} has already been in an active group", name))
}

/// Open a new valid group for the student
async fn insert_group<C: ConnectionTrait>(
    db: &C,
    tutor_id: i32,
    student_id: i32,
    now: i64,
    name: &str,
) -> AppResult<tutor_group::Model> {
    let inserted = tutor_group::ActiveModel {
        tutor_id: Set(tutor_id),
        student_id: Set(student_id),
        is_valid: Set(true),
        created_at: Set(now),
        expired_at: Set(None),
        ..Default::default()
    }
    .insert(db)
    .await;
    match inserted {
        Ok(group) => Ok(group),
        Err(e) if is_unique_violation(&e) => Err(already_active(name)),
        Err(e) => Err(e.into()),
    }
}

/// Write the new state only if the row still matches `group`
async fn apply_state<C: ConnectionTrait>(
    db: &C,
    group: &tutor_group::Model,
    is_valid: bool,
    expired_at: Option<i64>,
) -> AppResult<tutor_group::Model> {
    let update = tutor_group::Entity::update_many()
        .col_expr(tutor_group::Column::IsValid, Expr::value(is_valid))
        .col_expr(tutor_group::Column::ExpiredAt, Expr::value(expired_at))
        .filter(tutor_group::Column::Id.eq(group.id))
        .filter(tutor_group::Column::IsValid.eq(group.is_valid));
    let update = match group.expired_at {
        Some(t) => update.filter(tutor_group::Column::ExpiredAt.eq(t)),
        None => update.filter(tutor_group::Column::ExpiredAt.is_null()),
    };

    let result = match update.exec(db).await {
        Ok(result) => result,
        Err(e) if is_unique_violation(&e) => return Err(AppError::invalid(ALREADY_ASSIGNED)),
        Err(e) => return Err(e.into()),
    };
    if result.rows_affected == 0 {
        return match tutor_group::Entity::find_by_id(group.id).one(db).await? {
            None => Err(AppError::NotFound("Group not found".to_string())),
            Some(_) => Err(AppError::Conflict(CONFLICT_RETRY.to_string())),
        };
    }

    Ok(tutor_group::Model {
        is_valid,
        expired_at,
        ..group.clone()
    })
}

async fn participants(
    state: &AppState,
    group: &tutor_group::Model,
) -> AppResult<(Option<user::Model>, Option<user::Model>)> {
    let mut users = users_by_id(&state.db, [group.tutor_id, group.student_id]).await?;
    Ok((users.remove(&group.tutor_id), users.remove(&group.student_id)))
}

/// Mark an open group as closed now and notify both sides
pub async fn close_group(
    state: &AppState,
    group: &tutor_group::Model,
    now: i64,
) -> AppResult<tutor_group::Model> {
    let closed = apply_state(&state.db, group, false, Some(now)).await?;

    if let (Some(tutor), Some(student)) = participants(state, &closed).await? {
        state.mail.send(compose::tutor_unassignment(&student.email, &student.name, &tutor.name));
        state.mail.send(compose::tutee_unassignment(&tutor.email, &tutor.name, &student.name));
    }
    tracing::info!("Group {} closed", closed.id);
    Ok(closed)
}

async fn reopen_group(state: &AppState, group: &tutor_group::Model) -> AppResult<tutor_group::Model> {
    let snapshot = group.clone();
    let reopened = state
        .db
        .transaction::<_, tutor_group::Model, AppError>(|txn| {
            Box::pin(async move {
                if student_busy(txn, snapshot.student_id, Some(snapshot.id)).await? {
                    return Err(AppError::invalid(ALREADY_ASSIGNED));
                }
                apply_state(txn, &snapshot, true, None).await
            })
        })
        .await?;

    if let (Some(tutor), Some(student)) = participants(state, &reopened).await? {
        state.mail.send(compose::tutor_reassignment(&student.email, &student.name, &tutor.name));
        state.mail.send(compose::tutee_reassignment(&tutor.email, &tutor.name, &student.name));
    }
    tracing::info!("Group {} re-opened", reopened.id);
    Ok(reopened)
}

/// Close an open group or reopen a recently closed one
pub async fn toggle(state: &AppState, id: i32, now: i64) -> AppResult<(&'static str, tutor_group::Model)> {
    let group = find_group(&state.db, id).await?;
    let busy = match group.expired_at {
        Some(_) => student_busy(&state.db, group.student_id, Some(group.id)).await?,
        None => false,
    };

    match plan_transition(&group, now, busy) {
        Transition::Close => Ok((CLOSED, close_group(state, &group, now).await?)),
        Transition::Reopen => Ok((REOPENED, reopen_group(state, &group).await?)),
        Transition::AlreadyAssigned => Err(AppError::invalid(ALREADY_ASSIGNED)),
        Transition::WindowElapsed => Err(AppError::invalid(WINDOW_ENDED)),
    }
}

/// Pair one tutor with each listed student
pub async fn create(state: &AppState, req: CreateGroupRequest) -> AppResult<CreateOutcome> {
    let tutor = match user::Entity::find_by_id(req.tutor_id).one(&state.db).await? {
        Some(t) if state.perm.has_role(&t.username, role::TUTOR).await? => t,
        _ => return Err(AppError::invalid(TUTOR_MISSING)),
    };

    let mut seen = HashSet::new();
    let student_ids: Vec<i32> = req.student_ids.into_iter().filter(|id| seen.insert(*id)).collect();
    let students = users_by_id(&state.db, student_ids.iter().copied()).await?;

    let now = unix_now();
    let mut created = Vec::new();
    let mut assigned = Vec::new();
    let mut errors = Vec::new();

    for id in student_ids {
        let Some(student) = students.get(&id) else {
            continue;
        };
        if !state.perm.has_role(&student.username, role::STUDENT).await? {
            errors.push(format!("{} is not a valid student", student.name));
            continue;
        }

        let (tutor_id, student_id, name) = (tutor.id, student.id, student.name.clone());
        let result = state
            .db
            .transaction::<_, tutor_group::Model, AppError>(|txn| {
                Box::pin(async move {
                    if student_busy(txn, student_id, None).await? {
                        return Err(already_active(&name));
                    }
                    insert_group(txn, tutor_id, student_id, now, &name).await
                })
            })
            .await
            .map_err(AppError::from);

        match result {
            Ok(group) => {
                state.mail.send(compose::tutor_assignment(&student.email, &student.name, &tutor.name));
                assigned.push(student.name.clone());
                created.push(group);
            }
            Err(AppError::Validation(msgs)) => errors.extend(msgs),
            Err(e) => return Err(e),
        }
    }

    if created.is_empty() {
        if errors.is_empty() {
            errors.push(INVALID_MODEL.to_string());
        }
        return Err(AppError::Validation(errors));
    }

    state.mail.send(compose::tutees_assignment(&tutor.email, &tutor.name, &assigned));
    tracing::info!("Created {} group(s) for tutor {}", created.len(), tutor.username);

    Ok(CreateOutcome {
        groups: group_views(&state.db, created).await?,
        errors,
    })
}

pub async fn candidates(state: &AppState) -> AppResult<Candidates> {
    let students = users_by_username(&state.db, state.perm.role_users(role::STUDENT).await?).await?;
    let tutors = users_by_username(&state.db, state.perm.role_users(role::TUTOR).await?).await?;
    let groups = tutor_group::Entity::find().all(&state.db).await?;

    Ok(Candidates {
        students: order_candidates(students, &groups).iter().map(UserSummary::from).collect(),
        tutors: tutors.iter().map(UserSummary::from).collect(),
    })
}

/// GET /api/groups
pub async fn list_groups(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
) -> AppResult<Json<ApiResponse<Vec<GroupView>>>> {
    current_user.require(perm::GROUPS)?;
    let groups = tutor_group::Entity::find()
        .order_by_desc(tutor_group::Column::IsValid)
        .order_by_desc(tutor_group::Column::CreatedAt)
        .order_by_asc(tutor_group::Column::Id)
        .all(&state.db)
        .await?;
    Ok(Json(ApiResponse::success(group_views(&state.db, groups).await?)))
}

/// GET /api/groups/:id
pub async fn get_group(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<i32>,
) -> AppResult<Json<ApiResponse<GroupView>>> {
    current_user.require(perm::GROUPS)?;
    let group = find_group(&state.db, id).await?;
    let view = group_views(&state.db, vec![group])
        .await?
        .pop()
        .ok_or_not_found("Group not found")?;
    Ok(Json(ApiResponse::success(view)))
}

/// GET /api/groups/candidates
pub async fn list_candidates(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
) -> AppResult<Json<ApiResponse<Candidates>>> {
    current_user.require(perm::GROUPS)?;
    Ok(Json(ApiResponse::success(candidates(&state).await?)))
}

/// POST /api/groups
pub async fn create_groups(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Json(req): Json<CreateGroupRequest>,
) -> AppResult<Json<ApiResponse<CreateOutcome>>> {
    current_user.require(perm::GROUPS)?;
    let outcome = create(&state, req).await?;
    let message = format!("{} group(s) created successfully", outcome.groups.len());
    Ok(Json(ApiResponse::success_with(message, outcome)))
}

/// POST /api/groups/:id/toggle
pub async fn toggle_group(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<i32>,
) -> AppResult<Json<ApiResponse<tutor_group::Model>>> {
    current_user.require(perm::GROUPS)?;
    let (message, group) = toggle(&state, id, unix_now()).await?;
    Ok(Json(ApiResponse::success_with(message, group)))
}

/// Tutor gives up their own student
pub async fn release(state: &AppState, user: &CurrentUser, id: i32, now: i64) -> AppResult<tutor_group::Model> {
    let group = find_group(&state.db, id).await?;
    if group.tutor_id != user.id || !user.is_tutor() {
        return Err(AppError::Forbidden);
    }
    if group.expired_at.is_some() || !group.is_valid {
        return Err(AppError::invalid("this group has already been closed"));
    }
    close_group(state, &group, now).await
}

/// POST /api/groups/:id/release
pub async fn release_group(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<i32>,
) -> AppResult<Json<ApiResponse<tutor_group::Model>>> {
    let group = release(&state, &current_user, id, unix_now()).await?;
    Ok(Json(ApiResponse::success_with(CLOSED, group)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{create_user, drain, test_state};

    fn group(id: i32, student_id: i32, is_valid: bool, expired_at: Option<i64>) -> tutor_group::Model {
        tutor_group::Model {
            id,
            tutor_id: 100,
            student_id,
            is_valid,
            created_at: 0,
            expired_at,
        }
    }

    fn student(id: i32, name: &str) -> user::Model {
        user::Model {
            id,
            username: format!("{}@school.test", name),
            password: String::new(),
            name: name.to_string(),
            email: format!("{}@school.test", name),
            address: None,
            code: format!("C{}", id),
            gender: "F".to_string(),
            image: None,
            created_at: 0,
            last_login: 0,
        }
    }

    fn messages(err: AppError) -> Vec<String> {
        match err {
            AppError::Validation(msgs) => msgs,
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn transition_window_boundaries() {
        let now = 1_000_000;
        assert_eq!(plan_transition(&group(1, 1, true, None), now, false), Transition::Close);

        let closed_exactly = group(1, 1, false, Some(now - REOPEN_WINDOW_SECS));
        assert_eq!(plan_transition(&closed_exactly, now, false), Transition::Reopen);
        assert_eq!(plan_transition(&closed_exactly, now, true), Transition::AlreadyAssigned);

        let closed_too_long = group(1, 1, false, Some(now - REOPEN_WINDOW_SECS - 1));
        assert_eq!(plan_transition(&closed_too_long, now, false), Transition::WindowElapsed);
    }

    #[test]
    fn candidates_order() {
        let students = vec![
            student(1, "active"),
            student(2, "old"),
            student(3, "fresh"),
            student(4, "recent"),
            student(5, "fresh2"),
        ];
        let groups = vec![
            group(10, 1, true, None),
            group(11, 2, false, Some(100)),
            group(12, 4, false, Some(500)),
            group(13, 2, false, Some(50)),
        ];

        let ordered: Vec<i32> = order_candidates(students, &groups).into_iter().map(|s| s.id).collect();
        assert_eq!(ordered, vec![3, 5, 2, 4]);
    }

    #[tokio::test]
    async fn create_enforces_one_active_group() {
        let (state, mut mail) = test_state().await;
        let tutor = create_user(&state, "t@school.test", "Tina", &[role::TUTOR]).await;
        let sam = create_user(&state, "sam@school.test", "Sam", &[role::STUDENT]).await;
        let kim = create_user(&state, "kim@school.test", "Kim", &[role::STUDENT]).await;
        let staff = create_user(&state, "staff@school.test", "Stan", &[role::STAFF]).await;

        let outcome = create(
            &state,
            CreateGroupRequest {
                tutor_id: tutor.id,
                student_ids: vec![sam.id, staff.id, 9999, sam.id],
            },
        )
        .await
        .unwrap();
        assert_eq!(outcome.groups.len(), 1);
        assert_eq!(outcome.errors, vec!["Stan is not a valid student"]);

        let subjects: Vec<String> = drain(&mut mail).into_iter().map(|m| m.subject).collect();
        assert_eq!(subjects, vec!["Tutor assignment", "Tutees assignment"]);

        let outcome = create(
            &state,
            CreateGroupRequest {
                tutor_id: tutor.id,
                student_ids: vec![sam.id, kim.id],
            },
        )
        .await
        .unwrap();
        assert_eq!(outcome.groups.len(), 1);
        assert_eq!(outcome.errors, vec!["Sam has already been in an active group"]);

        let err = create(
            &state,
            CreateGroupRequest {
                tutor_id: tutor.id,
                student_ids: vec![sam.id],
            },
        )
        .await
        .unwrap_err();
        assert_eq!(messages(err), vec!["Sam has already been in an active group"]);

        let valid = tutor_group::Entity::find()
            .filter(tutor_group::Column::StudentId.eq(sam.id))
            .filter(tutor_group::Column::IsValid.eq(true))
            .all(&state.db)
            .await
            .unwrap();
        assert_eq!(valid.len(), 1);
    }

    #[tokio::test]
    async fn create_requires_tutor_role() {
        let (state, _mail) = test_state().await;
        let not_tutor = create_user(&state, "x@school.test", "Xena", &[role::STUDENT]).await;
        let sam = create_user(&state, "sam@school.test", "Sam", &[role::STUDENT]).await;

        let err = create(
            &state,
            CreateGroupRequest {
                tutor_id: not_tutor.id,
                student_ids: vec![sam.id],
            },
        )
        .await
        .unwrap_err();
        assert_eq!(messages(err), vec![TUTOR_MISSING]);

        let tutor = create_user(&state, "t@school.test", "Tina", &[role::TUTOR]).await;
        let err = create(
            &state,
            CreateGroupRequest {
                tutor_id: tutor.id,
                student_ids: vec![],
            },
        )
        .await
        .unwrap_err();
        assert_eq!(messages(err), vec![INVALID_MODEL]);
    }

    #[tokio::test]
    async fn toggle_close_reopen_and_conflict() {
        let (state, mut mail) = test_state().await;
        let tutor = create_user(&state, "t@school.test", "Tina", &[role::TUTOR]).await;
        let sam = create_user(&state, "sam@school.test", "Sam", &[role::STUDENT]).await;
        let first = create(
            &state,
            CreateGroupRequest {
                tutor_id: tutor.id,
                student_ids: vec![sam.id],
            },
        )
        .await
        .unwrap()
        .groups[0]
            .id;
        drain(&mut mail);

        let now = unix_now();
        let (msg, closed) = toggle(&state, first, now).await.unwrap();
        assert_eq!(msg, CLOSED);
        assert!(!closed.is_valid);
        assert_eq!(closed.expired_at, Some(now));
        assert_eq!(drain(&mut mail).len(), 2);

        let (msg, reopened) = toggle(&state, first, now + 60).await.unwrap();
        assert_eq!(msg, REOPENED);
        assert!(reopened.is_valid);
        assert_eq!(reopened.expired_at, None);

        toggle(&state, first, now + 120).await.unwrap();
        let second = create(
            &state,
            CreateGroupRequest {
                tutor_id: tutor.id,
                student_ids: vec![sam.id],
            },
        )
        .await
        .unwrap()
        .groups[0]
            .id;
        assert_ne!(first, second);

        let err = toggle(&state, first, now + 180).await.unwrap_err();
        assert_eq!(messages(err), vec![ALREADY_ASSIGNED]);
    }

    #[tokio::test]
    async fn toggle_after_window_is_refused() {
        let (state, _mail) = test_state().await;
        let tutor = create_user(&state, "t@school.test", "Tina", &[role::TUTOR]).await;
        let sam = create_user(&state, "sam@school.test", "Sam", &[role::STUDENT]).await;
        let id = create(
            &state,
            CreateGroupRequest {
                tutor_id: tutor.id,
                student_ids: vec![sam.id],
            },
        )
        .await
        .unwrap()
        .groups[0]
            .id;

        let now = unix_now();
        toggle(&state, id, now).await.unwrap();
        let err = toggle(&state, id, now + REOPEN_WINDOW_SECS + 1).await.unwrap_err();
        assert_eq!(messages(err), vec![WINDOW_ENDED]);

        assert!(matches!(toggle(&state, 4242, now).await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn stale_update_is_conflict_and_deleted_is_not_found() {
        let (state, _mail) = test_state().await;
        let stale = tutor_group::ActiveModel {
            tutor_id: Set(1),
            student_id: Set(2),
            is_valid: Set(true),
            created_at: Set(0),
            expired_at: Set(None),
            ..Default::default()
        }
        .insert(&state.db)
        .await
        .unwrap();

        apply_state(&state.db, &stale, false, Some(10)).await.unwrap();
        let err = apply_state(&state.db, &stale, false, Some(20)).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(ref m) if m == CONFLICT_RETRY));
        assert_eq!(err.status(), axum::http::StatusCode::CONFLICT);

        tutor_group::Entity::delete_by_id(stale.id).exec(&state.db).await.unwrap();
        let err = apply_state(&state.db, &stale, false, Some(20)).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn index_blocks_second_active_group() {
        let (state, _mail) = test_state().await;
        let closed = insert_group(&state.db, 1, 2, 0, "Sam").await.unwrap();
        let closed = apply_state(&state.db, &closed, false, Some(5)).await.unwrap();
        insert_group(&state.db, 3, 2, 10, "Sam").await.unwrap();

        // both writes skip the busy check, the schema still refuses them
        match insert_group(&state.db, 4, 2, 20, "Sam").await {
            Err(AppError::Validation(msgs)) => assert_eq!(msgs, vec!["Sam has already been in an active group"]),
            other => panic!("unexpected {:?}", other),
        }
        match apply_state(&state.db, &closed, true, None).await {
            Err(AppError::Validation(msgs)) => assert_eq!(msgs, vec![ALREADY_ASSIGNED]),
            other => panic!("unexpected {:?}", other),
        }

        let active = tutor_group::Entity::find()
            .filter(tutor_group::Column::StudentId.eq(2))
            .filter(tutor_group::Column::IsValid.eq(true))
            .all(&state.db)
            .await
            .unwrap();
        assert_eq!(active.len(), 1);
    }

    #[tokio::test]
    async fn release_only_by_own_tutor() {
        let (state, _mail) = test_state().await;
        let tutor = create_user(&state, "t@school.test", "Tina", &[role::TUTOR]).await;
        let other = create_user(&state, "o@school.test", "Otto", &[role::TUTOR]).await;
        let sam = create_user(&state, "sam@school.test", "Sam", &[role::STUDENT]).await;
        let id = create(
            &state,
            CreateGroupRequest {
                tutor_id: tutor.id,
                student_ids: vec![sam.id],
            },
        )
        .await
        .unwrap()
        .groups[0]
            .id;

        assert!(matches!(release(&state, &other, id, 10).await, Err(AppError::Forbidden)));
        let closed = release(&state, &tutor, id, 10).await.unwrap();
        assert!(!closed.is_valid);
        assert!(release(&state, &tutor, id, 20).await.is_err());

        let c = candidates(&state).await.unwrap();
        assert_eq!(c.students.len(), 1);
        assert_eq!(c.tutors.len(), 2);
    }
}
