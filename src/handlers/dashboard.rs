//! Dashboard handler
//!
//! Students see their tutor and their own activity. Tutors see their tutees.

use axum::{extract::State, response::Json, Extension};
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect};
use serde::Serialize;

use crate::entity::user::UserSummary;
use crate::entity::{blog, blog_comment, document, tutor_group};
use crate::error::{AppError, AppResult};
use crate::handlers::blog::{comment_views, summarize, BlogSummary};
use crate::handlers::comment::CommentView;
use crate::handlers::document::{self as documents, DocumentSummary};
use crate::handlers::group::{group_views, GroupView};
use crate::handlers::message::{groups_of, latest_messages, MessageView};
use crate::handlers::user::users_by_id;
use crate::middleware::auth::CurrentUser;
use crate::routes::ApiResponse;
use crate::state::AppState;

const RECENT: u64 = 5;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentDashboard {
    pub name: String,
    pub tutor: Option<UserSummary>,
    pub document_count: u64,
    pub recent_comments: Vec<CommentView>,
    pub blogs: Vec<BlogSummary>,
    pub recent_messages: Vec<MessageView>,
    pub groups: Vec<GroupView>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TutorDashboard {
    pub name: String,
    pub groups: Vec<GroupView>,
    /// The tutor first, then students by name
    pub members: Vec<UserSummary>,
    pub recent_messages: Vec<MessageView>,
    pub student_comments: Vec<CommentView>,
    pub student_blogs: Vec<BlogSummary>,
    pub own_blogs: Vec<BlogSummary>,
    pub student_documents: Vec<DocumentSummary>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "view", rename_all = "lowercase")]
pub enum Dashboard {
    Student(StudentDashboard),
    Tutor(TutorDashboard),
}

async fn blogs_by(state: &AppState, user_ids: Vec<i32>) -> AppResult<Vec<BlogSummary>> {
    if user_ids.is_empty() {
        return Ok(Vec::new());
    }
    let posts = blog::Entity::find()
        .filter(blog::Column::UserId.is_in(user_ids))
        .order_by_desc(blog::Column::CreatedAt)
        .order_by_desc(blog::Column::Id)
        .all(&state.db)
        .await?;
    summarize(state, posts).await
}

pub async fn student_dashboard(state: &AppState, user: &CurrentUser) -> AppResult<StudentDashboard> {
    let groups: Vec<tutor_group::Model> = groups_of(state, user.id)
        .await?
        .into_iter()
        .filter(|g| g.student_id == user.id)
        .collect();

    // groups_of puts valid groups first
    let tutor_id = groups.first().map(|g| g.tutor_id);
    let tutor = match tutor_id {
        Some(id) => users_by_id(&state.db, [id]).await?.get(&id).map(UserSummary::from),
        None => None,
    };

    let document_count = document::Entity::find()
        .filter(document::Column::UserId.eq(user.id))
        .count(&state.db)
        .await?;

    let comments = blog_comment::Entity::find()
        .filter(blog_comment::Column::UserId.eq(user.id))
        .order_by_desc(blog_comment::Column::CreatedAt)
        .order_by_desc(blog_comment::Column::Id)
        .limit(RECENT)
        .all(&state.db)
        .await?;

    let recent_messages = latest_messages(state, groups.iter().map(|g| g.id).collect(), RECENT as usize).await?;

    Ok(StudentDashboard {
        name: user.name.clone(),
        tutor,
        document_count,
        recent_comments: comment_views(state, comments).await?,
        blogs: blogs_by(state, vec![user.id]).await?,
        recent_messages,
        groups: group_views(&state.db, groups).await?,
    })
}

pub async fn tutor_dashboard(state: &AppState, user: &CurrentUser) -> AppResult<TutorDashboard> {
    let groups: Vec<tutor_group::Model> = groups_of(state, user.id)
        .await?
        .into_iter()
        .filter(|g| g.tutor_id == user.id)
        .collect();

    let mut student_ids: Vec<i32> = groups
        .iter()
        .filter(|g| g.is_valid)
        .map(|g| g.student_id)
        .collect();
    student_ids.sort_unstable();
    student_ids.dedup();

    let mut students: Vec<UserSummary> = users_by_id(&state.db, student_ids.iter().copied())
        .await?
        .into_values()
        .map(UserSummary::from)
        .collect();
    students.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));

    let mut members = Vec::with_capacity(students.len() + 1);
    if let Some(me) = users_by_id(&state.db, [user.id]).await?.get(&user.id) {
        members.push(UserSummary::from(me));
    }
    members.extend(students);

    let recent_messages = latest_messages(state, groups.iter().map(|g| g.id).collect(), RECENT as usize).await?;

    let student_blogs = blogs_by(state, student_ids.clone()).await?;
    let student_comments = if student_blogs.is_empty() {
        Vec::new()
    } else {
        let comments = blog_comment::Entity::find()
            .filter(blog_comment::Column::BlogId.is_in(student_blogs.iter().map(|b| b.id).collect::<Vec<_>>()))
            .order_by_desc(blog_comment::Column::CreatedAt)
            .order_by_desc(blog_comment::Column::Id)
            .limit(RECENT)
            .all(&state.db)
            .await?;
        comment_views(state, comments).await?
    };

    let student_documents = if student_ids.is_empty() {
        Vec::new()
    } else {
        let docs = document::Entity::find()
            .filter(document::Column::UserId.is_in(student_ids))
            .order_by_desc(document::Column::UploadDate)
            .order_by_desc(document::Column::Id)
            .all(&state.db)
            .await?;
        documents::summarize(state, docs).await?
    };

    Ok(TutorDashboard {
        name: user.name.clone(),
        groups: group_views(&state.db, groups).await?,
        members,
        recent_messages,
        student_comments,
        student_blogs,
        own_blogs: blogs_by(state, vec![user.id]).await?,
        student_documents,
    })
}

pub async fn dashboard_for(state: &AppState, user: &CurrentUser) -> AppResult<Dashboard> {
    if user.is_student() {
        Ok(Dashboard::Student(student_dashboard(state, user).await?))
    } else if user.is_tutor() {
        Ok(Dashboard::Tutor(tutor_dashboard(state, user).await?))
    } else {
        Err(AppError::Forbidden)
    }
}

/// GET /api/dashboard
pub async fn dashboard(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
) -> AppResult<Json<ApiResponse<Dashboard>>> {
    Ok(Json(ApiResponse::success(dashboard_for(&state, &current_user).await?)))
}
