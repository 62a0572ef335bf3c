//! Blog handlers
//!
//! Posts with an optional image, 1..=5 ratings and threaded comments

use axum::{
    extract::{Multipart, Path, State},
    response::Json,
    Extension,
};
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::entity::blog_rating::{self, RatingSummary};
use crate::entity::user::UserSummary;
use crate::entity::{blog, blog_comment};
use crate::error::{AppError, AppResult, OptionExt};
use crate::handlers::comment::{build_tree, collect_thread, validate_content, CommentNode, CommentView};
use crate::handlers::unix_now;
use crate::handlers::user::users_by_id;
use crate::mail::compose;
use crate::middleware::auth::CurrentUser;
use crate::routes::ApiResponse;
use crate::state::AppState;
use crate::uploads::{self, FormData, UploadKind, IMAGE_EXTENSIONS};

pub const IMAGES_ONLY: &str = "Only image files are allowed.";
pub const INVALID_RATING: &str = "Invalid rating. Please select between 1 and 5.";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlogSummary {
    pub id: i32,
    pub title: String,
    pub content: String,
    pub image: Option<String>,
    pub created_at: i64,
    pub author: Option<UserSummary>,
    pub rating: RatingSummary,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlogDetail {
    #[serde(flatten)]
    pub blog: BlogSummary,
    pub my_rating: Option<i32>,
    pub can_edit: bool,
    pub can_delete: bool,
    pub comments: Vec<CommentNode>,
}

#[derive(Debug, Deserialize)]
pub struct RateRequest {
    pub rating: i32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentRequest {
    #[serde(default)]
    pub content: String,
    #[serde(default, alias = "parent_comment_id")]
    pub parent_comment_id: Option<i32>,
}

fn can_edit(user: &CurrentUser, post: &blog::Model) -> bool {
    post.user_id == user.id || user.can_moderate()
}

fn can_delete(user: &CurrentUser, post: &blog::Model) -> bool {
    post.user_id == user.id || user.can_purge()
}

async fn find_blog(state: &AppState, id: i32) -> AppResult<blog::Model> {
    blog::Entity::find_by_id(id)
        .one(&state.db)
        .await?
        .ok_or_not_found("Blog not found")
}

async fn rating_summaries(state: &AppState, blog_ids: Vec<i32>) -> AppResult<HashMap<i32, RatingSummary>> {
    if blog_ids.is_empty() {
        return Ok(HashMap::new());
    }
    let ratings = blog_rating::Entity::find()
        .filter(blog_rating::Column::BlogId.is_in(blog_ids))
        .all(&state.db)
        .await?;

    let mut scores: HashMap<i32, Vec<i32>> = HashMap::new();
    for r in ratings {
        scores.entry(r.blog_id).or_default().push(r.rating);
    }
    Ok(scores
        .into_iter()
        .map(|(id, s)| (id, RatingSummary::from_scores(s)))
        .collect())
}

/// Resolve authors and ratings for a list of posts, keeping their order
pub async fn summarize(state: &AppState, posts: Vec<blog::Model>) -> AppResult<Vec<BlogSummary>> {
    let authors = users_by_id(&state.db, posts.iter().map(|b| b.user_id)).await?;
    let mut ratings = rating_summaries(state, posts.iter().map(|b| b.id).collect()).await?;

    Ok(posts
        .into_iter()
        .map(|b| BlogSummary {
            rating: ratings.remove(&b.id).unwrap_or_default(),
            author: authors.get(&b.user_id).map(UserSummary::from),
            id: b.id,
            title: b.title,
            content: b.content,
            image: b.image,
            created_at: b.created_at,
        })
        .collect())
}

pub async fn blog_summaries(state: &AppState) -> AppResult<Vec<BlogSummary>> {
    let posts = blog::Entity::find()
        .order_by_desc(blog::Column::CreatedAt)
        .order_by_desc(blog::Column::Id)
        .all(&state.db)
        .await?;
    summarize(state, posts).await
}

pub async fn comment_views(state: &AppState, comments: Vec<blog_comment::Model>) -> AppResult<Vec<CommentView>> {
    let authors = users_by_id(&state.db, comments.iter().map(|c| c.user_id)).await?;
    Ok(comments
        .into_iter()
        .map(|c| CommentView::new(c.id, c.parent_comment_id, c.content, c.created_at, c.user_id, &authors))
        .collect())
}

pub async fn blog_detail(state: &AppState, user: &CurrentUser, id: i32) -> AppResult<BlogDetail> {
    let post = find_blog(state, id).await?;
    let (edit, delete) = (can_edit(user, &post), can_delete(user, &post));

    let my_rating = blog_rating::Entity::find()
        .filter(blog_rating::Column::BlogId.eq(id))
        .filter(blog_rating::Column::UserId.eq(user.id))
        .one(&state.db)
        .await?
        .map(|r| r.rating);

    let comments = blog_comment::Entity::find()
        .filter(blog_comment::Column::BlogId.eq(id))
        .all(&state.db)
        .await?;
    let comments = build_tree(comment_views(state, comments).await?);

    let blog = summarize(state, vec![post])
        .await?
        .pop()
        .ok_or_not_found("Blog not found")?;

    Ok(BlogDetail {
        blog,
        my_rating,
        can_edit: edit,
        can_delete: delete,
        comments,
    })
}

/// Title and content from the form
fn post_fields(form: &FormData) -> AppResult<(String, String)> {
    let mut errors = Vec::new();
    let title = form.text("title").unwrap_or_default();
    let content = form.text("content").unwrap_or_default();
    if title.is_empty() {
        errors.push("The Title field is required.".to_string());
    } else if title.chars().count() > 200 {
        errors.push("Title cannot exceed 200 characters.".to_string());
    }
    if content.is_empty() {
        errors.push("The Content field is required.".to_string());
    }
    if !errors.is_empty() {
        return Err(AppError::Validation(errors));
    }
    Ok((title.to_string(), content.to_string()))
}

/// Validate and store the form's image, if any
async fn store_image(state: &AppState, form: &FormData) -> AppResult<Option<String>> {
    let Some(file) = form.file("image") else {
        return Ok(None);
    };
    if !uploads::is_allowed(&file.file_name, &IMAGE_EXTENSIONS) {
        return Err(AppError::invalid(IMAGES_ONLY));
    }
    let path = uploads::store(&state.config.upload_dir, UploadKind::Blogs, &file.file_name, &file.bytes).await?;
    Ok(Some(path))
}

pub async fn create_post(state: &AppState, user: &CurrentUser, form: &FormData) -> AppResult<blog::Model> {
    let (title, content) = post_fields(form)?;
    let image = store_image(state, form).await?;

    let inserted = blog::ActiveModel {
        title: Set(title),
        content: Set(content),
        user_id: Set(user.id),
        image: Set(image.clone()),
        created_at: Set(unix_now()),
        ..Default::default()
    }
    .insert(&state.db)
    .await;
    let post = uploads::discard_on_err(&state.config.upload_dir, image.as_deref(), inserted).await?;

    state.mail.send(compose::blog_notice(
        &user.email,
        &user.name,
        "Blog created",
        "Your blog has been published:",
        &post.title,
    ));
    tracing::info!("Blog {} created by {}", post.id, user.username);
    Ok(post)
}

pub async fn update_post(
    state: &AppState,
    user: &CurrentUser,
    id: i32,
    form: &FormData,
) -> AppResult<blog::Model> {
    let post = find_blog(state, id).await?;
    if !can_edit(user, &post) {
        return Err(AppError::Forbidden);
    }
    let (title, content) = post_fields(form)?;
    let new_image = store_image(state, form).await?;

    let old_image = post.image.clone();
    let owner_id = post.user_id;
    let mut active: blog::ActiveModel = post.into();
    active.title = Set(title);
    active.content = Set(content);
    active.created_at = Set(unix_now());
    if let Some(path) = &new_image {
        active.image = Set(Some(path.clone()));
    }
    let result = active.update(&state.db).await;
    let updated = uploads::discard_on_err(&state.config.upload_dir, new_image.as_deref(), result).await?;

    if let (Some(_), Some(old)) = (&new_image, &old_image) {
        uploads::remove(&state.config.upload_dir, old).await;
    }

    if let Some(owner) = users_by_id(&state.db, [owner_id]).await?.remove(&owner_id) {
        state.mail.send(compose::blog_notice(
            &owner.email,
            &owner.name,
            "Blog updated",
            "Your blog has been updated:",
            &updated.title,
        ));
    }
    tracing::info!("Blog {} updated by {}", updated.id, user.username);
    Ok(updated)
}

/// Delete a post with its comments, ratings and image
pub async fn remove_post(state: &AppState, user: &CurrentUser, id: i32) -> AppResult<()> {
    let post = find_blog(state, id).await?;
    if !can_delete(user, &post) {
        return Err(AppError::Forbidden);
    }

    state
        .db
        .transaction::<_, (), sea_orm::DbErr>(|txn| {
            Box::pin(async move {
                blog_comment::Entity::delete_many()
                    .filter(blog_comment::Column::BlogId.eq(id))
                    .exec(txn)
                    .await?;
                blog_rating::Entity::delete_many()
                    .filter(blog_rating::Column::BlogId.eq(id))
                    .exec(txn)
                    .await?;
                blog::Entity::delete_by_id(id).exec(txn).await?;
                Ok(())
            })
        })
        .await?;

    if let Some(image) = &post.image {
        uploads::remove(&state.config.upload_dir, image).await;
    }
    if let Some(owner) = users_by_id(&state.db, [post.user_id]).await?.remove(&post.user_id) {
        state.mail.send(compose::blog_notice(
            &owner.email,
            &owner.name,
            "Blog deleted",
            "Your blog has been deleted:",
            &post.title,
        ));
    }
    tracing::info!("Blog {} deleted by {}", id, user.username);
    Ok(())
}

/// Record or replace the user's rating
pub async fn rate_post(state: &AppState, user: &CurrentUser, id: i32, rating: i32) -> AppResult<RatingSummary> {
    if !blog_rating::is_valid_rating(rating) {
        return Err(AppError::invalid(INVALID_RATING));
    }
    let post = find_blog(state, id).await?;

    // (blog_id, user_id) is unique, so a second rating replaces the first
    let row = blog_rating::ActiveModel {
        blog_id: Set(id),
        user_id: Set(user.id),
        rating: Set(rating),
        ..Default::default()
    };
    blog_rating::Entity::insert(row)
        .on_conflict(
            OnConflict::columns([blog_rating::Column::BlogId, blog_rating::Column::UserId])
                .update_column(blog_rating::Column::Rating)
                .to_owned(),
        )
        .exec_without_returning(&state.db)
        .await?;

    state.mail.send(compose::blog_rated(&user.email, &user.name, &post.title, rating));
    Ok(rating_summaries(state, vec![id])
        .await?
        .remove(&id)
        .unwrap_or_default())
}

pub async fn post_comment(
    state: &AppState,
    user: &CurrentUser,
    blog_id: i32,
    req: CommentRequest,
) -> AppResult<CommentView> {
    let content = validate_content(&req.content)?;
    let post = find_blog(state, blog_id).await?;

    if let Some(parent_id) = req.parent_comment_id {
        let parent = blog_comment::Entity::find_by_id(parent_id).one(&state.db).await?;
        if parent.map(|p| p.blog_id) != Some(blog_id) {
            return Err(AppError::invalid("The comment you are replying to does not exist."));
        }
    }

    let comment = blog_comment::ActiveModel {
        blog_id: Set(blog_id),
        user_id: Set(user.id),
        parent_comment_id: Set(req.parent_comment_id),
        content: Set(content),
        created_at: Set(unix_now()),
        ..Default::default()
    }
    .insert(&state.db)
    .await?;

    state.mail.send(compose::comment_added(&user.email, &user.name, &post.title, &comment.content));
    Ok(comment_views(state, vec![comment])
        .await?
        .pop()
        .ok_or_else(|| AppError::Internal("comment vanished".to_string()))?)
}

/// Delete a comment and its replies; returns how many rows went
pub async fn remove_comment(state: &AppState, user: &CurrentUser, comment_id: i32) -> AppResult<usize> {
    let comment = blog_comment::Entity::find_by_id(comment_id)
        .one(&state.db)
        .await?
        .ok_or_not_found("Comment not found")?;
    let post = find_blog(state, comment.blog_id).await?;

    if comment.user_id != user.id && post.user_id != user.id && !user.can_moderate() {
        return Err(AppError::Forbidden);
    }

    let blog_id = comment.blog_id;
    let removed = state
        .db
        .transaction::<_, usize, sea_orm::DbErr>(|txn| {
            Box::pin(async move {
                let siblings = blog_comment::Entity::find()
                    .filter(blog_comment::Column::BlogId.eq(blog_id))
                    .all(txn)
                    .await?;
                let ids = collect_thread(&siblings, comment_id);
                let count = ids.len();
                blog_comment::Entity::delete_many()
                    .filter(blog_comment::Column::Id.is_in(ids))
                    .exec(txn)
                    .await?;
                Ok(count)
            })
        })
        .await?;

    state.mail.send(compose::comment_deleted(&user.email, &user.name, &post.title, removed));
    tracing::info!("Removed {} comment(s) from blog {}", removed, blog_id);
    Ok(removed)
}

/// GET /api/blogs
pub async fn list_blogs(State(state): State<AppState>) -> AppResult<Json<ApiResponse<Vec<BlogSummary>>>> {
    Ok(Json(ApiResponse::success(blog_summaries(&state).await?)))
}

/// GET /api/blogs/:id
pub async fn get_blog(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<i32>,
) -> AppResult<Json<ApiResponse<BlogDetail>>> {
    Ok(Json(ApiResponse::success(blog_detail(&state, &current_user, id).await?)))
}

/// POST /api/blogs (multipart)
pub async fn create_blog(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    multipart: Multipart,
) -> AppResult<Json<ApiResponse<blog::Model>>> {
    let form = uploads::read_form(multipart).await?;
    let post = create_post(&state, &current_user, &form).await?;
    Ok(Json(ApiResponse::success_with("Blog created successfully", post)))
}

/// POST /api/blogs/:id/update (multipart)
pub async fn update_blog(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<i32>,
    multipart: Multipart,
) -> AppResult<Json<ApiResponse<blog::Model>>> {
    let form = uploads::read_form(multipart).await?;
    let post = update_post(&state, &current_user, id, &form).await?;
    Ok(Json(ApiResponse::success_with("Blog updated successfully", post)))
}

/// POST /api/blogs/:id/delete
pub async fn delete_blog(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<i32>,
) -> AppResult<Json<ApiResponse<()>>> {
    remove_post(&state, &current_user, id).await?;
    Ok(Json(ApiResponse::success_msg("Blog deleted successfully")))
}

/// POST /api/blogs/:id/rate
pub async fn rate_blog(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<i32>,
    Json(req): Json<RateRequest>,
) -> AppResult<Json<ApiResponse<RatingSummary>>> {
    let summary = rate_post(&state, &current_user, id, req.rating).await?;
    Ok(Json(ApiResponse::success_with("Rating saved", summary)))
}

/// POST /api/blogs/:id/comments
pub async fn add_comment(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<i32>,
    Json(req): Json<CommentRequest>,
) -> AppResult<Json<ApiResponse<CommentView>>> {
    let view = post_comment(&state, &current_user, id, req).await?;
    Ok(Json(ApiResponse::success_with("Comment added", view)))
}

/// POST /api/blogs/comments/:id/delete
pub async fn delete_comment(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<i32>,
) -> AppResult<Json<ApiResponse<usize>>> {
    let removed = remove_comment(&state, &current_user, id).await?;
    Ok(Json(ApiResponse::success_with("Comment deleted", removed)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permission::role;
    use crate::testutil::{create_user, drain, test_state};
    use sea_orm::PaginatorTrait;

    fn form(title: &str, content: &str) -> FormData {
        FormData::default()
            .with_text("title", title)
            .with_text("content", content)
    }

    fn reply(content: &str, parent: Option<i32>) -> CommentRequest {
        CommentRequest {
            content: content.to_string(),
            parent_comment_id: parent,
        }
    }

    #[tokio::test]
    async fn create_validates_fields_and_image() {
        let (state, mut mail) = test_state().await;
        let sam = create_user(&state, "s@school.test", "Sam", &[role::STUDENT]).await;

        let err = create_post(&state, &sam, &form("", "")).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(ref m) if m.len() == 2));

        let bad = form("T", "C").with_file("image", "virus.exe", b"MZ".to_vec());
        let err = create_post(&state, &sam, &bad).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(ref m) if m[0] == IMAGES_ONLY));

        let good = form("Week 1", "Notes").with_file("image", "cat.PNG", b"png".to_vec());
        let post = create_post(&state, &sam, &good).await.unwrap();
        let image = post.image.clone().unwrap();
        assert!(image.starts_with("/uploads/blogs/"));
        assert!(uploads::resolve(&state.config.upload_dir, &image).unwrap().exists());

        let mails = drain(&mut mail);
        assert_eq!(mails.len(), 1);
        assert_eq!(mails[0].subject, "Blog created");

        let _ = tokio::fs::remove_dir_all(&state.config.upload_dir).await;
    }

    #[tokio::test]
    async fn edit_and_delete_permissions() {
        let (state, _mail) = test_state().await;
        let owner = create_user(&state, "s@school.test", "Sam", &[role::STUDENT]).await;
        let other = create_user(&state, "k@school.test", "Kim", &[role::STUDENT]).await;
        let staff = create_user(&state, "st@school.test", "Stan", &[role::STAFF]).await;
        let admin = create_user(&state, "a@school.test", "Ada", &[role::ADMIN]).await;

        let post = create_post(&state, &owner, &form("Draft", "Body")).await.unwrap();

        assert!(matches!(
            update_post(&state, &other, post.id, &form("X", "Y")).await,
            Err(AppError::Forbidden)
        ));
        let edited = update_post(&state, &staff, post.id, &form("Edited", "Body")).await.unwrap();
        assert_eq!(edited.title, "Edited");
        assert_eq!(edited.user_id, owner.id);

        assert!(matches!(remove_post(&state, &staff, post.id).await, Err(AppError::Forbidden)));
        remove_post(&state, &admin, post.id).await.unwrap();
        assert!(matches!(
            blog_detail(&state, &owner, post.id).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn rating_is_upserted() {
        let (state, _mail) = test_state().await;
        let sam = create_user(&state, "s@school.test", "Sam", &[role::STUDENT]).await;
        let kim = create_user(&state, "k@school.test", "Kim", &[role::STUDENT]).await;
        let post = create_post(&state, &sam, &form("Post", "Body")).await.unwrap();

        for bad in [0, 6] {
            let err = rate_post(&state, &kim, post.id, bad).await.unwrap_err();
            assert!(matches!(err, AppError::Validation(ref m) if m[0] == INVALID_RATING));
        }
        assert!(matches!(rate_post(&state, &kim, 999, 3).await, Err(AppError::NotFound(_))));

        rate_post(&state, &kim, post.id, 2).await.unwrap();
        let summary = rate_post(&state, &kim, post.id, 4).await.unwrap();
        assert_eq!(summary.count, 1);
        assert_eq!(blog_rating::Entity::find().all(&state.db).await.unwrap().len(), 1);
        rate_post(&state, &sam, post.id, 5).await.unwrap();

        let detail = blog_detail(&state, &kim, post.id).await.unwrap();
        assert_eq!(detail.my_rating, Some(4));
        assert_eq!(detail.blog.rating.count, 2);
        assert!((detail.blog.rating.average - 4.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn deleting_comment_removes_subtree() {
        let (state, _mail) = test_state().await;
        let owner = create_user(&state, "s@school.test", "Sam", &[role::STUDENT]).await;
        let kim = create_user(&state, "k@school.test", "Kim", &[role::STUDENT]).await;
        let outsider = create_user(&state, "o@school.test", "Otto", &[role::STUDENT]).await;
        let post = create_post(&state, &owner, &form("Post", "Body")).await.unwrap();

        assert!(post_comment(&state, &kim, post.id, reply("  ", None)).await.is_err());
        let root = post_comment(&state, &kim, post.id, reply("first", None)).await.unwrap();
        let child = post_comment(&state, &owner, post.id, reply("answer", Some(root.id))).await.unwrap();
        post_comment(&state, &kim, post.id, reply("thanks", Some(child.id))).await.unwrap();
        let other = post_comment(&state, &kim, post.id, reply("separate", None)).await.unwrap();

        let detail = blog_detail(&state, &kim, post.id).await.unwrap();
        assert_eq!(detail.comments.len(), 2);
        assert_eq!(detail.comments[0].replies[0].replies[0].comment.content, "thanks");

        assert!(matches!(
            remove_comment(&state, &outsider, root.id).await,
            Err(AppError::Forbidden)
        ));
        assert_eq!(remove_comment(&state, &owner, root.id).await.unwrap(), 3);

        let left = blog_comment::Entity::find().count(&state.db).await.unwrap();
        assert_eq!(left, 1);
        assert_eq!(remove_comment(&state, &kim, other.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn reply_must_target_same_blog() {
        let (state, _mail) = test_state().await;
        let sam = create_user(&state, "s@school.test", "Sam", &[role::STUDENT]).await;
        let a = create_post(&state, &sam, &form("A", "Body")).await.unwrap();
        let b = create_post(&state, &sam, &form("B", "Body")).await.unwrap();
        let on_a = post_comment(&state, &sam, a.id, reply("hi", None)).await.unwrap();

        assert!(post_comment(&state, &sam, b.id, reply("wrong", Some(on_a.id))).await.is_err());
        assert_eq!(blog_summaries(&state).await.unwrap().len(), 2);
    }
}
