//! Document handlers
//!
//! Shared files with threaded comments

use axum::{
    body::Body,
    extract::{Multipart, Path, State},
    http::header,
    response::{IntoResponse, Json, Response},
    Extension,
};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::Serialize;
use tokio_util::io::ReaderStream;

use crate::entity::{document, document_comment};
use crate::error::{AppError, AppResult, OptionExt};
use crate::handlers::blog::CommentRequest;
use crate::handlers::comment::{build_tree, collect_thread, validate_content, CommentNode, CommentView};
use crate::handlers::unix_now;
use crate::handlers::user::users_by_id;
use crate::mail::compose;
use crate::middleware::auth::CurrentUser;
use crate::permission::role;
use crate::routes::ApiResponse;
use crate::state::AppState;
use crate::uploads::{self, FormData, UploadKind, DOCUMENT_EXTENSIONS, MAX_DOCUMENT_SIZE};

pub const TOO_LARGE: &str = "File size cannot exceed 10MB";
pub const BAD_TYPE: &str = "Invalid file type. Allowed types: PDF, DOC, DOCX, TXT, XLS, XLSX";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSummary {
    pub id: i32,
    pub title: String,
    pub description: String,
    pub file_name: String,
    pub file_type: String,
    pub file_size: i64,
    pub upload_date: i64,
    pub uploader_id: i32,
    pub uploader: String,
    pub uploader_role: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentDetail {
    #[serde(flatten)]
    pub document: DocumentSummary,
    pub file_path: String,
    pub can_edit: bool,
    pub comments: Vec<CommentNode>,
}

async fn find_document(state: &AppState, id: i32) -> AppResult<document::Model> {
    document::Entity::find_by_id(id)
        .one(&state.db)
        .await?
        .ok_or_not_found("Document not found")
}

/// Attach uploader names and first roles
pub async fn summarize(state: &AppState, docs: Vec<document::Model>) -> AppResult<Vec<DocumentSummary>> {
    let uploaders = users_by_id(&state.db, docs.iter().map(|d| d.user_id)).await?;

    let mut result = Vec::with_capacity(docs.len());
    for d in docs {
        let (uploader, uploader_role) = match uploaders.get(&d.user_id) {
            Some(u) => {
                let first_role = state.perm.get_user_roles(&u.username).await?.into_iter().next();
                (u.username.clone(), first_role.unwrap_or_else(|| "Unknown".to_string()))
            }
            None => (String::new(), "Unknown".to_string()),
        };
        result.push(DocumentSummary {
            file_name: uploads::display_name(&d.file_path).to_string(),
            id: d.id,
            title: d.title,
            description: d.description,
            file_type: d.file_type,
            file_size: d.file_size,
            upload_date: d.upload_date,
            uploader_id: d.user_id,
            uploader,
            uploader_role,
        });
    }
    Ok(result)
}

pub async fn document_summaries(state: &AppState) -> AppResult<Vec<DocumentSummary>> {
    let docs = document::Entity::find()
        .order_by_desc(document::Column::UploadDate)
        .order_by_desc(document::Column::Id)
        .all(&state.db)
        .await?;
    summarize(state, docs).await
}

async fn comment_views(state: &AppState, comments: Vec<document_comment::Model>) -> AppResult<Vec<CommentView>> {
    let authors = users_by_id(&state.db, comments.iter().map(|c| c.user_id)).await?;
    Ok(comments
        .into_iter()
        .map(|c| CommentView::new(c.id, c.parent_comment_id, c.content, c.created_at, c.user_id, &authors))
        .collect())
}

pub async fn document_detail(state: &AppState, user: &CurrentUser, id: i32) -> AppResult<DocumentDetail> {
    let doc = find_document(state, id).await?;
    let can_edit = doc.user_id == user.id;
    let file_path = doc.file_path.clone();

    let comments = document_comment::Entity::find()
        .filter(document_comment::Column::DocumentId.eq(id))
        .all(&state.db)
        .await?;
    let comments = build_tree(comment_views(state, comments).await?);

    let document = summarize(state, vec![doc])
        .await?
        .pop()
        .ok_or_not_found("Document not found")?;

    Ok(DocumentDetail {
        document,
        file_path,
        can_edit,
        comments,
    })
}

fn document_fields(form: &FormData) -> AppResult<(String, String)> {
    let mut errors = Vec::new();
    let title = form.text("title").unwrap_or_default();
    let description = form.text("description").unwrap_or_default();
    if title.is_empty() {
        errors.push("The Title field is required.".to_string());
    } else if title.chars().count() > 100 {
        errors.push("Title cannot exceed 100 characters.".to_string());
    }
    if description.chars().count() > 500 {
        errors.push("Description cannot exceed 500 characters.".to_string());
    }
    if !errors.is_empty() {
        return Err(AppError::Validation(errors));
    }
    Ok((title.to_string(), description.to_string()))
}

/// A stored file: public path, extension, size
struct StoredFile {
    path: String,
    file_type: String,
    size: i64,
}

async fn store_document(state: &AppState, form: &FormData) -> AppResult<Option<StoredFile>> {
    let Some(file) = form.file("file") else {
        return Ok(None);
    };
    if file.bytes.len() > MAX_DOCUMENT_SIZE {
        return Err(AppError::invalid(TOO_LARGE));
    }
    if !uploads::is_allowed(&file.file_name, &DOCUMENT_EXTENSIONS) {
        return Err(AppError::invalid(BAD_TYPE));
    }
    let path = uploads::store(&state.config.upload_dir, UploadKind::Documents, &file.file_name, &file.bytes).await?;
    Ok(Some(StoredFile {
        path,
        file_type: uploads::extension_of(&file.file_name),
        size: file.bytes.len() as i64,
    }))
}

pub async fn upload(state: &AppState, user: &CurrentUser, form: &FormData) -> AppResult<document::Model> {
    let (title, description) = document_fields(form)?;
    let Some(stored) = store_document(state, form).await? else {
        return Err(AppError::invalid("Please select a file to upload."));
    };

    let inserted = document::ActiveModel {
        title: Set(title),
        description: Set(description),
        file_path: Set(stored.path.clone()),
        user_id: Set(user.id),
        upload_date: Set(unix_now()),
        file_type: Set(stored.file_type),
        file_size: Set(stored.size),
        ..Default::default()
    }
    .insert(&state.db)
    .await;
    let doc = uploads::discard_on_err(&state.config.upload_dir, Some(stored.path.as_str()), inserted).await?;

    tracing::info!("Document {} uploaded by {}", doc.id, user.username);
    Ok(doc)
}

/// Owner-only edit; a new file replaces the stored one
pub async fn update(
    state: &AppState,
    user: &CurrentUser,
    id: i32,
    form: &FormData,
) -> AppResult<document::Model> {
    let doc = find_document(state, id).await?;
    if doc.user_id != user.id {
        return Err(AppError::Forbidden);
    }
    let (title, description) = document_fields(form)?;
    let replacement = store_document(state, form).await?;

    let old_path = doc.file_path.clone();
    let mut active: document::ActiveModel = doc.into();
    active.title = Set(title);
    active.description = Set(description);
    if let Some(stored) = &replacement {
        active.file_path = Set(stored.path.clone());
        active.file_type = Set(stored.file_type.clone());
        active.file_size = Set(stored.size);
        active.upload_date = Set(unix_now());
    }
    let result = active.update(&state.db).await;
    let new_path = replacement.as_ref().map(|f| f.path.as_str());
    let updated = uploads::discard_on_err(&state.config.upload_dir, new_path, result).await?;

    if replacement.is_some() {
        uploads::remove(&state.config.upload_dir, &old_path).await;
    }
    tracing::info!("Document {} updated by {}", updated.id, user.username);
    Ok(updated)
}

/// Owner, or a tutor removing a student's upload
async fn can_delete(state: &AppState, user: &CurrentUser, doc: &document::Model) -> AppResult<bool> {
    if doc.user_id == user.id {
        return Ok(true);
    }
    if !user.is_tutor() {
        return Ok(false);
    }
    match users_by_id(&state.db, [doc.user_id]).await?.remove(&doc.user_id) {
        Some(owner) => Ok(state.perm.has_role(&owner.username, role::STUDENT).await?),
        None => Ok(false),
    }
}

pub async fn remove(state: &AppState, user: &CurrentUser, id: i32) -> AppResult<()> {
    let doc = find_document(state, id).await?;
    if !can_delete(state, user, &doc).await? {
        return Err(AppError::Forbidden);
    }

    state
        .db
        .transaction::<_, (), sea_orm::DbErr>(|txn| {
            Box::pin(async move {
                document_comment::Entity::delete_many()
                    .filter(document_comment::Column::DocumentId.eq(id))
                    .exec(txn)
                    .await?;
                document::Entity::delete_by_id(id).exec(txn).await?;
                Ok(())
            })
        })
        .await?;

    uploads::remove(&state.config.upload_dir, &doc.file_path).await;
    tracing::info!("Document {} deleted by {}", id, user.username);
    Ok(())
}

pub async fn post_comment(
    state: &AppState,
    user: &CurrentUser,
    document_id: i32,
    req: CommentRequest,
) -> AppResult<CommentView> {
    let content = validate_content(&req.content)?;
    let doc = find_document(state, document_id).await?;

    if let Some(parent_id) = req.parent_comment_id {
        let parent = document_comment::Entity::find_by_id(parent_id).one(&state.db).await?;
        if parent.map(|p| p.document_id) != Some(document_id) {
            return Err(AppError::invalid("The comment you are replying to does not exist."));
        }
    }

    let comment = document_comment::ActiveModel {
        document_id: Set(document_id),
        user_id: Set(user.id),
        parent_comment_id: Set(req.parent_comment_id),
        content: Set(content),
        created_at: Set(unix_now()),
        ..Default::default()
    }
    .insert(&state.db)
    .await?;

    state.mail.send(compose::comment_added(&user.email, &user.name, &doc.title, &comment.content));
    comment_views(state, vec![comment])
        .await?
        .pop()
        .ok_or_else(|| AppError::Internal("comment vanished".to_string()))
}

pub async fn remove_comment(state: &AppState, user: &CurrentUser, comment_id: i32) -> AppResult<usize> {
    let comment = document_comment::Entity::find_by_id(comment_id)
        .one(&state.db)
        .await?
        .ok_or_not_found("Comment not found")?;
    let doc = find_document(state, comment.document_id).await?;

    if comment.user_id != user.id && doc.user_id != user.id && !user.can_moderate() {
        return Err(AppError::Forbidden);
    }

    let document_id = comment.document_id;
    let removed = state
        .db
        .transaction::<_, usize, sea_orm::DbErr>(|txn| {
            Box::pin(async move {
                let siblings = document_comment::Entity::find()
                    .filter(document_comment::Column::DocumentId.eq(document_id))
                    .all(txn)
                    .await?;
                let ids = collect_thread(&siblings, comment_id);
                let count = ids.len();
                document_comment::Entity::delete_many()
                    .filter(document_comment::Column::Id.is_in(ids))
                    .exec(txn)
                    .await?;
                Ok(count)
            })
        })
        .await?;

    state.mail.send(compose::comment_deleted(&user.email, &user.name, &doc.title, removed));
    Ok(removed)
}

/// GET /api/documents
pub async fn list_documents(
    State(state): State<AppState>,
) -> AppResult<Json<ApiResponse<Vec<DocumentSummary>>>> {
    Ok(Json(ApiResponse::success(document_summaries(&state).await?)))
}

/// GET /api/documents/:id
pub async fn get_document(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<i32>,
) -> AppResult<Json<ApiResponse<DocumentDetail>>> {
    Ok(Json(ApiResponse::success(document_detail(&state, &current_user, id).await?)))
}

/// POST /api/documents (multipart)
pub async fn upload_document(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    multipart: Multipart,
) -> AppResult<Json<ApiResponse<document::Model>>> {
    let form = uploads::read_form(multipart).await?;
    let doc = upload(&state, &current_user, &form).await?;
    Ok(Json(ApiResponse::success_with("Document uploaded successfully", doc)))
}

/// POST /api/documents/:id/update (multipart)
pub async fn update_document(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<i32>,
    multipart: Multipart,
) -> AppResult<Json<ApiResponse<document::Model>>> {
    let form = uploads::read_form(multipart).await?;
    let doc = update(&state, &current_user, id, &form).await?;
    Ok(Json(ApiResponse::success_with("Document updated successfully", doc)))
}

/// POST /api/documents/:id/delete
pub async fn delete_document(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<i32>,
) -> AppResult<Json<ApiResponse<()>>> {
    remove(&state, &current_user, id).await?;
    Ok(Json(ApiResponse::success_msg("Document deleted successfully")))
}

/// GET /api/documents/:id/download
pub async fn download_document(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> AppResult<Response> {
    let doc = find_document(&state, id).await?;
    let path = uploads::resolve(&state.config.upload_dir, &doc.file_path)
        .ok_or_not_found("File not found")?;
    let file = match tokio::fs::File::open(&path).await {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(AppError::NotFound("File not found".to_string()));
        }
        Err(e) => return Err(e.into()),
    };

    let file_name = uploads::display_name(&doc.file_path).to_string();
    let body = Body::from_stream(ReaderStream::new(file));

    Ok((
        [
            (header::CONTENT_TYPE, uploads::mime_type(&file_name).to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", file_name.replace('"', "")),
            ),
        ],
        body,
    )
        .into_response())
}

/// POST /api/documents/:id/comments
pub async fn add_comment(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<i32>,
    Json(req): Json<CommentRequest>,
) -> AppResult<Json<ApiResponse<CommentView>>> {
    let view = post_comment(&state, &current_user, id, req).await?;
    Ok(Json(ApiResponse::success_with("Comment added", view)))
}

/// POST /api/documents/comments/:id/delete
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
    use crate::testutil::{create_user, test_state};
    use axum::http::StatusCode;

    fn form(title: &str, file_name: &str, bytes: Vec<u8>) -> FormData {
        FormData::default()
            .with_text("title", title)
            .with_text("description", "notes")
            .with_file("file", file_name, bytes)
    }

    fn first_message(err: AppError) -> String {
        match err {
            AppError::Validation(msgs) => msgs[0].clone(),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[tokio::test]
    async fn upload_validates_size_and_type() {
        let (state, _mail) = test_state().await;
        let sam = create_user(&state, "s@school.test", "Sam", &[role::STUDENT]).await;

        let err = upload(&state, &sam, &form("Big", "big.pdf", vec![0; MAX_DOCUMENT_SIZE + 1])).await.unwrap_err();
        assert_eq!(first_message(err), TOO_LARGE);

        let err = upload(&state, &sam, &form("Exe", "run.exe", b"MZ".to_vec())).await.unwrap_err();
        assert_eq!(first_message(err), BAD_TYPE);

        let err = upload(&state, &sam, &FormData::default().with_text("title", "No file")).await.unwrap_err();
        assert_eq!(first_message(err), "Please select a file to upload.");

        let long_title = "x".repeat(101);
        let err = upload(&state, &sam, &form(&long_title, "a.txt", b"a".to_vec())).await.unwrap_err();
        assert_eq!(first_message(err), "Title cannot exceed 100 characters.");

        let doc = upload(&state, &sam, &form("Notes", "week 1.TXT", b"hello".to_vec())).await.unwrap();
        assert_eq!(doc.file_type, ".txt");
        assert_eq!(doc.file_size, 5);
        assert!(doc.file_path.starts_with("/uploads/documents/"));
        assert!(doc.file_path.ends_with("_week_1.TXT"));

        let list = document_summaries(&state).await.unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].uploader, "s@school.test");
        assert_eq!(list[0].uploader_role, "Student");
        assert_eq!(list[0].file_name, "week_1.TXT");

        let _ = tokio::fs::remove_dir_all(&state.config.upload_dir).await;
    }

    #[tokio::test]
    async fn update_replaces_file_for_owner_only() {
        let (state, _mail) = test_state().await;
        let sam = create_user(&state, "s@school.test", "Sam", &[role::STUDENT]).await;
        let kim = create_user(&state, "k@school.test", "Kim", &[role::STUDENT]).await;
        let doc = upload(&state, &sam, &form("Notes", "a.txt", b"one".to_vec())).await.unwrap();
        let old = uploads::resolve(&state.config.upload_dir, &doc.file_path).unwrap();

        assert!(matches!(
            update(&state, &kim, doc.id, &form("Mine", "b.txt", b"x".to_vec())).await,
            Err(AppError::Forbidden)
        ));

        let updated = update(&state, &sam, doc.id, &form("Notes v2", "b.pdf", b"two!".to_vec())).await.unwrap();
        assert_eq!(updated.title, "Notes v2");
        assert_eq!(updated.file_type, ".pdf");
        assert_eq!(updated.file_size, 4);
        assert!(!old.exists());

        let detail = document_detail(&state, &kim, doc.id).await.unwrap();
        assert!(!detail.can_edit);
        assert!(document_detail(&state, &sam, doc.id).await.unwrap().can_edit);

        let _ = tokio::fs::remove_dir_all(&state.config.upload_dir).await;
    }

    #[tokio::test]
    async fn tutor_may_delete_student_documents() {
        let (state, _mail) = test_state().await;
        let sam = create_user(&state, "s@school.test", "Sam", &[role::STUDENT]).await;
        let kim = create_user(&state, "k@school.test", "Kim", &[role::STUDENT]).await;
        let tina = create_user(&state, "t@school.test", "Tina", &[role::TUTOR]).await;
        let otto = create_user(&state, "o@school.test", "Otto", &[role::TUTOR]).await;

        let student_doc = upload(&state, &sam, &form("S", "s.txt", b"s".to_vec())).await.unwrap();
        let tutor_doc = upload(&state, &tina, &form("T", "t.txt", b"t".to_vec())).await.unwrap();
        let root = post_comment(&state, &kim, student_doc.id, CommentRequest {
            content: "nice".to_string(),
            parent_comment_id: None,
        })
        .await
        .unwrap();
        post_comment(&state, &sam, student_doc.id, CommentRequest {
            content: "thanks".to_string(),
            parent_comment_id: Some(root.id),
        })
        .await
        .unwrap();

        assert!(matches!(remove(&state, &kim, student_doc.id).await, Err(AppError::Forbidden)));
        assert!(matches!(remove(&state, &otto, tutor_doc.id).await, Err(AppError::Forbidden)));

        remove(&state, &tina, student_doc.id).await.unwrap();
        assert!(document_comment::Entity::find().all(&state.db).await.unwrap().is_empty());
        assert!(matches!(
            document_detail(&state, &sam, student_doc.id).await,
            Err(AppError::NotFound(_))
        ));

        remove(&state, &tina, tutor_doc.id).await.unwrap();
        let _ = tokio::fs::remove_dir_all(&state.config.upload_dir).await;
    }

    #[tokio::test]
    async fn comment_thread_delete() {
        let (state, _mail) = test_state().await;
        let sam = create_user(&state, "s@school.test", "Sam", &[role::STUDENT]).await;
        let kim = create_user(&state, "k@school.test", "Kim", &[role::STUDENT]).await;
        let doc = upload(&state, &sam, &form("Doc", "d.txt", b"d".to_vec())).await.unwrap();

        let root = post_comment(&state, &kim, doc.id, CommentRequest {
            content: "q".to_string(),
            parent_comment_id: None,
        })
        .await
        .unwrap();
        post_comment(&state, &sam, doc.id, CommentRequest {
            content: "a".to_string(),
            parent_comment_id: Some(root.id),
        })
        .await
        .unwrap();

        let detail = document_detail(&state, &sam, doc.id).await.unwrap();
        assert_eq!(detail.comments.len(), 1);
        assert_eq!(detail.comments[0].replies.len(), 1);

        assert_eq!(remove_comment(&state, &kim, root.id).await.unwrap(), 2);
        let _ = tokio::fs::remove_dir_all(&state.config.upload_dir).await;
    }

    #[tokio::test]
    async fn failed_insert_leaves_no_file_behind() {
        use sea_orm::ConnectionTrait;

        let (state, _mail) = test_state().await;
        let sam = create_user(&state, "s@school.test", "Sam", &[role::STUDENT]).await;
        state.db.execute_unprepared("DROP TABLE school_document").await.unwrap();

        let err = upload(&state, &sam, &form("Doc", "d.txt", b"d".to_vec())).await.unwrap_err();
        assert!(matches!(err, AppError::Database(_)));

        let dir = state.config.upload_dir.join(UploadKind::Documents.dir_name());
        let mut entries = tokio::fs::read_dir(&dir).await.unwrap();
        assert!(entries.next_entry().await.unwrap().is_none());
        let _ = tokio::fs::remove_dir_all(&state.config.upload_dir).await;
    }

    #[tokio::test]
    async fn download_streams_file() {
        let (state, _mail) = test_state().await;
        let sam = create_user(&state, "s@school.test", "Sam", &[role::STUDENT]).await;
        let doc = upload(&state, &sam, &form("Doc", "d.pdf", b"%PDF".to_vec())).await.unwrap();

        let resp = download_document(State(state.clone()), Path(doc.id)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "application/pdf");

        assert!(matches!(
            download_document(State(state.clone()), Path(999)).await,
            Err(AppError::NotFound(_))
        ));
        let _ = tokio::fs::remove_dir_all(&state.config.upload_dir).await;
    }
}
