use axum::{
    extract::DefaultBodyLimit,
    http::StatusCode,
    middleware,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Serialize;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tower_sessions::{MemoryStore, SessionManagerLayer};

use crate::handlers;
use crate::middleware::auth_layer;
use crate::state::AppState;
use crate::ws;

pub mod health;

/// API response wrapper
#[derive(Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub code: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self::success_with("success", data)
    }

    pub fn success_with(message: impl Into<String>, data: T) -> Self {
        Self {
            code: true,
            message: message.into(),
            data: Some(data),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            code: false,
            message: message.into(),
            data: None,
        }
    }
}

impl ApiResponse<()> {
    pub fn success_msg(message: impl Into<String>) -> Self {
        Self {
            code: true,
            message: message.into(),
            data: None,
        }
    }
}

/// Create the main router
pub fn create_router(state: AppState) -> Router {
    let session_store = MemoryStore::default();
    let session_layer = SessionManagerLayer::new(session_store)
        .with_secure(false) // Set to true in production with HTTPS
        .with_http_only(true);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let upload_limit = DefaultBodyLimit::max(state.config.max_upload_size);

    let api_routes = Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Auth routes
        .route("/login", post(handlers::auth::login))
        .route("/logout", post(handlers::auth::logout))
        .route("/user/current", get(handlers::auth::current_user))
        // Account administration
        .route("/admin/register", post(handlers::user::register))
        .route("/admin/users", get(handlers::user::list_users))
        .route("/admin/users/update", post(handlers::user::update_user))
        // Role routes
        .route("/role/list", get(handlers::role::list_roles))
        .route("/role/add", post(handlers::role::add_role))
        .route("/role/delete", post(handlers::role::delete_role))
        // Tutor groups
        .route(
            "/groups",
            get(handlers::group::list_groups).post(handlers::group::create_groups),
        )
        .route("/groups/candidates", get(handlers::group::list_candidates))
        .route("/groups/:id", get(handlers::group::get_group))
        .route("/groups/:id/toggle", post(handlers::group::toggle_group))
        .route("/groups/:id/release", post(handlers::group::release_group))
        // Chat
        .route("/messages", get(handlers::message::list_chats))
        .route(
            "/messages/:group_id",
            get(handlers::message::get_messages).post(handlers::message::send_message),
        )
        // Blogs
        .route(
            "/blogs",
            get(handlers::blog::list_blogs)
                .post(handlers::blog::create_blog)
                .layer(upload_limit.clone()),
        )
        .route("/blogs/:id", get(handlers::blog::get_blog))
        .route(
            "/blogs/:id/update",
            post(handlers::blog::update_blog).layer(upload_limit.clone()),
        )
        .route("/blogs/:id/delete", post(handlers::blog::delete_blog))
        .route("/blogs/:id/rate", post(handlers::blog::rate_blog))
        .route("/blogs/:id/comments", post(handlers::blog::add_comment))
        .route("/blogs/comments/:id/delete", post(handlers::blog::delete_comment))
        // Documents
        .route(
            "/documents",
            get(handlers::document::list_documents)
                .post(handlers::document::upload_document)
                .layer(upload_limit.clone()),
        )
        .route("/documents/:id", get(handlers::document::get_document))
        .route(
            "/documents/:id/update",
            post(handlers::document::update_document).layer(upload_limit),
        )
        .route("/documents/:id/delete", post(handlers::document::delete_document))
        .route("/documents/:id/download", get(handlers::document::download_document))
        .route("/documents/:id/comments", post(handlers::document::add_comment))
        .route(
            "/documents/comments/:id/delete",
            post(handlers::document::delete_comment),
        )
        // Dashboard
        .route("/dashboard", get(handlers::dashboard::dashboard))
        // Mail
        .route("/email/send-test", post(handlers::mail::send_test))
        // WebSocket
        .route("/ws", get(ws::serve_ws));

    Router::new()
        .nest("/api", api_routes)
        .fallback(fallback)
        .layer(middleware::from_fn_with_state(state.clone(), auth_layer))
        .layer(session_layer)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Fallback handler for 404
pub async fn fallback() -> (StatusCode, Json<ApiResponse<()>>) {
    (StatusCode::NOT_FOUND, Json(ApiResponse::error("Not Found")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permission::role;
    use crate::testutil::{create_user, test_state, PASSWORD};
    use axum::body::Body;
    use axum::http::{header, Request};
    use tower::ServiceExt;

    #[tokio::test]
    async fn health_is_public_and_api_requires_session() {
        let (state, _mail) = test_state().await;
        let app = create_router(state);

        let resp = app
            .clone()
            .oneshot(Request::get("/api/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = app
            .clone()
            .oneshot(Request::get("/api/dashboard").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let resp = app
            .oneshot(Request::get("/nowhere").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn login_cookie_opens_the_api() {
        let (state, _mail) = test_state().await;
        create_user(&state, "s@school.test", "Sam", &[role::STUDENT]).await;
        let app = create_router(state);

        let body = format!(r#"{{"username":"s@school.test","password":"{}"}}"#, PASSWORD);
        let resp = app
            .clone()
            .oneshot(
                Request::post("/api/login")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let cookie = resp.headers()[header::SET_COOKIE]
            .to_str()
            .unwrap()
            .split(';')
            .next()
            .unwrap()
            .to_string();

        let resp = app
            .clone()
            .oneshot(
                Request::get("/api/user/current")
                    .header(header::COOKIE, &cookie)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        // students may not manage roles
        let resp = app
            .oneshot(
                Request::get("/api/role/list")
                    .header(header::COOKIE, &cookie)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }
}
