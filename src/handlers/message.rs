//! Chat handlers
//!
//! Members of a group talk to each other; new posts are pushed over the hub

use axum::{
    extract::{Path, State},
    response::Json,
    Extension,
};
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, QuerySelect, Set};
use serde::{Deserialize, Serialize};

use crate::entity::user::UserSummary;
use crate::entity::{message, tutor_group};
use crate::error::{AppError, AppResult};
use crate::handlers::group::{find_group, group_views, GroupView};
use crate::handlers::unix_now;
use crate::handlers::user::users_by_id;
use crate::middleware::auth::CurrentUser;
use crate::permission::perm;
use crate::routes::ApiResponse;
use crate::state::AppState;
use crate::ws::WsMessage;

pub const CONVERSATION_CLOSED: &str = "this conversation has been closed";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MessageView {
    pub id: i32,
    pub group_id: i32,
    pub sender_id: i32,
    pub sender_name: String,
    pub text: String,
    pub created_at: i64,
}

/// One entry in the chat list
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSummary {
    pub group_id: i32,
    pub other: Option<UserSummary>,
    /// The other participant has a socket open
    pub online: bool,
    pub is_valid: bool,
    pub last_message: Option<MessageView>,
}

#[derive(Debug, Serialize)]
pub struct Conversation {
    pub group: GroupView,
    pub messages: Vec<MessageView>,
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub text: String,
}

/// Attach sender names to stored messages
pub async fn message_views(state: &AppState, messages: Vec<message::Model>) -> AppResult<Vec<MessageView>> {
    let senders = users_by_id(&state.db, messages.iter().map(|m| m.sender_id)).await?;
    Ok(messages
        .into_iter()
        .map(|m| MessageView {
            id: m.id,
            group_id: m.group_id,
            sender_id: m.sender_id,
            sender_name: senders.get(&m.sender_id).map(|u| u.name.clone()).unwrap_or_default(),
            text: m.text_content,
            created_at: m.created_at,
        })
        .collect())
}

/// Every group the user belongs to, newest first
pub async fn groups_of(state: &AppState, user_id: i32) -> AppResult<Vec<tutor_group::Model>> {
    Ok(tutor_group::Entity::find()
        .filter(
            tutor_group::Column::TutorId
                .eq(user_id)
                .or(tutor_group::Column::StudentId.eq(user_id)),
        )
        .order_by_desc(tutor_group::Column::IsValid)
        .order_by_desc(tutor_group::Column::CreatedAt)
        .all(&state.db)
        .await?)
}

/// Latest messages across the given groups, newest first
pub async fn latest_messages(state: &AppState, group_ids: Vec<i32>, limit: usize) -> AppResult<Vec<MessageView>> {
    if group_ids.is_empty() {
        return Ok(Vec::new());
    }
    let messages = message::Entity::find()
        .filter(message::Column::GroupId.is_in(group_ids))
        .order_by_desc(message::Column::CreatedAt)
        .order_by_desc(message::Column::Id)
        .limit(limit as u64)
        .all(&state.db)
        .await?;
    message_views(state, messages).await
}

pub async fn chat_list(state: &AppState, user: &CurrentUser) -> AppResult<Vec<ChatSummary>> {
    let groups = groups_of(state, user.id).await?;
    let others = users_by_id(&state.db, groups.iter().map(|g| g.other_member(user.id))).await?;

    let mut chats = Vec::with_capacity(groups.len());
    for g in groups {
        let last_message = latest_messages(state, vec![g.id], 1).await?.pop();
        let other_id = g.other_member(user.id);
        chats.push(ChatSummary {
            group_id: g.id,
            other: others.get(&other_id).map(UserSummary::from),
            online: state.hub.is_online(other_id),
            is_valid: g.is_valid,
            last_message,
        });
    }
    Ok(chats)
}

pub async fn conversation(state: &AppState, user: &CurrentUser, group_id: i32) -> AppResult<Conversation> {
    let group = find_group(&state.db, group_id).await?;
    if !group.has_member(user.id) {
        return Err(AppError::Forbidden);
    }

    let messages = message::Entity::find()
        .filter(message::Column::GroupId.eq(group_id))
        .order_by_asc(message::Column::CreatedAt)
        .order_by_asc(message::Column::Id)
        .all(&state.db)
        .await?;

    let group = group_views(&state.db, vec![group])
        .await?
        .pop()
        .ok_or_else(|| AppError::NotFound("Group not found".to_string()))?;

    Ok(Conversation {
        group,
        messages: message_views(state, messages).await?,
    })
}

/// Store a message and push it to the group's connected members
pub async fn post_message(
    state: &AppState,
    user: &CurrentUser,
    group_id: i32,
    text: &str,
) -> AppResult<MessageView> {
    let text = text.trim();
    if text.is_empty() {
        return Err(AppError::invalid("Message cannot be empty."));
    }

    let group = find_group(&state.db, group_id).await?;
    // Sockets keep the user from connect time, so ask the enforcer
    if !group.has_member(user.id) || !state.perm.can_access(&user.username, perm::CHAT).await {
        return Err(AppError::Forbidden);
    }
    if !group.is_valid {
        return Err(AppError::invalid(CONVERSATION_CLOSED));
    }

    let stored = message::ActiveModel {
        group_id: Set(group.id),
        sender_id: Set(user.id),
        text_content: Set(text.to_string()),
        file_count: Set(0),
        created_at: Set(unix_now()),
        ..Default::default()
    }
    .insert(&state.db)
    .await?;

    let view = MessageView {
        id: stored.id,
        group_id: stored.group_id,
        sender_id: stored.sender_id,
        sender_name: user.name.clone(),
        text: stored.text_content,
        created_at: stored.created_at,
    };

    state
        .hub
        .send_to_users(&[group.tutor_id, group.student_id], &WsMessage::Message(view.clone()));
    Ok(view)
}

/// GET /api/messages
pub async fn list_chats(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
) -> AppResult<Json<ApiResponse<Vec<ChatSummary>>>> {
    Ok(Json(ApiResponse::success(chat_list(&state, &current_user).await?)))
}

/// GET /api/messages/:group_id
pub async fn get_messages(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(group_id): Path<i32>,
) -> AppResult<Json<ApiResponse<Conversation>>> {
    Ok(Json(ApiResponse::success(
        conversation(&state, &current_user, group_id).await?,
    )))
}

/// POST /api/messages/:group_id
pub async fn send_message(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(group_id): Path<i32>,
    Json(req): Json<SendMessageRequest>,
) -> AppResult<Json<ApiResponse<MessageView>>> {
    let view = post_message(&state, &current_user, group_id, &req.text).await?;
    Ok(Json(ApiResponse::success(view)))
}
