//! WebSocket Hub implementation
//!
//! Tracks every open socket per user and pushes chat messages to group members

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    Extension,
};
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::handlers::message::{post_message, MessageView};
use crate::middleware::auth::CurrentUser;
use crate::state::AppState;

/// Client request to post into a group
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendRequest {
    pub group_id: i32,
    pub text: String,
}

/// WebSocket message types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum WsMessage {
    #[serde(rename = "message")]
    Message(MessageView),
    #[serde(rename = "send")]
    Send(SendRequest),
    #[serde(rename = "error")]
    Error(String),
    #[serde(rename = "ping")]
    Ping,
    #[serde(rename = "pong")]
    Pong,
}

/// WebSocket Hub
pub struct Hub {
    /// Connected clients by user ID
    clients: DashMap<i32, Vec<mpsc::UnboundedSender<WsMessage>>>,
}

impl Hub {
    pub fn new() -> Self {
        Self {
            clients: DashMap::new(),
        }
    }

    /// Register a new client
    pub fn register(&self, user_id: i32, tx: mpsc::UnboundedSender<WsMessage>) {
        self.clients.entry(user_id).or_default().push(tx);
        tracing::debug!("WebSocket client registered for user {}", user_id);
    }

    /// Unregister a client
    pub fn unregister(&self, user_id: i32, tx: &mpsc::UnboundedSender<WsMessage>) {
        if let Some(mut clients) = self.clients.get_mut(&user_id) {
            clients.retain(|c| !c.same_channel(tx));
            if clients.is_empty() {
                drop(clients);
                self.clients.remove(&user_id);
            }
        }
        tracing::debug!("WebSocket client unregistered for user {}", user_id);
    }

    /// Push a message to every socket of the given users
    pub fn send_to_users(&self, user_ids: &[i32], msg: &WsMessage) {
        for user_id in user_ids {
            if let Some(mut clients) = self.clients.get_mut(user_id) {
                clients.retain(|c| c.send(msg.clone()).is_ok());
            }
        }
    }

    pub fn is_online(&self, user_id: i32) -> bool {
        self.clients.get(&user_id).is_some_and(|c| !c.is_empty())
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new()
    }
}

/// WebSocket upgrade handler
pub async fn serve_ws(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, current_user))
}

/// Handle a WebSocket connection
async fn handle_socket(socket: WebSocket, state: AppState, user: CurrentUser) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<WsMessage>();

    let user_id = user.id;
    state.hub.register(user_id, tx.clone());

    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let text = serde_json::to_string(&msg).unwrap_or_default();
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    let tx_clone = tx.clone();
    let recv_state = state.clone();
    let recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<WsMessage>(&text) {
                    Ok(WsMessage::Ping) => {
                        let _ = tx_clone.send(WsMessage::Pong);
                    }
                    Ok(WsMessage::Send(req)) => {
                        if let Err(e) = post_message(&recv_state, &user, req.group_id, &req.text).await {
                            let _ = tx_clone.send(WsMessage::Error(e.to_string()));
                        }
                    }
                    Ok(_) => {}
                    Err(e) => tracing::debug!("Ignoring malformed frame: {}", e),
                },
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = send_task => {}
        _ = recv_task => {}
    }

    state.hub.unregister(user_id, &tx);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_use_type_and_data() {
        let pong = serde_json::to_value(WsMessage::Pong).unwrap();
        assert_eq!(pong, serde_json::json!({"type": "pong"}));

        let parsed: WsMessage =
            serde_json::from_str(r#"{"type":"send","data":{"groupId":3,"text":"hi"}}"#).unwrap();
        match parsed {
            WsMessage::Send(req) => {
                assert_eq!(req.group_id, 3);
                assert_eq!(req.text, "hi");
            }
            other => panic!("unexpected frame {:?}", other),
        }

        assert!(matches!(
            serde_json::from_str::<WsMessage>(r#"{"type":"ping"}"#).unwrap(),
            WsMessage::Ping
        ));
    }

    #[test]
    fn hub_routes_to_registered_users() {
        let hub = Hub::new();
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        hub.register(1, tx1.clone());
        hub.register(2, tx2);

        hub.send_to_users(&[1], &WsMessage::Pong);
        assert!(matches!(rx1.try_recv(), Ok(WsMessage::Pong)));
        assert!(rx2.try_recv().is_err());

        hub.unregister(1, &tx1);
        assert!(!hub.is_online(1));
        assert!(hub.is_online(2));
    }

    #[test]
    fn closed_receivers_are_pruned() {
        let hub = Hub::new();
        let (tx, rx) = mpsc::unbounded_channel();
        hub.register(7, tx);
        drop(rx);
        hub.send_to_users(&[7], &WsMessage::Pong);
        assert!(!hub.is_online(7));
    }
}
