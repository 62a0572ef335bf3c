//! Shared fixtures for handler tests

use sea_orm::{ActiveModelTrait, Set};
use tokio::sync::mpsc;

use crate::config::Config;
use crate::db::memory_database;
use crate::entity::user;
use crate::mail::{Mail, MailService};
use crate::middleware::CurrentUser;
use crate::permission::PermissionEnforcer;
use crate::state::AppState;

pub const PASSWORD: &str = "password123";

/// Fresh state over an in-memory database with the built-in roles
pub async fn test_state() -> (AppState, mpsc::Receiver<Mail>) {
    let db = memory_database().await;
    let perm = PermissionEnforcer::new(db.clone()).await.unwrap();
    perm.ensure_default_roles().await.unwrap();

    let (mail, rx) = MailService::capture(256);
    let config = Config {
        upload_dir: std::env::temp_dir().join(format!("schoolhub-{}", uuid::Uuid::new_v4())),
        ..Default::default()
    };
    (AppState::new(db, perm, config, mail), rx)
}

/// Insert a user holding the given roles
pub async fn create_user(state: &AppState, username: &str, name: &str, roles: &[&str]) -> CurrentUser {
    let code = uuid::Uuid::new_v4().simple().to_string()[..12].to_string();
    let model = user::ActiveModel {
        username: Set(username.to_string()),
        password: Set(bcrypt::hash(PASSWORD, 4).unwrap()),
        name: Set(name.to_string()),
        email: Set(username.to_string()),
        code: Set(code),
        gender: Set("F".to_string()),
        created_at: Set(0),
        last_login: Set(0),
        ..Default::default()
    }
    .insert(&state.db)
    .await
    .unwrap();

    for role in roles {
        state.perm.add_user_role(username, role).await.unwrap();
    }
    CurrentUser::load(&state.perm, model).await.unwrap()
}

/// Everything queued so far
pub fn drain(rx: &mut mpsc::Receiver<Mail>) -> Vec<Mail> {
    let mut mails = Vec::new();
    while let Ok(mail) = rx.try_recv() {
        mails.push(mail);
    }
    mails
}
