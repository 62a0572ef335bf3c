//! Outgoing mail test endpoint

use axum::{extract::State, response::Json, Extension};
use serde::Deserialize;

use crate::error::{AppError, AppResult};
use crate::mail::compose::escape_html;
use crate::middleware::auth::CurrentUser;
use crate::permission::perm;
use crate::routes::ApiResponse;
use crate::state::AppState;

pub const NO_RECIPIENTS: &str = "Recipient list cannot be empty.";

#[derive(Debug, Deserialize)]
pub struct SendTestRequest {
    #[serde(default)]
    pub recipients: Vec<String>,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub body: String,
}

/// Queue one mail per recipient and return how many were queued
pub fn queue_test_mail(state: &AppState, user: &CurrentUser, req: &SendTestRequest) -> AppResult<usize> {
    user.require(perm::MAIL)?;

    let recipients: Vec<&str> = req
        .recipients
        .iter()
        .map(|r| r.trim())
        .filter(|r| !r.is_empty())
        .collect();
    if recipients.is_empty() {
        return Err(AppError::invalid(NO_RECIPIENTS));
    }

    let body = format!("<p>{}</p>", escape_html(&req.body));
    for to in &recipients {
        state.mail.send_to(to, &req.subject, body.clone());
    }
    tracing::info!("{} queued a test mail for {} recipients", user.username, recipients.len());
    Ok(recipients.len())
}

/// POST /api/email/send-test
pub async fn send_test(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Json(req): Json<SendTestRequest>,
) -> AppResult<Json<ApiResponse<usize>>> {
    let queued = queue_test_mail(&state, &current_user, &req)?;
    Ok(Json(ApiResponse::success_with("Email sent successfully", queued)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permission::role;
    use crate::testutil::{create_user, drain, test_state};
    use tokio_test::{assert_err, assert_ok};

    fn request(recipients: &[&str]) -> SendTestRequest {
        SendTestRequest {
            recipients: recipients.iter().map(|r| r.to_string()).collect(),
            subject: "Hello".to_string(),
            body: "a < b".to_string(),
        }
    }

    #[tokio::test]
    async fn admin_queues_one_mail_per_recipient() {
        let (state, mut rx) = test_state().await;
        let admin = create_user(&state, "a@school.test", "Ada", &[role::ADMIN]).await;

        let queued = assert_ok!(queue_test_mail(&state, &admin, &request(&[" x@school.test ", "", "y@school.test"])));
        assert_eq!(queued, 2);

        let mails = drain(&mut rx);
        assert_eq!(mails.len(), 2);
        assert_eq!(mails[0].to, "x@school.test");
        assert_eq!(mails[1].subject, "Hello");
        assert!(mails[0].html_body.contains("a &lt; b"));
    }

    #[tokio::test]
    async fn rejects_empty_list_and_missing_capability() {
        let (state, _rx) = test_state().await;
        let admin = create_user(&state, "a@school.test", "Ada", &[role::ADMIN]).await;
        let tutor = create_user(&state, "t@school.test", "Tina", &[role::TUTOR]).await;

        match assert_err!(queue_test_mail(&state, &admin, &request(&["  "]))) {
            AppError::Validation(msgs) => assert_eq!(msgs, vec![NO_RECIPIENTS.to_string()]),
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(
            queue_test_mail(&state, &tutor, &request(&["x@school.test"])),
            Err(AppError::Forbidden)
        ));
    }
}
