//! Transactional email
//!
//! Handlers enqueue mail on a bounded channel; a background task drains it
//! through a [`Mailer`] transport.

pub mod compose;

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::config::MailConfig;

/// One outgoing message
#[derive(Debug, Clone, PartialEq)]
pub struct Mail {
    pub to: String,
    pub subject: String,
    pub html_body: String,
}

impl Mail {
    pub fn new(to: impl Into<String>, subject: impl Into<String>, html_body: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            subject: subject.into(),
            html_body: html_body.into(),
        }
    }
}

/// Mail transport
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, mail: &Mail) -> anyhow::Result<()>;
}

/// Transport that writes every mail to the structured log
pub struct LogMailer {
    from: String,
}

impl LogMailer {
    pub fn new(from: impl Into<String>) -> Self {
        Self { from: from.into() }
    }
}

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, mail: &Mail) -> anyhow::Result<()> {
        tracing::info!(
            from = %self.from,
            to = %mail.to,
            subject = %mail.subject,
            bytes = mail.html_body.len(),
            "mail delivered"
        );
        tracing::debug!(to = %mail.to, body = %mail.html_body, "mail body");
        Ok(())
    }
}

/// Handle used by request handlers to queue mail
#[derive(Clone)]
pub struct MailService {
    tx: Option<mpsc::Sender<Mail>>,
}

impl MailService {
    /// Spawn the delivery task and return a handle to it
    pub fn start(mailer: Arc<dyn Mailer>, capacity: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<Mail>(capacity.max(1));

        tokio::spawn(async move {
            while let Some(mail) = rx.recv().await {
                if let Err(e) = mailer.send(&mail).await {
                    tracing::error!("Failed to send mail to {}: {}", mail.to, e);
                }
            }
        });

        Self { tx: Some(tx) }
    }

    /// Build the service described by the config
    pub fn from_config(config: &MailConfig) -> Self {
        if !config.enabled {
            tracing::info!("Mail disabled, outgoing mail will be dropped");
            return Self::disabled();
        }
        Self::start(Arc::new(LogMailer::new(&config.from)), config.queue_size)
    }

    /// A service that silently drops everything
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// Service whose queue is handed back to the caller instead of a transport
    #[cfg(test)]
    pub fn capture(capacity: usize) -> (Self, mpsc::Receiver<Mail>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx: Some(tx) }, rx)
    }

    /// Queue a mail without waiting for delivery
    pub fn send(&self, mail: Mail) {
        let Some(tx) = &self.tx else {
            return;
        };
        if let Err(e) = tx.try_send(mail) {
            match e {
                mpsc::error::TrySendError::Full(mail) => {
                    tracing::warn!("Mail queue is full, dropped mail to {}", mail.to);
                }
                mpsc::error::TrySendError::Closed(mail) => {
                    tracing::warn!("Mail service stopped, dropped mail to {}", mail.to);
                }
            }
        }
    }

    pub fn send_to(&self, to: &str, subject: &str, html_body: String) {
        self.send(Mail::new(to, subject, html_body));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Recorder(Arc<Mutex<Vec<Mail>>>);

    #[async_trait]
    impl Mailer for Recorder {
        async fn send(&self, mail: &Mail) -> anyhow::Result<()> {
            self.0.lock().unwrap().push(mail.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn background_task_delivers() {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let service = MailService::start(Arc::new(Recorder(sent.clone())), 4);
        service.send_to("a@school.test", "Hello", "<p>hi</p>".to_string());

        for _ in 0..50 {
            if !sent.lock().unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        let sent = sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].subject, "Hello");
    }

    #[tokio::test]
    async fn full_queue_drops_mail() {
        let (service, mut rx) = MailService::capture(1);
        service.send_to("a@school.test", "first", String::new());
        service.send_to("b@school.test", "second", String::new());

        assert_eq!(rx.recv().await.unwrap().subject, "first");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn disabled_service_is_silent() {
        MailService::disabled().send_to("a@school.test", "x", String::new());
    }

    #[tokio::test]
    async fn log_mailer_accepts_mail() {
        LogMailer::new("noreply@school.test")
            .send(&Mail::new("a@school.test", "s", "b"))
            .await
            .unwrap();
    }
}
