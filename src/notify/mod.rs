//! 通知：预约 / 取消 / 改约成功后给患者发邮件（经外部投递服务）
//!
//! 投递是 fire-and-forget：在后台任务中执行，失败只记日志，不影响触发它的号源操作。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::store::{PatientDirectory, PatientId};

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("http: {0}")]
    Http(#[from] reqwest::Error),

    #[error("delivery rejected with status {0}")]
    Rejected(u16),
}

/// 一封待投递的通知
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// 通知投递端
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// 只写日志（默认，开发环境）
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        tracing::info!(to = %notification.to, subject = %notification.subject, "notification (log only)");
        Ok(())
    }
}

/// 以 JSON POST 到邮件中继服务：`{"to", "subject", "body"}`
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, timeout_secs: u64) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        let resp = self.client.post(&self.url).json(notification).send().await?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(NotifyError::Rejected(resp.status().as_u16()))
        }
    }
}

/// 通知分发：解析收件人后在后台投递
#[derive(Clone)]
pub struct NotificationDispatcher {
    notifier: Arc<dyn Notifier>,
    patients: PatientDirectory,
}

impl NotificationDispatcher {
    pub fn new(notifier: Arc<dyn Notifier>, patients: PatientDirectory) -> Self {
        Self { notifier, patients }
    }

    /// 后台投递；返回任务句柄（调用方通常直接丢弃，测试中可 await）
    pub fn dispatch(
        &self,
        patient: PatientId,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> tokio::task::JoinHandle<()> {
        let notifier = Arc::clone(&self.notifier);
        let patients = self.patients.clone();
        let (subject, body) = (subject.into(), body.into());
        tokio::spawn(async move {
            let to = match patients.email_of(patient).await {
                Ok(Some(email)) => email,
                Ok(None) => {
                    tracing::debug!(%patient, "no email on file, notification skipped");
                    return;
                }
                Err(e) => {
                    tracing::warn!(%patient, error = %e, "recipient lookup failed");
                    return;
                }
            };
            let notification = Notification { to, subject, body };
            if let Err(e) = notifier.send(&notification).await {
                tracing::warn!(%patient, error = %e, "notification delivery failed");
            }
        })
    }
}
