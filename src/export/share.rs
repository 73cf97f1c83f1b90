//! Sharing a scan: platform share channel first, clipboard text as the fallback.

use std::sync::OnceLock;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Serialize, Serializer};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::scans::model::Scan;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShareMessage {
    pub title: String,
    pub text: String,
    pub url: String,
}

impl ShareMessage {
    pub fn for_scan(scan: &Scan, app_url: &str) -> Self {
        Self {
            title: "My Nutrition Analysis".into(),
            text: format!(
                "I analyzed my meal and found {} calories! Check out the detailed breakdown.",
                scan.nutrition_facts.summary().calories_kcal
            ),
            url: format!("{}/history/{}", app_url.trim_end_matches('/'), scan.id),
        }
    }

    pub fn clipboard_text(&self) -> String {
        format!("{}\n\n{}\n\n{}", self.title, self.text, self.url)
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ShareError {
    #[error("share channel unavailable")]
    Unavailable,
    #[error("share failed: {0}")]
    Failed(String),
}

#[async_trait]
pub trait ShareChannel: Send + Sync {
    async fn share(&self, message: &ShareMessage) -> Result<(), ShareError>;
}

pub trait Clipboard: Send + Sync {
    fn write_text(&self, text: &str) -> Result<(), ShareError>;
}

/// Posts the message to a configured webhook. Without one the channel is
/// unavailable and callers fall back to the clipboard.
pub struct WebhookShareChannel {
    http: Client,
    url: Option<String>,
}

impl WebhookShareChannel {
    pub fn new(http: Client, url: Option<String>) -> Self {
        Self { http, url }
    }
}

#[async_trait]
impl ShareChannel for WebhookShareChannel {
    async fn share(&self, message: &ShareMessage) -> Result<(), ShareError> {
        let Some(url) = &self.url else {
            return Err(ShareError::Unavailable);
        };
        let res = self
            .http
            .post(url)
            .json(message)
            .send()
            .await
            .map_err(|e| ShareError::Failed(e.to_string()))?;
        if !res.status().is_success() {
            return Err(ShareError::Failed(format!("webhook returned {}", res.status())));
        }
        Ok(())
    }
}

/// Clipboard for HTTP callers: the text is handed back in the response body.
#[derive(Default)]
pub struct ResponseClipboard {
    text: OnceLock<String>,
}

impl ResponseClipboard {
    pub fn into_text(self) -> Option<String> {
        self.text.into_inner()
    }
}

impl Clipboard for ResponseClipboard {
    fn write_text(&self, text: &str) -> Result<(), ShareError> {
        self.text
            .set(text.to_string())
            .map_err(|_| ShareError::Failed("clipboard already written".into()))
    }
}

/// Which path delivered the share. Serializes as `"shared"`, `"clipboard"` or `false`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShareOutcome {
    Shared,
    Clipboard,
    Failed,
}

impl Serialize for ShareOutcome {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        match self {
            ShareOutcome::Shared => s.serialize_str("shared"),
            ShareOutcome::Clipboard => s.serialize_str("clipboard"),
            ShareOutcome::Failed => s.serialize_bool(false),
        }
    }
}

pub async fn share_scan(
    channel: &dyn ShareChannel,
    clipboard: &dyn Clipboard,
    message: &ShareMessage,
    scan_id: Uuid,
) -> ShareOutcome {
    match channel.share(message).await {
        Ok(()) => {
            info!(%scan_id, "scan shared");
            ShareOutcome::Shared
        }
        Err(ShareError::Unavailable) => match clipboard.write_text(&message.clipboard_text()) {
            Ok(()) => ShareOutcome::Clipboard,
            Err(e) => {
                warn!(%scan_id, error = %e, "clipboard copy failed");
                ShareOutcome::Failed
            }
        },
        Err(e) => {
            warn!(%scan_id, error = %e, "share failed");
            ShareOutcome::Failed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scans::fixtures::scan;
    use serde_json::json;

    struct Channel(Result<(), ShareError>);

    #[async_trait]
    impl ShareChannel for Channel {
        async fn share(&self, _m: &ShareMessage) -> Result<(), ShareError> {
            match &self.0 {
                Ok(()) => Ok(()),
                Err(ShareError::Unavailable) => Err(ShareError::Unavailable),
                Err(ShareError::Failed(m)) => Err(ShareError::Failed(m.clone())),
            }
        }
    }

    struct BrokenClipboard;

    impl Clipboard for BrokenClipboard {
        fn write_text(&self, _t: &str) -> Result<(), ShareError> {
            Err(ShareError::Failed("denied".into()))
        }
    }

    fn message() -> ShareMessage {
        let s = scan(Uuid::new_v4(), &["Nasi"], 0);
        ShareMessage::for_scan(&s, "https://mbg.test/")
    }

    #[test]
    fn message_text() {
        let m = message();
        assert_eq!(m.title, "My Nutrition Analysis");
        assert!(m.text.starts_with("I analyzed my meal and found 100 calories!"));
        assert!(m.url.starts_with("https://mbg.test/history/"));
        assert_eq!(m.clipboard_text().matches("\n\n").count(), 2);
    }

    #[tokio::test]
    async fn channel_first() {
        let clip = ResponseClipboard::default();
        let out = share_scan(&Channel(Ok(())), &clip, &message(), Uuid::nil()).await;
        assert_eq!(out, ShareOutcome::Shared);
        assert!(clip.into_text().is_none());
    }

    #[tokio::test]
    async fn falls_back_to_clipboard_when_unavailable() {
        let clip = ResponseClipboard::default();
        let m = message();
        let out = share_scan(&Channel(Err(ShareError::Unavailable)), &clip, &m, Uuid::nil()).await;
        assert_eq!(out, ShareOutcome::Clipboard);
        assert_eq!(clip.into_text(), Some(m.clipboard_text()));
    }

    #[tokio::test]
    async fn failures_yield_false() {
        let clip = ResponseClipboard::default();
        let out = share_scan(
            &Channel(Err(ShareError::Failed("500".into()))),
            &clip,
            &message(),
            Uuid::nil(),
        )
        .await;
        assert_eq!(out, ShareOutcome::Failed);
        assert!(clip.into_text().is_none());

        let out = share_scan(
            &Channel(Err(ShareError::Unavailable)),
            &BrokenClipboard,
            &message(),
            Uuid::nil(),
        )
        .await;
        assert_eq!(serde_json::to_value(out).unwrap(), json!(false));
        assert_eq!(serde_json::to_value(ShareOutcome::Clipboard).unwrap(), json!("clipboard"));
    }

    #[tokio::test]
    async fn webhook_without_url_is_unavailable() {
        let channel = WebhookShareChannel::new(Client::new(), None);
        assert_eq!(channel.share(&message()).await, Err(ShareError::Unavailable));
    }
}
