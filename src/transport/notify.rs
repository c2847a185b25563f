//! Mini-app push notifications through the Neynar API.

use serde::Serialize;
use serde_json::{Value, json};

use super::REQUEST_TIMEOUT;
use crate::errors::TransportError;

const DEFAULT_API_BASE: &str = "https://api.neynar.com";

/// Title, body and link of a push notification.
#[derive(Debug, Clone, Serialize)]
pub struct NotificationContent {
    /// Notification title; must not be empty.
    pub title: String,
    /// Notification body; must not be empty.
    pub body: String,
    /// Where tapping the notification takes the user.
    pub target_url: String,
}

/// Audience filters for a notification broadcast.
#[derive(Debug, Clone, Default, Serialize)]
pub struct NotificationFilters {
    /// Fids to exclude.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exclude_fids: Option<Vec<u64>>,
    /// Restrict to followers of this fid.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub following_fid: Option<u64>,
    /// Minimum user score required to receive the notification.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimum_user_score: Option<f64>,
}

/// Outcome of a [`NotificationClient::publish`] call.
#[derive(Debug, Clone)]
pub struct NotificationReceipt {
    /// True when the notification was echoed instead of sent.
    pub dry_run: bool,
    /// Raw transport response, or the request echo in dry-run mode.
    pub raw: Value,
}

/// Client for publishing push notifications to mini-app users.
#[derive(Debug, Clone)]
pub struct NotificationClient {
    http: reqwest::Client,
    api_key: String,
    api_base: String,
    dry_run: bool,
}

impl NotificationClient {
    /// New client; the credential is validated on use.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: api_key.into(),
            api_base: DEFAULT_API_BASE.to_owned(),
            dry_run: false,
        }
    }

    /// Read `NEYNAR_API_KEY` from the environment.
    pub fn from_env() -> Self {
        Self::new(std::env::var("NEYNAR_API_KEY").unwrap_or_default())
    }

    /// Point the client at a different API host.
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    /// Toggle dry-run mode: echo requests instead of sending them.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Publish a notification to all mini-app users, or to `target_fids` when
    /// given, narrowed by `filters`.
    ///
    /// `campaign_id` deduplicates a broadcast on the API side: reusing one
    /// never notifies the same user twice.
    pub async fn publish(
        &self,
        content: &NotificationContent,
        target_fids: Option<&[u64]>,
        filters: Option<&NotificationFilters>,
        campaign_id: Option<&str>,
    ) -> Result<NotificationReceipt, TransportError> {
        if content.title.trim().is_empty() {
            return Err(TransportError::EmptyField {
                field: "notification title",
            });
        }
        if content.body.trim().is_empty() {
            return Err(TransportError::EmptyField {
                field: "notification body",
            });
        }

        let mut notification = json!({
            "title": content.title,
            "body": content.body,
            "target_url": content.target_url,
        });
        if let Some(campaign_id) = campaign_id {
            notification["uuid"] = json!(campaign_id);
        }

        let mut body = json!({
            "target_fids": target_fids.unwrap_or(&[]),
            "notification": notification,
        });
        if let Some(filters) = filters {
            body["filters"] = serde_json::to_value(filters)?;
        }

        if self.dry_run {
            return Ok(NotificationReceipt {
                dry_run: true,
                raw: json!({
                    "dry_run": true,
                    "request": body,
                }),
            });
        }

        if self.api_key.is_empty() {
            return Err(TransportError::MissingCredentials("api key"));
        }

        let response = self
            .http
            .post(format!(
                "{}/v2/farcaster/frame/notifications",
                self.api_base
            ))
            .header("x-api-key", &self.api_key)
            .json(&body)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(TransportError::Api {
                status: status.as_u16(),
                body: text,
            });
        }

        let raw: Value = serde_json::from_str(&text).unwrap_or(Value::Null);
        Ok(NotificationReceipt {
            dry_run: false,
            raw,
        })
    }
}
