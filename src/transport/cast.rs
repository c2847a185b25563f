//! Cast publishing through the Neynar API.

use serde::Serialize;
use serde_json::{Value, json};

use super::REQUEST_TIMEOUT;
use crate::errors::TransportError;
use crate::templates::{CastPayload, MAX_CAST_CHARS};

const DEFAULT_API_BASE: &str = "https://api.neynar.com";

/// Client for publishing and deleting casts.
#[derive(Debug, Clone)]
pub struct CastClient {
    http: reqwest::Client,
    api_key: String,
    signer_uuid: String,
    api_base: String,
    dry_run: bool,
}

/// Outcome of a [`CastClient::post`] call.
#[derive(Debug, Clone, Serialize)]
pub struct CastReceipt {
    /// True when the cast was echoed instead of sent.
    pub dry_run: bool,
    /// Hash of the published cast; absent in dry-run mode.
    pub hash: Option<String>,
    /// Public URL of the published cast; absent in dry-run mode.
    pub url: Option<String>,
    /// Raw transport response, or the request echo in dry-run mode.
    pub raw: Value,
}

/// Outcome of a [`CastClient::delete_cast`] call.
#[derive(Debug, Clone)]
pub struct DeleteReceipt {
    /// Whether the cast was deleted.
    pub success: bool,
    /// Failure detail when `success` is false, or the dry-run note.
    pub message: Option<String>,
}

impl CastClient {
    /// New client. Credentials are validated on use, not construction, so a
    /// dry-run client never needs real ones.
    pub fn new(api_key: impl Into<String>, signer_uuid: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: api_key.into(),
            signer_uuid: signer_uuid.into(),
            api_base: DEFAULT_API_BASE.to_owned(),
            dry_run: false,
        }
    }

    /// Read `NEYNAR_API_KEY` and `NEYNAR_SIGNER_UUID` from the environment.
    pub fn from_env() -> Self {
        Self::new(
            std::env::var("NEYNAR_API_KEY").unwrap_or_default(),
            std::env::var("NEYNAR_SIGNER_UUID").unwrap_or_default(),
        )
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

    fn check_credentials(&self) -> Result<(), TransportError> {
        if self.api_key.is_empty() {
            return Err(TransportError::MissingCredentials("api key"));
        }
        if self.signer_uuid.is_empty() {
            return Err(TransportError::MissingCredentials("signer uuid"));
        }
        Ok(())
    }

    fn validate(payload: &CastPayload) -> Result<(), TransportError> {
        if payload.text.trim().is_empty() {
            return Err(TransportError::EmptyField { field: "cast text" });
        }
        let len = payload.text.chars().count();
        if len > MAX_CAST_CHARS {
            return Err(TransportError::Oversized {
                len,
                max: MAX_CAST_CHARS,
            });
        }
        Ok(())
    }

    fn request_body(&self, payload: &CastPayload) -> Value {
        let mut body = json!({
            "signer_uuid": self.signer_uuid,
            "text": payload.text,
        });
        if let Some(url) = &payload.embed_url {
            body["embeds"] = json!([{ "url": url }]);
        }
        if let Some(channel) = &payload.channel_id {
            body["channel_id"] = json!(channel);
        }
        body
    }

    /// Publish `payload`, or echo it in dry-run mode.
    ///
    /// Oversized or empty texts are rejected before anything leaves the
    /// process, in either mode.
    pub async fn post(&self, payload: &CastPayload) -> Result<CastReceipt, TransportError> {
        Self::validate(payload)?;

        if self.dry_run {
            return Ok(CastReceipt {
                dry_run: true,
                hash: None,
                url: None,
                raw: json!({
                    "dry_run": true,
                    "request": self.request_body(payload),
                }),
            });
        }

        self.check_credentials()?;

        let response = self
            .http
            .post(format!("{}/v2/farcaster/cast", self.api_base))
            .header("x-api-key", &self.api_key)
            .json(&self.request_body(payload))
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(TransportError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let raw: Value = serde_json::from_str(&body).unwrap_or(Value::Null);
        let hash = raw["cast"]["hash"].as_str().map(str::to_owned);
        let url = hash
            .as_deref()
            .map(|hash| format!("https://warpcast.com/~/conversations/{hash}"));

        Ok(CastReceipt {
            dry_run: false,
            hash,
            url,
            raw,
        })
    }

    /// Delete a previously published cast by hash.
    ///
    /// A non-success API answer is reported in the receipt, not raised.
    pub async fn delete_cast(&self, target_hash: &str) -> Result<DeleteReceipt, TransportError> {
        if self.dry_run {
            return Ok(DeleteReceipt {
                success: true,
                message: Some(format!("dry run: would delete {target_hash}")),
            });
        }

        self.check_credentials()?;

        let response = self
            .http
            .delete(format!("{}/v2/farcaster/cast", self.api_base))
            .header("x-api-key", &self.api_key)
            .json(&json!({
                "signer_uuid": self.signer_uuid,
                "target_hash": target_hash,
            }))
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if status.is_success() {
            Ok(DeleteReceipt {
                success: true,
                message: None,
            })
        } else {
            Ok(DeleteReceipt {
                success: false,
                message: Some(body),
            })
        }
    }
}
