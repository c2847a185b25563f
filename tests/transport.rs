#![allow(missing_docs)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::indexing_slicing)]

use claims::{assert_none, assert_some};
use gridcast::TransportError;
use gridcast::templates::CastPayload;
use gridcast::transport::{CastClient, NotificationClient, NotificationContent};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn payload(text: &str) -> CastPayload {
    CastPayload {
        text: text.to_owned(),
        embed_url: Some("https://gridcast.xyz/races/monaco-2026".to_owned()),
        channel_id: Some("racing".to_owned()),
    }
}

#[tokio::test]
async fn dry_run_echoes_the_request_without_network_io() {
    let client = CastClient::new("test-key", "signer-123").dry_run(true);

    let receipt = client.post(&payload("hello")).await.unwrap();
    assert!(receipt.dry_run);
    assert_none!(receipt.hash.as_deref());
    assert_none!(receipt.url.as_deref());

    insta::assert_compact_json_snapshot!(
        receipt.raw,
        @r#"
    {
      "dry_run": true,
      "request": {
        "channel_id": "racing",
        "embeds": [
          {
            "url": "https://gridcast.xyz/races/monaco-2026"
          }
        ],
        "signer_uuid": "signer-123",
        "text": "hello"
      }
    }
    "#
    );

    // Deterministic: a second call echoes the identical request.
    let again = client.post(&payload("hello")).await.unwrap();
    assert_eq!(receipt.raw, again.raw);
}

#[tokio::test]
async fn post_sends_the_cast_and_returns_the_hash() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v2/farcaster/cast"))
        .and(header("x-api-key", "test-key"))
        .and(body_partial_json(json!({
            "signer_uuid": "signer-123",
            "text": "hello",
            "channel_id": "racing",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "cast": {"hash": "0xabc123"},
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = CastClient::new("test-key", "signer-123").with_api_base(server.uri());
    let receipt = client.post(&payload("hello")).await.unwrap();

    assert!(!receipt.dry_run);
    assert_eq!(assert_some!(receipt.hash.as_deref()), "0xabc123");
    assert!(assert_some!(receipt.url.as_deref()).contains("0xabc123"));
}

#[tokio::test]
async fn api_failures_surface_with_their_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v2/farcaster/cast"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
        .mount(&server)
        .await;

    let client = CastClient::new("test-key", "signer-123").with_api_base(server.uri());
    let error = client.post(&payload("hello")).await.unwrap_err();

    match error {
        TransportError::Api { status, body } => {
            assert_eq!(status, 500);
            assert_eq!(body, "upstream exploded");
        }
        other => panic!("expected an API error, got: {other}"),
    }
}

#[tokio::test]
async fn oversized_text_is_rejected_before_anything_is_sent() {
    // No server is mounted: an attempted request would fail loudly.
    let client = CastClient::new("test-key", "signer-123");

    let error = client.post(&payload(&"x".repeat(321))).await.unwrap_err();
    match error {
        TransportError::Oversized { len, max } => {
            assert_eq!(len, 321);
            assert_eq!(max, 320);
        }
        other => panic!("expected an oversized error, got: {other}"),
    }
}

#[tokio::test]
async fn empty_text_is_rejected_in_dry_run_too() {
    let client = CastClient::new("test-key", "signer-123").dry_run(true);
    let error = client.post(&payload("   ")).await.unwrap_err();
    assert!(error.to_string().contains("must not be empty"));
}

#[tokio::test]
async fn missing_credentials_fail_live_sends_only() {
    let client = CastClient::new("", "");
    let error = client.post(&payload("hello")).await.unwrap_err();
    assert!(matches!(error, TransportError::MissingCredentials(_)));

    // Dry-run mode never needs credentials.
    let client = CastClient::new("", "").dry_run(true);
    let receipt = client.post(&payload("hello")).await.unwrap();
    assert!(receipt.dry_run);
}

#[tokio::test]
async fn delete_reports_api_refusals_in_the_receipt() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/v2/farcaster/cast"))
        .respond_with(ResponseTemplate::new(404).set_body_string("cast not found"))
        .mount(&server)
        .await;

    let client = CastClient::new("test-key", "signer-123").with_api_base(server.uri());
    let receipt = client.delete_cast("0xdead").await.unwrap();

    assert!(!receipt.success);
    assert_eq!(assert_some!(receipt.message.as_deref()), "cast not found");
}

#[tokio::test]
async fn notifications_post_targets_filters_and_campaign() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v2/farcaster/frame/notifications"))
        .and(header("x-api-key", "test-key"))
        .and(body_partial_json(json!({
            "target_fids": [101, 102],
            "notification": {
                "title": "Predictions lock soon",
                "body": "Monaco locks in one hour",
                "uuid": "lock-monaco-2026",
            },
            "filters": {"minimum_user_score": 0.5},
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
        .expect(1)
        .mount(&server)
        .await;

    let client = NotificationClient::new("test-key").with_api_base(server.uri());
    let content = NotificationContent {
        title: "Predictions lock soon".to_owned(),
        body: "Monaco locks in one hour".to_owned(),
        target_url: "https://gridcast.xyz/races/monaco-2026".to_owned(),
    };
    let filters = gridcast::transport::NotificationFilters {
        minimum_user_score: Some(0.5),
        ..Default::default()
    };

    let receipt = client
        .publish(
            &content,
            Some(&[101, 102]),
            Some(&filters),
            Some("lock-monaco-2026"),
        )
        .await
        .unwrap();

    assert!(!receipt.dry_run);
    assert_eq!(receipt.raw, json!({"success": true}));
}

#[tokio::test]
async fn notification_dry_run_echoes_and_validates() {
    let client = NotificationClient::new("test-key").dry_run(true);
    let content = NotificationContent {
        title: "Title".to_owned(),
        body: "Body".to_owned(),
        target_url: "https://gridcast.xyz".to_owned(),
    };

    let receipt = client.publish(&content, None, None, None).await.unwrap();
    assert!(receipt.dry_run);
    assert_eq!(receipt.raw["request"]["notification"]["title"], "Title");

    let empty = NotificationContent {
        title: String::new(),
        ..content
    };
    let error = client.publish(&empty, None, None, None).await.unwrap_err();
    assert!(error.to_string().contains("notification title"));
}
