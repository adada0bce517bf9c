//! HTTP binding tests against a local mock server.

use std::sync::Arc;

use httpmock::prelude::*;
use serde_json::json;

use mediagen::credentials::StaticCredential;
use mediagen::models::job::{GenerationParams, JobKind};
use mediagen::models::report::{ArtifactRef, SubmitOutcome};
use mediagen::services::client::{ApiError, GenerationApi, GenerationClient};

fn client(server: &MockServer) -> GenerationClient {
    GenerationClient::new(
        server.base_url(),
        Arc::new(StaticCredential::new("tok-123")),
    )
}

#[tokio::test]
async fn test_submit_video_returns_job_id() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/generate/video")
                .header("authorization", "Bearer tok-123")
                .json_body_partial(r#"{"prompt": "a red balloon rising"}"#);
            then.status(200).json_body(json!({"id": "job1"}));
        })
        .await;

    let outcome = client(&server)
        .submit(
            JobKind::Video,
            "a red balloon rising",
            &GenerationParams::default(),
        )
        .await
        .expect("submit");

    assert_eq!(
        outcome,
        SubmitOutcome::Job {
            id: "job1".to_string()
        }
    );
    mock.assert_async().await;
}

#[tokio::test]
async fn test_submit_image_synchronous_url() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/generate/image");
            then.status(200)
                .json_body(json!({"data": [{"url": "https://x/img.png"}]}));
        })
        .await;

    let outcome = client(&server)
        .submit(JobKind::Image, "a calm lake", &GenerationParams::default())
        .await
        .expect("submit");

    assert_eq!(
        outcome,
        SubmitOutcome::Inline {
            artifact: ArtifactRef::Media("https://x/img.png".to_string())
        }
    );
}

#[tokio::test]
async fn test_submit_image_synchronous_b64() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/generate/image");
            then.status(200).json_body(json!({"data": [{"b64": "Zm9v"}]}));
        })
        .await;

    let outcome = client(&server)
        .submit(JobKind::Image, "a calm lake", &GenerationParams::default())
        .await
        .expect("submit");

    assert_eq!(
        outcome,
        SubmitOutcome::Inline {
            artifact: ArtifactRef::Inline("Zm9v".to_string())
        }
    );
}

#[tokio::test]
async fn test_submit_params_serialized_flat() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/generate/image")
                .json_body_partial(r#"{"size": "1024x1024", "quality": "high"}"#);
            then.status(200).json_body(json!({"id": "job9"}));
        })
        .await;

    let params = GenerationParams {
        size: Some("1024x1024".to_string()),
        quality: Some("high".to_string()),
        duration_secs: None,
    };
    client(&server)
        .submit(JobKind::Image, "p", &params)
        .await
        .expect("submit");
    mock.assert_async().await;
}

#[tokio::test]
async fn test_submit_empty_response_is_decode_error() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/generate/image");
            then.status(200).json_body(json!({}));
        })
        .await;

    let err = client(&server)
        .submit(JobKind::Image, "p", &GenerationParams::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Decode(_)));
}

#[tokio::test]
async fn test_poll_running_report() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/generate/video/job1")
                .header("authorization", "Bearer tok-123");
            then.status(200).json_body(json!({"status": "running"}));
        })
        .await;

    let report = client(&server)
        .query_status(JobKind::Video, "job1")
        .await
        .expect("poll");
    assert_eq!(report.status, "running");
    assert!(report.media_url.is_none());
    assert!(report.failure_reason.is_none());
}

#[tokio::test]
async fn test_poll_succeeded_with_video_url() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/generate/video/job1");
            then.status(200).json_body(json!({
                "status": "succeeded",
                "generations": [{"video": "https://x/y.mp4"}]
            }));
        })
        .await;

    let report = client(&server)
        .query_status(JobKind::Video, "job1")
        .await
        .expect("poll");
    assert_eq!(report.status, "succeeded");
    assert_eq!(report.media_url.as_deref(), Some("https://x/y.mp4"));
    assert_eq!(
        report.primary_artifact(),
        Some(ArtifactRef::Media("https://x/y.mp4".to_string()))
    );
}

#[tokio::test]
async fn test_poll_succeeded_with_content_url() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/generate/video/job1");
            then.status(200).json_body(json!({
                "status": "succeeded",
                "generations": [{"contentUrl": "/files/out.mp4"}]
            }));
        })
        .await;

    let report = client(&server)
        .query_status(JobKind::Video, "job1")
        .await
        .expect("poll");
    assert_eq!(report.content_url.as_deref(), Some("/files/out.mp4"));
    assert_eq!(
        report.primary_artifact(),
        Some(ArtifactRef::Content("/files/out.mp4".to_string()))
    );
}

#[tokio::test]
async fn test_poll_failed_with_reason() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/generate/video/job1");
            then.status(200).json_body(json!({
                "status": "failed",
                "failure_reason": "content policy violation"
            }));
        })
        .await;

    let report = client(&server)
        .query_status(JobKind::Video, "job1")
        .await
        .expect("poll");
    assert_eq!(report.status, "failed");
    assert_eq!(
        report.failure_reason.as_deref(),
        Some("content policy violation")
    );
}

#[tokio::test]
async fn test_rate_limit_classified() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/generate/video/job1");
            then.status(429).body("slow down");
        })
        .await;

    let err = client(&server)
        .query_status(JobKind::Video, "job1")
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::RateLimited));
}

#[tokio::test]
async fn test_auth_errors_classified() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/generate/video/job1");
            then.status(403).body("forbidden");
        })
        .await;

    let err = client(&server)
        .query_status(JobKind::Video, "job1")
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Unauthorized { status: 403 }));
}

#[tokio::test]
async fn test_server_error_classified() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/generate/video");
            then.status(503).body("maintenance");
        })
        .await;

    let err = client(&server)
        .submit(JobKind::Video, "p", &GenerationParams::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Service { status: 503 }));
}

#[tokio::test]
async fn test_client_error_carries_body_detail() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/generate/video");
            then.status(422).body("prompt too long");
        })
        .await;

    let err = client(&server)
        .submit(JobKind::Video, "p", &GenerationParams::default())
        .await
        .unwrap_err();
    match err {
        ApiError::Rejected { status, detail } => {
            assert_eq!(status, 422);
            assert_eq!(detail, "prompt too long");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}
