//! Transfer engine tests against mock HTTP source and destination.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use wiremock::matchers::{header, method, path};
use wiremock::{Match, Mock, MockServer, Request, ResponseTemplate};

use vgen_storage::{MediaTransfer, SpacesClient, SpacesConfig, TransferEngine, TransferSource};

const MIB: usize = 1024 * 1024;

/// Matches requests whose raw query string contains a fragment.
struct QueryContains(&'static str);

impl Match for QueryContains {
    fn matches(&self, request: &Request) -> bool {
        request.url.query().unwrap_or("").contains(self.0)
    }
}

fn spaces_client(endpoint: &str) -> SpacesClient {
    SpacesClient::new(SpacesConfig {
        access_key_id: "test-key".into(),
        secret_access_key: "test-secret".into(),
        bucket: "vidgen-videos".into(),
        region: "nyc3".into(),
        endpoint_url: Some(endpoint.to_string()),
    })
}

fn collecting_progress() -> (Arc<Mutex<Vec<f64>>>, impl FnMut(f64) + Send) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    (seen, move |fraction: f64| {
        sink.lock().unwrap().push(fraction)
    })
}

fn assert_monotonic(fractions: &[f64]) {
    assert!(
        fractions.windows(2).all(|w| w[0] < w[1]),
        "progress not strictly increasing: {:?}",
        fractions
    );
    assert!(fractions.iter().all(|f| (0.0..=1.0).contains(f)));
}

#[tokio::test]
async fn small_remote_payload_uses_single_put() {
    let destination = MockServer::start().await;
    let source = MockServer::start().await;

    let body = vec![b'a'; 1000];
    Mock::given(method("GET"))
        .and(path("/clip.mp4"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
        .mount(&source)
        .await;

    Mock::given(method("PUT"))
        .and(path("/vidgen-videos/videos/clip_b1_0.mp4"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&destination)
        .await;

    let engine = TransferEngine::new(spaces_client(&destination.uri()))
        .with_base_delay(Duration::from_millis(1));

    let (seen, mut on_progress) = collecting_progress();
    let url = engine
        .transfer(
            &TransferSource::RemoteUrl(format!("{}/clip.mp4", source.uri())),
            "videos/clip_b1_0.mp4",
            "video/mp4",
            &mut on_progress,
        )
        .await
        .expect("transfer should succeed");

    assert_eq!(
        url,
        "https://vidgen-videos.nyc3.digitaloceanspaces.com/videos/clip_b1_0.mp4"
    );

    let fractions = seen.lock().unwrap().clone();
    assert_monotonic(&fractions);
    assert_eq!(*fractions.last().unwrap(), 1.0);
}

#[tokio::test]
async fn large_stream_resumes_after_mid_transfer_failure() {
    let destination = MockServer::start().await;
    let source = MockServer::start().await;

    // 10 MiB payload: two 5 MiB multipart parts.
    let payload = vec![b'v'; 10 * MIB];

    // Ranged request made by the resumed attempt; must be served before
    // the unranged mock to take precedence.
    Mock::given(method("GET"))
        .and(path("/big.mp4"))
        .and(header("range", "bytes=5242880-"))
        .respond_with(ResponseTemplate::new(206).set_body_bytes(payload[5 * MIB..].to_vec()))
        .expect(1)
        .mount(&source)
        .await;

    Mock::given(method("GET"))
        .and(path("/big.mp4"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(payload.clone()))
        .mount(&source)
        .await;

    Mock::given(method("POST"))
        .and(path("/vidgen-videos/videos/big.mp4"))
        .and(QueryContains("uploads"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<InitiateMultipartUploadResult>
  <Bucket>vidgen-videos</Bucket>
  <Key>videos/big.mp4</Key>
  <UploadId>upload-1</UploadId>
</InitiateMultipartUploadResult>"#,
        ))
        .expect(1)
        .mount(&destination)
        .await;

    Mock::given(method("PUT"))
        .and(path("/vidgen-videos/videos/big.mp4"))
        .and(QueryContains("partNumber=1"))
        .respond_with(ResponseTemplate::new(200).insert_header("ETag", "\"etag-1\""))
        .expect(1)
        .mount(&destination)
        .await;

    // Part 2 fails once with a transient error, then succeeds on the
    // resumed attempt.
    Mock::given(method("PUT"))
        .and(path("/vidgen-videos/videos/big.mp4"))
        .and(QueryContains("partNumber=2"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .mount(&destination)
        .await;

    Mock::given(method("PUT"))
        .and(path("/vidgen-videos/videos/big.mp4"))
        .and(QueryContains("partNumber=2"))
        .respond_with(ResponseTemplate::new(200).insert_header("ETag", "\"etag-2\""))
        .expect(1)
        .mount(&destination)
        .await;

    Mock::given(method("POST"))
        .and(path("/vidgen-videos/videos/big.mp4"))
        .and(QueryContains("uploadId=upload-1"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<CompleteMultipartUploadResult>
  <Location>https://vidgen-videos.nyc3.digitaloceanspaces.com/videos/big.mp4</Location>
  <Bucket>vidgen-videos</Bucket>
  <Key>videos/big.mp4</Key>
  <ETag>"etag-final"</ETag>
</CompleteMultipartUploadResult>"#,
        ))
        .expect(1)
        .mount(&destination)
        .await;

    let engine = TransferEngine::new(spaces_client(&destination.uri()))
        .with_base_delay(Duration::from_millis(1));

    let (seen, mut on_progress) = collecting_progress();
    let url = engine
        .transfer(
            &TransferSource::RemoteUrl(format!("{}/big.mp4", source.uri())),
            "videos/big.mp4",
            "video/mp4",
            &mut on_progress,
        )
        .await
        .expect("transfer should resume and succeed");

    assert!(url.ends_with("/videos/big.mp4"));

    let fractions = seen.lock().unwrap().clone();
    assert_monotonic(&fractions);
    assert_eq!(*fractions.last().unwrap(), 1.0);

    // expect(1) on the ranged source mock verifies exactly one retry
    // attempt was consumed (checked on MockServer drop).
}

#[tokio::test]
async fn exhausted_retries_surface_the_last_cause() {
    let destination = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/vidgen-videos/videos/doomed.mp4"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&destination)
        .await;

    let engine = TransferEngine::new(spaces_client(&destination.uri()))
        .with_base_delay(Duration::from_millis(1));

    let (_, mut on_progress) = collecting_progress();
    let err = engine
        .transfer(
            &TransferSource::Bytes(vec![b'x'; 100]),
            "videos/doomed.mp4",
            "video/mp4",
            &mut on_progress,
        )
        .await
        .expect_err("transfer should fail after exhausting retries");

    assert_eq!(err.attempts, 3);
    assert!(!err.cause.to_string().is_empty());
}

#[tokio::test]
async fn bytes_source_uploads_and_reports_completion() {
    let destination = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/vidgen-videos/videos/inline.mp4"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&destination)
        .await;

    let engine = TransferEngine::new(spaces_client(&destination.uri()));

    let (seen, mut on_progress) = collecting_progress();
    let url = engine
        .transfer(
            &TransferSource::Bytes(b"tiny clip".to_vec()),
            "videos/inline.mp4",
            "video/mp4",
            &mut on_progress,
        )
        .await
        .expect("transfer should succeed");

    assert!(url.ends_with("/videos/inline.mp4"));
    assert_eq!(seen.lock().unwrap().clone(), vec![1.0]);
}
