// tests/remote_job_client.rs
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use mockito::{Matcher, Server, ServerGuard};
use omniprobe::config::OmniParserConfig;
use omniprobe::remote::types::{ImageRef, TransportError};
use omniprobe::{DetectionElement, JobFailure, PollOutcome, RemoteJobClient};
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

const CALL_PATH: &str = "/gradio_api/call/process";
const RESULT_PATH: &str = "/gradio_api/call/process/abc";

fn config_for(server: &ServerGuard, max_attempts: u32) -> OmniParserConfig {
    OmniParserConfig {
        base_url: server.url(),
        max_attempts,
        poll_delay_ms: 10,
        fetch_timeout_ms: 2000,
        submit_timeout_ms: 2000,
        ..OmniParserConfig::default()
    }
}

fn complete_body(elements: &str) -> String {
    let payload = json!([{"path": "/tmp/gradio/marked.png", "url": null}, elements]);
    format!("event: complete\ndata: {payload}\n\n")
}

async fn mock_submit(server: &mut ServerGuard) -> mockito::Mock {
    server
        .mock("POST", CALL_PATH)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"event_id": "abc"}"#)
        .expect(1)
        .create_async()
        .await
}

#[tokio::test]
async fn test_job_round_trip_over_http() {
    let mut server = Server::new_async().await;
    let submit = server
        .mock("POST", CALL_PATH)
        .match_body(Matcher::Json(json!({
            "data": [{"url": "data:image/png;base64,iVBORw0KGgo="}, 0.05, 0.1, true, 640]
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"event_id": "abc"}"#)
        .expect(1)
        .create_async()
        .await;
    let fetch = server
        .mock("GET", RESULT_PATH)
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body(complete_body(
            r#"[{"type":"icon","bbox":[1,2,3,4],"content":"Settings","confidence":0.91}]"#,
        ))
        .expect(1)
        .create_async()
        .await;

    let client = RemoteJobClient::new(&config_for(&server, 5)).unwrap();
    let request = client.request_for(ImageRef::new("data:image/png;base64,iVBORw0KGgo="));
    let outcome = client.run_job(&request).await;

    let expected = DetectionElement {
        element_type: "icon".to_string(),
        bbox: [1.0, 2.0, 3.0, 4.0],
        content: "Settings".to_string(),
        confidence: 0.91,
        interactivity: false,
        source: String::new(),
    };
    assert_eq!(outcome.elements(), Some(&[expected][..]));
    submit.assert_async().await;
    fetch.assert_async().await;
}

#[tokio::test]
async fn test_literal_element_list_over_http() {
    let mut server = Server::new_async().await;
    let submit = mock_submit(&mut server).await;
    let fetch = server
        .mock("GET", RESULT_PATH)
        .with_status(200)
        .with_body(complete_body(
            "[{'type': 'text', 'bbox': [0.1, 0.2, 0.3, 0.4], 'content': '지구본', \
             'interactivity': False, 'source': 'box_ocr_content_ocr'}]",
        ))
        .expect(1)
        .create_async()
        .await;

    let client = RemoteJobClient::new(&config_for(&server, 5)).unwrap();
    let request = client.request_for(ImageRef::new("http://example.invalid/a.png"));
    let outcome = client.run_job_filtered(&request, "지구본").await;

    let elements = outcome.elements().expect("expected success");
    assert_eq!(elements.len(), 1);
    assert_eq!(elements[0].source, "box_ocr_content_ocr");
    assert_eq!(elements[0].confidence, 0.0);
    submit.assert_async().await;
    fetch.assert_async().await;
}

#[tokio::test]
async fn test_pending_until_attempts_exhausted() {
    let mut server = Server::new_async().await;
    let submit = mock_submit(&mut server).await;
    let fetch = server
        .mock("GET", RESULT_PATH)
        .with_status(200)
        .with_body("event: generating\ndata: null\n\n")
        .expect(3)
        .create_async()
        .await;

    let client = RemoteJobClient::new(&config_for(&server, 3)).unwrap();
    let request = client.request_for(ImageRef::new("http://example.invalid/a.png"));
    let outcome = client.run_job(&request).await;

    assert!(
        matches!(outcome, PollOutcome::TimedOut { attempts: 3, last_error: None }),
        "{outcome:?}"
    );
    submit.assert_async().await;
    fetch.assert_async().await;
}

#[tokio::test]
async fn test_fetch_errors_fold_into_timeout() {
    let mut server = Server::new_async().await;
    let submit = mock_submit(&mut server).await;
    let fetch = server
        .mock("GET", RESULT_PATH)
        .with_status(503)
        .with_body("busy")
        .expect(2)
        .create_async()
        .await;

    let client = RemoteJobClient::new(&config_for(&server, 2)).unwrap();
    let request = client.request_for(ImageRef::new("http://example.invalid/a.png"));

    match client.run_job(&request).await {
        PollOutcome::TimedOut { attempts, last_error } => {
            assert_eq!(attempts, 2);
            assert!(last_error.unwrap().contains("503"));
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    submit.assert_async().await;
    fetch.assert_async().await;
}

#[tokio::test]
async fn test_malformed_payload_stops_polling() {
    let mut server = Server::new_async().await;
    let submit = mock_submit(&mut server).await;
    let fetch = server
        .mock("GET", RESULT_PATH)
        .with_status(200)
        .with_body("event: complete\ndata: [\"img\",\n\n")
        .expect(1)
        .create_async()
        .await;

    let client = RemoteJobClient::new(&config_for(&server, 10)).unwrap();
    let request = client.request_for(ImageRef::new("http://example.invalid/a.png"));

    match client.run_job(&request).await {
        PollOutcome::Failed(JobFailure::Decode(failure)) => {
            assert_eq!(failure.snippet, "[\"img\",");
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    submit.assert_async().await;
    fetch.assert_async().await;
}

#[tokio::test]
async fn test_submission_rejected() {
    let mut server = Server::new_async().await;
    let submit = server
        .mock("POST", CALL_PATH)
        .with_status(500)
        .with_body("internal error")
        .expect(1)
        .create_async()
        .await;
    let fetch = server
        .mock("GET", Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let client = RemoteJobClient::new(&config_for(&server, 5)).unwrap();
    let request = client.request_for(ImageRef::new("http://example.invalid/a.png"));

    match client.run_job(&request).await {
        PollOutcome::Failed(JobFailure::Transport(TransportError::Status { status, body })) => {
            assert_eq!(status, 500);
            assert_eq!(body, "internal error");
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    submit.assert_async().await;
    fetch.assert_async().await;
}

#[tokio::test]
async fn test_submission_without_event_id() {
    let mut server = Server::new_async().await;
    let submit = server
        .mock("POST", CALL_PATH)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"detail": "queued"}"#)
        .expect(1)
        .create_async()
        .await;

    let client = RemoteJobClient::new(&config_for(&server, 5)).unwrap();
    let request = client.request_for(ImageRef::new("http://example.invalid/a.png"));

    let outcome = client.run_job(&request).await;
    assert!(matches!(outcome, PollOutcome::Failed(JobFailure::Protocol(_))), "{outcome:?}");
    submit.assert_async().await;
}

#[tokio::test]
async fn test_unreachable_service_is_transport_failure() {
    let cfg = OmniParserConfig {
        base_url: "http://127.0.0.1:9".to_string(),
        submit_timeout_ms: 500,
        ..OmniParserConfig::default()
    };
    let client = RemoteJobClient::new(&cfg).unwrap();
    let request = client.request_for(ImageRef::new("http://example.invalid/a.png"));

    let outcome = client.run_job(&request).await;
    assert!(
        matches!(outcome, PollOutcome::Failed(JobFailure::Transport(TransportError::Request(_)))),
        "{outcome:?}"
    );
}

/// Read one HTTP/1.1 request (headers plus a `content-length` body) and return
/// its request line.
async fn read_request(socket: &mut TcpStream) -> Option<String> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let header_end = loop {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let content_length = head
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);
    while buf.len() < header_end + content_length {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    head.lines().next().map(str::to_string)
}

/// Server that accepts every submission but never answers a poll.
/// Returns its base URL and a counter of poll requests received.
async fn spawn_stalling_server() -> (String, Arc<AtomicU32>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());
    let fetches = Arc::new(AtomicU32::new(0));

    let counter = fetches.clone();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let counter = counter.clone();
            tokio::spawn(async move {
                let Some(request_line) = read_request(&mut socket).await else {
                    return;
                };
                if request_line.starts_with("POST") {
                    let body = r#"{"event_id": "abc"}"#;
                    let reply = format!(
                        "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\n\
                         content-length: {}\r\nconnection: close\r\n\r\n{body}",
                        body.len()
                    );
                    let _ = socket.write_all(reply.as_bytes()).await;
                } else {
                    counter.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_secs(60)).await;
                }
            });
        }
    });

    (base_url, fetches)
}

#[tokio::test]
async fn test_fetch_timeouts_are_retried_then_fold_into_timeout() {
    let (base_url, fetches) = spawn_stalling_server().await;
    let cfg = OmniParserConfig {
        base_url,
        max_attempts: 3,
        poll_delay_ms: 10,
        fetch_timeout_ms: 200,
        submit_timeout_ms: 2000,
        ..OmniParserConfig::default()
    };
    let client = RemoteJobClient::new(&cfg).unwrap();
    let request = client.request_for(ImageRef::new("http://example.invalid/a.png"));

    let started = Instant::now();
    match client.run_job(&request).await {
        PollOutcome::TimedOut { attempts, last_error } => {
            assert_eq!(attempts, 3);
            let last_error = last_error.expect("timeout should be recorded");
            assert!(last_error.contains("200 ms"), "{last_error}");
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(fetches.load(Ordering::SeqCst), 3);
    assert!(started.elapsed() < Duration::from_secs(10));
}
