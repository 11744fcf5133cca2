//! End-to-end tests for the HTTP layer against a scripted local server.

use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use encephalic_client::{
    fetch_with_retry, fetch_with_retry_using, ClientError, ProbeConfig, ReadinessProbe,
    ReadinessState, RetryPolicy, ServiceClient,
};

struct CannedResponse {
    status: u16,
    content_type: &'static str,
    body: Vec<u8>,
}

impl CannedResponse {
    fn json(body: &str) -> Self {
        Self {
            status: 200,
            content_type: "application/json",
            body: body.as_bytes().to_vec(),
        }
    }

    fn status(status: u16) -> Self {
        Self {
            status,
            content_type: "application/json",
            body: b"{}".to_vec(),
        }
    }

    fn png(body: &[u8]) -> Self {
        Self {
            status: 200,
            content_type: "image/png",
            body: body.to_vec(),
        }
    }
}

struct MockServer {
    base_url: String,
    request_lines: Arc<Mutex<Vec<String>>>,
    handle: Option<JoinHandle<()>>,
}

impl MockServer {
    /// Serve the scripted responses in order, one connection each, then stop.
    fn spawn(responses: Vec<CannedResponse>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind mock server");
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let request_lines = Arc::new(Mutex::new(Vec::new()));
        let seen = request_lines.clone();
        let handle = std::thread::spawn(move || {
            for response in responses {
                let Ok((mut stream, _)) = listener.accept() else {
                    return;
                };
                let mut buf = Vec::new();
                let mut chunk = [0u8; 1024];
                while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                    match stream.read(&mut chunk) {
                        Ok(0) | Err(_) => break,
                        Ok(n) => buf.extend_from_slice(&chunk[..n]),
                    }
                }
                let head = String::from_utf8_lossy(&buf);
                if let Some(line) = head.lines().next() {
                    seen.lock().unwrap().push(line.to_string());
                }
                let reason = match response.status {
                    200 => "OK",
                    503 => "Service Unavailable",
                    _ => "Error",
                };
                let header = format!(
                    "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    response.status,
                    reason,
                    response.content_type,
                    response.body.len()
                );
                let _ = stream.write_all(header.as_bytes());
                let _ = stream.write_all(&response.body);
            }
        });
        Self {
            base_url,
            request_lines,
            handle: Some(handle),
        }
    }

    fn requests(&self) -> Vec<String> {
        self.request_lines.lock().unwrap().clone()
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

const INFO_JSON: &str = r#"{
    "n_channels": 2,
    "channel_names": ["Fp1", "Fp2"],
    "sampling_freq": 250.0,
    "duration": 60.0,
    "n_samples": 15000
}"#;

#[test]
fn session_info_round_trip() {
    let server = MockServer::spawn(vec![CannedResponse::json(INFO_JSON)]);
    let client = ServiceClient::new(&server.base_url).unwrap();

    let info = client.session_info().unwrap();
    assert_eq!(info.n_channels, 2);
    assert_eq!(info.channel_names, vec!["Fp1", "Fp2"]);
    assert_eq!(info.duration, 60.0);

    let requests = server.requests();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].starts_with("GET /api/eeg-info"));
}

#[test]
fn samples_window_goes_out_as_query_params() {
    let server = MockServer::spawn(vec![CannedResponse::json(
        r#"{"labels": ["Fp1"], "data": [[0.1, 0.2]], "times": [2.5, 2.51], "sfreq": 100.0}"#,
    )]);
    let client = ServiceClient::new(&server.base_url).unwrap();

    let window = client.samples(2.5, 7.5).unwrap();
    assert_eq!(window.n_channels(), 1);
    assert_eq!(window.n_samples(), 2);

    let line = &server.requests()[0];
    assert!(line.contains("/api/eeg-data?"));
    assert!(line.contains("tmin=2.5"));
    assert!(line.contains("tmax=7.5"));
}

#[test]
fn topomap_time_is_a_path_segment_and_bytes_come_back_opaque() {
    let blob = [0x89u8, b'P', b'N', b'G', 0, 1, 2, 3];
    let server = MockServer::spawn(vec![CannedResponse::png(&blob)]);
    let client = ServiceClient::new(&server.base_url).unwrap();

    let bytes = client.topomap(3.5).unwrap();
    assert_eq!(bytes, blob);
    assert!(server.requests()[0].starts_with("GET /api/eeg-topomap/3.5"));
}

#[test]
fn status_503_maps_to_not_ready() {
    let server = MockServer::spawn(vec![CannedResponse::status(503)]);
    let client = ServiceClient::new(&server.base_url).unwrap();
    assert!(client.band_powers().unwrap_err().is_not_ready());
}

#[test]
fn other_non_2xx_maps_to_transport_with_the_status() {
    let server = MockServer::spawn(vec![CannedResponse::status(500)]);
    let client = ServiceClient::new(&server.base_url).unwrap();
    match client.power_spectrum().unwrap_err() {
        ClientError::Transport { status, .. } => assert_eq!(status, Some(500)),
        other => panic!("expected transport error, got {other:?}"),
    }
}

#[test]
fn malformed_payload_maps_to_decode() {
    let server = MockServer::spawn(vec![CannedResponse::json(r#"{"n_channels": "two"}"#)]);
    let client = ServiceClient::new(&server.base_url).unwrap();
    assert!(matches!(
        client.session_info().unwrap_err(),
        ClientError::Decode(_)
    ));
}

#[test]
fn retry_absorbs_warmup_and_eventually_succeeds() {
    let server = MockServer::spawn(vec![
        CannedResponse::status(503),
        CannedResponse::status(503),
        CannedResponse::json(r#"{"delta": 1.0, "theta": 2.0, "alpha": 3.0, "beta": 4.0, "gamma": 5.0}"#),
    ]);
    let client = ServiceClient::new(&server.base_url).unwrap();
    let policy = RetryPolicy {
        max_retries: 3,
        initial_delay: Duration::from_millis(1),
    };

    let bands = fetch_with_retry(&policy, || client.band_powers()).unwrap();
    assert_eq!(bands.alpha, 3.0);
    assert_eq!(server.requests().len(), 3);
}

#[test]
fn retry_budget_is_respected_when_the_service_never_comes_up() {
    let policy = RetryPolicy {
        max_retries: 3,
        initial_delay: Duration::from_millis(1),
    };
    let server = MockServer::spawn(vec![
        CannedResponse::status(503),
        CannedResponse::status(503),
        CannedResponse::status(503),
        CannedResponse::status(503),
    ]);
    let client = ServiceClient::new(&server.base_url).unwrap();

    let mut sleeps = Vec::new();
    let err =
        fetch_with_retry_using(&policy, || client.session_info(), |d| sleeps.push(d)).unwrap_err();
    assert!(err.is_not_ready());
    // max_retries + 1 attempts, exponentially spaced
    assert_eq!(server.requests().len(), 4);
    assert_eq!(
        sleeps,
        vec![
            Duration::from_millis(1),
            Duration::from_millis(2),
            Duration::from_millis(4),
        ]
    );
}

#[test]
fn readiness_probe_reaches_healthy_after_a_cold_start() {
    let server = MockServer::spawn(vec![
        CannedResponse::json(r#"{"status": "initializing"}"#),
        CannedResponse::json(r#"{"status": "initializing"}"#),
        CannedResponse::json(r#"{"status": "healthy", "dataLoaded": true}"#),
    ]);
    let client = Arc::new(ServiceClient::new(&server.base_url).unwrap());
    let config = ProbeConfig {
        poll_interval: Duration::from_millis(1),
        error_interval: Duration::from_millis(1),
        max_failures: 5,
    };

    let probe = ReadinessProbe::spawn(client, config);
    let mut state = None;
    for _ in 0..200 {
        state = probe.try_state();
        if state.is_some() {
            break;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(state, Some(ReadinessState::Healthy));
    assert_eq!(server.requests().len(), 3);
}
