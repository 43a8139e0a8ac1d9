//! HTTP tests for the Nessus client
//! Runs the workflow against a minimal in-process Nessus stand-in

use nessie_export::{
    run_export_workflow, Credentials, ExportError, ExportFormat, ExportJob, NessusClient, Poller,
    ScanId, ScanService, ServiceConfig, TemplateId,
};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

const TOKEN: &str = "f3c5b1d2";
const PASSWORD: &str = "secret";
const CSV: &str = "Plugin ID,Risk\n19506,None\n";

struct FakeNessus {
    scan_statuses: Mutex<VecDeque<&'static str>>,
    export_statuses: Mutex<VecDeque<&'static str>>,
    requests: Mutex<Vec<String>>,
    download_delay: Duration,
}

impl FakeNessus {
    fn new(scan_statuses: &[&'static str], export_statuses: &[&'static str]) -> Arc<Self> {
        Self::with_download_delay(scan_statuses, export_statuses, Duration::ZERO)
    }

    fn with_download_delay(
        scan_statuses: &[&'static str],
        export_statuses: &[&'static str],
        download_delay: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            scan_statuses: Mutex::new(scan_statuses.iter().copied().collect()),
            export_statuses: Mutex::new(export_statuses.iter().copied().collect()),
            requests: Mutex::new(Vec::new()),
            download_delay,
        })
    }

    fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    fn next(queue: &Mutex<VecDeque<&'static str>>) -> &'static str {
        let mut queue = queue.lock().unwrap();
        if queue.len() > 1 {
            queue.pop_front().unwrap()
        } else {
            queue.front().copied().unwrap_or("completed")
        }
    }

    fn respond(&self, method: &str, path: &str, authorized: bool, body: &str) -> (u16, String) {
        self.requests.lock().unwrap().push(format!("{} {}", method, path));

        match (method, path) {
            ("POST", "/session") => {
                if body.contains(&format!("\"password\":\"{}\"", PASSWORD)) {
                    (200, format!(r#"{{"token":"{}"}}"#, TOKEN))
                } else {
                    (401, r#"{"error":"Invalid Credentials"}"#.to_string())
                }
            }
            _ if !authorized => (401, r#"{"error":"Invalid Credentials"}"#.to_string()),
            ("DELETE", "/session") => (200, String::new()),
            ("POST", "/scans/13/launch") => (200, r#"{"scan_uuid":"run-2"}"#.to_string()),
            ("GET", "/scans/13") => {
                let status = Self::next(&self.scan_statuses);
                (
                    200,
                    format!(
                        r#"{{"info":{{"status":"{}","name":"nightly"}},"history":[{{"history_id":1,"uuid":"run-1","status":"completed"}},{{"history_id":2,"uuid":"run-2","status":"{}"}}]}}"#,
                        status, status
                    ),
                )
            }
            ("POST", "/scans/13/export") => (200, r#"{"file":55,"token":"dl"}"#.to_string()),
            ("GET", "/scans/13/export/55/status") => {
                let status = Self::next(&self.export_statuses);
                (200, format!(r#"{{"status":"{}"}}"#, status))
            }
            ("GET", "/scans/13/export/55/download") => (200, CSV.to_string()),
            _ => (404, r#"{"error":"The requested file was not found"}"#.to_string()),
        }
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|window| window == needle)
}

async fn handle(mut socket: TcpStream, fake: Arc<FakeNessus>) {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 4096];

    let header_end = loop {
        let n = match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => n,
        };
        buffer.extend_from_slice(&chunk[..n]);
        if let Some(pos) = find(&buffer, b"\r\n\r\n") {
            break pos;
        }
    };

    let head = String::from_utf8_lossy(&buffer[..header_end]).to_string();
    let content_length = head
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);

    while buffer.len() < header_end + 4 + content_length {
        match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => buffer.extend_from_slice(&chunk[..n]),
        }
    }
    let body = String::from_utf8_lossy(&buffer[header_end + 4..]).to_string();

    let mut request_line = head.lines().next().unwrap_or("").split_whitespace();
    let method = request_line.next().unwrap_or("").to_string();
    let path = request_line.next().unwrap_or("").to_string();
    let authorized = head.lines().any(|line| {
        line.split_once(':').map_or(false, |(name, value)| {
            name.trim().eq_ignore_ascii_case("x-cookie") && value.trim() == format!("token={}", TOKEN)
        })
    });

    let (code, payload) = fake.respond(&method, &path, authorized, &body);
    if path.ends_with("/download") {
        tokio::time::sleep(fake.download_delay).await;
    }
    let reason = match code {
        200 => "OK",
        401 => "Unauthorized",
        _ => "Not Found",
    };
    let response = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        code,
        reason,
        payload.len(),
        payload
    );
    let _ = socket.write_all(response.as_bytes()).await;
    let _ = socket.shutdown().await;
}

async fn start(fake: Arc<FakeNessus>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            tokio::spawn(handle(socket, Arc::clone(&fake)));
        }
    });

    format!("http://{}", address)
}

fn client(url: &str) -> Arc<dyn ScanService> {
    client_with_timeout(url, 5)
}

fn client_with_timeout(url: &str, seconds: u64) -> Arc<dyn ScanService> {
    let config = ServiceConfig::new(url).with_request_timeout(seconds);
    Arc::new(NessusClient::new(&config).unwrap())
}

fn poller() -> Poller {
    Poller::new(Duration::from_millis(10)).with_deadline(Duration::from_secs(10))
}

fn job(scan: i64) -> ExportJob {
    ExportJob::new(ScanId(scan), Some(TemplateId(1)), ExportFormat::Csv)
}

#[tokio::test]
async fn test_full_export_over_http() {
    let fake = FakeNessus::new(&["running", "running", "Completed"], &["loading", "ready"]);
    let url = start(Arc::clone(&fake)).await;

    let artifact = run_export_workflow(
        client(&url),
        &Credentials::new("admin", PASSWORD),
        &job(13),
        &poller(),
    )
    .await
    .unwrap();

    assert_eq!(&artifact.bytes[..], CSV.as_bytes());
    assert_eq!(artifact.export_id.0, 55);

    let requests = fake.requests();
    assert_eq!(requests.first().map(String::as_str), Some("POST /session"));
    assert_eq!(requests.last().map(String::as_str), Some("DELETE /session"));
    assert_eq!(requests.iter().filter(|r| *r == "GET /scans/13").count(), 3);
    assert_eq!(
        requests.iter().filter(|r| *r == "GET /scans/13/export/55/status").count(),
        2
    );
    assert_eq!(requests.iter().filter(|r| *r == "DELETE /session").count(), 1);
}

#[tokio::test]
async fn test_wrong_password_is_authentication_error() {
    let fake = FakeNessus::new(&["completed"], &["ready"]);
    let url = start(Arc::clone(&fake)).await;

    let result = run_export_workflow(
        client(&url),
        &Credentials::new("admin", "wrong"),
        &job(13),
        &poller(),
    )
    .await;

    match result {
        Err(ExportError::AuthenticationError(message)) => {
            assert!(message.contains("Invalid Credentials"), "{}", message)
        }
        other => panic!("expected authentication error, got {:?}", other.map(|a| a.len())),
    }
    assert_eq!(fake.requests(), vec!["POST /session".to_string()]);
}

#[tokio::test]
async fn test_unknown_scan_reports_http_status_and_logs_out() {
    let fake = FakeNessus::new(&["completed"], &["ready"]);
    let url = start(Arc::clone(&fake)).await;

    let result = run_export_workflow(
        client(&url),
        &Credentials::new("admin", PASSWORD),
        &job(99),
        &poller(),
    )
    .await;

    match result {
        Err(ExportError::RemoteError(message)) => {
            assert!(message.contains("404"), "{}", message);
            assert!(message.contains("not found"), "{}", message);
        }
        other => panic!("expected remote error, got {:?}", other.map(|a| a.len())),
    }
    assert_eq!(
        fake.requests(),
        vec![
            "POST /session".to_string(),
            "POST /scans/99/launch".to_string(),
            "DELETE /session".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_download_is_not_bound_by_request_timeout() {
    let fake = FakeNessus::with_download_delay(&["completed"], &["ready"], Duration::from_millis(1500));
    let url = start(Arc::clone(&fake)).await;

    let artifact = run_export_workflow(
        client_with_timeout(&url, 1),
        &Credentials::new("admin", PASSWORD),
        &job(13),
        &poller(),
    )
    .await
    .unwrap();

    assert_eq!(&artifact.bytes[..], CSV.as_bytes());
    assert_eq!(fake.requests().last().map(String::as_str), Some("DELETE /session"));
}

#[tokio::test]
async fn test_status_requests_keep_request_timeout() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    // Accepts connections and never answers
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });

    let service = client_with_timeout(&format!("http://{}", address), 1);
    let started = std::time::Instant::now();
    let result = service.authenticate(&Credentials::new("admin", PASSWORD)).await;

    assert!(matches!(result, Err(ExportError::AuthenticationError(_))));
    assert!(started.elapsed() < Duration::from_secs(5));
}
