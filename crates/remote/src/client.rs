//! HTTP client for the field survey backend.
//!
//! Records are upserted with `PUT {base}/api/v1/records/{doc_id}` and photos
//! with `PUT {base}/api/v1/attachments/{file_ref}`. Every failure is folded
//! into a [`GatewayResponse`] so the sync engine can classify it.

use async_trait::async_trait;
use log::debug;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::time::Duration;

use fieldsync_core::sync::{GatewayResponse, RemoteGateway};

use crate::error::{RemoteError, Result};

/// Default timeout for API requests.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
const MAX_LOG_BODY_CHARS: usize = 512;

/// Error body the backend returns on failures.
#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    code: String,
    message: String,
}

/// Encodes each path segment, keeping the `/` separators.
fn encode_path(path: &str) -> String {
    path.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

#[derive(Debug, Clone)]
pub struct HttpRemoteGateway {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpRemoteGateway {
    /// Create a gateway for `base_url` (e.g. `https://survey.example.org`).
    pub fn new(base_url: &str, timeout: Duration, token: Option<String>) -> Result<Self> {
        if base_url.trim().is_empty() {
            return Err(RemoteError::invalid_request("Remote base URL is empty"));
        }
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim().trim_end_matches('/').to_string(),
            token: token.filter(|token| !token.trim().is_empty()),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn log_response(status: reqwest::StatusCode, body: &str) {
        if status.is_success() {
            debug!("[Remote] Response status: {}", status);
            return;
        }

        let mut preview = body.chars().take(MAX_LOG_BODY_CHARS).collect::<String>();
        if body.chars().count() > MAX_LOG_BODY_CHARS {
            preview.push_str("...");
        }
        debug!("[Remote] Response error ({}): {}", status, preview);
    }

    fn headers(&self, content_type: &'static str) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));

        if let Some(token) = &self.token {
            let auth_value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|_| RemoteError::auth("Invalid access token format"))?;
            headers.insert(AUTHORIZATION, auth_value);
        }
        Ok(headers)
    }

    /// Turns a response into `Ok(status)` or an [`RemoteError::Api`].
    async fn check_response(response: reqwest::Response) -> Result<u16> {
        let status = response.status();
        let body = response.text().await?;
        Self::log_response(status, &body);

        if status.is_success() {
            return Ok(status.as_u16());
        }
        if let Ok(error) = serde_json::from_str::<ApiErrorResponse>(&body) {
            return Err(RemoteError::api(
                status.as_u16(),
                format!("{}: {}", error.code, error.message),
            ));
        }
        let message = if body.trim().is_empty() {
            status
                .canonical_reason()
                .unwrap_or("Request failed")
                .to_string()
        } else {
            format!("Request failed: {}", body)
        };
        Err(RemoteError::api(status.as_u16(), message))
    }

    /// PUT /api/v1/records/{doc_id}
    pub async fn put_record(&self, doc_id: &str, fields: &Map<String, Value>) -> Result<u16> {
        if doc_id.trim().is_empty() {
            return Err(RemoteError::invalid_request("Document id is empty"));
        }
        let url = format!(
            "{}/api/v1/records/{}",
            self.base_url,
            urlencoding::encode(doc_id)
        );
        debug!("[Remote] Upserting record {}", doc_id);

        let response = self
            .client
            .put(&url)
            .headers(self.headers("application/json")?)
            .json(fields)
            .send()
            .await?;
        Self::check_response(response).await
    }

    /// PUT /api/v1/attachments/{file_ref}
    pub async fn put_attachment(&self, file_ref: &str, bytes: Vec<u8>) -> Result<u16> {
        if file_ref.trim().is_empty() {
            return Err(RemoteError::invalid_request("Attachment reference is empty"));
        }
        let url = format!(
            "{}/api/v1/attachments/{}",
            self.base_url,
            encode_path(file_ref)
        );
        debug!("[Remote] Uploading {} ({} bytes)", file_ref, bytes.len());

        let response = self
            .client
            .put(&url)
            .headers(self.headers("application/octet-stream")?)
            .body(bytes)
            .send()
            .await?;
        Self::check_response(response).await
    }
}

#[async_trait]
impl RemoteGateway for HttpRemoteGateway {
    async fn upsert_record(&self, doc_id: &str, fields: &Map<String, Value>) -> GatewayResponse {
        match self.put_record(doc_id, fields).await {
            Ok(status) => GatewayResponse::ok(status),
            Err(err) => err.into_gateway_response(),
        }
    }

    async fn upload_attachment(&self, file_ref: &str, bytes: Vec<u8>) -> GatewayResponse {
        match self.put_attachment(file_ref, bytes).await {
            Ok(status) => GatewayResponse::ok(status),
            Err(err) => err.into_gateway_response(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldsync_core::sync::SyncRetryClass;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::Mutex as TokioMutex;

    #[derive(Debug, Clone)]
    struct CapturedRequest {
        request_line: String,
        headers: HashMap<String, String>,
        body: Vec<u8>,
    }

    #[derive(Debug, Clone)]
    enum MockOutcome {
        DropConnection,
        Respond {
            status: u16,
            body: String,
            delay_ms: u64,
        },
    }

    fn respond(status: u16, body: &str) -> MockOutcome {
        MockOutcome::Respond {
            status,
            body: body.to_string(),
            delay_ms: 0,
        }
    }

    fn header_end_offset(buffer: &[u8]) -> Option<usize> {
        buffer.windows(4).position(|window| window == b"\r\n\r\n")
    }

    async fn read_http_request(stream: &mut tokio::net::TcpStream) -> Option<CapturedRequest> {
        let mut buffer = Vec::new();
        loop {
            let mut chunk = [0_u8; 2048];
            let read = stream.read(&mut chunk).await.ok()?;
            if read == 0 {
                return None;
            }
            buffer.extend_from_slice(&chunk[..read]);
            if header_end_offset(&buffer).is_some() {
                break;
            }
        }

        let header_end = header_end_offset(&buffer)?;
        let head = String::from_utf8_lossy(&buffer[..header_end]).to_string();
        let mut lines = head.lines();
        let request_line = lines.next()?.to_string();

        let mut headers = HashMap::new();
        for line in lines {
            if let Some((name, value)) = line.split_once(':') {
                headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
            }
        }

        let content_length = headers
            .get("content-length")
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(0);

        let mut body = buffer[header_end + 4..].to_vec();
        while body.len() < content_length {
            let mut chunk = [0_u8; 2048];
            let read = stream.read(&mut chunk).await.ok()?;
            if read == 0 {
                break;
            }
            body.extend_from_slice(&chunk[..read]);
        }

        Some(CapturedRequest {
            request_line,
            headers,
            body,
        })
    }

    fn status_text(status: u16) -> &'static str {
        match status {
            200 => "OK",
            201 => "Created",
            400 => "Bad Request",
            401 => "Unauthorized",
            500 => "Internal Server Error",
            503 => "Service Unavailable",
            _ => "Error",
        }
    }

    async fn write_http_response(
        stream: &mut tokio::net::TcpStream,
        status: u16,
        body: &str,
    ) -> std::io::Result<()> {
        let response = format!(
            "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            status_text(status),
            body.len(),
            body
        );
        stream.write_all(response.as_bytes()).await?;
        stream.flush().await
    }

    async fn start_mock_server(
        outcomes: Vec<MockOutcome>,
    ) -> (
        String,
        Arc<TokioMutex<Vec<CapturedRequest>>>,
        tokio::task::JoinHandle<()>,
    ) {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test listener");
        let addr = listener.local_addr().expect("listener addr");
        let captured = Arc::new(TokioMutex::new(Vec::<CapturedRequest>::new()));
        let scripted = Arc::new(TokioMutex::new(VecDeque::from(outcomes)));
        let captured_clone = Arc::clone(&captured);
        let scripted_clone = Arc::clone(&scripted);

        let handle = tokio::spawn(async move {
            loop {
                let (mut stream, _) = match listener.accept().await {
                    Ok(value) => value,
                    Err(_) => break,
                };
                let captured_inner = Arc::clone(&captured_clone);
                let scripted_inner = Arc::clone(&scripted_clone);
                tokio::spawn(async move {
                    let Some(request) = read_http_request(&mut stream).await else {
                        return;
                    };
                    captured_inner.lock().await.push(request);

                    let outcome = scripted_inner
                        .lock()
                        .await
                        .pop_front()
                        .unwrap_or_else(|| respond(500, r#"{"code":"INTERNAL","message":"unexpected request"}"#));

                    match outcome {
                        MockOutcome::DropConnection => {}
                        MockOutcome::Respond {
                            status,
                            body,
                            delay_ms,
                        } => {
                            if delay_ms > 0 {
                                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                            }
                            let _ = write_http_response(&mut stream, status, &body).await;
                        }
                    }
                });
            }
        });

        (format!("http://{}", addr), captured, handle)
    }

    fn gateway(base_url: &str, token: Option<&str>) -> HttpRemoteGateway {
        HttpRemoteGateway::new(base_url, Duration::from_secs(5), token.map(str::to_string))
            .expect("gateway")
    }

    #[tokio::test]
    async fn upsert_puts_json_with_bearer_token() {
        let (base_url, captured, server) = start_mock_server(vec![respond(200, "{}")]).await;
        let gateway = gateway(&format!("{}/", base_url), Some("secret"));

        let mut fields = Map::new();
        fields.insert("consumerNumber".to_string(), Value::from("C 1"));
        let response = gateway.upsert_record("C 1", &fields).await;
        assert!(response.success);
        assert_eq!(response.status, 200);

        let requests = captured.lock().await;
        assert_eq!(requests[0].request_line, "PUT /api/v1/records/C%201 HTTP/1.1");
        assert_eq!(
            requests[0].headers.get("authorization").map(String::as_str),
            Some("Bearer secret")
        );
        let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(body["consumerNumber"], "C 1");
        server.abort();
    }

    #[tokio::test]
    async fn attachment_upload_sends_raw_bytes() {
        let (base_url, captured, server) = start_mock_server(vec![respond(201, "")]).await;
        let gateway = gateway(&base_url, None);

        let response = gateway
            .upload_attachment("C-7/pole_photo.jpg", vec![1, 2, 3])
            .await;
        assert!(response.success);
        assert_eq!(response.status, 201);

        let requests = captured.lock().await;
        assert_eq!(
            requests[0].request_line,
            "PUT /api/v1/attachments/C-7/pole_photo.jpg HTTP/1.1"
        );
        assert_eq!(
            requests[0].headers.get("content-type").map(String::as_str),
            Some("application/octet-stream")
        );
        assert!(requests[0].headers.get("authorization").is_none());
        assert_eq!(requests[0].body, vec![1, 2, 3]);
        server.abort();
    }

    #[tokio::test]
    async fn api_errors_keep_status_and_message() {
        let (base_url, _captured, server) = start_mock_server(vec![
            respond(400, r#"{"code":"INVALID","message":"consumerNumber unknown"}"#),
            respond(503, "down for maintenance"),
            respond(401, ""),
        ])
        .await;
        let gateway = gateway(&base_url, None);

        let rejected = gateway.upsert_record("C-1", &Map::new()).await;
        assert!(!rejected.success);
        assert_eq!(rejected.status, 400);
        assert_eq!(
            rejected.message.as_deref(),
            Some("INVALID: consumerNumber unknown")
        );
        assert_eq!(rejected.retry_class(), SyncRetryClass::Permanent);

        let unavailable = gateway.upsert_record("C-1", &Map::new()).await;
        assert_eq!(unavailable.retry_class(), SyncRetryClass::Retryable);

        let unauthorized = gateway.upsert_record("C-1", &Map::new()).await;
        assert_eq!(unauthorized.retry_class(), SyncRetryClass::ReauthRequired);
        server.abort();
    }

    #[tokio::test]
    async fn dropped_connection_is_transport_failure() {
        let (base_url, _captured, server) =
            start_mock_server(vec![MockOutcome::DropConnection]).await;
        let gateway = gateway(&base_url, None);

        let response = gateway.upsert_record("C-1", &Map::new()).await;
        assert!(!response.success);
        assert_eq!(response.status, 0);
        assert_eq!(response.retry_class(), SyncRetryClass::Retryable);
        server.abort();
    }

    #[tokio::test]
    async fn slow_server_times_out() {
        let (base_url, _captured, server) = start_mock_server(vec![MockOutcome::Respond {
            status: 200,
            body: "{}".to_string(),
            delay_ms: 1_000,
        }])
        .await;
        let gateway =
            HttpRemoteGateway::new(&base_url, Duration::from_millis(100), None).expect("gateway");

        let response = gateway.upsert_record("C-1", &Map::new()).await;
        assert_eq!(response.status, 0);
        assert_eq!(response.message.as_deref(), Some("Request timed out"));
        server.abort();
    }

    #[test]
    fn empty_base_url_is_rejected() {
        assert!(HttpRemoteGateway::new("  ", Duration::from_secs(1), None).is_err());
    }

    #[tokio::test]
    async fn empty_doc_id_is_permanent_without_request() {
        let (base_url, captured, server) = start_mock_server(vec![]).await;
        let gateway = gateway(&base_url, None);

        let response = gateway.upsert_record(" ", &Map::new()).await;
        assert_eq!(response.retry_class(), SyncRetryClass::Permanent);
        assert!(captured.lock().await.is_empty());
        server.abort();
    }
}
