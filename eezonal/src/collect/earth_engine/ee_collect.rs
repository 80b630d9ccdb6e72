use log::{debug, info, warn};
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use url::Url;

use crate::collect::earth_engine::expression::Expression;
use crate::collect::global_variables::{
    DEFAULT_MAX_RETRIES, DEFAULT_TIMEOUT_SECS, EE_API_URL, EE_API_VERSION, EE_PUBLIC_PROJECT,
    ENV_ACCESS_TOKEN, ENV_API_URL, ENV_PROJECT, MAX_RETRY_DELAY_SECS, RETRY_BASE_DELAY_MS,
};
use crate::error::{Result, ZonalError};

/// Asset metadata returned by the backend
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetInfo {
    /// IMAGE, IMAGE_COLLECTION, TABLE, FOLDER, ...
    #[serde(rename = "type")]
    pub asset_type: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
}

impl AssetInfo {
    pub fn new(asset_type: &str) -> Self {
        AssetInfo {
            asset_type: asset_type.to_string(),
            name: String::new(),
            id: String::new(),
            start_time: None,
            end_time: None,
        }
    }
}

/// Remote processing backend.
///
/// `EarthEngineClient` talks to the REST API; tests substitute an in-memory
/// implementation.
pub trait Backend {
    /// Look up asset metadata. Unknown ids fail with [`ZonalError::AssetNotFound`].
    fn get_asset(&self, asset_id: &str) -> Result<AssetInfo>;

    /// Evaluate `expression` server-side and return its value.
    fn compute_value(&self, expression: &Expression) -> Result<Value>;
}

/// Configuration for [`EarthEngineClient`]
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// API root, without version (default https://earthengine.googleapis.com)
    pub base_url: String,
    /// Cloud project billed for compute requests
    pub project: String,
    /// OAuth2 bearer token
    pub access_token: Option<String>,
    /// Per-request timeout
    pub request_timeout: Duration,
    /// Maximum retries on transient failures
    pub max_retries: u32,
}

impl Default for ClientOptions {
    fn default() -> Self {
        ClientOptions {
            base_url: EE_API_URL.to_string(),
            project: String::new(),
            access_token: None,
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

impl ClientOptions {
    /// Read project, token and API root from the environment
    pub fn from_env() -> Self {
        let mut options = ClientOptions::default();
        if let Ok(project) = std::env::var(ENV_PROJECT) {
            options.project = project;
        }
        if let Ok(token) = std::env::var(ENV_ACCESS_TOKEN) {
            if !token.trim().is_empty() {
                options.access_token = Some(token.trim().to_string());
            }
        }
        if let Ok(url) = std::env::var(ENV_API_URL) {
            options.base_url = url;
        }
        options
    }

    pub fn set_project(&mut self, project: &str) {
        self.project = project.to_string();
    }

    pub fn set_access_token(&mut self, token: Option<String>) {
        self.access_token = token;
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.request_timeout = timeout;
    }

    pub fn set_max_retries(&mut self, max_retries: u32) {
        self.max_retries = max_retries;
    }
}

/// Blocking Earth Engine REST client
pub struct EarthEngineClient {
    client: Client,
    options: ClientOptions,
    api_root: Url,
}

impl EarthEngineClient {
    pub fn new(options: ClientOptions) -> Result<Self> {
        if options.project.trim().is_empty() {
            return Err(ZonalError::Config(format!(
                "a cloud project is required (set {} or pass one explicitly)",
                ENV_PROJECT
            )));
        }

        let api_root = api_root(&options.base_url)?;

        let client = Client::builder()
            .timeout(options.request_timeout)
            .build()
            .map_err(|e| ZonalError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(EarthEngineClient {
            client,
            options,
            api_root,
        })
    }

    /// Client configured from `EE_PROJECT`, `EE_ACCESS_TOKEN` and `EE_API_URL`
    pub fn from_env() -> Result<Self> {
        Self::new(ClientOptions::from_env())
    }

    pub fn get_options(&self) -> &ClientOptions {
        &self.options
    }

    fn asset_url(&self, asset_id: &str) -> Result<Url> {
        self.api_root
            .join(&asset_name(asset_id))
            .map_err(|e| ZonalError::InvalidArgument(format!("bad asset id {asset_id}: {e}")))
    }

    fn compute_url(&self) -> Result<Url> {
        let path = format!(
            "projects/{}/value:compute",
            urlencoding::encode(&self.options.project)
        );
        self.api_root
            .join(&path)
            .map_err(|e| ZonalError::Config(format!("bad project name: {e}")))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        let request = request.header("x-goog-user-project", &self.options.project);
        match &self.options.access_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Send with exponential backoff on connect errors, timeouts, 429 and 5xx.
    fn send_with_retry(&self, request: RequestBuilder) -> Result<Response> {
        let mut attempt = 0;

        loop {
            if attempt > 0 {
                let delay = retry_delay(attempt);
                debug!("Retrying in {:?} (attempt {})", delay, attempt + 1);
                std::thread::sleep(delay);
            }

            let cloned = request
                .try_clone()
                .ok_or_else(|| ZonalError::backend("request body cannot be retried"))?;

            let can_retry = attempt < self.options.max_retries;
            match cloned.send() {
                Ok(response) if can_retry && is_retryable_status(response.status()) => {
                    warn!("Backend returned {}, will retry", response.status());
                }
                Ok(response) => return Ok(response),
                Err(e) if can_retry && (e.is_timeout() || e.is_connect()) => {
                    warn!("Transient backend failure: {}", e);
                }
                Err(e) => return Err(e.into()),
            }

            attempt += 1;
        }
    }
}

impl Backend for EarthEngineClient {
    fn get_asset(&self, asset_id: &str) -> Result<AssetInfo> {
        let url = self.asset_url(asset_id)?;
        info!("Looking up asset {}", asset_id);
        debug!("GET {}", url);

        let response = self.send_with_retry(self.authorize(self.client.get(url)))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            let message = error_message(&body);
            if is_not_found(status, &message) {
                return Err(ZonalError::AssetNotFound {
                    asset_id: asset_id.to_string(),
                });
            }
            return Err(ZonalError::Backend {
                status: Some(status.as_u16()),
                message,
            });
        }

        let asset: AssetInfo = response.json()?;
        debug!("Asset {} has type {}", asset_id, asset.asset_type);
        Ok(asset)
    }

    fn compute_value(&self, expression: &Expression) -> Result<Value> {
        let url = self.compute_url()?;
        debug!(
            "POST {} ({} graph nodes)",
            url,
            expression.values.len()
        );

        let body = json!({ "expression": expression });
        let request = self.authorize(self.client.post(url).json(&body));
        let response = self.send_with_retry(request)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(ZonalError::Backend {
                status: Some(status.as_u16()),
                message: error_message(&body),
            });
        }

        let mut reply: Value = response.json()?;
        match reply.get_mut("result") {
            Some(result) => Ok(result.take()),
            None => Err(ZonalError::backend("reply has no `result` field")),
        }
    }
}

/// `<base>/<version>/` with a trailing slash so relative joins append
fn api_root(base_url: &str) -> Result<Url> {
    let root = format!("{}/{}/", base_url.trim_end_matches('/'), EE_API_VERSION);
    Url::parse(&root).map_err(|e| ZonalError::Config(format!("invalid API URL {base_url}: {e}")))
}

/// Full resource name of an asset. Bare ids live in the public catalog project.
pub fn asset_name(asset_id: &str) -> String {
    let asset_id = asset_id.trim().trim_matches('/');
    if asset_id.starts_with("projects/") {
        return asset_id.to_string();
    }
    let path = asset_id
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/");
    format!("projects/{}/assets/{}", EE_PUBLIC_PROJECT, path)
}

/// Delay before retry number `attempt` (1-based): doubling from the base, capped
fn retry_delay(attempt: u32) -> Duration {
    let factor = 1u64.checked_shl(attempt.saturating_sub(1)).unwrap_or(u64::MAX);
    Duration::from_millis(RETRY_BASE_DELAY_MS.saturating_mul(factor))
        .min(Duration::from_secs(MAX_RETRY_DELAY_SECS))
}

fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// The API answers 404, or 400/403 "not found or does not exist", for unknown assets
fn is_not_found(status: StatusCode, message: &str) -> bool {
    if status == StatusCode::NOT_FOUND {
        return true;
    }
    let message = message.to_lowercase();
    matches!(status, StatusCode::BAD_REQUEST | StatusCode::FORBIDDEN)
        && (message.contains("not found") || message.contains("does not exist"))
}

/// Extract `error.message` from a Google API error body, falling back to the raw body
fn error_message(body: &str) -> String {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: ErrorDetail,
    }
    #[derive(Deserialize)]
    struct ErrorDetail {
        message: String,
    }

    match serde_json::from_str::<ErrorBody>(body) {
        Ok(parsed) => parsed.error.message,
        Err(_) => body.trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collect::earth_engine::expression::{constant, ExpressionGraph};
    use std::io::{Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;

    /// Local HTTP server answering each connection with the next canned reply.
    /// Returns the base URL and a counter of accepted connections.
    fn serve(replies: Vec<(u16, &'static str)>) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);

        thread::spawn(move || {
            for (status, body) in replies {
                let mut stream = match listener.accept() {
                    Ok((stream, _)) => stream,
                    Err(_) => return,
                };
                counter.fetch_add(1, Ordering::SeqCst);
                read_request(&mut stream);
                let reason = StatusCode::from_u16(status)
                    .ok()
                    .and_then(|s| s.canonical_reason())
                    .unwrap_or("");
                let response = format!(
                    "HTTP/1.1 {status} {reason}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = stream.write_all(response.as_bytes());
                let _ = stream.flush();
            }
        });

        (base_url, hits)
    }

    /// Consume headers and body so the client sees a complete exchange
    fn read_request(stream: &mut TcpStream) {
        let mut buffer = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = stream.read(&mut chunk).unwrap_or(0);
            if n == 0 {
                return;
            }
            buffer.extend_from_slice(&chunk[..n]);
            let Some(end) = buffer.windows(4).position(|w| w == b"\r\n\r\n") else {
                continue;
            };
            let head = String::from_utf8_lossy(&buffer[..end]).to_lowercase();
            let length = head
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buffer.len() >= end + 4 + length {
                return;
            }
        }
    }

    fn local_client(base_url: &str, max_retries: u32) -> EarthEngineClient {
        let mut options = ClientOptions::default();
        options.base_url = base_url.to_string();
        options.set_project("test-project");
        options.set_access_token(Some("token".to_string()));
        options.set_timeout(Duration::from_secs(10));
        options.set_max_retries(max_retries);
        EarthEngineClient::new(options).unwrap()
    }

    fn one_node_expression() -> Expression {
        ExpressionGraph::new().finish(constant(1))
    }

    #[test]
    fn test_transient_status_is_retried() {
        let (base_url, hits) = serve(vec![
            (503, r#"{"error": {"code": 503, "message": "backend busy"}}"#),
            (200, r#"{"result": 42}"#),
        ]);
        let client = local_client(&base_url, 3);

        let value = client.compute_value(&one_node_expression()).unwrap();
        assert_eq!(value, json!(42));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_client_error_is_not_retried() {
        let (base_url, hits) = serve(vec![
            (400, r#"{"error": {"code": 400, "message": "Image.select: band 'x' missing"}}"#),
            (200, r#"{"result": 42}"#),
        ]);
        let client = local_client(&base_url, 3);

        let err = client.compute_value(&one_node_expression()).unwrap_err();
        match err {
            ZonalError::Backend { status, message } => {
                assert_eq!(status, Some(400));
                assert_eq!(message, "Image.select: band 'x' missing");
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_retries_are_bounded() {
        let (base_url, hits) = serve(vec![
            (503, "unavailable"),
            (503, "unavailable"),
            (200, r#"{"result": 42}"#),
        ]);
        let client = local_client(&base_url, 1);

        let err = client.compute_value(&one_node_expression()).unwrap_err();
        assert!(matches!(err, ZonalError::Backend { status: Some(503), .. }));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_missing_asset_is_not_found() {
        let (base_url, hits) = serve(vec![(
            404,
            r#"{"error": {"code": 404, "message": "Asset 'NOPE/NOPE' not found."}}"#,
        )]);
        let client = local_client(&base_url, 3);

        let err = client.get_asset("NOPE/NOPE").unwrap_err();
        assert!(matches!(err, ZonalError::AssetNotFound { asset_id } if asset_id == "NOPE/NOPE"));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_get_asset_reads_type() {
        let (base_url, _) = serve(vec![(
            200,
            r#"{"type": "IMAGE", "name": "projects/earthengine-public/assets/USGS/SRTMGL1_003", "id": "USGS/SRTMGL1_003"}"#,
        )]);
        let client = local_client(&base_url, 0);

        let asset = client.get_asset("USGS/SRTMGL1_003").unwrap();
        assert_eq!(asset.asset_type, "IMAGE");
    }

    #[test]
    fn test_retry_delay_doubles_and_caps() {
        assert_eq!(retry_delay(1), Duration::from_millis(500));
        assert_eq!(retry_delay(2), Duration::from_millis(1000));
        assert_eq!(retry_delay(4), Duration::from_millis(4000));
        let cap = Duration::from_secs(MAX_RETRY_DELAY_SECS);
        assert_eq!(retry_delay(20), cap);
        assert_eq!(retry_delay(64), cap);
        assert_eq!(retry_delay(65), cap);
        assert_eq!(retry_delay(u32::MAX), cap);
    }

    #[test]
    fn test_asset_name_public_catalog() {
        assert_eq!(
            asset_name("MODIS/061/MCD12Q1"),
            "projects/earthengine-public/assets/MODIS/061/MCD12Q1"
        );
    }

    #[test]
    fn test_asset_name_project_path_kept() {
        assert_eq!(
            asset_name("projects/my-project/assets/landcover"),
            "projects/my-project/assets/landcover"
        );
    }

    #[test]
    fn test_asset_name_encodes_segments() {
        assert_eq!(
            asset_name("users/someone/my asset"),
            "projects/earthengine-public/assets/users/someone/my%20asset"
        );
    }

    #[test]
    fn test_urls() {
        let mut options = ClientOptions::default();
        options.set_project("my-project");
        let client = EarthEngineClient::new(options).unwrap();
        assert_eq!(
            client.compute_url().unwrap().as_str(),
            "https://earthengine.googleapis.com/v1/projects/my-project/value:compute"
        );
        assert_eq!(
            client.asset_url("COPERNICUS/S2_SR").unwrap().as_str(),
            "https://earthengine.googleapis.com/v1/projects/earthengine-public/assets/COPERNICUS/S2_SR"
        );
    }

    #[test]
    fn test_missing_project_is_config_error() {
        let result = EarthEngineClient::new(ClientOptions::default());
        assert!(matches!(result, Err(ZonalError::Config(_))));
    }

    #[test]
    fn test_retryable_status() {
        assert!(is_retryable_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_retryable_status(StatusCode::SERVICE_UNAVAILABLE));
        assert!(!is_retryable_status(StatusCode::BAD_REQUEST));
        assert!(!is_retryable_status(StatusCode::NOT_FOUND));
    }

    #[test]
    fn test_not_found_detection() {
        assert!(is_not_found(StatusCode::NOT_FOUND, ""));
        assert!(is_not_found(
            StatusCode::BAD_REQUEST,
            "Image collection 'X' not found."
        ));
        assert!(!is_not_found(StatusCode::FORBIDDEN, "Permission denied"));
    }

    #[test]
    fn test_error_message() {
        let body = r#"{"error": {"code": 400, "message": "Band 'x' not found", "status": "INVALID_ARGUMENT"}}"#;
        assert_eq!(error_message(body), "Band 'x' not found");
        assert_eq!(error_message("  gateway timeout \n"), "gateway timeout");
    }

    #[test]
    fn test_asset_info_deserialize() {
        let asset: AssetInfo = serde_json::from_str(
            r#"{"type": "IMAGE_COLLECTION", "name": "projects/earthengine-public/assets/MODIS/061/MCD12Q1", "id": "MODIS/061/MCD12Q1"}"#,
        )
        .unwrap();
        assert_eq!(asset.asset_type, "IMAGE_COLLECTION");
        assert_eq!(asset.id, "MODIS/061/MCD12Q1");
        assert!(asset.start_time.is_none());
    }
}
