use std::env;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Client as ReqwestClient, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::client_logger::ClientLogger;
use crate::error::{Error, Result};
use crate::function::FunctionKind;
use crate::observability::{
    CLIENT_POLLS, CLIENT_POLLS_UNCHANGED, CLIENT_REQUEST_DURATION, CLIENT_REQUEST_ERRORS,
    CLIENT_REQUESTS,
};

/// Environment variable consulted when no deployment URL is given.
pub const DEPLOYMENT_URL_ENV: &str = "CONVEX_URL";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/////////////////////////////////////// Client boundary ///////////////////////////////////////

/// Callback invoked with every fresh query result.
pub type OnResult = Box<dyn FnMut(Value) + Send>;

/// Callback invoked with every subscription failure.
pub type OnError = Box<dyn FnMut(Error) + Send>;

/// Closes one subscription.
///
/// Consuming `self` makes a second close impossible.  Dropping an
/// `Unsubscribe` without calling [`Unsubscribe::unsubscribe`] leaves the
/// subscription open.
#[must_use = "dropping an Unsubscribe leaves the subscription open"]
pub struct Unsubscribe {
    close: Option<Box<dyn FnOnce() + Send>>,
}

impl Unsubscribe {
    /// Wraps the function that closes a subscription.
    pub fn new(close: impl FnOnce() + Send + 'static) -> Self {
        Self {
            close: Some(Box::new(close)),
        }
    }

    /// An `Unsubscribe` for a subscription that was never opened.
    pub fn noop() -> Self {
        Self { close: None }
    }

    /// Closes the subscription.
    pub fn unsubscribe(mut self) {
        if let Some(close) = self.close.take() {
            close();
        }
    }
}

impl fmt::Debug for Unsubscribe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Unsubscribe")
            .field("open", &self.close.is_some())
            .finish()
    }
}

/// The operations livechat consumes from the backend platform.
///
/// Arguments and results are JSON; the typed adapters in [`crate::Convex`]
/// encode and decode them.
#[async_trait::async_trait]
pub trait PlatformClient: Send + Sync {
    /// Opens a live subscription to the query at `path`.
    ///
    /// `on_result` receives every fresh result in delivery order and
    /// `on_error` every failure.  The returned [`Unsubscribe`] closes it.
    fn on_update(
        &self,
        path: &str,
        args: Value,
        on_result: OnResult,
        on_error: OnError,
    ) -> Unsubscribe;

    /// Runs the mutation at `path` once.
    async fn mutation(&self, path: &str, args: Value) -> Result<Value>;

    /// Runs the action at `path` once.
    async fn action(&self, path: &str, args: Value) -> Result<Value>;
}

///////////////////////////////////////// HTTP client /////////////////////////////////////////

/// Client for a deployment's HTTP function API.
///
/// Subscriptions are served by polling the query and pushing a result only
/// when it differs from the previous one.
#[derive(Clone)]
pub struct ConvexHttpClient {
    client: ReqwestClient,
    base_url: Url,
    timeout: Duration,
    poll_interval: Duration,
    logger: Option<Arc<dyn ClientLogger>>,
}

#[derive(Serialize)]
struct FunctionRequest<'a> {
    path: &'a str,
    args: &'a Value,
    format: &'static str,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
enum FunctionResponse {
    Success {
        value: Value,
        #[serde(rename = "logLines", default)]
        log_lines: Vec<String>,
    },
    Error {
        #[serde(rename = "errorMessage")]
        error_message: String,
        #[serde(rename = "errorData", default)]
        error_data: Option<Value>,
        #[serde(rename = "logLines", default)]
        log_lines: Vec<String>,
    },
}

impl ConvexHttpClient {
    /// Create a new client.
    ///
    /// The deployment URL can be provided directly or read from the
    /// `CONVEX_URL` environment variable.
    pub fn new(url: Option<String>) -> Result<Self> {
        Self::with_options(url, None, None)
    }

    /// Create a new client with custom settings.
    pub fn with_options(
        url: Option<String>,
        timeout: Option<Duration>,
        poll_interval: Option<Duration>,
    ) -> Result<Self> {
        let url = match url {
            Some(url) => url,
            None => env::var(DEPLOYMENT_URL_ENV).map_err(|_| {
                Error::configuration(format!(
                    "deployment URL not provided and {DEPLOYMENT_URL_ENV} environment variable not set"
                ))
            })?,
        };
        let base_url = parse_deployment_url(&url)?;

        let timeout = timeout.unwrap_or(DEFAULT_TIMEOUT);
        let client = ReqwestClient::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                Error::http_client(
                    format!("Failed to build HTTP client: {}", e),
                    Some(Box::new(e)),
                )
            })?;

        Ok(Self {
            client,
            base_url,
            timeout,
            poll_interval: poll_interval.unwrap_or(DEFAULT_POLL_INTERVAL),
            logger: None,
        })
    }

    /// Attach a logger that sees every call.
    pub fn with_logger(mut self, logger: Arc<dyn ClientLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// The deployment URL, normalized to end in `/`.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// How often subscriptions re-run their query.
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    fn endpoint(&self, kind: FunctionKind) -> Result<Url> {
        Ok(self.base_url.join(&format!("api/{}", kind.as_str()))?)
    }

    fn default_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        headers
    }

    /// Run one function and decode its outcome.
    pub async fn call(&self, kind: FunctionKind, path: &str, args: Value) -> Result<Value> {
        CLIENT_REQUESTS.click();
        let start = Instant::now();
        let result = self.call_once(kind, path, &args).await;
        CLIENT_REQUEST_DURATION.add(start.elapsed().as_secs_f64());

        match &result {
            Ok(value) => {
                if let Some(logger) = &self.logger {
                    logger.log_result(kind, path, &args, value);
                }
            }
            Err(err) => {
                CLIENT_REQUEST_ERRORS.click();
                tracing::debug!(%kind, path, error = %err, "function call failed");
                if let Some(logger) = &self.logger {
                    logger.log_error(kind, path, &args, err);
                }
            }
        }
        result
    }

    async fn call_once(&self, kind: FunctionKind, path: &str, args: &Value) -> Result<Value> {
        let url = self.endpoint(kind)?;
        let body = FunctionRequest {
            path,
            args,
            format: "json",
        };

        let response = self
            .client
            .post(url)
            .headers(Self::default_headers())
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::timeout(
                        format!("Request timed out: {}", e),
                        Some(self.timeout.as_secs_f64()),
                    )
                } else if e.is_connect() {
                    Error::connection(format!("Connection error: {}", e), Some(Box::new(e)))
                } else {
                    Error::http_client(format!("Request failed: {}", e), Some(Box::new(e)))
                }
            })?;

        if !response.status().is_success() {
            return Err(Self::process_error_response(path, response).await);
        }

        let text = response.text().await.map_err(|e| {
            Error::http_client(
                format!("Failed to read response: {}", e),
                Some(Box::new(e)),
            )
        })?;
        let parsed = serde_json::from_str::<FunctionResponse>(&text).map_err(|e| {
            Error::serialization(
                format!("Failed to parse response: {}", e),
                Some(Box::new(e)),
            )
        })?;
        self.settle(path, parsed)
    }

    fn settle(&self, path: &str, response: FunctionResponse) -> Result<Value> {
        match response {
            FunctionResponse::Success { value, log_lines } => {
                self.forward_log_lines(path, &log_lines);
                Ok(value)
            }
            FunctionResponse::Error {
                error_message,
                error_data,
                log_lines,
            } => {
                self.forward_log_lines(path, &log_lines);
                Err(Error::function(path, error_message, error_data))
            }
        }
    }

    fn forward_log_lines(&self, path: &str, lines: &[String]) {
        if lines.is_empty() {
            return;
        }
        if let Some(logger) = &self.logger {
            logger.log_function_lines(path, lines);
        }
    }

    /// Process API response errors and convert to our Error type
    async fn process_error_response(path: &str, response: Response) -> Error {
        let status_code = response.status().as_u16();

        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|val| val.to_str().ok())
            .and_then(|val| val.parse::<u64>().ok());

        let error_body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                return Error::http_client(
                    format!("Failed to read error response: {}", e),
                    Some(Box::new(e)),
                );
            }
        };

        error_from_status(path, status_code, retry_after, error_body)
    }

    async fn poll(
        self,
        path: String,
        args: Value,
        token: CancellationToken,
        mut on_result: OnResult,
        mut on_error: OnError,
    ) {
        let mut last: Option<Value> = None;
        loop {
            CLIENT_POLLS.click();
            let outcome = tokio::select! {
                _ = token.cancelled() => break,
                outcome = self.call(FunctionKind::Query, &path, args.clone()) => outcome,
            };
            if token.is_cancelled() {
                break;
            }
            match outcome {
                Ok(value) => {
                    if last.as_ref() == Some(&value) {
                        CLIENT_POLLS_UNCHANGED.click();
                    } else {
                        last = Some(value.clone());
                        on_result(value);
                    }
                }
                Err(err) => {
                    // The next success must be delivered so the reader's error clears.
                    last = None;
                    on_error(err);
                }
            }
            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
        tracing::debug!(path = %path, "poll loop stopped");
    }
}

impl fmt::Debug for ConvexHttpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConvexHttpClient")
            .field("base_url", &self.base_url.as_str())
            .field("timeout", &self.timeout)
            .field("poll_interval", &self.poll_interval)
            .field("logger", &self.logger.is_some())
            .finish()
    }
}

#[async_trait::async_trait]
impl PlatformClient for ConvexHttpClient {
    fn on_update(
        &self,
        path: &str,
        args: Value,
        on_result: OnResult,
        mut on_error: OnError,
    ) -> Unsubscribe {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            on_error(Error::configuration(
                "subscriptions require a running tokio runtime",
            ));
            return Unsubscribe::noop();
        };
        let token = CancellationToken::new();
        runtime.spawn(self.clone().poll(
            path.to_string(),
            args,
            token.clone(),
            on_result,
            on_error,
        ));
        Unsubscribe::new(move || token.cancel())
    }

    async fn mutation(&self, path: &str, args: Value) -> Result<Value> {
        self.call(FunctionKind::Mutation, path, args).await
    }

    async fn action(&self, path: &str, args: Value) -> Result<Value> {
        self.call(FunctionKind::Action, path, args).await
    }
}

/// Map a non-success status and its body to an [`Error`].
fn error_from_status(
    path: &str,
    status_code: u16,
    retry_after: Option<u64>,
    error_body: String,
) -> Error {
    // Functions that throw come back as a structured error body.
    if let Ok(FunctionResponse::Error {
        error_message,
        error_data,
        ..
    }) = serde_json::from_str::<FunctionResponse>(&error_body)
    {
        return Error::function(path, error_message, error_data);
    }

    #[derive(Deserialize)]
    struct PlatformError {
        code: Option<String>,
        message: Option<String>,
    }
    let error_message = match serde_json::from_str::<PlatformError>(&error_body) {
        Ok(PlatformError {
            code: Some(code),
            message: Some(message),
        }) => format!("{code}: {message}"),
        Ok(PlatformError {
            message: Some(message),
            ..
        }) => message,
        _ => error_body,
    };

    match status_code {
        400 => Error::bad_request(error_message),
        401 => Error::authentication(error_message),
        403 => Error::permission(error_message),
        404 => Error::not_found(error_message, Some(path.to_string())),
        408 => Error::timeout(error_message, None),
        429 => Error::rate_limit(error_message, retry_after),
        500 => Error::internal_server(error_message),
        502..=504 => Error::service_unavailable(error_message, retry_after),
        _ => Error::api(status_code, error_message),
    }
}

/// Parse a deployment URL and make it usable as a join base.
fn parse_deployment_url(url: &str) -> Result<Url> {
    let mut parsed = Url::parse(url.trim())?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(Error::validation(
            format!("deployment URL must be http or https, got {}", parsed.scheme()),
            Some("url".to_string()),
        ));
    }
    if !parsed.path().ends_with('/') {
        let path = format!("{}/", parsed.path());
        parsed.set_path(&path);
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    #[test]
    fn test_client_creation() {
        let client = ConvexHttpClient::new(Some("https://happy-otter-123.convex.cloud".to_string()))
            .unwrap();
        assert_eq!(
            client.base_url().as_str(),
            "https://happy-otter-123.convex.cloud/"
        );
        assert_eq!(client.timeout, DEFAULT_TIMEOUT);
        assert_eq!(client.poll_interval(), DEFAULT_POLL_INTERVAL);

        let client = ConvexHttpClient::with_options(
            Some("http://127.0.0.1:3210/base".to_string()),
            Some(Duration::from_secs(5)),
            Some(Duration::from_millis(250)),
        )
        .unwrap();
        assert_eq!(client.base_url().as_str(), "http://127.0.0.1:3210/base/");
        assert_eq!(client.timeout, Duration::from_secs(5));
        assert_eq!(client.poll_interval(), Duration::from_millis(250));
    }

    #[test]
    fn endpoints_follow_kind() {
        let client = ConvexHttpClient::new(Some("http://127.0.0.1:3210".to_string())).unwrap();
        assert_eq!(
            client.endpoint(FunctionKind::Query).unwrap().as_str(),
            "http://127.0.0.1:3210/api/query"
        );
        assert_eq!(
            client.endpoint(FunctionKind::Mutation).unwrap().as_str(),
            "http://127.0.0.1:3210/api/mutation"
        );
    }

    #[test]
    fn rejects_non_http_urls() {
        let err = ConvexHttpClient::new(Some("ftp://example.com".to_string())).unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
        let err = ConvexHttpClient::new(Some("not a url".to_string())).unwrap_err();
        assert!(matches!(err, Error::Url { .. }));
    }

    #[test]
    fn request_body_shape() {
        let args = serde_json::json!({"user": "Ann", "body": "hi"});
        let body = FunctionRequest {
            path: "chat:sendMessage",
            args: &args,
            format: "json",
        };
        assert_eq!(
            serde_json::to_value(body).unwrap(),
            serde_json::json!({
                "path": "chat:sendMessage",
                "args": {"user": "Ann", "body": "hi"},
                "format": "json",
            })
        );
    }

    struct LinesLogger(Mutex<Vec<String>>);

    impl ClientLogger for LinesLogger {
        fn log_result(&self, _: FunctionKind, _: &str, _: &Value, _: &Value) {}
        fn log_error(&self, _: FunctionKind, _: &str, _: &Value, _: &Error) {}
        fn log_function_lines(&self, path: &str, lines: &[String]) {
            let mut seen = self.0.lock().unwrap();
            for line in lines {
                seen.push(format!("{path}: {line}"));
            }
        }
    }

    #[test]
    fn settles_success_and_error_bodies() {
        let logger = Arc::new(LinesLogger(Mutex::new(Vec::new())));
        let client = ConvexHttpClient::new(Some("http://127.0.0.1:3210".to_string()))
            .unwrap()
            .with_logger(logger.clone());

        let ok: FunctionResponse = serde_json::from_str(
            r#"{"status":"success","value":[{"user":"Ann","body":"hi"}],"logLines":["[LOG] read"]}"#,
        )
        .unwrap();
        let value = client.settle("chat:getMessages", ok).unwrap();
        assert_eq!(value, serde_json::json!([{"user": "Ann", "body": "hi"}]));

        let failed: FunctionResponse = serde_json::from_str(
            r#"{"status":"error","errorMessage":"Uncaught Error: empty body","errorData":{"field":"body"}}"#,
        )
        .unwrap();
        let err = client.settle("chat:sendMessage", failed).unwrap_err();
        match err {
            Error::Function {
                path,
                message,
                data,
            } => {
                assert_eq!(path, "chat:sendMessage");
                assert_eq!(message, "Uncaught Error: empty body");
                assert_eq!(data, Some(serde_json::json!({"field": "body"})));
            }
            other => panic!("unexpected error: {other:?}"),
        }

        assert_eq!(
            *logger.0.lock().unwrap(),
            vec!["chat:getMessages: [LOG] read".to_string()]
        );
    }

    #[test]
    fn on_update_without_runtime_reports_error() {
        let client = ConvexHttpClient::new(Some("http://127.0.0.1:3210".to_string())).unwrap();
        let errors = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&errors);
        let unsubscribe = client.on_update(
            "chat:getMessages",
            serde_json::json!({}),
            Box::new(|_: Value| panic!("no result expected")),
            Box::new(move |err: Error| sink.lock().unwrap().push(err)),
        );
        unsubscribe.unsubscribe();
        let errors = errors.lock().unwrap();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].is_configuration());
    }

    #[test]
    fn statuses_map_to_typed_errors() {
        let platform = |code: &str| format!(r#"{{"code":"{code}","message":"nope"}}"#);
        let path = "chat:getMessages";

        let err = error_from_status(path, 401, None, platform("Unauthenticated"));
        assert!(err.is_authentication());

        match error_from_status(path, 404, None, platform("FunctionNotFound")) {
            Error::NotFound { message, path } => {
                assert_eq!(message, "FunctionNotFound: nope");
                assert_eq!(path.as_deref(), Some("chat:getMessages"));
            }
            other => panic!("unexpected error: {other:?}"),
        }

        match error_from_status(path, 429, Some(3), platform("RateLimited")) {
            Error::RateLimit {
                message,
                retry_after,
            } => {
                assert_eq!(message, "RateLimited: nope");
                assert_eq!(retry_after, Some(3));
            }
            other => panic!("unexpected error: {other:?}"),
        }

        match error_from_status(path, 503, None, "upstream down".to_string()) {
            Error::ServiceUnavailable {
                message,
                retry_after,
            } => {
                assert_eq!(message, "upstream down");
                assert_eq!(retry_after, None);
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let err = error_from_status(
            path,
            400,
            None,
            r#"{"status":"error","errorMessage":"Uncaught Error: bad"}"#.to_string(),
        );
        assert!(err.is_function());

        let err = error_from_status(path, 418, None, "teapot".to_string());
        assert_eq!(err.status_code(), Some(418));
    }

    /// A local deployment that answers the n-th request with the n-th
    /// scripted response, repeating the last once the script runs out.
    struct FakeDeployment {
        url: String,
        requests: Arc<AtomicUsize>,
    }

    impl FakeDeployment {
        async fn start(script: Vec<(u16, String)>) -> Self {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let url = format!("http://{}", listener.local_addr().unwrap());
            let requests = Arc::new(AtomicUsize::new(0));
            let served = Arc::clone(&requests);
            tokio::spawn(async move {
                while let Ok((mut stream, _)) = listener.accept().await {
                    let n = served.fetch_add(1, Ordering::SeqCst);
                    let (status, body) = script[n.min(script.len() - 1)].clone();
                    tokio::spawn(async move {
                        if read_request(&mut stream).await.is_err() {
                            return;
                        }
                        let response = format!(
                            "HTTP/1.1 {status} Scripted\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                            body.len()
                        );
                        let _ = stream.write_all(response.as_bytes()).await;
                        let _ = stream.shutdown().await;
                    });
                }
            });
            Self { url, requests }
        }

        fn requests(&self) -> usize {
            self.requests.load(Ordering::SeqCst)
        }

        fn client(&self) -> ConvexHttpClient {
            ConvexHttpClient::with_options(
                Some(self.url.clone()),
                Some(Duration::from_secs(5)),
                Some(Duration::from_millis(10)),
            )
            .unwrap()
        }
    }

    async fn read_request(stream: &mut TcpStream) -> std::io::Result<()> {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let n = stream.read(&mut chunk).await?;
            if n == 0 {
                return Ok(());
            }
            buf.extend_from_slice(&chunk[..n]);
            let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
                continue;
            };
            let head = String::from_utf8_lossy(&buf[..end]).to_ascii_lowercase();
            let length = head
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= end + 4 + length {
                return Ok(());
            }
        }
    }

    fn success(value: Value) -> (u16, String) {
        (200, json!({"status": "success", "value": value}).to_string())
    }

    #[derive(Clone, Default)]
    struct Deliveries {
        results: Arc<Mutex<Vec<Value>>>,
        errors: Arc<Mutex<Vec<Error>>>,
    }

    impl Deliveries {
        fn subscribe(&self, client: &ConvexHttpClient) -> Unsubscribe {
            let results = Arc::clone(&self.results);
            let errors = Arc::clone(&self.errors);
            client.on_update(
                "chat:getMessages",
                json!({}),
                Box::new(move |value: Value| results.lock().unwrap().push(value)),
                Box::new(move |err: Error| errors.lock().unwrap().push(err)),
            )
        }

        fn results(&self) -> Vec<Value> {
            self.results.lock().unwrap().clone()
        }

        fn errors(&self) -> Vec<Error> {
            self.errors.lock().unwrap().clone()
        }
    }

    async fn wait_for(mut condition: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(10), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached");
    }

    #[tokio::test]
    async fn poll_pushes_only_changed_results() {
        let deployment = FakeDeployment::start(vec![
            success(json!([1])),
            success(json!([1])),
            success(json!([1])),
            success(json!([2])),
        ])
        .await;
        let deliveries = Deliveries::default();
        let unsubscribe = deliveries.subscribe(&deployment.client());

        wait_for(|| deployment.requests() >= 6 && deliveries.results().len() >= 2).await;
        unsubscribe.unsubscribe();
        assert_eq!(deliveries.results(), vec![json!([1]), json!([2])]);
        assert!(deliveries.errors().is_empty());
    }

    #[tokio::test]
    async fn poll_repeats_value_after_error() {
        let deployment = FakeDeployment::start(vec![
            success(json!([1])),
            (
                500,
                json!({"code": "InternalServerError", "message": "boom"}).to_string(),
            ),
            success(json!([1])),
        ])
        .await;
        let deliveries = Deliveries::default();
        let unsubscribe = deliveries.subscribe(&deployment.client());

        wait_for(|| deliveries.results().len() >= 2).await;
        wait_for(|| deployment.requests() >= 5).await;
        unsubscribe.unsubscribe();
        assert_eq!(deliveries.results(), vec![json!([1]), json!([1])]);
        let errors = deliveries.errors();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].is_server_error());
    }

    #[tokio::test]
    async fn poll_stops_after_unsubscribe() {
        let script = (0..100).map(|n| success(json!([n]))).collect();
        let deployment = FakeDeployment::start(script).await;
        let deliveries = Deliveries::default();
        let unsubscribe = deliveries.subscribe(&deployment.client());

        wait_for(|| !deliveries.results().is_empty()).await;
        unsubscribe.unsubscribe();
        let delivered = deliveries.results().len();
        let requested = deployment.requests();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(deliveries.results().len(), delivered);
        assert!(deployment.requests() <= requested + 1);
    }

    #[tokio::test]
    async fn call_maps_rate_limit_status() {
        let deployment = FakeDeployment::start(vec![(
            429,
            json!({"code": "RateLimited", "message": "slow down"}).to_string(),
        )])
        .await;
        let err = deployment
            .client()
            .call(FunctionKind::Mutation, "chat:sendMessage", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::RateLimit { .. }));
    }

    #[tokio::test]
    #[ignore] // Requires a reachable deployment in CONVEX_URL
    async fn test_live_query() {
        let url = env::var(DEPLOYMENT_URL_ENV).ok();
        if url.is_none() {
            println!("Skipping test_live_query: {DEPLOYMENT_URL_ENV} not set");
            return;
        }
        let client = ConvexHttpClient::new(url).unwrap();
        let value = client
            .call(FunctionKind::Query, "chat:getMessages", serde_json::json!({}))
            .await
            .unwrap();
        assert!(value.is_array());
    }
}
