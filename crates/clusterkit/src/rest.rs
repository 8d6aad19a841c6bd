//! REST backend for Kubernetes-style API servers.
//!
//! This module provides [`RestClient`], a blocking [`ResourceApi`] over
//! `ureq`. Objects are read with `GET`, created with `POST` to their
//! collection and replaced with `PUT`.
//!
//! # Status mapping
//!
//! | Status            | Result                          |
//! |-------------------|---------------------------------|
//! | 2xx               | the returned object             |
//! | 404 on `get`      | `Ok(None)`                      |
//! | 400, 422          | [`ErrorCategory::Validation`]   |
//! | 401, 403          | [`ErrorCategory::Authorization`]|
//! | 404 on writes     | [`ErrorCategory::NotFound`]     |
//! | 409               | [`ErrorCategory::Conflict`]     |
//! | 408, 429, 5xx     | [`ErrorCategory::Transient`]    |
//!
//! Transport failures are transient; requests that exceed the configured
//! timeout are [`ErrorCategory::Timeout`].
//!
//! [`ErrorCategory::Validation`]: declarative::ErrorCategory::Validation
//! [`ErrorCategory::Authorization`]: declarative::ErrorCategory::Authorization
//! [`ErrorCategory::NotFound`]: declarative::ErrorCategory::NotFound
//! [`ErrorCategory::Conflict`]: declarative::ErrorCategory::Conflict
//! [`ErrorCategory::Transient`]: declarative::ErrorCategory::Transient
//! [`ErrorCategory::Timeout`]: declarative::ErrorCategory::Timeout

use crate::error::{Error, Result};
use crate::kinds::KindInfo;
use declarative::{ApiError, ResourceApi, ResourceId};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use ureq::http::Response;
use ureq::tls::TlsConfig;

/// Connection settings for a [`RestClient`].
#[derive(Debug, Clone)]
pub struct RestConfig {
    /// Base URL of the API server, e.g. `https://127.0.0.1:6443`.
    pub server: String,
    /// Bearer token sent with every request.
    pub token: Option<String>,
    /// Skip TLS certificate verification.
    pub insecure: bool,
    /// Upper bound for one request, connect to last byte.
    pub timeout: Duration,
}

impl Default for RestConfig {
    fn default() -> Self {
        Self {
            server: "https://127.0.0.1:6443".to_string(),
            token: None,
            insecure: false,
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verb {
    Get,
    Create,
    Update,
}

/// Blocking client for a Kubernetes-style REST API.
///
/// # Example
///
/// ```no_run
/// use clusterkit::{RestClient, RestConfig};
/// use declarative::{ResourceApi, ResourceId};
///
/// let client = RestClient::new(&RestConfig {
///     server: "https://127.0.0.1:6443".to_string(),
///     token: Some("secret".to_string()),
///     ..RestConfig::default()
/// })
/// .unwrap();
/// let live = client.get(&ResourceId::namespaced("Service", "default", "nfs")).unwrap();
/// println!("exists: {}", live.is_some());
/// ```
pub struct RestClient {
    /// HTTP agent for requests.
    agent: ureq::Agent,
    /// Server base URL without trailing slash.
    server: String,
    token: Option<String>,
    /// Kinds registered on top of the built-in table.
    kinds: HashMap<String, KindInfo>,
}

impl RestClient {
    /// Create a client for the configured server.
    pub fn new(config: &RestConfig) -> Result<Self> {
        let server = config.server.trim_end_matches('/').to_string();
        if !(server.starts_with("http://") || server.starts_with("https://")) {
            return Err(Error::InvalidServer {
                url: config.server.clone(),
                reason: "missing http:// or https:// scheme".to_string(),
            });
        }

        let mut builder = ureq::Agent::config_builder()
            .timeout_global(Some(config.timeout))
            .http_status_as_error(false);
        if config.insecure {
            log::warn!("TLS certificate verification is disabled for {server}");
            builder = builder.tls_config(TlsConfig::builder().disable_verification(true).build());
        }
        let agent: ureq::Agent = builder.build().into();

        Ok(Self {
            agent,
            server,
            token: config.token.clone(),
            kinds: HashMap::new(),
        })
    }

    /// Register how a kind is served, e.g. a custom resource.
    #[must_use]
    pub fn with_kind(mut self, info: KindInfo) -> Self {
        self.kinds.insert(info.kind.clone(), info);
        self
    }

    /// Get the server base URL.
    pub fn server(&self) -> &str {
        &self.server
    }

    fn kind_info(&self, kind: &str, api_version: Option<&str>) -> std::result::Result<KindInfo, ApiError> {
        if let Some(info) = self.kinds.get(kind) {
            return Ok(info.clone());
        }
        KindInfo::resolve(kind, api_version)
            .ok_or_else(|| ApiError::validation(format!("unknown kind {kind}; declare its apiVersion")))
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.server, path)
    }

    fn authorize<B>(&self, request: ureq::RequestBuilder<B>) -> ureq::RequestBuilder<B> {
        let request = request.header("Accept", "application/json");
        match &self.token {
            Some(token) => request.header("Authorization", format!("Bearer {token}")),
            None => request,
        }
    }
}

impl ResourceApi for RestClient {
    fn get(&self, id: &ResourceId) -> std::result::Result<Option<Value>, ApiError> {
        let info = self.kind_info(&id.kind, None)?;
        let url = self.url(&info.object_path(id));
        log::debug!("GET {url}");
        let outcome = self.authorize(self.agent.get(&url)).call();
        finish(Verb::Get, outcome)
    }

    fn create(&self, id: &ResourceId, object: &Value) -> std::result::Result<Value, ApiError> {
        let info = self.kind_info(&id.kind, object["apiVersion"].as_str())?;
        let url = self.url(&info.collection_path(id.namespace.as_deref()));
        log::debug!("POST {url}");
        let outcome = self.authorize(self.agent.post(&url)).send_json(object);
        finish(Verb::Create, outcome)?.ok_or_else(|| ApiError::not_found(format!("{id} not found")))
    }

    fn update(&self, id: &ResourceId, object: &Value) -> std::result::Result<Value, ApiError> {
        let info = self.kind_info(&id.kind, object["apiVersion"].as_str())?;
        let url = self.url(&info.object_path(id));
        log::debug!("PUT {url}");
        let outcome = self.authorize(self.agent.put(&url)).send_json(object);
        finish(Verb::Update, outcome)?.ok_or_else(|| ApiError::not_found(format!("{id} not found")))
    }
}

/// Turn a response into an object, `None` for a missing object on `get`.
fn finish(
    verb: Verb,
    outcome: std::result::Result<Response<ureq::Body>, ureq::Error>,
) -> std::result::Result<Option<Value>, ApiError> {
    let mut response = outcome.map_err(transport_error)?;
    let status = response.status().as_u16();
    let text = response.body_mut().read_to_string().map_err(transport_error)?;

    if (200..300).contains(&status) {
        let object = serde_json::from_str(&text)
            .map_err(|e| ApiError::transient(format!("server returned invalid JSON: {e}")))?;
        return Ok(Some(object));
    }
    if status == 404 && verb == Verb::Get {
        return Ok(None);
    }
    Err(classify(status, status_message(&text)))
}

/// Map a non-success status to an error category.
fn classify(status: u16, message: String) -> ApiError {
    let message = format!("HTTP {status}: {message}");
    match status {
        400 | 422 => ApiError::validation(message),
        401 | 403 => ApiError::authorization(message),
        404 => ApiError::not_found(message),
        409 => ApiError::conflict(message),
        408 | 429 | 500..=599 => ApiError::transient(message),
        _ => ApiError::validation(message),
    }
}

fn transport_error(err: ureq::Error) -> ApiError {
    match err {
        ureq::Error::Timeout(_) => ApiError::timeout(err.to_string()),
        ureq::Error::StatusCode(code) => classify(code, "request rejected".to_string()),
        other => ApiError::transient(other.to_string()),
    }
}

/// Extract the `message` of a Status object, else the raw body.
fn status_message(body: &str) -> String {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    if let Some(message) = parsed.as_ref().and_then(|v| v["message"].as_str()) {
        return message.to_string();
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        "no message".to_string()
    } else {
        trimmed.chars().take(200).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use declarative::ErrorCategory;
    use serde_json::json;
    use std::io::{Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::thread;

    /// Serve one canned response; the handle yields the raw request.
    fn serve_once(status_line: &'static str, body: &'static str, delay: Duration) -> (String, thread::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let request = read_request(&mut stream);
            thread::sleep(delay);
            let response = format!(
                "HTTP/1.1 {status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = stream.write_all(response.as_bytes());
            request
        });
        (format!("http://{addr}"), handle)
    }

    fn read_request(stream: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let n = stream.read(&mut chunk).unwrap_or(0);
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&buf).to_string();
            if let Some(end) = text.find("\r\n\r\n") {
                let head = text[..end].to_lowercase();
                if head.contains("transfer-encoding: chunked") {
                    if text.ends_with("0\r\n\r\n") {
                        break;
                    }
                    continue;
                }
                let len = head
                    .lines()
                    .find_map(|l| l.strip_prefix("content-length:"))
                    .and_then(|v| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if buf.len() >= end + 4 + len {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&buf).into_owned()
    }

    fn client(server: String) -> RestClient {
        RestClient::new(&RestConfig {
            server,
            token: Some("secret".to_string()),
            insecure: false,
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    #[test]
    fn test_get_missing_is_none() {
        let (server, handle) = serve_once("404 Not Found", r#"{"kind":"Status","code":404}"#, Duration::ZERO);
        let id = ResourceId::namespaced("Service", "default", "nfs-provisioner");

        let live = client(server).get(&id).unwrap();
        assert!(live.is_none());

        let request = handle.join().unwrap();
        assert!(request.starts_with("GET /api/v1/namespaces/default/services/nfs-provisioner HTTP/1.1"));
        assert!(request.to_lowercase().contains("authorization: bearer secret"));
    }

    #[test]
    fn test_create_returns_stored_object() {
        let (server, handle) = serve_once(
            "201 Created",
            r#"{"kind":"StorageClass","metadata":{"name":"example-nfs","uid":"u-1"}}"#,
            Duration::ZERO,
        );
        let id = ResourceId::cluster("StorageClass", "example-nfs");
        let body = json!({"apiVersion": "storage.k8s.io/v1", "kind": "StorageClass", "metadata": {"name": "example-nfs"}});

        let stored = client(server).create(&id, &body).unwrap();
        assert_eq!(stored["metadata"]["uid"], json!("u-1"));

        let request = handle.join().unwrap();
        assert!(request.starts_with("POST /apis/storage.k8s.io/v1/storageclasses HTTP/1.1"));
        assert!(request.contains("example-nfs"));
    }

    #[test]
    fn test_conflict_carries_server_message() {
        let (server, _handle) = serve_once(
            "409 Conflict",
            r#"{"kind":"Status","message":"services \"nfs\" already exists","code":409}"#,
            Duration::ZERO,
        );
        let id = ResourceId::namespaced("Service", "default", "nfs");

        let err = client(server).create(&id, &json!({"kind": "Service"})).unwrap_err();
        assert_eq!(err.category, ErrorCategory::Conflict);
        assert!(err.message.contains("services \"nfs\" already exists"));
    }

    #[test]
    fn test_update_validation_error() {
        let (server, handle) = serve_once("422 Unprocessable Entity", "invalid", Duration::ZERO);
        let id = ResourceId::namespaced("Deployment", "default", "nfs-provisioner");

        let err = client(server).update(&id, &json!({"kind": "Deployment"})).unwrap_err();
        assert_eq!(err.category, ErrorCategory::Validation);
        assert!(!err.is_retryable());

        let request = handle.join().unwrap();
        assert!(request.starts_with("PUT /apis/apps/v1/namespaces/default/deployments/nfs-provisioner HTTP/1.1"));
    }

    #[test]
    fn test_slow_server_times_out() {
        let (server, _handle) = serve_once("200 OK", "{}", Duration::from_millis(1500));
        let client = RestClient::new(&RestConfig {
            server,
            token: None,
            insecure: false,
            timeout: Duration::from_millis(200),
        })
        .unwrap();

        let err = client.get(&ResourceId::namespaced("Pod", "default", "a")).unwrap_err();
        assert_eq!(err.category, ErrorCategory::Timeout);
    }

    #[test]
    fn test_unknown_kind_fails_before_request() {
        let client = client("http://127.0.0.1:1".to_string());
        let err = client
            .get(&ResourceId::namespaced("Certificate", "default", "tls"))
            .unwrap_err();
        assert_eq!(err.category, ErrorCategory::Validation);

        let client = client.with_kind(KindInfo::resolve("Certificate", Some("cert-manager.io/v1")).unwrap());
        let err = client
            .get(&ResourceId::namespaced("Certificate", "default", "tls"))
            .unwrap_err();
        assert_eq!(err.category, ErrorCategory::Transient);
    }

    #[test]
    fn test_server_requires_scheme() {
        let err = RestClient::new(&RestConfig {
            server: "127.0.0.1:6443".to_string(),
            ..RestConfig::default()
        })
        .err()
        .unwrap();
        assert!(matches!(err, Error::InvalidServer { .. }));
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify(400, String::new()).category, ErrorCategory::Validation);
        assert_eq!(classify(403, String::new()).category, ErrorCategory::Authorization);
        assert_eq!(classify(404, String::new()).category, ErrorCategory::NotFound);
        assert_eq!(classify(429, String::new()).category, ErrorCategory::Transient);
        assert_eq!(classify(503, String::new()).category, ErrorCategory::Transient);
        assert_eq!(status_message(r#"{"message":"quota exceeded"}"#), "quota exceeded");
        assert_eq!(status_message("  "), "no message");
    }
}
