use crate::decoder::decode_body;
use crate::request::{Method, PreparedRequest};

use anyhow::{Context, Result};
use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue, CONTENT_ENCODING, CONTENT_TYPE},
    Certificate, Client,
};
use serde_json::Value;
use std::fmt::{self, Debug, Display};
use std::time::Instant;
use tracing::debug;

pub const JSON_MEDIA_TYPE: &str = "application/json";

pub trait HttpConnectionProfile {
    fn insecure(&self) -> bool;
    fn ca_cert(&self) -> Option<&String>;
}

/// A failure at or below the HTTP exchange. An HTTP response with an error
/// status is never one of these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    Connect(String),
    Timeout(String),
    Request(String),
    Decode(String),
}

impl TransportError {
    pub fn message(&self) -> &str {
        match self {
            TransportError::Connect(msg)
            | TransportError::Timeout(msg)
            | TransportError::Request(msg)
            | TransportError::Decode(msg) => msg,
        }
    }
}

impl Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for TransportError {}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        let msg = error_chain(&e);
        if e.is_timeout() {
            TransportError::Timeout(msg)
        } else if e.is_connect() {
            TransportError::Connect(msg)
        } else if e.is_decode() {
            TransportError::Decode(msg)
        } else {
            TransportError::Request(msg)
        }
    }
}

// reqwest keeps the useful part (refused, dns, tls) in the source chain
fn error_chain(e: &dyn std::error::Error) -> String {
    let mut msg = e.to_string();
    let mut source = e.source();
    while let Some(s) = source {
        msg.push_str(": ");
        msg.push_str(&s.to_string());
        source = s.source();
    }
    msg
}

/// What the transport hands back: status, headers in wire order, and the
/// decoded body text. `received_at` is when the status line and headers
/// arrived, before the body was read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub status_text: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
    pub received_at: Instant,
}

impl TransportResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

#[allow(async_fn_in_trait)]
pub trait HttpTransport {
    async fn execute(&self, req: &PreparedRequest)
        -> std::result::Result<TransportResponse, TransportError>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Json(Value),
    Text(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResponseRecord {
    pub status: u16,
    pub status_text: String,
    pub headers: Vec<(String, String)>,
    pub body: ResponseBody,
    pub elapsed_ms: u64,
}

pub fn is_json_content(content_type: Option<&str>) -> bool {
    content_type
        .map(|c| c.to_lowercase().contains(JSON_MEDIA_TYPE))
        .unwrap_or(false)
}

/// Runs one request through `transport`, timing the exchange and decoding
/// the body according to its declared content type.
pub async fn invoke<T: HttpTransport>(
    transport: &T,
    req: &PreparedRequest,
) -> std::result::Result<ResponseRecord, TransportError> {
    debug!(method = %req.method, url = %req.url, "sending request");

    let start = Instant::now();
    let res = transport.execute(req).await?;
    let elapsed_ms = res.received_at.saturating_duration_since(start).as_millis() as u64;
    debug!(status = res.status, elapsed_ms, "response received");

    let body = if is_json_content(res.header(CONTENT_TYPE.as_str())) {
        let value = serde_json::from_str::<Value>(&res.body)
            .map_err(|e| TransportError::Decode(format!("Invalid JSON response body: {e}")))?;
        ResponseBody::Json(value)
    } else {
        ResponseBody::Text(res.body)
    };

    Ok(ResponseRecord {
        status: res.status,
        status_text: res.status_text,
        headers: res.headers,
        body,
        elapsed_ms,
    })
}

pub struct ReqwestTransport {
    client: Client,
}

impl Debug for ReqwestTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReqwestTransport")
            .field("client", &"Client")
            .finish()
    }
}

impl ReqwestTransport {
    pub fn new(profile: &impl HttpConnectionProfile) -> Result<Self> {
        let insecure_access = profile.insecure();
        let mut cli_builder = Client::builder()
            .danger_accept_invalid_certs(insecure_access)
            .danger_accept_invalid_hostnames(insecure_access);

        if let Some(ca_cert) = profile.ca_cert() {
            let ca_cert = shellexpand::tilde(ca_cert).to_string();
            let pem = std::fs::read(&ca_cert)
                .with_context(|| format!("Failed to read CA certificate: {ca_cert}"))?;
            let cert = Certificate::from_pem(&pem)
                .with_context(|| format!("Invalid CA certificate: {ca_cert}"))?;
            cli_builder = cli_builder.use_rustls_tls().add_root_certificate(cert);
        }

        let client = cli_builder
            .build()
            .context("Failed to build the HTTP client")?;
        Ok(Self { client })
    }

    fn to_reqwest_method(method: Method) -> reqwest::Method {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
        }
    }

    fn build_headers(req: &PreparedRequest) -> std::result::Result<HeaderMap, TransportError> {
        let mut headers = HeaderMap::new();
        for (key, value) in req.headers.iter() {
            let name = HeaderName::from_bytes(key.as_bytes())
                .map_err(|e| TransportError::Request(format!("Invalid header name '{key}': {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| TransportError::Request(format!("Invalid value for header '{key}': {e}")))?;
            // insert() replaces case-insensitively, so a later row wins
            headers.insert(name, value);
        }
        Ok(headers)
    }
}

impl HttpTransport for ReqwestTransport {
    async fn execute(
        &self,
        req: &PreparedRequest,
    ) -> std::result::Result<TransportResponse, TransportError> {
        let mut req_builder = self
            .client
            .request(Self::to_reqwest_method(req.method), req.url.as_str())
            .headers(Self::build_headers(req)?);

        if let Some(body) = &req.body {
            req_builder = req_builder.body(body.to_string());
        }

        let res = req_builder.send().await?;
        let received_at = Instant::now();
        let status = res.status();
        let headers = res
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.to_string(),
                    String::from_utf8_lossy(value.as_bytes()).to_string(),
                )
            })
            .collect::<Vec<(String, String)>>();
        let content_encoding = res
            .headers()
            .get(CONTENT_ENCODING)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string());
        let content_type = res
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string());

        let body_bytes = res.bytes().await?;
        let body = decode_body(body_bytes, content_encoding.as_deref(), content_type.as_deref())
            .map_err(|e| TransportError::Decode(e.to_string()))?;

        Ok(TransportResponse {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or("").to_string(),
            headers,
            body,
            received_at,
        })
    }
}
