use base64::{engine::general_purpose::STANDARD, Engine as _};
use indexmap::IndexMap;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

pub const HEADER_AUTHORIZATION: &str = "Authorization";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }

    pub fn allows_body(&self) -> bool {
        matches!(self, Method::Post | Method::Put | Method::Patch)
    }
}

impl FromStr for Method {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "GET" => Ok(Method::Get),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "PATCH" => Ok(Method::Patch),
            "DELETE" => Ok(Method::Delete),
            _ => Err(format!(
                "Unsupported method '{s}' (expected GET, POST, PUT, PATCH or DELETE)"
            )),
        }
    }
}

impl Display for Method {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Auth {
    #[default]
    None,
    Bearer {
        token: String,
    },
    Basic {
        username: String,
        password: String,
    },
}

impl Auth {
    /// Value of the derived `Authorization` header, if the mode has all the
    /// fields it needs.
    pub fn header_value(&self) -> Option<String> {
        match self {
            Auth::None => None,
            Auth::Bearer { token } => {
                let token = token.trim();
                if token.is_empty() {
                    None
                } else {
                    Some(format!("Bearer {token}"))
                }
            }
            Auth::Basic { username, password } => {
                let (username, password) = (username.trim(), password.trim());
                if username.is_empty() || password.is_empty() {
                    None
                } else {
                    let credentials = STANDARD.encode(format!("{username}:{password}"));
                    Some(format!("Basic {credentials}"))
                }
            }
        }
    }
}

pub type ResolvedHeaders = IndexMap<String, String>;

/// One outbound call as the user described it, before any filtering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestSpec {
    pub method: Method,
    pub url: String,
    pub query_params: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub auth: Auth,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedRequest {
    pub method: Method,
    pub url: String,
    pub headers: ResolvedHeaders,
    pub body: Option<String>,
}

impl RequestSpec {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            query_params: Vec::new(),
            headers: Vec::new(),
            auth: Auth::None,
            body: String::new(),
        }
    }

    pub fn prepare(&self) -> PreparedRequest {
        let url = format!("{}{}", self.url, build_query_string(&self.query_params));
        let headers = build_headers(&self.headers, &self.auth);
        let body = self.body.trim();
        let body = if self.method.allows_body() && !body.is_empty() {
            Some(body.to_string())
        } else {
            None
        };

        PreparedRequest {
            method: self.method,
            url,
            headers,
            body,
        }
    }
}

fn non_empty_rows<'a>(
    rows: &'a [(String, String)],
) -> impl Iterator<Item = (&'a str, &'a str)> + 'a {
    rows.iter()
        .map(|(key, value)| (key.trim(), value.trim()))
        .filter(|(key, value)| !key.is_empty() && !value.is_empty())
}

/// Same escaping as JavaScript's `encodeURIComponent`.
pub fn encode_component(s: &str) -> String {
    urlencoding::encode(s)
        .replace("%21", "!")
        .replace("%2A", "*")
        .replace("%27", "'")
        .replace("%28", "(")
        .replace("%29", ")")
}

pub fn build_query_string(rows: &[(String, String)]) -> String {
    let pairs = non_empty_rows(rows)
        .map(|(key, value)| format!("{}={}", encode_component(key), encode_component(value)))
        .collect::<Vec<String>>();

    if pairs.is_empty() {
        String::new()
    } else {
        format!("?{}", pairs.join("&"))
    }
}

pub fn build_headers(rows: &[(String, String)], auth: &Auth) -> ResolvedHeaders {
    let mut headers = ResolvedHeaders::new();
    for (key, value) in non_empty_rows(rows) {
        headers.insert(key.to_string(), value.to_string());
    }

    if let Some(value) = auth.header_value() {
        headers.insert(HEADER_AUTHORIZATION.to_string(), value);
    }

    headers
}

fn is_absolute(url: &str) -> bool {
    let lower = url.to_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Joins a base-relative URL onto the profile host.
pub fn resolve_url(base: Option<&str>, url: &str) -> String {
    match base {
        Some(base) if !is_absolute(url) && !base.is_empty() => {
            let base = base.trim_end_matches('/');
            let path = url.trim_start_matches('/');
            format!("{base}/{path}")
        }
        _ => url.to_string(),
    }
}

pub fn format_json_body(text: &str) -> String {
    if text.trim().is_empty() {
        return text.to_string();
    }
    serde_json::from_str::<serde_json::Value>(text)
        .ok()
        .and_then(|v| serde_json::to_string_pretty(&v).ok())
        .unwrap_or_else(|| text.to_string())
}

/// Splits `KEY=VALUE` (query parameters) or `KEY: VALUE` (headers).
pub fn split_row(s: &str, separator: char) -> Option<(String, String)> {
    let (key, value) = s.split_once(separator)?;
    Some((key.trim().to_string(), value.trim().to_string()))
}
