use crate::http::{invoke, HttpTransport, ResponseBody, TransportError};
use crate::render::{render_error, render_response, Rendered};
use crate::request::{Method, RequestSpec};
use crate::session::Session;
use crate::store::KeyValueStore;

use anyhow::{bail, Result};
use serde_json::json;
use tracing::{debug, info};

pub const LOGIN_PATH: &str = "/api/auth/login";

#[derive(Debug)]
pub enum LoginOutcome {
    LoggedIn { rendered: Rendered },
    Rejected { message: String, rendered: Rendered },
    Failed { error: TransportError, rendered: Rendered },
}

impl LoginOutcome {
    pub fn rendered(&self) -> &Rendered {
        match self {
            LoginOutcome::LoggedIn { rendered }
            | LoginOutcome::Rejected { rendered, .. }
            | LoginOutcome::Failed { rendered, .. } => rendered,
        }
    }

    pub fn message(&self) -> String {
        match self {
            LoginOutcome::LoggedIn { .. } => "Login successful".to_string(),
            LoginOutcome::Rejected { message, .. } => format!("Login failed: {message}"),
            LoginOutcome::Failed { error, .. } => format!("Connection error: {error}"),
        }
    }
}

pub fn login_request(base: &str, username: &str, password: &str) -> RequestSpec {
    let mut spec = RequestSpec::new(
        Method::Post,
        format!("{}{}", base.trim_end_matches('/'), LOGIN_PATH),
    );
    spec.headers = vec![("Content-Type".to_string(), "application/json".to_string())];
    spec.body = json!({ "username": username, "password": password }).to_string();
    spec
}

fn body_field<'a>(body: &'a ResponseBody, field: &str) -> Option<&'a str> {
    match body {
        ResponseBody::Json(v) => v.get(field).and_then(|f| f.as_str()),
        ResponseBody::Text(_) => None,
    }
}

/// Posts the credentials to the login endpoint and, on success, makes the
/// returned token the session token. A rejected login keeps the old token.
pub async fn login<S, T>(
    session: &mut Session<S>,
    transport: &T,
    base: &str,
    username: &str,
    password: &str,
) -> Result<LoginOutcome>
where
    S: KeyValueStore,
    T: HttpTransport,
{
    if username.is_empty() || password.is_empty() {
        bail!("Both username and password are required to log in");
    }

    let req = login_request(base, username, password).prepare();
    debug!(url = %req.url, username, "logging in");

    let record = match invoke(transport, &req).await {
        Ok(record) => record,
        Err(error) => {
            let rendered = render_error(&error);
            return Ok(LoginOutcome::Failed { error, rendered });
        }
    };

    let rendered = render_response(&record);
    let success = (200..300).contains(&record.status);
    let outcome = match (success, body_field(&record.body, "token")) {
        (true, Some(token)) => {
            session.set_token(token)?;
            info!("logged in as {username}");
            LoginOutcome::LoggedIn { rendered }
        }
        (true, None) => LoginOutcome::Rejected {
            message: "response did not contain a token".to_string(),
            rendered,
        },
        (false, _) => {
            let message = body_field(&record.body, "error")
                .map(|e| e.to_string())
                .unwrap_or_else(|| format!("{} {}", record.status, record.status_text));
            LoginOutcome::Rejected { message, rendered }
        }
    };

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::tests::{response, ScriptedTransport};
    use crate::store::MemoryStore;

    const TEST_BASE: &str = "http://localhost:5000/";

    #[test]
    fn test_login_request() {
        let req = login_request(TEST_BASE, "admin", "123456").prepare();
        assert_eq!(req.url, "http://localhost:5000/api/auth/login");
        assert_eq!(req.headers["Content-Type"], "application/json");
        let body: serde_json::Value = serde_json::from_str(req.body.as_deref().unwrap()).unwrap();
        assert_eq!(body, json!({"username": "admin", "password": "123456"}));
    }

    #[tokio::test]
    async fn test_login_stores_token() -> Result<()> {
        let transport = ScriptedTransport::replying(vec![Ok(response(
            200,
            "application/json",
            r#"{"message": "Login realizado com sucesso", "token": "tok-123"}"#,
        ))]);
        let mut session = Session::load(MemoryStore::default())?;

        let outcome = login(&mut session, &transport, TEST_BASE, "admin", "123456").await?;
        assert!(matches!(outcome, LoginOutcome::LoggedIn { .. }));
        assert_eq!(session.token(), "tok-123");
        assert!(session.history().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_rejected_login_keeps_token() -> Result<()> {
        let transport = ScriptedTransport::replying(vec![Ok(response(
            401,
            "application/json",
            r#"{"error": "Credenciais inválidas"}"#,
        ))]);
        let mut session = Session::load(MemoryStore::default())?;
        session.set_token("old-token")?;

        let outcome = login(&mut session, &transport, TEST_BASE, "admin", "wrong").await?;
        assert_eq!(outcome.message(), "Login failed: Credenciais inválidas");
        assert_eq!(session.token(), "old-token");
        match outcome.rendered().badge {
            crate::render::StatusBadge::Http { code, .. } => assert_eq!(code, 401),
            crate::render::StatusBadge::Error => panic!("expected an HTTP badge"),
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_success_without_token_is_rejected() -> Result<()> {
        let transport =
            ScriptedTransport::replying(vec![Ok(response(200, "application/json", "{}"))]);
        let mut session = Session::load(MemoryStore::default())?;

        let outcome = login(&mut session, &transport, TEST_BASE, "admin", "123456").await?;
        assert!(matches!(outcome, LoginOutcome::Rejected { .. }));
        assert_eq!(session.token(), "");
        Ok(())
    }

    #[tokio::test]
    async fn test_login_connection_failure() -> Result<()> {
        let transport = ScriptedTransport::replying(vec![Err(TransportError::Connect(
            "connection refused".to_string(),
        ))]);
        let mut session = Session::load(MemoryStore::default())?;

        let outcome = login(&mut session, &transport, TEST_BASE, "admin", "123456").await?;
        assert!(outcome.rendered().is_error());
        assert_eq!(outcome.message(), "Connection error: connection refused");
        Ok(())
    }

    #[tokio::test]
    async fn test_login_requires_credentials() -> Result<()> {
        let transport = ScriptedTransport::default();
        let mut session = Session::load(MemoryStore::default())?;

        assert!(login(&mut session, &transport, TEST_BASE, "admin", "").await.is_err());
        assert!(transport.seen.borrow().is_empty());
        Ok(())
    }
}
