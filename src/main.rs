mod args;
mod auth;
mod decoder;
mod history;
mod http;
mod profile;
mod render;
mod repl;
mod request;
mod session;
mod store;

use anyhow::{anyhow, Context, Result};
use args::{AuthMode, CommandLineArgs};
use auth::{login, LoginOutcome};
use colored::*;
use http::ReqwestTransport;
use profile::{Profile, DEFAULT_INI_FILE_PATH};
use render::{history_lines, print_rendered};
use repl::Repl;
use request::{resolve_url, Auth, RequestSpec};
use session::Session;
use std::io::{stdin, IsTerminal, Read};
use std::process::ExitCode;
use store::{FileStore, KeyValueStore, DEFAULT_STORE_FILE_PATH};
use tracing::debug;
use tracing_subscriber::{fmt::time::ChronoLocal, EnvFilter};

fn init_tracing(verbose: bool) {
    let default_directive = if verbose { "apiprobe=debug" } else { "apiprobe=warn" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(ChronoLocal::rfc_3339())
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cmd_args = CommandLineArgs::get();
    init_tracing(cmd_args.verbose());

    let mut profile = Profile::load_or_default(DEFAULT_INI_FILE_PATH, cmd_args.profile())?;
    apply_overrides(&mut profile, &cmd_args);

    let store = FileStore::open(DEFAULT_STORE_FILE_PATH)?;
    debug!(path = %store.path().display(), "store opened");
    let mut session = Session::load(store)?;

    if let Some(token) = cmd_args.token() {
        session.set_token(token.trim())?;
    } else if session.token().is_empty() {
        if let Some(token) = &profile.token {
            session.set_token(token)?;
        }
    }

    if cmd_args.history() {
        for line in history_lines(session.history()) {
            println!("{line}");
        }
        return Ok(ExitCode::SUCCESS);
    }

    let transport = ReqwestTransport::new(&profile)?;

    if cmd_args.login() {
        return run_login(&cmd_args, &profile, &mut session, &transport).await;
    }

    if cmd_args.method().is_none() {
        let mut repl = Repl::new(profile, transport, session, cmd_args.verbose())?;
        repl.run().await?;
        return Ok(ExitCode::SUCCESS);
    }

    let spec = get_request_spec(&cmd_args, &profile, session.token())?;
    if cmd_args.verbose() {
        eprintln!("> {} {}", spec.method, spec.url);
    }

    let rendered = session.send(&transport, &spec).await;
    print_rendered(&rendered, cmd_args.verbose());

    Ok(if rendered.is_error() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

fn apply_overrides(profile: &mut Profile, cmd_args: &CommandLineArgs) {
    if let Some(user) = cmd_args.user() {
        profile.user = Some(user.to_string());
    }
    if let Some(password) = cmd_args.password() {
        profile.password = Some(password.to_string());
    }
    if let Some(ca_cert) = cmd_args.ca_cert() {
        profile.ca_cert = Some(ca_cert.to_string());
    }
    if cmd_args.insecure() {
        profile.insecure = true;
    }
}

async fn run_login<S: KeyValueStore>(
    cmd_args: &CommandLineArgs,
    profile: &Profile,
    session: &mut Session<S>,
    transport: &ReqwestTransport,
) -> Result<ExitCode> {
    let base = cmd_args
        .login_base()
        .or(profile.host.as_ref())
        .ok_or_else(|| anyhow!("--login needs a URL or a profile with a host"))?;
    let user = profile.user.clone().unwrap_or_default();
    let password = profile.password.clone().unwrap_or_default();

    let outcome = login(session, transport, base, &user, &password).await?;
    print_rendered(outcome.rendered(), cmd_args.verbose());

    match &outcome {
        LoginOutcome::LoggedIn { .. } => {
            eprintln!("{}", outcome.message().green().bold());
            if let Some(preview) = session.token_preview() {
                eprintln!("{preview}");
            }
            Ok(ExitCode::SUCCESS)
        }
        _ => {
            eprintln!("{}", outcome.message().red().bold());
            Ok(ExitCode::FAILURE)
        }
    }
}

fn resolve_auth(cmd_args: &CommandLineArgs, profile: &Profile, token: &str) -> Auth {
    let mode = cmd_args.auth().unwrap_or(if cmd_args.user().is_some() {
        AuthMode::Basic
    } else if !token.is_empty() {
        AuthMode::Bearer
    } else {
        AuthMode::None
    });

    match mode {
        AuthMode::None => Auth::None,
        AuthMode::Bearer => Auth::Bearer {
            token: token.to_string(),
        },
        AuthMode::Basic => Auth::Basic {
            username: profile.user.clone().unwrap_or_default(),
            password: profile.password.clone().unwrap_or_default(),
        },
    }
}

fn get_request_spec(
    cmd_args: &CommandLineArgs,
    profile: &Profile,
    token: &str,
) -> Result<RequestSpec> {
    let method = cmd_args
        .method()
        .ok_or_else(|| anyhow!("HTTP method is required"))?;
    let url = cmd_args
        .url()
        .ok_or_else(|| anyhow!("URL is required"))?;

    // profile headers first so command-line rows win
    let mut headers = profile.headers.clone();
    headers.extend(cmd_args.headers()?);

    let body = match cmd_args.body() {
        Some(body) => body.to_string(),
        None if method.allows_body() && !stdin().is_terminal() => {
            debug!("reading body from stdin");
            let mut buffer = String::new();
            stdin()
                .read_to_string(&mut buffer)
                .context("Failed to read the request body from stdin")?;
            buffer
        }
        None => String::new(),
    };

    Ok(RequestSpec {
        method,
        url: resolve_url(profile.host.as_deref(), url),
        query_params: cmd_args.params()?,
        headers,
        auth: resolve_auth(cmd_args, profile, token),
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use args::Parser;

    fn profile() -> Profile {
        Profile {
            host: Some("http://localhost:5000".to_string()),
            headers: vec![
                ("Content-Type".to_string(), "application/json".to_string()),
                ("X-Client".to_string(), "profile".to_string()),
            ],
            ..Profile::default()
        }
    }

    #[test]
    fn test_command_line_headers_override_profile() -> Result<()> {
        let args = CommandLineArgs::parse_from([
            "apiprobe",
            "GET",
            "/api/pessoas",
            "-H",
            "X-Client: cli",
            "-q",
            "page=2",
        ]);
        let spec = get_request_spec(&args, &profile(), "")?;
        let req = spec.prepare();

        assert_eq!(req.url, "http://localhost:5000/api/pessoas?page=2");
        assert_eq!(req.headers["X-Client"], "cli");
        assert_eq!(req.headers["Content-Type"], "application/json");
        assert!(!req.headers.contains_key("Authorization"));
        Ok(())
    }

    #[test]
    fn test_default_auth_mode() {
        let mut profile = profile();
        let args = CommandLineArgs::parse_from(["apiprobe", "GET", "/"]);
        assert_eq!(resolve_auth(&args, &profile, ""), Auth::None);
        assert_eq!(
            resolve_auth(&args, &profile, "tok"),
            Auth::Bearer {
                token: "tok".to_string()
            }
        );

        let args = CommandLineArgs::parse_from(["apiprobe", "GET", "/", "-u", "admin", "-w", "123456"]);
        apply_overrides(&mut profile, &args);
        assert_eq!(
            resolve_auth(&args, &profile, "tok"),
            Auth::Basic {
                username: "admin".to_string(),
                password: "123456".to_string()
            }
        );

        let args = CommandLineArgs::parse_from(["apiprobe", "GET", "/", "-A", "none"]);
        assert_eq!(resolve_auth(&args, &profile, "tok"), Auth::None);
    }
}
