use std::io::{self, IsTerminal, Write};

use anyhow::{anyhow, bail, Context, Result};
use colored::*;
use rustyline::{error::ReadlineError, DefaultEditor};

use crate::args::AuthMode;
use crate::auth::{login, LoginOutcome};
use crate::http::HttpTransport;
use crate::profile::Profile;
use crate::render::{history_lines, print_rendered};
use crate::request::{format_json_body, resolve_url, Auth, Method, RequestSpec};
use crate::session::Session;
use crate::store::KeyValueStore;

/// The request being edited between sends, minus method and URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Draft {
    pub params: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub auth_mode: AuthMode,
    pub basic_user: String,
    pub basic_password: String,
    pub body: String,
}

impl Draft {
    pub fn new(profile: &Profile) -> Self {
        let (basic_user, basic_password) = (
            profile.user.clone().unwrap_or_default(),
            profile.password.clone().unwrap_or_default(),
        );
        Self {
            params: Vec::new(),
            headers: profile.headers.clone(),
            auth_mode: AuthMode::Bearer,
            basic_user,
            basic_password,
            body: String::new(),
        }
    }

    pub fn auth(&self, token: &str) -> Auth {
        match self.auth_mode {
            AuthMode::None => Auth::None,
            AuthMode::Bearer => Auth::Bearer {
                token: token.to_string(),
            },
            AuthMode::Basic => Auth::Basic {
                username: self.basic_user.clone(),
                password: self.basic_password.clone(),
            },
        }
    }

    pub fn spec(&self, method: Method, url: String, body: Option<&str>, token: &str) -> RequestSpec {
        RequestSpec {
            method,
            url,
            query_params: self.params.clone(),
            headers: self.headers.clone(),
            auth: self.auth(token),
            body: body.unwrap_or(&self.body).to_string(),
        }
    }
}

fn push_row(rows: &mut Vec<(String, String)>, key: &str, value: &str) {
    rows.push((key.to_string(), value.to_string()));
}

fn remove_rows(rows: &mut Vec<(String, String)>, key: &str) -> bool {
    let before = rows.len();
    rows.retain(|(k, _)| !k.eq_ignore_ascii_case(key));
    rows.len() != before
}

#[derive(Debug, PartialEq, Eq)]
pub struct ReplCommand {
    method: Method,
    url: String,
    body: Option<String>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum Command {
    Http(ReplCommand),
    Special(SpecialCommand),
    Empty,
}

#[derive(Debug, PartialEq, Eq)]
pub enum SpecialCommand {
    Help,
    Exit,
    Clear,
    Verbose,
    ShowDraft,
    History,
    SetParam { key: String, value: String },
    RemoveParam { key: String },
    SetHeader { name: String, value: String },
    RemoveHeader { name: String },
    Auth { mode: AuthMode, credentials: Option<(String, String)> },
    Token { value: Option<String> },
    Body { text: Option<String> },
    Login { username: String, password: String, base: Option<String> },
}

pub fn parse_line(line: &str) -> Result<Command> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(Command::Empty);
    }

    if line.starts_with('!') {
        return Ok(Command::Special(parse_special_command(line)?));
    }

    parse_http_command(line)
}

fn parse_special_command(line: &str) -> Result<SpecialCommand> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    let rest = |n: usize| parts[n..].join(" ");

    match parts[0] {
        "!help" | "!h" => Ok(SpecialCommand::Help),
        "!exit" | "!quit" | "!q" => Ok(SpecialCommand::Exit),
        "!clear" | "!c" => Ok(SpecialCommand::Clear),
        "!verbose" | "!v" => Ok(SpecialCommand::Verbose),
        "!draft" => Ok(SpecialCommand::ShowDraft),
        "!history" => Ok(SpecialCommand::History),
        "!param" => {
            if parts.len() < 3 {
                bail!("Usage: !param <key> <value>");
            }
            Ok(SpecialCommand::SetParam {
                key: parts[1].to_string(),
                value: rest(2),
            })
        }
        "!rm-param" => {
            if parts.len() < 2 {
                bail!("Usage: !rm-param <key>");
            }
            Ok(SpecialCommand::RemoveParam {
                key: parts[1].to_string(),
            })
        }
        "!header" | "!set-header" => {
            if parts.len() < 3 {
                bail!("Usage: !header <name> <value>");
            }
            Ok(SpecialCommand::SetHeader {
                name: parts[1].trim_end_matches(':').to_string(),
                value: rest(2),
            })
        }
        "!rm-header" | "!remove-header" => {
            if parts.len() < 2 {
                bail!("Usage: !rm-header <name>");
            }
            Ok(SpecialCommand::RemoveHeader {
                name: parts[1].to_string(),
            })
        }
        "!auth" => {
            let mode = parts
                .get(1)
                .ok_or_else(|| anyhow!("Usage: !auth none|bearer|basic [user password]"))
                .and_then(|m| {
                    <AuthMode as clap::ValueEnum>::from_str(m, true)
                        .map_err(|_| anyhow!("Unknown auth mode: {m}"))
                })?;
            let credentials = match (parts.get(2), parts.get(3)) {
                (Some(user), Some(password)) => Some((user.to_string(), password.to_string())),
                (Some(_), None) => bail!("Usage: !auth basic <user> <password>"),
                _ => None,
            };
            Ok(SpecialCommand::Auth { mode, credentials })
        }
        "!token" => Ok(SpecialCommand::Token {
            value: parts.get(1).map(|_| rest(1)),
        }),
        "!body" => Ok(SpecialCommand::Body {
            text: parts.get(1).map(|_| line["!body".len()..].trim().to_string()),
        }),
        "!login" => {
            if parts.len() < 3 {
                bail!("Usage: !login <user> <password> [base-url]");
            }
            Ok(SpecialCommand::Login {
                username: parts[1].to_string(),
                password: parts[2].to_string(),
                base: parts.get(3).map(|b| b.to_string()),
            })
        }
        _ => bail!("Unknown command: {}", parts[0]),
    }
}

fn parse_http_command(line: &str) -> Result<Command> {
    const USAGE: &str = "Usage: <METHOD> <URL> [body]";

    let (method, rest) = line
        .split_once(char::is_whitespace)
        .ok_or_else(|| anyhow!(USAGE))?;
    let method = method.parse::<Method>().map_err(|e| anyhow!(e))?;

    let rest = rest.trim_start();
    let (url, body) = match rest.split_once(char::is_whitespace) {
        Some((url, body)) => (url, Some(body.trim().to_string())),
        None => (rest, None),
    };
    if url.is_empty() {
        bail!(USAGE);
    }

    Ok(Command::Http(ReplCommand {
        method,
        url: url.to_string(),
        body: body.filter(|b| !b.is_empty()),
    }))
}

pub struct Repl<S: KeyValueStore, T: HttpTransport> {
    editor: Option<DefaultEditor>,
    profile: Profile,
    transport: T,
    session: Session<S>,
    draft: Draft,
    verbose: bool,
}

impl<S: KeyValueStore, T: HttpTransport> Repl<S, T> {
    pub fn new(profile: Profile, transport: T, session: Session<S>, verbose: bool) -> Result<Self> {
        let editor = if io::stdin().is_terminal() {
            Some(DefaultEditor::new().context("Failed to create line editor")?)
        } else {
            None
        };
        let draft = Draft::new(&profile);

        Ok(Self {
            editor,
            profile,
            transport,
            session,
            draft,
            verbose,
        })
    }

    pub async fn run(&mut self) -> Result<()> {
        if self.editor.is_some() {
            self.print_welcome();
        }

        loop {
            let line = match self.read_line()? {
                Some(line) => line,
                None => break,
            };

            match parse_line(&line) {
                Ok(Command::Http(cmd)) => self.execute_http_command(cmd).await,
                Ok(Command::Special(SpecialCommand::Exit)) => break,
                Ok(Command::Special(cmd)) => {
                    if let Err(e) = self.handle_special_command(cmd).await {
                        eprintln!("{}: {}", "Error".red().bold(), e);
                    }
                }
                Ok(Command::Empty) => continue,
                Err(e) => eprintln!("{}: {}", "Error".red().bold(), e),
            }
        }

        if self.editor.is_some() {
            println!("{}", "Goodbye!".green());
        }
        Ok(())
    }

    fn print_welcome(&self) {
        println!("{}", "Welcome to apiprobe interactive mode!".green().bold());
        println!("Type {} for help, {} to exit.", "!help".cyan(), "!exit".cyan());
        println!(
            "Enter HTTP commands like: {} {}",
            "GET".yellow(),
            "/api/pessoas".blue()
        );
        if let Some(preview) = self.session.token_preview() {
            println!("{}", preview.dimmed());
        }
        println!();
    }

    /// `None` at end of input.
    fn read_line(&mut self) -> Result<Option<String>> {
        match self.editor.as_mut() {
            Some(editor) => {
                let prompt = format!("{} ", "apiprobe>".green().bold());
                match editor.readline(&prompt) {
                    Ok(line) => {
                        let _ = editor.add_history_entry(line.as_str());
                        Ok(Some(line))
                    }
                    Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => Ok(None),
                    Err(e) => Err(anyhow!("Failed to read input: {}", e)),
                }
            }
            None => {
                let mut line = String::new();
                match io::stdin().read_line(&mut line) {
                    Ok(0) => Ok(None),
                    Ok(_) => Ok(Some(line)),
                    Err(e) => Err(anyhow!("Failed to read input: {}", e)),
                }
            }
        }
    }

    fn read_body(&mut self) -> Result<String> {
        println!(
            "{}",
            "Enter body (finish with an empty line or Ctrl+D):".yellow()
        );

        let mut body = String::new();
        loop {
            print!("> ");
            io::stdout().flush()?;

            let mut line = String::new();
            match io::stdin().read_line(&mut line) {
                Ok(0) => break,
                Ok(_) if line.trim().is_empty() => break,
                Ok(_) => body.push_str(&line),
                Err(e) => bail!("Error reading input: {}", e),
            }
        }

        Ok(body.trim().to_string())
    }

    async fn execute_http_command(&mut self, cmd: ReplCommand) {
        let url = resolve_url(self.profile.host.as_deref(), &cmd.url);
        let body = cmd.body.as_deref().map(format_json_body);
        let spec = self
            .draft
            .spec(cmd.method, url, body.as_deref(), self.session.token());

        let rendered = self.session.send(&self.transport, &spec).await;
        print_rendered(&rendered, self.verbose);
        println!();
    }

    async fn handle_special_command(&mut self, cmd: SpecialCommand) -> Result<()> {
        match cmd {
            SpecialCommand::Help => self.print_help(),
            SpecialCommand::Exit => {}
            SpecialCommand::Clear => {
                print!("\x1B[2J\x1B[1;1H");
                io::stdout().flush()?;
            }
            SpecialCommand::Verbose => {
                self.verbose = !self.verbose;
                let status = if self.verbose { "enabled" } else { "disabled" };
                println!("{}: Verbose mode {}", "Info".cyan(), status.yellow());
            }
            SpecialCommand::ShowDraft => self.print_draft(),
            SpecialCommand::History => {
                let history = self.session.history();
                if history.is_empty() {
                    println!("{}", "No requests yet.".yellow());
                }
                for line in history_lines(history) {
                    println!("{line}");
                }
            }
            SpecialCommand::SetParam { key, value } => {
                push_row(&mut self.draft.params, &key, &value);
                println!("{}: {}={}", "Param added".green(), key.blue(), value);
            }
            SpecialCommand::RemoveParam { key } => {
                if remove_rows(&mut self.draft.params, &key) {
                    println!("{}: {}", "Param removed".green(), key.blue());
                } else {
                    println!("{}: {}", "Param not found".yellow(), key.blue());
                }
            }
            SpecialCommand::SetHeader { name, value } => {
                push_row(&mut self.draft.headers, &name, &value);
                println!("{}: {} -> {}", "Header set".green(), name.blue(), value);
            }
            SpecialCommand::RemoveHeader { name } => {
                if remove_rows(&mut self.draft.headers, &name) {
                    println!("{}: {}", "Header removed".green(), name.blue());
                } else {
                    println!("{}: {}", "Header not found".yellow(), name.blue());
                }
            }
            SpecialCommand::Auth { mode, credentials } => {
                if let Some((user, password)) = credentials {
                    self.draft.basic_user = user;
                    self.draft.basic_password = password;
                }
                self.draft.auth_mode = mode;
                println!("{}: {}", "Auth".cyan(), mode.label().yellow());
            }
            SpecialCommand::Token { value } => {
                if let Some(value) = value {
                    self.session.set_token(value.trim())?;
                }
                match self.session.token_preview() {
                    Some(preview) => println!("{preview}"),
                    None => println!("{}", "No token set.".yellow()),
                }
            }
            SpecialCommand::Body { text } => {
                let text = match text {
                    Some(text) => text,
                    None => self.read_body()?,
                };
                self.draft.body = format_json_body(&text);
                if self.draft.body.is_empty() {
                    println!("{}", "Body cleared.".yellow());
                } else {
                    println!("{}", self.draft.body);
                }
            }
            SpecialCommand::Login {
                username,
                password,
                base,
            } => {
                let base = base
                    .or_else(|| self.profile.host.clone())
                    .ok_or_else(|| {
                        anyhow!("No host configured in the profile; use !login <user> <password> <base-url>")
                    })?;
                let outcome =
                    login(&mut self.session, &self.transport, &base, &username, &password).await?;
                print_rendered(outcome.rendered(), self.verbose);
                match &outcome {
                    LoginOutcome::LoggedIn { .. } => {
                        println!("{}", outcome.message().green().bold());
                        if let Some(preview) = self.session.token_preview() {
                            println!("{}", preview.dimmed());
                        }
                    }
                    _ => println!("{}", outcome.message().red().bold()),
                }
            }
        }
        Ok(())
    }

    fn print_draft(&self) {
        println!("{}", "Current draft:".cyan().bold());
        println!("  {}: {}", "auth".blue(), self.draft.auth_mode.label());
        for (key, value) in &self.draft.params {
            println!("  {} {}={}", "param".blue(), key, value);
        }
        for (key, value) in &self.draft.headers {
            println!("  {} {}: {}", "header".blue(), key, value);
        }
        if !self.draft.body.is_empty() {
            println!("  {}:\n{}", "body".blue(), self.draft.body);
        }
        if let Some(preview) = self.session.token_preview() {
            println!("  {}", preview.dimmed());
        }
    }

    fn print_help(&self) {
        println!("{}", "apiprobe Interactive Mode Help".green().bold());
        println!();
        println!("{}", "HTTP Commands:".cyan().bold());
        println!("  {} {}              - Make a GET request", "GET".yellow(), "/api/pessoas".blue());
        println!("  {} {} {}    - POST with an inline body", "POST".yellow(), "/api/pessoas".blue(), "{...}".blue());
        println!("  {} {}          - PUT using the draft body", "PUT".yellow(), "/api/pessoas/1".blue());
        println!("  {} {}        - Make a DELETE request", "DELETE".yellow(), "/api/pessoas/1".blue());
        println!();
        println!("{}", "Draft Commands:".cyan().bold());
        println!("  {} {} {}             - Add a query parameter", "!param".yellow(), "key".blue(), "value".blue());
        println!("  {} {}              - Remove a query parameter", "!rm-param".yellow(), "key".blue());
        println!("  {} {} {}           - Set a header", "!header".yellow(), "name".blue(), "value".blue());
        println!("  {} {}            - Remove a header", "!rm-header".yellow(), "name".blue());
        println!("  {} {}    - Choose the auth mode", "!auth".yellow(), "none|bearer|basic".blue());
        println!("  {} {}                 - Show or set the bearer token", "!token".yellow(), "[value]".blue());
        println!("  {} {}                   - Set the body (no argument: multi-line)", "!body".yellow(), "[json]".blue());
        println!("  {}                        - Show the draft", "!draft".yellow());
        println!();
        println!("{}", "Session Commands:".cyan().bold());
        println!("  {} {} {}        - Log in and save the token", "!login".yellow(), "user".blue(), "password".blue());
        println!("  {}                      - Show recent requests", "!history".yellow());
        println!("  {}                      - Toggle verbose mode", "!verbose".yellow());
        println!("  {}                        - Clear screen", "!clear".yellow());
        println!("  {}                         - Exit apiprobe", "!exit".yellow());
        println!();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile() -> Profile {
        Profile {
            host: Some("http://localhost:5000".to_string()),
            user: Some("admin".to_string()),
            password: Some("123456".to_string()),
            headers: vec![("Content-Type".to_string(), "application/json".to_string())],
            ..Profile::default()
        }
    }

    #[test]
    fn test_parse_http_command() -> Result<()> {
        assert_eq!(
            parse_line("get /api/pessoas")?,
            Command::Http(ReplCommand {
                method: Method::Get,
                url: "/api/pessoas".to_string(),
                body: None,
            })
        );
        assert_eq!(
            parse_line("POST /api/pessoas {\"nome\": \"Ana Souza\"}")?,
            Command::Http(ReplCommand {
                method: Method::Post,
                url: "/api/pessoas".to_string(),
                body: Some("{\"nome\": \"Ana Souza\"}".to_string()),
            })
        );
        assert!(parse_line("GET").is_err());
        assert!(parse_line("FETCH /x").is_err());
        assert_eq!(parse_line("   ")?, Command::Empty);
        Ok(())
    }

    #[test]
    fn test_parse_special_commands() -> Result<()> {
        assert_eq!(
            parse_line("!param nome João Silva")?,
            Command::Special(SpecialCommand::SetParam {
                key: "nome".to_string(),
                value: "João Silva".to_string(),
            })
        );
        assert_eq!(
            parse_line("!header X-Trace: abc")?,
            Command::Special(SpecialCommand::SetHeader {
                name: "X-Trace".to_string(),
                value: "abc".to_string(),
            })
        );
        assert_eq!(
            parse_line("!auth BASIC admin 123456")?,
            Command::Special(SpecialCommand::Auth {
                mode: AuthMode::Basic,
                credentials: Some(("admin".to_string(), "123456".to_string())),
            })
        );
        assert_eq!(
            parse_line("!token")?,
            Command::Special(SpecialCommand::Token { value: None })
        );
        assert_eq!(
            parse_line("!body {\"a\": 1}")?,
            Command::Special(SpecialCommand::Body {
                text: Some("{\"a\": 1}".to_string()),
            })
        );
        assert_eq!(
            parse_line("!login admin 123456")?,
            Command::Special(SpecialCommand::Login {
                username: "admin".to_string(),
                password: "123456".to_string(),
                base: None,
            })
        );
        assert!(parse_line("!auth digest").is_err());
        assert!(parse_line("!auth basic admin").is_err());
        assert!(parse_line("!param onlykey").is_err());
        assert!(parse_line("!nope").is_err());
        Ok(())
    }

    #[test]
    fn test_draft_uses_profile_defaults() {
        let draft = Draft::new(&profile());
        assert_eq!(draft.auth_mode, AuthMode::Bearer);
        assert_eq!(draft.headers.len(), 1);
        assert_eq!(draft.basic_user, "admin");
    }

    #[test]
    fn test_draft_spec() {
        let mut draft = Draft::new(&profile());
        draft.body = "{\"draft\": true}".to_string();
        push_row(&mut draft.params, "page", "1");
        push_row(&mut draft.headers, "Content-Type", "text/plain");

        let spec = draft.spec(Method::Post, "http://localhost:5000/api".to_string(), None, "tok");
        let req = spec.prepare();
        assert_eq!(req.url, "http://localhost:5000/api?page=1");
        assert_eq!(req.headers["Content-Type"], "text/plain");
        assert_eq!(req.headers["Authorization"], "Bearer tok");
        assert_eq!(req.body.as_deref(), Some("{\"draft\": true}"));

        let inline = draft.spec(Method::Post, "http://x/".to_string(), Some("{}"), "tok");
        assert_eq!(inline.body, "{}");
    }

    #[test]
    fn test_draft_basic_auth() {
        let mut draft = Draft::new(&profile());
        draft.auth_mode = AuthMode::Basic;
        let req = draft
            .spec(Method::Get, "http://x/".to_string(), None, "ignored")
            .prepare();
        assert_eq!(req.headers["Authorization"], "Basic YWRtaW46MTIzNDU2");
    }

    #[test]
    fn test_remove_rows_is_case_insensitive() {
        let mut rows = vec![
            ("X-Trace".to_string(), "1".to_string()),
            ("x-trace".to_string(), "2".to_string()),
            ("Accept".to_string(), "*/*".to_string()),
        ];
        assert!(remove_rows(&mut rows, "X-TRACE"));
        assert_eq!(rows.len(), 1);
        assert!(!remove_rows(&mut rows, "missing"));
    }
}
