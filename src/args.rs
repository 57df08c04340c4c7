use crate::profile::DEFAULT_INI_SECTION;
use crate::request::{split_row, Method};

use anyhow::{anyhow, Result};
use clap::ValueEnum;

pub use clap::Parser;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AuthMode {
    None,
    Bearer,
    Basic,
}

impl AuthMode {
    pub fn label(&self) -> &'static str {
        match self {
            AuthMode::None => "none",
            AuthMode::Bearer => "bearer",
            AuthMode::Basic => "basic",
        }
    }
}

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct CommandLineArgs {
    #[clap(
        value_parser = |s: &str| s.parse::<Method>(),
        help = "HTTP method (GET/POST/PUT/PATCH/DELETE). Omit to start interactive mode"
    )]
    method: Option<Method>,
    #[clap(help = "URL to send the request to, absolute or relative to the profile host")]
    url: Option<String>,
    #[clap(help = "body text to send with POST/PUT/PATCH")]
    body: Option<String>,
    #[clap(short = 'p', long, default_value = DEFAULT_INI_SECTION, help = "profile name")]
    profile: String,
    #[clap(
        short = 'q',
        long = "param",
        value_name = "KEY=VALUE",
        help = "query parameter to append to the URL"
    )]
    params: Vec<String>,
    #[clap(
        short = 'H',
        long = "header",
        value_name = "KEY: VALUE",
        help = "HTTP header to send with the request"
    )]
    headers: Vec<String>,
    #[clap(short = 'A', long = "auth", value_enum, help = "authorization mode")]
    auth: Option<AuthMode>,
    #[clap(short = 't', long, help = "bearer token (saved for later requests)")]
    token: Option<String>,
    #[clap(short = 'u', long, help = "username for basic authentication or login")]
    user: Option<String>,
    #[clap(short = 'w', long, help = "password for basic authentication or login")]
    password: Option<String>,
    #[clap(short = 'r', long, help = "CA certificate PEM file path")]
    ca_cert: Option<String>,
    #[clap(
        short = 'k',
        long,
        help = "Allow insecure server connections when using SSL"
    )]
    insecure: bool,
    #[clap(
        long,
        value_name = "BASE",
        num_args = 0..=1,
        default_missing_value = "",
        help = "log in with --user/--password against BASE (or the profile host) and save the returned token"
    )]
    login: Option<String>,
    #[clap(long, help = "print the request history and exit")]
    history: bool,
    #[clap(
        short = 'v',
        long,
        help = "Print verbose message",
        default_value = "false"
    )]
    verbose: bool,
}

impl CommandLineArgs {
    pub fn get() -> Self {
        CommandLineArgs::parse()
    }

    pub fn method(&self) -> Option<Method> {
        self.method
    }

    pub fn url(&self) -> Option<&String> {
        self.url.as_ref()
    }

    pub fn body(&self) -> Option<&String> {
        self.body.as_ref()
    }

    pub fn profile(&self) -> &String {
        &self.profile
    }

    pub fn params(&self) -> Result<Vec<(String, String)>> {
        self.params
            .iter()
            .map(|p| split_row(p, '=').ok_or_else(|| anyhow!("Invalid parameter format: {p}")))
            .collect()
    }

    pub fn headers(&self) -> Result<Vec<(String, String)>> {
        self.headers
            .iter()
            .map(|h| split_row(h, ':').ok_or_else(|| anyhow!("Invalid header format: {h}")))
            .collect()
    }

    pub fn auth(&self) -> Option<AuthMode> {
        self.auth
    }

    pub fn token(&self) -> Option<&String> {
        self.token.as_ref()
    }

    pub fn user(&self) -> Option<&String> {
        self.user.as_ref()
    }

    pub fn password(&self) -> Option<&String> {
        self.password.as_ref()
    }

    pub fn ca_cert(&self) -> Option<&String> {
        self.ca_cert.as_ref()
    }

    pub fn insecure(&self) -> bool {
        self.insecure
    }

    pub fn login(&self) -> bool {
        self.login.is_some()
    }

    pub fn login_base(&self) -> Option<&String> {
        self.login.as_ref().filter(|s| !s.is_empty())
    }

    pub fn history(&self) -> bool {
        self.history
    }

    pub fn verbose(&self) -> bool {
        self.verbose
    }
}
