use crate::http::HttpConnectionProfile;

use anyhow::{anyhow, Context, Result};
use ini::{Ini, Properties};
use std::path::Path;

pub const DEFAULT_INI_FILE_PATH: &str = "~/.apiprobe";
pub const DEFAULT_INI_SECTION: &str = "default";

const INI_HOST: &str = "host";
const INI_USER: &str = "user";
const INI_PASSWORD: &str = "password";
const INI_TOKEN: &str = "token";
const INI_CA_CERT: &str = "ca_cert";
const INI_INSECURE: &str = "insecure";
const INI_HEADER_PREFIX: &str = "@";

/// Connection defaults from one `[section]` of the profile file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Profile {
    pub host: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub token: Option<String>,
    pub insecure: bool,
    pub ca_cert: Option<String>,
    pub headers: Vec<(String, String)>,
}

impl HttpConnectionProfile for Profile {
    fn insecure(&self) -> bool {
        self.insecure
    }

    fn ca_cert(&self) -> Option<&String> {
        self.ca_cert.as_ref()
    }
}

impl Profile {
    pub fn load(file_path: &str, name: &str) -> Result<Option<Profile>> {
        let extended_path = shellexpand::tilde(file_path).to_string();
        if !Path::new(&extended_path).exists() {
            tracing::debug!("profile file not found: {}", &extended_path);
            return Ok(None);
        }
        let ini = Ini::load_from_file(&extended_path)
            .with_context(|| format!("Failed to load profile file: {extended_path}"))?;
        let section = match ini.section(Some(name)) {
            Some(s) => s,
            None => return Ok(None),
        };

        fn try_get(section: &Properties, key: &str) -> Option<String> {
            section
                .get(key)
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        }

        let insecure = match try_get(section, INI_INSECURE) {
            Some(s) => s
                .parse::<bool>()
                .map_err(|_| anyhow!("Invalid value for '{INI_INSECURE}' in [{name}]: {s}"))?,
            None => false,
        };

        // header entries only
        let headers = section
            .iter()
            .filter_map(|(key, value)| {
                key.strip_prefix(INI_HEADER_PREFIX)
                    .map(|k| (k.to_string(), value.to_string()))
            })
            .collect::<Vec<(String, String)>>();

        Ok(Some(Profile {
            host: try_get(section, INI_HOST),
            user: try_get(section, INI_USER),
            password: try_get(section, INI_PASSWORD),
            token: try_get(section, INI_TOKEN),
            insecure,
            ca_cert: try_get(section, INI_CA_CERT),
            headers,
        }))
    }

    /// Like `load`, but a missing file or section is an empty profile unless
    /// the caller asked for a specific one.
    pub fn load_or_default(file_path: &str, name: &str) -> Result<Profile> {
        match Self::load(file_path, name)? {
            Some(profile) => Ok(profile),
            None if name == DEFAULT_INI_SECTION => Ok(Profile::default()),
            None => Err(anyhow!("Profile not found: {name}")),
        }
    }
}
