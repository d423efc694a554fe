//! Connection settings consumed when a `ConnectionManager` is built.
//!
//! Settings can be deserialized with serde or flattened into a host
//! application's clap CLI, with environment-variable fallbacks.

use crate::error::{FacadeError, FacadeResult};
use clap::Args;
use serde::{Deserialize, Serialize};
use url::Url;

/// Provider used when the settings name none.
pub const DEFAULT_PROVIDER_NAME: &str = "sqlserver";

/// Connection-string keys that carry credentials in `key=value;` strings.
const CREDENTIAL_KEYS: &[&str] = &["user id", "uid", "user", "username", "password", "pwd"];

/// Username/password pair merged into the connection string before connecting.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub username: String,
    pub password: Option<String>,
}

impl Credential {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: Some(password.into()),
        }
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Connection target for a manager.
#[derive(Clone, Default, Serialize, Deserialize, Args)]
pub struct ConnectionSettings {
    /// Label used in logs. Not part of the connection itself.
    #[arg(long = "connection-name", env = "DB_CONNECTION_NAME")]
    #[serde(default)]
    pub name: Option<String>,

    /// Driver-specific connection string (sensitive - not logged).
    #[arg(long, env = "DB_CONNECTION_STRING", hide_env_values = true)]
    #[serde(default, skip_serializing)]
    pub connection_string: String,

    /// Registered provider name. Falls back to DEFAULT_PROVIDER_NAME.
    #[arg(long = "provider", env = "DB_PROVIDER")]
    #[serde(default)]
    pub provider_name: Option<String>,

    /// Merged into the connection string before the first connection.
    #[arg(long, env = "DB_USERNAME")]
    #[serde(default)]
    pub username: Option<String>,

    #[arg(long, env = "DB_PASSWORD", hide_env_values = true)]
    #[serde(default, skip_serializing)]
    pub password: Option<String>,

    /// Timeout applied to every command created from these settings.
    #[arg(long = "command-timeout", env = "DB_COMMAND_TIMEOUT")]
    #[serde(default)]
    pub command_timeout_secs: Option<u32>,
}

impl ConnectionSettings {
    pub fn new(connection_string: impl Into<String>) -> Self {
        Self {
            connection_string: connection_string.into(),
            ..Self::default()
        }
    }

    pub fn with_provider(mut self, provider_name: impl Into<String>) -> Self {
        self.provider_name = Some(provider_name.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_credential(mut self, credential: Credential) -> Self {
        self.username = Some(credential.username);
        self.password = credential.password;
        self
    }

    pub fn with_command_timeout(mut self, secs: u32) -> Self {
        self.command_timeout_secs = Some(secs);
        self
    }

    /// The provider to resolve, applying the documented fallback.
    pub fn resolved_provider_name(&self) -> &str {
        match self.provider_name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name,
            _ => DEFAULT_PROVIDER_NAME,
        }
    }

    pub fn credential(&self) -> Option<Credential> {
        self.username.as_ref().map(|username| Credential {
            username: username.clone(),
            password: self.password.clone(),
        })
    }

    /// Label for logs: the configured name, or the provider.
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .unwrap_or_else(|| self.resolved_provider_name())
    }

    pub fn validate(&self) -> FacadeResult<()> {
        if self.connection_string.trim().is_empty() {
            return Err(FacadeError::invalid_settings(
                "connection string must not be empty",
            ));
        }
        if self.password.is_some() && self.username.is_none() {
            return Err(FacadeError::invalid_settings(
                "a password was given without a username",
            ));
        }
        Ok(())
    }

    /// Connection string with the credential, if any, merged in.
    pub fn effective_connection_string(&self) -> FacadeResult<String> {
        match self.credential() {
            Some(credential) => merge_credential(&self.connection_string, &credential),
            None => Ok(self.connection_string.clone()),
        }
    }
}

impl std::fmt::Debug for ConnectionSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionSettings")
            .field("name", &self.name)
            .field("connection_string", &"***")
            .field("provider_name", &self.provider_name)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("command_timeout_secs", &self.command_timeout_secs)
            .finish()
    }
}

/// Merge a credential into a connection string.
///
/// URL-shaped strings get the user info replaced; `key=value;` strings have any
/// existing credential keys dropped and `User ID`/`Password` appended.
pub fn merge_credential(connection_string: &str, credential: &Credential) -> FacadeResult<String> {
    if is_url(connection_string) {
        let mut url = Url::parse(connection_string)
            .map_err(|e| FacadeError::invalid_settings(format!("Invalid URL: {e}")))?;
        url.set_username(&credential.username)
            .map_err(|_| FacadeError::invalid_settings("URL cannot carry a username"))?;
        url.set_password(credential.password.as_deref())
            .map_err(|_| FacadeError::invalid_settings("URL cannot carry a password"))?;
        return Ok(url.to_string());
    }

    let mut segments: Vec<String> = split_segments(connection_string)
        .into_iter()
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .filter(|segment| {
            let key = segment.split('=').next().unwrap_or_default();
            !CREDENTIAL_KEYS.contains(&key.trim().to_lowercase().as_str())
        })
        .map(str::to_string)
        .collect();

    segments.push(format!("User ID={}", quote_value(&credential.username)));
    if let Some(password) = &credential.password {
        segments.push(format!("Password={}", quote_value(password)));
    }
    Ok(segments.join(";"))
}

/// A string is a URL only when its scheme comes before any `key=value` syntax.
fn is_url(connection_string: &str) -> bool {
    match (
        connection_string.find("://"),
        connection_string.find(['=', ';']),
    ) {
        (Some(scheme_end), Some(kv)) => scheme_end < kv,
        (Some(_), None) => true,
        (None, _) => false,
    }
}

/// Split a `key=value;` string on `;`, keeping quoted values intact.
///
/// A value that starts with `"` or `'` runs to the matching quote; a doubled
/// quote inside it is an escaped quote.
fn split_segments(connection_string: &str) -> Vec<&str> {
    let mut segments = Vec::new();
    let mut start = 0;
    let mut quote: Option<char> = None;
    let mut value_start = false;
    let mut chars = connection_string.char_indices().peekable();

    while let Some((idx, ch)) = chars.next() {
        match quote {
            Some(q) if ch == q => {
                if chars.peek().map(|&(_, next)| next) == Some(q) {
                    chars.next();
                } else {
                    quote = None;
                }
            }
            Some(_) => {}
            None => match ch {
                ';' => {
                    segments.push(&connection_string[start..idx]);
                    start = idx + 1;
                    value_start = false;
                }
                '=' => value_start = true,
                '"' | '\'' if value_start => {
                    quote = Some(ch);
                    value_start = false;
                }
                c if c.is_whitespace() => {}
                _ => value_start = false,
            },
        }
    }
    segments.push(&connection_string[start..]);
    segments
}

/// Quote a `key=value` value when it contains a separator or quote.
fn quote_value(value: &str) -> String {
    if value.contains([';', '"', '=']) || value.trim() != value {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
