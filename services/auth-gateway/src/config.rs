//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! The OAuth client secret and the credential signing key are loaded from
//! env vars (`OAUTH_CLIENT_SECRET`, `JWT_SECRET`) or from the files named in
//! the config, never stored in the TOML directly to avoid leaking secrets.

use common::Secret;
use pkce_flow::{
    AuthorizeEndpoint, CoordinatorSettings, HttpUpstreamConfig, IdentityPolicy, MAX_CREDENTIAL_TTL,
    MAX_STATE_TTL,
};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Env var holding the OAuth client secret
pub const CLIENT_SECRET_ENV: &str = "OAUTH_CLIENT_SECRET";

/// Env var holding the credential signing key
pub const SIGNING_KEY_ENV: &str = "JWT_SECRET";

/// Shortest accepted `state_ttl_secs`. Bindings are rejected a couple of
/// seconds before nominal expiry, so very short TTLs would be unusable.
const MIN_STATE_TTL_SECS: u64 = 30;

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub flow: FlowConfig,
    #[serde(default)]
    pub credential: CredentialConfig,
}

/// HTTP listener settings
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

/// Identity provider endpoints and client registration
#[derive(Debug, Deserialize)]
pub struct UpstreamConfig {
    pub authorize_url: String,
    pub token_url: String,
    #[serde(default)]
    pub userinfo_url: Option<String>,
    pub client_id: String,
    pub redirect_uri: String,
    #[serde(default)]
    pub scopes: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub identity: IdentityPolicy,
    /// Path to a file containing the client secret (alternative to the env var)
    #[serde(default)]
    pub client_secret_file: Option<PathBuf>,
    #[serde(skip)]
    pub client_secret: Option<Secret<String>>,
}

/// Login attempt timing
#[derive(Debug, Deserialize)]
pub struct FlowConfig {
    #[serde(default = "default_state_ttl")]
    pub state_ttl_secs: u64,
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            state_ttl_secs: default_state_ttl(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

/// Issued credential settings
#[derive(Debug, Deserialize)]
pub struct CredentialConfig {
    #[serde(default = "default_issuer")]
    pub issuer: String,
    #[serde(default = "default_credential_ttl")]
    pub ttl_secs: u64,
    /// Path to a file containing the signing key (alternative to the env var)
    #[serde(default)]
    pub signing_key_file: Option<PathBuf>,
    #[serde(skip)]
    pub signing_key: Option<Secret<String>>,
}

impl Default for CredentialConfig {
    fn default() -> Self {
        Self {
            issuer: default_issuer(),
            ttl_secs: default_credential_ttl(),
            signing_key_file: None,
            signing_key: None,
        }
    }
}

fn default_timeout() -> u64 {
    10
}

fn default_max_connections() -> usize {
    1000
}

fn default_state_ttl() -> u64 {
    300
}

fn default_sweep_interval() -> u64 {
    60
}

fn default_issuer() -> String {
    "pkce-auth-gateway".to_string()
}

fn default_credential_ttl() -> u64 {
    3600
}

impl Config {
    /// Load configuration from a TOML file, then overlay secrets from the
    /// environment.
    ///
    /// Secret resolution order for both the client secret and signing key:
    /// 1. env var
    /// 2. `*_file` path from config
    ///
    /// The signing key is mandatory; the client secret is optional (public
    /// clients rely on PKCE alone).
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;
        config.validate()?;

        config.upstream.client_secret =
            resolve_secret(CLIENT_SECRET_ENV, config.upstream.client_secret_file.as_deref())?;
        config.credential.signing_key =
            resolve_secret(SIGNING_KEY_ENV, config.credential.signing_key_file.as_deref())?;

        if config.credential.signing_key.is_none() {
            return Err(common::Error::MissingSecret(format!(
                "credential signing key: set {SIGNING_KEY_ENV} or credential.signing_key_file"
            )));
        }

        Ok(config)
    }

    fn validate(&self) -> common::Result<()> {
        let upstream = &self.upstream;
        require_http_url("authorize_url", &upstream.authorize_url)?;
        require_http_url("token_url", &upstream.token_url)?;
        require_http_url("redirect_uri", &upstream.redirect_uri)?;
        if let Some(url) = &upstream.userinfo_url {
            require_http_url("userinfo_url", url)?;
        }

        if upstream.identity == IdentityPolicy::Required && upstream.userinfo_url.is_none() {
            return Err(common::Error::Config(
                "identity = \"required\" needs upstream.userinfo_url".into(),
            ));
        }

        if upstream.timeout_secs == 0 {
            return Err(common::Error::Config(
                "timeout_secs must be greater than 0".into(),
            ));
        }

        if self.server.max_connections == 0 {
            return Err(common::Error::Config(
                "max_connections must be greater than 0".into(),
            ));
        }

        let max_state_ttl = MAX_STATE_TTL.as_secs();
        if !(MIN_STATE_TTL_SECS..=max_state_ttl).contains(&self.flow.state_ttl_secs) {
            return Err(common::Error::Config(format!(
                "state_ttl_secs must be between {MIN_STATE_TTL_SECS} and {max_state_ttl}, got: {}",
                self.flow.state_ttl_secs
            )));
        }

        if self.flow.sweep_interval_secs == 0 {
            return Err(common::Error::Config(
                "sweep_interval_secs must be greater than 0".into(),
            ));
        }

        let max_credential_ttl = MAX_CREDENTIAL_TTL.as_secs();
        if !(1..=max_credential_ttl).contains(&self.credential.ttl_secs) {
            return Err(common::Error::Config(format!(
                "credential ttl_secs must be between 1 and {max_credential_ttl}, got: {}",
                self.credential.ttl_secs
            )));
        }

        Ok(())
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("pkce-auth-gateway.toml")
    }

    pub fn authorize_endpoint(&self) -> AuthorizeEndpoint {
        AuthorizeEndpoint {
            authorize_url: self.upstream.authorize_url.clone(),
            client_id: self.upstream.client_id.clone(),
            redirect_uri: self.upstream.redirect_uri.clone(),
            scopes: self.upstream.scopes.clone(),
        }
    }

    pub fn http_upstream(&self) -> HttpUpstreamConfig {
        HttpUpstreamConfig {
            token_url: self.upstream.token_url.clone(),
            userinfo_url: self.upstream.userinfo_url.clone(),
            client_id: self.upstream.client_id.clone(),
            redirect_uri: self.upstream.redirect_uri.clone(),
            client_secret: self.upstream.client_secret.clone(),
        }
    }

    pub fn coordinator_settings(&self) -> CoordinatorSettings {
        CoordinatorSettings {
            state_ttl: Duration::from_secs(self.flow.state_ttl_secs),
            credential_ttl: self.credential_ttl(),
            upstream_timeout: self.upstream_timeout(),
            identity: self.upstream.identity,
        }
    }

    pub fn credential_ttl(&self) -> Duration {
        Duration::from_secs(self.credential.ttl_secs)
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream.timeout_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.flow.sweep_interval_secs)
    }
}

fn require_http_url(field: &str, value: &str) -> common::Result<()> {
    if value.starts_with("http://") || value.starts_with("https://") {
        Ok(())
    } else {
        Err(common::Error::Config(format!(
            "{field} must start with http:// or https://, got: {value}"
        )))
    }
}

/// Env var takes precedence over file. A file that is empty or whitespace
/// only yields no secret; a file that cannot be read is an error.
fn resolve_secret(env_var: &str, file: Option<&Path>) -> common::Result<Option<Secret<String>>> {
    if let Ok(value) = std::env::var(env_var) {
        if !value.is_empty() {
            return Ok(Some(Secret::new(value)));
        }
    }
    let Some(path) = file else {
        return Ok(None);
    };
    let contents = std::fs::read_to_string(path).map_err(|e| {
        common::Error::Config(format!("failed to read secret file {}: {e}", path.display()))
    })?;
    let value = contents.trim().to_owned();
    Ok((!value.is_empty()).then(|| Secret::new(value)))
}
