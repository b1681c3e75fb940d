//! Configuration for Drive file acquisition.

use crate::errors::{ConfigurationError, DriveIntakeError, DriveIntakeResult};
use crate::factory::ProviderStrategy;
use secrecy::SecretString;
use std::time::Duration;
use url::Url;

/// OAuth 2.0 scopes used by the providers.
pub mod scopes {
    /// Read-only access to file metadata and content.
    pub const DRIVE_READONLY: &str = "https://www.googleapis.com/auth/drive.readonly";

    /// Access to files opened or created with the app.
    pub const DRIVE_FILE: &str = "https://www.googleapis.com/auth/drive.file";
}

/// Environment variable names read by [`DriveIntakeConfigBuilder::from_env`].
pub mod env {
    /// Google API (developer) key.
    pub const GOOGLE_API_KEY: &str = "GOOGLE_API_KEY";
    /// Google OAuth client ID.
    pub const GOOGLE_CLIENT_ID: &str = "GOOGLE_CLIENT_ID";
    /// Google Cloud project number used as the picker app id.
    pub const GOOGLE_APP_ID: &str = "GOOGLE_APP_ID";
    /// Backend base URL.
    pub const API_BASE_URL: &str = "API_BASE_URL";
    /// Backend bearer token.
    pub const API_TOKEN: &str = "API_TOKEN";
    /// Explicit mock-mode override.
    pub const USE_MOCK_DRIVE: &str = "USE_MOCK_DRIVE";
    /// Explicit provider strategy.
    pub const DRIVE_PROVIDER: &str = "DRIVE_PROVIDER";
    /// Application mode (`development` enables the mock provider by default).
    pub const APP_ENV: &str = "APP_ENV";
}

/// Default Drive REST endpoint.
pub const DEFAULT_DRIVE_BASE_URL: &str = "https://www.googleapis.com/drive/v3/";

/// Default source tag attached to uploads.
pub const DEFAULT_SOURCE_TAG: &str = "google_drive";

/// Bounded polling for external SDK readiness.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PollConfig {
    /// Maximum readiness checks before failing.
    pub max_attempts: u32,

    /// Delay between checks.
    pub interval: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            max_attempts: 100,
            interval: Duration::from_millis(100),
        }
    }
}

/// Configuration for the Drive intake subsystem.
#[derive(Clone)]
pub struct DriveIntakeConfig {
    /// Google API key used by the picker.
    pub google_api_key: Option<SecretString>,

    /// Google OAuth client ID.
    pub google_client_id: Option<String>,

    /// Google Cloud project number passed to the picker.
    pub google_app_id: Option<String>,

    /// Base URL of the application backend.
    pub backend_base_url: Url,

    /// Bearer token for the backend.
    pub backend_token: Option<SecretString>,

    /// Explicit mock-mode override.
    pub mock_mode: Option<bool>,

    /// Whether this is a development build.
    pub development: bool,

    /// Explicit provider strategy, overriding both flags above.
    pub strategy: Option<ProviderStrategy>,

    /// Drive REST endpoint.
    pub drive_base_url: Url,

    /// OAuth scopes requested during consent.
    pub scopes: Vec<String>,

    /// Polling window for SDK readiness.
    pub dependency_poll: PollConfig,

    /// Artificial delay of the mock picker.
    pub mock_delay: Duration,

    /// Request timeout.
    pub timeout: Duration,

    /// Connection timeout.
    pub connect_timeout: Duration,

    /// User agent string.
    pub user_agent: String,

    /// Source tag sent with every upload.
    pub source_tag: String,
}

impl std::fmt::Debug for DriveIntakeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriveIntakeConfig")
            .field("google_api_key", &self.google_api_key.as_ref().map(|_| "[REDACTED]"))
            .field("google_client_id", &self.google_client_id)
            .field("google_app_id", &self.google_app_id)
            .field("backend_base_url", &self.backend_base_url.as_str())
            .field("mock_mode", &self.mock_mode)
            .field("development", &self.development)
            .field("strategy", &self.strategy)
            .field("drive_base_url", &self.drive_base_url.as_str())
            .finish_non_exhaustive()
    }
}

impl DriveIntakeConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> DriveIntakeConfigBuilder {
        DriveIntakeConfigBuilder::new()
    }

    /// Creates a configuration from environment variables.
    pub fn from_env() -> DriveIntakeResult<Self> {
        DriveIntakeConfigBuilder::new().from_env().build()
    }

    /// Provider strategy implied by this configuration.
    ///
    /// An explicit strategy wins, then the mock override, then the
    /// development flag.
    pub fn resolved_strategy(&self) -> ProviderStrategy {
        if let Some(strategy) = self.strategy {
            return strategy;
        }
        if self.mock_mode.unwrap_or(self.development) {
            ProviderStrategy::Mock
        } else {
            ProviderStrategy::Real
        }
    }

    /// URL of the backend upload endpoint.
    pub fn upload_url(&self) -> DriveIntakeResult<Url> {
        join_path(&self.backend_base_url, "files/upload")
    }

    /// Validates the configuration.
    pub fn validate(&self) -> DriveIntakeResult<()> {
        if self.dependency_poll.max_attempts == 0 {
            return Err(DriveIntakeError::configuration(
                "dependency poll must allow at least one attempt",
            ));
        }

        for (label, url) in [
            ("backend base URL", &self.backend_base_url),
            ("Drive base URL", &self.drive_base_url),
        ] {
            if url.cannot_be_a_base() {
                return Err(DriveIntakeError::configuration(format!(
                    "{} cannot be used as a base: {}",
                    label, url
                )));
            }
        }

        Ok(())
    }
}

fn join_path(base: &Url, path: &str) -> DriveIntakeResult<Url> {
    let mut base = base.clone();
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base.join(path)
        .map_err(|e| DriveIntakeError::configuration(format!("Invalid URL: {}", e)))
}

/// Builder for DriveIntakeConfig.
pub struct DriveIntakeConfigBuilder {
    google_api_key: Option<SecretString>,
    google_client_id: Option<String>,
    google_app_id: Option<String>,
    backend_base_url: Option<String>,
    backend_token: Option<SecretString>,
    mock_mode: Option<bool>,
    development: Option<bool>,
    strategy: Option<ProviderStrategy>,
    drive_base_url: Option<String>,
    scopes: Vec<String>,
    dependency_poll: PollConfig,
    mock_delay: Duration,
    timeout: Duration,
    connect_timeout: Duration,
    user_agent: Option<String>,
    source_tag: String,
    env_error: Option<String>,
}

impl DriveIntakeConfigBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self {
            google_api_key: None,
            google_client_id: None,
            google_app_id: None,
            backend_base_url: None,
            backend_token: None,
            mock_mode: None,
            development: None,
            strategy: None,
            drive_base_url: None,
            scopes: vec![scopes::DRIVE_READONLY.to_string()],
            dependency_poll: PollConfig::default(),
            mock_delay: Duration::from_secs(1),
            timeout: Duration::from_secs(300),
            connect_timeout: Duration::from_secs(30),
            user_agent: None,
            source_tag: DEFAULT_SOURCE_TAG.to_string(),
            env_error: None,
        }
    }

    /// Sets the Google API key.
    pub fn google_api_key(mut self, key: impl Into<String>) -> Self {
        self.google_api_key = Some(SecretString::new(key.into()));
        self
    }

    /// Sets the Google OAuth client ID.
    pub fn google_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.google_client_id = Some(client_id.into());
        self
    }

    /// Sets the picker app id.
    pub fn google_app_id(mut self, app_id: impl Into<String>) -> Self {
        self.google_app_id = Some(app_id.into());
        self
    }

    /// Sets the backend base URL.
    pub fn backend_base_url(mut self, url: impl Into<String>) -> Self {
        self.backend_base_url = Some(url.into());
        self
    }

    /// Sets the backend bearer token.
    pub fn backend_token(mut self, token: impl Into<String>) -> Self {
        self.backend_token = Some(SecretString::new(token.into()));
        self
    }

    /// Forces mock mode on or off.
    pub fn mock_mode(mut self, enabled: bool) -> Self {
        self.mock_mode = Some(enabled);
        self
    }

    /// Marks the build as a development build.
    pub fn development(mut self, development: bool) -> Self {
        self.development = Some(development);
        self
    }

    /// Selects a provider strategy explicitly.
    pub fn strategy(mut self, strategy: ProviderStrategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    /// Sets the Drive REST endpoint.
    pub fn drive_base_url(mut self, url: impl Into<String>) -> Self {
        self.drive_base_url = Some(url.into());
        self
    }

    /// Replaces the requested OAuth scopes.
    pub fn scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    /// Sets the SDK readiness polling window.
    pub fn dependency_poll(mut self, poll: PollConfig) -> Self {
        self.dependency_poll = poll;
        self
    }

    /// Sets the mock picker delay.
    pub fn mock_delay(mut self, delay: Duration) -> Self {
        self.mock_delay = delay;
        self
    }

    /// Sets the request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the connection timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the user agent string.
    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = Some(ua.into());
        self
    }

    /// Sets the upload source tag.
    pub fn source_tag(mut self, tag: impl Into<String>) -> Self {
        self.source_tag = tag.into();
        self
    }

    /// Fills unset fields from environment variables.
    pub fn from_env(self) -> Self {
        self.from_lookup(|key| std::env::var(key).ok())
    }

    /// Fills unset fields from an arbitrary key lookup.
    pub fn from_lookup<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if self.google_api_key.is_none() {
            self.google_api_key = get(env::GOOGLE_API_KEY).map(SecretString::new);
        }
        if self.google_client_id.is_none() {
            self.google_client_id = get(env::GOOGLE_CLIENT_ID);
        }
        if self.google_app_id.is_none() {
            self.google_app_id = get(env::GOOGLE_APP_ID);
        }
        if self.backend_base_url.is_none() {
            self.backend_base_url = get(env::API_BASE_URL);
        }
        if self.backend_token.is_none() {
            self.backend_token = get(env::API_TOKEN).map(SecretString::new);
        }
        if self.mock_mode.is_none() {
            if let Some(raw) = get(env::USE_MOCK_DRIVE) {
                match parse_flag(&raw) {
                    Some(flag) => self.mock_mode = Some(flag),
                    None => {
                        self.env_error =
                            Some(format!("{} must be a boolean, got {:?}", env::USE_MOCK_DRIVE, raw))
                    }
                }
            }
        }
        if self.strategy.is_none() {
            if let Some(raw) = get(env::DRIVE_PROVIDER) {
                match raw.parse::<ProviderStrategy>() {
                    Ok(strategy) => self.strategy = Some(strategy),
                    Err(e) => self.env_error = Some(e.to_string()),
                }
            }
        }
        if self.development.is_none() {
            self.development = get(env::APP_ENV).map(|mode| {
                matches!(mode.trim().to_ascii_lowercase().as_str(), "development" | "dev")
            });
        }

        self
    }

    /// Builds the configuration.
    pub fn build(self) -> DriveIntakeResult<DriveIntakeConfig> {
        if let Some(message) = self.env_error {
            return Err(DriveIntakeError::Configuration(
                ConfigurationError::InvalidConfiguration(message),
            ));
        }

        let backend_base_url = self.backend_base_url.ok_or_else(|| {
            DriveIntakeError::configuration(format!(
                "backend base URL is required (set {})",
                env::API_BASE_URL
            ))
        })?;
        let backend_base_url = parse_url("backend base URL", &backend_base_url)?;

        let drive_base_url = parse_url(
            "Drive base URL",
            self.drive_base_url.as_deref().unwrap_or(DEFAULT_DRIVE_BASE_URL),
        )?;

        let user_agent = self
            .user_agent
            .unwrap_or_else(|| format!("integrations-drive-intake/{}", env!("CARGO_PKG_VERSION")));

        let config = DriveIntakeConfig {
            google_api_key: self.google_api_key,
            google_client_id: self.google_client_id,
            google_app_id: self.google_app_id,
            backend_base_url,
            backend_token: self.backend_token,
            mock_mode: self.mock_mode,
            development: self.development.unwrap_or(false),
            strategy: self.strategy,
            drive_base_url,
            scopes: self.scopes,
            dependency_poll: self.dependency_poll,
            mock_delay: self.mock_delay,
            timeout: self.timeout,
            connect_timeout: self.connect_timeout,
            user_agent,
            source_tag: self.source_tag,
        };

        config.validate()?;

        Ok(config)
    }
}

impl Default for DriveIntakeConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_url(label: &str, raw: &str) -> DriveIntakeResult<Url> {
    Url::parse(raw).map_err(|e| {
        DriveIntakeError::configuration(format!("invalid {} {:?}: {}", label, raw, e))
    })
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
