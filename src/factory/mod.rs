//! Provider selection.
//!
//! The strategy is resolved once from configuration and the resulting
//! [`ProviderHandle`] is the only thing the rest of the application sees.

use crate::auth::AccessToken;
use crate::config::DriveIntakeConfig;
use crate::errors::{DriveIntakeError, DriveIntakeResult};
use crate::host::HostBindings;
use crate::providers::{FileProvider, LegacyProvider, ManualProvider, MockProvider, RealProvider};
use crate::transport::{HttpTransport, ReqwestTransport};
use crate::types::{DownloadedFile, FileDescriptor};
use async_trait::async_trait;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, OnceLock};
use thiserror::Error;
use tracing::info;

static GLOBAL_HANDLE: OnceLock<ProviderHandle> = OnceLock::new();

/// Which provider implementation to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderStrategy {
    /// Token client + picker.
    Real,
    /// Session-based authorization + picker.
    Legacy,
    /// Fixed sample files.
    Mock,
    /// Manual fallback.
    Manual,
}

impl fmt::Display for ProviderStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProviderStrategy::Real => "real",
            ProviderStrategy::Legacy => "legacy",
            ProviderStrategy::Mock => "mock",
            ProviderStrategy::Manual => "manual",
        };
        f.write_str(name)
    }
}

/// Unrecognized provider strategy name.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown Drive provider {0:?}; expected real, legacy, mock or manual")]
pub struct UnknownStrategy(pub String);

impl FromStr for ProviderStrategy {
    type Err = UnknownStrategy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "real" => Ok(ProviderStrategy::Real),
            "legacy" => Ok(ProviderStrategy::Legacy),
            "mock" => Ok(ProviderStrategy::Mock),
            "manual" => Ok(ProviderStrategy::Manual),
            _ => Err(UnknownStrategy(s.to_string())),
        }
    }
}

/// Builds the provider chosen by configuration.
pub struct ProviderFactory {
    config: Arc<DriveIntakeConfig>,
    host: HostBindings,
    transport: Option<Arc<dyn HttpTransport>>,
}

impl ProviderFactory {
    /// Creates a factory with no host bindings and the default transport.
    pub fn new(config: Arc<DriveIntakeConfig>) -> Self {
        Self {
            config,
            host: HostBindings::default(),
            transport: None,
        }
    }

    /// Sets the host surfaces.
    pub fn with_host(mut self, host: HostBindings) -> Self {
        self.host = host;
        self
    }

    /// Sets the HTTP transport used for Drive requests.
    pub fn with_transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Builds a fresh handle.
    pub fn build(&self) -> DriveIntakeResult<ProviderHandle> {
        let strategy = self.config.resolved_strategy();

        let provider: Arc<dyn FileProvider> = match strategy {
            ProviderStrategy::Real => Arc::new(RealProvider::new(
                self.config.clone(),
                &self.host,
                self.transport()?,
            )?),
            ProviderStrategy::Legacy => Arc::new(LegacyProvider::new(
                self.config.clone(),
                &self.host,
                self.transport()?,
            )?),
            ProviderStrategy::Mock => Arc::new(MockProvider::new(self.config.mock_delay)),
            ProviderStrategy::Manual => Arc::new(ManualProvider::new(&self.host)?),
        };

        info!(strategy = %strategy, "Drive provider selected");
        Ok(ProviderHandle::new(provider))
    }

    /// Builds the process-wide handle, or returns the one already installed.
    ///
    /// The first successful install wins; later calls ignore this factory.
    pub fn install_global(&self) -> DriveIntakeResult<ProviderHandle> {
        if let Some(handle) = GLOBAL_HANDLE.get() {
            return Ok(handle.clone());
        }

        let handle = self.build()?;
        Ok(GLOBAL_HANDLE.get_or_init(|| handle).clone())
    }

    fn transport(&self) -> DriveIntakeResult<Arc<dyn HttpTransport>> {
        match &self.transport {
            Some(transport) => Ok(transport.clone()),
            None => {
                let transport = ReqwestTransport::from_config(&self.config)
                    .map_err(|e| DriveIntakeError::configuration(e.to_string()))?;
                Ok(Arc::new(transport))
            }
        }
    }
}

/// Shared handle to the active provider.
///
/// Each handle owns its provider and therefore its credential cache; tests
/// can build a fresh one per case.
#[derive(Clone)]
pub struct ProviderHandle {
    inner: Arc<dyn FileProvider>,
}

impl ProviderHandle {
    /// Wraps a provider.
    pub fn new(provider: Arc<dyn FileProvider>) -> Self {
        Self { inner: provider }
    }

    /// The handle installed by [`ProviderFactory::install_global`], if any.
    pub fn global() -> Option<ProviderHandle> {
        GLOBAL_HANDLE.get().cloned()
    }
}

impl fmt::Debug for ProviderHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderHandle")
            .field("provider", &self.inner.name())
            .finish()
    }
}

#[async_trait]
impl FileProvider for ProviderHandle {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn init(&self) -> DriveIntakeResult<()> {
        self.inner.init().await
    }

    async fn authenticate(&self) -> DriveIntakeResult<AccessToken> {
        self.inner.authenticate().await
    }

    async fn is_authenticated(&self) -> bool {
        self.inner.is_authenticated().await
    }

    async fn open_file_picker(&self) -> DriveIntakeResult<Vec<FileDescriptor>> {
        self.inner.open_file_picker().await
    }

    async fn download_file(&self, id: &str, name: &str) -> DriveIntakeResult<DownloadedFile> {
        self.inner.download_file(id, name).await
    }

    async fn file_metadata(&self, id: &str) -> DriveIntakeResult<FileDescriptor> {
        self.inner.file_metadata(id).await
    }

    async fn sign_out(&self) {
        self.inner.sign_out().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ConfigurationError;
    use crate::mocks::{MockHttpTransport, RecordingLoader, ScriptedPicker, ScriptedTokenClient};
    use std::time::Duration;

    fn base() -> crate::config::DriveIntakeConfigBuilder {
        DriveIntakeConfig::builder()
            .backend_base_url("https://api.example.com")
            .mock_delay(Duration::ZERO)
    }

    fn interactive_host(loader: Arc<RecordingLoader>) -> HostBindings {
        HostBindings::new()
            .with_loader(loader)
            .with_token_client(Arc::new(ScriptedTokenClient::granting("t")))
            .with_picker(Arc::new(ScriptedPicker::new()))
    }

    #[test]
    fn test_strategy_parsing() {
        assert_eq!("Legacy".parse::<ProviderStrategy>(), Ok(ProviderStrategy::Legacy));
        assert_eq!(" mock ".parse::<ProviderStrategy>(), Ok(ProviderStrategy::Mock));
        let err = "picker".parse::<ProviderStrategy>().unwrap_err();
        assert!(err.to_string().contains("expected real, legacy, mock or manual"));
        assert_eq!(ProviderStrategy::Manual.to_string(), "manual");
    }

    #[test]
    fn test_mock_override_wins_in_production() {
        let config = Arc::new(base().mock_mode(true).build().unwrap());
        let handle = ProviderFactory::new(config).build().unwrap();
        assert_eq!(handle.name(), "mock");
    }

    #[test]
    fn test_development_falls_back_to_mock() {
        let config = Arc::new(base().development(true).build().unwrap());
        let handle = ProviderFactory::new(config).build().unwrap();
        assert_eq!(handle.name(), "mock");
    }

    #[test]
    fn test_real_without_credentials_fails_before_loading() {
        let loader = Arc::new(RecordingLoader::ready());
        let config = Arc::new(base().build().unwrap());

        let err = ProviderFactory::new(config)
            .with_host(interactive_host(loader.clone()))
            .with_transport(Arc::new(MockHttpTransport::new()))
            .build()
            .unwrap_err();

        assert!(matches!(
            err,
            DriveIntakeError::Configuration(ConfigurationError::MissingCredentials(_))
        ));
        assert_eq!(loader.total_inserts(), 0);
    }

    #[test]
    fn test_real_with_credentials() {
        let config = Arc::new(
            base()
                .google_api_key("key")
                .google_client_id("client")
                .build()
                .unwrap(),
        );

        let handle = ProviderFactory::new(config)
            .with_host(interactive_host(Arc::new(RecordingLoader::ready())))
            .with_transport(Arc::new(MockHttpTransport::new()))
            .build()
            .unwrap();
        assert_eq!(handle.name(), "real");
    }

    #[test]
    fn test_missing_host_binding() {
        let config = Arc::new(base().strategy(ProviderStrategy::Manual).build().unwrap());

        let err = ProviderFactory::new(config).build().unwrap_err();
        assert!(matches!(
            err,
            DriveIntakeError::Configuration(ConfigurationError::MissingHostBinding(name)) if name == "user prompt"
        ));
    }

    #[tokio::test]
    async fn test_global_handle_is_frozen() {
        let mock = Arc::new(base().mock_mode(true).build().unwrap());
        let first = ProviderFactory::new(mock).install_global().unwrap();

        let manual = Arc::new(base().strategy(ProviderStrategy::Manual).build().unwrap());
        let second = ProviderFactory::new(manual).install_global().unwrap();

        assert_eq!(first.name(), "mock");
        assert_eq!(second.name(), "mock");
        assert_eq!(ProviderHandle::global().unwrap().name(), "mock");

        first.authenticate().await.unwrap();
        assert!(second.is_authenticated().await);
    }
}
