//! Session-based (`auth2`) provider.

use super::drive_api::DriveContentClient;
use super::loader::DependencyGate;
use super::{google_credentials, picker, FileProvider};
use crate::auth::{AccessToken, CredentialCache};
use crate::config::DriveIntakeConfig;
use crate::errors::{AuthError, DriveIntakeError, DriveIntakeResult};
use crate::host::{
    HostBindings, PickerSpec, PickerSurface, PickerView, SdkLibrary, SessionAuth, SessionConfig,
    SessionGrant,
};
use crate::transport::HttpTransport;
use crate::types::{DownloadedFile, FileDescriptor};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

/// Discovery document loaded into the legacy API client.
pub const DRIVE_DISCOVERY_DOC: &str = "https://www.googleapis.com/discovery/v1/apis/drive/v3/rest";

const REQUIRED_LIBRARIES: [SdkLibrary; 3] =
    [SdkLibrary::GoogleApi, SdkLibrary::Auth2, SdkLibrary::Picker];

/// Provider backed by the legacy session object.
///
/// Picker and download behave exactly like [`RealProvider`](super::RealProvider);
/// only initialization and authentication differ.
pub struct LegacyProvider {
    config: Arc<DriveIntakeConfig>,
    api_key: SecretString,
    client_id: String,
    gate: DependencyGate,
    session: Arc<dyn SessionAuth>,
    picker: Arc<dyn PickerSurface>,
    drive: DriveContentClient,
    cache: CredentialCache,
    initialized: OnceCell<()>,
}

impl LegacyProvider {
    /// Creates the provider, failing fast on missing credentials.
    pub fn new(
        config: Arc<DriveIntakeConfig>,
        host: &HostBindings,
        transport: Arc<dyn HttpTransport>,
    ) -> DriveIntakeResult<Self> {
        let (api_key, client_id) = google_credentials(&config)?;

        Ok(Self {
            gate: DependencyGate::new(host.loader()?, config.dependency_poll.clone()),
            session: host.session()?,
            picker: host.picker()?,
            drive: DriveContentClient::new(
                transport,
                config.drive_base_url.clone(),
                config.timeout,
            ),
            cache: CredentialCache::new(),
            initialized: OnceCell::new(),
            api_key,
            client_id,
            config,
        })
    }

    async fn session_token(&self) -> Result<AccessToken, AuthError> {
        if self.session.is_signed_in() {
            if let Some(grant) = self.session.current_grant() {
                let token = grant_token(grant);
                if !token.is_expired() {
                    debug!("Reusing existing session grant");
                    return Ok(token);
                }
            }
        }

        let grant = self.session.sign_in().await?;
        Ok(grant_token(grant))
    }
}

fn grant_token(grant: SessionGrant) -> AccessToken {
    let scopes = grant
        .scope
        .as_deref()
        .map(|s| s.split_whitespace().map(String::from).collect())
        .unwrap_or_default();
    AccessToken::new(
        grant.access_token.expose_secret().clone(),
        "Bearer",
        grant.expires_at,
        scopes,
    )
}

#[async_trait]
impl FileProvider for LegacyProvider {
    fn name(&self) -> &str {
        "legacy"
    }

    async fn init(&self) -> DriveIntakeResult<()> {
        self.initialized
            .get_or_try_init(|| async {
                self.gate.ensure(&REQUIRED_LIBRARIES).await?;

                self.session
                    .init(SessionConfig {
                        api_key: self.api_key.clone(),
                        client_id: self.client_id.clone(),
                        scope: self.config.scopes.join(" "),
                        discovery_docs: vec![DRIVE_DISCOVERY_DOC.to_string()],
                    })
                    .await
                    .map_err(|failure| {
                        warn!(code = %failure.code, "Session client initialization failed");
                        DriveIntakeError::configuration(format!(
                            "session client initialization failed: {}",
                            AuthError::from(failure)
                        ))
                    })?;

                info!(provider = "legacy", "Drive provider initialized");
                Ok::<(), DriveIntakeError>(())
            })
            .await?;

        Ok(())
    }

    async fn authenticate(&self) -> DriveIntakeResult<AccessToken> {
        self.init().await?;
        let token = self
            .cache
            .get_or_authenticate(|| self.session_token())
            .await?;
        Ok(token)
    }

    async fn is_authenticated(&self) -> bool {
        self.cache.current().await.is_some()
    }

    async fn open_file_picker(&self) -> DriveIntakeResult<Vec<FileDescriptor>> {
        let token = match self.authenticate().await {
            Ok(token) => token,
            Err(e) if e.is_cancellation() => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let spec = PickerSpec {
            views: vec![PickerView::Documents, PickerView::Images, PickerView::Videos],
            multiselect: true,
            oauth_token: token.token.clone(),
            developer_key: self.api_key.clone(),
            app_id: self.config.google_app_id.clone(),
        };

        picker::present(self.picker.as_ref(), spec).await
    }

    async fn download_file(&self, id: &str, name: &str) -> DriveIntakeResult<DownloadedFile> {
        let token = self.cache.require().await?;
        self.drive.download(&token, id, name).await
    }

    async fn file_metadata(&self, id: &str) -> DriveIntakeResult<FileDescriptor> {
        let token = self.cache.require().await?;
        self.drive.metadata(&token, id).await
    }

    async fn sign_out(&self) {
        self.cache.clear().await;
        self.session.sign_out().await;
        info!(provider = "legacy", "Signed out of Google Drive");
    }
}
