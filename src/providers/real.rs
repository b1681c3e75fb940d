//! Token client + picker provider.

use super::drive_api::DriveContentClient;
use super::loader::DependencyGate;
use super::{google_credentials, picker, FileProvider};
use crate::auth::{AccessToken, CredentialCache};
use crate::callback::once_callback;
use crate::config::DriveIntakeConfig;
use crate::errors::{AuthError, DriveIntakeError, DriveIntakeResult};
use crate::host::{
    ConsentPrompt, HostBindings, PickerSpec, PickerSurface, PickerView, SdkLibrary, TokenClient,
    TokenClientConfig, TokenRequest,
};
use crate::transport::HttpTransport;
use crate::types::{DownloadedFile, FileDescriptor};
use async_trait::async_trait;
use secrecy::SecretString;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

const REQUIRED_LIBRARIES: [SdkLibrary; 3] = [
    SdkLibrary::GoogleIdentity,
    SdkLibrary::GoogleApi,
    SdkLibrary::Picker,
];

/// Provider backed by the OAuth token client and the Google Picker.
pub struct RealProvider {
    config: Arc<DriveIntakeConfig>,
    api_key: SecretString,
    client_id: String,
    gate: DependencyGate,
    token_client: Arc<dyn TokenClient>,
    picker: Arc<dyn PickerSurface>,
    drive: DriveContentClient,
    cache: CredentialCache,
    initialized: OnceCell<()>,
}

impl RealProvider {
    /// Creates the provider.
    ///
    /// Fails with a configuration error when the API key or client ID is
    /// missing, before any library is loaded.
    pub fn new(
        config: Arc<DriveIntakeConfig>,
        host: &HostBindings,
        transport: Arc<dyn HttpTransport>,
    ) -> DriveIntakeResult<Self> {
        let (api_key, client_id) = google_credentials(&config)?;

        let gate = DependencyGate::new(host.loader()?, config.dependency_poll.clone());
        let drive = DriveContentClient::new(
            transport,
            config.drive_base_url.clone(),
            config.timeout,
        );

        Ok(Self {
            api_key,
            client_id,
            gate,
            token_client: host.token_client()?,
            picker: host.picker()?,
            drive,
            cache: CredentialCache::new(),
            initialized: OnceCell::new(),
            config,
        })
    }

    async fn request_token(&self, prompt: ConsentPrompt) -> Result<AccessToken, AuthError> {
        let (callback, pending) = once_callback();

        debug!(prompt = ?prompt, "Requesting access token");
        self.token_client
            .request_access_token(TokenRequest { prompt }, callback)
            .map_err(AuthError::Provider)?;

        let response = pending.wait().await.ok_or(AuthError::Cancelled)?;

        if let Some(code) = response.error.as_deref() {
            warn!(code = %code, "Token request failed");
            return Err(AuthError::from_host_code(
                code,
                response.error_description.as_deref(),
            ));
        }

        let token = response
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AuthError::Provider("token response carried no access token".to_string()))?;

        Ok(AccessToken::bearer(
            token,
            response.expires_in,
            response.scope.as_deref(),
        ))
    }
}

#[async_trait]
impl FileProvider for RealProvider {
    fn name(&self) -> &str {
        "real"
    }

    async fn init(&self) -> DriveIntakeResult<()> {
        self.initialized
            .get_or_try_init(|| async {
                self.gate.ensure(&REQUIRED_LIBRARIES).await?;

                self.token_client
                    .configure(TokenClientConfig {
                        client_id: self.client_id.clone(),
                        scope: self.config.scopes.join(" "),
                    })
                    .map_err(|e| {
                        warn!(error = %e, "Token client configuration failed");
                        DriveIntakeError::configuration(format!(
                            "token client configuration failed: {}",
                            e
                        ))
                    })?;

                info!(provider = "real", "Drive provider initialized");
                Ok::<(), DriveIntakeError>(())
            })
            .await?;

        Ok(())
    }

    async fn authenticate(&self) -> DriveIntakeResult<AccessToken> {
        self.init().await?;

        // A lapsed credential means consent was already granted once.
        let prompt = if self.cache.has_token().await {
            ConsentPrompt::None
        } else {
            ConsentPrompt::Consent
        };

        let token = self
            .cache
            .get_or_authenticate(|| self.request_token(prompt))
            .await?;

        Ok(token)
    }

    async fn is_authenticated(&self) -> bool {
        self.cache.current().await.is_some()
    }

    async fn open_file_picker(&self) -> DriveIntakeResult<Vec<FileDescriptor>> {
        let token = match self.authenticate().await {
            Ok(token) => token,
            Err(e) if e.is_cancellation() => {
                info!("Consent cancelled, nothing selected");
                return Ok(Vec::new());
            }
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
        if let Some(token) = self.cache.clear().await {
            self.token_client.revoke(&token.token);
            info!(provider = "real", "Signed out of Google Drive");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PollConfig;
    use crate::errors::{ConfigurationError, DependencyLoadError};
    use crate::host::{PickerDocument, TokenResponse};
    use crate::mocks::{
        MockHttpTransport, PickerScript, RecordingLoader, ScriptedPicker, ScriptedTokenClient,
        TokenScript,
    };
    use secrecy::ExposeSecret;
    use std::time::Duration;

    struct Fixture {
        loader: Arc<RecordingLoader>,
        tokens: Arc<ScriptedTokenClient>,
        picker: Arc<ScriptedPicker>,
        transport: Arc<MockHttpTransport>,
        provider: RealProvider,
    }

    fn config() -> Arc<DriveIntakeConfig> {
        Arc::new(
            DriveIntakeConfig::builder()
                .backend_base_url("https://api.example.com")
                .google_api_key("api-key")
                .google_client_id("client-id")
                .google_app_id("123456")
                .dependency_poll(PollConfig {
                    max_attempts: 3,
                    interval: Duration::from_millis(1),
                })
                .build()
                .unwrap(),
        )
    }

    fn fixture_with(loader: RecordingLoader, picker: ScriptedPicker) -> Fixture {
        let loader = Arc::new(loader);
        let tokens = Arc::new(ScriptedTokenClient::granting("real-token"));
        let picker = Arc::new(picker);
        let transport = Arc::new(MockHttpTransport::new());
        let host = HostBindings::new()
            .with_loader(loader.clone())
            .with_token_client(tokens.clone())
            .with_picker(picker.clone());
        let provider = RealProvider::new(config(), &host, transport.clone()).unwrap();

        Fixture {
            loader,
            tokens,
            picker,
            transport,
            provider,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(RecordingLoader::ready(), ScriptedPicker::new())
    }

    fn doc(id: &str) -> PickerDocument {
        PickerDocument {
            id: id.to_string(),
            name: format!("{}.pdf", id),
            mime_type: "application/pdf".to_string(),
            size_bytes: Some(100),
            ..Default::default()
        }
    }

    #[test]
    fn test_missing_credentials_fail_before_loading() {
        let loader = Arc::new(RecordingLoader::ready());
        let host = HostBindings::new()
            .with_loader(loader.clone())
            .with_token_client(Arc::new(ScriptedTokenClient::granting("t")))
            .with_picker(Arc::new(ScriptedPicker::new()));
        let config = Arc::new(
            DriveIntakeConfig::builder()
                .backend_base_url("https://api.example.com")
                .google_client_id("client-id")
                .build()
                .unwrap(),
        );

        let result = RealProvider::new(config, &host, Arc::new(MockHttpTransport::new()));
        assert!(matches!(
            result,
            Err(DriveIntakeError::Configuration(ConfigurationError::MissingCredentials(_)))
        ));
        assert_eq!(loader.total_inserts(), 0);
    }

    #[tokio::test]
    async fn test_init_is_idempotent() {
        let f = fixture();

        f.provider.init().await.unwrap();
        f.provider.init().await.unwrap();

        assert_eq!(f.tokens.configure_count(), 1);
        assert_eq!(f.loader.insert_count(SdkLibrary::GoogleIdentity), 1);
        assert_eq!(f.loader.insert_count(SdkLibrary::Picker), 1);
        let configured = f.tokens.last_config().unwrap();
        assert_eq!(configured.client_id, "client-id");
    }

    #[tokio::test]
    async fn test_init_times_out() {
        let f = fixture_with(RecordingLoader::never_ready(), ScriptedPicker::new());

        let err = f.provider.init().await.unwrap_err();
        assert!(matches!(
            err,
            DriveIntakeError::DependencyLoad(DependencyLoadError::TimedOut { attempts: 3, .. })
        ));
        assert_eq!(f.tokens.configure_count(), 0);
    }

    #[tokio::test]
    async fn test_token_client_configuration_failure() {
        let loader = Arc::new(RecordingLoader::ready());
        let tokens = Arc::new(ScriptedTokenClient::granting("t").failing_configure("bad client"));
        let host = HostBindings::new()
            .with_loader(loader)
            .with_token_client(tokens.clone())
            .with_picker(Arc::new(ScriptedPicker::new()));
        let provider =
            RealProvider::new(config(), &host, Arc::new(MockHttpTransport::new())).unwrap();

        let err = provider.init().await.unwrap_err();

        assert!(matches!(
            err,
            DriveIntakeError::Configuration(ConfigurationError::InvalidConfiguration(ref m))
                if m.contains("bad client")
        ));
        assert!(!err.is_recoverable());
        assert_eq!(tokens.request_count(), 0);
    }

    #[tokio::test]
    async fn test_authenticate_caches_token() {
        let f = fixture();

        let first = f.provider.authenticate().await.unwrap();
        let second = f.provider.authenticate().await.unwrap();

        assert_eq!(first.token.expose_secret(), "real-token");
        assert_eq!(second.token.expose_secret(), "real-token");
        assert_eq!(f.tokens.request_count(), 1);
        assert_eq!(f.tokens.prompts(), vec![ConsentPrompt::Consent]);
        assert!(f.provider.is_authenticated().await);
    }

    #[tokio::test]
    async fn test_concurrent_authenticate_prompts_once() {
        let f = fixture();

        let (a, b) = tokio::join!(f.provider.authenticate(), f.provider.authenticate());

        assert!(a.is_ok() && b.is_ok());
        assert_eq!(f.tokens.request_count(), 1);
    }

    #[tokio::test]
    async fn test_second_callback_ignored() {
        let f = fixture();
        f.tokens.queue(TokenScript::RespondTwice(
            TokenResponse::granted("first", 3600),
            TokenResponse::granted("second", 3600),
        ));

        let token = f.provider.authenticate().await.unwrap();
        assert_eq!(token.token.expose_secret(), "first");
    }

    #[tokio::test]
    async fn test_denied_consent() {
        let f = fixture();
        f.tokens.queue(TokenScript::Respond(TokenResponse::failed("access_denied")));

        let err = f.provider.authenticate().await.unwrap_err();
        assert!(matches!(err, DriveIntakeError::Auth(AuthError::Denied(_))));
        assert!(!f.provider.is_authenticated().await);
    }

    #[tokio::test]
    async fn test_picker_returns_selection() {
        let f = fixture_with(
            RecordingLoader::ready(),
            ScriptedPicker::picking(vec![doc("a"), doc("b")]),
        );

        let files = f.provider.open_file_picker().await.unwrap();
        let ids: Vec<_> = files.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);

        let spec = f.picker.last_spec().unwrap();
        assert!(spec.multiselect);
        assert_eq!(spec.views.len(), 3);
        assert_eq!(spec.oauth_token.expose_secret(), "real-token");
        assert_eq!(spec.developer_key.expose_secret(), "api-key");
        assert_eq!(spec.app_id.as_deref(), Some("123456"));
    }

    #[tokio::test]
    async fn test_picker_cancel_and_vanish_are_empty() {
        let picker = ScriptedPicker::new();
        picker.queue(PickerScript::cancel());
        picker.queue(PickerScript::Vanish);
        let f = fixture_with(RecordingLoader::ready(), picker);

        assert!(f.provider.open_file_picker().await.unwrap().is_empty());
        assert!(f.provider.open_file_picker().await.unwrap().is_empty());
        assert_eq!(f.picker.show_count(), 2);
    }

    #[tokio::test]
    async fn test_consent_closed_yields_empty_selection() {
        let f = fixture();
        f.tokens.queue(TokenScript::Respond(TokenResponse::failed("popup_closed")));

        assert!(f.provider.open_file_picker().await.unwrap().is_empty());
        assert_eq!(f.picker.show_count(), 0);
    }

    #[tokio::test]
    async fn test_picker_construction_failure() {
        let picker = ScriptedPicker::new();
        picker.queue(PickerScript::Fail("developer key rejected".to_string()));
        let f = fixture_with(RecordingLoader::ready(), picker);

        let err = f.provider.open_file_picker().await.unwrap_err();
        assert!(matches!(err, DriveIntakeError::Picker(_)));
    }

    #[tokio::test]
    async fn test_download_requires_credential() {
        let f = fixture();

        let err = f.provider.download_file("a", "a.pdf").await.unwrap_err();
        assert!(err.is_auth_expired());
        f.transport.verify_request_count(0);
    }

    #[tokio::test]
    async fn test_download_after_authenticate() {
        let f = fixture();
        f.transport
            .enqueue_bytes(200, "application/pdf", b"%PDF-1.7".to_vec());

        f.provider.authenticate().await.unwrap();
        let file = f.provider.download_file("a", "a.pdf").await.unwrap();

        assert_eq!(file.name, "a.pdf");
        assert_eq!(file.mime_type, "application/pdf");
        f.transport.verify_header(0, "authorization", "Bearer real-token");
    }

    #[tokio::test]
    async fn test_sign_out_revokes_and_reprompts() {
        let f = fixture();

        f.provider.authenticate().await.unwrap();
        f.provider.sign_out().await;
        assert!(!f.provider.is_authenticated().await);
        assert_eq!(f.tokens.revoke_count(), 1);

        f.provider.authenticate().await.unwrap();
        assert_eq!(
            f.tokens.prompts(),
            vec![ConsentPrompt::Consent, ConsentPrompt::Consent]
        );
    }
}
