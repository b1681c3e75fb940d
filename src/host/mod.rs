//! Host SDK surfaces consumed by the providers.
//!
//! The interactive parts of the Drive flow (script loading, the OAuth token
//! client, the picker dialog, the legacy session object, plain user prompts)
//! belong to whatever embeds this crate. Each is modelled as a trait so a
//! browser binding, a desktop shell or a test double can supply it.

use crate::callback::OnceCallback;
use crate::errors::{AuthError, ConfigurationError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::SecretString;
use std::sync::Arc;
use url::Url;

/// External libraries a provider may need before it can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SdkLibrary {
    /// Google Identity Services (token client).
    GoogleIdentity,
    /// Google API loader.
    GoogleApi,
    /// Picker module, loaded through the API loader.
    Picker,
    /// Legacy `auth2` session module, loaded through the API loader.
    Auth2,
}

impl SdkLibrary {
    /// Script URL or loader module name for the library.
    pub fn source(&self) -> &'static str {
        match self {
            SdkLibrary::GoogleIdentity => "https://accounts.google.com/gsi/client",
            SdkLibrary::GoogleApi => "https://apis.google.com/js/api.js",
            SdkLibrary::Picker => "picker",
            SdkLibrary::Auth2 => "client:auth2",
        }
    }
}

impl std::fmt::Display for SdkLibrary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SdkLibrary::GoogleIdentity => "Google Identity Services",
            SdkLibrary::GoogleApi => "Google API loader",
            SdkLibrary::Picker => "Google Picker",
            SdkLibrary::Auth2 => "Google auth2",
        };
        f.write_str(name)
    }
}

/// Loads external libraries into the host.
pub trait SdkLoader: Send + Sync {
    /// Whether the library is loaded and usable.
    fn is_ready(&self, library: SdkLibrary) -> bool;

    /// Starts loading the library. Completion is observed through `is_ready`.
    fn insert(&self, library: SdkLibrary) -> Result<(), String>;
}

/// One-time token client configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenClientConfig {
    /// OAuth client ID.
    pub client_id: String,
    /// Space-separated scopes.
    pub scope: String,
}

/// Consent prompt behaviour for a token request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsentPrompt {
    /// Always show the consent screen.
    Consent,
    /// Let the identity provider skip the prompt when it can.
    None,
}

/// Token request passed to the host token client.
#[derive(Debug, Clone)]
pub struct TokenRequest {
    /// Prompt mode.
    pub prompt: ConsentPrompt,
}

/// Raw token client response.
#[derive(Debug, Clone, Default)]
pub struct TokenResponse {
    /// Access token on success.
    pub access_token: Option<String>,
    /// Lifetime in seconds.
    pub expires_in: Option<i64>,
    /// Granted scopes.
    pub scope: Option<String>,
    /// Error code on failure.
    pub error: Option<String>,
    /// Error description on failure.
    pub error_description: Option<String>,
}

impl TokenResponse {
    /// Successful response.
    pub fn granted(access_token: impl Into<String>, expires_in: i64) -> Self {
        Self {
            access_token: Some(access_token.into()),
            expires_in: Some(expires_in),
            ..Default::default()
        }
    }

    /// Failed response.
    pub fn failed(code: impl Into<String>) -> Self {
        Self {
            error: Some(code.into()),
            ..Default::default()
        }
    }
}

/// OAuth token client (Google Identity Services).
pub trait TokenClient: Send + Sync {
    /// Configures the client. Called once per provider.
    fn configure(&self, config: TokenClientConfig) -> Result<(), String>;

    /// Starts the consent flow. The outcome arrives through `callback`.
    fn request_access_token(
        &self,
        request: TokenRequest,
        callback: OnceCallback<TokenResponse>,
    ) -> Result<(), String>;

    /// Revokes a token.
    fn revoke(&self, token: &SecretString);
}

/// Views offered by the picker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PickerView {
    /// Documents.
    Documents,
    /// Images.
    Images,
    /// Videos.
    Videos,
}

/// Everything the picker needs to open.
#[derive(Debug, Clone)]
pub struct PickerSpec {
    /// Views in display order.
    pub views: Vec<PickerView>,
    /// Whether several files may be selected.
    pub multiselect: bool,
    /// Access token for the signed-in user.
    pub oauth_token: SecretString,
    /// API key.
    pub developer_key: SecretString,
    /// Cloud project number.
    pub app_id: Option<String>,
}

/// Picker callback action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PickerAction {
    /// The dialog finished rendering.
    Loaded,
    /// The user confirmed a selection.
    Picked,
    /// The user closed the dialog.
    Cancel,
}

/// A document reported by the picker.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PickerDocument {
    /// Drive file id.
    pub id: String,
    /// File name.
    pub name: String,
    /// MIME type.
    pub mime_type: String,
    /// Size in bytes, when known.
    pub size_bytes: Option<u64>,
    /// Last edit time in Unix milliseconds.
    pub last_edited_utc: Option<i64>,
    /// Link to the file.
    pub url: Option<String>,
    /// Icon URL.
    pub icon_url: Option<String>,
    /// Thumbnail URL.
    pub thumbnail_url: Option<String>,
}

/// Picker callback payload.
#[derive(Debug, Clone)]
pub struct PickerResponse {
    /// What happened.
    pub action: PickerAction,
    /// Selected documents (only meaningful for `Picked`).
    pub documents: Vec<PickerDocument>,
}

/// Callback handed to the picker surface.
///
/// `Loaded` notifications are ignored; the first `Picked` or `Cancel` wins.
#[derive(Debug, Clone)]
pub struct PickerCallback {
    inner: OnceCallback<Vec<PickerDocument>>,
}

impl PickerCallback {
    pub(crate) fn new(inner: OnceCallback<Vec<PickerDocument>>) -> Self {
        Self { inner }
    }

    /// Delivers a picker event. Returns true if it resolved the selection.
    pub fn call(&self, response: PickerResponse) -> bool {
        match response.action {
            PickerAction::Loaded => false,
            PickerAction::Picked => self.inner.call(response.documents),
            PickerAction::Cancel => self.inner.call(Vec::new()),
        }
    }
}

/// File selection dialog (Google Picker).
pub trait PickerSurface: Send + Sync {
    /// Builds and shows the picker.
    fn show(&self, spec: PickerSpec, callback: PickerCallback) -> Result<(), String>;
}

/// Legacy session configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// API key.
    pub api_key: SecretString,
    /// OAuth client ID.
    pub client_id: String,
    /// Space-separated scopes.
    pub scope: String,
    /// API discovery documents.
    pub discovery_docs: Vec<String>,
}

/// Authorization held by a legacy session.
#[derive(Debug, Clone)]
pub struct SessionGrant {
    /// Access token.
    pub access_token: SecretString,
    /// Expiration time.
    pub expires_at: DateTime<Utc>,
    /// Granted scopes.
    pub scope: Option<String>,
}

/// Failure reported by a host identity SDK.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostAuthFailure {
    /// Error code, e.g. `popup_closed_by_user`.
    pub code: String,
    /// Optional detail.
    pub message: Option<String>,
}

impl HostAuthFailure {
    /// Creates a failure from a code.
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: None,
        }
    }
}

impl From<HostAuthFailure> for AuthError {
    fn from(failure: HostAuthFailure) -> Self {
        AuthError::from_host_code(&failure.code, failure.message.as_deref())
    }
}

/// Legacy session-based authorization object (`gapi.auth2`).
#[async_trait]
pub trait SessionAuth: Send + Sync {
    /// Initializes the session client.
    async fn init(&self, config: SessionConfig) -> Result<(), HostAuthFailure>;

    /// Whether a user is signed in.
    fn is_signed_in(&self) -> bool;

    /// Authorization of the signed-in user.
    fn current_grant(&self) -> Option<SessionGrant>;

    /// Runs the interactive sign-in.
    async fn sign_in(&self) -> Result<SessionGrant, HostAuthFailure>;

    /// Signs the user out.
    async fn sign_out(&self);
}

/// User decision offered by the manual fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManualDecision {
    /// Fetch files outside the app and attach them as local uploads.
    ProceedManually,
    /// Open Google Drive anyway.
    TryInteractive,
}

/// Binary choice shown by the manual fallback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChoicePrompt {
    /// Prompt title.
    pub title: String,
    /// Explanation.
    pub message: String,
    /// Label of the manual option.
    pub proceed_label: String,
    /// Label of the interactive option.
    pub retry_label: String,
}

/// Plain user interaction.
#[async_trait]
pub trait UserPrompt: Send + Sync {
    /// Asks the user to pick one of two options.
    async fn choose(&self, prompt: &ChoicePrompt) -> ManualDecision;

    /// Shows an informational message.
    fn notify(&self, message: &str);

    /// Opens a URL outside the application.
    fn open_external(&self, url: &Url);
}

/// Host surfaces available to the providers.
#[derive(Clone, Default)]
pub struct HostBindings {
    loader: Option<Arc<dyn SdkLoader>>,
    token_client: Option<Arc<dyn TokenClient>>,
    picker: Option<Arc<dyn PickerSurface>>,
    session: Option<Arc<dyn SessionAuth>>,
    prompt: Option<Arc<dyn UserPrompt>>,
}

impl HostBindings {
    /// Creates empty bindings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the script loader.
    pub fn with_loader(mut self, loader: Arc<dyn SdkLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    /// Sets the token client.
    pub fn with_token_client(mut self, client: Arc<dyn TokenClient>) -> Self {
        self.token_client = Some(client);
        self
    }

    /// Sets the picker surface.
    pub fn with_picker(mut self, picker: Arc<dyn PickerSurface>) -> Self {
        self.picker = Some(picker);
        self
    }

    /// Sets the legacy session object.
    pub fn with_session(mut self, session: Arc<dyn SessionAuth>) -> Self {
        self.session = Some(session);
        self
    }

    /// Sets the user prompt.
    pub fn with_prompt(mut self, prompt: Arc<dyn UserPrompt>) -> Self {
        self.prompt = Some(prompt);
        self
    }

    pub(crate) fn loader(&self) -> Result<Arc<dyn SdkLoader>, ConfigurationError> {
        required(&self.loader, "script loader")
    }

    pub(crate) fn token_client(&self) -> Result<Arc<dyn TokenClient>, ConfigurationError> {
        required(&self.token_client, "token client")
    }

    pub(crate) fn picker(&self) -> Result<Arc<dyn PickerSurface>, ConfigurationError> {
        required(&self.picker, "picker surface")
    }

    pub(crate) fn session(&self) -> Result<Arc<dyn SessionAuth>, ConfigurationError> {
        required(&self.session, "session authorization")
    }

    pub(crate) fn prompt(&self) -> Result<Arc<dyn UserPrompt>, ConfigurationError> {
        required(&self.prompt, "user prompt")
    }
}

fn required<T: ?Sized>(
    binding: &Option<Arc<T>>,
    name: &str,
) -> Result<Arc<T>, ConfigurationError> {
    binding
        .clone()
        .ok_or_else(|| ConfigurationError::MissingHostBinding(name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callback::once_callback;

    fn doc(id: &str) -> PickerDocument {
        PickerDocument {
            id: id.to_string(),
            name: format!("{}.pdf", id),
            mime_type: "application/pdf".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_picker_callback_ignores_loaded() {
        let (callback, pending) = once_callback();
        let callback = PickerCallback::new(callback);

        assert!(!callback.call(PickerResponse {
            action: PickerAction::Loaded,
            documents: vec![],
        }));
        assert!(callback.call(PickerResponse {
            action: PickerAction::Picked,
            documents: vec![doc("a")],
        }));
        assert!(!callback.call(PickerResponse {
            action: PickerAction::Cancel,
            documents: vec![],
        }));

        assert_eq!(pending.wait().await, Some(vec![doc("a")]));
    }

    #[tokio::test]
    async fn test_picker_cancel_resolves_empty() {
        let (callback, pending) = once_callback();
        PickerCallback::new(callback).call(PickerResponse {
            action: PickerAction::Cancel,
            documents: vec![doc("ignored")],
        });

        assert_eq!(pending.wait().await, Some(vec![]));
    }

    #[test]
    fn test_missing_binding() {
        let bindings = HostBindings::new();
        assert!(matches!(
            bindings.picker(),
            Err(ConfigurationError::MissingHostBinding(name)) if name == "picker surface"
        ));
    }

    #[test]
    fn test_host_failure_mapping() {
        let err: AuthError = HostAuthFailure::new("popup_closed_by_user").into();
        assert!(matches!(err, AuthError::Cancelled));
    }
}
