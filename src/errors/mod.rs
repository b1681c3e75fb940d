//! Error types for Drive file acquisition.

use thiserror::Error;

/// Result type for Drive intake operations.
pub type DriveIntakeResult<T> = Result<T, DriveIntakeError>;

/// Top-level error type for the Drive intake integration.
#[derive(Debug, Error)]
pub enum DriveIntakeError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    /// External dependency failed to load.
    #[error("Dependency load error: {0}")]
    DependencyLoad(#[from] DependencyLoadError),

    /// Authentication error.
    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    /// Selection surface error.
    #[error("Picker error: {0}")]
    Picker(#[from] PickerError),

    /// Download error.
    #[error("Download error: {0}")]
    Download(#[from] DownloadError),

    /// Upload error.
    #[error("Upload error: {0}")]
    Upload(#[from] UploadError),

    /// Operation not supported by the active provider.
    #[error("Unsupported operation: {0}")]
    Unsupported(String),
}

impl DriveIntakeError {
    /// Creates a configuration error.
    pub fn configuration(msg: impl Into<String>) -> Self {
        DriveIntakeError::Configuration(ConfigurationError::InvalidConfiguration(msg.into()))
    }

    /// Creates a missing credentials error.
    pub fn missing_credentials(msg: impl Into<String>) -> Self {
        DriveIntakeError::Configuration(ConfigurationError::MissingCredentials(msg.into()))
    }

    /// Creates an expired credential error.
    pub fn auth_expired(msg: impl Into<String>) -> Self {
        DriveIntakeError::Auth(AuthError::Expired(msg.into()))
    }

    /// Creates an unsupported operation error.
    pub fn unsupported(msg: impl Into<String>) -> Self {
        DriveIntakeError::Unsupported(msg.into())
    }

    /// Returns true if re-invoking authentication can recover from this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            DriveIntakeError::Auth(AuthError::Denied(_))
                | DriveIntakeError::Auth(AuthError::Cancelled)
                | DriveIntakeError::Auth(AuthError::Expired(_))
                | DriveIntakeError::Auth(AuthError::Provider(_))
        )
    }

    /// Returns true if the cached credential has lapsed.
    pub fn is_auth_expired(&self) -> bool {
        matches!(self, DriveIntakeError::Auth(AuthError::Expired(_)))
    }

    /// Returns true if the user closed the consent surface.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, DriveIntakeError::Auth(AuthError::Cancelled))
    }

    /// Message suitable for showing to the user.
    pub fn user_message(&self) -> String {
        match self {
            DriveIntakeError::Configuration(ConfigurationError::MissingCredentials(what)) => {
                format!(
                    "Google Drive is not configured ({}). Set GOOGLE_API_KEY and \
                     GOOGLE_CLIENT_ID, or enable USE_MOCK_DRIVE for local development.",
                    what
                )
            }
            DriveIntakeError::Configuration(e) => format!("Google Drive is misconfigured: {}", e),
            DriveIntakeError::DependencyLoad(_) => {
                "Google Drive could not be loaded. Please reload the page and try again."
                    .to_string()
            }
            DriveIntakeError::Auth(AuthError::Expired(_)) => {
                "Your Google session has expired. Please sign in again.".to_string()
            }
            DriveIntakeError::Auth(AuthError::Cancelled) => {
                "Google sign-in was cancelled.".to_string()
            }
            DriveIntakeError::Auth(e) => format!("Google sign-in failed: {}", e),
            DriveIntakeError::Picker(_) => {
                "The Google Drive file picker could not be opened.".to_string()
            }
            DriveIntakeError::Download(e) => format!("Could not download file: {}", e),
            DriveIntakeError::Upload(e) => format!("Could not upload file: {}", e),
            DriveIntakeError::Unsupported(msg) => msg.clone(),
        }
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// Missing credentials.
    #[error("Missing credentials: {0}")]
    MissingCredentials(String),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A host binding required by the selected provider was not supplied.
    #[error("Missing host binding: {0}")]
    MissingHostBinding(String),
}

/// Errors raised while waiting for external SDK libraries.
#[derive(Debug, Error)]
pub enum DependencyLoadError {
    /// The host refused to insert the library.
    #[error("Failed to insert {library}: {message}")]
    InsertFailed {
        /// Library name.
        library: String,
        /// Host message.
        message: String,
    },

    /// The library never became ready within the polling window.
    #[error("{library} not ready after {attempts} attempts")]
    TimedOut {
        /// Library name.
        library: String,
        /// Attempts made before giving up.
        attempts: u32,
    },
}

/// Authentication errors.
#[derive(Debug, Clone, Error)]
pub enum AuthError {
    /// The user denied consent.
    #[error("Access denied: {0}")]
    Denied(String),

    /// The user closed the consent surface.
    #[error("Consent flow was closed before completion")]
    Cancelled,

    /// The identity provider reported an error.
    #[error("Provider error: {0}")]
    Provider(String),

    /// The cached credential is missing or has lapsed.
    #[error("Credential expired: {0}")]
    Expired(String),
}

impl AuthError {
    /// Maps an error code reported by the host identity SDK.
    pub fn from_host_code(code: &str, message: Option<&str>) -> Self {
        let detail = message.unwrap_or(code).to_string();
        match code {
            "access_denied" => AuthError::Denied(detail),
            "popup_closed" | "popup_closed_by_user" => AuthError::Cancelled,
            _ => AuthError::Provider(format!("{}: {}", code, detail)),
        }
    }
}

/// Selection surface errors.
#[derive(Debug, Error)]
pub enum PickerError {
    /// The picker could not be constructed.
    #[error("Failed to construct picker: {0}")]
    ConstructionFailed(String),
}

/// Download errors.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Non-success response.
    #[error("HTTP {status}: {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response message.
        message: String,
    },

    /// Transport failure.
    #[error("Network error: {0}")]
    Network(String),

    /// The file is unknown to the provider.
    #[error("File not found: {0}")]
    NotFound(String),

    /// A Google Docs editor file, which has no binary content to fetch.
    #[error("{name} is a Google Docs editor file and has no downloadable content")]
    NotDownloadable {
        /// File name.
        name: String,
    },
}

/// Upload errors.
#[derive(Debug, Error)]
pub enum UploadError {
    /// Non-success response from the backend.
    #[error("HTTP {status}: {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response message.
        message: String,
    },

    /// Transport failure.
    #[error("Network error: {0}")]
    Network(String),

    /// Backend answered 2xx with an unusable body.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// The same Drive file appeared twice in one selection.
    #[error("Duplicate selection: {0}")]
    DuplicateSelection(String),
}

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Network error.
    #[error("Network error: {0}")]
    Network(String),

    /// Timeout error.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// HTTP error.
    #[error("HTTP error: {0}")]
    Http(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout(err.to_string())
        } else if err.is_connect() {
            TransportError::Network(err.to_string())
        } else {
            TransportError::Http(err.to_string())
        }
    }
}

impl From<TransportError> for DownloadError {
    fn from(err: TransportError) -> Self {
        DownloadError::Network(err.to_string())
    }
}

impl From<TransportError> for UploadError {
    fn from(err: TransportError) -> Self {
        UploadError::Network(err.to_string())
    }
}
