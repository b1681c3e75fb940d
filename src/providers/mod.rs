//! File providers.
//!
//! Every strategy implements [`FileProvider`] on its own:
//! - [`RealProvider`]: token client + picker, the canonical flow
//! - [`LegacyProvider`]: session-based `auth2` authorization + picker
//! - [`MockProvider`]: fixed sample files, no external calls
//! - [`ManualProvider`]: fallback that directs the user outside the app

use crate::auth::AccessToken;
use crate::config::DriveIntakeConfig;
use crate::errors::{DriveIntakeError, DriveIntakeResult};
use crate::types::{DownloadedFile, FileDescriptor};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

mod drive_api;
mod legacy;
mod loader;
mod manual;
mod mock;
mod picker;
mod real;

pub use drive_api::{DriveContentClient, METADATA_FIELDS};
pub use legacy::{LegacyProvider, DRIVE_DISCOVERY_DOC};
pub use loader::DependencyGate;
pub use manual::{ManualProvider, MANUAL_INSTRUCTIONS};
pub use mock::{MockProvider, SampleFile, MOCK_ACCESS_TOKEN, SAMPLE_FILES};
pub use real::RealProvider;

/// Capability contract shared by all file providers.
#[async_trait]
pub trait FileProvider: Send + Sync {
    /// Short diagnostic label.
    fn name(&self) -> &str;

    /// Loads external libraries and configures clients. Idempotent.
    async fn init(&self) -> DriveIntakeResult<()>;

    /// Returns the cached credential or runs the consent flow.
    async fn authenticate(&self) -> DriveIntakeResult<AccessToken>;

    /// Whether a usable credential is cached.
    async fn is_authenticated(&self) -> bool;

    /// Presents the selection surface.
    ///
    /// An empty result means the user cancelled.
    async fn open_file_picker(&self) -> DriveIntakeResult<Vec<FileDescriptor>>;

    /// Fetches the bytes of a selected file.
    async fn download_file(&self, id: &str, name: &str) -> DriveIntakeResult<DownloadedFile>;

    /// Fetches authoritative metadata for a file.
    async fn file_metadata(&self, id: &str) -> DriveIntakeResult<FileDescriptor>;

    /// Drops the cached credential.
    async fn sign_out(&self);
}

/// API key and client ID required by the interactive providers.
///
/// Checked before anything is loaded so a misconfigured deployment fails
/// without touching the network.
pub(crate) fn google_credentials(
    config: &DriveIntakeConfig,
) -> DriveIntakeResult<(SecretString, String)> {
    let api_key = config
        .google_api_key
        .as_ref()
        .filter(|key| !key.expose_secret().trim().is_empty());
    let client_id = config
        .google_client_id
        .as_ref()
        .filter(|id| !id.trim().is_empty());

    match (api_key, client_id) {
        (Some(key), Some(id)) => Ok((key.clone(), id.clone())),
        (None, Some(_)) => Err(DriveIntakeError::missing_credentials("API key is missing")),
        (Some(_), None) => Err(DriveIntakeError::missing_credentials(
            "OAuth client ID is missing",
        )),
        (None, None) => Err(DriveIntakeError::missing_credentials(
            "API key and OAuth client ID are missing",
        )),
    }
}
