//! Fallback provider for hosts where the interactive flow is blocked.

use super::FileProvider;
use crate::auth::AccessToken;
use crate::errors::{DriveIntakeError, DriveIntakeResult};
use crate::host::{ChoicePrompt, HostBindings, ManualDecision, UserPrompt};
use crate::types::{DownloadedFile, FileDescriptor};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;
use url::Url;

/// Steps shown when the user chooses the manual path.
pub const MANUAL_INSTRUCTIONS: &str = "To add files from Google Drive:\n\
    1. Open drive.google.com in a new tab.\n\
    2. Download the files you need to your computer.\n\
    3. Come back and add them with the local file upload.";

const DRIVE_WEB_URL: &str = "https://drive.google.com/";

/// Provider that never opens a picker.
pub struct ManualProvider {
    prompt: Arc<dyn UserPrompt>,
}

impl ManualProvider {
    /// Creates the provider from the host's user prompt.
    pub fn new(host: &HostBindings) -> DriveIntakeResult<Self> {
        Ok(Self {
            prompt: host.prompt()?,
        })
    }

    fn choice() -> ChoicePrompt {
        ChoicePrompt {
            title: "Google Drive is unavailable".to_string(),
            message: "The Google Drive picker could not be used here. You can download \
                      the files from Drive yourself and upload them, or try opening \
                      Google Drive anyway."
                .to_string(),
            proceed_label: "Upload manually".to_string(),
            retry_label: "Open Google Drive".to_string(),
        }
    }
}

#[async_trait]
impl FileProvider for ManualProvider {
    fn name(&self) -> &str {
        "manual"
    }

    async fn init(&self) -> DriveIntakeResult<()> {
        Ok(())
    }

    async fn authenticate(&self) -> DriveIntakeResult<AccessToken> {
        Err(DriveIntakeError::unsupported(
            "Sign-in is not available; add files through the local upload instead.",
        ))
    }

    async fn is_authenticated(&self) -> bool {
        false
    }

    async fn open_file_picker(&self) -> DriveIntakeResult<Vec<FileDescriptor>> {
        match self.prompt.choose(&Self::choice()).await {
            ManualDecision::ProceedManually => {
                info!("User chose the manual Drive path");
                self.prompt.notify(MANUAL_INSTRUCTIONS);
            }
            ManualDecision::TryInteractive => {
                info!("User opened Google Drive externally");
                if let Ok(url) = Url::parse(DRIVE_WEB_URL) {
                    self.prompt.open_external(&url);
                }
            }
        }

        Ok(Vec::new())
    }

    async fn download_file(&self, _id: &str, name: &str) -> DriveIntakeResult<DownloadedFile> {
        Err(DriveIntakeError::unsupported(format!(
            "Cannot download \"{}\" directly. Download it from drive.google.com and \
             add it through the local file upload.",
            name
        )))
    }

    async fn file_metadata(&self, _id: &str) -> DriveIntakeResult<FileDescriptor> {
        Err(DriveIntakeError::unsupported(
            "File details are not available without Google Drive access.",
        ))
    }

    async fn sign_out(&self) {}
}
