//! Upload bridge: republishes picked Drive files to the application backend.
//!
//! Files are processed one at a time in selection order. A failure ends the
//! processing of that file only; every descriptor produces exactly one
//! uploaded record or one reported failure.

use crate::config::DriveIntakeConfig;
use crate::errors::{DownloadError, DriveIntakeError, DriveIntakeResult, UploadError};
use crate::factory::ProviderHandle;
use crate::providers::FileProvider;
use crate::transport::{FormData, HttpMethod, HttpRequest, HttpTransport, RequestBody, ReqwestTransport};
use crate::types::{FileDescriptor, UploadedFile};
use chrono::Utc;
use reqwest::header::{HeaderValue, ACCEPT, AUTHORIZATION};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// Files uploaded during the current session.
#[derive(Debug, Clone, Default)]
pub struct SelectedFiles {
    files: Arc<Mutex<Vec<UploadedFile>>>,
}

impl SelectedFiles {
    /// Creates an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a file.
    pub fn push(&self, file: UploadedFile) {
        self.lock().push(file);
    }

    /// Removes a file by backend id.
    pub fn remove(&self, id: &str) -> Option<UploadedFile> {
        let mut files = self.lock();
        let index = files.iter().position(|f| f.id == id)?;
        Some(files.remove(index))
    }

    /// Copy of the current list.
    pub fn snapshot(&self) -> Vec<UploadedFile> {
        self.lock().clone()
    }

    /// Removes every file.
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Number of files.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the list is empty.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<UploadedFile>> {
        self.files.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// A file that could not be uploaded.
#[derive(Debug)]
pub struct UploadFailure {
    /// Provider id of the descriptor.
    pub descriptor_id: String,
    /// Name of the file, for the user-visible message.
    pub file_name: String,
    /// What went wrong.
    pub error: DriveIntakeError,
}

impl UploadFailure {
    /// User-visible message naming the file.
    pub fn message(&self) -> String {
        format!("{}: {}", self.file_name, self.error.user_message())
    }
}

/// Outcome of one batch.
#[derive(Debug, Default)]
pub struct UploadReport {
    /// Files persisted by the backend, in selection order.
    pub uploaded: Vec<UploadedFile>,
    /// Files that failed, in selection order.
    pub failures: Vec<UploadFailure>,
}

impl UploadReport {
    /// Whether every file was uploaded.
    pub fn is_complete_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Descriptors accounted for.
    pub fn total(&self) -> usize {
        self.uploaded.len() + self.failures.len()
    }
}

/// Receives per-file notifications while a batch runs.
pub trait UploadObserver: Send + Sync {
    /// A file was persisted.
    fn file_uploaded(&self, file: &UploadedFile);

    /// A file failed.
    fn file_failed(&self, failure: &UploadFailure);
}

impl UploadObserver for () {
    fn file_uploaded(&self, _file: &UploadedFile) {}

    fn file_failed(&self, _failure: &UploadFailure) {}
}

#[derive(Deserialize)]
struct UploadResponse {
    file_id: BackendFileId,
    #[serde(default)]
    size: Option<u64>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum BackendFileId {
    Text(String),
    Number(serde_json::Number),
}

impl BackendFileId {
    fn into_string(self) -> String {
        match self {
            BackendFileId::Text(s) => s,
            BackendFileId::Number(n) => n.to_string(),
        }
    }
}

/// Moves files from the active provider into backend storage.
pub struct UploadBridge {
    provider: ProviderHandle,
    transport: Arc<dyn HttpTransport>,
    upload_url: Url,
    backend_token: Option<SecretString>,
    source_tag: String,
    timeout: Duration,
    selected: SelectedFiles,
}

impl UploadBridge {
    /// Creates a bridge over a provider handle and transport.
    pub fn new(
        provider: ProviderHandle,
        transport: Arc<dyn HttpTransport>,
        config: &DriveIntakeConfig,
    ) -> DriveIntakeResult<Self> {
        Ok(Self {
            provider,
            transport,
            upload_url: config.upload_url()?,
            backend_token: config.backend_token.clone(),
            source_tag: config.source_tag.clone(),
            timeout: config.timeout,
            selected: SelectedFiles::new(),
        })
    }

    /// Creates a bridge using the reqwest transport.
    pub fn from_config(
        provider: ProviderHandle,
        config: &DriveIntakeConfig,
    ) -> DriveIntakeResult<Self> {
        let transport = ReqwestTransport::from_config(config)
            .map_err(|e| DriveIntakeError::configuration(e.to_string()))?;
        Self::new(provider, Arc::new(transport), config)
    }

    /// Shares an existing selected-files list instead of a private one.
    pub fn with_selected_files(mut self, selected: SelectedFiles) -> Self {
        self.selected = selected;
        self
    }

    /// The session's selected-files list.
    pub fn selected_files(&self) -> &SelectedFiles {
        &self.selected
    }

    /// Opens the picker and uploads whatever the user chose.
    ///
    /// A cancelled picker yields an empty report.
    pub async fn pick_and_upload(
        &self,
        observer: &dyn UploadObserver,
    ) -> DriveIntakeResult<UploadReport> {
        let descriptors = self.provider.open_file_picker().await?;
        if descriptors.is_empty() {
            info!("No files selected");
            return Ok(UploadReport::default());
        }

        Ok(self.upload_selection(&descriptors, observer).await)
    }

    /// Uploads a selection, continuing past individual failures.
    pub async fn upload_selection(
        &self,
        descriptors: &[FileDescriptor],
        observer: &dyn UploadObserver,
    ) -> UploadReport {
        let mut report = UploadReport::default();
        let mut seen = HashSet::new();

        for descriptor in descriptors {
            let result = if seen.insert(descriptor.id.as_str()) {
                self.upload_file(descriptor).await
            } else {
                Err(UploadError::DuplicateSelection(descriptor.id.clone()).into())
            };

            match result {
                Ok(file) => {
                    info!(
                        file_id = %file.id,
                        drive_file_id = %descriptor.id,
                        size = file.size,
                        "Uploaded Drive file"
                    );
                    self.selected.push(file.clone());
                    observer.file_uploaded(&file);
                    report.uploaded.push(file);
                }
                Err(error) => {
                    warn!(
                        drive_file_id = %descriptor.id,
                        name = %descriptor.name,
                        error = %error,
                        "Drive file upload failed"
                    );
                    let failure = UploadFailure {
                        descriptor_id: descriptor.id.clone(),
                        file_name: descriptor.name.clone(),
                        error,
                    };
                    observer.file_failed(&failure);
                    report.failures.push(failure);
                }
            }
        }

        report
    }

    /// Uploads one file: metadata if needed, download, then the backend POST.
    pub async fn upload_file(&self, descriptor: &FileDescriptor) -> DriveIntakeResult<UploadedFile> {
        let descriptor = if descriptor.is_complete() {
            descriptor.clone()
        } else {
            debug!(drive_file_id = %descriptor.id, "Fetching metadata for incomplete descriptor");
            let metadata = self.provider.file_metadata(&descriptor.id).await?;
            descriptor.clone().merge(metadata)
        };

        if descriptor.is_native_document() {
            return Err(DownloadError::NotDownloadable {
                name: descriptor.name.clone(),
            }
            .into());
        }

        let downloaded = self
            .provider
            .download_file(&descriptor.id, &descriptor.name)
            .await?;

        let mime_type = if descriptor.mime_type.is_empty() {
            downloaded.mime_type.clone()
        } else {
            descriptor.mime_type.clone()
        };
        let downloaded_size = downloaded.size();

        let form = FormData::new()
            .file("file", downloaded.name, mime_type.clone(), downloaded.content)
            .text("source", self.source_tag.clone())
            .text("drive_file_id", descriptor.id.clone());

        let mut request = HttpRequest::new(HttpMethod::Post, self.upload_url.clone());
        request.timeout = Some(self.timeout);
        request
            .headers
            .insert(ACCEPT, HeaderValue::from_static("application/json"));
        if let Some(token) = &self.backend_token {
            let value = HeaderValue::from_str(&format!("Bearer {}", token.expose_secret()))
                .map_err(|_| DriveIntakeError::configuration("backend token is not a valid header"))?;
            request.headers.insert(AUTHORIZATION, value);
        }
        request.body = Some(RequestBody::Form(form));

        let response = self
            .transport
            .send(request)
            .await
            .map_err(UploadError::from)?;

        if !response.status.is_success() {
            return Err(UploadError::Status {
                status: response.status.as_u16(),
                message: response.body_snippet(),
            }
            .into());
        }

        let parsed: UploadResponse = serde_json::from_slice(&response.body).map_err(|e| {
            UploadError::InvalidResponse(format!("expected a file_id in the response: {}", e))
        })?;

        let id = parsed.file_id.into_string();
        if id.is_empty() {
            return Err(UploadError::InvalidResponse("empty file_id".to_string()).into());
        }

        Ok(UploadedFile {
            id,
            name: descriptor.name,
            size: parsed.size.unwrap_or(downloaded_size),
            mime_type,
            upload_date: Utc::now(),
            source: self.source_tag.clone(),
            drive_file_id: descriptor.id,
        })
    }
}
