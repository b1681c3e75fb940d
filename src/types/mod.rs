//! Records exchanged between providers, the upload bridge and the UI.

use crate::host::PickerDocument;
use bytes::Bytes;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// MIME type prefix of Google Docs editor files.
pub const NATIVE_DOCUMENT_PREFIX: &str = "application/vnd.google-apps.";

/// Metadata of a file selected through a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileDescriptor {
    /// Provider-assigned id.
    pub id: String,

    /// File name.
    pub name: String,

    /// MIME type.
    pub mime_type: String,

    /// Size in bytes; 0 when unknown.
    #[serde(default)]
    pub size: u64,

    /// Last modification time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified_time: Option<DateTime<Utc>>,

    /// Direct download link.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,

    /// Thumbnail link.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,

    /// Icon link.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,
}

impl FileDescriptor {
    /// Creates a descriptor with the required fields.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        mime_type: impl Into<String>,
        size: u64,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            mime_type: mime_type.into(),
            size,
            modified_time: None,
            download_url: None,
            thumbnail_url: None,
            icon_url: None,
        }
    }

    /// Whether name, MIME type and size are all known.
    pub fn is_complete(&self) -> bool {
        !self.name.is_empty() && !self.mime_type.is_empty() && self.size > 0
    }

    /// Whether this is a Google Docs editor file (Docs, Sheets, Slides, ...).
    pub fn is_native_document(&self) -> bool {
        self.mime_type.starts_with(NATIVE_DOCUMENT_PREFIX)
    }

    /// Fills gaps from authoritative metadata, keeping this descriptor's id.
    pub fn merge(mut self, authoritative: FileDescriptor) -> Self {
        if !authoritative.name.is_empty() {
            self.name = authoritative.name;
        }
        if !authoritative.mime_type.is_empty() {
            self.mime_type = authoritative.mime_type;
        }
        if authoritative.size > 0 {
            self.size = authoritative.size;
        }
        self.modified_time = authoritative.modified_time.or(self.modified_time);
        self.download_url = authoritative.download_url.or(self.download_url);
        self.thumbnail_url = authoritative.thumbnail_url.or(self.thumbnail_url);
        self.icon_url = authoritative.icon_url.or(self.icon_url);
        self
    }
}

impl TryFrom<PickerDocument> for FileDescriptor {
    type Error = PickerDocument;

    /// Rejects documents without an id or a name.
    fn try_from(doc: PickerDocument) -> Result<Self, Self::Error> {
        if doc.id.is_empty() || doc.name.is_empty() {
            return Err(doc);
        }

        Ok(Self {
            modified_time: doc
                .last_edited_utc
                .and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
            download_url: doc.url,
            thumbnail_url: doc.thumbnail_url,
            icon_url: doc.icon_url,
            size: doc.size_bytes.unwrap_or(0),
            id: doc.id,
            name: doc.name,
            mime_type: doc.mime_type,
        })
    }
}

/// Content fetched by a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedFile {
    /// Name the caller asked for.
    pub name: String,

    /// MIME type reported with the content.
    pub mime_type: String,

    /// Raw bytes.
    pub content: Bytes,
}

impl DownloadedFile {
    /// Content length in bytes.
    pub fn size(&self) -> u64 {
        self.content.len() as u64
    }
}

/// Client-side record of a file persisted by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedFile {
    /// Backend-assigned id.
    pub id: String,

    /// File name.
    pub name: String,

    /// Size in bytes.
    pub size: u64,

    /// MIME type.
    #[serde(rename = "type")]
    pub mime_type: String,

    /// When the client observed the upload.
    pub upload_date: DateTime<Utc>,

    /// Origin tag, e.g. `google_drive`.
    pub source: String,

    /// Id of the descriptor this record came from.
    pub drive_file_id: String,
}
