//! Drive REST calls shared by the interactive providers.

use crate::auth::AccessToken;
use crate::errors::{AuthError, DownloadError, DriveIntakeError, DriveIntakeResult};
use crate::transport::{HttpMethod, HttpRequest, HttpResponse, HttpTransport};
use crate::types::{DownloadedFile, FileDescriptor};
use chrono::{DateTime, Utc};
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use reqwest::header::{HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Characters escaped inside a single path segment.
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Metadata fields requested from `files.get`.
pub const METADATA_FIELDS: &str =
    "id,name,mimeType,size,modifiedTime,iconLink,thumbnailLink,webContentLink";

/// Error reason Drive reports for `alt=media` on Docs editor files.
const NOT_DOWNLOADABLE_REASON: &str = "fileNotDownloadable";

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveFileMetadata {
    id: String,
    name: String,
    mime_type: String,
    // Drive encodes int64 values as strings.
    size: Option<String>,
    modified_time: Option<DateTime<Utc>>,
    icon_link: Option<String>,
    thumbnail_link: Option<String>,
    web_content_link: Option<String>,
}

impl From<DriveFileMetadata> for FileDescriptor {
    fn from(meta: DriveFileMetadata) -> Self {
        Self {
            size: meta.size.and_then(|s| s.parse().ok()).unwrap_or(0),
            modified_time: meta.modified_time,
            download_url: meta.web_content_link,
            thumbnail_url: meta.thumbnail_link,
            icon_url: meta.icon_link,
            id: meta.id,
            name: meta.name,
            mime_type: meta.mime_type,
        }
    }
}

/// Fetches metadata and content from the Drive REST API.
pub struct DriveContentClient {
    transport: Arc<dyn HttpTransport>,
    base_url: Url,
    timeout: Duration,
}

impl DriveContentClient {
    /// Creates a client rooted at `base_url`.
    pub fn new(transport: Arc<dyn HttpTransport>, base_url: Url, timeout: Duration) -> Self {
        Self {
            transport,
            base_url,
            timeout,
        }
    }

    /// Gets authoritative metadata for a file.
    pub async fn metadata(
        &self,
        token: &AccessToken,
        file_id: &str,
    ) -> DriveIntakeResult<FileDescriptor> {
        let query = serde_urlencoded::to_string([
            ("fields", METADATA_FIELDS),
            ("supportsAllDrives", "true"),
        ])
        .map_err(|e| DriveIntakeError::configuration(format!("Invalid query: {}", e)))?;

        let response = self.get(token, file_id, &query).await?;

        let meta: DriveFileMetadata = serde_json::from_slice(&response.body).map_err(|e| {
            DownloadError::Status {
                status: response.status.as_u16(),
                message: format!("Failed to parse file metadata: {}", e),
            }
        })?;

        Ok(meta.into())
    }

    /// Downloads file content.
    pub async fn download(
        &self,
        token: &AccessToken,
        file_id: &str,
        name: &str,
    ) -> DriveIntakeResult<DownloadedFile> {
        let query = serde_urlencoded::to_string([("alt", "media"), ("supportsAllDrives", "true")])
            .map_err(|e| DriveIntakeError::configuration(format!("Invalid query: {}", e)))?;

        let response = self
            .get(token, file_id, &query)
            .await
            .map_err(|e| match e {
                DriveIntakeError::Download(DownloadError::Status { status: 403, message })
                    if message.contains(NOT_DOWNLOADABLE_REASON) =>
                {
                    DownloadError::NotDownloadable {
                        name: name.to_string(),
                    }
                    .into()
                }
                other => other,
            })?;

        let mime_type = response
            .headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<mime::Mime>().ok())
            .map(|m| m.essence_str().to_string())
            .unwrap_or_else(|| mime::APPLICATION_OCTET_STREAM.to_string());

        debug!(file_id = %file_id, bytes = response.body.len(), "Downloaded Drive file");

        Ok(DownloadedFile {
            name: name.to_string(),
            mime_type,
            content: response.body,
        })
    }

    /// Builds the `files/{id}` URL with a query string.
    pub fn file_url(&self, file_id: &str, query: &str) -> DriveIntakeResult<Url> {
        let path = format!("files/{}", utf8_percent_encode(file_id, PATH_SEGMENT));
        let mut url = self
            .base_url
            .join(&path)
            .map_err(|e| DriveIntakeError::configuration(format!("Invalid Drive URL: {}", e)))?;
        url.set_query(Some(query));
        Ok(url)
    }

    async fn get(
        &self,
        token: &AccessToken,
        file_id: &str,
        query: &str,
    ) -> DriveIntakeResult<HttpResponse> {
        if file_id.is_empty() {
            return Err(DownloadError::NotFound("empty file id".to_string()).into());
        }

        let mut request = HttpRequest::new(HttpMethod::Get, self.file_url(file_id, query)?);
        request.timeout = Some(self.timeout);
        request.headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&token.authorization_header())
                .map_err(|_| AuthError::Provider("access token is not a valid header".to_string()))?,
        );

        let response = self
            .transport
            .send(request)
            .await
            .map_err(DownloadError::from)?;

        match response.status {
            s if s.is_success() => Ok(response),
            StatusCode::UNAUTHORIZED => {
                warn!(file_id = %file_id, "Drive rejected the access token");
                Err(AuthError::Expired("Drive rejected the access token".to_string()).into())
            }
            StatusCode::NOT_FOUND => Err(DownloadError::NotFound(file_id.to_string()).into()),
            status => {
                warn!(file_id = %file_id, status = %status, "Drive request failed");
                Err(DownloadError::Status {
                    status: status.as_u16(),
                    message: response.body_snippet(),
                }
                .into())
            }
        }
    }
}
