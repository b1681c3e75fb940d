//! Offline provider for development and tests.

use super::FileProvider;
use crate::auth::AccessToken;
use crate::errors::{DownloadError, DriveIntakeResult};
use crate::types::{DownloadedFile, FileDescriptor};
use async_trait::async_trait;
use bytes::Bytes;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;

/// Placeholder credential returned by [`MockProvider::authenticate`].
pub const MOCK_ACCESS_TOKEN: &str = "mock_access_token";

/// Entry of the fixed sample catalogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleFile {
    /// File id.
    pub id: &'static str,
    /// File name.
    pub name: &'static str,
    /// MIME type.
    pub mime_type: &'static str,
    /// Declared size in bytes.
    pub size: u64,
}

impl SampleFile {
    fn descriptor(&self) -> FileDescriptor {
        FileDescriptor::new(self.id, self.name, self.mime_type, self.size)
    }
}

/// Files offered by the mock picker.
pub const SAMPLE_FILES: [SampleFile; 5] = [
    SampleFile {
        id: "mock-file-1",
        name: "Quarterly Report.pdf",
        mime_type: "application/pdf",
        size: 245_760,
    },
    SampleFile {
        id: "mock-file-2",
        name: "Team Photo.jpg",
        mime_type: "image/jpeg",
        size: 1_048_576,
    },
    SampleFile {
        id: "mock-file-3",
        name: "Budget 2024.xlsx",
        mime_type: "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        size: 51_200,
    },
    SampleFile {
        id: "mock-file-4",
        name: "Meeting Notes.docx",
        mime_type: "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        size: 28_672,
    },
    SampleFile {
        id: "mock-file-5",
        name: "Product Demo.mp4",
        mime_type: "video/mp4",
        size: 5_242_880,
    },
];

/// Provider that never contacts an external service.
pub struct MockProvider {
    delay: Duration,
    rng: Mutex<StdRng>,
    signed_in: AtomicBool,
}

impl MockProvider {
    /// Creates a provider whose picker resolves after `delay`.
    pub fn new(delay: Duration) -> Self {
        Self::with_rng(delay, StdRng::from_entropy())
    }

    /// Creates a provider with a fixed selection seed.
    pub fn seeded(delay: Duration, seed: u64) -> Self {
        Self::with_rng(delay, StdRng::seed_from_u64(seed))
    }

    fn with_rng(delay: Duration, rng: StdRng) -> Self {
        Self {
            delay,
            rng: Mutex::new(rng),
            signed_in: AtomicBool::new(false),
        }
    }

    fn selection_size(&self) -> usize {
        self.rng
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .gen_range(1..=3)
    }
}

fn sample(id: &str) -> Option<&'static SampleFile> {
    SAMPLE_FILES.iter().find(|s| s.id == id)
}

#[async_trait]
impl FileProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn init(&self) -> DriveIntakeResult<()> {
        Ok(())
    }

    async fn authenticate(&self) -> DriveIntakeResult<AccessToken> {
        self.signed_in.store(true, Ordering::SeqCst);
        Ok(AccessToken::bearer(MOCK_ACCESS_TOKEN, None, None))
    }

    async fn is_authenticated(&self) -> bool {
        self.signed_in.load(Ordering::SeqCst)
    }

    async fn open_file_picker(&self) -> DriveIntakeResult<Vec<FileDescriptor>> {
        tokio::time::sleep(self.delay).await;

        let count = self.selection_size();
        debug!(count, "Mock picker selection");

        Ok(SAMPLE_FILES
            .iter()
            .take(count)
            .map(SampleFile::descriptor)
            .collect())
    }

    async fn download_file(&self, id: &str, name: &str) -> DriveIntakeResult<DownloadedFile> {
        let mime_type = sample(id)
            .map(|s| s.mime_type.to_string())
            .unwrap_or_else(|| mime::TEXT_PLAIN.to_string());

        Ok(DownloadedFile {
            name: name.to_string(),
            mime_type,
            content: Bytes::from(format!("Mock content for {}", name)),
        })
    }

    async fn file_metadata(&self, id: &str) -> DriveIntakeResult<FileDescriptor> {
        sample(id)
            .map(SampleFile::descriptor)
            .ok_or_else(|| DownloadError::NotFound(id.to_string()).into())
    }

    async fn sign_out(&self) {
        self.signed_in.store(false, Ordering::SeqCst);
    }
}
