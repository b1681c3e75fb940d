//! Google Drive File Intake Module
//!
//! This module lets an application take files from a user's Google Drive and
//! republish them into its own backend storage. Four interchangeable providers
//! implement one capability contract, a factory chooses one of them per
//! process, and an upload bridge moves the picked files to the backend.
//!
//! # Features
//!
//! - **Providers**: OAuth token client + picker, legacy session auth, offline mock, manual fallback
//! - **Factory**: Strategy chosen once from configuration, frozen behind a shared handle
//! - **Upload Bridge**: Per-file metadata, download and multipart upload with partial-success semantics
//! - **Host Bindings**: Script loading, consent, picker and prompts supplied by the embedding application
//! - **Single-resolution callbacks**: Repeated host callbacks are ignored after the first
//!
//! # Example
//!
//! ```no_run
//! use integrations_drive_intake::prelude::*;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Arc::new(
//!     DriveIntakeConfig::builder()
//!         .from_env()
//!         .backend_base_url("https://api.example.com")
//!         .mock_mode(true)
//!         .build()?,
//! );
//!
//! let provider = ProviderFactory::new(config.clone()).install_global()?;
//! let bridge = UploadBridge::from_config(provider, &config)?;
//!
//! let report = bridge.pick_and_upload(&()).await?;
//! for file in &report.uploaded {
//!     println!("{} -> {}", file.name, file.id);
//! }
//! for failure in &report.failures {
//!     eprintln!("{}", failure.message());
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_inception)]

// Core modules
pub mod auth;
pub mod bridge;
pub mod callback;
pub mod config;
pub mod errors;
pub mod factory;
pub mod host;
pub mod providers;
pub mod transport;
pub mod types;

// Test doubles, shared with the integration tests
pub mod mocks;

// Re-exports for convenience
pub use auth::{AccessToken, CredentialCache};
pub use bridge::{SelectedFiles, UploadBridge, UploadFailure, UploadObserver, UploadReport};
pub use config::{DriveIntakeConfig, DriveIntakeConfigBuilder};
pub use errors::{DriveIntakeError, DriveIntakeResult};
pub use factory::{ProviderFactory, ProviderHandle, ProviderStrategy};
pub use host::HostBindings;
pub use providers::FileProvider;
pub use types::{DownloadedFile, FileDescriptor, UploadedFile};

/// Prelude module with commonly used types and traits.
///
/// ```no_run
/// use integrations_drive_intake::prelude::*;
/// ```
pub mod prelude {
    // Configuration
    pub use crate::config::{DriveIntakeConfig, DriveIntakeConfigBuilder, PollConfig};

    // Providers
    pub use crate::factory::{ProviderFactory, ProviderHandle, ProviderStrategy};
    pub use crate::providers::{
        FileProvider, LegacyProvider, ManualProvider, MockProvider, RealProvider,
    };

    // Host surfaces
    pub use crate::host::{
        HostBindings, PickerSurface, SdkLoader, SessionAuth, TokenClient, UserPrompt,
    };

    // Upload
    pub use crate::bridge::{
        SelectedFiles, UploadBridge, UploadFailure, UploadObserver, UploadReport,
    };

    // Common types
    pub use crate::auth::AccessToken;
    pub use crate::types::{DownloadedFile, FileDescriptor, UploadedFile};

    // Errors
    pub use crate::errors::{DriveIntakeError, DriveIntakeResult};
}
