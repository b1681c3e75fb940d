//! Bounded waiting for external SDK libraries.

use crate::config::PollConfig;
use crate::errors::DependencyLoadError;
use crate::host::{SdkLibrary, SdkLoader};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Inserts each library at most once and polls until all are ready.
pub struct DependencyGate {
    loader: Arc<dyn SdkLoader>,
    poll: PollConfig,
    inserted: Mutex<HashSet<SdkLibrary>>,
}

impl DependencyGate {
    /// Creates a gate over a host loader.
    pub fn new(loader: Arc<dyn SdkLoader>, poll: PollConfig) -> Self {
        Self {
            loader,
            poll,
            inserted: Mutex::new(HashSet::new()),
        }
    }

    /// Makes sure every library is loaded, failing after the polling window.
    pub async fn ensure(&self, libraries: &[SdkLibrary]) -> Result<(), DependencyLoadError> {
        for &library in libraries {
            if self.loader.is_ready(library) || !self.mark_inserted(library) {
                continue;
            }

            debug!(library = %library, source = library.source(), "Inserting SDK library");
            if let Err(message) = self.loader.insert(library) {
                warn!(library = %library, error = %message, "SDK library insertion failed");
                self.unmark_inserted(library);
                return Err(DependencyLoadError::InsertFailed {
                    library: library.to_string(),
                    message,
                });
            }
        }

        for attempt in 1..=self.poll.max_attempts {
            match libraries.iter().find(|lib| !self.loader.is_ready(**lib)) {
                None => return Ok(()),
                Some(pending) if attempt == self.poll.max_attempts => {
                    warn!(
                        library = %pending,
                        attempts = attempt,
                        "SDK library did not become ready"
                    );
                    return Err(DependencyLoadError::TimedOut {
                        library: pending.to_string(),
                        attempts: attempt,
                    });
                }
                Some(_) => tokio::time::sleep(self.poll.interval).await,
            }
        }

        Ok(())
    }

    fn mark_inserted(&self, library: SdkLibrary) -> bool {
        self.inserted
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(library)
    }

    fn unmark_inserted(&self, library: SdkLibrary) {
        self.inserted
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&library);
    }
}
