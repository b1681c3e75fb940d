//! Single-resolution bridge between host callbacks and futures.
//!
//! Host SDKs report OAuth and picker outcomes through callbacks that may fire
//! more than once. [`once_callback`] hands out a cloneable callback and a
//! [`Pending`] future; the first call resolves the future and every later call
//! is dropped.

use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::oneshot;
use tracing::debug;

/// Callback handed to the host. Only the first call has effect.
pub struct OnceCallback<T> {
    slot: Arc<Mutex<Option<oneshot::Sender<T>>>>,
}

impl<T> Clone for OnceCallback<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<T> std::fmt::Debug for OnceCallback<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnceCallback")
            .field("resolved", &self.is_resolved())
            .finish()
    }
}

impl<T> OnceCallback<T> {
    /// Delivers a value. Returns false when the callback already fired.
    pub fn call(&self, value: T) -> bool {
        match self.lock().take() {
            Some(sender) => {
                // The receiver may be gone if the caller gave up waiting.
                let _ = sender.send(value);
                true
            }
            None => {
                debug!("Ignoring repeated host callback");
                false
            }
        }
    }

    /// Whether a value was already delivered.
    pub fn is_resolved(&self) -> bool {
        self.lock().is_none()
    }

    fn lock(&self) -> MutexGuard<'_, Option<oneshot::Sender<T>>> {
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Future side of a [`OnceCallback`].
#[derive(Debug)]
pub struct Pending<T> {
    receiver: oneshot::Receiver<T>,
}

impl<T> Pending<T> {
    /// Waits for the first callback value.
    ///
    /// Returns `None` when every callback handle was dropped without firing.
    pub async fn wait(self) -> Option<T> {
        self.receiver.await.ok()
    }
}

/// Creates a connected callback/future pair.
pub fn once_callback<T>() -> (OnceCallback<T>, Pending<T>) {
    let (sender, receiver) = oneshot::channel();
    (
        OnceCallback {
            slot: Arc::new(Mutex::new(Some(sender))),
        },
        Pending { receiver },
    )
}
