use crate::callback::once_callback;
use crate::errors::{DriveIntakeResult, PickerError};
use crate::host::{PickerCallback, PickerSpec, PickerSurface};
use crate::types::FileDescriptor;
use tracing::{info, warn};

/// Shows the picker and waits for its first terminal event.
///
/// A dialog that goes away without reporting anything counts as a cancel.
pub(crate) async fn present(
    surface: &dyn PickerSurface,
    spec: PickerSpec,
) -> DriveIntakeResult<Vec<FileDescriptor>> {
    let (callback, pending) = once_callback();

    surface
        .show(spec, PickerCallback::new(callback))
        .map_err(PickerError::ConstructionFailed)?;

    let documents = pending.wait().await.unwrap_or_default();

    let mut descriptors = Vec::with_capacity(documents.len());
    for doc in documents {
        match FileDescriptor::try_from(doc) {
            Ok(descriptor) => descriptors.push(descriptor),
            Err(doc) => warn!(id = %doc.id, "Dropping picker document without id or name"),
        }
    }

    info!(count = descriptors.len(), "Picker closed");
    Ok(descriptors)
}
