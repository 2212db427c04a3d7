//! Delivery of rendered documents to reMarkable Cloud.
//!
//! [`RmapiClient`] is the production [`DeliveryClient`]; [`deliver`] adds the
//! existence check that makes repeated runs skip documents already uploaded.

pub mod rmapi;

#[cfg(any(test, feature = "test-export-mocks"))]
pub mod memory;

use std::collections::HashSet;
use std::path::Path;

use tracing::{debug, info};

use crate::contract::{DeliveryClient, DeliveryStatus};
use crate::error::DeliveryError;

#[cfg(any(test, feature = "test-export-mocks"))]
pub use memory::MemoryDelivery;
pub use rmapi::RmapiClient;

/// Name a file gets in the remote folder: the tool drops the extension.
pub fn remote_name(local_path: &Path) -> String {
    local_path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// `{root}/{feed_dir}`.
pub fn feed_folder(root: &str, feed_dir: &str) -> String {
    format!("{}/{}", root.trim_end_matches('/'), feed_dir)
}

/// Upload `local_path` unless `listing` already holds its remote name.
///
/// `listing` is the folder's known contents; it is updated after a successful
/// upload so later entries in the same run see the new document.
pub async fn deliver<C>(
    client: &C,
    local_path: &Path,
    folder: &str,
    listing: &mut HashSet<String>,
) -> Result<DeliveryStatus, DeliveryError>
where
    C: DeliveryClient + ?Sized,
{
    let name = remote_name(local_path);
    if listing.contains(&name) {
        info!(folder, name = %name, "File already exists in reMarkable Cloud, skipping");
        return Ok(DeliveryStatus::SkippedDuplicate);
    }

    debug!(folder, path = %local_path.display(), "Uploading document");
    client.upload(local_path, folder).await?;
    info!(folder, name = %name, "Successfully uploaded to reMarkable");
    listing.insert(name);
    Ok(DeliveryStatus::Delivered)
}
