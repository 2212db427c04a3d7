//! In-memory [`DeliveryClient`] for tests: folders are sets of remote names.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::contract::DeliveryClient;
use crate::error::DeliveryError;

use super::remote_name;

#[derive(Debug, Default)]
pub struct MemoryDelivery {
    folders: Mutex<HashMap<String, HashSet<String>>>,
    uploads: AtomicUsize,
    fail_uploads: bool,
}

impl MemoryDelivery {
    pub fn new() -> Self {
        Self::default()
    }

    /// A client whose uploads always fail, as when the token has expired.
    pub fn failing_uploads() -> Self {
        Self {
            fail_uploads: true,
            ..Self::default()
        }
    }

    /// Pre-populate `folder` with `names`, creating it if needed.
    pub fn with_documents(self, folder: &str, names: &[&str]) -> Self {
        if let Ok(mut folders) = self.folders.lock() {
            folders
                .entry(folder.to_string())
                .or_default()
                .extend(names.iter().map(|n| n.to_string()));
        }
        self
    }

    pub fn upload_count(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }

    pub fn folder_exists(&self, folder: &str) -> bool {
        self.folders
            .lock()
            .map(|folders| folders.contains_key(folder))
            .unwrap_or(false)
    }

    /// Sorted contents of `folder`.
    pub fn documents(&self, folder: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .folders
            .lock()
            .ok()
            .and_then(|folders| folders.get(folder).cloned())
            .unwrap_or_default()
            .into_iter()
            .collect();
        names.sort();
        names
    }

    fn poisoned(operation: &str) -> DeliveryError {
        DeliveryError::Failed {
            operation: operation.to_string(),
            status: "poisoned".to_string(),
            diagnostic: "in-memory store lock poisoned".to_string(),
        }
    }
}

#[async_trait]
impl DeliveryClient for MemoryDelivery {
    async fn ensure_folder(&self, folder: &str) -> Result<(), DeliveryError> {
        let mut folders = self.folders.lock().map_err(|_| Self::poisoned("mkdir"))?;
        folders.entry(folder.to_string()).or_default();
        Ok(())
    }

    async fn list_folder(&self, folder: &str) -> Result<HashSet<String>, DeliveryError> {
        let folders = self.folders.lock().map_err(|_| Self::poisoned("ls"))?;
        folders.get(folder).cloned().ok_or_else(|| DeliveryError::Failed {
            operation: "ls".to_string(),
            status: "exit status: 1".to_string(),
            diagnostic: format!("directory doesn't exist: {folder}"),
        })
    }

    async fn upload(&self, local_path: &Path, folder: &str) -> Result<(), DeliveryError> {
        if self.fail_uploads {
            return Err(DeliveryError::Failed {
                operation: "put".to_string(),
                status: "exit status: 1".to_string(),
                diagnostic: "Error: failed to upload: unauthorized".to_string(),
            });
        }
        let mut folders = self.folders.lock().map_err(|_| Self::poisoned("put"))?;
        let contents = folders.get_mut(folder).ok_or_else(|| DeliveryError::Failed {
            operation: "put".to_string(),
            status: "exit status: 1".to_string(),
            diagnostic: format!("directory doesn't exist: {folder}"),
        })?;
        contents.insert(remote_name(local_path));
        self.uploads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn version(&self) -> Result<String, DeliveryError> {
        Ok("rmapi in-memory".to_string())
    }
}
