//! Asset loading: named assets in, shared handles out
//!
//! Only the arena layout is loaded today. Failures are reported and retried
//! where that can help, but never stop a room from running.

mod loader;

pub use loader::{load_arena_layout, load_with_retry, DirAssetLoader};

use std::io;
use std::sync::Arc;

use serde::de::DeserializeOwned;

/// A loaded asset. Cloning shares the bytes.
#[derive(Debug, Clone)]
pub struct AssetHandle {
    name: Arc<str>,
    bytes: Arc<[u8]>,
}

impl AssetHandle {
    pub fn new(name: &str, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn parse_json<T: DeserializeOwned>(&self) -> Result<T, AssetError> {
        serde_json::from_slice(&self.bytes).map_err(|e| AssetError::Parse {
            name: self.name.to_string(),
            reason: e.to_string(),
        })
    }
}

/// "Load named asset -> handle" and "release handle"
pub trait AssetLoader: Send + Sync {
    fn load(&self, name: &str) -> Result<AssetHandle, AssetError>;
    fn release(&self, handle: AssetHandle);
}

/// Asset errors
#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    #[error("Asset not found: {0}")]
    NotFound(String),

    #[error("Invalid asset name: {0:?}")]
    InvalidName(String),

    #[error("I/O error loading {name}: {source}")]
    Io {
        name: String,
        #[source]
        source: io::Error,
    },

    #[error("Malformed asset {name}: {reason}")]
    Parse { name: String, reason: String },
}

impl AssetError {
    /// Whether trying again later could succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            AssetError::Io { source, .. } => !matches!(
                source.kind(),
                io::ErrorKind::PermissionDenied | io::ErrorKind::InvalidInput
            ),
            AssetError::NotFound(_) | AssetError::InvalidName(_) | AssetError::Parse { .. } => false,
        }
    }
}
