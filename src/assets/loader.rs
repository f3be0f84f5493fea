//! Directory-backed JSON assets with reference-counted handles

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use dashmap::DashMap;
use tracing::{debug, info, warn};

use crate::game::spawn::ArenaLayout;

use super::{AssetError, AssetHandle, AssetLoader};

struct Cached {
    handle: AssetHandle,
    refs: usize,
}

/// Loads `<root>/<name>.json`. Handles to the same name share one read
/// until every handle has been released.
pub struct DirAssetLoader {
    root: PathBuf,
    cache: DashMap<String, Cached>,
}

impl DirAssetLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            cache: DashMap::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Number of distinct assets currently held
    pub fn loaded(&self) -> usize {
        self.cache.len()
    }

    fn path_for(&self, name: &str) -> Result<PathBuf, AssetError> {
        let valid = !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(AssetError::InvalidName(name.to_string()));
        }
        Ok(self.root.join(format!("{name}.json")))
    }
}

impl AssetLoader for DirAssetLoader {
    fn load(&self, name: &str) -> Result<AssetHandle, AssetError> {
        if let Some(mut cached) = self.cache.get_mut(name) {
            cached.refs += 1;
            return Ok(cached.handle.clone());
        }

        let path = self.path_for(name)?;
        let bytes = std::fs::read(&path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => AssetError::NotFound(path.display().to_string()),
            _ => AssetError::Io {
                name: name.to_string(),
                source: e,
            },
        })?;
        debug!(asset = %name, bytes = bytes.len(), "Asset loaded");

        let handle = AssetHandle::new(name, bytes);
        self.cache
            .entry(name.to_string())
            .and_modify(|c| c.refs += 1)
            .or_insert_with(|| Cached {
                handle: handle.clone(),
                refs: 1,
            });
        Ok(handle)
    }

    fn release(&self, handle: AssetHandle) {
        let name = handle.name();
        let drop_entry = match self.cache.get_mut(name) {
            Some(mut cached) => {
                cached.refs = cached.refs.saturating_sub(1);
                cached.refs == 0
            }
            None => {
                warn!(asset = %name, "Release of an asset that is not loaded");
                false
            }
        };
        if drop_entry {
            self.cache.remove_if(name, |_, c| c.refs == 0);
            debug!(asset = %name, "Asset released");
        }
    }
}

/// Load with a fixed backoff between attempts; gives up early on errors
/// that retrying cannot fix
pub async fn load_with_retry<L: AssetLoader + ?Sized>(
    loader: &L,
    name: &str,
    attempts: u32,
    backoff: Duration,
) -> Result<AssetHandle, AssetError> {
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        match loader.load(name) {
            Ok(handle) => return Ok(handle),
            Err(e) if e.is_retryable() && attempt < attempts => {
                warn!(asset = %name, attempt, error = %e, "Asset load failed, retrying");
                tokio::time::sleep(backoff).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Arena layout for new rooms; any failure falls back to the default arena
pub async fn load_arena_layout<L: AssetLoader + ?Sized>(loader: &L, name: &str) -> ArenaLayout {
    let handle = match load_with_retry(loader, name, 3, Duration::from_millis(200)).await {
        Ok(handle) => handle,
        Err(e) => {
            warn!(asset = %name, error = %e, "Arena layout unavailable, using default arena");
            return ArenaLayout::default();
        }
    };

    let parsed = handle.parse_json::<ArenaLayout>();
    loader.release(handle);

    match parsed {
        Ok(layout) if layout.bounds.is_valid() => {
            info!(
                asset = %name,
                spawn_points = layout.spawn_points.len(),
                "Arena layout loaded"
            );
            layout
        }
        Ok(_) => {
            warn!(asset = %name, "Arena bounds are empty or inverted, using default arena");
            ArenaLayout::default()
        }
        Err(e) => {
            warn!(asset = %name, error = %e, "Arena layout unreadable, using default arena");
            ArenaLayout::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use uuid::Uuid;

    fn temp_root() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("arena-assets-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn handles_are_shared_until_released() {
        let root = temp_root();
        std::fs::write(root.join("arena.json"), r#"{"spawn_points": []}"#).unwrap();
        let loader = DirAssetLoader::new(&root);

        let a = loader.load("arena").unwrap();
        let b = loader.load("arena").unwrap();
        assert_eq!(a.bytes(), b.bytes());
        assert_eq!(loader.loaded(), 1);

        loader.release(a);
        assert_eq!(loader.loaded(), 1);
        loader.release(b);
        assert_eq!(loader.loaded(), 0);

        std::fs::remove_dir_all(root).ok();
    }

    #[test]
    fn missing_and_bad_names_are_not_found() {
        let loader = DirAssetLoader::new(temp_root());
        assert!(matches!(loader.load("nope"), Err(AssetError::NotFound(_))));
        assert!(matches!(
            loader.load("../secret"),
            Err(AssetError::InvalidName(_))
        ));
    }

    #[tokio::test]
    async fn arena_layout_parses_spawn_points() {
        let root = temp_root();
        std::fs::write(
            root.join("pit.json"),
            r#"{
                "spawn_points": [{"x": 1.0, "z": 2.0}, {"x": -1.0, "z": -2.0, "facing": 3.0}],
                "bounds": {"min_x": -5.0, "max_x": 5.0, "min_z": -5.0, "max_z": 5.0}
            }"#,
        )
        .unwrap();
        let loader = DirAssetLoader::new(&root);

        let layout = load_arena_layout(&loader, "pit").await;
        assert_eq!(layout.spawn_points.len(), 2);
        assert_eq!(layout.spawn_points[1].facing, 3.0);
        assert_eq!(layout.bounds.max_x, 5.0);
        assert_eq!(loader.loaded(), 0);

        std::fs::remove_dir_all(root).ok();
    }

    #[tokio::test]
    async fn broken_layout_falls_back_to_default() {
        let root = temp_root();
        std::fs::write(root.join("broken.json"), "{ not json").unwrap();
        let loader = DirAssetLoader::new(&root);

        assert_eq!(load_arena_layout(&loader, "broken").await, ArenaLayout::default());
        assert_eq!(load_arena_layout(&loader, "missing").await, ArenaLayout::default());

        std::fs::remove_dir_all(root).ok();
    }

    /// Fails with a transient error a fixed number of times
    struct Flaky {
        failures: AtomicU32,
    }

    impl AssetLoader for Flaky {
        fn load(&self, name: &str) -> Result<AssetHandle, AssetError> {
            if self.failures.load(Ordering::SeqCst) > 0 {
                self.failures.fetch_sub(1, Ordering::SeqCst);
                return Err(AssetError::Io {
                    name: name.to_string(),
                    source: io::Error::new(io::ErrorKind::TimedOut, "slow disk"),
                });
            }
            Ok(AssetHandle::new(name, b"{}".to_vec()))
        }

        fn release(&self, _handle: AssetHandle) {}
    }

    #[tokio::test(start_paused = true)]
    async fn retries_transient_failures() {
        let flaky = Flaky {
            failures: AtomicU32::new(2),
        };
        let handle = load_with_retry(&flaky, "arena", 3, Duration::from_millis(100))
            .await
            .unwrap();
        assert_eq!(handle.name(), "arena");

        let flaky = Flaky {
            failures: AtomicU32::new(5),
        };
        let err = load_with_retry(&flaky, "arena", 3, Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }
}
