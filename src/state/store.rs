// src/state/store.rs
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use super::DeliveryState;

pub const DEFAULT_STATE_PATH: &str = "./data/state.json";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("serializing delivery state")]
    Serialize(#[from] serde_json::Error),
    #[error("writing state file {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// JSON file holding the [`DeliveryState`].
#[derive(Debug, Clone)]
pub struct WatermarkStore {
    path: PathBuf,
}

impl WatermarkStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the persisted state. Never fails: a missing file yields (and writes) the
    /// default state, an unreadable one is set aside and replaced by the default.
    pub async fn load(&self) -> DeliveryState {
        let raw = match fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %self.path.display(), "state file not found, creating with defaults");
                let state = DeliveryState::default();
                if let Err(e) = self.save(&state).await {
                    tracing::error!(error = ?e, "failed to write initial state file");
                }
                return state;
            }
            Err(e) => {
                tracing::error!(error = ?e, path = %self.path.display(), "failed to read state file, falling back to defaults");
                return DeliveryState::default();
            }
        };

        match DeliveryState::from_json(&raw) {
            Ok(state) => state,
            Err(e) => {
                tracing::error!(error = %e, path = %self.path.display(), "failed to parse state file, falling back to defaults");
                self.set_aside(&raw).await;
                DeliveryState::default()
            }
        }
    }

    /// Overwrite the state file atomically: temp file in the same directory, fsync, rename.
    pub async fn save(&self, state: &DeliveryState) -> Result<(), StoreError> {
        let body = state.to_json()?;
        let io_err = |source| StoreError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).await.map_err(io_err)?;
        }

        let tmp = self.tmp_path();
        let mut file = fs::File::create(&tmp).await.map_err(io_err)?;
        file.write_all(body.as_bytes()).await.map_err(io_err)?;
        file.sync_all().await.map_err(io_err)?;
        drop(file);

        fs::rename(&tmp, &self.path).await.map_err(io_err)?;
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    async fn set_aside(&self, raw: &str) {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".corrupt");
        let target = self.path.with_file_name(name);
        if let Err(e) = fs::write(&target, raw).await {
            tracing::warn!(error = ?e, "could not keep a copy of the corrupt state file");
        } else {
            tracing::warn!(path = %target.display(), "kept a copy of the corrupt state file");
        }
    }
}
