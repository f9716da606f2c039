//! Durable snapshots of model and optimizer state.
//!
//! A [`Checkpoint`] bundles the model parameters, optimizer parameters, the
//! [`RunConfig`] snapshot, and the epoch index. The training session emits
//! one at a fixed epoch cadence and one final `last` checkpoint at run end.
//! From the harness's perspective checkpoints are write-only artifacts; the
//! linear-probe entry point consumes them as its starting encoder state.
//!
//! Write failures are fatal: there is no partial-success or retry semantics,
//! so the run must execute where the save path is writable.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::RunConfig;
use crate::error::{TrainError, TrainResult};
use crate::StateDict;

/// Checkpoint format version for compatibility checking.
const CHECKPOINT_VERSION: u32 = 1;

/// A snapshot of one run's trainable state at a given epoch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Format version.
    pub version: u32,
    /// Model parameters by name.
    pub model: StateDict,
    /// Optimizer state (e.g. momentum buffers) by name.
    pub optimizer: StateDict,
    /// Configuration snapshot of the run that produced this checkpoint.
    pub config: RunConfig,
    /// Epoch (1-indexed) after which the snapshot was taken.
    pub epoch: usize,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl Checkpoint {
    /// Bundles the given state into a checkpoint.
    #[must_use]
    pub fn new(model: StateDict, optimizer: StateDict, config: RunConfig, epoch: usize) -> Self {
        Self {
            version: CHECKPOINT_VERSION,
            model,
            optimizer,
            config,
            epoch,
            created_at: Utc::now(),
        }
    }

    /// Writes the checkpoint to `path` as JSON.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> TrainResult<()> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|source| TrainError::CheckpointIo {
            path: path.display().to_string(),
            source,
        })?;
        let writer = BufWriter::new(file);
        serde_json::to_writer(writer, self).map_err(|e| TrainError::CheckpointCodec {
            path: path.display().to_string(),
            detail: e.to_string(),
        })
    }

    /// Reads a checkpoint previously written by [`Checkpoint::save`].
    pub fn load<P: AsRef<Path>>(path: P) -> TrainResult<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| TrainError::CheckpointIo {
            path: path.display().to_string(),
            source,
        })?;
        let reader = BufReader::new(file);
        let checkpoint: Self =
            serde_json::from_reader(reader).map_err(|e| TrainError::CheckpointCodec {
                path: path.display().to_string(),
                detail: e.to_string(),
            })?;
        if checkpoint.version != CHECKPOINT_VERSION {
            return Err(TrainError::CheckpointCodec {
                path: path.display().to_string(),
                detail: format!(
                    "incompatible checkpoint version {} (expected {CHECKPOINT_VERSION})",
                    checkpoint.version
                ),
            });
        }
        Ok(checkpoint)
    }
}

/// Strips a multi-device wrapper prefix (`module.`) from parameter names.
///
/// Checkpoints written from a data-parallel wrapper carry prefixed names;
/// the linear-probe entry point normalizes them before loading into a
/// single-device encoder.
#[must_use]
pub fn strip_module_prefix(state: &StateDict) -> StateDict {
    state
        .iter()
        .map(|(name, values)| {
            let name = name.strip_prefix("module.").unwrap_or(name).to_string();
            (name, values.clone())
        })
        .collect()
}

/// Names checkpoint files and writes them at the session's cadence.
#[derive(Debug, Clone)]
pub struct CheckpointManager {
    save_dir: PathBuf,
}

impl CheckpointManager {
    /// Creates a manager writing into `save_dir`, creating it if needed.
    pub fn new<P: Into<PathBuf>>(save_dir: P) -> TrainResult<Self> {
        let save_dir = save_dir.into();
        std::fs::create_dir_all(&save_dir).map_err(|source| TrainError::CheckpointIo {
            path: save_dir.display().to_string(),
            source,
        })?;
        Ok(Self { save_dir })
    }

    /// Directory this manager writes into.
    #[must_use]
    pub fn save_dir(&self) -> &Path {
        &self.save_dir
    }

    /// Path of the periodic checkpoint for `epoch`.
    #[must_use]
    pub fn epoch_path(&self, epoch: usize) -> PathBuf {
        self.save_dir.join(format!("ckpt_epoch_{epoch}.json"))
    }

    /// Path of the final checkpoint.
    #[must_use]
    pub fn last_path(&self) -> PathBuf {
        self.save_dir.join("last.json")
    }

    /// Writes the periodic checkpoint for `checkpoint.epoch`.
    pub fn save_epoch(&self, checkpoint: &Checkpoint) -> TrainResult<PathBuf> {
        let path = self.epoch_path(checkpoint.epoch);
        checkpoint.save(&path)?;
        tracing::info!(path = %path.display(), epoch = checkpoint.epoch, "saved checkpoint");
        Ok(path)
    }

    /// Writes the unconditional end-of-run checkpoint.
    pub fn save_last(&self, checkpoint: &Checkpoint) -> TrainResult<PathBuf> {
        let path = self.last_path();
        checkpoint.save(&path)?;
        tracing::info!(path = %path.display(), epoch = checkpoint.epoch, "saved final checkpoint");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn sample_state() -> StateDict {
        let mut state = BTreeMap::new();
        state.insert("encoder.fc1.weight".to_string(), vec![0.25f32, -1.5, 3.75]);
        state.insert("classifier.bias".to_string(), vec![0.0f32, 1.0]);
        state
    }

    #[test]
    fn test_round_trip_is_bit_identical() {
        let dir = tempfile::tempdir().unwrap();
        let config = RunConfig::default();
        let checkpoint = Checkpoint::new(sample_state(), StateDict::new(), config, 7);
        let path = dir.path().join("ckpt.json");
        checkpoint.save(&path).unwrap();

        let restored = Checkpoint::load(&path).unwrap();
        assert_eq!(restored.epoch, 7);
        for (name, values) in &checkpoint.model {
            let restored_values = &restored.model[name];
            assert_eq!(values.len(), restored_values.len());
            for (a, b) in values.iter().zip(restored_values.iter()) {
                assert_eq!(a.to_bits(), b.to_bits(), "param {name} drifted");
            }
        }
    }

    #[test]
    fn test_unwritable_path_is_fatal() {
        let checkpoint =
            Checkpoint::new(StateDict::new(), StateDict::new(), RunConfig::default(), 1);
        let err = checkpoint
            .save("/nonexistent-dir/deeper/ckpt.json")
            .unwrap_err();
        assert!(matches!(err, TrainError::CheckpointIo { .. }));
    }

    #[test]
    fn test_strip_module_prefix() {
        let mut state = StateDict::new();
        state.insert("module.encoder.fc1.weight".to_string(), vec![1.0]);
        state.insert("classifier.bias".to_string(), vec![2.0]);
        let stripped = strip_module_prefix(&state);
        assert!(stripped.contains_key("encoder.fc1.weight"));
        assert!(stripped.contains_key("classifier.bias"));
        assert!(!stripped.contains_key("module.encoder.fc1.weight"));
    }

    #[test]
    fn test_manager_paths() {
        let dir = tempfile::tempdir().unwrap();
        let manager = CheckpointManager::new(dir.path().join("save")).unwrap();
        assert!(manager.save_dir().exists());
        assert!(manager
            .epoch_path(50)
            .to_string_lossy()
            .ends_with("ckpt_epoch_50.json"));
        assert!(manager.last_path().to_string_lossy().ends_with("last.json"));
    }
}
