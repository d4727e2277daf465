// ============================================================
// Layer 6 — Checkpoint Manager
// ============================================================
// Persists the best model seen so far using Burn's
// DefaultRecorder (full precision), plus a small JSON sidecar describing which
// epoch and validation scores the weights belong to.
//
// For --save-file ./trained_models/attn-0.pt the files are:
//
//   trained_models/
//     attn-0.mpk           ← weights (named MessagePack)
//     attn-0.json          ← { epoch, val_loss, val_accuracy, val_perplexity }
//     attn-0.config.json   ← the run configuration
//
// The recorder replaces the user's extension with its own, so
// "attn-0.pt" and "attn-0" refer to the same checkpoint.
//
// A corrupt or mismatched file surfaces as a recorder error
// from `load_model`.
//
// Reference: Burn Book §5 (Records and Checkpointing)

use anyhow::{Context, Result};
use burn::{
    module::Module,
    record::DefaultRecorder,
    tensor::backend::Backend,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{fs, path::{Path, PathBuf}};

use crate::domain::summary::ValidationSummary;

/// File extension DefaultRecorder writes
pub const WEIGHTS_EXTENSION: &str = "mpk";

/// Describes the weights stored next to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointMeta {
    /// Epoch that produced the weights (0 = before training)
    pub epoch:          usize,
    pub val_loss:       f64,
    pub val_accuracy:   f64,
    pub val_perplexity: f64,
}

impl CheckpointMeta {
    pub fn new(epoch: usize, summary: &ValidationSummary) -> Self {
        Self {
            epoch,
            val_loss:       summary.loss,
            val_accuracy:   summary.accuracy,
            val_perplexity: summary.perplexity,
        }
    }
}

pub struct CheckpointManager {
    /// Save path without extension, e.g. trained_models/attn-0
    base: PathBuf,
}

impl CheckpointManager {
    /// Creates the parent directory if it doesn't already exist.
    pub fn new(save_file: impl AsRef<Path>) -> Result<Self> {
        let base = save_file.as_ref().with_extension("");
        if let Some(parent) = base.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Cannot create checkpoint dir '{}'", parent.display()))?;
        }
        Ok(Self { base })
    }

    /// Directory holding the checkpoint files
    pub fn dir(&self) -> PathBuf {
        match self.base.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    /// Path of a sibling file, e.g. sibling("tokenizer.json") → attn-0.tokenizer.json
    pub fn sibling(&self, suffix: &str) -> PathBuf {
        let stem = self.base.file_name().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
        self.dir().join(format!("{stem}.{suffix}"))
    }

    pub fn weights_path(&self) -> PathBuf {
        self.base.with_extension(WEIGHTS_EXTENSION)
    }

    pub fn meta_path(&self) -> PathBuf {
        self.base.with_extension("json")
    }

    /// True if weights were saved by a previous run
    pub fn exists(&self) -> bool {
        self.weights_path().exists()
    }

    /// Write the model weights and their sidecar.
    pub fn save_model<B: Backend, M: Module<B>>(&self, model: &M, meta: &CheckpointMeta) -> Result<()> {
        model
            .clone()
            .save_file(self.base.clone(), &DefaultRecorder::new())
            .map_err(|e| anyhow::anyhow!(
                "Failed to save checkpoint to '{}': {:?}", self.weights_path().display(), e
            ))?;

        self.write_json(&self.meta_path(), meta)?;
        tracing::debug!("Saved checkpoint: epoch {} acc {:.2}%", meta.epoch, meta.val_accuracy);
        Ok(())
    }

    /// Load weights from this manager's save path into `model`.
    pub fn load_model<B: Backend, M: Module<B>>(&self, model: M, device: &B::Device) -> Result<M> {
        load_weights(model, &self.base, device)
    }

    /// Continue from a previous run's best weights when they exist,
    /// otherwise hand `model` back untouched.
    pub fn resume<B: Backend, M: Module<B>>(&self, model: M, device: &B::Device) -> Result<M> {
        if !self.exists() {
            return Ok(model);
        }
        tracing::info!("Resuming from checkpoint '{}'", self.weights_path().display());
        self.load_model(model, device)
    }

    pub fn load_meta(&self) -> Result<CheckpointMeta> {
        self.read_json(&self.meta_path())
    }

    /// Save the run configuration so a later run can inspect it.
    pub fn save_config<C: Serialize>(&self, cfg: &C) -> Result<()> {
        self.write_json(&self.sibling("config.json"), cfg)
    }

    fn write_json<T: Serialize + ?Sized>(&self, path: &Path, value: &T) -> Result<()> {
        let json = serde_json::to_string_pretty(value)?;
        fs::write(path, json).with_context(|| format!("Cannot write '{}'", path.display()))
    }

    fn read_json<T: DeserializeOwned>(&self, path: &Path) -> Result<T> {
        let json = fs::read_to_string(path)
            .with_context(|| format!("Cannot read '{}'", path.display()))?;
        Ok(serde_json::from_str(&json)?)
    }
}

/// Load weights from an arbitrary path (extension optional).
/// Used for --load-model and for ensemble members.
pub fn load_weights<B: Backend, M: Module<B>>(model: M, path: &Path, device: &B::Device) -> Result<M> {
    let base = path.with_extension("");
    tracing::info!("Loading weights from '{}'", base.with_extension(WEIGHTS_EXTENSION).display());
    model
        .load_file(base.clone(), &DefaultRecorder::new(), device)
        .map_err(|e| anyhow::anyhow!("Cannot load weights '{}': {:?}", base.display(), e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::{
        backend::NdArray,
        nn::{Linear, LinearConfig},
        prelude::*,
        record::FileRecorder,
    };

    type TestBackend = NdArray;

    #[test]
    fn test_paths_follow_save_file() {
        let dir  = tempfile::tempdir().unwrap();
        let ckpt = CheckpointManager::new(dir.path().join("models/attn-0.pt")).unwrap();
        assert_eq!(ckpt.weights_path(), dir.path().join("models/attn-0.mpk"));
        assert_eq!(ckpt.meta_path(), dir.path().join("models/attn-0.json"));
        assert_eq!(ckpt.sibling("tokenizer.json"), dir.path().join("models/attn-0.tokenizer.json"));
        assert!(dir.path().join("models").is_dir());
        assert!(!ckpt.exists());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir    = tempfile::tempdir().unwrap();
        let ckpt   = CheckpointManager::new(dir.path().join("linear.pt")).unwrap();
        let device = Default::default();

        let model: Linear<TestBackend> = LinearConfig::new(3, 2).init(&device);
        let meta = CheckpointMeta::new(4, &ValidationSummary::from_totals(2.0, 3, 4));
        ckpt.save_model(&model, &meta).unwrap();
        assert!(ckpt.exists());
        assert_eq!(ckpt.load_meta().unwrap(), meta);

        let fresh: Linear<TestBackend> = LinearConfig::new(3, 2).init(&device);
        let loaded = ckpt.load_model(fresh, &device).unwrap();

        let x = Tensor::<TestBackend, 2>::ones([1, 3], &device);
        let expected: Vec<f32> = model.forward(x.clone()).into_data().to_vec().unwrap();
        let actual: Vec<f32>   = loaded.forward(x).into_data().to_vec().unwrap();
        for (a, b) in expected.iter().zip(&actual) {
            assert!((a - b).abs() < 1e-6, "{a} vs {b}");
        }
    }

    #[test]
    fn test_extension_matches_recorder() {
        let dir    = tempfile::tempdir().unwrap();
        let ckpt   = CheckpointManager::new(dir.path().join("attn-0.pt")).unwrap();
        let device = Default::default();

        let model: Linear<TestBackend> = LinearConfig::new(2, 2).init(&device);
        ckpt.save_model(&model, &CheckpointMeta::new(1, &ValidationSummary::from_totals(1.0, 1, 2))).unwrap();

        assert_eq!(<DefaultRecorder as FileRecorder<TestBackend>>::file_extension(), WEIGHTS_EXTENSION);
        assert!(ckpt.weights_path().is_file());
        assert!(ckpt.exists());
    }

    #[test]
    fn test_resume_only_when_checkpoint_exists() {
        let dir    = tempfile::tempdir().unwrap();
        let ckpt   = CheckpointManager::new(dir.path().join("lm-0.pt")).unwrap();
        let device = Default::default();
        let x      = Tensor::<TestBackend, 2>::ones([1, 3], &device);

        // Nothing saved yet: the model comes back as it was
        let fresh: Linear<TestBackend> = LinearConfig::new(3, 2).init(&device);
        let before: Vec<f32> = fresh.forward(x.clone()).into_data().to_vec().unwrap();
        let same = ckpt.resume(fresh, &device).unwrap();
        let after: Vec<f32> = same.forward(x.clone()).into_data().to_vec().unwrap();
        assert_eq!(before, after);

        let best: Linear<TestBackend> = LinearConfig::new(3, 2).init(&device);
        ckpt.save_model(&best, &CheckpointMeta::new(2, &ValidationSummary::from_totals(1.0, 2, 2))).unwrap();
        assert!(ckpt.exists());

        let resumed: Linear<TestBackend> = ckpt.resume(LinearConfig::new(3, 2).init(&device), &device).unwrap();
        let expected: Vec<f32> = best.forward(x.clone()).into_data().to_vec().unwrap();
        let actual: Vec<f32>   = resumed.forward(x).into_data().to_vec().unwrap();
        assert_eq!(expected, actual);
    }

    #[test]
    fn test_loading_missing_weights_fails() {
        let dir    = tempfile::tempdir().unwrap();
        let device = Default::default();
        let model: Linear<TestBackend> = LinearConfig::new(2, 2).init(&device);
        assert!(load_weights(model, &dir.path().join("nothing.pt"), &device).is_err());
    }

    #[test]
    fn test_config_round_trip() {
        let dir  = tempfile::tempdir().unwrap();
        let ckpt = CheckpointManager::new(dir.path().join("run.pt")).unwrap();
        ckpt.save_config(&vec![1u32, 2, 3]).unwrap();
        let json = fs::read_to_string(ckpt.sibling("config.json")).unwrap();
        let back: Vec<u32> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, vec![1, 2, 3]);
    }
}
