// ============================================================
// Layer 2 — Run Configuration
// ============================================================
// One serialisable config per pipeline. The CLI converts its
// arguments into these structs, so everything below Layer 1 is
// independent of clap. Each config is validated before any
// file is read and saved as JSON next to the checkpoint.

use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use crate::ml::{mixture::ElboEstimator, trainer::FitSettings};

// ─── Choice enums ─────────────────────────────────────────────────────────────
// Each parses case-insensitively from its lowercase name and
// displays as that name, so clap can use FromStr directly.
macro_rules! named_choice {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.to_ascii_lowercase().as_str() {
                    $($text => Ok(Self::$variant),)+
                    other => Err(format!(
                        "unknown {} '{}' (expected one of: {})",
                        stringify!($name), other, [$($text),+].join(", ")
                    )),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                match self {
                    $(Self::$variant => f.write_str($text),)+
                }
            }
        }
    };
}

/// Where tensors live
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    /// WGPU (Vulkan / Metal / DX12)
    #[default]
    Gpu,
    /// NdArray on the CPU
    Cpu,
}
named_choice!(DeviceKind { Gpu => "gpu", Cpu => "cpu" });

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LmKind {
    Nnlm,
    #[default]
    Lstm,
}
named_choice!(LmKind { Nnlm => "nnlm", Lstm => "lstm" });

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Algo {
    #[default]
    Attention,
    Ensemble,
    Vae,
}
named_choice!(Algo { Attention => "attention", Ensemble => "ensemble", Vae => "vae" });

// ─── Language model ───────────────────────────────────────────────────────────
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LmConfig {
    pub train_file:   String,
    pub val_file:     String,
    pub model:        LmKind,
    pub seq_len:      usize,
    pub batch_size:   usize,
    pub epochs:       usize,
    pub lr:           f64,
    pub weight_decay: f64,
    pub grad_clip:    Option<f64>,
    pub log_freq:     usize,
    pub save_file:    String,
    pub embed_dim:    usize,
    pub hidden_size:  usize,
    pub context:      usize,
    pub dropout:      f64,
    pub vocab_size:   usize,
    pub seed:         u64,
    pub device:       DeviceKind,
}

impl Default for LmConfig {
    fn default() -> Self {
        Self {
            train_file:   "data/lm/train.txt".to_string(),
            val_file:     "data/lm/valid.txt".to_string(),
            model:        LmKind::Lstm,
            seq_len:      32,
            batch_size:   20,
            epochs:       10,
            lr:           1e-4,
            weight_decay: 0.0,
            grad_clip:    None,
            log_freq:     100,
            save_file:    "./trained_models/lm-0.pt".to_string(),
            embed_dim:    128,
            hidden_size:  256,
            context:      3,
            dropout:      0.2,
            vocab_size:   10_000,
            seed:         42,
            device:       DeviceKind::Gpu,
        }
    }
}

impl LmConfig {
    pub fn validate(&self) -> Result<()> {
        validate_common(self.epochs, self.batch_size, self.lr, self.weight_decay, self.grad_clip, self.log_freq)?;
        ensure!(self.seq_len > 0, "--seq-len must be at least 1");
        ensure!(self.context > 0, "--context must be at least 1");
        ensure!((0.0..1.0).contains(&self.dropout), "--dropout must be in [0, 1), got {}", self.dropout);
        Ok(())
    }

    pub fn fit_settings(&self, num_batches: usize) -> FitSettings {
        FitSettings {
            epochs:         self.epochs,
            lr:             self.lr,
            weight_decay:   self.weight_decay,
            grad_clip:      self.grad_clip,
            log_freq:       self.log_freq,
            num_batches,
            visualize_freq: 0,
        }
    }
}

// ─── Entailment ───────────────────────────────────────────────────────────────
/// Default learning rate of the entailment command
pub const ENTAIL_DEFAULT_LR: f64 = 1e-4;
/// Learning rate the VAE uses when --lr is left at its default
pub const VAE_DEFAULT_LR: f64 = 1e-3;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntailConfig {
    pub algo:           Algo,
    pub train_file:     String,
    pub val_file:       String,
    pub test_file:      String,
    pub epochs:         usize,
    pub lr:             f64,
    pub weight_decay:   f64,
    pub grad_clip:      f64,
    pub elbo:           ElboEstimator,
    pub log_freq:       usize,
    pub save_file:      String,
    pub intra_attn:     bool,
    pub pred_suffix:    String,
    pub load_model:     String,
    pub visualize_freq: usize,
    pub save_img:       String,
    pub batch_size:     usize,
    pub embed_dim:      usize,
    pub hidden_size:    usize,
    pub num_layers:     usize,
    pub dropout:        f64,
    pub num_models:     usize,
    pub kl_weight:      f64,
    pub vocab_size:     usize,
    pub seed:           u64,
    pub device:         DeviceKind,
}

impl Default for EntailConfig {
    fn default() -> Self {
        Self {
            algo:           Algo::Attention,
            train_file:     "data/snli/train.tsv".to_string(),
            val_file:       "data/snli/val.tsv".to_string(),
            test_file:      "data/snli/test.tsv".to_string(),
            epochs:         15,
            lr:             ENTAIL_DEFAULT_LR,
            weight_decay:   0.0,
            grad_clip:      5.0,
            elbo:           ElboEstimator::Reinforce,
            log_freq:       10_000,
            save_file:      "./trained_models/attn-0.pt".to_string(),
            intra_attn:     false,
            pred_suffix:    String::new(),
            load_model:     String::new(),
            visualize_freq: 10_000,
            save_img:       "attn-0".to_string(),
            batch_size:     32,
            embed_dim:      100,
            hidden_size:    200,
            num_layers:     2,
            dropout:        0.2,
            num_models:     4,
            kl_weight:      0.33,
            vocab_size:     20_000,
            seed:           42,
            device:         DeviceKind::Gpu,
        }
    }
}

impl EntailConfig {
    pub fn validate(&self) -> Result<()> {
        validate_common(self.epochs, self.batch_size, self.lr, self.weight_decay, Some(self.grad_clip), self.log_freq)?;
        ensure!(self.num_models > 0, "--num-models must be at least 1");
        ensure!(self.num_layers > 0, "--num-layers must be at least 1");
        ensure!(self.kl_weight >= 0.0, "--kl-weight must be non-negative, got {}", self.kl_weight);
        ensure!((0.0..1.0).contains(&self.dropout), "--dropout must be in [0, 1), got {}", self.dropout);
        Ok(())
    }

    /// The VAE trains at 1e-3 unless a learning rate was given explicitly.
    pub fn effective_lr(&self) -> f64 {
        if self.algo == Algo::Vae && self.lr == ENTAIL_DEFAULT_LR {
            VAE_DEFAULT_LR
        } else {
            self.lr
        }
    }

    pub fn fit_settings(&self, num_batches: usize) -> FitSettings {
        FitSettings {
            epochs:         self.epochs,
            lr:             self.effective_lr(),
            weight_decay:   self.weight_decay,
            grad_clip:      Some(self.grad_clip),
            log_freq:       self.log_freq,
            num_batches,
            visualize_freq: if self.algo == Algo::Attention { self.visualize_freq } else { 0 },
        }
    }
}

fn validate_common(
    epochs:       usize,
    batch_size:   usize,
    lr:           f64,
    weight_decay: f64,
    grad_clip:    Option<f64>,
    log_freq:     usize,
) -> Result<()> {
    ensure!(epochs > 0, "--epochs must be at least 1");
    ensure!(batch_size > 0, "--batch-size must be at least 1");
    ensure!(lr > 0.0, "--lr must be positive, got {lr}");
    ensure!(weight_decay >= 0.0, "--weight-decay must be non-negative, got {weight_decay}");
    if let Some(clip) = grad_clip {
        ensure!(clip > 0.0, "--grad-clip must be positive, got {clip}");
    }
    ensure!(log_freq > 0, "--log-freq must be at least 1");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(LmConfig::default().validate().is_ok());
        assert!(EntailConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_hyperparameters() {
        let cfg = LmConfig { epochs: 0, ..Default::default() };
        assert!(cfg.validate().is_err());

        let cfg = LmConfig { seq_len: 0, ..Default::default() };
        assert!(cfg.validate().is_err());

        let cfg = LmConfig { grad_clip: Some(0.0), ..Default::default() };
        assert!(cfg.validate().is_err());

        let cfg = EntailConfig { lr: -1e-3, ..Default::default() };
        assert!(cfg.validate().is_err());

        let cfg = EntailConfig { weight_decay: -0.1, ..Default::default() };
        assert!(cfg.validate().is_err());

        let cfg = EntailConfig { num_models: 0, ..Default::default() };
        assert!(cfg.validate().is_err());

        let cfg = EntailConfig { log_freq: 0, ..Default::default() };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_vae_learning_rate_override() {
        let vae = EntailConfig { algo: Algo::Vae, ..Default::default() };
        assert_eq!(vae.effective_lr(), VAE_DEFAULT_LR);

        let explicit = EntailConfig { algo: Algo::Vae, lr: 5e-4, ..Default::default() };
        assert_eq!(explicit.effective_lr(), 5e-4);

        let attention = EntailConfig::default();
        assert_eq!(attention.effective_lr(), ENTAIL_DEFAULT_LR);
    }

    #[test]
    fn test_visualization_only_for_attention() {
        assert_eq!(EntailConfig::default().fit_settings(10).visualize_freq, 10_000);
        let ensemble = EntailConfig { algo: Algo::Ensemble, ..Default::default() };
        assert_eq!(ensemble.fit_settings(10).visualize_freq, 0);
    }

    #[test]
    fn test_choices_parse_and_display() {
        assert_eq!("CPU".parse::<DeviceKind>().unwrap(), DeviceKind::Cpu);
        assert_eq!("nnlm".parse::<LmKind>().unwrap(), LmKind::Nnlm);
        assert_eq!(Algo::Ensemble.to_string(), "ensemble");
        assert!("bert".parse::<Algo>().is_err());
    }

    #[test]
    fn test_config_json_round_trip() {
        let cfg  = EntailConfig { algo: Algo::Vae, elbo: ElboEstimator::Exact, ..Default::default() };
        let json = serde_json::to_string(&cfg).unwrap();
        assert!(json.contains("\"algo\":\"vae\""));
        let back: EntailConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.elbo, ElboEstimator::Exact);
    }
}
