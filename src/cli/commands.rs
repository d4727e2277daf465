// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Defines the two subcommands: `lm` and `entail`
// and all their configurable flags.
//
// clap's derive macros automatically generate:
//   - help text (--help)
//   - error messages for unknown choices
//   - type conversion (string → usize, f64, enums via FromStr)
//
// Reference: Rust Book §12 (Building a CLI Program)

use clap::{ArgAction, Args, Subcommand};

use crate::application::config::{Algo, DeviceKind, EntailConfig, LmConfig, LmKind};
use crate::ml::mixture::ElboEstimator;

/// The two top-level subcommands available to the user
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train an NNLM or LSTM language model on a text corpus
    Lm(LmArgs),

    /// Train an entailment model and predict the test set
    Entail(EntailArgs),
}

/// All arguments for the `lm` command.
#[derive(Args, Debug)]
pub struct LmArgs {
    /// Training corpus, one sentence per line
    #[arg(long, default_value = "data/lm/train.txt")]
    pub train_file: String,

    /// Validation corpus
    #[arg(long, default_value = "data/lm/valid.txt")]
    pub val_file: String,

    /// Architecture: nnlm or lstm
    #[arg(long, default_value = "lstm")]
    pub model: LmKind,

    /// Predicted tokens per BPTT window
    #[arg(long, default_value_t = 32)]
    pub seq_len: usize,

    #[arg(long, default_value_t = 20)]
    pub batch_size: usize,

    #[arg(long, default_value_t = 10)]
    pub epochs: usize,

    #[arg(long, default_value_t = 1e-4)]
    pub lr: f64,

    /// Adam weight decay (L2 penalty)
    #[arg(long, default_value_t = 0.0)]
    pub weight_decay: f64,

    /// Maximum gradient norm; no clipping when omitted
    #[arg(long)]
    pub grad_clip: Option<f64>,

    /// Log training averages every N batches
    #[arg(long, default_value_t = 100)]
    pub log_freq: usize,

    /// Checkpoint path; weights are written next to it as .mpk
    #[arg(long, default_value = "./trained_models/lm-0.pt")]
    pub save_file: String,

    #[arg(long, default_value_t = 128)]
    pub embed_dim: usize,

    #[arg(long, default_value_t = 256)]
    pub hidden_size: usize,

    /// NNLM only: tokens visible at each position
    #[arg(long, default_value_t = 3)]
    pub context: usize,

    #[arg(long, default_value_t = 0.2)]
    pub dropout: f64,

    /// Maximum vocabulary size including special tokens
    #[arg(long, default_value_t = 10_000)]
    pub vocab_size: usize,

    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// gpu (WGPU) or cpu (NdArray)
    #[arg(long, default_value = "gpu")]
    pub device: DeviceKind,
}

/// Convert CLI LmArgs into the application-layer LmConfig.
/// The application layer never sees clap types.
impl From<LmArgs> for LmConfig {
    fn from(a: LmArgs) -> Self {
        LmConfig {
            train_file:   a.train_file,
            val_file:     a.val_file,
            model:        a.model,
            seq_len:      a.seq_len,
            batch_size:   a.batch_size,
            epochs:       a.epochs,
            lr:           a.lr,
            weight_decay: a.weight_decay,
            grad_clip:    a.grad_clip,
            log_freq:     a.log_freq,
            save_file:    a.save_file,
            embed_dim:    a.embed_dim,
            hidden_size:  a.hidden_size,
            context:      a.context,
            dropout:      a.dropout,
            vocab_size:   a.vocab_size,
            seed:         a.seed,
            device:       a.device,
        }
    }
}

/// All arguments for the `entail` command.
#[derive(Args, Debug)]
pub struct EntailArgs {
    /// attention, ensemble or vae
    #[arg(long, default_value = "attention")]
    pub algo: Algo,

    /// TSV rows: label<TAB>premise<TAB>hypothesis
    #[arg(long, default_value = "data/snli/train.tsv")]
    pub train_file: String,

    /// 10% of the training data is held out when this file is missing
    #[arg(long, default_value = "data/snli/val.tsv")]
    pub val_file: String,

    #[arg(long, default_value = "data/snli/test.tsv")]
    pub test_file: String,

    #[arg(long, default_value_t = 15)]
    pub epochs: usize,

    /// The VAE uses 1e-3 unless this is set to something else
    #[arg(long, default_value_t = 1e-4)]
    pub lr: f64,

    #[arg(long, default_value_t = 0.0)]
    pub weight_decay: f64,

    #[arg(long, default_value_t = 5.0)]
    pub grad_clip: f64,

    /// VAE gradient estimator: reinforce or exact
    #[arg(long, default_value = "reinforce")]
    pub elbo: ElboEstimator,

    #[arg(long, default_value_t = 10_000)]
    pub log_freq: usize,

    #[arg(long, default_value = "./trained_models/attn-0.pt")]
    pub save_file: String,

    /// Add intra-sentence attention (true or false)
    #[arg(long, default_value_t = false, action = ArgAction::Set)]
    pub intra_attn: bool,

    /// Appended to the predictions and test results file names
    #[arg(long, default_value = "")]
    pub pred_suffix: String,

    /// attention: weights file under ./trained_models/;
    /// ensemble: directory holding the member weights
    #[arg(long, default_value = "")]
    pub load_model: String,

    /// Export attention every N validation batches (0 disables)
    #[arg(long, default_value_t = 10_000)]
    pub visualize_freq: usize,

    /// Name of the attention CSV under img/
    #[arg(long, default_value = "attn-0")]
    pub save_img: String,

    #[arg(long, default_value_t = 32)]
    pub batch_size: usize,

    #[arg(long, default_value_t = 100)]
    pub embed_dim: usize,

    #[arg(long, default_value_t = 200)]
    pub hidden_size: usize,

    /// Layers in each attend / compare / aggregate MLP
    #[arg(long, default_value_t = 2)]
    pub num_layers: usize,

    #[arg(long, default_value_t = 0.2)]
    pub dropout: f64,

    /// Mixture components for ensemble and vae
    #[arg(long, default_value_t = 4)]
    pub num_models: usize,

    #[arg(long, default_value_t = 0.33)]
    pub kl_weight: f64,

    #[arg(long, default_value_t = 20_000)]
    pub vocab_size: usize,

    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    #[arg(long, default_value = "gpu")]
    pub device: DeviceKind,
}

impl From<EntailArgs> for EntailConfig {
    fn from(a: EntailArgs) -> Self {
        EntailConfig {
            algo:           a.algo,
            train_file:     a.train_file,
            val_file:       a.val_file,
            test_file:      a.test_file,
            epochs:         a.epochs,
            lr:             a.lr,
            weight_decay:   a.weight_decay,
            grad_clip:      a.grad_clip,
            elbo:           a.elbo,
            log_freq:       a.log_freq,
            save_file:      a.save_file,
            intra_attn:     a.intra_attn,
            pred_suffix:    a.pred_suffix,
            load_model:     a.load_model,
            visualize_freq: a.visualize_freq,
            save_img:       a.save_img,
            batch_size:     a.batch_size,
            embed_dim:      a.embed_dim,
            hidden_size:    a.hidden_size,
            num_layers:     a.num_layers,
            dropout:        a.dropout,
            num_models:     a.num_models,
            kl_weight:      a.kl_weight,
            vocab_size:     a.vocab_size,
            seed:           a.seed,
            device:         a.device,
        }
    }
}
