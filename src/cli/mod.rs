// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// This is the entry point for all user interaction.
// It uses the `clap` crate to parse command line arguments.
// All business logic is delegated to Layer 2 (application).
//
// Two commands are supported:
//   1. `lm`     — trains a language model on a text corpus
//   2. `entail` — trains an entailment model, then predicts
//                 the test set
//
// Reference: Rust Book §7 (Modules), §12 (CLI programs)

pub mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, EntailArgs, LmArgs};

/// clap reads the fields and generates argument parsing code
/// via the Parser derive macro.
#[derive(Parser, Debug)]
#[command(
    name = "nlp-train",
    version = "0.1.0",
    about = "Train neural language models and decomposable-attention entailment models."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Dispatch to the matching use case. This layer only routes.
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Lm(args)     => run_lm(args),
            Commands::Entail(args) => run_entail(args),
        }
    }
}

fn run_lm(args: LmArgs) -> Result<()> {
    use crate::application::lm_use_case::LmUseCase;

    tracing::info!("Training {} language model on '{}'", args.model, args.train_file);
    LmUseCase::new(args.into()).execute()?;

    println!("Training complete.");
    Ok(())
}

fn run_entail(args: EntailArgs) -> Result<()> {
    use crate::application::entail_use_case::EntailUseCase;

    tracing::info!("Training {} entailment model on '{}'", args.algo, args.train_file);
    EntailUseCase::new(args.into()).execute()?;

    println!("Training complete. Predictions written.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::config::{Algo, DeviceKind, EntailConfig, LmConfig, LmKind};
    use crate::ml::mixture::ElboEstimator;

    #[test]
    fn test_lm_defaults_match_config_defaults() {
        let cli = Cli::try_parse_from(["nlp-train", "lm"]).unwrap();
        let Commands::Lm(args) = cli.command else { panic!("expected lm") };
        let cfg: LmConfig = args.into();
        let default       = LmConfig::default();
        assert_eq!(cfg.model, LmKind::Lstm);
        assert_eq!(cfg.seq_len, default.seq_len);
        assert_eq!(cfg.save_file, default.save_file);
        assert_eq!(cfg.grad_clip, None);
    }

    #[test]
    fn test_entail_flags() {
        let cli = Cli::try_parse_from([
            "nlp-train", "entail",
            "--algo", "vae",
            "--elbo", "exact",
            "--intra-attn", "true",
            "--grad-clip", "20",
            "--pred-suffix", "_vae-0",
            "--device", "cpu",
        ])
        .unwrap();
        let Commands::Entail(args) = cli.command else { panic!("expected entail") };
        let cfg: EntailConfig = args.into();
        assert_eq!(cfg.algo, Algo::Vae);
        assert_eq!(cfg.elbo, ElboEstimator::Exact);
        assert!(cfg.intra_attn);
        assert_eq!(cfg.grad_clip, 20.0);
        assert_eq!(cfg.pred_suffix, "_vae-0");
        assert_eq!(cfg.device, DeviceKind::Cpu);
        assert_eq!(cfg.num_models, 4);
    }

    #[test]
    fn test_unknown_algo_is_rejected() {
        assert!(Cli::try_parse_from(["nlp-train", "entail", "--algo", "bert"]).is_err());
    }
}
