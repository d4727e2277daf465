#![recursion_limit = "256"]

// nlp-train: language-model and entailment training on Burn.
//   nlp-train lm     --model lstm --device cpu
//   nlp-train entail --algo vae --elbo exact

mod cli;
mod application;
mod domain;
mod data;
mod ml;
mod infra;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::Cli;

/// Crate-level log directive applied on top of RUST_LOG
const DEFAULT_LOG_DIRECTIVE: &str = "nlp_train=info";

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::from_default_env().add_directive(DEFAULT_LOG_DIRECTIVE.parse()?);
    tracing_subscriber::fmt().with_env_filter(filter).init();

    cli.run()
}
