// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Plain Rust types shared by both trainers. Nothing in here
// knows about Burn tensors, files or the command line, so all
// of the bookkeeping the training loop relies on (accuracy,
// perplexity, "is this the best epoch so far?") can be tested
// without a backend.
//
//   example.rs   — entailment labels and raw text triples
//   summary.rs   — validation summary, logging window, best tracker
//   posterior.rs — label × latent-model posterior table (VAE)
//   traits.rs    — sources of raw examples

/// Entailment labels and raw premise/hypothesis pairs
pub mod example;

/// Validation summary, running loss window and best-accuracy tracking
pub mod summary;

/// Accumulated q(z | x, y) per gold label
pub mod posterior;

/// Core abstractions implemented by the data layer
pub mod traits;
