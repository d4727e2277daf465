// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// All model architectures and the training machinery live here.
// The data layer builds tensors; everything that runs a forward
// or backward pass is in this layer.
//
// What's in this layer:
//
//   loss.rs       — NLL over log-probabilities, argmax accuracy
//
//   step.rs       — TrainStep / EvalStep contracts between the
//                   models and the generic training loop
//
//   grad_clip.rs  — Global gradient-norm clipping
//
//   trainer.rs    — The training loop
//                   Forward pass, loss, backward pass, clipping,
//                   Adam step, periodic logging, validation,
//                   checkpoint on improvement, best-model restore
//
//   lm.rs         — NNLM and LSTM language models
//
//   attention.rs  — Decomposable attention entailment model
//
//   mixture.rs    — Latent mixture of attention models and the
//                   VAE trained with an ELBO
//
//   predictor.rs  — Test-set predictions for entailment models
//
// Reference: Burn Book §3 (Building Blocks)
//            Burn Book §5 (Training)

/// Negative log-likelihood and accuracy helpers
pub mod loss;

/// Per-batch train / eval contracts
pub mod step;

/// Clipping over the norm of all gradients together
pub mod grad_clip;

/// Generic training loop with validation and checkpointing
pub mod trainer;

/// Language models
pub mod lm;

/// Decomposable attention model
pub mod attention;

/// Latent mixture and VAE
pub mod mixture;

/// Test-set prediction
pub mod predictor;
