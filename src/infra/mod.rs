// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Cross-cutting concerns used by the use cases and the
// training loop:
//
//   checkpoint.rs  — best-model weights (DefaultRecorder),
//                    JSON sidecar and run config
//   vocab_store.rs — word-level vocabulary built once from the
//                    training corpus and reused afterwards
//   metrics.rs     — per-epoch metrics CSV
//   export.rs      — prediction files and attention CSV dumps
//   interrupt.rs   — Ctrl-C flag polled by the training loop

/// Model checkpoint saving and loading
pub mod checkpoint;

/// Vocabulary building, saving and loading
pub mod vocab_store;

/// Training metrics CSV logger
pub mod metrics;

/// Test-set prediction files and attention matrices
pub mod export;

/// Graceful Ctrl-C handling
pub mod interrupt;
