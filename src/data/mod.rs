// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// Everything between a file on disk and a tensor batch:
//
//   text file / TSV file
//       │
//       ▼
//   loader            → reads rows, skips malformed ones
//       │
//       ▼
//   preprocessor      → normalises whitespace, lowercases
//       │
//       ▼
//   vocabulary        → (infra::vocab_store) words → ids
//       │
//       ▼
//   windows           → LM token stream → (input, target) windows
//       │
//       ▼
//   dataset           → Burn Dataset over windows / NLI examples
//       │
//       ▼
//   batcher           → Burn Batcher: pads, stacks, builds masks
//       │
//       ▼
//   DataLoader        → feeds batches to ml::trainer
//
// Reference: Burn Book §4 (Datasets and Dataloaders)

/// Plain-text and TSV loaders
pub mod loader;

/// Line-level text normalisation
pub mod preprocessor;

/// Fixed-length BPTT windows for language modelling
pub mod windows;

/// Burn Dataset implementations
pub mod dataset;

/// Burn Batcher implementations
pub mod batcher;

/// Seeded train/validation split
pub mod splitter;
