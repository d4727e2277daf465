// ============================================================
// Layer 2 — Application / Use Cases
// ============================================================
// This layer orchestrates all the other layers to accomplish
// one training run (language model or entailment).
//
// Rules for this layer:
//   - No ML math or model code here
//   - No argument parsing here (that's Layer 1)
//   - File formats belong to Layer 4 and 6
//   - Only workflow coordination and backend selection
//
// Reference: Clean Architecture pattern
//            Rust Book §7 (Module System)

// Serialisable run configurations
pub mod config;

// The language-model training workflow
pub mod lm_use_case;

// The entailment training and prediction workflow
pub mod entail_use_case;
