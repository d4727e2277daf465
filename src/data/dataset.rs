use burn::data::dataset::Dataset;
use serde::{Deserialize, Serialize};

use crate::data::windows::LmWindow;

/// One tokenised NLI example. Sequences are unpadded;
/// the batcher pads to the longest sequence in each batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NliExample {
    pub premise:    Vec<u32>,
    pub hypothesis: Vec<u32>,
    pub label:      usize,
}

pub struct LmDataset {
    windows: Vec<LmWindow>,
}

impl LmDataset {
    pub fn new(windows: Vec<LmWindow>) -> Self { Self { windows } }

    /// Number of predicted tokens across all windows
    pub fn token_count(&self) -> usize {
        self.windows.iter().map(|w| w.target.len()).sum()
    }
}

impl Dataset<LmWindow> for LmDataset {
    fn get(&self, index: usize) -> Option<LmWindow> {
        self.windows.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.windows.len()
    }
}

pub struct NliDataset {
    examples: Vec<NliExample>,
}

impl NliDataset {
    pub fn new(examples: Vec<NliExample>) -> Self { Self { examples } }
}

impl Dataset<NliExample> for NliDataset {
    fn get(&self, index: usize) -> Option<NliExample> {
        self.examples.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.examples.len()
    }
}
