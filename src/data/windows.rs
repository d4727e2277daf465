// ============================================================
// Layer 4 — BPTT Windows
// ============================================================
// Cuts the language-model token stream into fixed-length
// (input, target) windows, where the target is the input
// shifted one token to the right.
//
// Example with seq_len = 3 over the stream a b c d e f g h:
//   Window 1: input = a b c   target = b c d
//   Window 2: input = d e f   target = e f g
//   (h alone cannot form a full window and is dropped)
//
// Consecutive windows share exactly one boundary token: the
// last target of one window is the first input of the next.
// So a stream of N tokens yields (N - 1) / seq_len windows.
//
// Reference: Merity et al. (2017), truncated BPTT for LSTM LMs

use serde::{Deserialize, Serialize};

/// One fixed-length training window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LmWindow {
    pub input:  Vec<u32>,
    pub target: Vec<u32>,
}

pub struct BpttWindower {
    /// Number of predicted tokens per window
    seq_len: usize,
}

impl BpttWindower {
    /// # Panics
    /// Panics if seq_len is zero, since no window could be formed
    pub fn new(seq_len: usize) -> Self {
        assert!(seq_len > 0, "seq_len must be positive");
        Self { seq_len }
    }

    pub fn windows(&self, stream: &[u32]) -> Vec<LmWindow> {
        let mut windows = Vec::with_capacity(self.num_windows(stream.len()));
        let mut start   = 0usize;

        while start + self.seq_len < stream.len() {
            let end = start + self.seq_len;
            windows.push(LmWindow {
                input:  stream[start..end].to_vec(),
                target: stream[start + 1..=end].to_vec(),
            });
            start = end;
        }

        windows
    }

    /// Returns how many windows a stream of `token_count` tokens produces
    pub fn num_windows(&self, token_count: usize) -> usize {
        token_count.saturating_sub(1) / self.seq_len
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_targets_are_shifted_inputs() {
        let w       = BpttWindower::new(3);
        let windows = w.windows(&[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(windows.len(), 2);
        assert_eq!(windows[0], LmWindow { input: vec![1, 2, 3], target: vec![2, 3, 4] });
        assert_eq!(windows[1], LmWindow { input: vec![4, 5, 6], target: vec![5, 6, 7] });
    }

    #[test]
    fn test_exact_fit_uses_every_token() {
        let w       = BpttWindower::new(2);
        let windows = w.windows(&[1, 2, 3, 4, 5]);
        assert_eq!(windows.len(), 2);
        assert_eq!(windows[1].target, vec![4, 5]);
    }

    #[test]
    fn test_count_matches_windows() {
        let w = BpttWindower::new(4);
        for n in 0..30 {
            let stream: Vec<u32> = (0..n).collect();
            assert_eq!(w.windows(&stream).len(), w.num_windows(n as usize));
        }
    }

    #[test]
    fn test_short_stream_gives_no_windows() {
        let w = BpttWindower::new(5);
        assert!(w.windows(&[1, 2, 3]).is_empty());
        assert!(w.windows(&[]).is_empty());
    }

    #[test]
    #[should_panic]
    fn test_zero_seq_len_panics() {
        let _ = BpttWindower::new(0);
    }
}
