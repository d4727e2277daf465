// ============================================================
// Layer 3 — Posterior Table
// ============================================================
// During VAE validation we sum the inference network's
// posterior q(z | x, y) separately for each gold label:
//
//               model 0  model 1  model 2  model 3
//   entailment    ...      ...      ...      ...
//   contradiction ...
//   neutral       ...
//
// Dividing each row by its mean shows which latent component
// specialises in which label (1.0 = average share).

use std::fmt;

use crate::domain::example::Label;

#[derive(Debug, Clone, PartialEq)]
pub struct PosteriorTable {
    labels: usize,
    models: usize,
    sums:   Vec<f64>,
}

impl PosteriorTable {
    pub fn new(labels: usize, models: usize) -> Self {
        Self { labels, models, sums: vec![0.0; labels * models] }
    }

    pub fn models(&self) -> usize {
        self.models
    }

    /// Add one example's posterior to its gold label's row.
    /// Out-of-range labels are ignored.
    pub fn add(&mut self, label: usize, posterior: &[f64]) {
        if label >= self.labels {
            return;
        }
        let row = &mut self.sums[label * self.models..(label + 1) * self.models];
        for (cell, q) in row.iter_mut().zip(posterior) {
            *cell += q;
        }
    }

    /// Element-wise sum with another table of the same shape.
    pub fn merge(&mut self, other: &PosteriorTable) {
        if other.labels != self.labels || other.models != self.models {
            tracing::warn!(
                "Ignoring posterior table of shape {}x{} (expected {}x{})",
                other.labels, other.models, self.labels, self.models
            );
            return;
        }
        for (a, b) in self.sums.iter_mut().zip(&other.sums) {
            *a += b;
        }
    }

    pub fn get(&self, label: usize, model: usize) -> f64 {
        self.sums[label * self.models + model]
    }

    /// Each row divided by its mean over the model axis.
    pub fn normalized(&self) -> PosteriorTable {
        let mut out = self.clone();
        for row in out.sums.chunks_mut(self.models.max(1)) {
            let mean = row.iter().sum::<f64>() / row.len().max(1) as f64;
            if mean > 0.0 {
                row.iter_mut().for_each(|v| *v /= mean);
            }
        }
        out
    }
}

impl fmt::Display for PosteriorTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:>14}", "")?;
        for k in 0..self.models {
            write!(f, " {:>8}", format!("z={k}"))?;
        }
        for label in 0..self.labels {
            let name = Label::from_index(label).map(Label::as_str).unwrap_or("?");
            write!(f, "\n{name:>14}")?;
            for k in 0..self.models {
                write!(f, " {:>8.4}", self.get(label, k))?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_accumulates_by_label() {
        let mut t = PosteriorTable::new(3, 2);
        t.add(0, &[0.25, 0.75]);
        t.add(0, &[0.75, 0.25]);
        t.add(2, &[1.0, 0.0]);
        assert_eq!(t.get(0, 0), 1.0);
        assert_eq!(t.get(0, 1), 1.0);
        assert_eq!(t.get(1, 0), 0.0);
        assert_eq!(t.get(2, 0), 1.0);
    }

    #[test]
    fn test_normalized_rows_have_unit_mean() {
        let mut t = PosteriorTable::new(3, 4);
        t.add(1, &[0.1, 0.2, 0.3, 0.4]);
        let n = t.normalized();
        let mean: f64 = (0..4).map(|k| n.get(1, k)).sum::<f64>() / 4.0;
        assert!((mean - 1.0).abs() < 1e-12);
        assert!((n.get(1, 3) - 1.6).abs() < 1e-12);
        // Empty rows stay at zero
        assert_eq!(n.get(0, 0), 0.0);
    }

    #[test]
    fn test_merge_and_bad_label() {
        let mut a = PosteriorTable::new(3, 2);
        let mut b = PosteriorTable::new(3, 2);
        a.add(1, &[0.5, 0.5]);
        b.add(1, &[0.5, 0.5]);
        b.add(7, &[1.0, 1.0]);
        a.merge(&b);
        assert_eq!(a.get(1, 0), 1.0);
        a.merge(&PosteriorTable::new(2, 2));
        assert_eq!(a.get(1, 0), 1.0);
    }
}
