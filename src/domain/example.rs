// ============================================================
// Layer 3 — Entailment Examples
// ============================================================
// A natural-language-inference example is a premise, a
// hypothesis and one of three gold labels:
//
//   premise:    "A man is playing a guitar on stage."
//   hypothesis: "A person is performing music."
//   label:      entailment
//
// Labels are stored as a small enum with a fixed index order.
// The index is what the model predicts and what the
// prediction file writes in its Category column.

use serde::{Deserialize, Serialize};

/// The three NLI classes, in model output order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Label {
    Entailment,
    Contradiction,
    Neutral,
}

impl Label {
    /// Every label, ordered by class index
    pub const ALL: [Label; 3] = [Label::Entailment, Label::Contradiction, Label::Neutral];

    /// Number of output classes
    pub const COUNT: usize = Self::ALL.len();

    /// Parse a dataset label column. Case-insensitive.
    /// Returns None for unknown values such as SNLI's "-"
    /// (no annotator consensus).
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "entailment"    => Some(Label::Entailment),
            "contradiction" => Some(Label::Contradiction),
            "neutral"       => Some(Label::Neutral),
            _               => None,
        }
    }

    /// Class index used by the model output layer
    pub fn index(self) -> usize {
        match self {
            Label::Entailment    => 0,
            Label::Contradiction => 1,
            Label::Neutral       => 2,
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Label::Entailment    => "entailment",
            Label::Contradiction => "contradiction",
            Label::Neutral       => "neutral",
        }
    }
}

/// A labelled premise/hypothesis pair before tokenisation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NliPair {
    pub premise:    String,
    pub hypothesis: String,
    pub label:      Label,
}

impl NliPair {
    pub fn new(premise: impl Into<String>, hypothesis: impl Into<String>, label: Label) -> Self {
        Self {
            premise:    premise.into(),
            hypothesis: hypothesis.into(),
            label,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!(Label::parse("Entailment"), Some(Label::Entailment));
        assert_eq!(Label::parse(" NEUTRAL "), Some(Label::Neutral));
        assert_eq!(Label::parse("contradiction"), Some(Label::Contradiction));
    }

    #[test]
    fn test_unknown_label_is_rejected() {
        assert_eq!(Label::parse("-"), None);
        assert_eq!(Label::parse(""), None);
    }

    #[test]
    fn test_index_round_trip() {
        for label in Label::ALL {
            assert_eq!(Label::from_index(label.index()), Some(label));
        }
        assert_eq!(Label::from_index(Label::COUNT), None);
    }
}
