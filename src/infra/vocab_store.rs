// ============================================================
// Layer 6 — Vocabulary Store
// ============================================================
// Builds, saves and reloads the word-level vocabulary shared
// by training, validation and test data.
//
// The vocabulary is stored as a HuggingFace `tokenizers`
// WordLevel tokenizer JSON. Building it by hand (count words,
// keep the most frequent, write the JSON, load it back) keeps
// us clear of the trainer API's ModelWrapper type constraints
// in tokenizers 0.15.
//
// Fixed ids:
//   [PAD] = 0   padding in NLI batches
//   [UNK] = 1   out-of-vocabulary words
//   [EOS] = 2   end of line in the language-model stream
//   words = 3.. most frequent first, ties broken alphabetically
//
// The pre-tokenizer splits on whitespace only, so the words
// counted here are exactly the tokens the tokenizer produces.

use anyhow::{Context, Result};
use std::{
    collections::HashMap,
    fs,
    path::PathBuf,
};
use tokenizers::Tokenizer;

pub const PAD_TOKEN: &str = "[PAD]";
pub const UNK_TOKEN: &str = "[UNK]";
pub const EOS_TOKEN: &str = "[EOS]";

pub const UNK_ID: u32 = 1;
pub const EOS_ID: u32 = 2;

const SPECIAL_TOKENS: [&str; 3] = [PAD_TOKEN, UNK_TOKEN, EOS_TOKEN];

// ─── Vocabulary ───────────────────────────────────────────────────────────────
/// A loaded word-level tokenizer.
pub struct Vocabulary {
    tokenizer: Tokenizer,
}

impl Vocabulary {
    /// Encode a cleaned sentence into token ids (no special tokens added)
    pub fn encode(&self, text: &str) -> Result<Vec<u32>> {
        let enc = self
            .tokenizer
            .encode(text, false)
            .map_err(|e| anyhow::anyhow!("Tokenisation error: {e}"))?;
        Ok(enc.get_ids().to_vec())
    }

    /// Word for an id, or [UNK] when the id is unknown
    pub fn token(&self, id: u32) -> String {
        self.tokenizer
            .id_to_token(id)
            .unwrap_or_else(|| UNK_TOKEN.to_string())
    }

    /// Number of ids the embedding tables must cover
    pub fn size(&self) -> usize {
        self.tokenizer.get_vocab_size(true)
    }
}

// ─── VocabStore ───────────────────────────────────────────────────────────────
pub struct VocabStore {
    path: PathBuf,
}

impl VocabStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Load the saved vocabulary, or build one from `texts` if none exists yet
    pub fn load_or_build(&self, texts: &[&str], max_size: usize) -> Result<Vocabulary> {
        if self.path.exists() {
            tracing::info!("Loading existing vocabulary from '{}'", self.path.display());
            self.load()
        } else {
            tracing::info!("Building new vocabulary (max_size={})", max_size);
            self.build_and_save(texts, max_size)
        }
    }

    pub fn load(&self) -> Result<Vocabulary> {
        let tokenizer = Tokenizer::from_file(&self.path).map_err(|e| {
            anyhow::anyhow!("Cannot load vocabulary from '{}': {}", self.path.display(), e)
        })?;
        Ok(Vocabulary { tokenizer })
    }

    fn build_and_save(&self, texts: &[&str], max_size: usize) -> Result<Vocabulary> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Cannot create '{}'", parent.display()))?;
        }

        // ── Step 1: Count word frequencies ────────────────────────────────────
        let mut freq: HashMap<&str, usize> = HashMap::new();
        for text in texts {
            for word in text.split_whitespace() {
                *freq.entry(word).or_insert(0) += 1;
            }
        }

        let mut words: Vec<(&str, usize)> = freq
            .into_iter()
            .filter(|(w, _)| !SPECIAL_TOKENS.contains(w))
            .collect();
        words.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        words.truncate(max_size.saturating_sub(SPECIAL_TOKENS.len()));

        // ── Step 2: Build the vocab map ───────────────────────────────────────
        let mut vocab = serde_json::Map::new();
        for (id, token) in SPECIAL_TOKENS.iter().enumerate() {
            vocab.insert(token.to_string(), serde_json::json!(id));
        }
        for (offset, (word, _)) in words.iter().enumerate() {
            vocab.insert(word.to_string(), serde_json::json!(SPECIAL_TOKENS.len() + offset));
        }

        // ── Step 3: Write the tokenizer JSON in HuggingFace format ────────────
        let added_tokens: Vec<serde_json::Value> = SPECIAL_TOKENS
            .iter()
            .enumerate()
            .map(|(id, token)| serde_json::json!({
                "id": id, "content": token, "single_word": false, "lstrip": false,
                "rstrip": false, "normalized": false, "special": true
            }))
            .collect();

        let tokenizer_json = serde_json::json!({
            "version": "1.0",
            "truncation": null,
            "padding": null,
            "added_tokens": added_tokens,
            "normalizer": { "type": "Lowercase" },
            "pre_tokenizer": { "type": "WhitespaceSplit" },
            "post_processor": null,
            "decoder": null,
            "model": {
                "type": "WordLevel",
                "vocab": vocab,
                "unk_token": UNK_TOKEN
            }
        });

        fs::write(&self.path, serde_json::to_string_pretty(&tokenizer_json)?)
            .with_context(|| format!("Cannot write vocabulary '{}'", self.path.display()))?;

        tracing::info!(
            "Vocabulary built with {} entries, saved to '{}'",
            SPECIAL_TOKENS.len() + words.len(),
            self.path.display()
        );

        self.load()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_encode_and_reload() {
        let dir   = tempfile::tempdir().unwrap();
        let store = VocabStore::new(dir.path().join("vocab.json"));
        let texts = ["the cat sat", "the dog sat", "the end"];

        let vocab = store.load_or_build(&texts, 100).unwrap();
        // 3 specials + the, sat, cat, dog, end
        assert_eq!(vocab.size(), 8);

        // Most frequent word gets the first free id
        assert_eq!(vocab.encode("the").unwrap(), vec![3]);
        assert_eq!(vocab.encode("sat").unwrap(), vec![4]);
        assert_eq!(vocab.encode("the zebra").unwrap(), vec![3, UNK_ID]);
        assert_eq!(vocab.token(EOS_ID), EOS_TOKEN);

        let reloaded = store.load_or_build(&[], 100).unwrap();
        assert_eq!(reloaded.encode("cat dog").unwrap(), vocab.encode("cat dog").unwrap());
    }

    #[test]
    fn test_max_size_keeps_most_frequent() {
        let dir   = tempfile::tempdir().unwrap();
        let store = VocabStore::new(dir.path().join("small.json"));
        let vocab = store.load_or_build(&["a a a b b c"], 5).unwrap();
        assert_eq!(vocab.size(), 5);
        assert_eq!(vocab.encode("c").unwrap(), vec![UNK_ID]);
    }

    #[test]
    fn test_missing_file_fails_to_load() {
        let store = VocabStore::new("/no/such/vocab.json");
        assert!(store.load().is_err());
    }
}
