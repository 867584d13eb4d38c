use counter::Counter;
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PhrasesConfig {
    /// Pairs seen fewer times than this are never merged.
    pub min_count: usize,
    /// A pair is merged when its score is strictly above this.
    pub threshold: f64,
    pub delimiter: String,
}

impl Default for PhrasesConfig {
    fn default() -> Self {
        PhrasesConfig {
            min_count: 10,
            threshold: 10.0,
            delimiter: "_".to_string(),
        }
    }
}

/// Bigram detector learned from a tokenized corpus.
///
/// Unigrams and adjacent pairs share one count table; pairs are keyed by
/// their delimiter-joined form, which is also the token emitted when a pair
/// is merged.
pub struct Phrases {
    config: PhrasesConfig,
    vocab: Counter<String>,
}

impl Phrases {
    pub fn learn<S: AsRef<str>>(sentences: &[Vec<S>], config: PhrasesConfig) -> Self {
        let mut vocab: Counter<String> = Counter::new();

        for sentence in sentences {
            let mut prev: Option<&str> = None;
            for word in sentence {
                let word = word.as_ref();
                vocab[&word.to_owned()] += 1;
                if let Some(prev) = prev {
                    let phrase = format!("{}{}{}", prev, config.delimiter, word);
                    vocab[&phrase] += 1;
                }
                prev = Some(word);
            }
        }

        let phrases = Phrases { config, vocab };
        info!(
            "Learned {} phrases from {} sentences ({} vocabulary entries)",
            phrases.export_phrases().len(),
            sentences.len(),
            phrases.vocab.len()
        );
        phrases
    }

    /// Score of merging `a` and `b`, or `None` when either word or the pair was
    /// never seen.
    pub fn score(&self, a: &str, b: &str) -> Option<f64> {
        let a_count = self.count(a);
        let b_count = self.count(b);
        if a_count == 0 || b_count == 0 {
            return None;
        }
        let pair_count = self.count(&self.join(a, b));
        if pair_count == 0 {
            return None;
        }

        let vocab_len = self.vocab.len() as f64;
        Some(
            (pair_count as f64 - self.config.min_count as f64) / a_count as f64 / b_count as f64
                * vocab_len,
        )
    }

    fn phrase_score(&self, a: &str, b: &str) -> Option<f64> {
        self.score(a, b).filter(|score| *score > self.config.threshold)
    }

    /// Rewrites a sentence, merging each qualifying adjacent pair into one
    /// token. Scans left to right and never reuses a word that was merged.
    pub fn transform<S: AsRef<str>>(&self, sentence: &[S]) -> Vec<String> {
        let mut out = Vec::with_capacity(sentence.len());
        let mut i = 0;
        while i < sentence.len() {
            let a = sentence[i].as_ref();
            if let Some(b) = sentence.get(i + 1).map(AsRef::as_ref) {
                if self.phrase_score(a, b).is_some() {
                    out.push(self.join(a, b));
                    i += 2;
                    continue;
                }
            }
            out.push(a.to_string());
            i += 1;
        }
        out
    }

    /// Every learned pair that would be merged, best score first.
    pub fn export_phrases(&self) -> Vec<(String, f64)> {
        let mut phrases: Vec<(String, f64)> = self
            .vocab
            .keys()
            .filter_map(|key| {
                let (a, b) = key.split_once(self.config.delimiter.as_str())?;
                if a.is_empty() || b.is_empty() {
                    return None;
                }
                self.phrase_score(a, b).map(|score| (key.clone(), score))
            })
            .collect();
        phrases.sort_by(|x, y| y.1.total_cmp(&x.1).then_with(|| x.0.cmp(&y.0)));
        phrases
    }

    fn count(&self, key: &str) -> usize {
        self.vocab.get(key).copied().unwrap_or(0)
    }

    fn join(&self, a: &str, b: &str) -> String {
        format!("{}{}{}", a, self.config.delimiter, b)
    }
}
