//! c_v topic coherence.
//!
//! Word probabilities come from boolean sliding windows over the tokenized
//! corpus. Each topic word gets a context vector of its normalized PMI with
//! every word of the topic, and the topic's score is the mean cosine
//! similarity between each word's vector and the sum of all of them.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::dictionary::Dictionary;
use crate::error::{Error, Result};
use crate::lda::LdaModel;

const EPSILON: f64 = 1e-12;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoherenceConfig {
    /// Top words per topic taken into account.
    pub topn: usize,
    pub window_size: usize,
}

impl Default for CoherenceConfig {
    fn default() -> Self {
        CoherenceConfig {
            topn: 20,
            window_size: 110,
        }
    }
}

/// Scores topics against the token corpus they were learned from.
pub struct CoherenceModel<'a> {
    texts: &'a [Vec<String>],
    dictionary: &'a Dictionary,
    config: CoherenceConfig,
}

impl<'a> CoherenceModel<'a> {
    pub fn new(texts: &'a [Vec<String>], dictionary: &'a Dictionary, config: CoherenceConfig) -> Self {
        CoherenceModel {
            texts,
            dictionary,
            config,
        }
    }

    /// Mean c_v coherence over all topics of `model`.
    pub fn get_coherence(&self, model: &LdaModel) -> Result<f64> {
        let topics: Vec<Vec<usize>> = (0..model.num_topics())
            .map(|topic| model.top_topic_ids(topic, self.config.topn))
            .collect();
        let per_topic = self.score_topics(&topics)?;
        Ok(per_topic.iter().sum::<f64>() / per_topic.len() as f64)
    }

    /// c_v coherence of each topic, given as dictionary ids.
    pub fn score_topics(&self, topics: &[Vec<usize>]) -> Result<Vec<f64>> {
        if topics.is_empty() || topics.iter().any(Vec::is_empty) {
            return Err(Error::Model("cannot score an empty topic".into()));
        }
        if self.config.window_size == 0 {
            return Err(Error::Config("coherence window size must be positive".into()));
        }

        let relevant: BTreeSet<usize> = topics.iter().flatten().copied().collect();
        let contiguous: HashMap<usize, usize> =
            relevant.iter().enumerate().map(|(i, id)| (*id, i)).collect();

        let accumulator = self.accumulate(&contiguous);
        debug!(
            windows = accumulator.num_docs,
            relevant = contiguous.len(),
            "accumulated co-occurrences"
        );

        Ok(topics
            .iter()
            .map(|topic| {
                let ids: Vec<usize> = topic.iter().map(|id| contiguous[id]).collect();
                accumulator.indirect_cosine(&ids)
            })
            .collect())
    }

    fn accumulate(&self, contiguous: &HashMap<usize, usize>) -> Accumulator {
        let window = self.config.window_size;
        let mut acc = Accumulator::new(contiguous.len());

        for text in self.texts {
            let ids: Vec<Option<usize>> = self
                .dictionary
                .doc2idx(text)
                .into_iter()
                .map(|id| id.and_then(|id| contiguous.get(&id).copied()))
                .collect();

            // texts without any topic word contribute no windows
            if ids.iter().all(Option::is_none) {
                continue;
            }

            if ids.len() <= window {
                let present: BTreeSet<usize> = ids.iter().flatten().copied().collect();
                acc.add_window(&present);
                continue;
            }

            let mut counts = vec![0usize; contiguous.len()];
            let mut present = BTreeSet::new();
            for id in ids[..window].iter().flatten() {
                counts[*id] += 1;
                present.insert(*id);
            }
            acc.add_window(&present);

            for start in 1..=(ids.len() - window) {
                if let Some(out) = ids[start - 1] {
                    counts[out] -= 1;
                    if counts[out] == 0 {
                        present.remove(&out);
                    }
                }
                if let Some(inc) = ids[start + window - 1] {
                    counts[inc] += 1;
                    present.insert(inc);
                }
                acc.add_window(&present);
            }
        }
        acc
    }
}

/// Boolean occurrence counts over virtual documents (windows).
struct Accumulator {
    num_docs: usize,
    occurrences: Vec<usize>,
    co_occurrences: HashMap<(usize, usize), usize>,
}

impl Accumulator {
    fn new(size: usize) -> Self {
        Accumulator {
            num_docs: 0,
            occurrences: vec![0; size],
            co_occurrences: HashMap::new(),
        }
    }

    fn add_window(&mut self, present: &BTreeSet<usize>) {
        self.num_docs += 1;
        let words: Vec<usize> = present.iter().copied().collect();
        for (i, &a) in words.iter().enumerate() {
            self.occurrences[a] += 1;
            for &b in &words[i + 1..] {
                *self.co_occurrences.entry((a, b)).or_insert(0) += 1;
            }
        }
    }

    fn co_occurrence(&self, a: usize, b: usize) -> usize {
        if a == b {
            return self.occurrences[a];
        }
        let key = if a < b { (a, b) } else { (b, a) };
        self.co_occurrences.get(&key).copied().unwrap_or(0)
    }

    /// Normalized log-ratio of `a` and `b`. Words never seen score 0.
    fn npmi(&self, a: usize, b: usize) -> f64 {
        let n = self.num_docs as f64;
        let (count_a, count_b) = (self.occurrences[a], self.occurrences[b]);
        if n == 0.0 || count_a == 0 || count_b == 0 {
            return 0.0;
        }
        let co_prob = self.co_occurrence(a, b) as f64 / n;
        let ratio = ((co_prob + EPSILON) / ((count_a as f64 / n) * (count_b as f64 / n))).ln();
        ratio / -(co_prob + EPSILON).ln()
    }

    fn indirect_cosine(&self, topic: &[usize]) -> f64 {
        let vectors: Vec<Vec<f64>> = topic
            .iter()
            .map(|&w| topic.iter().map(|&other| self.npmi(w, other)).collect())
            .collect();
        let mut topic_vector = vec![0.0; topic.len()];
        for vector in &vectors {
            for (acc, v) in topic_vector.iter_mut().zip(vector) {
                *acc += v;
            }
        }

        let sims: f64 = vectors.iter().map(|v| cosine(v, &topic_vector)).sum();
        sims / vectors.len() as f64
    }
}

fn cosine(a: &[f64], b: &[f64]) -> f64 {
    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm = a.iter().map(|x| x * x).sum::<f64>().sqrt() * b.iter().map(|y| y * y).sum::<f64>().sqrt();
    if norm == 0.0 {
        0.0
    } else {
        dot / norm
    }
}
