use std::collections::{BTreeSet, HashMap};

use counter::Counter;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Sparse document vector: `(token id, count)` sorted by id.
pub type BagOfWords = Vec<(usize, usize)>;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VocabularyConfig {
    /// Minimum number of documents a token must appear in.
    pub no_below: usize,
    /// Maximum fraction of documents a token may appear in.
    pub no_above: f64,
    /// Size cap applied after the frequency filters.
    pub keep_n: usize,
}

impl Default for VocabularyConfig {
    fn default() -> Self {
        VocabularyConfig {
            no_below: 50,
            no_above: 0.1,
            keep_n: 50_000,
        }
    }
}

/// Token to id mapping with document and collection frequencies.
#[derive(Debug, Clone, Default)]
pub struct Dictionary {
    token2id: HashMap<String, usize>,
    id2token: Vec<String>,
    dfs: Vec<usize>,
    cfs: Vec<usize>,
    num_docs: usize,
    num_pos: usize,
}

impl Dictionary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_documents<S: AsRef<str>>(documents: &[Vec<S>]) -> Self {
        let mut dictionary = Self::new();
        for doc in documents {
            dictionary.add_document(doc);
        }
        dictionary
    }

    /// Counts one document, assigning ids to unseen tokens in lexicographic
    /// order.
    pub fn add_document<S: AsRef<str>>(&mut self, document: &[S]) {
        let counts: Counter<&str> = document.iter().map(AsRef::as_ref).collect();

        let missing: BTreeSet<&str> = counts
            .keys()
            .copied()
            .filter(|token| !self.token2id.contains_key(*token))
            .collect();
        for token in missing {
            self.token2id.insert(token.to_string(), self.id2token.len());
            self.id2token.push(token.to_string());
            self.dfs.push(0);
            self.cfs.push(0);
        }

        for (token, count) in counts.iter() {
            let id = self.token2id[*token];
            self.dfs[id] += 1;
            self.cfs[id] += count;
        }
        self.num_docs += 1;
        self.num_pos += document.len();
    }

    pub fn len(&self) -> usize {
        self.id2token.len()
    }

    pub fn is_empty(&self) -> bool {
        self.id2token.is_empty()
    }

    pub fn num_docs(&self) -> usize {
        self.num_docs
    }

    pub fn num_pos(&self) -> usize {
        self.num_pos
    }

    pub fn token_id(&self, token: &str) -> Option<usize> {
        self.token2id.get(token).copied()
    }

    pub fn token(&self, id: usize) -> Option<&str> {
        self.id2token.get(id).map(String::as_str)
    }

    pub fn doc_freq(&self, id: usize) -> usize {
        self.dfs.get(id).copied().unwrap_or(0)
    }

    pub fn collection_freq(&self, id: usize) -> usize {
        self.cfs.get(id).copied().unwrap_or(0)
    }

    /// Drops tokens in fewer than `no_below` documents or in more than
    /// `no_above` of all documents, then keeps the `keep_n` most frequent
    /// survivors. Ids are reassigned to `0..len` in their previous order.
    pub fn filter_extremes(&mut self, config: &VocabularyConfig) {
        let before = self.len();
        let no_above_abs = (config.no_above * self.num_docs as f64) as usize;

        let mut good_ids: Vec<usize> = (0..self.len())
            .filter(|&id| self.dfs[id] >= config.no_below && self.dfs[id] <= no_above_abs)
            .collect();
        // stable: equal frequencies stay in id order
        good_ids.sort_by(|a, b| self.dfs[*b].cmp(&self.dfs[*a]));
        good_ids.truncate(config.keep_n);
        good_ids.sort_unstable();

        self.retain_ids(&good_ids);
        debug!(
            "Filtered dictionary: {} -> {} tokens (no_below={}, no_above={}, keep_n={})",
            before,
            self.len(),
            config.no_below,
            config.no_above,
            config.keep_n
        );
    }

    fn retain_ids(&mut self, ids: &[usize]) {
        let id2token: Vec<String> = ids.iter().map(|&id| self.id2token[id].clone()).collect();
        self.dfs = ids.iter().map(|&id| self.dfs[id]).collect();
        self.cfs = ids.iter().map(|&id| self.cfs[id]).collect();
        self.token2id = id2token
            .iter()
            .enumerate()
            .map(|(id, token)| (token.clone(), id))
            .collect();
        self.id2token = id2token;
    }

    /// Sparse counts of the known tokens in `document`; unknown tokens are
    /// dropped.
    pub fn doc2bow<S: AsRef<str>>(&self, document: &[S]) -> BagOfWords {
        let counts: Counter<usize> = document
            .iter()
            .filter_map(|token| self.token_id(token.as_ref()))
            .collect();
        let mut bow: BagOfWords = counts.into_iter().collect();
        bow.sort_unstable();
        bow
    }

    /// Token ids of `document` in reading order, `None` for unknown tokens.
    pub fn doc2idx<S: AsRef<str>>(&self, document: &[S]) -> Vec<Option<usize>> {
        document
            .iter()
            .map(|token| self.token_id(token.as_ref()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn docs(texts: &[&str]) -> Vec<Vec<String>> {
        texts
            .iter()
            .map(|t| t.split_whitespace().map(String::from).collect())
            .collect()
    }

    #[test]
    fn test_ids_follow_first_appearance() {
        let dictionary = Dictionary::from_documents(&docs(&["the cat sat", "the dog ran"]));
        // first document sorted: cat, sat, the; then dog, ran
        assert_eq!(dictionary.token_id("cat"), Some(0));
        assert_eq!(dictionary.token_id("sat"), Some(1));
        assert_eq!(dictionary.token_id("the"), Some(2));
        assert_eq!(dictionary.token_id("dog"), Some(3));
        assert_eq!(dictionary.token_id("ran"), Some(4));
        assert_eq!(dictionary.doc_freq(2), 2);
        assert_eq!(dictionary.num_docs(), 2);
        assert_eq!(dictionary.num_pos(), 6);
    }

    #[test]
    fn test_collection_frequency_counts_repeats() {
        let dictionary = Dictionary::from_documents(&docs(&["a a a b", "a"]));
        let a = dictionary.token_id("a").unwrap();
        assert_eq!(dictionary.doc_freq(a), 2);
        assert_eq!(dictionary.collection_freq(a), 4);
    }

    #[test]
    fn test_filter_extremes_thresholds() {
        // "common" in every doc, "mid" in 4 of 10, "rare" in 1
        let mut texts = Vec::new();
        for i in 0..10 {
            let mut t = String::from("common");
            if i < 4 {
                t.push_str(" mid");
            }
            if i == 0 {
                t.push_str(" rare");
            }
            texts.push(t);
        }
        let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
        let mut dictionary = Dictionary::from_documents(&docs(&refs));
        assert_eq!(dictionary.len(), 3);

        dictionary.filter_extremes(&VocabularyConfig {
            no_below: 2,
            no_above: 0.5,
            keep_n: 10,
        });
        assert_eq!(dictionary.len(), 1);
        assert_eq!(dictionary.token_id("mid"), Some(0));
        assert_eq!(dictionary.token(0), Some("mid"));
        assert_eq!(dictionary.doc_freq(0), 4);
    }

    #[test]
    fn test_filter_extremes_keep_n_prefers_frequent() {
        let mut dictionary =
            Dictionary::from_documents(&docs(&["a b c", "b c", "c", "d"]));
        let before = dictionary.len();
        dictionary.filter_extremes(&VocabularyConfig {
            no_below: 1,
            no_above: 1.0,
            keep_n: 2,
        });
        assert!(dictionary.len() <= before);
        assert_eq!(dictionary.len(), 2);
        // ids compacted in previous order: b then c
        assert_eq!(dictionary.token(0), Some("b"));
        assert_eq!(dictionary.token(1), Some("c"));
        assert_eq!(dictionary.token_id("a"), None);
    }

    #[test]
    fn test_doc2bow_drops_unknown_tokens() {
        let dictionary = Dictionary::from_documents(&docs(&["x y"]));
        let bow = dictionary.doc2bow(&["y", "z", "y", "x"]);
        assert_eq!(bow, vec![(0, 1), (1, 2)]);
        assert!(dictionary.doc2bow(&["q"]).is_empty());
        assert_eq!(dictionary.doc2idx(&["x", "q"]), vec![Some(0), None]);
    }
}
