use std::path::PathBuf;

use tracing::{debug, info};

use crate::coherence::CoherenceModel;
use crate::config::PipelineConfig;
use crate::corpus::{self, DocumentRecord};
use crate::dictionary::{BagOfWords, Dictionary, VocabularyConfig};
use crate::error::Result;
use crate::lda::{LdaConfig, LdaModel};
use crate::phrases::{Phrases, PhrasesConfig};
use crate::report;

/// Topic listing width, in terms per topic.
const TOPIC_WORDS: usize = 10;

/// One fitted model of a run.
#[derive(Debug)]
pub struct TopicRun {
    pub num_topics: usize,
    pub model: LdaModel,
    pub coherence: f64,
    pub topics: Vec<(usize, String)>,
    /// Number of paragraphs whose most probable topic is each topic.
    pub dominant_topic_sizes: Vec<usize>,
    pub output: PathBuf,
}

#[derive(Debug)]
pub struct RunSummary {
    pub num_texts: usize,
    pub num_paragraphs: usize,
    pub vocabulary_before: usize,
    pub vocabulary_after: usize,
    pub runs: Vec<TopicRun>,
}

impl RunSummary {
    /// `(num_topics, coherence)` for every tested topic count.
    pub fn coherence(&self) -> Vec<(usize, f64)> {
        self.runs.iter().map(|r| (r.num_topics, r.coherence)).collect()
    }
}

/// Working corpus after phrase detection, with the vocabulary and vectors
/// built from it.
pub struct PreparedCorpus {
    pub texts: Vec<Vec<String>>,
    pub dictionary: Dictionary,
    pub vocabulary_before: usize,
    pub bows: Vec<BagOfWords>,
}

pub fn tokenize_paragraphs(paragraphs: &[String]) -> Vec<Vec<String>> {
    paragraphs.iter().map(|p| corpus::tokenize(p)).collect()
}

/// Learns bigrams on `sentences` and rewrites every sentence with them.
pub fn detect_phrases(sentences: &[Vec<String>], config: &PhrasesConfig) -> Vec<Vec<String>> {
    let phrases = Phrases::learn(sentences, config.clone());
    sentences.iter().map(|s| phrases.transform(s)).collect()
}

/// Builds the dictionary and filters it. Returns it with its unfiltered size.
pub fn build_vocabulary(texts: &[Vec<String>], config: &VocabularyConfig) -> (Dictionary, usize) {
    let mut dictionary = Dictionary::from_documents(texts);
    let before = dictionary.len();
    info!("Original size of dictionary: {}", before);
    dictionary.filter_extremes(config);
    info!("Size of filtered dictionary: {}", dictionary.len());
    (dictionary, before)
}

/// One bag-of-words per text, in order.
pub fn vectorize(dictionary: &Dictionary, texts: &[Vec<String>]) -> Vec<BagOfWords> {
    texts.iter().map(|t| dictionary.doc2bow(t)).collect()
}

pub fn prepare(paragraphs: &[String], config: &PipelineConfig) -> PreparedCorpus {
    let tokenized = tokenize_paragraphs(paragraphs);
    let texts = detect_phrases(&tokenized, &config.phrases);
    let (dictionary, vocabulary_before) = build_vocabulary(&texts, &config.vocabulary);
    let bows = vectorize(&dictionary, &texts);
    debug!(
        empty = bows.iter().filter(|b| b.is_empty()).count(),
        "paragraphs without in-vocabulary tokens"
    );
    PreparedCorpus {
        texts,
        dictionary,
        vocabulary_before,
        bows,
    }
}

/// Trains, scores and reports one model.
pub fn run_topic_count(
    prepared: &PreparedCorpus,
    num_topics: usize,
    config: &PipelineConfig,
) -> Result<TopicRun> {
    let lda_config = LdaConfig {
        num_topics,
        ..config.lda.clone()
    };
    let model = LdaModel::train(&prepared.bows, &prepared.dictionary, lda_config)?;

    let scorer = CoherenceModel::new(&prepared.texts, &prepared.dictionary, config.coherence.clone());
    let coherence = scorer.get_coherence(&model)?;
    info!("Coherence (c_v) for {} topics: {:.4}", num_topics, coherence);

    let mut dominant_topic_sizes = vec![0; num_topics];
    for bow in &prepared.bows {
        if let Some(topic) = model.dominant_topic(bow)? {
            dominant_topic_sizes[topic] += 1;
        }
    }
    debug!(sizes = ?dominant_topic_sizes, "paragraphs per dominant topic");

    let topics = model.print_topics(TOPIC_WORDS);
    let output = report::output_path(&config.output_template, num_topics);
    report::write_topics(&output, &topics)?;

    Ok(TopicRun {
        num_topics,
        model,
        coherence,
        topics,
        dominant_topic_sizes,
        output,
    })
}

pub fn load_records(config: &PipelineConfig) -> Result<Vec<DocumentRecord>> {
    corpus::read_all(&config.inputs, config.progress)
}

/// Runs every stage for every configured topic count.
pub fn run(config: &PipelineConfig) -> Result<RunSummary> {
    config.validate()?;

    let records = load_records(config)?;
    let paragraphs = corpus::extract_paragraphs(&records)?;
    let num_texts = records.len();
    drop(records);

    let prepared = prepare(&paragraphs, config);

    let mut runs = Vec::with_capacity(config.topic_counts.len());
    for &num_topics in &config.topic_counts {
        runs.push(run_topic_count(&prepared, num_topics, config)?);
    }

    Ok(RunSummary {
        num_texts,
        num_paragraphs: paragraphs.len(),
        vocabulary_before: prepared.vocabulary_before,
        vocabulary_after: prepared.dictionary.len(),
        runs,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paragraphs() -> Vec<String> {
        vec![
            "the cat sat".to_string(),
            "the dog ran".to_string(),
            "the cat ran".to_string(),
        ]
    }

    #[test]
    fn test_vectorize_is_one_to_one() {
        let texts = tokenize_paragraphs(&paragraphs());
        let (dictionary, before) = build_vocabulary(
            &texts,
            &VocabularyConfig {
                no_below: 2,
                no_above: 1.0,
                keep_n: 10,
            },
        );
        // "the", "cat", "ran" survive
        assert_eq!(before, 5);
        assert_eq!(dictionary.len(), 3);

        let bows = vectorize(&dictionary, &texts);
        assert_eq!(bows.len(), texts.len());
        assert!(bows.iter().flatten().all(|(id, _)| *id < dictionary.len()));
        assert_eq!(bows[1].len(), 2); // "dog" dropped
    }

    #[test]
    fn test_detect_phrases_keeps_sentence_count() {
        let texts = tokenize_paragraphs(&paragraphs());
        let merged = detect_phrases(&texts, &PhrasesConfig::default());
        assert_eq!(merged, texts);
    }
}
