use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::coherence::CoherenceConfig;
use crate::dictionary::VocabularyConfig;
use crate::error::{Error, Result};
use crate::lda::LdaConfig;
use crate::phrases::PhrasesConfig;
use crate::report::{self, DEFAULT_OUTPUT_TEMPLATE};

pub const DEFAULT_INPUTS: [&str; 2] = [
    "../data/selfparsed/preprocessed-english-other-noaliases.jsonl",
    "../data/selfparsed/preprocessed-english-sustainability-noaliases.jsonl",
];

/// Every tunable of a run. Missing fields in a config file take the defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub inputs: Vec<PathBuf>,
    pub phrases: PhrasesConfig,
    pub vocabulary: VocabularyConfig,
    /// Trainer settings; `num_topics` is overridden by each of `topic_counts`.
    pub lda: LdaConfig,
    /// One model is trained and scored per entry.
    pub topic_counts: Vec<usize>,
    pub coherence: CoherenceConfig,
    /// Output path with a `{num_topics}` placeholder.
    pub output_template: String,
    pub progress: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            inputs: DEFAULT_INPUTS.iter().map(PathBuf::from).collect(),
            phrases: PhrasesConfig::default(),
            vocabulary: VocabularyConfig::default(),
            lda: LdaConfig::default(),
            topic_counts: vec![10],
            coherence: CoherenceConfig::default(),
            output_template: DEFAULT_OUTPUT_TEMPLATE.to_string(),
            progress: true,
        }
    }
}

impl PipelineConfig {
    /// Reads a JSON config file.
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::MissingInput(path.to_path_buf()));
        }
        let reader = BufReader::new(File::open(path)?);
        serde_json::from_reader(reader).map_err(|source| Error::Json {
            path: path.to_path_buf(),
            line: source.line(),
            source,
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.inputs.is_empty() {
            return Err(Error::Config("at least one input file is required".into()));
        }
        if !(self.vocabulary.no_above > 0.0 && self.vocabulary.no_above <= 1.0) {
            return Err(Error::Config(format!(
                "no_above must be in (0, 1], got {}",
                self.vocabulary.no_above
            )));
        }
        if self.topic_counts.is_empty() || self.topic_counts.contains(&0) {
            return Err(Error::Config("topic counts must be non-empty and positive".into()));
        }
        if self.lda.chunksize == 0 || self.lda.passes == 0 {
            return Err(Error::Config("chunksize and passes must be positive".into()));
        }
        if self.coherence.window_size < 2 {
            return Err(Error::Config("coherence window size must be at least 2".into()));
        }
        if self.coherence.topn == 0 {
            return Err(Error::Config("coherence topn must be positive".into()));
        }
        if self.topic_counts.len() > 1 && !report::has_placeholder(&self.output_template) {
            return Err(Error::Config(
                "output template needs a {num_topics} placeholder when several topic counts are tested"
                    .into(),
            ));
        }
        Ok(())
    }
}
