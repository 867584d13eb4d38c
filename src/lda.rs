use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Gamma};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::dictionary::{BagOfWords, Dictionary};
use crate::error::{Error, Result};
use crate::special::{dirichlet_expectation, digamma, trigamma};

const PHINORM_EPSILON: f64 = 1e-100;

/// Document-topic prior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Alpha {
    /// Starts symmetric at `1/K` and is re-estimated after every chunk.
    Auto,
    /// `1/K` for every topic.
    Symmetric,
    /// `1/(i + sqrt K)`, normalized.
    Asymmetric,
    Fixed(f64),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LdaConfig {
    pub num_topics: usize,
    /// Seed for parameter initialization and per-document inference.
    pub random_state: u64,
    /// Chunks per M-step; 0 runs a single M-step at the end of each pass.
    pub update_every: usize,
    pub chunksize: usize,
    /// Full sweeps over the corpus.
    pub passes: usize,
    pub alpha: Alpha,
    /// Topic-word prior; `None` means `1/K`.
    pub eta: Option<f64>,
    /// Cap on E-step iterations per document.
    pub iterations: usize,
    pub gamma_threshold: f64,
    /// Learning rate exponent, in (0.5, 1] for convergence.
    pub decay: f64,
    /// Slows down the first passes.
    pub offset: f64,
    pub minimum_probability: f64,
    pub minimum_phi_value: f64,
    pub per_word_topics: bool,
}

impl Default for LdaConfig {
    fn default() -> Self {
        LdaConfig {
            num_topics: 10,
            random_state: 100,
            update_every: 1,
            chunksize: 100,
            passes: 10,
            alpha: Alpha::Auto,
            eta: None,
            iterations: 50,
            gamma_threshold: 0.001,
            decay: 0.5,
            offset: 1.0,
            minimum_probability: 0.01,
            minimum_phi_value: 0.01,
            per_word_topics: true,
        }
    }
}

/// Topic mixture of one document.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentTopics {
    /// `(topic, probability)` for topics above the minimum probability.
    pub topics: Vec<(usize, f64)>,
    /// Per token id, its topics ordered by relevance. Empty unless per-word
    /// topics were requested.
    pub word_topics: Vec<(usize, Vec<usize>)>,
    /// Per token id, `(topic, phi)` scaled by the token's count.
    pub word_phis: Vec<(usize, Vec<(usize, f64)>)>,
}

impl DocumentTopics {
    pub fn dominant_topic(&self) -> Option<usize> {
        self.topics
            .iter()
            .max_by(|a, b| a.1.total_cmp(&b.1).then_with(|| b.0.cmp(&a.0)))
            .map(|(topic, _)| *topic)
    }
}

/// Latent Dirichlet Allocation fitted with online variational Bayes.
#[derive(Debug, Clone)]
pub struct LdaModel {
    config: LdaConfig,
    id2token: Vec<String>,
    alpha: Vec<f64>,
    eta: f64,
    /// Sufficient statistics, K x V. The variational parameter is `eta + sstats`.
    sstats: Vec<Vec<f64>>,
    exp_elogbeta: Vec<Vec<f64>>,
    num_updates: usize,
}

impl LdaModel {
    /// Fits a model on `corpus`, whose ids must come from `dictionary`.
    pub fn train(corpus: &[BagOfWords], dictionary: &Dictionary, config: LdaConfig) -> Result<Self> {
        let num_topics = config.num_topics;
        let num_terms = dictionary.len();
        if num_topics == 0 {
            return Err(Error::Model("num_topics must be positive".into()));
        }
        if num_terms == 0 {
            return Err(Error::Model("cannot train on an empty vocabulary".into()));
        }
        if corpus.is_empty() {
            return Err(Error::Model("cannot train on an empty corpus".into()));
        }
        if config.chunksize == 0 || config.passes == 0 {
            return Err(Error::Model("chunksize and passes must be positive".into()));
        }
        if let Some((id, _)) = corpus.iter().flatten().find(|(id, _)| *id >= num_terms) {
            return Err(Error::Model(format!(
                "token id {} is outside the vocabulary of {} tokens",
                id, num_terms
            )));
        }

        let mut rng = StdRng::seed_from_u64(config.random_state);
        let eta = config.eta.unwrap_or(1.0 / num_topics as f64);
        let sstats = random_gamma(&mut rng, num_topics, num_terms)?;
        let exp_elogbeta = exp_elogbeta(&sstats, eta);

        let mut model = LdaModel {
            alpha: initial_alpha(&config.alpha, num_topics),
            eta,
            id2token: (0..num_terms)
                .map(|id| dictionary.token(id).unwrap_or_default().to_string())
                .collect(),
            sstats,
            exp_elogbeta,
            num_updates: 0,
            config,
        };

        info!(
            "Training LDA: {} topics, {} documents, {} terms, {} passes",
            num_topics,
            corpus.len(),
            num_terms,
            model.config.passes
        );
        model.update(corpus, &mut rng)?;
        Ok(model)
    }

    pub fn config(&self) -> &LdaConfig {
        &self.config
    }

    pub fn num_topics(&self) -> usize {
        self.config.num_topics
    }

    pub fn num_terms(&self) -> usize {
        self.id2token.len()
    }

    pub fn alpha(&self) -> &[f64] {
        &self.alpha
    }

    pub fn eta(&self) -> f64 {
        self.eta
    }

    fn update(&mut self, corpus: &[BagOfWords], rng: &mut StdRng) -> Result<()> {
        let total_docs = corpus.len();
        let chunksize = self.config.chunksize.min(total_docs);
        let update_every = self.config.update_every;

        for pass in 0..self.config.passes {
            let mut other = zeros(self.num_topics(), self.num_terms());
            let mut other_docs = 0;
            let mut dirty = false;

            for (chunk_no, chunk) in corpus.chunks(chunksize).enumerate() {
                let gamma = self.do_estep(chunk, &mut other, rng)?;
                other_docs += chunk.len();

                if self.config.alpha == Alpha::Auto {
                    let rho = self.rho(pass, chunksize);
                    self.update_alpha(&gamma, rho);
                }
                dirty = true;

                if update_every > 0 && (chunk_no + 1) % update_every == 0 {
                    let rho = self.rho(pass, chunksize);
                    self.do_mstep(rho, &other, other_docs, total_docs, pass > 0);
                    other = zeros(self.num_topics(), self.num_terms());
                    other_docs = 0;
                    dirty = false;
                }
            }

            if dirty {
                let rho = self.rho(pass, chunksize);
                self.do_mstep(rho, &other, other_docs, total_docs, pass > 0);
            }

            debug!(
                pass = pass + 1,
                passes = self.config.passes,
                rho = self.rho(pass, chunksize),
                "finished LDA pass"
            );
        }
        Ok(())
    }

    fn rho(&self, pass: usize, chunksize: usize) -> f64 {
        (self.config.offset + pass as f64 + self.num_updates as f64 / chunksize as f64)
            .powf(-self.config.decay)
    }

    fn do_estep(
        &self,
        chunk: &[BagOfWords],
        other: &mut [Vec<f64>],
        rng: &mut StdRng,
    ) -> Result<Vec<Vec<f64>>> {
        let (gamma, sstats) = self.inference(chunk, true, rng)?;
        if let Some(sstats) = sstats {
            for (acc, row) in other.iter_mut().zip(sstats) {
                for (a, s) in acc.iter_mut().zip(row) {
                    *a += s;
                }
            }
        }
        Ok(gamma)
    }

    /// Blends the chunk statistics into the model with weight `rho`, scaled up
    /// to the size of the whole corpus.
    fn do_mstep(
        &mut self,
        rho: f64,
        other: &[Vec<f64>],
        other_docs: usize,
        total_docs: usize,
        extra_pass: bool,
    ) {
        let scale = if other_docs == 0 {
            1.0
        } else {
            total_docs as f64 / other_docs as f64
        };
        for (row, other_row) in self.sstats.iter_mut().zip(other) {
            for (s, o) in row.iter_mut().zip(other_row) {
                *s = (1.0 - rho) * *s + rho * scale * o;
            }
        }
        self.exp_elogbeta = exp_elogbeta(&self.sstats, self.eta);

        if !extra_pass {
            self.num_updates += other_docs;
        }
    }

    /// One Newton step on the document-topic prior.
    fn update_alpha(&mut self, gamma: &[Vec<f64>], rho: f64) {
        if gamma.is_empty() {
            return;
        }
        let n = gamma.len() as f64;
        let mut logphat = vec![0.0; self.num_topics()];
        for row in gamma {
            for (acc, e) in logphat.iter_mut().zip(dirichlet_expectation(row)) {
                *acc += e / n;
            }
        }
        self.alpha = update_dir_prior(&self.alpha, n, &logphat, rho);
        debug!(alpha = ?self.alpha, "updated alpha");
    }

    /// Variational E-step over `chunk`. Returns the per-document `gamma` and,
    /// if requested, the chunk's sufficient statistics (K x V).
    fn inference(
        &self,
        chunk: &[BagOfWords],
        collect_sstats: bool,
        rng: &mut StdRng,
    ) -> Result<(Vec<Vec<f64>>, Option<Vec<Vec<f64>>>)> {
        let num_topics = self.num_topics();
        let mut gamma = random_gamma(rng, chunk.len(), num_topics)?;
        let mut sstats = collect_sstats.then(|| zeros(num_topics, self.num_terms()));

        for (doc, gammad) in chunk.iter().zip(gamma.iter_mut()) {
            let ids: Vec<usize> = doc.iter().map(|(id, _)| *id).collect();
            let cts: Vec<f64> = doc.iter().map(|(_, count)| *count as f64).collect();
            // K x len(ids)
            let exp_elogbetad: Vec<Vec<f64>> = self
                .exp_elogbeta
                .iter()
                .map(|row| ids.iter().map(|&id| row[id]).collect())
                .collect();

            let mut exp_elogthetad = exp_dirichlet_expectation(gammad);
            let mut phinorm = phi_norm(&exp_elogthetad, &exp_elogbetad, ids.len());

            for _ in 0..self.config.iterations {
                let last_gamma = gammad.clone();
                for (k, g) in gammad.iter_mut().enumerate() {
                    let dot: f64 = exp_elogbetad[k]
                        .iter()
                        .zip(&cts)
                        .zip(&phinorm)
                        .map(|((b, c), p)| b * c / p)
                        .sum();
                    *g = self.alpha[k] + exp_elogthetad[k] * dot;
                }
                exp_elogthetad = exp_dirichlet_expectation(gammad);
                phinorm = phi_norm(&exp_elogthetad, &exp_elogbetad, ids.len());

                if mean_absolute_difference(gammad, &last_gamma) < self.config.gamma_threshold {
                    break;
                }
            }

            if let Some(sstats) = sstats.as_mut() {
                for (k, row) in sstats.iter_mut().enumerate() {
                    for (j, &id) in ids.iter().enumerate() {
                        row[id] += exp_elogthetad[k] * cts[j] / phinorm[j];
                    }
                }
            }
        }

        if let Some(sstats) = sstats.as_mut() {
            for (row, beta_row) in sstats.iter_mut().zip(&self.exp_elogbeta) {
                for (s, b) in row.iter_mut().zip(beta_row) {
                    *s *= b;
                }
            }
        }
        Ok((gamma, sstats))
    }

    /// Normalized topic-word distribution of `topic`.
    pub fn topic_weights(&self, topic: usize) -> Vec<f64> {
        let Some(row) = self.sstats.get(topic) else {
            return Vec::new();
        };
        let lambda: Vec<f64> = row.iter().map(|s| self.eta + s).collect();
        let total: f64 = lambda.iter().sum();
        lambda.into_iter().map(|l| l / total).collect()
    }

    /// Ids of the `topn` heaviest terms of `topic`, heaviest first.
    pub fn top_topic_ids(&self, topic: usize, topn: usize) -> Vec<usize> {
        self.ranked_terms(topic, topn).into_iter().map(|(id, _)| id).collect()
    }

    fn ranked_terms(&self, topic: usize, topn: usize) -> Vec<(usize, f64)> {
        let mut ranked: Vec<(usize, f64)> = self.topic_weights(topic).into_iter().enumerate().collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(topn);
        ranked
    }

    /// The `topn` heaviest `(token, weight)` pairs of `topic`.
    pub fn show_topic(&self, topic: usize, topn: usize) -> Vec<(String, f64)> {
        self.ranked_terms(topic, topn)
            .into_iter()
            .map(|(id, weight)| (self.id2token[id].clone(), weight))
            .collect()
    }

    /// Every topic as `(id, "0.054*\"token\" + ...")`.
    pub fn print_topics(&self, num_words: usize) -> Vec<(usize, String)> {
        (0..self.num_topics())
            .map(|topic| {
                let description = self
                    .show_topic(topic, num_words)
                    .iter()
                    .map(|(token, weight)| format!("{:.3}*\"{}\"", weight, token))
                    .collect::<Vec<_>>()
                    .join(" + ");
                (topic, description)
            })
            .collect()
    }

    /// Infers the topic mixture of one document.
    pub fn get_document_topics(&self, bow: &BagOfWords) -> Result<DocumentTopics> {
        let gammad = self.document_gamma(bow)?;
        let topics = self.topic_probabilities(&gammad);

        let mut word_topics = Vec::new();
        let mut word_phis = Vec::new();
        if self.config.per_word_topics {
            let minimum_phi = self.config.minimum_phi_value.max(1e-8);
            let exp_elogthetad = exp_dirichlet_expectation(&gammad);
            for &(id, count) in bow {
                let weights: Vec<f64> = exp_elogthetad
                    .iter()
                    .zip(&self.exp_elogbeta)
                    .map(|(t, row)| t * row[id])
                    .collect();
                let norm = weights.iter().sum::<f64>() + PHINORM_EPSILON;
                let phi: Vec<(usize, f64)> = weights
                    .into_iter()
                    .map(|w| w * count as f64 / norm)
                    .enumerate()
                    .filter(|(_, value)| *value >= minimum_phi)
                    .collect();
                let mut ranked = phi.clone();
                ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| b.0.cmp(&a.0)));
                word_topics.push((id, ranked.into_iter().map(|(topic, _)| topic).collect()));
                word_phis.push((id, phi));
            }
        }

        Ok(DocumentTopics {
            topics,
            word_topics,
            word_phis,
        })
    }

    /// Most probable topic of one document, without per-word assignments.
    pub fn dominant_topic(&self, bow: &BagOfWords) -> Result<Option<usize>> {
        let gammad = self.document_gamma(bow)?;
        let topics = DocumentTopics {
            topics: self.topic_probabilities(&gammad),
            word_topics: Vec::new(),
            word_phis: Vec::new(),
        };
        Ok(topics.dominant_topic())
    }

    fn document_gamma(&self, bow: &BagOfWords) -> Result<Vec<f64>> {
        let mut rng = StdRng::seed_from_u64(self.config.random_state);
        let (gamma, _) = self.inference(std::slice::from_ref(bow), false, &mut rng)?;
        gamma
            .into_iter()
            .next()
            .ok_or_else(|| Error::Model("inference returned no document".into()))
    }

    fn topic_probabilities(&self, gammad: &[f64]) -> Vec<(usize, f64)> {
        let minimum_probability = self.config.minimum_probability.max(1e-8);
        let total: f64 = gammad.iter().sum();
        gammad
            .iter()
            .enumerate()
            .map(|(topic, g)| (topic, g / total))
            .filter(|(_, p)| *p >= minimum_probability)
            .collect()
    }
}

fn initial_alpha(alpha: &Alpha, num_topics: usize) -> Vec<f64> {
    let k = num_topics as f64;
    match alpha {
        Alpha::Auto | Alpha::Symmetric => vec![1.0 / k; num_topics],
        Alpha::Asymmetric => {
            let raw: Vec<f64> = (0..num_topics).map(|i| 1.0 / (i as f64 + k.sqrt())).collect();
            let total: f64 = raw.iter().sum();
            raw.into_iter().map(|a| a / total).collect()
        }
        Alpha::Fixed(value) => vec![*value; num_topics],
    }
}

/// Newton update of a Dirichlet prior given the mean `E[ln θ]` over `n`
/// documents. The step is skipped if it would make any component
/// non-positive.
fn update_dir_prior(prior: &[f64], n: f64, logphat: &[f64], rho: f64) -> Vec<f64> {
    let psi_total = digamma(prior.iter().sum());
    let gradf: Vec<f64> = prior
        .iter()
        .zip(logphat)
        .map(|(p, l)| n * (psi_total - digamma(*p) + l))
        .collect();
    let c = n * trigamma(prior.iter().sum());
    let q: Vec<f64> = prior.iter().map(|p| -n * trigamma(*p)).collect();

    let b = gradf.iter().zip(&q).map(|(g, q)| g / q).sum::<f64>()
        / (1.0 / c + q.iter().map(|q| 1.0 / q).sum::<f64>());

    let updated: Vec<f64> = prior
        .iter()
        .zip(gradf.iter().zip(&q))
        .map(|(p, (g, q))| p + rho * (-(g - b) / q))
        .collect();

    if updated.iter().all(|p| *p > 0.0 && p.is_finite()) {
        updated
    } else {
        prior.to_vec()
    }
}

fn random_gamma(rng: &mut StdRng, rows: usize, cols: usize) -> Result<Vec<Vec<f64>>> {
    let dist = Gamma::new(100.0, 1.0 / 100.0)
        .map_err(|e| Error::Model(format!("invalid initialization prior: {}", e)))?;
    let mut out = Vec::with_capacity(rows);
    for _ in 0..rows {
        let mut row = Vec::with_capacity(cols);
        for _ in 0..cols {
            row.push(dist.sample(rng));
        }
        out.push(row);
    }
    Ok(out)
}

fn exp_dirichlet_expectation(alpha: &[f64]) -> Vec<f64> {
    dirichlet_expectation(alpha).into_iter().map(f64::exp).collect()
}

/// `exp(E[ln β])` of every topic, with `λ = eta + sstats`.
fn exp_elogbeta(sstats: &[Vec<f64>], eta: f64) -> Vec<Vec<f64>> {
    sstats
        .iter()
        .map(|row| {
            let lambda: Vec<f64> = row.iter().map(|s| eta + s).collect();
            exp_dirichlet_expectation(&lambda)
        })
        .collect()
}

/// `exp_elogtheta · exp_elogbeta[:, j]` for every word position `j`.
fn phi_norm(exp_elogthetad: &[f64], exp_elogbetad: &[Vec<f64>], len: usize) -> Vec<f64> {
    (0..len)
        .map(|j| {
            exp_elogthetad
                .iter()
                .zip(exp_elogbetad)
                .map(|(t, row)| t * row[j])
                .sum::<f64>()
                + PHINORM_EPSILON
        })
        .collect()
}

fn mean_absolute_difference(a: &[f64], b: &[f64]) -> f64 {
    if a.is_empty() {
        return 0.0;
    }
    a.iter().zip(b).map(|(x, y)| (x - y).abs()).sum::<f64>() / a.len() as f64
}

fn zeros(rows: usize, cols: usize) -> Vec<Vec<f64>> {
    vec![vec![0.0; cols]; rows]
}
