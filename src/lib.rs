//! Exploratory topic modeling over preprocessed paragraphs: bigram phrases,
//! a filtered vocabulary, bag-of-words vectors, online LDA and c_v coherence.

pub mod coherence;
pub mod config;
pub mod corpus;
pub mod dictionary;
pub mod error;
pub mod lda;
pub mod phrases;
pub mod pipeline;
pub mod report;
pub mod special;
