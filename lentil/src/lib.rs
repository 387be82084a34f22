//! Collapsed Gibbs sampling for topic models over sentence units: plain
//! LDA, a joint sentiment-topic model driven by a sentiment lexicon, and
//! an entity-augmented topic model, all run by one sampling loop.

pub mod common_io;
pub mod table_io;

/// Documents, units and tokens
pub mod corpus;

/// Vocabulary and sentiment lexicon
pub mod lexicon;

/// Dirichlet hyperparameters and word smoothing
pub mod hyper;

pub mod count_store;

/// State-space trait and unit likelihood
pub mod conditional;

pub mod models;

/// Normalized estimates and log-likelihood
pub mod estimate;

pub mod sampler;

pub mod snapshot;

pub use conditional::{LatentState, StateSpace};
pub use corpus::Corpus;
pub use hyper::Hyperparameters;
pub use sampler::{GibbsSampler, SamplerOptions};
