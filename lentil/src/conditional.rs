//! Conditional distribution of one unit's latent state given every
//! other unit's assignment.
//!
//! A model is described by a [`StateSpace`]: how its candidate states
//! are enumerated, which count cells a state touches, and the log-weight
//! of each candidate. The sampling loop is written once against this
//! trait.

use crate::corpus::{Corpus, Document, EntityId, Unit};
use crate::count_store::{CountOp, CountStore};
use crate::estimate::Estimates;
use crate::hyper::WordPrior;
use mcmc_util::CountTable;
use rand::Rng;

/// Decoded components of a state index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LatentState {
    pub topic: usize,
    pub sentiment: Option<usize>,
    pub entity: Option<EntityId>,
}

impl LatentState {
    pub fn topic(topic: usize) -> Self {
        LatentState {
            topic,
            sentiment: None,
            entity: None,
        }
    }
}

/// State-space descriptor of a collapsed Gibbs model.
///
/// States of a unit are `0..num_states(doc)`; the enumeration order is
/// fixed, which makes draws reproducible for a given seed.
pub trait StateSpace: Sync {
    /// Short model name for logs and summaries
    fn name(&self) -> &'static str;

    /// Number of candidate states for units of `doc`
    fn num_states(&self, doc: &Document) -> usize;

    fn decode(&self, doc: &Document, state: usize) -> LatentState;

    /// All-zero count tables sized for `corpus`
    fn empty_counts(&self, corpus: &Corpus) -> CountStore;

    /// Add or remove the unit's contribution under `state`.
    ///
    /// Every cell the state touches changes by the same amount in both
    /// directions, so `Remove` after `Add` restores the store exactly.
    fn update_counts(
        &self,
        counts: &mut CountStore,
        doc_index: usize,
        doc: &Document,
        unit: &Unit,
        state: usize,
        op: CountOp,
    );

    /// Unnormalized log-weight of every candidate state, written to `out`.
    ///
    /// The unit's own contribution must already be removed from `counts`.
    /// Disallowed states get `-inf`.
    fn log_weights(
        &self,
        counts: &CountStore,
        doc_index: usize,
        doc: &Document,
        unit: &Unit,
        out: &mut Vec<f64>,
    );

    /// Random first state; must respect the same restrictions as
    /// [`StateSpace::log_weights`].
    fn initial_state<R: Rng + ?Sized>(&self, doc: &Document, _unit: &Unit, rng: &mut R) -> usize {
        rng.random_range(0..self.num_states(doc))
    }

    /// Normalized probability tables from the current counts
    fn estimate(&self, counts: &CountStore, corpus: &Corpus) -> anyhow::Result<Estimates>;

    /// Collapsed log-likelihood of the word tables
    fn log_likelihood(&self, counts: &CountStore) -> f64;
}

/// Log of the Dirichlet-multinomial predictive probability of a whole
/// unit under one word-table row:
///
/// ```text
///   prod_w prod_{i < m_w} (n[row, w] + beta_w + i)
///   ----------------------------------------------
///        prod_{j < m} (n[row] + beta_0 + j)
/// ```
///
/// where `m_w` is the multiplicity of token `w` and `m` the unit length.
/// A unit with a single distinct token `w` of multiplicity 2 thus gets
/// `(c + b)/(C + b0) * (c + 1 + b)/(C + 1 + b0)`.
pub fn ln_unit_likelihood(
    unit: &Unit,
    word_topic: &CountTable,
    row: usize,
    prior: &WordPrior,
    prior_row: usize,
) -> f64 {
    let mut llik = 0.0;

    for t in unit.tokens.iter() {
        let base = word_topic.get(row, t.id) as f64 + prior.beta(prior_row, t.id);
        for i in 0..t.count {
            llik += (base + i as f64).ln();
        }
    }

    let base = word_topic.row_sum(row) as f64 + prior.sum(prior_row);
    for j in 0..unit.length {
        llik -= (base + j as f64).ln();
    }
    llik
}

/// `ln((n + a) / (total + k * a))`
#[inline]
pub fn ln_smoothed(n: usize, total: usize, a: f64, k: usize) -> f64 {
    ((n as f64 + a) / (total as f64 + k as f64 * a)).ln()
}
