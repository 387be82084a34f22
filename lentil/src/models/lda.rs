use crate::conditional::{ln_smoothed, ln_unit_likelihood, LatentState, StateSpace};
use crate::corpus::{Corpus, Document, Unit};
use crate::count_store::{CountOp, CountStore};
use crate::estimate::{indexed_names, symmetric, word_log_likelihood, word_rows, Estimates};
use crate::hyper::{Hyperparameters, WordPrior};
use mcmc_util::CountTable;

/// Plain LDA: the state of a unit is its topic.
///
/// Usually run over the token-wise corpus, but sentence units work as
/// well (every token of a unit then shares one topic).
pub struct Lda {
    num_topics: usize,
    alpha: f64,
    prior: WordPrior,
}

impl Lda {
    pub fn new(num_topics: usize, hyper: &Hyperparameters, vocab_size: usize) -> anyhow::Result<Self> {
        anyhow::ensure!(num_topics > 0, "need at least one topic");
        anyhow::ensure!(vocab_size > 0, "empty vocabulary");
        hyper.validate()?;
        Ok(Lda {
            num_topics,
            alpha: hyper.alpha,
            prior: WordPrior::uniform(hyper.beta_common, vocab_size),
        })
    }

    pub fn num_topics(&self) -> usize {
        self.num_topics
    }
}

impl StateSpace for Lda {
    fn name(&self) -> &'static str {
        "lda"
    }

    fn num_states(&self, _doc: &Document) -> usize {
        self.num_topics
    }

    fn decode(&self, _doc: &Document, state: usize) -> LatentState {
        LatentState::topic(state)
    }

    fn empty_counts(&self, corpus: &Corpus) -> CountStore {
        CountStore::new(
            CountTable::zeros(self.num_topics, self.prior.vocab_size()),
            CountTable::zeros(corpus.num_documents(), self.num_topics),
        )
    }

    fn update_counts(
        &self,
        counts: &mut CountStore,
        doc_index: usize,
        _doc: &Document,
        unit: &Unit,
        state: usize,
        op: CountOp,
    ) {
        for t in unit.tokens.iter() {
            op.apply(&mut counts.word_topic, state, t.id, t.count);
        }
        op.apply(&mut counts.doc_topic, doc_index, state, 1);
    }

    fn log_weights(
        &self,
        counts: &CountStore,
        doc_index: usize,
        _doc: &Document,
        unit: &Unit,
        out: &mut Vec<f64>,
    ) {
        let kk = self.num_topics;
        let n_d = counts.doc_topic.row_sum(doc_index);
        out.clear();
        out.extend((0..kk).map(|k| {
            ln_smoothed(counts.doc_topic.get(doc_index, k), n_d, self.alpha, kk)
                + ln_unit_likelihood(unit, &counts.word_topic, k, &self.prior, 0)
        }));
    }

    fn estimate(&self, counts: &CountStore, corpus: &Corpus) -> anyhow::Result<Estimates> {
        let mut est = Estimates::default();
        est.push(
            "phi",
            indexed_names("t", self.num_topics),
            indexed_names("w", self.prior.vocab_size()),
            word_rows(&counts.word_topic, &self.prior, |_| 0)?,
        );
        est.push(
            "theta",
            corpus.document_names(),
            indexed_names("t", self.num_topics),
            symmetric(&counts.doc_topic, self.alpha)?,
        );
        Ok(est)
    }

    fn log_likelihood(&self, counts: &CountStore) -> f64 {
        word_log_likelihood(&counts.word_topic, &self.prior, |_| 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::testing::random_fill;
    use approx::assert_abs_diff_eq;

    fn corpus() -> Corpus {
        let (corpus, _) = Corpus::parse_lines(&["@doc a", "0 1 1 2", "3", "@doc b", "2 3:2"]);
        corpus.tokenwise()
    }

    #[test]
    fn test_conditional_matches_formula() -> anyhow::Result<()> {
        let corpus = corpus();
        let hyper = Hyperparameters::default();
        let lda = Lda::new(3, &hyper, corpus.vocab_size)?;
        let (counts, _) = random_fill(&lda, &corpus, 1);

        let doc = &corpus.documents[1];
        let unit = &doc.units[0];
        let w = unit.tokens[0].id;

        let mut logw = vec![];
        lda.log_weights(&counts, 1, doc, unit, &mut logw);
        assert_eq!(logw.len(), 3);

        let v = corpus.vocab_size as f64;
        for (k, &lw) in logw.iter().enumerate() {
            let theta = (counts.doc_topic.get(1, k) as f64 + hyper.alpha)
                / (counts.doc_topic.row_sum(1) as f64 + 3.0 * hyper.alpha);
            let phi = (counts.word_topic.get(k, w) as f64 + hyper.beta_common)
                / (counts.word_topic.row_sum(k) as f64 + v * hyper.beta_common);
            assert_abs_diff_eq!(lw, (theta * phi).ln(), epsilon = 1e-12);
        }
        Ok(())
    }

    #[test]
    fn test_counts_conserved() -> anyhow::Result<()> {
        let corpus = corpus();
        let lda = Lda::new(2, &Hyperparameters::default(), corpus.vocab_size)?;
        let (counts, _) = random_fill(&lda, &corpus, 7);

        assert_eq!(counts.word_topic.total(), corpus.num_tokens());
        assert_eq!(counts.doc_topic.total(), corpus.num_tokens());
        counts.verify()?;

        let est = lda.estimate(&counts, &corpus)?;
        for row in est.get("phi").unwrap().values.rows() {
            assert_abs_diff_eq!(row.sum(), 1.0, epsilon = 1e-10);
        }
        assert_eq!(est.get("theta").unwrap().row_names[1].as_ref(), "b");
        Ok(())
    }

    #[test]
    fn test_zero_topics_rejected() {
        assert!(Lda::new(0, &Hyperparameters::default(), 4).is_err());
    }
}
