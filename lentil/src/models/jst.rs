//! Joint sentiment-topic model over sentence units.
//!
//! Every non-excluded unit carries one sentiment `s` and one topic `k`,
//! encoded as the state `s * K + k`. A unit whose lexicon words all
//! assert the same sentiment is restricted to that sentiment; rows of
//! any other sentiment get weight zero without evaluating the word
//! likelihood.
//!
//! Count tables:
//! * `word_topic`: `(s * K + k) × V` token counts
//! * `doc_topic`: `(d * S + s) × K` unit counts
//! * `doc_switch`: `D × S` unit counts

use crate::conditional::{ln_smoothed, ln_unit_likelihood, LatentState, StateSpace};
use crate::corpus::{Corpus, Document, Unit};
use crate::count_store::{CountOp, CountStore};
use crate::estimate::{indexed_names, symmetric, word_log_likelihood, word_rows, Estimates};
use crate::hyper::{Hyperparameters, WordPrior};
use crate::lexicon::{SentimentLexicon, MAX_SENTIMENTS};
use mcmc_util::CountTable;
use rand::Rng;

pub struct JointSentimentTopic {
    num_topics: usize,
    num_sentiments: usize,
    alpha: f64,
    gamma: f64,
    prior: WordPrior,
}

impl JointSentimentTopic {
    pub fn new(
        num_topics: usize,
        num_sentiments: usize,
        hyper: &Hyperparameters,
        lexicon: &SentimentLexicon,
        vocab_size: usize,
    ) -> anyhow::Result<Self> {
        anyhow::ensure!(num_topics > 0, "need at least one topic");
        anyhow::ensure!(
            num_sentiments > 0 && num_sentiments <= MAX_SENTIMENTS,
            "number of sentiments must be in 1..={}",
            MAX_SENTIMENTS
        );
        hyper.validate()?;
        Ok(JointSentimentTopic {
            num_topics,
            num_sentiments,
            alpha: hyper.alpha,
            gamma: hyper.gamma,
            prior: WordPrior::from_lexicon(hyper, lexicon, num_sentiments, vocab_size)?,
        })
    }

    pub fn num_topics(&self) -> usize {
        self.num_topics
    }

    pub fn num_sentiments(&self) -> usize {
        self.num_sentiments
    }

    #[inline]
    fn state(&self, sentiment: usize, topic: usize) -> usize {
        sentiment * self.num_topics + topic
    }

    fn sentiment_of(&self, row: usize) -> usize {
        row / self.num_topics
    }
}

impl StateSpace for JointSentimentTopic {
    fn name(&self) -> &'static str {
        "jst"
    }

    fn num_states(&self, _doc: &Document) -> usize {
        self.num_sentiments * self.num_topics
    }

    fn decode(&self, _doc: &Document, state: usize) -> LatentState {
        LatentState {
            topic: state % self.num_topics,
            sentiment: Some(state / self.num_topics),
            entity: None,
        }
    }

    fn empty_counts(&self, corpus: &Corpus) -> CountStore {
        let (kk, ss, dd) = (self.num_topics, self.num_sentiments, corpus.num_documents());
        CountStore::new(
            CountTable::zeros(ss * kk, self.prior.vocab_size()),
            CountTable::zeros(dd * ss, kk),
        )
        .with_doc_switch(CountTable::zeros(dd, ss))
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
        let (s, k) = (state / self.num_topics, state % self.num_topics);
        for t in unit.tokens.iter() {
            op.apply(&mut counts.word_topic, state, t.id, t.count);
        }
        op.apply(&mut counts.doc_topic, doc_index * self.num_sentiments + s, k, 1);
        if let Some(pi) = counts.doc_switch.as_mut() {
            op.apply(pi, doc_index, s, 1);
        }
    }

    fn log_weights(
        &self,
        counts: &CountStore,
        doc_index: usize,
        _doc: &Document,
        unit: &Unit,
        out: &mut Vec<f64>,
    ) {
        let (kk, ss) = (self.num_topics, self.num_sentiments);
        let fixed = unit.fixed_sentiment();

        out.clear();
        out.resize(ss * kk, f64::NEG_INFINITY);

        for s in 0..ss {
            if fixed.is_some_and(|f| f != s) {
                continue;
            }

            let ln_pi = match counts.doc_switch.as_ref() {
                Some(pi) => ln_smoothed(pi.get(doc_index, s), pi.row_sum(doc_index), self.gamma, ss),
                None => 0.0,
            };

            let ds = doc_index * ss + s;
            let n_ds = counts.doc_topic.row_sum(ds);

            for k in 0..kk {
                let ln_theta = ln_smoothed(counts.doc_topic.get(ds, k), n_ds, self.alpha, kk);
                let z = self.state(s, k);
                out[z] = ln_pi
                    + ln_theta
                    + ln_unit_likelihood(unit, &counts.word_topic, z, &self.prior, s);
            }
        }
    }

    fn initial_state<R: Rng + ?Sized>(&self, _doc: &Document, unit: &Unit, rng: &mut R) -> usize {
        let k = rng.random_range(0..self.num_topics);
        let s = match unit.fixed_sentiment() {
            Some(f) => f,
            None => rng.random_range(0..self.num_sentiments),
        };
        self.state(s, k)
    }

    fn estimate(&self, counts: &CountStore, corpus: &Corpus) -> anyhow::Result<Estimates> {
        let (kk, ss) = (self.num_topics, self.num_sentiments);
        let mut est = Estimates::default();

        let phi_names = (0..ss)
            .flat_map(|s| (0..kk).map(move |k| format!("s{}_t{}", s, k).into_boxed_str()))
            .collect();
        est.push(
            "phi",
            phi_names,
            indexed_names("w", self.prior.vocab_size()),
            word_rows(&counts.word_topic, &self.prior, |r| self.sentiment_of(r))?,
        );

        let theta_names = corpus
            .documents
            .iter()
            .flat_map(|d| (0..ss).map(move |s| format!("{}_s{}", d.name, s).into_boxed_str()))
            .collect();
        est.push(
            "theta",
            theta_names,
            indexed_names("t", kk),
            symmetric(&counts.doc_topic, self.alpha)?,
        );

        if let Some(pi) = counts.doc_switch.as_ref() {
            est.push(
                "pi",
                corpus.document_names(),
                indexed_names("s", ss),
                symmetric(pi, self.gamma)?,
            );
        }
        Ok(est)
    }

    fn log_likelihood(&self, counts: &CountStore) -> f64 {
        word_log_likelihood(&counts.word_topic, &self.prior, |r| self.sentiment_of(r))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::testing::random_fill;
    use approx::assert_abs_diff_eq;

    fn setup(max_unit_length: usize) -> anyhow::Result<(Corpus, JointSentimentTopic, Hyperparameters)> {
        // word 0 positive (0), word 1 negative (1)
        let lexicon = SentimentLexicon::from_pairs([(0, 0), (1, 1)]);
        let (mut corpus, _) = Corpus::parse_lines(&[
            "@doc a", "0 2 3", "0 1 2", "2 3 3 4 4 4", "@doc b", "1 4", "3",
        ]);
        corpus.annotate(&lexicon, max_unit_length);

        let hyper = Hyperparameters {
            beta_other_lexicon: 0.001,
            max_unit_length,
            ..Default::default()
        };
        let jst = JointSentimentTopic::new(2, 2, &hyper, &lexicon, corpus.vocab_size)?;
        Ok((corpus, jst, hyper))
    }

    #[test]
    fn test_trimmed_rows_are_zero() -> anyhow::Result<()> {
        let (corpus, jst, _) = setup(0)?;
        let (counts, states) = random_fill(&jst, &corpus, 3);

        let doc = &corpus.documents[0];
        let mut logw = vec![];
        jst.log_weights(&counts, 0, doc, &doc.units[0], &mut logw);
        assert_eq!(logw.len(), 4);
        assert!(logw[..2].iter().all(|x| x.is_finite()));
        assert!(logw[2..].iter().all(|&x| x == f64::NEG_INFINITY));

        // the ambiguous unit has no state
        assert_eq!(states[0][1], None);
        // the positive unit starts positive
        assert_eq!(jst.decode(doc, states[0][0].unwrap()).sentiment, Some(0));
        Ok(())
    }

    #[test]
    fn test_conditional_matches_formula() -> anyhow::Result<()> {
        let (corpus, jst, hyper) = setup(0)?;
        let (counts, _) = random_fill(&jst, &corpus, 11);
        let doc = &corpus.documents[1];
        let unit = &doc.units[1];
        assert_eq!(unit.fixed_sentiment(), None);

        let mut logw = vec![];
        jst.log_weights(&counts, 1, doc, unit, &mut logw);

        let pi = counts.doc_switch.as_ref().unwrap();
        for s in 0..2 {
            for k in 0..2 {
                let z = s * 2 + k;
                let row = 2 + s;
                let p_s = (pi.get(1, s) as f64 + hyper.gamma)
                    / (pi.row_sum(1) as f64 + 2.0 * hyper.gamma);
                let p_k = (counts.doc_topic.get(row, k) as f64 + hyper.alpha)
                    / (counts.doc_topic.row_sum(row) as f64 + 2.0 * hyper.alpha);
                let b = jst.prior.beta(s, 3);
                let p_w = (counts.word_topic.get(z, 3) as f64 + b)
                    / (counts.word_topic.row_sum(z) as f64 + jst.prior.sum(s));
                assert_abs_diff_eq!(logw[z], (p_s * p_k * p_w).ln(), epsilon = 1e-12);
            }
        }
        Ok(())
    }

    #[test]
    fn test_long_units_excluded_from_counts() -> anyhow::Result<()> {
        let (corpus, jst, _) = setup(4)?;
        let (counts, states) = random_fill(&jst, &corpus, 5);

        assert_eq!(states[0], vec![Some(states[0][0].unwrap()), None, None]);
        let assigned_units: usize = states.iter().flatten().filter(|z| z.is_some()).count();
        let assigned_tokens: usize = corpus
            .documents
            .iter()
            .flat_map(|d| d.units.iter())
            .filter(|u| !u.is_excluded())
            .map(|u| u.length)
            .sum();

        assert_eq!(counts.doc_topic.total(), assigned_units);
        assert_eq!(counts.doc_switch.as_ref().unwrap().total(), assigned_units);
        assert_eq!(counts.word_topic.total(), assigned_tokens);

        let est = jst.estimate(&counts, &corpus)?;
        for name in ["phi", "theta", "pi"] {
            for row in est.get(name).unwrap().values.rows() {
                assert_abs_diff_eq!(row.sum(), 1.0, epsilon = 1e-10);
            }
        }
        assert_eq!(est.get("theta").unwrap().row_names[3].as_ref(), "b_s1");
        Ok(())
    }

    #[test]
    fn test_lexicon_beyond_sentiments_rejected() {
        let lexicon = SentimentLexicon::from_pairs([(0, 2)]);
        let hyper = Hyperparameters::default();
        assert!(JointSentimentTopic::new(2, 2, &hyper, &lexicon, 5).is_err());
        assert!(JointSentimentTopic::new(2, 0, &hyper, &SentimentLexicon::empty(), 5).is_err());
    }

    #[test]
    fn test_zero_own_lexicon_prior_rejected() {
        // "0" would be fixed to sentiment 0 with no prior mass for word 0 there
        let lexicon = SentimentLexicon::from_pairs([(0, 0)]);
        let (mut corpus, _) = Corpus::parse_lines(&["@doc a", "0", "1 2", "@doc b", "2 1"]);
        corpus.annotate(&lexicon, 0);
        let hyper = Hyperparameters {
            beta_lexicon: 0.0,
            ..Default::default()
        };
        assert!(hyper.validate().is_ok());
        assert!(JointSentimentTopic::new(2, 2, &hyper, &lexicon, corpus.vocab_size).is_err());
    }
}
