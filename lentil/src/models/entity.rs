//! Entity-augmented topic model.
//!
//! Each unit is explained either by its document's own topic mixture
//! (slot 0) or by the topic mixture of one of the entities the document
//! mentions (slot `j + 1` for the document's `j`-th entity). The state
//! is `slot * K + k`, so the state space grows with the number of
//! entities in the document.
//!
//! An entity slot is weighted by its share of the document's entity
//! mentions, i.e. uniform per mention rather than per entity.
//!
//! Count tables:
//! * `word_topic`: `K × V` token counts
//! * `doc_topic`: `D × K` units explained by the document
//! * `entity_topic`: `E × K` units explained by an entity
//! * `doc_switch`: `D × 2` units by explanation (document, entity)

use crate::conditional::{ln_smoothed, ln_unit_likelihood, LatentState, StateSpace};
use crate::corpus::{Corpus, Document, Unit};
use crate::count_store::{CountOp, CountStore};
use crate::estimate::{indexed_names, symmetric, word_log_likelihood, word_rows, Estimates};
use crate::hyper::{Hyperparameters, WordPrior};
use mcmc_util::CountTable;

const DOC_SLOT: usize = 0;
const ENTITY_SLOT: usize = 1;

pub struct EntityTopicModel {
    num_topics: usize,
    num_entities: usize,
    alpha: f64,
    gamma: f64,
    prior: WordPrior,
}

impl EntityTopicModel {
    pub fn new(
        num_topics: usize,
        num_entities: usize,
        hyper: &Hyperparameters,
        vocab_size: usize,
    ) -> anyhow::Result<Self> {
        anyhow::ensure!(num_topics > 0, "need at least one topic");
        anyhow::ensure!(vocab_size > 0, "empty vocabulary");
        hyper.validate()?;
        Ok(EntityTopicModel {
            num_topics,
            num_entities,
            alpha: hyper.alpha,
            gamma: hyper.gamma,
            prior: WordPrior::uniform(hyper.beta_common, vocab_size),
        })
    }

    pub fn num_topics(&self) -> usize {
        self.num_topics
    }
}

impl StateSpace for EntityTopicModel {
    fn name(&self) -> &'static str {
        "entity"
    }

    fn num_states(&self, doc: &Document) -> usize {
        (1 + doc.entities.len()) * self.num_topics
    }

    fn decode(&self, doc: &Document, state: usize) -> LatentState {
        let slot = state / self.num_topics;
        LatentState {
            topic: state % self.num_topics,
            sentiment: None,
            entity: slot.checked_sub(1).map(|j| doc.entities[j].entity),
        }
    }

    fn empty_counts(&self, corpus: &Corpus) -> CountStore {
        let (kk, dd) = (self.num_topics, corpus.num_documents());
        let ee = self.num_entities.max(corpus.num_entities);
        CountStore::new(
            CountTable::zeros(kk, self.prior.vocab_size()),
            CountTable::zeros(dd, kk),
        )
        .with_doc_switch(CountTable::zeros(dd, 2))
        .with_entity_topic(CountTable::zeros(ee, kk))
    }

    fn update_counts(
        &self,
        counts: &mut CountStore,
        doc_index: usize,
        doc: &Document,
        unit: &Unit,
        state: usize,
        op: CountOp,
    ) {
        let (slot, k) = (state / self.num_topics, state % self.num_topics);

        for t in unit.tokens.iter() {
            op.apply(&mut counts.word_topic, k, t.id, t.count);
        }

        let switch = if slot == 0 {
            op.apply(&mut counts.doc_topic, doc_index, k, 1);
            DOC_SLOT
        } else {
            let e = doc.entities[slot - 1].entity;
            if let Some(et) = counts.entity_topic.as_mut() {
                op.apply(et, e, k, 1);
            }
            ENTITY_SLOT
        };

        if let Some(sw) = counts.doc_switch.as_mut() {
            op.apply(sw, doc_index, switch, 1);
        }
    }

    fn log_weights(
        &self,
        counts: &CountStore,
        doc_index: usize,
        doc: &Document,
        unit: &Unit,
        out: &mut Vec<f64>,
    ) {
        let kk = self.num_topics;
        out.clear();
        out.resize(self.num_states(doc), f64::NEG_INFINITY);

        // word likelihood depends on the topic only
        let lik: Vec<f64> = (0..kk)
            .map(|k| ln_unit_likelihood(unit, &counts.word_topic, k, &self.prior, 0))
            .collect();

        let ln_switch = |which: usize| match counts.doc_switch.as_ref() {
            Some(sw) => ln_smoothed(sw.get(doc_index, which), sw.row_sum(doc_index), self.gamma, 2),
            None => 0.0,
        };

        let ln_doc = ln_switch(DOC_SLOT);
        let n_d = counts.doc_topic.row_sum(doc_index);
        for k in 0..kk {
            out[k] = ln_doc
                + ln_smoothed(counts.doc_topic.get(doc_index, k), n_d, self.alpha, kk)
                + lik[k];
        }

        let mentions = doc.entity_mentions();
        let Some(et) = counts.entity_topic.as_ref() else {
            return;
        };
        if mentions == 0 {
            return;
        }

        let ln_ent = ln_switch(ENTITY_SLOT);
        for (j, r) in doc.entities.iter().enumerate() {
            let ln_share = (r.count as f64 / mentions as f64).ln();
            let n_e = et.row_sum(r.entity);
            let base = (j + 1) * kk;
            for k in 0..kk {
                out[base + k] = ln_ent
                    + ln_share
                    + ln_smoothed(et.get(r.entity, k), n_e, self.alpha, kk)
                    + lik[k];
            }
        }
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
        if let Some(sw) = counts.doc_switch.as_ref() {
            est.push(
                "pi",
                corpus.document_names(),
                vec!["document".into(), "entity".into()],
                symmetric(sw, self.gamma)?,
            );
        }
        if let Some(et) = counts.entity_topic.as_ref() {
            est.push(
                "entity_theta",
                indexed_names("e", et.nrows()),
                indexed_names("t", self.num_topics),
                symmetric(et, self.alpha)?,
            );
        }
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
        let (corpus, _) = Corpus::parse_lines(&[
            "@doc a", "@entity 0:3 2:1", "0 1", "1 2 2", "3", "@doc b", "4 0", "@doc c",
            "@entity 1", "2 4",
        ]);
        corpus
    }

    #[test]
    fn test_state_space_per_document() -> anyhow::Result<()> {
        let corpus = corpus();
        let model = EntityTopicModel::new(2, 0, &Hyperparameters::default(), corpus.vocab_size)?;
        let docs = &corpus.documents;

        assert_eq!(model.num_states(&docs[0]), 6);
        assert_eq!(model.num_states(&docs[1]), 2);
        assert_eq!(model.decode(&docs[0], 1).entity, None);
        assert_eq!(model.decode(&docs[0], 3).entity, Some(0));
        assert_eq!(model.decode(&docs[0], 5), LatentState {
            topic: 1,
            sentiment: None,
            entity: Some(2)
        });
        Ok(())
    }

    #[test]
    fn test_entity_weight_per_mention() -> anyhow::Result<()> {
        let corpus = corpus();
        let model = EntityTopicModel::new(2, 0, &Hyperparameters::default(), corpus.vocab_size)?;

        // empty tables: entity slots differ only by their mention share
        let counts = model.empty_counts(&corpus);
        let doc = &corpus.documents[0];
        let mut logw = vec![];
        model.log_weights(&counts, 0, doc, &doc.units[0], &mut logw);

        assert_abs_diff_eq!(logw[2] - logw[4], (3.0f64).ln(), epsilon = 1e-12);
        assert_abs_diff_eq!(logw[3] - logw[5], (3.0f64).ln(), epsilon = 1e-12);
        // document slot vs. all entity slots together: equal switch prior
        let ent: f64 = logw[2..].iter().map(|x| x.exp()).sum();
        let own: f64 = logw[..2].iter().map(|x| x.exp()).sum();
        assert_abs_diff_eq!(own, ent, epsilon = 1e-12);
        Ok(())
    }

    #[test]
    fn test_counts_conserved() -> anyhow::Result<()> {
        let corpus = corpus();
        let model = EntityTopicModel::new(3, 0, &Hyperparameters::default(), corpus.vocab_size)?;
        let (counts, _) = random_fill(&model, &corpus, 9);

        let units = corpus.num_units();
        let by_entity = counts.entity_topic.as_ref().unwrap().total();
        assert_eq!(counts.doc_topic.total() + by_entity, units);
        assert_eq!(counts.doc_switch.as_ref().unwrap().total(), units);
        assert_eq!(counts.word_topic.total(), corpus.num_tokens());
        counts.verify()?;

        let est = model.estimate(&counts, &corpus)?;
        assert_eq!(est.get("entity_theta").unwrap().values.nrows(), 3);
        Ok(())
    }
}
