//! Model variants expressed as state spaces over one sampling loop.

/// Latent Dirichlet allocation (one topic per unit)
pub mod lda;

/// Joint sentiment-topic model (one sentiment and topic per unit)
pub mod jst;

/// Entity-augmented topic model (document or entity topic per unit)
pub mod entity;

pub use entity::EntityTopicModel;
pub use jst::JointSentimentTopic;
pub use lda::Lda;

#[cfg(test)]
pub(crate) mod testing {
    use crate::corpus::Corpus;
    use crate::count_store::{CountOp, CountStore};
    use crate::conditional::StateSpace;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    /// Assign every non-excluded unit a random state and fill the counts
    pub fn random_fill<M: StateSpace>(
        model: &M,
        corpus: &Corpus,
        seed: u64,
    ) -> (CountStore, Vec<Vec<Option<usize>>>) {
        let mut rng = SmallRng::seed_from_u64(seed);
        let mut counts = model.empty_counts(corpus);
        let mut states = vec![];
        for (d, doc) in corpus.documents.iter().enumerate() {
            let mut row = vec![];
            for unit in doc.units.iter() {
                if unit.is_excluded() {
                    row.push(None);
                    continue;
                }
                let z = model.initial_state(doc, unit, &mut rng);
                model.update_counts(&mut counts, d, doc, unit, z, CountOp::Add);
                row.push(Some(z));
            }
            states.push(row);
        }
        (counts, states)
    }
}
