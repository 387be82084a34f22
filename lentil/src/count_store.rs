//! Sufficient statistics of a model: a fixed set of named count tables.
//!
//! Only the sampling loop mutates a store, one unit at a time, through
//! [`StateSpace::update_counts`](crate::conditional::StateSpace::update_counts).

use mcmc_util::CountTable;

/// Whether a unit's assignment enters or leaves the tables
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountOp {
    Add,
    Remove,
}

impl CountOp {
    #[inline]
    pub fn apply(self, table: &mut CountTable, row: usize, col: usize, n: usize) {
        match self {
            CountOp::Add => table.add(row, col, n),
            CountOp::Remove => table.subtract(row, col, n),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountStore {
    /// token counts: (topic or sentiment × topic) × vocabulary
    pub word_topic: CountTable,
    /// unit counts: (document or document × sentiment) × topic
    pub doc_topic: CountTable,
    /// unit counts: document × sentiment, or document × {document, entity}
    pub doc_switch: Option<CountTable>,
    /// unit counts: entity × topic
    pub entity_topic: Option<CountTable>,
}

impl CountStore {
    pub fn new(word_topic: CountTable, doc_topic: CountTable) -> Self {
        CountStore {
            word_topic,
            doc_topic,
            doc_switch: None,
            entity_topic: None,
        }
    }

    pub fn with_doc_switch(mut self, doc_switch: CountTable) -> Self {
        self.doc_switch = Some(doc_switch);
        self
    }

    pub fn with_entity_topic(mut self, entity_topic: CountTable) -> Self {
        self.entity_topic = Some(entity_topic);
        self
    }

    /// Every table present, with a stable name
    pub fn tables(&self) -> Vec<(&'static str, &CountTable)> {
        let mut ret = vec![("word_topic", &self.word_topic), ("doc_topic", &self.doc_topic)];
        if let Some(t) = self.doc_switch.as_ref() {
            ret.push(("doc_switch", t));
        }
        if let Some(t) = self.entity_topic.as_ref() {
            ret.push(("entity_topic", t));
        }
        ret
    }

    /// Zero every table, keeping shapes
    pub fn clear(&mut self) {
        self.word_topic.clear();
        self.doc_topic.clear();
        if let Some(t) = self.doc_switch.as_mut() {
            t.clear();
        }
        if let Some(t) = self.entity_topic.as_mut() {
            t.clear();
        }
    }

    /// Check the cached row sums of every table
    pub fn verify(&self) -> anyhow::Result<()> {
        for (name, table) in self.tables() {
            table
                .check_row_sums()
                .map_err(|e| anyhow::anyhow!("{}: {}", name, e))?;
        }
        Ok(())
    }

    /// First `(table, row, col)` where two stores disagree
    pub fn first_difference(&self, other: &CountStore) -> Option<(&'static str, usize, usize)> {
        let mine = self.tables();
        let theirs = other.tables();
        if mine.len() != theirs.len() {
            return Some(("tables", mine.len(), theirs.len()));
        }
        mine.into_iter()
            .zip(theirs)
            .find_map(|((name, a), (_, b))| a.first_difference(b).map(|(r, c)| (name, r, c)))
    }
}
