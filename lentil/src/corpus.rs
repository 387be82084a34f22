//! Tokenized corpus: documents made of units (sentences or single
//! tokens), each unit a bag of vocabulary ids with multiplicities.
//!
//! The corpus is built once and is read-only while sampling. The only
//! per-unit data derived after loading is the prior-sentiment set and
//! exclusion status, filled in by [`Corpus::annotate`] before the
//! sampler is constructed.

use crate::common_io::read_lines;
use crate::lexicon::{SentimentLexicon, SentimentSet};
use log::{info, warn};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;

pub type TokenId = usize;
pub type EntityId = usize;

/// A vocabulary id with its multiplicity inside one unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub id: TokenId,
    pub count: usize,
}

/// Why a unit never takes part in sampling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Exclusion {
    /// tokens assert two different prior sentiments
    Ambiguous,
    /// more tokens than the configured maximum unit length
    TooLong,
}

/// The atomic resampled entity: a sentence, or a single token in plain LDA.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unit {
    /// distinct tokens, sorted by id
    pub tokens: Vec<Token>,
    /// total number of tokens (sum of multiplicities)
    pub length: usize,
    /// sentiment classes implied by lexicon membership of the tokens
    pub prior_sentiments: SentimentSet,
    pub exclusion: Option<Exclusion>,
}

impl Unit {
    /// Build a unit from `(id, multiplicity)` pairs, merging repeated ids.
    ///
    /// Returns `None` when nothing with a positive multiplicity is left,
    /// or when the multiplicities do not fit in `usize`.
    pub fn from_counts<I>(pairs: I) -> Option<Unit>
    where
        I: IntoIterator<Item = (TokenId, usize)>,
    {
        Self::try_from_counts(pairs).ok().flatten()
    }

    /// Like [`Unit::from_counts`], but an overflowing multiplicity or
    /// unit length is an error.
    pub fn try_from_counts<I>(pairs: I) -> anyhow::Result<Option<Unit>>
    where
        I: IntoIterator<Item = (TokenId, usize)>,
    {
        let mut merged: BTreeMap<TokenId, usize> = BTreeMap::new();
        for (id, count) in pairs {
            if count > 0 {
                let c = merged.entry(id).or_default();
                *c = c
                    .checked_add(count)
                    .ok_or_else(|| anyhow::anyhow!("multiplicity of token {} overflows", id))?;
            }
        }
        if merged.is_empty() {
            return Ok(None);
        }

        let mut length: usize = 0;
        let mut tokens = Vec::with_capacity(merged.len());
        for (id, count) in merged {
            length = length
                .checked_add(count)
                .ok_or_else(|| anyhow::anyhow!("unit length overflows"))?;
            tokens.push(Token { id, count });
        }

        Ok(Some(Unit {
            tokens,
            length,
            prior_sentiments: SentimentSet::default(),
            exclusion: None,
        }))
    }

    /// Parse a whitespace-separated list of `id` or `id:multiplicity`.
    pub fn parse(line: &str) -> anyhow::Result<Option<Unit>> {
        let mut pairs = vec![];
        for word in line.split_whitespace() {
            let (id, count) = match word.split_once(':') {
                Some((id, count)) => (id, count.parse::<usize>()?),
                None => (word, 1),
            };
            pairs.push((id.parse::<TokenId>()?, count));
        }
        Self::try_from_counts(pairs)
    }

    pub fn is_excluded(&self) -> bool {
        self.exclusion.is_some()
    }

    /// The single sentiment class this unit is restricted to, if any
    pub fn fixed_sentiment(&self) -> Option<usize> {
        if self.is_excluded() {
            None
        } else {
            self.prior_sentiments.single()
        }
    }
}

/// A document's reference to an entity, with its occurrence count
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityRef {
    pub entity: EntityId,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub name: Box<str>,
    /// external metadata; only carried through to reports
    pub rating: Option<f32>,
    pub units: Vec<Unit>,
    pub entities: Vec<EntityRef>,
}

impl Document {
    pub fn new(name: &str) -> Self {
        Document {
            name: name.into(),
            rating: None,
            units: vec![],
            entities: vec![],
        }
    }

    /// Total number of entity mentions in this document
    pub fn entity_mentions(&self) -> usize {
        self.entities.iter().map(|e| e.count).sum()
    }

    /// Add `count` mentions of `entity`, merging with an existing reference.
    ///
    /// Fails, leaving the document unchanged, when the total number of
    /// mentions would overflow.
    pub fn add_entity(&mut self, entity: EntityId, count: usize) -> anyhow::Result<()> {
        if count == 0 {
            return Ok(());
        }
        anyhow::ensure!(
            self.entity_mentions().checked_add(count).is_some(),
            "document {}: entity mentions overflow",
            self.name
        );
        match self.entities.iter_mut().find(|e| e.entity == entity) {
            Some(e) => e.count += count,
            None => self.entities.push(EntityRef { entity, count }),
        }
        Ok(())
    }
}

/// What happened while reading a corpus file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LoadSummary {
    pub num_documents: usize,
    pub num_units: usize,
    pub num_tokens: usize,
    pub num_dropped_units: usize,
    pub num_dropped_entity_lines: usize,
}

/// How units were classified against the sentiment lexicon
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExclusionSummary {
    pub num_free: usize,
    pub num_fixed: usize,
    pub num_ambiguous: usize,
    pub num_too_long: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Corpus {
    pub documents: Vec<Document>,
    /// number of vocabulary ids (at least `1 + max id` in the documents)
    pub vocab_size: usize,
    /// number of entity ids (at least `1 + max entity id`)
    pub num_entities: usize,
}

enum ParsedLine {
    Skip,
    Doc { name: Box<str>, rating: Option<f32> },
    Entities(Vec<(EntityId, usize)>),
    Unit(Unit),
    BadEntities(Box<str>),
    BadUnit(Box<str>),
}

fn parse_entity_refs(rest: &str) -> anyhow::Result<Vec<(EntityId, usize)>> {
    let mut refs = vec![];
    let mut total: usize = 0;
    for word in rest.split_whitespace() {
        let (id, count) = match word.split_once(':') {
            Some((id, count)) => (id, count.parse::<usize>()?),
            None => (word, 1),
        };
        total = total
            .checked_add(count)
            .ok_or_else(|| anyhow::anyhow!("mention count overflows"))?;
        refs.push((id.parse::<EntityId>()?, count));
    }
    Ok(refs)
}

/// Text after a `@tag` directive; the tag must end at whitespace or
/// the end of the line.
fn strip_directive<'a>(line: &'a str, tag: &str) -> Option<&'a str> {
    let rest = line.strip_prefix(tag)?;
    if rest.is_empty() || rest.starts_with(char::is_whitespace) {
        Some(rest)
    } else {
        None
    }
}

fn parse_line(line: &str) -> ParsedLine {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return ParsedLine::Skip;
    }

    if let Some(rest) = strip_directive(line, "@doc") {
        let mut words = rest.split_whitespace();
        let name: Box<str> = words.next().unwrap_or("").into();
        let rating = words.next().and_then(|r| r.parse::<f32>().ok());
        return ParsedLine::Doc { name, rating };
    }

    if let Some(rest) = strip_directive(line, "@entity") {
        return match parse_entity_refs(rest) {
            Ok(refs) => ParsedLine::Entities(refs),
            Err(e) => ParsedLine::BadEntities(format!("entity line `{}`: {}", line, e).into()),
        };
    }

    match Unit::parse(line) {
        Ok(Some(unit)) => ParsedLine::Unit(unit),
        Ok(None) => ParsedLine::BadUnit(format!("empty unit `{}`", line).into()),
        Err(e) => ParsedLine::BadUnit(format!("unit `{}`: {}", line, e).into()),
    }
}

impl Corpus {
    /// Wrap documents, sizing vocabulary and entity ranges from their contents.
    pub fn from_documents(documents: Vec<Document>) -> Self {
        let vocab_size = documents
            .iter()
            .flat_map(|d| d.units.iter())
            .flat_map(|u| u.tokens.iter())
            .map(|t| t.id + 1)
            .max()
            .unwrap_or(0);

        let num_entities = documents
            .iter()
            .flat_map(|d| d.entities.iter())
            .map(|e| e.entity + 1)
            .max()
            .unwrap_or(0);

        Corpus {
            documents,
            vocab_size,
            num_entities,
        }
    }

    /// Read a corpus file (plain or gzipped).
    ///
    /// * `@doc <name> [<rating>]` opens a document
    /// * `@entity <id>:<count> ...` attaches entity references to it
    /// * any other non-comment line is one unit of `<id>[:<multiplicity>]`
    ///
    /// Units that fail to parse are dropped with a warning.
    pub fn read_file(corpus_file: &str) -> anyhow::Result<(Corpus, LoadSummary)> {
        let lines = read_lines(corpus_file)?;
        let (corpus, summary) = Self::parse_lines(&lines);
        info!(
            "Read {}: {} documents, {} units, {} tokens ({} units dropped)",
            corpus_file,
            summary.num_documents,
            summary.num_units,
            summary.num_tokens,
            summary.num_dropped_units
        );
        Ok((corpus, summary))
    }

    /// Parse corpus lines; see [`Corpus::read_file`] for the format.
    pub fn parse_lines<S>(lines: &[S]) -> (Corpus, LoadSummary)
    where
        S: AsRef<str> + Sync,
    {
        // parsing is the expensive part, grouping must stay sequential
        let parsed: Vec<ParsedLine> = lines.par_iter().map(|l| parse_line(l.as_ref())).collect();

        let mut documents: Vec<Document> = vec![];
        let mut summary = LoadSummary::default();

        for (line_no, item) in parsed.into_iter().enumerate() {
            match item {
                ParsedLine::Skip => {}
                ParsedLine::Doc { name, rating } => {
                    let name = if name.is_empty() {
                        documents.len().to_string().into_boxed_str()
                    } else {
                        name
                    };
                    let mut doc = Document::new(&name);
                    doc.rating = rating;
                    documents.push(doc);
                }
                ParsedLine::Entities(refs) => match documents.last_mut() {
                    Some(doc) => {
                        let before = doc.entities.clone();
                        let added = refs
                            .into_iter()
                            .try_for_each(|(e, c)| doc.add_entity(e, c));
                        if let Err(e) = added {
                            doc.entities = before;
                            warn!("line {}: dropped entity line: {}", line_no + 1, e);
                            summary.num_dropped_entity_lines += 1;
                        }
                    }
                    None => {
                        warn!("line {}: entity line before any @doc, dropped", line_no + 1);
                        summary.num_dropped_entity_lines += 1;
                    }
                },
                ParsedLine::Unit(unit) => match documents.last_mut() {
                    Some(doc) => doc.units.push(unit),
                    None => {
                        warn!("line {}: unit before any @doc, dropped", line_no + 1);
                        summary.num_dropped_units += 1;
                    }
                },
                ParsedLine::BadEntities(msg) => {
                    warn!("line {}: dropped malformed {}", line_no + 1, msg);
                    summary.num_dropped_entity_lines += 1;
                }
                ParsedLine::BadUnit(msg) => {
                    warn!("line {}: dropped malformed {}", line_no + 1, msg);
                    summary.num_dropped_units += 1;
                }
            }
        }

        let corpus = Corpus::from_documents(documents);
        summary.num_documents = corpus.documents.len();
        summary.num_units = corpus.num_units();
        summary.num_tokens = corpus.num_tokens();
        (corpus, summary)
    }

    /// Widen the vocabulary range, e.g. to the size of a vocabulary file.
    pub fn with_vocab_size(mut self, vocab_size: usize) -> anyhow::Result<Self> {
        anyhow::ensure!(
            vocab_size >= self.vocab_size,
            "corpus uses token id {} but vocabulary has only {} words",
            self.vocab_size.saturating_sub(1),
            vocab_size
        );
        self.vocab_size = vocab_size;
        Ok(self)
    }

    /// Widen the entity range.
    pub fn with_num_entities(mut self, num_entities: usize) -> anyhow::Result<Self> {
        anyhow::ensure!(
            num_entities >= self.num_entities,
            "corpus uses entity id {} but only {} entities are declared",
            self.num_entities.saturating_sub(1),
            num_entities
        );
        self.num_entities = num_entities;
        Ok(self)
    }

    pub fn num_documents(&self) -> usize {
        self.documents.len()
    }

    /// Count units by sampling status
    pub fn exclusion_summary(&self) -> ExclusionSummary {
        let mut summary = ExclusionSummary::default();
        for unit in self.documents.iter().flat_map(|d| d.units.iter()) {
            match unit.exclusion {
                Some(Exclusion::Ambiguous) => summary.num_ambiguous += 1,
                Some(Exclusion::TooLong) => summary.num_too_long += 1,
                None if unit.prior_sentiments.is_empty() => summary.num_free += 1,
                None => summary.num_fixed += 1,
            }
        }
        summary
    }

    pub fn document_names(&self) -> Vec<Box<str>> {
        self.documents.iter().map(|d| d.name.clone()).collect()
    }

    pub fn num_units(&self) -> usize {
        self.documents.iter().map(|d| d.units.len()).sum()
    }

    pub fn num_tokens(&self) -> usize {
        self.documents
            .iter()
            .flat_map(|d| d.units.iter())
            .map(|u| u.length)
            .sum()
    }

    /// Split every unit into single-token units (plain LDA resamples tokens).
    ///
    /// Document order and entity references are kept; exclusion marks are
    /// cleared and must be recomputed with [`Corpus::annotate`].
    pub fn tokenwise(&self) -> Corpus {
        let documents = self
            .documents
            .iter()
            .map(|doc| Document {
                name: doc.name.clone(),
                rating: doc.rating,
                entities: doc.entities.clone(),
                units: doc
                    .units
                    .iter()
                    .flat_map(|u| u.tokens.iter())
                    .flat_map(|t| std::iter::repeat(t.id).take(t.count))
                    .filter_map(|id| Unit::from_counts([(id, 1)]))
                    .collect(),
            })
            .collect();

        Corpus {
            documents,
            vocab_size: self.vocab_size,
            num_entities: self.num_entities,
        }
    }

    /// Derive each unit's prior-sentiment set and exclusion status.
    ///
    /// A unit is excluded when its tokens assert two or more different
    /// sentiments, or when it is longer than `max_unit_length`
    /// (`0` = no limit).
    pub fn annotate(
        &mut self,
        lexicon: &SentimentLexicon,
        max_unit_length: usize,
    ) -> ExclusionSummary {
        for unit in self.documents.iter_mut().flat_map(|d| d.units.iter_mut()) {
            unit.prior_sentiments = lexicon.prior_set(&unit.tokens);
            unit.exclusion = if unit.prior_sentiments.len() > 1 {
                Some(Exclusion::Ambiguous)
            } else if max_unit_length > 0 && unit.length > max_unit_length {
                Some(Exclusion::TooLong)
            } else {
                None
            };
        }

        let summary = self.exclusion_summary();
        if summary.num_ambiguous + summary.num_too_long > 0 {
            info!(
                "Excluded {} ambiguous and {} over-length units from sampling",
                summary.num_ambiguous, summary.num_too_long
            );
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CORPUS: &str = "\
# comment
@doc review1 4.5
@entity 0:2 1
1 2 2 3
5:3 1

@doc review2
oops 1
7
@entity 1:2 x:1
";

    fn lines() -> Vec<&'static str> {
        CORPUS.lines().collect()
    }

    #[test]
    fn test_parse_documents_and_units() {
        let (corpus, summary) = Corpus::parse_lines(&lines());

        assert_eq!(corpus.num_documents(), 2);
        assert_eq!(summary.num_units, 3);
        assert_eq!(summary.num_dropped_units, 1);
        assert_eq!(summary.num_dropped_entity_lines, 1);

        let doc = &corpus.documents[0];
        assert_eq!(doc.name.as_ref(), "review1");
        assert_eq!(doc.rating, Some(4.5));
        assert_eq!(doc.entity_mentions(), 3);

        let unit = &doc.units[0];
        assert_eq!(unit.length, 4);
        assert_eq!(
            unit.tokens,
            vec![
                Token { id: 1, count: 1 },
                Token { id: 2, count: 2 },
                Token { id: 3, count: 1 }
            ]
        );
        assert_eq!(doc.units[1].length, 4);

        assert_eq!(corpus.vocab_size, 8);
        assert_eq!(corpus.num_entities, 2);
        assert_eq!(corpus.num_tokens(), 9);
    }

    #[test]
    fn test_unit_before_doc_dropped() {
        let (corpus, summary) = Corpus::parse_lines(&["1 2", "@doc a", "3"]);
        assert_eq!(corpus.num_units(), 1);
        assert_eq!(summary.num_dropped_units, 1);
    }

    #[test]
    fn test_tokenwise_expansion() {
        let (corpus, _) = Corpus::parse_lines(&lines());
        let tokens = corpus.tokenwise();
        assert_eq!(tokens.num_units(), corpus.num_tokens());
        assert!(tokens
            .documents
            .iter()
            .flat_map(|d| d.units.iter())
            .all(|u| u.length == 1));
        assert_eq!(tokens.documents[0].entities, corpus.documents[0].entities);
    }

    #[test]
    fn test_annotate_exclusions() {
        let lexicon = SentimentLexicon::from_pairs([(1, 0), (3, 1), (7, 1)]);
        let (mut corpus, _) = Corpus::parse_lines(&lines());

        let summary = corpus.annotate(&lexicon, 3);
        // {1,2,3}: ambiguous; {1,5}: length 4 > 3; {7}: fixed positive
        assert_eq!(summary.num_ambiguous, 1);
        assert_eq!(summary.num_too_long, 1);
        assert_eq!(summary.num_fixed, 1);

        let units: Vec<&Unit> = corpus.documents.iter().flat_map(|d| &d.units).collect();
        assert_eq!(units[0].exclusion, Some(Exclusion::Ambiguous));
        assert_eq!(units[1].exclusion, Some(Exclusion::TooLong));
        assert_eq!(units[1].fixed_sentiment(), None);
        assert_eq!(units[2].fixed_sentiment(), Some(1));
    }

    #[test]
    fn test_overflowing_counts_dropped() {
        let huge = usize::MAX;
        assert!(Unit::parse(&format!("1:{} 1:1", huge)).is_err());
        assert!(Unit::parse(&format!("1:{} 2:1", huge)).is_err());
        assert_eq!(Unit::from_counts([(1, huge), (1, 1)]), None);

        let lines = vec![
            "@doc a".to_string(),
            format!("1:{} 2:1", huge),
            "3 4".to_string(),
            format!("@entity 0:{} 1:1", huge),
            "@entity 0:2".to_string(),
            format!("@entity 1:{}", huge),
        ];
        let (corpus, summary) = Corpus::parse_lines(&lines[..]);
        assert_eq!(summary.num_dropped_units, 1);
        assert_eq!(summary.num_dropped_entity_lines, 2);
        assert_eq!(corpus.num_units(), 1);
        assert_eq!(corpus.documents[0].entities, vec![EntityRef { entity: 0, count: 2 }]);
    }

    #[test]
    fn test_directive_needs_separator() {
        let (corpus, summary) = Corpus::parse_lines(&[
            "@doc", "1", "@document x", "@docx", "@entityfoo 1", "@entity\t0:2", "@doc\tb", "2",
        ]);
        assert_eq!(corpus.num_documents(), 2);
        assert_eq!(corpus.documents[0].name.as_ref(), "0");
        assert_eq!(corpus.documents[1].name.as_ref(), "b");
        assert_eq!(corpus.documents[0].entity_mentions(), 2);
        // the three look-alikes are malformed unit lines
        assert_eq!(summary.num_dropped_units, 3);
    }

    #[test]
    fn test_vocab_size_guard() {
        let (corpus, _) = Corpus::parse_lines(&lines());
        assert!(corpus.clone().with_vocab_size(3).is_err());
        assert_eq!(corpus.with_vocab_size(100).unwrap().vocab_size, 100);
    }
}
