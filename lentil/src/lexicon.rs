//! Vocabulary names and the sentiment prior table.

use crate::common_io::read_lines;
use crate::corpus::{Token, TokenId};
use log::{info, warn};
use std::collections::{HashMap, HashSet};

/// Upper bound on sentiment classes; sets are stored as a bit mask.
pub const MAX_SENTIMENTS: usize = 64;

/// A small set of sentiment class indices.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct SentimentSet(u64);

impl SentimentSet {
    pub fn insert(&mut self, sentiment: usize) {
        debug_assert!(sentiment < MAX_SENTIMENTS);
        self.0 |= 1u64 << sentiment;
    }

    pub fn contains(&self, sentiment: usize) -> bool {
        sentiment < MAX_SENTIMENTS && (self.0 >> sentiment) & 1 == 1
    }

    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// The only member, if the set is a singleton
    pub fn single(&self) -> Option<usize> {
        if self.len() == 1 {
            Some(self.0.trailing_zeros() as usize)
        } else {
            None
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        (0..MAX_SENTIMENTS).filter(move |&s| self.contains(s))
    }
}

/// Word list; the line index of each word is its token id.
#[derive(Debug, Clone, Default)]
pub struct Vocabulary {
    words: Vec<Box<str>>,
    index: HashMap<Box<str>, TokenId>,
}

impl Vocabulary {
    pub fn from_words(words: Vec<Box<str>>) -> Self {
        let mut index = HashMap::with_capacity(words.len());
        for (id, w) in words.iter().enumerate() {
            if index.contains_key(w) {
                warn!("duplicate vocabulary word `{}` (id {}), keeping the first", w, id);
            } else {
                index.insert(w.clone(), id);
            }
        }
        Vocabulary { words, index }
    }

    /// One word per line (plain or gzipped)
    pub fn read_file(vocab_file: &str) -> anyhow::Result<Self> {
        let words: Vec<Box<str>> = read_lines(vocab_file)?
            .into_iter()
            .map(|w| w.trim().to_string().into_boxed_str())
            .collect();
        info!("Read {} vocabulary words from {}", words.len(), vocab_file);
        Ok(Self::from_words(words))
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn id(&self, word: &str) -> Option<TokenId> {
        self.index.get(word).copied()
    }

    pub fn word(&self, id: TokenId) -> Option<&str> {
        self.words.get(id).map(|w| w.as_ref())
    }

    pub fn words(&self) -> &[Box<str>] {
        &self.words
    }
}

/// Prior sentiment label per token id.
///
/// Tokens absent from the lexicon carry no label. A token listed with
/// two different classes is dropped, since it asserts nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SentimentLexicon {
    labels: Vec<Option<usize>>,
}

impl SentimentLexicon {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (TokenId, usize)>,
    {
        let mut assigned: HashMap<TokenId, usize> = HashMap::new();
        let mut conflicted: HashSet<TokenId> = HashSet::new();

        for (id, s) in pairs {
            match assigned.get(&id) {
                Some(&prev) if prev != s => {
                    conflicted.insert(id);
                }
                Some(_) => {}
                None => {
                    assigned.insert(id, s);
                }
            }
        }

        if !conflicted.is_empty() {
            warn!(
                "{} lexicon words listed with conflicting sentiments were dropped",
                conflicted.len()
            );
        }

        let size = assigned.keys().map(|&id| id + 1).max().unwrap_or(0);
        let mut labels = vec![None; size];
        for (id, s) in assigned {
            if !conflicted.contains(&id) {
                labels[id] = Some(s);
            }
        }
        SentimentLexicon { labels }
    }

    /// Read `<word-or-id> <sentiment>` lines.
    ///
    /// With a vocabulary, the first field is looked up as a word;
    /// otherwise it must be a numeric token id. Unknown words are skipped.
    pub fn read_file(lexicon_file: &str, vocab: Option<&Vocabulary>) -> anyhow::Result<Self> {
        let mut pairs = vec![];
        let mut num_unknown = 0;

        for (line_no, line) in read_lines(lexicon_file)?.iter().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut words = line.split_whitespace();
            let (Some(word), Some(senti)) = (words.next(), words.next()) else {
                return Err(anyhow::anyhow!(
                    "{}:{}: expected `<word> <sentiment>`",
                    lexicon_file,
                    line_no + 1
                ));
            };

            let senti: usize = senti.parse().map_err(|e| {
                anyhow::anyhow!("{}:{}: bad sentiment `{}`: {}", lexicon_file, line_no + 1, senti, e)
            })?;
            anyhow::ensure!(
                senti < MAX_SENTIMENTS,
                "{}:{}: sentiment {} out of range",
                lexicon_file,
                line_no + 1,
                senti
            );

            let id = match vocab {
                Some(v) => v.id(word),
                None => word.parse::<TokenId>().ok(),
            };

            match id {
                Some(id) => pairs.push((id, senti)),
                None => num_unknown += 1,
            }
        }

        if num_unknown > 0 {
            warn!("{}: skipped {} unknown lexicon words", lexicon_file, num_unknown);
        }

        let lexicon = Self::from_pairs(pairs);
        info!(
            "Read {} labelled words from {}",
            lexicon.num_labelled(),
            lexicon_file
        );
        Ok(lexicon)
    }

    #[inline]
    pub fn label(&self, id: TokenId) -> Option<usize> {
        self.labels.get(id).copied().flatten()
    }

    pub fn num_labelled(&self) -> usize {
        self.labels.iter().filter(|l| l.is_some()).count()
    }

    /// Largest sentiment index used, if any word is labelled
    pub fn max_sentiment(&self) -> Option<usize> {
        self.labels.iter().flatten().copied().max()
    }

    /// Largest labelled token id + 1
    pub fn id_range(&self) -> usize {
        self.labels
            .iter()
            .rposition(|l| l.is_some())
            .map(|i| i + 1)
            .unwrap_or(0)
    }

    /// Set of sentiments asserted by the lexicon members among `tokens`
    pub fn prior_set(&self, tokens: &[Token]) -> SentimentSet {
        let mut set = SentimentSet::default();
        for t in tokens {
            if let Some(s) = self.label(t.id) {
                set.insert(s);
            }
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentiment_set() {
        let mut set = SentimentSet::default();
        assert!(set.is_empty());
        assert_eq!(set.single(), None);

        set.insert(2);
        assert_eq!(set.single(), Some(2));
        set.insert(2);
        assert_eq!(set.len(), 1);

        set.insert(0);
        assert_eq!(set.len(), 2);
        assert_eq!(set.single(), None);
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![0, 2]);
    }

    #[test]
    fn test_conflicting_words_dropped() {
        let lexicon = SentimentLexicon::from_pairs([(0, 1), (3, 0), (3, 1), (5, 1), (5, 1)]);
        assert_eq!(lexicon.label(0), Some(1));
        assert_eq!(lexicon.label(3), None);
        assert_eq!(lexicon.label(5), Some(1));
        assert_eq!(lexicon.label(99), None);
        assert_eq!(lexicon.num_labelled(), 2);
        assert_eq!(lexicon.max_sentiment(), Some(1));
        assert_eq!(lexicon.id_range(), 6);
    }

    #[test]
    fn test_read_with_vocabulary() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let vocab_file = dir.path().join("vocab.txt");
        let lex_file = dir.path().join("lexicon.txt");
        std::fs::write(&vocab_file, "good\nbad\nphone\n")?;
        std::fs::write(&lex_file, "# word sentiment\ngood\t0\nbad 1\nunknown 1\n")?;

        let vocab = Vocabulary::read_file(vocab_file.to_str().unwrap())?;
        let lexicon = SentimentLexicon::read_file(lex_file.to_str().unwrap(), Some(&vocab))?;

        assert_eq!(vocab.len(), 3);
        assert_eq!(vocab.id("phone"), Some(2));
        assert_eq!(lexicon.label(0), Some(0));
        assert_eq!(lexicon.label(1), Some(1));
        assert_eq!(lexicon.label(2), None);

        let tokens = [Token { id: 0, count: 2 }, Token { id: 2, count: 1 }];
        assert_eq!(lexicon.prior_set(&tokens).single(), Some(0));
        Ok(())
    }

    #[test]
    fn test_bad_sentiment_is_error() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let lex_file = dir.path().join("lexicon.txt");
        std::fs::write(&lex_file, "4 positive\n")?;
        assert!(SentimentLexicon::read_file(lex_file.to_str().unwrap(), None).is_err());
        Ok(())
    }
}
