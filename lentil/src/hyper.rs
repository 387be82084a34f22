use crate::lexicon::SentimentLexicon;
use serde::Serialize;

/// Dirichlet pseudo-counts shared by every model variant.
///
/// Loaded once before sampling and never mutated afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Hyperparameters {
    /// Document-topic prior. Default: 0.1
    pub alpha: f64,
    /// Word-topic prior for words without a lexicon label. Default: 0.01
    pub beta_common: f64,
    /// Word-topic prior for a lexicon word under its own sentiment. Default: 0.01
    pub beta_lexicon: f64,
    /// Word-topic prior for a lexicon word under any other sentiment. Default: 0.0
    pub beta_other_lexicon: f64,
    /// Sentiment (or switch) prior. Default: 1.0
    pub gamma: f64,
    /// Units with more tokens are left out of sampling (0: no limit). Default: 50
    pub max_unit_length: usize,
}

impl Default for Hyperparameters {
    fn default() -> Self {
        Hyperparameters {
            alpha: 0.1,
            beta_common: 0.01,
            beta_lexicon: 0.01,
            beta_other_lexicon: 0.0,
            gamma: 1.0,
            max_unit_length: 50,
        }
    }
}

impl Hyperparameters {
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.alpha > 0.0, "alpha must be positive: {}", self.alpha);
        anyhow::ensure!(self.gamma > 0.0, "gamma must be positive: {}", self.gamma);
        anyhow::ensure!(
            self.beta_common > 0.0,
            "beta (common words) must be positive: {}",
            self.beta_common
        );
        anyhow::ensure!(
            self.beta_lexicon >= 0.0 && self.beta_other_lexicon >= 0.0,
            "lexicon priors must be non-negative: {} / {}",
            self.beta_lexicon,
            self.beta_other_lexicon
        );
        anyhow::ensure!(
            self.alpha.is_finite()
                && self.gamma.is_finite()
                && self.beta_common.is_finite()
                && self.beta_lexicon.is_finite()
                && self.beta_other_lexicon.is_finite(),
            "priors must be finite"
        );
        Ok(())
    }
}

/// Per-sentiment word smoothing `beta[s, w]` and its row sums.
///
/// Models without a sentiment dimension use a single row.
#[derive(Debug, Clone, PartialEq)]
pub struct WordPrior {
    num_rows: usize,
    vocab_size: usize,
    betas: Vec<f64>,
    sums: Vec<f64>,
}

impl WordPrior {
    /// The same `beta` for every word
    pub fn uniform(beta: f64, vocab_size: usize) -> Self {
        WordPrior {
            num_rows: 1,
            vocab_size,
            betas: vec![beta; vocab_size],
            sums: vec![beta * vocab_size as f64],
        }
    }

    /// Smoothing over `num_sentiments` rows:
    ///
    /// * no label: `beta_common`
    /// * label equal to the row's sentiment: `beta_lexicon`
    /// * any other label: `beta_other_lexicon`
    pub fn from_lexicon(
        hyper: &Hyperparameters,
        lexicon: &SentimentLexicon,
        num_sentiments: usize,
        vocab_size: usize,
    ) -> anyhow::Result<Self> {
        anyhow::ensure!(num_sentiments > 0, "need at least one sentiment");
        anyhow::ensure!(vocab_size > 0, "empty vocabulary");

        // a unit restricted to its lexicon sentiment needs mass there
        anyhow::ensure!(
            lexicon.num_labelled() == 0 || hyper.beta_lexicon > 0.0,
            "beta for lexicon words under their own sentiment must be positive: {}",
            hyper.beta_lexicon
        );

        if let Some(max_s) = lexicon.max_sentiment() {
            anyhow::ensure!(
                max_s < num_sentiments,
                "lexicon uses sentiment {} but only {} sentiments are modelled",
                max_s,
                num_sentiments
            );
        }

        let mut betas = vec![0.0; num_sentiments * vocab_size];
        for s in 0..num_sentiments {
            let row = &mut betas[s * vocab_size..(s + 1) * vocab_size];
            for (w, b) in row.iter_mut().enumerate() {
                *b = match lexicon.label(w) {
                    None => hyper.beta_common,
                    Some(l) if l == s => hyper.beta_lexicon,
                    Some(_) => hyper.beta_other_lexicon,
                };
            }
        }

        let sums: Vec<f64> = betas
            .chunks(vocab_size)
            .map(|row| row.iter().sum())
            .collect();

        for (s, &b0) in sums.iter().enumerate() {
            anyhow::ensure!(
                b0 > 0.0,
                "word prior of sentiment {} sums to {}; raise beta",
                s,
                b0
            );
        }

        Ok(WordPrior {
            num_rows: num_sentiments,
            vocab_size,
            betas,
            sums,
        })
    }

    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    pub fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    #[inline]
    pub fn beta(&self, row: usize, word: usize) -> f64 {
        self.betas[row * self.vocab_size + word]
    }

    /// `sum_w beta[row, w]`
    #[inline]
    pub fn sum(&self, row: usize) -> f64 {
        self.sums[row]
    }

    pub fn row(&self, row: usize) -> &[f64] {
        &self.betas[row * self.vocab_size..(row + 1) * self.vocab_size]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_three_smoothing_constants() -> anyhow::Result<()> {
        let hyper = Hyperparameters {
            beta_common: 0.5,
            beta_lexicon: 0.3,
            beta_other_lexicon: 0.1,
            ..Default::default()
        };
        let lexicon = SentimentLexicon::from_pairs([(1, 0), (2, 1)]);
        let prior = WordPrior::from_lexicon(&hyper, &lexicon, 2, 4)?;

        assert_abs_diff_eq!(prior.beta(0, 0), 0.5);
        assert_abs_diff_eq!(prior.beta(0, 1), 0.3);
        assert_abs_diff_eq!(prior.beta(0, 2), 0.1);
        assert_abs_diff_eq!(prior.beta(1, 1), 0.1);
        assert_abs_diff_eq!(prior.beta(1, 2), 0.3);
        assert_abs_diff_eq!(prior.sum(0), 0.5 + 0.3 + 0.1 + 0.5);
        assert_abs_diff_eq!(prior.sum(1), prior.row(1).iter().sum::<f64>());
        Ok(())
    }

    #[test]
    fn test_lexicon_out_of_range() {
        let lexicon = SentimentLexicon::from_pairs([(0, 3)]);
        assert!(WordPrior::from_lexicon(&Hyperparameters::default(), &lexicon, 2, 5).is_err());
    }

    #[test]
    fn test_zero_own_lexicon_prior_rejected() -> anyhow::Result<()> {
        let hyper = Hyperparameters {
            beta_lexicon: 0.0,
            ..Default::default()
        };
        let lexicon = SentimentLexicon::from_pairs([(0, 0)]);
        assert!(WordPrior::from_lexicon(&hyper, &lexicon, 2, 3).is_err());

        // without lexicon words the constant is never used
        let prior = WordPrior::from_lexicon(&hyper, &SentimentLexicon::empty(), 2, 3)?;
        assert_abs_diff_eq!(prior.sum(1), 0.03, epsilon = 1e-12);
        Ok(())
    }

    #[test]
    fn test_validate() {
        assert!(Hyperparameters::default().validate().is_ok());
        let bad = Hyperparameters {
            beta_lexicon: -1.0,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
        let bad = Hyperparameters {
            alpha: 0.0,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }
}
