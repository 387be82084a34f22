//! Parameter estimates: smoothed, row-normalized views of the count
//! tables. Nothing here mutates a count table.

use crate::hyper::WordPrior;
use mcmc_util::CountTable;
use ndarray::Array2;
use rayon::prelude::*;
use special::Gamma as SpecialGamma;

/// One named probability table with a label per row
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub name: &'static str,
    pub row_names: Vec<Box<str>>,
    pub column_names: Vec<Box<str>>,
    pub values: Array2<f64>,
}

/// All tables a model reports (phi, theta, pi, ...)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Estimates {
    pub tables: Vec<Table>,
}

impl Estimates {
    pub fn push(
        &mut self,
        name: &'static str,
        row_names: Vec<Box<str>>,
        column_names: Vec<Box<str>>,
        values: Array2<f64>,
    ) {
        self.tables.push(Table {
            name,
            row_names,
            column_names,
            values,
        });
    }

    pub fn get(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name == name)
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.tables.iter().map(|t| t.name).collect()
    }

    /// Replace each table's values by `f(name)`, when it returns one.
    ///
    /// Used to swap in posterior means while keeping row labels.
    pub fn replace_values<F>(&mut self, mut f: F)
    where
        F: FnMut(&str) -> Option<Array2<f64>>,
    {
        for t in self.tables.iter_mut() {
            if let Some(values) = f(t.name) {
                if values.dim() == t.values.dim() {
                    t.values = values;
                }
            }
        }
    }
}

/// `(count[r, c] + prior(r, c)) / (rowsum[r] + prior_sum(r))`, rows in parallel
pub fn smoothed_rows<P, S>(counts: &CountTable, prior: P, prior_sum: S) -> anyhow::Result<Array2<f64>>
where
    P: Fn(usize, usize) -> f64 + Sync,
    S: Fn(usize) -> f64 + Sync,
{
    let (nrows, ncols) = (counts.nrows(), counts.ncols());
    let mut values = vec![0.0; nrows * ncols];

    if ncols > 0 {
        values
            .par_chunks_mut(ncols)
            .enumerate()
            .for_each(|(r, out)| {
                let denom = counts.row_sum(r) as f64 + prior_sum(r);
                for (c, (x, &n)) in out.iter_mut().zip(counts.row(r)).enumerate() {
                    *x = (n as f64 + prior(r, c)) / denom;
                }
            });
    }

    Ok(Array2::from_shape_vec((nrows, ncols), values)?)
}

/// Same pseudo-count `a` in every cell
pub fn symmetric(counts: &CountTable, a: f64) -> anyhow::Result<Array2<f64>> {
    let k = counts.ncols() as f64;
    smoothed_rows(counts, |_, _| a, |_| k * a)
}

/// Word distribution per row, smoothed by `prior` row `prior_row(r)`
pub fn word_rows<F>(word_topic: &CountTable, prior: &WordPrior, prior_row: F) -> anyhow::Result<Array2<f64>>
where
    F: Fn(usize) -> usize + Sync,
{
    anyhow::ensure!(
        word_topic.ncols() == prior.vocab_size(),
        "word table has {} columns, prior {}",
        word_topic.ncols(),
        prior.vocab_size()
    );
    smoothed_rows(
        word_topic,
        |r, w| prior.beta(prior_row(r), w),
        |r| prior.sum(prior_row(r)),
    )
}

/// Collapsed `ln p(words | assignments)` of a word table.
///
/// Each row is a Dirichlet-multinomial:
/// `lnG(b0) - lnG(N + b0) + sum_w [lnG(n_w + b_w) - lnG(b_w)]`.
/// Cells whose prior is zero carry no mass and are skipped. Rows are
/// scored in parallel and added in row order.
pub fn word_log_likelihood<F>(word_topic: &CountTable, prior: &WordPrior, prior_row: F) -> f64
where
    F: Fn(usize) -> usize + Sync,
{
    let per_row: Vec<f64> = (0..word_topic.nrows())
        .into_par_iter()
        .map(|r| {
            let p = prior_row(r);
            let b0 = prior.sum(p);
            let mut llik = SpecialGamma::ln_gamma(b0).0
                - SpecialGamma::ln_gamma(word_topic.row_sum(r) as f64 + b0).0;
            for (w, &n) in word_topic.row(r).iter().enumerate() {
                let b = prior.beta(p, w);
                if n > 0 && b > 0.0 {
                    llik += SpecialGamma::ln_gamma(n as f64 + b).0 - SpecialGamma::ln_gamma(b).0;
                }
            }
            llik
        })
        .collect();
    per_row.iter().sum()
}

/// `prefix0, prefix1, ...`
pub fn indexed_names(prefix: &str, n: usize) -> Vec<Box<str>> {
    (0..n).map(|i| format!("{}{}", prefix, i).into_boxed_str()).collect()
}
