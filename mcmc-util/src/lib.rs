//! Building blocks for collapsed Gibbs samplers over discrete latent
//! states: integer sufficient-statistic tables, categorical draws and
//! accumulation of collected estimate samples.

/// Flat integer count tables with cached row sums
pub mod count_table;

/// Inverse-CDF categorical draws from unnormalized weights
pub mod categorical;

/// Posterior mean/variance over collected estimate samples
pub mod chain;

pub use categorical::{sample_categorical, sample_categorical_log};
pub use chain::McmcChain;
pub use count_table::CountTable;
