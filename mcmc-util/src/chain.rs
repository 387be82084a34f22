use ndarray::Array2;

/// Collected estimate samples, kept as running sums per named table.
///
/// Each kept sample contributes one matrix per table name; the chain
/// only retains first and second moments, so memory stays at two
/// matrices per table regardless of the number of samples.
#[derive(Debug, Clone, Default)]
pub struct McmcChain {
    names: Vec<Box<str>>,
    sums: Vec<Array2<f64>>,
    sq_sums: Vec<Array2<f64>>,
    n_samples: usize,
}

impl McmcChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn n_samples(&self) -> usize {
        self.n_samples
    }

    /// Record one sample made of several named tables.
    ///
    /// The first sample fixes the table names and shapes; later samples
    /// must provide the same tables.
    pub fn push_sample<'a, I>(&mut self, tables: I) -> anyhow::Result<()>
    where
        I: IntoIterator<Item = (&'a str, &'a Array2<f64>)>,
    {
        let tables: Vec<_> = tables.into_iter().collect();

        if self.n_samples == 0 {
            self.names = tables.iter().map(|(n, _)| (*n).into()).collect();
            self.sums = tables.iter().map(|(_, x)| (*x).clone()).collect();
            self.sq_sums = tables.iter().map(|(_, x)| x.mapv(|v| v * v)).collect();
            self.n_samples = 1;
            return Ok(());
        }

        anyhow::ensure!(
            tables.len() == self.names.len(),
            "expected {} tables per sample, got {}",
            self.names.len(),
            tables.len()
        );

        let mut slots = Vec::with_capacity(tables.len());
        for (name, x) in tables {
            let i = self
                .position(name)
                .ok_or_else(|| anyhow::anyhow!("unknown table `{}` in sample", name))?;
            anyhow::ensure!(
                self.sums[i].dim() == x.dim(),
                "table `{}` changed shape: {:?} vs {:?}",
                name,
                self.sums[i].dim(),
                x.dim()
            );
            slots.push((i, x));
        }

        for (i, x) in slots {
            self.sums[i] += x;
            self.sq_sums[i].zip_mut_with(x, |s, &v| *s += v * v);
        }
        self.n_samples += 1;
        Ok(())
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n.as_ref() == name)
    }

    /// Element-wise posterior mean across samples.
    pub fn posterior_mean(&self, name: &str) -> Option<Array2<f64>> {
        if self.n_samples == 0 {
            return None;
        }
        let i = self.position(name)?;
        let inv_n = 1.0 / self.n_samples as f64;
        Some(self.sums[i].mapv(|s| s * inv_n))
    }

    /// Element-wise posterior variance across samples (n - 1 denominator).
    pub fn posterior_variance(&self, name: &str) -> Option<Array2<f64>> {
        let n = self.n_samples;
        if n < 2 {
            return None;
        }
        let i = self.position(name)?;
        let nf = n as f64;
        let mut var = self.sq_sums[i].clone();
        var.zip_mut_with(&self.sums[i], |sq, &s| {
            *sq = ((*sq - s * s / nf) / (nf - 1.0)).max(0.0);
        });
        Some(var)
    }
}
