//! Integer count table for collapsed Gibbs samplers.
//!
//! Cells are stored row-major in one flat buffer: `cells[row * ncols + col]`.
//! Every row keeps a cached sum so that the smoothed denominators
//! `rowsum + cardinality * prior` are O(1) lookups.
//!
//! All mutation goes through [`CountTable::add`] / [`CountTable::subtract`],
//! each of which touches exactly one cell and its row sum.

/// Row-major integer count table with cached row sums.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountTable {
    nrows: usize,
    ncols: usize,
    cells: Vec<usize>,
    row_sums: Vec<usize>,
}

impl CountTable {
    /// Allocate an all-zero `nrows × ncols` table.
    pub fn zeros(nrows: usize, ncols: usize) -> Self {
        CountTable {
            nrows,
            ncols,
            cells: vec![0; nrows * ncols],
            row_sums: vec![0; nrows],
        }
    }

    /// Number of rows
    pub fn nrows(&self) -> usize {
        self.nrows
    }

    /// Number of columns
    pub fn ncols(&self) -> usize {
        self.ncols
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> usize {
        self.cells[row * self.ncols + col]
    }

    #[inline]
    pub fn row_sum(&self, row: usize) -> usize {
        self.row_sums[row]
    }

    /// Cells of one row
    #[inline]
    pub fn row(&self, row: usize) -> &[usize] {
        &self.cells[row * self.ncols..(row + 1) * self.ncols]
    }

    /// Grand total over all cells, computed from the cached row sums.
    pub fn total(&self) -> usize {
        self.row_sums.iter().sum()
    }

    /// `cell[row, col] += n`, keeping the row sum in step.
    #[inline]
    pub fn add(&mut self, row: usize, col: usize, n: usize) {
        debug_assert!(row < self.nrows && col < self.ncols);
        self.cells[row * self.ncols + col] += n;
        self.row_sums[row] += n;
    }

    /// `cell[row, col] -= n`, keeping the row sum in step.
    ///
    /// Taking a cell below zero means an assignment was removed twice
    /// or never added; every downstream estimate would be corrupt, so
    /// this panics instead of clamping.
    #[inline]
    pub fn subtract(&mut self, row: usize, col: usize, n: usize) {
        debug_assert!(row < self.nrows && col < self.ncols);
        let idx = row * self.ncols + col;
        let cell = self.cells[idx];
        assert!(
            cell >= n && self.row_sums[row] >= n,
            "negative count at ({}, {}): cell {} - {}",
            row,
            col,
            cell,
            n
        );
        self.cells[idx] = cell - n;
        self.row_sums[row] -= n;
    }

    #[inline]
    pub fn increment(&mut self, row: usize, col: usize) {
        self.add(row, col, 1);
    }

    #[inline]
    pub fn decrement(&mut self, row: usize, col: usize) {
        self.subtract(row, col, 1);
    }

    /// Reset every cell and row sum to zero.
    pub fn clear(&mut self) {
        self.cells.iter_mut().for_each(|x| *x = 0);
        self.row_sums.iter_mut().for_each(|x| *x = 0);
    }

    /// Check that each cached row sum equals the sum of its cells.
    ///
    /// Returns the first offending row.
    pub fn check_row_sums(&self) -> anyhow::Result<()> {
        for r in 0..self.nrows {
            let recomputed: usize = self.row(r).iter().sum();
            if recomputed != self.row_sums[r] {
                return Err(anyhow::anyhow!(
                    "row {}: stored row sum {} != recomputed {}",
                    r,
                    self.row_sums[r],
                    recomputed
                ));
            }
        }
        Ok(())
    }

    /// First cell `(row, col)` at which two equally shaped tables differ.
    pub fn first_difference(&self, other: &CountTable) -> Option<(usize, usize)> {
        if self.nrows != other.nrows || self.ncols != other.ncols {
            return Some((self.nrows.min(other.nrows), self.ncols.min(other.ncols)));
        }
        self.cells
            .iter()
            .zip(other.cells.iter())
            .position(|(a, b)| a != b)
            .map(|idx| (idx / self.ncols, idx % self.ncols))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_subtract_row_sums() {
        let mut table = CountTable::zeros(3, 4);
        table.add(0, 1, 2);
        table.add(0, 3, 1);
        table.increment(2, 0);

        assert_eq!(table.get(0, 1), 2);
        assert_eq!(table.row_sum(0), 3);
        assert_eq!(table.row_sum(1), 0);
        assert_eq!(table.row_sum(2), 1);
        assert_eq!(table.total(), 4);

        table.subtract(0, 1, 2);
        assert_eq!(table.get(0, 1), 0);
        assert_eq!(table.row_sum(0), 1);
        assert!(table.check_row_sums().is_ok());
    }

    #[test]
    fn test_round_trip_restores_table() {
        let mut table = CountTable::zeros(2, 2);
        table.add(1, 0, 5);
        table.add(0, 1, 3);
        let before = table.clone();

        table.subtract(1, 0, 2);
        table.add(1, 0, 2);

        assert_eq!(table, before);
        assert_eq!(table.first_difference(&before), None);
    }

    #[test]
    #[should_panic(expected = "negative count")]
    fn test_negative_count_panics() {
        let mut table = CountTable::zeros(2, 2);
        table.increment(0, 0);
        table.subtract(0, 0, 2);
    }

    #[test]
    fn test_first_difference() {
        let mut a = CountTable::zeros(2, 3);
        let b = a.clone();
        a.increment(1, 2);
        assert_eq!(a.first_difference(&b), Some((1, 2)));
    }

    #[test]
    fn test_clear() {
        let mut table = CountTable::zeros(2, 2);
        table.add(0, 0, 7);
        table.clear();
        assert_eq!(table.total(), 0);
        assert_eq!(table, CountTable::zeros(2, 2));
    }
}
