use crate::common_io::{open_buf_writer, read_lines};
use ndarray::Array2;
use std::io::Write;

/// Read and write dense numeric tables from and to delimited files
pub trait IoOps {
    type Mat;

    /// Read a delimited table whose rows may start with a name column.
    ///
    /// * `has_row_names` - treat the first field of every line as a label
    /// * `skip` - number of header lines to skip
    fn read_file_delim(
        file: &str,
        delim: &str,
        has_row_names: bool,
        skip: usize,
    ) -> anyhow::Result<(Self::Mat, Vec<Box<str>>)>;

    fn write_file_delim(
        &self,
        file: &str,
        delim: &str,
        row_names: Option<&[Box<str>]>,
        column_names: Option<&[Box<str>]>,
    ) -> anyhow::Result<()>;

    fn to_tsv(&self, tsv_file: &str, row_names: Option<&[Box<str>]>) -> anyhow::Result<()> {
        self.write_file_delim(tsv_file, "\t", row_names, None)
    }
}

impl IoOps for Array2<f64> {
    type Mat = Self;

    fn read_file_delim(
        file: &str,
        delim: &str,
        has_row_names: bool,
        skip: usize,
    ) -> anyhow::Result<(Self::Mat, Vec<Box<str>>)> {
        let lines = read_lines(file)?;
        let mut row_names = vec![];
        let mut data = vec![];
        let mut ncols: Option<usize> = None;

        for line in lines.iter().skip(skip).filter(|l| !l.is_empty()) {
            let mut words = line.split(delim);
            if has_row_names {
                let name = words
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("missing row name in {}", file))?;
                row_names.push(name.into());
            }
            let before = data.len();
            for w in words {
                data.push(
                    w.parse::<f64>()
                        .map_err(|e| anyhow::anyhow!("{}: bad value `{}`: {}", file, w, e))?,
                );
            }
            let width = data.len() - before;
            match ncols {
                None => ncols = Some(width),
                Some(n) => anyhow::ensure!(n == width, "{}: ragged row ({} vs {})", file, width, n),
            }
        }

        let ncols = ncols.unwrap_or(0);
        let nrows = if ncols == 0 { 0 } else { data.len() / ncols };
        Ok((Array2::from_shape_vec((nrows, ncols), data)?, row_names))
    }

    fn write_file_delim(
        &self,
        file: &str,
        delim: &str,
        row_names: Option<&[Box<str>]>,
        column_names: Option<&[Box<str>]>,
    ) -> anyhow::Result<()> {
        if let Some(names) = row_names {
            anyhow::ensure!(
                names.len() == self.nrows(),
                "{} row names for {} rows",
                names.len(),
                self.nrows()
            );
        }

        let mut buf = open_buf_writer(file)?;

        if let Some(columns) = column_names {
            let mut header: Vec<&str> = vec![];
            if row_names.is_some() {
                header.push("#");
            }
            header.extend(columns.iter().map(|c| c.as_ref()));
            writeln!(buf, "{}", header.join(delim))?;
        }

        for (i, row) in self.rows().into_iter().enumerate() {
            let values = row
                .iter()
                .map(|x| format!("{}", x))
                .collect::<Vec<_>>()
                .join(delim);
            match row_names {
                Some(names) => writeln!(buf, "{}{}{}", names[i], delim, values)?,
                None => writeln!(buf, "{}", values)?,
            }
        }
        buf.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_tsv_with_row_names() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let file = dir.path().join("phi.tsv.gz");
        let file = file.to_str().ok_or(anyhow::anyhow!("path"))?;

        let xx = array![[0.25, 0.75], [0.5, 0.5], [1.0, 0.0]];
        let names: Vec<Box<str>> = vec!["t0".into(), "t1".into(), "t2".into()];
        xx.to_tsv(file, Some(&names))?;

        let (yy, read_names) = Array2::<f64>::read_file_delim(file, "\t", true, 0)?;
        approx::assert_abs_diff_eq!(xx, yy);
        assert_eq!(names, read_names);
        Ok(())
    }

    #[test]
    fn test_row_name_count_checked() {
        let xx = array![[1.0], [2.0]];
        let names: Vec<Box<str>> = vec!["only".into()];
        assert!(xx.to_tsv("unused.tsv", Some(&names)).is_err());
    }
}
