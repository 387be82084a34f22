//! Snapshots of a run and where they go.
//!
//! The sampling loop builds a [`Snapshot`] (an owned copy of the
//! estimates and assignments) and hands it to a [`SnapshotSink`]. A
//! [`BackgroundSink`] moves the actual writing to another thread, so a
//! slow disk does not hold up the sweeps; a failed write is reported at
//! the next hand-off or at `finish`.

use crate::common_io::{mkdir, open_buf_writer};
use crate::conditional::LatentState;
use crate::corpus::ExclusionSummary;
use crate::estimate::Estimates;
use crate::sampler::Phase;
use crate::table_io::IoOps;

use log::{debug, info, warn};
use serde::Serialize;
use std::collections::HashMap;
use std::io::Write;
use std::sync::mpsc::{sync_channel, SyncSender};
use std::thread::JoinHandle;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnapshotSummary {
    pub model: &'static str,
    /// `iter-NNNNNN` or `final`
    pub label: String,
    pub iteration: usize,
    pub phase: Phase,
    pub num_samples: usize,
    /// whether the estimates are averaged over collected samples
    pub posterior_mean: bool,
    pub log_likelihood: f64,
    pub exclusions: ExclusionSummary,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssignmentRow {
    pub doc: Box<str>,
    pub unit: usize,
    pub state: Option<LatentState>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub summary: SnapshotSummary,
    pub estimates: Estimates,
    pub assignments: Vec<AssignmentRow>,
}

pub trait SnapshotSink {
    fn submit(&mut self, snapshot: Snapshot) -> anyhow::Result<()>;

    /// Flush everything submitted so far
    fn finish(&mut self) -> anyhow::Result<()>;
}

/// Keeps every snapshot in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    pub snapshots: Vec<Snapshot>,
    pub finished: bool,
}

impl SnapshotSink for MemorySink {
    fn submit(&mut self, snapshot: Snapshot) -> anyhow::Result<()> {
        self.snapshots.push(snapshot);
        Ok(())
    }

    fn finish(&mut self) -> anyhow::Result<()> {
        self.finished = true;
        Ok(())
    }
}

/// Writes each snapshot to `{root}/{label}/`:
///
/// * `{table}.tsv.gz` for every estimate table
/// * `assignments.tsv.gz`
/// * `summary.json`
pub struct DirectorySink {
    root: String,
    column_names: HashMap<&'static str, Vec<Box<str>>>,
}

impl DirectorySink {
    pub fn new(root: &str) -> anyhow::Result<Self> {
        mkdir(root)?;
        Ok(DirectorySink {
            root: root.to_string(),
            column_names: HashMap::new(),
        })
    }

    /// Use these column labels for `table` (e.g. vocabulary words for `phi`)
    pub fn with_column_names(mut self, table: &'static str, names: Vec<Box<str>>) -> Self {
        self.column_names.insert(table, names);
        self
    }

    pub fn snapshot_dir(&self, label: &str) -> String {
        format!("{}/{}", self.root, label)
    }

    pub fn write(&self, snapshot: &Snapshot) -> anyhow::Result<()> {
        let dir = self.snapshot_dir(&snapshot.summary.label);
        mkdir(&dir)?;

        for table in snapshot.estimates.tables.iter() {
            let columns = match self.column_names.get(table.name) {
                Some(names) if names.len() == table.values.ncols() => names,
                _ => &table.column_names,
            };
            table.values.write_file_delim(
                &format!("{}/{}.tsv.gz", dir, table.name),
                "\t",
                Some(&table.row_names),
                Some(columns),
            )?;
        }

        write_assignments(&snapshot.assignments, &format!("{}/assignments.tsv.gz", dir))?;

        let mut json = open_buf_writer(&format!("{}/summary.json", dir))?;
        serde_json::to_writer_pretty(&mut json, &snapshot.summary)?;
        writeln!(json)?;
        json.flush()?;

        debug!("wrote snapshot {}", dir);
        Ok(())
    }
}

fn write_assignments(rows: &[AssignmentRow], file: &str) -> anyhow::Result<()> {
    let dash = |x: Option<usize>| x.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string());

    let mut buf = open_buf_writer(file)?;
    writeln!(buf, "#doc\tunit\ttopic\tsentiment\tentity")?;
    for row in rows {
        let (topic, sentiment, entity) = match row.state {
            Some(s) => (Some(s.topic), s.sentiment, s.entity),
            None => (None, None, None),
        };
        writeln!(
            buf,
            "{}\t{}\t{}\t{}\t{}",
            row.doc,
            row.unit,
            dash(topic),
            dash(sentiment),
            dash(entity)
        )?;
    }
    buf.flush()?;
    Ok(())
}

impl SnapshotSink for DirectorySink {
    fn submit(&mut self, snapshot: Snapshot) -> anyhow::Result<()> {
        self.write(&snapshot)
    }

    fn finish(&mut self) -> anyhow::Result<()> {
        info!("snapshots are in {}", self.root);
        Ok(())
    }
}

/// Runs another sink on a writer thread, fed through a bounded queue.
///
/// When the queue is full, `submit` waits for the writer. The first
/// write error stops the writer and is returned by the next `submit`
/// or by `finish`.
pub struct BackgroundSink {
    sender: Option<SyncSender<Snapshot>>,
    worker: Option<JoinHandle<anyhow::Result<()>>>,
}

impl BackgroundSink {
    pub fn spawn<S>(mut inner: S, capacity: usize) -> Self
    where
        S: SnapshotSink + Send + 'static,
    {
        let (sender, receiver) = sync_channel::<Snapshot>(capacity.max(1));
        let worker = std::thread::spawn(move || -> anyhow::Result<()> {
            for snapshot in receiver {
                inner.submit(snapshot)?;
            }
            inner.finish()
        });
        BackgroundSink {
            sender: Some(sender),
            worker: Some(worker),
        }
    }

    /// Close the queue and wait for the writer
    fn join(&mut self) -> anyhow::Result<()> {
        self.sender.take();
        match self.worker.take() {
            Some(worker) => worker
                .join()
                .map_err(|_| anyhow::anyhow!("snapshot writer panicked"))?,
            None => Ok(()),
        }
    }
}

impl SnapshotSink for BackgroundSink {
    fn submit(&mut self, snapshot: Snapshot) -> anyhow::Result<()> {
        if self.worker.as_ref().is_some_and(|w| w.is_finished()) {
            self.join()?;
            anyhow::bail!("snapshot writer stopped");
        }

        let Some(sender) = self.sender.as_ref() else {
            anyhow::bail!("snapshot writer already finished");
        };

        if sender.send(snapshot).is_err() {
            self.join()?;
            anyhow::bail!("snapshot writer stopped");
        }
        Ok(())
    }

    fn finish(&mut self) -> anyhow::Result<()> {
        self.join()
    }
}

impl Drop for BackgroundSink {
    fn drop(&mut self) {
        if let Err(e) = self.join() {
            warn!("snapshot writer: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimate::indexed_names;
    use ndarray::Array2;

    fn snapshot(label: &str) -> Snapshot {
        let mut estimates = Estimates::default();
        estimates.push(
            "phi",
            indexed_names("t", 2),
            indexed_names("w", 3),
            Array2::from_elem((2, 3), 1.0 / 3.0),
        );
        Snapshot {
            summary: SnapshotSummary {
                model: "lda",
                label: label.to_string(),
                iteration: 5,
                phase: Phase::Collecting,
                num_samples: 1,
                posterior_mean: false,
                log_likelihood: -12.5,
                exclusions: ExclusionSummary::default(),
            },
            estimates,
            assignments: vec![
                AssignmentRow {
                    doc: "d0".into(),
                    unit: 0,
                    state: Some(LatentState::topic(1)),
                },
                AssignmentRow {
                    doc: "d0".into(),
                    unit: 1,
                    state: None,
                },
            ],
        }
    }

    #[test]
    fn test_directory_layout() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let root = dir.path().to_str().unwrap().to_string();
        let vocab: Vec<Box<str>> = vec!["good".into(), "bad".into(), "phone".into()];
        let mut sink = DirectorySink::new(&root)?.with_column_names("phi", vocab);

        sink.submit(snapshot("iter-000005"))?;
        sink.finish()?;

        let out = format!("{}/iter-000005", root);
        let (phi, rows) = Array2::<f64>::read_file_delim(&format!("{}/phi.tsv.gz", out), "\t", true, 1)?;
        assert_eq!(phi.dim(), (2, 3));
        assert_eq!(rows[1].as_ref(), "t1");

        let header = &crate::common_io::read_lines(&format!("{}/phi.tsv.gz", out))?[0];
        assert_eq!(header.as_ref(), "#\tgood\tbad\tphone");

        let assignments = crate::common_io::read_lines(&format!("{}/assignments.tsv.gz", out))?;
        assert_eq!(assignments[1].as_ref(), "d0\t0\t1\t-\t-");
        assert_eq!(assignments[2].as_ref(), "d0\t1\t-\t-\t-");

        let summary: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(format!("{}/summary.json", out))?)?;
        assert_eq!(summary["phase"], "Collecting");
        assert_eq!(summary["iteration"], 5);
        Ok(())
    }

    #[test]
    fn test_background_writes_everything() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let root = dir.path().to_str().unwrap().to_string();
        let mut sink = BackgroundSink::spawn(DirectorySink::new(&root)?, 1);

        for label in ["iter-000001", "iter-000002", "final"] {
            sink.submit(snapshot(label))?;
        }
        sink.finish()?;

        for label in ["iter-000001", "iter-000002", "final"] {
            assert!(std::path::Path::new(&format!("{}/{}/summary.json", root, label)).exists());
        }
        Ok(())
    }

    struct FailingSink;

    impl SnapshotSink for FailingSink {
        fn submit(&mut self, _snapshot: Snapshot) -> anyhow::Result<()> {
            anyhow::bail!("disk full")
        }

        fn finish(&mut self) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_background_error_surfaces() {
        let mut sink = BackgroundSink::spawn(FailingSink, 1);
        let mut failed = false;
        for i in 0..10 {
            if sink.submit(snapshot(&format!("iter-{:06}", i))).is_err() {
                failed = true;
                break;
            }
        }
        let finished = sink.finish();
        assert!(failed || finished.is_err());
    }
}
