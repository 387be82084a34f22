//! Plain or gzip-compressed file access, chosen by the `.gz` extension.

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

fn is_gz(file: &str) -> bool {
    Path::new(file).extension().and_then(|x| x.to_str()) == Some("gz")
}

/// Buffered reader over `input_file`, decompressing `.gz`
pub fn open_buf_reader(input_file: &str) -> anyhow::Result<Box<dyn BufRead>> {
    let file = File::open(input_file)
        .map_err(|e| anyhow::anyhow!("failed to open {}: {}", input_file, e))?;

    if is_gz(input_file) {
        Ok(Box::new(BufReader::new(GzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Buffered writer to `output_file`, compressing `.gz`.
///
/// The writer is `Send` so snapshot files can be written off the
/// sampling thread. Call `flush` before dropping to see write errors.
pub fn open_buf_writer(output_file: &str) -> anyhow::Result<Box<dyn Write + Send>> {
    let file = File::create(output_file)
        .map_err(|e| anyhow::anyhow!("failed to create {}: {}", output_file, e))?;

    if is_gz(output_file) {
        Ok(Box::new(BufWriter::new(GzEncoder::new(
            file,
            Compression::default(),
        ))))
    } else {
        Ok(Box::new(BufWriter::new(file)))
    }
}

pub fn read_lines(input_file: &str) -> anyhow::Result<Vec<Box<str>>> {
    let mut lines = vec![];
    for x in open_buf_reader(input_file)?.lines() {
        lines.push(x?.into_boxed_str());
    }
    Ok(lines)
}

pub fn mkdir(dir: &str) -> anyhow::Result<()> {
    std::fs::create_dir_all(dir)
        .map_err(|e| anyhow::anyhow!("failed to create directory {}: {}", dir, e))
}
