//! Minimal FASTA/FASTQ reading and writing.
//!
//! Sequence I/O codecs are an external collaborator, not part of the engine
//! (spec section 1); this module is the thin, format-detecting black box
//! the `bbduk` binary uses to get bytes in and out, in the same spirit as
//! the teacher's narrow `twobit`-backed `read_seq` helper for its own
//! reference format.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use anyhow::{bail, Context, Result};

use crate::engine::record::SeqRecord;

/// Read every record from a FASTA or FASTQ file, detected from its first
/// non-empty line (`>` or `@`).
pub fn read_records(path: &Path) -> Result<Vec<SeqRecord>> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut reader = BufReader::new(file);

    let mut first = String::new();
    reader
        .read_line(&mut first)
        .with_context(|| format!("reading {}", path.display()))?;
    match first.chars().next() {
        Some('>') => read_fasta(first, reader, path),
        Some('@') => read_fastq(first, reader, path),
        Some(other) => bail!("{}: unrecognized sequence format (starts with '{}')", path.display(), other),
        None => Ok(Vec::new()),
    }
}

fn read_fasta(first: String, mut reader: BufReader<File>, path: &Path) -> Result<Vec<SeqRecord>> {
    let mut records = Vec::new();
    let mut id = first.trim_start_matches('>').trim().to_string();
    let mut bases = Vec::new();
    let mut line = String::new();

    loop {
        line.clear();
        let n = reader.read_line(&mut line).with_context(|| format!("reading {}", path.display()))?;
        if n == 0 {
            if !id.is_empty() || !bases.is_empty() {
                records.push(SeqRecord::new(id.clone(), bases.clone()));
            }
            break;
        }
        let trimmed = line.trim_end();
        if let Some(rest) = trimmed.strip_prefix('>') {
            records.push(SeqRecord::new(id.clone(), bases.clone()));
            id = rest.trim().to_string();
            bases.clear();
        } else {
            bases.extend_from_slice(trimmed.as_bytes());
        }
    }
    Ok(records)
}

fn read_fastq(first: String, mut reader: BufReader<File>, path: &Path) -> Result<Vec<SeqRecord>> {
    let mut records = Vec::new();
    let mut header = first;
    loop {
        if header.is_empty() {
            break;
        }
        let id = header.trim_start_matches('@').trim().to_string();

        let mut seq_line = String::new();
        if reader.read_line(&mut seq_line)? == 0 {
            bail!("{}: truncated FASTQ record (missing sequence line)", path.display());
        }
        let mut plus_line = String::new();
        if reader.read_line(&mut plus_line)? == 0 {
            bail!("{}: truncated FASTQ record (missing '+' line)", path.display());
        }
        let mut qual_line = String::new();
        if reader.read_line(&mut qual_line)? == 0 {
            bail!("{}: truncated FASTQ record (missing quality line)", path.display());
        }

        let bases = seq_line.trim_end().as_bytes().to_vec();
        let quality = qual_line.trim_end().as_bytes().to_vec();
        if quality.len() != bases.len() {
            bail!("{}: quality string length does not match sequence length for read '{}'", path.display(), id);
        }
        records.push(SeqRecord::new(id, bases).with_quality(quality));

        header.clear();
        if reader.read_line(&mut header)? == 0 {
            break;
        }
    }
    Ok(records)
}

/// Writes classified reads back out in whichever format matches the input
/// (FASTA when a record carries no quality string, FASTQ otherwise).
pub struct SeqWriter {
    inner: BufWriter<File>,
}

impl SeqWriter {
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
        Ok(SeqWriter {
            inner: BufWriter::new(file),
        })
    }

    pub fn write_record(&mut self, record: &SeqRecord) -> Result<()> {
        match &record.quality {
            Some(quality) => {
                writeln!(self.inner, "@{}", record.id)?;
                self.inner.write_all(&record.bases)?;
                writeln!(self.inner)?;
                writeln!(self.inner, "+")?;
                self.inner.write_all(quality)?;
                writeln!(self.inner)?;
            }
            None => {
                writeln!(self.inner, ">{}", record.id)?;
                self.inner.write_all(&record.bases)?;
                writeln!(self.inner)?;
            }
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.inner.flush().context("flushing output")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;
    use tempfile::NamedTempFile;

    fn write_temp(contents: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f
    }

    #[test]
    fn reads_fasta_records() {
        let f = write_temp(">a\nACGT\nACGT\n>b\nTTTT\n");
        let records = read_records(f.path()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, "a");
        assert_eq!(records[0].bases, b"ACGTACGT");
        assert_eq!(records[1].bases, b"TTTT");
        assert!(records[0].quality.is_none());
    }

    #[test]
    fn reads_fastq_records() {
        let f = write_temp("@r1\nACGT\n+\nIIII\n@r2\nGGGG\n+\nFFFF\n");
        let records = read_records(f.path()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, "r1");
        assert_eq!(records[0].quality.as_deref(), Some(&b"IIII"[..]));
        assert_eq!(records[1].bases, b"GGGG");
    }

    #[test]
    fn mismatched_quality_length_is_an_error() {
        let f = write_temp("@r1\nACGT\n+\nII\n");
        assert!(read_records(f.path()).is_err());
    }
}
