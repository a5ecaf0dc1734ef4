//! `bbduk` binary: wires CLI options to the engine and runs one pass over
//! the input reads.

use std::process::exit;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use log::info;

use bbduk::cli::io::{read_records, SeqWriter};
use bbduk::cli::opts::Cli;
use bbduk::engine::alphabet::AlphabetConfig;
use bbduk::engine::builder::IndexBuilder;
use bbduk::engine::harness::{run_query_harness, Channel, OutputSink};
use bbduk::engine::index::KmerIndex;
use bbduk::engine::record::{KeepMask, ReadBatch, ReadPair, SeqRecord};
use bbduk::engine::table::ShardedTable;
use bbduk::logging;

/// Pairs are grouped into batches of this size before entering the harness
/// (spec section 5, "batching amortizes per-batch channel overhead").
const BATCH_SIZE: usize = 10_000;

fn build_index(cli: &Cli) -> Result<Option<Arc<KmerIndex>>> {
    if cli.kmer_phase_config()?.is_none() {
        return Ok(None);
    }
    if cli.reference.is_empty() && cli.reference_alt.is_none() {
        bail!("a k-mer mode was requested but no --ref/--refalt was given");
    }

    let index_cfg = cli.index_config()?;
    let alphabet = AlphabetConfig::new(index_cfg.alphabet);
    let table = ShardedTable::new(index_cfg.ways, 1 << 16);
    let mut index = KmerIndex::new(index_cfg, alphabet, table);

    let pb = ProgressBar::new(cli.reference.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("       {bar:40} {pos}/{len} [{elapsed_precise}] {msg}")
            .unwrap(),
    );
    let mut primary = Vec::new();
    for path in &cli.reference {
        pb.set_message(path.display().to_string());
        primary.extend(read_records(path).with_context(|| format!("reading reference {}", path.display()))?);
        pb.inc(1);
    }
    pb.finish_with_message("reference loaded");
    let alt = match &cli.reference_alt {
        Some(path) => Some(read_records(path).with_context(|| format!("reading refalt {}", path.display()))?),
        None => None,
    };

    let build_stats = {
        let mut builder = IndexBuilder::new(&mut index);
        builder.build(&primary, alt.as_deref())?
    };
    info!(
        "built k-mer index: {} keys installed across {} scaffolds",
        build_stats.keys_installed, build_stats.scaffolds
    );
    Ok(Some(Arc::new(index)))
}

fn load_pairs(cli: &Cli) -> Result<Vec<ReadPair>> {
    let r1 = read_records(&cli.input).with_context(|| format!("reading {}", cli.input.display()))?;
    match &cli.input2 {
        Some(path2) => {
            let r2 = read_records(path2).with_context(|| format!("reading {}", path2.display()))?;
            if r1.len() != r2.len() {
                bail!(
                    "paired input files have different record counts ({} vs {})",
                    r1.len(),
                    r2.len()
                );
            }
            Ok(r1.into_iter().zip(r2).map(|(a, b)| ReadPair::paired(a, b)).collect())
        }
        None => Ok(r1.into_iter().map(ReadPair::single).collect()),
    }
}

fn make_batches(pairs: Vec<ReadPair>) -> Vec<ReadBatch> {
    pairs
        .chunks(BATCH_SIZE)
        .enumerate()
        .map(|(i, chunk)| ReadBatch {
            batch_id: i as u64,
            reads: chunk.to_vec(),
        })
        .collect()
}

/// Routes each classified pair to the output file(s) it belongs in. The
/// harness's `Channel` is only a coarse hint (see its `route` doc comment);
/// disposition of mixed and fully-discarded pairs is decided here from the
/// mask directly, since only the sink knows which optional output files
/// the caller actually configured.
struct FileSink {
    unmatched1: SeqWriter,
    unmatched2: Option<SeqWriter>,
    matched: Option<SeqWriter>,
    singleton: Option<SeqWriter>,
}

impl OutputSink for FileSink {
    fn write(&mut self, _channel: Channel, pair: &ReadPair, mask: KeepMask) {
        let write_unmatched = |sink: &mut Self, record: &SeqRecord, second: bool| {
            let writer = if second { sink.unmatched2.as_mut() } else { Some(&mut sink.unmatched1) };
            if let Some(w) = writer {
                let _ = w.write_record(record);
            }
        };

        match (mask.keep_r1, mask.keep_r2) {
            (true, true) => {
                write_unmatched(self, &pair.r1, false);
                if let Some(r2) = &pair.r2 {
                    write_unmatched(self, r2, true);
                }
            }
            (true, false) if pair.r2.is_none() => {
                write_unmatched(self, &pair.r1, false);
            }
            (false, false) if mask.placeholder => {
                write_unmatched(self, &pair.r1, false);
                if let Some(r2) = &pair.r2 {
                    write_unmatched(self, r2, true);
                }
            }
            (false, false) => {
                if let Some(w) = self.matched.as_mut() {
                    let _ = w.write_record(&pair.r1);
                    if let Some(r2) = &pair.r2 {
                        let _ = w.write_record(r2);
                    }
                }
            }
            _ => {
                let kept = if mask.keep_r1 { &pair.r1 } else { pair.r2.as_ref().unwrap() };
                match self.singleton.as_mut() {
                    Some(w) => {
                        let _ = w.write_record(kept);
                    }
                    None => write_unmatched(self, kept, !mask.keep_r1),
                }
            }
        }
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let index = build_index(&cli)?;
    let pipeline_cfg = Arc::new(cli.pipeline_config()?);

    let pairs = load_pairs(&cli)?;
    info!("loaded {} read pair(s)/read(s) from input", pairs.len());
    let batches = make_batches(pairs);

    let sink = FileSink {
        unmatched1: SeqWriter::create(&cli.out_unmatched)?,
        unmatched2: cli.out_unmatched2.as_deref().map(SeqWriter::create).transpose()?,
        matched: cli.out_matched.as_deref().map(SeqWriter::create).transpose()?,
        singleton: cli.out_singleton.as_deref().map(SeqWriter::create).transpose()?,
    };

    let stats = run_query_harness(index, pipeline_cfg, batches, cli.threads, sink);

    info!(
        "reads in: {} ({} bp); reads out: {} ({} bp)",
        stats.reads_in.reads, stats.reads_in.bases, stats.reads_out.reads, stats.reads_out.bases
    );
    info!(
        "kmer-filtered: {}; kmer-trimmed: {}; quality-trimmed: {}; final-filtered: {}",
        stats.kmer_filtered.reads, stats.kmer_trimmed.reads, stats.quality_trimmed.reads, stats.final_filtered.reads
    );

    Ok(())
}

fn main() {
    if let Err(err) = run() {
        eprintln!("bbduk: error: {:#}", err);
        exit(1);
    }
}
