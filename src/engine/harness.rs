//! Producer/worker/writer concurrency harness (spec sections 4.7 and 5).
//!
//! One producer thread hands ordered `ReadBatch`es to a bounded channel; a
//! pool of worker threads pulls from it, runs the read pipeline, and pushes
//! per-batch results to three ordered output channels (unmatched, matched,
//! singleton) tagged with their batch id so a single writer thread per
//! channel can re-establish input order before flushing.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use crossbeam_channel::{bounded, Receiver, Sender};

use crate::engine::index::KmerIndex;
use crate::engine::pipeline::{run_pipeline, PipelineConfig};
use crate::engine::record::{KeepMask, ReadBatch, ReadPair};
use crate::engine::stats::RunStats;

/// Default bounded-queue depth between every stage (spec section 5,
/// "Bounded queues (capacity 32 batches typical)").
pub const DEFAULT_QUEUE_CAPACITY: usize = 32;

/// Classified output for one pair, carrying its batch id for re-ordering.
struct Classified {
    batch_id: u64,
    index_in_batch: usize,
    pair: ReadPair,
    mask: KeepMask,
}

/// The three ordered output destinations a classified pair can land on.
pub enum Channel {
    Unmatched,
    Matched,
    Singleton,
}

/// Sink trait the harness writes classified pairs to. Implementations own
/// actual file/stream I/O; the harness only guarantees ordering and routing.
pub trait OutputSink: Send {
    fn write(&mut self, channel: Channel, pair: &ReadPair, mask: KeepMask);
}

fn route(mask: KeepMask) -> Channel {
    match (mask.keep_r1, mask.keep_r2) {
        (false, false) => Channel::Unmatched, // caller decides matched-vs-discard disposition
        (true, true) => Channel::Unmatched,
        _ => Channel::Singleton,
    }
}

/// Runs one worker-side pass of `batches` through the pipeline, using
/// `num_workers` OS threads, and returns the merged statistics. `sink` is
/// invoked strictly in input order regardless of which worker finished a
/// batch first (spec section 4.7, "writers flush in batch-id order").
pub fn run_query_harness<S: OutputSink + 'static>(
    index: Option<Arc<KmerIndex>>,
    pipeline_cfg: Arc<PipelineConfig>,
    batches: Vec<ReadBatch>,
    num_workers: usize,
    mut sink: S,
) -> RunStats {
    let error_flag = Arc::new(AtomicBool::new(false));
    let (batch_tx, batch_rx): (Sender<ReadBatch>, Receiver<ReadBatch>) = bounded(DEFAULT_QUEUE_CAPACITY);
    let (result_tx, result_rx): (Sender<(u64, Vec<Classified>, RunStats)>, Receiver<_>) =
        bounded(DEFAULT_QUEUE_CAPACITY);

    let producer_batches = batches.len() as u64;
    let producer = thread::spawn(move || {
        for batch in batches {
            if batch_tx.send(batch).is_err() {
                break;
            }
        }
    });

    let workers: Vec<_> = (0..num_workers.max(1))
        .map(|_| {
            let rx = batch_rx.clone();
            let tx = result_tx.clone();
            let index = index.clone();
            let cfg = pipeline_cfg.clone();
            let error_flag = error_flag.clone();
            thread::spawn(move || {
                while let Ok(batch) = rx.recv() {
                    if error_flag.load(Ordering::Relaxed) {
                        break;
                    }
                    let mut stats = RunStats::default();
                    let mut classified = Vec::with_capacity(batch.reads.len());
                    for (index_in_batch, mut pair) in batch.reads.into_iter().enumerate() {
                        let mask = run_pipeline(&cfg, index.as_deref(), &mut pair, &mut stats);
                        classified.push(Classified {
                            batch_id: batch.batch_id,
                            index_in_batch,
                            pair,
                            mask,
                        });
                    }
                    if tx.send((batch.batch_id, classified, stats)).is_err() {
                        break;
                    }
                }
            })
        })
        .collect();
    drop(batch_rx);
    drop(result_tx);

    // Re-order by batch id before handing to the sink: workers may finish
    // out of order, but the writer must flush in input order.
    let mut pending: std::collections::BTreeMap<u64, (Vec<Classified>, RunStats)> = std::collections::BTreeMap::new();
    let mut next_id = 0u64;
    let mut merged = RunStats::default();

    for (batch_id, mut classified, stats) in result_rx {
        classified.sort_by_key(|c| c.index_in_batch);
        pending.insert(batch_id, (classified, stats));
        while let Some((items, stats)) = pending.remove(&next_id) {
            for item in items {
                let channel = route(item.mask);
                sink.write(channel, &item.pair, item.mask);
            }
            merged += stats;
            next_id += 1;
            if next_id >= producer_batches {
                break;
            }
        }
    }

    producer.join().ok();
    for w in workers {
        w.join().ok();
    }

    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::record::SeqRecord;
    use std::sync::Mutex;

    struct CollectingSink {
        written: Arc<Mutex<Vec<(String, bool, bool)>>>,
    }

    impl OutputSink for CollectingSink {
        fn write(&mut self, _channel: Channel, pair: &ReadPair, mask: KeepMask) {
            self.written
                .lock()
                .unwrap()
                .push((pair.r1.id.clone(), mask.keep_r1, mask.keep_r2));
        }
    }

    fn batch(id: u64, ids: &[&str]) -> ReadBatch {
        ReadBatch {
            batch_id: id,
            reads: ids
                .iter()
                .map(|&i| ReadPair::single(SeqRecord::new(i, b"AAAAAAAAAA".to_vec())))
                .collect(),
        }
    }

    #[test]
    fn preserves_batch_order_across_workers() {
        let batches = vec![batch(0, &["a", "b"]), batch(1, &["c"]), batch(2, &["d", "e"])];
        let written = Arc::new(Mutex::new(Vec::new()));
        let sink = CollectingSink {
            written: written.clone(),
        };
        let cfg = Arc::new(PipelineConfig::default());
        run_query_harness(None, cfg, batches, 4, sink);

        let ids: Vec<String> = written.lock().unwrap().iter().map(|(id, _, _)| id.clone()).collect();
        assert_eq!(ids, vec!["a", "b", "c", "d", "e"]);
    }

    #[test]
    fn all_reads_kept_with_no_kmer_phase() {
        let batches = vec![batch(0, &["a"])];
        let written = Arc::new(Mutex::new(Vec::new()));
        let sink = CollectingSink {
            written: written.clone(),
        };
        let cfg = Arc::new(PipelineConfig::default());
        run_query_harness(None, cfg, batches, 1, sink);
        assert_eq!(written.lock().unwrap()[0], ("a".to_string(), true, false));
    }
}
