//! Per-read pipeline: orchestrates force-trim, initial filters, the k-mer
//! phase, overlap-trim, secondary trimming, and final filters in the fixed
//! order spec section 4.6 lays out, producing a 2-bit keep mask per pair.

use crate::engine::config::{KmerMode, KmerPhaseConfig};
use crate::engine::filters::{apply_filters, FilterConfig, FilterVerdict};
use crate::engine::index::KmerIndex;
use crate::engine::overlap::find_overlap;
use crate::engine::record::{KeepMask, ReadPair, SeqRecord};
use crate::engine::scanner::scan_read;
use crate::engine::stats::RunStats;
use crate::engine::trim::{
    entropy_mask, entropy_trim_range, polymer_trim_range, quality_trim_range, swift_trim_range,
    PolymerBase,
};

/// Hard-crop configuration applied before any filter runs (spec section
/// 4.6, phase 1).
#[derive(Debug, Clone, Copy, Default)]
pub struct ForceTrimConfig {
    pub left: usize,
    pub right: usize,
    pub right2: usize,
    pub modulo: usize,
}

/// One polymer trim/filter threshold, applied for each of the five
/// configured tails (A-left, G-left, G-right, C-left, C-right).
#[derive(Debug, Clone, Copy)]
pub struct PolymerConfig {
    pub base: PolymerBase,
    pub min_run: usize,
    pub max_non_poly: usize,
}

#[derive(Debug, Clone, Default)]
pub struct EntropyTrimConfig {
    pub enabled: bool,
    pub mask_only: bool,
    pub k: usize,
    pub cutoff: f64,
    pub window: usize,
}

#[derive(Debug, Clone, Default)]
pub struct QualityTrimConfig {
    pub enabled: bool,
    pub trim_q: u8,
    pub left: bool,
    pub right: bool,
}

#[derive(Debug, Clone, Default)]
pub struct SwiftTrimConfig {
    pub enabled: bool,
    pub marker: Vec<u8>,
    pub max_offset: usize,
}

/// Quantize quality scores to a coarse set of bins after all trimming
/// decisions are finalized (spec section 4.6, "optional quality
/// quantization is applied to survivors").
pub fn quantize_quality(quality: &mut [u8], bin_size: u8) {
    if bin_size <= 1 {
        return;
    }
    for q in quality.iter_mut() {
        *q = (*q / bin_size) * bin_size;
    }
}

#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    pub force_trim: ForceTrimConfig,
    pub initial_filters: FilterConfig,
    pub kmer_phase: Option<KmerPhaseConfig>,
    pub min_overlap: usize,
    pub overlap_max_mismatch_fraction: f64,
    pub overlap_trim: bool,
    pub polymer: Vec<PolymerConfig>,
    pub entropy: EntropyTrimConfig,
    pub quality: QualityTrimConfig,
    pub swift: SwiftTrimConfig,
    pub final_filters: FilterConfig,
    pub quality_quantize_bin: u8,
    pub remove_pairs_if_either_bad: bool,
    pub trim_failures_to_1bp: bool,
}

fn force_trim(cfg: &ForceTrimConfig, read: &mut SeqRecord) {
    let l = read.len();
    let right_bound = l.saturating_sub(cfg.right).saturating_sub(cfg.right2);
    let start = cfg.left.min(right_bound);
    let mut end = right_bound.max(start);
    if cfg.modulo > 1 {
        let span = end - start;
        end = start + (span / cfg.modulo) * cfg.modulo;
    }
    truncate_to(read, start, end);
}

fn truncate_to(read: &mut SeqRecord, start: usize, end: usize) {
    if start == 0 && end == read.bases.len() {
        return;
    }
    read.bases = read.bases[start..end].to_vec();
    if let Some(q) = &mut read.quality {
        *q = q[start..end].to_vec();
    }
}

fn apply_polymer_trims(cfg: &PipelineConfig, read: &mut SeqRecord) {
    for p in &cfg.polymer {
        let (s, e) = polymer_trim_range(&read.bases, p.base, p.min_run, p.max_non_poly);
        truncate_to(read, s, e);
    }
}

fn apply_entropy(cfg: &EntropyTrimConfig, read: &mut SeqRecord) {
    if !cfg.enabled {
        return;
    }
    if cfg.mask_only {
        let mask = entropy_mask(&read.bases, cfg.k, cfg.cutoff, cfg.window);
        for (b, &m) in read.bases.iter_mut().zip(mask.iter()) {
            if m {
                *b = b'N';
            }
        }
    } else {
        let (s, e) = entropy_trim_range(&read.bases, cfg.k, cfg.cutoff, cfg.window);
        truncate_to(read, s, e);
    }
}

fn apply_quality_trim(cfg: &QualityTrimConfig, read: &mut SeqRecord) {
    if !cfg.enabled {
        return;
    }
    if let Some(quality) = read.quality.clone() {
        let (s, e) = quality_trim_range(&quality, cfg.trim_q, cfg.left, cfg.right);
        truncate_to(read, s, e);
    }
}

fn apply_swift(cfg: &SwiftTrimConfig, read: &mut SeqRecord) {
    if !cfg.enabled {
        return;
    }
    let (s, e) = swift_trim_range(&read.bases, &cfg.marker, cfg.max_offset);
    truncate_to(read, s, e);
}

/// Run the k-mer phase for one read, applying its outcome in place and
/// crediting `stats.kmer_trimmed` for any bases removed or masked without
/// discarding the read. Returns `true` if the read is discarded by this
/// phase.
fn run_kmer_phase(
    index: &KmerIndex,
    kp: &KmerPhaseConfig,
    read: &mut SeqRecord,
    min_read_length: usize,
    stats: &mut RunStats,
) -> bool {
    let outcome = scan_read(index, kp, &read.bases);

    match kp.mode {
        KmerMode::Filter => outcome.discard,
        KmerMode::FindBestMatch => {
            if kp.rename {
                if let Some((id, count)) = outcome.best_match {
                    read.id = format!("{}\tid={}\tcount={}", read.id, id, count);
                }
            }
            false
        }
        KmerMode::TrimLeft | KmerMode::TrimRight | KmerMode::TrimBoth => {
            if let Some((s, e)) = outcome.trimmed {
                let before = read.len();
                truncate_to(read, s, e);
                let removed = before.saturating_sub(read.len());
                if removed > 0 {
                    stats.kmer_trimmed.add(1, removed as u64);
                }
            }
            read.len() < min_read_length
        }
        KmerMode::MaskN => {
            if let Some(mask) = outcome.mask {
                let mut masked_bases = 0u64;
                for (i, &masked) in mask.iter().enumerate() {
                    if masked {
                        masked_bases += 1;
                        if kp.kmask_lowercase {
                            read.bases[i] = read.bases[i].to_ascii_lowercase();
                        } else {
                            read.bases[i] = kp.mask_symbol;
                            if let Some(q) = &mut read.quality {
                                q[i] = 0;
                            }
                        }
                    }
                }
                if masked_bases > 0 {
                    stats.kmer_trimmed.add(1, masked_bases);
                }
            }
            false
        }
        KmerMode::Split => {
            // Splitting a single SeqRecord into multiple outputs is a
            // fan-out the 2-bit keep mask can't represent; keep only the
            // first surviving fragment here and let callers needing true
            // multi-fragment output drive `scan_read` directly.
            if let Some(fragments) = outcome.splits {
                match fragments.first() {
                    Some(&(s, e)) => {
                        let before = read.len();
                        truncate_to(read, s, e);
                        let removed = before.saturating_sub(read.len());
                        if removed > 0 {
                            stats.kmer_trimmed.add(1, removed as u64);
                        }
                    }
                    None => return true,
                }
            }
            read.len() < min_read_length
        }
    }
}

fn run_single(cfg: &PipelineConfig, index: Option<&KmerIndex>, read: &mut SeqRecord, stats: &mut RunStats) -> bool {
    stats.reads_in.add(1, read.len() as u64);

    let before = read.len();
    force_trim(&cfg.force_trim, read);
    stats.force_trimmed.add(0, before.saturating_sub(read.len()) as u64);

    if let FilterVerdict::Reject(_) = apply_filters(&cfg.initial_filters, read) {
        stats.initial_filtered.add(1, read.len() as u64);
        return true;
    }

    if let (Some(index), Some(kp)) = (index, &cfg.kmer_phase) {
        let min_len = cfg.final_filters.min_length.max(kp.min_read_length);
        if run_kmer_phase(index, kp, read, min_len, stats) {
            stats.kmer_filtered.add(1, read.len() as u64);
            return true;
        }
    }

    let before = read.len();
    apply_swift(&cfg.swift, read);
    apply_polymer_trims(cfg, read);
    stats.polymer_trimmed.add(0, before.saturating_sub(read.len()) as u64);

    let before = read.len();
    apply_entropy(&cfg.entropy, read);
    stats.entropy_filtered.add(0, before.saturating_sub(read.len()) as u64);

    let before = read.len();
    apply_quality_trim(&cfg.quality, read);
    stats.quality_trimmed.add(0, before.saturating_sub(read.len()) as u64);

    if let FilterVerdict::Reject(_) = apply_filters(&cfg.final_filters, read) {
        stats.final_filtered.add(1, read.len() as u64);
        return true;
    }

    if cfg.quality_quantize_bin > 1 {
        if let Some(q) = &mut read.quality {
            quantize_quality(q, cfg.quality_quantize_bin);
        }
    }

    stats.reads_out.add(1, read.len() as u64);
    false
}

/// Run the full pipeline over one pair, producing a keep mask. `index` is
/// `None` when no k-mer mode is configured (filters/trim-only runs).
pub fn run_pipeline(
    cfg: &PipelineConfig,
    index: Option<&KmerIndex>,
    pair: &mut ReadPair,
    stats: &mut RunStats,
) -> KeepMask {
    let discard_r1 = run_single(cfg, index, &mut pair.r1, stats);

    let discard_r2 = match &mut pair.r2 {
        Some(r2) => Some(run_single(cfg, index, r2, stats)),
        None => None,
    };

    if cfg.overlap_trim {
        if let Some(r2) = &mut pair.r2 {
            if !discard_r1 && discard_r2 == Some(false) {
                if let Some(result) = find_overlap(
                    &pair.r1.bases,
                    &r2.bases,
                    cfg.min_overlap,
                    cfg.overlap_max_mismatch_fraction,
                ) {
                    if result.insert_size < pair.r1.len() {
                        let r1_len = pair.r1.len();
                        let r2_len = r2.len();
                        truncate_to(&mut pair.r1, 0, result.insert_size.min(r1_len));
                        truncate_to(r2, 0, result.insert_size.min(r2_len));
                        stats.overlap_trimmed.add(2, 0);
                    }
                }
            }
        }
    }

    let either_bad = discard_r1 || discard_r2 == Some(true);
    if cfg.remove_pairs_if_either_bad && pair.is_paired() && either_bad {
        if cfg.trim_failures_to_1bp {
            let r1_len = pair.r1.len();
            truncate_to(&mut pair.r1, 0, r1_len.min(1));
            if let Some(r2) = &mut pair.r2 {
                truncate_to(r2, 0, r2.len().min(1));
            }
            return KeepMask {
                keep_r1: false,
                keep_r2: false,
                placeholder: true,
            };
        }
        return KeepMask::DISCARD_BOTH;
    }

    KeepMask {
        keep_r1: !discard_r1,
        keep_r2: discard_r2.map(|d| !d).unwrap_or(false),
        placeholder: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::alphabet::{Alphabet, AlphabetConfig};
    use crate::engine::builder::IndexBuilder;
    use crate::engine::config::IndexConfig;
    use crate::engine::table::ShardedTable;

    fn index_with_ref(seq: &[u8], k: usize) -> KmerIndex {
        let cfg = IndexConfig {
            k,
            rcomp: true,
            ..IndexConfig::default()
        };
        let alphabet = AlphabetConfig::new(Alphabet::Nucleotide);
        let table = ShardedTable::new(cfg.ways, 16);
        let mut index = KmerIndex::new(cfg, alphabet, table);
        let mut builder = IndexBuilder::new(&mut index);
        builder.build(&[SeqRecord::new("ref", seq.to_vec())], None).unwrap();
        index
    }

    #[test]
    fn filter_mode_discards_matching_read() {
        let index = index_with_ref(b"ACGT", 4);
        let cfg = PipelineConfig {
            kmer_phase: Some(KmerPhaseConfig::default()),
            ..PipelineConfig::default()
        };
        let mut pair = ReadPair::single(SeqRecord::new("r1", b"NNACGTNN".to_vec()));
        let mut stats = RunStats::default();
        let mask = run_pipeline(&cfg, Some(&index), &mut pair, &mut stats);
        assert!(!mask.keep_r1);
    }

    #[test]
    fn scenario_six_remove_pairs_if_either_bad() {
        let index = index_with_ref(b"ACGT", 4);
        let cfg = PipelineConfig {
            kmer_phase: Some(KmerPhaseConfig::default()),
            remove_pairs_if_either_bad: true,
            ..PipelineConfig::default()
        };
        let mut pair = ReadPair::paired(
            SeqRecord::new("r1", b"AAACGTAA".to_vec()),
            SeqRecord::new("r2", b"TTACGTTT".to_vec()),
        );
        let mut stats = RunStats::default();
        let mask = run_pipeline(&cfg, Some(&index), &mut pair, &mut stats);
        assert_eq!(mask, KeepMask::DISCARD_BOTH);
    }

    #[test]
    fn force_trim_crops_before_filters() {
        let cfg = PipelineConfig {
            force_trim: ForceTrimConfig {
                left: 2,
                right: 2,
                ..ForceTrimConfig::default()
            },
            ..PipelineConfig::default()
        };
        let mut pair = ReadPair::single(SeqRecord::new("r1", b"AACCGGTT".to_vec()));
        let mut stats = RunStats::default();
        run_pipeline(&cfg, None, &mut pair, &mut stats);
        assert_eq!(pair.r1.bases, b"CCGG");
    }

    #[test]
    fn trim_failures_to_1bp_truncates_both_mates() {
        let index = index_with_ref(b"ACGT", 4);
        let cfg = PipelineConfig {
            kmer_phase: Some(KmerPhaseConfig::default()),
            remove_pairs_if_either_bad: true,
            trim_failures_to_1bp: true,
            ..PipelineConfig::default()
        };
        let mut pair = ReadPair::paired(
            SeqRecord::new("r1", b"NNACGTNN".to_vec()),
            SeqRecord::new("r2", b"AAAAAAAA".to_vec()),
        );
        let mut stats = RunStats::default();
        let mask = run_pipeline(&cfg, Some(&index), &mut pair, &mut stats);
        assert_eq!(pair.r1.bases.len(), 1);
        assert_eq!(pair.r2.as_ref().unwrap().bases.len(), 1);
        assert!(mask.placeholder, "1bp placeholder discard must be flagged for unmatched routing");
    }

    #[test]
    fn ordinary_double_discard_is_not_a_placeholder() {
        let index = index_with_ref(b"ACGT", 4);
        let cfg = PipelineConfig {
            kmer_phase: Some(KmerPhaseConfig::default()),
            remove_pairs_if_either_bad: true,
            ..PipelineConfig::default()
        };
        let mut pair = ReadPair::paired(
            SeqRecord::new("r1", b"AAACGTAA".to_vec()),
            SeqRecord::new("r2", b"TTACGTTT".to_vec()),
        );
        let mut stats = RunStats::default();
        let mask = run_pipeline(&cfg, Some(&index), &mut pair, &mut stats);
        assert_eq!(mask, KeepMask::DISCARD_BOTH);
        assert!(!mask.placeholder);
    }

    #[test]
    fn kmer_trim_mode_credits_kmer_trimmed_stat() {
        let index = index_with_ref(b"ACGT", 4);
        let cfg = PipelineConfig {
            kmer_phase: Some(KmerPhaseConfig {
                mode: KmerMode::TrimRight,
                ..KmerPhaseConfig::default()
            }),
            ..PipelineConfig::default()
        };
        let mut pair = ReadPair::single(SeqRecord::new("r1", b"AAAAACGTAAAA".to_vec()));
        let mut stats = RunStats::default();
        run_pipeline(&cfg, Some(&index), &mut pair, &mut stats);
        assert!(stats.kmer_trimmed.reads > 0);
        assert!(stats.kmer_trimmed.bases > 0);
    }

    #[test]
    fn quality_quantize_bins_scores() {
        let mut q = vec![2, 7, 13, 22, 38];
        quantize_quality(&mut q, 5);
        assert_eq!(q, vec![0, 5, 10, 20, 35]);
    }
}
