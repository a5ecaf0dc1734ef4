//! Read-level filters independent of the k-mer index: length, quality,
//! GC content, N-content, base-run, and barcode/flowcell checks run before
//! and after the k-mer phase (spec section 4.6, initial/final filters).

use fxhash::FxHashMap;

use crate::engine::record::SeqRecord;

/// Thresholds for the initial and final filter passes. Both passes share
/// one struct; the pipeline decides which fields apply at which phase.
#[derive(Debug, Clone)]
pub struct FilterConfig {
    pub min_length: usize,
    pub max_length: Option<usize>,
    pub min_avg_quality: Option<f64>,
    pub min_base_quality: Option<u8>,
    pub max_ns: Option<usize>,
    pub min_gc: Option<f64>,
    pub max_gc: Option<f64>,
    pub min_consecutive_bases: Option<usize>,
    pub min_base_frequency: Option<f64>,
    pub entropy_cutoff: Option<f64>,
    pub entropy_k: usize,
    pub chastity_filter: bool,
}

impl Default for FilterConfig {
    fn default() -> Self {
        FilterConfig {
            min_length: 1,
            max_length: None,
            min_avg_quality: None,
            min_base_quality: None,
            max_ns: None,
            min_gc: None,
            max_gc: None,
            min_consecutive_bases: None,
            min_base_frequency: None,
            entropy_cutoff: None,
            entropy_k: 5,
            chastity_filter: false,
        }
    }
}

/// Count of each base category in a read, used by the GC and N filters.
/// Grounded on the teacher's single-pass prefix-sum GC counter
/// (`src/reference/gc.rs`): one linear scan instead of four.
#[derive(Debug, Default, Clone, Copy)]
struct BaseCounts {
    gc: usize,
    n: usize,
    len: usize,
}

fn count_bases(bases: &[u8]) -> BaseCounts {
    let mut counts = BaseCounts {
        len: bases.len(),
        ..BaseCounts::default()
    };
    for &b in bases {
        match b.to_ascii_uppercase() {
            b'G' | b'C' => counts.gc += 1,
            b'N' => counts.n += 1,
            _ => {}
        }
    }
    counts
}

fn gc_fraction(counts: &BaseCounts) -> f64 {
    if counts.len == 0 {
        0.0
    } else {
        counts.gc as f64 / counts.len as f64
    }
}

fn avg_quality(quality: &[u8]) -> f64 {
    if quality.is_empty() {
        return 0.0;
    }
    quality.iter().map(|&q| q as u64).sum::<u64>() as f64 / quality.len() as f64
}

fn longest_run(bases: &[u8]) -> usize {
    let mut best = 0usize;
    let mut cur = 0usize;
    let mut last: Option<u8> = None;
    for &b in bases {
        let up = b.to_ascii_uppercase();
        if Some(up) == last {
            cur += 1;
        } else {
            cur = 1;
            last = Some(up);
        }
        best = best.max(cur);
    }
    best
}

fn min_base_frequency_ok(bases: &[u8], min_freq: f64) -> bool {
    if bases.is_empty() {
        return true;
    }
    let mut counts = [0usize; 256];
    for &b in bases {
        counts[b.to_ascii_uppercase() as usize] += 1;
    }
    for &sym in b"ACGT" {
        let freq = counts[sym as usize] as f64 / bases.len() as f64;
        if freq > 0.0 && freq < min_freq {
            return false;
        }
    }
    true
}

/// Shannon entropy of overlapping `k`-mers in `bases`, normalized to `[0,1]`
/// by dividing by `log2(4^k)`. Used by the standalone entropy filter and by
/// the entropy-based trim/mask in `trim.rs`.
pub fn sequence_entropy(bases: &[u8], k: usize) -> f64 {
    if bases.len() < k || k == 0 {
        return 1.0;
    }
    let mut counts: FxHashMap<&[u8], u64> = FxHashMap::default();
    let windows = bases.len() - k + 1;
    for w in bases.windows(k) {
        *counts.entry(w).or_insert(0) += 1;
    }
    let total = windows as f64;
    let mut h = 0.0;
    for &c in counts.values() {
        let p = c as f64 / total;
        h -= p * p.log2();
    }
    let max_h = (4usize.pow(k.min(10) as u32) as f64).min(total).log2();
    if max_h <= 0.0 {
        1.0
    } else {
        (h / max_h).min(1.0)
    }
}

/// Result of applying the filter set to one read: either kept, or rejected
/// with a short reason tag used for stats bucketing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterVerdict {
    Keep,
    Reject(&'static str),
}

pub fn apply_filters(cfg: &FilterConfig, read: &SeqRecord) -> FilterVerdict {
    let len = read.len();
    if len < cfg.min_length {
        return FilterVerdict::Reject("min_length");
    }
    if let Some(max_len) = cfg.max_length {
        if len > max_len {
            return FilterVerdict::Reject("max_length");
        }
    }

    let counts = count_bases(&read.bases);

    if let Some(max_ns) = cfg.max_ns {
        if counts.n > max_ns {
            return FilterVerdict::Reject("max_ns");
        }
    }

    if cfg.min_gc.is_some() || cfg.max_gc.is_some() {
        let gc = gc_fraction(&counts);
        if let Some(min_gc) = cfg.min_gc {
            if gc < min_gc {
                return FilterVerdict::Reject("min_gc");
            }
        }
        if let Some(max_gc) = cfg.max_gc {
            if gc > max_gc {
                return FilterVerdict::Reject("max_gc");
            }
        }
    }

    if let Some(min_run) = cfg.min_consecutive_bases {
        if longest_run(&read.bases) < min_run {
            return FilterVerdict::Reject("min_consecutive_bases");
        }
    }

    if let Some(min_freq) = cfg.min_base_frequency {
        if !min_base_frequency_ok(&read.bases, min_freq) {
            return FilterVerdict::Reject("min_base_frequency");
        }
    }

    if let Some(cutoff) = cfg.entropy_cutoff {
        if sequence_entropy(&read.bases, cfg.entropy_k) < cutoff {
            return FilterVerdict::Reject("entropy");
        }
    }

    if let Some(quality) = &read.quality {
        if let Some(min_avg) = cfg.min_avg_quality {
            if avg_quality(quality) < min_avg {
                return FilterVerdict::Reject("min_avg_quality");
            }
        }
        if let Some(min_q) = cfg.min_base_quality {
            if quality.iter().any(|&q| q < min_q) {
                return FilterVerdict::Reject("min_base_quality");
            }
        }
    }

    if cfg.chastity_filter && !read.id.is_empty() {
        // Illumina "chastity" token: a 'Y' in the header's filter field marks
        // a read that failed the instrument's own purity check.
        if let Some(token) = read.id.split(':').nth(7) {
            if token.starts_with('Y') {
                return FilterVerdict::Reject("chastity");
            }
        }
    }

    FilterVerdict::Keep
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read(bases: &[u8]) -> SeqRecord {
        SeqRecord::new("r", bases.to_vec())
    }

    #[test]
    fn rejects_short_reads() {
        let cfg = FilterConfig {
            min_length: 10,
            ..FilterConfig::default()
        };
        assert_eq!(apply_filters(&cfg, &read(b"ACGT")), FilterVerdict::Reject("min_length"));
    }

    #[test]
    fn gc_bounds_enforced() {
        let cfg = FilterConfig {
            min_gc: Some(0.9),
            ..FilterConfig::default()
        };
        assert_eq!(apply_filters(&cfg, &read(b"AAAATTTT")), FilterVerdict::Reject("min_gc"));
        assert_eq!(apply_filters(&cfg, &read(b"GCGCGCGC")), FilterVerdict::Keep);
    }

    #[test]
    fn max_ns_enforced() {
        let cfg = FilterConfig {
            max_ns: Some(1),
            ..FilterConfig::default()
        };
        assert_eq!(apply_filters(&cfg, &read(b"ACNNGT")), FilterVerdict::Reject("max_ns"));
    }

    #[test]
    fn homopolymer_entropy_is_low() {
        let h = sequence_entropy(b"AAAAAAAAAAAAAAAAAAAA", 4);
        assert!(h < 0.2);
    }

    #[test]
    fn random_looking_sequence_has_high_entropy() {
        let h = sequence_entropy(b"ACGTACGTGCATGCATGGCCATTAGGC", 4);
        assert!(h > 0.5);
    }

    #[test]
    fn average_quality_filter() {
        let cfg = FilterConfig {
            min_avg_quality: Some(20.0),
            ..FilterConfig::default()
        };
        let low = read(b"ACGT").with_quality(vec![10, 10, 10, 10]);
        assert_eq!(apply_filters(&cfg, &low), FilterVerdict::Reject("min_avg_quality"));
        let high = read(b"ACGT").with_quality(vec![30, 30, 30, 30]);
        assert_eq!(apply_filters(&cfg, &high), FilterVerdict::Keep);
    }

    #[test]
    fn min_consecutive_bases_enforced() {
        let cfg = FilterConfig {
            min_consecutive_bases: Some(3),
            ..FilterConfig::default()
        };
        assert_eq!(
            apply_filters(&cfg, &read(b"ACGTACGT")),
            FilterVerdict::Reject("min_consecutive_bases")
        );
        assert_eq!(apply_filters(&cfg, &read(b"AAACGTACGT")), FilterVerdict::Keep);
    }
}
