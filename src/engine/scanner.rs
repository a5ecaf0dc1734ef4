//! Per-read k-mer scanning: locates reference hits and drives the
//! filter/trim/mask/split decision for the k-mer phase (spec section 4.5).

use crate::engine::config::{KmerMode, KmerPhaseConfig};
use crate::engine::index::KmerIndex;
use crate::engine::kmer::RollingKmer;

/// One located hit: `pos` is the index of the k-mer's rightmost base.
#[derive(Debug, Clone, Copy)]
struct Hit {
    pos: usize,
    scaffold: i32,
}

/// Result of scanning a single read through the k-mer phase.
#[derive(Debug, Clone, Default)]
pub struct ScanOutcome {
    pub discard: bool,
    /// `[start, end)` survivor range after trim-left/trim-right/trim-both.
    pub trimmed: Option<(usize, usize)>,
    /// Per-base mask for `ktrimN`: `true` = replace this base.
    pub mask: Option<Vec<bool>>,
    /// Maximal unmasked fragments for `ksplit`.
    pub splits: Option<Vec<(usize, usize)>>,
    /// `(scaffold_id, count)` winner for find-best-match.
    pub best_match: Option<(i32, u64)>,
    pub hit_count: usize,
}

fn locate_hits(index: &KmerIndex, bases: &[u8], start_r: usize, stop_l: usize) -> (Vec<Hit>, usize) {
    let k = index.config.k;
    let mut roll = RollingKmer::new(&index.alphabet, k);
    let mut hits = Vec::new();
    let mut valid_kmers = 0usize;

    for (pos, &base) in bases.iter().enumerate() {
        let full = roll.push(base, index.config.forbid_n);
        if full && pos >= start_r && pos < stop_l {
            valid_kmers += 1;
            let id = index.query(roll.forward(), roll.reverse(), index.config.q_hdist);
            if id >= 0 {
                hits.push(Hit { pos, scaffold: id });
            }
        }
    }
    (hits, valid_kmers)
}

/// Re-scan one edge with shortening windows (k-1 down to `min_k`), used by
/// trim-tips when no full-length hit was found and `use_short_kmers` is on.
fn shortkmer_edge_hit(index: &KmerIndex, bases: &[u8], left_edge: bool) -> Option<Hit> {
    if !index.config.use_short_kmers || bases.len() < index.config.min_k {
        return None;
    }
    let lo = index.config.min_k;
    let hi = index.config.k.saturating_sub(1);
    for len in (lo..=hi).rev() {
        if bases.len() < len {
            continue;
        }
        let window = if left_edge {
            &bases[..len]
        } else {
            &bases[bases.len() - len..]
        };
        let mut roll = RollingKmer::new(&index.alphabet, len);
        let mut full = false;
        for &b in window {
            full = roll.push(b, index.config.forbid_n);
        }
        if full {
            let id = index.query_short(roll.forward(), roll.reverse(), len, index.config.q_hdist2);
            if id >= 0 {
                let pos = if left_edge { len - 1 } else { bases.len() - 1 };
                return Some(Hit { pos, scaffold: id });
            }
        }
    }
    None
}

fn trim_right_range(k: usize, pad: usize, exclusive: bool, pos: usize, len: usize) -> (usize, usize) {
    let start = if exclusive {
        pos.saturating_sub(k.saturating_sub(2))
    } else {
        pos.saturating_sub(k.saturating_sub(1) + pad)
    };
    (start.min(len), len)
}

fn trim_left_range(pad: usize, exclusive: bool, pos: usize, len: usize) -> (usize, usize) {
    let end_inclusive = if exclusive { pos } else { pos + pad };
    let end = (end_inclusive + 1).min(len);
    (0, end)
}

fn mask_range(k: usize, pad: usize, pos: usize, len: usize) -> (usize, usize) {
    let start = pos.saturating_sub(k.saturating_sub(1) + pad);
    let end = (pos + 1 + pad).min(len);
    (start, end)
}

/// Run the k-mer phase over one read's bases. `index` must have been built
/// with `speed = 0` and `qhdist = 0` for deterministic, reproducible
/// results (spec section 9).
pub fn scan_read(index: &KmerIndex, kp: &KmerPhaseConfig, bases: &[u8]) -> ScanOutcome {
    let l = bases.len();
    let (start_r, stop_l) = kp.restriction.window(l);
    let k = index.config.k;

    if l < k || start_r >= stop_l {
        return ScanOutcome::default();
    }

    let (hits, valid_kmers) = locate_hits(index, bases, start_r, stop_l);

    match kp.mode {
        KmerMode::Filter => {
            if kp.use_coverage_filter {
                filter_by_coverage(kp, &hits, k, l)
            } else {
                filter_by_count(kp, &hits, valid_kmers)
            }
        }
        KmerMode::FindBestMatch => find_best_match(&hits),
        KmerMode::TrimLeft | KmerMode::TrimRight | KmerMode::TrimBoth => {
            trim_tips(index, kp, bases, &hits)
        }
        KmerMode::MaskN => mask_hits(kp, &hits, k, l, false),
        KmerMode::Split => mask_hits(kp, &hits, k, l, true),
    }
}

fn filter_by_count(kp: &KmerPhaseConfig, hits: &[Hit], valid_kmers: usize) -> ScanOutcome {
    let max_bad = kp.max_bad_kmers.max(
        ((valid_kmers.saturating_sub(1)) as f64 * kp.min_kmer_fraction).floor() as usize,
    );
    ScanOutcome {
        discard: hits.len() > max_bad,
        hit_count: hits.len(),
        ..Default::default()
    }
}

fn filter_by_coverage(kp: &KmerPhaseConfig, hits: &[Hit], k: usize, l: usize) -> ScanOutcome {
    let mut covered = 0i64;
    let mut last_covered: i64 = -1;
    for h in hits {
        let lo = ((h.pos as i64) - (k as i64) + 1).max(last_covered + 1);
        let hi = h.pos as i64;
        if hi >= lo {
            covered += hi - lo + 1;
            last_covered = hi;
        }
    }
    let required = (kp.min_covered_fraction * l as f64).ceil() as i64;
    ScanOutcome {
        discard: covered >= required,
        hit_count: hits.len(),
        ..Default::default()
    }
}

fn find_best_match(hits: &[Hit]) -> ScanOutcome {
    let mut counts: fxhash::FxHashMap<i32, u64> = fxhash::FxHashMap::default();
    for h in hits {
        *counts.entry(h.scaffold).or_insert(0) += 1;
    }
    // Ties broken by lowest scaffold id (spec section 8, quantified invariant).
    let best = counts
        .into_iter()
        .max_by(|a, b| a.1.cmp(&b.1).then(b.0.cmp(&a.0)));
    ScanOutcome {
        best_match: best,
        hit_count: hits.len(),
        ..Default::default()
    }
}

fn trim_tips(index: &KmerIndex, kp: &KmerPhaseConfig, bases: &[u8], hits: &[Hit]) -> ScanOutcome {
    let k = index.config.k;
    let l = bases.len();
    let want_left = matches!(kp.mode, KmerMode::TrimLeft | KmerMode::TrimBoth);
    let want_right = matches!(kp.mode, KmerMode::TrimRight | KmerMode::TrimBoth);

    let mut start = 0usize;
    let mut end = l;

    if want_right {
        let hit = hits.first().copied().or_else(|| shortkmer_edge_hit(index, bases, false));
        if let Some(h) = hit {
            let (s, _e) = trim_right_range(k, kp.trim_pad, kp.ktrim_exclusive, h.pos, l);
            end = end.min(s);
        }
    }
    if want_left {
        let hit = hits.first().copied().or_else(|| shortkmer_edge_hit(index, bases, true));
        if let Some(h) = hit {
            let (_s, e) = trim_left_range(kp.trim_pad, kp.ktrim_exclusive, h.pos, l);
            start = start.max(e);
        }
    }

    if start > end {
        start = end;
    }

    ScanOutcome {
        trimmed: Some((start, end)),
        hit_count: hits.len(),
        ..Default::default()
    }
}

fn mask_hits(kp: &KmerPhaseConfig, hits: &[Hit], k: usize, l: usize, as_split: bool) -> ScanOutcome {
    let fully_covered = kp.kmask_fully_covered && !as_split;
    let mut mask = vec![fully_covered; l];
    for h in hits {
        let (lo, hi) = mask_range(k, kp.trim_pad, h.pos, l);
        for m in mask.iter_mut().take(hi).skip(lo) {
            *m = !fully_covered;
        }
    }

    if as_split {
        let mut fragments = Vec::new();
        let mut i = 0usize;
        while i < l {
            if mask[i] {
                i += 1;
                continue;
            }
            let start = i;
            while i < l && !mask[i] {
                i += 1;
            }
            if i - start >= kp.min_read_length {
                fragments.push((start, i));
            }
        }
        ScanOutcome {
            splits: Some(fragments),
            hit_count: hits.len(),
            ..Default::default()
        }
    } else {
        ScanOutcome {
            mask: Some(mask),
            hit_count: hits.len(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::alphabet::{Alphabet, AlphabetConfig};
    use crate::engine::builder::IndexBuilder;
    use crate::engine::config::IndexConfig;
    use crate::engine::record::SeqRecord;
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
        {
            let mut builder = IndexBuilder::new(&mut index);
            builder
                .build(&[SeqRecord::new("ref", seq.to_vec())], None)
                .unwrap();
        }
        index
    }

    // Scenario 1: filter, read with one hit, maxBadKmers=0 -> discard.
    #[test]
    fn scenario_filter_discards_on_hit() {
        let index = index_with_ref(b"ACGT", 4);
        let kp = KmerPhaseConfig {
            max_bad_kmers: 0,
            ..KmerPhaseConfig::default()
        };
        let outcome = scan_read(&index, &kp, b"NNACGTNN");
        assert!(outcome.discard);
    }

    // Scenario 2: filter, no hits -> kept.
    #[test]
    fn scenario_filter_keeps_no_hit() {
        let index = index_with_ref(b"ACGT", 4);
        let kp = KmerPhaseConfig {
            max_bad_kmers: 0,
            ..KmerPhaseConfig::default()
        };
        let outcome = scan_read(&index, &kp, b"AAAA");
        assert!(!outcome.discard);
    }

    // Scenario 3: ktrimRight non-exclusive, trimPad=0 -> "AAAA".
    #[test]
    fn scenario_ktrim_right() {
        let index = index_with_ref(b"ACGT", 4);
        let kp = KmerPhaseConfig {
            mode: KmerMode::TrimRight,
            ..KmerPhaseConfig::default()
        };
        let read = b"AAAAACGT";
        let outcome = scan_read(&index, &kp, read);
        let (s, e) = outcome.trimmed.unwrap();
        assert_eq!(&read[s..e], b"AAAA");
    }

    // Scenario 4: ktrimLeft non-exclusive, trimPad=0 -> "AAAA".
    #[test]
    fn scenario_ktrim_left() {
        let index = index_with_ref(b"ACGT", 4);
        let kp = KmerPhaseConfig {
            mode: KmerMode::TrimLeft,
            ..KmerPhaseConfig::default()
        };
        let read = b"ACGTAAAA";
        let outcome = scan_read(&index, &kp, read);
        let (s, e) = outcome.trimmed.unwrap();
        assert_eq!(&read[s..e], b"AAAA");
    }

    // Scenario 5: ktrimN trimPad=0 -> "AANNNNAA".
    #[test]
    fn scenario_ktrim_n() {
        let index = index_with_ref(b"ACGT", 4);
        let kp = KmerPhaseConfig {
            mode: KmerMode::MaskN,
            ..KmerPhaseConfig::default()
        };
        let read = b"AAACGTAA";
        let outcome = scan_read(&index, &kp, read);
        let mask = outcome.mask.unwrap();
        let masked: Vec<u8> = read
            .iter()
            .zip(mask.iter())
            .map(|(&b, &m)| if m { b'N' } else { b })
            .collect();
        assert_eq!(&masked, b"AANNNNAA");
    }

    #[test]
    fn split_concatenation_equals_read_minus_hit_windows() {
        let index = index_with_ref(b"ACGT", 4);
        let kp = KmerPhaseConfig {
            mode: KmerMode::Split,
            min_read_length: 1,
            ..KmerPhaseConfig::default()
        };
        let read = b"AAACGTAA";
        let outcome = scan_read(&index, &kp, read);
        let fragments = outcome.splits.unwrap();
        let mut concatenated = Vec::new();
        for (s, e) in &fragments {
            concatenated.extend_from_slice(&read[*s..*e]);
        }
        assert_eq!(concatenated, b"AAAA");
    }

    #[test]
    fn find_best_match_ties_favor_lowest_scaffold_id() {
        let index = index_with_ref(b"ACGTACGA", 4); // two 4-mers, two scaffolds via two refs below
        let outcome = find_best_match(&[
            Hit { pos: 3, scaffold: 2 },
            Hit { pos: 7, scaffold: 1 },
        ]);
        let (id, count) = outcome.best_match.unwrap();
        assert_eq!(count, 1);
        assert_eq!(id, 1);
        let _ = index; // silence unused in this tie-break-only test
    }

    #[test]
    fn boundary_read_shorter_than_k_never_hits() {
        let index = index_with_ref(b"ACGT", 4);
        let kp = KmerPhaseConfig::default();
        let outcome = scan_read(&index, &kp, b"AC");
        assert_eq!(outcome.hit_count, 0);
        assert!(!outcome.discard);
    }
}
