//! Index builder: converts reference records into canonical k-mer keys,
//! optionally expands by Hamming/edit distance, and routes each key to its
//! owning shard (spec section 4.3).

use rayon::prelude::*;
use smallvec::SmallVec;

use crate::engine::alphabet::AlphabetConfig;
use crate::engine::config::IndexConfig;
use crate::engine::index::KmerIndex;
use crate::engine::kmer::{canonical_key, tag_length, RollingKmer};
use crate::engine::mutate::enumerate_substitutions;
use crate::engine::record::SeqRecord;
use crate::error::EngineError;

/// Ambiguous IUPAC nucleotide codes this builder knows how to expand when
/// `replicate_ambiguous` is enabled. Stop/gap codes are intentionally
/// excluded: they fall through to `forbid_n`/arbitrary-symbol handling.
const AMBIGUOUS_EXPANSIONS: &[(u8, &[u8])] = &[
    (b'R', &[b'A', b'G']),
    (b'Y', &[b'C', b'T']),
    (b'S', &[b'G', b'C']),
    (b'W', &[b'A', b'T']),
    (b'K', &[b'G', b'T']),
    (b'M', &[b'A', b'C']),
    (b'B', &[b'C', b'G', b'T']),
    (b'D', &[b'A', b'G', b'T']),
    (b'H', &[b'A', b'C', b'T']),
    (b'V', &[b'A', b'C', b'G']),
];

fn ambiguous_options(base: u8) -> Option<&'static [u8]> {
    AMBIGUOUS_EXPANSIONS
        .iter()
        .find(|(b, _)| b.eq_ignore_ascii_case(&base))
        .map(|(_, opts)| *opts)
}

/// Expand a reference sequence containing ambiguous bases into the
/// cross-product of unambiguous sequences (spec section 4.3,
/// "replicate-ambiguous policy"). Bounded to a sane number of variants to
/// avoid combinatorial blowup on heavily-degenerate input.
pub fn replicate_ambiguous(seq: &[u8], max_variants: usize) -> Vec<Vec<u8>> {
    let mut variants = vec![Vec::with_capacity(seq.len())];
    for &base in seq {
        let options = ambiguous_options(base);
        match options {
            None => {
                for v in variants.iter_mut() {
                    v.push(base);
                }
            }
            Some(opts) => {
                if variants.len() * opts.len() > max_variants {
                    // Give up expanding further; keep first option only for
                    // the remainder so the caller still gets one sequence.
                    for v in variants.iter_mut() {
                        v.push(opts[0]);
                    }
                    continue;
                }
                let mut next = Vec::with_capacity(variants.len() * opts.len());
                for v in &variants {
                    for &opt in opts {
                        let mut nv = v.clone();
                        nv.push(opt);
                        next.push(nv);
                    }
                }
                variants = next;
            }
        }
    }
    variants
}

/// Pure scan of one (possibly mutation-expanded) sequence into its seed
/// canonical keys -- full-length windows plus, when `useShortKmers` is on,
/// the left/right edge tail windows. No side effects: safe to call from any
/// thread, which is what makes the per-record build scan parallelizable.
fn collect_seed_keys(
    alphabet: &AlphabetConfig,
    cfg: &IndexConfig,
    rcomp: bool,
    mid_mask: u64,
    seq: &[u8],
    scaffold_id: i32,
    out: &mut Vec<(u64, usize, i32)>,
) {
    let mut roll = RollingKmer::new(alphabet, cfg.k);
    let mut short_rolls: SmallVec<[RollingKmer; 8]> = if cfg.use_short_kmers {
        (cfg.min_k..cfg.k).map(|len| RollingKmer::new(alphabet, len)).collect()
    } else {
        SmallVec::new()
    };

    let stride = cfg.max_skip.max(cfg.min_skip).max(1);
    for (pos, &base) in seq.iter().enumerate() {
        let full = roll.push(base, cfg.forbid_n);
        for r in short_rolls.iter_mut() {
            r.push(base, cfg.forbid_n);
        }
        if full && pos % stride == 0 {
            let key = canonical_key(alphabet, roll.forward(), roll.reverse(), cfg.k, rcomp, mid_mask);
            out.push((key, cfg.k, scaffold_id));
        }
    }

    if cfg.use_short_kmers {
        for len in cfg.min_k..cfg.k {
            if seq.len() < len {
                continue;
            }
            let mut r = RollingKmer::new(alphabet, len);
            for &b in &seq[..len] {
                r.push(b, cfg.forbid_n);
            }
            let key = canonical_key(alphabet, r.forward(), r.reverse(), len, rcomp, alphabet.length_mask(len));
            out.push((key, len, scaffold_id));

            let mut r2 = RollingKmer::new(alphabet, len);
            for &b in &seq[seq.len() - len..] {
                r2.push(b, cfg.forbid_n);
            }
            let key2 = canonical_key(alphabet, r2.forward(), r2.reverse(), len, rcomp, alphabet.length_mask(len));
            out.push((key2, len, scaffold_id));
        }
    }
}

#[derive(Debug)]
pub struct BuildStats {
    pub keys_installed: u64,
    pub scaffolds: u64,
}

/// Build a `KmerIndex` from a sequence of reference records and an optional
/// alternate set retried on total failure (spec section 4.3, "Failure").
pub struct IndexBuilder<'a> {
    index: &'a mut KmerIndex,
    alphabet: AlphabetConfig,
}

impl<'a> IndexBuilder<'a> {
    pub fn new(index: &'a mut KmerIndex) -> Self {
        let alphabet = index.alphabet.clone();
        IndexBuilder { index, alphabet }
    }

    /// Build from the primary set; if it installs zero keys and `alt` is
    /// provided, retry with `alt`. Returns an error if a k-mer mode is in
    /// use and both sets install zero keys (spec section 4.3/4.7 fatal
    /// behavior; the caller decides whether a k-mer mode is in use and
    /// whether to treat `ReferenceEmpty` as fatal).
    pub fn build(
        &mut self,
        primary: &[SeqRecord],
        alt: Option<&[SeqRecord]>,
    ) -> Result<BuildStats, EngineError> {
        let mut stats = self.build_from(primary);
        if stats.keys_installed == 0 {
            if let Some(alt) = alt {
                stats = self.build_from(alt);
                if stats.keys_installed == 0 {
                    return Err(EngineError::ReferenceEmpty {
                        tried_alternate: true,
                    });
                }
            }
        }
        Ok(stats)
    }

    /// Per-record sequence scan is embarrassingly parallel (each record's
    /// candidate keys are independent of every other record's), so the scan
    /// runs via `rayon::par_iter` over records -- the same coarse,
    /// per-input-unit granularity the teacher uses for its
    /// `chromosomes.par_iter().map(...).collect()` build. Only the
    /// resulting table inserts, which mutate shared shard state, run
    /// sequentially afterward.
    fn build_from(&mut self, records: &[SeqRecord]) -> BuildStats {
        let cfg = self.index.config.clone();
        let alphabet = self.alphabet.clone();
        let rcomp = cfg.rcomp;
        let mid_mask = self.index.mid_mask;

        // Sequential: scaffold ids must be assigned in input order.
        let scaffold_ids: Vec<i32> = records
            .iter()
            .map(|r| self.index.scaffolds.register(&r.id, r.len() as u64))
            .collect();
        let scaffolds = scaffold_ids.len() as u64;

        // Parallel: expand ambiguity and scan each record into seed keys.
        let per_record: Vec<Vec<(u64, usize, i32)>> = records
            .par_iter()
            .zip(scaffold_ids.par_iter())
            .map(|(record, &scaffold_id)| {
                let mut keys = Vec::new();
                if cfg.replicate_ambiguous && record.bases.iter().any(|&b| ambiguous_options(b).is_some()) {
                    for variant in replicate_ambiguous(&record.bases, 64) {
                        collect_seed_keys(&alphabet, &cfg, rcomp, mid_mask, &variant, scaffold_id, &mut keys);
                    }
                } else {
                    collect_seed_keys(&alphabet, &cfg, rcomp, mid_mask, &record.bases, scaffold_id, &mut keys);
                }
                keys
            })
            .collect();

        // Sequential: table inserts mutate shared shard state.
        let mut installed = 0u64;
        for keys in per_record {
            for (key, len, scaffold_id) in keys {
                installed += self.install_key(key, len, scaffold_id, &cfg);
            }
        }

        BuildStats {
            keys_installed: installed,
            scaffolds,
        }
    }

    fn install_key(&mut self, key: u64, len: usize, scaffold_id: i32, cfg: &IndexConfig) -> u64 {
        if self.index.speed_skips(key) {
            return 0;
        }
        let mut installed = self.index.table.set_if_absent(key, scaffold_id) as u64;

        let max_dist = cfg.hdist.max(cfg.edist);
        if max_dist > 0 {
            let tag = self.alphabet.length_tag_bit(len);
            let base = key & !tag;
            for variant in enumerate_substitutions(&self.alphabet, base, len, max_dist) {
                let vkey = tag_length(&self.alphabet, variant, len);
                if self.index.speed_skips(vkey) {
                    continue;
                }
                installed += self.index.table.set_if_absent(vkey, scaffold_id) as u64;
            }
        }
        installed
    }
}

/// Re-derive the canonical key for an arbitrary (possibly mutated) window,
/// exposed for tests and the scanner's short-kmer re-scan path.
pub fn canonical_for_len(alphabet: &AlphabetConfig, fwd: u64, rev: u64, len: usize, rcomp: bool) -> u64 {
    canonical_key(alphabet, fwd, rev, len, rcomp, alphabet.length_mask(len))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::alphabet::Alphabet;
    use crate::engine::table::ShardedTable;

    fn new_index(cfg: IndexConfig) -> KmerIndex {
        let alphabet = AlphabetConfig::new(cfg.alphabet);
        let table = ShardedTable::new(cfg.ways, 16);
        KmerIndex::new(cfg, alphabet, table)
    }

    #[test]
    fn builds_from_simple_reference() {
        let cfg = IndexConfig {
            k: 4,
            rcomp: true,
            ..IndexConfig::default()
        };
        let mut index = new_index(cfg);
        let mut builder = IndexBuilder::new(&mut index);
        let records = vec![SeqRecord::new("ref1", "ACGT".as_bytes().to_vec())];
        let stats = builder.build(&records, None).unwrap();
        assert_eq!(stats.keys_installed, 1);
        assert!(!index.table.is_empty());
    }

    #[test]
    fn empty_primary_falls_back_to_alternate() {
        let cfg = IndexConfig {
            k: 4,
            ..IndexConfig::default()
        };
        let mut index = new_index(cfg);
        let mut builder = IndexBuilder::new(&mut index);
        let empty: Vec<SeqRecord> = vec![];
        let alt = vec![SeqRecord::new("alt", "ACGTACGT".as_bytes().to_vec())];
        let stats = builder.build(&empty, Some(&alt)).unwrap();
        assert!(stats.keys_installed > 0);
    }

    #[test]
    fn both_empty_is_reference_empty_error() {
        let cfg = IndexConfig {
            k: 4,
            ..IndexConfig::default()
        };
        let mut index = new_index(cfg);
        let mut builder = IndexBuilder::new(&mut index);
        let empty: Vec<SeqRecord> = vec![];
        let err = builder.build(&empty, Some(&empty)).unwrap_err();
        assert!(matches!(err, EngineError::ReferenceEmpty { .. }));
    }

    #[test]
    fn replicate_ambiguous_expands_cross_product() {
        let variants = replicate_ambiguous(b"ARC", 64);
        // R -> {A, G}: two variants, "AAC" and "AGC".
        assert_eq!(variants.len(), 2);
        assert!(variants.contains(&b"AAC".to_vec()));
        assert!(variants.contains(&b"AGC".to_vec()));
    }

    #[test]
    fn hdist_expansion_inserts_each_variant_at_most_once() {
        let cfg = IndexConfig {
            k: 4,
            hdist: 1,
            rcomp: false,
            ..IndexConfig::default()
        };
        let mut index = new_index(cfg);
        let mut builder = IndexBuilder::new(&mut index);
        let records = vec![SeqRecord::new("ref1", "ACGT".as_bytes().to_vec())];
        builder.build(&records, None).unwrap();
        // Re-running set_if_absent for the same variants must be a no-op:
        // total installed count already reflects idempotent absorption.
        let before = index.table.len();
        let mut builder2 = IndexBuilder::new(&mut index);
        builder2.build(&records, None).unwrap();
        assert_eq!(index.table.len(), before);
    }
}
