//! Scaffold registry and the read-only query surface over a built k-mer
//! table (spec sections 3 and 4.4).

use std::sync::atomic::{AtomicU64, Ordering};

use crate::engine::alphabet::AlphabetConfig;
use crate::engine::config::IndexConfig;
use crate::engine::kmer::{canonical_key, middle_mask};
use crate::engine::mutate::enumerate_substitutions;
use crate::engine::table::ShardedTable;

/// One reference record's registered metadata. Index 0 is the reserved
/// empty entry per spec section 3.
#[derive(Debug, Clone)]
pub struct ScaffoldInfo {
    pub name: String,
    pub length: u64,
}

/// Append-only scaffold registry plus shared per-scaffold hit counters.
pub struct ScaffoldRegistry {
    scaffolds: Vec<ScaffoldInfo>,
    reads_hit: Vec<AtomicU64>,
    bases_hit: Vec<AtomicU64>,
}

impl ScaffoldRegistry {
    pub fn new() -> Self {
        ScaffoldRegistry {
            scaffolds: vec![ScaffoldInfo {
                name: String::new(),
                length: 0,
            }],
            reads_hit: vec![AtomicU64::new(0)],
            bases_hit: vec![AtomicU64::new(0)],
        }
    }

    /// Register a new scaffold, returning its id.
    pub fn register(&mut self, name: impl Into<String>, length: u64) -> i32 {
        let id = self.scaffolds.len() as i32;
        self.scaffolds.push(ScaffoldInfo {
            name: name.into(),
            length,
        });
        self.reads_hit.push(AtomicU64::new(0));
        self.bases_hit.push(AtomicU64::new(0));
        id
    }

    pub fn len(&self) -> usize {
        self.scaffolds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scaffolds.len() <= 1
    }

    pub fn name(&self, id: i32) -> &str {
        &self.scaffolds[id as usize].name
    }

    pub fn record_hit(&self, id: i32, bases: u64) {
        if id <= 0 {
            return;
        }
        self.reads_hit[id as usize].fetch_add(1, Ordering::Relaxed);
        self.bases_hit[id as usize].fetch_add(bases, Ordering::Relaxed);
    }

    pub fn reads_hit(&self, id: i32) -> u64 {
        self.reads_hit[id as usize].load(Ordering::Relaxed)
    }

    pub fn bases_hit(&self, id: i32) -> u64 {
        self.bases_hit[id as usize].load(Ordering::Relaxed)
    }
}

impl Default for ScaffoldRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// The built, read-only k-mer index: shards plus scaffold registry plus the
/// config that built them. Safe for concurrent read access by every worker
/// once build has completed (spec section 5).
pub struct KmerIndex {
    pub config: IndexConfig,
    pub alphabet: AlphabetConfig,
    pub table: ShardedTable,
    pub scaffolds: ScaffoldRegistry,
    pub mid_mask: u64,
}

impl KmerIndex {
    pub fn new(config: IndexConfig, alphabet: AlphabetConfig, table: ShardedTable) -> Self {
        let m = config.effective_mid_mask_len();
        let mid_mask = middle_mask(&alphabet, config.k, m);
        KmerIndex {
            config,
            alphabet,
            table,
            scaffolds: ScaffoldRegistry::new(),
            mid_mask,
        }
    }

    /// Build the canonical key for a full-length (`k`) forward/reverse pair.
    pub fn canonical_full(&self, fwd: u64, rev: u64) -> u64 {
        canonical_key(
            &self.alphabet,
            fwd,
            rev,
            self.config.k,
            self.config.rcomp,
            self.mid_mask,
        )
    }

    /// Build the canonical key for a short (tail) k-mer of length `len < k`,
    /// which gets its own length tag and is not middle-masked (short
    /// k-mers are too narrow for a meaningful central wildcard).
    pub fn canonical_short(&self, fwd: u64, rev: u64, len: usize) -> u64 {
        canonical_key(
            &self.alphabet,
            fwd,
            rev,
            len,
            self.config.rcomp,
            self.alphabet.length_mask(len),
        )
    }

    /// Speed gate: a probabilistic key-skip lever (spec section 4.3/4.4).
    /// `speed in 0..=16`; larger values skip a larger fraction of keys.
    /// Documented as preserving correctness only probabilistically -- tests
    /// that need completeness must set `speed = 0`.
    #[inline]
    pub fn speed_skips(&self, key: u64) -> bool {
        self.config.speed > 0 && (key & i64::MAX as u64) % 17 < self.config.speed as u64
    }

    /// Core query primitive (spec section 4.4): look up a full-length
    /// canonical key, retrying with Hamming-distance substitutions on miss.
    pub fn query(&self, fwd: u64, rev: u64, q_hdist: usize) -> i32 {
        let key = self.canonical_full(fwd, rev);
        self.query_key(key, self.config.k, q_hdist)
    }

    /// Query surface for short (tail) k-mers, using `qhdist2` per spec.
    pub fn query_short(&self, fwd: u64, rev: u64, len: usize, q_hdist2: usize) -> i32 {
        let key = self.canonical_short(fwd, rev, len);
        self.query_key(key, len, q_hdist2)
    }

    fn query_key(&self, key: u64, len: usize, q_hdist: usize) -> i32 {
        if self.speed_skips(key) {
            return -1;
        }
        let hit = self.table.get(key);
        if hit >= 0 || q_hdist == 0 {
            return hit;
        }
        // Hamming-distance retry: strip the length tag, mutate, retag.
        let tag = self.alphabet.length_tag_bit(len);
        let base = key & !tag;
        for variant in enumerate_substitutions(&self.alphabet, base, len, q_hdist) {
            let candidate = variant | tag;
            if self.speed_skips(candidate) {
                continue;
            }
            let hit = self.table.get(candidate);
            if hit >= 0 {
                return hit;
            }
        }
        -1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::alphabet::Alphabet;

    fn make_index(k: usize, ways: usize) -> KmerIndex {
        let alphabet = AlphabetConfig::new(Alphabet::Nucleotide);
        let config = IndexConfig {
            k,
            ways,
            ..IndexConfig::default()
        };
        let table = ShardedTable::new(ways, 16);
        KmerIndex::new(config, alphabet, table)
    }

    #[test]
    fn query_miss_on_empty_index_returns_negative_one() {
        let idx = make_index(4, 7);
        assert_eq!(idx.query(0, 0, 0), -1);
    }

    #[test]
    fn scaffold_zero_is_reserved_empty() {
        let reg = ScaffoldRegistry::new();
        assert_eq!(reg.name(0), "");
        assert_eq!(reg.len(), 1);
        assert!(reg.is_empty());
    }

    #[test]
    fn register_assigns_sequential_ids() {
        let mut reg = ScaffoldRegistry::new();
        let a = reg.register("chr1", 100);
        let b = reg.register("chr2", 200);
        assert_eq!(a, 1);
        assert_eq!(b, 2);
        assert!(!reg.is_empty());
    }

    #[test]
    fn query_hdist_retry_finds_substitution_variant() {
        let mut idx = make_index(4, 7);
        idx.scaffolds.register("ref", 4);
        let key = idx.canonical_full(0b11_10_01_00, 0); // some 4-mer, rcomp disabled path
        idx.table.set_if_absent(key, 1);
        // Mutate one base away and ensure qhdist=1 finds it.
        let mutated_fwd = 0b11_10_01_01; // differs in lowest symbol
        assert_eq!(idx.query(mutated_fwd, 0, 0), -1);
        assert_eq!(idx.query(mutated_fwd, 0, 1), 1);
    }
}
