//! Immutable run configuration shared by the builder, index, scanner and
//! pipeline. Built once from CLI options (or programmatically) and never
//! mutated afterwards, per spec section 3's "Index config (immutable after
//! build)" and design note 1 ("no global mutable state survives build").

use crate::engine::alphabet::Alphabet;
use anyhow::{bail, Result};

/// Mutually-exclusive k-mer phase behaviors (spec section 4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KmerMode {
    /// Filter-by-count or filter-by-coverage (the default when no
    /// trim/mask/split flag is set).
    Filter,
    FindBestMatch,
    TrimLeft,
    TrimRight,
    TrimBoth,
    MaskN,
    Split,
}

/// Index-build/query configuration, per spec section 3 "Index config".
#[derive(Debug, Clone)]
pub struct IndexConfig {
    pub alphabet: Alphabet,
    pub k: usize,
    pub min_k: usize,
    pub rcomp: bool,
    pub forbid_n: bool,
    pub mid_mask_len: Option<usize>, // None = auto
    pub hdist: usize,
    pub edist: usize,
    pub q_hdist: usize,
    pub q_hdist2: usize,
    pub ways: usize,
    pub speed: u32,
    pub min_skip: usize,
    pub max_skip: usize,
    pub replicate_ambiguous: bool,
    pub use_short_kmers: bool,
}

impl Default for IndexConfig {
    fn default() -> Self {
        IndexConfig {
            alphabet: Alphabet::Nucleotide,
            k: 31,
            min_k: 6,
            rcomp: true,
            forbid_n: false,
            mid_mask_len: None,
            hdist: 0,
            edist: 0,
            q_hdist: 0,
            q_hdist2: 0,
            ways: 7,
            speed: 0,
            min_skip: 1,
            max_skip: 1,
            replicate_ambiguous: false,
            use_short_kmers: false,
        }
    }
}

impl IndexConfig {
    pub fn validate(&self) -> Result<()> {
        if self.k == 0 {
            bail!("k must be positive");
        }
        if self.k > self.alphabet.max_k() {
            bail!(
                "k={} exceeds max k={} for this alphabet",
                self.k,
                self.alphabet.max_k()
            );
        }
        if self.use_short_kmers && self.min_k > self.k {
            bail!("mink ({}) must be <= k ({})", self.min_k, self.k);
        }
        if self.ways == 0 {
            bail!("ways must be >= 1");
        }
        if self.speed > 16 {
            bail!("speed must be in 0..=16");
        }
        if self.min_skip == 0 || self.max_skip < self.min_skip {
            bail!("invalid skip/minSkip/maxSkip configuration");
        }
        Ok(())
    }

    pub fn effective_mid_mask_len(&self) -> usize {
        match self.mid_mask_len {
            Some(m) => m,
            None => crate::engine::kmer::default_middle_mask_len(self.k, false),
        }
    }
}

/// Position-range restriction for the read scanner (spec section 4.5).
#[derive(Debug, Clone, Copy, Default)]
pub struct PositionRestriction {
    pub restrict_left: usize,
    pub restrict_right: usize,
}

impl PositionRestriction {
    /// `[startR, stopL)` scan window for a read of length `l`.
    pub fn window(&self, l: usize) -> (usize, usize) {
        let start_r = if self.restrict_right > 0 {
            l.saturating_sub(self.restrict_right)
        } else {
            0
        };
        let stop_l = if self.restrict_left > 0 {
            l.min(self.restrict_left)
        } else {
            l
        };
        (start_r, stop_l)
    }
}

/// Thresholds driving the six filter-vs-trim-vs-mask-vs-split k-mer-phase
/// modes (spec section 4.5), plus shared trim padding/exclusivity options.
#[derive(Debug, Clone)]
pub struct KmerPhaseConfig {
    pub mode: KmerMode,
    /// When `mode == Filter`, selects filter-by-coverage (true) over the
    /// default filter-by-count (false) -- spec section 4.5, filter
    /// sub-variants 1 and 2.
    pub use_coverage_filter: bool,
    pub trim_pad: usize,
    pub ktrim_exclusive: bool,
    pub mask_symbol: u8,
    pub kmask_lowercase: bool,
    pub kmask_fully_covered: bool,
    pub min_read_length: usize,
    pub max_bad_kmers: usize,
    pub min_kmer_fraction: f64,
    pub min_covered_fraction: f64,
    pub rename: bool,
    pub restriction: PositionRestriction,
}

impl Default for KmerPhaseConfig {
    fn default() -> Self {
        KmerPhaseConfig {
            mode: KmerMode::Filter,
            use_coverage_filter: false,
            trim_pad: 0,
            ktrim_exclusive: false,
            mask_symbol: b'N',
            kmask_lowercase: false,
            kmask_fully_covered: false,
            min_read_length: 1,
            max_bad_kmers: 0,
            min_kmer_fraction: 0.0,
            min_covered_fraction: 0.0,
            rename: false,
            restriction: PositionRestriction::default(),
        }
    }
}

/// Validate the mutual exclusivity called out in spec section 7
/// (Configuration error taxonomy): `ksplit` and any `ktrim*`/mask mode
/// cannot both be selected. `KmerMode` already encodes "pick one", but CLI
/// parsing constructs this from several boolean flags, so the check is
/// re-exposed here for that assembly step.
pub fn validate_kmer_mode_flags(
    ktrim_left: bool,
    ktrim_right: bool,
    ktrim_n: bool,
    ksplit: bool,
    find_best_match: bool,
) -> Result<KmerMode> {
    let trim_tip = ktrim_left || ktrim_right;
    let flags = [trim_tip, ktrim_n, ksplit, find_best_match];
    let chosen = flags.iter().filter(|&&f| f).count();
    if chosen > 1 {
        bail!("ktrimLeft/ktrimRight/ktrimN/ksplit/findBestMatch are mutually exclusive");
    }
    Ok(if ktrim_left && ktrim_right {
        KmerMode::TrimBoth
    } else if ktrim_left {
        KmerMode::TrimLeft
    } else if ktrim_right {
        KmerMode::TrimRight
    } else if ktrim_n {
        KmerMode::MaskN
    } else if ksplit {
        KmerMode::Split
    } else if find_best_match {
        KmerMode::FindBestMatch
    } else {
        KmerMode::Filter
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn position_restriction_defaults_to_full_read() {
        let r = PositionRestriction::default();
        assert_eq!(r.window(100), (0, 100));
    }

    #[test]
    fn position_restriction_narrows_window() {
        let r = PositionRestriction {
            restrict_left: 20,
            restrict_right: 10,
        };
        assert_eq!(r.window(100), (90, 20));
    }

    #[test]
    fn conflicting_kmer_modes_rejected() {
        assert!(validate_kmer_mode_flags(true, false, false, true, false).is_err());
    }

    #[test]
    fn ktrim_left_and_right_together_means_trim_both() {
        let mode = validate_kmer_mode_flags(true, true, false, false, false).unwrap();
        assert_eq!(mode, KmerMode::TrimBoth);
    }
}
