//! Command-line options for the `bbduk` binary.

use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Parser;

use crate::engine::alphabet::Alphabet;
use crate::engine::config::{validate_kmer_mode_flags, IndexConfig, KmerMode, KmerPhaseConfig, PositionRestriction};
use crate::engine::filters::FilterConfig;
use crate::engine::pipeline::{EntropyTrimConfig, ForceTrimConfig, PipelineConfig, PolymerConfig, QualityTrimConfig, SwiftTrimConfig};
use crate::engine::trim::PolymerBase;

/// K-mer–based sequence filtering and trimming engine for short-read data.
#[derive(Parser)]
#[command(
    name = "bbduk",
    about = "Filter, trim, and mask reads against a k-mer reference index",
    long_about = "Filter, trim, and mask reads against a k-mer reference index.

EXAMPLES:
    // Adapter trimming
    $ bbduk --in reads.fq --out clean.fq --ref adapters.fa --ktrim-right -k 23 --mink 11 --hdist 1

    // Contaminant filtering
    $ bbduk --in reads.fq --out clean.fq --outm matched.fq --ref contaminants.fa -k 31",
    version
)]
pub struct Cli {
    /// Input read file(s) [path]
    #[clap(long = "in", value_parser, required = true, help_heading = "I/O")]
    pub input: PathBuf,

    /// Second input file for paired reads [path]
    #[clap(long = "in2", value_parser, help_heading = "I/O")]
    pub input2: Option<PathBuf>,

    /// Reference (adapter/contaminant) file(s) [path]
    #[clap(long = "ref", value_parser, num_args = 1.., help_heading = "I/O")]
    pub reference: Vec<PathBuf>,

    /// Alternate reference, used only if the primary installs zero keys [path]
    #[clap(long = "refalt", value_parser, help_heading = "I/O")]
    pub reference_alt: Option<PathBuf>,

    /// Unmatched (kept) output file [path]
    #[clap(long = "out", value_parser, required = true, help_heading = "I/O")]
    pub out_unmatched: PathBuf,

    /// Second unmatched output for paired reads [path]
    #[clap(long = "out2", value_parser, help_heading = "I/O")]
    pub out_unmatched2: Option<PathBuf>,

    /// Matched (rejected) output file [path]
    #[clap(long = "outm", value_parser, help_heading = "I/O")]
    pub out_matched: Option<PathBuf>,

    /// Singleton output (one mate kept, one discarded) [path]
    #[clap(long = "outs", value_parser, help_heading = "I/O")]
    pub out_singleton: Option<PathBuf>,

    /// Preserve input order on output [flag]
    #[clap(long, default_value_t = true, help_heading = "I/O")]
    pub ordered: bool,

    /// Worker thread count [integer]
    #[clap(short = 't', long = "threads", default_value_t = 1, help_heading = "Core")]
    pub threads: usize,

    /// K-mer length [integer]
    #[clap(short = 'k', long, default_value_t = 31, help_heading = "Core")]
    pub k: usize,

    /// Shortest tail k-mer when useShortKmers is on [integer]
    #[clap(long = "mink", default_value_t = 6, help_heading = "Core")]
    pub min_k: usize,

    /// Use amino acid (21-symbol) alphabet instead of nucleotide [flag]
    #[clap(long, help_heading = "Core")]
    pub amino: bool,

    /// Canonicalize via reverse complement [flag]
    #[clap(long, default_value_t = true, help_heading = "Core")]
    pub rcomp: bool,

    /// Center wildcard width; omit for automatic selection
    #[clap(long = "mm", help_heading = "Core")]
    pub mid_mask_len: Option<usize>,

    /// Build-time Hamming distance for seed expansion [integer]
    #[clap(long, default_value_t = 0, help_heading = "Core")]
    pub hdist: usize,

    /// Build-time edit distance for seed expansion [integer]
    #[clap(long, default_value_t = 0, help_heading = "Core")]
    pub edist: usize,

    /// Query-time Hamming distance for full-length k-mers [integer]
    #[clap(long, default_value_t = 0, help_heading = "Core")]
    pub qhdist: usize,

    /// Query-time Hamming distance for short tail k-mers [integer]
    #[clap(long, default_value_t = 0, help_heading = "Core")]
    pub qhdist2: usize,

    /// Shard count for the k-mer table [integer]
    #[clap(long, default_value_t = 7, help_heading = "Core")]
    pub ways: usize,

    /// Probabilistic key-skip lever, 0..16 [integer]
    #[clap(long, default_value_t = 0, help_heading = "Core")]
    pub speed: u32,

    /// Minimum k-mer stride during build [integer]
    #[clap(long = "minskip", default_value_t = 1, help_heading = "Core")]
    pub min_skip: usize,

    /// Maximum k-mer stride during build [integer]
    #[clap(long = "maxskip", default_value_t = 1, help_heading = "Core")]
    pub max_skip: usize,

    /// Ambiguous symbol aborts the current k-mer window [flag]
    #[clap(long, help_heading = "Core")]
    pub forbid_n: bool,

    /// Expand ambiguous reference bases into the unambiguous cross-product [flag]
    #[clap(long, help_heading = "Core")]
    pub replicate_ambiguous: bool,

    /// Re-scan read edges with shortening k-mers when trimming [flag]
    #[clap(long, help_heading = "Core")]
    pub use_short_kmers: bool,

    /// Trim from the left on the first hit [flag]
    #[clap(long, conflicts_with_all = ["ktrim_n", "ksplit", "find_best_match"], help_heading = "K-mer mode (select one, left/right may combine)")]
    pub ktrim_left: bool,

    /// Trim from the right on the first hit [flag]
    #[clap(long, conflicts_with_all = ["ktrim_n", "ksplit", "find_best_match"], help_heading = "K-mer mode (select one, left/right may combine)")]
    pub ktrim_right: bool,

    /// Mask hit windows with a fixed symbol instead of trimming [flag]
    #[clap(long, conflicts_with_all = ["ktrim_left", "ktrim_right", "ksplit", "find_best_match"], help_heading = "K-mer mode (select one, left/right may combine)")]
    pub ktrim_n: bool,

    /// Emit maximal unmasked fragments instead of trimming [flag]
    #[clap(long, conflicts_with_all = ["ktrim_left", "ktrim_right", "ktrim_n", "find_best_match"], help_heading = "K-mer mode (select one, left/right may combine)")]
    pub ksplit: bool,

    /// Classify by best-matching scaffold instead of filtering [flag]
    #[clap(long, conflicts_with_all = ["ktrim_left", "ktrim_right", "ktrim_n", "ksplit"], help_heading = "K-mer mode (select one, left/right may combine)")]
    pub find_best_match: bool,

    /// Filter by covered-base fraction instead of hit count [flag]
    #[clap(long, help_heading = "K-mer mode (select one)")]
    pub use_coverage_filter: bool,

    /// Annotate read id with the winning scaffold (findBestMatch mode) [flag]
    #[clap(long, help_heading = "K-mer mode (select one)")]
    pub rename: bool,

    /// Trim inclusive (false, default) vs exclusive of the hit k-mer [flag]
    #[clap(long, help_heading = "Trim/mask")]
    pub ktrim_exclusive: bool,

    /// Extra bases to trim/mask on each side of a hit [integer]
    #[clap(long, default_value_t = 0, help_heading = "Trim/mask")]
    pub trim_pad: usize,

    /// Lowercase masked bases instead of overwriting with a fixed symbol [flag]
    #[clap(long, help_heading = "Trim/mask")]
    pub kmask_lowercase: bool,

    /// Invert mask semantics: keep only matched regions [flag]
    #[clap(long, help_heading = "Trim/mask")]
    pub kmask_fully_covered: bool,

    /// Restrict k-mer scanning to the first N bases [integer]
    #[clap(long, default_value_t = 0, help_heading = "Trim/mask")]
    pub restrict_left: usize,

    /// Restrict k-mer scanning to the last N bases [integer]
    #[clap(long, default_value_t = 0, help_heading = "Trim/mask")]
    pub restrict_right: usize,

    /// Minimum fraction of k-mers that must hit to discard (filter-by-count) [float]
    #[clap(long, default_value_t = 0.0, help_heading = "Filter thresholds")]
    pub min_kmer_fraction: f64,

    /// Absolute hit-count threshold to discard (filter-by-count) [integer]
    #[clap(long, default_value_t = 0, help_heading = "Filter thresholds")]
    pub max_bad_kmers: usize,

    /// Minimum covered-base fraction to discard (filter-by-coverage) [float]
    #[clap(long, default_value_t = 0.0, help_heading = "Filter thresholds")]
    pub min_covered_fraction: f64,

    /// Hard-crop this many bases from the read's left end [integer]
    #[clap(long, default_value_t = 0, help_heading = "Force-trim")]
    pub force_trim_left: usize,

    /// Hard-crop this many bases from the read's right end [integer]
    #[clap(long, default_value_t = 0, help_heading = "Force-trim")]
    pub force_trim_right: usize,

    /// Crop the remainder to the largest multiple of this value [integer]
    #[clap(long, default_value_t = 0, help_heading = "Force-trim")]
    pub force_trim_modulo: usize,

    /// Minimum surviving read length [integer]
    #[clap(long, default_value_t = 1, help_heading = "Final filters")]
    pub min_length: usize,

    /// Maximum surviving read length [integer]
    #[clap(long, help_heading = "Final filters")]
    pub max_length: Option<usize>,

    /// Minimum average Phred quality [float]
    #[clap(long, help_heading = "Final filters")]
    pub min_avg_quality: Option<f64>,

    /// Minimum per-base Phred quality [integer]
    #[clap(long, help_heading = "Final filters")]
    pub min_base_quality: Option<u8>,

    /// Maximum number of N bases [integer]
    #[clap(long, help_heading = "Final filters")]
    pub max_ns: Option<usize>,

    /// Minimum GC fraction [float]
    #[clap(long, help_heading = "Final filters")]
    pub min_gc: Option<f64>,

    /// Maximum GC fraction [float]
    #[clap(long, help_heading = "Final filters")]
    pub max_gc: Option<f64>,

    /// Minimum length of the longest same-base run [integer]
    #[clap(long, help_heading = "Final filters")]
    pub min_consecutive_bases: Option<usize>,

    /// Minimum per-base nucleotide frequency [float]
    #[clap(long, help_heading = "Final filters")]
    pub min_base_frequency: Option<f64>,

    /// Standalone entropy cutoff [float]
    #[clap(long, help_heading = "Final filters")]
    pub entropy_cutoff: Option<f64>,

    /// K-mer width used by entropy calculations [integer]
    #[clap(long, default_value_t = 5, help_heading = "Final filters")]
    pub entropy_k: usize,

    /// Reject reads flagged by the instrument's chastity/purity bit [flag]
    #[clap(long, help_heading = "Final filters")]
    pub chastity_filter: bool,

    /// Quality trim threshold; 0 disables [integer]
    #[clap(long = "qtrim", default_value_t = 0, help_heading = "Secondary trim")]
    pub qtrim: u8,

    /// Quality-trim the left end [flag]
    #[clap(long, help_heading = "Secondary trim")]
    pub qtrim_left: bool,

    /// Quality-trim the right end [flag]
    #[clap(long, help_heading = "Secondary trim")]
    pub qtrim_right: bool,

    /// Minimum poly-A/G/C run length to trim
    #[clap(long, help_heading = "Secondary trim")]
    pub polymer_min_run: Option<usize>,

    /// Non-poly bases tolerated inside the run [integer]
    #[clap(long, default_value_t = 0, help_heading = "Secondary trim")]
    pub polymer_max_non_poly: usize,

    /// Sliding-window entropy trim cutoff [float]
    #[clap(long, help_heading = "Secondary trim")]
    pub entropy_trim_cutoff: Option<f64>,

    /// Mask low-entropy windows instead of trimming [flag]
    #[clap(long, help_heading = "Secondary trim")]
    pub entropy_mask: bool,

    /// Entropy trim/mask sliding-window width [integer]
    #[clap(long, default_value_t = 50, help_heading = "Secondary trim")]
    pub entropy_window: usize,

    /// Minimum overlap length for paired overlap-trim [integer]
    #[clap(long, default_value_t = 12, help_heading = "Overlap")]
    pub min_overlap: usize,

    /// Maximum mismatch fraction tolerated within the overlap [float]
    #[clap(long, default_value_t = 0.05, help_heading = "Overlap")]
    pub overlap_max_mismatch_fraction: f64,

    /// Attempt paired overlap detection and trim overhangs [flag]
    #[clap(long, help_heading = "Overlap")]
    pub overlap_trim: bool,

    /// If either mate is discarded, discard the whole pair [flag]
    #[clap(long, help_heading = "Pairing")]
    pub remove_pairs_if_either_bad: bool,

    /// Emit fully-discarded pairs truncated to a 1-base placeholder [flag]
    #[clap(long, help_heading = "Pairing")]
    pub trim_failures_to_1bp: bool,

    /// Quality quantization bin size; 0 or 1 disables [integer]
    #[clap(long, default_value_t = 0, help_heading = "Output")]
    pub quality_quantize_bin: u8,

    /// Verbose (debug-level) logging [flag]
    #[clap(short = 'v', long, help_heading = "Logging")]
    pub verbose: bool,
}

impl Cli {
    pub fn alphabet(&self) -> Alphabet {
        if self.amino {
            Alphabet::Amino
        } else {
            Alphabet::Nucleotide
        }
    }

    pub fn kmer_mode(&self) -> Result<KmerMode> {
        validate_kmer_mode_flags(self.ktrim_left, self.ktrim_right, self.ktrim_n, self.ksplit, self.find_best_match)
    }

    pub fn index_config(&self) -> Result<IndexConfig> {
        let cfg = IndexConfig {
            alphabet: self.alphabet(),
            k: self.k,
            min_k: self.min_k,
            rcomp: self.rcomp,
            forbid_n: self.forbid_n,
            mid_mask_len: self.mid_mask_len,
            hdist: self.hdist,
            edist: self.edist,
            q_hdist: self.qhdist,
            q_hdist2: self.qhdist2,
            ways: self.ways,
            speed: self.speed,
            min_skip: self.min_skip.max(1),
            max_skip: self.max_skip.max(self.min_skip).max(1),
            replicate_ambiguous: self.replicate_ambiguous,
            use_short_kmers: self.use_short_kmers,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn kmer_phase_config(&self) -> Result<Option<KmerPhaseConfig>> {
        let has_mode_flag = self.ktrim_left
            || self.ktrim_right
            || self.ktrim_n
            || self.ksplit
            || self.find_best_match
            || !self.reference.is_empty();
        if !has_mode_flag {
            return Ok(None);
        }
        let mode = self.kmer_mode()?;
        Ok(Some(KmerPhaseConfig {
            mode,
            use_coverage_filter: self.use_coverage_filter,
            trim_pad: self.trim_pad,
            ktrim_exclusive: self.ktrim_exclusive,
            mask_symbol: b'N',
            kmask_lowercase: self.kmask_lowercase,
            kmask_fully_covered: self.kmask_fully_covered,
            min_read_length: self.min_length,
            max_bad_kmers: self.max_bad_kmers,
            min_kmer_fraction: self.min_kmer_fraction,
            min_covered_fraction: self.min_covered_fraction,
            rename: self.rename,
            restriction: PositionRestriction {
                restrict_left: self.restrict_left,
                restrict_right: self.restrict_right,
            },
        }))
    }

    fn initial_filter_config(&self) -> FilterConfig {
        FilterConfig {
            min_length: 1,
            max_length: None,
            min_avg_quality: None,
            min_base_quality: None,
            max_ns: None,
            min_gc: self.min_gc,
            max_gc: self.max_gc,
            min_consecutive_bases: None,
            min_base_frequency: None,
            entropy_cutoff: None,
            entropy_k: self.entropy_k,
            chastity_filter: self.chastity_filter,
        }
    }

    fn final_filter_config(&self) -> FilterConfig {
        FilterConfig {
            min_length: self.min_length,
            max_length: self.max_length,
            min_avg_quality: self.min_avg_quality,
            min_base_quality: self.min_base_quality,
            max_ns: self.max_ns,
            min_gc: None,
            max_gc: None,
            min_consecutive_bases: self.min_consecutive_bases,
            min_base_frequency: self.min_base_frequency,
            entropy_cutoff: self.entropy_cutoff,
            entropy_k: self.entropy_k,
            chastity_filter: false,
        }
    }

    fn polymer_configs(&self) -> Vec<PolymerConfig> {
        let Some(min_run) = self.polymer_min_run else {
            return Vec::new();
        };
        [
            PolymerBase::PolyALeft,
            PolymerBase::PolyGLeft,
            PolymerBase::PolyGRight,
            PolymerBase::PolyCLeft,
            PolymerBase::PolyCRight,
        ]
        .into_iter()
        .map(|base| PolymerConfig {
            base,
            min_run,
            max_non_poly: self.polymer_max_non_poly,
        })
        .collect()
    }

    pub fn pipeline_config(&self) -> Result<PipelineConfig> {
        if self.force_trim_modulo == 1 {
            bail!("forceTrimModulo must be 0 (disabled) or >= 2");
        }
        Ok(PipelineConfig {
            force_trim: ForceTrimConfig {
                left: self.force_trim_left,
                right: self.force_trim_right,
                right2: 0,
                modulo: self.force_trim_modulo,
            },
            initial_filters: self.initial_filter_config(),
            kmer_phase: self.kmer_phase_config()?,
            min_overlap: self.min_overlap,
            overlap_max_mismatch_fraction: self.overlap_max_mismatch_fraction,
            overlap_trim: self.overlap_trim,
            polymer: self.polymer_configs(),
            entropy: EntropyTrimConfig {
                enabled: self.entropy_trim_cutoff.is_some(),
                mask_only: self.entropy_mask,
                k: self.entropy_k,
                cutoff: self.entropy_trim_cutoff.unwrap_or(0.0),
                window: self.entropy_window,
            },
            quality: QualityTrimConfig {
                enabled: self.qtrim > 0,
                trim_q: self.qtrim,
                left: self.qtrim_left,
                right: self.qtrim_right || !self.qtrim_left,
            },
            swift: SwiftTrimConfig::default(),
            final_filters: self.final_filter_config(),
            quality_quantize_bin: self.quality_quantize_bin,
            remove_pairs_if_either_bad: self.remove_pairs_if_either_bad,
            trim_failures_to_1bp: self.trim_failures_to_1bp,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_parse_with_required_args() {
        let cli = Cli::parse_from(["bbduk", "--in", "reads.fq", "--out", "out.fq"]);
        assert_eq!(cli.k, 31);
        assert_eq!(cli.ways, 7);
        assert!(cli.rcomp);
    }

    #[test]
    fn conflicting_kmer_mode_flags_rejected_by_clap() {
        let result = Cli::try_parse_from(["bbduk", "--in", "r.fq", "--out", "o.fq", "--ktrim-left", "--ksplit"]);
        assert!(result.is_err());
    }

    #[test]
    fn ktrim_left_and_right_together_accepted_by_clap() {
        let result = Cli::try_parse_from(["bbduk", "--in", "r.fq", "--out", "o.fq", "--ktrim-left", "--ktrim-right"]);
        assert!(result.is_ok());
    }

    #[test]
    fn index_config_validates_k_bounds() {
        let cli = Cli::parse_from(["bbduk", "--in", "r.fq", "--out", "o.fq", "-k", "40"]);
        assert!(cli.index_config().is_err());
    }
}
