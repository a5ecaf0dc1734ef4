//! Per-phase read/base discard counters, merged across worker threads at
//! the end of a run. Grounded on the teacher's `cli/counters.rs` tally
//! struct, generalized from a single count to a per-phase breakdown.

use std::ops::AddAssign;

/// Reads and bases removed (or retained) by one pipeline phase.
#[derive(Debug, Clone, Copy, Default)]
pub struct Tally {
    pub reads: u64,
    pub bases: u64,
}

impl Tally {
    pub fn add(&mut self, reads: u64, bases: u64) {
        self.reads += reads;
        self.bases += bases;
    }
}

impl AddAssign for Tally {
    fn add_assign(&mut self, other: Tally) {
        self.reads += other.reads;
        self.bases += other.bases;
    }
}

/// Per-thread run statistics, merged into a single report at shutdown.
/// One instance lives in each worker's per-thread processor state (spec
/// section 4.7: "per-thread state: counters, scratch buffers").
#[derive(Debug, Clone, Default)]
pub struct RunStats {
    pub reads_in: Tally,
    pub force_trimmed: Tally,
    pub initial_filtered: Tally,
    pub kmer_filtered: Tally,
    pub kmer_trimmed: Tally,
    pub overlap_trimmed: Tally,
    pub polymer_trimmed: Tally,
    pub entropy_filtered: Tally,
    pub quality_trimmed: Tally,
    pub final_filtered: Tally,
    pub reads_out: Tally,
}

impl AddAssign for RunStats {
    fn add_assign(&mut self, other: RunStats) {
        self.reads_in += other.reads_in;
        self.force_trimmed += other.force_trimmed;
        self.initial_filtered += other.initial_filtered;
        self.kmer_filtered += other.kmer_filtered;
        self.kmer_trimmed += other.kmer_trimmed;
        self.overlap_trimmed += other.overlap_trimmed;
        self.polymer_trimmed += other.polymer_trimmed;
        self.entropy_filtered += other.entropy_filtered;
        self.quality_trimmed += other.quality_trimmed;
        self.final_filtered += other.final_filtered;
        self.reads_out += other.reads_out;
    }
}

impl RunStats {
    pub fn merge_all(stats: Vec<RunStats>) -> RunStats {
        let mut total = RunStats::default();
        for s in stats {
            total += s;
        }
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tally_accumulates() {
        let mut t = Tally::default();
        t.add(3, 90);
        t.add(2, 40);
        assert_eq!(t.reads, 5);
        assert_eq!(t.bases, 130);
    }

    #[test]
    fn run_stats_merge_across_threads() {
        let mut a = RunStats::default();
        a.reads_in.add(10, 1000);
        a.kmer_filtered.add(2, 200);
        let mut b = RunStats::default();
        b.reads_in.add(5, 500);
        b.kmer_filtered.add(1, 100);

        let total = RunStats::merge_all(vec![a, b]);
        assert_eq!(total.reads_in.reads, 15);
        assert_eq!(total.kmer_filtered.bases, 300);
    }
}
