//! Read/reference record types consumed by the engine.
//!
//! Sequence I/O codecs are an external collaborator (spec section 1); this
//! module defines the owned, format-agnostic shape those codecs hand to the
//! engine, the same role the teacher's thin `rust_htslib::bam::Record`
//! field-access wrapper (`src/reference/read.rs::filter_read`) plays for
//! its own BAM-specific pipeline.

/// One sequence record: a reference scaffold, a literal, or a read.
#[derive(Debug, Clone)]
pub struct SeqRecord {
    pub id: String,
    pub numeric_id: u64,
    pub bases: Vec<u8>,
    pub quality: Option<Vec<u8>>,
    pub discarded: bool,
}

impl SeqRecord {
    pub fn new(id: impl Into<String>, bases: impl Into<Vec<u8>>) -> Self {
        SeqRecord {
            id: id.into(),
            numeric_id: 0,
            bases: bases.into(),
            quality: None,
            discarded: false,
        }
    }

    pub fn with_quality(mut self, quality: impl Into<Vec<u8>>) -> Self {
        self.quality = Some(quality.into());
        self
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bases.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bases.is_empty()
    }
}

/// A read or a read pair, carried through the pipeline together so paired
/// decisions (overlap trim, `removePairsIfEitherBad`) can see both mates.
#[derive(Debug, Clone)]
pub struct ReadPair {
    pub r1: SeqRecord,
    pub r2: Option<SeqRecord>,
}

impl ReadPair {
    pub fn single(r1: SeqRecord) -> Self {
        ReadPair { r1, r2: None }
    }

    pub fn paired(r1: SeqRecord, r2: SeqRecord) -> Self {
        ReadPair { r1, r2: Some(r2) }
    }

    #[inline]
    pub fn is_paired(&self) -> bool {
        self.r2.is_some()
    }
}

/// A batch of read pairs carrying the input's monotonic batch id, used by
/// the harness to preserve output ordering across worker threads.
#[derive(Debug, Clone)]
pub struct ReadBatch {
    pub batch_id: u64,
    pub reads: Vec<ReadPair>,
}

/// The keep mask a pipeline run produces per pair, per spec section 4.6:
/// `{r1 kept?, r2 kept?}` plus a flag distinguishing an ordinary
/// double-discard from a `trimFailuresTo1bp` placeholder (spec section 4.6
/// phase 6: the latter routes to the unmatched channel instead of matched).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeepMask {
    pub keep_r1: bool,
    pub keep_r2: bool,
    pub placeholder: bool,
}

impl KeepMask {
    pub const DISCARD_BOTH: KeepMask = KeepMask {
        keep_r1: false,
        keep_r2: false,
        placeholder: false,
    };
    pub const KEEP_BOTH: KeepMask = KeepMask {
        keep_r1: true,
        keep_r2: true,
        placeholder: false,
    };

    pub fn code(&self) -> u8 {
        (self.keep_r1 as u8) | ((self.keep_r2 as u8) << 1)
    }
}
