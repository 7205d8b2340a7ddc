use crate::types::{LibIndex, Tid};

/// Pair-orientation classification of a single aligned read.
///
/// `Normal*` geometries match the library's expected orientation; the `Arp*`
/// variants are the anomaly buckets that feed region accumulation. `Ctx`
/// marks a mate on a different reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PairFlag {
    Na,
    NormalFr,
    NormalRf,
    ArpFrBigInsert,
    ArpFrSmallInsert,
    ArpRf,
    ArpFf,
    ArpRr,
    ArpCtx,
    MateUnmapped,
    Unmapped,
}

impl PairFlag {
    /// True for the two expected-geometry variants.
    pub fn is_normal(self) -> bool {
        matches!(self, PairFlag::NormalFr | PairFlag::NormalRf)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    Fwd,
    Rev,
}

impl Orientation {
    pub fn as_char(self) -> char {
        match self {
            Orientation::Fwd => '+',
            Orientation::Rev => '-',
        }
    }
}

/// One classified alignment. Immutable once built, except for the
/// pair-orientation flag which the classifier rewrites from insert-size
/// evidence.
#[derive(Debug, Clone)]
pub struct Read {
    pub name: String,
    pub tid: Tid,
    /// 0-based leftmost position.
    pub pos: i64,
    pub len: i64,
    /// Mapping quality.
    pub qual: u8,
    /// Signed template length as reported by the aligner.
    pub isize: i64,
    pub ori: Orientation,
    pub lib_index: LibIndex,
    /// Sequence/quality bytes, present only when the run needs them
    /// (FASTQ/BED side outputs).
    pub seq: Option<Vec<u8>>,
    pub quals: Option<Vec<u8>>,
    flag: PairFlag,
}

impl Read {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: String,
        tid: Tid,
        pos: i64,
        len: i64,
        qual: u8,
        isize: i64,
        ori: Orientation,
        lib_index: LibIndex,
        flag: PairFlag,
    ) -> Self {
        Self {
            name,
            tid,
            pos,
            len,
            qual,
            isize,
            ori,
            lib_index,
            seq: None,
            quals: None,
            flag,
        }
    }

    pub fn flag(&self) -> PairFlag {
        self.flag
    }

    pub fn set_flag(&mut self, flag: PairFlag) {
        self.flag = flag;
    }

    pub fn abs_isize(&self) -> i64 {
        self.isize.abs()
    }

    pub fn has_sequence(&self) -> bool {
        matches!((&self.seq, &self.quals), (Some(s), Some(q)) if !s.is_empty() && !q.is_empty())
    }
}
