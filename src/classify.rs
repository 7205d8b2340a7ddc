//! Read classification: mapping-quality floors, the normal-depth bucket, the
//! anomaly filters, and insert-size flag rewriting.

use crate::config::{LibraryConfig, Options};
use crate::read::{PairFlag, Read};

/// What the accumulator should do with a classified read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Filtered out before entering the accumulator.
    Drop,
    /// Expected geometry: may bump the open region's normal counter, then
    /// discarded.
    Normal,
    /// Anomalous: attach to the open region.
    Anomalous,
}

#[derive(Debug)]
pub struct Classification {
    pub disposition: Disposition,
    /// Copy-number bucket to credit with one normal read, independent of the
    /// final disposition.
    pub normal_bucket: Option<String>,
}

/// Classify one read against its library. Rewrites the read's flag in place;
/// applying this twice is a no-op (the rewrites converge in one pass).
pub fn classify(read: &mut Read, lib: &LibraryConfig, opts: &Options) -> Classification {
    let mut out = Classification {
        disposition: Disposition::Drop,
        normal_bucket: None,
    };

    if read.flag() == PairFlag::Na {
        return out;
    }

    let min_mapq = if lib.min_mapping_quality >= 0 {
        lib.min_mapping_quality
    } else {
        opts.min_map_qual as i32
    };
    if (read.qual as i32) <= min_mapq {
        return out;
    }

    // Depth bucket uses the flag as it arrived, before any insert-size
    // rewriting, and the global floor rather than the library one.
    if read.qual > opts.min_map_qual && read.flag().is_normal() {
        let key = if opts.cn_per_lib {
            lib.name.clone()
        } else {
            lib.bam_file.clone()
        };
        out.normal_bucket = Some(key);
    }

    if (opts.transchr_rearrange && read.flag() != PairFlag::ArpCtx)
        || read.flag() == PairFlag::MateUnmapped
        || read.flag() == PairFlag::Unmapped
    {
        return out;
    }

    // Pairs mapped too far apart on the same chromosome are noise, not signal.
    if read.flag() != PairFlag::ArpCtx && read.abs_isize() > opts.max_sd {
        return out;
    }

    rewrite_flag(read, lib, opts);

    out.disposition = if read.flag().is_normal() {
        Disposition::Normal
    } else {
        Disposition::Anomalous
    };
    out
}

/// Re-bucket a flag from the library's insert-size cutoffs. Mate-pair
/// libraries expect RF geometry, so the thresholds move to that side; either
/// way RR folds into FF (one inversion signal, two strands).
pub fn rewrite_flag(read: &mut Read, lib: &LibraryConfig, opts: &Options) {
    let isize = read.abs_isize() as f64;
    if opts.illumina_long_insert {
        if isize > lib.uppercutoff && read.flag() == PairFlag::NormalRf {
            read.set_flag(PairFlag::ArpRf);
        }
        if isize < lib.uppercutoff && read.flag() == PairFlag::ArpRf {
            read.set_flag(PairFlag::NormalRf);
        }
        if isize < lib.lowercutoff && read.flag() == PairFlag::NormalRf {
            read.set_flag(PairFlag::ArpFrSmallInsert);
        }
    } else {
        if isize > lib.uppercutoff && read.flag() == PairFlag::NormalFr {
            read.set_flag(PairFlag::ArpFrBigInsert);
        }
        if isize < lib.uppercutoff && read.flag() == PairFlag::ArpFrBigInsert {
            read.set_flag(PairFlag::NormalFr);
        }
        if isize < lib.lowercutoff && read.flag() == PairFlag::NormalFr {
            read.set_flag(PairFlag::ArpFrSmallInsert);
        }
        if read.flag() == PairFlag::NormalRf {
            read.set_flag(PairFlag::ArpRf);
        }
    }
    if read.flag() == PairFlag::ArpRr {
        read.set_flag(PairFlag::ArpFf);
    }
}
