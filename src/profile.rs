//! Profiling pre-pass: one scan of every input BAM to characterize the
//! genome-wide flag distribution per library, the covered reference length,
//! and the normal-read density each copy-number bucket sees.

use crate::bam_input::{decode_read, open_bam};
use crate::classify::rewrite_flag;
use crate::config::{BamConfig, LibraryInfo, Options};
use crate::read::PairFlag;
use crate::types::{HashMap, HashMapExt, Tid};
use anyhow::Result;
use noodles::bam;
use std::path::Path;

pub fn profile_libraries(
    cfg: &BamConfig,
    opts: &Options,
    bam_paths: &[String],
) -> Result<LibraryInfo> {
    let mut info = LibraryInfo {
        flag_counts: vec![HashMap::new(); cfg.libraries.len()],
        covered_reference_length: 0,
        read_density: HashMap::new(),
    };
    let mut normal_counts: HashMap<String, u64> = HashMap::new();

    for path in bam_paths {
        let (mut reader, _header) = open_bam(Path::new(path))?;
        let mut record = bam::Record::default();

        // Footprint union assumes position order within each reference.
        let mut footprint_tid: Tid = -1;
        let mut footprint_end: i64 = 0;

        while reader.read_record(&mut record)? != 0 {
            let Some(mut read) =
                decode_read(&record, cfg, path, opts.illumina_long_insert, false)?
            else {
                continue;
            };
            if matches!(
                read.flag(),
                PairFlag::Na | PairFlag::Unmapped | PairFlag::MateUnmapped
            ) {
                continue;
            }

            let lib = cfg.library(read.lib_index);
            let min_mapq = if lib.min_mapping_quality >= 0 {
                lib.min_mapping_quality
            } else {
                opts.min_map_qual as i32
            };
            if (read.qual as i32) <= min_mapq {
                continue;
            }

            if read.tid != footprint_tid {
                footprint_tid = read.tid;
                footprint_end = 0;
            }
            let end = read.pos + read.len;
            if end > footprint_end {
                info.covered_reference_length +=
                    (end - footprint_end.max(read.pos)) as u64;
                footprint_end = end;
            }

            if read.qual > opts.min_map_qual && read.flag().is_normal() {
                let key = if opts.cn_per_lib {
                    lib.name.clone()
                } else {
                    lib.bam_file.clone()
                };
                *normal_counts.entry(key).or_default() += 1;
            }

            rewrite_flag(&mut read, lib, opts);
            *info.flag_counts[read.lib_index]
                .entry(read.flag())
                .or_default() += 1;
        }
    }

    if info.covered_reference_length > 0 {
        let covered = info.covered_reference_length as f64;
        for (key, count) in normal_counts {
            info.read_density.insert(key, count as f64 / covered);
        }
    }

    tracing::info!(
        covered_reference_length = info.covered_reference_length,
        libraries = cfg.libraries.len(),
        "library profiling complete"
    );
    Ok(info)
}
