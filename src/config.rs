// config.rs is shared between the library and binary targets.  Fields carried
// for the library API look "unused" to the binary — suppress those
// false-positive warnings.
#![allow(dead_code)]

use crate::read::PairFlag;
use crate::types::{HashMap, HashMapExt, LibIndex};
use anyhow::{anyhow, Result};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

/// One sequencing library: insert-size characterization plus the BAM it came
/// from. Read-only after config load.
#[derive(Debug, Clone)]
pub struct LibraryConfig {
    pub index: LibIndex,
    pub name: String,
    pub bam_file: String,
    pub mean_insertsize: f64,
    pub std_insertsize: f64,
    pub uppercutoff: f64,
    pub lowercutoff: f64,
    /// Per-library mapping-quality floor; -1 means "use the global option".
    pub min_mapping_quality: i32,
    pub readlen: f64,
}

/// Parsed library configuration: libraries in first-seen order, read-group
/// bindings, and the distinct BAM paths in configuration order.
#[derive(Debug, Default)]
pub struct BamConfig {
    pub libraries: Vec<LibraryConfig>,
    lib_by_name: HashMap<String, LibIndex>,
    readgroup_lib: HashMap<String, LibIndex>,
    pub bam_files: Vec<String>,
}

impl BamConfig {
    /// Load a tab-separated `key:value` library configuration.
    ///
    /// Each line binds one read group to a library and names the BAM the
    /// library was characterized from. Lines starting with `#` and blank
    /// lines are skipped; unknown keys are ignored.
    pub fn load(path: &Path) -> Result<Self> {
        let reader = BufReader::new(
            File::open(path).map_err(|e| anyhow!("open config {}: {e}", path.display()))?,
        );

        let mut cfg = BamConfig::default();
        for (lineno, line) in reader.lines().enumerate() {
            let line = line?;
            let line = line.trim_end();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            cfg.parse_line(line)
                .map_err(|e| anyhow!("{}:{}: {e}", path.display(), lineno + 1))?;
        }

        if cfg.libraries.is_empty() {
            return Err(anyhow!("no libraries in config {}", path.display()));
        }
        Ok(cfg)
    }

    fn parse_line(&mut self, line: &str) -> Result<()> {
        let mut fields: HashMap<&str, &str> = HashMap::new();
        for token in line.split('\t') {
            if let Some((key, value)) = token.split_once(':') {
                fields.insert(key.trim(), value.trim());
            }
        }

        let lib_name = fields
            .get("lib")
            .or_else(|| fields.get("library"))
            .ok_or_else(|| anyhow!("line has no lib:<name> field"))?
            .to_string();
        let bam_file = fields
            .get("map")
            .ok_or_else(|| anyhow!("line has no map:<bam> field"))?
            .to_string();

        let index = match self.lib_by_name.get(&lib_name) {
            Some(&i) => i,
            None => {
                let index = self.libraries.len();
                self.libraries.push(LibraryConfig {
                    index,
                    name: lib_name.clone(),
                    bam_file: bam_file.clone(),
                    mean_insertsize: parse_field(&fields, "mean")?.unwrap_or(0.0),
                    std_insertsize: parse_field(&fields, "std")?.unwrap_or(0.0),
                    uppercutoff: parse_field(&fields, "upper")?.unwrap_or(0.0),
                    lowercutoff: parse_field(&fields, "lower")?.unwrap_or(0.0),
                    min_mapping_quality: parse_field::<i32>(&fields, "mqual")?.unwrap_or(-1),
                    readlen: parse_field(&fields, "readlen")?.unwrap_or(0.0),
                });
                self.lib_by_name.insert(lib_name, index);
                if !self.bam_files.iter().any(|b| *b == bam_file) {
                    self.bam_files.push(bam_file);
                }
                index
            }
        };

        if let Some(rg) = fields.get("readgroup") {
            self.readgroup_lib.insert(rg.to_string(), index);
        }
        Ok(())
    }

    pub fn library(&self, index: LibIndex) -> &LibraryConfig {
        &self.libraries[index]
    }

    pub fn library_by_readgroup(&self, readgroup: &str) -> Option<LibIndex> {
        self.readgroup_lib.get(readgroup).copied()
    }

    /// Fallback for BAMs without read groups: library index of the only
    /// library characterized from `bam`, if unambiguous.
    pub fn sole_library_of_bam(&self, bam: &str) -> Option<LibIndex> {
        let mut found = None;
        for lib in &self.libraries {
            if lib.bam_file == bam {
                if found.is_some() {
                    return None;
                }
                found = Some(lib.index);
            }
        }
        found
    }
}

/// Genome-wide read profile gathered by the pre-pass; read-only during
/// detection.
#[derive(Debug, Default)]
pub struct LibraryInfo {
    /// Per library index: how many reads carried each (post-rewrite) flag.
    pub flag_counts: Vec<HashMap<PairFlag, u64>>,
    /// Union of read footprints across all references and BAMs.
    pub covered_reference_length: u64,
    /// Normal reads per covered base, keyed by the copy-number bucket
    /// (library name or BAM path depending on `Options::cn_per_lib`).
    pub read_density: HashMap<String, f64>,
}

impl LibraryInfo {
    pub fn flag_count(&self, lib: LibIndex, flag: PairFlag) -> u64 {
        self.flag_counts
            .get(lib)
            .and_then(|m| m.get(&flag))
            .copied()
            .unwrap_or(0)
    }
}

/// Core detection knobs plus derived values, assembled from the CLI.
#[derive(Debug, Clone)]
pub struct Options {
    pub min_map_qual: u8,
    pub max_sd: i64,
    pub min_len: i64,
    pub seq_coverage_lim: f32,
    pub buffer_size: u32,
    pub max_read_window_size: i64,
    pub min_read_pair: u32,
    pub transchr_rearrange: bool,
    pub illumina_long_insert: bool,
    /// true: copy number per library; false: per BAM.
    pub cn_per_lib: bool,
    pub fisher: bool,
    pub score_threshold: i32,
    pub print_af: bool,
    pub prefix_fastq: Option<String>,
    pub dump_bed: Option<PathBuf>,
    pub need_sequence_data: bool,
}

impl Options {
    /// Emitted SV type for a dominant flag; orientation anomalies mean
    /// different events for mate-pair libraries.
    pub fn sv_type(&self, flag: PairFlag) -> &'static str {
        if self.illumina_long_insert {
            match flag {
                PairFlag::ArpFf => "ITX",
                PairFlag::ArpFrSmallInsert => "DEL",
                PairFlag::ArpRf => "INV",
                PairFlag::ArpCtx => "CTX",
                _ => "UN",
            }
        } else {
            match flag {
                PairFlag::ArpFf => "INV",
                PairFlag::ArpFrBigInsert => "DEL",
                PairFlag::ArpFrSmallInsert => "INS",
                PairFlag::ArpRf => "ITX",
                PairFlag::ArpCtx => "CTX",
                _ => "UN",
            }
        }
    }

    /// Detection window: past this gap after the last anomalous read the open
    /// region breaks. Derived from the tightest library unless overridden.
    pub fn derive_max_read_window_size(cfg: &BamConfig) -> i64 {
        let mut window = 1e8 as i64;
        for lib in &cfg.libraries {
            let w = (lib.mean_insertsize - 2.0 * lib.readlen) as i64;
            window = window.min(w);
        }
        window.max(50)
    }
}

fn parse_field<T: std::str::FromStr>(fields: &HashMap<&str, &str>, key: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match fields.get(key) {
        None => Ok(None),
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|e| anyhow!("bad {key}:{raw}: {e}")),
    }
}
