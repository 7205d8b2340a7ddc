use crate::config::{BamConfig, Options};
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "svscan-rs",
    about = "Detect structural variants from anomalous read pairs in merged, position-sorted BAMs",
    version
)]
pub struct Args {
    /// Library configuration (tab-separated key:value lines from insert-size profiling)
    pub config: PathBuf,

    /// Input BAMs; defaults to the BAMs named in the configuration
    #[arg(value_name = "BAM")]
    pub bams: Vec<PathBuf>,

    /// Minimum alternative mapping quality
    #[arg(short = 'q', long = "min-mapq", default_value_t = 35)]
    pub min_map_qual: u8,

    /// Maximum same-chromosome insert size to treat as signal
    #[arg(short = 'm', long = "max-sd", default_value_t = 1_000_000)]
    pub max_sd: i64,

    /// Minimum length of a region to promote
    #[arg(short = 's', long = "min-len", default_value_t = 7)]
    pub min_len: i64,

    /// Maximum sequence-coverage density of a promotable region
    #[arg(short = 'x', long = "coverage-limit", default_value_t = 1000.0)]
    pub seq_coverage_lim: f32,

    /// Promoted regions buffered before a graph flush
    #[arg(short = 'b', long = "buffer-size", default_value_t = 100)]
    pub buffer_size: u32,

    /// Minimum number of read pairs required to report a variant
    #[arg(short = 'r', long = "min-read-pair", default_value_t = 2)]
    pub min_read_pair: u32,

    /// Only detect inter-chromosomal rearrangements
    #[arg(short = 't', long = "transchr")]
    pub transchr_rearrange: bool,

    /// Analyze Illumina long-insert (mate-pair) libraries
    #[arg(short = 'l', long = "long-insert")]
    pub illumina_long_insert: bool,

    /// Report copy number and supporting reads per library rather than per BAM
    #[arg(short = 'a', long = "per-lib")]
    pub cn_per_lib: bool,

    /// Recalibrate combined p-values with Fisher's method
    #[arg(long)]
    pub fisher: bool,

    /// Minimum Phred score of variants to report
    #[arg(short = 'y', long = "score-threshold", default_value_t = 30)]
    pub score_threshold: i32,

    /// Append the estimated allele frequency to each record
    #[arg(long = "allele-frequency")]
    pub print_af: bool,

    /// Prefix for supporting-read FASTQ files (one per library and mate)
    #[arg(short = 'd', long = "dump-fastq", value_name = "PREFIX")]
    pub prefix_fastq: Option<String>,

    /// Append SVs and supporting reads to this BED file
    #[arg(short = 'g', long = "dump-bed", value_name = "BED")]
    pub dump_bed: Option<PathBuf>,

    /// Suppress progress output and set logging level to WARN
    #[arg(long)]
    pub quiet: bool,
}

impl Args {
    pub fn to_options(&self, cfg: &BamConfig) -> Options {
        let need_sequence_data = self.prefix_fastq.is_some() || self.dump_bed.is_some();
        Options {
            min_map_qual: self.min_map_qual,
            max_sd: self.max_sd,
            min_len: self.min_len,
            seq_coverage_lim: self.seq_coverage_lim,
            buffer_size: self.buffer_size,
            max_read_window_size: Options::derive_max_read_window_size(cfg),
            min_read_pair: self.min_read_pair,
            transchr_rearrange: self.transchr_rearrange,
            illumina_long_insert: self.illumina_long_insert,
            cn_per_lib: self.cn_per_lib,
            fisher: self.fisher,
            score_threshold: self.score_threshold,
            print_af: self.print_af,
            prefix_fastq: self.prefix_fastq.clone(),
            dump_bed: self.dump_bed.clone(),
            need_sequence_data,
        }
    }
}
