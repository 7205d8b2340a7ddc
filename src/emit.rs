//! Call emission: the tab-separated record stream plus the optional
//! supporting-read side outputs (FASTQ dump, BED traces).

use crate::config::{BamConfig, Options};
use crate::read::PairFlag;
use crate::sv::SvBuilder;
use crate::types::{HashMap, HashMapExt, HashSet, HashSetExt};
use anyhow::{Context, Result};
use noodles::fastq;
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};

/// Writes accepted candidates to `out` and fans supporting reads out to the
/// configured side channels.
pub struct Emitter<W: Write> {
    out: W,
    fastq: Option<FastqWriter>,
}

impl<W: Write> Emitter<W> {
    pub fn new(out: W, opts: &Options) -> Self {
        let fastq = opts.prefix_fastq.as_ref().map(|p| FastqWriter::new(p.clone()));
        Self { out, fastq }
    }

    /// Comment lines ahead of the first record: provenance and the column
    /// legend.
    pub fn write_header(&mut self, opts: &Options, cfg: &BamConfig) -> Result<()> {
        writeln!(
            self.out,
            "#{} v{}",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION")
        )?;
        for bam in &cfg.bam_files {
            writeln!(self.out, "#bam:{bam}")?;
        }
        writeln!(
            self.out,
            "#Chr1\tPos1\tOrientation1\tChr2\tPos2\tOrientation2\tType\tSize\tScore\tnum_Reads\tnum_Reads_lib{}",
            if opts.print_af { "\tAllele_frequency" } else { "" }
        )?;
        Ok(())
    }

    /// Emit one accepted candidate. Anchor positions must already be 1-based.
    pub fn emit(
        &mut self,
        svb: &SvBuilder,
        phred: i32,
        opts: &Options,
        cfg: &BamConfig,
        ref_names: &[String],
    ) -> Result<()> {
        let svt = opts.sv_type(svb.flag);
        let (sptype, diffspan) = support_columns(svb, opts, cfg);

        write!(
            self.out,
            "{}\t{}\t{}+{}-\t{}\t{}\t{}+{}-\t{}\t{}\t{}\t{}\t{}",
            ref_names[svb.chr[0] as usize],
            svb.pos[0],
            svb.fwd_read_count[0],
            svb.rev_read_count[0],
            ref_names[svb.chr[1] as usize],
            svb.pos[1],
            svb.fwd_read_count[1],
            svb.rev_read_count[1],
            svt,
            diffspan,
            phred,
            svb.dominant_count(),
            sptype,
        )?;

        if opts.print_af {
            write!(self.out, "\t{:.4}", svb.allele_frequency)?;
        }

        if !opts.cn_per_lib && svb.flag != PairFlag::ArpCtx {
            for bam in &cfg.bam_files {
                match svb.copy_number.get(bam) {
                    Some(cn) => write!(self.out, "\t{cn:.2}")?,
                    None => write!(self.out, "\tNA")?,
                }
            }
        }
        writeln!(self.out)?;

        if let Some(fastq) = self.fastq.as_mut() {
            fastq.dump(svb, cfg)?;
        }
        if let Some(bed) = opts.dump_bed.as_deref() {
            append_bed_trace(bed, svb, svt, diffspan, cfg, ref_names)?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }
}

/// Build the per-library (or per-BAM) support column and the mean
/// span-vs-insert difference for the dominant flag.
fn support_columns(svb: &SvBuilder, opts: &Options, cfg: &BamConfig) -> (String, i32) {
    let empty_counts = BTreeMap::new();
    let empty_spans = BTreeMap::new();
    let readcounts = svb
        .type_library_readcount
        .get(&svb.flag)
        .unwrap_or(&empty_counts);
    let meanspans = svb
        .type_library_meanspan
        .get(&svb.flag)
        .unwrap_or(&empty_spans);

    let mut sptype = String::new();
    let mut diff = 0.0f32;

    if opts.cn_per_lib {
        for (&lib, &read_count) in readcounts {
            let lib_config = cfg.library(lib);

            let mut copy_number_str = "NA".to_string();
            if svb.flag != PairFlag::ArpCtx {
                if let Some(cn) = svb.copy_number.get(&lib_config.name) {
                    copy_number_str = format!("{cn:.2}");
                }
            }
            if !sptype.is_empty() {
                sptype.push(':');
            }
            sptype.push_str(&format!("{}|{read_count},{copy_number_str}", lib_config.name));

            diff += meanspans.get(&lib).copied().unwrap_or(0) as f32
                - read_count as f32 * lib_config.mean_insertsize as f32;
        }
    } else {
        let mut bam_readcount: BTreeMap<&str, u32> = BTreeMap::new();
        for (&lib, &read_count) in readcounts {
            let lib_config = cfg.library(lib);
            *bam_readcount.entry(&lib_config.bam_file).or_default() += read_count;
            diff += meanspans.get(&lib).copied().unwrap_or(0) as f32
                - read_count as f32 * lib_config.mean_insertsize as f32;
        }
        for (bam, read_count) in bam_readcount {
            if !sptype.is_empty() {
                sptype.push(':');
            }
            sptype.push_str(&format!("{bam}|{read_count}"));
        }
        if sptype.is_empty() {
            sptype = "NA".to_string();
        }
    }

    let dominant = svb.dominant_count().max(1) as f32;
    let diffspan = (diff / dominant + 0.5) as i32;
    (sptype, diffspan)
}

/// Supporting-read FASTQ dump with one file per library and mate.
///
/// The first read seen for a query name goes to the "2" file and its mate to
/// "1"; downstream assembly expects exactly this pairing.
struct FastqWriter {
    prefix: String,
    writers: HashMap<String, fastq::io::Writer<BufWriter<File>>>,
}

impl FastqWriter {
    fn new(prefix: String) -> Self {
        Self {
            prefix,
            writers: HashMap::new(),
        }
    }

    fn dump(&mut self, svb: &SvBuilder, cfg: &BamConfig) -> Result<()> {
        let mut pairing: HashSet<&str> = HashSet::new();
        for read in &svb.support_reads {
            if !read.has_sequence() || read.flag() != svb.flag {
                continue;
            }
            let suffix = if pairing.contains(read.name.as_str()) { "1" } else { "2" };
            let lib = &cfg.library(read.lib_index).name;
            let path = format!("{}.{lib}.{suffix}.fastq", self.prefix);

            if !self.writers.contains_key(&path) {
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&path)
                    .with_context(|| format!("open fastq {path}"))?;
                self.writers
                    .insert(path.clone(), fastq::io::Writer::new(BufWriter::new(file)));
            }
            let writer = self.writers.get_mut(&path).expect("writer just inserted");

            let record = fastq::Record::new(
                fastq::record::Definition::new(read.name.as_str(), ""),
                read.seq.clone().unwrap_or_default(),
                read.quals.clone().unwrap_or_default(),
            );
            writer.write_record(&record)?;
            pairing.insert(&read.name);
        }
        Ok(())
    }
}

/// Append one track block per call plus a line per dominant-flag supporting
/// read, color-coded by strand.
fn append_bed_trace(
    path: &std::path::Path,
    svb: &SvBuilder,
    svt: &str,
    diffspan: i32,
    cfg: &BamConfig,
    ref_names: &[String],
) -> Result<()> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open BED {}", path.display()))?;
    let mut out = BufWriter::new(file);

    let chr1 = &ref_names[svb.chr[0] as usize];
    writeln!(
        out,
        "track name={chr1}_{}_{svt}_{diffspan}\tdescription=\"{} {chr1} {} {svt} {diffspan}\"\tuseScore=0",
        svb.pos[0],
        env!("CARGO_PKG_NAME"),
        svb.pos[0],
    )?;
    for read in &svb.support_reads {
        if !read.has_sequence() || read.flag() != svb.flag {
            continue;
        }
        let aln_end = read.pos - read.len - 1;
        let color = match read.ori {
            crate::read::Orientation::Fwd => "0,0,255",
            crate::read::Orientation::Rev => "255,0,0",
        };
        writeln!(
            out,
            "chr{}\t{}\t{}\t{}|{}\t{}\t{}\t{}\t{}\t{}",
            ref_names[read.tid as usize],
            read.pos,
            aln_end,
            read.name,
            cfg.library(read.lib_index).name,
            read.qual as u32 * 10,
            read.ori.as_char(),
            read.pos,
            aln_end,
            color,
        )?;
    }
    Ok(())
}
