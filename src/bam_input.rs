//! BAM decoding: per-file readers merged into one position-ordered stream of
//! classified reads.

use crate::config::BamConfig;
use crate::read::{Orientation, PairFlag, Read};
use crate::types::Tid;
use anyhow::{anyhow, Context, Result};
use noodles::sam::alignment::record::data::field::{Tag, Value};
use noodles::sam::alignment::record::{Flags, QualityScores};
use noodles::{bam, bgzf, sam};
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::fs::File;
use std::path::Path;

type BamReader = bam::io::Reader<bgzf::Reader<File>>;

pub fn open_bam(path: &Path) -> Result<(BamReader, sam::Header)> {
    let file = File::open(path).with_context(|| format!("open BAM {}", path.display()))?;
    let mut reader = bam::io::Reader::new(file);
    let header = reader.read_header()?;
    Ok((reader, header))
}

pub fn reference_names(header: &sam::Header) -> Vec<String> {
    header
        .reference_sequences()
        .keys()
        .map(|name| name.to_string())
        .collect()
}

/// Derive the initial pair-orientation flag from the alignment flags and
/// mate placement. Insert-size rewriting happens later, per library.
pub fn initial_flag(
    flags: Flags,
    tid: Tid,
    mtid: Tid,
    pos: i64,
    mpos: i64,
    long_insert: bool,
) -> PairFlag {
    if flags.contains(Flags::DUPLICATE)
        || flags.contains(Flags::SECONDARY)
        || flags.contains(Flags::SUPPLEMENTARY)
        || !flags.contains(Flags::SEGMENTED)
    {
        return PairFlag::Na;
    }
    if flags.contains(Flags::UNMAPPED) {
        return PairFlag::Unmapped;
    }
    if flags.contains(Flags::MATE_UNMAPPED) {
        return PairFlag::MateUnmapped;
    }
    if tid != mtid {
        return PairFlag::ArpCtx;
    }
    if flags.contains(Flags::PROPERLY_SEGMENTED) {
        return if long_insert {
            PairFlag::NormalRf
        } else {
            PairFlag::NormalFr
        };
    }
    let rev = flags.contains(Flags::REVERSE_COMPLEMENTED);
    let mate_rev = flags.contains(Flags::MATE_REVERSE_COMPLEMENTED);
    if rev == mate_rev {
        return if rev { PairFlag::ArpRr } else { PairFlag::ArpFf };
    }
    // Opposite strands: forward mate leftmost reads as FR, otherwise RF.
    let (fwd_pos, rev_pos) = if rev { (mpos, pos) } else { (pos, mpos) };
    if fwd_pos <= rev_pos {
        PairFlag::ArpFrBigInsert
    } else {
        PairFlag::ArpRf
    }
}

/// Decode one record into a [`Read`], or `None` when it cannot be used (no
/// name, or no library resolvable from its read group / source BAM).
pub fn decode_read(
    record: &bam::Record,
    cfg: &BamConfig,
    bam_path: &str,
    long_insert: bool,
    need_sequence_data: bool,
) -> Result<Option<Read>> {
    let Some(name) = record.name() else {
        return Ok(None);
    };
    let name = name.to_string();

    let lib_index = match read_group(record)? {
        Some(rg) => cfg.library_by_readgroup(&rg),
        None => cfg.sole_library_of_bam(bam_path),
    };
    let Some(lib_index) = lib_index else {
        return Ok(None);
    };

    let flags = record.flags();
    let tid = match record.reference_sequence_id() {
        Some(id) => id? as Tid,
        None => -1,
    };
    let pos = match record.alignment_start() {
        Some(p) => p?.get() as i64 - 1,
        None => -1,
    };
    let mtid = match record.mate_reference_sequence_id() {
        Some(id) => id? as Tid,
        None => -1,
    };
    let mpos = match record.mate_alignment_start() {
        Some(p) => p?.get() as i64 - 1,
        None => -1,
    };
    let mapq = record.mapping_quality().map(u8::from).unwrap_or(0);
    let len = record.sequence().len() as i64;
    let ori = if flags.contains(Flags::REVERSE_COMPLEMENTED) {
        Orientation::Rev
    } else {
        Orientation::Fwd
    };
    let flag = initial_flag(flags, tid, mtid, pos, mpos, long_insert);

    let mut read = Read::new(
        name,
        tid,
        pos,
        len,
        mapq,
        record.template_length() as i64,
        ori,
        lib_index,
        flag,
    );
    if need_sequence_data {
        read.seq = Some(record.sequence().iter().collect());
        // BAM stores raw Phred scores; FASTQ wants them ASCII-offset.
        read.quals = Some(
            record
                .quality_scores()
                .iter()
                .map(|q| q.map(|q| q + 33))
                .collect::<std::io::Result<Vec<u8>>>()?,
        );
    }
    Ok(Some(read))
}

fn read_group(record: &bam::Record) -> Result<Option<String>> {
    match record.data().get(&Tag::READ_GROUP) {
        None => Ok(None),
        Some(Err(e)) => Err(e.into()),
        Some(Ok(Value::String(s))) => Ok(Some(s.to_string())),
        Some(Ok(_)) => Ok(None),
    }
}

struct Source {
    reader: BamReader,
    bam_path: String,
    record: bam::Record,
}

/// K-way merge of position-sorted BAMs into one `(tid, pos)`-ordered stream.
///
/// Records that decode to `None` are counted and skipped at refill time, so
/// the heap only ever holds usable reads.
pub struct MergedAlignments<'a> {
    cfg: &'a BamConfig,
    long_insert: bool,
    need_sequence_data: bool,
    sources: Vec<Source>,
    queued: Vec<Option<Read>>,
    heap: BinaryHeap<Reverse<(i64, i64, usize)>>,
    pub skipped: u64,
}

impl<'a> MergedAlignments<'a> {
    /// Open every BAM and prime the merge heap. Returns the stream plus the
    /// reference-name table from the first header (all inputs must share one
    /// reference ordering).
    pub fn open(
        cfg: &'a BamConfig,
        bam_paths: &[String],
        long_insert: bool,
        need_sequence_data: bool,
    ) -> Result<(Self, Vec<String>)> {
        if bam_paths.is_empty() {
            return Err(anyhow!("no input BAMs"));
        }
        let mut sources = Vec::with_capacity(bam_paths.len());
        let mut ref_names = Vec::new();
        for (i, path) in bam_paths.iter().enumerate() {
            let (reader, header) = open_bam(Path::new(path))?;
            if i == 0 {
                ref_names = reference_names(&header);
            }
            sources.push(Source {
                reader,
                bam_path: path.clone(),
                record: bam::Record::default(),
            });
        }

        let queued = sources.iter().map(|_| None).collect();
        let mut stream = Self {
            cfg,
            long_insert,
            need_sequence_data,
            sources,
            queued,
            heap: BinaryHeap::new(),
            skipped: 0,
        };
        for i in 0..stream.sources.len() {
            stream.fill(i)?;
        }
        Ok((stream, ref_names))
    }

    fn fill(&mut self, i: usize) -> Result<()> {
        loop {
            let source = &mut self.sources[i];
            if source.reader.read_record(&mut source.record)? == 0 {
                return Ok(());
            }
            match decode_read(
                &source.record,
                self.cfg,
                &source.bam_path,
                self.long_insert,
                self.need_sequence_data,
            )? {
                Some(read) => {
                    // Unmapped tail (tid -1) sorts after every reference.
                    let tid_key = if read.tid < 0 { i64::MAX } else { read.tid as i64 };
                    self.heap.push(Reverse((tid_key, read.pos, i)));
                    self.queued[i] = Some(read);
                    return Ok(());
                }
                None => {
                    self.skipped += 1;
                }
            }
        }
    }

    pub fn next_read(&mut self) -> Result<Option<Read>> {
        let Some(Reverse((_, _, i))) = self.heap.pop() else {
            return Ok(None);
        };
        let read = self.queued[i].take().expect("queued read for popped source");
        self.fill(i)?;
        Ok(Some(read))
    }
}
