//! The streaming detector: rolling region accumulation, mate-link traversal,
//! and per-candidate scoring/emission.

// detect.rs is shared between the library and binary targets.  Test-surface
// accessors look "unused" to the binary — suppress those false positives.
#![allow(dead_code)]

use crate::classify::{classify, Disposition};
use crate::config::{BamConfig, LibraryInfo, Options};
use crate::emit::Emitter;
use crate::read::{PairFlag, Read};
use crate::region::{ReadCounts, RegionStore};
use crate::stats::{log_prob_score, phred};
use crate::sv::SvBuilder;
use crate::types::{RegionId, Tid};
use anyhow::Result;
use std::collections::BTreeSet;
use std::io::Write;

/// Counters reported at end of run.
#[derive(Debug, Default)]
pub struct Stats {
    pub total_reads: u64,
    pub anomalous_reads: u64,
    pub regions_promoted: u64,
    pub regions_collapsed: u64,
    pub traversals: u64,
    pub calls_emitted: u64,
}

/// Single-pass SV detector over a position-sorted, classified read stream.
///
/// Feed reads with [`Detector::push`]; call [`Detector::finish`] at end of
/// stream to flush the final region and drain the graph.
pub struct Detector<'a, W: Write> {
    opts: &'a Options,
    cfg: &'a BamConfig,
    lib_info: &'a LibraryInfo,
    ref_names: Vec<String>,
    store: RegionStore,
    emitter: Emitter<W>,
    stats: Stats,

    // Rolling state of the currently open region.
    collecting_normal_reads: bool,
    nnormal_reads: u32,
    ntotal_nucleotides: i64,
    max_readlen: i64,
    promoted_since_flush: u32,
    region_start_tid: Tid,
    region_start_pos: i64,
    region_end_tid: Tid,
    region_end_pos: i64,
    reads_in_current_region: Vec<Read>,
    normal_counts: ReadCounts,
}

impl<'a, W: Write> Detector<'a, W> {
    pub fn new(
        opts: &'a Options,
        cfg: &'a BamConfig,
        lib_info: &'a LibraryInfo,
        ref_names: Vec<String>,
        out: W,
    ) -> Self {
        Self {
            opts,
            cfg,
            lib_info,
            ref_names,
            store: RegionStore::new(),
            emitter: Emitter::new(out, opts),
            stats: Stats::default(),
            collecting_normal_reads: false,
            nnormal_reads: 0,
            ntotal_nucleotides: 0,
            max_readlen: 0,
            promoted_since_flush: 0,
            region_start_tid: -1,
            region_start_pos: -1,
            region_end_tid: -1,
            region_end_pos: -1,
            reads_in_current_region: Vec::new(),
            normal_counts: ReadCounts::default(),
        }
    }

    pub fn write_header(&mut self) -> Result<()> {
        self.emitter.write_header(self.opts, self.cfg)
    }

    /// Classify one read and feed it to the region accumulator.
    pub fn push(&mut self, mut read: Read) {
        self.stats.total_reads += 1;

        let lib = self.cfg.library(read.lib_index);
        let classification = classify(&mut read, lib, self.opts);
        if let Some(key) = classification.normal_bucket {
            *self.normal_counts.entry(key).or_default() += 1;
        }
        match classification.disposition {
            Disposition::Drop => return,
            Disposition::Normal => {
                if self.collecting_normal_reads && read.isize > 0 {
                    self.nnormal_reads += 1;
                }
                return;
            }
            Disposition::Anomalous => {}
        }
        self.stats.anomalous_reads += 1;

        let do_break = read.tid != self.region_end_tid
            || read.pos - self.region_end_pos > self.opts.max_read_window_size;
        if do_break {
            self.process_breakpoint();
            self.region_start_tid = read.tid;
            self.region_start_pos = read.pos;
            self.reads_in_current_region.clear();
            self.collecting_normal_reads = false;
            self.nnormal_reads = 0;
            self.max_readlen = 0;
            self.ntotal_nucleotides = 0;
            self.normal_counts.clear();
        }

        self.region_end_tid = read.tid;
        self.region_end_pos = read.pos;
        self.ntotal_nucleotides += read.len;
        self.max_readlen = self.max_readlen.max(read.len);
        self.reads_in_current_region.push(read);
        if self.reads_in_current_region.len() == 1 {
            self.collecting_normal_reads = true;
        }
    }

    /// Finalize the open window: promote it to a live region, or collapse
    /// short/over-dense windows into their predecessor.
    fn process_breakpoint(&mut self) {
        if self.reads_in_current_region.is_empty() {
            return;
        }
        let span = self.region_end_pos - self.region_start_pos;
        let seq_coverage =
            self.ntotal_nucleotides as f32 / (span + 1 + self.max_readlen) as f32;

        let reads = std::mem::take(&mut self.reads_in_current_region);
        let counts = std::mem::take(&mut self.normal_counts);

        if span > self.opts.min_len && seq_coverage < self.opts.seq_coverage_lim {
            self.store.add_region(
                self.region_start_tid,
                self.region_start_pos,
                self.region_end_pos,
                self.nnormal_reads,
                counts,
                reads,
            );
            self.stats.regions_promoted += 1;
            self.promoted_since_flush += 1;
            if self.promoted_since_flush > self.opts.buffer_size {
                self.build_connection();
                self.promoted_since_flush = 0;
            }
        } else {
            self.store.collapse_into_last_region(reads, counts);
            self.stats.regions_collapsed += 1;
        }
    }

    /// BFS over the mate-link graph, dispatching each connected pair (or
    /// self-linked region) as an SV candidate. Consumes the graph; regions
    /// left with too little residual support are evicted afterwards.
    pub fn build_connection(&mut self) {
        self.stats.traversals += 1;
        let mut graph = self.store.take_graph();
        let mut free_nodes: BTreeSet<RegionId> = BTreeSet::new();

        while let Some(&seed) = graph.keys().next() {
            let mut tails = vec![seed];
            while !tails.is_empty() {
                let mut newtails = Vec::new();
                for tail in tails {
                    let Some(edges) = graph.remove(&tail) else {
                        continue;
                    };
                    if !self.store.region_exists(tail) {
                        continue;
                    }
                    for (target, nlinks) in edges {
                        // Pair support below threshold, or a target already
                        // consumed: skip, edge is gone either way.
                        if nlinks < self.opts.min_read_pair || !self.store.region_exists(target)
                        {
                            continue;
                        }
                        let nodes = if target != tail {
                            if let Some(target_edges) = graph.get_mut(&target) {
                                target_edges.remove(&tail);
                            }
                            vec![tail.min(target), tail.max(target)]
                        } else {
                            vec![tail]
                        };
                        newtails.push(target);
                        self.process_sv(&nodes, &mut free_nodes);
                    }
                }
                tails = newtails;
            }
        }

        for &id in &free_nodes {
            if self.store.region_exists(id)
                && self.store.num_reads_in_region(id) < self.opts.min_read_pair as usize
            {
                self.store.clear_region(id);
            }
        }
    }

    /// Build, gate, score, and emit one candidate. Supportive reads are
    /// consumed whether or not the candidate survives its gates.
    fn process_sv(&mut self, nodes: &[RegionId], free_nodes: &mut BTreeSet<RegionId>) {
        let mut svb = SvBuilder::new(nodes, &self.store);

        for &id in nodes {
            let unpaired = &svb.unpaired;
            self.store
                .remove_reads_in_region_if(id, |r| !unpaired.contains(&r.name));
        }

        let passes_gates = svb.num_pairs >= self.opts.min_read_pair
            && svb.dominant_count() >= self.opts.min_read_pair;

        if passes_gates {
            let mut read_count_accumulator = ReadCounts::default();
            if nodes.len() == 2 {
                self.store.accumulate_reads_between_regions(
                    &mut read_count_accumulator,
                    nodes[0],
                    nodes[1],
                );
            }
            svb.compute_copy_number(&read_count_accumulator, &self.lib_info.read_density);

            // Center the left breakpoint for non-inversion geometries.
            if svb.flag != PairFlag::ArpRf
                && svb.flag != PairFlag::ArpRr
                && svb.pos[0] + self.max_readlen - 5 < svb.pos[1]
            {
                svb.pos[0] += self.max_readlen - 5;
            }
            svb.pos[0] += 1;
            svb.pos[1] += 1;

            let total_region_size = self.store.sum_of_region_sizes(nodes);
            let empty = std::collections::BTreeMap::new();
            let readcounts = svb
                .type_library_readcount
                .get(&svb.flag)
                .unwrap_or(&empty);
            let log_p = log_prob_score(
                total_region_size,
                readcounts,
                svb.flag,
                self.opts.fisher,
                self.lib_info,
            );
            let phred_q = phred(log_p);

            if phred_q > self.opts.score_threshold {
                if let Err(e) =
                    self.emitter
                        .emit(&svb, phred_q, self.opts, self.cfg, &self.ref_names)
                {
                    tracing::warn!("emit failed: {e}");
                }
                self.stats.calls_emitted += 1;
            }
        }

        for name in &svb.reads_to_free {
            self.store.erase_read(name);
        }
        free_nodes.extend(nodes.iter().copied());
    }

    /// End of stream: promote whatever is buffered, then drain the graph.
    pub fn finish(&mut self) -> Result<()> {
        if !self.reads_in_current_region.is_empty() {
            self.process_breakpoint();
        }
        self.build_connection();
        self.emitter.flush()
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    #[doc(hidden)]
    pub fn store(&self) -> &RegionStore {
        &self.store
    }
}
