//! Live-region bookkeeping: the region store, the query-name → region index,
//! and the mate-link graph between regions.

// region.rs is shared between the library and binary targets.  Accessors used
// only by the test surface look "unused" to the binary — suppress those
// false-positive warnings.
#![allow(dead_code)]

use crate::read::Read;
use crate::types::{HashMap, RegionId, Tid};
use std::collections::BTreeMap;

/// Normal-read counts keyed by copy-number bucket (library name or BAM path).
pub type ReadCounts = HashMap<String, u32>;

/// Adjacency of the mate-link graph; BTreeMaps keep node and edge iteration
/// deterministic by region id.
pub type Graph = BTreeMap<RegionId, BTreeMap<RegionId, u32>>;

/// A finalized window of anomalous reads on one reference.
///
/// Start/end and the normal-read counts are fixed at promotion; the read
/// vector only ever shrinks as traversals consume support.
#[derive(Debug)]
pub struct Region {
    pub tid: Tid,
    pub start: i64,
    pub end: i64,
    pub normal_read_count: u32,
    pub lib_counts: ReadCounts,
    pub reads: Vec<Read>,
}

impl Region {
    pub fn size(&self) -> i64 {
        self.end - self.start
    }
}

/// Owner of all live regions plus the two secondary structures that keep
/// mate-pair evidence queryable: the name → regions map and the link graph.
#[derive(Debug, Default)]
pub struct RegionStore {
    regions: Vec<Option<Region>>,
    read_regions: HashMap<String, Vec<RegionId>>,
    graph: Graph,
}

impl RegionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Promote a finalized window into a live region, wiring mate links to
    /// every earlier region that already holds a read of the same name.
    /// Region ids are issued monotonically and never reused.
    pub fn add_region(
        &mut self,
        tid: Tid,
        start: i64,
        end: i64,
        normal_read_count: u32,
        lib_counts: ReadCounts,
        reads: Vec<Read>,
    ) -> RegionId {
        let id = self.regions.len();
        self.regions.push(Some(Region {
            tid,
            start,
            end,
            normal_read_count,
            lib_counts,
            reads: Vec::new(),
        }));
        self.link_and_attach(id, reads);
        id
    }

    /// Fold a sub-threshold window into the most recently created region.
    /// Its span and normal counts are left untouched; only reads (and their
    /// mate links) are merged. With no predecessor the reads are dropped.
    pub fn collapse_into_last_region(&mut self, reads: Vec<Read>, lib_counts: ReadCounts) {
        let Some(id) = self.regions.len().checked_sub(1) else {
            return;
        };
        if self.regions[id].is_none() {
            return;
        }
        self.link_and_attach(id, reads);
        if let Some(region) = self.regions[id].as_mut() {
            for (key, n) in lib_counts {
                *region.lib_counts.entry(key).or_default() += n;
            }
        }
    }

    fn link_and_attach(&mut self, id: RegionId, reads: Vec<Read>) {
        for read in &reads {
            if let Some(prior) = self.read_regions.get(&read.name) {
                for &p in prior {
                    if p == id {
                        *self.graph.entry(id).or_default().entry(id).or_default() += 1;
                    } else {
                        *self.graph.entry(p).or_default().entry(id).or_default() += 1;
                        *self.graph.entry(id).or_default().entry(p).or_default() += 1;
                    }
                }
            }
            let entry = self.read_regions.entry(read.name.clone()).or_default();
            if !entry.contains(&id) {
                entry.push(id);
            }
        }
        if let Some(region) = self.regions[id].as_mut() {
            region.reads.extend(reads);
        }
    }

    pub fn region(&self, id: RegionId) -> &Region {
        self.regions[id].as_ref().expect("region must be live")
    }

    pub fn region_exists(&self, id: RegionId) -> bool {
        self.regions.get(id).is_some_and(|r| r.is_some())
    }

    pub fn num_reads_in_region(&self, id: RegionId) -> usize {
        self.regions[id].as_ref().map_or(0, |r| r.reads.len())
    }

    pub fn num_regions(&self) -> usize {
        self.regions.iter().filter(|r| r.is_some()).count()
    }

    /// Destroy a region and purge all of its reads from the name index.
    pub fn clear_region(&mut self, id: RegionId) {
        let Some(region) = self.regions[id].take() else {
            return;
        };
        for read in &region.reads {
            if let Some(ids) = self.read_regions.get_mut(&read.name) {
                ids.retain(|&r| r != id);
                if ids.is_empty() {
                    self.read_regions.remove(&read.name);
                }
            }
        }
    }

    /// Drop reads matching `predicate` from a region's vector in place. The
    /// name index is not touched here; consumed reads are erased separately.
    pub fn remove_reads_in_region_if<F: Fn(&Read) -> bool>(&mut self, id: RegionId, predicate: F) {
        if let Some(region) = self.regions[id].as_mut() {
            region.reads.retain(|r| !predicate(r));
        }
    }

    /// Remove one query name from the name index entirely.
    pub fn erase_read(&mut self, name: &str) {
        self.read_regions.remove(name);
    }

    pub fn regions_of_read(&self, name: &str) -> Option<&[RegionId]> {
        self.read_regions.get(name).map(|v| v.as_slice())
    }

    pub fn sum_of_region_sizes(&self, ids: &[RegionId]) -> i64 {
        ids.iter().map(|&id| self.region(id).size()).sum()
    }

    /// Sum per-bucket normal-read counts over the two candidate regions.
    pub fn accumulate_reads_between_regions(
        &self,
        acc: &mut ReadCounts,
        a: RegionId,
        b: RegionId,
    ) {
        for id in [a, b] {
            if let Some(region) = self.regions[id].as_ref() {
                for (key, n) in &region.lib_counts {
                    *acc.entry(key.clone()).or_default() += n;
                }
            }
        }
    }

    /// Hand the whole link graph to a traversal, leaving an empty one behind.
    /// A traversal consumes every node it visits, so the next flush starts
    /// from links added after this point only.
    pub fn take_graph(&mut self) -> Graph {
        std::mem::take(&mut self.graph)
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }
}
