//! Candidate assembly: fuse the reads of one or two linked regions into an SV
//! candidate with a dominant flag, anchor coordinates, and copy-number
//! estimates.

use crate::read::{Orientation, PairFlag, Read};
use crate::region::{ReadCounts, RegionStore};
use crate::types::{HashMap, HashMapExt, HashSet, LibIndex, RegionId, Tid};
use std::collections::BTreeMap;

/// Aggregated evidence for one SV candidate.
///
/// Pairs complete when a query name is seen twice across the candidate's
/// regions; names still pending afterwards are the unpaired residue that
/// stays behind for future traversals.
#[derive(Debug)]
pub struct SvBuilder {
    /// Dominant flag: most supporting pairs, ties to the lower flag.
    pub flag: PairFlag,
    pub chr: [Tid; 2],
    /// 0-based anchor coordinates until the emitter converts them.
    pub pos: [i64; 2],
    pub fwd_read_count: [u32; 2],
    pub rev_read_count: [u32; 2],
    /// Names observed exactly twice.
    pub num_pairs: u32,
    /// Supporting pairs per flag.
    pub flag_counts: BTreeMap<PairFlag, u32>,
    pub type_library_readcount: BTreeMap<PairFlag, BTreeMap<LibIndex, u32>>,
    /// Sum of |isize| per flag and library, for the span-difference column.
    pub type_library_meanspan: BTreeMap<PairFlag, BTreeMap<LibIndex, i64>>,
    /// Names observed exactly once within the candidate.
    pub unpaired: HashSet<String>,
    /// Completed pairs in completion order, first-seen mate first.
    pub support_reads: Vec<Read>,
    /// Names whose reads were consumed as support.
    pub reads_to_free: Vec<String>,
    pub copy_number: HashMap<String, f32>,
    pub allele_frequency: f32,
}

impl SvBuilder {
    /// Bucket the reads of `nodes` (one or two region ids, ascending) into a
    /// candidate. `nodes` regions must be live.
    pub fn new(nodes: &[RegionId], store: &RegionStore) -> Self {
        let two_nodes = nodes.len() == 2;

        let mut pending: HashMap<&str, (&Read, usize)> = HashMap::new();
        // (read, anchor) for each mate of each completed pair.
        let mut anchored: Vec<(&Read, usize)> = Vec::new();

        let mut num_pairs = 0u32;
        let mut flag_counts: BTreeMap<PairFlag, u32> = BTreeMap::new();
        let mut type_library_readcount: BTreeMap<PairFlag, BTreeMap<LibIndex, u32>> =
            BTreeMap::new();
        let mut type_library_meanspan: BTreeMap<PairFlag, BTreeMap<LibIndex, i64>> =
            BTreeMap::new();
        let mut support_reads: Vec<Read> = Vec::new();
        let mut reads_to_free: Vec<String> = Vec::new();

        for (node_idx, &id) in nodes.iter().enumerate() {
            for read in &store.region(id).reads {
                match pending.remove(read.name.as_str()) {
                    None => {
                        pending.insert(&read.name, (read, node_idx));
                    }
                    Some((first, first_node)) => {
                        num_pairs += 1;
                        let flag = read.flag();
                        *flag_counts.entry(flag).or_default() += 1;
                        *type_library_readcount
                            .entry(flag)
                            .or_default()
                            .entry(read.lib_index)
                            .or_default() += 1;
                        *type_library_meanspan
                            .entry(flag)
                            .or_default()
                            .entry(read.lib_index)
                            .or_default() += read.abs_isize();

                        // Two regions anchor by node; one region splits the
                        // pair by arrival order (leftmost mate first in a
                        // sorted stream).
                        let (a0, a1) = if two_nodes {
                            (first_node, node_idx)
                        } else {
                            (0, 1)
                        };
                        anchored.push((first, a0));
                        anchored.push((read, a1));
                        support_reads.push(first.clone());
                        support_reads.push(read.clone());
                        reads_to_free.push(read.name.clone());
                    }
                }
            }
        }

        // Dominant flag: highest pair count; BTreeMap order sends ties to the
        // lower flag.
        let mut flag = PairFlag::Na;
        let mut best_count = 0u32;
        for (&candidate, &count) in &flag_counts {
            if count > best_count {
                best_count = count;
                flag = candidate;
            }
        }

        let mut chr = [0 as Tid; 2];
        let mut pos_default = [0i64; 2];
        for i in 0..2 {
            let id = nodes[i.min(nodes.len() - 1)];
            chr[i] = store.region(id).tid;
            pos_default[i] = store.region(id).start;
        }

        let mut pos_sum = [0i64; 2];
        let mut fwd_read_count = [0u32; 2];
        let mut rev_read_count = [0u32; 2];
        for &(read, anchor) in &anchored {
            if read.flag() != flag {
                continue;
            }
            pos_sum[anchor] += read.pos;
            match read.ori {
                Orientation::Fwd => fwd_read_count[anchor] += 1,
                Orientation::Rev => rev_read_count[anchor] += 1,
            }
        }
        let mut pos = [0i64; 2];
        for i in 0..2 {
            let n = (fwd_read_count[i] + rev_read_count[i]) as i64;
            pos[i] = if n > 0 { pos_sum[i] / n } else { pos_default[i] };
        }

        let unpaired: HashSet<String> = pending.keys().map(|name| name.to_string()).collect();

        SvBuilder {
            flag,
            chr,
            pos,
            fwd_read_count,
            rev_read_count,
            num_pairs,
            flag_counts,
            type_library_readcount,
            type_library_meanspan,
            unpaired,
            support_reads,
            reads_to_free,
            copy_number: HashMap::new(),
            allele_frequency: f32::NAN,
        }
    }

    pub fn dominant_count(&self) -> u32 {
        self.flag_counts.get(&self.flag).copied().unwrap_or(0)
    }

    /// Depth-based copy number per bucket: observed normal reads over the
    /// expected count for the candidate span, times ploidy. The allele
    /// frequency falls out of the mean copy number; with no depth buckets it
    /// stays NaN.
    pub fn compute_copy_number(
        &mut self,
        read_count_accumulator: &ReadCounts,
        read_density: &HashMap<String, f64>,
    ) {
        let span = (self.pos[1] - self.pos[0]) as f32;
        let mut keys: Vec<&String> = read_count_accumulator.keys().collect();
        keys.sort();

        let mut copy_number_sum = 0.0f32;
        for key in keys {
            let observed = read_count_accumulator[key] as f32;
            let Some(&density) = read_density.get(key) else {
                continue;
            };
            if density <= 0.0 {
                continue;
            }
            let cn = observed / (density as f32 * span) * 2.0;
            self.copy_number.insert(key.clone(), cn);
            copy_number_sum += cn;
        }
        self.allele_frequency =
            1.0 - copy_number_sum / (2.0 * read_count_accumulator.len() as f32);
    }
}
