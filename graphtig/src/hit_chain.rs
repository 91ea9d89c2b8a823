//! Chaining of word hits of a long read into a walk along the graph.
//! Hits on the same contig whose diagonals (contig offset minus read offset) stay within a tolerance
//! growing with the distance between them are grouped into collections. Collections on contigs
//! adjacent in the traversion table are then chained by dynamic programming, requiring the read
//! offset implied for the junction of two contigs to agree on both sides.
use crate::traversion::TraversionTable;
use definitions::{ContigGraph, ContigPosition};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    /// Allowed difference of diagonals between two hits next to each other.
    pub tolerance: usize,
    /// Additional allowed difference per base between two hits.
    pub drift_rate: f64,
}

impl std::default::Default for ChainConfig {
    fn default() -> Self {
        Self {
            tolerance: 10,
            drift_rate: 0.15,
        }
    }
}

impl ChainConfig {
    pub fn new(tolerance: usize, drift_rate: f64) -> Self {
        Self {
            tolerance,
            drift_rate,
        }
    }
    fn allowed(&self, distance: usize) -> f64 {
        self.tolerance as f64 + distance as f64 * self.drift_rate
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Hit {
    pub read_position: usize,
    pub contig_position: usize,
}

impl Hit {
    pub fn new(read_position: usize, contig_position: usize) -> Self {
        Self {
            read_position,
            contig_position,
        }
    }
    pub fn diagonal(&self) -> i64 {
        self.contig_position as i64 - self.read_position as i64
    }
}

/// Hits of a read on one oriented contig, consistent in diagonal. Sorted by read position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HitCollection {
    contig: i64,
    hits: Vec<Hit>,
}

impl HitCollection {
    pub fn new(contig: i64, hits: Vec<Hit>) -> Self {
        assert!(!hits.is_empty());
        Self { contig, hits }
    }
    pub fn contig(&self) -> i64 {
        self.contig
    }
    pub fn hits(&self) -> &[Hit] {
        &self.hits
    }
    pub fn first(&self) -> &Hit {
        &self.hits[0]
    }
    pub fn last(&self) -> &Hit {
        &self.hits[self.hits.len() - 1]
    }
    pub fn score(&self) -> usize {
        self.hits.len()
    }
    fn accepts(&self, hit: &Hit, config: &ChainConfig) -> bool {
        let last = self.last();
        if hit.read_position <= last.read_position {
            return false;
        }
        let distance = hit.read_position - last.read_position;
        let drift = (hit.diagonal() - last.diagonal()).unsigned_abs();
        drift as f64 <= config.allowed(distance)
    }
}

/// Group the hits of each read offset (as returned by [WordIndex::hits](crate::word_index::WordIndex::hits))
/// into collections. A hit joins the most recent compatible collection of its contig.
pub fn collect_hits(hits: &[Vec<ContigPosition>], config: &ChainConfig) -> Vec<HitCollection> {
    let mut collections: Vec<HitCollection> = vec![];
    let mut by_contig: HashMap<i64, Vec<usize>> = HashMap::new();
    for (read_position, positions) in hits.iter().enumerate() {
        for pos in positions.iter() {
            let hit = Hit::new(read_position, pos.position);
            let slots = by_contig.entry(pos.contig).or_default();
            let slot = slots
                .iter()
                .rev()
                .find(|&&i| collections[i].accepts(&hit, config))
                .copied();
            match slot {
                Some(i) => collections[i].hits.push(hit),
                None => {
                    slots.push(collections.len());
                    collections.push(HitCollection::new(pos.contig, vec![hit]));
                }
            }
        }
    }
    collections
}

/// True if all the hits lie on one contig and the read, projected along their diagonals,
/// stays away from both ends of the contig.
pub fn is_internal(
    graph: &ContigGraph,
    collections: &[HitCollection],
    read_len: usize,
    config: &ChainConfig,
) -> bool {
    let contig = match collections.first() {
        Some(c) => c.contig,
        None => return false,
    };
    if collections.iter().any(|c| c.contig != contig) {
        return false;
    }
    let first = collections.iter().map(|c| c.first()).min_by_key(|h| h.read_position);
    let last = collections.iter().map(|c| c.last()).max_by_key(|h| h.read_position);
    let (first, last) = match (first, last) {
        (Some(first), Some(last)) => (first, last),
        _ => return false,
    };
    let start = first.diagonal() as f64;
    let tail = read_len.saturating_sub(last.read_position);
    let end = (last.contig_position + tail) as f64;
    let len = graph.contig_length(contig) as f64;
    config.allowed(first.read_position) < start && end + config.allowed(tail) < len
}

/// A walk implied by a chain of hit collections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chain {
    pub contigs: Vec<i64>,
    /// The number of hits supporting the walk.
    pub score: usize,
    /// The first and the last read offsets with a hit.
    pub read_start: usize,
    pub read_end: usize,
    /// Where the hit at `read_start` lies on the first contig.
    pub seed: ContigPosition,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BestChain {
    None,
    Unique(Chain),
    /// Distinct walks are equally supported.
    Ambiguous,
}

/// The classification of a long read by its hits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainOutcome {
    NoHits,
    /// All the hits are inside one contig, so the read says nothing about paths.
    Internal,
    NoChain,
    Ambiguous,
    Chained(Chain),
}

#[derive(Debug, Clone, Copy)]
struct Cell {
    score: usize,
    previous: Option<usize>,
    tied: bool,
}

pub struct HitChainer<'a> {
    graph: &'a ContigGraph,
    traversions: &'a TraversionTable,
    config: ChainConfig,
}

impl<'a> HitChainer<'a> {
    pub fn new(graph: &'a ContigGraph, traversions: &'a TraversionTable, config: ChainConfig) -> Self {
        assert!(traversions.is_current(graph), "stale traversion table");
        Self {
            graph,
            traversions,
            config,
        }
    }
    // True if `to` can follow `from` in a walk.
    fn is_compatible(&self, from: &HitCollection, to: &HitCollection) -> bool {
        if to.first().read_position <= from.first().read_position
            || to.last().read_position <= from.last().read_position
        {
            return false;
        }
        if !self.traversions.next(from.contig).contains(&to.contig) {
            return false;
        }
        // Read offset of the start of `to` as seen from both sides.
        let junction = self.graph.contig_length(from.contig) - self.graph.overlap();
        let expected = junction as i64 - from.last().diagonal();
        let actual = -to.first().diagonal();
        let distance = to
            .first()
            .read_position
            .abs_diff(from.last().read_position);
        (expected - actual).unsigned_abs() as f64 <= self.config.allowed(distance)
    }
    /// Group the hits of a read of length `read_len` and chain them.
    pub fn chain_read(&self, hits: &[Vec<ContigPosition>], read_len: usize) -> ChainOutcome {
        let collections = collect_hits(hits, &self.config);
        if collections.is_empty() {
            return ChainOutcome::NoHits;
        }
        if is_internal(self.graph, &collections, read_len, &self.config) {
            return ChainOutcome::Internal;
        }
        match self.best_chain(&collections) {
            BestChain::Unique(chain) => ChainOutcome::Chained(chain),
            BestChain::Ambiguous => ChainOutcome::Ambiguous,
            BestChain::None => ChainOutcome::NoChain,
        }
    }
    /// The chain with the most hits, if it is unique.
    pub fn best_chain(&self, collections: &[HitCollection]) -> BestChain {
        let mut order: Vec<usize> = (0..collections.len()).collect();
        order.sort_by_key(|&i| (collections[i].first().read_position, collections[i].contig));
        let empty = Cell {
            score: 0,
            previous: None,
            tied: false,
        };
        let mut cells: Vec<Cell> = vec![empty; collections.len()];
        for (k, &j) in order.iter().enumerate() {
            let target = &collections[j];
            // The best predecessor for each contig.
            let mut per_contig: HashMap<i64, usize> = HashMap::new();
            for &i in order[..k].iter() {
                if !self.is_compatible(&collections[i], target) {
                    continue;
                }
                let slot = per_contig.entry(collections[i].contig).or_insert(i);
                if cells[*slot].score < cells[i].score {
                    *slot = i;
                }
            }
            let best = per_contig.values().map(|&i| cells[i].score).max();
            cells[j] = match best {
                Some(best) => {
                    let mut preds: Vec<usize> = per_contig
                        .values()
                        .copied()
                        .filter(|&i| cells[i].score == best)
                        .collect();
                    preds.sort_unstable();
                    let previous = preds[0];
                    Cell {
                        score: best + target.score(),
                        previous: Some(previous),
                        tied: 1 < preds.len() || cells[previous].tied,
                    }
                }
                None => Cell {
                    score: target.score(),
                    ..empty
                },
            };
        }
        let best = match cells.iter().map(|c| c.score).max() {
            Some(best) => best,
            None => return BestChain::None,
        };
        let mut chains: Vec<Chain> = vec![];
        for end in order.iter().copied().filter(|&j| cells[j].score == best) {
            if cells[end].tied {
                return BestChain::Ambiguous;
            }
            let mut members = vec![end];
            let mut current = end;
            while let Some(previous) = cells[current].previous {
                members.push(previous);
                current = previous;
            }
            members.reverse();
            let contigs: Vec<i64> = members.iter().map(|&i| collections[i].contig).collect();
            if chains.iter().all(|c| c.contigs != contigs) {
                let head = &collections[members[0]];
                chains.push(Chain {
                    contigs,
                    score: best,
                    read_start: head.first().read_position,
                    read_end: collections[end].last().read_position,
                    seed: ContigPosition::new(head.contig, head.first().contig_position),
                });
            }
        }
        trace!("CHAIN\t{}\t{}", collections.len(), chains.len());
        match chains.len() {
            1 => chains.pop().map_or(BestChain::None, BestChain::Unique),
            _ => BestChain::Ambiguous,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kmer::tests::random_seq;
    use rand::SeedableRng;
    use rand_xoshiro::Xoroshiro128PlusPlus;
    #[test]
    fn diagonal_collections() {
        let mut hits = vec![vec![]; 21];
        hits[0].push(ContigPosition::new(4, 4));
        hits[6].push(ContigPosition::new(1, 10));
        hits[15].push(ContigPosition::new(4, 19));
        hits[20].push(ContigPosition::new(5, 6));
        let config = ChainConfig::new(2, 0.1);
        let collections = collect_hits(&hits, &config);
        assert_eq!(collections.len(), 3);
        assert_eq!(collections[0].contig(), 4);
        assert_eq!(collections[0].score(), 2);
        assert_eq!(collections[0].last(), &Hit::new(15, 19));
        // Drifted too far.
        hits[15][0] = ContigPosition::new(4, 30);
        assert_eq!(collect_hits(&hits, &config).len(), 4);
    }
    fn three_contigs() -> ContigGraph {
        let mut rng: Xoroshiro128PlusPlus = SeedableRng::seed_from_u64(3_433);
        let mut graph = ContigGraph::new(0);
        for _ in 0..3 {
            graph.add_contig(&random_seq(&mut rng, 30)).unwrap();
        }
        graph.add_path(&[1, 2]).unwrap();
        graph.add_path(&[1, 3]).unwrap();
        graph
    }
    fn collection(contig: i64, hits: &[(usize, usize)]) -> HitCollection {
        let hits = hits.iter().map(|&(r, c)| Hit::new(r, c)).collect();
        HitCollection::new(contig, hits)
    }
    #[test]
    fn chaining() {
        let graph = three_contigs();
        let table = TraversionTable::new(&graph);
        let chainer = HitChainer::new(&graph, &table, ChainConfig::new(2, 0.1));
        let first = collection(1, &[(0, 0), (10, 10)]);
        let second = collection(2, &[(35, 5), (50, 20)]);
        let weak = collection(3, &[(36, 6)]);
        let chain = match chainer.best_chain(&[first.clone(), second.clone(), weak]) {
            BestChain::Unique(chain) => chain,
            x => panic!("{:?}", x),
        };
        assert_eq!(chain.contigs, vec![1, 2]);
        assert_eq!(chain.score, 4);
        assert_eq!((chain.read_start, chain.read_end), (0, 50));
        assert_eq!(chain.seed, ContigPosition::new(1, 0));
        // Inconsistent junction.
        let shifted = collection(2, &[(45, 5), (60, 20)]);
        let outcome = chainer.best_chain(&[first.clone(), shifted]);
        assert_eq!(outcome, BestChain::Ambiguous);
        // Two equally good continuations.
        let rival = collection(3, &[(35, 5), (50, 20)]);
        let outcome = chainer.best_chain(&[first, second, rival]);
        assert_eq!(outcome, BestChain::Ambiguous);
        assert_eq!(chainer.best_chain(&[]), BestChain::None);
    }
    #[test]
    fn read_outcomes() {
        let graph = three_contigs();
        let table = TraversionTable::new(&graph);
        let chainer = HitChainer::new(&graph, &table, ChainConfig::new(2, 0.0));
        assert_eq!(chainer.chain_read(&[vec![], vec![]], 20), ChainOutcome::NoHits);
        let mut hits = vec![vec![]; 10];
        hits[0].push(ContigPosition::new(1, 10));
        hits[5].push(ContigPosition::new(1, 15));
        assert_eq!(chainer.chain_read(&hits, 10), ChainOutcome::Internal);
        let mut hits = vec![vec![]; 51];
        hits[0].push(ContigPosition::new(1, 0));
        hits[10].push(ContigPosition::new(1, 10));
        hits[35].push(ContigPosition::new(2, 5));
        hits[50].push(ContigPosition::new(2, 20));
        match chainer.chain_read(&hits, 55) {
            ChainOutcome::Chained(chain) => assert_eq!(chain.contigs, vec![1, 2]),
            x => panic!("{:?}", x),
        }
    }
    #[test]
    fn internal_hits() {
        let graph = three_contigs();
        let config = ChainConfig::new(2, 0.0);
        let inside = vec![collection(1, &[(0, 10), (5, 15)])];
        assert!(is_internal(&graph, &inside, 10, &config));
        let at_start = vec![collection(1, &[(0, 1), (5, 6)])];
        assert!(!is_internal(&graph, &at_start, 10, &config));
        let at_end = vec![collection(1, &[(0, 18), (5, 23)])];
        assert!(!is_internal(&graph, &at_end, 10, &config));
        let spread = vec![collection(1, &[(0, 10)]), collection(2, &[(5, 15)])];
        assert!(!is_internal(&graph, &spread, 10, &config));
    }
}
