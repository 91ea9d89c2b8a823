//! Mapping of reads to a contig graph.
//! Every read ends with one [ReadOutcome]. Reads mapped uniquely add support to the graph:
//! a read inside one contig increments the `readCount` of the contig, and a read spanning
//! several contigs increments the `readCount` of the path through them, adding the path if the
//! graph has none yet.
//! Reads are aligned concurrently against an immutable graph, and the support is written
//! back on the calling thread once every read has been consumed.
use crate::async_source::{AsyncReadPool, AsyncReadSource};
use crate::error::{AssemblyError, Result};
use crate::flow_align::FlowAligner;
use crate::graph_align::{GraphAligner, GraphAlignment, TooManyPaths};
use crate::hit_chain::{ChainConfig, ChainOutcome, HitChainer};
use crate::simplify::read_count;
use crate::traversion::TraversionTable;
use crate::word_index::WordIndex;
use definitions::{reverse_path, ContigGraph, IntegerOrPercentage, READ_COUNT};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapConfig {
    pub word_size: usize,
    pub step_size: usize,
    pub max_mismatches: IntegerOrPercentage,
    /// Reads branching into more alignments than this are skipped.
    pub max_paths: usize,
    /// Fragments with more combinations of end alignments than this are not paired.
    pub max_pairings: usize,
}

impl std::default::Default for MapConfig {
    fn default() -> Self {
        Self {
            word_size: 16,
            step_size: 8,
            max_mismatches: IntegerOrPercentage::Percentage(10f64),
            max_paths: 1000,
            max_pairings: 100,
        }
    }
}

impl MapConfig {
    pub fn new(
        word_size: usize,
        step_size: usize,
        max_mismatches: IntegerOrPercentage,
        max_paths: usize,
        max_pairings: usize,
    ) -> Self {
        Self {
            word_size,
            step_size,
            max_mismatches,
            max_paths,
            max_pairings,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LongReadConfig {
    pub word_size: usize,
    pub step_size: usize,
    /// Edit distance allowed when aligning a read along its chain.
    pub max_score: IntegerOrPercentage,
    /// Reads branching into more alignments than this are skipped.
    pub max_paths: usize,
    pub chain: ChainConfig,
}

impl std::default::Default for LongReadConfig {
    fn default() -> Self {
        Self {
            word_size: 12,
            step_size: 4,
            max_score: IntegerOrPercentage::Percentage(25f64),
            max_paths: 1000,
            chain: ChainConfig::default(),
        }
    }
}

impl LongReadConfig {
    pub fn new(
        word_size: usize,
        step_size: usize,
        max_score: IntegerOrPercentage,
        max_paths: usize,
        chain: ChainConfig,
    ) -> Self {
        Self {
            word_size,
            step_size,
            max_score,
            max_paths,
            chain,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReadOutcome {
    Mapped,
    NoHits,
    NoPath,
    TooManyPaths,
    Ambiguous,
}

/// Running mean and variance of insert sizes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct InsertSizeStats {
    count: u64,
    mean: f64,
    m2: f64,
}

impl InsertSizeStats {
    pub fn add(&mut self, size: usize) {
        let x = size as f64;
        self.count += 1;
        let delta = x - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (x - self.mean);
    }
    pub fn merge(&mut self, other: &Self) {
        if other.count == 0 {
            return;
        }
        if self.count == 0 {
            *self = *other;
            return;
        }
        let (n1, n2) = (self.count as f64, other.count as f64);
        let total = n1 + n2;
        let delta = other.mean - self.mean;
        self.mean += delta * n2 / total;
        self.m2 += other.m2 + delta * delta * n1 * n2 / total;
        self.count += other.count;
    }
    pub fn count(&self) -> u64 {
        self.count
    }
    pub fn mean(&self) -> f64 {
        self.mean
    }
    pub fn std_dev(&self) -> f64 {
        match self.count {
            0 => 0f64,
            n => (self.m2 / n as f64).sqrt(),
        }
    }
}

/// Counters of a mapping run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MappingStats {
    pub reads: u64,
    pub mapped: u64,
    pub cross_contig: u64,
    pub no_hits: u64,
    pub no_path: u64,
    pub too_many_paths: u64,
    pub ambiguous: u64,
    /// Long reads inside a single contig.
    pub internal: u64,
    pub too_many_pairings: u64,
    /// Fragments with every end mapped.
    pub pairs: u64,
    pub insert_size: InsertSizeStats,
}

impl MappingStats {
    pub fn record(&mut self, outcome: ReadOutcome) {
        self.reads += 1;
        match outcome {
            ReadOutcome::Mapped => self.mapped += 1,
            ReadOutcome::NoHits => self.no_hits += 1,
            ReadOutcome::NoPath => self.no_path += 1,
            ReadOutcome::TooManyPaths => self.too_many_paths += 1,
            ReadOutcome::Ambiguous => self.ambiguous += 1,
        }
    }
    pub fn merge(mut self, other: &Self) -> Self {
        self.reads += other.reads;
        self.mapped += other.mapped;
        self.cross_contig += other.cross_contig;
        self.no_hits += other.no_hits;
        self.no_path += other.no_path;
        self.too_many_paths += other.too_many_paths;
        self.ambiguous += other.ambiguous;
        self.internal += other.internal;
        self.too_many_pairings += other.too_many_pairings;
        self.pairs += other.pairs;
        self.insert_size.merge(&other.insert_size);
        self
    }
}

impl std::fmt::Display for MappingStats {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        writeln!(f, "Reads\t{}", self.reads)?;
        writeln!(f, "Mapped\t{}", self.mapped)?;
        writeln!(f, "CrossContig\t{}", self.cross_contig)?;
        writeln!(f, "NoHits\t{}", self.no_hits)?;
        writeln!(f, "NoPath\t{}", self.no_path)?;
        writeln!(f, "TooManyPaths\t{}", self.too_many_paths)?;
        writeln!(f, "Ambiguous\t{}", self.ambiguous)?;
        writeln!(f, "Internal\t{}", self.internal)?;
        writeln!(f, "TooManyPairings\t{}", self.too_many_pairings)?;
        writeln!(f, "Pairs\t{}", self.pairs)?;
        write!(
            f,
            "InsertSize\t{}\t{:.1}\t{:.1}",
            self.insert_size.count,
            self.insert_size.mean(),
            self.insert_size.std_dev()
        )
    }
}

// The orientation-free form of a walk, palindromes taken positively.
fn canonical_path(graph: &ContigGraph, contigs: &[i64]) -> Vec<i64> {
    let normalize = |ids: Vec<i64>| -> Vec<i64> {
        ids.into_iter()
            .map(|id| match graph.is_palindrome(id) {
                true => id.abs(),
                false => id,
            })
            .collect()
    };
    let forward = normalize(contigs.to_vec());
    let reverse = normalize(reverse_path(contigs));
    forward.min(reverse)
}

fn increment(count: u64, by: u64) -> String {
    (count + by).to_string()
}

/// Support collected from uniquely mapped reads, waiting to be written to the graph.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathTracker {
    contigs: BTreeMap<i64, u64>,
    paths: BTreeMap<Vec<i64>, u64>,
}

impl PathTracker {
    pub fn add(&mut self, graph: &ContigGraph, contigs: &[i64]) {
        match contigs {
            [] => {}
            [contig] => *self.contigs.entry(contig.abs()).or_default() += 1,
            _ => *self.paths.entry(canonical_path(graph, contigs)).or_default() += 1,
        }
    }
    pub fn merge(mut self, other: Self) -> Self {
        for (contig, count) in other.contigs {
            *self.contigs.entry(contig).or_default() += count;
        }
        for (path, count) in other.paths {
            *self.paths.entry(path).or_default() += count;
        }
        self
    }
    pub fn is_empty(&self) -> bool {
        self.contigs.is_empty() && self.paths.is_empty()
    }
    /// The support of the walk through `contigs`, in either direction.
    pub fn path_support(&self, graph: &ContigGraph, contigs: &[i64]) -> u64 {
        self.paths
            .get(&canonical_path(graph, contigs))
            .copied()
            .unwrap_or(0)
    }
    /// Add the collected support to the `readCount` attributes of `graph`.
    /// Returns the number of paths added.
    pub fn apply(&self, graph: &mut ContigGraph) -> Result<usize> {
        for (&contig, &count) in self.contigs.iter() {
            let value = increment(read_count(graph.contig_attributes(contig)), count);
            graph.set_contig_attribute(contig, READ_COUNT, value);
        }
        let mut existing: HashMap<Vec<i64>, i64> = HashMap::new();
        for path in graph.path_ids() {
            let key = canonical_path(graph, &graph.path(path));
            existing.entry(key).or_insert(path);
        }
        let mut added = 0;
        for (contigs, &count) in self.paths.iter() {
            let path = match existing.get(contigs) {
                Some(&path) => path,
                None => {
                    added += 1;
                    graph.add_path(contigs)?
                }
            };
            let value = increment(read_count(graph.path_attributes(path)), count);
            graph.set_path_attribute(path, READ_COUNT, value);
        }
        debug!(
            "TRACKER\t{}\t{}\t{}",
            self.contigs.len(),
            self.paths.len(),
            added
        );
        Ok(added)
    }
}

/// Where a short read aligns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement {
    NoHits,
    NoPath,
    TooManyPaths,
    /// The alignments with the fewest mismatches. Never empty.
    Found(Vec<GraphAlignment>),
}

impl Placement {
    pub fn outcome(&self) -> ReadOutcome {
        match self {
            Placement::NoHits => ReadOutcome::NoHits,
            Placement::NoPath => ReadOutcome::NoPath,
            Placement::TooManyPaths => ReadOutcome::TooManyPaths,
            Placement::Found(alignments) if alignments.len() == 1 => ReadOutcome::Mapped,
            Placement::Found(_) => ReadOutcome::Ambiguous,
        }
    }
    pub fn unique(&self) -> Option<&GraphAlignment> {
        match self {
            Placement::Found(alignments) if alignments.len() == 1 => alignments.first(),
            _ => None,
        }
    }
    fn alignments(&self) -> &[GraphAlignment] {
        match self {
            Placement::Found(alignments) => alignments,
            _ => &[],
        }
    }
}

/// Maps the reads of one fragment.
pub trait FragmentMapper: Sync {
    fn map_fragment(&self, fragment: &[Vec<u8>], stats: &mut MappingStats, tracker: &mut PathTracker);
}

/// Mapper of accurate short reads.
pub struct GraphMapper<'a> {
    graph: &'a ContigGraph,
    index: &'a WordIndex,
    aligner: GraphAligner<'a>,
    config: MapConfig,
}

impl<'a> GraphMapper<'a> {
    pub fn new(
        graph: &'a ContigGraph,
        traversions: &'a TraversionTable,
        index: &'a WordIndex,
        config: MapConfig,
    ) -> Self {
        let aligner =
            GraphAligner::new(graph, traversions, config.max_mismatches, config.max_paths);
        Self {
            graph,
            index,
            aligner,
            config,
        }
    }
    /// Align `read` from every seed, one seed per diagonal, keeping the best alignments.
    pub fn align_read(&self, read: &[u8]) -> Placement {
        let hits = self.index.hits(read);
        if hits.iter().all(|positions| positions.is_empty()) {
            return Placement::NoHits;
        }
        let mut diagonals = HashSet::new();
        let mut alignments = vec![];
        for (offset, positions) in hits.iter().enumerate() {
            for &seed in positions.iter() {
                if !diagonals.insert((seed.contig, seed.position as i64 - offset as i64)) {
                    continue;
                }
                match self.aligner.align(read, offset, seed) {
                    Ok(found) => alignments.extend(found),
                    Err(TooManyPaths) => return Placement::TooManyPaths,
                }
            }
        }
        let best = match alignments.iter().map(|a| a.score()).min() {
            Some(best) => best,
            None => return Placement::NoPath,
        };
        alignments.retain(|a| a.score() == best);
        alignments.sort();
        alignments.dedup();
        Placement::Found(alignments)
    }
    // Inward distance between the outer ends of a pair aligned to the same contig, if any.
    fn insert_size(&self, first: &GraphAlignment, second: &GraphAlignment) -> Option<usize> {
        match (first.contigs(), second.contigs()) {
            (&[a], &[b]) if a == -b => {
                let len = self.graph.contig_length(a);
                let second_end = len - 1 - second.start();
                (first.start() <= second_end).then(|| second_end - first.start() + 1)
            }
            _ => None,
        }
    }
}

impl<'a> FragmentMapper for GraphMapper<'a> {
    fn map_fragment(&self, fragment: &[Vec<u8>], stats: &mut MappingStats, tracker: &mut PathTracker) {
        let placements: Vec<_> = fragment.iter().map(|read| self.align_read(read)).collect();
        for placement in placements.iter() {
            stats.record(placement.outcome());
            if let Some(alignment) = placement.unique() {
                stats.cross_contig += alignment.is_cross_contig() as u64;
                tracker.add(self.graph, alignment.contigs());
            }
        }
        if let [first, second] = placements.as_slice() {
            let pairings = first.alignments().len() * second.alignments().len();
            if self.config.max_pairings < pairings {
                stats.too_many_pairings += 1;
                return;
            }
            stats.pairs += (0 < pairings) as u64;
            if let (Some(x), Some(y)) = (first.unique(), second.unique()) {
                if let Some(size) = self.insert_size(x, y) {
                    stats.insert_size.add(size);
                }
            }
        }
    }
}

/// Where a long read lies in the graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LongPlacement {
    NoHits,
    /// All the hits are inside one contig.
    Internal,
    NoPath,
    Ambiguous,
    TooManyPaths,
    Found(GraphAlignment),
}

/// Mapper of error-prone long reads.
/// The hits of a read are chained, and the read is then aligned from the first hit of the chain
/// through the graph. Only alignments following the chain are kept.
pub struct LongReadMapper<'a> {
    graph: &'a ContigGraph,
    index: &'a WordIndex,
    chainer: HitChainer<'a>,
    aligner: FlowAligner<'a>,
    config: LongReadConfig,
}

impl<'a> LongReadMapper<'a> {
    pub fn new(
        graph: &'a ContigGraph,
        traversions: &'a TraversionTable,
        index: &'a WordIndex,
        config: LongReadConfig,
    ) -> Self {
        let chainer = HitChainer::new(graph, traversions, config.chain);
        let aligner = FlowAligner::new(graph, traversions, config.max_score, config.max_paths);
        Self {
            graph,
            index,
            chainer,
            aligner,
            config,
        }
    }
    pub fn place_read(&self, read: &[u8]) -> LongPlacement {
        let hits = self.index.hits(read);
        let chain = match self.chainer.chain_read(&hits, read.len()) {
            ChainOutcome::Chained(chain) => chain,
            ChainOutcome::NoHits => return LongPlacement::NoHits,
            ChainOutcome::Internal => return LongPlacement::Internal,
            ChainOutcome::NoChain => return LongPlacement::NoPath,
            ChainOutcome::Ambiguous => return LongPlacement::Ambiguous,
        };
        // Cheap check of the hit span before branching through the graph.
        let end = (chain.read_end + self.index.word_size()).min(read.len());
        let segment = &read[chain.read_start..end];
        let budget = self.config.max_score.resolve(segment.len());
        let score = self
            .aligner
            .align_along(segment, &chain.contigs, chain.seed.position, budget);
        trace!("LONG\tChain\t{}\t{}\t{}", chain.contigs.len(), score, budget);
        if budget < score {
            return LongPlacement::NoPath;
        }
        let alignments = match self.aligner.align(read, chain.read_start, chain.seed) {
            Ok(alignments) => alignments,
            Err(TooManyPaths) => return LongPlacement::TooManyPaths,
        };
        let walk: Vec<i64> = chain
            .contigs
            .iter()
            .map(|&id| match self.graph.is_palindrome(id) {
                true => id.abs(),
                false => id,
            })
            .collect();
        let mut along: Vec<GraphAlignment> = alignments
            .into_iter()
            .filter(|a| a.contigs().windows(walk.len()).any(|w| w == walk.as_slice()))
            .collect();
        trace!("LONG\tAlign\t{}", along.len());
        match along.len() {
            0 => LongPlacement::NoPath,
            1 => along.pop().map_or(LongPlacement::NoPath, LongPlacement::Found),
            _ => LongPlacement::Ambiguous,
        }
    }
}

impl<'a> FragmentMapper for LongReadMapper<'a> {
    fn map_fragment(&self, fragment: &[Vec<u8>], stats: &mut MappingStats, tracker: &mut PathTracker) {
        for read in fragment.iter() {
            match self.place_read(read) {
                LongPlacement::NoHits => stats.record(ReadOutcome::NoHits),
                LongPlacement::NoPath => stats.record(ReadOutcome::NoPath),
                LongPlacement::Ambiguous => stats.record(ReadOutcome::Ambiguous),
                LongPlacement::TooManyPaths => stats.record(ReadOutcome::TooManyPaths),
                LongPlacement::Internal => {
                    stats.reads += 1;
                    stats.internal += 1;
                }
                LongPlacement::Found(alignment) => {
                    stats.record(ReadOutcome::Mapped);
                    stats.cross_contig += alignment.is_cross_contig() as u64;
                    tracker.add(self.graph, alignment.contigs());
                }
            }
        }
    }
}

fn consume<M: FragmentMapper>(
    mapper: &M,
    source: &mut AsyncReadSource,
) -> Result<(MappingStats, PathTracker)> {
    let mut stats = MappingStats::default();
    let mut tracker = PathTracker::default();
    loop {
        let batch = match source.next_batch() {
            Ok(Some(batch)) => batch,
            Ok(None) => break,
            Err(why) => {
                source.abort(&why.to_string());
                return Err(why);
            }
        };
        let (batch_stats, batch_tracker) = batch
            .par_iter()
            .fold(
                || (MappingStats::default(), PathTracker::default()),
                |(mut stats, mut tracker), fragment| {
                    mapper.map_fragment(fragment, &mut stats, &mut tracker);
                    (stats, tracker)
                },
            )
            .reduce(
                || (MappingStats::default(), PathTracker::default()),
                |(s1, t1), (s2, t2)| (s1.merge(&s2), t1.merge(t2)),
            );
        stats = stats.merge(&batch_stats);
        tracker = tracker.merge(batch_tracker);
    }
    Ok((stats, tracker))
}

/// Map every fragment of `pool`, one consumer thread per source.
/// If any source fails or any consumer panics, every consumer stops and the first genuine
/// failure is returned.
pub fn run_pool<M: FragmentMapper>(
    mapper: &M,
    pool: &mut AsyncReadPool,
) -> Result<(MappingStats, PathTracker)> {
    let results: Vec<Result<(MappingStats, PathTracker)>> = std::thread::scope(|scope| {
        let handles: Vec<_> = pool
            .sources_mut()
            .iter_mut()
            .map(|source| {
                scope.spawn(move || {
                    let _guard = source.abort_on_panic();
                    consume(mapper, source)
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| {
                handle
                    .join()
                    .unwrap_or_else(|_| Err(AssemblyError::ConsumerPanicked))
            })
            .collect()
    });
    let mut stats = MappingStats::default();
    let mut tracker = PathTracker::default();
    let mut failure: Option<AssemblyError> = None;
    for result in results {
        match result {
            Ok((s, t)) => {
                stats = stats.merge(&s);
                tracker = tracker.merge(t);
            }
            Err(why) => match failure.as_ref() {
                Some(first) if !first.is_aborted() || why.is_aborted() => {}
                _ => failure = Some(why),
            },
        }
    }
    if let Some(why) = failure {
        pool.abort(&why.to_string());
        return Err(why);
    }
    Ok((stats, tracker))
}

// Run the consumers, close the pool, and write the support into `graph`.
fn map_and_apply<M: FragmentMapper>(
    mapper: &M,
    mut pool: AsyncReadPool,
) -> Result<(MappingStats, PathTracker)> {
    let result = run_pool(mapper, &mut pool);
    let closed = pool.close();
    let result = result?;
    closed?;
    Ok(result)
}

/// Map the short reads of `pool` to `graph`, then add their support to `graph`.
pub fn map_pool(
    graph: &mut ContigGraph,
    pool: AsyncReadPool,
    config: &MapConfig,
) -> Result<MappingStats> {
    let traversions = TraversionTable::new(graph);
    let index = WordIndex::new(graph, config.word_size, config.step_size)?;
    debug!("MAP\tWords\t{}", index.num_words());
    let (stats, tracker) = {
        let mapper = GraphMapper::new(graph, &traversions, &index, *config);
        map_and_apply(&mapper, pool)?
    };
    let added = tracker.apply(graph)?;
    info!("MAP\tNewPaths\t{}", added);
    for line in stats.to_string().lines() {
        info!("MAP\t{}", line);
    }
    Ok(stats)
}

/// Map the long reads of `pool` to `graph`, then add their support to `graph`.
pub fn map_long_pool(
    graph: &mut ContigGraph,
    pool: AsyncReadPool,
    config: &LongReadConfig,
) -> Result<MappingStats> {
    let traversions = TraversionTable::new(graph);
    let index = WordIndex::new(graph, config.word_size, config.step_size)?;
    debug!("LONG\tWords\t{}", index.num_words());
    let (stats, tracker) = {
        let mapper = LongReadMapper::new(graph, &traversions, &index, *config);
        map_and_apply(&mapper, pool)?
    };
    let added = tracker.apply(graph)?;
    info!("LONG\tNewPaths\t{}", added);
    for line in stats.to_string().lines() {
        info!("LONG\t{}", line);
    }
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kmer::tests::random_seq;
    use crate::read_source::{FragmentSource, MemoryReader, ReadSource, SequenceReader};
    use crate::seq::revcmp;
    use rand::SeedableRng;
    use rand_xoshiro::Xoroshiro128PlusPlus;
    fn memory(reads: Vec<Vec<u8>>) -> Box<dyn SequenceReader> {
        Box::new(MemoryReader::new(reads))
    }
    fn single_pool(reads: Vec<Vec<u8>>) -> AsyncReadPool {
        let source: Box<dyn ReadSource> = Box::new(FragmentSource::single(memory(reads)));
        AsyncReadPool::new(vec![source], 2, 2)
    }
    fn exact(word: usize, step: usize) -> MapConfig {
        MapConfig::new(word, step, IntegerOrPercentage::Integer(0), 1000, 100)
    }
    #[test]
    fn across_two_contigs() {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut graph = ContigGraph::new(0);
        graph.add_contig(&[b'A'; 17]).unwrap();
        graph.add_contig(&[b'G'; 14]).unwrap();
        let path = graph.add_path(&[1, 2]).unwrap();
        let read = [vec![b'A'; 12], vec![b'G'; 12]].concat();
        let table = TraversionTable::new(&graph);
        let index = WordIndex::new(&graph, 4, 4).unwrap();
        let mapper = GraphMapper::new(&graph, &table, &index, exact(4, 4));
        let placement = mapper.align_read(&read);
        assert_eq!(placement.outcome(), ReadOutcome::Mapped);
        let alignment = placement.unique().unwrap();
        assert_eq!(alignment.contigs(), &[1, 2]);
        assert_eq!((alignment.start(), alignment.end()), (5, 11));
        let stats = map_pool(&mut graph, single_pool(vec![read]), &exact(4, 4)).unwrap();
        assert_eq!((stats.reads, stats.mapped, stats.cross_contig), (1, 1, 1));
        assert_eq!(graph.path_attribute(path, READ_COUNT), Some("1"));
        assert_eq!(graph.num_paths(), 1);
    }
    #[test]
    fn short_read_outcomes() {
        let mut graph = ContigGraph::new(0);
        graph.add_contig(&[b'A'; 17]).unwrap();
        graph.add_contig(&[b'G'; 14]).unwrap();
        graph.add_path(&[1, 2]).unwrap();
        let reads = vec![
            b"CACACACACA".to_vec(),
            b"AAAAAAAAAACCCCC".to_vec(),
            b"TTTTTTTT".to_vec(),
        ];
        let stats = map_pool(&mut graph, single_pool(reads), &exact(4, 4)).unwrap();
        assert_eq!(stats.reads, 3);
        assert_eq!(stats.no_hits, 1);
        assert_eq!(stats.no_path, 1);
        // Poly-T fits anywhere in the reverse of the A contig.
        assert_eq!(stats.ambiguous, 1);
        assert_eq!(graph.contig_attribute(1, READ_COUNT), None);
    }
    #[test]
    fn mapping_is_strand_symmetric() {
        let mut rng: Xoroshiro128PlusPlus = SeedableRng::seed_from_u64(92_311);
        let mut graph = ContigGraph::new(0);
        for _ in 0..3 {
            graph.add_contig(&random_seq(&mut rng, 60)).unwrap();
        }
        graph.add_path(&[1, -2]).unwrap();
        graph.add_path(&[-2, 3]).unwrap();
        let table = TraversionTable::new(&graph);
        let index = WordIndex::new(&graph, 8, 2).unwrap();
        let mapper = GraphMapper::new(&graph, &table, &index, exact(8, 2));
        let walk = graph.path_sequence(&[1, -2, 3]);
        let read = walk[40..140].to_vec();
        let forward = mapper.align_read(&read);
        let reverse = mapper.align_read(&revcmp(&read));
        let forward = forward.unique().unwrap();
        let reverse = reverse.unique().unwrap();
        assert_eq!(forward.contigs(), &[1, -2, 3]);
        assert_eq!(reverse.contigs(), &[-3, 2, -1]);
        assert_eq!(&forward.reverse(&graph), reverse);
        let mut tracker = PathTracker::default();
        tracker.add(&graph, forward.contigs());
        tracker.add(&graph, reverse.contigs());
        assert_eq!(tracker.path_support(&graph, &[1, -2, 3]), 2);
        assert_eq!(tracker.apply(&mut graph).unwrap(), 1);
        let added = graph.find_paths(&[1, -2, 3]);
        let added = match added.as_slice() {
            &[p] => p,
            _ => graph.find_paths(&[-3, 2, -1])[0],
        };
        assert_eq!(graph.path_attribute(added, READ_COUNT), Some("2"));
        assert_eq!(tracker.apply(&mut graph).unwrap(), 0);
        assert_eq!(graph.path_attribute(added, READ_COUNT), Some("4"));
    }
    #[test]
    fn paired_reads() {
        let mut rng: Xoroshiro128PlusPlus = SeedableRng::seed_from_u64(4_820);
        let mut graph = ContigGraph::new(0);
        let seq = random_seq(&mut rng, 300);
        graph.add_contig(&seq).unwrap();
        let left = seq[10..60].to_vec();
        let right = revcmp(&seq[200..250]);
        let source = FragmentSource::paired(memory(vec![left]), memory(vec![right]));
        let pool = AsyncReadPool::new(vec![Box::new(source) as Box<dyn ReadSource>], 4, 1);
        let config = MapConfig::new(12, 4, IntegerOrPercentage::Percentage(10f64), 100, 100);
        let stats = map_pool(&mut graph, pool, &config).unwrap();
        assert_eq!((stats.reads, stats.mapped, stats.pairs), (2, 2, 1));
        assert_eq!(stats.insert_size.count(), 1);
        assert!((stats.insert_size.mean() - 240f64).abs() < 1e-6);
        assert_eq!(graph.contig_attribute(1, READ_COUNT), Some("2"));
        let mut strict = config;
        strict.max_pairings = 0;
        let source = FragmentSource::roche454(
            memory(vec![seq[10..60].to_vec()]),
            memory(vec![seq[200..250].to_vec()]),
        );
        let pool = AsyncReadPool::new(vec![Box::new(source) as Box<dyn ReadSource>], 4, 1);
        let stats = map_pool(&mut graph, pool, &strict).unwrap();
        assert_eq!((stats.pairs, stats.too_many_pairings), (0, 1));
        assert_eq!(stats.insert_size.count(), 0);
        assert_eq!(graph.contig_attribute(1, READ_COUNT), Some("4"));
    }
    #[test]
    fn insert_size_merge() {
        let sizes = [100, 120, 95, 130, 101, 99];
        let mut whole = InsertSizeStats::default();
        sizes.iter().for_each(|&s| whole.add(s));
        let (mut left, mut right) = (InsertSizeStats::default(), InsertSizeStats::default());
        sizes[..2].iter().for_each(|&s| left.add(s));
        sizes[2..].iter().for_each(|&s| right.add(s));
        left.merge(&right);
        assert_eq!(left.count(), 6);
        assert!((left.mean() - whole.mean()).abs() < 1e-9);
        assert!((left.std_dev() - whole.std_dev()).abs() < 1e-9);
        let mean = sizes.iter().sum::<usize>() as f64 / 6f64;
        assert!((whole.mean() - mean).abs() < 1e-9);
    }
    // Panics on a fragment starting with a G.
    struct Exploding;
    impl FragmentMapper for Exploding {
        fn map_fragment(&self, fragment: &[Vec<u8>], stats: &mut MappingStats, _: &mut PathTracker) {
            if fragment[0].first() == Some(&b'G') {
                panic!("cannot map {}", String::from_utf8_lossy(&fragment[0]));
            }
            stats.record(ReadOutcome::Mapped);
        }
    }
    #[test]
    fn panicking_consumer_stops_the_pool() {
        let broken = FragmentSource::single(memory(vec![b"GGGG".to_vec()]));
        let healthy = FragmentSource::single(memory(vec![b"ACGT".to_vec(); 200]));
        let sources: Vec<Box<dyn ReadSource>> = vec![Box::new(broken), Box::new(healthy)];
        let mut pool = AsyncReadPool::new(sources, 1, 1);
        let result = run_pool(&Exploding, &mut pool);
        assert!(
            matches!(result, Err(AssemblyError::ConsumerPanicked)),
            "{:?}",
            result
        );
        assert!(pool.is_aborted());
        // The consumer aborted the pool while unwinding, before it was joined.
        match pool.close() {
            Err(AssemblyError::Aborted(message)) => assert_eq!(message, "a consumer panicked"),
            other => panic!("{:?}", other),
        }
    }
    #[test]
    fn failed_source_leaves_graph_untouched() {
        let mut graph = ContigGraph::new(0);
        graph.add_contig(&[b'A'; 17]).unwrap();
        let left = memory(vec![vec![b'A'; 10], vec![b'A'; 10]]);
        let right = memory(vec![vec![b'T'; 10]]);
        let broken = FragmentSource::paired(left, right);
        let healthy = FragmentSource::single(memory(vec![vec![b'A'; 10]; 50]));
        let sources: Vec<Box<dyn ReadSource>> = vec![Box::new(broken), Box::new(healthy)];
        let pool = AsyncReadPool::new(sources, 1, 1);
        let result = map_pool(&mut graph, pool, &exact(4, 4));
        assert!(
            matches!(result, Err(AssemblyError::MismatchedEnds(1))),
            "{:?}",
            result
        );
        assert_eq!(graph.contig_attribute(1, READ_COUNT), None);
    }
    #[test]
    fn long_reads() {
        let mut rng: Xoroshiro128PlusPlus = SeedableRng::seed_from_u64(7_021);
        let mut graph = ContigGraph::new(0);
        for _ in 0..3 {
            graph.add_contig(&random_seq(&mut rng, 200)).unwrap();
        }
        graph.add_path(&[1, 2]).unwrap();
        graph.add_path(&[1, 3]).unwrap();
        let mut read = graph.path_sequence(&[1, 2])[100..300].to_vec();
        // One substitution and one deletion.
        read[50] = match read[50] {
            b'A' => b'C',
            _ => b'A',
        };
        read.remove(150);
        let inside = graph.contig_seq(3)[60..140].to_vec();
        let reads = vec![read.clone(), inside, vec![b'N'; 60], b"ACG".to_vec()];
        let config = LongReadConfig::default();
        let table = TraversionTable::new(&graph);
        let index = WordIndex::new(&graph, config.word_size, config.step_size).unwrap();
        let mapper = LongReadMapper::new(&graph, &table, &index, config);
        match mapper.place_read(&read) {
            LongPlacement::Found(aln) => {
                assert_eq!(aln.contigs(), &[1, 2]);
                assert_eq!((aln.start(), aln.end(), aln.score()), (100, 99, 2));
            }
            x => panic!("{:?}", x),
        }
        assert_eq!(mapper.place_read(&reads[1]), LongPlacement::Internal);
        assert_eq!(mapper.place_read(&reads[2]), LongPlacement::NoHits);
        let stats = map_long_pool(&mut graph, single_pool(reads), &config).unwrap();
        assert_eq!(stats.reads, 4);
        assert_eq!((stats.mapped, stats.cross_contig), (1, 1));
        assert_eq!(stats.internal, 1);
        assert_eq!(stats.no_hits, 2);
        let path = graph.find_paths(&[1, 2])[0];
        assert_eq!(graph.path_attribute(path, READ_COUNT), Some("1"));
        assert_eq!(graph.path_attribute(2, READ_COUNT), None);
    }
}
