//! De Bruijn graphs of k-mers.
//! A k-mer and its reverse complement are the same node; every query accepts either
//! orientation and resolves it to the [minimal](crate::kmer::Kmer::minimal) one.
//! Two interchangeable strategies are provided:
//! [HashedDeBruijnGraph] keeps a hash map from k-mers to counts, and
//! [PackedDeBruijnGraph] keeps two-bit packed k-mers in an open addressing table.
//! For the same input, both report the same membership, frequencies, and built flags.
use crate::error::{AssemblyError, Result};
use crate::kmer::{kmers_of, Kmer};
use crate::read_source::ReadSource;
use crate::seq::{count_unknown, BASE2BIT, BIT2BASE};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub trait DeBruijnGraph: Send + Sync {
    fn kmer_size(&self) -> usize;
    /// Add one occurrence of `kmer`.
    fn add(&mut self, kmer: &Kmer);
    /// Add every k-mer of `reads`. Reads shorter than k contribute nothing.
    fn add_reads(&mut self, reads: &[Vec<u8>]) {
        let k = self.kmer_size();
        for read in reads.iter() {
            kmers_of(read, k).for_each(|kmer| self.add(&kmer));
        }
    }
    /// True if `kmer` occurs more than [threshold](DeBruijnGraph::threshold) times.
    fn contains(&self, kmer: &Kmer) -> bool;
    /// The number of occurrences. Panics if `kmer` is not [contained](DeBruijnGraph::contains).
    fn frequency(&self, kmer: &Kmer) -> u32;
    /// Panics if `kmer` is not contained.
    fn is_built(&self, kmer: &Kmer) -> bool;
    /// Panics if `kmer` is not contained.
    fn set_built(&mut self, kmer: &Kmer, built: bool);
    /// Only k-mers occurring strictly more than `threshold` times are members afterwards.
    /// Changing the threshold never touches the counts.
    fn set_threshold(&mut self, threshold: u32);
    fn threshold(&self) -> u32;
    /// The number of members.
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
    /// Minimal k-mers of the members. The order is stable as long as neither the threshold
    /// nor the set of counted k-mers changes.
    fn kmers(&self) -> Box<dyn Iterator<Item = Kmer> + '_>;
    /// Members reachable by shifting in one base at the end of `kmer`, in the orientation of `kmer`.
    fn successors(&self, kmer: &Kmer) -> Vec<Kmer> {
        BIT2BASE
            .iter()
            .map(|&b| kmer.successor(b))
            .filter(|next| self.contains(next))
            .collect()
    }
    /// Members reachable by shifting in one base at the start of `kmer`, in the orientation of `kmer`.
    fn predecessors(&self, kmer: &Kmer) -> Vec<Kmer> {
        BIT2BASE
            .iter()
            .map(|&b| kmer.predecessor(b))
            .filter(|prev| self.contains(prev))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeBruijnStrategy {
    Hashed,
    /// `expected_kmers` sizes the table before counting. Zero means "count the input first".
    Packed { expected_kmers: usize },
}

impl std::default::Default for DeBruijnStrategy {
    fn default() -> Self {
        DeBruijnStrategy::Hashed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KmerConfig {
    pub k: usize,
    /// K-mers occurring at most this many times are dropped.
    pub min_count: u32,
    pub strategy: DeBruijnStrategy,
}

impl std::default::Default for KmerConfig {
    fn default() -> Self {
        Self {
            k: 31,
            min_count: 1,
            strategy: DeBruijnStrategy::Hashed,
        }
    }
}

impl KmerConfig {
    pub fn new(k: usize, min_count: u32, strategy: DeBruijnStrategy) -> Self {
        Self {
            k,
            min_count,
            strategy,
        }
    }
}

fn check_kmer_size(k: usize) -> Result<()> {
    // Contigs overlap by k-1 bases, which must not be empty.
    match 2 <= k {
        true => Ok(()),
        false => Err(AssemblyError::InvalidKmerSize(k)),
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct KmerEntry {
    count: u32,
    built: bool,
}

/// A de Bruijn graph keeping k-mers as keys of a hash map.
#[derive(Debug, Clone)]
pub struct HashedDeBruijnGraph {
    k: usize,
    threshold: u32,
    table: HashMap<Kmer, KmerEntry>,
}

impl HashedDeBruijnGraph {
    pub fn new(k: usize) -> Result<Self> {
        check_kmer_size(k)?;
        Ok(Self {
            k,
            threshold: 0,
            table: HashMap::new(),
        })
    }
    /// Count the k-mers of `reads` in parallel.
    pub fn from_reads(reads: &[Vec<u8>], k: usize) -> Result<Self> {
        let mut graph = Self::new(k)?;
        graph.add_reads(reads);
        Ok(graph)
    }
    fn member(&self, kmer: &Kmer) -> Option<&KmerEntry> {
        self.table
            .get(&kmer.minimal())
            .filter(|entry| self.threshold < entry.count)
    }
}

impl DeBruijnGraph for HashedDeBruijnGraph {
    fn kmer_size(&self) -> usize {
        self.k
    }
    fn add(&mut self, kmer: &Kmer) {
        assert_eq!(kmer.len(), self.k);
        let entry = self.table.entry(kmer.minimal()).or_default();
        entry.count = entry.count.saturating_add(1);
    }
    fn add_reads(&mut self, reads: &[Vec<u8>]) {
        let k = self.k;
        let counts = reads
            .par_iter()
            .fold(HashMap::new, |mut counts, read| {
                for kmer in kmers_of(read, k) {
                    *counts.entry(kmer.minimal()).or_default() += 1;
                }
                counts
            })
            .reduce(HashMap::new, |mut x: HashMap<Kmer, u32>, y| {
                for (kmer, count) in y {
                    *x.entry(kmer).or_default() += count;
                }
                x
            });
        for (kmer, count) in counts {
            let entry = self.table.entry(kmer).or_default();
            entry.count = entry.count.saturating_add(count);
        }
    }
    fn contains(&self, kmer: &Kmer) -> bool {
        self.member(kmer).is_some()
    }
    fn frequency(&self, kmer: &Kmer) -> u32 {
        match self.member(kmer) {
            Some(entry) => entry.count,
            None => panic!("{} is not in the graph", kmer),
        }
    }
    fn is_built(&self, kmer: &Kmer) -> bool {
        match self.member(kmer) {
            Some(entry) => entry.built,
            None => panic!("{} is not in the graph", kmer),
        }
    }
    fn set_built(&mut self, kmer: &Kmer, built: bool) {
        let threshold = self.threshold;
        match self.table.get_mut(&kmer.minimal()) {
            Some(entry) if threshold < entry.count => entry.built = built,
            _ => panic!("{} is not in the graph", kmer),
        }
    }
    fn set_threshold(&mut self, threshold: u32) {
        self.threshold = threshold;
    }
    fn threshold(&self) -> u32 {
        self.threshold
    }
    fn len(&self) -> usize {
        let threshold = self.threshold;
        self.table.values().filter(|e| threshold < e.count).count()
    }
    fn kmers(&self) -> Box<dyn Iterator<Item = Kmer> + '_> {
        let threshold = self.threshold;
        let iter = self
            .table
            .iter()
            .filter(move |(_, e)| threshold < e.count)
            .map(|(kmer, _)| kmer.clone());
        Box::new(iter)
    }
}

const MIN_CAPACITY: usize = 16;

/// A de Bruijn graph keeping two-bit packed k-mers in an open addressing table with linear probing.
/// The table doubles when it gets three quarters full.
#[derive(Debug, Clone)]
pub struct PackedDeBruijnGraph {
    k: usize,
    words_per_kmer: usize,
    threshold: u32,
    // `capacity * words_per_kmer` words.
    slots: Vec<u64>,
    // Zero means the slot is empty.
    counts: Vec<u32>,
    built: Vec<bool>,
    occupied: usize,
}

impl PackedDeBruijnGraph {
    /// Create an empty table able to hold `expected_kmers` distinct k-mers without growing.
    pub fn new(k: usize, expected_kmers: usize) -> Result<Self> {
        check_kmer_size(k)?;
        let capacity = (expected_kmers * 4 / 3 + 1)
            .max(MIN_CAPACITY)
            .next_power_of_two();
        let words_per_kmer = (k + 31) / 32;
        Ok(Self {
            k,
            words_per_kmer,
            threshold: 0,
            slots: vec![0; capacity * words_per_kmer],
            counts: vec![0; capacity],
            built: vec![false; capacity],
            occupied: 0,
        })
    }
    pub fn from_reads(reads: &[Vec<u8>], k: usize, expected_kmers: usize) -> Result<Self> {
        let mut graph = Self::new(k, expected_kmers)?;
        graph.add_reads(reads);
        Ok(graph)
    }
    fn capacity(&self) -> usize {
        self.counts.len()
    }
    fn pack(&self, kmer: &Kmer) -> Vec<u64> {
        let mut words = vec![0; self.words_per_kmer];
        for (i, &base) in kmer.as_bytes().iter().enumerate() {
            words[i / 32] |= BASE2BIT[base as usize] << (2 * (i % 32));
        }
        words
    }
    fn unpack(&self, slot: usize) -> Kmer {
        let words = &self.slots[slot * self.words_per_kmer..(slot + 1) * self.words_per_kmer];
        let bases = (0..self.k)
            .map(|i| BIT2BASE[((words[i / 32] >> (2 * (i % 32))) & 0b11) as usize])
            .collect();
        Kmer::from_valid(bases)
    }
    fn hash(words: &[u64]) -> u64 {
        words.iter().fold(0xcbf2_9ce4_8422_2325, |h: u64, &w| {
            (h.rotate_left(5) ^ w).wrapping_mul(0x517c_c1b7_2722_0a95)
        })
    }
    // Ok(slot) if `words` is stored in `slot`, Err(slot) for the empty slot to put it in.
    fn probe(&self, words: &[u64]) -> std::result::Result<usize, usize> {
        let mask = self.capacity() - 1;
        let width = self.words_per_kmer;
        let mut slot = Self::hash(words) as usize & mask;
        loop {
            if self.counts[slot] == 0 {
                return Err(slot);
            }
            if &self.slots[slot * width..(slot + 1) * width] == words {
                return Ok(slot);
            }
            slot = (slot + 1) & mask;
        }
    }
    fn grow(&mut self) {
        let width = self.words_per_kmer;
        let capacity = self.capacity() * 2;
        let slots = std::mem::replace(&mut self.slots, vec![0; capacity * width]);
        let counts = std::mem::replace(&mut self.counts, vec![0; capacity]);
        let built = std::mem::replace(&mut self.built, vec![false; capacity]);
        trace!("PACKED\tGrow\t{}", capacity);
        for (old, &count) in counts.iter().enumerate().filter(|(_, &c)| c > 0) {
            let words = &slots[old * width..(old + 1) * width];
            if let Err(slot) = self.probe(words) {
                self.slots[slot * width..(slot + 1) * width].copy_from_slice(words);
                self.counts[slot] = count;
                self.built[slot] = built[old];
            }
        }
    }
    fn member_slot(&self, kmer: &Kmer) -> Option<usize> {
        assert_eq!(kmer.len(), self.k);
        let words = self.pack(&kmer.minimal());
        self.probe(&words)
            .ok()
            .filter(|&slot| self.threshold < self.counts[slot])
    }
    fn member_or_panic(&self, kmer: &Kmer) -> usize {
        match self.member_slot(kmer) {
            Some(slot) => slot,
            None => panic!("{} is not in the graph", kmer),
        }
    }
}

impl DeBruijnGraph for PackedDeBruijnGraph {
    fn kmer_size(&self) -> usize {
        self.k
    }
    fn add(&mut self, kmer: &Kmer) {
        assert_eq!(kmer.len(), self.k);
        let words = self.pack(&kmer.minimal());
        match self.probe(&words) {
            Ok(slot) => self.counts[slot] = self.counts[slot].saturating_add(1),
            Err(slot) => {
                let width = self.words_per_kmer;
                self.slots[slot * width..(slot + 1) * width].copy_from_slice(&words);
                self.counts[slot] = 1;
                self.occupied += 1;
                if self.capacity() * 3 < self.occupied * 4 {
                    self.grow();
                }
            }
        }
    }
    fn contains(&self, kmer: &Kmer) -> bool {
        self.member_slot(kmer).is_some()
    }
    fn frequency(&self, kmer: &Kmer) -> u32 {
        self.counts[self.member_or_panic(kmer)]
    }
    fn is_built(&self, kmer: &Kmer) -> bool {
        self.built[self.member_or_panic(kmer)]
    }
    fn set_built(&mut self, kmer: &Kmer, built: bool) {
        let slot = self.member_or_panic(kmer);
        self.built[slot] = built;
    }
    fn set_threshold(&mut self, threshold: u32) {
        self.threshold = threshold;
    }
    fn threshold(&self) -> u32 {
        self.threshold
    }
    fn len(&self) -> usize {
        let threshold = self.threshold;
        self.counts.iter().filter(|&&c| threshold < c).count()
    }
    fn kmers(&self) -> Box<dyn Iterator<Item = Kmer> + '_> {
        let threshold = self.threshold;
        let iter = self
            .counts
            .iter()
            .enumerate()
            .filter(move |(_, &c)| threshold < c)
            .map(move |(slot, _)| self.unpack(slot));
        Box::new(iter)
    }
}

/// Count the k-mers of every fragment of `source` and drop those occurring at most `min_count` times.
/// The source is reset before reading, and read twice by the packed strategy without an expected size.
pub fn build_de_bruijn(
    source: &mut dyn ReadSource,
    config: &KmerConfig,
) -> Result<Box<dyn DeBruijnGraph>> {
    const BATCH: usize = 10_000;
    let k = config.k;
    check_kmer_size(k)?;
    let mut graph: Box<dyn DeBruijnGraph> = match config.strategy {
        DeBruijnStrategy::Hashed => Box::new(HashedDeBruijnGraph::new(k)?),
        DeBruijnStrategy::Packed { expected_kmers } => {
            let expected_kmers = match expected_kmers {
                0 => count_kmers(source, k)?,
                x => x,
            };
            debug!("DEBRUIJN\tExpected\t{}", expected_kmers);
            Box::new(PackedDeBruijnGraph::new(k, expected_kmers)?)
        }
    };
    source.reset()?;
    let mut reads = Vec::with_capacity(BATCH);
    let (mut num_reads, mut unknown) = (0, 0);
    loop {
        let fragments = source.next_fragments()?;
        let is_end = fragments.is_none();
        if let Some(fragments) = fragments {
            num_reads += fragments.len();
            unknown += fragments.iter().map(|f| count_unknown(f)).sum::<usize>();
            reads.extend(fragments);
        }
        if BATCH <= reads.len() || (is_end && !reads.is_empty()) {
            graph.add_reads(&reads);
            reads.clear();
        }
        if is_end {
            break;
        }
    }
    graph.set_threshold(config.min_count);
    debug!("DEBRUIJN\tReads\t{}\t{}", num_reads, unknown);
    debug!("DEBRUIJN\tKmers\t{}", graph.len());
    Ok(graph)
}

// Upper bound of the number of distinct k-mers.
fn count_kmers(source: &mut dyn ReadSource, k: usize) -> Result<usize> {
    source.reset()?;
    let mut total = 0;
    while let Some(fragments) = source.next_fragments()? {
        total += fragments
            .iter()
            .map(|read| kmers_of(read, k).count())
            .sum::<usize>();
    }
    Ok(total)
}
