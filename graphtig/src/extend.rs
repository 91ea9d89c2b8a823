//! Build a contig graph out of a de Bruijn graph.
//! Each contig is a maximal chain of k-mers in which every k-mer but the last has exactly one
//! successor and every k-mer but the first has exactly one predecessor. Contigs overlap by k-1 bases,
//! and every pair of contigs adjacent in the de Bruijn graph is linked by a path of length two.
use crate::de_bruijn::DeBruijnGraph;
use crate::error::Result;
use crate::kmer::Kmer;
use definitions::{reverse_path, ContigGraph, KMER_FREQ};
use std::collections::{BTreeSet, HashMap};

/// Extension of unique chains of k-mers. It marks every k-mer it consumes as built.
pub struct ContigExtender<'a> {
    graph: &'a mut dyn DeBruijnGraph,
}

impl<'a> ContigExtender<'a> {
    pub fn new(graph: &'a mut dyn DeBruijnGraph) -> Self {
        Self { graph }
    }
    // The k-mer following `kmer` if it is the only successor and `kmer` is its only predecessor.
    fn unique_successor(&self, kmer: &Kmer) -> Option<Kmer> {
        let mut successors = self.graph.successors(kmer);
        if successors.len() != 1 {
            return None;
        }
        let next = successors.pop()?;
        match self.graph.predecessors(&next).len() {
            1 => Some(next),
            _ => None,
        }
    }
    fn unique_predecessor(&self, kmer: &Kmer) -> Option<Kmer> {
        self.unique_successor(&kmer.reverse())
            .map(|prev| prev.reverse())
    }
    /// Extend the k-mer `seed` in both directions as far as the chain is unique.
    /// Returns the sequence and the sum of the k-mer frequencies, or None if `seed` is already built.
    pub fn extend(&mut self, seed: &Kmer) -> Option<(Vec<u8>, u64)> {
        if self.graph.is_built(seed) {
            return None;
        }
        self.graph.set_built(seed, true);
        let mut freq = self.graph.frequency(seed) as u64;
        let mut right = vec![];
        let mut current = seed.clone();
        while let Some(next) = self.unique_successor(&current) {
            if self.graph.is_built(&next) {
                break;
            }
            self.graph.set_built(&next, true);
            freq += self.graph.frequency(&next) as u64;
            right.push(next.last());
            current = next;
        }
        let mut left = vec![];
        let mut current = seed.clone();
        while let Some(prev) = self.unique_predecessor(&current) {
            if self.graph.is_built(&prev) {
                break;
            }
            self.graph.set_built(&prev, true);
            freq += self.graph.frequency(&prev) as u64;
            left.push(prev.first());
            current = prev;
        }
        let seq: Vec<u8> = left
            .into_iter()
            .rev()
            .chain(seed.as_bytes().iter().copied())
            .chain(right)
            .collect();
        Some((seq, freq))
    }
}

/// Build contigs from every member of `dbg` not built yet, then link them.
pub fn extend_contigs(dbg: &mut dyn DeBruijnGraph) -> Result<ContigGraph> {
    let k = dbg.kmer_size();
    let mut graph = ContigGraph::new(k - 1);
    let seeds: Vec<Kmer> = dbg.kmers().collect();
    let mut extender = ContigExtender::new(dbg);
    for seed in seeds.iter() {
        if let Some((seq, freq)) = extender.extend(seed) {
            let id = graph.add_contig(&seq)?;
            graph.set_contig_attribute(id, KMER_FREQ, freq.to_string());
        }
    }
    debug!("EXTEND\tContigs\t{}", graph.num_contigs());
    let links = link_contigs(&graph, extender.graph, k);
    for link in links.iter() {
        graph.add_path(link)?;
    }
    debug!("EXTEND\tPaths\t{}", graph.num_paths());
    Ok(graph)
}

// Pairs of oriented contigs adjacent in the de Bruijn graph, each in its smaller direction.
fn link_contigs(graph: &ContigGraph, dbg: &dyn DeBruijnGraph, k: usize) -> BTreeSet<Vec<i64>> {
    let mut starts: HashMap<Kmer, i64> = HashMap::new();
    for id in graph.contig_ids() {
        for oriented in [id, -id] {
            let seq = graph.contig_seq(oriented);
            let first = Kmer::from_valid(seq[..k].to_vec());
            starts.entry(first).or_insert(oriented);
        }
    }
    let mut links = BTreeSet::new();
    for id in graph.contig_ids() {
        for from in [id, -id] {
            let seq = graph.contig_seq(from);
            let last = Kmer::from_valid(seq[seq.len() - k..].to_vec());
            for next in dbg.successors(&last) {
                if let Some(&to) = starts.get(&next) {
                    let link = vec![from, to];
                    let reverse = reverse_path(&link);
                    links.insert(link.min(reverse));
                }
            }
        }
    }
    links
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::de_bruijn::{HashedDeBruijnGraph, PackedDeBruijnGraph};
    use crate::kmer::tests::random_seq;
    use crate::seq::revcmp;
    use rand::SeedableRng;
    use rand_xoshiro::Xoroshiro128PlusPlus;
    fn contains(graph: &ContigGraph, seq: &[u8]) -> bool {
        graph
            .contig_ids()
            .any(|id| graph.contig_seq(id) == seq || graph.contig_seq(-id) == seq)
    }
    #[test]
    fn linear_genome() {
        let mut rng: Xoroshiro128PlusPlus = SeedableRng::seed_from_u64(4);
        let genome = random_seq(&mut rng, 300);
        let reads: Vec<_> = (0..=200).step_by(20).map(|s| genome[s..s + 100].to_vec()).collect();
        let mut dbg = HashedDeBruijnGraph::from_reads(&reads, 25).unwrap();
        let graph = extend_contigs(&mut dbg).unwrap();
        assert_eq!(graph.overlap(), 24);
        assert_eq!(graph.contig_ids().count(), 1);
        assert_eq!(graph.path_ids().count(), 0);
        assert!(contains(&graph, &genome));
        let freq: u64 = graph.contig_attribute(1, KMER_FREQ).unwrap().parse().unwrap();
        let total: u64 = dbg.kmers().map(|k| dbg.frequency(&k) as u64).sum();
        assert_eq!(freq, total);
        assert!(dbg.kmers().all(|k| dbg.is_built(&k)));
    }
    #[test]
    fn bubble() {
        // Two alleles differing at one base in the middle.
        let mut rng: Xoroshiro128PlusPlus = SeedableRng::seed_from_u64(94);
        let prefix = random_seq(&mut rng, 60);
        let suffix = random_seq(&mut rng, 60);
        let alleles: Vec<Vec<u8>> = [b'A', b'C']
            .iter()
            .map(|&b| [prefix.as_slice(), &[b], suffix.as_slice()].concat())
            .collect();
        let reads = vec![alleles[0].clone(), revcmp(&alleles[1])];
        for packed in [false, true] {
            let mut dbg: Box<dyn DeBruijnGraph> = match packed {
                false => Box::new(HashedDeBruijnGraph::from_reads(&reads, 15).unwrap()),
                true => Box::new(PackedDeBruijnGraph::from_reads(&reads, 15, 0).unwrap()),
            };
            let graph = extend_contigs(dbg.as_mut()).unwrap();
            assert_eq!(graph.contig_ids().count(), 4);
            assert_eq!(graph.path_ids().count(), 4);
            assert!(contains(&graph, &prefix[..60]));
            assert!(contains(&graph, &suffix[..]));
            for p in graph.path_ids() {
                let contigs = graph.path(p);
                assert!(graph.check_path(&contigs).is_ok());
            }
            let allele_seqs: Vec<_> = graph
                .contig_ids()
                .filter(|&id| graph.contig_length(id) == 2 * 15 - 1)
                .collect();
            assert_eq!(allele_seqs.len(), 2);
        }
    }
}
