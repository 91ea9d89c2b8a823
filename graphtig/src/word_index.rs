//! An index from short words to their occurrences in the contigs of a graph.
//! Words are encoded in base four (A=0, C=1, G=2, T=3, the first base most significant).
//! Every `step`-th word of each live contig and of its reverse complement is indexed.
//! Palindromic contigs are indexed once, as their positive strand.
use crate::error::{AssemblyError, Result};
use crate::seq::{BASE2BIT, UNKNOWN};
use definitions::{ContigGraph, ContigOffsets, ContigPosition};
use rayon::prelude::*;
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct WordIndex {
    word: usize,
    step: usize,
    offsets: ContigOffsets,
    table: HashMap<u64, Vec<u64>>,
}

/// Rolling base-four codes of the windows of a sequence.
/// Yields `(start, Some(code))` for each window, or `(start, None)` if it contains a base other than A,C,G,T.
pub struct Words<'a> {
    seq: &'a [u8],
    word: usize,
    mask: u64,
    code: u64,
    // The number of valid bases at the end of `code`.
    valid: usize,
    idx: usize,
}

impl<'a> Words<'a> {
    pub fn new(seq: &'a [u8], word: usize) -> Self {
        assert!(0 < word && word <= 32);
        let mask = match word {
            32 => u64::MAX,
            _ => (1 << (2 * word)) - 1,
        };
        Self {
            seq,
            word,
            mask,
            code: 0,
            valid: 0,
            idx: 0,
        }
    }
}

impl<'a> std::iter::Iterator for Words<'a> {
    type Item = (usize, Option<u64>);
    fn next(&mut self) -> Option<Self::Item> {
        while self.idx < self.seq.len() {
            let bit = BASE2BIT[self.seq[self.idx] as usize];
            self.idx += 1;
            if bit == UNKNOWN {
                self.valid = 0;
                self.code = 0;
            } else {
                self.code = ((self.code << 2) | bit) & self.mask;
                self.valid += 1;
            }
            if self.word <= self.idx {
                let start = self.idx - self.word;
                let code = (self.word <= self.valid).then(|| self.code);
                return Some((start, code));
            }
        }
        None
    }
}

/// Base-four code of a word. None if it contains a base other than A,C,G,T.
pub fn encode_word(word: &[u8]) -> Option<u64> {
    assert!(word.len() <= 32);
    word.iter().try_fold(0, |code, &b| match BASE2BIT[b as usize] {
        UNKNOWN => None,
        bit => Some((code << 2) | bit),
    })
}

impl WordIndex {
    pub fn new(graph: &ContigGraph, word: usize, step: usize) -> Result<Self> {
        if word == 0 || 32 < word {
            return Err(AssemblyError::InvalidWordSize(word));
        }
        if step == 0 {
            return Err(AssemblyError::InvalidStepSize);
        }
        let oriented: Vec<i64> = graph
            .contig_ids()
            .flat_map(|id| match graph.is_palindrome(id) {
                true => vec![id],
                false => vec![id, -id],
            })
            .collect();
        if oriented.is_empty() {
            return Err(AssemblyError::EmptyGraph);
        }
        let offsets = ContigOffsets::new(graph);
        let mut words: Vec<(u64, u64)> = oriented
            .par_iter()
            .flat_map_iter(|&id| {
                let seq = graph.contig_seq(id);
                let offsets = &offsets;
                Words::new(&seq, word)
                    .filter(|(start, _)| start % step == 0)
                    .filter_map(|(start, code)| {
                        let global = offsets.to_global(ContigPosition::new(id, start));
                        code.map(|code| (code, global))
                    })
                    .collect::<Vec<_>>()
            })
            .collect();
        words.sort_unstable();
        let mut table: HashMap<u64, Vec<u64>> = HashMap::new();
        for (code, global) in words {
            table.entry(code).or_default().push(global);
        }
        debug!("INDEX\tWords\t{}", table.len());
        debug!("INDEX\tContigs\t{}", oriented.len());
        Ok(Self {
            word,
            step,
            offsets,
            table,
        })
    }
    pub fn word_size(&self) -> usize {
        self.word
    }
    pub fn step_size(&self) -> usize {
        self.step
    }
    /// Shortest read guaranteed to contain an indexed word from any part of a contig it overlaps.
    pub fn min_read_length(&self) -> usize {
        self.word + self.step - 1
    }
    /// The number of distinct words.
    pub fn num_words(&self) -> usize {
        self.table.len()
    }
    /// Starts of the occurrences of the encoded `word`.
    pub fn hit_contigs(&self, word: u64) -> Vec<ContigPosition> {
        match self.table.get(&word) {
            Some(globals) => globals
                .iter()
                .map(|&g| self.offsets.to_position(g))
                .collect(),
            None => vec![],
        }
    }
    /// Occurrences of the word starting at each offset of `read`. Empty if `read` is shorter than a word.
    pub fn hits(&self, read: &[u8]) -> Vec<Vec<ContigPosition>> {
        if read.len() < self.word {
            return vec![];
        }
        Words::new(read, self.word)
            .map(|(_, code)| match code {
                Some(code) => self.hit_contigs(code),
                None => vec![],
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kmer::tests::random_seq;
    use crate::seq::revcmp;
    use rand::SeedableRng;
    use rand_xoshiro::Xoroshiro128PlusPlus;
    #[test]
    fn encoding() {
        assert_eq!(encode_word(b"A"), Some(0));
        assert_eq!(encode_word(b"CA"), Some(4));
        assert_eq!(encode_word(b"TTT"), Some(63));
        assert_eq!(encode_word(b"ANA"), None);
        let seq = b"ACGNTTGCA";
        let words: Vec<_> = Words::new(seq, 3).collect();
        assert_eq!(words.len(), 7);
        for (start, code) in words {
            assert_eq!(code, encode_word(&seq[start..start + 3]));
        }
        let mut rng: Xoroshiro128PlusPlus = SeedableRng::seed_from_u64(3);
        let seq = random_seq(&mut rng, 100);
        for (start, code) in Words::new(&seq, 32) {
            assert_eq!(code, encode_word(&seq[start..start + 32]));
        }
    }
    #[test]
    fn invalid_parameters() {
        let mut graph = ContigGraph::new(0);
        assert!(matches!(
            WordIndex::new(&graph, 4, 1),
            Err(AssemblyError::EmptyGraph)
        ));
        graph.add_contig(b"ACGTTT").unwrap();
        assert!(WordIndex::new(&graph, 0, 1).is_err());
        assert!(WordIndex::new(&graph, 33, 1).is_err());
        assert!(WordIndex::new(&graph, 4, 0).is_err());
        graph.delete_contig(1);
        assert!(WordIndex::new(&graph, 4, 1).is_err());
    }
    #[test]
    fn both_strands() {
        let mut graph = ContigGraph::new(0);
        graph.add_contig(b"AACCGGTTAC").unwrap();
        graph.add_contig(b"ACGT").unwrap();
        let index = WordIndex::new(&graph, 4, 1).unwrap();
        assert_eq!(index.min_read_length(), 4);
        let hits = index.hit_contigs(encode_word(b"TTAC").unwrap());
        assert_eq!(hits, vec![ContigPosition::new(1, 6)]);
        // AACCGGTTAC -> GTAACCGGTT
        let hits = index.hit_contigs(encode_word(b"AACC").unwrap());
        assert_eq!(
            hits,
            vec![ContigPosition::new(1, 0), ContigPosition::new(-1, 2)]
        );
        // The palindrome is found once.
        let hits = index.hit_contigs(encode_word(b"ACGT").unwrap());
        assert_eq!(hits, vec![ContigPosition::new(2, 0)]);
        assert!(index.hit_contigs(encode_word(b"CCCC").unwrap()).is_empty());
        let hits = index.hits(b"AACCNACGT");
        assert_eq!(hits.len(), 6);
        assert_eq!(hits[0].len(), 2);
        assert!(hits[1..5].iter().all(|h| h.is_empty()));
        assert_eq!(hits[5], vec![ContigPosition::new(2, 0)]);
        assert!(index.hits(b"ACG").is_empty());
    }
    #[test]
    fn every_indexed_word_is_found() {
        let mut rng: Xoroshiro128PlusPlus = SeedableRng::seed_from_u64(9430);
        let mut graph = ContigGraph::new(0);
        for _ in 0..10 {
            graph.add_contig(&random_seq(&mut rng, 200)).unwrap();
        }
        let (word, step) = (12, 5);
        let index = WordIndex::new(&graph, word, step).unwrap();
        for id in graph.contig_ids() {
            for oriented in [id, -id] {
                let seq = graph.contig_seq(oriented);
                for start in (0..=seq.len() - word).step_by(step) {
                    let code = encode_word(&seq[start..start + word]).unwrap();
                    let hits = index.hit_contigs(code);
                    assert!(hits.contains(&ContigPosition::new(oriented, start)));
                }
            }
        }
        // Any read of the minimal length hits its origin.
        let seq = graph.contig_seq(-3);
        let len = index.min_read_length();
        for start in 0..=seq.len() - len {
            let hits = index.hits(&seq[start..start + len]);
            let found = hits.iter().enumerate().any(|(offset, hits)| {
                hits.contains(&ContigPosition::new(-3, start + offset))
            });
            assert!(found);
        }
        let read = revcmp(&graph.contig_seq(5)[10..40]);
        let hits = index.hits(&read);
        assert!(hits.iter().flatten().any(|pos| pos.contig == -5));
    }
}
