//! Alignment of short reads along the graph with a bounded number of mismatches.
//! An alignment is anchored at a seed, a correspondence between one base of the read and one base
//! of an oriented contig. From the seed it is extended to the right and to the left independently,
//! following the traversion table whenever a contig runs out, and branches exceeding the mismatch
//! budget are discarded.
use crate::traversion::{Direction, TraversionTable};
use definitions::{reverse_path, ContigGraph, ContigPosition, IntegerOrPercentage};
use std::collections::BTreeSet;

/// Result of aligning a read along a chain of oriented contigs.
/// `start` is the offset of the first read base in the first contig and `end` the (inclusive)
/// offset of the last read base in the last contig.
/// It is canonical: no leading contig is covered by its overlap only, no trailing contig is
/// covered by its overlap only, and palindromic contigs have positive ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GraphAlignment {
    contigs: Vec<i64>,
    start: usize,
    end: usize,
    score: usize,
}

impl GraphAlignment {
    pub fn new(
        graph: &ContigGraph,
        mut contigs: Vec<i64>,
        mut start: usize,
        mut end: usize,
        score: usize,
    ) -> Self {
        assert!(!contigs.is_empty());
        let overlap = graph.overlap();
        while 1 < contigs.len() && graph.contig_length(contigs[0]) - overlap <= start {
            start -= graph.contig_length(contigs[0]) - overlap;
            contigs.remove(0);
        }
        while 1 < contigs.len() && end < overlap {
            contigs.pop();
            end += graph.contig_length(contigs[contigs.len() - 1]) - overlap;
        }
        for id in contigs.iter_mut() {
            if graph.is_palindrome(*id) {
                *id = id.abs();
            }
        }
        Self {
            contigs,
            start,
            end,
            score,
        }
    }
    pub fn contigs(&self) -> &[i64] {
        &self.contigs
    }
    pub fn start(&self) -> usize {
        self.start
    }
    pub fn end(&self) -> usize {
        self.end
    }
    pub fn score(&self) -> usize {
        self.score
    }
    /// True if the alignment spans more than one contig.
    pub fn is_cross_contig(&self) -> bool {
        1 < self.contigs.len()
    }
    /// The same alignment seen from the reverse complement of the read.
    pub fn reverse(&self, graph: &ContigGraph) -> Self {
        let contigs = reverse_path(&self.contigs);
        let first = graph.contig_length(contigs[0]);
        let last = graph.contig_length(contigs[contigs.len() - 1]);
        let start = first - 1 - self.end;
        let end = last - 1 - self.start;
        Self::new(graph, contigs, start, end, self.score)
    }
}

impl std::fmt::Display for GraphAlignment {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let contigs: Vec<_> = self.contigs.iter().map(|c| c.to_string()).collect();
        write!(
            f,
            "{}\t{}\t{}\t{}",
            contigs.join(","),
            self.start,
            self.end,
            self.score
        )
    }
}

/// The extensions of a seed branched more than allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TooManyPaths;

/// A position in a walk along oriented contigs.
/// In the forward direction `position` is the next base to consume, while in the backward direction
/// the next base is `position - 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Cursor {
    pub contig: i64,
    pub position: usize,
}

impl Cursor {
    pub(crate) fn next_base(&self, graph: &ContigGraph, direction: Direction) -> Option<u8> {
        match direction {
            Direction::Forward if self.position < graph.contig_length(self.contig) => {
                Some(graph.base(self.contig, self.position))
            }
            Direction::Backward if 0 < self.position => {
                Some(graph.base(self.contig, self.position - 1))
            }
            _ => None,
        }
    }
    pub(crate) fn advance(&mut self, direction: Direction) {
        match direction {
            Direction::Forward => self.position += 1,
            Direction::Backward => self.position -= 1,
        }
    }
    /// Offset of the base consumed last.
    pub(crate) fn last_consumed(&self, direction: Direction) -> usize {
        match direction {
            Direction::Forward => self.position - 1,
            Direction::Backward => self.position,
        }
    }
    /// Cursor at the first base of `contig` not shared with the contig it was entered from.
    pub(crate) fn enter(graph: &ContigGraph, contig: i64, direction: Direction) -> Self {
        let overlap = graph.overlap();
        let position = match direction {
            Direction::Forward => overlap,
            Direction::Backward => graph.contig_length(contig).saturating_sub(overlap),
        };
        Self { contig, position }
    }
}

/// An extension of a seed in one direction. `chain` is in the order of the walk, starting from the seed contig.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Extension {
    pub chain: Vec<i64>,
    /// Offset of the last read base in the last contig of the chain.
    pub offset: usize,
    pub score: usize,
}

/// Combine a left and a right extension of the same seed into an alignment.
pub(crate) fn join_extensions(
    graph: &ContigGraph,
    left: &Extension,
    right: &Extension,
) -> GraphAlignment {
    let contigs: Vec<i64> = left
        .chain
        .iter()
        .rev()
        .chain(right.chain.iter().skip(1))
        .copied()
        .collect();
    GraphAlignment::new(
        graph,
        contigs,
        left.offset,
        right.offset,
        left.score + right.score,
    )
}

/// Best alignments among all combinations of the extensions on both sides.
pub(crate) fn best_alignments(
    graph: &ContigGraph,
    lefts: &[Extension],
    rights: &[Extension],
) -> Vec<GraphAlignment> {
    let best = lefts
        .iter()
        .map(|e| e.score)
        .min()
        .zip(rights.iter().map(|e| e.score).min())
        .map(|(l, r)| l + r);
    let best = match best {
        Some(best) => best,
        None => return vec![],
    };
    let mut alignments = BTreeSet::new();
    for left in lefts.iter() {
        for right in rights.iter().filter(|r| left.score + r.score == best) {
            alignments.insert(join_extensions(graph, left, right));
        }
    }
    alignments.into_iter().collect()
}

/// The gap symbol in a read matches any base. An unknown base matches nothing.
pub(crate) fn is_match(read_base: u8, contig_base: u8) -> bool {
    read_base == crate::seq::GAP || (read_base == contig_base && read_base != b'N')
}

#[derive(Debug, Clone)]
struct Branch {
    chain: Vec<i64>,
    cursor: Cursor,
    // The number of read bases consumed.
    consumed: usize,
    mismatches: usize,
}

pub struct GraphAligner<'a> {
    graph: &'a ContigGraph,
    traversions: &'a TraversionTable,
    max_mismatches: IntegerOrPercentage,
    max_paths: usize,
}

impl<'a> GraphAligner<'a> {
    /// `traversions` must be built from the current state of `graph`.
    pub fn new(
        graph: &'a ContigGraph,
        traversions: &'a TraversionTable,
        max_mismatches: IntegerOrPercentage,
        max_paths: usize,
    ) -> Self {
        assert!(traversions.is_current(graph), "stale traversion table");
        Self {
            graph,
            traversions,
            max_mismatches,
            max_paths,
        }
    }
    /// All the alignments of `read` through `seed` with the fewest mismatches, if that number is
    /// within the budget. `read[read_start]` is aligned to `seed`.
    pub fn align(
        &self,
        read: &[u8],
        read_start: usize,
        seed: ContigPosition,
    ) -> Result<Vec<GraphAlignment>, TooManyPaths> {
        assert!(read_start < read.len());
        assert!(seed.position < self.graph.contig_length(seed.contig));
        let budget = self.max_mismatches.resolve(read.len());
        let cursor = Cursor {
            contig: seed.contig,
            position: seed.position,
        };
        let rights = self.extend(&read[read_start..], cursor, Direction::Forward, budget)?;
        if rights.is_empty() {
            return Ok(vec![]);
        }
        let remaining = budget - rights.iter().map(|r| r.score).min().unwrap_or(0);
        let left: Vec<u8> = read[..read_start].iter().rev().copied().collect();
        let lefts = self.extend(&left, cursor, Direction::Backward, remaining)?;
        let alignments = best_alignments(self.graph, &lefts, &rights);
        trace!("ALIGN\t{}\t{}\t{}", seed, read_start, alignments.len());
        Ok(alignments)
    }
    // Every walk consuming all of `query` with at most `budget` mismatches.
    fn extend(
        &self,
        query: &[u8],
        start: Cursor,
        direction: Direction,
        budget: usize,
    ) -> Result<Vec<Extension>, TooManyPaths> {
        if query.is_empty() {
            let offset = match direction {
                Direction::Forward => start.position.saturating_sub(1),
                Direction::Backward => start.position,
            };
            let chain = vec![start.contig];
            return Ok(vec![Extension {
                chain,
                offset,
                score: 0,
            }]);
        }
        // A chain can not be longer than the read, as every contig holds at least one new base.
        let max_chain = query.len() + 1;
        let mut stack = vec![Branch {
            chain: vec![start.contig],
            cursor: start,
            consumed: 0,
            mismatches: 0,
        }];
        let mut extensions = vec![];
        while let Some(mut branch) = stack.pop() {
            while branch.consumed < query.len() && branch.mismatches <= budget {
                let base = match branch.cursor.next_base(self.graph, direction) {
                    Some(base) => base,
                    None => break,
                };
                if !is_match(query[branch.consumed], base) {
                    branch.mismatches += 1;
                }
                branch.consumed += 1;
                branch.cursor.advance(direction);
            }
            if budget < branch.mismatches {
                continue;
            }
            if branch.consumed == query.len() {
                let offset = branch.cursor.last_consumed(direction);
                extensions.push(Extension {
                    chain: branch.chain,
                    offset,
                    score: branch.mismatches,
                });
                continue;
            }
            if max_chain <= branch.chain.len() {
                continue;
            }
            let current = branch.cursor.contig;
            for &next in self.traversions.neighbours(current, direction) {
                let mut chain = branch.chain.clone();
                chain.push(next);
                stack.push(Branch {
                    chain,
                    cursor: Cursor::enter(self.graph, next, direction),
                    consumed: branch.consumed,
                    mismatches: branch.mismatches,
                });
            }
            if self.max_paths < stack.len() + extensions.len() {
                return Err(TooManyPaths);
            }
        }
        Ok(extensions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seq::revcmp;
    use crate::traversion::tests::mock_graph;
    fn aligner<'a>(
        graph: &'a ContigGraph,
        table: &'a TraversionTable,
        mismatches: usize,
    ) -> GraphAligner<'a> {
        GraphAligner::new(graph, table, IntegerOrPercentage::Integer(mismatches), 100)
    }
    #[test]
    fn through_palindrome() {
        let graph = mock_graph();
        let table = TraversionTable::new(&graph);
        let aligner = aligner(&graph, &table, 0);
        let read = b"ACGTAAATTTGAGA";
        let alignments = aligner.align(read, 0, ContigPosition::new(1, 0)).unwrap();
        assert_eq!(alignments.len(), 1);
        let aln = &alignments[0];
        assert_eq!(aln.contigs(), &[1, 2, 3]);
        assert_eq!((aln.start(), aln.end(), aln.score()), (0, 5, 0));
        let reverse = revcmp(read);
        assert_eq!(reverse, b"TCTCAAATTTACGT".to_vec());
        let alignments = aligner
            .align(&reverse, 13, ContigPosition::new(-1, 5))
            .unwrap();
        assert_eq!(alignments.len(), 1);
        let rev = &alignments[0];
        assert_eq!(rev.contigs(), &[-3, 2, -1]);
        assert_eq!((rev.start(), rev.end(), rev.score()), (0, 5, 0));
        assert_eq!(&aln.reverse(&graph), rev);
        // The same alignment from a seed in the middle.
        let alignments = aligner.align(read, 7, ContigPosition::new(2, 3)).unwrap();
        assert_eq!(alignments, vec![aln.clone()]);
    }
    #[test]
    fn mismatch_budget() {
        let graph = mock_graph();
        let table = TraversionTable::new(&graph);
        let read = b"ACGTAAATTTGAGT";
        let strict = aligner(&graph, &table, 0);
        let seed = ContigPosition::new(1, 0);
        assert!(strict.align(read, 0, seed).unwrap().is_empty());
        let loose = aligner(&graph, &table, 1);
        let alignments = loose.align(read, 0, seed).unwrap();
        assert_eq!(alignments.len(), 1);
        assert_eq!(alignments[0].contigs(), &[1, 2, 3]);
        assert_eq!(alignments[0].score(), 1);
        // The gap symbol matches any base, N matches none.
        let gapped = b"ACGTAAA-TTGAGA";
        let alignments = strict.align(gapped, 0, seed).unwrap();
        assert_eq!(alignments.len(), 1);
        let unknown = b"ACGTAAANTTGAGA";
        assert!(strict.align(unknown, 0, seed).unwrap().is_empty());
        let percent = GraphAligner::new(&graph, &table, IntegerOrPercentage::Percentage(10.0), 100);
        assert_eq!(percent.align(read, 0, seed).unwrap().len(), 1);
    }
    #[test]
    fn canonical_form() {
        let graph = mock_graph();
        // Starts inside the overlap of 1 and 2.
        let aln = GraphAlignment::new(&graph, vec![1, 2, 3], 4, 1, 0);
        assert_eq!(aln.contigs(), &[2]);
        assert_eq!((aln.start(), aln.end()), (0, 5));
        let aln = GraphAlignment::new(&graph, vec![1, -2], 1, 2, 0);
        assert_eq!(aln.contigs(), &[1, 2]);
        let aln = GraphAlignment::new(&graph, vec![2, -1], 2, 1, 0);
        assert_eq!(aln.contigs(), &[2]);
        assert_eq!((aln.start(), aln.end()), (2, 5));
        assert!(!aln.is_cross_contig());
        assert_eq!(aln.to_string(), "2\t2\t5\t0");
    }
    #[test]
    fn too_many_paths() {
        // A contig followed by many alternatives sharing the first bases.
        let mut graph = ContigGraph::new(1);
        graph.add_contig(b"ACGTA").unwrap();
        for tail in [b"AC", b"AG", b"AT", b"AA"] {
            let id = graph.add_contig(&[tail.as_slice(), b"GGGG"].concat()).unwrap();
            graph.add_path(&[1, id]).unwrap();
        }
        let table = TraversionTable::new(&graph);
        let read = b"ACGTACGGGG";
        let seed = ContigPosition::new(1, 0);
        let narrow = GraphAligner::new(&graph, &table, IntegerOrPercentage::Integer(1), 2);
        assert_eq!(narrow.align(read, 0, seed), Err(TooManyPaths));
        let wide = GraphAligner::new(&graph, &table, IntegerOrPercentage::Integer(1), 10);
        let alignments = wide.align(read, 0, seed).unwrap();
        assert_eq!(alignments.len(), 1);
        assert_eq!(alignments[0].contigs(), &[1, 2]);
        assert_eq!(alignments[0].score(), 0);
    }
}
