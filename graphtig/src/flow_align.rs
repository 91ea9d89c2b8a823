//! Alignment of error-prone long reads along the graph.
//! Like [GraphAligner](crate::graph_align::GraphAligner), alignments are anchored at a seed and
//! extended in both directions through the traversion table, but the cost is the edit distance,
//! computed by a dynamic programming column restricted to a band of the width of the budget.
use crate::graph_align::{best_alignments, is_match, Cursor, Extension, GraphAlignment, TooManyPaths};
use crate::traversion::{Direction, TraversionTable};
use definitions::{ContigGraph, ContigPosition, IntegerOrPercentage};

const INF: usize = usize::MAX / 2;

#[derive(Debug, Clone)]
struct FlowBranch {
    chain: Vec<i64>,
    cursor: Cursor,
    // column[i - lo] is the cost of aligning the first i bases of the query to the graph bases
    // consumed so far. Cells outside the band are never within the budget.
    lo: usize,
    column: Vec<usize>,
    consumed: usize,
    best: Option<Extension>,
}

impl FlowBranch {
    fn cell(&self, i: usize) -> usize {
        match i.checked_sub(self.lo).and_then(|x| self.column.get(x)) {
            Some(&cost) => cost,
            None => INF,
        }
    }
    // Consume one graph base. Returns false if every cell of the band exceeds the budget.
    fn step(&mut self, query: &[u8], base: u8, budget: usize) -> bool {
        let d = self.consumed + 1;
        let lo = d.saturating_sub(budget);
        let hi = query.len().min(d + budget);
        self.consumed = d;
        if hi < lo {
            self.lo = lo;
            self.column.clear();
            return false;
        }
        let mut next: Vec<usize> = Vec::with_capacity(hi - lo + 1);
        for i in lo..=hi {
            let cost = match i {
                0 => d,
                _ => {
                    let diag = self.cell(i - 1) + !is_match(query[i - 1], base) as usize;
                    let del = self.cell(i) + 1;
                    let ins = match lo < i {
                        true => next[i - lo - 1] + 1,
                        false => INF,
                    };
                    diag.min(del).min(ins).min(INF)
                }
            };
            next.push(cost);
        }
        self.lo = lo;
        self.column = next;
        self.column.iter().any(|&c| c <= budget)
    }
}

pub struct FlowAligner<'a> {
    graph: &'a ContigGraph,
    traversions: &'a TraversionTable,
    max_score: IntegerOrPercentage,
    max_paths: usize,
}

impl<'a> FlowAligner<'a> {
    /// `traversions` must be built from the current state of `graph`.
    pub fn new(
        graph: &'a ContigGraph,
        traversions: &'a TraversionTable,
        max_score: IntegerOrPercentage,
        max_paths: usize,
    ) -> Self {
        assert!(traversions.is_current(graph), "stale traversion table");
        Self {
            graph,
            traversions,
            max_score,
            max_paths,
        }
    }
    /// Alignments of `read` through `seed` with the smallest edit distance, if it is within the budget.
    pub fn align(
        &self,
        read: &[u8],
        read_start: usize,
        seed: ContigPosition,
    ) -> Result<Vec<GraphAlignment>, TooManyPaths> {
        assert!(read_start < read.len());
        assert!(seed.position < self.graph.contig_length(seed.contig));
        let budget = self.max_score.resolve(read.len());
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
        Ok(best_alignments(self.graph, &lefts, &rights))
    }
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
        let m = query.len();
        let column: Vec<_> = (0..=m.min(budget)).collect();
        let max_chain = m + budget + 1;
        let mut stack = vec![FlowBranch {
            chain: vec![start.contig],
            cursor: start,
            lo: 0,
            column,
            consumed: 0,
            best: None,
        }];
        let mut extensions = vec![];
        while let Some(mut branch) = stack.pop() {
            let mut alive = true;
            while let Some(base) = branch.cursor.next_base(self.graph, direction) {
                alive = branch.step(query, base, budget);
                branch.cursor.advance(direction);
                let score = branch.cell(m);
                if score <= budget && branch.best.as_ref().map_or(true, |b| score < b.score) {
                    branch.best = Some(Extension {
                        chain: branch.chain.clone(),
                        offset: branch.cursor.last_consumed(direction),
                        score,
                    });
                }
                // Further bases can only be deletions.
                alive &= branch.consumed < m + budget;
                if !alive {
                    break;
                }
            }
            let neighbours = self.traversions.neighbours(branch.cursor.contig, direction);
            if !alive || neighbours.is_empty() || max_chain <= branch.chain.len() {
                extensions.extend(branch.best);
                continue;
            }
            for &next in neighbours {
                let mut child = branch.clone();
                child.chain.push(next);
                child.cursor = Cursor::enter(self.graph, next, direction);
                stack.push(child);
            }
            if self.max_paths < stack.len() + extensions.len() {
                return Err(TooManyPaths);
            }
        }
        Ok(extensions)
    }
    /// Edit distance of the whole `read` placed inside the sequence spelled by `contigs`, with its
    /// first base within `band` bases of `offset`. Only cells within `band` of that diagonal are
    /// computed, so the result exceeds `band` whenever the true placement leaves it.
    pub fn align_along(&self, read: &[u8], contigs: &[i64], offset: usize, band: usize) -> usize {
        let reference = self.graph.path_sequence(contigs);
        let n = reference.len() as i64;
        let width = 2 * band + 1;
        // Cell k of row i is reference column i + offset + k - band.
        let column = |i: usize, k: usize| (i + offset + k) as i64 - band as i64;
        let mut prev: Vec<usize> = (0..width)
            .map(|k| match (0..=n).contains(&column(0, k)) {
                true => 0,
                false => INF,
            })
            .collect();
        let mut current = vec![INF; width];
        for (i, &base) in read.iter().enumerate().map(|(i, b)| (i + 1, b)) {
            for k in 0..width {
                let j = column(i, k);
                current[k] = match (0..=n).contains(&j) {
                    false => INF,
                    true => {
                        let diag = match 0 < j {
                            true => {
                                let r = reference[j as usize - 1];
                                prev[k] + !is_match(base, r) as usize
                            }
                            false => INF,
                        };
                        let del = prev.get(k + 1).map_or(INF, |&c| c + 1);
                        let ins = match 0 < k {
                            true => current[k - 1] + 1,
                            false => INF,
                        };
                        diag.min(del).min(ins).min(INF)
                    }
                };
            }
            std::mem::swap(&mut prev, &mut current);
        }
        prev.iter().copied().min().unwrap_or(INF)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traversion::tests::mock_graph;
    #[test]
    fn indels() {
        let graph = mock_graph();
        let table = TraversionTable::new(&graph);
        let aligner = FlowAligner::new(&graph, &table, IntegerOrPercentage::Integer(1), 100);
        let seed = ContigPosition::new(1, 0);
        for read in [&b"ACGTAAATTTTGAGA"[..], b"ACGTAAATTGAGA", b"ACGTAAATTTCAGA"] {
            let alignments = aligner.align(read, 0, seed).unwrap();
            assert_eq!(alignments.len(), 1, "{}", String::from_utf8_lossy(read));
            let aln = &alignments[0];
            assert_eq!(aln.contigs(), &[1, 2, 3]);
            assert_eq!((aln.start(), aln.end(), aln.score()), (0, 5, 1));
        }
        let read = b"ACGTAAATTTGAGA";
        let alignments = aligner.align(read, 7, ContigPosition::new(2, 3)).unwrap();
        assert_eq!(alignments.len(), 1);
        assert_eq!(alignments[0].contigs(), &[1, 2, 3]);
        assert_eq!(alignments[0].score(), 0);
        let far = b"ACGTAAACCCTGAGA";
        assert!(aligner.align(far, 0, seed).unwrap().is_empty());
    }
    #[test]
    fn along_path() {
        let graph = mock_graph();
        let table = TraversionTable::new(&graph);
        let aligner = FlowAligner::new(&graph, &table, IntegerOrPercentage::Integer(1), 100);
        assert_eq!(aligner.align_along(b"ACGTAAATTTGAGA", &[1, 2, 3], 0, 1), 0);
        assert_eq!(aligner.align_along(b"ACGTCAATTTGAGA", &[1, 2, 3], 0, 1), 1);
        assert_eq!(aligner.align_along(b"AAATTTGA", &[2, 3], 0, 1), 0);
        assert_eq!(aligner.align_along(b"AAATTGA", &[2, 3], 0, 1), 1);
        assert_eq!(aligner.align_along(b"TTACGT", &[-1], 0, 1), 0);
        // The placement has to lie near the given diagonal.
        assert!(1 < aligner.align_along(b"TTGAGA", &[1, 2, 3], 0, 1));
        assert_eq!(aligner.align_along(b"TTGAGA", &[1, 2, 3], 8, 1), 0);
        assert_eq!(aligner.align_along(b"TTGAGA", &[1, 2, 3], 7, 1), 0);
        assert_eq!(aligner.align_along(b"TTGAGA", &[1, 2, 3], 0, 8), 0);
    }
}
