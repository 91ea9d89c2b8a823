use definitions::{ContigGraph, READ_COUNT};
use serde::{Deserialize, Serialize};

pub trait Stats {
    fn stats<W: std::io::Write>(&self, wtr: W) -> std::io::Result<()>;
}

/// Size of the live part of a graph.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphSummary {
    pub contigs: usize,
    pub paths: usize,
    pub total_length: usize,
    pub max_length: usize,
    pub n50: usize,
}

impl GraphSummary {
    pub fn new(graph: &ContigGraph) -> Self {
        let mut lengths: Vec<_> = graph.contig_ids().map(|id| graph.contig_length(id)).collect();
        lengths.sort_unstable_by(|a, b| b.cmp(a));
        let total_length: usize = lengths.iter().sum();
        let mut acc = 0;
        let n50 = lengths
            .iter()
            .find(|&&len| {
                acc += len;
                total_length <= 2 * acc
            })
            .copied()
            .unwrap_or(0);
        Self {
            contigs: lengths.len(),
            paths: graph.path_ids().count(),
            total_length,
            max_length: lengths.first().copied().unwrap_or(0),
            n50,
        }
    }
}

impl std::fmt::Display for GraphSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "{}\t{}\t{}\t{}\t{}",
            self.contigs, self.paths, self.total_length, self.max_length, self.n50
        )
    }
}

impl Stats for ContigGraph {
    fn stats<W: std::io::Write>(&self, mut wtr: W) -> std::io::Result<()> {
        let summary = GraphSummary::new(self);
        writeln!(&mut wtr, "Contigs")?;
        writeln!(
            &mut wtr,
            "# of Contigs:{}\nTotal Length:{}\nMax Length:{}\nN50:{}",
            summary.contigs, summary.total_length, summary.max_length, summary.n50
        )?;
        let supported = self
            .contig_ids()
            .filter(|&id| self.contig_attribute(id, READ_COUNT).is_some())
            .count();
        writeln!(&mut wtr, "Supported:{}", supported)?;
        if 0 < summary.paths {
            let lens: Vec<usize> = self.path_ids().map(|p| self.path_length(p)).collect();
            let sum = lens.iter().sum::<usize>();
            let max = lens.iter().max().copied().unwrap_or(0);
            writeln!(&mut wtr, "Paths")?;
            writeln!(
                &mut wtr,
                "# of Paths:{}\nTotal Contigs:{}\nMax Contigs:{}",
                summary.paths, sum, max
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn summary() {
        let mut graph = ContigGraph::new(1);
        for len in [10, 6, 3, 1] {
            graph.add_contig(&vec![b'A'; len]).unwrap();
        }
        graph.add_path(&[1, 2]).unwrap();
        graph.add_path(&[2, 3]).unwrap();
        graph.delete_contig(4);
        let summary = GraphSummary::new(&graph);
        assert_eq!(summary.contigs, 3);
        assert_eq!(summary.paths, 2);
        assert_eq!(summary.total_length, 19);
        assert_eq!(summary.max_length, 10);
        assert_eq!(summary.n50, 10);
        graph.delete_contig(1);
        let summary = GraphSummary::new(&graph);
        assert_eq!((summary.paths, summary.n50), (1, 6));
        assert_eq!(GraphSummary::new(&ContigGraph::new(0)), GraphSummary::default());
        let mut wtr = vec![];
        graph.stats(&mut wtr).unwrap();
        let text = String::from_utf8(wtr).unwrap();
        assert!(text.contains("# of Contigs:2"));
        assert!(text.contains("# of Paths:1"));
        assert!(text.contains("Total Contigs:2\nMax Contigs:2"));
    }
}
