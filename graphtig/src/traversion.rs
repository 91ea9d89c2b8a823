//! Adjacency of oriented contigs as implied by the paths of a graph.
//! `b` follows `a` if some live path contains `a, b` in its forward or its reverse direction.
//! Palindromic contigs are reported with their positive id, and their neighbours are the union
//! of those of both orientations.
use definitions::ContigGraph;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Traversion {
    pub next: Vec<i64>,
    pub previous: Vec<i64>,
}

/// Direction of a walk along oriented contigs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

#[derive(Debug, Clone)]
pub struct TraversionTable {
    generation: u64,
    forward: Vec<Traversion>,
    reverse: Vec<Traversion>,
    palindromes: Vec<bool>,
}

impl TraversionTable {
    pub fn new(graph: &ContigGraph) -> Self {
        let num = graph.num_contigs();
        let palindromes: Vec<bool> = (1..=num as i64)
            .map(|id| !graph.contig_deleted(id) && graph.is_palindrome(id))
            .collect();
        let mut table = Self {
            generation: graph.generation(),
            forward: vec![Traversion::default(); num],
            reverse: vec![Traversion::default(); num],
            palindromes,
        };
        for path in graph.path_ids() {
            let contigs = graph.path(path);
            for w in contigs.windows(2) {
                let (from, to) = (table.normalize(w[0]), table.normalize(w[1]));
                table.entry_mut(from).next.push(to);
                table.entry_mut(to).previous.push(from);
                let (from, to) = (table.normalize(-w[1]), table.normalize(-w[0]));
                table.entry_mut(from).next.push(to);
                table.entry_mut(to).previous.push(from);
            }
        }
        for entry in table.forward.iter_mut().chain(table.reverse.iter_mut()) {
            entry.next.sort_unstable();
            entry.next.dedup();
            entry.previous.sort_unstable();
            entry.previous.dedup();
        }
        table
    }
    fn entry(&self, id: i64) -> &Traversion {
        let index = id.unsigned_abs() as usize - 1;
        match 0 < id {
            true => &self.forward[index],
            false => &self.reverse[index],
        }
    }
    fn entry_mut(&mut self, id: i64) -> &mut Traversion {
        let index = id.unsigned_abs() as usize - 1;
        match 0 < id {
            true => &mut self.forward[index],
            false => &mut self.reverse[index],
        }
    }
    /// True if the graph has not been modified since this table was built.
    pub fn is_current(&self, graph: &ContigGraph) -> bool {
        self.generation == graph.generation()
    }
    pub fn is_palindrome(&self, id: i64) -> bool {
        self.palindromes[id.unsigned_abs() as usize - 1]
    }
    /// The positive id for a palindrome, `id` otherwise.
    pub fn normalize(&self, id: i64) -> i64 {
        match self.is_palindrome(id) {
            true => id.abs(),
            false => id,
        }
    }
    pub fn next(&self, id: i64) -> &[i64] {
        &self.entry(self.normalize(id)).next
    }
    pub fn previous(&self, id: i64) -> &[i64] {
        &self.entry(self.normalize(id)).previous
    }
    pub fn neighbours(&self, id: i64, direction: Direction) -> &[i64] {
        match direction {
            Direction::Forward => self.next(id),
            Direction::Backward => self.previous(id),
        }
    }
    pub fn traversion(&self, id: i64) -> &Traversion {
        self.entry(self.normalize(id))
    }
}
