use super::*;
use serde_with::DisplayFromStr;
use std::collections::HashMap;

#[serde_with::serde_as]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Contig {
    #[serde_as(as = "DisplayFromStr")]
    seq: DnaSeq,
    #[serde(default)]
    attributes: Attributes,
    #[serde(default)]
    deleted: bool,
}

impl Contig {
    pub fn seq(&self) -> &[u8] {
        self.seq.as_slice()
    }
    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }
    pub fn is_deleted(&self) -> bool {
        self.deleted
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Path {
    contigs: Vec<i64>,
    #[serde(default)]
    attributes: Attributes,
    #[serde(default)]
    deleted: bool,
}

impl Path {
    /// Contigs in the forward direction of this path.
    pub fn contigs(&self) -> &[i64] {
        &self.contigs
    }
    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }
    pub fn is_deleted(&self) -> bool {
        self.deleted
    }
}

/// Reverse traversal of a path given by signed contig ids.
pub fn reverse_path(contigs: &[i64]) -> Vec<i64> {
    contigs.iter().rev().map(|&c| -c).collect()
}

/// The mutable graph of contigs and paths.
/// Each path is an ordered traversal of contigs, where every consecutive pair overlaps
/// by exactly `overlap` bases. The same pair of contigs can appear in many paths.
/// Elements are never removed in place: they are marked as deleted and only dropped by [ContigGraph::compact].
/// A deserialized graph is checked the same way as one built by [ContigGraph::add_contig] and
/// [ContigGraph::add_path].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "RawGraph")]
pub struct ContigGraph {
    overlap: usize,
    contigs: Vec<Contig>,
    paths: Vec<Path>,
    // Incremented whenever the set of contigs or paths changes.
    #[serde(skip)]
    generation: u64,
}

#[derive(Deserialize)]
struct RawGraph {
    overlap: usize,
    contigs: Vec<Contig>,
    paths: Vec<Path>,
}

impl std::convert::TryFrom<RawGraph> for ContigGraph {
    type Error = GraphError;
    fn try_from(raw: RawGraph) -> Result<Self, Self::Error> {
        let graph = Self {
            overlap: raw.overlap,
            contigs: raw.contigs,
            paths: raw.paths,
            generation: 0,
        };
        if graph.contigs.iter().any(|c| c.seq.is_empty()) {
            return Err(GraphError::EmptyContig);
        }
        for path in graph.paths.iter().filter(|p| !p.deleted) {
            graph.check_path(&path.contigs)?;
        }
        Ok(graph)
    }
}

impl std::cmp::PartialEq for ContigGraph {
    fn eq(&self, other: &Self) -> bool {
        self.overlap == other.overlap && self.contigs == other.contigs && self.paths == other.paths
    }
}

impl std::cmp::Eq for ContigGraph {}

impl std::fmt::Display for ContigGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        writeln!(f, "Overlap:{}", self.overlap)?;
        for id in self.contig_ids() {
            let contig = &self.contigs[id as usize - 1];
            writeln!(f, "C\t{}\t{}\t{:?}", id, contig.seq, contig.attributes)?;
        }
        let lines: Vec<_> = self
            .path_ids()
            .map(|id| {
                let path = &self.paths[id as usize - 1];
                let contigs: Vec<_> = path.contigs.iter().map(|c| c.to_string()).collect();
                format!("P\t{}\t{}\t{:?}", id, contigs.join(","), path.attributes)
            })
            .collect();
        write!(f, "{}", lines.join("\n"))
    }
}

impl ContigGraph {
    pub fn new(overlap: usize) -> Self {
        Self {
            overlap,
            contigs: vec![],
            paths: vec![],
            generation: 0,
        }
    }
    pub fn overlap(&self) -> usize {
        self.overlap
    }
    /// Changes each time a contig or a path is added or deleted.
    pub fn generation(&self) -> u64 {
        self.generation
    }
    /// The number of contig ids in use, deleted ones included.
    pub fn num_contigs(&self) -> usize {
        self.contigs.len()
    }
    /// The number of path ids in use, deleted ones included.
    pub fn num_paths(&self) -> usize {
        self.paths.len()
    }
    /// Positive ids of the contigs not deleted.
    pub fn contig_ids(&self) -> impl Iterator<Item = i64> + '_ {
        self.contigs
            .iter()
            .enumerate()
            .filter(|(_, c)| !c.deleted)
            .map(|(i, _)| i as i64 + 1)
    }
    /// Positive ids of the paths not deleted.
    pub fn path_ids(&self) -> impl Iterator<Item = i64> + '_ {
        self.paths
            .iter()
            .enumerate()
            .filter(|(_, p)| !p.deleted)
            .map(|(i, _)| i as i64 + 1)
    }
    fn contig_index(&self, id: i64) -> Result<usize, GraphError> {
        let index = id.unsigned_abs() as usize;
        match 0 < index && index <= self.contigs.len() {
            true => Ok(index - 1),
            false => Err(GraphError::NoSuchContig(id)),
        }
    }
    fn path_index(&self, id: i64) -> Result<usize, GraphError> {
        let index = id.unsigned_abs() as usize;
        match 0 < index && index <= self.paths.len() {
            true => Ok(index - 1),
            false => Err(GraphError::NoSuchPath(id)),
        }
    }
    fn contig(&self, id: i64) -> &Contig {
        match self.contig_index(id) {
            Ok(index) => &self.contigs[index],
            Err(why) => panic!("{}", why),
        }
    }
    fn contig_mut(&mut self, id: i64) -> &mut Contig {
        match self.contig_index(id) {
            Ok(index) => &mut self.contigs[index],
            Err(why) => panic!("{}", why),
        }
    }
    fn path_entry(&self, id: i64) -> &Path {
        match self.path_index(id) {
            Ok(index) => &self.paths[index],
            Err(why) => panic!("{}", why),
        }
    }
    fn path_mut(&mut self, id: i64) -> &mut Path {
        match self.path_index(id) {
            Ok(index) => &mut self.paths[index],
            Err(why) => panic!("{}", why),
        }
    }
    pub fn add_contig(&mut self, seq: &[u8]) -> Result<i64, GraphError> {
        let seq = DnaSeq::new(seq)?;
        if seq.is_empty() {
            return Err(GraphError::EmptyContig);
        }
        self.contigs.push(Contig {
            seq,
            attributes: Attributes::new(),
            deleted: false,
        });
        self.generation += 1;
        Ok(self.contigs.len() as i64)
    }
    /// Check that `contigs` is a valid traversal of live contigs.
    pub fn check_path(&self, contigs: &[i64]) -> Result<(), GraphError> {
        if contigs.is_empty() {
            return Err(GraphError::EmptyPath);
        }
        for &id in contigs {
            let index = self.contig_index(id)?;
            if self.contigs[index].deleted {
                return Err(GraphError::DeletedContig(id));
            }
        }
        let overlap = self.overlap;
        for w in contigs.windows(2) {
            let (from, to) = (w[0], w[1]);
            let (from_len, to_len) = (self.contig_length(from), self.contig_length(to));
            let consistent = overlap <= from_len.min(to_len)
                && (0..overlap)
                    .all(|i| self.base(from, from_len - overlap + i) == self.base(to, i));
            if !consistent {
                return Err(GraphError::OverlapMismatch { from, to, overlap });
            }
        }
        Ok(())
    }
    pub fn add_path(&mut self, contigs: &[i64]) -> Result<i64, GraphError> {
        self.check_path(contigs)?;
        self.paths.push(Path {
            contigs: contigs.to_vec(),
            attributes: Attributes::new(),
            deleted: false,
        });
        self.generation += 1;
        Ok(self.paths.len() as i64)
    }
    pub fn contig_length(&self, id: i64) -> usize {
        self.contig(id).seq.len()
    }
    /// The `position`-th base of the oriented contig `id`.
    pub fn base(&self, id: i64, position: usize) -> u8 {
        let seq = self.contig(id).seq();
        match 0 < id {
            true => seq[position],
            false => COMPLEMENT[seq[seq.len() - 1 - position] as usize],
        }
    }
    /// The sequence of the oriented contig `id`.
    pub fn contig_seq(&self, id: i64) -> Vec<u8> {
        let seq = self.contig(id).seq();
        match 0 < id {
            true => seq.to_vec(),
            false => revcmp(seq),
        }
    }
    /// The sequence as stored, i.e., of the positive orientation.
    pub fn forward_seq(&self, id: i64) -> &[u8] {
        self.contig(id).seq()
    }
    pub fn is_palindrome(&self, id: i64) -> bool {
        is_palindrome(self.contig(id).seq())
    }
    /// Sequence spelled by a traversal.
    pub fn path_sequence(&self, contigs: &[i64]) -> Vec<u8> {
        let mut seq = vec![];
        for (i, &id) in contigs.iter().enumerate() {
            let contig = self.contig_seq(id);
            match i {
                0 => seq.extend(contig),
                _ => seq.extend_from_slice(&contig[self.overlap.min(contig.len())..]),
            }
        }
        seq
    }
    /// Contigs of the path `id` in its orientation.
    pub fn path(&self, id: i64) -> Vec<i64> {
        let contigs = &self.path_entry(id).contigs;
        match 0 < id {
            true => contigs.clone(),
            false => reverse_path(contigs),
        }
    }
    pub fn path_length(&self, id: i64) -> usize {
        self.path_entry(id).contigs.len()
    }
    pub fn path_contig(&self, id: i64, index: usize) -> i64 {
        let contigs = &self.path_entry(id).contigs;
        match 0 < id {
            true => contigs[index],
            false => -contigs[contigs.len() - 1 - index],
        }
    }
    pub fn contig_attributes(&self, id: i64) -> &Attributes {
        &self.contig(id).attributes
    }
    pub fn contig_attribute(&self, id: i64, key: &str) -> Option<&str> {
        self.contig(id).attributes.get(key).map(|x| x.as_str())
    }
    pub fn set_contig_attribute(&mut self, id: i64, key: &str, value: String) {
        self.contig_mut(id).attributes.insert(key.to_string(), value);
    }
    pub fn path_attributes(&self, id: i64) -> &Attributes {
        &self.path_entry(id).attributes
    }
    pub fn path_attribute(&self, id: i64, key: &str) -> Option<&str> {
        self.path_entry(id).attributes.get(key).map(|x| x.as_str())
    }
    pub fn set_path_attribute(&mut self, id: i64, key: &str, value: String) {
        self.path_mut(id).attributes.insert(key.to_string(), value);
    }
    pub fn contig_deleted(&self, id: i64) -> bool {
        self.contig(id).deleted
    }
    pub fn path_deleted(&self, id: i64) -> bool {
        self.path_entry(id).deleted
    }
    /// Delete a contig together with every path running through it.
    pub fn delete_contig(&mut self, id: i64) {
        let target = id.unsigned_abs();
        self.contig_mut(id).deleted = true;
        for path in self.paths.iter_mut().filter(|p| !p.deleted) {
            if path.contigs.iter().any(|c| c.unsigned_abs() == target) {
                path.deleted = true;
            }
        }
        self.generation += 1;
    }
    pub fn delete_path(&mut self, id: i64) {
        self.path_mut(id).deleted = true;
        self.generation += 1;
    }
    /// Positive ids of the live paths going through the contig `id` in either direction.
    pub fn paths_of(&self, id: i64) -> Vec<i64> {
        let target = id.unsigned_abs();
        self.path_ids()
            .filter(|&p| {
                let path = &self.paths[p as usize - 1];
                path.contigs.iter().any(|c| c.unsigned_abs() == target)
            })
            .collect()
    }
    /// Live path ids whose contigs are exactly `contigs`, signed by the matching direction.
    pub fn find_paths(&self, contigs: &[i64]) -> Vec<i64> {
        let reversed = reverse_path(contigs);
        self.path_ids()
            .filter_map(|p| {
                let path = &self.paths[p as usize - 1].contigs;
                if path.as_slice() == contigs {
                    Some(p)
                } else if path == &reversed {
                    Some(-p)
                } else {
                    None
                }
            })
            .collect()
    }
    /// Create a new graph without deleted elements. Contigs and paths are renumbered
    /// in their original order, orientations and attributes are kept.
    pub fn compact(&self) -> ContigGraph {
        let mut graph = ContigGraph::new(self.overlap);
        let mut new_ids: HashMap<u64, i64> = HashMap::new();
        for id in self.contig_ids() {
            let contig = &self.contigs[id as usize - 1];
            graph.contigs.push(contig.clone());
            new_ids.insert(id as u64, graph.contigs.len() as i64);
        }
        for id in self.path_ids() {
            let path = &self.paths[id as usize - 1];
            let contigs: Vec<_> = path
                .contigs
                .iter()
                .map(|&c| c.signum() * new_ids[&c.unsigned_abs()])
                .collect();
            graph.paths.push(Path {
                contigs,
                attributes: path.attributes.clone(),
                deleted: false,
            });
        }
        graph.generation = 1;
        graph
    }
    /// Canonical form of the live graph for comparing outputs: every contig is stored in its
    /// lexicographically smaller orientation, contigs are sorted by sequence, and paths are
    /// stored in their smaller direction and sorted.
    pub fn sorted_graph(&self) -> ContigGraph {
        let mut contigs: Vec<_> = self
            .contig_ids()
            .map(|id| {
                let contig = &self.contigs[id as usize - 1];
                let forward = contig.seq().to_vec();
                let reverse = revcmp(&forward);
                match reverse < forward {
                    true => (reverse, -id, contig),
                    false => (forward, id, contig),
                }
            })
            .collect();
        contigs.sort_by(|x, y| (&x.0, &x.2.attributes).cmp(&(&y.0, &y.2.attributes)));
        let mut graph = ContigGraph::new(self.overlap);
        let mut new_ids: HashMap<u64, i64> = HashMap::new();
        for (seq, signed_id, contig) in contigs {
            graph.contigs.push(Contig {
                seq: DnaSeq(seq),
                attributes: contig.attributes.clone(),
                deleted: false,
            });
            let new_id = graph.contigs.len() as i64;
            new_ids.insert(signed_id.unsigned_abs(), signed_id.signum() * new_id);
        }
        let palindromic: Vec<bool> = graph.contigs.iter().map(|c| is_palindrome(c.seq())).collect();
        let normalize = |id: i64| match palindromic[id.unsigned_abs() as usize - 1] {
            true => id.abs(),
            false => id,
        };
        let mut paths: Vec<_> = self
            .path_ids()
            .map(|id| {
                let path = &self.paths[id as usize - 1];
                let forward: Vec<_> = path
                    .contigs
                    .iter()
                    .map(|&c| normalize(c.signum() * new_ids[&c.unsigned_abs()]))
                    .collect();
                let reverse: Vec<_> = reverse_path(&forward).into_iter().map(normalize).collect();
                (forward.min(reverse), path.attributes.clone())
            })
            .collect();
        paths.sort();
        graph.paths = paths
            .into_iter()
            .map(|(contigs, attributes)| Path {
                contigs,
                attributes,
                deleted: false,
            })
            .collect();
        graph.generation = 1;
        graph
    }
}
