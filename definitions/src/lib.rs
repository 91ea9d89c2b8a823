//! Definitions -- the data model of the graph assembler.
//! All the crates in this workspace exchange contigs, paths, and their attributes through one
//! structure named [ContigGraph](ContigGraph). It is serializable so that the command line tools
//! can pass a graph from one step to the next as a JSON object.
//!
//! Contigs and paths are addressed by signed ids. A positive id `n` is the `n`-th element as it
//! was added, and `-n` is its reverse complement (for a contig) or its reverse traversal
//! (for a path). Negative ids are views, never separate objects.
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

mod graph;
pub use graph::*;

/// Attributes of a contig or a path. Name to value.
pub type Attributes = BTreeMap<String, String>;

/// The number of reads supporting a contig or a path.
pub const READ_COUNT: &str = "readCount";
/// The sum of the frequencies of the k-mers spelled by a contig.
pub const KMER_FREQ: &str = "kMerFreq";
/// The elements combined into a merged or consensus contig.
pub const MERGED_FROM: &str = "mergedFrom";

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("contig {0} does not exist")]
    NoSuchContig(i64),
    #[error("path {0} does not exist")]
    NoSuchPath(i64),
    #[error("contig {0} is deleted")]
    DeletedContig(i64),
    #[error("a path must contain at least one contig")]
    EmptyPath,
    #[error("a contig must contain at least one base")]
    EmptyContig,
    #[error("contig {from} and contig {to} do not overlap by {overlap} bases")]
    OverlapMismatch { from: i64, to: i64, overlap: usize },
    #[error("invalid base {base:?} at position {position}")]
    InvalidBase { base: char, position: usize },
    #[error("{0:?} is neither an integer nor a percentage")]
    InvalidBudget(String),
}

const fn complement_table() -> [u8; 256] {
    let mut slots = [b'N'; 256];
    slots[b'A' as usize] = b'T';
    slots[b'C' as usize] = b'G';
    slots[b'G' as usize] = b'C';
    slots[b'T' as usize] = b'A';
    slots[b'a' as usize] = b't';
    slots[b'c' as usize] = b'g';
    slots[b'g' as usize] = b'c';
    slots[b't' as usize] = b'a';
    slots[b'-' as usize] = b'-';
    slots
}

/// Complement of each byte. Anything other than a nucleotide or the gap symbol maps to `N`.
pub const COMPLEMENT: [u8; 256] = complement_table();

pub fn complement(base: u8) -> u8 {
    COMPLEMENT[base as usize]
}

pub fn revcmp(seq: &[u8]) -> Vec<u8> {
    seq.iter().rev().map(|&b| COMPLEMENT[b as usize]).collect()
}

/// True if the sequence is identical to its reverse complement.
pub fn is_palindrome(seq: &[u8]) -> bool {
    seq.iter()
        .zip(seq.iter().rev())
        .all(|(&x, &y)| x == COMPLEMENT[y as usize])
}

/// A nucleotide sequence on the alphabet A,C,G,T,N. Lowercase letters are converted to uppercase.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct DnaSeq(Vec<u8>);

impl DnaSeq {
    pub fn new(seq: &[u8]) -> Result<Self, GraphError> {
        let seq: Vec<_> = seq.iter().map(u8::to_ascii_uppercase).collect();
        match seq.iter().position(|b| !b"ACGTN".contains(b)) {
            Some(position) => Err(GraphError::InvalidBase {
                base: seq[position] as char,
                position,
            }),
            None => Ok(Self(seq)),
        }
    }
    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }
    pub fn len(&self) -> usize {
        self.0.len()
    }
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for DnaSeq {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

impl std::str::FromStr for DnaSeq {
    type Err = GraphError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.as_bytes())
    }
}

/// A budget given either as an absolute number or as a percentage of a length,
/// such as the number of mismatches allowed in an alignment of a read.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum IntegerOrPercentage {
    Integer(usize),
    Percentage(f64),
}

impl IntegerOrPercentage {
    /// Resolve the budget against `length`. Percentages are rounded down.
    pub fn resolve(&self, length: usize) -> usize {
        match *self {
            IntegerOrPercentage::Integer(n) => n,
            IntegerOrPercentage::Percentage(p) => (length as f64 * p / 100f64).floor() as usize,
        }
    }
}

impl std::default::Default for IntegerOrPercentage {
    fn default() -> Self {
        IntegerOrPercentage::Integer(0)
    }
}

impl std::fmt::Display for IntegerOrPercentage {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            IntegerOrPercentage::Integer(n) => write!(f, "{}", n),
            IntegerOrPercentage::Percentage(p) => write!(f, "{}%", p),
        }
    }
}

impl std::str::FromStr for IntegerOrPercentage {
    type Err = GraphError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let input = s.trim();
        let invalid = || GraphError::InvalidBudget(s.to_string());
        match input.strip_suffix('%') {
            Some(number) => {
                let p: f64 = number.trim().parse().map_err(|_| invalid())?;
                if p.is_finite() && (0f64..=100f64).contains(&p) {
                    Ok(IntegerOrPercentage::Percentage(p))
                } else {
                    Err(invalid())
                }
            }
            None => input
                .parse()
                .map(IntegerOrPercentage::Integer)
                .map_err(|_| invalid()),
        }
    }
}

impl std::convert::TryFrom<String> for IntegerOrPercentage {
    type Error = GraphError;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<IntegerOrPercentage> for String {
    fn from(value: IntegerOrPercentage) -> Self {
        value.to_string()
    }
}

/// A base in an oriented contig.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContigPosition {
    /// Signed contig id.
    pub contig: i64,
    /// 0-based offset inside the oriented contig.
    pub position: usize,
}

impl ContigPosition {
    pub fn new(contig: i64, position: usize) -> Self {
        Self { contig, position }
    }
}

impl std::fmt::Display for ContigPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}:{}", self.contig, self.position)
    }
}

/// Bijection between [ContigPosition]s and offsets in the concatenation of
/// all the contigs (forward strands first, then the reverse complements in the same order).
/// Deleted contigs keep their place so that ids stay stable.
#[derive(Debug, Clone)]
pub struct ContigOffsets {
    starts: Vec<u64>,
}

impl ContigOffsets {
    pub fn new(graph: &ContigGraph) -> Self {
        let mut starts = Vec::with_capacity(graph.num_contigs() + 1);
        let mut sum = 0;
        starts.push(sum);
        for id in 1..=graph.num_contigs() as i64 {
            sum += graph.contig_length(id) as u64;
            starts.push(sum);
        }
        Self { starts }
    }
    /// Total length of the forward strands.
    pub fn total(&self) -> u64 {
        *self.starts.last().unwrap_or(&0)
    }
    pub fn to_global(&self, pos: ContigPosition) -> u64 {
        let index = pos.contig.unsigned_abs() as usize - 1;
        let offset = self.starts[index] + pos.position as u64;
        assert!(offset < self.starts[index + 1], "{} is out of range", pos);
        match pos.contig < 0 {
            true => self.total() + offset,
            false => offset,
        }
    }
    pub fn to_position(&self, global: u64) -> ContigPosition {
        let (is_reverse, offset) = match self.total() <= global {
            true => (true, global - self.total()),
            false => (false, global),
        };
        assert!(offset < self.total(), "{} is out of range", global);
        let index = self.starts.partition_point(|&s| s <= offset) - 1;
        let id = index as i64 + 1;
        let contig = if is_reverse { -id } else { id };
        let position = (offset - self.starts[index]) as usize;
        ContigPosition { contig, position }
    }
}
